//! Tests for manual review records.

use chrono::NaiveDate;
use roomsched_core::allocation::UnallocatedReason;
use roomsched_core::model::{Demand, DemandId, PersonId, Room, RoomId, Term, TermId};
use roomsched_core::recurrence::{Frequency, RecurrenceRule};
use roomsched_core::review::{from_conflicts, from_run, overlaps, ReviewItem};
use roomsched_core::{
    allocate, expand_and_commit, AllocationRequest, EngineConfig, EventRequest, ExpansionError,
    Ledger, Weekday,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn term() -> Term {
    Term {
        id: TermId::new("2026.1"),
        starts_on: date(2026, 3, 2),
        ends_on: date(2026, 7, 4),
    }
}

fn tuesday_m1(start: NaiveDate, end: NaiveDate) -> EventRequest {
    EventRequest {
        room: RoomId(1),
        creator: PersonId::new("staff"),
        title: "workshop".to_string(),
        rule: RecurrenceRule {
            frequency: Frequency::Weekly,
            weekdays: [Weekday::Tue].into_iter().collect(),
            start_date: start,
            end_date: end,
            block: Some("M1".parse().unwrap()),
        },
    }
}

#[test]
fn unplaced_demands_become_review_items() {
    let request = AllocationRequest {
        term: term().id,
        dates: None,
        demands: vec![Demand::new(1, 30, "2M1", "a"), Demand::new(2, 500, "2M1", "b")],
        rooms: vec![Room::new(1, "lecture", 40)],
        rules: vec![],
    };
    let result = allocate(&request, &EngineConfig::default());
    let items = from_run(&result);
    assert_eq!(
        items,
        vec![ReviewItem::Unallocated {
            term: term().id,
            demand: DemandId(2),
            reason: UnallocatedReason::NoMatchingRoomTypeOrCapacity,
        }]
    );
    assert_eq!(items[0].date(), None);
}

#[test]
fn rejected_series_lists_each_conflicting_date() {
    let mut ledger = Ledger::new();
    expand_and_commit(&mut ledger, tuesday_m1(date(2026, 3, 10), date(2026, 3, 17))).unwrap();
    let err = expand_and_commit(&mut ledger, tuesday_m1(date(2026, 3, 3), date(2026, 3, 24))).unwrap_err();
    let ExpansionError::Conflict(conflict) = err else {
        panic!("expected a conflict, got {err:?}");
    };

    let dates: Vec<Option<NaiveDate>> = from_conflicts(&conflict).iter().map(ReviewItem::date).collect();
    assert_eq!(dates, vec![Some(date(2026, 3, 10)), Some(date(2026, 3, 17))]);
}

#[test]
fn committed_allocation_overlapping_occurrence_is_flagged() {
    let mut ledger = Ledger::new();
    ledger.add_term(term());
    // Booked before the term's allocations were written.
    expand_and_commit(&mut ledger, tuesday_m1(date(2026, 3, 3), date(2026, 3, 10))).unwrap();

    let request = AllocationRequest {
        term: term().id,
        dates: None,
        demands: vec![Demand::new(1, 30, "2M1", "a")],
        rooms: vec![Room::new(1, "lecture", 40)],
        rules: vec![],
    };
    let result = allocate(&request, &EngineConfig::default());
    ledger.replace_term(&term().id, result.allocations().to_vec()).unwrap();

    let items = overlaps(&ledger, &term().id);
    let dates: Vec<Option<NaiveDate>> = items.iter().map(ReviewItem::date).collect();
    assert_eq!(dates, vec![Some(date(2026, 3, 3)), Some(date(2026, 3, 10))]);
    assert!(items
        .iter()
        .all(|item| matches!(item, ReviewItem::Overlap { allocation, .. } if allocation.demand == DemandId(1))));
}

#[test]
fn review_items_serialize_with_kind_tag() {
    let item = ReviewItem::Unallocated {
        term: term().id,
        demand: DemandId(3),
        reason: UnallocatedReason::ScheduleConflict,
    };
    let json = serde_json::to_value(&item).unwrap();
    assert_eq!(json["kind"], "unallocated");
    assert_eq!(json["reason"]["code"], "schedule-conflict");
}
