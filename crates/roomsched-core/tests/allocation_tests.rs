//! Tests for the term-wide allocation matcher.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::mpsc;

use chrono::NaiveDate;
use roomsched_core::allocation::{DemandOutcome, RunOptions, TermDates, UnallocatedReason};
use roomsched_core::model::{Demand, DemandId, PersonId, Room, RoomId, Term, TermId};
use roomsched_core::rules::{HardKind, Rule, RuleScope, SoftKind};
use roomsched_core::{
    allocate, allocate_locked, allocate_with, AllocationRequest, CancelToken, EngineConfig,
    EngineError, Ledger, Slot, TermLocks, Weekday,
};

fn term() -> TermId {
    TermId::new("2026.1")
}

fn term_2026_1() -> Term {
    Term {
        id: term(),
        starts_on: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
        ends_on: NaiveDate::from_ymd_opt(2026, 7, 4).unwrap(),
    }
}

fn request(demands: Vec<Demand>, rooms: Vec<Room>, rules: Vec<Rule>) -> AllocationRequest {
    AllocationRequest {
        term: term(),
        dates: None,
        demands,
        rooms,
        rules,
    }
}

fn placed_room(outcome: Option<&DemandOutcome>) -> Option<RoomId> {
    match outcome {
        Some(DemandOutcome::Placed { room, .. }) => Some(*room),
        _ => None,
    }
}

fn reason(outcome: Option<&DemandOutcome>) -> Option<&UnallocatedReason> {
    match outcome {
        Some(DemandOutcome::Unallocated(reason)) => Some(reason),
        _ => None,
    }
}

#[test]
fn lab_demand_goes_to_the_only_room_that_fits() {
    let req = request(
        vec![Demand::new(1, 40, "35T4", "ana").with_room_type("lab")],
        vec![Room::new(1, "lab", 50), Room::new(2, "lab", 35)],
        vec![],
    );
    let result = allocate(&req, &EngineConfig::default());

    assert_eq!(placed_room(result.outcome(DemandId(1))), Some(RoomId(1)));
    let slots: BTreeSet<Slot> = result.allocations().iter().map(|a| a.slot()).collect();
    let expected: BTreeSet<Slot> = [
        Slot::new(Weekday::Wed, "T4".parse().unwrap()),
        Slot::new(Weekday::Fri, "T4".parse().unwrap()),
    ]
    .into_iter()
    .collect();
    assert_eq!(slots, expected);
    assert!(result.allocations().iter().all(|a| a.room == RoomId(1) && a.term == term()));
}

#[test]
fn two_demands_on_one_slot_get_separate_rooms() {
    let req = request(
        vec![Demand::new(1, 30, "2M1", "ana"), Demand::new(2, 30, "2M1", "bob")],
        vec![Room::new(1, "lecture", 40), Room::new(2, "lecture", 40)],
        vec![],
    );
    let result = allocate(&req, &EngineConfig::default());

    assert_eq!(placed_room(result.outcome(DemandId(1))), Some(RoomId(1)));
    assert_eq!(placed_room(result.outcome(DemandId(2))), Some(RoomId(2)));
}

#[test]
fn second_demand_conflicts_when_only_one_room_exists() {
    let req = request(
        vec![Demand::new(1, 30, "2M1", "ana"), Demand::new(2, 25, "2M1", "bob")],
        vec![Room::new(1, "lecture", 40)],
        vec![],
    );
    let result = allocate(&req, &EngineConfig::default());

    // Larger enrollment goes first.
    assert_eq!(placed_room(result.outcome(DemandId(1))), Some(RoomId(1)));
    assert_eq!(
        reason(result.outcome(DemandId(2))),
        Some(&UnallocatedReason::ScheduleConflict)
    );
}

#[test]
fn processing_order_is_enrollment_then_id() {
    let req = request(
        vec![
            Demand::new(5, 20, "1M1", "a"),
            Demand::new(3, 60, "1M2", "b"),
            Demand::new(1, 20, "1M3", "c"),
        ],
        vec![Room::new(1, "lecture", 80)],
        vec![],
    );
    let result = allocate(&req, &EngineConfig::default());
    let order: Vec<DemandId> = result.outcomes.iter().map(|r| r.demand).collect();
    assert_eq!(order, vec![DemandId(3), DemandId(1), DemandId(5)]);
}

#[test]
fn demand_is_never_split_across_rooms() {
    // Room 1 is taken on Tuesday, room 2 on Thursday: neither covers "24M1".
    let req = request(
        vec![
            Demand::new(1, 50, "2M1", "a"),
            Demand::new(2, 50, "4M1", "b"),
            Demand::new(3, 10, "24M1", "c"),
        ],
        vec![Room::new(1, "lecture", 50), Room::new(2, "lecture", 60)],
        vec![Rule::hard(HardKind::ExcludeRoom {
            scope: RuleScope::Demand(DemandId(2)),
            room: RoomId(1),
        })],
    );
    let result = allocate(&req, &EngineConfig::default());

    assert_eq!(placed_room(result.outcome(DemandId(1))), Some(RoomId(1)));
    assert_eq!(placed_room(result.outcome(DemandId(2))), Some(RoomId(2)));
    assert_eq!(
        reason(result.outcome(DemandId(3))),
        Some(&UnallocatedReason::ScheduleConflict)
    );
    assert!(result.allocations().iter().all(|a| a.demand != DemandId(3)));
}

#[test]
fn every_placed_demand_uses_one_room_for_all_slots() {
    let demands = vec![
        Demand::new(1, 40, "135M12", "a"),
        Demand::new(2, 35, "24T34", "b"),
        Demand::new(3, 30, "13M2", "c"),
        Demand::new(4, 20, "6N12", "d"),
    ];
    let rooms = vec![
        Room::new(1, "lecture", 45),
        Room::new(2, "lecture", 40),
        Room::new(3, "lecture", 60),
    ];
    let req = request(demands.clone(), rooms.clone(), vec![]);
    let result = allocate(&req, &EngineConfig::default());

    let mut rooms_per_demand: BTreeMap<DemandId, BTreeSet<RoomId>> = BTreeMap::new();
    let mut slots_per_demand: BTreeMap<DemandId, BTreeSet<Slot>> = BTreeMap::new();
    for row in result.allocations() {
        rooms_per_demand.entry(row.demand).or_default().insert(row.room);
        slots_per_demand.entry(row.demand).or_default().insert(row.slot());
    }
    for demand in &demands {
        let Some(rooms_used) = rooms_per_demand.get(&demand.id) else {
            continue;
        };
        assert_eq!(rooms_used.len(), 1, "demand {} split across rooms", demand.id);
        assert_eq!(slots_per_demand[&demand.id], demand.schedule_code.slots().unwrap());
        let room = rooms.iter().find(|r| rooms_used.contains(&r.id)).unwrap();
        assert!(room.capacity >= demand.enrollment);
    }
    assert_eq!(result.placed_count(), 4);
}

#[test]
fn no_two_rows_share_room_and_slot() {
    let demands: Vec<Demand> = (1..=12)
        .map(|i| Demand::new(i, 10 + i, "135M1234", format!("p{i}")))
        .collect();
    let rooms: Vec<Room> = (1..=5).map(|i| Room::new(i, "lecture", 30)).collect();
    let result = allocate(&request(demands, rooms, vec![]), &EngineConfig::default());

    let keys: BTreeSet<(RoomId, Slot)> = result.allocations().iter().map(|a| (a.room, a.slot())).collect();
    assert_eq!(keys.len(), result.allocations().len());
    assert_eq!(result.placed_count(), 5);
    // Committing the run must succeed: no duplicate keys.
    let mut ledger = Ledger::new();
    ledger.add_term(term_2026_1());
    assert!(ledger.replace_term(&term(), result.allocations().to_vec()).is_ok());
}

#[test]
fn capacity_shortfall_is_reported() {
    let req = request(
        vec![Demand::new(1, 200, "2M1", "a")],
        vec![Room::new(1, "lecture", 80)],
        vec![],
    );
    let result = allocate(&req, &EngineConfig::default());
    assert_eq!(
        reason(result.outcome(DemandId(1))),
        Some(&UnallocatedReason::NoMatchingRoomTypeOrCapacity)
    );
    assert!(result.allocations().is_empty());
}

#[test]
fn invalid_schedule_code_does_not_abort_the_run() {
    let req = request(
        vec![Demand::new(1, 20, "2X1", "a"), Demand::new(2, 10, "2M1", "b")],
        vec![Room::new(1, "lecture", 30)],
        vec![],
    );
    let result = allocate(&req, &EngineConfig::default());
    assert!(matches!(
        reason(result.outcome(DemandId(1))),
        Some(UnallocatedReason::InvalidSchedule { message }) if message.contains("2X1")
    ));
    assert_eq!(placed_room(result.outcome(DemandId(2))), Some(RoomId(1)));
}

#[test]
fn excluded_demand_is_skipped() {
    let req = request(
        vec![Demand::new(1, 20, "2M1", "a").excluded()],
        vec![Room::new(1, "lecture", 30)],
        vec![],
    );
    let result = allocate(&req, &EngineConfig::default());
    assert_eq!(reason(result.outcome(DemandId(1))), Some(&UnallocatedReason::Excluded));
}

#[test]
fn score_tie_goes_to_lowest_room_id() {
    let req = request(
        vec![Demand::new(1, 30, "2M1", "a")],
        vec![Room::new(9, "lecture", 40), Room::new(4, "lecture", 40)],
        vec![],
    );
    let result = allocate(&req, &EngineConfig::default());
    assert_eq!(placed_room(result.outcome(DemandId(1))), Some(RoomId(4)));
}

#[test]
fn professor_preference_wins_over_tighter_room() {
    let req = request(
        vec![Demand::new(1, 30, "2M1", "ana")],
        vec![Room::new(1, "lecture", 32), Room::new(2, "lecture", 60)],
        vec![Rule::soft(
            SoftKind::PreferRoom {
                scope: RuleScope::Professor(PersonId::new("ana")),
                room: RoomId(2),
            },
            1,
        )],
    );
    let result = allocate(&req, &EngineConfig::default());
    let Some(DemandOutcome::Placed { room, score, .. }) = result.outcome(DemandId(1)) else {
        panic!("demand should be placed");
    };
    assert_eq!(*room, RoomId(2));
    assert_eq!(*score, 100 - 30);
}

#[test]
fn identical_requests_give_byte_identical_results() {
    let demands: Vec<Demand> = (1..=30)
        .map(|i| {
            let code = ["24M12", "35T34", "6N12", "135M56", "24T12"][(i % 5) as usize];
            Demand::new(i, 15 + (i * 7) % 40, code, format!("p{}", i % 4))
        })
        .collect();
    let rooms: Vec<Room> = (1..=6)
        .map(|i| Room::new(i, "lecture", 20 + i * 8).with_floor((i % 3) as i32))
        .collect();
    let rules = vec![
        Rule::soft(SoftKind::PreferFloor { scope: RuleScope::All, floor: 1 }, 1),
        Rule::soft(SoftKind::MinimizeWaste, 1),
    ];
    let req = request(demands, rooms, rules);

    let first = serde_json::to_string(&allocate(&req, &EngineConfig::default())).unwrap();
    for _ in 0..5 {
        let again = serde_json::to_string(&allocate(&req, &EngineConfig::default())).unwrap();
        assert_eq!(first, again);
    }
}

#[test]
fn progress_is_reported_per_demand() {
    let req = request(
        vec![
            Demand::new(1, 10, "2M1", "a"),
            Demand::new(2, 10, "3M1", "b"),
            Demand::new(3, 10, "4M1", "c"),
        ],
        vec![Room::new(1, "lecture", 30)],
        vec![],
    );
    let (tx, rx) = mpsc::channel();
    let options = RunOptions {
        progress: Some(tx),
        cancel: None,
    };
    allocate_with(&req, &EngineConfig::default(), &options);
    drop(options);

    let reports: Vec<_> = rx.iter().collect();
    assert_eq!(reports.len(), 3);
    assert_eq!(reports.last().map(|p| (p.processed, p.total)), Some((3, 3)));
}

#[test]
fn cancelled_run_marks_remaining_demands() {
    let req = request(
        vec![Demand::new(1, 10, "2M1", "a"), Demand::new(2, 10, "3M1", "b")],
        vec![Room::new(1, "lecture", 30)],
        vec![],
    );
    let token = CancelToken::new();
    token.cancel();
    let options = RunOptions {
        progress: None,
        cancel: Some(token),
    };
    let result = allocate_with(&req, &EngineConfig::default(), &options);

    assert!(result.cancelled);
    assert!(result.allocations().is_empty());
    assert!(result
        .unallocated()
        .all(|(_, reason)| *reason == UnallocatedReason::Cancelled));
}

#[test]
fn concurrent_run_for_same_term_is_refused() {
    let locks = TermLocks::new();
    let req = request(
        vec![Demand::new(1, 10, "2M1", "a")],
        vec![Room::new(1, "lecture", 30)],
        vec![],
    );
    let guard = locks.try_lock(&term()).unwrap();
    let err = allocate_locked(&locks, &req, &EngineConfig::default(), &RunOptions::default())
        .unwrap_err();
    assert!(matches!(err, EngineError::TermLocked(t) if t == term()));

    drop(guard);
    let result = allocate_locked(&locks, &req, &EngineConfig::default(), &RunOptions::default())
        .unwrap();
    assert_eq!(result.placed_count(), 1);
    assert!(!locks.is_locked(&term()));
}

#[test]
fn duplicate_ids_are_rejected() {
    let locks = TermLocks::new();
    let req = request(
        vec![Demand::new(1, 10, "2M1", "a"), Demand::new(1, 12, "3M1", "b")],
        vec![Room::new(1, "lecture", 30)],
        vec![],
    );
    let err = allocate_locked(&locks, &req, &EngineConfig::default(), &RunOptions::default())
        .unwrap_err();
    assert!(matches!(err, EngineError::DuplicateId { kind: "demand", .. }));
}

#[test]
fn term_dates_ending_before_start_are_rejected() {
    let locks = TermLocks::new();
    let mut req = request(vec![Demand::new(1, 10, "2M1", "a")], vec![Room::new(1, "lecture", 30)], vec![]);
    req.dates = Some(TermDates {
        starts_on: NaiveDate::from_ymd_opt(2026, 7, 4).unwrap(),
        ends_on: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
    });
    let err = allocate_locked(&locks, &req, &EngineConfig::default(), &RunOptions::default())
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[test]
fn committing_a_run_needs_the_term_calendar() {
    let mut req = request(vec![Demand::new(1, 10, "2M1", "a")], vec![Room::new(1, "lecture", 30)], vec![]);
    let result = allocate(&req, &EngineConfig::default());

    let mut ledger = Ledger::new();
    let err = ledger
        .replace_term(&term(), result.allocations().to_vec())
        .unwrap_err();
    assert!(matches!(err, EngineError::UnknownTerm(ref t) if *t == term()));
    assert_eq!(ledger.allocations(&term()).count(), 0);

    req.dates = Some(TermDates {
        starts_on: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
        ends_on: NaiveDate::from_ymd_opt(2026, 7, 4).unwrap(),
    });
    ledger.add_term(req.term_record().unwrap());
    assert_eq!(ledger.replace_term(&term(), result.allocations().to_vec()).unwrap(), 1);
}

#[test]
fn outcome_serializes_with_status_and_reason_code() {
    let req = request(
        vec![Demand::new(1, 200, "2M1", "a"), Demand::new(2, 10, "2M1", "b")],
        vec![Room::new(1, "lecture", 30)],
        vec![],
    );
    let json = serde_json::to_value(allocate(&req, &EngineConfig::default())).unwrap();
    let outcomes = json["outcomes"].as_array().unwrap();
    assert_eq!(outcomes[0]["demand"], 1);
    assert_eq!(outcomes[0]["status"], "unallocated");
    assert_eq!(outcomes[0]["code"], "no-matching-room-type-or-capacity");
    assert_eq!(outcomes[1]["status"], "placed");
    assert_eq!(outcomes[1]["room"], 1);
}
