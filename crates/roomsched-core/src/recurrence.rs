//! Recurrence expansion — turns a repeat rule into dated occurrences and
//! commits them as one unit.
//!
//! A rule is a frequency (weekly or biweekly), a weekday set, a date range of
//! at most one year, and one time block. [`RecurrenceRule::dates`] is a lazy,
//! restartable walk over the matching dates; [`expand_and_commit`] consumes it,
//! checks every candidate against the ledger, and writes either the whole
//! series or nothing.
//!
//! Biweekly weeks are counted from the start date itself, not from calendar
//! week boundaries: days 0–6 after the start are week 0 (on), days 7–13 are
//! week 1 (off), and so on.

use std::collections::BTreeSet;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::conflict::{find_conflicts, Conflict, Placement, Scope};
use crate::control::CancelToken;
use crate::error::{ConflictError, ExpansionError, ValidationError};
use crate::ledger::Ledger;
use crate::model::{BookingStatus, EventId, Occurrence, PersonId, RoomId};
use crate::reference::{BlockCode, ReferenceTables, Slot, Weekday};

/// Longest allowed distance between start and end date, in days.
pub const MAX_SPAN_DAYS: i64 = 365;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Weekly,
    Biweekly,
}

/// The repeat rule of a recurring booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub frequency: Frequency,
    #[serde(default)]
    pub weekdays: BTreeSet<Weekday>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub block: Option<BlockCode>,
}

impl RecurrenceRule {
    /// Check structural limits and return the rule's block.
    pub fn validate(&self, tables: &ReferenceTables) -> Result<BlockCode, ValidationError> {
        if self.end_date < self.start_date {
            return Err(ValidationError::EndBeforeStart {
                start: self.start_date,
                end: self.end_date,
            });
        }
        let days = (self.end_date - self.start_date).num_days();
        if days > MAX_SPAN_DAYS {
            return Err(ValidationError::SpanTooLong {
                days,
                max: MAX_SPAN_DAYS,
            });
        }
        if self.weekdays.is_empty() {
            return Err(ValidationError::NoWeekdays);
        }
        let block = self.block.ok_or(ValidationError::NoBlock)?;
        if !tables.contains(block) {
            return Err(ValidationError::UnknownBlock(block));
        }
        Ok(block)
    }

    /// Lazily walk the dates this rule selects, capped at one year from the
    /// start date. Calling it again restarts the walk.
    pub fn dates(&self) -> CandidateDates {
        let cap = self
            .start_date
            .checked_add_days(Days::new(MAX_SPAN_DAYS as u64))
            .unwrap_or(NaiveDate::MAX);
        CandidateDates {
            frequency: self.frequency,
            weekdays: self.weekdays.clone(),
            start: self.start_date,
            cursor: Some(self.start_date),
            last: self.end_date.min(cap),
        }
    }
}

/// Iterator over the dates selected by a [`RecurrenceRule`], in order.
#[derive(Debug, Clone)]
pub struct CandidateDates {
    frequency: Frequency,
    weekdays: BTreeSet<Weekday>,
    start: NaiveDate,
    cursor: Option<NaiveDate>,
    last: NaiveDate,
}

impl CandidateDates {
    fn selects(&self, date: NaiveDate) -> bool {
        let on_weekday = Weekday::of_date(date).is_some_and(|d| self.weekdays.contains(&d));
        match self.frequency {
            Frequency::Weekly => on_weekday,
            Frequency::Biweekly => {
                let week = (date - self.start).num_days() / 7;
                on_weekday && week % 2 == 0
            }
        }
    }
}

impl Iterator for CandidateDates {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<NaiveDate> {
        while let Some(date) = self.cursor {
            if date > self.last {
                self.cursor = None;
                return None;
            }
            self.cursor = date.succ_opt();
            if self.selects(date) {
                return Some(date);
            }
        }
        None
    }
}

/// A recurring booking as it lives in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurringEvent {
    pub id: EventId,
    pub room: RoomId,
    pub creator: PersonId,
    pub title: String,
    pub rule: RecurrenceRule,
    #[serde(default)]
    pub status: BookingStatus,
}

/// A user's request for a new recurring booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRequest {
    pub room: RoomId,
    pub creator: PersonId,
    pub title: String,
    pub rule: RecurrenceRule,
}

/// The event and occurrences written by a successful expansion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedSeries {
    pub event: RecurringEvent,
    pub occurrences: Vec<Occurrence>,
}

/// Validate a rule and list the dates it would book, without touching any ledger.
pub fn preview(rule: &RecurrenceRule, tables: &ReferenceTables) -> Result<Vec<NaiveDate>, ValidationError> {
    rule.validate(tables)?;
    let dates: Vec<NaiveDate> = rule.dates().collect();
    if dates.is_empty() {
        return Err(ValidationError::NoDates {
            start: rule.start_date,
            end: rule.end_date,
        });
    }
    Ok(dates)
}

/// Expand a request into occurrences and commit them, all or nothing.
///
/// # Errors
/// - [`ExpansionError::Validation`] if the rule breaks a structural limit or
///   selects no date.
/// - [`ExpansionError::Conflict`] listing every conflicting date if any
///   candidate is taken; the ledger is left untouched.
/// - [`ExpansionError::EventIdsExhausted`] if the ledger already holds event
///   id `u32::MAX`.
pub fn expand_and_commit(
    ledger: &mut Ledger,
    request: EventRequest,
) -> Result<CommittedSeries, ExpansionError> {
    expand_and_commit_with(
        ledger,
        request,
        ReferenceTables::standard(),
        &CancelToken::new(),
    )
}

/// [`expand_and_commit`] with an explicit block table and a cancellation token
/// checked before each candidate date.
pub fn expand_and_commit_with(
    ledger: &mut Ledger,
    request: EventRequest,
    tables: &ReferenceTables,
    cancel: &CancelToken,
) -> Result<CommittedSeries, ExpansionError> {
    let block = request.rule.validate(tables)?;
    let event_id = ledger.next_event_id().ok_or(ExpansionError::EventIdsExhausted)?;

    let mut occurrences = Vec::new();
    let mut conflicts = Vec::new();

    for date in request.rule.dates() {
        if cancel.is_cancelled() {
            debug!(room = %request.room, "expansion cancelled");
            return Err(ExpansionError::Cancelled);
        }
        // `dates` never yields Sundays; the grid has no Sunday column.
        let Some(weekday) = Weekday::of_date(date) else {
            continue;
        };
        let scope = Scope::dated(ledger, date);
        let found = find_conflicts(&*ledger, request.room, Slot::new(weekday, block), &scope);
        conflicts.extend(found.into_iter().map(|existing| Conflict {
            room: request.room,
            requested: Placement::Dated { date, block },
            existing,
        }));
        occurrences.push(Occurrence {
            event: event_id,
            room: request.room,
            date,
            block,
            exception: None,
        });
    }

    if occurrences.is_empty() {
        return Err(ValidationError::NoDates {
            start: request.rule.start_date,
            end: request.rule.end_date,
        }
        .into());
    }

    if !conflicts.is_empty() {
        warn!(
            room = %request.room,
            candidates = occurrences.len(),
            conflicts = conflicts.len(),
            "recurring booking rejected"
        );
        return Err(ConflictError { conflicts }.into());
    }

    let event = RecurringEvent {
        id: event_id,
        room: request.room,
        creator: request.creator,
        title: request.title,
        rule: request.rule,
        status: BookingStatus::Confirmed,
    };
    ledger.commit_series(event.clone(), occurrences.clone())?;
    debug!(event = %event.id, occurrences = occurrences.len(), "recurring booking committed");

    Ok(CommittedSeries { event, occurrences })
}
