//! Committed bookings: term allocations, recurring events and their occurrences.
//!
//! The ledger is the single source of truth the conflict detector reads. Writes
//! happen in whole units only: [`Ledger::replace_term`] supersedes every
//! allocation of a term at once, and [`Ledger::commit_series`] writes one
//! recurring event together with all of its occurrences. Either call leaves the
//! ledger untouched when it fails.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::conflict::{Conflict, ConflictDescriptor, Placement};
use crate::error::{ConflictError, EngineError};
use crate::model::{Allocation, BookingStatus, EventId, Occurrence, RoomId, Term, TermId};
use crate::recurrence::RecurringEvent;
use crate::reference::{BlockCode, Slot, Weekday};

/// Read access to committed bookings.
///
/// Implemented by [`Ledger`] and by the matcher's run-scoped reservation map,
/// so the same conflict queries work over both.
pub trait BookingView {
    /// Allocations of `term` holding `room` at `slot`.
    fn allocations_at(&self, term: &TermId, room: RoomId, slot: Slot) -> Vec<Allocation>;

    /// Occurrences holding `room` on `date` at `block` that are not cancelled.
    fn occurrences_at(&self, room: RoomId, date: NaiveDate, block: BlockCode) -> Vec<Occurrence>;

    /// Calendar bounds of a term, if known to this view.
    fn term(&self, _id: &TermId) -> Option<Term> {
        None
    }

    /// Active occurrences of `room` at `slot`'s weekday and block between two
    /// dates (inclusive).
    fn occurrences_between(
        &self,
        _room: RoomId,
        _slot: Slot,
        _from: NaiveDate,
        _to: NaiveDate,
    ) -> Vec<Occurrence> {
        Vec::new()
    }
}

type AllocationKey = (TermId, RoomId, Slot);
type OccurrenceKey = (RoomId, NaiveDate, BlockCode);

/// In-memory committed tables.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    terms: BTreeMap<TermId, Term>,
    allocations: BTreeMap<AllocationKey, Allocation>,
    events: BTreeMap<EventId, RecurringEvent>,
    occurrences: BTreeMap<OccurrenceKey, Occurrence>,
}

/// Serializable image of a [`Ledger`], used to hand committed rows to the
/// persistence layer and to load them back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    #[serde(default)]
    pub terms: Vec<Term>,
    #[serde(default)]
    pub allocations: Vec<Allocation>,
    #[serde(default)]
    pub events: Vec<RecurringEvent>,
    #[serde(default)]
    pub occurrences: Vec<Occurrence>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a term. Terms are keyed by id; re-adding an id replaces its dates.
    pub fn add_term(&mut self, term: Term) {
        self.terms.insert(term.id.clone(), term);
    }

    pub fn terms(&self) -> impl Iterator<Item = &Term> {
        self.terms.values()
    }

    /// Every term whose date range contains `date`, by term id. Terms may
    /// overlap, so there can be more than one.
    pub fn terms_on(&self, date: NaiveDate) -> impl Iterator<Item = &Term> + '_ {
        self.terms.values().filter(move |t| t.contains(date))
    }

    /// Committed allocations of one term, ordered by room then slot.
    pub fn allocations(&self, term: &TermId) -> impl Iterator<Item = &Allocation> + '_ {
        let term = term.clone();
        self.allocations
            .iter()
            .filter(move |((t, _, _), _)| *t == term)
            .map(|(_, a)| a)
    }

    /// Replace every allocation of `term` with `rows`.
    ///
    /// The term must be registered with [`Ledger::add_term`] first: dated
    /// bookings find weekly allocations through the term calendar, so rows of
    /// an unregistered term would be invisible to them. Fails without
    /// touching the ledger if the term is unknown, if `rows` contains two
    /// allocations for the same (room, slot), or a row belonging to another
    /// term.
    pub fn replace_term(&mut self, term: &TermId, rows: Vec<Allocation>) -> Result<usize, EngineError> {
        if !self.terms.contains_key(term) {
            return Err(EngineError::UnknownTerm(term.clone()));
        }

        let mut incoming: BTreeMap<AllocationKey, Allocation> = BTreeMap::new();
        let mut conflicts = Vec::new();

        for row in rows {
            if row.term != *term {
                conflicts.push(Conflict {
                    room: row.room,
                    requested: Placement::Weekly { slot: row.slot() },
                    existing: ConflictDescriptor::Allocation(row),
                });
                continue;
            }
            let key = (row.term.clone(), row.room, row.slot());
            if let Some(existing) = incoming.get(&key) {
                conflicts.push(Conflict {
                    room: row.room,
                    requested: Placement::Weekly { slot: row.slot() },
                    existing: ConflictDescriptor::Allocation(existing.clone()),
                });
                continue;
            }
            incoming.insert(key, row);
        }

        if !conflicts.is_empty() {
            return Err(ConflictError { conflicts }.into());
        }

        self.allocations.retain(|(t, _, _), _| t != term);
        let written = incoming.len();
        self.allocations.extend(incoming);
        info!(term = %term, rows = written, "term allocations replaced");
        Ok(written)
    }

    /// The id the next committed series will receive, or `None` once the
    /// highest id in the ledger is `u32::MAX`.
    pub fn next_event_id(&self) -> Option<EventId> {
        match self.events.keys().next_back() {
            Some(last) => last.0.checked_add(1).map(EventId),
            None => Some(EventId(1)),
        }
    }

    pub fn event(&self, id: EventId) -> Option<&RecurringEvent> {
        self.events.get(&id)
    }

    pub fn events(&self) -> impl Iterator<Item = &RecurringEvent> {
        self.events.values()
    }

    /// Occurrences of one event in date order.
    pub fn occurrences_of(&self, id: EventId) -> Vec<&Occurrence> {
        let mut found: Vec<&Occurrence> = self.occurrences.values().filter(|o| o.event == id).collect();
        found.sort_by_key(|o| (o.date, o.block));
        found
    }

    /// Write one recurring event and all of its occurrences.
    ///
    /// An active occurrence already holding one of the keys, or two rows of
    /// the batch sharing a key, rejects the whole batch. Cancelled rows at a
    /// requested key are replaced.
    pub fn commit_series(
        &mut self,
        event: RecurringEvent,
        occurrences: Vec<Occurrence>,
    ) -> Result<(), ConflictError> {
        let mut batch: BTreeMap<OccurrenceKey, Occurrence> = BTreeMap::new();
        let mut conflicts = Vec::new();

        for occ in occurrences {
            let key = (occ.room, occ.date, occ.block);
            let requested = Placement::Dated {
                date: occ.date,
                block: occ.block,
            };
            if let Some(existing) = self.occurrences.get(&key).filter(|o| self.is_active(o)) {
                conflicts.push(Conflict {
                    room: occ.room,
                    requested,
                    existing: ConflictDescriptor::Occurrence(existing.clone()),
                });
            } else if let Some(existing) = batch.get(&key) {
                conflicts.push(Conflict {
                    room: occ.room,
                    requested,
                    existing: ConflictDescriptor::Occurrence(existing.clone()),
                });
            } else {
                batch.insert(key, Occurrence { event: event.id, ..occ });
            }
        }

        if !conflicts.is_empty() {
            return Err(ConflictError { conflicts });
        }

        debug!(event = %event.id, occurrences = batch.len(), "series committed");
        self.events.insert(event.id, event);
        self.occurrences.extend(batch);
        Ok(())
    }

    /// Cancel a single dated occurrence. Returns `false` if no occurrence
    /// holds that key.
    pub fn cancel_occurrence(&mut self, room: RoomId, date: NaiveDate, block: BlockCode) -> bool {
        match self.occurrences.get_mut(&(room, date, block)) {
            Some(occ) => {
                occ.exception = Some(BookingStatus::Cancelled);
                true
            }
            None => false,
        }
    }

    /// Cancel a whole series. Occurrences without their own exception follow.
    pub fn cancel_event(&mut self, id: EventId) -> bool {
        match self.events.get_mut(&id) {
            Some(event) => {
                event.status = BookingStatus::Cancelled;
                true
            }
            None => false,
        }
    }

    fn is_active(&self, occ: &Occurrence) -> bool {
        let parent = self
            .events
            .get(&occ.event)
            .map(|e| e.status)
            .unwrap_or_default();
        occ.status(parent) == BookingStatus::Confirmed
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            terms: self.terms.values().cloned().collect(),
            allocations: self.allocations.values().cloned().collect(),
            events: self.events.values().cloned().collect(),
            occurrences: self.occurrences.values().cloned().collect(),
        }
    }

    /// Rebuild a ledger, enforcing the same uniqueness rules as live commits.
    pub fn from_snapshot(snapshot: LedgerSnapshot) -> Result<Self, EngineError> {
        let mut ledger = Ledger::new();
        for term in snapshot.terms {
            ledger.add_term(term);
        }

        let mut by_term: BTreeMap<TermId, Vec<Allocation>> = BTreeMap::new();
        for row in snapshot.allocations {
            by_term.entry(row.term.clone()).or_default().push(row);
        }
        for (term, rows) in by_term {
            ledger.replace_term(&term, rows)?;
        }

        for event in snapshot.events {
            if ledger.events.contains_key(&event.id) {
                return Err(EngineError::DuplicateId {
                    kind: "event",
                    id: event.id.to_string(),
                });
            }
            ledger.events.insert(event.id, event);
        }
        for occ in snapshot.occurrences {
            let key = (occ.room, occ.date, occ.block);
            if let Some(existing) = ledger.occurrences.get(&key) {
                return Err(ConflictError {
                    conflicts: vec![Conflict {
                        room: occ.room,
                        requested: Placement::Dated {
                            date: occ.date,
                            block: occ.block,
                        },
                        existing: ConflictDescriptor::Occurrence(existing.clone()),
                    }],
                }
                .into());
            }
            ledger.occurrences.insert(key, occ);
        }
        Ok(ledger)
    }

    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let snapshot: LedgerSnapshot = serde_json::from_str(json)?;
        Self::from_snapshot(snapshot)
    }
}

impl BookingView for Ledger {
    fn allocations_at(&self, term: &TermId, room: RoomId, slot: Slot) -> Vec<Allocation> {
        self.allocations
            .get(&(term.clone(), room, slot))
            .cloned()
            .into_iter()
            .collect()
    }

    fn occurrences_at(&self, room: RoomId, date: NaiveDate, block: BlockCode) -> Vec<Occurrence> {
        self.occurrences
            .get(&(room, date, block))
            .filter(|o| self.is_active(o))
            .cloned()
            .into_iter()
            .collect()
    }

    fn term(&self, id: &TermId) -> Option<Term> {
        self.terms.get(id).cloned()
    }

    fn occurrences_between(
        &self,
        room: RoomId,
        slot: Slot,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Vec<Occurrence> {
        self.occurrences
            .iter()
            .filter(|((r, date, block), _)| {
                *r == room
                    && *block == slot.block
                    && from <= *date
                    && *date <= to
                    && Weekday::of_date(*date) == Some(slot.weekday)
            })
            .map(|(_, o)| o)
            .filter(|o| self.is_active(o))
            .cloned()
            .collect()
    }
}
