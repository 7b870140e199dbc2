//! Detect bookings that already hold a room in a given slot.
//!
//! Two booking sources share one question. Term allocations hold a room for a
//! weekly slot across a whole term; occurrences hold it for one block on one
//! date. A query names the room and slot plus a scope saying which sources to
//! consult, and gets back every entity holding it, not just a yes/no.
//!
//! Queries are symmetric by construction: they look up the exact key another
//! booking of the same room, weekday and block would have been stored under.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::ledger::{BookingView, Ledger};
use crate::model::{Allocation, Occurrence, RoomId, TermId};
use crate::reference::{BlockCode, Slot};

/// Which committed sources a conflict query consults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Allocations of this term only.
    Term(TermId),
    /// Allocations of every listed term for the slot's weekday, plus active
    /// occurrences on this exact date. `terms` should be every term whose
    /// dates contain `date` (see [`Scope::dated`]), and the slot's weekday
    /// should be the date's weekday.
    Dated { terms: Vec<TermId>, date: NaiveDate },
    /// Allocations of the term plus active occurrences on any date of the
    /// term that falls on the slot's weekday.
    TermWithEvents(TermId),
}

impl Scope {
    /// Dated scope over every term of `ledger` in session on `date`.
    pub fn dated(ledger: &Ledger, date: NaiveDate) -> Self {
        Scope::Dated {
            terms: ledger.terms_on(date).map(|t| t.id.clone()).collect(),
            date,
        }
    }
}

/// An existing booking that holds the queried room and slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ConflictDescriptor {
    Allocation(Allocation),
    Occurrence(Occurrence),
}

/// What a rejected request asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Placement {
    Weekly { slot: Slot },
    Dated { date: NaiveDate, block: BlockCode },
}

/// A requested placement paired with the booking already holding it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub room: RoomId,
    pub requested: Placement,
    pub existing: ConflictDescriptor,
}

impl Conflict {
    /// Date of the rejected placement, when it was dated.
    pub fn date(&self) -> Option<NaiveDate> {
        match self.requested {
            Placement::Dated { date, .. } => Some(date),
            Placement::Weekly { .. } => None,
        }
    }
}

/// Find every committed booking holding `room` at `slot` within `scope`.
///
/// An empty result means the slot is free.
pub fn find_conflicts<V: BookingView + ?Sized>(
    view: &V,
    room: RoomId,
    slot: Slot,
    scope: &Scope,
) -> Vec<ConflictDescriptor> {
    let mut found: Vec<ConflictDescriptor> = Vec::new();

    match scope {
        Scope::Term(term) => {
            found.extend(
                view.allocations_at(term, room, slot)
                    .into_iter()
                    .map(ConflictDescriptor::Allocation),
            );
        }
        Scope::Dated { terms, date } => {
            for term in terms {
                found.extend(
                    view.allocations_at(term, room, slot)
                        .into_iter()
                        .map(ConflictDescriptor::Allocation),
                );
            }
            found.extend(
                view.occurrences_at(room, *date, slot.block)
                    .into_iter()
                    .map(ConflictDescriptor::Occurrence),
            );
        }
        Scope::TermWithEvents(term) => {
            found.extend(
                view.allocations_at(term, room, slot)
                    .into_iter()
                    .map(ConflictDescriptor::Allocation),
            );
            if let Some(bounds) = view.term(term) {
                found.extend(
                    view.occurrences_between(room, slot, bounds.starts_on, bounds.ends_on)
                        .into_iter()
                        .map(ConflictDescriptor::Occurrence),
                );
            }
        }
    }

    found
}

/// Check a whole slot set for one room, returning one [`Conflict`] per
/// holding booking, ordered by slot.
pub fn find_conflicts_many<V: BookingView + ?Sized>(
    view: &V,
    room: RoomId,
    slots: &BTreeSet<Slot>,
    scope: &Scope,
) -> Vec<Conflict> {
    slots
        .iter()
        .flat_map(|&slot| {
            find_conflicts(view, room, slot, scope)
                .into_iter()
                .map(move |existing| Conflict {
                    room,
                    requested: Placement::Weekly { slot },
                    existing,
                })
        })
        .collect()
}

/// `true` when `room` is free at every slot of the set.
pub fn is_free<V: BookingView + ?Sized>(
    view: &V,
    room: RoomId,
    slots: &BTreeSet<Slot>,
    scope: &Scope,
) -> bool {
    slots
        .iter()
        .all(|&slot| find_conflicts(view, room, slot, scope).is_empty())
}
