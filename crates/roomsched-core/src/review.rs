//! Records for manual review.
//!
//! The notification layer consumes a flat list of [`ReviewItem`]s: demands the
//! matcher could not place, requests rejected for conflicts, and weekly
//! allocations that collide with ad-hoc occurrences already on the calendar.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::allocation::{AllocationRunResult, UnallocatedReason};
use crate::conflict::{find_conflicts, Conflict, ConflictDescriptor, Scope};
use crate::error::ConflictError;
use crate::ledger::Ledger;
use crate::model::{Allocation, DemandId, Occurrence, TermId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReviewItem {
    Unallocated {
        term: TermId,
        demand: DemandId,
        reason: UnallocatedReason,
    },
    Rejected {
        conflict: Conflict,
    },
    Overlap {
        allocation: Allocation,
        occurrence: Occurrence,
    },
}

impl ReviewItem {
    /// Date the item concerns, if it is tied to one.
    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            ReviewItem::Unallocated { .. } => None,
            ReviewItem::Rejected { conflict } => conflict.date(),
            ReviewItem::Overlap { occurrence, .. } => Some(occurrence.date),
        }
    }
}

/// One item per unplaced demand, in processing order.
pub fn from_run(result: &AllocationRunResult) -> Vec<ReviewItem> {
    result
        .unallocated()
        .map(|(demand, reason)| ReviewItem::Unallocated {
            term: result.term.clone(),
            demand,
            reason: reason.clone(),
        })
        .collect()
}

/// One item per conflict of a rejected request.
pub fn from_conflicts(error: &ConflictError) -> Vec<ReviewItem> {
    error
        .conflicts
        .iter()
        .cloned()
        .map(|conflict| ReviewItem::Rejected { conflict })
        .collect()
}

/// Committed allocations of `term` that share a room and slot with an active
/// occurrence on one of the term's dates.
pub fn overlaps(ledger: &Ledger, term: &TermId) -> Vec<ReviewItem> {
    let scope = Scope::TermWithEvents(term.clone());
    let mut items = Vec::new();
    for allocation in ledger.allocations(term) {
        for found in find_conflicts(ledger, allocation.room, allocation.slot(), &scope) {
            if let ConflictDescriptor::Occurrence(occurrence) = found {
                items.push(ReviewItem::Overlap {
                    allocation: allocation.clone(),
                    occurrence,
                });
            }
        }
    }
    items
}
