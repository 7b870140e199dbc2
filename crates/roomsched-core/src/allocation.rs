//! Term-wide allocation matcher.
//!
//! Places every demand of a term into exactly one room for all of its weekly
//! slots, or records why it could not. The run proceeds in a fixed order
//! (largest enrollment first, then lowest demand id) so that hard-to-place
//! sections are decided first and identical inputs always give identical
//! results.
//!
//! Per demand:
//!
//! 1. Parse the schedule code. Failure → `invalid-schedule`.
//! 2. Keep rooms that pass every hard rule. None → `no-matching-room-type-or-capacity`.
//! 3. Keep rooms free at *every* required slot in this run's reservations.
//!    None → `schedule-conflict`. A demand is never split across rooms.
//! 4. Pick the best soft score; ties go to the lowest room id.
//! 5. Reserve all slots for that room at once.
//!
//! Steps 1–2 only read immutable inputs and run in parallel across demands.
//! Steps 3–5 run on one thread against a reservation map that lives for the
//! duration of the run.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::conflict::{is_free, Scope};
use crate::control::{CancelToken, Progress, TermLocks};
use crate::error::{EngineError, ValidationError};
use crate::ledger::BookingView;
use crate::model::{Allocation, Demand, DemandId, Occurrence, Room, RoomId, Term, TermId};
use crate::reference::{BlockCode, ReferenceTables, Slot};
use crate::rules::{hard_filter, score, Rule, ScoringWeights};
use crate::schedule_code::parse_with;

/// Everything one allocation run consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRequest {
    pub term: TermId,
    /// Calendar bounds of the term, for callers that register it in a ledger
    /// while committing the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dates: Option<TermDates>,
    pub demands: Vec<Demand>,
    pub rooms: Vec<Room>,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermDates {
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
}

impl AllocationRequest {
    /// The request's term with its dates, if the request carries them.
    pub fn term_record(&self) -> Option<Term> {
        self.dates.map(|d| Term {
            id: self.term.clone(),
            starts_on: d.starts_on,
            ends_on: d.ends_on,
        })
    }

    /// Reject requests with repeated demand or room ids, or term dates that
    /// end before they start.
    pub fn validate(&self) -> Result<(), EngineError> {
        if let Some(d) = self.dates {
            if d.ends_on < d.starts_on {
                return Err(ValidationError::EndBeforeStart {
                    start: d.starts_on,
                    end: d.ends_on,
                }
                .into());
            }
        }
        let mut demands = BTreeSet::new();
        for demand in &self.demands {
            if !demands.insert(demand.id) {
                return Err(EngineError::DuplicateId {
                    kind: "demand",
                    id: demand.id.to_string(),
                });
            }
        }
        let mut rooms = BTreeSet::new();
        for room in &self.rooms {
            if !rooms.insert(room.id) {
                return Err(EngineError::DuplicateId {
                    kind: "room",
                    id: room.id.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Why a demand got no room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "kebab-case")]
pub enum UnallocatedReason {
    /// Flagged as excluded from allocation.
    Excluded,
    /// The schedule code did not parse.
    InvalidSchedule { message: String },
    /// No room passes the hard rules.
    NoMatchingRoomTypeOrCapacity,
    /// Every admissible room is taken at one or more required slots.
    ScheduleConflict,
    /// The run was cancelled before this demand was reached.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DemandOutcome {
    Placed {
        room: RoomId,
        slots: Vec<Slot>,
        score: i64,
    },
    Unallocated(UnallocatedReason),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemandResult {
    pub demand: DemandId,
    #[serde(flatten)]
    pub outcome: DemandOutcome,
}

/// The outcome of one run: one entry per input demand, in processing order,
/// plus the allocation rows to persist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRunResult {
    pub term: TermId,
    pub outcomes: Vec<DemandResult>,
    pub allocations: Vec<Allocation>,
    pub cancelled: bool,
}

impl AllocationRunResult {
    pub fn outcome(&self, demand: DemandId) -> Option<&DemandOutcome> {
        self.outcomes
            .iter()
            .find(|r| r.demand == demand)
            .map(|r| &r.outcome)
    }

    /// Rows to hand to the persistence layer.
    pub fn allocations(&self) -> &[Allocation] {
        &self.allocations
    }

    pub fn placed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|r| matches!(r.outcome, DemandOutcome::Placed { .. }))
            .count()
    }

    pub fn unallocated(&self) -> impl Iterator<Item = (DemandId, &UnallocatedReason)> {
        self.outcomes.iter().filter_map(|r| match &r.outcome {
            DemandOutcome::Unallocated(reason) => Some((r.demand, reason)),
            DemandOutcome::Placed { .. } => None,
        })
    }
}

/// Optional hooks for a run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Receives one [`Progress`] per decided demand. Sending never blocks.
    pub progress: Option<std::sync::mpsc::Sender<Progress>>,
    /// Checked before each demand; once set, the remaining demands are
    /// recorded as cancelled and earlier placements are kept.
    pub cancel: Option<CancelToken>,
}

/// Slots taken earlier in the current run. Discarded with the run.
#[derive(Debug)]
struct ReservationMap {
    term: TermId,
    taken: BTreeMap<(RoomId, Slot), Allocation>,
}

impl ReservationMap {
    fn new(term: TermId) -> Self {
        Self {
            term,
            taken: BTreeMap::new(),
        }
    }

    fn reserve(&mut self, room: RoomId, slots: &BTreeSet<Slot>, demand: DemandId) -> Vec<Allocation> {
        slots
            .iter()
            .map(|&slot| {
                let row = Allocation {
                    term: self.term.clone(),
                    room,
                    weekday: slot.weekday,
                    block: slot.block,
                    demand,
                };
                self.taken.insert((room, slot), row.clone());
                row
            })
            .collect()
    }
}

impl BookingView for ReservationMap {
    fn allocations_at(&self, term: &TermId, room: RoomId, slot: Slot) -> Vec<Allocation> {
        if *term != self.term {
            return Vec::new();
        }
        self.taken.get(&(room, slot)).cloned().into_iter().collect()
    }

    fn occurrences_at(&self, _room: RoomId, _date: NaiveDate, _block: BlockCode) -> Vec<Occurrence> {
        Vec::new()
    }
}

/// Result of the read-only, parallelizable part of a decision.
enum Prepared<'a> {
    Ready {
        slots: BTreeSet<Slot>,
        candidates: Vec<&'a Room>,
    },
    Rejected(UnallocatedReason),
}

fn prepare<'a>(
    demand: &Demand,
    rooms: &'a [Room],
    rules: &[Rule],
    tables: &ReferenceTables,
) -> Prepared<'a> {
    if demand.excluded {
        return Prepared::Rejected(UnallocatedReason::Excluded);
    }
    let slots = match parse_with(tables, demand.schedule_code.as_str()) {
        Ok(slots) => slots,
        Err(e) => {
            return Prepared::Rejected(UnallocatedReason::InvalidSchedule {
                message: e.to_string(),
            })
        }
    };
    let mut candidates = hard_filter(rules, demand, rooms);
    if candidates.is_empty() {
        return Prepared::Rejected(UnallocatedReason::NoMatchingRoomTypeOrCapacity);
    }
    candidates.sort_by_key(|room| room.id);
    Prepared::Ready { slots, candidates }
}

/// Processing order: descending enrollment, then ascending demand id.
fn processing_order(demands: &[Demand]) -> Vec<&Demand> {
    let mut ordered: Vec<&Demand> = demands.iter().collect();
    ordered.sort_by(|a, b| b.enrollment.cmp(&a.enrollment).then(a.id.cmp(&b.id)));
    ordered
}

/// Run the matcher with default options.
pub fn allocate(request: &AllocationRequest, config: &EngineConfig) -> AllocationRunResult {
    allocate_with(request, config, &RunOptions::default())
}

/// Run the matcher with progress reporting and cancellation.
pub fn allocate_with(
    request: &AllocationRequest,
    config: &EngineConfig,
    options: &RunOptions,
) -> AllocationRunResult {
    let term = &request.term;
    let ordered = processing_order(&request.demands);
    let total = ordered.len();

    let prepared: Vec<Prepared<'_>> = ordered
        .par_iter()
        .map(|demand| prepare(demand, &request.rooms, &request.rules, &config.tables))
        .collect();

    let mut reservations = ReservationMap::new(term.clone());
    let mut outcomes = Vec::with_capacity(total);
    let mut allocations = Vec::new();
    let mut cancelled = false;

    for (index, (demand, prep)) in ordered.iter().zip(prepared).enumerate() {
        if !cancelled && options.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            info!(term = %term, processed = index, total, "allocation run cancelled");
            cancelled = true;
        }

        let outcome = if cancelled {
            DemandOutcome::Unallocated(UnallocatedReason::Cancelled)
        } else {
            let outcome = decide(
                demand,
                prep,
                &request.rules,
                &config.scoring,
                &mut reservations,
                &mut allocations,
            );
            if let Some(tx) = &options.progress {
                // A dropped receiver only means nobody is watching.
                let _ = tx.send(Progress {
                    processed: index + 1,
                    total,
                });
            }
            outcome
        };

        outcomes.push(DemandResult {
            demand: demand.id,
            outcome,
        });
    }

    let result = AllocationRunResult {
        term: term.clone(),
        outcomes,
        allocations,
        cancelled,
    };
    info!(
        term = %term,
        demands = total,
        placed = result.placed_count(),
        rows = result.allocations.len(),
        "allocation run finished"
    );
    result
}

fn decide(
    demand: &Demand,
    prep: Prepared<'_>,
    rules: &[Rule],
    weights: &ScoringWeights,
    reservations: &mut ReservationMap,
    allocations: &mut Vec<Allocation>,
) -> DemandOutcome {
    let (slots, candidates) = match prep {
        Prepared::Ready { slots, candidates } => (slots, candidates),
        Prepared::Rejected(UnallocatedReason::Excluded) => {
            debug!(demand = %demand.id, "demand excluded from allocation");
            return DemandOutcome::Unallocated(UnallocatedReason::Excluded);
        }
        Prepared::Rejected(reason) => {
            warn!(demand = %demand.id, ?reason, "demand rejected before matching");
            return DemandOutcome::Unallocated(reason);
        }
    };

    let scope = Scope::Term(reservations.term.clone());
    let mut best: Option<(&Room, i64)> = None;
    // Candidates are sorted by id, so a strict comparison keeps the lowest id on ties.
    for room in candidates {
        if !is_free(&*reservations, room.id, &slots, &scope) {
            continue;
        }
        let points = score(rules, weights, demand, room);
        if best.is_none_or(|(_, top)| points > top) {
            best = Some((room, points));
        }
    }

    let Some((room, points)) = best else {
        warn!(demand = %demand.id, "every admissible room is taken");
        return DemandOutcome::Unallocated(UnallocatedReason::ScheduleConflict);
    };

    allocations.extend(reservations.reserve(room.id, &slots, demand.id));
    debug!(demand = %demand.id, room = %room.id, score = points, slots = slots.len(), "demand placed");
    DemandOutcome::Placed {
        room: room.id,
        slots: slots.into_iter().collect(),
        score: points,
    }
}

/// Run the matcher while holding the advisory lock for the request's term.
///
/// Fails with [`EngineError::TermLocked`] if another run for the same term is
/// in flight, or [`EngineError::DuplicateId`] for malformed input.
pub fn allocate_locked(
    locks: &TermLocks,
    request: &AllocationRequest,
    config: &EngineConfig,
    options: &RunOptions,
) -> Result<AllocationRunResult, EngineError> {
    request.validate()?;
    let _guard = locks.try_lock(&request.term)?;
    Ok(allocate_with(request, config, options))
}
