//! # roomsched-core
//!
//! Deterministic room scheduling for academic timetables.
//!
//! The engine places weekly course sections (demands) into rooms for a whole
//! term, books ad-hoc recurring events on concrete dates, and answers the one
//! question both of them depend on: is this room free in this slot?
//!
//! ## Modules
//!
//! - [`reference`] — Weekday / shift / time block lookup tables
//! - [`schedule_code`] — `"24M12"` → set of (weekday, block) slots
//! - [`ledger`] — Committed allocations and occurrences (the read view)
//! - [`conflict`] — Slot conflict queries over any [`ledger::BookingView`]
//! - [`recurrence`] — Recurrence rule → dated occurrences, committed atomically
//! - [`rules`] — Hard filters and soft scoring for candidate rooms
//! - [`allocation`] — Term-wide batch matcher
//! - [`availability`] — Free blocks and merged busy intervals for a room
//! - [`review`] — Records for manual review of unplaced demands and conflicts
//! - [`control`] — Term locks, cancellation and progress reporting
//! - [`config`] — Engine configuration loaded from TOML
//! - [`model`] — Shared data types
//! - [`error`] — Error types

pub mod allocation;
pub mod availability;
pub mod config;
pub mod conflict;
pub mod control;
pub mod error;
pub mod ledger;
pub mod model;
pub mod recurrence;
pub mod reference;
pub mod review;
pub mod rules;
pub mod schedule_code;

pub use allocation::{allocate, allocate_locked, allocate_with, AllocationRequest, AllocationRunResult};
pub use availability::{busy_intervals, free_blocks, BusyInterval};
pub use config::EngineConfig;
pub use conflict::{find_conflicts, Conflict, ConflictDescriptor, Scope};
pub use control::{CancelToken, Progress, TermLocks};
pub use error::{ConflictError, EngineError, ExpansionError, ParseError, ValidationError};
pub use ledger::{BookingView, Ledger, LedgerSnapshot};
pub use recurrence::{expand_and_commit, EventRequest, RecurrenceRule};
pub use reference::{BlockCode, ReferenceTables, Shift, Slot, TimeBlock, Weekday};
pub use review::ReviewItem;
pub use schedule_code::parse;
