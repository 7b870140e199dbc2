//! Error types for roomsched-core operations.

use chrono::NaiveDate;
use thiserror::Error;

use crate::conflict::Conflict;
use crate::model::TermId;
use crate::reference::BlockCode;

/// A malformed schedule code. Every variant carries the offending input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty schedule code")]
    Empty,

    #[error("schedule code {code:?} has no weekday digits")]
    MissingWeekdays { code: String },

    #[error("schedule code {code:?} has no shift letter")]
    MissingShift { code: String },

    #[error("invalid shift letter {letter:?} in schedule code {code:?}, expected M, T or N")]
    InvalidShift { code: String, letter: char },

    #[error("invalid weekday digit {digit:?} in schedule code {code:?}, expected 1-6")]
    InvalidWeekday { code: String, digit: char },

    #[error("schedule code {code:?} has no block digits")]
    MissingBlocks { code: String },

    #[error("block {shift}{digit} in schedule code {code:?} does not exist")]
    InvalidBlock { code: String, shift: char, digit: char },

    #[error("schedule code {code:?} names more than one shift")]
    MultipleShifts { code: String },

    #[error("unexpected character {ch:?} at position {position} in schedule code {code:?}")]
    UnexpectedCharacter { code: String, ch: char, position: usize },
}

/// One or more requested slots are already taken.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{} conflicting booking(s)", conflicts.len())]
pub struct ConflictError {
    pub conflicts: Vec<Conflict>,
}

impl ConflictError {
    /// Distinct dates involved in the conflicts, ascending.
    pub fn dates(&self) -> Vec<NaiveDate> {
        let mut dates: Vec<NaiveDate> = self.conflicts.iter().filter_map(Conflict::date).collect();
        dates.sort();
        dates.dedup();
        dates
    }
}

/// A recurrence rule that breaks a structural limit.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("end date {end} is before start date {start}")]
    EndBeforeStart { start: NaiveDate, end: NaiveDate },

    #[error("recurrence spans {days} days, the limit is {max}")]
    SpanTooLong { days: i64, max: i64 },

    #[error("recurrence has no weekdays")]
    NoWeekdays,

    #[error("recurrence has no time block")]
    NoBlock,

    #[error("unknown time block {0}")]
    UnknownBlock(BlockCode),

    #[error("recurrence yields no dates between {start} and {end}")]
    NoDates { start: NaiveDate, end: NaiveDate },
}

/// Why a recurring series was not created.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpansionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error("expansion cancelled")]
    Cancelled,

    #[error("no event id left to assign")]
    EventIdsExhausted,
}

/// Configuration loading and validation failures.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("invalid block table: {0}")]
    InvalidBlockTable(String),
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid ledger snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),

    #[error("term {0} is not registered in the ledger")]
    UnknownTerm(TermId),

    #[error("an allocation run for term {0} is already in progress")]
    TermLocked(TermId),

    #[error("duplicate {kind} id {id}")]
    DuplicateId { kind: &'static str, id: String },
}

pub type Result<T> = std::result::Result<T, EngineError>;
