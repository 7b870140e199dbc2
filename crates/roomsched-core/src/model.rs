//! Shared data types: identifiers, rooms, demands, terms and committed bookings.

use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::reference::{BlockCode, Slot, Weekday};
use crate::schedule_code::ScheduleCode;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

numeric_id!(
    /// Room identifier. Lower ids win score ties.
    RoomId
);
numeric_id!(
    /// Course section identifier. Lower ids go first among equal enrollments.
    DemandId
);
numeric_id!(
    /// Recurring event identifier, assigned by the ledger on commit.
    EventId
);

/// Academic term identifier, e.g. `"2026.1"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TermId(pub String);

impl TermId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for TermId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of a professor or of a booking's creator.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonId(pub String);

impl PersonId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An academic term and the calendar dates it covers (inclusive).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
    pub id: TermId,
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
}

impl Term {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.starts_on <= date && date <= self.ends_on
    }
}

/// A physical room. Read-only to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    #[serde(default)]
    pub name: String,
    pub capacity: u32,
    #[serde(default)]
    pub floor: i32,
    pub room_type: String,
    #[serde(default)]
    pub characteristics: BTreeSet<String>,
}

impl Room {
    pub fn new(id: u32, room_type: impl Into<String>, capacity: u32) -> Self {
        Self {
            id: RoomId(id),
            name: String::new(),
            capacity,
            floor: 0,
            room_type: room_type.into(),
            characteristics: BTreeSet::new(),
        }
    }

    pub fn with_floor(mut self, floor: i32) -> Self {
        self.floor = floor;
        self
    }

    pub fn with_characteristic(mut self, tag: impl Into<String>) -> Self {
        self.characteristics.insert(tag.into());
        self
    }

    pub fn has_characteristic(&self, tag: &str) -> bool {
        self.characteristics.contains(tag)
    }
}

/// A course section that needs one room for a weekly pattern over a term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Demand {
    pub id: DemandId,
    pub enrollment: u32,
    #[serde(default)]
    pub room_type: Option<String>,
    pub schedule_code: ScheduleCode,
    /// Sections flagged by the administrator are skipped by the matcher.
    #[serde(default)]
    pub excluded: bool,
    pub professor: PersonId,
}

impl Demand {
    pub fn new(
        id: u32,
        enrollment: u32,
        schedule_code: impl Into<String>,
        professor: impl Into<String>,
    ) -> Self {
        Self {
            id: DemandId(id),
            enrollment,
            room_type: None,
            schedule_code: ScheduleCode::new(schedule_code),
            excluded: false,
            professor: PersonId::new(professor),
        }
    }

    pub fn with_room_type(mut self, room_type: impl Into<String>) -> Self {
        self.room_type = Some(room_type.into());
        self
    }

    pub fn excluded(mut self) -> Self {
        self.excluded = true;
        self
    }
}

/// A committed binding of a demand to a room for one weekly slot of a term.
///
/// Unique on (room, weekday, block, term).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Allocation {
    pub term: TermId,
    pub room: RoomId,
    pub weekday: Weekday,
    pub block: BlockCode,
    pub demand: DemandId,
}

impl Allocation {
    pub fn slot(&self) -> Slot {
        Slot::new(self.weekday, self.block)
    }
}

/// Status of a recurring event, or the per-date exception on one occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    #[default]
    Confirmed,
    Cancelled,
}

/// One dated instance of a recurring event.
///
/// Unique on (room, date, block) across every event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    pub event: EventId,
    pub room: RoomId,
    pub date: NaiveDate,
    pub block: BlockCode,
    /// Overrides the parent event's status for this date only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<BookingStatus>,
}

impl Occurrence {
    /// Effective status given the parent's status.
    pub fn status(&self, parent: BookingStatus) -> BookingStatus {
        self.exception.unwrap_or(parent)
    }
}
