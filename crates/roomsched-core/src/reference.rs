//! Weekday, shift and time block reference tables.
//!
//! The time grid is fixed: six weekdays (Monday to Saturday) and a small set of
//! atomic time blocks grouped into three shifts. The standard table is built
//! once per process and handed out by reference; a custom table can be loaded
//! from configuration and is validated before use.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{Datelike, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// A schedulable weekday. Sunday is not part of the grid.
///
/// Serialized as its external numeric code (`1` = Monday … `6` = Saturday),
/// the same digit that appears in schedule codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Weekday {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
}

impl Weekday {
    /// All weekdays in calendar order.
    pub const ALL: [Weekday; 6] = [
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
        Weekday::Sat,
    ];

    /// External numeric code (1–6).
    pub fn code(self) -> u8 {
        match self {
            Weekday::Mon => 1,
            Weekday::Tue => 2,
            Weekday::Wed => 3,
            Weekday::Thu => 4,
            Weekday::Fri => 5,
            Weekday::Sat => 6,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Weekday::Mon),
            2 => Some(Weekday::Tue),
            3 => Some(Weekday::Wed),
            4 => Some(Weekday::Thu),
            5 => Some(Weekday::Fri),
            6 => Some(Weekday::Sat),
            _ => None,
        }
    }

    /// Map a schedule-code digit to a weekday.
    pub fn from_digit(digit: char) -> Option<Self> {
        digit
            .to_digit(10)
            .and_then(|d| Self::from_code(d as u8))
    }

    /// The grid weekday of a calendar date, or `None` on Sundays.
    pub fn of_date(date: NaiveDate) -> Option<Self> {
        match date.weekday() {
            chrono::Weekday::Mon => Some(Weekday::Mon),
            chrono::Weekday::Tue => Some(Weekday::Tue),
            chrono::Weekday::Wed => Some(Weekday::Wed),
            chrono::Weekday::Thu => Some(Weekday::Thu),
            chrono::Weekday::Fri => Some(Weekday::Fri),
            chrono::Weekday::Sat => Some(Weekday::Sat),
            chrono::Weekday::Sun => None,
        }
    }

    pub fn to_chrono(self) -> chrono::Weekday {
        match self {
            Weekday::Mon => chrono::Weekday::Mon,
            Weekday::Tue => chrono::Weekday::Tue,
            Weekday::Wed => chrono::Weekday::Wed,
            Weekday::Thu => chrono::Weekday::Thu,
            Weekday::Fri => chrono::Weekday::Fri,
            Weekday::Sat => chrono::Weekday::Sat,
        }
    }
}

impl From<Weekday> for u8 {
    fn from(day: Weekday) -> Self {
        day.code()
    }
}

impl TryFrom<u8> for Weekday {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Weekday::from_code(code).ok_or_else(|| format!("invalid weekday code {code}, expected 1-6"))
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Weekday::Mon => "Mon",
            Weekday::Tue => "Tue",
            Weekday::Wed => "Wed",
            Weekday::Thu => "Thu",
            Weekday::Fri => "Fri",
            Weekday::Sat => "Sat",
        };
        f.write_str(name)
    }
}

/// One of the three daily shifts. Ordering follows the day: morning first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Shift {
    Morning,
    Afternoon,
    Night,
}

impl Shift {
    pub const ALL: [Shift; 3] = [Shift::Morning, Shift::Afternoon, Shift::Night];

    /// The letter used in schedule codes and block codes.
    pub fn letter(self) -> char {
        match self {
            Shift::Morning => 'M',
            Shift::Afternoon => 'T',
            Shift::Night => 'N',
        }
    }

    pub fn from_letter(letter: char) -> Option<Self> {
        match letter {
            'M' => Some(Shift::Morning),
            'T' => Some(Shift::Afternoon),
            'N' => Some(Shift::Night),
            _ => None,
        }
    }
}

/// Identifier of an atomic time block: shift letter plus 1-based ordinal (`"T4"`).
///
/// The derived ordering is the global block order: every morning block sorts
/// before every afternoon block, and so on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BlockCode {
    shift: Shift,
    ordinal: u8,
}

impl BlockCode {
    /// Build a block code. Ordinals are single digits, 1 through 9.
    pub const fn new(shift: Shift, ordinal: u8) -> Option<Self> {
        if ordinal >= 1 && ordinal <= 9 {
            Some(Self { shift, ordinal })
        } else {
            None
        }
    }

    pub fn shift(self) -> Shift {
        self.shift
    }

    pub fn ordinal(self) -> u8 {
        self.ordinal
    }
}

impl fmt::Display for BlockCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.shift.letter(), self.ordinal)
    }
}

impl FromStr for BlockCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let (Some(letter), Some(digit), None) = (chars.next(), chars.next(), chars.next()) else {
            return Err(format!("invalid block code {s:?}"));
        };
        let shift = Shift::from_letter(letter).ok_or_else(|| format!("invalid shift in block code {s:?}"))?;
        digit
            .to_digit(10)
            .and_then(|d| BlockCode::new(shift, d as u8))
            .ok_or_else(|| format!("invalid ordinal in block code {s:?}"))
    }
}

impl TryFrom<String> for BlockCode {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<BlockCode> for String {
    fn from(code: BlockCode) -> Self {
        code.to_string()
    }
}

/// An atomic time block with its wall-clock span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBlock {
    pub code: BlockCode,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

/// A weekly grid cell: one weekday, one time block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Slot {
    pub weekday: Weekday,
    pub block: BlockCode,
}

impl Slot {
    pub fn new(weekday: Weekday, block: BlockCode) -> Self {
        Self { weekday, block }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.weekday, self.block)
    }
}

const fn clock(hour: u32, min: u32) -> NaiveTime {
    match NaiveTime::from_hms_opt(hour, min, 0) {
        Some(t) => t,
        None => panic!("invalid clock time in standard block table"),
    }
}

const fn standard(shift: Shift, ordinal: u8, start: NaiveTime, end: NaiveTime) -> TimeBlock {
    TimeBlock {
        code: BlockCode { shift, ordinal },
        start,
        end,
    }
}

const STANDARD_BLOCKS: [TimeBlock; 16] = [
    standard(Shift::Morning, 1, clock(7, 0), clock(7, 50)),
    standard(Shift::Morning, 2, clock(7, 50), clock(8, 40)),
    standard(Shift::Morning, 3, clock(8, 55), clock(9, 45)),
    standard(Shift::Morning, 4, clock(9, 45), clock(10, 35)),
    standard(Shift::Morning, 5, clock(10, 50), clock(11, 40)),
    standard(Shift::Morning, 6, clock(11, 40), clock(12, 30)),
    standard(Shift::Afternoon, 1, clock(13, 0), clock(13, 50)),
    standard(Shift::Afternoon, 2, clock(13, 50), clock(14, 40)),
    standard(Shift::Afternoon, 3, clock(14, 55), clock(15, 45)),
    standard(Shift::Afternoon, 4, clock(15, 45), clock(16, 35)),
    standard(Shift::Afternoon, 5, clock(16, 50), clock(17, 40)),
    standard(Shift::Afternoon, 6, clock(17, 40), clock(18, 30)),
    standard(Shift::Night, 1, clock(18, 45), clock(19, 35)),
    standard(Shift::Night, 2, clock(19, 35), clock(20, 25)),
    standard(Shift::Night, 3, clock(20, 35), clock(21, 25)),
    standard(Shift::Night, 4, clock(21, 25), clock(22, 15)),
];

/// Read-only lookup over the time block table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceTables {
    blocks: Vec<TimeBlock>,
}

impl ReferenceTables {
    /// The standard 16-block table (M1–M6, T1–T6, N1–N4), built once.
    pub fn standard() -> &'static ReferenceTables {
        static TABLES: OnceLock<ReferenceTables> = OnceLock::new();
        TABLES.get_or_init(|| ReferenceTables {
            blocks: STANDARD_BLOCKS.to_vec(),
        })
    }

    /// Build a custom table.
    ///
    /// Each shift that appears must number its blocks contiguously from 1, codes
    /// must be unique, and every block must start before it ends.
    pub fn from_blocks(mut blocks: Vec<TimeBlock>) -> Result<Self, ConfigError> {
        if blocks.is_empty() {
            return Err(ConfigError::InvalidBlockTable("block table is empty".to_string()));
        }
        blocks.sort_by_key(|b| b.code);

        for pair in blocks.windows(2) {
            if pair[0].code == pair[1].code {
                return Err(ConfigError::InvalidBlockTable(format!(
                    "duplicate block {}",
                    pair[0].code
                )));
            }
        }
        for block in &blocks {
            if block.start >= block.end {
                return Err(ConfigError::InvalidBlockTable(format!(
                    "block {} starts at {} but ends at {}",
                    block.code, block.start, block.end
                )));
            }
        }
        for shift in Shift::ALL {
            let ordinals: Vec<u8> = blocks
                .iter()
                .filter(|b| b.code.shift == shift)
                .map(|b| b.code.ordinal)
                .collect();
            if ordinals.iter().enumerate().any(|(i, &o)| o as usize != i + 1) {
                return Err(ConfigError::InvalidBlockTable(format!(
                    "blocks of shift {} are not numbered 1..{}",
                    shift.letter(),
                    ordinals.len()
                )));
            }
        }

        Ok(Self { blocks })
    }

    /// All blocks in global order.
    pub fn blocks(&self) -> &[TimeBlock] {
        &self.blocks
    }

    pub fn block(&self, code: BlockCode) -> Option<&TimeBlock> {
        self.blocks
            .binary_search_by_key(&code, |b| b.code)
            .ok()
            .map(|i| &self.blocks[i])
    }

    pub fn contains(&self, code: BlockCode) -> bool {
        self.block(code).is_some()
    }

    /// Number of blocks defined for a shift.
    pub fn blocks_in_shift(&self, shift: Shift) -> u8 {
        self.blocks.iter().filter(|b| b.code.shift == shift).count() as u8
    }
}

impl Default for ReferenceTables {
    fn default() -> Self {
        Self::standard().clone()
    }
}
