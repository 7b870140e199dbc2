//! Schedule code parser — converts compact weekly patterns into grid slots.
//!
//! A schedule code is `<weekday-digits><shift-letter><block-digits>`:
//!
//! - `"24M12"` → Tuesday and Thursday, morning blocks 1 and 2
//! - `"35T4"` → Wednesday and Friday, afternoon block 4
//!
//! The result is the Cartesian product of the weekday set and the block set.
//! Repeated digits collapse. Exactly one shift letter is allowed; codes that
//! name a second shift (`"2M12T3"`) are rejected rather than split, since the
//! format has no separator between groups.
//!
//! Parsing is strict: no whitespace trimming, no lowercase shift letters.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;
use crate::reference::{BlockCode, ReferenceTables, Shift, Slot, Weekday};

/// Parse a schedule code against the standard reference tables.
///
/// # Examples
///
/// ```
/// use roomsched_core::{parse, Slot, Weekday};
///
/// let slots = parse("24M12").unwrap();
/// assert_eq!(slots.len(), 4);
/// assert!(slots.contains(&Slot::new(Weekday::Thu, "M2".parse().unwrap())));
/// assert!(parse("2X1").is_err());
/// ```
pub fn parse(code: &str) -> Result<BTreeSet<Slot>, ParseError> {
    parse_with(ReferenceTables::standard(), code)
}

/// Parse a schedule code against a specific block table.
pub fn parse_with(tables: &ReferenceTables, code: &str) -> Result<BTreeSet<Slot>, ParseError> {
    if code.is_empty() {
        return Err(ParseError::Empty);
    }

    // Split at the first non-digit: weekday group, shift letter, block group.
    let shift_pos = code
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i);
    let Some(shift_pos) = shift_pos else {
        return Err(ParseError::MissingShift {
            code: code.to_string(),
        });
    };

    let weekday_digits = &code[..shift_pos];
    let mut rest = code[shift_pos..].chars();
    // shift_pos points at a char, so `next` always yields it.
    let letter = rest.next().unwrap_or_default();
    let block_digits = rest.as_str();
    let block_offset = shift_pos + letter.len_utf8();

    let shift = Shift::from_letter(letter).ok_or_else(|| ParseError::InvalidShift {
        code: code.to_string(),
        letter,
    })?;

    if weekday_digits.is_empty() {
        return Err(ParseError::MissingWeekdays {
            code: code.to_string(),
        });
    }

    let mut weekdays = BTreeSet::new();
    for digit in weekday_digits.chars() {
        let day = Weekday::from_digit(digit).ok_or_else(|| ParseError::InvalidWeekday {
            code: code.to_string(),
            digit,
        })?;
        weekdays.insert(day);
    }

    let mut blocks = BTreeSet::new();
    for (i, ch) in block_digits.char_indices() {
        if !ch.is_ascii_digit() {
            if Shift::from_letter(ch).is_some() {
                return Err(ParseError::MultipleShifts {
                    code: code.to_string(),
                });
            }
            return Err(ParseError::UnexpectedCharacter {
                code: code.to_string(),
                ch,
                position: block_offset + i,
            });
        }
        let block = ch
            .to_digit(10)
            .and_then(|d| BlockCode::new(shift, d as u8))
            .filter(|b| tables.contains(*b))
            .ok_or_else(|| ParseError::InvalidBlock {
                code: code.to_string(),
                shift: letter,
                digit: ch,
            })?;
        blocks.insert(block);
    }

    if blocks.is_empty() {
        return Err(ParseError::MissingBlocks {
            code: code.to_string(),
        });
    }

    Ok(weekdays
        .iter()
        .flat_map(|&day| blocks.iter().map(move |&block| Slot::new(day, block)))
        .collect())
}

/// Render the canonical schedule code for a slot set.
///
/// Returns `None` unless the set is a non-empty single-shift Cartesian
/// product, i.e. exactly what [`parse`] can produce.
pub fn render(slots: &BTreeSet<Slot>) -> Option<String> {
    let first = slots.iter().next()?;
    let shift = first.block.shift();

    let weekdays: BTreeSet<Weekday> = slots.iter().map(|s| s.weekday).collect();
    let blocks: BTreeSet<BlockCode> = slots.iter().map(|s| s.block).collect();

    if blocks.iter().any(|b| b.shift() != shift) || weekdays.len() * blocks.len() != slots.len() {
        return None;
    }

    let mut code: String = weekdays.iter().map(|d| d.code().to_string()).collect();
    code.push(shift.letter());
    code.extend(blocks.iter().map(|b| b.ordinal().to_string()));
    Some(code)
}

/// A raw schedule code as stored on a demand.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScheduleCode(pub String);

impl ScheduleCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn slots(&self) -> Result<BTreeSet<Slot>, ParseError> {
        parse(&self.0)
    }

    pub fn slots_with(&self, tables: &ReferenceTables) -> Result<BTreeSet<Slot>, ParseError> {
        parse_with(tables, &self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScheduleCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
