//! Room availability on a calendar date.
//!
//! Combines both booking sources for one room and one date: the term's
//! weekly allocations for that weekday and the date's active occurrences.
//! [`free_blocks`] lists the blocks nobody holds; [`busy_intervals`] merges
//! the held blocks into contiguous UTC intervals for calendar export.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::conflict::{find_conflicts, Scope};
use crate::ledger::Ledger;
use crate::model::RoomId;
use crate::reference::{BlockCode, ReferenceTables, Slot, Weekday};

/// A contiguous run of busy blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusyInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub blocks: Vec<BlockCode>,
}

fn is_busy(ledger: &Ledger, room: RoomId, date: NaiveDate, slot: Slot) -> bool {
    let scope = Scope::dated(ledger, date);
    !find_conflicts(ledger, room, slot, &scope).is_empty()
}

/// Blocks of `date` in which `room` is free, in block order.
///
/// Sundays are off the grid and have no blocks.
pub fn free_blocks(
    ledger: &Ledger,
    tables: &ReferenceTables,
    room: RoomId,
    date: NaiveDate,
) -> Vec<BlockCode> {
    let Some(weekday) = Weekday::of_date(date) else {
        return Vec::new();
    };
    tables
        .blocks()
        .iter()
        .map(|b| b.code)
        .filter(|&code| !is_busy(ledger, room, date, Slot::new(weekday, code)))
        .collect()
}

/// Busy blocks of `room` on `date`, merged into UTC intervals.
///
/// Blocks merge when one ends exactly where the next starts. A block whose
/// local start or end does not exist in `tz` (a DST gap) is skipped.
pub fn busy_intervals(
    ledger: &Ledger,
    tables: &ReferenceTables,
    tz: Tz,
    room: RoomId,
    date: NaiveDate,
) -> Vec<BusyInterval> {
    let Some(weekday) = Weekday::of_date(date) else {
        return Vec::new();
    };

    let mut merged: Vec<BusyInterval> = Vec::new();
    for block in tables.blocks() {
        if !is_busy(ledger, room, date, Slot::new(weekday, block.code)) {
            continue;
        }
        let (Some(start), Some(end)) = (
            to_utc(tz, date, block.start),
            to_utc(tz, date, block.end),
        ) else {
            warn!(%date, block = %block.code, timezone = %tz, "block falls in a DST gap, skipped");
            continue;
        };

        if let Some(last) = merged.last_mut() {
            if last.end == start {
                last.end = end;
                last.blocks.push(block.code);
                continue;
            }
        }
        merged.push(BusyInterval {
            start,
            end,
            blocks: vec![block.code],
        });
    }
    merged
}

fn to_utc(tz: Tz, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&date.and_time(time))
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}
