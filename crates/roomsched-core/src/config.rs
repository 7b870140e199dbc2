//! Engine configuration: campus timezone, soft-rule scoring weights and an
//! optional custom time block table.
//!
//! ```toml
//! timezone = "America/Sao_Paulo"
//!
//! [scoring]
//! prefer_room = 100
//! waste_per_seat = 1
//!
//! [[blocks]]
//! code = "M1"
//! start = "07:00"
//! end = "07:50"
//! ```
//!
//! Every key is optional. `ROOMSCHED_TIMEZONE` overrides `timezone`.

use std::path::Path;

use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::reference::{BlockCode, ReferenceTables, TimeBlock};
use crate::rules::ScoringWeights;

/// Environment variable overriding the configured timezone.
pub const TIMEZONE_ENV: &str = "ROOMSCHED_TIMEZONE";

/// On-disk shape of the config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub timezone: Option<String>,
    pub scoring: ScoringWeights,
    pub blocks: Vec<BlockSpec>,
}

/// One row of a custom block table. Times are `HH:MM`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlockSpec {
    pub code: BlockCode,
    pub start: String,
    pub end: String,
}

/// Resolved, validated configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub timezone: Tz,
    pub scoring: ScoringWeights,
    pub tables: ReferenceTables,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timezone: Tz::UTC,
            scoring: ScoringWeights::default(),
            tables: ReferenceTables::default(),
        }
    }
}

impl EngineConfig {
    /// Parse config from a TOML string, then apply environment overrides.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let mut file: ConfigFile = toml::from_str(toml_str)?;
        if let Ok(tz) = std::env::var(TIMEZONE_ENV) {
            file.timezone = Some(tz);
        }
        Self::resolve(file)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!(config = %path.display(), "loading engine config");
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Validate a parsed config file. Missing sections fall back to defaults.
    pub fn resolve(file: ConfigFile) -> Result<Self, ConfigError> {
        let timezone = match file.timezone {
            Some(name) => name
                .parse::<Tz>()
                .map_err(|_| ConfigError::InvalidTimezone(name.clone()))?,
            None => Tz::UTC,
        };

        let tables = if file.blocks.is_empty() {
            ReferenceTables::default()
        } else {
            let blocks = file
                .blocks
                .iter()
                .map(|row| {
                    Ok(TimeBlock {
                        code: row.code,
                        start: clock(&row.start, row.code)?,
                        end: clock(&row.end, row.code)?,
                    })
                })
                .collect::<Result<Vec<_>, ConfigError>>()?;
            ReferenceTables::from_blocks(blocks)?
        };

        Ok(Self {
            timezone,
            scoring: file.scoring,
            tables,
        })
    }
}

fn clock(value: &str, code: BlockCode) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .map_err(|_| ConfigError::InvalidBlockTable(format!("block {code} has invalid time {value:?}")))
}
