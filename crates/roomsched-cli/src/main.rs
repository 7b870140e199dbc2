//! `roomsched` CLI: parse schedule codes, run term allocations, book recurring
//! events and query room availability against a JSON ledger snapshot.
//!
//! ## Usage
//!
//! ```sh
//! # Expand a schedule code into weekday/block pairs
//! roomsched parse 24M12
//!
//! # Run the matcher for a term and write the result into the ledger
//! roomsched allocate -i request.json --ledger ledger.json
//!
//! # Book a recurring event (exit status 2 on conflict)
//! roomsched expand -i event.json --ledger ledger.json
//!
//! # Free blocks of room 3 on a date
//! roomsched free --ledger ledger.json --room 3 --date 2026-03-10
//!
//! # Allocations that collide with ad-hoc bookings
//! roomsched review --ledger ledger.json --term 2026.1
//! ```
//!
//! Logging goes to stderr and is controlled by `RUST_LOG` (default `warn`).

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::{self, Read};
use std::process;
use tracing::info;
use tracing_subscriber::EnvFilter;

use roomsched_core::allocation::{allocate_locked, AllocationRequest, AllocationRunResult, RunOptions};
use roomsched_core::availability::{busy_intervals, free_blocks};
use roomsched_core::model::{RoomId, TermId};
use roomsched_core::recurrence::expand_and_commit_with;
use roomsched_core::review::{self, ReviewItem};
use roomsched_core::schedule_code::parse_with;
use roomsched_core::{CancelToken, EngineConfig, EventRequest, ExpansionError, Ledger, TermLocks};

/// Exit status when a booking is rejected for conflicts.
const EXIT_CONFLICT: i32 = 2;

#[derive(Parser)]
#[command(
    name = "roomsched",
    version,
    about = "Room allocation and recurring booking engine"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Engine config file (TOML); defaults apply when omitted
    #[arg(short, long, global = true)]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Expand a schedule code into weekday/block pairs
    Parse {
        /// Schedule code, e.g. 24M12
        code: String,
    },
    /// Run the term-wide allocation matcher
    Allocate {
        /// Allocation request JSON (reads from stdin if omitted)
        #[arg(short, long)]
        input: Option<String>,
        /// Output file for the run result (writes to stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
        /// Ledger snapshot to replace the term's allocations in
        #[arg(long)]
        ledger: Option<String>,
    },
    /// Expand a recurring event and commit every occurrence
    Expand {
        /// Event request JSON (reads from stdin if omitted)
        #[arg(short, long)]
        input: Option<String>,
        /// Ledger snapshot to check against and write into
        #[arg(long)]
        ledger: String,
        /// Check for conflicts without writing the ledger
        #[arg(long)]
        dry_run: bool,
    },
    /// List free blocks of a room on a date
    Free {
        #[arg(long)]
        ledger: String,
        #[arg(long)]
        room: u32,
        /// Calendar date, YYYY-MM-DD
        #[arg(long)]
        date: NaiveDate,
        /// Print merged busy intervals (UTC) as JSON instead
        #[arg(long)]
        busy: bool,
    },
    /// List committed allocations that collide with ad-hoc bookings
    Review {
        #[arg(long)]
        ledger: String,
        #[arg(long)]
        term: String,
    },
}

#[derive(Serialize)]
struct AllocateReport<'a> {
    #[serde(flatten)]
    result: &'a AllocationRunResult,
    review: Vec<ReviewItem>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match cli.config.as_deref() {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("Failed to load config: {}", path))?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Parse { code } => {
            let slots = parse_with(&config.tables, &code).context("Invalid schedule code")?;
            for slot in slots {
                println!("{} {}", slot.weekday.code(), slot.block);
            }
        }
        Commands::Allocate {
            input,
            output,
            ledger,
        } => {
            let json = read_input(input.as_deref())?;
            let request: AllocationRequest =
                serde_json::from_str(&json).context("Failed to parse allocation request")?;

            let locks = TermLocks::new();
            let result = allocate_locked(&locks, &request, &config, &RunOptions::default())
                .context("Allocation run failed")?;

            if let Some(path) = ledger.as_deref() {
                let mut book = load_ledger(path)?;
                if let Some(term) = request.term_record() {
                    book.add_term(term);
                }
                let written = book
                    .replace_term(&result.term, result.allocations().to_vec())
                    .context("Failed to commit allocations")?;
                save_ledger(path, &book)?;
                info!(term = %result.term, rows = written, ledger = path, "ledger updated");
            }

            let report = AllocateReport {
                result: &result,
                review: review::from_run(&result),
            };
            write_output(output.as_deref(), &serde_json::to_string_pretty(&report)?)?;
        }
        Commands::Expand {
            input,
            ledger,
            dry_run,
        } => {
            let json = read_input(input.as_deref())?;
            let request: EventRequest =
                serde_json::from_str(&json).context("Failed to parse event request")?;

            let mut book = load_ledger(&ledger)?;
            match expand_and_commit_with(&mut book, request, &config.tables, &CancelToken::new()) {
                Ok(series) => {
                    if !dry_run {
                        save_ledger(&ledger, &book)?;
                    }
                    println!("{}", serde_json::to_string_pretty(&series)?);
                }
                Err(ExpansionError::Conflict(conflicts)) => {
                    let items = review::from_conflicts(&conflicts);
                    println!("{}", serde_json::to_string_pretty(&items)?);
                    eprintln!("Error: {}", conflicts);
                    process::exit(EXIT_CONFLICT);
                }
                Err(e) => return Err(e).context("Recurring booking rejected"),
            }
        }
        Commands::Free {
            ledger,
            room,
            date,
            busy,
        } => {
            let book = load_ledger(&ledger)?;
            if busy {
                let intervals = busy_intervals(&book, &config.tables, config.timezone, RoomId(room), date);
                println!("{}", serde_json::to_string_pretty(&intervals)?);
            } else {
                for block in free_blocks(&book, &config.tables, RoomId(room), date) {
                    println!("{}", block);
                }
            }
        }
        Commands::Review { ledger, term } => {
            let book = load_ledger(&ledger)?;
            let items = review::overlaps(&book, &TermId::new(term));
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
    }

    Ok(())
}

/// A missing ledger file starts an empty ledger.
fn load_ledger(path: &str) -> Result<Ledger> {
    match std::fs::read_to_string(path) {
        Ok(json) => Ledger::from_json(&json).with_context(|| format!("Invalid ledger: {}", path)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Ledger::new()),
        Err(e) => Err(e).with_context(|| format!("Failed to read ledger: {}", path)),
    }
}

fn save_ledger(path: &str, ledger: &Ledger) -> Result<()> {
    let json = serde_json::to_string_pretty(&ledger.snapshot())?;
    write_output(Some(path), &json)
}

fn read_input(path: Option<&str>) -> Result<String> {
    match path {
        Some(path) => {
            std::fs::read_to_string(path).with_context(|| format!("Failed to read file: {}", path))
        }
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read from stdin")?;
            Ok(buf)
        }
    }
}

fn write_output(path: Option<&str>, content: &str) -> Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write file: {}", path))?;
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
