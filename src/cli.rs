//! CLI argument parsing for the hos-worker binary.

use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "hos-worker", about = "Hours-of-Service trip planning worker")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the worker server (default if no subcommand given)
    Serve,
    /// Run database migrations and exit
    Migrate,
    /// Schedule a trip from distance and driving time and print it as JSON
    Plan {
        /// Total driving distance in miles
        #[arg(long)]
        distance: f64,
        /// Total driving time in hours
        #[arg(long)]
        hours: f64,
        /// On-duty hours already used in the 70-hour/8-day cycle
        #[arg(long, default_value_t = 0.0)]
        cycle_used: f64,
        /// Local start time, e.g. 2026-02-21T06:00:00 (defaults to now)
        #[arg(long, value_parser = parse_start)]
        start: Option<NaiveDateTime>,
    },
}

fn parse_start(raw: &str) -> Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M"))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M"))
        .map_err(|e| format!("invalid start time '{}': {}", raw, e))
}
