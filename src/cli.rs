//! Command-line interface parsing
//!
//! Argument shapes live here along with the checks clap cannot express on its
//! own (minimum query length, sort keywords, bounded intervals).

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser, Subcommand};
use thiserror::Error;

use crate::config::MAX_REVIEWS_RANGE;
use crate::data::{ReadOptions, SortDirection, SortField};
use crate::refresh::RefreshSchedule;

/// Shortest business search query sent to the provider
pub const MIN_QUERY_LEN: usize = 3;

/// Longest `watch` period, one week
pub const MAX_WATCH_MINUTES: u64 = 7 * 24 * 60;

/// Error types for CLI argument validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CliError {
    #[error("Search query must be at least {min} characters")]
    QueryTooShort { min: usize },

    #[error("Invalid order: '{0}'. Valid orders: time, rating")]
    InvalidOrder(String),

    #[error("Invalid direction: '{0}'. Valid directions: asc, desc")]
    InvalidDirection(String),

    #[error("Limit must be between {min} and {max}, got {value}")]
    InvalidLimit { value: usize, min: usize, max: usize },

    #[error("Watch interval must be between 1 and {max} minutes")]
    InvalidInterval { max: u64 },
}

/// Cache a business's Google reviews and serve them without hitting the API
#[derive(Parser, Debug)]
#[command(name = "reviewcache")]
#[command(about = "Cached Google reviews behind a rate-limited refresh")]
#[command(version)]
pub struct Cli {
    /// Keep the cache and settings in DIR instead of the XDG directories
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Log more (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Fetch fresh reviews now, if the refresh interval allows it
    Refresh,

    /// Show cache age, connection, and when the next refresh is allowed
    Status,

    /// Print cached reviews
    Show {
        #[arg(long, default_value_t = 10)]
        limit: usize,

        /// time or rating
        #[arg(long, default_value = "time")]
        order: String,

        /// asc or desc
        #[arg(long, default_value = "desc")]
        direction: String,
    },

    /// Find a business to connect to
    Search { query: String },

    /// Select the business whose reviews are cached
    Connect {
        business_id: String,

        /// Display name to remember for the business
        #[arg(long)]
        name: Option<String>,
    },

    /// Forget the selected business and clear its cache
    Disconnect,

    /// Show settings, or change them when flags are given
    Config {
        /// Minimum hours between fetches (1-168)
        #[arg(long, value_name = "HOURS")]
        cache_hours: Option<i64>,

        /// Reviews kept per fetch (1-50)
        #[arg(long, value_name = "N")]
        max_reviews: Option<i64>,

        /// Places API key; an empty value removes it
        #[arg(long, value_name = "KEY")]
        api_key: Option<String>,

        /// Language for review text, e.g. en or pt-BR; an empty value removes it
        #[arg(long, value_name = "TAG")]
        language: Option<String>,
    },

    /// Keep refreshing on a timer until interrupted
    Watch {
        /// Minutes between attempts (1-10080)
        #[arg(
            long,
            default_value_t = 60,
            value_name = "N",
            value_parser = clap::value_parser!(u64).range(1..=MAX_WATCH_MINUTES)
        )]
        every_minutes: u64,
    },
}

/// Trims `query` and checks it is long enough to search for
pub fn parse_search_query(query: &str) -> Result<String, CliError> {
    let trimmed = query.trim();
    if trimmed.chars().count() < MIN_QUERY_LEN {
        return Err(CliError::QueryTooShort { min: MIN_QUERY_LEN });
    }
    Ok(trimmed.to_string())
}

pub fn parse_sort_order(s: &str) -> Result<SortField, CliError> {
    match s.to_ascii_lowercase().as_str() {
        "time" | "date" | "newest" => Ok(SortField::Time),
        "rating" | "stars" => Ok(SortField::Rating),
        _ => Err(CliError::InvalidOrder(s.to_string())),
    }
}

pub fn parse_sort_direction(s: &str) -> Result<SortDirection, CliError> {
    match s.to_ascii_lowercase().as_str() {
        "asc" | "ascending" => Ok(SortDirection::Asc),
        "desc" | "descending" => Ok(SortDirection::Desc),
        _ => Err(CliError::InvalidDirection(s.to_string())),
    }
}

/// Builds read options from the `show` arguments
pub fn read_options(limit: usize, order: &str, direction: &str) -> Result<ReadOptions, CliError> {
    let (min, max) = MAX_REVIEWS_RANGE;
    if limit < min || limit > max {
        return Err(CliError::InvalidLimit {
            value: limit,
            min,
            max,
        });
    }

    Ok(ReadOptions {
        limit,
        order: parse_sort_order(order)?,
        direction: parse_sort_direction(direction)?,
    })
}

/// Schedule for `watch`, attempting once immediately
pub fn watch_schedule(every_minutes: u64) -> Result<RefreshSchedule, CliError> {
    if every_minutes == 0 || every_minutes > MAX_WATCH_MINUTES {
        return Err(CliError::InvalidInterval {
            max: MAX_WATCH_MINUTES,
        });
    }
    Ok(RefreshSchedule {
        every: Duration::from_secs(every_minutes * 60),
        immediate: true,
        enabled: true,
    })
}

/// Log filter directive for the requested verbosity
pub fn log_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "reviewcache=info",
        1 => "reviewcache=debug",
        _ => "reviewcache=trace",
    }
}
