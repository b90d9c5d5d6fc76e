//! reviewcache
//!
//! Keeps a local copy of one business's Google reviews and refreshes it from
//! the Places API no more often than the configured interval allows.

pub mod app;
pub mod cache;
pub mod cli;
pub mod clock;
pub mod config;
pub mod data;
pub mod feed;
pub mod lock;
pub mod refresh;
