//! Review cache
//!
//! This module holds exactly one [`ReviewSnapshot`] behind the [`ReviewStore`]
//! trait. Replacing the snapshot is all-or-nothing: every review is validated
//! first, and the previous snapshot stays intact if anything fails. The store
//! knows nothing about refresh policy; that lives in [`crate::refresh`].

mod file;
mod memory;

pub use file::FileReviewStore;
pub(crate) use file::write_atomic;
pub use memory::MemoryReviewStore;

use std::cmp::Ordering;

use serde::Serialize;
use thiserror::Error;

use crate::data::sanitize::is_well_formed_url;
use crate::data::{
    ReadOptions, Review, ReviewSnapshot, SortDirection, SortField, AUTHOR_NAME_MAX, MAX_RATING,
    RELATIVE_LABEL_MAX, REVIEW_TEXT_MAX,
};

/// Errors returned by review store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// `replace` was called with no reviews; use `clear` to empty the store
    #[error("Refusing to replace the cache with an empty review set")]
    EmptyInput,

    /// A review in the batch failed validation
    #[error("Review #{index} is invalid: {reason}")]
    InvalidReview { index: usize, reason: String },

    /// Reading or writing the backing file failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The snapshot could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Summary of what the cache currently holds
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStatus {
    pub count: usize,
    /// Commit time of the current snapshot, 0 if nothing is cached
    pub cached_at: i64,
    /// Hours since `cached_at`, rounded to one decimal; 0 if nothing is cached
    pub age_hours: f64,
}

/// Storage for the single cached review snapshot
pub trait ReviewStore: Send + Sync {
    /// Atomically swaps in a new snapshot stamped with the current time
    fn replace(&self, reviews: Vec<Review>) -> Result<(), StoreError>;

    /// Returns up to `options.limit` reviews in the requested order
    ///
    /// An empty store yields an empty vec, never an error.
    fn read(&self, options: ReadOptions) -> Vec<Review>;

    fn status(&self) -> CacheStatus;

    /// Drops the snapshot. Calling it on an empty store is a no-op.
    fn clear(&self) -> Result<(), StoreError>;

    /// True if the store holds reviews younger than `max_age_hours`
    fn is_valid(&self, max_age_hours: f64) -> bool {
        let status = self.status();
        status.count > 0 && status.age_hours < max_age_hours
    }
}

/// Checks every review of a batch, failing on the first bad one
pub(crate) fn validate_reviews(reviews: &[Review]) -> Result<(), StoreError> {
    if reviews.is_empty() {
        return Err(StoreError::EmptyInput);
    }

    for (index, review) in reviews.iter().enumerate() {
        let invalid = |reason: String| StoreError::InvalidReview { index, reason };

        if review.rating > MAX_RATING {
            return Err(invalid(format!(
                "rating {} is outside 0..={}",
                review.rating, MAX_RATING
            )));
        }
        if review.timestamp < 0 {
            return Err(invalid(format!("negative timestamp {}", review.timestamp)));
        }
        if review.author_name.chars().count() > AUTHOR_NAME_MAX {
            return Err(invalid("author name too long".to_string()));
        }
        if review.relative_time_label.chars().count() > RELATIVE_LABEL_MAX {
            return Err(invalid("relative time label too long".to_string()));
        }
        if review.text.chars().count() > REVIEW_TEXT_MAX {
            return Err(invalid("review text too long".to_string()));
        }
        for url in [&review.author_profile_url, &review.avatar_url]
            .into_iter()
            .flatten()
        {
            if !is_well_formed_url(url) {
                return Err(invalid(format!("malformed URL {:?}", url)));
            }
        }
    }

    Ok(())
}

/// Sorts a copy of the snapshot and takes the first `limit` reviews
///
/// `sort_by` is stable, so equal keys keep their insertion order in both
/// directions.
pub(crate) fn select_reviews(snapshot: &ReviewSnapshot, options: ReadOptions) -> Vec<Review> {
    let mut reviews = snapshot.reviews.clone();

    let key = |a: &Review, b: &Review| -> Ordering {
        match options.order {
            SortField::Time => a.timestamp.cmp(&b.timestamp),
            SortField::Rating => a.rating.cmp(&b.rating),
        }
    };

    match options.direction {
        SortDirection::Asc => reviews.sort_by(key),
        SortDirection::Desc => reviews.sort_by(|a, b| key(b, a)),
    }

    reviews.truncate(options.limit);
    reviews
}

/// Computes the status of a snapshot as seen at `now`
pub(crate) fn status_of(snapshot: &ReviewSnapshot, now: i64) -> CacheStatus {
    let age_hours = if snapshot.cached_at == 0 {
        0.0
    } else {
        let secs = (now - snapshot.cached_at).max(0) as f64;
        (secs / 3600.0 * 10.0).round() / 10.0
    };

    CacheStatus {
        count: snapshot.reviews.len(),
        cached_at: snapshot.cached_at,
        age_hours,
    }
}
