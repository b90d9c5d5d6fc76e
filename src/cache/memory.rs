//! In-memory review store

use std::sync::{Arc, RwLock};

use super::{select_reviews, status_of, validate_reviews, CacheStatus, ReviewStore, StoreError};
use crate::clock::Clock;
use crate::data::{ReadOptions, Review, ReviewSnapshot};

/// Review store that lives only as long as the process
pub struct MemoryReviewStore {
    snapshot: RwLock<ReviewSnapshot>,
    clock: Arc<dyn Clock>,
}

impl MemoryReviewStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            snapshot: RwLock::new(ReviewSnapshot::default()),
            clock,
        }
    }

    /// Copy of the whole snapshot, in insertion order
    pub fn snapshot(&self) -> ReviewSnapshot {
        self.snapshot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl ReviewStore for MemoryReviewStore {
    fn replace(&self, reviews: Vec<Review>) -> Result<(), StoreError> {
        validate_reviews(&reviews)?;

        let next = ReviewSnapshot {
            reviews,
            cached_at: self.clock.now(),
        };
        *self.snapshot.write().unwrap_or_else(|e| e.into_inner()) = next;
        Ok(())
    }

    fn read(&self, options: ReadOptions) -> Vec<Review> {
        let snapshot = self.snapshot.read().unwrap_or_else(|e| e.into_inner());
        select_reviews(&snapshot, options)
    }

    fn status(&self) -> CacheStatus {
        let snapshot = self.snapshot.read().unwrap_or_else(|e| e.into_inner());
        status_of(&snapshot, self.clock.now())
    }

    fn clear(&self) -> Result<(), StoreError> {
        *self.snapshot.write().unwrap_or_else(|e| e.into_inner()) = ReviewSnapshot::default();
        Ok(())
    }
}
