//! Read side handed to whatever renders reviews
//!
//! Rendering layers only ever see a [`ReviewFeed`]; they never talk to the
//! provider or decide when a refresh happens.

use chrono::{TimeZone, Utc};
use serde::Serialize;

use crate::cache::ReviewStore;
use crate::data::{ReadOptions, Review, MAX_RATING};

/// Reviews selected for display
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewFeed {
    pub reviews: Vec<Review>,
    /// True when nothing is cached, so callers can show a setup hint instead
    pub is_empty: bool,
}

impl ReviewFeed {
    pub fn query(store: &dyn ReviewStore, options: ReadOptions) -> Self {
        let reviews = store.read(options);
        let is_empty = reviews.is_empty();
        Self { reviews, is_empty }
    }
}

/// Filled and hollow stars for a 0-5 rating
pub fn stars(rating: u8) -> String {
    let filled = rating.min(MAX_RATING) as usize;
    let mut out = "★".repeat(filled);
    out.push_str(&"☆".repeat(MAX_RATING as usize - filled));
    out
}

/// One review as a short plain-text block
pub fn format_review(review: &Review) -> String {
    let date = Utc
        .timestamp_opt(review.timestamp, 0)
        .single()
        .map(|t| t.format("%Y-%m-%d").to_string())
        .unwrap_or_default();

    let mut header = format!("{} {}", stars(review.rating), review.author_name);
    if !date.is_empty() {
        header.push_str(&format!(" ({})", date));
    }
    if !review.relative_time_label.is_empty() {
        header.push_str(&format!(" - {}", review.relative_time_label));
    }

    if review.text.is_empty() {
        header
    } else {
        format!("{}\n{}", header, review.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::test_support::review;
    use crate::cache::MemoryReviewStore;
    use crate::clock::ManualClock;
    use crate::data::{SortDirection, SortField};
    use std::sync::Arc;

    #[test]
    fn test_empty_store_gives_empty_feed() {
        let store = MemoryReviewStore::new(Arc::new(ManualClock::new(0)));
        let feed = ReviewFeed::query(&store, ReadOptions::default());
        assert!(feed.is_empty);
        assert!(feed.reviews.is_empty());
    }

    #[test]
    fn test_feed_applies_read_options() {
        let store = MemoryReviewStore::new(Arc::new(ManualClock::new(50)));
        store
            .replace(vec![review("Ana", 2, 10), review("Ben", 5, 20), review("Cy", 4, 30)])
            .unwrap();

        let feed = ReviewFeed::query(
            &store,
            ReadOptions {
                limit: 2,
                order: SortField::Rating,
                direction: SortDirection::Desc,
            },
        );
        assert!(!feed.is_empty);
        let authors: Vec<&str> = feed.reviews.iter().map(|r| r.author_name.as_str()).collect();
        assert_eq!(authors, ["Ben", "Cy"]);
    }

    #[test]
    fn test_stars() {
        assert_eq!(stars(0), "☆☆☆☆☆");
        assert_eq!(stars(3), "★★★☆☆");
        assert_eq!(stars(5), "★★★★★");
    }

    #[test]
    fn test_format_review_includes_date_and_text() {
        let mut r = review("Ana", 4, 1_700_000_000);
        r.relative_time_label = "a week ago".to_string();

        let text = format_review(&r);
        assert!(text.starts_with("★★★★☆ Ana (2023-11-14) - a week ago"));
        assert!(text.ends_with("Review by Ana"));
    }
}
