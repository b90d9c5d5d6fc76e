//! Core data models for reviewcache
//!
//! This module contains the review and business types shared by the store,
//! the refresh gate, and the provider client, plus the raw shapes the
//! provider hands back before normalization.

pub mod places;
pub mod sanitize;

pub use places::{PlacesClient, ProviderError, ReviewsProvider};

use serde::{Deserialize, Serialize};

/// Longest author name kept after sanitization, in characters
pub const AUTHOR_NAME_MAX: usize = 255;

/// Longest URL accepted for profile and avatar links
pub const URL_MAX: usize = 500;

/// Longest relative-time label kept, in characters
pub const RELATIVE_LABEL_MAX: usize = 100;

/// Longest review body kept, in characters
pub const REVIEW_TEXT_MAX: usize = 4096;

/// Highest star rating a review can carry
pub const MAX_RATING: u8 = 5;

/// A single cached review
///
/// Values are normalized before they get here; see [`sanitize::normalize_review`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    /// Display name of the reviewer (may be empty)
    pub author_name: String,
    /// Link to the reviewer's public profile
    pub author_profile_url: Option<String>,
    /// Link to the reviewer's avatar image
    pub avatar_url: Option<String>,
    /// Star rating, 0 through 5
    pub rating: u8,
    /// Review body (may be empty)
    pub text: String,
    /// When the review was written, seconds since epoch
    pub timestamp: i64,
    /// Provider-computed label such as "2 weeks ago"
    pub relative_time_label: String,
}

/// The complete set of cached reviews plus the time it was committed
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReviewSnapshot {
    pub reviews: Vec<Review>,
    /// Seconds since epoch when the snapshot was committed, 0 if never
    pub cached_at: i64,
}

/// Field used to order reviews on read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    Time,
    Rating,
}

/// Sort direction for reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

/// Options for reading reviews out of the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOptions {
    pub limit: usize,
    pub order: SortField,
    pub direction: SortDirection,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            order: SortField::Time,
            direction: SortDirection::Desc,
        }
    }
}

/// A business returned by a provider search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessCandidate {
    /// Provider identifier (a Google Place ID)
    pub id: String,
    pub name: String,
    pub address: String,
    /// Aggregate star rating
    pub rating: f64,
    /// Total number of reviews the provider knows about
    pub review_count: u64,
}

/// A review exactly as the provider returned it
///
/// Every field is optional because the provider is untrusted.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawReview {
    pub author_name: Option<String>,
    pub author_url: Option<String>,
    pub profile_photo_url: Option<String>,
    pub rating: Option<f64>,
    pub text: Option<String>,
    pub time: Option<i64>,
    pub relative_time_description: Option<String>,
}

/// A search hit exactly as the provider returned it
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawBusiness {
    pub place_id: Option<String>,
    pub name: Option<String>,
    pub formatted_address: Option<String>,
    pub rating: Option<f64>,
    pub user_ratings_total: Option<u64>,
}
