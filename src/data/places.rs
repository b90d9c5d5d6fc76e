//! Google Places API client
//!
//! This module defines the [`ReviewsProvider`] seam the refresh gate talks to,
//! and [`PlacesClient`], the production implementation backed by the Places
//! `details` and `textsearch` endpoints.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;

use super::{RawBusiness, RawReview};

/// Base URL for the Places web service
const PLACES_BASE_URL: &str = "https://maps.googleapis.com/maps/api/place";

/// Fields requested from the details endpoint
const DETAILS_FIELDS: &str = "reviews,rating,user_ratings_total";

/// Default bound on a single provider request
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Errors that can occur when talking to the reviews provider
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network failure or timeout before a response arrived
    #[error("Provider unreachable: {0}")]
    Unreachable(String),

    /// The provider answered with a non-success HTTP status or API status
    #[error("Provider returned an error: {0}")]
    Status(String),

    /// The response body could not be understood
    #[error("Malformed provider response: {0}")]
    Malformed(String),
}

/// Request URLs carry the API key as a query parameter, so the URL is
/// stripped before the error is formatted.
impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        let err = err.without_url();
        if err.is_decode() {
            ProviderError::Malformed(err.to_string())
        } else if let Some(status) = err.status() {
            ProviderError::Status(status.as_u16().to_string())
        } else if err.is_timeout() {
            ProviderError::Unreachable("request timed out".to_string())
        } else {
            ProviderError::Unreachable(err.to_string())
        }
    }
}

/// A source of reviews and business search results
///
/// Implementations return the provider's data as-is; normalization is the
/// caller's job.
#[async_trait]
pub trait ReviewsProvider: Send + Sync {
    /// Fetches reviews for one business, in the provider's own order
    async fn get_reviews_for_business(
        &self,
        business_id: &str,
        credential: &str,
        max_results: usize,
    ) -> Result<Vec<RawReview>, ProviderError>;

    /// Searches businesses by free text, in the provider's relevance order
    async fn search_businesses(
        &self,
        query: &str,
        credential: &str,
    ) -> Result<Vec<RawBusiness>, ProviderError>;
}

/// Envelope of a details response
#[derive(Debug, Deserialize)]
struct DetailsResponse {
    status: String,
    #[serde(default)]
    result: Option<DetailsResult>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DetailsResult {
    #[serde(default)]
    reviews: Vec<RawReview>,
}

/// Envelope of a text search response
#[derive(Debug, Deserialize)]
struct SearchResponse {
    status: String,
    #[serde(default)]
    results: Vec<RawBusiness>,
    #[serde(default)]
    error_message: Option<String>,
}

fn status_error(status: &str, message: Option<&str>) -> ProviderError {
    match message {
        Some(message) if !message.is_empty() => {
            ProviderError::Status(format!("{}: {}", status, message))
        }
        _ => ProviderError::Status(status.to_string()),
    }
}

/// Parses a details response body into raw reviews
///
/// A successful response without a `reviews` array yields an empty list; the
/// gate decides what an empty list means.
pub fn parse_details_body(body: &str) -> Result<Vec<RawReview>, ProviderError> {
    let response: DetailsResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Malformed(e.to_string()))?;

    match response.status.as_str() {
        "OK" => Ok(response.result.map(|r| r.reviews).unwrap_or_default()),
        "ZERO_RESULTS" => Ok(Vec::new()),
        status => Err(status_error(status, response.error_message.as_deref())),
    }
}

/// Parses a text search response body into raw businesses
pub fn parse_search_body(body: &str) -> Result<Vec<RawBusiness>, ProviderError> {
    let response: SearchResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Malformed(e.to_string()))?;

    match response.status.as_str() {
        "OK" => Ok(response.results),
        "ZERO_RESULTS" => Ok(Vec::new()),
        status => Err(status_error(status, response.error_message.as_deref())),
    }
}

/// Client for the Google Places web service
#[derive(Debug, Clone)]
pub struct PlacesClient {
    /// HTTP client for making requests
    http_client: Client,
    /// Base URL for the API (allows override for testing)
    base_url: String,
    /// Language the provider should localize review text and labels in
    language: Option<String>,
}

impl PlacesClient {
    /// Creates a client against the public Places API with the default timeout
    pub fn new() -> Result<Self, ProviderError> {
        Self::with_base_url(PLACES_BASE_URL, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Creates a client against a custom base URL
    pub fn with_base_url(
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("reviewcache/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::Unreachable(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            language: None,
        })
    }

    pub fn with_language(mut self, language: Option<String>) -> Self {
        self.language = language;
        self
    }

    /// Query parameters for a details request
    fn details_query<'a>(
        &'a self,
        business_id: &'a str,
        credential: &'a str,
    ) -> Vec<(&'static str, &'a str)> {
        let mut params = vec![
            ("place_id", business_id),
            ("key", credential),
            ("fields", DETAILS_FIELDS),
        ];
        if let Some(language) = self.language.as_deref() {
            params.push(("language", language));
        }
        params
    }

    /// Issues a GET and returns the body of a 200 response
    async fn get_body(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<String, ProviderError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let response = self.http_client.get(&url).query(params).send().await?;

        match response.status() {
            StatusCode::OK => Ok(response.text().await?),
            status => Err(ProviderError::Status(status.as_u16().to_string())),
        }
    }
}

#[async_trait]
impl ReviewsProvider for PlacesClient {
    async fn get_reviews_for_business(
        &self,
        business_id: &str,
        credential: &str,
        max_results: usize,
    ) -> Result<Vec<RawReview>, ProviderError> {
        let params = self.details_query(business_id, credential);

        tracing::debug!(business_id, "requesting place details");
        let body = self.get_body("/details/json", &params).await?;
        let mut reviews = parse_details_body(&body)?;
        reviews.truncate(max_results);
        Ok(reviews)
    }

    async fn search_businesses(
        &self,
        query: &str,
        credential: &str,
    ) -> Result<Vec<RawBusiness>, ProviderError> {
        let params = [("query", query), ("key", credential)];

        tracing::debug!(query, "searching places");
        let body = self.get_body("/textsearch/json", &params).await?;
        parse_search_body(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DETAILS_FIXTURE: &str = r#"{
        "status": "OK",
        "result": {
            "rating": 4.6,
            "user_ratings_total": 212,
            "reviews": [
                {
                    "author_name": "Priya N",
                    "author_url": "https://www.google.com/maps/contrib/1/reviews",
                    "profile_photo_url": "https://lh3.googleusercontent.com/a/1",
                    "rating": 5,
                    "relative_time_description": "a week ago",
                    "text": "Lovely staff.",
                    "time": 1718000000
                },
                {
                    "author_name": "Tom",
                    "rating": 3,
                    "relative_time_description": "2 months ago",
                    "text": "",
                    "time": 1712000000
                }
            ]
        }
    }"#;

    #[test]
    fn test_parse_details_body_keeps_provider_order() {
        let reviews = parse_details_body(DETAILS_FIXTURE).unwrap();
        assert_eq!(reviews.len(), 2);
        assert_eq!(reviews[0].author_name.as_deref(), Some("Priya N"));
        assert_eq!(reviews[0].rating, Some(5.0));
        assert_eq!(reviews[0].time, Some(1718000000));
        assert_eq!(reviews[1].author_name.as_deref(), Some("Tom"));
        assert!(reviews[1].author_url.is_none());
    }

    #[test]
    fn test_parse_details_body_without_reviews_is_empty() {
        let reviews = parse_details_body(r#"{"status": "OK", "result": {"rating": 4.0}}"#).unwrap();
        assert!(reviews.is_empty());
    }

    #[test]
    fn test_parse_details_body_api_status_error() {
        let err = parse_details_body(
            r#"{"status": "REQUEST_DENIED", "error_message": "The provided API key is invalid."}"#,
        )
        .unwrap_err();
        match err {
            ProviderError::Status(code) => {
                assert!(code.starts_with("REQUEST_DENIED"));
                assert!(code.contains("API key"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_parse_details_body_malformed() {
        assert!(matches!(
            parse_details_body("<html>oops</html>"),
            Err(ProviderError::Malformed(_))
        ));
        assert!(matches!(
            parse_details_body(r#"{"result": {}}"#),
            Err(ProviderError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_search_body() {
        let body = r#"{
            "status": "OK",
            "results": [
                {"place_id": "A", "name": "Alpha Bakery", "formatted_address": "1 Main St", "rating": 4.2, "user_ratings_total": 10},
                {"place_id": "B", "name": "Beta Bakery"}
            ]
        }"#;
        let results = parse_search_body(body).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].place_id.as_deref(), Some("A"));
        assert_eq!(results[1].user_ratings_total, None);
    }

    #[test]
    fn test_parse_search_body_zero_results() {
        let results = parse_search_body(r#"{"status": "ZERO_RESULTS", "results": []}"#).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let client =
            PlacesClient::with_base_url("http://localhost:1234/api/", Duration::from_secs(1))
                .unwrap();
        assert_eq!(client.base_url, "http://localhost:1234/api");
    }

    #[tokio::test]
    async fn test_unreachable_host_maps_to_unreachable() {
        // Port 9 (discard) is closed on test machines, so the connect fails fast
        let client =
            PlacesClient::with_base_url("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let result = client.get_reviews_for_business("place", "key", 5).await;
        assert!(matches!(result, Err(ProviderError::Unreachable(_))));
    }

    #[tokio::test]
    async fn test_transport_errors_never_contain_the_key() {
        let client =
            PlacesClient::with_base_url("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();

        let err = client
            .get_reviews_for_business("place", "SECRET-KEY-123", 5)
            .await
            .unwrap_err();
        assert!(!err.to_string().contains("SECRET-KEY-123"), "{}", err);
        assert!(!format!("{:?}", err).contains("SECRET-KEY-123"));

        let err = client
            .search_businesses("corner cafe", "SECRET-KEY-123")
            .await
            .unwrap_err();
        assert!(!err.to_string().contains("SECRET-KEY-123"), "{}", err);
    }

    #[test]
    fn test_details_query_includes_language_when_set() {
        let client =
            PlacesClient::with_base_url("http://localhost", Duration::from_secs(1)).unwrap();
        let params = client.details_query("place", "key");
        assert!(!params.iter().any(|(name, _)| *name == "language"));

        let client = client.with_language(Some("de".to_string()));
        let params = client.details_query("place", "key");
        assert_eq!(params.last(), Some(&("language", "de")));
        assert!(params.contains(&("fields", DETAILS_FIELDS)));
    }
}
