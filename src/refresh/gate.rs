//! The refresh gate
//!
//! One refresh attempt walks these steps, stopping at the first failure:
//!
//! 1. credential and business id must be configured
//! 2. the single-flight guard must be free
//! 3. the refresh interval must have elapsed (or nothing was ever fetched)
//! 4. the provider call must succeed with at least one review
//! 5. the normalized reviews must commit to the store
//!
//! Only after step 5 does `last_fetch_at` move, so a failure anywhere leaves
//! both the snapshot and the interval untouched.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::RefreshError;
use crate::cache::ReviewStore;
use crate::clock::Clock;
use crate::config::{keys, ConfigStore, Settings};
use crate::data::places::DEFAULT_REQUEST_TIMEOUT;
use crate::data::sanitize::{normalize_business, normalize_review, sanitize_line};
use crate::data::{BusinessCandidate, Review, ReviewsProvider};
use crate::lock::{DirLock, DirLockGuard};

/// Most candidates a business search returns
pub const SEARCH_RESULT_LIMIT: usize = 5;

/// Longest business id accepted by `connect`
const BUSINESS_ID_MAX: usize = 255;

const SECS_PER_HOUR: i64 = 3600;

/// Whether a refresh would currently be allowed by the interval policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Ready,
    /// The interval has not elapsed; rounded up to whole hours
    Wait { hours_remaining: i64 },
}

/// Applies the interval policy to `settings` at time `now`
///
/// A `last_fetch_at` of 0 means nothing was ever fetched and is always ready.
pub fn availability_at(settings: &Settings, now: i64) -> Availability {
    if settings.last_fetch_at == 0 {
        return Availability::Ready;
    }

    let window = settings.cache_duration_secs();
    let elapsed = (now - settings.last_fetch_at).max(0);
    if elapsed >= window {
        return Availability::Ready;
    }

    let remaining = window - elapsed;
    Availability::Wait {
        hours_remaining: (remaining + SECS_PER_HOUR - 1) / SECS_PER_HOUR,
    }
}

/// Result of a successful refresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshOutcome {
    pub count: usize,
    /// The committed reviews in provider order
    pub reviews: Vec<Review>,
}

/// Gatekeeper between callers and the reviews provider
pub struct RefreshGate {
    store: Arc<dyn ReviewStore>,
    provider: Arc<dyn ReviewsProvider>,
    config: Arc<dyn ConfigStore>,
    clock: Arc<dyn Clock>,
    /// Held from the interval check until the commit finishes
    guard: Arc<Mutex<()>>,
    provider_timeout: Duration,
    /// Used when the config store has no credential (e.g. from the environment)
    fallback_credential: Option<String>,
    /// Shared with other processes using the same data directory
    process_lock: Option<DirLock>,
}

impl RefreshGate {
    pub fn new(
        store: Arc<dyn ReviewStore>,
        provider: Arc<dyn ReviewsProvider>,
        config: Arc<dyn ConfigStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            provider,
            config,
            clock,
            guard: Arc::new(Mutex::new(())),
            provider_timeout: DEFAULT_REQUEST_TIMEOUT,
            fallback_credential: None,
            process_lock: None,
        }
    }

    /// Extends single-flight to every process that uses `lock`
    pub fn with_process_lock(mut self, lock: DirLock) -> Self {
        self.process_lock = Some(lock);
        self
    }

    /// Bounds every provider call, on top of whatever the provider enforces
    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    pub fn with_fallback_credential(mut self, credential: Option<String>) -> Self {
        self.fallback_credential = credential.filter(|c| !c.trim().is_empty());
        self
    }

    /// The review store this gate commits to
    pub fn store(&self) -> &Arc<dyn ReviewStore> {
        &self.store
    }

    pub fn settings(&self) -> Settings {
        Settings::load(self.config.as_ref())
    }

    fn credential(&self, settings: &Settings) -> Option<String> {
        settings
            .credential
            .clone()
            .or_else(|| self.fallback_credential.clone())
    }

    fn configured(&self, settings: &Settings) -> Result<(String, String), RefreshError> {
        let credential = self
            .credential(settings)
            .ok_or(RefreshError::NotConfigured)?;
        let business_id = settings
            .business_id
            .clone()
            .ok_or(RefreshError::NoBusinessSelected)?;
        Ok((credential, business_id))
    }

    /// Waits for the cross-process lock, if there is one
    async fn hold_process_lock(&self) -> Result<Option<DirLockGuard>, RefreshError> {
        let Some(lock) = self.process_lock.clone() else {
            return Ok(None);
        };
        let guard = tokio::task::spawn_blocking(move || lock.acquire())
            .await
            .map_err(|e| RefreshError::Interrupted(e.to_string()))?
            .map_err(|e| RefreshError::Storage(e.to_string()))?;
        Ok(Some(guard))
    }

    /// Whether `request_refresh` would pass the interval check right now
    ///
    /// Use this for "available in N hours" displays so they match the policy
    /// actually enforced.
    pub fn availability(&self) -> Availability {
        availability_at(&self.settings(), self.clock.now())
    }

    /// Attempts a refresh now
    ///
    /// The fetch and commit run on a spawned task that owns the guard, so a
    /// caller that stops waiting does not abort a commit in flight.
    pub async fn request_refresh(self: &Arc<Self>) -> Result<RefreshOutcome, RefreshError> {
        self.configured(&self.settings())?;

        let guard = Arc::clone(&self.guard).try_lock_owned().map_err(|_| {
            info!("refresh already in progress");
            RefreshError::RefreshInProgress
        })?;
        let process_guard = match &self.process_lock {
            Some(lock) => match lock.try_acquire() {
                Ok(Some(held)) => Some(held),
                Ok(None) => {
                    info!("refresh in progress in another process");
                    return Err(RefreshError::RefreshInProgress);
                }
                Err(e) => return Err(RefreshError::Storage(e.to_string())),
            },
            None => None,
        };

        // Re-read under the guard; a refresh that just finished moved last_fetch_at
        let settings = self.settings();
        let (credential, business_id) = self.configured(&settings)?;

        if let Availability::Wait { hours_remaining } = availability_at(&settings, self.clock.now())
        {
            info!(hours_remaining, "refresh rate limited");
            return Err(RefreshError::RateLimited { hours_remaining });
        }

        let gate = Arc::clone(self);
        let task = tokio::spawn(async move {
            let _guards = (guard, process_guard);
            gate.fetch_and_commit(&settings, &credential, &business_id)
                .await
        });

        let result = task
            .await
            .map_err(|e| RefreshError::Interrupted(e.to_string()))?;
        if let Err(ref e) = result {
            warn!(error = %e, "refresh failed");
        }
        result
    }

    async fn fetch_and_commit(
        &self,
        settings: &Settings,
        credential: &str,
        business_id: &str,
    ) -> Result<RefreshOutcome, RefreshError> {
        info!(business_id, max_reviews = settings.max_reviews, "fetching reviews");

        let fetch =
            self.provider
                .get_reviews_for_business(business_id, credential, settings.max_reviews);
        let raw = tokio::time::timeout(self.provider_timeout, fetch)
            .await
            .map_err(|_| {
                RefreshError::ProviderUnreachable(format!(
                    "no response within {:?}",
                    self.provider_timeout
                ))
            })??;

        if raw.is_empty() {
            return Err(RefreshError::EmptyResult);
        }

        let reviews: Vec<Review> = raw
            .iter()
            .take(settings.max_reviews)
            .map(normalize_review)
            .collect();
        let count = reviews.len();

        self.store.replace(reviews.clone())?;
        self.config
            .set(keys::LAST_FETCH_AT, Value::from(self.clock.now()))?;

        info!(count, "reviews refreshed");
        Ok(RefreshOutcome { count, reviews })
    }

    /// Looks up businesses matching `query`, best match first
    ///
    /// Returns at most [`SEARCH_RESULT_LIMIT`] candidates in the provider's
    /// order. Callers are expected to reject very short queries beforehand.
    pub async fn search_businesses(
        &self,
        query: &str,
    ) -> Result<Vec<BusinessCandidate>, RefreshError> {
        let credential = self
            .credential(&self.settings())
            .ok_or(RefreshError::NotConfigured)?;

        let search = self.provider.search_businesses(query, &credential);
        let raw = tokio::time::timeout(self.provider_timeout, search)
            .await
            .map_err(|_| {
                RefreshError::ProviderUnreachable(format!(
                    "no response within {:?}",
                    self.provider_timeout
                ))
            })??;

        Ok(raw
            .iter()
            .filter_map(normalize_business)
            .take(SEARCH_RESULT_LIMIT)
            .collect())
    }

    /// Selects the business whose reviews are cached
    ///
    /// Switching from another business drops that business's snapshot and
    /// resets the interval, as a disconnect would.
    pub async fn connect(
        &self,
        business_id: &str,
        business_name: Option<&str>,
    ) -> Result<(), RefreshError> {
        let business_id = sanitize_line(business_id, BUSINESS_ID_MAX);
        if business_id.is_empty() {
            return Err(RefreshError::NoBusinessSelected);
        }

        let business_name = business_name
            .map(|n| sanitize_line(n, BUSINESS_ID_MAX))
            .filter(|n| !n.is_empty());

        let _guard = self.guard.lock().await;
        let _process_guard = self.hold_process_lock().await?;

        let settings = self.settings();
        let switching = settings
            .business_id
            .as_deref()
            .is_some_and(|previous| previous != business_id);
        if switching {
            info!(next = %business_id, "switching business");
            self.store.clear()?;
        }

        self.config.update(&mut |values| {
            values.insert(keys::BUSINESS_ID.to_string(), Value::from(business_id.as_str()));
            match &business_name {
                Some(name) => {
                    values.insert(keys::BUSINESS_NAME.to_string(), Value::from(name.as_str()))
                }
                None => values.remove(keys::BUSINESS_NAME),
            };
            values.insert(keys::CONNECTED.to_string(), Value::from(true));
            if switching {
                values.insert(keys::LAST_FETCH_AT.to_string(), Value::from(0));
            }
        })?;

        info!(business_id = %business_id, "business connected");
        Ok(())
    }

    /// Forgets the selected business and everything cached for it
    ///
    /// Waits for an in-flight refresh, in this process or another one sharing
    /// the process lock, to finish first.
    pub async fn disconnect(&self) -> Result<(), RefreshError> {
        let _guard = self.guard.lock().await;
        let _process_guard = self.hold_process_lock().await?;

        self.config.update(&mut |values| {
            values.remove(keys::BUSINESS_ID);
            values.remove(keys::BUSINESS_NAME);
            values.insert(keys::CONNECTED.to_string(), Value::from(false));
            values.insert(keys::LAST_FETCH_AT.to_string(), Value::from(0));
        })?;
        self.store.clear()?;

        info!("business disconnected");
        Ok(())
    }
}
