//! Settings persistence
//!
//! A small key/value [`ConfigStore`] holds the operator's settings and the
//! refresh bookkeeping (`last_fetch_at`). [`Settings`] is the typed view the
//! rest of the crate reads, with defaults and range clamping applied.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use directories::ProjectDirs;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::cache::write_atomic;
use crate::lock::DirLock;

/// File name of the settings document inside the config directory
const CONFIG_FILE: &str = "config.json";

/// Environment variable consulted when no credential is stored
pub const CREDENTIAL_ENV: &str = "GOOGLE_PLACES_API_KEY";

/// Default minimum interval between provider fetches
pub const DEFAULT_CACHE_DURATION_HOURS: u32 = 24;

/// Allowed range for the refresh interval (one hour to one week)
pub const CACHE_DURATION_RANGE: (u32, u32) = (1, 168);

/// Default cap on the number of cached reviews
pub const DEFAULT_MAX_REVIEWS: usize = 10;

/// Allowed range for the review cap
pub const MAX_REVIEWS_RANGE: (usize, usize) = (1, 50);

/// Keys understood by the settings layer
pub mod keys {
    pub const CACHE_DURATION_HOURS: &str = "cache_duration_hours";
    pub const MAX_REVIEWS: &str = "max_reviews";
    pub const BUSINESS_ID: &str = "business_id";
    pub const BUSINESS_NAME: &str = "business_name";
    pub const CREDENTIAL: &str = "credential";
    pub const LANGUAGE: &str = "language";
    pub const LAST_FETCH_AT: &str = "last_fetch_at";
    pub const CONNECTED: &str = "connected";
}

/// Longest language tag accepted (BCP 47 allows up to 35 characters)
const LANGUAGE_MAX: usize = 35;

/// Errors that can occur when reading or writing settings
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid settings file: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A value given by the operator is outside its allowed range
    #[error("{key} must be between {min} and {max}, got {value}")]
    OutOfRange {
        key: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("Invalid language tag: '{0}'")]
    InvalidLanguage(String),
}

/// Key/value persistence for settings
///
/// Every change goes through [`ConfigStore::update`], which applies a whole
/// edit at once against the latest stored values.
pub trait ConfigStore: Send + Sync {
    /// Every stored value as of now
    fn entries(&self) -> BTreeMap<String, Value>;

    /// Applies `edit` to the current values and stores the result as one change
    fn update(
        &self,
        edit: &mut dyn FnMut(&mut BTreeMap<String, Value>),
    ) -> Result<(), ConfigError>;

    fn get(&self, key: &str) -> Option<Value> {
        self.entries().remove(key)
    }

    fn set(&self, key: &str, value: Value) -> Result<(), ConfigError> {
        self.update(&mut |values| {
            values.insert(key.to_string(), value.clone());
        })
    }

    /// Removes a key; removing a missing key is not an error
    fn remove(&self, key: &str) -> Result<(), ConfigError> {
        self.update(&mut |values| {
            values.remove(key);
        })
    }

    /// Non-empty string value for `key`
    fn get_string(&self, key: &str) -> Option<String> {
        string_value(self.get(key).as_ref())
    }

    fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key)?.as_i64()
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key)?.as_bool()
    }
}

fn string_value(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// Settings stored as one JSON object on disk
///
/// By default lives in the XDG config directory
/// (`~/.config/reviewcache/config.json` on Linux). Other processes may change
/// the file at any time, so reads go back to disk and every update re-reads
/// the file under a lock before writing it.
pub struct JsonConfigStore {
    path: PathBuf,
    lock: DirLock,
    /// Last values read successfully, served if the file turns unreadable
    values: RwLock<BTreeMap<String, Value>>,
}

impl JsonConfigStore {
    /// Default settings path under the XDG config directory
    pub fn default_path() -> Option<PathBuf> {
        let project_dirs = ProjectDirs::from("", "", "reviewcache")?;
        Some(project_dirs.config_dir().join(CONFIG_FILE))
    }

    /// Settings path inside a custom directory
    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(CONFIG_FILE)
    }

    /// Opens the settings file at `path`; a missing file means all defaults
    pub fn open(path: PathBuf) -> Result<Self, ConfigError> {
        let values = read_values(&path)?;
        Ok(Self {
            lock: DirLock::new(path.with_extension("lock")),
            path,
            values: RwLock::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn read_values(path: &Path) -> Result<BTreeMap<String, Value>, ConfigError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(serde_json::from_str(&content)?),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(BTreeMap::new()),
        Err(e) => Err(e.into()),
    }
}

impl ConfigStore for JsonConfigStore {
    fn entries(&self) -> BTreeMap<String, Value> {
        match read_values(&self.path) {
            Ok(values) => {
                *self.values.write().unwrap_or_else(|e| e.into_inner()) = values.clone();
                values
            }
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "using last readable settings"
                );
                self.values.read().unwrap_or_else(|e| e.into_inner()).clone()
            }
        }
    }

    fn update(
        &self,
        edit: &mut dyn FnMut(&mut BTreeMap<String, Value>),
    ) -> Result<(), ConfigError> {
        let _guard = self.lock.acquire()?;

        let current = read_values(&self.path)?;
        let mut next = current.clone();
        edit(&mut next);
        if next != current {
            let json = serde_json::to_vec_pretty(&next)?;
            write_atomic(&self.path, &json)?;
        }

        *self.values.write().unwrap_or_else(|e| e.into_inner()) = next;
        Ok(())
    }
}

/// Settings held in memory only
#[derive(Default)]
pub struct MemoryConfigStore {
    values: RwLock<BTreeMap<String, Value>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigStore for MemoryConfigStore {
    fn entries(&self) -> BTreeMap<String, Value> {
        self.values.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn update(
        &self,
        edit: &mut dyn FnMut(&mut BTreeMap<String, Value>),
    ) -> Result<(), ConfigError> {
        edit(&mut self.values.write().unwrap_or_else(|e| e.into_inner()));
        Ok(())
    }
}

/// Typed view of everything in the config store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settings {
    pub cache_duration_hours: u32,
    pub max_reviews: usize,
    pub business_id: Option<String>,
    pub business_name: Option<String>,
    #[serde(skip_serializing)]
    pub credential: Option<String>,
    /// Language tag sent to the provider, provider default if unset
    pub language: Option<String>,
    /// Seconds since epoch of the last successful fetch, 0 if never
    pub last_fetch_at: i64,
    pub connected: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_duration_hours: DEFAULT_CACHE_DURATION_HOURS,
            max_reviews: DEFAULT_MAX_REVIEWS,
            business_id: None,
            business_name: None,
            credential: None,
            language: None,
            last_fetch_at: 0,
            connected: false,
        }
    }
}

impl Settings {
    /// Reads settings, applying defaults and clamping stored values into range
    ///
    /// All fields come from one read of the store.
    pub fn load(store: &dyn ConfigStore) -> Self {
        let values = store.entries();
        let int = |key: &str| values.get(key).and_then(Value::as_i64);
        let string = |key: &str| string_value(values.get(key));

        let (min_hours, max_hours) = CACHE_DURATION_RANGE;
        let cache_duration_hours = match int(keys::CACHE_DURATION_HOURS) {
            Some(hours) if hours < min_hours as i64 || hours > max_hours as i64 => {
                let clamped = hours.clamp(min_hours as i64, max_hours as i64) as u32;
                tracing::warn!(stored = hours, using = clamped, "cache duration out of range");
                clamped
            }
            Some(hours) => hours as u32,
            None => DEFAULT_CACHE_DURATION_HOURS,
        };

        let (min_reviews, max_reviews) = MAX_REVIEWS_RANGE;
        let max_reviews = match int(keys::MAX_REVIEWS) {
            Some(n) if n < min_reviews as i64 || n > max_reviews as i64 => {
                let clamped = n.clamp(min_reviews as i64, max_reviews as i64) as usize;
                tracing::warn!(stored = n, using = clamped, "max reviews out of range");
                clamped
            }
            Some(n) => n as usize,
            None => DEFAULT_MAX_REVIEWS,
        };

        Self {
            cache_duration_hours,
            max_reviews,
            business_id: string(keys::BUSINESS_ID),
            business_name: string(keys::BUSINESS_NAME),
            credential: string(keys::CREDENTIAL),
            language: string(keys::LANGUAGE).filter(|tag| is_language_tag(tag)),
            last_fetch_at: int(keys::LAST_FETCH_AT).unwrap_or(0).max(0),
            connected: values
                .get(keys::CONNECTED)
                .and_then(Value::as_bool)
                .unwrap_or(false),
        }
    }

    /// Refresh interval in seconds
    pub fn cache_duration_secs(&self) -> i64 {
        self.cache_duration_hours as i64 * 3600
    }
}

fn check_range(key: &'static str, value: i64, (min, max): (i64, i64)) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::OutOfRange {
            key,
            value,
            min,
            max,
        });
    }
    Ok(())
}

/// Loose BCP 47 shape check: letters, digits and hyphens, starting with a letter
fn is_language_tag(tag: &str) -> bool {
    tag.len() >= 2
        && tag.len() <= LANGUAGE_MAX
        && tag.starts_with(|c: char| c.is_ascii_alphabetic())
        && tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// Operator changes to apply together
///
/// For `credential` and `language` an empty string removes the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsUpdate {
    pub cache_duration_hours: Option<i64>,
    pub max_reviews: Option<i64>,
    pub credential: Option<String>,
    pub language: Option<String>,
}

impl SettingsUpdate {
    /// Checks every field, then writes all of them in one store update
    ///
    /// If any field is invalid nothing is written.
    pub fn apply(&self, store: &dyn ConfigStore) -> Result<(), ConfigError> {
        let mut changes: Vec<(&'static str, Option<Value>)> = Vec::new();

        if let Some(hours) = self.cache_duration_hours {
            let (min, max) = CACHE_DURATION_RANGE;
            check_range(keys::CACHE_DURATION_HOURS, hours, (min as i64, max as i64))?;
            changes.push((keys::CACHE_DURATION_HOURS, Some(Value::from(hours))));
        }
        if let Some(n) = self.max_reviews {
            let (min, max) = MAX_REVIEWS_RANGE;
            check_range(keys::MAX_REVIEWS, n, (min as i64, max as i64))?;
            changes.push((keys::MAX_REVIEWS, Some(Value::from(n))));
        }
        if let Some(credential) = self.credential.as_deref().map(str::trim) {
            let value = (!credential.is_empty()).then(|| Value::from(credential));
            changes.push((keys::CREDENTIAL, value));
        }
        if let Some(language) = self.language.as_deref().map(str::trim) {
            if !language.is_empty() && !is_language_tag(language) {
                return Err(ConfigError::InvalidLanguage(language.to_string()));
            }
            let value = (!language.is_empty()).then(|| Value::from(language));
            changes.push((keys::LANGUAGE, value));
        }

        if changes.is_empty() {
            return Ok(());
        }
        store.update(&mut |values| {
            for (key, value) in &changes {
                match value {
                    Some(value) => values.insert(key.to_string(), value.clone()),
                    None => values.remove(*key),
                };
            }
        })
    }
}
