//! Command dispatch
//!
//! [`App`] wires the stores, the provider client, and the refresh gate
//! together and runs one parsed [`Command`], writing human-readable output.

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::cache::{FileReviewStore, ReviewStore, StoreError};
use crate::cli::{self, CliError, Command};
use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigError, ConfigStore, JsonConfigStore, Settings, SettingsUpdate};
use crate::data::{PlacesClient, ProviderError};
use crate::feed::{format_review, ReviewFeed};
use crate::lock::DirLock;
use crate::refresh::{
    Availability, RefreshError, RefreshGate, RefreshHandle, RefreshMessage, RefreshSchedule,
};

/// Anything that can stop a command
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Cli(#[from] CliError),

    #[error(transparent)]
    Refresh(#[from] RefreshError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Could not determine a home directory; pass --data-dir")]
    NoDataDir,

    #[error("Output error: {0}")]
    Io(#[from] io::Error),
}

/// Lock file next to the review snapshot
const REFRESH_LOCK_FILE: &str = "refresh.lock";

pub struct App {
    gate: Arc<RefreshGate>,
    config: Arc<dyn ConfigStore>,
}

impl App {
    pub fn new(gate: Arc<RefreshGate>, config: Arc<dyn ConfigStore>) -> Self {
        Self { gate, config }
    }

    /// Opens the file-backed stores and the Places client
    ///
    /// With `data_dir` both files live there; otherwise the XDG cache and
    /// config directories are used. Refreshes are single-flight across every
    /// process using the same cache directory.
    pub fn open(
        data_dir: Option<&Path>,
        fallback_credential: Option<String>,
    ) -> Result<Self, AppError> {
        let (snapshot_path, config_path) = match data_dir {
            Some(dir) => (FileReviewStore::path_in(dir), JsonConfigStore::path_in(dir)),
            None => (
                FileReviewStore::default_path().ok_or(AppError::NoDataDir)?,
                JsonConfigStore::default_path().ok_or(AppError::NoDataDir)?,
            ),
        };

        let refresh_lock = DirLock::new(snapshot_path.with_file_name(REFRESH_LOCK_FILE));
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = Arc::new(FileReviewStore::open(snapshot_path, clock.clone())?);
        let config: Arc<dyn ConfigStore> = Arc::new(JsonConfigStore::open(config_path)?);
        let language = Settings::load(config.as_ref()).language;
        let provider = Arc::new(PlacesClient::new()?.with_language(language));

        let gate = RefreshGate::new(store, provider, config.clone(), clock)
            .with_fallback_credential(fallback_credential)
            .with_process_lock(refresh_lock);

        Ok(Self::new(Arc::new(gate), config))
    }

    pub async fn run(&self, command: Command, out: &mut dyn Write) -> Result<(), AppError> {
        match command {
            Command::Refresh => {
                let outcome = self.gate.request_refresh().await?;
                writeln!(out, "Fetched {} reviews", outcome.count)?;
            }
            Command::Status => self.print_status(out)?,
            Command::Show {
                limit,
                order,
                direction,
            } => {
                let options = cli::read_options(limit, &order, &direction)?;
                let feed = ReviewFeed::query(self.gate.store().as_ref(), options);
                if feed.is_empty {
                    writeln!(
                        out,
                        "No reviews cached yet. Connect a business and run `reviewcache refresh`."
                    )?;
                }
                for review in &feed.reviews {
                    writeln!(out, "{}\n", format_review(review))?;
                }
            }
            Command::Search { query } => {
                let query = cli::parse_search_query(&query)?;
                let results = self.gate.search_businesses(&query).await?;
                if results.is_empty() {
                    writeln!(out, "No businesses found for \"{}\"", query)?;
                }
                for business in results {
                    writeln!(
                        out,
                        "{}\n  {}\n  {:.1} stars, {} reviews\n  id: {}",
                        business.name,
                        business.address,
                        business.rating,
                        business.review_count,
                        business.id
                    )?;
                }
            }
            Command::Connect { business_id, name } => {
                self.gate.connect(&business_id, name.as_deref()).await?;
                writeln!(out, "Connected to {}", name.as_deref().unwrap_or(&business_id))?;
            }
            Command::Disconnect => {
                self.gate.disconnect().await?;
                writeln!(out, "Disconnected; cached reviews cleared")?;
            }
            Command::Config {
                cache_hours,
                max_reviews,
                api_key,
                language,
            } => {
                let update = SettingsUpdate {
                    cache_duration_hours: cache_hours,
                    max_reviews,
                    credential: api_key,
                    language,
                };
                update.apply(self.config.as_ref())?;
                self.print_settings(out)?;
            }
            Command::Watch { every_minutes } => {
                let schedule = cli::watch_schedule(every_minutes)?;
                self.watch(schedule, out).await?;
            }
        }
        Ok(())
    }

    fn print_status(&self, out: &mut dyn Write) -> Result<(), AppError> {
        let settings = self.gate.settings();
        let status = self.gate.store().status();

        match (&settings.business_name, &settings.business_id) {
            (Some(name), Some(id)) => writeln!(out, "Business:  {} ({})", name, id)?,
            (None, Some(id)) => writeln!(out, "Business:  {}", id)?,
            _ => writeln!(out, "Business:  none selected")?,
        }
        writeln!(out, "Connected: {}", if settings.connected { "yes" } else { "no" })?;
        writeln!(out, "Reviews:   {}", status.count)?;
        if status.cached_at > 0 {
            let fresh = self
                .gate
                .store()
                .is_valid(settings.cache_duration_hours as f64);
            writeln!(
                out,
                "Age:       {:.1} hours ({})",
                status.age_hours,
                if fresh { "fresh" } else { "stale" }
            )?;
        }
        match self.gate.availability() {
            Availability::Ready => writeln!(out, "Refresh:   available now")?,
            Availability::Wait { hours_remaining } => {
                writeln!(out, "Refresh:   available in {} hours", hours_remaining)?
            }
        }
        Ok(())
    }

    fn print_settings(&self, out: &mut dyn Write) -> Result<(), AppError> {
        let settings = Settings::load(self.config.as_ref());
        let json = serde_json::to_string_pretty(&settings).map_err(ConfigError::from)?;
        writeln!(out, "{}", json)?;
        writeln!(
            out,
            "API key: {}",
            if settings.credential.is_some() { "set" } else { "not set" }
        )?;
        Ok(())
    }

    async fn watch(
        &self,
        schedule: RefreshSchedule,
        out: &mut dyn Write,
    ) -> Result<(), AppError> {
        writeln!(
            out,
            "Refreshing every {} minutes; Ctrl-C to stop",
            schedule.every.as_secs() / 60
        )?;
        let mut handle = RefreshHandle::spawn(Arc::clone(&self.gate), schedule);

        loop {
            tokio::select! {
                message = handle.receiver.recv() => {
                    match message {
                        Some(RefreshMessage::Started) => {}
                        Some(RefreshMessage::Refreshed { count }) => {
                            writeln!(out, "Fetched {} reviews", count)?
                        }
                        Some(RefreshMessage::Skipped(reason)) => {
                            writeln!(out, "Skipped: {}", reason)?
                        }
                        Some(RefreshMessage::Failed(err)) => writeln!(out, "Failed: {}", err)?,
                        None => break,
                    }
                    out.flush()?;
                }
                _ = tokio::signal::ctrl_c() => break,
            }
        }

        handle.shutdown().await;
        Ok(())
    }
}
