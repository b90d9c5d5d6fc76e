//! Background refresh loop
//!
//! Drives a [`RefreshGate`] on a fixed interval and reports each attempt over
//! a tokio channel. The gate still enforces the refresh interval, so ticking
//! more often than the interval only produces `Skipped` messages.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use super::{RefreshError, RefreshGate};

/// Messages sent from the background loop to its owner
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshMessage {
    /// An attempt is starting
    Started,
    /// New reviews were committed
    Refreshed { count: usize },
    /// The gate turned the attempt away (rate limited or already running)
    Skipped(RefreshError),
    /// The attempt ran and failed; the previous snapshot is still served
    Failed(RefreshError),
}

/// How often the loop ticks
#[derive(Debug, Clone)]
pub struct RefreshSchedule {
    pub every: Duration,
    /// Attempt once right away instead of waiting a full period
    pub immediate: bool,
    /// Whether auto-refresh is enabled
    pub enabled: bool,
}

impl Default for RefreshSchedule {
    fn default() -> Self {
        Self {
            every: Duration::from_secs(3600),
            immediate: true,
            enabled: true,
        }
    }
}

/// Handle for controlling the background refresh loop
pub struct RefreshHandle {
    /// Channel for receiving refresh messages
    pub receiver: mpsc::Receiver<RefreshMessage>,
    shutdown_tx: mpsc::Sender<()>,
}

impl RefreshHandle {
    /// Spawns the loop; messages arrive on `receiver`
    pub fn spawn(gate: Arc<RefreshGate>, schedule: RefreshSchedule) -> Self {
        let (msg_tx, msg_rx) = mpsc::channel(32);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        if schedule.enabled {
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(schedule.every);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                if !schedule.immediate {
                    interval.tick().await;
                }

                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            if msg_tx.send(RefreshMessage::Started).await.is_err() {
                                break;
                            }

                            let message = match gate.request_refresh().await {
                                Ok(outcome) => RefreshMessage::Refreshed { count: outcome.count },
                                Err(e) if e.is_skip() => RefreshMessage::Skipped(e),
                                Err(e) => RefreshMessage::Failed(e),
                            };
                            if msg_tx.send(message).await.is_err() {
                                break;
                            }
                        }
                        _ = shutdown_rx.recv() => {
                            tracing::debug!("refresh loop shutting down");
                            break;
                        }
                    }
                }
            });
        }

        Self {
            receiver: msg_rx,
            shutdown_tx,
        }
    }

    /// Stops the loop after any attempt in progress
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

/// Checks for a pending message without blocking
pub fn try_recv(handle: &mut RefreshHandle) -> Option<RefreshMessage> {
    handle.receiver.try_recv().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryReviewStore;
    use crate::clock::ManualClock;
    use crate::config::{keys, ConfigStore, MemoryConfigStore};
    use crate::refresh::gate::test_support::{raws, Reply, StubProvider};
    use serde_json::Value;

    fn configured_gate(reply: Reply) -> (Arc<RefreshGate>, Arc<StubProvider>) {
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let config = Arc::new(MemoryConfigStore::new());
        config.set(keys::CREDENTIAL, Value::from("test-key")).unwrap();
        config.set(keys::BUSINESS_ID, Value::from("place-1")).unwrap();
        let provider = Arc::new(StubProvider::new(reply));

        let gate = RefreshGate::new(
            Arc::new(MemoryReviewStore::new(clock.clone())),
            provider.clone(),
            config,
            clock,
        );
        (Arc::new(gate), provider)
    }

    async fn next(handle: &mut RefreshHandle) -> RefreshMessage {
        tokio::time::timeout(Duration::from_secs(5), handle.receiver.recv())
            .await
            .expect("message should arrive")
            .expect("channel should be open")
    }

    #[test]
    fn test_refresh_schedule_default() {
        let schedule = RefreshSchedule::default();
        assert_eq!(schedule.every, Duration::from_secs(3600));
        assert!(schedule.immediate);
        assert!(schedule.enabled);
    }

    #[tokio::test]
    async fn test_refresh_handle_spawn_disabled() {
        let (gate, provider) = configured_gate(Reply::Reviews(raws(1..=2)));
        let schedule = RefreshSchedule {
            enabled: false,
            ..Default::default()
        };

        let mut handle = RefreshHandle::spawn(gate, schedule);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(try_recv(&mut handle).is_none());
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_immediate_tick_refreshes_then_skips() {
        let (gate, provider) = configured_gate(Reply::Reviews(raws(1..=4)));
        let schedule = RefreshSchedule {
            every: Duration::from_millis(20),
            ..Default::default()
        };

        let mut handle = RefreshHandle::spawn(gate, schedule);

        assert_eq!(next(&mut handle).await, RefreshMessage::Started);
        assert_eq!(next(&mut handle).await, RefreshMessage::Refreshed { count: 4 });
        assert_eq!(next(&mut handle).await, RefreshMessage::Started);
        assert_eq!(
            next(&mut handle).await,
            RefreshMessage::Skipped(RefreshError::RateLimited { hours_remaining: 24 })
        );
        assert_eq!(provider.calls(), 1);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_provider_failure_is_reported() {
        let (gate, _provider) = configured_gate(Reply::Status("REQUEST_DENIED"));
        let mut handle = RefreshHandle::spawn(gate, RefreshSchedule::default());

        assert_eq!(next(&mut handle).await, RefreshMessage::Started);
        assert!(matches!(
            next(&mut handle).await,
            RefreshMessage::Failed(RefreshError::ProviderError { .. })
        ));

        handle.shutdown().await;
    }
}
