//! Poll coordinator
//!
//! The PollCoordinator is responsible for:
//! - Fetching every configured tracking number, one after the other
//! - Publishing the complete result as a new [`Snapshot`]
//! - Turning per-number failures into a coordinator-level failure state
//! - Driving the cycle on a fixed interval, starting with an eager refresh
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────┐
//! │ ShipmentSource │◄── fetch(n) for n in tracking_numbers ──┐
//! └────────────────┘                                         │
//!                                                  ┌─────────────────┐
//!                                                  │ PollCoordinator │
//!                                                  └─────────────────┘
//!                                                           │
//!             ┌─────────────────────────────┬───────────────┴─────────────┐
//!             ▼                             ▼                             ▼
//!     ┌───────────────┐            ┌────────────────┐             ┌─────────────┐
//!     │   Snapshot    │            │     State      │             │   Events    │
//!     │ (watch, Arc)  │            │ (watch)        │             │ (mpsc)      │
//!     └───────────────┘            └────────────────┘             └─────────────┘
//! ```
//!
//! ## Cycle Semantics
//!
//! A cycle is all-or-nothing. The first failing number aborts it and nothing
//! is published; subscribers keep seeing the last snapshot that was complete.
//! An authentication failure additionally stops the run loop, since polling
//! again with the same credentials cannot succeed.

use crate::config::TrackerConfig;
use crate::error::{Error, Result};
use crate::traits::ShipmentSource;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, error, info, warn};

/// Capacity of the coordinator event channel
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 100;

/// The latest complete set of shipment records, keyed by tracking number
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    shipments: HashMap<String, serde_json::Value>,
}

impl Snapshot {
    /// Build a snapshot from a complete mapping
    pub fn new(shipments: HashMap<String, serde_json::Value>) -> Self {
        Self { shipments }
    }

    /// Raw provider record for a tracking number
    pub fn get(&self, tracking_number: &str) -> Option<&serde_json::Value> {
        self.shipments.get(tracking_number)
    }

    /// Whether a tracking number is present
    pub fn contains(&self, tracking_number: &str) -> bool {
        self.shipments.contains_key(tracking_number)
    }

    /// Number of shipments
    pub fn len(&self) -> usize {
        self.shipments.len()
    }

    /// True when nothing has been published yet
    pub fn is_empty(&self) -> bool {
        self.shipments.is_empty()
    }

    /// Iterate over (tracking number, raw record)
    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.shipments.iter()
    }
}

/// Why a cycle did not publish a snapshot
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CycleFailure {
    /// Credentials were rejected; reconfiguration is needed
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// Any other failure; the next cycle may succeed
    #[error("update failed: {0}")]
    UpdateFailed(String),
}

/// Outcome of the most recent cycle
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CoordinatorStatus {
    /// No cycle has finished yet
    #[default]
    Pending,
    /// The last cycle published a snapshot
    Ok,
    /// The last cycle hit an authentication error
    AuthFailed(String),
    /// The last cycle failed for another reason
    UpdateFailed(String),
}

/// Coordinator state as seen by subscribers
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoordinatorState {
    /// Outcome of the most recent cycle
    pub status: CoordinatorStatus,
    /// When a snapshot was last published
    pub last_success_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl CoordinatorState {
    /// Whether the most recent cycle succeeded
    pub fn last_update_success(&self) -> bool {
        self.status == CoordinatorStatus::Ok
    }
}

/// Events emitted by the PollCoordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorEvent {
    /// Run loop started
    Started {
        name: String,
        tracking_numbers: usize,
    },

    /// A cycle started
    CycleStarted {
        tracking_numbers: usize,
    },

    /// A cycle published a new snapshot
    CycleSucceeded {
        shipments: usize,
    },

    /// A cycle was aborted by an authentication error
    AuthFailed {
        error: String,
    },

    /// A cycle was aborted by any other error
    UpdateFailed {
        error: String,
    },

    /// Run loop stopped
    Stopped {
        reason: String,
    },
}

/// Periodic poll coordinator for one configuration record
///
/// ## Lifecycle
///
/// 1. Create with [`PollCoordinator::new()`]
/// 2. Grab receivers with [`subscribe()`](PollCoordinator::subscribe) or
///    [`updates()`](PollCoordinator::updates)
/// 3. Start with [`run()`](PollCoordinator::run) or
///    [`run_until()`](PollCoordinator::run_until)
///
/// [`refresh()`](PollCoordinator::refresh) can also be driven by hand when
/// an external scheduler owns the timer.
pub struct PollCoordinator {
    /// Name used in logs
    name: String,

    /// Source for shipment records
    source: Box<dyn ShipmentSource>,

    /// Tracking numbers in stored order
    tracking_numbers: Vec<String>,

    /// Interval between cycles
    interval: Duration,

    /// Latest published snapshot
    snapshot_tx: watch::Sender<Arc<Snapshot>>,

    /// Latest cycle outcome
    state_tx: watch::Sender<CoordinatorState>,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<CoordinatorEvent>,
}

impl PollCoordinator {
    /// Create a new poll coordinator
    ///
    /// # Parameters
    ///
    /// - `name`: Name used in logs and events
    /// - `source`: Shipment source (owned for the coordinator's lifetime)
    /// - `config`: Configuration record providing numbers and interval
    ///
    /// # Returns
    ///
    /// A tuple of (coordinator, event_receiver)
    pub fn new(
        name: impl Into<String>,
        source: Box<dyn ShipmentSource>,
        config: &TrackerConfig,
    ) -> Result<(Self, mpsc::Receiver<CoordinatorEvent>)> {
        config.validate()?;

        let (event_tx, event_rx) = mpsc::channel(DEFAULT_EVENT_CHANNEL_CAPACITY);
        let (snapshot_tx, _) = watch::channel(Arc::new(Snapshot::default()));
        let (state_tx, _) = watch::channel(CoordinatorState::default());

        let coordinator = Self {
            name: name.into(),
            source,
            tracking_numbers: config.tracking_numbers.clone(),
            interval: config.poll_interval(),
            snapshot_tx,
            state_tx,
            event_tx,
        };

        Ok((coordinator, event_rx))
    }

    /// Override the interval between cycles
    ///
    /// Intended for embedding and tests; configuration records are bounded
    /// to whole minutes.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Coordinator name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Interval between cycles
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Tracking numbers in poll order
    pub fn tracking_numbers(&self) -> &[String] {
        &self.tracking_numbers
    }

    /// Latest published snapshot (empty before the first successful cycle)
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot_tx.borrow().clone()
    }

    /// Latest coordinator state
    pub fn state(&self) -> CoordinatorState {
        self.state_tx.borrow().clone()
    }

    /// Subscribe to published snapshots
    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.snapshot_tx.subscribe()
    }

    /// Subscribe to coordinator state changes
    pub fn subscribe_state(&self) -> watch::Receiver<CoordinatorState> {
        self.state_tx.subscribe()
    }

    /// Stream of snapshots published after this call
    pub fn updates(&self) -> WatchStream<Arc<Snapshot>> {
        WatchStream::from_changes(self.snapshot_tx.subscribe())
    }

    /// Run one cycle
    ///
    /// Fetches every tracking number in order. On success the complete
    /// snapshot is published and returned. On the first failure the cycle is
    /// aborted and the previous snapshot stays published.
    pub async fn refresh(&self) -> std::result::Result<Arc<Snapshot>, CycleFailure> {
        self.emit_event(CoordinatorEvent::CycleStarted {
            tracking_numbers: self.tracking_numbers.len(),
        });

        match self.fetch_all().await {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                self.snapshot_tx.send_replace(Arc::clone(&snapshot));
                self.state_tx.send_replace(CoordinatorState {
                    status: CoordinatorStatus::Ok,
                    last_success_at: Some(chrono::Utc::now()),
                });

                info!(
                    "[{}] Fetched {} shipment(s)",
                    self.name,
                    snapshot.len()
                );
                self.emit_event(CoordinatorEvent::CycleSucceeded {
                    shipments: snapshot.len(),
                });
                Ok(snapshot)
            }
            Err(failure) => {
                let (status, event) = match &failure {
                    CycleFailure::AuthFailed(msg) => (
                        CoordinatorStatus::AuthFailed(msg.clone()),
                        CoordinatorEvent::AuthFailed { error: msg.clone() },
                    ),
                    CycleFailure::UpdateFailed(msg) => (
                        CoordinatorStatus::UpdateFailed(msg.clone()),
                        CoordinatorEvent::UpdateFailed { error: msg.clone() },
                    ),
                };

                warn!("[{}] Cycle failed: {}", self.name, failure);
                self.state_tx.send_modify(|state| state.status = status);
                self.emit_event(event);
                Err(failure)
            }
        }
    }

    /// Fetch all tracking numbers, stopping at the first failure
    async fn fetch_all(&self) -> std::result::Result<Snapshot, CycleFailure> {
        let mut shipments = HashMap::with_capacity(self.tracking_numbers.len());

        for number in &self.tracking_numbers {
            debug!("[{}] Fetching shipment {}", self.name, number);

            match self.source.fetch(number).await {
                Ok(result) => {
                    shipments.insert(number.clone(), result.raw);
                }
                Err(Error::Authentication(msg)) => {
                    return Err(CycleFailure::AuthFailed(msg));
                }
                Err(e @ Error::Request { .. }) => {
                    return Err(CycleFailure::UpdateFailed(e.to_string()));
                }
                Err(e) => {
                    return Err(CycleFailure::UpdateFailed(format!(
                        "Unexpected error for {}: {}",
                        number, e
                    )));
                }
            }
        }

        Ok(Snapshot::new(shipments))
    }

    /// Run the coordinator until Ctrl-C
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Clean shutdown
    /// - `Err(Error::Authentication)`: Credentials were rejected; polling stopped
    pub async fn run(&self) -> Result<()> {
        self.run_internal(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
            }
        })
        .await
    }

    /// Run the coordinator until `shutdown_rx` fires (or its sender is dropped)
    pub async fn run_until(&self, shutdown_rx: oneshot::Receiver<()>) -> Result<()> {
        self.run_internal(async {
            let _ = shutdown_rx.await;
        })
        .await
    }

    async fn run_internal<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        info!(
            "[{}] Polling {} tracking number(s) every {:?}",
            self.name,
            self.tracking_numbers.len(),
            self.interval
        );
        self.emit_event(CoordinatorEvent::Started {
            name: self.name.clone(),
            tracking_numbers: self.tracking_numbers.len(),
        });

        // The first tick completes immediately, which gives the eager refresh.
        // Cycles never overlap: the next tick is only awaited once the
        // current cycle has returned.
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // A cycle cut short publishes nothing
                    let outcome = tokio::select! {
                        outcome = self.refresh() => outcome,
                        _ = &mut shutdown => {
                            info!("[{}] Shutdown signal received, cycle abandoned", self.name);
                            self.emit_stopped();
                            break;
                        }
                    };

                    if let Err(CycleFailure::AuthFailed(msg)) = outcome {
                        error!("[{}] Authentication failed, polling stopped: {}", self.name, msg);
                        self.emit_event(CoordinatorEvent::Stopped {
                            reason: "Authentication failed".to_string(),
                        });
                        return Err(Error::Authentication(msg));
                    }
                }

                _ = &mut shutdown => {
                    info!("[{}] Shutdown signal received", self.name);
                    self.emit_stopped();
                    break;
                }
            }
        }

        Ok(())
    }

    fn emit_stopped(&self) {
        self.emit_event(CoordinatorEvent::Stopped {
            reason: "Shutdown signal".to_string(),
        });
    }

    /// Emit a coordinator event, dropping it if the channel is full
    fn emit_event(&self, event: CoordinatorEvent) {
        if let Err(mpsc::error::TrySendError::Full(_)) = self.event_tx.try_send(event) {
            warn!("[{}] Event channel full, dropping event", self.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_accessors() {
        let mut shipments = HashMap::new();
        shipments.insert("123".to_string(), serde_json::json!({"id": "123"}));
        let snapshot = Snapshot::new(shipments);

        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains("123"));
        assert!(!snapshot.contains("456"));
        assert_eq!(snapshot.get("123").unwrap()["id"], "123");
        assert!(Snapshot::default().is_empty());
    }

    #[test]
    fn test_state_default_is_pending() {
        let state = CoordinatorState::default();
        assert_eq!(state.status, CoordinatorStatus::Pending);
        assert!(!state.last_update_success());
        assert!(state.last_success_at.is_none());
    }

    #[test]
    fn test_cycle_failure_display() {
        assert_eq!(
            CycleFailure::UpdateFailed("boom".to_string()).to_string(),
            "update failed: boom"
        );
    }
}
