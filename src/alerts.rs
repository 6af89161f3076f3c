use crate::detector::Detector;
use crate::types::Alert;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

struct LogState {
    alerts: Vec<Alert>,
    total_detections: u64,
}

/// Rolling alert log plus the aggregate detection counter. Sole writer of
/// both; every update swaps the collection as a whole, so consumers always
/// see a consistent snapshot.
pub struct AlertStore {
    inner: Mutex<LogState>,
    max_entries: usize,
}

impl AlertStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(LogState {
                alerts: Vec::new(),
                total_detections: 0,
            }),
            max_entries,
        }
    }

    /// Prepend a locally generated alert, evicting the oldest entry past
    /// the capacity, and bump the aggregate counter.
    pub fn append(&self, alert: Alert) {
        let mut state = self.inner.lock();
        state.alerts.insert(0, alert);
        state.alerts.truncate(self.max_entries);
        state.total_detections += 1;
    }

    /// Wholesale replacement from a poll; the counter is set to the fetched
    /// set's size. Replace-wholesale by design: a locally appended alert not
    /// yet reflected by the backend can be overwritten by the next poll.
    pub fn replace_from_fetch(&self, alerts: Vec<Alert>) {
        let mut state = self.inner.lock();
        state.total_detections = alerts.len() as u64;
        state.alerts = alerts;
        state.alerts.truncate(self.max_entries);
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.inner.lock().alerts.clone()
    }

    pub fn total_detections(&self) -> u64 {
        self.inner.lock().total_detections
    }

    pub fn len(&self) -> usize {
        self.inner.lock().alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Spawn the background poll loop that refreshes the alert log from the
/// detector on a fixed cadence, independent of per-camera capture timers.
/// The first tick fires immediately, covering the initial load.
pub fn spawn_alert_poller(
    detector: Arc<dyn Detector>,
    store: Arc<AlertStore>,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("alert poller cancelled");
                    break;
                }
                _ = interval.tick() => {
                    match detector.fetch_alert_history().await {
                        Ok(alerts) => {
                            debug!(count = alerts.len(), "alert log refreshed from backend");
                            store.replace_from_fetch(alerts);
                        }
                        Err(e) => warn!("alert refresh failed, keeping previous log: {}", e),
                    }
                }
            }
        }
    })
}
