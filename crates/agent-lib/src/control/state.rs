//! Shared agent runtime state
//!
//! Every mutable fact the tick loop, command poller and health surface
//! share lives behind this one type. Callers only see the read and
//! transition methods; the lock never escapes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::models::HostSnapshot;
use crate::store::ServerRecord;

struct Inner {
    monitoring: bool,
    interval: Duration,
    record: ServerRecord,
    last_snapshot: Option<HostSnapshot>,
}

pub struct ControlState {
    inner: RwLock<Inner>,
    tasks: AtomicUsize,
    started_at: DateTime<Utc>,
}

impl ControlState {
    pub fn new(default_interval: Duration) -> Self {
        Self {
            inner: RwLock::new(Inner {
                monitoring: true,
                interval: default_interval,
                record: ServerRecord::default(),
                last_snapshot: None,
            }),
            tasks: AtomicUsize::new(0),
            started_at: Utc::now(),
        }
    }

    pub async fn is_monitoring(&self) -> bool {
        self.inner.read().await.monitoring
    }

    /// Returns false if monitoring was already paused
    pub async fn pause(&self) -> bool {
        let mut inner = self.inner.write().await;
        let was_monitoring = inner.monitoring;
        inner.monitoring = false;
        was_monitoring
    }

    /// Returns false if monitoring was already active
    pub async fn resume(&self) -> bool {
        let mut inner = self.inner.write().await;
        let was_paused = !inner.monitoring;
        inner.monitoring = true;
        was_paused
    }

    pub async fn current_interval(&self) -> Duration {
        self.inner.read().await.interval
    }

    /// Set the effective sampling interval; returns true when it changed
    pub async fn set_interval(&self, interval: Duration) -> bool {
        let mut inner = self.inner.write().await;
        let changed = inner.interval != interval;
        inner.interval = interval;
        changed
    }

    pub async fn cached_record(&self) -> ServerRecord {
        self.inner.read().await.record.clone()
    }

    /// Store record id assigned by the remote store, empty before the
    /// first successful contact
    pub async fn record_id(&self) -> String {
        self.inner.read().await.record.id.clone()
    }

    pub async fn set_record(&self, record: ServerRecord) {
        self.inner.write().await.record = record;
    }

    pub async fn containers_enabled(&self) -> bool {
        self.inner.read().await.record.containers_enabled
    }

    pub async fn last_snapshot(&self) -> Option<HostSnapshot> {
        self.inner.read().await.last_snapshot.clone()
    }

    pub async fn set_snapshot(&self, snapshot: HostSnapshot) {
        self.inner.write().await.last_snapshot = Some(snapshot);
    }

    pub fn task_started(&self) {
        self.tasks.fetch_add(1, Ordering::SeqCst);
    }

    pub fn task_finished(&self) {
        self.tasks.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn task_count(&self) -> usize {
        self.tasks.load(Ordering::SeqCst)
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pause_resume_transitions() {
        let state = ControlState::new(Duration::from_secs(30));
        assert!(state.is_monitoring().await);

        assert!(state.pause().await);
        assert!(!state.is_monitoring().await);
        // Pausing twice reports no transition
        assert!(!state.pause().await);

        assert!(state.resume().await);
        assert!(state.is_monitoring().await);
        assert!(!state.resume().await);
    }

    #[tokio::test]
    async fn test_set_interval_reports_change() {
        let state = ControlState::new(Duration::from_secs(30));
        assert!(!state.set_interval(Duration::from_secs(30)).await);
        assert!(state.set_interval(Duration::from_secs(45)).await);
        assert_eq!(state.current_interval().await, Duration::from_secs(45));
    }

    #[tokio::test]
    async fn test_task_counter() {
        let state = ControlState::new(Duration::from_secs(30));
        state.task_started();
        state.task_started();
        state.task_finished();
        assert_eq!(state.task_count(), 1);
    }
}
