//! Synchronization status with the remote channel.
//!
//! Remote failures never stop the engine; they surface here as a transient error
//! that the next successful poll or write clears.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

/// Coarse sync health for consumers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncHealth {
    /// No poll has completed yet
    #[default]
    Unknown,
    /// A poll is in flight
    Syncing,
    /// Last remote operation succeeded
    Synced,
    /// Last remote operation failed; operating on local state
    Degraded,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    /// When the last successful poll finished.
    pub last_synced_at: Option<DateTime<Utc>>,
    /// When the last write was confirmed by the remote.
    pub last_write_at: Option<DateTime<Utc>>,
    /// True while a poll is in flight.
    pub loading: bool,
    /// Most recent remote failure, cleared by the next success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Writes dispatched but not yet answered.
    pub pending_writes: usize,
}

impl SyncStatus {
    pub fn health(&self) -> SyncHealth {
        if self.error.is_some() {
            SyncHealth::Degraded
        } else if self.loading {
            SyncHealth::Syncing
        } else if self.last_synced_at.is_some() || self.last_write_at.is_some() {
            SyncHealth::Synced
        } else {
            SyncHealth::Unknown
        }
    }
}

/// Shared, lock-protected [`SyncStatus`].
#[derive(Debug, Default)]
pub struct SyncTracker {
    inner: Mutex<SyncStatus>,
}

impl SyncTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn update(&self, f: impl FnOnce(&mut SyncStatus)) {
        let mut status = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("Sync status mutex poisoned - recovering");
                poisoned.into_inner()
            }
        };
        f(&mut status);
    }

    pub fn snapshot(&self) -> SyncStatus {
        let mut out = SyncStatus::default();
        self.update(|status| out = status.clone());
        out
    }

    pub fn poll_started(&self) {
        self.update(|s| s.loading = true);
    }

    pub fn poll_succeeded(&self, at: DateTime<Utc>) {
        self.update(|s| {
            s.loading = false;
            s.last_synced_at = Some(at);
            s.error = None;
        });
    }

    pub fn poll_failed(&self, error: &ChannelError) {
        let message = error.to_string();
        self.update(|s| {
            s.loading = false;
            s.error = Some(message);
        });
    }

    /// A poll was dropped before the remote answered; nothing new was learned.
    pub fn poll_abandoned(&self) {
        self.update(|s| s.loading = false);
    }

    pub fn write_started(&self) {
        self.update(|s| s.pending_writes += 1);
    }

    pub fn write_succeeded(&self, at: DateTime<Utc>) {
        self.update(|s| {
            s.pending_writes = s.pending_writes.saturating_sub(1);
            s.last_write_at = Some(at);
            s.error = None;
        });
    }

    pub fn write_failed(&self, error: &ChannelError) {
        let message = error.to_string();
        self.update(|s| {
            s.pending_writes = s.pending_writes.saturating_sub(1);
            s.error = Some(message);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_default_is_unknown() {
        assert_eq!(SyncHealth::default(), SyncHealth::Unknown);
        assert_eq!(SyncStatus::default().health(), SyncHealth::Unknown);
    }

    #[test]
    fn health_serializes_screaming_snake_case() {
        insta::assert_json_snapshot!(
            [
                SyncHealth::Unknown,
                SyncHealth::Syncing,
                SyncHealth::Synced,
                SyncHealth::Degraded,
            ],
            @r#"
        [
          "UNKNOWN",
          "SYNCING",
          "SYNCED",
          "DEGRADED"
        ]
        "#
        );
    }

    #[test]
    fn poll_failure_sets_error_and_success_clears_it() {
        let tracker = SyncTracker::new();
        tracker.poll_started();
        assert!(tracker.snapshot().loading);
        assert_eq!(tracker.snapshot().health(), SyncHealth::Syncing);

        tracker.poll_failed(&ChannelError::Status(503));
        let status = tracker.snapshot();
        assert!(!status.loading);
        assert_eq!(
            status.error.as_deref(),
            Some("remote channel returned HTTP 503")
        );
        assert_eq!(status.health(), SyncHealth::Degraded);

        let now = Utc::now();
        tracker.poll_started();
        tracker.poll_succeeded(now);
        let status = tracker.snapshot();
        assert_eq!(status.last_synced_at, Some(now));
        assert!(status.error.is_none());
        assert_eq!(status.health(), SyncHealth::Synced);
    }

    #[test]
    fn abandoned_poll_clears_loading_only() {
        let tracker = SyncTracker::new();
        let synced_at = Utc::now();
        tracker.poll_succeeded(synced_at);

        tracker.poll_started();
        tracker.poll_abandoned();

        let status = tracker.snapshot();
        assert!(!status.loading);
        assert_eq!(status.last_synced_at, Some(synced_at));
        assert_eq!(status.health(), SyncHealth::Synced);
    }

    #[test]
    fn write_success_clears_poll_error() {
        let tracker = SyncTracker::new();
        tracker.poll_failed(&ChannelError::Rejected);

        tracker.write_started();
        assert_eq!(tracker.snapshot().pending_writes, 1);

        tracker.write_succeeded(Utc::now());
        let status = tracker.snapshot();
        assert_eq!(status.pending_writes, 0);
        assert!(status.error.is_none());
        assert!(status.last_write_at.is_some());
    }

    #[test]
    fn write_failure_is_recorded() {
        let tracker = SyncTracker::new();
        tracker.write_started();
        tracker.write_failed(&ChannelError::Rejected);
        let status = tracker.snapshot();
        assert_eq!(status.pending_writes, 0);
        assert_eq!(
            status.error.as_deref(),
            Some("remote channel rejected the update")
        );
    }
}
