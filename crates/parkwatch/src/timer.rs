//! Expiry and poll timers.
//!
//! Both run as independent tasks on a fixed cadence until their token is
//! cancelled. Ticks never overlap: the body is awaited inside the loop and
//! missed ticks are skipped rather than bunched.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::ChannelError;
use crate::reconciler::Reconciler;
use crate::slot::Slot;

/// Run `ApplyExpiry(now)` once per `period`.
pub fn spawn_expiry_timer(
    reconciler: Arc<Reconciler>,
    period: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let expired = reconciler.apply_expiry(Utc::now());
                    if !expired.is_empty() {
                        tracing::debug!(count = expired.len(), "Expiry tick freed slots");
                    }
                }
            }
        }
        tracing::debug!("Expiry timer stopped");
    })
}

/// Poll the remote channel once per `period`, starting immediately.
pub fn spawn_poll_timer(
    reconciler: Arc<Reconciler>,
    period: Duration,
    window: u32,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            // An in-flight read is abandoned on shutdown.
            tokio::select! {
                _ = shutdown.cancelled() => {
                    reconciler.sync().poll_abandoned();
                    break;
                }
                _ = poll_once(&reconciler, window) => {}
            }
        }
        tracing::debug!("Poll timer stopped");
    })
}

/// One poll cycle: read the latest `window` samples and merge them.
///
/// A failed read is logged and recorded in the sync status; the table is left
/// as it was and the next tick retries.
pub async fn poll_once(reconciler: &Reconciler, window: u32) -> Result<Vec<Slot>, ChannelError> {
    let sync = reconciler.sync();
    sync.poll_started();

    match reconciler.channel().read_latest(window).await {
        Ok(samples) => {
            let now = Utc::now();
            let changed = reconciler.apply_remote_observation(&samples, now);
            sync.poll_succeeded(now);
            tracing::debug!(
                samples = samples.len(),
                changed = changed.len(),
                "Poll completed"
            );
            Ok(changed)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Remote channel unavailable - keeping local state");
            sync.poll_failed(&e);
            Err(e)
        }
    }
}
