//! Reconciler: the single writer of the slot table.
//!
//! Three transition sources feed it: user commands, local expiry and remote
//! observations. Each entry point takes the table lock once, applies its
//! transition atomically and releases the lock before any remote I/O. Writes
//! back to the channel are spawned and never awaited by the caller.
//!
//! Merge policy is last observation wins: when a poll disagrees with local
//! state, the remote view replaces it, even if it undoes a command issued a
//! moment earlier that the remote has not caught up with yet.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, TimeDelta, Utc};

use crate::channel::{RemoteChannel, RemoteWrite};
use crate::config::EngineConfig;
use crate::error::{CommandError, ConfigError};
use crate::observation::{Observation, RemoteView, with_reconstructed_head};
use crate::slot::{Slot, SlotId, SlotTable};
use crate::status::SyncTracker;

/// A validated state change requested by a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Reserve { slot: SlotId, minutes: u32 },
    Cancel { slot: SlotId },
    ReserveAll { minutes: u32 },
    ReleaseAll,
}

pub struct Reconciler {
    table: Mutex<SlotTable>,
    /// Last window fetched from the remote, oldest first.
    window: Mutex<Vec<Observation>>,
    channel: Arc<dyn RemoteChannel>,
    sync: Arc<SyncTracker>,
    occupied_value: u32,
    free_value: u32,
    default_reservation: TimeDelta,
}

impl Reconciler {
    /// Build a reconciler over slots `1..=N`, all free.
    ///
    /// Fails if the default reservation cannot be used for deadline arithmetic.
    pub fn new(
        config: &EngineConfig,
        channel: Arc<dyn RemoteChannel>,
        sync: Arc<SyncTracker>,
    ) -> Result<Self, ConfigError> {
        let default_reservation = config.default_reservation_delta()?;
        Ok(Self {
            table: Mutex::new(SlotTable::new(config.slot_count)),
            window: Mutex::new(Vec::new()),
            channel,
            sync,
            occupied_value: config.occupied_value,
            free_value: config.free_value,
            default_reservation,
        })
    }

    /// Lock the slot table. A poisoned lock is recovered: every transition
    /// leaves the table consistent, so the data is still valid.
    fn lock_table(&self) -> MutexGuard<'_, SlotTable> {
        match self.table.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("Slot table mutex poisoned - recovering");
                poisoned.into_inner()
            }
        }
    }

    fn lock_window(&self) -> MutexGuard<'_, Vec<Observation>> {
        match self.window.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("Observation window mutex poisoned - recovering");
                poisoned.into_inner()
            }
        }
    }

    pub fn channel(&self) -> &Arc<dyn RemoteChannel> {
        &self.channel
    }

    pub fn sync(&self) -> &Arc<SyncTracker> {
        &self.sync
    }

    pub fn contains(&self, slot: SlotId) -> bool {
        self.lock_table().contains(slot)
    }

    pub fn slot(&self, slot: SlotId) -> Option<Slot> {
        self.lock_table().get(slot)
    }

    pub fn slot_ids(&self) -> Vec<SlotId> {
        self.lock_table().ids().collect()
    }

    pub fn snapshot(&self) -> Vec<Slot> {
        self.lock_table().snapshot()
    }

    /// Newest-first copy of the last fetched window, newest sample carrying
    /// the reconstructed value of every field.
    pub fn recent_observations(&self, limit: usize) -> Vec<Observation> {
        with_reconstructed_head(&self.lock_window(), limit)
    }

    pub fn apply_command(&self, command: Command) -> Result<Vec<Slot>, CommandError> {
        self.apply_command_at(command, Utc::now())
    }

    /// Apply a user command as of `now` and push the new state to the remote.
    ///
    /// Returns the slots the command touched. The remote write is dispatched in
    /// the background; its outcome only reaches the sync status.
    pub fn apply_command_at(
        &self,
        command: Command,
        now: DateTime<Utc>,
    ) -> Result<Vec<Slot>, CommandError> {
        let (slots, write) = {
            let mut table = self.lock_table();
            match command {
                Command::Reserve { slot, minutes } => {
                    let deadline = deadline_after(now, minutes)?;
                    let updated = table.reserve(slot, deadline)?;
                    tracing::info!(slot = %slot, minutes, %deadline, "Slot reserved");
                    (
                        vec![updated],
                        RemoteWrite::Field {
                            slot,
                            value: self.occupied_value,
                        },
                    )
                }
                Command::Cancel { slot } => {
                    let updated = table.release(slot)?;
                    tracing::info!(slot = %slot, "Reservation cancelled");
                    (
                        vec![updated],
                        RemoteWrite::Field {
                            slot,
                            value: self.free_value,
                        },
                    )
                }
                Command::ReserveAll { minutes } => {
                    let deadline = deadline_after(now, minutes)?;
                    let updated = table.reserve_all(deadline);
                    tracing::info!(count = updated.len(), minutes, "All slots reserved");
                    (
                        updated,
                        RemoteWrite::All {
                            slots: table.ids().collect(),
                            value: self.occupied_value,
                        },
                    )
                }
                Command::ReleaseAll => {
                    let updated = table.release_all();
                    tracing::info!(count = updated.len(), "All slots released");
                    (
                        updated,
                        RemoteWrite::All {
                            slots: table.ids().collect(),
                            value: self.free_value,
                        },
                    )
                }
            }
        };

        self.dispatch(write);
        Ok(slots)
    }

    /// Free every reservation due at `now` and push each change to the remote.
    pub fn apply_expiry(&self, now: DateTime<Utc>) -> Vec<SlotId> {
        let expired = self.lock_table().expire(now);
        for &slot in &expired {
            tracing::info!(slot = %slot, "Reservation expired");
            self.dispatch(RemoteWrite::Field {
                slot,
                value: self.free_value,
            });
        }
        expired
    }

    /// Merge a fetched window into the table, remote winning on disagreement.
    ///
    /// Slots that turn occupied remotely get a deadline of `now` plus the
    /// default reservation. Returns the slots that changed.
    pub fn apply_remote_observation(
        &self,
        samples: &[Observation],
        now: DateTime<Utc>,
    ) -> Vec<Slot> {
        let view = RemoteView::from_samples(samples, self.occupied_value);
        let default_deadline = now
            .checked_add_signed(self.default_reservation)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let changed = self
            .lock_table()
            .merge_remote(view.occupancy(), default_deadline);
        *self.lock_window() = samples.to_vec();

        for slot in &changed {
            tracing::info!(
                slot = %slot.id(),
                reserved = slot.is_reserved(),
                "Remote observation overrode local state"
            );
        }
        changed
    }

    /// Send a write in the background. Failures are logged and recorded,
    /// local state is never rolled back.
    fn dispatch(&self, write: RemoteWrite) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(?write, "No async runtime - remote write dropped");
            return;
        };

        let channel = Arc::clone(&self.channel);
        let sync = Arc::clone(&self.sync);
        sync.write_started();

        runtime.spawn(async move {
            match write.send(channel.as_ref()).await {
                Ok(confirmation) => {
                    tracing::debug!(entry_id = confirmation.entry_id, ?write, "Remote write confirmed");
                    sync.write_succeeded(Utc::now());
                }
                Err(e) => {
                    tracing::warn!(error = %e, ?write, "Remote write failed - keeping local state");
                    sync.write_failed(&e);
                }
            }
        });
    }
}

fn deadline_after(now: DateTime<Utc>, minutes: u32) -> Result<DateTime<Utc>, CommandError> {
    if minutes == 0 {
        return Err(CommandError::InvalidDuration(0));
    }
    now.checked_add_signed(TimeDelta::minutes(i64::from(minutes)))
        .ok_or(CommandError::InvalidDuration(i64::from(minutes)))
}
