//! parkwatch: parking slot reservations kept in sync with a remote telemetry channel.

mod observation;
mod reconciler;
mod slot;
mod status;
mod version;

pub mod channel;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod snapshot;
pub mod timer;
pub mod transport;

#[cfg(test)]
mod testing;

pub use channel::{HttpChannel, RemoteChannel, RemoteWrite, WriteConfirmation};
pub use commands::CommandSurface;
pub use config::{ChannelConfig, EngineConfig};
pub use engine::Engine;
pub use error::{ChannelError, CommandError, ConfigError};
pub use observation::{Observation, RemoteView, latest_field_values};
pub use reconciler::{Command, Reconciler};
pub use slot::{RemainingTime, Slot, SlotId, SlotState, SlotTable};
pub use snapshot::{EngineSnapshot, SlotView, SnapshotPublisher};
pub use status::{SyncHealth, SyncStatus, SyncTracker};
pub use version::{PARKWATCH_VERSION, VersionInfo};
