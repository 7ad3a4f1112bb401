//! Remote telemetry channel client.
//!
//! The channel holds one numeric field per slot. Reads return the latest samples,
//! writes set one field or all of them. No state is kept between calls.

mod http;

use async_trait::async_trait;

pub use http::HttpChannel;

use crate::error::ChannelError;
use crate::observation::Observation;
use crate::slot::SlotId;

/// Entry created by a successful write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteConfirmation {
    pub entry_id: u64,
}

#[async_trait]
pub trait RemoteChannel: Send + Sync {
    /// Fetch the latest `count` samples, oldest first.
    async fn read_latest(&self, count: u32) -> Result<Vec<Observation>, ChannelError>;

    /// Set one slot's field.
    async fn write_field(&self, slot: SlotId, value: u32)
    -> Result<WriteConfirmation, ChannelError>;

    /// Set every listed slot's field to the same value in one update.
    async fn write_all(
        &self,
        slots: &[SlotId],
        value: u32,
    ) -> Result<WriteConfirmation, ChannelError>;
}

/// A write the reconciler wants pushed to the channel after releasing its lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteWrite {
    Field { slot: SlotId, value: u32 },
    All { slots: Vec<SlotId>, value: u32 },
}

impl RemoteWrite {
    pub async fn send(&self, channel: &dyn RemoteChannel) -> Result<WriteConfirmation, ChannelError> {
        match self {
            Self::Field { slot, value } => channel.write_field(*slot, *value).await,
            Self::All { slots, value } => channel.write_all(slots, *value).await,
        }
    }
}
