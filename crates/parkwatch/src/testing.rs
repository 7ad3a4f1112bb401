//! In-memory remote channel for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::channel::{RemoteChannel, RemoteWrite, WriteConfirmation};
use crate::error::ChannelError;
use crate::observation::Observation;
use crate::slot::SlotId;

/// Answers reads from a script and records every write.
///
/// Once the script runs out, reads return an empty window.
#[derive(Default)]
pub(crate) struct ScriptedChannel {
    reads: Mutex<VecDeque<Option<Vec<Observation>>>>,
    writes: Mutex<Vec<RemoteWrite>>,
    read_count: AtomicU64,
    entry_ids: AtomicU64,
    fail_writes: AtomicBool,
    stall_reads: AtomicBool,
}

impl ScriptedChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_samples(&self, samples: Vec<Observation>) {
        self.reads.lock().unwrap().push_back(Some(samples));
    }

    pub fn push_unavailable(&self) {
        self.reads.lock().unwrap().push_back(None);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every read hang until the caller drops it.
    pub fn stall_reads(&self, stall: bool) {
        self.stall_reads.store(stall, Ordering::SeqCst);
    }

    pub fn read_count(&self) -> u64 {
        self.read_count.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> Vec<RemoteWrite> {
        self.writes.lock().unwrap().clone()
    }

    /// Wait (bounded) until at least `n` writes have been recorded.
    pub async fn wait_for_writes(&self, n: usize) -> Vec<RemoteWrite> {
        for _ in 0..200 {
            if self.writes.lock().unwrap().len() >= n {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.writes()
    }

    fn record(&self, write: RemoteWrite) -> Result<WriteConfirmation, ChannelError> {
        self.writes.lock().unwrap().push(write);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ChannelError::Rejected);
        }
        let entry_id = self.entry_ids.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(WriteConfirmation { entry_id })
    }
}

#[async_trait]
impl RemoteChannel for ScriptedChannel {
    async fn read_latest(&self, _count: u32) -> Result<Vec<Observation>, ChannelError> {
        self.read_count.fetch_add(1, Ordering::SeqCst);
        if self.stall_reads.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        match self.reads.lock().unwrap().pop_front() {
            Some(Some(samples)) => Ok(samples),
            Some(None) => Err(ChannelError::Status(503)),
            None => Ok(Vec::new()),
        }
    }

    async fn write_field(
        &self,
        slot: SlotId,
        value: u32,
    ) -> Result<WriteConfirmation, ChannelError> {
        self.record(RemoteWrite::Field { slot, value })
    }

    async fn write_all(
        &self,
        slots: &[SlotId],
        value: u32,
    ) -> Result<WriteConfirmation, ChannelError> {
        self.record(RemoteWrite::All {
            slots: slots.to_vec(),
            value,
        })
    }
}
