//! User command surface.
//!
//! Validates raw requests and turns them into reconciler commands. Every
//! accepted command is reflected locally before the call returns; the remote
//! write happens in the background.

use std::sync::Arc;

use crate::error::CommandError;
use crate::reconciler::{Command, Reconciler};
use crate::slot::{Slot, SlotId};

#[derive(Clone)]
pub struct CommandSurface {
    reconciler: Arc<Reconciler>,
}

impl CommandSurface {
    /// Command surface over a shared reconciler.
    pub fn new(reconciler: Arc<Reconciler>) -> Self {
        Self { reconciler }
    }

    /// Reserve `slot` for `minutes` from now. Re-reserving resets the deadline.
    pub fn reserve(&self, slot: SlotId, minutes: i64) -> Result<Slot, CommandError> {
        let minutes = validate_minutes(minutes)?;
        self.ensure_known(slot)?;
        let updated = self
            .reconciler
            .apply_command(Command::Reserve { slot, minutes })?;
        single(updated, slot)
    }

    /// Cancel a reservation. Cancelling a free slot succeeds and changes nothing.
    pub fn cancel(&self, slot: SlotId) -> Result<Slot, CommandError> {
        self.ensure_known(slot)?;
        let updated = self.reconciler.apply_command(Command::Cancel { slot })?;
        single(updated, slot)
    }

    /// Reserve every slot for `minutes` from now, with one shared deadline.
    pub fn reserve_all(&self, minutes: i64) -> Result<Vec<Slot>, CommandError> {
        let minutes = validate_minutes(minutes)?;
        self.reconciler
            .apply_command(Command::ReserveAll { minutes })
    }

    /// Free every slot.
    pub fn release_all(&self) -> Vec<Slot> {
        // ReleaseAll carries no input to reject.
        self.reconciler
            .apply_command(Command::ReleaseAll)
            .unwrap_or_else(|_| self.reconciler.snapshot())
    }

    fn ensure_known(&self, slot: SlotId) -> Result<(), CommandError> {
        if self.reconciler.contains(slot) {
            Ok(())
        } else {
            Err(CommandError::UnknownSlot(slot))
        }
    }
}

fn validate_minutes(minutes: i64) -> Result<u32, CommandError> {
    if minutes <= 0 {
        return Err(CommandError::InvalidDuration(minutes));
    }
    u32::try_from(minutes).map_err(|_| CommandError::InvalidDuration(minutes))
}

fn single(mut updated: Vec<Slot>, slot: SlotId) -> Result<Slot, CommandError> {
    updated.pop().ok_or(CommandError::UnknownSlot(slot))
}
