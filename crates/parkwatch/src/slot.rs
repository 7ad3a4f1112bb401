//! Slot table and the pure transitions applied to it.
//!
//! A slot is either `Free` or `Reserved { deadline }`, so "reserved iff a deadline
//! exists" holds by construction. Every transition here is synchronous and
//! deterministic given its inputs; locking and remote I/O live in the reconciler.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CommandError;

/// Identity of a parking slot. Slot `n` maps to remote field `field{n}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotId(u32);

impl SlotId {
    /// Wrap a raw slot number.
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Raw slot number, also the remote field number.
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Name of the remote channel field carrying this slot's occupancy.
    pub fn field_name(self) -> String {
        format!("field{}", self.0)
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SlotId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SlotState {
    #[default]
    Free,
    Reserved {
        deadline: DateTime<Utc>,
    },
}

/// One parking slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "SlotRecord")]
pub struct Slot {
    id: SlotId,
    state: SlotState,
}

/// Wire shape of a slot: the two logical fields side by side.
#[derive(Debug, Serialize)]
struct SlotRecord {
    id: SlotId,
    reserved: bool,
    reservation_deadline: Option<DateTime<Utc>>,
}

impl From<Slot> for SlotRecord {
    fn from(slot: Slot) -> Self {
        Self {
            id: slot.id,
            reserved: slot.is_reserved(),
            reservation_deadline: slot.reservation_deadline(),
        }
    }
}

impl Slot {
    /// A slot with no reservation.
    pub fn free(id: SlotId) -> Self {
        Self {
            id,
            state: SlotState::Free,
        }
    }

    pub fn id(&self) -> SlotId {
        self.id
    }

    pub fn state(&self) -> SlotState {
        self.state
    }

    /// True while a reservation is held.
    pub fn is_reserved(&self) -> bool {
        matches!(self.state, SlotState::Reserved { .. })
    }

    /// Instant the reservation lapses; `None` exactly when the slot is free.
    pub fn reservation_deadline(&self) -> Option<DateTime<Utc>> {
        match self.state {
            SlotState::Free => None,
            SlotState::Reserved { deadline } => Some(deadline),
        }
    }

    fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.reservation_deadline()
            .is_some_and(|deadline| deadline <= now)
    }

    /// Time left on the reservation at `now`, clamped at zero.
    pub fn remaining(&self, now: DateTime<Utc>) -> RemainingTime {
        let Some(deadline) = self.reservation_deadline() else {
            return RemainingTime::NotReserved;
        };
        let left = deadline - now;
        if left <= TimeDelta::zero() {
            return RemainingTime::Expired;
        }
        RemainingTime::Left(left.to_std().unwrap_or_default())
    }
}

/// Remaining reservation time as shown to consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemainingTime {
    NotReserved,
    Expired,
    Left(Duration),
}

impl RemainingTime {
    /// Whole minutes left, or `None` when nothing is left.
    pub fn whole_minutes(&self) -> Option<u64> {
        match self {
            Self::Left(d) => Some(d.as_secs() / 60),
            _ => None,
        }
    }
}

impl fmt::Display for RemainingTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotReserved => f.write_str("Not reserved"),
            Self::Expired => f.write_str("Expired"),
            Self::Left(d) => {
                let secs = d.as_secs();
                write!(f, "{}m {}s", secs / 60, secs % 60)
            }
        }
    }
}

/// Fixed set of slots keyed by id, iterated in ascending id order.
#[derive(Debug, Clone)]
pub struct SlotTable {
    slots: BTreeMap<SlotId, Slot>,
}

impl SlotTable {
    /// Create slots `1..=count`, all free.
    pub fn new(count: u32) -> Self {
        let slots = (1..=count)
            .map(SlotId::new)
            .map(|id| (id, Slot::free(id)))
            .collect();
        Self { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Whether `id` belongs to this table.
    pub fn contains(&self, id: SlotId) -> bool {
        self.slots.contains_key(&id)
    }

    pub fn get(&self, id: SlotId) -> Option<Slot> {
        self.slots.get(&id).copied()
    }

    pub fn ids(&self) -> impl Iterator<Item = SlotId> + '_ {
        self.slots.keys().copied()
    }

    /// Point-in-time copy of every slot.
    pub fn snapshot(&self) -> Vec<Slot> {
        self.slots.values().copied().collect()
    }

    fn slot_mut(&mut self, id: SlotId) -> Result<&mut Slot, CommandError> {
        self.slots.get_mut(&id).ok_or(CommandError::UnknownSlot(id))
    }

    /// Reserve a slot until `deadline`. Re-reserving resets the deadline.
    pub fn reserve(&mut self, id: SlotId, deadline: DateTime<Utc>) -> Result<Slot, CommandError> {
        let slot = self.slot_mut(id)?;
        slot.state = SlotState::Reserved { deadline };
        Ok(*slot)
    }

    /// Free a slot. Releasing a free slot is a no-op.
    pub fn release(&mut self, id: SlotId) -> Result<Slot, CommandError> {
        let slot = self.slot_mut(id)?;
        slot.state = SlotState::Free;
        Ok(*slot)
    }

    /// Reserve every slot until the same `deadline`. Returns all slots.
    pub fn reserve_all(&mut self, deadline: DateTime<Utc>) -> Vec<Slot> {
        for slot in self.slots.values_mut() {
            slot.state = SlotState::Reserved { deadline };
        }
        self.snapshot()
    }

    /// Free every slot. Returns all slots.
    pub fn release_all(&mut self) -> Vec<Slot> {
        for slot in self.slots.values_mut() {
            slot.state = SlotState::Free;
        }
        self.snapshot()
    }

    /// Free every reservation whose deadline is at or before `now`.
    ///
    /// Returns the ids that were freed. Already-free slots are never reported.
    pub fn expire(&mut self, now: DateTime<Utc>) -> Vec<SlotId> {
        let mut expired = Vec::new();
        for slot in self.slots.values_mut() {
            if slot.is_due(now) {
                slot.state = SlotState::Free;
                expired.push(slot.id);
            }
        }
        expired
    }

    /// Overwrite local state with remote occupancy wherever the two disagree.
    ///
    /// Slots missing from `remote` are left untouched. A slot that becomes
    /// occupied remotely gets `default_deadline`, since the remote carries no
    /// duration. Returns the slots that changed.
    pub fn merge_remote(
        &mut self,
        remote: &BTreeMap<SlotId, bool>,
        default_deadline: DateTime<Utc>,
    ) -> Vec<Slot> {
        let mut changed = Vec::new();
        for (id, &occupied) in remote {
            let Some(slot) = self.slots.get_mut(id) else {
                continue;
            };
            if occupied == slot.is_reserved() {
                continue;
            }
            slot.state = if occupied {
                SlotState::Reserved {
                    deadline: default_deadline,
                }
            } else {
                SlotState::Free
            };
            changed.push(*slot);
        }
        changed
    }
}
