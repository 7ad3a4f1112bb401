//! Read-only views of engine state for external consumers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::CommandError;
use crate::observation::Observation;
use crate::reconciler::Reconciler;
use crate::slot::{RemainingTime, Slot, SlotId};
use crate::status::SyncStatus;

/// Reserved slots with this many whole minutes left or fewer (but at least
/// one) count as "available soon".
const AVAILABLE_SOON_MINUTES: u64 = 5;

/// One slot as shown to consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotView {
    pub id: SlotId,
    pub reserved: bool,
    pub reservation_deadline: Option<DateTime<Utc>>,
    pub remaining: String,
}

impl SlotView {
    pub fn new(slot: &Slot, now: DateTime<Utc>) -> Self {
        Self {
            id: slot.id(),
            reserved: slot.is_reserved(),
            reservation_deadline: slot.reservation_deadline(),
            remaining: slot.remaining(now).to_string(),
        }
    }
}

/// Point-in-time bundle of slot views, counts and sync status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineSnapshot {
    pub taken_at: DateTime<Utc>,
    pub slots: Vec<SlotView>,
    pub total: usize,
    pub available: usize,
    pub available_soon: usize,
    pub sync: SyncStatus,
}

#[derive(Clone)]
pub struct SnapshotPublisher {
    reconciler: Arc<Reconciler>,
}

impl SnapshotPublisher {
    pub fn new(reconciler: Arc<Reconciler>) -> Self {
        Self { reconciler }
    }

    /// Copy of every slot in ascending id order.
    pub fn current_slots(&self) -> Vec<Slot> {
        self.reconciler.snapshot()
    }

    /// Copy of one slot, or `UnknownSlot`.
    pub fn slot(&self, id: SlotId) -> Result<Slot, CommandError> {
        self.reconciler
            .slot(id)
            .ok_or(CommandError::UnknownSlot(id))
    }

    /// Time left on `id`'s reservation at `now`.
    pub fn remaining_time(
        &self,
        id: SlotId,
        now: DateTime<Utc>,
    ) -> Result<RemainingTime, CommandError> {
        Ok(self.slot(id)?.remaining(now))
    }

    pub fn view(&self, id: SlotId, now: DateTime<Utc>) -> Result<SlotView, CommandError> {
        Ok(SlotView::new(&self.slot(id)?, now))
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        self.snapshot_at(Utc::now())
    }

    pub fn snapshot_at(&self, now: DateTime<Utc>) -> EngineSnapshot {
        let slots = self.current_slots();
        let available = slots.iter().filter(|s| !s.is_reserved()).count();
        let available_soon = slots
            .iter()
            .filter_map(|s| s.remaining(now).whole_minutes())
            .filter(|m| (1..=AVAILABLE_SOON_MINUTES).contains(m))
            .count();

        EngineSnapshot {
            taken_at: now,
            total: slots.len(),
            available,
            available_soon,
            slots: slots.iter().map(|s| SlotView::new(s, now)).collect(),
            sync: self.sync_status(),
        }
    }

    pub fn sync_status(&self) -> SyncStatus {
        self.reconciler.sync().snapshot()
    }

    pub fn recent_observations(&self, limit: usize) -> Vec<Observation> {
        self.reconciler.recent_observations(limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    use crate::config::EngineConfig;
    use crate::reconciler::Command;
    use crate::status::SyncTracker;
    use crate::testing::ScriptedChannel;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn publisher() -> (Arc<Reconciler>, SnapshotPublisher) {
        let reconciler = Arc::new(Reconciler::new(
            &EngineConfig::default(),
            Arc::new(ScriptedChannel::new()),
            Arc::new(SyncTracker::new()),
        )
        .unwrap());
        (reconciler.clone(), SnapshotPublisher::new(reconciler))
    }

    #[test]
    fn current_slots_is_a_copy() {
        let (reconciler, publisher) = publisher();
        let before = publisher.current_slots();
        reconciler
            .apply_command_at(
                Command::Reserve {
                    slot: SlotId::new(1),
                    minutes: 5,
                },
                t0(),
            )
            .unwrap();
        assert!(!before[0].is_reserved());
        assert!(publisher.current_slots()[0].is_reserved());
    }

    #[test]
    fn remaining_time_for_unknown_slot_fails() {
        let (_reconciler, publisher) = publisher();
        assert_eq!(
            publisher.remaining_time(SlotId::new(9), t0()).unwrap_err(),
            CommandError::UnknownSlot(SlotId::new(9))
        );
        assert_eq!(
            publisher.remaining_time(SlotId::new(1), t0()).unwrap(),
            RemainingTime::NotReserved
        );
    }

    #[test]
    fn snapshot_counts_available_and_available_soon() {
        let (reconciler, publisher) = publisher();
        reconciler
            .apply_command_at(
                Command::Reserve {
                    slot: SlotId::new(1),
                    minutes: 4,
                },
                t0(),
            )
            .unwrap();
        reconciler
            .apply_command_at(
                Command::Reserve {
                    slot: SlotId::new(2),
                    minutes: 60,
                },
                t0(),
            )
            .unwrap();

        let snapshot = publisher.snapshot_at(t0() + TimeDelta::seconds(30));
        assert_eq!(snapshot.total, 3);
        assert_eq!(snapshot.available, 1);
        assert_eq!(snapshot.available_soon, 1);

        // Under a minute left no longer counts as "soon".
        let later = publisher.snapshot_at(t0() + TimeDelta::seconds(200));
        assert_eq!(later.available_soon, 0);
    }

    #[test]
    fn snapshot_serializes_views() {
        let (reconciler, publisher) = publisher();
        reconciler
            .apply_command_at(
                Command::Reserve {
                    slot: SlotId::new(2),
                    minutes: 15,
                },
                t0(),
            )
            .unwrap();

        let snapshot = publisher.snapshot_at(t0() + TimeDelta::seconds(53));
        insta::assert_json_snapshot!(snapshot, @r#"
        {
          "taken_at": "2025-05-01T10:00:53Z",
          "slots": [
            {
              "id": 1,
              "reserved": false,
              "reservation_deadline": null,
              "remaining": "Not reserved"
            },
            {
              "id": 2,
              "reserved": true,
              "reservation_deadline": "2025-05-01T10:15:00Z",
              "remaining": "14m 7s"
            },
            {
              "id": 3,
              "reserved": false,
              "reservation_deadline": null,
              "remaining": "Not reserved"
            }
          ],
          "total": 3,
          "available": 2,
          "available_soon": 0,
          "sync": {
            "last_synced_at": null,
            "last_write_at": null,
            "loading": false,
            "pending_writes": 0
          }
        }
        "#);
    }
}
