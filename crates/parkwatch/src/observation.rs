//! Remote channel samples and reconstruction of the latest value per field.
//!
//! The channel may report "no change" for a field as an empty or missing value,
//! so the current value of a field is the first non-empty one found scanning the
//! fetched window from newest to oldest.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::slot::SlotId;

/// One timestamped sample of the remote channel.
///
/// `fields` holds every `field<N>` key the sample carried; `None` marks a key
/// present with an empty or null value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_id: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub fields: BTreeMap<u32, Option<String>>,
}

impl Observation {
    pub fn new(created_at: DateTime<Utc>) -> Self {
        Self {
            entry_id: None,
            created_at,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_entry_id(mut self, entry_id: u64) -> Self {
        self.entry_id = Some(entry_id);
        self
    }

    /// Set a field value. Blank strings are stored as empty.
    pub fn with_field(mut self, field: u32, value: Option<&str>) -> Self {
        let value = value
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        self.fields.insert(field, value);
        self
    }

    pub fn field(&self, field: u32) -> Option<&str> {
        self.fields.get(&field).and_then(|v| v.as_deref())
    }
}

/// Latest non-empty value for every field seen in `samples` (oldest first).
///
/// A field that appears only with empty values maps to `None`.
pub fn latest_field_values(samples: &[Observation]) -> BTreeMap<u32, Option<String>> {
    let mut latest: BTreeMap<u32, Option<String>> = BTreeMap::new();
    for sample in samples.iter().rev() {
        for (&field, value) in &sample.fields {
            let entry = latest.entry(field).or_insert(None);
            if entry.is_none() && value.is_some() {
                *entry = value.clone();
            }
        }
    }
    latest
}

/// Remote occupancy per slot, derived from a window of samples.
///
/// Only slots whose field appears somewhere in the window are present. A field
/// with no non-empty value in the window counts as free.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteView {
    occupancy: BTreeMap<SlotId, bool>,
}

impl RemoteView {
    pub fn from_samples(samples: &[Observation], occupied_value: u32) -> Self {
        let occupancy = latest_field_values(samples)
            .into_iter()
            .map(|(field, value)| {
                let occupied = value
                    .as_deref()
                    .is_some_and(|v| is_occupied(v, occupied_value));
                (SlotId::new(field), occupied)
            })
            .collect();
        Self { occupancy }
    }

    pub fn occupancy(&self) -> &BTreeMap<SlotId, bool> {
        &self.occupancy
    }

    pub fn is_empty(&self) -> bool {
        self.occupancy.is_empty()
    }
}

/// Exact textual match against the sentinel; `"100.0"` or `"0100"` is not occupied.
fn is_occupied(value: &str, occupied_value: u32) -> bool {
    value.trim() == occupied_value.to_string()
}

/// Copy of `samples`, newest first, with the newest one carrying the
/// reconstructed latest value for every field.
pub fn with_reconstructed_head(samples: &[Observation], limit: usize) -> Vec<Observation> {
    let mut recent: Vec<Observation> = samples.iter().rev().take(limit).cloned().collect();
    if let Some(head) = recent.first_mut() {
        head.fields = latest_field_values(samples);
    }
    recent
}
