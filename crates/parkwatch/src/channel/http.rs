//! HTTP implementation of the remote channel.
//!
//! Reads: `GET {base}/channels/{id}/feeds.json?api_key=..&results=N`
//! Writes: `GET {base}/update?api_key=..&field1=..` answering with the new entry
//! id, or `0` when the update was refused.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{RemoteChannel, WriteConfirmation};
use crate::config::ChannelConfig;
use crate::error::ChannelError;
use crate::observation::Observation;
use crate::slot::SlotId;
use crate::version::VersionInfo;

#[derive(Debug, Deserialize)]
struct FeedResponse {
    #[serde(default)]
    feeds: Vec<RawSample>,
}

#[derive(Debug, Deserialize)]
struct RawSample {
    created_at: DateTime<Utc>,
    #[serde(default)]
    entry_id: Option<u64>,
    #[serde(flatten)]
    rest: serde_json::Map<String, serde_json::Value>,
}

impl From<RawSample> for Observation {
    fn from(raw: RawSample) -> Self {
        let mut observation = Observation::new(raw.created_at);
        observation.entry_id = raw.entry_id;
        for (key, value) in raw.rest {
            let Some(field) = key
                .strip_prefix("field")
                .and_then(|n| n.parse::<u32>().ok())
            else {
                continue;
            };
            let value = match value {
                serde_json::Value::String(s) => Some(s),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            };
            observation = observation.with_field(field, value.as_deref());
        }
        observation
    }
}

pub struct HttpChannel {
    config: ChannelConfig,
    client: reqwest::Client,
}

impl HttpChannel {
    pub fn new(config: ChannelConfig) -> Result<Self, ChannelError> {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Ok(value) = reqwest::header::HeaderValue::from_str(&VersionInfo::user_agent()) {
            headers.insert(reqwest::header::USER_AGENT, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;

        Ok(Self { config, client })
    }

    fn feeds_url(&self) -> String {
        format!(
            "{}/channels/{}/feeds.json",
            self.config.base_url, self.config.channel_id
        )
    }

    fn update_url(&self) -> String {
        format!("{}/update", self.config.base_url)
    }

    async fn update(&self, fields: &[(SlotId, u32)]) -> Result<WriteConfirmation, ChannelError> {
        let mut query = vec![("api_key".to_string(), self.config.write_key.clone())];
        query.extend(
            fields
                .iter()
                .map(|(slot, value)| (slot.field_name(), value.to_string())),
        );

        let resp = self
            .client
            .get(self.update_url())
            .query(&query)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(ChannelError::Status(resp.status().as_u16()));
        }

        let body = resp.text().await?;
        let entry_id = body
            .trim()
            .parse::<u64>()
            .map_err(|_| ChannelError::Malformed(format!("unexpected update response '{body}'")))?;

        if entry_id == 0 {
            return Err(ChannelError::Rejected);
        }

        tracing::debug!(entry_id, fields = fields.len(), "Remote channel updated");
        Ok(WriteConfirmation { entry_id })
    }
}

#[async_trait]
impl RemoteChannel for HttpChannel {
    async fn read_latest(&self, count: u32) -> Result<Vec<Observation>, ChannelError> {
        let mut query = vec![("results", count.to_string())];
        if let Some(ref key) = self.config.read_key {
            query.push(("api_key", key.clone()));
        }

        let resp = self
            .client
            .get(self.feeds_url())
            .query(&query)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(ChannelError::Status(resp.status().as_u16()));
        }

        let body = resp.text().await?;
        let feed: FeedResponse =
            serde_json::from_str(&body).map_err(|e| ChannelError::Malformed(e.to_string()))?;

        let mut samples: Vec<Observation> = feed.feeds.into_iter().map(Observation::from).collect();
        samples.sort_by_key(|s| s.created_at);
        Ok(samples)
    }

    async fn write_field(
        &self,
        slot: SlotId,
        value: u32,
    ) -> Result<WriteConfirmation, ChannelError> {
        self.update(&[(slot, value)]).await
    }

    async fn write_all(
        &self,
        slots: &[SlotId],
        value: u32,
    ) -> Result<WriteConfirmation, ChannelError> {
        let fields: Vec<(SlotId, u32)> = slots.iter().map(|&slot| (slot, value)).collect();
        self.update(&fields).await
    }
}
