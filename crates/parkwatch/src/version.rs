//! Version information reported by the health endpoint and user agent.

/// Crate version from Cargo.toml
pub const PARKWATCH_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, serde::Serialize)]
pub struct VersionInfo {
    pub parkwatch: &'static str,
    /// Remote channel id this engine is bound to (if known).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

impl Default for VersionInfo {
    fn default() -> Self {
        Self {
            parkwatch: PARKWATCH_VERSION,
            channel: None,
        }
    }
}

impl VersionInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel(mut self, channel: String) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn user_agent() -> String {
        format!("parkwatch/{}", PARKWATCH_VERSION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_info_has_crate_version() {
        let info = VersionInfo::new();
        assert_eq!(info.parkwatch, PARKWATCH_VERSION);
        assert!(info.channel.is_none());
    }

    #[test]
    fn version_info_serializes_minimal() {
        let info = VersionInfo {
            parkwatch: "0.1.0",
            channel: None,
        };
        insta::assert_json_snapshot!(info, @r#"
        {
          "parkwatch": "0.1.0"
        }
        "#);
    }

    #[test]
    fn version_info_serializes_channel() {
        let info = VersionInfo {
            parkwatch: "0.1.0",
            channel: None,
        }
        .with_channel("2962592".to_string());
        insta::assert_json_snapshot!(info, @r#"
        {
          "parkwatch": "0.1.0",
          "channel": "2962592"
        }
        "#);
    }

    #[test]
    fn user_agent_names_the_crate() {
        assert!(VersionInfo::user_agent().starts_with("parkwatch/"));
    }
}
