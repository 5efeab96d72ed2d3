//! Typed, serde-driven configuration for the mediator and its
//! collaborators. Intended to be loaded from a JSON5 file via
//! [`serde_json5`], matching the loader convention used elsewhere in this
//! workspace's ambient stack.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration for a [`restsync_mediator::Mediator`]. Every
/// field has a default matching the distilled specification's defaults so a
/// caller only needs to override what they care about.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct MediatorConfig {
    /// Path to the on-disk `sled` database backing the durable store.
    pub db_path: String,

    /// Maximum number of transient-failure retries before an entry is
    /// given up on and surfaced as a permanent failure.
    pub max_retries: u32,

    /// Base delay used by the exponential backoff computation.
    #[serde(with = "humantime_serde")]
    pub backoff_base: Duration,

    /// Upper bound on the exponential backoff computation (before jitter).
    #[serde(with = "humantime_serde")]
    pub backoff_max: Duration,

    /// How long to wait for the `refresh_token` hook before treating it as
    /// failed. Unbounded would let a misbehaving hook stall the
    /// single-flight drain forever.
    #[serde(with = "humantime_serde")]
    pub refresh_timeout: Duration,

    /// Optional URL the [`restsync_net`] reachability probe issues a
    /// lightweight `HEAD` request against. When absent, the probe always
    /// reports reachable unless forced offline.
    pub reachability_probe_url: Option<String>,

    /// How often the background runner polls for a reachability
    /// transition and re-attempts a drain, standing in for the platform's
    /// background-sync wake-up.
    #[serde(with = "humantime_serde")]
    pub background_poll_interval: Duration,
}

impl Default for MediatorConfig {
    fn default() -> Self {
        MediatorConfig {
            db_path: "rest-sync-lite.sled".to_string(),
            max_retries: 5,
            backoff_base: Duration::from_millis(1000),
            backoff_max: Duration::from_millis(30_000),
            refresh_timeout: Duration::from_secs(10),
            reachability_probe_url: None,
            background_poll_interval: Duration::from_secs(30),
        }
    }
}

impl MediatorConfig {
    /// Parses a JSON5 configuration document, falling back to defaults for
    /// any field the document omits.
    pub fn from_json5(text: &str) -> Result<Self, serde_json5::Error> {
        serde_json5::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_empty_document() {
        let config = MediatorConfig::from_json5("{}").unwrap();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.db_path, "rest-sync-lite.sled");
    }

    #[test]
    fn overrides_apply_selectively() {
        let config = MediatorConfig::from_json5(
            r#"{
                max_retries: 3,
                backoff_base: "500ms",
            }"#,
        )
        .unwrap();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.backoff_base, Duration::from_millis(500));
        assert_eq!(config.backoff_max, Duration::from_millis(30_000));
    }
}
