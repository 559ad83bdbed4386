//! Grabber configuration.
//!
//! A [`GrabberConfig`] is read once from TOML and passed by value into the
//! components that need it; nothing looks configuration up globally.
//!
//! ```toml
//! timezone = "Europe/Amsterdam"
//!
//! [provider]
//! channel_list_url = "https://example.com/channels"
//! segment_url = "https://example.com/segments/{segment}"
//! detail_url = "https://example.com/events/{program}"
//!
//! [sync]
//! scan_days = 14
//! concurrency = 4
//!
//! [xmltv]
//! dvb_categories = true
//! ```

use std::path::Path;
use std::str::FromStr;

use chrono_tz::Tz;
use epg_core::{DEFAULT_SEGMENT_HOURS, EpgError, Result, SegmentGrid};
use epg_ziggo::ZiggoConfig;
use serde::Deserialize;

use crate::matcher::DEFAULT_MATCH_THRESHOLD;
use crate::retry::RetryPolicy;
use crate::sync::{DEFAULT_CONCURRENCY, SyncOptions};
use crate::xmltv::XmltvOptions;

/// Default number of days to grab.
pub const DEFAULT_SCAN_DAYS: u32 = 14;

fn default_timezone() -> String {
    "Europe/Amsterdam".to_string()
}

/// Complete grabber configuration.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct GrabberConfig {
    /// Remote provider endpoints.
    pub provider: ZiggoConfig,
    /// IANA timezone of the XMLTV timestamps.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Synchronisation settings.
    #[serde(default)]
    pub sync: SyncConfig,
    /// XMLTV output settings.
    #[serde(default)]
    pub xmltv: XmltvOptions,
}

/// The `[sync]` section.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Number of whole days to grab, starting today.
    pub scan_days: u32,
    /// Segment period of the provider in hours.
    pub segment_hours: u32,
    /// Maximum number of requests in flight.
    pub concurrency: usize,
    /// Minimum score for fuzzy channel name matches.
    pub match_threshold: f64,
    /// Remove data from before the window after a sync.
    pub prune: bool,
    /// Retries of transient failures.
    pub retry: RetryPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            scan_days: DEFAULT_SCAN_DAYS,
            segment_hours: DEFAULT_SEGMENT_HOURS,
            concurrency: DEFAULT_CONCURRENCY,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            prune: true,
            retry: RetryPolicy::default(),
        }
    }
}

impl GrabberConfig {
    /// Parse and validate a configuration from TOML text.
    ///
    /// # Errors
    /// Returns [`EpgError::Config`] if the text does not parse or is invalid.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| EpgError::Config(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a configuration file.
    ///
    /// # Errors
    /// Returns [`EpgError::Config`] if the file cannot be read or is invalid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            EpgError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&text)
            .map_err(|e| EpgError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Checks every setting.
    ///
    /// # Errors
    /// Returns [`EpgError::Config`] describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        self.provider.validate()?;
        self.tz()?;

        let sync = &self.sync;
        if sync.scan_days == 0 {
            return Err(EpgError::Config("sync.scan_days must be at least 1".to_string()));
        }
        if sync.concurrency == 0 {
            return Err(EpgError::Config("sync.concurrency must be at least 1".to_string()));
        }
        if !(sync.match_threshold > 0.0 && sync.match_threshold <= 1.0) {
            return Err(EpgError::Config(format!(
                "sync.match_threshold {} is outside (0, 1]",
                sync.match_threshold
            )));
        }
        if sync.retry.max_attempts == 0 {
            return Err(EpgError::Config("sync.retry.max_attempts must be at least 1".to_string()));
        }
        SegmentGrid::from_hours(sync.segment_hours)
            .map_err(|e| EpgError::Config(e.to_string()))?;
        Ok(())
    }

    /// The output timezone.
    ///
    /// # Errors
    /// Returns [`EpgError::Config`] for an unknown timezone name.
    pub fn tz(&self) -> Result<Tz> {
        Tz::from_str(&self.timezone)
            .map_err(|_| EpgError::Config(format!("Unknown timezone '{}'", self.timezone)))
    }

    /// Orchestrator options derived from the `[sync]` section.
    ///
    /// # Errors
    /// Returns [`EpgError::Config`] for an invalid segment period.
    pub fn sync_options(&self) -> Result<SyncOptions> {
        Ok(SyncOptions {
            grid: SegmentGrid::from_hours(self.sync.segment_hours)
                .map_err(|e| EpgError::Config(e.to_string()))?,
            concurrency: self.sync.concurrency,
            retry: self.sync.retry.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [provider]
        channel_list_url = "https://example.com/channels"
        segment_url = "https://example.com/segments/{segment}"
        detail_url = "https://example.com/events/{program}"
    "#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = GrabberConfig::from_toml(MINIMAL).unwrap();
        assert_eq!(config.timezone, "Europe/Amsterdam");
        assert_eq!(config.tz().unwrap(), chrono_tz::Europe::Amsterdam);
        assert_eq!(config.sync, SyncConfig::default());
        assert_eq!(config.xmltv, XmltvOptions::default());
        assert_eq!(config.provider.request_interval_ms, 100);

        let options = config.sync_options().unwrap();
        assert_eq!(options.grid, SegmentGrid::default());
        assert_eq!(options.concurrency, DEFAULT_CONCURRENCY);
    }

    #[test]
    fn test_full_config() {
        let text = format!(
            "timezone = \"UTC\"\n{}\n[sync]\nscan_days = 3\nsegment_hours = 8\nprune = false\n\n[sync.retry]\nmax_attempts = 5\n\n[xmltv]\nlang = \"en\"\n",
            MINIMAL
        );
        let config = GrabberConfig::from_toml(&text).unwrap();
        assert_eq!(config.tz().unwrap(), chrono_tz::UTC);
        assert_eq!(config.sync.scan_days, 3);
        assert!(!config.sync.prune);
        assert_eq!(config.sync.retry.max_attempts, 5);
        assert_eq!(config.xmltv.lang, "en");
        assert_eq!(config.sync_options().unwrap().grid.period().num_hours(), 8);
    }

    #[test]
    fn test_invalid_settings_are_rejected() {
        let cases = [
            "timezone = \"Mars/Olympus\"",
            "[sync]\nconcurrency = 0",
            "[sync]\nscan_days = 0",
            "[sync]\nsegment_hours = 5",
            "[sync]\nmatch_threshold = 1.5",
        ];
        for case in cases {
            let text = if case.starts_with('[') {
                format!("{}\n{}", MINIMAL, case)
            } else {
                format!("{}\n{}", case, MINIMAL)
            };
            assert!(
                matches!(GrabberConfig::from_toml(&text), Err(EpgError::Config(_))),
                "accepted: {}",
                case
            );
        }
    }

    #[test]
    fn test_missing_provider_is_rejected() {
        assert!(GrabberConfig::from_toml("timezone = \"UTC\"").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grabber.toml");
        std::fs::write(&path, MINIMAL).unwrap();

        let config = GrabberConfig::load(&path).unwrap();
        assert_eq!(config.provider.name, "ZiggoGo");

        let err = GrabberConfig::load(dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, EpgError::Config(_)));
    }

    #[test]
    fn test_bundled_configuration_is_valid() {
        let text = include_str!("../../../config/ziggo-nl.toml");
        let config = GrabberConfig::from_toml(text).unwrap();
        assert!(!config.provider.per_channel_segments());
    }
}
