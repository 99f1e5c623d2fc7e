//! Shared types for logforward
//!
//! This crate contains the configuration model and the log entry type used
//! across the tailing, output and supervision crates.

mod duration;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use duration::parse_duration;

/// Static enrichment fields shared by every entry of a target
pub type Fields = Arc<BTreeMap<String, String>>;

// ============================================================================
// Configuration Types
// ============================================================================

/// Serialization format for the output sink
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One JSON object per line
    #[default]
    Json,
    /// Event text only, one per line
    Raw,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Raw => "raw",
        }
    }
}

/// A named group of glob patterns sharing filters and enrichment fields
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Target {
    pub name: String,

    /// Glob patterns expanded on every discovery cycle
    #[serde(default)]
    pub paths: Vec<String>,

    /// Records whose assembled text matches are dropped
    #[serde(default)]
    pub exclude_pattern: Option<String>,

    /// Lines matching this pattern start a new record
    #[serde(default)]
    pub multiline_pattern: Option<String>,

    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl Target {
    pub fn new(name: impl Into<String>, paths: Vec<String>) -> Self {
        Self {
            name: name.into(),
            paths,
            ..Default::default()
        }
    }
}

/// Configuration as read from disk, before validation
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Config {
    /// Discovery interval as a duration string, e.g. `"5s"`
    #[serde(default)]
    pub poll_interval: String,

    #[serde(default)]
    pub output_format: OutputFormat,

    #[serde(default)]
    pub targets: Vec<Target>,
}

/// Validated, immutable configuration consumed by the agent
#[derive(Clone, Debug)]
pub struct Settings {
    pub poll_interval: Duration,
    pub output_format: OutputFormat,
    pub targets: Vec<Target>,
}

impl Config {
    /// Validate the raw config and resolve the poll interval
    pub fn validate(self) -> Result<Settings, ConfigError> {
        Settings::try_from(self)
    }
}

impl TryFrom<Config> for Settings {
    type Error = ConfigError;

    fn try_from(config: Config) -> Result<Self, Self::Error> {
        if config.poll_interval.trim().is_empty() {
            return Err(ConfigError::MissingPollInterval);
        }
        let poll_interval = parse_duration(&config.poll_interval).map_err(|reason| {
            ConfigError::InvalidPollInterval {
                value: config.poll_interval.clone(),
                reason,
            }
        })?;
        if poll_interval.is_zero() {
            return Err(ConfigError::InvalidPollInterval {
                value: config.poll_interval,
                reason: "interval must be greater than zero".to_string(),
            });
        }
        if config.targets.is_empty() {
            return Err(ConfigError::NoTargets);
        }

        Ok(Self {
            poll_interval,
            output_format: config.output_format,
            targets: config.targets,
        })
    }
}

/// Errors raised while loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("poll_interval must be set")]
    MissingPollInterval,

    #[error("invalid poll_interval '{value}': {reason}")]
    InvalidPollInterval { value: String, reason: String },

    #[error("no targets configured")]
    NoTargets,

    #[error("invalid {kind} for target '{target}': {reason}")]
    InvalidPattern {
        target: String,
        kind: &'static str,
        reason: String,
    },
}

// ============================================================================
// Log Types
// ============================================================================

/// A single forwarded log record
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LogEntry {
    /// Unix timestamp in seconds
    pub time: i64,

    pub host: String,

    /// Base name of the tailed file
    pub source: String,

    /// Name of the owning target
    #[serde(rename = "sourcetype")]
    pub source_type: String,

    /// Assembled message text, never empty
    pub event: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Fields>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(poll_interval: &str, targets: Vec<Target>) -> Config {
        Config {
            poll_interval: poll_interval.to_string(),
            output_format: OutputFormat::Json,
            targets,
        }
    }

    #[test]
    fn test_validate_resolves_interval() {
        let cfg = config("5s", vec![Target::new("t", vec!["/tmp/x.log".into()])]);
        let settings = cfg.validate().unwrap();
        assert_eq!(settings.poll_interval, Duration::from_secs(5));
        assert_eq!(settings.output_format, OutputFormat::Json);
    }

    #[test]
    fn test_validate_rejects_missing_interval() {
        let cfg = config("", vec![Target::new("t", vec![])]);
        assert!(matches!(cfg.validate(), Err(ConfigError::MissingPollInterval)));
    }

    #[test]
    fn test_validate_rejects_bad_interval() {
        let cfg = config("soon", vec![Target::new("t", vec![])]);
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("invalid poll_interval"));

        let cfg = config("0s", vec![Target::new("t", vec![])]);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_no_targets() {
        let cfg = config("1s", vec![]);
        assert!(matches!(cfg.validate(), Err(ConfigError::NoTargets)));
    }

    #[test]
    fn test_deserialize_yaml_defaults() {
        let yaml = r#"
poll_interval: 5s
targets:
  - name: app
    paths: ["/var/log/app/*.log"]
    multiline_pattern: '^\d{4}-'
    fields:
      env: prod
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.output_format, OutputFormat::Json);
        assert_eq!(cfg.targets.len(), 1);
        assert_eq!(cfg.targets[0].exclude_pattern, None);
        assert_eq!(cfg.targets[0].fields.get("env").map(String::as_str), Some("prod"));
    }

    #[test]
    fn test_deserialize_rejects_unknown_format() {
        let yaml = "poll_interval: 1s\noutput_format: xml\ntargets: []\n";
        assert!(serde_yaml::from_str::<Config>(yaml).is_err());

        let yaml = "poll_interval: 1s\noutput_format: raw\ntargets: []\n";
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.output_format, OutputFormat::Raw);
    }

    #[test]
    fn test_entry_omits_absent_fields() {
        let entry = LogEntry {
            time: 1_700_000_000,
            host: "h".to_string(),
            source: "x.log".to_string(),
            source_type: "t".to_string(),
            event: "hello".to_string(),
            fields: None,
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert_eq!(
            json,
            r#"{"time":1700000000,"host":"h","source":"x.log","sourcetype":"t","event":"hello"}"#
        );
    }

    #[test]
    fn test_entry_serializes_shared_fields() {
        let fields: Fields = Arc::new(BTreeMap::from([("env".to_string(), "prod".to_string())]));
        let entry = LogEntry {
            time: 1,
            host: "h".to_string(),
            source: "x.log".to_string(),
            source_type: "t".to_string(),
            event: "hello".to_string(),
            fields: Some(fields),
        };
        let value: serde_json::Value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["fields"]["env"], "prod");
    }
}
