//! Logging configuration
//!
//! A [`LogConfig`] names a base level, per-crate overrides and the sinks
//! events go to. Every field is optional when read from JSON.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::LoggingError;

/// Where and how a node logs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Level for every target not listed in `targets`
    pub level: String,
    /// Per-target levels, e.g. `"annulus_routing": "trace"`
    pub targets: BTreeMap<String, String>,
    pub console: ConsoleSink,
    /// Log file output; none unless set
    pub file: Option<FileSink>,
    /// Fields written with every JSON event
    pub json: JsonFields,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            targets: BTreeMap::new(),
            console: ConsoleSink::default(),
            file: None,
            json: JsonFields::default(),
        }
    }
}

impl LogConfig {
    /// Debug level, pretty colored console
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            console: ConsoleSink::pretty(true),
            ..Self::default()
        }
    }

    /// Development output plus every routing decision and cache lookup
    pub fn routing_trace() -> Self {
        Self::development().with_target("annulus_routing", "trace")
    }

    /// JSON lines into daily files under `log_dir`, console off
    pub fn production(log_dir: PathBuf) -> Self {
        Self {
            console: ConsoleSink::disabled(),
            file: Some(FileSink::new(log_dir)),
            ..Self::default()
        }
    }

    /// Warnings only, plain text without color codes
    pub fn testing() -> Self {
        Self {
            level: "warn".to_string(),
            console: ConsoleSink::pretty(false),
            ..Self::default()
        }
    }

    /// Override the level of one target
    pub fn with_target(mut self, target: impl Into<String>, level: impl Into<String>) -> Self {
        self.targets.insert(target.into(), level.into());
        self
    }

    pub fn from_json(s: &str) -> Result<Self, LoggingError> {
        Ok(serde_json::from_str(s)?)
    }

    /// Filter directives: the base level, then `target=level` by target name
    pub fn directives(&self) -> Vec<String> {
        std::iter::once(self.level.clone())
            .chain(
                self.targets
                    .iter()
                    .map(|(target, level)| format!("{target}={level}")),
            )
            .collect()
    }
}

/// How events are rendered on the console
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleSink {
    pub enabled: bool,
    pub format: ConsoleFormat,
    /// Color codes; only used by the pretty format
    pub ansi: bool,
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self {
            enabled: true,
            format: ConsoleFormat::Json,
            ansi: false,
        }
    }
}

impl ConsoleSink {
    pub fn pretty(ansi: bool) -> Self {
        Self {
            enabled: true,
            format: ConsoleFormat::Pretty,
            ansi,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn is_pretty(&self) -> bool {
        self.enabled && self.format == ConsoleFormat::Pretty
    }

    pub fn is_json(&self) -> bool {
        self.enabled && self.format == ConsoleFormat::Json
    }
}

/// JSON lines written to `<directory>/<prefix>...`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSink {
    pub directory: PathBuf,
    pub prefix: String,
    pub rotation: FileRotation,
}

impl Default for FileSink {
    fn default() -> Self {
        Self::new(PathBuf::from("./logs"))
    }
}

impl FileSink {
    pub fn new(directory: PathBuf) -> Self {
        Self {
            directory,
            prefix: "annulus".to_string(),
            rotation: FileRotation::Daily,
        }
    }
}

/// When a new log file is started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileRotation {
    #[default]
    Daily,
    Hourly,
    /// One `<prefix>.log`, truncated on start
    Never,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonFields {
    /// Event fields at the top level instead of under `fields`
    pub flatten: bool,
    /// The full span stack, not just the current span
    pub span_list: bool,
    pub source_location: bool,
    pub thread: bool,
}

impl Default for JsonFields {
    fn default() -> Self {
        Self {
            flatten: true,
            span_list: true,
            source_location: false,
            thread: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_log_json_to_console() {
        let config = LogConfig::default();
        assert_eq!(config.level, "info");
        assert!(config.console.is_json());
        assert!(!config.console.is_pretty());
        assert!(config.file.is_none());
        assert_eq!(config.directives(), vec!["info"]);
    }

    #[test]
    fn test_presets() {
        let dev = LogConfig::development();
        assert_eq!(dev.level, "debug");
        assert!(dev.console.is_pretty() && dev.console.ansi);

        let test = LogConfig::testing();
        assert_eq!(test.level, "warn");
        assert!(!test.console.ansi);

        let prod = LogConfig::production(PathBuf::from("/var/log/annulus"));
        assert!(!prod.console.is_json() && !prod.console.is_pretty());
        let file = prod.file.unwrap();
        assert_eq!(file.directory, PathBuf::from("/var/log/annulus"));
        assert_eq!(file.rotation, FileRotation::Daily);
    }

    #[test]
    fn test_routing_trace_directives() {
        let config = LogConfig::routing_trace().with_target("annulus_core", "warn");
        assert_eq!(
            config.directives(),
            vec!["debug", "annulus_core=warn", "annulus_routing=trace"]
        );
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = LogConfig::from_json(
            r#"{"level": "debug", "console": {"format": "pretty"}, "file": {"rotation": "never"}}"#,
        )
        .unwrap();
        assert_eq!(config.level, "debug");
        assert!(config.console.is_pretty());
        let file = config.file.unwrap();
        assert_eq!(file.rotation, FileRotation::Never);
        assert_eq!(file.prefix, "annulus");
        assert!(config.json.flatten);
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(matches!(
            LogConfig::from_json("{not json"),
            Err(LoggingError::Config(_))
        ));
    }
}
