//! Build mode and environment-driven runtime configuration.

use std::path::PathBuf;

use serde::Serialize;

use crate::logging::{LogFilter, LogFormat, LogLevel};

pub const ENV_LOG: &str = "BOXRT_LOG";
pub const ENV_LOG_LEVEL: &str = "BOXRT_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "BOXRT_LOG_FORMAT";
pub const ENV_LOG_FILE: &str = "BOXRT_LOG_FILE";
pub const ENV_LOG_TIMESTAMPS: &str = "BOXRT_LOG_TIMESTAMPS";

/// Compile-time safety switch for indexing and unboxing.
///
/// Checked builds report type mismatches, out-of-range indices and missing
/// keys as errors. Unchecked builds (`--features unchecked`) do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    Checked,
    Unchecked,
}

impl BuildMode {
    pub const fn current() -> Self {
        if cfg!(feature = "unchecked") {
            BuildMode::Unchecked
        } else {
            BuildMode::Checked
        }
    }

    pub fn is_checked(self) -> bool {
        self == BuildMode::Checked
    }

    pub fn name(self) -> &'static str {
        match self {
            BuildMode::Checked => "checked",
            BuildMode::Unchecked => "unchecked",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuntimeConfig {
    pub build_mode: BuildMode,
    /// Filter spec such as `info,boxrt::foreign=debug`.
    pub log_filter: String,
    pub log_format: LogFormat,
    pub log_timestamps: bool,
    pub log_file: Option<PathBuf>,
    /// Problems found while reading the environment. Offending values fall
    /// back to their defaults.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            build_mode: BuildMode::current(),
            log_filter: LogLevel::Info.name().to_lowercase(),
            log_format: LogFormat::Text,
            log_timestamps: true,
            log_file: None,
            warnings: Vec::new(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = RuntimeConfig::default();

        // BOXRT_LOG wins over the plain level variable.
        if let Some(spec) = lookup(ENV_LOG) {
            match LogFilter::parse(&spec) {
                Ok(_) => config.log_filter = spec,
                Err(err) => config
                    .warnings
                    .push(format!("Invalid {} filter '{}': {}", ENV_LOG, spec, err)),
            }
        } else if let Some(level) = lookup(ENV_LOG_LEVEL) {
            match LogLevel::parse_level(&level) {
                Some(level) => config.log_filter = level.name().to_lowercase(),
                None => config
                    .warnings
                    .push(format!("Invalid {} '{}'", ENV_LOG_LEVEL, level)),
            }
        }

        if let Some(format) = lookup(ENV_LOG_FORMAT) {
            match LogFormat::parse(&format) {
                Some(format) => config.log_format = format,
                None => config
                    .warnings
                    .push(format!("Invalid {} '{}'", ENV_LOG_FORMAT, format)),
            }
        }

        if let Some(flag) = lookup(ENV_LOG_TIMESTAMPS) {
            match flag.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => config.log_timestamps = true,
                "0" | "false" | "no" | "off" => config.log_timestamps = false,
                _ => config
                    .warnings
                    .push(format!("Invalid {} '{}'", ENV_LOG_TIMESTAMPS, flag)),
            }
        }

        if let Some(path) = lookup(ENV_LOG_FILE) {
            if !path.trim().is_empty() {
                config.log_file = Some(PathBuf::from(path));
            }
        }

        config
    }
}
