//! Structured runtime logging.
//!
//! Records are filtered by level and target prefix against one process-wide
//! [`LogFilter`], then rendered by the calling thread's [`LoggerCore`].
//! Both start from [`RuntimeConfig::from_env`]; [`configure`] replaces them.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::panic::Location;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use chrono::Local;
use serde::Serialize;
use serde_json::{json, Map, Value as JsonValue};

use crate::config::RuntimeConfig;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn name(&self) -> &'static str {
        match self {
            LogLevel::Off => "OFF",
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }

    /// Accepts level names in any case, `warning`/`none` aliases, or 0-5.
    pub fn parse_level(text: &str) -> Option<LogLevel> {
        match text.trim().to_ascii_lowercase().as_str() {
            "off" | "none" | "0" => Some(LogLevel::Off),
            "error" | "1" => Some(LogLevel::Error),
            "warn" | "warning" | "2" => Some(LogLevel::Warn),
            "info" | "3" => Some(LogLevel::Info),
            "debug" | "4" => Some(LogLevel::Debug),
            "trace" | "5" => Some(LogLevel::Trace),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
    Compact,
}

impl LogFormat {
    pub fn parse(text: &str) -> Option<LogFormat> {
        match text.trim().to_ascii_lowercase().as_str() {
            "text" => Some(LogFormat::Text),
            "json" => Some(LogFormat::Json),
            "compact" => Some(LogFormat::Compact),
            _ => None,
        }
    }
}

/// A default level plus per-target overrides, written as
/// `info,boxrt::foreign=debug`.
#[derive(Debug, Clone, PartialEq)]
pub struct LogFilter {
    pub default: LogLevel,
    pub rules: Vec<(String, LogLevel)>,
}

impl Default for LogFilter {
    fn default() -> Self {
        LogFilter {
            default: LogLevel::Info,
            rules: Vec::new(),
        }
    }
}

impl LogFilter {
    pub fn parse(spec: &str) -> Result<LogFilter, String> {
        let mut filter = LogFilter::default();
        for directive in spec.split(',').map(str::trim).filter(|d| !d.is_empty()) {
            let (target, level) = match directive.split_once('=') {
                Some((target, level)) => (Some(target.trim()), level.trim()),
                None => (None, directive),
            };
            let level = LogLevel::parse_level(level)
                .ok_or_else(|| format!("Invalid log level '{}'", level))?;
            match target {
                Some(target) if !target.is_empty() => {
                    filter.rules.push((target.to_string(), level))
                }
                Some(_) => return Err(format!("Missing target in '{}'", directive)),
                None => filter.default = level,
            }
        }
        Ok(filter)
    }

    /// Level for `target`: the longest matching rule prefix, else the default.
    pub fn level_for(&self, target: &str) -> LogLevel {
        self.rules
            .iter()
            .filter(|(prefix, _)| target.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, level)| *level)
            .unwrap_or(self.default)
    }

    pub fn allows(&self, level: LogLevel, target: &str) -> bool {
        level != LogLevel::Off && level <= self.level_for(target)
    }
}

// Read lazily from the environment; an unusable spec falls back to `info`.
fn global_filter() -> &'static Mutex<LogFilter> {
    static FILTER: OnceLock<Mutex<LogFilter>> = OnceLock::new();
    FILTER.get_or_init(|| {
        let config = RuntimeConfig::from_env();
        Mutex::new(LogFilter::parse(&config.log_filter).unwrap_or_default())
    })
}

/// Installs `config` as the process filter and this thread's logger.
pub fn configure(config: &RuntimeConfig) -> Result<(), String> {
    let filter = LogFilter::parse(&config.log_filter)?;
    *global_filter()
        .lock()
        .map_err(|_| "log filter lock poisoned".to_string())? = filter;
    with_logger(|core| *core = LoggerCore::from_config(config))
        .ok_or_else(|| "thread logger unavailable".to_string())
}

pub fn log_enabled(level: LogLevel, target: &str) -> bool {
    global_filter()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .allows(level, target)
}

#[derive(Debug, Clone)]
pub struct LogRecord {
    pub level: LogLevel,
    pub message: String,
    pub target: String,
    pub file: String,
    pub line: u32,
    pub fields: Vec<(String, Value)>,
}

#[derive(Debug)]
pub enum LogSink {
    Stderr,
    /// Appends to `path`, opened on first write.
    File {
        path: PathBuf,
        handle: Option<File>,
    },
    /// Keeps the newest `capacity` lines.
    Memory {
        lines: VecDeque<String>,
        capacity: usize,
    },
}

impl LogSink {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        LogSink::File {
            path: path.into(),
            handle: None,
        }
    }

    pub fn memory(capacity: usize) -> Self {
        LogSink::Memory {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn write_line(&mut self, line: &str) {
        match self {
            LogSink::Stderr => eprintln!("{}", line),
            LogSink::File { path, handle } => {
                if handle.is_none() {
                    match OpenOptions::new().create(true).append(true).open(&*path) {
                        Ok(file) => *handle = Some(file),
                        Err(err) => {
                            eprintln!("Warning: cannot open log file {}: {}", path.display(), err);
                            return;
                        }
                    }
                }
                if let Some(file) = handle {
                    let _ = writeln!(file, "{}", line);
                }
            }
            LogSink::Memory { lines, capacity } => {
                if *capacity == 0 {
                    return;
                }
                if lines.len() == *capacity {
                    lines.pop_front();
                }
                lines.push_back(line.to_string());
            }
        }
    }
}

#[derive(Debug)]
pub struct LoggerCore {
    pub format: LogFormat,
    pub timestamps: bool,
    pub sinks: Vec<LogSink>,
}

impl Default for LoggerCore {
    fn default() -> Self {
        LoggerCore::from_config(&RuntimeConfig::default())
    }
}

impl LoggerCore {
    pub fn from_config(config: &RuntimeConfig) -> Self {
        let sink = match &config.log_file {
            Some(path) => LogSink::file(path.clone()),
            None => LogSink::Stderr,
        };
        LoggerCore {
            format: config.log_format,
            timestamps: config.log_timestamps,
            sinks: vec![sink],
        }
    }

    pub fn log(&mut self, record: &LogRecord) {
        let line = self.render(record);
        for sink in &mut self.sinks {
            sink.write_line(&line);
        }
    }

    /// Lines held by memory sinks, oldest first.
    pub fn memory_entries(&self) -> Vec<String> {
        let mut out = Vec::new();
        for sink in &self.sinks {
            if let LogSink::Memory { lines, .. } = sink {
                out.extend(lines.iter().cloned());
            }
        }
        out
    }

    fn render(&self, record: &LogRecord) -> String {
        if self.format == LogFormat::Json {
            return self.render_json(record);
        }

        let mut line = match self.format {
            LogFormat::Compact => format!("[{}] {}", record.level.name(), record.message),
            _ => {
                let mut head = String::new();
                if self.timestamps {
                    head.push_str(&timestamp_string());
                    head.push(' ');
                }
                format!(
                    "{}{:<5} {}: {}",
                    head,
                    record.level.name(),
                    record.target,
                    record.message
                )
            }
        };
        for (key, value) in &record.fields {
            line.push_str(&format!(" {}={}", key, value));
        }
        if self.format == LogFormat::Text {
            line.push_str(&format!(" ({}:{})", record.file, record.line));
        }
        line
    }

    fn render_json(&self, record: &LogRecord) -> String {
        let fields: Map<String, JsonValue> = record
            .fields
            .iter()
            .map(|(key, value)| (key.clone(), value_to_json(value, 0)))
            .collect();
        let mut obj = json!({
            "level": record.level.name(),
            "target": record.target,
            "msg": record.message,
            "file": record.file,
            "line": record.line,
            "fields": fields,
        });
        if self.timestamps {
            obj["ts"] = JsonValue::String(timestamp_string());
        }
        obj.to_string()
    }
}

const MAX_JSON_DEPTH: usize = 16;

fn value_to_json(value: &Value, depth: usize) -> JsonValue {
    if depth > MAX_JSON_DEPTH {
        return JsonValue::String("...".to_string());
    }
    match value {
        Value::Unit => JsonValue::Null,
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Int(n) => json!(n),
        Value::Float(f) => json!(f),
        Value::String(s) => JsonValue::String(s.to_string()),
        Value::Array(items) => match items.try_borrow() {
            Ok(items) => items
                .iter()
                .map(|item| value_to_json(item, depth + 1))
                .collect(),
            Err(_) => JsonValue::String("<borrowed>".to_string()),
        },
        Value::Dict(dict) => match dict.try_borrow() {
            Ok(dict) => JsonValue::Object(
                dict.iter()
                    .map(|(k, v)| (k.to_string(), value_to_json(v, depth + 1)))
                    .collect(),
            ),
            Err(_) => JsonValue::String("<borrowed>".to_string()),
        },
        other => JsonValue::String(other.to_string()),
    }
}

pub fn timestamp_string() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

thread_local! {
    static LOGGER: RefCell<LoggerCore> =
        RefCell::new(LoggerCore::from_config(&RuntimeConfig::from_env()));
}

/// Runs `f` against this thread's logger, e.g. to swap sinks. `None` during
/// thread teardown or re-entrant use.
pub fn with_logger<T, F>(f: F) -> Option<T>
where
    F: FnOnce(&mut LoggerCore) -> T,
{
    LOGGER
        .try_with(|logger| logger.try_borrow_mut().ok().map(|mut core| f(&mut core)))
        .ok()
        .flatten()
}

/// Emits a record if `level` is enabled for `target`, tagged with the
/// caller's source location.
#[track_caller]
pub fn log(level: LogLevel, target: &str, message: &str, fields: Vec<(String, Value)>) {
    if !log_enabled(level, target) {
        return;
    }
    let location = Location::caller();
    let record = LogRecord {
        level,
        message: message.to_string(),
        target: target.to_string(),
        file: location.file().to_string(),
        line: location.line(),
        fields,
    };
    with_logger(|core| core.log(&record));
}
