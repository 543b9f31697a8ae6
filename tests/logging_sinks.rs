use std::fs;

use tempfile::tempdir;

use boxrt::logging::{self, LogFormat, LogLevel, LogRecord, LogSink, LoggerCore};
use boxrt::{RuntimeConfig, Value};

fn record(message: &str) -> LogRecord {
    LogRecord {
        level: LogLevel::Warn,
        message: message.to_string(),
        target: "boxrt::foreign".to_string(),
        file: "tests/logging_sinks.rs".to_string(),
        line: 1,
        fields: vec![("unit".to_string(), Value::from("Main"))],
    }
}

#[test]
fn file_sink_appends_lines() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("boxrt.log");

    for message in ["first", "second"] {
        // A fresh sink per write: the file is reopened in append mode.
        let mut core = LoggerCore {
            format: LogFormat::Compact,
            timestamps: false,
            sinks: vec![LogSink::file(&path)],
        };
        core.log(&record(message));
    }

    let text = fs::read_to_string(&path).unwrap();
    assert_eq!(
        text.lines().collect::<Vec<_>>(),
        vec!["[WARN] first unit=Main", "[WARN] second unit=Main"]
    );
}

#[test]
fn logger_from_config_uses_file_and_format() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("json.log");
    let config = RuntimeConfig::from_lookup(|key| match key {
        "BOXRT_LOG_FORMAT" => Some("json".to_string()),
        "BOXRT_LOG_FILE" => Some(path.to_string_lossy().into_owned()),
        "BOXRT_LOG_TIMESTAMPS" => Some("false".to_string()),
        _ => None,
    });

    let mut core = LoggerCore::from_config(&config);
    assert_eq!(core.format, LogFormat::Json);
    assert!(!core.timestamps);
    core.log(&record("materialized"));
    drop(core);

    let line = fs::read_to_string(&path).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
    assert_eq!(parsed["msg"], "materialized");
    assert_eq!(parsed["target"], "boxrt::foreign");
    assert_eq!(parsed["fields"]["unit"], "Main");
}

#[test]
fn configure_installs_filter_and_thread_logger() {
    let config = RuntimeConfig::from_lookup(|key| match key {
        "BOXRT_LOG" => Some("info,boxrt::capture=trace".to_string()),
        "BOXRT_LOG_FORMAT" => Some("compact".to_string()),
        _ => None,
    });
    logging::configure(&config).unwrap();
    assert!(logging::log_enabled(LogLevel::Trace, "boxrt::capture::inner"));
    assert!(!logging::log_enabled(LogLevel::Debug, "boxrt::other"));

    let format = logging::with_logger(|core| {
        core.sinks = vec![LogSink::memory(8)];
        core.format
    })
    .unwrap();
    assert_eq!(format, LogFormat::Compact);

    logging::log(LogLevel::Trace, "boxrt::capture", "kept", Vec::new());
    logging::log(LogLevel::Debug, "boxrt::other", "dropped", Vec::new());

    let entries = logging::with_logger(|core| core.memory_entries()).unwrap();
    assert_eq!(entries, vec!["[TRACE] kept".to_string()]);
}

#[test]
fn configure_rejects_bad_filter() {
    let config = RuntimeConfig {
        log_filter: "boxrt=loud".to_string(),
        ..RuntimeConfig::default()
    };
    assert!(logging::configure(&config).is_err());
}
