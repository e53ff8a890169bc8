//! Structured logging for benchmark runs
//!
//! Every run gets a session id so that log lines from preflight, the
//! executor and diagnostics can be correlated. Debug runs emit JSON lines,
//! otherwise entries go to the console in a human-readable form.

use crate::error::AppError;
use crate::models::{Config, ExecutionSummary, TestRecord};
use crate::types::TestStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Log level enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }

    /// ANSI color code for console output
    pub fn color_code(&self) -> &'static str {
        match self {
            LogLevel::Debug => "\x1b[36m",
            LogLevel::Info => "\x1b[32m",
            LogLevel::Warn => "\x1b[33m",
            LogLevel::Error => "\x1b[31m",
        }
    }

    pub fn reset_code() -> &'static str {
        "\x1b[0m"
    }
}

/// A single structured log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    /// Component that emitted the entry
    pub logger: String,
    pub fields: HashMap<String, serde_json::Value>,
    pub location: Option<LogLocation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLocation {
    pub file: String,
    pub line: u32,
    pub module: Option<String>,
}

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogFormat {
    /// Human-readable console format
    Console,
    /// One JSON object per line
    Json,
}

/// Logger with level filtering and a shared session id
pub struct Logger {
    min_level: LogLevel,
    use_color: bool,
    include_location: bool,
    format: LogFormat,
    name: String,
    session_id: Arc<RwLock<Option<String>>>,
}

impl Logger {
    /// `--debug` selects Debug and JSON, `--verbose` selects Info, otherwise
    /// only warnings and errors are shown
    pub fn with_config(name: String, config: &Config) -> Self {
        let min_level = if config.debug {
            LogLevel::Debug
        } else if config.verbose {
            LogLevel::Info
        } else {
            LogLevel::Warn
        };

        Self {
            min_level,
            use_color: config.enable_color,
            include_location: config.debug,
            format: if config.debug { LogFormat::Json } else { LogFormat::Console },
            name,
            session_id: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn set_session_id(&self, session_id: String) {
        *self.session_id.write().await = Some(session_id);
    }

    pub fn log(&self, level: LogLevel, message: &str) -> LogEntryBuilder<'_> {
        LogEntryBuilder::new(self, level, message.to_string())
    }

    pub fn debug(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Debug, message)
    }

    pub fn info(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Info, message)
    }

    pub fn warn(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Warn, message)
    }

    pub fn error(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Error, message)
    }

    async fn write_entry(&self, mut entry: LogEntry) {
        if entry.level < self.min_level {
            return;
        }

        if let Some(session_id) = self.session_id.read().await.as_ref() {
            entry.fields.insert("session_id".to_string(), serde_json::Value::String(session_id.clone()));
        }

        let output = self.render(&entry);

        // Warnings and errors must not mix with the result tables on stdout
        if entry.level >= LogLevel::Warn {
            let _ = writeln!(io::stderr(), "{}", output);
        } else {
            let _ = writeln!(io::stdout(), "{}", output);
        }
    }

    fn render(&self, entry: &LogEntry) -> String {
        match self.format {
            LogFormat::Console => self.format_console(entry),
            LogFormat::Json => self.format_json(entry),
        }
    }

    fn format_console(&self, entry: &LogEntry) -> String {
        let timestamp = entry.timestamp.format("%Y-%m-%d %H:%M:%S%.3f");
        let level_str = entry.level.as_str();

        let formatted_level = if self.use_color {
            format!("{}{:>5}{}", entry.level.color_code(), level_str, LogLevel::reset_code())
        } else {
            format!("{:>5}", level_str)
        };

        let mut output = format!("{} {} [{}] {}", timestamp, formatted_level, entry.logger, entry.message);

        // The session id only matters when lines from several runs are mixed
        let mut fields: Vec<String> = entry
            .fields
            .iter()
            .filter(|(k, _)| k.as_str() != "session_id")
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        if !fields.is_empty() {
            fields.sort();
            output.push_str(&format!(" {{{}}}", fields.join(", ")));
        }

        if self.include_location {
            if let Some(location) = &entry.location {
                output.push_str(&format!(" @ {}:{}", location.file, location.line));
            }
        }

        output
    }

    fn format_json(&self, entry: &LogEntry) -> String {
        match serde_json::to_string(entry) {
            Ok(json) => json,
            Err(_) => format!("{{\"error\": \"Failed to serialize log entry\", \"message\": {:?}}}", entry.message),
        }
    }
}

/// Builder for log entries
pub struct LogEntryBuilder<'a> {
    logger: &'a Logger,
    entry: LogEntry,
}

impl<'a> LogEntryBuilder<'a> {
    fn new(logger: &'a Logger, level: LogLevel, message: String) -> Self {
        Self {
            logger,
            entry: LogEntry {
                timestamp: Utc::now(),
                level,
                message,
                logger: logger.name.clone(),
                fields: HashMap::new(),
                location: None,
            },
        }
    }

    /// Add a structured field; values that fail to serialize are dropped
    pub fn field<T: Serialize>(mut self, key: &str, value: T) -> Self {
        if let Ok(json_value) = serde_json::to_value(value) {
            self.entry.fields.insert(key.to_string(), json_value);
        }
        self
    }

    pub fn location(mut self, file: &str, line: u32, module: Option<&str>) -> Self {
        self.entry.location = Some(LogLocation {
            file: file.to_string(),
            line,
            module: module.map(String::from),
        });
        self
    }

    /// Describe a finished mlc invocation
    pub fn record(self, record: &TestRecord) -> Self {
        let invocation = &record.invocation;
        self.field("test", invocation.kind.file_stem())
            .field("socket", invocation.socket)
            .field("cpus", invocation.cpu_count())
            .field("traffic", invocation.traffic.map(|t| t.tag()))
            .field("pattern", invocation.pattern.map(|p| p.tag()))
            .field("status", record.status)
            .field("elapsed_ms", record.elapsed.as_millis() as u64)
            .field("output_file", invocation.output_file.display().to_string())
    }

    pub fn error_info(self, error: &AppError) -> Self {
        self.field("error_category", error.category())
            .field("error_exit_code", error.exit_code())
    }

    pub async fn log(self) {
        self.logger.write_entry(self.entry).await;
    }
}

/// Progress and timing logger used by the executor
pub struct BenchLogger {
    logger: Logger,
}

impl BenchLogger {
    pub fn new(config: &Config) -> Self {
        Self {
            logger: Logger::with_config("BENCH".to_string(), config),
        }
    }

    pub async fn log_invocation_start(&self, index: usize, total: usize, command: &str) {
        self.logger
            .info(&format!("[{}/{}] {}", index + 1, total, command))
            .field("index", index + 1)
            .field("total", total)
            .log()
            .await;
    }

    pub async fn log_record(&self, record: &TestRecord) {
        let level = match record.status {
            TestStatus::Success => LogLevel::Info,
            TestStatus::Skipped => LogLevel::Debug,
            TestStatus::Failed | TestStatus::Timeout => LogLevel::Error,
        };
        let detail = match (&record.measurement, &record.error_message) {
            (Some(m), _) => m.headline(),
            (None, Some(e)) => e.clone(),
            (None, None) => String::new(),
        };
        let message = format!(
            "{} finished in {:.1}s: {}",
            record.invocation.label(),
            record.elapsed.as_secs_f64(),
            detail
        );

        self.logger.log(level, &message).record(record).log().await;
    }

    pub async fn log_run_summary(&self, summary: &ExecutionSummary) {
        let per_run = if summary.successful > 0 {
            summary.total_duration.as_secs_f64() / summary.successful as f64
        } else {
            0.0
        };

        self.logger
            .info(&format!(
                "Run summary: {}/{} succeeded in {:.1}s (avg {:.1}s per run)",
                summary.successful,
                summary.total_planned,
                summary.total_duration.as_secs_f64(),
                per_run
            ))
            .field("planned", summary.total_planned)
            .field("successful", summary.successful)
            .field("failed", summary.failed)
            .field("timed_out", summary.timed_out)
            .field("skipped", summary.skipped)
            .field("interrupted", summary.interrupted)
            .field("mlc_version", &summary.mlc_version)
            .log()
            .await;
    }

    pub async fn log_error(&self, error: &AppError, context: &str, elapsed: Duration) {
        self.logger
            .error(&format!("{}: {}", context, error))
            .error_info(error)
            .field("elapsed_ms", elapsed.as_millis() as u64)
            .log()
            .await;
    }
}

/// Creates loggers that share one session id
pub struct LoggerFactory {
    config: Config,
    session_id: String,
}

impl LoggerFactory {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            session_id: Uuid::new_v4().to_string(),
        }
    }

    pub async fn create_logger(&self, name: &str) -> Logger {
        let logger = Logger::with_config(name.to_string(), &self.config);
        logger.set_session_id(self.session_id.clone()).await;
        logger
    }

    pub async fn create_bench_logger(&self) -> BenchLogger {
        let bench = BenchLogger::new(&self.config);
        bench.logger.set_session_id(self.session_id.clone()).await;
        bench
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

/// Log with source location attached
#[macro_export]
macro_rules! log_debug {
    ($logger:expr, $($arg:tt)*) => {
        $logger.debug(&format!($($arg)*))
            .location(file!(), line!(), Some(module_path!()))
            .log()
            .await
    };
}

#[macro_export]
macro_rules! log_info {
    ($logger:expr, $($arg:tt)*) => {
        $logger.info(&format!($($arg)*))
            .location(file!(), line!(), Some(module_path!()))
            .log()
            .await
    };
}

#[macro_export]
macro_rules! log_warn {
    ($logger:expr, $($arg:tt)*) => {
        $logger.warn(&format!($($arg)*))
            .location(file!(), line!(), Some(module_path!()))
            .log()
            .await
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::plan::MlcInvocation;
    use crate::models::Measurement;
    use crate::types::TestKind;

    fn entry(level: LogLevel) -> LogEntry {
        let mut fields = HashMap::new();
        fields.insert("key".to_string(), serde_json::Value::String("value".to_string()));
        fields.insert("session_id".to_string(), serde_json::Value::String("abc".to_string()));
        LogEntry {
            timestamp: Utc::now(),
            level,
            message: "Test message".to_string(),
            logger: "TEST".to_string(),
            fields,
            location: Some(LogLocation { file: "x.rs".to_string(), line: 7, module: None }),
        }
    }

    fn plain(debug: bool) -> Logger {
        let config = Config { debug, enable_color: false, ..Default::default() };
        Logger::with_config("TEST".to_string(), &config)
    }

    #[test]
    fn test_level_from_config() {
        let logger = plain(true);
        assert_eq!(logger.min_level, LogLevel::Debug);
        assert_eq!(logger.format, LogFormat::Json);
        assert!(!logger.use_color);
        assert!(logger.include_location);

        let config = Config { verbose: true, ..Default::default() };
        assert_eq!(Logger::with_config("T".to_string(), &config).min_level, LogLevel::Info);
        assert_eq!(Logger::with_config("T".to_string(), &Config::default()).min_level, LogLevel::Warn);
    }

    #[test]
    fn test_console_format() {
        let mut logger = plain(false);
        logger.include_location = true;

        let console = logger.render(&entry(LogLevel::Info));
        assert!(console.contains(" INFO [TEST] Test message {key=\"value\"}"));
        assert!(!console.contains("session_id"));
        assert!(console.ends_with("@ x.rs:7"));
    }

    #[test]
    fn test_json_format_round_trips_fields() {
        let logger = plain(true);
        let json = logger.render(&entry(LogLevel::Warn));
        let parsed: LogEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.level, LogLevel::Warn);
        assert_eq!(parsed.fields["session_id"], "abc");
    }

    #[test]
    fn test_record_fields() {
        let logger = plain(false);
        let record = TestRecord::success(
            MlcInvocation::for_tests(TestKind::PeakBandwidth, "peak_bandwidth_4cpu.txt"),
            Measurement::Bandwidth { mbps: 1.0 },
            Duration::from_millis(1500),
        );
        let builder = logger.info("done").record(&record);
        assert_eq!(builder.entry.fields["test"], "peak_bandwidth");
        assert_eq!(builder.entry.fields["elapsed_ms"], 1500);
        assert_eq!(builder.entry.fields["traffic"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn test_factory_shares_session() {
        let factory = LoggerFactory::new(Config::default());
        let logger = factory.create_logger("APP").await;
        let bench = factory.create_bench_logger().await;
        assert_eq!(logger.session_id.read().await.as_deref(), Some(factory.session_id()));
        assert_eq!(bench.logger.session_id.read().await.as_deref(), Some(factory.session_id()));
    }
}
