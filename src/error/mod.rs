//! Error handling for the PMem MLC benchmark driver

use thiserror::Error;

/// Custom error types for the benchmark driver
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation errors (CLI values, environment values)
    #[error("Validation error: {0}")]
    Validation(String),

    /// A system precondition is not met (privileges, DIMM health, scrub state)
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// A required external tool could not be found
    #[error("Required tool not found: {0}")]
    MissingTool(String),

    /// An external command exited unsuccessfully
    #[error("Execution error: {0}")]
    Execution(String),

    /// An external command ran past its deadline
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// Tool output could not be scraped
    #[error("Parsing error: {0}")]
    Parse(String),

    /// I/O errors (result files, /proc reads)
    #[error("I/O error: {0}")]
    Io(String),

    /// The run was interrupted by the user
    #[error("Interrupted: {0}")]
    Interrupted(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }

    /// Create a new precondition error
    pub fn precondition<S: Into<String>>(message: S) -> Self {
        Self::Precondition(message.into())
    }

    /// Create a new missing-tool error
    pub fn missing_tool<S: Into<String>>(message: S) -> Self {
        Self::MissingTool(message.into())
    }

    /// Create a new execution error
    pub fn execution<S: Into<String>>(message: S) -> Self {
        Self::Execution(message.into())
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        Self::Timeout(message.into())
    }

    /// Create a new parsing error
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse(message.into())
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io(message.into())
    }

    /// Create a new interruption error
    pub fn interrupted<S: Into<String>>(message: S) -> Self {
        Self::Interrupted(message.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Get error category for logging and reporting
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG",
            Self::Validation(_) => "VALIDATION",
            Self::Precondition(_) => "PRECONDITION",
            Self::MissingTool(_) => "TOOL",
            Self::Execution(_) => "EXEC",
            Self::Timeout(_) => "TIMEOUT",
            Self::Parse(_) => "PARSE",
            Self::Io(_) => "IO",
            Self::Interrupted(_) => "INTERRUPT",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Get user-friendly error message with suggestions
    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::Config(msg) => {
                format!("Configuration problem: {}\n\nSuggestion: Check your .env file or command line arguments.", msg)
            }
            Self::Validation(msg) => {
                format!("Invalid input: {}\n\nSuggestion: Run with --help to see accepted values.", msg)
            }
            Self::Precondition(msg) => {
                format!("System not ready for benchmarking: {}\n\nSuggestion: Resolve the reported condition before rerunning; results would not be reliable.", msg)
            }
            Self::MissingTool(msg) => {
                format!("Missing tool: {}\n\nSuggestion: Install the tool or pass its location explicitly (e.g. --mlc /opt/mlc/mlc).", msg)
            }
            Self::Execution(msg) => {
                format!("Benchmark command failed: {}\n\nSuggestion: Inspect the result file and rerun the command by hand with --debug.", msg)
            }
            Self::Timeout(msg) => {
                format!("Command timed out: {}\n\nSuggestion: Increase --timeout or reduce --duration / --buffer-size.", msg)
            }
            Self::Parse(msg) => {
                format!("Failed to read tool output: {}\n\nSuggestion: Check that the installed tool version is supported.", msg)
            }
            Self::Io(msg) => {
                format!("File operation failed: {}\n\nSuggestion: Check file permissions and disk space.", msg)
            }
            Self::Interrupted(msg) => {
                format!("Run interrupted: {}", msg)
            }
            Self::Internal(msg) => {
                format!("Internal error: {}\n\nThis is likely a bug. Please report this issue with the error details.", msg)
            }
        }
    }

    /// Get exit code for this error type
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Validation(_) => 1,  // Invalid configuration/usage
            Self::Precondition(_) => 2,  // System not ready
            Self::MissingTool(_) => 3,
            Self::Execution(_) | Self::Timeout(_) | Self::Parse(_) => 4,  // Benchmark run issues
            Self::Io(_) => 5,
            Self::Interrupted(_) => 130,  // Conventional SIGINT status
            Self::Internal(_) => 99,
        }
    }

    /// Format error for console display with color coding
    pub fn format_for_console(&self, use_color: bool) -> String {
        let category = self.category();
        let message = self.to_string();

        if use_color {
            use colored::Colorize;
            match self {
                Self::Config(_) | Self::Validation(_) | Self::Parse(_) => {
                    format!("[{}] {}", category.red().bold(), message.red())
                }
                Self::Precondition(_) | Self::MissingTool(_) => {
                    format!("[{}] {}", category.yellow().bold(), message.yellow())
                }
                Self::Timeout(_) => {
                    format!("[{}] {}", category.blue().bold(), message.blue())
                }
                Self::Interrupted(_) => {
                    format!("[{}] {}", category.magenta().bold(), message.magenta())
                }
                Self::Io(_) | Self::Execution(_) => {
                    format!("[{}] {}", category.cyan().bold(), message.cyan())
                }
                Self::Internal(_) => {
                    format!("[{}] {}", category.bright_red().bold(), message.bright_red())
                }
            }
        } else {
            format!("[{}] {}", category, message)
        }
    }
}

// Standard library error conversions
impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::io(error.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        Self::parse(format!("JSON parse error: {}", error))
    }
}

impl From<dotenv::Error> for AppError {
    fn from(error: dotenv::Error) -> Self {
        Self::config(format!("Environment file error: {}", error))
    }
}

impl From<std::num::ParseIntError> for AppError {
    fn from(error: std::num::ParseIntError) -> Self {
        Self::parse(format!("Integer parse error: {}", error))
    }
}

impl From<std::num::ParseFloatError> for AppError {
    fn from(error: std::num::ParseFloatError) -> Self {
        Self::parse(format!("Float parse error: {}", error))
    }
}

impl From<std::str::ParseBoolError> for AppError {
    fn from(error: std::str::ParseBoolError) -> Self {
        Self::parse(format!("Boolean parse error: {}", error))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::internal(format!("{:#}", error))
    }
}

/// Custom Result type for the application
pub type Result<T> = std::result::Result<T, AppError>;

/// Error context trait for adding context to errors
pub trait ErrorContext<T> {
    /// Add context to an error, keeping its category
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<AppError>,
{
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let context = f();
            match e.into() {
                AppError::Config(m) => AppError::Config(format!("{}: {}", context, m)),
                AppError::Validation(m) => AppError::Validation(format!("{}: {}", context, m)),
                AppError::Precondition(m) => AppError::Precondition(format!("{}: {}", context, m)),
                AppError::MissingTool(m) => AppError::MissingTool(format!("{}: {}", context, m)),
                AppError::Execution(m) => AppError::Execution(format!("{}: {}", context, m)),
                AppError::Timeout(m) => AppError::Timeout(format!("{}: {}", context, m)),
                AppError::Parse(m) => AppError::Parse(format!("{}: {}", context, m)),
                AppError::Io(m) => AppError::Io(format!("{}: {}", context, m)),
                AppError::Interrupted(m) => AppError::Interrupted(format!("{}: {}", context, m)),
                AppError::Internal(m) => AppError::Internal(format!("{}: {}", context, m)),
            }
        })
    }
}
