//! Output formatting and display system
//!
//! Results are rendered to the console through an [`OutputFormatter`] and a
//! plain copy is kept next to the raw mlc output as `summary.txt`.

mod colored;
mod formatter;

pub use colored::{ColorScheme, ColoredFormatter};
pub use formatter::{Alignment, Column, FormattingOptions, OutputFormatter, PlainFormatter, RowData, TableFormat};

use crate::{
    error::{AppError, Result},
    models::{ExecutionResults, TestRecord},
    types::{TestKind, TestStatus},
};
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};

/// File name of the plain-text summary written to the output directory
pub const SUMMARY_FILE_NAME: &str = "summary.txt";

/// Output formatting factory for creating appropriate formatters
pub struct OutputFormatterFactory;

impl OutputFormatterFactory {
    /// Create a formatter based on color support and preferences
    pub fn create_formatter(enable_color: bool, verbose: bool) -> Box<dyn OutputFormatter> {
        let options = FormattingOptions {
            enable_color,
            verbose_mode: verbose,
            table_borders: true,
        };

        if enable_color {
            Box::new(ColoredFormatter::new(options))
        } else {
            Box::new(PlainFormatter::new(options))
        }
    }

    /// Plain formatter used for files
    pub fn create_plain_formatter(verbose: bool) -> Box<dyn OutputFormatter> {
        Self::create_formatter(false, verbose)
    }
}

/// Main output coordinator that handles all result display
pub struct OutputCoordinator {
    formatter: Box<dyn OutputFormatter>,
    verbose: bool,
}

impl OutputCoordinator {
    pub fn new(formatter: Box<dyn OutputFormatter>) -> Self {
        Self { formatter, verbose: false }
    }

    /// Also include the per-invocation run log
    pub fn with_run_log(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Render complete execution results
    pub fn display_results(&self, results: &ExecutionResults) -> Result<String> {
        render(self.formatter.as_ref(), results, self.verbose)
    }

    pub fn display_error(&self, message: &str) -> Result<String> {
        self.formatter.format_error(message)
    }

    pub fn display_warning(&self, message: &str) -> Result<String> {
        self.formatter.format_warning(message)
    }

    pub fn display_success(&self, message: &str) -> Result<String> {
        self.formatter.format_success(message)
    }

    /// Write the plain rendering to `<dir>/summary.txt`. An existing summary
    /// is left alone and reported as an I/O error.
    pub fn write_summary_file(&self, results: &ExecutionResults, dir: &Path) -> Result<PathBuf> {
        let plain = OutputFormatterFactory::create_plain_formatter(true);
        let mut text = render(plain.as_ref(), results, true)?;
        text.push('\n');

        let path = dir.join(SUMMARY_FILE_NAME);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| AppError::io(format!("Cannot create {}: {}", path.display(), e)))?;
        file.write_all(text.as_bytes())
            .map_err(|e| AppError::io(format!("Cannot write {}: {}", path.display(), e)))?;
        Ok(path)
    }
}

fn render(formatter: &dyn OutputFormatter, results: &ExecutionResults, verbose: bool) -> Result<String> {
    let mut sections = vec![
        formatter.format_header("PMem MLC Benchmark Results")?,
        format!("Started: {}", results.started_at.format("%Y-%m-%d %H:%M:%S UTC")),
        formatter.format_execution_summary(&results.summary)?,
    ];

    let of_kind = |kind: TestKind| -> Vec<&TestRecord> { results.of_kind(kind).collect() };
    sections.push(formatter.format_idle_latency(&of_kind(TestKind::IdleLatency))?);
    sections.push(formatter.format_loaded_latency(&of_kind(TestKind::LoadedLatency))?);
    sections.push(formatter.format_bandwidth_ramp(&of_kind(TestKind::BandwidthRamp))?);
    sections.push(formatter.format_peak_bandwidth(&of_kind(TestKind::PeakBandwidth))?);

    if verbose {
        sections.push(formatter.format_run_log(&results.records)?);
    }

    for record in &results.records {
        if let (TestStatus::Failed | TestStatus::Timeout, Some(message)) = (record.status, &record.error_message) {
            sections.push(formatter.format_error(&format!("{}: {}", record.invocation.label(), message))?);
        }
    }

    Ok(sections
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n"))
}
