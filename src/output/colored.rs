//! Colored formatter with terminal color support
//!
//! Tables are laid out by the plain formatter first so that column widths
//! never count escape codes; color is applied to whole lines afterwards.

use super::formatter::{fmt_err, FormattingOptions, OutputFormatter, PlainFormatter};
use crate::{
    error::Result,
    models::{ExecutionSummary, TestRecord},
};
use colored::*;
use std::fmt::Write as _;

/// Color scheme configuration
#[derive(Debug, Clone)]
pub struct ColorScheme {
    pub header: Color,
    pub success: Color,
    pub warning: Color,
    pub error: Color,
    pub info: Color,
    pub border: Color,
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self {
            header: Color::Blue,
            success: Color::Green,
            warning: Color::Yellow,
            error: Color::Red,
            info: Color::Cyan,
            border: Color::BrightBlack,
        }
    }
}

/// Colored formatter implementation
pub struct ColoredFormatter {
    plain_formatter: PlainFormatter,
    options: FormattingOptions,
    color_scheme: ColorScheme,
}

impl ColoredFormatter {
    pub fn new(options: FormattingOptions) -> Self {
        Self::with_color_scheme(options, ColorScheme::default())
    }

    pub fn with_color_scheme(options: FormattingOptions, color_scheme: ColorScheme) -> Self {
        let plain_formatter = PlainFormatter::new(options.clone());
        Self {
            plain_formatter,
            options,
            color_scheme,
        }
    }

    fn colorize(&self, text: &str, color: Color) -> ColoredString {
        if self.options.enable_color {
            text.color(color)
        } else {
            text.normal()
        }
    }

    fn heading(&self, text: &str) -> ColoredString {
        if self.options.enable_color {
            text.bold().color(self.color_scheme.header)
        } else {
            text.normal()
        }
    }

    fn create_section_header(&self, title: &str) -> String {
        format!(
            "{}\n{}",
            self.heading(title),
            self.colorize(&"─".repeat(title.chars().count()), self.color_scheme.border)
        )
    }

    /// Swap the plain underlined title for a colored one
    fn recolor_section(&self, plain: String, title: &str) -> String {
        if plain.is_empty() || !self.options.enable_color {
            return plain;
        }
        let underline = "-".repeat(title.chars().count());
        let plain_title = format!("{}\n{}", title, underline);
        match plain.strip_prefix(&plain_title) {
            Some(rest) => format!("{}{}", self.create_section_header(title), self.dim_borders(rest)),
            None => plain,
        }
    }

    fn dim_borders(&self, table: &str) -> String {
        table
            .split('\n')
            .map(|line| {
                if line.starts_with('+') {
                    self.colorize(line, self.color_scheme.border).to_string()
                } else {
                    line.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn count_line(&self, label: &str, count: usize, color: Color) -> String {
        let value = count.to_string();
        let value = if count > 0 { self.colorize(&value, color) } else { value.normal() };
        format!("{:<18}{}", label, value)
    }
}

impl OutputFormatter for ColoredFormatter {
    fn format_header(&self, title: &str) -> Result<String> {
        let border = "═".repeat(title.chars().count() + 4);
        Ok(format!(
            "{}\n  {}  \n{}",
            self.colorize(&border, self.color_scheme.header),
            self.heading(title),
            self.colorize(&border, self.color_scheme.header)
        ))
    }

    fn format_execution_summary(&self, summary: &ExecutionSummary) -> Result<String> {
        let mut output = String::new();

        writeln!(output, "{}", self.create_section_header("Execution Summary")).map_err(fmt_err)?;
        writeln!(
            output,
            "{:<18}{}",
            "Total Duration:",
            self.plain_formatter.format_duration(summary.total_duration.as_secs_f64())
        )
        .map_err(fmt_err)?;
        writeln!(output, "{:<18}{}", "Planned Runs:", summary.total_planned).map_err(fmt_err)?;
        writeln!(output, "{}", self.count_line("Successful:", summary.successful, self.color_scheme.success))
            .map_err(fmt_err)?;
        writeln!(output, "{}", self.count_line("Failed:", summary.failed, self.color_scheme.error)).map_err(fmt_err)?;
        writeln!(output, "{}", self.count_line("Timeout:", summary.timed_out, self.color_scheme.error))
            .map_err(fmt_err)?;
        write!(output, "{}", self.count_line("Skipped:", summary.skipped, self.color_scheme.warning)).map_err(fmt_err)?;

        if let Some(version) = &summary.mlc_version {
            write!(output, "\n{:<18}{}", "mlc Version:", self.colorize(version, self.color_scheme.info))
                .map_err(fmt_err)?;
        }
        if summary.interrupted {
            write!(
                output,
                "\n{}",
                self.colorize("Run was interrupted; later tests did not run.", self.color_scheme.warning)
            )
            .map_err(fmt_err)?;
        }

        Ok(output)
    }

    fn format_idle_latency(&self, records: &[&TestRecord]) -> Result<String> {
        Ok(self.recolor_section(self.plain_formatter.format_idle_latency(records)?, "Idle Latency"))
    }

    fn format_loaded_latency(&self, records: &[&TestRecord]) -> Result<String> {
        Ok(self.recolor_section(self.plain_formatter.format_loaded_latency(records)?, "Loaded Latency"))
    }

    fn format_bandwidth_ramp(&self, records: &[&TestRecord]) -> Result<String> {
        Ok(self.recolor_section(
            self.plain_formatter.format_bandwidth_ramp(records)?,
            "Bandwidth Ramp (MB/s)",
        ))
    }

    fn format_peak_bandwidth(&self, records: &[&TestRecord]) -> Result<String> {
        Ok(self.recolor_section(
            self.plain_formatter.format_peak_bandwidth(records)?,
            "Peak Injection Bandwidth",
        ))
    }

    fn format_run_log(&self, records: &[TestRecord]) -> Result<String> {
        let plain = self.plain_formatter.format_run_log(records)?;
        if !self.options.enable_color {
            return Ok(plain);
        }

        let highlighted = plain
            .split('\n')
            .map(|line| {
                if line.contains("| FAILED") || line.contains("| TIMEOUT") {
                    self.colorize(line, self.color_scheme.error).to_string()
                } else if line.contains("| skipped") {
                    self.colorize(line, self.color_scheme.warning).to_string()
                } else {
                    line.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join("\n");
        Ok(self.recolor_section(highlighted, "Runs"))
    }

    fn format_error(&self, error: &str) -> Result<String> {
        Ok(format!("{} {}", self.colorize("✗", self.color_scheme.error), self.colorize(error, self.color_scheme.error)))
    }

    fn format_warning(&self, warning: &str) -> Result<String> {
        Ok(format!("{} {}", self.colorize("!", self.color_scheme.warning), warning))
    }

    fn format_success(&self, message: &str) -> Result<String> {
        Ok(format!("{} {}", self.colorize("✓", self.color_scheme.success), message))
    }
}
