//! Output formatting trait and the plain-text implementation
//!
//! The plain formatter is also what ends up in `summary.txt`, so it never
//! emits escape codes.

use crate::{
    error::{AppError, Result},
    models::{ExecutionSummary, Measurement, TestRecord},
    types::{AccessPattern, TestStatus, TrafficType},
};
use std::fmt::Write as _;

/// Formats run results for display
pub trait OutputFormatter {
    fn format_header(&self, title: &str) -> Result<String>;

    fn format_execution_summary(&self, summary: &ExecutionSummary) -> Result<String>;

    /// One row per idle-latency run
    fn format_idle_latency(&self, records: &[&TestRecord]) -> Result<String>;

    /// One delay / latency / bandwidth table per loaded-latency run
    fn format_loaded_latency(&self, records: &[&TestRecord]) -> Result<String>;

    /// CPU count rows by traffic/pattern columns, per socket
    fn format_bandwidth_ramp(&self, records: &[&TestRecord]) -> Result<String>;

    fn format_peak_bandwidth(&self, records: &[&TestRecord]) -> Result<String>;

    /// Every invocation with status and elapsed time
    fn format_run_log(&self, records: &[TestRecord]) -> Result<String>;

    fn format_error(&self, error: &str) -> Result<String>;

    fn format_warning(&self, warning: &str) -> Result<String>;

    fn format_success(&self, message: &str) -> Result<String>;
}

/// Configuration options for formatting
#[derive(Debug, Clone)]
pub struct FormattingOptions {
    pub enable_color: bool,
    /// Adds the per-invocation run log
    pub verbose_mode: bool,
    pub table_borders: bool,
}

impl Default for FormattingOptions {
    fn default() -> Self {
        Self {
            enable_color: true,
            verbose_mode: false,
            table_borders: true,
        }
    }
}

/// Table layout
#[derive(Debug, Clone)]
pub struct TableFormat {
    pub columns: Vec<Column>,
    pub show_borders: bool,
    pub show_header: bool,
}

#[derive(Debug, Clone)]
pub struct Column {
    pub header: String,
    pub alignment: Alignment,
    pub min_width: usize,
}

impl Column {
    pub fn left(header: &str) -> Self {
        Self { header: header.to_string(), alignment: Alignment::Left, min_width: 0 }
    }

    pub fn right(header: &str) -> Self {
        Self { header: header.to_string(), alignment: Alignment::Right, min_width: 0 }
    }
}

#[derive(Debug, Clone)]
pub enum Alignment {
    Left,
    Right,
    Center,
}

pub type RowData = Vec<String>;

pub(crate) fn fmt_err(e: std::fmt::Error) -> AppError {
    AppError::internal(format!("Failed to format output: {}", e))
}

/// Plain text formatter
pub struct PlainFormatter {
    options: FormattingOptions,
}

impl PlainFormatter {
    pub fn new(options: FormattingOptions) -> Self {
        Self { options }
    }

    pub(crate) fn table_format(&self, columns: Vec<Column>) -> TableFormat {
        TableFormat {
            columns,
            show_borders: self.options.table_borders,
            show_header: true,
        }
    }

    /// Lay out rows under the given columns
    pub(crate) fn create_table(&self, format: &TableFormat, rows: &[RowData]) -> String {
        if rows.is_empty() {
            return String::new();
        }

        let widths = self.calculate_column_widths(format, rows);
        let mut output = String::new();

        if format.show_header && !format.columns.is_empty() {
            if format.show_borders {
                output.push_str(&self.create_horizontal_border(&widths));
                output.push('\n');
            }
            let headers: Vec<String> = format.columns.iter().map(|c| c.header.clone()).collect();
            output.push_str(&self.create_row(&headers, &widths, format));
            output.push('\n');
            if format.show_borders {
                output.push_str(&self.create_horizontal_border(&widths));
                output.push('\n');
            }
        }

        for row in rows {
            output.push_str(&self.create_row(row, &widths, format));
            output.push('\n');
        }

        if format.show_borders {
            output.push_str(&self.create_horizontal_border(&widths));
        } else {
            output.pop();
        }

        output
    }

    fn calculate_column_widths(&self, format: &TableFormat, rows: &[RowData]) -> Vec<usize> {
        let num_columns = format.columns.len().max(rows.iter().map(|r| r.len()).max().unwrap_or(0));

        (0..num_columns)
            .map(|idx| {
                let header_width = format
                    .columns
                    .get(idx)
                    .map(|c| c.min_width.max(c.header.chars().count()))
                    .unwrap_or(0);
                rows.iter()
                    .filter_map(|r| r.get(idx))
                    .map(|cell| cell.chars().count())
                    .fold(header_width, usize::max)
            })
            .collect()
    }

    fn create_row(&self, data: &[String], widths: &[usize], format: &TableFormat) -> String {
        let mut row = String::new();

        if format.show_borders {
            row.push('|');
        }

        for (idx, (cell, &width)) in data.iter().zip(widths.iter()).enumerate() {
            let alignment = format.columns.get(idx).map(|c| &c.alignment).unwrap_or(&Alignment::Left);
            let padded = self.align_text(cell, width, alignment);

            if format.show_borders {
                row.push(' ');
                row.push_str(&padded);
                row.push_str(" |");
            } else {
                row.push_str(&padded);
                row.push_str("  ");
            }
        }

        row.trim_end().to_string()
    }

    fn create_horizontal_border(&self, widths: &[usize]) -> String {
        let mut border = String::from("+");
        for &width in widths {
            border.push_str(&"-".repeat(width + 2));
            border.push('+');
        }
        border
    }

    fn align_text(&self, text: &str, width: usize, alignment: &Alignment) -> String {
        let len = text.chars().count();
        if len >= width {
            return text.to_string();
        }

        let padding = width - len;
        match alignment {
            Alignment::Left => format!("{}{}", text, " ".repeat(padding)),
            Alignment::Right => format!("{}{}", " ".repeat(padding), text),
            Alignment::Center => {
                let left_pad = padding / 2;
                format!("{}{}{}", " ".repeat(left_pad), text, " ".repeat(padding - left_pad))
            }
        }
    }

    pub(crate) fn format_duration(&self, secs: f64) -> String {
        if secs < 60.0 {
            format!("{:.1}s", secs)
        } else if secs < 3600.0 {
            format!("{}m{:02}s", (secs / 60.0) as u64, (secs % 60.0) as u64)
        } else {
            format!("{}h{:02}m", (secs / 3600.0) as u64, ((secs % 3600.0) / 60.0) as u64)
        }
    }

    pub(crate) fn section_title(&self, title: &str) -> String {
        format!("{}\n{}", title, "-".repeat(title.chars().count()))
    }

    pub(crate) fn idle_rows(&self, records: &[&TestRecord]) -> Vec<RowData> {
        records
            .iter()
            .filter_map(|r| match &r.measurement {
                Some(Measurement::IdleLatency { latency_ns, clocks }) => Some(vec![
                    r.invocation.socket.to_string(),
                    r.invocation.pattern.map(|p| p.description()).unwrap_or("-").to_string(),
                    r.invocation.cpus.first().map(|c| c.to_string()).unwrap_or_default(),
                    format!("{:.1}", latency_ns),
                    format!("{:.1}", clocks),
                ]),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn idle_columns(&self) -> Vec<Column> {
        vec![
            Column::right("Socket"),
            Column::left("Pattern"),
            Column::right("CPU"),
            Column::right("Latency (ns)"),
            Column::right("Clocks"),
        ]
    }

    pub(crate) fn loaded_title(&self, record: &TestRecord) -> String {
        let inv = &record.invocation;
        format!(
            "{} / {} on socket {} ({} load CPUs)",
            inv.traffic.map(|t| t.description()).unwrap_or("-"),
            inv.pattern.map(|p| p.description()).unwrap_or("-"),
            inv.socket,
            inv.cpu_count()
        )
    }

    pub(crate) fn loaded_rows(&self, record: &TestRecord) -> Vec<RowData> {
        match &record.measurement {
            Some(Measurement::LoadedLatency(points)) => points
                .iter()
                .map(|p| {
                    vec![
                        p.delay.to_string(),
                        format!("{:.2}", p.latency_ns),
                        format!("{:.1}", p.bandwidth_mbps),
                    ]
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    pub(crate) fn loaded_columns(&self) -> Vec<Column> {
        vec![Column::right("Delay"), Column::right("Latency (ns)"), Column::right("Bandwidth (MB/s)")]
    }

    /// Per socket: ordered curve keys and the (columns, rows) of its table
    pub(crate) fn ramp_tables(&self, records: &[&TestRecord]) -> Vec<(u32, Vec<Column>, Vec<RowData>)> {
        let mut sockets: Vec<u32> = records.iter().map(|r| r.invocation.socket).collect();
        sockets.sort_unstable();
        sockets.dedup();

        sockets
            .into_iter()
            .map(|socket| {
                let on_socket: Vec<&&TestRecord> = records.iter().filter(|r| r.invocation.socket == socket).collect();

                let mut curves: Vec<(Option<TrafficType>, Option<AccessPattern>)> = Vec::new();
                let mut counts: Vec<usize> = Vec::new();
                for r in &on_socket {
                    let key = (r.invocation.traffic, r.invocation.pattern);
                    if !curves.contains(&key) {
                        curves.push(key);
                    }
                    if !counts.contains(&r.invocation.cpu_count()) {
                        counts.push(r.invocation.cpu_count());
                    }
                }
                counts.sort_unstable();

                let mut columns = vec![Column::right("CPUs")];
                columns.extend(curves.iter().map(|(t, p)| {
                    Column::right(&format!(
                        "{} {}",
                        t.map(|t| t.tag().to_uppercase()).unwrap_or_default(),
                        p.map(|p| p.tag()).unwrap_or_default()
                    ))
                }));

                let rows = counts
                    .iter()
                    .map(|&n| {
                        let mut row = vec![n.to_string()];
                        for key in &curves {
                            let cell = on_socket
                                .iter()
                                .find(|r| r.invocation.cpu_count() == n && (r.invocation.traffic, r.invocation.pattern) == *key)
                                .and_then(|r| match &r.measurement {
                                    Some(Measurement::Bandwidth { mbps }) => Some(format!("{:.1}", mbps)),
                                    _ => None,
                                })
                                .unwrap_or_else(|| "-".to_string());
                            row.push(cell);
                        }
                        row
                    })
                    .collect();

                (socket, columns, rows)
            })
            .collect()
    }

    pub(crate) fn peak_rows(&self, records: &[&TestRecord]) -> Vec<RowData> {
        records
            .iter()
            .flat_map(|r| match &r.measurement {
                Some(Measurement::PeakBandwidth(rows)) => rows
                    .iter()
                    .map(|(label, mbps)| {
                        vec![
                            r.invocation.socket.to_string(),
                            r.invocation.cpu_count().to_string(),
                            label.clone(),
                            format!("{:.1}", mbps),
                        ]
                    })
                    .collect::<Vec<_>>(),
                _ => Vec::new(),
            })
            .collect()
    }

    pub(crate) fn peak_columns(&self) -> Vec<Column> {
        vec![
            Column::right("Socket"),
            Column::right("CPUs"),
            Column::left("Traffic"),
            Column::right("Bandwidth (MB/s)"),
        ]
    }

    pub(crate) fn run_log_rows(&self, records: &[TestRecord]) -> Vec<RowData> {
        records
            .iter()
            .enumerate()
            .map(|(i, r)| {
                vec![
                    (i + 1).to_string(),
                    r.invocation.label(),
                    status_label(r.status).to_string(),
                    self.format_duration(r.elapsed.as_secs_f64()),
                    r.invocation
                        .output_file
                        .file_name()
                        .map(|f| f.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                ]
            })
            .collect()
    }

    pub(crate) fn run_log_columns(&self) -> Vec<Column> {
        vec![
            Column::right("#"),
            Column::left("Run"),
            Column::left("Status"),
            Column::right("Elapsed"),
            Column::left("File"),
        ]
    }
}

pub(crate) fn status_label(status: TestStatus) -> &'static str {
    match status {
        TestStatus::Success => "ok",
        TestStatus::Failed => "FAILED",
        TestStatus::Skipped => "skipped",
        TestStatus::Timeout => "TIMEOUT",
    }
}

impl OutputFormatter for PlainFormatter {
    fn format_header(&self, title: &str) -> Result<String> {
        let mut output = String::new();
        let border = "=".repeat(title.chars().count() + 4);
        writeln!(output, "{}", border).map_err(fmt_err)?;
        writeln!(output, "  {}  ", title).map_err(fmt_err)?;
        write!(output, "{}", border).map_err(fmt_err)?;
        Ok(output)
    }

    fn format_execution_summary(&self, summary: &ExecutionSummary) -> Result<String> {
        let mut output = String::new();

        writeln!(output, "{}", self.section_title("Execution Summary")).map_err(fmt_err)?;
        writeln!(output, "Total Duration:   {}", self.format_duration(summary.total_duration.as_secs_f64()))
            .map_err(fmt_err)?;
        writeln!(output, "Planned Runs:     {}", summary.total_planned).map_err(fmt_err)?;
        writeln!(output, "Successful:       {}", summary.successful).map_err(fmt_err)?;
        writeln!(output, "Failed:           {}", summary.failed).map_err(fmt_err)?;
        writeln!(output, "Timeout:          {}", summary.timed_out).map_err(fmt_err)?;
        write!(output, "Skipped:          {}", summary.skipped).map_err(fmt_err)?;
        if let Some(version) = &summary.mlc_version {
            write!(output, "\nmlc Version:      {}", version).map_err(fmt_err)?;
        }
        if summary.interrupted {
            write!(output, "\nRun was interrupted; later tests did not run.").map_err(fmt_err)?;
        }

        Ok(output)
    }

    fn format_idle_latency(&self, records: &[&TestRecord]) -> Result<String> {
        let rows = self.idle_rows(records);
        if rows.is_empty() {
            return Ok(String::new());
        }
        Ok(format!(
            "{}\n{}",
            self.section_title("Idle Latency"),
            self.create_table(&self.table_format(self.idle_columns()), &rows)
        ))
    }

    fn format_loaded_latency(&self, records: &[&TestRecord]) -> Result<String> {
        let mut output = String::new();
        for record in records {
            let rows = self.loaded_rows(record);
            if rows.is_empty() {
                continue;
            }
            if output.is_empty() {
                writeln!(output, "{}", self.section_title("Loaded Latency")).map_err(fmt_err)?;
            } else {
                output.push_str("\n\n");
            }
            writeln!(output, "{}", self.loaded_title(record)).map_err(fmt_err)?;
            output.push_str(&self.create_table(&self.table_format(self.loaded_columns()), &rows));
        }
        Ok(output)
    }

    fn format_bandwidth_ramp(&self, records: &[&TestRecord]) -> Result<String> {
        let mut output = String::new();
        for (socket, columns, rows) in self.ramp_tables(records) {
            if output.is_empty() {
                writeln!(output, "{}", self.section_title("Bandwidth Ramp (MB/s)")).map_err(fmt_err)?;
            } else {
                output.push_str("\n\n");
            }
            writeln!(output, "Socket {}", socket).map_err(fmt_err)?;
            output.push_str(&self.create_table(&self.table_format(columns), &rows));
        }
        Ok(output)
    }

    fn format_peak_bandwidth(&self, records: &[&TestRecord]) -> Result<String> {
        let rows = self.peak_rows(records);
        if rows.is_empty() {
            return Ok(String::new());
        }
        Ok(format!(
            "{}\n{}",
            self.section_title("Peak Injection Bandwidth"),
            self.create_table(&self.table_format(self.peak_columns()), &rows)
        ))
    }

    fn format_run_log(&self, records: &[TestRecord]) -> Result<String> {
        if records.is_empty() {
            return Ok(String::new());
        }
        Ok(format!(
            "{}\n{}",
            self.section_title("Runs"),
            self.create_table(&self.table_format(self.run_log_columns()), &self.run_log_rows(records))
        ))
    }

    fn format_error(&self, error: &str) -> Result<String> {
        Ok(format!("ERROR: {}", error))
    }

    fn format_warning(&self, warning: &str) -> Result<String> {
        Ok(format!("WARNING: {}", warning))
    }

    fn format_success(&self, message: &str) -> Result<String> {
        Ok(format!("SUCCESS: {}", message))
    }
}
