//! Scrapers for mlc's human-readable output

use crate::error::{AppError, Result};
use crate::models::{LatencyPoint, Measurement};
use crate::types::TestKind;
use regex::Regex;

fn regex(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| AppError::internal(format!("Invalid pattern {}: {}", pattern, e)))
}

/// Scrape the measurement matching `kind` out of mlc's stdout
pub fn parse_measurement(kind: TestKind, output: &str) -> Result<Measurement> {
    match kind {
        TestKind::IdleLatency => {
            let (latency_ns, clocks) = parse_idle_latency(output)?;
            Ok(Measurement::IdleLatency { latency_ns, clocks })
        }
        TestKind::LoadedLatency => Ok(Measurement::LoadedLatency(parse_latency_table(output)?)),
        TestKind::BandwidthRamp => Ok(Measurement::Bandwidth { mbps: parse_ramp_bandwidth(output)? }),
        TestKind::PeakBandwidth => Ok(Measurement::PeakBandwidth(parse_peak_bandwidth(output)?)),
    }
}

/// `Each iteration took 243.7 base frequency clocks (	101.5	ns)`
pub fn parse_idle_latency(output: &str) -> Result<(f64, f64)> {
    let re = regex(r"took\s+([0-9.]+)\s+(?:base frequency |core )?clocks\s*\(\s*([0-9.]+)\s*ns\s*\)")?;
    let caps = re
        .captures(output)
        .ok_or_else(|| AppError::parse("No idle latency figure in mlc output"))?;

    let clocks: f64 = caps[1].parse()?;
    let latency_ns: f64 = caps[2].parse()?;
    Ok((latency_ns, clocks))
}

/// Numeric rows of an injection-delay table: a five-digit delay followed
/// by one or more figures
fn delay_rows(output: &str) -> Result<Vec<(u32, Vec<f64>)>> {
    let re = regex(r"(?m)^\s*(\d{5})((?:[ \t]+[0-9]+(?:\.[0-9]+)?)+)[ \t]*$")?;
    re.captures_iter(output)
        .map(|caps| -> Result<(u32, Vec<f64>)> {
            let delay: u32 = caps[1].parse()?;
            let values = caps[2]
                .split_whitespace()
                .map(|v| v.parse::<f64>().map_err(AppError::from))
                .collect::<Result<Vec<_>>>()?;
            Ok((delay, values))
        })
        .collect()
}

/// The delay / latency / bandwidth table of a loaded-latency run
pub fn parse_latency_table(output: &str) -> Result<Vec<LatencyPoint>> {
    let points: Vec<LatencyPoint> = delay_rows(output)?
        .into_iter()
        .filter(|(_, values)| values.len() >= 2)
        .map(|(delay, values)| LatencyPoint {
            delay,
            latency_ns: values[0],
            bandwidth_mbps: values[1],
        })
        .collect();

    if points.is_empty() {
        return Err(AppError::parse("No loaded-latency table in mlc output"));
    }
    Ok(points)
}

/// Bandwidth of a `-T` run: the last figure of the last table row
pub fn parse_ramp_bandwidth(output: &str) -> Result<f64> {
    delay_rows(output)?
        .last()
        .and_then(|(_, values)| values.last().copied())
        .ok_or_else(|| AppError::parse("No bandwidth figure in mlc output"))
}

/// Labelled rows such as `ALL Reads        :	38325.6`
pub fn parse_peak_bandwidth(output: &str) -> Result<Vec<(String, f64)>> {
    // The command-line echo above the table also contains colons.
    let body = output
        .find("read-write ratios")
        .map(|idx| &output[idx..])
        .unwrap_or(output);

    let re = regex(r"(?m)^\s*([A-Za-z0-9][A-Za-z0-9:/ \-]*?)\s*:\s*([0-9]+(?:\.[0-9]+)?)\s*$")?;
    let rows = re
        .captures_iter(body)
        .map(|caps| -> Result<(String, f64)> { Ok((caps[1].trim().to_string(), caps[2].parse::<f64>()?)) })
        .collect::<Result<Vec<_>>>()?;

    if rows.is_empty() {
        return Err(AppError::parse("No peak bandwidth rows in mlc output"));
    }
    Ok(rows)
}

/// Version from the banner line, e.g. `v3.9a`
pub fn parse_version(output: &str) -> Option<String> {
    let re = regex(r"Intel\(R\) Memory Latency Checker\s*-\s*(v[\w.]+)").ok()?;
    re.captures(output).map(|caps| caps[1].to_string())
}
