//! Benchmarks for the mlc output scrapers and CPU-list handling
//!
//! Scraping runs once per result file, so these mostly guard against a
//! regex being rebuilt in a hot loop or a quadratic table walk.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pmem_mlc_bench::{
    mlc::parse::{parse_idle_latency, parse_latency_table, parse_peak_bandwidth, parse_version},
    system::{format_cpu_list, parse_cpu_list},
};

const BANNER: &str = "Intel(R) Memory Latency Checker - v3.9a\n\
Command line parameters: --loaded_latency -t10 -c0 -k1-27 -b400000 -J/mnt/pmem0 -R\n\n";

const IDLE: &str = "Intel(R) Memory Latency Checker - v3.9a\n\
Using buffer size of 390.625MiB\n\
Each iteration took 412.3 base frequency clocks (\t171.8\tns)\n";

const PEAK: &str = "Measuring Peak Injection Memory Bandwidths for the system\n\
Using traffic with the following read-write ratios\n\
ALL Reads        :\t38325.6\n\
3:1 Reads-Writes :\t21140.8\n\
2:1 Reads-Writes :\t18977.5\n\
1:1 Reads-Writes :\t15030.2\n\
Stream-triad like:\t19562.2\n";

/// A loaded-latency report with `rows` delay rows
fn loaded_output(rows: usize) -> String {
    let mut out = String::from(BANNER);
    out.push_str("Inject\tLatency\tBandwidth\nDelay\t(ns)\tMB/sec\n==========================\n");
    for i in 0..rows {
        let delay = i * 50;
        out.push_str(&format!(
            " {:05}\t{:7.2}\t{:9.1}\n",
            delay,
            1300.0 - i as f64,
            36000.0 - 10.0 * i as f64
        ));
    }
    out
}

fn bench_scrapers(c: &mut Criterion) {
    let mut group = c.benchmark_group("mlc_parse");

    group.bench_function("idle_latency", |b| b.iter(|| parse_idle_latency(black_box(IDLE))));
    group.bench_function("peak_bandwidth", |b| b.iter(|| parse_peak_bandwidth(black_box(PEAK))));
    group.bench_function("version", |b| b.iter(|| parse_version(black_box(BANNER))));

    for rows in [19usize, 200, 2000] {
        let output = loaded_output(rows);
        group.bench_with_input(BenchmarkId::new("latency_table", rows), &output, |b, output| {
            b.iter(|| parse_latency_table(black_box(output)))
        });
    }

    group.finish();
}

fn bench_cpu_lists(c: &mut Criterion) {
    let mut group = c.benchmark_group("cpu_list");

    group.bench_function("parse_two_socket", |b| {
        b.iter(|| parse_cpu_list(black_box("0-27,56-83")))
    });
    group.bench_function("parse_scattered", |b| {
        b.iter(|| parse_cpu_list(black_box("0,2,4,6,8,10,12,14,16,18,20,22,24,26")))
    });

    let cpus: Vec<u32> = (0..224).filter(|c| c % 3 != 0).collect();
    group.bench_function("format_fragmented", |b| b.iter(|| format_cpu_list(black_box(&cpus))));

    group.finish();
}

criterion_group!(benches, bench_scrapers, bench_cpu_lists);
criterion_main!(benches);
