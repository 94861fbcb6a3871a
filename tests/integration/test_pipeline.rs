//! Pipeline tests: reader, evaluation, and writers wired together.

use std::io::Cursor;

use bayescall_lib::config::Config;
use bayescall_lib::metrics::CallMetrics;
use bayescall_lib::pileup::{PileupReader, TargetRegions};
use bayescall_lib::report::{FailedSiteWriter, RecordWriter, TraceWriter};
use bayescall_lib::site::{evaluate_site, SiteStatus};

use crate::helpers::{scenario_config, site_text};

/// Runs the whole pipeline over an observation stream; returns the record
/// output and the metrics.
fn run_pipeline(text: &str, config: &Config, want_trace: bool) -> (String, String, CallMetrics) {
    let mut reader = PileupReader::new(
        Cursor::new(text.to_string()),
        config.clone(),
        TargetRegions::default(),
        None,
    );

    let mut record_buf = Vec::new();
    let mut trace_buf = Vec::new();
    let mut metrics = CallMetrics::new();
    {
        let mut records = RecordWriter::new(&mut record_buf, Vec::new());
        let mut trace = TraceWriter::new(&mut trace_buf);
        while let Some(site) = reader.next_site().expect("pileup parses") {
            metrics.total_sites += 1;
            match evaluate_site(&site, config, want_trace) {
                SiteStatus::Skip(reason) => metrics.record_skip(reason),
                SiteStatus::Evaluated(eval) => {
                    metrics.processed_sites += 1;
                    trace.write_site(&eval).expect("trace writes");
                    if eval.called && !eval.alternates.is_empty() {
                        metrics.called_sites += 1;
                        metrics.records_written += records
                            .write_site(&eval, config.report_all_alternates)
                            .expect("record writes")
                            as u64;
                    }
                }
            }
        }
        records.flush().expect("flush");
    }
    (
        String::from_utf8(record_buf).expect("utf8 records"),
        String::from_utf8(trace_buf).expect("utf8 trace"),
        metrics,
    )
}

fn three_site_stream() -> String {
    let mut text = String::new();
    // Site 1: clean het
    text.push_str(&site_text(
        "chr1",
        100,
        "A",
        &[("s1", 'R', "A", 10, 30), ("s1", 'S', "T", 10, 30)],
    ));
    // Site 2: pure reference, skipped
    text.push_str(&site_text("chr1", 200, "C", &[("s1", 'R', "C", 15, 30)]));
    // Site 3: hom alt
    text.push_str(&site_text("chr1", 300, "G", &[("s1", 'S', "A", 18, 30)]));
    text
}

#[test]
fn test_stream_produces_ordered_records() {
    let (records, _, metrics) = run_pipeline(&three_site_stream(), &scenario_config(0.0), false);

    let lines: Vec<&str> = records.lines().collect();
    assert_eq!(lines.len(), 3); // header + two records
    assert!(lines[0].starts_with('#'));

    let first: Vec<&str> = lines[1].split('\t').collect();
    let second: Vec<&str> = lines[2].split('\t').collect();
    assert_eq!((first[0], first[1], first[2], first[3]), ("chr1", "100", "A", "T"));
    assert_eq!((second[0], second[1], second[2], second[3]), ("chr1", "300", "G", "A"));

    assert_eq!(metrics.total_sites, 3);
    assert_eq!(metrics.processed_sites, 2);
    assert_eq!(metrics.called_sites, 2);
    assert_eq!(metrics.records_written, 2);
    assert_eq!(metrics.skipped_insufficient_alternates, 1);
}

#[test]
fn test_byte_identical_output() {
    let text = three_site_stream();
    let config = scenario_config(0.0);
    let (records_a, trace_a, _) = run_pipeline(&text, &config, true);
    let (records_b, trace_b, _) = run_pipeline(&text, &config, true);
    assert_eq!(records_a, records_b);
    assert_eq!(trace_a, trace_b);
}

#[test]
fn test_trace_contains_site_rows() {
    let (_, trace, _) = run_pipeline(&three_site_stream(), &scenario_config(0.0), true);
    assert!(trace.contains("chr1,100,allele,s1,"));
    assert!(trace.contains("chr1,100,posterior_normalizer,"));
    assert!(trace.contains("chr1,100,genotypecombo,"));
    // The skipped site leaves no trace
    assert!(!trace.contains("chr1,200,"));
}

#[test]
fn test_min_coverage_reduces_called_sites() {
    let text = three_site_stream();
    let lax = scenario_config(0.0);
    let strict = Config { min_coverage: 19, ..lax.clone() };

    let (_, _, lax_metrics) = run_pipeline(&text, &lax, false);
    let (_, _, strict_metrics) = run_pipeline(&text, &strict, false);

    // Site 3 has 18 observations and drops out under the higher gate
    assert_eq!(lax_metrics.called_sites, 2);
    assert_eq!(strict_metrics.called_sites, 1);
    assert_eq!(strict_metrics.skipped_low_coverage, 1);
    assert!(strict_metrics.called_sites <= lax_metrics.called_sites);
}

#[test]
fn test_failed_site_report() {
    // A weak alternate misses a high threshold and lands in the report
    let text =
        site_text("chr1", 500, "A", &[("s1", 'R', "A", 19, 20), ("s1", 'S', "G", 1, 20)]);
    let mut config = scenario_config(0.99);
    config.min_alt_count = 1;
    config.min_alt_fraction = 0.0;

    let mut reader = PileupReader::new(
        Cursor::new(text),
        config.clone(),
        TargetRegions::default(),
        None,
    );
    let site = reader.next_site().unwrap().unwrap();
    let SiteStatus::Evaluated(eval) = evaluate_site(&site, &config, false) else {
        panic!("expected evaluation");
    };
    assert!(!eval.called);

    let mut buffer = Vec::new();
    FailedSiteWriter::new(&mut buffer).write_site(&eval).unwrap();
    let bed = String::from_utf8(buffer).unwrap();
    assert_eq!(bed, "chr1\t499\t500\tG\n");
}

#[test]
fn test_targets_gate_sites() {
    let text = three_site_stream();
    let config = scenario_config(0.0);
    let targets = TargetRegions::new(vec![("chr1".to_string(), 0, 150)]);

    let mut reader =
        PileupReader::new(Cursor::new(text), config.clone(), targets, None);
    let mut called = 0;
    let mut skipped_targets = 0;
    while let Some(site) = reader.next_site().unwrap() {
        match evaluate_site(&site, &config, false) {
            SiteStatus::Evaluated(eval) if eval.called => called += 1,
            SiteStatus::Skip(bayescall_lib::site::SkipReason::OutsideTargets) => {
                skipped_targets += 1;
            }
            _ => {}
        }
    }
    // Only the site at position 100 is inside the target window
    assert_eq!(called, 1);
    assert_eq!(skipped_targets, 2);
}

#[test]
fn test_report_all_alternates_mode() {
    // Two alternates at one site
    let text = site_text(
        "chr1",
        700,
        "A",
        &[("s1", 'R', "A", 8, 30), ("s1", 'S', "T", 6, 30), ("s1", 'S', "C", 6, 30)],
    );
    let mut config = scenario_config(0.0);
    config.report_all_alternates = true;

    let (records, _, metrics) = run_pipeline(&text, &config, false);
    let data_lines: Vec<&str> = records.lines().skip(1).collect();
    // One record per alternate present in the best combo
    assert_eq!(data_lines.len() as u64, metrics.records_written);
    assert!(!data_lines.is_empty());
}
