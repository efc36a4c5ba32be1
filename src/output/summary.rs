//! End-of-run summary

use crate::pipeline::RunReport;
use crate::state::RunPhase;
use std::fmt::Write;

/// Renders the end-of-run summary as plain text
pub fn format_summary(report: &RunReport) -> String {
    let mut out = String::new();
    let counts = &report.counts;

    let headline = match report.outcome {
        RunPhase::Completed => "Scrape completed",
        RunPhase::Interrupted => "Scrape interrupted, progress saved",
        _ => "Scrape failed",
    };
    let _ = writeln!(out, "=== {} ===\n", headline);

    match report.pages {
        Some((first, last)) => {
            let _ = writeln!(out, "Pages {}-{}:", first, last);
        }
        None => {
            let _ = writeln!(out, "No pages requested:");
        }
    }
    let _ = writeln!(out, "  Completed: {}", counts.pages_completed);
    let _ = writeln!(out, "  Failed: {}", counts.pages_failed);
    let _ = writeln!(out);

    let _ = writeln!(out, "Records:");
    let _ = writeln!(out, "  New: {}", counts.inserted);
    let _ = writeln!(out, "  Updated: {}", counts.updated);
    let _ = writeln!(out, "  Dropped rows: {}", counts.records_dropped);
    let _ = writeln!(out, "  Total in file: {}", report.records_total);
    let _ = writeln!(out);

    let _ = writeln!(out, "Covers:");
    let _ = writeln!(out, "  Downloaded: {}", counts.covers_downloaded);
    let _ = writeln!(out, "  Failed: {}", counts.covers_failed);
    let _ = writeln!(out, "  Total stored: {}", report.covers_total);
    let _ = writeln!(out);

    let _ = writeln!(
        out,
        "Requests: {} ({} cooldowns)",
        report.fetch.requests, report.fetch.cooldowns
    );
    let _ = writeln!(out, "Errors: {}", counts.errors());
    let _ = writeln!(out, "Elapsed: {:.1}s", report.elapsed.as_secs_f64());
    let _ = writeln!(out, "Output: {}", report.output.display());
    if let Some(dir) = &report.covers_dir {
        let _ = writeln!(out, "Covers: {}", dir.display());
    }
    if let Some(error) = &report.error {
        let _ = writeln!(out, "Fatal error: {}", error);
    }

    out
}

/// Prints the end-of-run summary to stdout
pub fn print_summary(report: &RunReport) {
    print!("{}", format_summary(report));
}
