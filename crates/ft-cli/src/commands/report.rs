//! Report command: summarize a log on stdout and export accepted totals as CSV.
//!
//! Only the accepted table is printed and exported. Rejected frames count
//! toward the rejected total line and nothing else.

use std::fmt::Write as _;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ft_core::{AggregationTable, DatePolicy, ScanSummary, process_file};

const CSV_HEADER: &str = "date,number,duration";

/// Row terminator for the exported CSV (RFC 4180).
const CSV_LINE_END: &str = "\r\n";

// ========== Duration Formatting ==========

/// Formats seconds as hours, minutes or seconds with two decimals.
pub fn format_duration(seconds: f64) -> String {
    if seconds >= 3600.0 {
        format!("{:.2} hours", seconds / 3600.0)
    } else if seconds >= 60.0 {
        format!("{:.2} minutes", seconds / 60.0)
    } else {
        format!("{seconds:.2} seconds")
    }
}

// ========== Console Summary ==========

/// Renders the console summary for a scan.
pub fn format_summary(summary: &ScanSummary) -> String {
    let mut output = String::new();

    writeln!(
        output,
        "Total accepted time: {}",
        format_duration(summary.accepted_total.as_secs_f64())
    )
    .unwrap();
    writeln!(
        output,
        "Total rejected time: {}",
        format_duration(summary.rejected_total.as_secs_f64())
    )
    .unwrap();

    writeln!(output).unwrap();
    writeln!(
        output,
        "Time per day per exposure duration for accepted frames:"
    )
    .unwrap();
    for (key, bucket) in &summary.accepted {
        writeln!(
            output,
            "Date: {} | Exposure: {} s | Subs: {:>3} | Total time: {}",
            key.date,
            key.exposure,
            bucket.count,
            format_duration(bucket.total.as_secs_f64())
        )
        .unwrap();
    }

    output
}

pub fn print_summary(summary: &ScanSummary) {
    print!("{}", format_summary(summary));
}

// ========== CSV Export ==========

/// Returns the CSV path for a log: same directory, extension replaced.
pub fn csv_path_for(logfile: &Path) -> PathBuf {
    logfile.with_extension("csv")
}

/// Writes the header and one row per bucket, in key order.
pub fn write_csv_rows<W: Write>(writer: &mut W, table: &AggregationTable) -> io::Result<()> {
    write!(writer, "{CSV_HEADER}{CSV_LINE_END}")?;
    for (key, bucket) in table {
        write!(
            writer,
            "{},{},{}{CSV_LINE_END}",
            key.date,
            bucket.count,
            bucket.total.round_secs()
        )?;
    }
    Ok(())
}

/// Writes the accepted table next to `logfile` and returns the CSV path.
pub fn write_csv(table: &AggregationTable, logfile: &Path) -> Result<PathBuf> {
    let csv_path = csv_path_for(logfile);

    println!();
    println!(
        "Writing image acquisition details to CSV file: {}",
        csv_path.display()
    );

    let file = File::create(&csv_path)
        .with_context(|| format!("failed to create CSV file: {}", csv_path.display()))?;
    let mut writer = BufWriter::new(file);
    write_csv_rows(&mut writer, table)
        .and_then(|()| writer.flush())
        .with_context(|| format!("failed to write CSV file: {}", csv_path.display()))?;

    tracing::debug!(path = %csv_path.display(), rows = table.len(), "wrote CSV report");
    Ok(csv_path)
}

// ========== Public Interface ==========

/// Runs the report: scan, print the summary, export the CSV.
pub fn run(logfile: &Path, policy: DatePolicy) -> Result<()> {
    let summary = process_file(logfile, policy)
        .with_context(|| format!("failed to process log file: {}", logfile.display()))?;

    print_summary(&summary);
    write_csv(&summary.accepted, logfile)?;

    Ok(())
}
