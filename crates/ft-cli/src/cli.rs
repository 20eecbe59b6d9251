//! Command-line argument definitions.

use std::path::PathBuf;

use clap::Parser;
use ft_core::DatePolicy;

/// Exposure acceptance statistics from an astrophotography acquisition log.
///
/// Totals accepted and rejected frames per night and exposure length, prints
/// a summary, and writes the accepted totals to a CSV file beside the log.
#[derive(Debug, Parser)]
#[command(name = "frametime", version, about, long_about = None)]
pub struct Cli {
    /// Path to the log file.
    #[arg(long)]
    pub logfile: PathBuf,

    /// How log dates map to reported dates: `verbatim` or `observing-night`.
    ///
    /// Overrides the configured policy.
    #[arg(long, value_name = "POLICY")]
    pub date_policy: Option<DatePolicy>,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}
