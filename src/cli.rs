//! Command-line interface definitions and argument parsing

use std::path::PathBuf;

use clap::Parser;

use crate::analysis::ReportOptions;

/// Billing analytics CLI: console report and charts from an invoice CSV
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the semicolon-separated invoice CSV
    #[arg(short, long, default_value = "base_faturamento.csv")]
    pub input: PathBuf,

    /// Directory the chart PNGs are written to
    #[arg(short, long, default_value = "charts")]
    pub output_dir: PathBuf,

    /// Optional TOML file overriding the chart palette and sizes
    #[arg(long)]
    pub style: Option<PathBuf>,

    /// Number of customers in the top-revenue ranking
    #[arg(long, default_value = "10")]
    pub top: usize,

    /// Minimum invoices a due day needs to enter the overdue-rate table
    #[arg(long, default_value = "5")]
    pub min_due_day_invoices: usize,

    /// Also write the full report as JSON to this path
    #[arg(long)]
    pub json: Option<PathBuf>,

    /// Skip chart rendering
    #[arg(long)]
    pub no_charts: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Aggregation options taken from the command line
    pub fn report_options(&self) -> crate::Result<ReportOptions> {
        if self.top == 0 {
            anyhow::bail!("--top must be at least 1");
        }
        Ok(ReportOptions {
            top_n: self.top,
            min_due_day_invoices: self.min_due_day_invoices,
            ..ReportOptions::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["billforge"]);
        assert_eq!(args.input, PathBuf::from("base_faturamento.csv"));
        assert_eq!(args.output_dir, PathBuf::from("charts"));
        assert!(args.style.is_none());
        assert!(!args.no_charts);

        let options = args.report_options().unwrap();
        assert_eq!(options, ReportOptions::default());
    }

    #[test]
    fn test_report_options() {
        let mut args = Args::parse_from([
            "billforge",
            "-i",
            "faturas.csv",
            "--top",
            "3",
            "--min-due-day-invoices",
            "2",
            "--no-charts",
        ]);
        let options = args.report_options().unwrap();
        assert_eq!(options.top_n, 3);
        assert_eq!(options.min_due_day_invoices, 2);
        assert!(args.no_charts);

        args.top = 0;
        assert!(args.report_options().is_err());
    }
}
