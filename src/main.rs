//! BillForge: billing analytics report and charts
//!
//! This is the main entrypoint that orchestrates loading, aggregation,
//! console reporting and chart rendering.

use std::fs;
use std::time::Instant;

use anyhow::{Context, Result};
use billforge::{load_invoices, print_report, viz, Args, BillingReport, ChartStyle};
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing from BILLFORGE_LOG, falling back to `info` (`debug` with --verbose)
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_env("BILLFORGE_LOG").unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    run_pipeline(&args)
}

/// Run the full pipeline: load → aggregate → print → plot
fn run_pipeline(args: &Args) -> Result<()> {
    let start_time = Instant::now();
    let options = args.report_options()?;
    let style = ChartStyle::load(args.style.as_deref())?;

    // Step 1: load and validate
    debug!(input = %args.input.display(), "loading billing file");
    let load_start = Instant::now();
    let invoices = load_invoices(&args.input)
        .with_context(|| format!("failed to load {}", args.input.display()))?;
    info!(
        invoices = invoices.len(),
        elapsed_ms = load_start.elapsed().as_millis() as u64,
        "billing file loaded"
    );

    // Step 2: aggregate
    let build_start = Instant::now();
    let report = BillingReport::build(&invoices, &options);
    debug!(
        customers = report.overview.customers,
        periods = report.overview.periods.len(),
        elapsed_ms = build_start.elapsed().as_millis() as u64,
        "report built"
    );

    // Step 3: console report
    print_report(&report);

    if let Some(json_path) = &args.json {
        let json = serde_json::to_string_pretty(&report)?;
        fs::write(json_path, json)
            .with_context(|| format!("failed to write {}", json_path.display()))?;
        info!(path = %json_path.display(), "report written as JSON");
    }

    // Step 4: charts
    if args.no_charts {
        debug!("chart rendering skipped");
    } else {
        let viz_start = Instant::now();
        let written = viz::render_all(&report, &style, &args.output_dir)?;
        info!(
            charts = written.len(),
            output_dir = %args.output_dir.display(),
            elapsed_ms = viz_start.elapsed().as_millis() as u64,
            "charts generated"
        );
    }

    info!(
        elapsed_ms = start_time.elapsed().as_millis() as u64,
        "pipeline complete"
    );
    Ok(())
}
