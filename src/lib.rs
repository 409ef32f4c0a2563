//! BillForge: descriptive analytics over a utility billing dataset
//!
//! The pipeline is linear: load the invoice CSV, build every summary table
//! once into a [`BillingReport`], print it and render the chart figures.

pub mod analysis;
pub mod cli;
pub mod data;
pub mod error;
pub mod format;
pub mod report;
pub mod stats;
pub mod style;
pub mod viz;

// Re-export public items for easier access
pub use analysis::{BillingReport, ReportOptions};
pub use cli::Args;
pub use data::{load_invoices, BillingPeriod, CustomerType, Invoice, Status};
pub use error::LoadError;
pub use format::format_money;
pub use report::{print_report, render_report};
pub use style::ChartStyle;
pub use viz::{draw_figure, render_all, Figure};

/// Common result type used throughout the application
pub type Result<T> = anyhow::Result<T>;
