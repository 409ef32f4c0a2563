//! Console report: one block per summary, in fixed order

use std::fmt::{self, Write};

use crate::analysis::BillingReport;
use crate::data::{CustomerType, Status};
use crate::format::format_money;

const RULE_WIDTH: usize = 60;

fn section(out: &mut String, title: &str) -> fmt::Result {
    writeln!(out)?;
    writeln!(out, "{}", "─".repeat(RULE_WIDTH))?;
    writeln!(out, "  {title}")?;
    writeln!(out, "{}", "─".repeat(RULE_WIDTH))
}

fn write_overview(out: &mut String, report: &BillingReport) -> fmt::Result {
    let overview = &report.overview;
    writeln!(out, "{}", "=".repeat(RULE_WIDTH))?;
    writeln!(out, "  BILLING ANALYSIS")?;
    writeln!(out, "{}", "=".repeat(RULE_WIDTH))?;
    writeln!(out)?;
    writeln!(out, "Invoices loaded   : {}", overview.invoices)?;
    let periods: Vec<String> = overview.periods.iter().map(ToString::to_string).collect();
    writeln!(out, "Billing periods   : {}", periods.join(", "))?;
    writeln!(out, "Due months        : {}", overview.due_months.join(", "))?;
    writeln!(out, "Distinct customers: {}", overview.customers)?;
    let statuses: Vec<&str> = overview.statuses.iter().map(|s| s.as_str()).collect();
    writeln!(out, "Statuses present  : {}", statuses.join(", "))
}

fn write_status(out: &mut String, report: &BillingReport) -> fmt::Result {
    let status = &report.status;
    section(out, "1. OVERDUE RATE")?;
    writeln!(out)?;
    for share in &status.overall.shares {
        writeln!(out, "  {:<10}: {:>5} ({:.1}%)", share.status, share.count, share.pct)?;
    }
    writeln!(out)?;
    writeln!(out, "  Total billed   : {:>16}", format_money(status.total_amount))?;
    writeln!(out, "  Overdue amount : {:>16}", format_money(status.overdue_amount))?;
    writeln!(out, "  Share of billed: {:.1}%", status.overdue_amount_pct)?;

    writeln!(out)?;
    writeln!(out, "  Overdue rate by billing period:")?;
    for period in &status.by_period {
        let b = &period.breakdown;
        writeln!(
            out,
            "    {}: {}/{} overdue -> {:.1}%",
            period.period,
            b.count(Status::Overdue),
            b.total,
            b.pct(Status::Overdue)
        )?;
    }
    Ok(())
}

fn write_consumption(out: &mut String, report: &BillingReport) -> fmt::Result {
    let consumption = &report.consumption;
    section(out, "2. ENERGY CONSUMPTION")?;

    writeln!(out)?;
    writeln!(out, "  By customer type:")?;
    writeln!(out, "  {:<8} | {:>5} | {:>9} | {:>9} | {:>9} | {:>11}", "type", "count", "mean", "median", "max", "total")?;
    for row in &consumption.by_customer_type {
        let s = &row.stats;
        writeln!(
            out,
            "  {:<8} | {:>5} | {:>9.1} | {:>9.1} | {:>9.1} | {:>11.1}",
            row.key, s.count, s.mean, s.median, s.max, s.total
        )?;
    }

    writeln!(out)?;
    writeln!(out, "  By invoice status:")?;
    writeln!(out, "  {:<8} | {:>5} | {:>9} | {:>9}", "status", "count", "mean", "median")?;
    for row in &consumption.by_status {
        let s = &row.stats;
        writeln!(out, "  {:<8} | {:>5} | {:>9.1} | {:>9.1}", row.key, s.count, s.mean, s.median)?;
    }

    writeln!(out)?;
    writeln!(out, "  By billing period:")?;
    writeln!(out, "  {:<8} | {:>9} | {:>11}", "period", "mean", "total")?;
    for row in &consumption.by_period {
        writeln!(out, "  {:<8} | {:>9.1} | {:>11.1}", row.key, row.stats.mean, row.stats.total)?;
    }
    Ok(())
}

fn write_revenue(out: &mut String, report: &BillingReport) -> fmt::Result {
    section(out, "3. REVENUE BY CUSTOMER TYPE")?;
    writeln!(out)?;
    writeln!(
        out,
        "  {:<6} | {:>5} | {:>16} | {:>10} | {:>10} | {:>7}",
        "type", "count", "total", "mean", "median", "share"
    )?;
    for row in &report.revenue.rows {
        writeln!(
            out,
            "  {:<6} | {:>5} | {:>16} | {:>10.2} | {:>10.2} | {:>6.1}%",
            row.customer_type,
            row.count,
            format_money(row.total),
            row.mean,
            row.median,
            row.share_pct
        )?;
    }

    writeln!(out)?;
    writeln!(out, "  Overdue rate by type:")?;
    for row in &report.revenue.rows {
        writeln!(
            out,
            "    {}: {}/{} overdue -> {:.1}%",
            row.customer_type, row.overdue, row.count, row.overdue_rate
        )?;
    }
    Ok(())
}

fn write_due_days(out: &mut String, report: &BillingReport) -> fmt::Result {
    let due_days = &report.due_days;
    section(out, "4. DUE DATES")?;

    writeln!(out)?;
    writeln!(out, "  Busiest due days:")?;
    for day in &due_days.busiest {
        writeln!(out, "    day {:>2}: {:>4} invoices", day.day, day.count)?;
    }

    writeln!(out)?;
    writeln!(
        out,
        "  Overdue rate by due day (days with >= {} invoices):",
        due_days.min_invoices
    )?;
    writeln!(out, "    {:>3} | {:>5} | {:>7} | {:>6}", "day", "count", "overdue", "rate")?;
    for day in &due_days.rates {
        writeln!(
            out,
            "    {:>3} | {:>5} | {:>7} | {:>5.1}%",
            day.day, day.count, day.overdue, day.rate
        )?;
    }
    Ok(())
}

fn write_trend(out: &mut String, report: &BillingReport) -> fmt::Result {
    let trend = &report.trend;
    section(out, "5. OVERDUE TREND BY BILLING PERIOD")?;
    writeln!(out)?;
    writeln!(out, "  {:<8} | {:>5} | {:>7} | {:>6} | {:>14}", "period", "total", "overdue", "rate", "overdue amount")?;
    for row in &trend.rows {
        writeln!(
            out,
            "  {:<8} | {:>5} | {:>7} | {:>5.1}% | {:>14}",
            row.period,
            row.total,
            row.overdue,
            row.rate,
            format_money(row.overdue_amount)
        )?;
    }
    if let (Some(first), Some(last)) = (trend.rows.first(), trend.rows.last()) {
        writeln!(out)?;
        writeln!(
            out,
            "  Change {} -> {}: {:+.1} p.p.",
            first.period, last.period, trend.rate_delta
        )?;
    }
    Ok(())
}

fn write_top_customers(out: &mut String, report: &BillingReport) -> fmt::Result {
    section(out, &format!("6. TOP {} CUSTOMERS BY REVENUE", report.options.top_n))?;
    writeln!(out)?;
    writeln!(
        out,
        "  {:>4} | {:<7} | {:<4} | {:>14} | {:>8} | {:>11} | {}",
        "rank", "label", "type", "total billed", "invoices", "kWh", "overdue"
    )?;
    for customer in &report.top_customers {
        let t = &customer.totals;
        writeln!(
            out,
            "  {:>4} | {:<7} | {:<4} | {:>14} | {:>8} | {:>11.1} | {}",
            customer.rank,
            customer.label,
            t.customer_type,
            format_money(t.total_amount),
            t.invoice_count,
            t.total_consumption,
            if t.ever_overdue { "yes" } else { "no" }
        )?;
    }
    Ok(())
}

fn write_delinquency(out: &mut String, report: &BillingReport) -> fmt::Result {
    let d = &report.delinquency;
    section(out, "7. OVERDUE FREQUENCY PER CUSTOMER")?;
    writeln!(out)?;
    writeln!(out, "  Customers without overdue : {}", d.without_overdue)?;
    writeln!(out, "  Customers with overdue    : {}", d.with_overdue)?;
    writeln!(out, "  Customers 100% overdue    : {}", d.fully_overdue)?;
    writeln!(out, "  Customers > 50% overdue   : {}", d.majority_overdue)?;
    writeln!(out, "  Max overdue per customer  : {}", d.max_overdue)?;

    writeln!(out)?;
    writeln!(out, "  Distribution by overdue count:")?;
    for bucket in &d.distribution {
        writeln!(
            out,
            "    {} overdue: {} customers",
            bucket.overdue_invoices, bucket.customers
        )?;
    }
    Ok(())
}

/// Render the full console report
pub fn render_report(report: &BillingReport) -> String {
    let mut out = String::new();
    let written = write_overview(&mut out, report)
        .and_then(|_| write_status(&mut out, report))
        .and_then(|_| write_consumption(&mut out, report))
        .and_then(|_| write_revenue(&mut out, report))
        .and_then(|_| write_due_days(&mut out, report))
        .and_then(|_| write_trend(&mut out, report))
        .and_then(|_| write_top_customers(&mut out, report))
        .and_then(|_| write_delinquency(&mut out, report));
    // writing into a String cannot fail
    debug_assert!(written.is_ok());
    out
}

/// Print the full console report to stdout
pub fn print_report(report: &BillingReport) {
    print!("{}", render_report(report));
}

/// Label used for customer types on charts and in the console
pub fn customer_type_label(customer_type: CustomerType) -> &'static str {
    match customer_type {
        CustomerType::Individual => "PF (individual)",
        CustomerType::Business => "PJ (business)",
    }
}
