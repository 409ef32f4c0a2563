//! Aggregation pipeline: pure summaries over the loaded invoices
//!
//! Every function takes the full invoice slice and returns an owned table.
//! Nothing here mutates input or keeps state, so building a [`BillingReport`]
//! twice from the same invoices yields identical tables. Rates are percentages
//! and resolve to `0.0` when their group is empty.
//!
//! Ordering rules:
//! * billing periods are chronological (`BillingPeriod: Ord`)
//! * customer types and statuses follow their `ALL` declaration order
//! * customers keep first-encounter order; the top-N ranking is a stable sort,
//!   so equal totals keep that order

use std::collections::{BTreeMap, BTreeSet, HashMap};

use ndarray::Array2;
use serde::Serialize;

use crate::data::{BillingPeriod, CustomerType, Invoice, Status};
use crate::format::format_money;
use crate::stats::{self, BoxStats, HistogramBin};

/// Bins used for the overall consumption histogram
pub const CONSUMPTION_HISTOGRAM_BINS: usize = 30;
/// Bins used for the per-customer overdue rate histogram (0–100%)
pub const DELINQUENCY_HISTOGRAM_BINS: usize = 10;
/// Overdue rate (percent) from which the KPI panel raises a warning
pub const OVERDUE_RATE_ALERT: f64 = 10.0;

/// Tunables for the report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportOptions {
    /// Number of customers in the revenue ranking
    pub top_n: usize,
    /// Minimum invoices a due-day needs to enter the overdue-rate table
    pub min_due_day_invoices: usize,
    /// Number of busiest due-days listed
    pub busiest_due_days: usize,
}

impl Default for ReportOptions {
    fn default() -> Self {
        ReportOptions {
            top_n: 10,
            min_due_day_invoices: 5,
            busiest_due_days: 8,
        }
    }
}

fn group_by<'a, K, F>(invoices: &'a [Invoice], key: F) -> BTreeMap<K, Vec<&'a Invoice>>
where
    K: Ord,
    F: Fn(&Invoice) -> K,
{
    let mut groups: BTreeMap<K, Vec<&Invoice>> = BTreeMap::new();
    for invoice in invoices {
        groups.entry(key(invoice)).or_default().push(invoice);
    }
    groups
}

fn overdue_count<'a>(invoices: impl IntoIterator<Item = &'a Invoice>) -> usize {
    invoices.into_iter().filter(|i| i.is_overdue()).count()
}

fn overdue_amount<'a>(invoices: impl IntoIterator<Item = &'a Invoice>) -> f64 {
    invoices
        .into_iter()
        .filter(|i| i.is_overdue())
        .map(|i| i.amount)
        .sum()
}

// ---------------------------------------------------------------------------
// Dataset overview
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetOverview {
    pub invoices: usize,
    pub customers: usize,
    /// Billing periods present, chronological
    pub periods: Vec<BillingPeriod>,
    /// Status values present, in declaration order
    pub statuses: Vec<Status>,
    /// Due months present (`YYYY-MM`), ascending
    pub due_months: Vec<String>,
}

pub fn dataset_overview(invoices: &[Invoice]) -> DatasetOverview {
    let customers: BTreeSet<&str> = invoices.iter().map(|i| i.customer_id.as_str()).collect();
    let periods: BTreeSet<BillingPeriod> = invoices.iter().map(|i| i.billing_period).collect();
    let statuses: BTreeSet<Status> = invoices.iter().map(|i| i.status).collect();
    let due_months: BTreeSet<&str> = invoices.iter().map(|i| i.due_month.as_str()).collect();

    DatasetOverview {
        invoices: invoices.len(),
        customers: customers.len(),
        periods: periods.into_iter().collect(),
        statuses: statuses.into_iter().collect(),
        due_months: due_months.into_iter().map(str::to_string).collect(),
    }
}

// ---------------------------------------------------------------------------
// 1. Status rates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusShare {
    pub status: Status,
    pub count: usize,
    pub pct: f64,
}

/// Count and share of every status within one grouping
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusBreakdown {
    pub total: usize,
    /// One entry per status, in `Status::ALL` order
    pub shares: Vec<StatusShare>,
}

impl StatusBreakdown {
    fn from_invoices<'a>(invoices: impl IntoIterator<Item = &'a Invoice>) -> Self {
        let mut counts: HashMap<Status, usize> = HashMap::new();
        let mut total = 0;
        for invoice in invoices {
            *counts.entry(invoice.status).or_default() += 1;
            total += 1;
        }
        let shares = Status::ALL
            .iter()
            .map(|&status| {
                let count = counts.get(&status).copied().unwrap_or(0);
                StatusShare {
                    status,
                    count,
                    pct: stats::rate(count, total),
                }
            })
            .collect();
        StatusBreakdown { total, shares }
    }

    pub fn count(&self, status: Status) -> usize {
        self.share(status).map_or(0, |s| s.count)
    }

    pub fn pct(&self, status: Status) -> f64 {
        self.share(status).map_or(0.0, |s| s.pct)
    }

    fn share(&self, status: Status) -> Option<&StatusShare> {
        self.shares.iter().find(|s| s.status == status)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodStatus {
    pub period: BillingPeriod,
    pub breakdown: StatusBreakdown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSummary {
    pub overall: StatusBreakdown,
    /// Chronological
    pub by_period: Vec<PeriodStatus>,
    pub total_amount: f64,
    pub overdue_amount: f64,
    /// Overdue amount as a share of total amount
    pub overdue_amount_pct: f64,
}

pub fn status_summary(invoices: &[Invoice]) -> StatusSummary {
    let by_period = group_by(invoices, |i| i.billing_period)
        .into_iter()
        .map(|(period, group)| PeriodStatus {
            period,
            breakdown: StatusBreakdown::from_invoices(group),
        })
        .collect();

    let total_amount: f64 = invoices.iter().map(|i| i.amount).sum();
    let overdue_amount = overdue_amount(invoices);

    StatusSummary {
        overall: StatusBreakdown::from_invoices(invoices),
        by_period,
        total_amount,
        overdue_amount,
        overdue_amount_pct: stats::percentage(overdue_amount, total_amount),
    }
}

// ---------------------------------------------------------------------------
// 2. Energy consumption
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsumptionStats {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub max: f64,
    pub total: f64,
}

impl ConsumptionStats {
    fn from_values(values: &[f64]) -> Self {
        ConsumptionStats {
            count: values.len(),
            mean: stats::mean(values),
            median: stats::median(values),
            max: stats::max(values),
            total: values.iter().sum(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsumptionRow<K> {
    pub key: K,
    #[serde(flatten)]
    pub stats: ConsumptionStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeDistribution {
    pub customer_type: CustomerType,
    pub box_stats: BoxStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsumptionSummary {
    /// Every customer type, zero row when absent
    pub by_customer_type: Vec<ConsumptionRow<CustomerType>>,
    /// Every status, zero row when absent
    pub by_status: Vec<ConsumptionRow<Status>>,
    /// Periods present in the data, chronological
    pub by_period: Vec<ConsumptionRow<BillingPeriod>>,
    pub distribution_by_type: Vec<TypeDistribution>,
    pub overall_mean: f64,
    pub overall_median: f64,
    pub histogram: Vec<HistogramBin>,
}

fn consumption_rows<K, F>(invoices: &[Invoice], keys: &[K], key_of: F) -> Vec<ConsumptionRow<K>>
where
    K: Ord + Copy,
    F: Fn(&Invoice) -> K,
{
    let groups = group_by(invoices, key_of);
    keys.iter()
        .map(|&key| {
            let values: Vec<f64> = groups
                .get(&key)
                .map(|g| g.iter().map(|i| i.energy_consumption).collect())
                .unwrap_or_default();
            ConsumptionRow {
                key,
                stats: ConsumptionStats::from_values(&values),
            }
        })
        .collect()
}

pub fn consumption_summary(invoices: &[Invoice]) -> ConsumptionSummary {
    let periods: Vec<BillingPeriod> = dataset_overview(invoices).periods;
    let all: Vec<f64> = invoices.iter().map(|i| i.energy_consumption).collect();

    let distribution_by_type = CustomerType::ALL
        .iter()
        .map(|&customer_type| {
            let values: Vec<f64> = invoices
                .iter()
                .filter(|i| i.customer_type == customer_type)
                .map(|i| i.energy_consumption)
                .collect();
            TypeDistribution {
                customer_type,
                box_stats: BoxStats::from_values(&values),
            }
        })
        .collect();

    ConsumptionSummary {
        by_customer_type: consumption_rows(invoices, &CustomerType::ALL, |i| i.customer_type),
        by_status: consumption_rows(invoices, &Status::ALL, |i| i.status),
        by_period: consumption_rows(invoices, &periods, |i| i.billing_period),
        distribution_by_type,
        overall_mean: stats::mean(&all),
        overall_median: stats::median(&all),
        histogram: stats::histogram(&all, CONSUMPTION_HISTOGRAM_BINS),
    }
}

// ---------------------------------------------------------------------------
// 3. Revenue by customer type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevenueRow {
    pub customer_type: CustomerType,
    pub count: usize,
    pub total: f64,
    pub mean: f64,
    pub median: f64,
    /// Share of overall revenue
    pub share_pct: f64,
    pub overdue: usize,
    pub overdue_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevenueSummary {
    /// Every customer type, in `CustomerType::ALL` order
    pub rows: Vec<RevenueRow>,
    pub total: f64,
}

impl RevenueSummary {
    pub fn row(&self, customer_type: CustomerType) -> Option<&RevenueRow> {
        self.rows.iter().find(|r| r.customer_type == customer_type)
    }
}

pub fn revenue_summary(invoices: &[Invoice]) -> RevenueSummary {
    let total: f64 = invoices.iter().map(|i| i.amount).sum();
    let groups = group_by(invoices, |i| i.customer_type);

    let rows = CustomerType::ALL
        .iter()
        .map(|&customer_type| {
            let group = groups.get(&customer_type).map(Vec::as_slice).unwrap_or(&[]);
            let amounts: Vec<f64> = group.iter().map(|i| i.amount).collect();
            let type_total: f64 = amounts.iter().sum();
            let overdue = overdue_count(group.iter().copied());
            RevenueRow {
                customer_type,
                count: group.len(),
                total: type_total,
                mean: stats::mean(&amounts),
                median: stats::median(&amounts),
                share_pct: stats::percentage(type_total, total),
                overdue,
                overdue_rate: stats::rate(overdue, group.len()),
            }
        })
        .collect();

    RevenueSummary { rows, total }
}

// ---------------------------------------------------------------------------
// 4. Due days
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DueDayVolume {
    pub day: u32,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DueDayRate {
    pub day: u32,
    pub count: usize,
    pub overdue: usize,
    pub rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DueDaySummary {
    /// Every due-day present in the data, ascending
    pub volume: Vec<DueDayVolume>,
    /// Busiest due-days, by count descending then day ascending
    pub busiest: Vec<DueDayVolume>,
    /// Due-days with at least `min_invoices`, by rate descending then day ascending
    pub rates: Vec<DueDayRate>,
    pub min_invoices: usize,
    /// Overdue rate across all invoices
    pub overall_rate: f64,
}

impl DueDaySummary {
    /// Due-day with the highest overdue rate among the significant ones;
    /// the earliest day on ties
    pub fn worst(&self) -> Option<&DueDayRate> {
        self.rates.first()
    }

    /// Due-day with the lowest overdue rate among the significant ones.
    ///
    /// Ties resolve to the earliest day, as in [`DueDaySummary::worst`].
    pub fn best(&self) -> Option<&DueDayRate> {
        let lowest = self.rates.last()?.rate;
        self.rates.iter().find(|r| r.rate == lowest)
    }
}

pub fn due_day_summary(invoices: &[Invoice], min_invoices: usize, busiest: usize) -> DueDaySummary {
    let groups = group_by(invoices, |i| i.due_day);

    let volume: Vec<DueDayVolume> = groups
        .iter()
        .map(|(&day, group)| DueDayVolume {
            day,
            count: group.len(),
        })
        .collect();

    let mut busiest_days = volume.clone();
    busiest_days.sort_by(|a, b| b.count.cmp(&a.count).then(a.day.cmp(&b.day)));
    busiest_days.truncate(busiest);

    let mut rates: Vec<DueDayRate> = groups
        .iter()
        .filter(|(_, group)| group.len() >= min_invoices)
        .map(|(&day, group)| {
            let overdue = overdue_count(group.iter().copied());
            DueDayRate {
                day,
                count: group.len(),
                overdue,
                rate: stats::rate(overdue, group.len()),
            }
        })
        .collect();
    rates.sort_by(|a, b| b.rate.total_cmp(&a.rate).then(a.day.cmp(&b.day)));

    DueDaySummary {
        volume,
        busiest: busiest_days,
        rates,
        min_invoices,
        overall_rate: stats::rate(overdue_count(invoices), invoices.len()),
    }
}

// ---------------------------------------------------------------------------
// 5. Period trend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendRow {
    pub period: BillingPeriod,
    pub total: usize,
    pub overdue: usize,
    pub rate: f64,
    pub overdue_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodTrend {
    /// Chronological
    pub rows: Vec<TrendRow>,
    /// Overdue rate of the last period minus the first, in percentage points
    pub rate_delta: f64,
}

pub fn period_trend(invoices: &[Invoice]) -> PeriodTrend {
    let rows: Vec<TrendRow> = group_by(invoices, |i| i.billing_period)
        .into_iter()
        .map(|(period, group)| {
            let overdue = overdue_count(group.iter().copied());
            TrendRow {
                period,
                total: group.len(),
                overdue,
                rate: stats::rate(overdue, group.len()),
                overdue_amount: overdue_amount(group.iter().copied()),
            }
        })
        .collect();

    let rate_delta = match (rows.first(), rows.last()) {
        (Some(first), Some(last)) if rows.len() > 1 => last.rate - first.rate,
        _ => 0.0,
    };

    PeriodTrend { rows, rate_delta }
}

// ---------------------------------------------------------------------------
// 6. Top customers by revenue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerTotals {
    pub customer_id: String,
    pub customer_type: CustomerType,
    pub total_amount: f64,
    pub invoice_count: usize,
    pub total_consumption: f64,
    pub ever_overdue: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopCustomer {
    pub rank: usize,
    /// Anonymized label, e.g. `VIP_01`
    pub label: String,
    #[serde(flatten)]
    pub totals: CustomerTotals,
}

/// Totals per (customer id, customer type), in first-encounter order
pub fn customer_totals(invoices: &[Invoice]) -> Vec<CustomerTotals> {
    let mut index: HashMap<(&str, CustomerType), usize> = HashMap::new();
    let mut totals: Vec<CustomerTotals> = Vec::new();

    for invoice in invoices {
        let key = (invoice.customer_id.as_str(), invoice.customer_type);
        let slot = *index.entry(key).or_insert_with(|| {
            totals.push(CustomerTotals {
                customer_id: invoice.customer_id.clone(),
                customer_type: invoice.customer_type,
                total_amount: 0.0,
                invoice_count: 0,
                total_consumption: 0.0,
                ever_overdue: false,
            });
            totals.len() - 1
        });

        let entry = &mut totals[slot];
        entry.total_amount += invoice.amount;
        entry.invoice_count += 1;
        entry.total_consumption += invoice.energy_consumption;
        entry.ever_overdue |= invoice.is_overdue();
    }

    totals
}

/// The `n` highest-revenue customers, ranked from 1
pub fn top_customers(invoices: &[Invoice], n: usize) -> Vec<TopCustomer> {
    let mut totals = customer_totals(invoices);
    // stable: equal totals keep first-encounter order
    totals.sort_by(|a, b| b.total_amount.total_cmp(&a.total_amount));

    totals
        .into_iter()
        .take(n)
        .enumerate()
        .map(|(idx, totals)| TopCustomer {
            rank: idx + 1,
            label: format!("VIP_{:02}", idx + 1),
            totals,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// 7. Delinquency frequency per customer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerDelinquency {
    pub customer_id: String,
    pub invoices: usize,
    pub overdue: usize,
    pub rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverdueBucket {
    pub overdue_invoices: usize,
    pub customers: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DelinquencySummary {
    /// One row per customer id, first-encounter order
    pub customers: Vec<CustomerDelinquency>,
    pub total_customers: usize,
    pub without_overdue: usize,
    pub with_overdue: usize,
    /// Every invoice overdue
    pub fully_overdue: usize,
    /// At least one, but not every, invoice overdue
    pub partially_overdue: usize,
    /// More than half of the invoices overdue
    pub majority_overdue: usize,
    pub max_overdue: usize,
    /// Customers per exact overdue count, ascending
    pub distribution: Vec<OverdueBucket>,
    /// Mean overdue rate of customers with at least one overdue invoice
    pub delinquent_mean_rate: f64,
    /// Overdue rate histogram (0–100%) of customers with at least one overdue invoice
    pub delinquent_rate_histogram: Vec<HistogramBin>,
}

pub fn delinquency_summary(invoices: &[Invoice]) -> DelinquencySummary {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut customers: Vec<CustomerDelinquency> = Vec::new();

    for invoice in invoices {
        let slot = *index.entry(invoice.customer_id.as_str()).or_insert_with(|| {
            customers.push(CustomerDelinquency {
                customer_id: invoice.customer_id.clone(),
                invoices: 0,
                overdue: 0,
                rate: 0.0,
            });
            customers.len() - 1
        });
        let entry = &mut customers[slot];
        entry.invoices += 1;
        if invoice.is_overdue() {
            entry.overdue += 1;
        }
    }
    for customer in &mut customers {
        customer.rate = stats::rate(customer.overdue, customer.invoices);
    }

    let mut buckets: BTreeMap<usize, usize> = BTreeMap::new();
    for customer in &customers {
        *buckets.entry(customer.overdue).or_default() += 1;
    }

    let delinquent_rates: Vec<f64> = customers
        .iter()
        .filter(|c| c.overdue > 0)
        .map(|c| c.rate)
        .collect();
    let fully_overdue = customers
        .iter()
        .filter(|c| c.overdue > 0 && c.overdue == c.invoices)
        .count();
    let with_overdue = delinquent_rates.len();

    DelinquencySummary {
        total_customers: customers.len(),
        without_overdue: customers.len() - with_overdue,
        with_overdue,
        fully_overdue,
        partially_overdue: with_overdue - fully_overdue,
        majority_overdue: customers.iter().filter(|c| c.overdue * 2 > c.invoices).count(),
        max_overdue: customers.iter().map(|c| c.overdue).max().unwrap_or(0),
        distribution: buckets
            .into_iter()
            .map(|(overdue_invoices, customers)| OverdueBucket {
                overdue_invoices,
                customers,
            })
            .collect(),
        delinquent_mean_rate: stats::mean(&delinquent_rates),
        delinquent_rate_histogram: stats::histogram_in_range(
            &delinquent_rates,
            DELINQUENCY_HISTOGRAM_BINS,
            0.0,
            100.0,
        ),
        customers,
    }
}

// ---------------------------------------------------------------------------
// Correlations
// ---------------------------------------------------------------------------

pub const CORRELATION_LABELS: [&str; 5] = ["Amount", "Consumption", "Due day", "Overdue", "Business"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationMatrix {
    pub labels: Vec<String>,
    /// Row-major, `labels.len()` square
    pub values: Vec<Vec<f64>>,
}

pub fn correlation_matrix(invoices: &[Invoice]) -> CorrelationMatrix {
    let data = Array2::from_shape_fn((invoices.len(), CORRELATION_LABELS.len()), |(row, col)| {
        let invoice = &invoices[row];
        match col {
            0 => invoice.amount,
            1 => invoice.energy_consumption,
            2 => f64::from(invoice.due_day),
            3 => f64::from(u8::from(invoice.is_overdue())),
            _ => f64::from(u8::from(invoice.customer_type == CustomerType::Business)),
        }
    });
    let corr = stats::correlation(&data);

    CorrelationMatrix {
        labels: CORRELATION_LABELS.iter().map(|l| l.to_string()).collect(),
        values: corr.outer_iter().map(|row| row.to_vec()).collect(),
    }
}

// ---------------------------------------------------------------------------
// KPI panel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Signal {
    Good,
    Warn,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Kpi {
    pub metric: String,
    pub value: String,
    pub signal: Signal,
}

impl Kpi {
    fn new(metric: &str, value: String, signal: Signal) -> Self {
        Kpi {
            metric: metric.to_string(),
            value,
            signal,
        }
    }
}

fn alert_if(condition: bool) -> Signal {
    if condition {
        Signal::Warn
    } else {
        Signal::Good
    }
}

/// Executive summary rows derived from the other tables
pub fn kpi_panel(
    overview: &DatasetOverview,
    status: &StatusSummary,
    revenue: &RevenueSummary,
    due_days: &DueDaySummary,
    trend: &PeriodTrend,
    delinquency: &DelinquencySummary,
) -> Vec<Kpi> {
    let overdue_rate = status.overall.pct(Status::Overdue);
    let customers = delinquency.total_customers;
    let mut kpis = vec![
        Kpi::new("Total invoices", overview.invoices.to_string(), Signal::Neutral),
        Kpi::new("Distinct customers", customers.to_string(), Signal::Neutral),
        Kpi::new(
            "Overdue rate",
            format!("{overdue_rate:.1}%"),
            alert_if(overdue_rate >= OVERDUE_RATE_ALERT),
        ),
        Kpi::new(
            "Overdue amount",
            format_money(status.overdue_amount),
            alert_if(status.overdue_amount_pct >= OVERDUE_RATE_ALERT),
        ),
        Kpi::new(
            "Fully delinquent customers",
            format!(
                "{} ({:.1}%)",
                delinquency.fully_overdue,
                stats::rate(delinquency.fully_overdue, customers)
            ),
            alert_if(delinquency.fully_overdue > 0),
        ),
    ];

    let ticket = |ct| revenue.row(ct).map_or(0.0, |r| r.mean);
    let (business, individual) = (ticket(CustomerType::Business), ticket(CustomerType::Individual));
    let ratio = if individual > 0.0 {
        format!("{:.1}x", business / individual)
    } else {
        "n/a".to_string()
    };
    kpis.push(Kpi::new("Avg ticket PJ vs PF", ratio, Signal::Neutral));

    let day_kpi = |metric: &str, day: Option<&DueDayRate>, signal: Signal| match day {
        Some(d) => Kpi::new(metric, format!("Day {} ({:.1}%)", d.day, d.rate), signal),
        None => Kpi::new(metric, "n/a".to_string(), Signal::Neutral),
    };
    kpis.push(day_kpi("Best due day", due_days.best(), Signal::Good));
    kpis.push(day_kpi("Worst due day", due_days.worst(), Signal::Warn));

    let trend_signal = if trend.rate_delta > 0.0 {
        Signal::Warn
    } else if trend.rate_delta < 0.0 {
        Signal::Good
    } else {
        Signal::Neutral
    };
    kpis.push(Kpi::new(
        "Overdue trend",
        format!("{:+.1} p.p. over {} periods", trend.rate_delta, trend.rows.len()),
        trend_signal,
    ));

    kpis.push(Kpi::new(
        "Customers without overdue",
        format!(
            "{} ({:.1}%)",
            delinquency.without_overdue,
            stats::rate(delinquency.without_overdue, customers)
        ),
        Signal::Good,
    ));

    kpis
}

// ---------------------------------------------------------------------------
// Full report
// ---------------------------------------------------------------------------

/// Every summary table, computed once; console and charts only read from it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BillingReport {
    pub options: ReportOptions,
    pub overview: DatasetOverview,
    pub status: StatusSummary,
    pub consumption: ConsumptionSummary,
    pub revenue: RevenueSummary,
    pub due_days: DueDaySummary,
    pub trend: PeriodTrend,
    pub top_customers: Vec<TopCustomer>,
    /// Every (customer, type) group, for the consumption vs revenue scatter
    pub customer_totals: Vec<CustomerTotals>,
    pub delinquency: DelinquencySummary,
    pub correlation: CorrelationMatrix,
    pub kpis: Vec<Kpi>,
}

impl BillingReport {
    pub fn build(invoices: &[Invoice], options: &ReportOptions) -> Self {
        let overview = dataset_overview(invoices);
        let status = status_summary(invoices);
        let revenue = revenue_summary(invoices);
        let due_days =
            due_day_summary(invoices, options.min_due_day_invoices, options.busiest_due_days);
        let trend = period_trend(invoices);
        let delinquency = delinquency_summary(invoices);
        let kpis = kpi_panel(&overview, &status, &revenue, &due_days, &trend, &delinquency);

        BillingReport {
            options: options.clone(),
            consumption: consumption_summary(invoices),
            top_customers: top_customers(invoices, options.top_n),
            customer_totals: customer_totals(invoices),
            correlation: correlation_matrix(invoices),
            overview,
            status,
            revenue,
            due_days,
            trend,
            delinquency,
            kpis,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn period(month: u32) -> BillingPeriod {
        BillingPeriod::new(2021, month).unwrap()
    }

    fn invoice(
        id: &str,
        customer_type: CustomerType,
        amount: f64,
        day: u32,
        status: Status,
        kwh: f64,
        month: u32,
    ) -> Invoice {
        let due = NaiveDate::from_ymd_opt(2021, month, day).unwrap();
        Invoice::new(id, customer_type, amount, due, status, kwh, period(month))
    }

    fn pf(id: &str, amount: f64, status: Status) -> Invoice {
        invoice(id, CustomerType::Individual, amount, 10, status, 100.0, 6)
    }

    /// Mixed fixture: 2 types, 3 periods, several due days
    fn sample() -> Vec<Invoice> {
        use CustomerType::{Business, Individual};
        use Status::{Open, Overdue, Paid};
        vec![
            invoice("C1", Individual, 120.0, 10, Paid, 150.0, 6),
            invoice("C2", Business, 900.0, 10, Overdue, 1200.0, 6),
            invoice("C3", Individual, 80.0, 22, Paid, 90.0, 6),
            invoice("C1", Individual, 130.0, 10, Overdue, 160.0, 7),
            invoice("C2", Business, 950.0, 22, Paid, 1300.0, 7),
            invoice("C4", Individual, 60.0, 22, Overdue, 70.0, 7),
            invoice("C3", Individual, 85.0, 10, Open, 95.0, 8),
            invoice("C4", Individual, 65.0, 22, Overdue, 75.0, 8),
            invoice("C5", Business, 400.0, 27, Paid, 500.0, 8),
            invoice("C1", Individual, 125.0, 10, Paid, 155.0, 8),
        ]
    }

    #[test]
    fn test_status_summary_example() {
        let invoices = vec![
            pf("A", 100.0, Status::Paid),
            pf("B", 200.0, Status::Overdue),
            pf("C", 50.0, Status::Overdue),
        ];
        let summary = status_summary(&invoices);

        assert!((summary.overall.pct(Status::Paid) - 33.3).abs() < 0.1);
        assert!((summary.overall.pct(Status::Overdue) - 66.7).abs() < 0.1);
        assert_eq!(summary.overall.pct(Status::Open), 0.0);
        assert_eq!(summary.overdue_amount, 250.0);
        assert_eq!(summary.total_amount, 350.0);
        assert!((summary.overdue_amount_pct - 71.4).abs() < 0.1);
    }

    #[test]
    fn test_status_percentages_sum_to_hundred() {
        let summary = status_summary(&sample());
        let groups = std::iter::once(&summary.overall)
            .chain(summary.by_period.iter().map(|p| &p.breakdown));
        for breakdown in groups {
            let sum: f64 = breakdown.shares.iter().map(|s| s.pct).sum();
            assert!((sum - 100.0).abs() < 0.1, "sum was {sum}");
            assert_eq!(breakdown.shares.len(), 3);
        }
        let periods: Vec<_> = summary.by_period.iter().map(|p| p.period).collect();
        assert_eq!(periods, vec![period(6), period(7), period(8)]);
    }

    #[test]
    fn test_consumption_keeps_empty_groups() {
        let invoices = vec![pf("A", 10.0, Status::Paid), pf("B", 10.0, Status::Paid)];
        let summary = consumption_summary(&invoices);

        assert_eq!(summary.by_customer_type.len(), 2);
        let business = &summary.by_customer_type[1];
        assert_eq!(business.key, CustomerType::Business);
        assert_eq!(business.stats.count, 0);
        assert_eq!(business.stats.mean, 0.0);

        assert_eq!(summary.by_status.len(), 3);
        assert_eq!(summary.by_status[0].stats.count, 2);
        assert_eq!(summary.by_status[1].stats.count, 0);
        assert_eq!(summary.by_period.len(), 1);
    }

    #[test]
    fn test_consumption_statistics() {
        let summary = consumption_summary(&sample());
        let individual = &summary.by_customer_type[0].stats;
        assert_eq!(individual.count, 7);
        assert_eq!(individual.max, 160.0);
        assert_eq!(individual.median, 95.0);
        assert_eq!(individual.total, 795.0);

        let business = &summary.by_customer_type[1].stats;
        assert_eq!(business.median, 1200.0);
        assert_eq!(summary.histogram.iter().map(|b| b.count).sum::<usize>(), 10);
        assert_eq!(summary.distribution_by_type.len(), 2);
    }

    #[test]
    fn test_revenue_shares_sum_to_hundred() {
        let summary = revenue_summary(&sample());
        let sum: f64 = summary.rows.iter().map(|r| r.share_pct).sum();
        assert!((sum - 100.0).abs() < 0.1);

        let business = summary.row(CustomerType::Business).unwrap();
        assert_eq!(business.count, 3);
        assert_eq!(business.total, 2250.0);
        assert_eq!(business.median, 900.0);
        assert_eq!(business.overdue, 1);
        assert!((business.overdue_rate - 33.33).abs() < 0.01);
    }

    #[test]
    fn test_due_day_floor() {
        let mut invoices: Vec<Invoice> = (0..5)
            .map(|i| {
                let status = if i < 2 { Status::Overdue } else { Status::Paid };
                invoice("A", CustomerType::Individual, 10.0, 11, status, 1.0, 6)
            })
            .collect();
        invoices.extend((0..6).map(|i| {
            let status = if i < 3 { Status::Overdue } else { Status::Paid };
            invoice("B", CustomerType::Individual, 10.0, 27, status, 1.0, 6)
        }));
        invoices.push(invoice("C", CustomerType::Business, 10.0, 3, Status::Overdue, 1.0, 6));

        let summary = due_day_summary(&invoices, 5, 8);

        let volume_days: Vec<u32> = summary.volume.iter().map(|v| v.day).collect();
        assert_eq!(volume_days, vec![3, 11, 27]);

        let rate_days: Vec<u32> = summary.rates.iter().map(|r| r.day).collect();
        assert_eq!(rate_days, vec![27, 11]);
        assert!(summary.rates.iter().all(|r| r.count >= 5));
        assert_eq!(summary.worst().unwrap().day, 27);
        assert_eq!(summary.best().unwrap().day, 11);
        assert_eq!(summary.busiest[0].day, 27);
    }

    #[test]
    fn test_due_day_ties_pick_earliest_day() {
        let mut invoices = Vec::new();
        for (day, overdue) in [(20, 1), (14, 3), (8, 1), (26, 3)] {
            for i in 0..5 {
                let status = if i < overdue { Status::Overdue } else { Status::Paid };
                invoices.push(invoice("A", CustomerType::Individual, 10.0, day, status, 1.0, 6));
            }
        }

        let summary = due_day_summary(&invoices, 5, 8);
        let rate_days: Vec<u32> = summary.rates.iter().map(|r| r.day).collect();
        assert_eq!(rate_days, vec![14, 26, 8, 20]);
        assert_eq!(summary.worst().unwrap().day, 14);
        assert_eq!(summary.best().unwrap().day, 8);
    }

    #[test]
    fn test_period_trend_delta() {
        let mut invoices = Vec::new();
        // insertion order deliberately not chronological
        for (month, overdue) in [(8, 5), (6, 2), (7, 3)] {
            for i in 0..10 {
                let status = if i < overdue { Status::Overdue } else { Status::Paid };
                invoices.push(invoice("A", CustomerType::Individual, 10.0, 5, status, 1.0, month));
            }
        }

        let trend = period_trend(&invoices);
        let rates: Vec<f64> = trend.rows.iter().map(|r| r.rate).collect();
        assert_eq!(rates, vec![20.0, 30.0, 50.0]);
        assert!((trend.rate_delta - 30.0).abs() < 1e-9);
        assert_eq!(trend.rows[2].overdue_amount, 50.0);
    }

    #[test]
    fn test_single_period_has_no_delta() {
        let trend = period_trend(&[pf("A", 1.0, Status::Overdue)]);
        assert_eq!(trend.rows.len(), 1);
        assert_eq!(trend.rate_delta, 0.0);
    }

    #[test]
    fn test_top_customers_ranking() {
        let invoices = sample();
        let top = top_customers(&invoices, 10);

        // 5 distinct (id, type) groups
        assert_eq!(top.len(), 5);
        assert_eq!(top[0].totals.customer_id, "C2");
        assert_eq!(top[0].totals.total_amount, 1850.0);
        assert_eq!(top[0].rank, 1);
        assert_eq!(top[0].label, "VIP_01");
        assert!(top[0].totals.ever_overdue);
        assert_eq!(top[1].totals.customer_id, "C5");
        assert!(!top[1].totals.ever_overdue);
        for pair in top.windows(2) {
            assert!(pair[0].totals.total_amount > pair[1].totals.total_amount);
        }

        assert_eq!(top_customers(&invoices, 2).len(), 2);
    }

    #[test]
    fn test_top_customers_ties_keep_encounter_order() {
        let invoices = vec![
            pf("Z", 50.0, Status::Paid),
            pf("A", 50.0, Status::Paid),
            pf("M", 80.0, Status::Paid),
        ];
        let ids: Vec<String> = top_customers(&invoices, 10)
            .into_iter()
            .map(|c| c.totals.customer_id)
            .collect();
        assert_eq!(ids, vec!["M", "Z", "A"]);
    }

    #[test]
    fn test_delinquency_counts_are_consistent() {
        let summary = delinquency_summary(&sample());

        assert_eq!(summary.total_customers, 5);
        assert_eq!(summary.without_overdue + summary.with_overdue, summary.total_customers);
        assert_eq!(summary.without_overdue, 2); // C3, C5
        assert_eq!(summary.fully_overdue, 1); // C4
        assert_eq!(summary.partially_overdue, 2); // C1, C2
        assert_eq!(summary.majority_overdue, 1);
        assert_eq!(summary.max_overdue, 2);

        let distribution: Vec<(usize, usize)> = summary
            .distribution
            .iter()
            .map(|b| (b.overdue_invoices, b.customers))
            .collect();
        assert_eq!(distribution, vec![(0, 2), (1, 2), (2, 1)]);
        assert_eq!(
            summary.delinquent_rate_histogram.iter().map(|b| b.count).sum::<usize>(),
            3
        );
    }

    #[test]
    fn test_empty_input_does_not_divide_by_zero() {
        let report = BillingReport::build(&[], &ReportOptions::default());

        assert_eq!(report.overview.invoices, 0);
        assert_eq!(report.status.overall.pct(Status::Overdue), 0.0);
        assert_eq!(report.status.overdue_amount_pct, 0.0);
        assert!(report.revenue.rows.iter().all(|r| r.share_pct == 0.0));
        assert!(report.due_days.rates.is_empty());
        assert_eq!(report.trend.rate_delta, 0.0);
        assert!(report.top_customers.is_empty());
        assert_eq!(report.delinquency.total_customers, 0);
        assert!(report.kpis.iter().all(|k| !k.value.contains("NaN")));
    }

    #[test]
    fn test_correlation_matrix_shape() {
        let matrix = correlation_matrix(&sample());
        assert_eq!(matrix.labels.len(), 5);
        assert_eq!(matrix.values.len(), 5);
        for (i, row) in matrix.values.iter().enumerate() {
            assert_eq!(row[i], 1.0);
            assert!(row.iter().all(|v| (-1.0..=1.0).contains(v)));
        }
        // amount and business flag move together in the fixture
        assert!(matrix.values[0][4] > 0.8);
    }

    #[test]
    fn test_kpi_panel() {
        let report = BillingReport::build(&sample(), &ReportOptions::default());
        let find = |metric: &str| report.kpis.iter().find(|k| k.metric == metric).unwrap();

        assert_eq!(find("Total invoices").value, "10");
        assert_eq!(find("Overdue rate").value, "40.0%");
        assert_eq!(find("Overdue rate").signal, Signal::Warn);
        assert_eq!(find("Fully delinquent customers").value, "1 (20.0%)");
        assert_eq!(find("Customers without overdue").value, "2 (40.0%)");
    }

    #[test]
    fn test_report_is_idempotent() {
        let invoices = sample();
        let options = ReportOptions::default();
        assert_eq!(
            BillingReport::build(&invoices, &options),
            BillingReport::build(&invoices, &options)
        );
    }
}
