//! Integration tests for BillForge

use billforge::{load_invoices, render_report, BillingReport, LoadError, ReportOptions, Status};
use std::io::Write;
use tempfile::NamedTempFile;

const HEADER: &str =
    "id_cliente;tipo_cliente;valor_fatura;data_vencimento;status_fatura;consumo_energia_kwh;competencia";

/// Three billing periods of ten invoices with 2, 3 and 5 overdue respectively
fn create_test_csv() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{HEADER}").unwrap();

    let overdue_per_period = [2, 3, 5];
    let due_days = [5, 10, 15, 20, 25];
    for i in 0..30usize {
        let period = i / 10;
        let slot = i % 10;
        let month = 6 + period;
        let customer = i % 12;
        let customer_type = if customer % 3 == 0 { "PJ" } else { "PF" };
        let status = if slot < overdue_per_period[period] {
            "atrasada"
        } else if slot % 3 == 0 {
            "em aberto"
        } else {
            "paga"
        };
        writeln!(
            file,
            "C{:02};{};{},50;{:02}/{:02}/2021;{};{},25;2021-{:02}",
            customer + 1,
            customer_type,
            100 + i * 10,
            due_days[i % due_days.len()],
            month,
            status,
            200 + i * 15,
            month
        )
        .unwrap();
    }
    file
}

fn build_report() -> BillingReport {
    let test_file = create_test_csv();
    let invoices = load_invoices(test_file.path()).unwrap();
    BillingReport::build(&invoices, &ReportOptions::default())
}

#[test]
fn test_end_to_end_pipeline() {
    let test_file = create_test_csv();
    let invoices = load_invoices(test_file.path()).unwrap();
    assert_eq!(invoices.len(), 30);

    let report = BillingReport::build(&invoices, &ReportOptions::default());
    assert_eq!(report.overview.invoices, 30);
    assert_eq!(report.overview.customers, 12);
    assert_eq!(report.overview.periods.len(), 3);

    // 2 + 3 + 5 overdue out of 30
    assert_eq!(report.status.overall.count(Status::Overdue), 10);
    let pct_sum: f64 = report.status.overall.shares.iter().map(|s| s.pct).sum();
    assert!((pct_sum - 100.0).abs() < 0.1);

    let share_sum: f64 = report.revenue.rows.iter().map(|r| r.share_pct).sum();
    assert!((share_sum - 100.0).abs() < 0.1);

    let total: f64 = invoices.iter().map(|i| i.amount).sum();
    assert!((report.status.total_amount - total).abs() < 1e-6);
}

#[test]
fn test_period_trend() {
    let report = build_report();

    let rates: Vec<f64> = report.trend.rows.iter().map(|r| r.rate).collect();
    assert_eq!(rates, vec![20.0, 30.0, 50.0]);
    assert!((report.trend.rate_delta - 30.0).abs() < 1e-9);

    let labels: Vec<String> = report.trend.rows.iter().map(|r| r.period.to_string()).collect();
    assert_eq!(labels, vec!["2021-06", "2021-07", "2021-08"]);
}

#[test]
fn test_customer_rankings() {
    let report = build_report();

    assert_eq!(report.top_customers.len(), 10);
    assert_eq!(report.customer_totals.len(), 12);
    for pair in report.top_customers.windows(2) {
        assert!(pair[0].totals.total_amount >= pair[1].totals.total_amount);
        assert_eq!(pair[0].rank + 1, pair[1].rank);
    }

    let d = &report.delinquency;
    assert_eq!(d.without_overdue + d.with_overdue, d.total_customers);
    assert_eq!(d.total_customers, 12);
    let bucketed: usize = d.distribution.iter().map(|b| b.customers).sum();
    assert_eq!(bucketed, d.total_customers);
}

#[test]
fn test_due_day_floor() {
    let test_file = create_test_csv();
    let invoices = load_invoices(test_file.path()).unwrap();

    let options = ReportOptions {
        min_due_day_invoices: 7,
        ..ReportOptions::default()
    };
    let report = BillingReport::build(&invoices, &options);

    // every due day has exactly 6 invoices
    assert_eq!(report.due_days.volume.len(), 5);
    assert!(report.due_days.volume.iter().all(|v| v.count == 6));
    assert!(report.due_days.rates.is_empty());
}

#[test]
fn test_report_is_deterministic() {
    let first = build_report();
    let second = build_report();
    assert_eq!(first, second);
    assert_eq!(render_report(&first), render_report(&second));
}

#[test]
fn test_json_dump() {
    let report = build_report();
    let value = serde_json::to_value(&report).unwrap();

    assert_eq!(value["overview"]["invoices"], 30);
    assert_eq!(value["trend"]["rows"][0]["period"], "2021-06");
    assert_eq!(value["top_customers"][0]["label"], "VIP_01");
    assert!(value["kpis"].as_array().is_some_and(|kpis| !kpis.is_empty()));
}

#[test]
fn test_invalid_status_is_rejected() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{HEADER}").unwrap();
    writeln!(file, "C01;PF;10,00;05/06/2021;paga;100;2021-06").unwrap();
    writeln!(file, "C02;PF;10,00;05/06/2021;cancelada;100;2021-06").unwrap();

    let err = load_invoices(file.path()).unwrap_err();
    match err {
        LoadError::InvalidField { row, field, .. } => {
            assert_eq!(row, 2);
            assert_eq!(field, "status_fatura");
        }
        other => panic!("unexpected error: {other}"),
    }
}
