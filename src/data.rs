//! Billing file loading and invoice normalization using Polars

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use serde::{Serialize, Serializer};
use tracing::debug;

use crate::error::LoadError;

/// Customer category as recorded on the invoice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum CustomerType {
    /// Private person ("PF")
    Individual,
    /// Company ("PJ")
    Business,
}

impl CustomerType {
    pub const ALL: [CustomerType; 2] = [CustomerType::Individual, CustomerType::Business];

    /// Short code used in the source data and on charts
    pub fn code(self) -> &'static str {
        match self {
            CustomerType::Individual => "PF",
            CustomerType::Business => "PJ",
        }
    }
}

impl fmt::Display for CustomerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.code())
    }
}

impl FromStr for CustomerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pf" | "individual" | "pessoa fisica" | "pessoa física" => Ok(CustomerType::Individual),
            "pj" | "business" | "pessoa juridica" | "pessoa jurídica" => Ok(CustomerType::Business),
            other => Err(format!("unknown customer type `{other}`")),
        }
    }
}

/// Payment status of an invoice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Status {
    Paid,
    Overdue,
    Open,
}

impl Status {
    pub const ALL: [Status; 3] = [Status::Paid, Status::Overdue, Status::Open];

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Paid => "paid",
            Status::Overdue => "overdue",
            Status::Open => "open",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "paga" | "paid" => Ok(Status::Paid),
            "atrasada" | "overdue" => Ok(Status::Overdue),
            "em aberto" | "aberta" | "open" => Ok(Status::Open),
            other => Err(format!("unknown invoice status `{other}`")),
        }
    }
}

const MONTH_ABBREVIATIONS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Month names accepted in period labels (Portuguese and English)
const MONTH_NAMES: [(&str, u32); 19] = [
    ("jan", 1),
    ("fev", 2),
    ("feb", 2),
    ("mar", 3),
    ("abr", 4),
    ("apr", 4),
    ("mai", 5),
    ("may", 5),
    ("jun", 6),
    ("jul", 7),
    ("ago", 8),
    ("aug", 8),
    ("set", 9),
    ("sep", 9),
    ("out", 10),
    ("oct", 10),
    ("nov", 11),
    ("dez", 12),
    ("dec", 12),
];

/// Billing period (year + month); orders chronologically.
///
/// Only [`BillingPeriod::new`] and parsing build one, so `month` is always 1..=12.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BillingPeriod {
    year: i32,
    month: u32,
}

impl BillingPeriod {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(BillingPeriod { year, month })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// Compact chart label, e.g. `Jun/21`
    pub fn short_label(&self) -> String {
        format!(
            "{}/{:02}",
            MONTH_ABBREVIATIONS[(self.month - 1) as usize],
            self.year.rem_euclid(100)
        )
    }
}

impl fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&format!("{:04}-{:02}", self.year, self.month))
    }
}

impl Serialize for BillingPeriod {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

fn month_from_name(name: &str) -> Option<u32> {
    let name = name.to_lowercase();
    MONTH_NAMES
        .iter()
        .find(|(abbr, _)| name.starts_with(*abbr))
        .map(|&(_, month)| month)
}

fn expand_year(raw: &str) -> Option<i32> {
    let year: i32 = raw.parse().ok()?;
    match raw.len() {
        2 => Some(2000 + year),
        4 => Some(year),
        _ => None,
    }
}

fn is_year(raw: &str) -> bool {
    raw.len() == 4 && raw.chars().all(|c| c.is_ascii_digit())
}

fn parse_month(raw: &str) -> Option<u32> {
    raw.parse().ok().or_else(|| month_from_name(raw))
}

fn parse_day(raw: &str) -> Option<u32> {
    raw.parse().ok().filter(|day| (1..=31).contains(day))
}

fn period_from_parts(parts: &[&str]) -> Option<BillingPeriod> {
    match parts {
        [year, month] if is_year(year) => BillingPeriod::new(expand_year(year)?, parse_month(month)?),
        [month, year] => BillingPeriod::new(expand_year(year)?, parse_month(month)?),
        [year, month, day] if is_year(year) => {
            parse_day(day)?;
            BillingPeriod::new(expand_year(year)?, parse_month(month)?)
        }
        [day, month, year] if is_year(year) => {
            parse_day(day)?;
            BillingPeriod::new(expand_year(year)?, parse_month(month)?)
        }
        _ => None,
    }
}

impl FromStr for BillingPeriod {
    type Err = String;

    /// Accepts `2021-06`, `2021/06`, `202106`, `06/2021`, `jun/21`, `2021-06-01`
    /// and day-first dates such as `01/06/2021`.
    ///
    /// A three-part value must carry a four-digit year at either end;
    /// `01/06/21` is rejected as ambiguous.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let invalid = || format!("unrecognized billing period `{raw}`");

        if raw.len() == 6 && raw.chars().all(|c| c.is_ascii_digit()) {
            let year = raw[..4].parse().map_err(|_| invalid())?;
            let month = raw[4..].parse().map_err(|_| invalid())?;
            return BillingPeriod::new(year, month).ok_or_else(invalid);
        }

        let parts: Vec<&str> = raw
            .split(['-', '/', '.', ' '])
            .filter(|p| !p.is_empty())
            .collect();

        period_from_parts(&parts).ok_or_else(invalid)
    }
}

/// One billing event. Derived fields are computed on construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Invoice {
    pub customer_id: String,
    pub customer_type: CustomerType,
    pub amount: f64,
    pub due_date: NaiveDate,
    pub status: Status,
    pub energy_consumption: f64,
    pub billing_period: BillingPeriod,
    /// Day of month of `due_date`
    pub due_day: u32,
    /// `billing_period` as `YYYY-MM`
    pub period_label: String,
    /// Month of `due_date` as `YYYY-MM`
    pub due_month: String,
}

impl Invoice {
    pub fn new(
        customer_id: impl Into<String>,
        customer_type: CustomerType,
        amount: f64,
        due_date: NaiveDate,
        status: Status,
        energy_consumption: f64,
        billing_period: BillingPeriod,
    ) -> Self {
        Invoice {
            customer_id: customer_id.into(),
            customer_type,
            amount,
            due_date,
            status,
            energy_consumption,
            billing_period,
            due_day: due_date.day(),
            period_label: billing_period.to_string(),
            due_month: due_date.format("%Y-%m").to_string(),
        }
    }

    pub fn is_overdue(&self) -> bool {
        self.status == Status::Overdue
    }
}

/// Input columns with their accepted header names
#[derive(Debug, Clone, Copy)]
enum Field {
    CustomerId,
    CustomerType,
    Amount,
    DueDate,
    Status,
    Consumption,
    Period,
}

impl Field {
    const ALL: [Field; 7] = [
        Field::CustomerId,
        Field::CustomerType,
        Field::Amount,
        Field::DueDate,
        Field::Status,
        Field::Consumption,
        Field::Period,
    ];

    fn headers(self) -> [&'static str; 2] {
        match self {
            Field::CustomerId => ["id_cliente", "customer_id"],
            Field::CustomerType => ["tipo_cliente", "customer_type"],
            Field::Amount => ["valor_fatura", "amount"],
            Field::DueDate => ["data_vencimento", "due_date"],
            Field::Status => ["status_fatura", "status"],
            Field::Consumption => ["consumo_energia_kwh", "energy_consumption"],
            Field::Period => ["competencia", "billing_period"],
        }
    }

    fn name(self) -> &'static str {
        self.headers()[0]
    }
}

/// Parse a decimal-comma number such as `1.234,56` or `87,5`
pub fn parse_decimal(raw: &str) -> Result<f64, String> {
    let cleaned: String = raw.trim().chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.is_empty() {
        return Err("empty number".to_string());
    }
    let normalized = if cleaned.contains(',') {
        cleaned.replace('.', "").replace(',', ".")
    } else {
        cleaned
    };
    let value: f64 = normalized
        .parse()
        .map_err(|_| "not a decimal number".to_string())?;
    if !value.is_finite() {
        return Err("not a finite number".to_string());
    }
    Ok(value)
}

/// Parse a day-first date (`dd/mm/yyyy`, `dd-mm-yyyy`, `dd.mm.yyyy`) or ISO `yyyy-mm-dd`.
/// A trailing time component is ignored.
pub fn parse_due_date(raw: &str) -> Result<NaiveDate, String> {
    let date_part = raw.split_whitespace().next().unwrap_or("");
    ["%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%Y-%m-%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
        .filter(|date| date.year() >= 1000)
        .ok_or_else(|| "expected a day-first date such as 15/06/2021".to_string())
}

fn text_column<'a>(df: &'a DataFrame, field: Field) -> Result<&'a StringChunked, LoadError> {
    let column = field
        .headers()
        .iter()
        .find_map(|name| df.column(name).ok())
        .ok_or(LoadError::MissingColumn(field.name()))?;
    Ok(column.as_materialized_series().str()?)
}

fn cell<'a>(ca: &'a StringChunked, idx: usize, field: Field) -> Result<&'a str, LoadError> {
    match ca.get(idx).map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(LoadError::MissingValue {
            row: idx + 1,
            field: field.name(),
        }),
    }
}

fn non_negative(idx: usize, field: Field, raw: &str) -> Result<f64, LoadError> {
    let value = parse_decimal(raw).map_err(|e| LoadError::invalid(idx + 1, field.name(), raw, e))?;
    if value < 0.0 {
        return Err(LoadError::invalid(idx + 1, field.name(), raw, "must not be negative"));
    }
    Ok(value)
}

/// Convert a string-typed frame into validated invoices
pub fn invoices_from_frame(df: &DataFrame) -> Result<Vec<Invoice>, LoadError> {
    let [ids, types, amounts, dates, statuses, consumption, periods] =
        Field::ALL.map(|field| text_column(df, field));
    let (ids, types, amounts, dates, statuses, consumption, periods) =
        (ids?, types?, amounts?, dates?, statuses?, consumption?, periods?);

    let mut invoices = Vec::with_capacity(df.height());
    for idx in 0..df.height() {
        let row = idx + 1;

        let customer_id = cell(ids, idx, Field::CustomerId)?;

        let raw = cell(types, idx, Field::CustomerType)?;
        let customer_type = raw
            .parse::<CustomerType>()
            .map_err(|e| LoadError::invalid(row, Field::CustomerType.name(), raw, e))?;

        let amount = non_negative(idx, Field::Amount, cell(amounts, idx, Field::Amount)?)?;

        let raw = cell(dates, idx, Field::DueDate)?;
        let due_date =
            parse_due_date(raw).map_err(|e| LoadError::invalid(row, Field::DueDate.name(), raw, e))?;

        let raw = cell(statuses, idx, Field::Status)?;
        let status = raw
            .parse::<Status>()
            .map_err(|e| LoadError::invalid(row, Field::Status.name(), raw, e))?;

        let energy = non_negative(
            idx,
            Field::Consumption,
            cell(consumption, idx, Field::Consumption)?,
        )?;

        let raw = cell(periods, idx, Field::Period)?;
        let period = raw
            .parse::<BillingPeriod>()
            .map_err(|e| LoadError::invalid(row, Field::Period.name(), raw, e))?;

        invoices.push(Invoice::new(
            customer_id,
            customer_type,
            amount,
            due_date,
            status,
            energy,
            period,
        ));
    }

    Ok(invoices)
}

/// Load the semicolon-separated billing file and validate every row
///
/// All columns are read as text and parsed here, so decimal commas and
/// day-first dates are handled uniformly and errors can name the row.
///
/// # Arguments
/// * `file_path` - Path to the CSV file
///
/// # Returns
/// * Invoices in file order
pub fn load_invoices(file_path: impl AsRef<Path>) -> Result<Vec<Invoice>, LoadError> {
    let df = LazyCsvReader::new(file_path.as_ref())
        .with_separator(b';')
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .finish()?
        .collect()?;

    debug!(rows = df.height(), columns = df.width(), "billing file parsed");

    if df.height() == 0 {
        return Err(LoadError::Empty);
    }

    invoices_from_frame(&df)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_csv(rows: &[&str]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "id_cliente;tipo_cliente;valor_fatura;data_vencimento;status_fatura;consumo_energia_kwh;competencia"
        )
        .unwrap();
        for row in rows {
            writeln!(file, "{row}").unwrap();
        }
        file
    }

    #[test]
    fn test_load_invoices() {
        let file = create_test_csv(&[
            "C001;PF;150,75;10/06/2021;paga;210,5;2021-06",
            "C002;PJ;1.234,50;22/07/2021;atrasada;980;2021-07",
            "C001;PF;99,90;05/08/2021;em aberto;180;2021-08",
        ]);

        let invoices = load_invoices(file.path()).unwrap();
        assert_eq!(invoices.len(), 3);

        let first = &invoices[0];
        assert_eq!(first.customer_id, "C001");
        assert_eq!(first.customer_type, CustomerType::Individual);
        assert!((first.amount - 150.75).abs() < 1e-9);
        assert_eq!(first.due_day, 10);
        assert_eq!(first.period_label, "2021-06");
        assert_eq!(first.due_month, "2021-06");
        assert!((first.energy_consumption - 210.5).abs() < 1e-9);

        assert!((invoices[1].amount - 1234.5).abs() < 1e-9);
        assert_eq!(invoices[1].status, Status::Overdue);
        assert_eq!(invoices[2].status, Status::Open);
    }

    #[test]
    fn test_missing_column_is_reported() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "id_cliente;tipo_cliente;valor_fatura").unwrap();
        writeln!(file, "C001;PF;10,0").unwrap();

        let err = load_invoices(file.path()).unwrap_err();
        assert!(matches!(err, LoadError::MissingColumn("data_vencimento")));
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let file = create_test_csv(&["C001;PF;10,00;01/06/2021;cancelada;100;2021-06"]);

        let err = load_invoices(file.path()).unwrap_err();
        match err {
            LoadError::InvalidField { row, field, value, .. } => {
                assert_eq!(row, 1);
                assert_eq!(field, "status_fatura");
                assert_eq!(value, "cancelada");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_negative_amount_is_rejected() {
        let file = create_test_csv(&["C001;PF;-5,00;01/06/2021;paga;100;2021-06"]);
        let err = load_invoices(file.path()).unwrap_err();
        assert!(err.to_string().contains("valor_fatura"));
    }

    #[test]
    fn test_unparseable_date_names_field() {
        let file = create_test_csv(&["C001;PF;5,00;2021/31/31;paga;100;2021-06"]);
        let err = load_invoices(file.path()).unwrap_err();
        assert!(err.to_string().contains("data_vencimento"));
    }

    #[test]
    fn test_header_only_file_is_empty() {
        let file = create_test_csv(&[]);
        assert!(load_invoices(file.path()).is_err());
    }

    #[test]
    fn test_parse_decimal() {
        assert_eq!(parse_decimal("87,5").unwrap(), 87.5);
        assert_eq!(parse_decimal("1.234,56").unwrap(), 1234.56);
        assert_eq!(parse_decimal("42.25").unwrap(), 42.25);
        assert!(parse_decimal("").is_err());
        assert!(parse_decimal("abc").is_err());
    }

    #[test]
    fn test_parse_due_date_is_day_first() {
        let date = parse_due_date("03/04/2021").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2021, 4, 3).unwrap());
        let date = parse_due_date("2021-04-03 00:00:00").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2021, 4, 3).unwrap());
        assert!(parse_due_date("31/02/2021").is_err());
    }

    #[test]
    fn test_billing_period_formats() {
        let expected = BillingPeriod::new(2021, 6).unwrap();
        for raw in [
            "2021-06",
            "2021/06",
            "202106",
            "06/2021",
            "jun/21",
            "Jun/2021",
            "2021-06-01",
            "01/06/2021",
            "30.06.2021",
        ] {
            assert_eq!(raw.parse::<BillingPeriod>().unwrap(), expected, "{raw}");
        }
        assert_eq!("dez/20".parse::<BillingPeriod>().unwrap(), BillingPeriod::new(2020, 12).unwrap());
        assert!("2021-13".parse::<BillingPeriod>().is_err());
        assert!("junho".parse::<BillingPeriod>().is_err());
    }

    #[test]
    fn test_billing_period_day_first_dates() {
        let august = BillingPeriod::new(2021, 8).unwrap();
        assert_eq!("01-08-2021".parse::<BillingPeriod>().unwrap(), august);
        assert_eq!("15/ago/2021".parse::<BillingPeriod>().unwrap(), august);

        // two-digit year at the end leaves day and month order ambiguous
        assert!("01/06/21".parse::<BillingPeriod>().is_err());
        assert!("32/06/2021".parse::<BillingPeriod>().is_err());
        assert!("01/13/2021".parse::<BillingPeriod>().is_err());
        assert!("2021-06-40".parse::<BillingPeriod>().is_err());
    }

    #[test]
    fn test_billing_period_month_is_validated() {
        assert!(BillingPeriod::new(2021, 0).is_none());
        assert!(BillingPeriod::new(2021, 13).is_none());

        let labels: Vec<String> = (1..=12)
            .map(|month| BillingPeriod::new(2024, month).unwrap().short_label())
            .collect();
        assert_eq!(labels[0], "Jan/24");
        assert_eq!(labels[11], "Dec/24");

        let period = BillingPeriod::new(1999, 7).unwrap();
        assert_eq!((period.year(), period.month()), (1999, 7));
    }

    #[test]
    fn test_billing_period_orders_chronologically() {
        let mut periods: Vec<BillingPeriod> = ["2022-01", "2021-12", "2021-06"]
            .iter()
            .map(|p| p.parse().unwrap())
            .collect();
        periods.sort();
        let labels: Vec<String> = periods.iter().map(ToString::to_string).collect();
        assert_eq!(labels, ["2021-06", "2021-12", "2022-01"]);
        assert_eq!(periods[0].short_label(), "Jun/21");
    }
}
