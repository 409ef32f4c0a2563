//! Display formatting shared by the console report, the KPI panel and the charts

/// Currency with thousands separators, e.g. `R$ 23,715.40`
pub fn format_money(value: f64) -> String {
    let cents = (value.abs() * 100.0).round() as u64;
    let (units, cents) = (cents / 100, cents % 100);

    let digits = units.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if value < 0.0 { "-" } else { "" };
    format!("{sign}R$ {grouped}.{cents:02}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_money() {
        assert_eq!(format_money(0.0), "R$ 0.00");
        assert_eq!(format_money(23715.4), "R$ 23,715.40");
        assert_eq!(format_money(1234567.891), "R$ 1,234,567.89");
        assert_eq!(format_money(-12.5), "-R$ 12.50");
    }

    #[test]
    fn test_format_money_rounds_into_next_unit() {
        assert_eq!(format_money(999.999), "R$ 1,000.00");
        assert_eq!(format_money(100.0), "R$ 100.00");
    }
}
