use num_format::{Locale, ToFormattedString};

/// Format an amount with thousands separators and two decimals, e.g. `1,234.57`
pub fn format_amount(value: f64) -> String {
    if !value.is_finite() {
        return "N/A".to_string();
    }

    let total_cents = (value.abs() * 100.0).round() as u128;
    let whole = total_cents / 100;
    let cents = total_cents % 100;
    let sign = if value < 0.0 && total_cents > 0 { "-" } else { "" };

    format!("{}{}.{:02}", sign, whole.to_formatted_string(&Locale::en), cents)
}

/// Format an optional amount, `N/A` when missing
pub fn format_optional(value: Option<f64>) -> String {
    value.map(format_amount).unwrap_or_else(|| "N/A".to_string())
}

/// Format a percentage change with two decimals, `N/A` when missing
pub fn format_percent(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{:.2}%", v),
        _ => "N/A".to_string(),
    }
}
