//! Formatting helpers for exported tables.
//!
//! Dashboards and spreadsheets built on these reports expect Spanish labels,
//! `SÍ`/`NO` flags and empty strings (never `0` or `null`) for cells whose
//! value is undefined.

use chrono::{DateTime, Utc};

/// Weekday labels, Monday first, matching `Weekday::num_days_from_monday`.
pub const WEEKDAYS: [&str; 7] = [
    "Lunes",
    "Martes",
    "Miércoles",
    "Jueves",
    "Viernes",
    "Sábado",
    "Domingo",
];

/// Boolean flag rendered the way the reports spell it.
pub fn si_no(value: bool) -> &'static str {
    if value {
        "SÍ"
    } else {
        "NO"
    }
}

/// Percentage with one decimal and a `%` suffix, e.g. `33.3%`.
pub fn pct_1(value: f64) -> String {
    format!("{:.1}%", value)
}

/// Round to the nearest integer, halves away from zero.
pub fn round_i64(value: f64) -> i64 {
    value.round() as i64
}

/// Timestamp in the `YYYY-MM-DD HH:MM:SS` shape the exports use.
pub fn fmt_datetime(value: &DateTime<Utc>) -> String {
    value.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Date-only rendering.
pub fn fmt_date(value: &DateTime<Utc>) -> String {
    value.format("%Y-%m-%d").to_string()
}

/// Integer cell; undefined renders empty.
pub fn fmt_opt_int(value: Option<i64>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => String::new(),
    }
}

/// Text cell; undefined renders empty.
pub fn fmt_opt_str(value: Option<&str>) -> String {
    value.unwrap_or_default().to_string()
}

/// Date cell; undefined renders empty.
pub fn fmt_opt_date(value: Option<&DateTime<Utc>>) -> String {
    value.map(fmt_date).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn si_no_spelling() {
        assert_eq!(si_no(true), "SÍ");
        assert_eq!(si_no(false), "NO");
    }

    #[test]
    fn pct_keeps_one_decimal() {
        assert_eq!(pct_1(33.333333), "33.3%");
        assert_eq!(pct_1(100.0), "100.0%");
        assert_eq!(pct_1(0.0), "0.0%");
    }

    #[test]
    fn rounding_is_half_away_from_zero() {
        assert_eq!(round_i64(2.5), 3);
        assert_eq!(round_i64(2.4), 2);
        assert_eq!(round_i64(-1.5), -2);
    }

    #[test]
    fn datetime_rendering() {
        let dt = Utc.with_ymd_and_hms(2025, 3, 9, 14, 5, 0).unwrap();
        assert_eq!(fmt_datetime(&dt), "2025-03-09 14:05:00");
        assert_eq!(fmt_date(&dt), "2025-03-09");
    }

    #[test]
    fn undefined_cells_render_empty() {
        assert_eq!(fmt_opt_int(None), "");
        assert_eq!(fmt_opt_int(Some(7)), "7");
        assert_eq!(fmt_opt_str(None), "");
        assert_eq!(fmt_opt_date(None), "");
    }

    #[test]
    fn weekday_labels_start_monday() {
        assert_eq!(WEEKDAYS[0], "Lunes");
        assert_eq!(WEEKDAYS[6], "Domingo");
    }
}
