//! Loader for half-hourly generation CSV exports.
//!
//! The export carries a few metadata rows, then a header row whose first
//! cell is `Period`, then up to 48 data rows — one per half-hour, in
//! chronological order. Not every row is labelled, so the settlement
//! period index comes from row position alone.

pub mod prices;
pub mod report;

use crate::error::ParseError;
use crate::models::{PERIODS_PER_DAY, PeriodValue};
use csv::StringRecord;
use std::path::Path;
use tracing::debug;

/// Unit of the value column, read off the header row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitHint {
    /// Mean power in kW over the half hour; ×0.5 converts to kWh.
    PowerKw,
    /// Energy already in kWh, used as-is.
    EnergyKwh,
}

impl UnitHint {
    /// "Active Power (kW)" → power; "Active Energy (kWh)" → energy.
    /// `kwh` contains `kw`, so the power case requires both words.
    pub fn from_header(value_header: &str) -> Self {
        let h = value_header.to_lowercase();
        if h.contains("power") && h.contains("kw") {
            UnitHint::PowerKw
        } else {
            UnitHint::EnergyKwh
        }
    }

    fn to_kwh(self, raw: f64) -> f64 {
        match self {
            UnitHint::PowerKw => raw * 0.5,
            UnitHint::EnergyKwh => raw,
        }
    }
}

/// Read and parse one day's interval export from disk.
pub fn parse_interval_file(path: &Path) -> Result<Vec<PeriodValue>, ParseError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_interval_csv(&raw)
}

/// Parse a raw interval export into per-period energy values.
///
/// Unit conversion happens exactly once, here. Rows with an unparseable
/// value cell are skipped — missing data stays missing, it is never
/// written as zero — but they still consume their position so the periods
/// after them keep the right index. Rows beyond 48 are ignored, which
/// keeps trailing footer rows out of the data.
pub fn parse_interval_csv(raw: &str) -> Result<Vec<PeriodValue>, ParseError> {
    let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(raw.as_bytes());

    let mut records: Vec<StringRecord> = Vec::new();
    for result in reader.records() {
        records.push(result?);
    }

    let header_idx = records
        .iter()
        .position(is_header_row)
        .ok_or(ParseError::MissingHeader)?;
    let hint = UnitHint::from_header(records[header_idx].get(1).unwrap_or(""));
    debug!("header at row {}, unit hint {:?}", header_idx, hint);

    let values = parse_data_rows(&records[header_idx + 1..], hint);
    if values.is_empty() {
        return Err(ParseError::Empty);
    }
    Ok(values)
}

fn is_header_row(record: &StringRecord) -> bool {
    record
        .get(0)
        .map(|c| c.trim().eq_ignore_ascii_case("period"))
        .unwrap_or(false)
}

fn parse_data_rows(rows: &[StringRecord], hint: UnitHint) -> Vec<PeriodValue> {
    let mut values = Vec::new();
    let mut position: u8 = 0;

    for row in rows {
        let label = row.get(0).map(str::trim).unwrap_or("");
        if label.is_empty() {
            // Spacer rows do not consume a position
            continue;
        }
        if position >= PERIODS_PER_DAY {
            break;
        }
        position += 1;

        match row.get(1).and_then(parse_number) {
            Some(raw) => values.push(PeriodValue {
                period: position,
                kwh: hint.to_kwh(raw),
            }),
            None => debug!("period {}: unparseable value cell, skipping", position),
        }
    }

    values
}

/// Parse a numeric cell: strip thousands separators, tolerate blanks and
/// placeholder dashes.
pub fn parse_number(s: &str) -> Option<f64> {
    let s = s.trim().replace(',', "");
    if s.is_empty() || s == "-" || s == "—" {
        return None;
    }
    s.parse().ok()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn export(value_header: &str, rows: &[&str]) -> String {
        let mut out = String::from("Site,Point Lane\nExported,2025-12-02 06:10\n\n");
        out.push_str(&format!("Period,{}\n", value_header));
        for row in rows {
            out.push_str(row);
            out.push('\n');
        }
        out
    }

    fn power_rows(n: usize, value: &str) -> Vec<String> {
        (0..n)
            .map(|i| format!("Mon 01/12/2025 {:02}:{:02},{}", i / 2, (i % 2) * 30, value))
            .collect()
    }

    #[test]
    fn test_power_header_converts_to_kwh() {
        let rows = power_rows(48, "2.0");
        let refs: Vec<&str> = rows.iter().map(String::as_str).collect();
        let csv = export("Active Power (kW)", &refs);

        let values = parse_interval_csv(&csv).unwrap();
        assert_eq!(values.len(), 48);
        assert!(values.iter().all(|v| v.kwh == 1.0));
        assert_eq!(values[0].period, 1);
        assert_eq!(values[47].period, 48);
    }

    #[test]
    fn test_energy_header_passes_through() {
        let csv = export("Active Energy (kWh)", &["a,3.5", "b,4.5"]);
        let values = parse_interval_csv(&csv).unwrap();
        assert_eq!(values[0].kwh, 3.5);
        assert_eq!(values[1].kwh, 4.5);
    }

    #[test]
    fn test_unit_hint_requires_both_words() {
        assert_eq!(UnitHint::from_header("Active Power (kW)"), UnitHint::PowerKw);
        assert_eq!(UnitHint::from_header("Consumption (kWh)"), UnitHint::EnergyKwh);
        assert_eq!(UnitHint::from_header("Power factor"), UnitHint::EnergyKwh);
    }

    #[test]
    fn test_short_day_keeps_only_present_periods() {
        let rows = power_rows(40, "1.0");
        let refs: Vec<&str> = rows.iter().map(String::as_str).collect();
        let values = parse_interval_csv(&export("Active Power (kW)", &refs)).unwrap();
        assert_eq!(values.len(), 40);
    }

    #[test]
    fn test_bad_value_skipped_but_position_consumed() {
        let csv = export("Active Energy (kWh)", &["a,1.0", "b,n/a", "c,3.0"]);
        let values = parse_interval_csv(&csv).unwrap();
        let periods: Vec<u8> = values.iter().map(|v| v.period).collect();
        assert_eq!(periods, vec![1, 3]);
    }

    #[test]
    fn test_blank_rows_do_not_consume_positions() {
        let csv = export("Active Energy (kWh)", &["a,1.0", ",", "b,2.0"]);
        let values = parse_interval_csv(&csv).unwrap();
        let periods: Vec<u8> = values.iter().map(|v| v.period).collect();
        assert_eq!(periods, vec![1, 2]);
    }

    #[test]
    fn test_truncates_at_48_rows() {
        let mut rows = power_rows(48, "1.0");
        rows.push("Total,9999".to_string());
        rows.push("Exported by,portal".to_string());
        let refs: Vec<&str> = rows.iter().map(String::as_str).collect();
        let values = parse_interval_csv(&export("Active Power (kW)", &refs)).unwrap();
        assert_eq!(values.len(), 48);
        assert!(values.iter().all(|v| v.kwh < 100.0));
    }

    #[test]
    fn test_missing_header_is_an_error() {
        let err = parse_interval_csv("Site,Point Lane\na,1.0\n").unwrap_err();
        assert!(matches!(err, ParseError::MissingHeader));
    }

    #[test]
    fn test_zero_parsable_rows_is_an_error() {
        let csv = export("Active Power (kW)", &["a,n/a", "b,-"]);
        assert!(matches!(parse_interval_csv(&csv), Err(ParseError::Empty)));
    }

    #[test]
    fn test_bom_and_thousands_separators() {
        let csv = format!("\u{feff}{}", export("Active Energy (kWh)", &["a,\"1,234.5\""]));
        let values = parse_interval_csv(&csv).unwrap();
        assert_eq!(values[0].kwh, 1234.5);
    }
}
