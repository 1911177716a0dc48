//! Optional site-report sidecar.
//!
//! The portal's monthly report export (produced out-of-band, like the
//! interval CSVs) carries one row per day with an irradiance column.
//! Only irradiance is read here; it feeds performance ratio and
//! availability. No sidecar simply means those columns stay blank.

use crate::error::ParseError;
use crate::loader::parse_number;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::path::Path;

/// Load per-day irradiance (kWh/m²) from a report CSV.
///
/// The date column is `Date`; the irradiance column is whichever header
/// mentions irradiance. Unusable rows are skipped.
pub fn load_irradiance(path: &Path) -> Result<BTreeMap<NaiveDate, f64>, ParseError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;

    let headers = reader.headers()?.clone();
    let date_col = headers.iter().position(|h| h.trim() == "Date");
    let irr_col = headers
        .iter()
        .position(|h| h.to_lowercase().contains("irradiance"));
    let (Some(date_col), Some(irr_col)) = (date_col, irr_col) else {
        return Err(ParseError::MissingReportColumns);
    };

    let mut out = BTreeMap::new();
    for result in reader.records() {
        let Ok(record) = result else { continue };
        let Some(date) = record.get(date_col).and_then(parse_report_date) else {
            continue;
        };
        if let Some(value) = record.get(irr_col).and_then(parse_number) {
            out.insert(date, value);
        }
    }
    Ok(out)
}

fn parse_report_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%d/%m/%Y"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_irradiance_by_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");
        std::fs::write(
            &path,
            "Date,PV Yield (kWh),Irradiance (kWh/m²)\n2025-12-01,410.2,1.85\n02/12/2025,395.0,1.62\nbad-date,1,1\n",
        )
        .unwrap();

        let map = load_irradiance(&path).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map[&"2025-12-01".parse().unwrap()], 1.85);
        assert_eq!(map[&"2025-12-02".parse().unwrap()], 1.62);
    }

    #[test]
    fn test_no_irradiance_column_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");
        std::fs::write(&path, "Date,PV Yield (kWh)\n2025-12-01,410.2\n").unwrap();
        assert!(load_irradiance(&path).is_err());
    }
}
