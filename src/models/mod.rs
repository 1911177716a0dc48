use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Number of half-hour settlement periods in a normal UK day.
///
/// Clock-change days have 46 or 50, but the export format and the remote
/// collection are both fixed at 48 columns; extra periods in the price
/// feed are carried in the record and dropped at the projection edge.
pub const PERIODS_PER_DAY: u8 = 48;

// ── Settlement period value ───────────────────────────────────────────────────

/// One settlement period's energy, unit-normalised to kWh.
///
/// `period` is 1-based (SP01..SP48) and assigned by row position in the
/// source export, not by any embedded timestamp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeriodValue {
    pub period: u8,
    pub kwh: f64,
}

// ── Day record ────────────────────────────────────────────────────────────────

/// A fully aligned day: generation and price series keyed by settlement
/// period, plus day-level aggregates.
///
/// Either series may be partial or empty — absent periods stay absent,
/// they are never imputed to zero. Treated as immutable once metric
/// enrichment has run.
#[derive(Debug, Clone, PartialEq)]
pub struct DayRecord {
    pub date: NaiveDate,
    pub generation: BTreeMap<u8, f64>,
    pub price: BTreeMap<u8, f64>,
    /// Sum of the generation values that are present. 40 periods of data
    /// give a 40-period total, not a guess at 48.
    pub total_kwh: f64,
    /// None when zero periods matched between generation and price.
    pub revenue_gbp: Option<f64>,
    /// Day-level metrics keyed by their remote column name.
    pub derived: BTreeMap<String, f64>,
}

impl DayRecord {
    /// The natural key under which this day is stored remotely.
    pub fn key(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }
}

// ── Remote column vocabulary ──────────────────────────────────────────────────

/// Column names in the remote collection. The date string doubles as the
/// natural key, held in the collection's title property.
pub mod columns {
    pub const DATE: &str = "Date";
    pub const RECORD_DATE: &str = "Record Date";
    pub const TOTAL_KWH: &str = "Total kWh";
    pub const REVENUE: &str = "Daily Revenue (£)";
    pub const PR: &str = "PR (%)";
    pub const SPECIFIC_YIELD: &str = "Specific Yield (kWh/kWp)";
    pub const AVAILABILITY: &str = "Availability (%)";
    pub const IRRADIANCE: &str = "Irradiance (kWh/m²)";
    pub const STATION: &str = "Station";

    /// Per-period generation column, e.g. `SP07_kWh`.
    pub fn sp_kwh(period: u8) -> String {
        format!("SP{:02}_kWh", period)
    }

    /// Per-period system sell price column, e.g. `SP07_SSP`.
    pub fn sp_ssp(period: u8) -> String {
        format!("SP{:02}_SSP", period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sp_column_names_are_zero_padded() {
        assert_eq!(columns::sp_kwh(1), "SP01_kWh");
        assert_eq!(columns::sp_kwh(48), "SP48_kWh");
        assert_eq!(columns::sp_ssp(7), "SP07_SSP");
    }

    #[test]
    fn test_day_record_key_is_iso_date() {
        let record = DayRecord {
            date: NaiveDate::from_ymd_opt(2025, 12, 1).unwrap(),
            generation: BTreeMap::new(),
            price: BTreeMap::new(),
            total_kwh: 0.0,
            revenue_gbp: None,
            derived: BTreeMap::new(),
        };
        assert_eq!(record.key(), "2025-12-01");
    }
}
