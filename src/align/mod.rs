//! Merge the generation and price series for one day into a single record.

use crate::models::{DayRecord, PeriodValue};
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Key parser output by settlement period.
pub fn series_map(values: &[PeriodValue]) -> BTreeMap<u8, f64> {
    values.iter().map(|v| (v.period, v.kwh)).collect()
}

/// Build the day record from the two per-period series.
///
/// Either side may be partial or empty. The total covers present
/// generation values only — a 40-period day totals 40 periods, nothing
/// is imputed. Revenue and derived metrics are filled in later by
/// metric enrichment.
pub fn align(date: NaiveDate, generation: BTreeMap<u8, f64>, price: BTreeMap<u8, f64>) -> DayRecord {
    let total_kwh = generation.values().sum();
    DayRecord {
        date,
        generation,
        price,
        total_kwh,
        revenue_gbp: None,
        derived: BTreeMap::new(),
    }
}
