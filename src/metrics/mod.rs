//! Day-level derived metrics.
//!
//! Everything here is pure, and every output is rounded to a fixed number
//! of decimal places so that re-running a day writes byte-identical
//! values: percentages 2 dp, specific yield 3 dp, energy and money 4 dp.

use crate::config::SiteConfig;
use crate::models::{DayRecord, columns};
use std::collections::BTreeMap;

pub fn round_dp(value: f64, dp: i32) -> f64 {
    let factor = 10f64.powi(dp);
    (value * factor).round() / factor
}

/// Performance ratio in percent: actual yield over the yield a lossless
/// plant of this capacity would produce under the measured irradiance.
pub fn performance_ratio_pct(
    actual_kwh: f64,
    irradiance_kwh_m2: f64,
    capacity_kwp: f64,
) -> Option<f64> {
    if capacity_kwp <= 0.0 || irradiance_kwh_m2 <= 0.0 || actual_kwh < 0.0 {
        return None;
    }
    let expected = irradiance_kwh_m2 * capacity_kwp;
    Some(round_dp(actual_kwh / expected * 100.0, 2))
}

/// kWh produced per kWp installed.
pub fn specific_yield_kwh_kwp(actual_kwh: f64, capacity_kwp: f64) -> Option<f64> {
    if capacity_kwp <= 0.0 || actual_kwh < 0.0 {
        return None;
    }
    Some(round_dp(actual_kwh / capacity_kwp, 3))
}

/// Actual energy over expected energy, in percent.
pub fn energy_availability_pct(actual_kwh: f64, expected_kwh: f64) -> Option<f64> {
    if expected_kwh <= 0.0 || actual_kwh < 0.0 {
        return None;
    }
    Some(round_dp(actual_kwh / expected_kwh * 100.0, 2))
}

/// Revenue at system sell price over the periods present in both series.
///
/// kWh → MWh, times £/MWh, summed. Periods missing from either side
/// contribute nothing. None when not a single period matched — no price
/// data and no overlap are deliberately indistinguishable here; callers
/// log the difference.
pub fn daily_revenue_gbp(generation: &BTreeMap<u8, f64>, price: &BTreeMap<u8, f64>) -> Option<f64> {
    let mut total = 0.0;
    let mut matched = 0usize;
    for (period, kwh) in generation {
        if let Some(ssp) = price.get(period) {
            total += (kwh / 1000.0) * ssp;
            matched += 1;
        }
    }
    if matched == 0 {
        None
    } else {
        Some(round_dp(total, 4))
    }
}

/// Fill in revenue and the derived metric columns.
///
/// Consumes and returns the record; after this it is treated as frozen.
/// Metrics that cannot be computed (no capacity, no irradiance, guard
/// failure) are simply left out of the map rather than written as zero.
pub fn enrich(mut record: DayRecord, site: &SiteConfig, irradiance_kwh_m2: Option<f64>) -> DayRecord {
    record.revenue_gbp = daily_revenue_gbp(&record.generation, &record.price);

    let mut derived = BTreeMap::new();
    if let Some(irr) = irradiance_kwh_m2 {
        derived.insert(columns::IRRADIANCE.to_string(), round_dp(irr, 3));
    }
    if let Some(capacity) = site.capacity_kwp {
        if let Some(sy) = specific_yield_kwh_kwp(record.total_kwh, capacity) {
            derived.insert(columns::SPECIFIC_YIELD.to_string(), sy);
        }
        if let Some(irr) = irradiance_kwh_m2 {
            if let Some(pr) = performance_ratio_pct(record.total_kwh, irr, capacity) {
                derived.insert(columns::PR.to_string(), pr);
            }
            if let Some(avail) = energy_availability_pct(record.total_kwh, irr * capacity) {
                derived.insert(columns::AVAILABILITY.to_string(), avail);
            }
        }
    }
    record.derived = derived;
    record
}

// ── Tests ─────────────────────────────────────────────────────────────────────
