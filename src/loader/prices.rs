//! Settlement system-price CSVs: per-day files plus a combined fallback.
//!
//! The daily file wins when it yields data. When it is missing or empty
//! the combined multi-day CSV is consulted instead; that file is parsed
//! once per process and cached, because it grows without bound and the
//! pipeline may ask for dozens of dates in one run.

use crate::error::ParseError;
use crate::loader::parse_number;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Series keyed by settlement date, then by settlement period.
pub type PricesByDate = HashMap<NaiveDate, BTreeMap<u8, f64>>;

/// File name for one day's price CSV, e.g. `system_prices_2025-12-01.csv`.
pub fn daily_csv_name(date: NaiveDate) -> String {
    format!("system_prices_{}.csv", date.format("%Y-%m-%d"))
}

pub struct PriceStore {
    daily_dir: PathBuf,
    combined_path: PathBuf,
    combined: OnceLock<PricesByDate>,
}

impl PriceStore {
    pub fn new(daily_dir: impl Into<PathBuf>, combined_path: impl Into<PathBuf>) -> Self {
        Self {
            daily_dir: daily_dir.into(),
            combined_path: combined_path.into(),
            combined: OnceLock::new(),
        }
    }

    pub fn daily_path(&self, date: NaiveDate) -> PathBuf {
        self.daily_dir.join(daily_csv_name(date))
    }

    /// Load the system sell price series for one day.
    ///
    /// Prices are best-effort: every failure path degrades to an empty
    /// series, which downstream turns into a blank revenue column.
    pub fn load_day(&self, date: NaiveDate) -> BTreeMap<u8, f64> {
        let daily = self.daily_path(date);
        if daily.is_file() {
            match parse_price_csv(&daily) {
                Ok(by_date) => {
                    if let Some(series) = by_date.get(&date) {
                        if !series.is_empty() {
                            return series.clone();
                        }
                    }
                    debug!("{:?} had no usable rows for {}", daily, date);
                }
                Err(e) => warn!("could not parse {:?}: {}", daily, e),
            }
        }
        self.combined().get(&date).cloned().unwrap_or_default()
    }

    fn combined(&self) -> &PricesByDate {
        self.combined.get_or_init(|| {
            if !self.combined_path.is_file() {
                return PricesByDate::new();
            }
            match parse_price_csv(&self.combined_path) {
                Ok(map) => {
                    info!("combined price cache loaded: {} dates", map.len());
                    map
                }
                Err(e) => {
                    warn!("could not parse {:?}: {}", self.combined_path, e);
                    PricesByDate::new()
                }
            }
        })
    }
}

/// Parse a system-prices CSV into per-date series.
///
/// Columns are found by header name so the feed can reorder or add
/// columns without breaking us. Rows with a bad date, period or price
/// are skipped.
pub fn parse_price_csv(path: &Path) -> Result<PricesByDate, ParseError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;

    let headers = reader.headers()?.clone();
    let col = |name: &str| headers.iter().position(|h| h.trim() == name);
    let (Some(date_col), Some(period_col), Some(price_col)) = (
        col("SettlementDate"),
        col("SettlementPeriod"),
        col("SystemSellPrice"),
    ) else {
        return Err(ParseError::MissingPriceColumns);
    };

    let mut out = PricesByDate::new();
    for result in reader.records() {
        let Ok(record) = result else { continue };

        let Some(date) = record
            .get(date_col)
            .and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok())
        else {
            continue;
        };
        let Some(period) = record
            .get(period_col)
            .and_then(|s| s.trim().parse::<u8>().ok())
            .filter(|p| *p >= 1)
        else {
            continue;
        };
        let Some(price) = record.get(price_col).and_then(parse_number) else {
            continue;
        };

        out.entry(date).or_default().insert(period, price);
    }
    Ok(out)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
