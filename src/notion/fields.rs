//! Typed field wrappers and the day-record projection.
//!
//! The store types every property, so a bare number is never sent — each
//! value goes out wrapped in the shape its column type expects. The
//! projection is deterministic: same record in, byte-identical payload
//! out, which is what makes re-running a day a true no-op update.

use crate::metrics::round_dp;
use crate::models::{DayRecord, PERIODS_PER_DAY, columns};
use crate::notion::schema::PropKind;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::BTreeMap;

pub type FieldMap = BTreeMap<String, FieldValue>;

/// A property value in the wrapper shape its column type expects.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// `{"number": v}`
    Number(f64),
    /// `{"rich_text": [{"text": {"content": s}}]}`
    Text(String),
    /// `{"title": [{"text": {"content": s}}]}` — the natural key lives here.
    Title(String),
    /// `{"date": {"start": s}}`
    Date(String),
}

impl FieldValue {
    /// Does this wrapper agree with the column's declared type?
    pub fn matches(&self, kind: &PropKind) -> bool {
        matches!(
            (self, kind),
            (FieldValue::Number(_), PropKind::Number)
                | (FieldValue::Text(_), PropKind::RichText)
                | (FieldValue::Title(_), PropKind::Title)
                | (FieldValue::Date(_), PropKind::Date)
        )
    }
}

#[derive(serde::Serialize)]
struct TextContent<'a> {
    content: &'a str,
}

#[derive(serde::Serialize)]
struct TextNode<'a> {
    text: TextContent<'a>,
}

#[derive(serde::Serialize)]
struct DateStart<'a> {
    start: &'a str,
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            FieldValue::Number(value) => map.serialize_entry("number", value)?,
            FieldValue::Text(text) => map.serialize_entry(
                "rich_text",
                &[TextNode {
                    text: TextContent { content: text },
                }],
            )?,
            FieldValue::Title(text) => map.serialize_entry(
                "title",
                &[TextNode {
                    text: TextContent { content: text },
                }],
            )?,
            FieldValue::Date(date) => {
                map.serialize_entry("date", &DateStart { start: date })?
            }
        }
        map.end()
    }
}

/// Project a day record onto the remote columns.
///
/// Only present periods get columns; the rounding applied here is the
/// last time any value changes. Price periods beyond SP48 (long clock-
/// change days) have no column and are dropped.
pub fn day_fields(record: &DayRecord, station_name: &str) -> FieldMap {
    let date_str = record.key();
    let mut fields = FieldMap::new();

    fields.insert(columns::DATE.to_string(), FieldValue::Title(date_str.clone()));
    fields.insert(columns::RECORD_DATE.to_string(), FieldValue::Date(date_str));
    fields.insert(
        columns::TOTAL_KWH.to_string(),
        FieldValue::Number(round_dp(record.total_kwh, 4)),
    );

    for (period, kwh) in &record.generation {
        if *period <= PERIODS_PER_DAY {
            fields.insert(
                columns::sp_kwh(*period),
                FieldValue::Number(round_dp(*kwh, 4)),
            );
        }
    }
    for (period, ssp) in &record.price {
        if *period <= PERIODS_PER_DAY {
            fields.insert(
                columns::sp_ssp(*period),
                FieldValue::Number(round_dp(*ssp, 4)),
            );
        }
    }

    if let Some(revenue) = record.revenue_gbp {
        fields.insert(columns::REVENUE.to_string(), FieldValue::Number(revenue));
    }
    for (name, value) in &record.derived {
        fields.insert(name.clone(), FieldValue::Number(*value));
    }
    if !station_name.is_empty() {
        fields.insert(
            columns::STATION.to_string(),
            FieldValue::Text(station_name.to_string()),
        );
    }

    fields
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align;
    use serde_json::json;

    fn record() -> DayRecord {
        let generation: BTreeMap<u8, f64> = [(1, 2.0), (3, 1.25)].into();
        let price: BTreeMap<u8, f64> = [(1, 95.5), (49, 80.0)].into();
        align::align("2025-12-01".parse().unwrap(), generation, price)
    }

    #[test]
    fn test_wrapper_shapes() {
        assert_eq!(
            serde_json::to_value(FieldValue::Number(1.5)).unwrap(),
            json!({"number": 1.5})
        );
        assert_eq!(
            serde_json::to_value(FieldValue::Title("2025-12-01".to_string())).unwrap(),
            json!({"title": [{"text": {"content": "2025-12-01"}}]})
        );
        assert_eq!(
            serde_json::to_value(FieldValue::Text("Point Lane".to_string())).unwrap(),
            json!({"rich_text": [{"text": {"content": "Point Lane"}}]})
        );
        assert_eq!(
            serde_json::to_value(FieldValue::Date("2025-12-01".to_string())).unwrap(),
            json!({"date": {"start": "2025-12-01"}})
        );
    }

    #[test]
    fn test_wrapper_must_match_declared_kind() {
        assert!(FieldValue::Number(1.0).matches(&PropKind::Number));
        assert!(!FieldValue::Number(1.0).matches(&PropKind::RichText));
        assert!(FieldValue::Title("x".into()).matches(&PropKind::Title));
        assert!(!FieldValue::Text("x".into()).matches(&PropKind::Title));
        assert!(!FieldValue::Date("x".into()).matches(&PropKind::Formula));
    }

    #[test]
    fn test_projection_covers_present_periods_only() {
        let fields = day_fields(&record(), "Point Lane");

        assert_eq!(
            fields["Date"],
            FieldValue::Title("2025-12-01".to_string())
        );
        assert_eq!(fields["SP01_kWh"], FieldValue::Number(2.0));
        assert_eq!(fields["SP03_kWh"], FieldValue::Number(1.25));
        assert!(!fields.contains_key("SP02_kWh"));
        assert_eq!(fields["SP01_SSP"], FieldValue::Number(95.5));
        assert_eq!(fields["Total kWh"], FieldValue::Number(3.25));
        assert_eq!(
            fields["Station"],
            FieldValue::Text("Point Lane".to_string())
        );
    }

    #[test]
    fn test_projection_drops_periods_beyond_sp48() {
        let fields = day_fields(&record(), "");
        assert!(!fields.contains_key("SP49_SSP"));
        assert!(!fields.contains_key("Station"));
    }

    #[test]
    fn test_projection_is_deterministic() {
        let record = record();
        let first = serde_json::to_value(day_fields(&record, "Point Lane")).unwrap();
        let second = serde_json::to_value(day_fields(&record, "Point Lane")).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_blank_revenue_has_no_column() {
        let fields = day_fields(&record(), "");
        assert!(!fields.contains_key("Daily Revenue (£)"));
    }
}
