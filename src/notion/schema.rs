//! Process-lifetime cache of the remote collection's property types.
//!
//! The schema is fetched once per collection per process and never
//! refreshed mid-run — a sync writes the same columns hundreds of times
//! and must not re-introspect per write. When the fetch fails the cache
//! stores a fail-open sentinel instead: a flapping introspection endpoint
//! must never block data writes, the store itself will reject anything
//! truly unwritable.

use crate::error::{NotionError, NotionResult};
use crate::models::{PERIODS_PER_DAY, columns};
use crate::notion::NotionClient;
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

// ── Property kinds ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropKind {
    Title,
    RichText,
    Number,
    Date,
    Formula,
    Other(String),
}

impl PropKind {
    pub fn from_type(type_name: &str) -> Self {
        match type_name {
            "title" => PropKind::Title,
            "rich_text" => PropKind::RichText,
            "number" => PropKind::Number,
            "date" => PropKind::Date,
            "formula" => PropKind::Formula,
            other => PropKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PropKind::Title => "title",
            PropKind::RichText => "rich_text",
            PropKind::Number => "number",
            PropKind::Date => "date",
            PropKind::Formula => "formula",
            PropKind::Other(name) => name,
        }
    }

    /// Wire payload for adding a property of this kind, where that is
    /// something we ever do.
    fn creation_payload(&self) -> Option<Value> {
        match self {
            PropKind::Number => Some(json!({"number": {}})),
            PropKind::RichText => Some(json!({"rich_text": {}})),
            PropKind::Date => Some(json!({"date": {}})),
            _ => None,
        }
    }
}

// ── Snapshot ──────────────────────────────────────────────────────────────────

/// What we know about the collection's schema.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaSnapshot {
    /// Introspection failed; every field is treated as writable.
    Unknown,
    Known(BTreeMap<String, PropKind>),
}

impl SchemaSnapshot {
    /// Decode a `GET /v1/databases/{id}` body. A response without a
    /// `properties` object is treated as unknown rather than as an empty
    /// schema — an empty schema would silently drop every field.
    pub fn from_response(body: &Value) -> Self {
        let Some(properties) = body["properties"].as_object() else {
            warn!("schema response has no properties object");
            return SchemaSnapshot::Unknown;
        };

        let props = properties
            .iter()
            .map(|(name, prop)| {
                let kind = prop["type"]
                    .as_str()
                    .map(PropKind::from_type)
                    .unwrap_or_else(|| PropKind::Other("unknown".to_string()));
                (name.clone(), kind)
            })
            .collect();
        SchemaSnapshot::Known(props)
    }

    /// Whether a field may be written: unknown schema → yes (fail-open);
    /// known schema → the field must exist and not be a computed formula.
    pub fn can_write(&self, field: &str) -> bool {
        match self {
            SchemaSnapshot::Unknown => true,
            SchemaSnapshot::Known(props) => {
                matches!(props.get(field), Some(kind) if *kind != PropKind::Formula)
            }
        }
    }

    pub fn kind(&self, field: &str) -> Option<&PropKind> {
        match self {
            SchemaSnapshot::Unknown => None,
            SchemaSnapshot::Known(props) => props.get(field),
        }
    }
}

// ── Cache ─────────────────────────────────────────────────────────────────────

/// One snapshot per collection id, fetched at most once per process.
///
/// The map is behind a plain mutex with write-once semantics per key;
/// the fetch itself happens outside the lock, so the lock is never held
/// across an await.
pub struct SchemaCache {
    inner: Mutex<HashMap<String, SchemaSnapshot>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get_or_fetch(
        &self,
        client: &NotionClient,
        collection_id: &str,
    ) -> SchemaSnapshot {
        if let Some(snapshot) = self.peek(collection_id) {
            return snapshot;
        }

        let snapshot = match client.collection_schema(collection_id).await {
            Ok(body) => {
                let snapshot = SchemaSnapshot::from_response(&body);
                if let SchemaSnapshot::Known(props) = &snapshot {
                    debug!("schema for {}: {} properties", collection_id, props.len());
                }
                snapshot
            }
            Err(e) => {
                warn!(
                    "schema introspection failed for {}: {} — treating all fields as writable",
                    collection_id, e
                );
                SchemaSnapshot::Unknown
            }
        };

        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner
            .entry(collection_id.to_string())
            .or_insert(snapshot)
            .clone()
    }

    /// Explicit cache-bust, used after the schema itself is changed.
    pub fn invalidate(&self, collection_id: &str) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.remove(collection_id);
    }

    fn peek(&self, collection_id: &str) -> Option<SchemaSnapshot> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.get(collection_id).cloned()
    }
}

impl Default for SchemaCache {
    fn default() -> Self {
        Self::new()
    }
}

// ── Expected columns ──────────────────────────────────────────────────────────

/// Every column the projection can produce, with the kind it should have.
/// The title property is owned by the collection and never created here.
pub fn expected_columns() -> Vec<(String, PropKind)> {
    let mut cols = vec![
        (columns::TOTAL_KWH.to_string(), PropKind::Number),
        (columns::REVENUE.to_string(), PropKind::Number),
        (columns::PR.to_string(), PropKind::Number),
        (columns::SPECIFIC_YIELD.to_string(), PropKind::Number),
        (columns::AVAILABILITY.to_string(), PropKind::Number),
        (columns::IRRADIANCE.to_string(), PropKind::Number),
        (columns::STATION.to_string(), PropKind::RichText),
        (columns::RECORD_DATE.to_string(), PropKind::Date),
    ];
    for period in 1..=PERIODS_PER_DAY {
        cols.push((columns::sp_kwh(period), PropKind::Number));
        cols.push((columns::sp_ssp(period), PropKind::Number));
    }
    cols
}

/// Build the `PATCH /v1/databases/{id}` payload for columns the snapshot
/// does not have yet.
pub fn missing_column_payload(snapshot: &SchemaSnapshot) -> NotionResult<(usize, Value)> {
    let SchemaSnapshot::Known(props) = snapshot else {
        return Err(NotionError::Decode(
            "cannot diff columns against an unknown schema".to_string(),
        ));
    };

    let mut payload = serde_json::Map::new();
    for (name, kind) in expected_columns() {
        if props.contains_key(&name) {
            continue;
        }
        if let Some(body) = kind.creation_payload() {
            payload.insert(name, body);
        }
    }
    Ok((payload.len(), Value::Object(payload)))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
