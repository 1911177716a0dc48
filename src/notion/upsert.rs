//! Natural-key upsert against the remote collection.
//!
//! The flow per record is lookup → create or update. The pair is not
//! transactional; the single-writer deployment is what keeps a
//! concurrent create-create race out of scope. When duplicates do exist
//! the lookup takes the first match and later writes converge on it.

use crate::error::NotionResult;
use crate::models::columns;
use crate::notion::NotionClient;
use crate::notion::fields::FieldMap;
use crate::notion::schema::{SchemaCache, SchemaSnapshot, missing_column_payload};
use tracing::{debug, info, warn};

pub struct UpsertClient {
    client: NotionClient,
    cache: SchemaCache,
    collection_id: String,
}

impl UpsertClient {
    pub fn new(client: NotionClient, collection_id: impl Into<String>) -> Self {
        Self {
            client,
            cache: SchemaCache::new(),
            collection_id: collection_id.into(),
        }
    }

    /// Create-or-update the record stored under `key`.
    ///
    /// Fields the schema snapshot does not permit are dropped before the
    /// write; the write itself is a single remote call either way.
    /// Returns the remote record id.
    pub async fn upsert(&self, key: &str, fields: &FieldMap) -> NotionResult<String> {
        let snapshot = self
            .cache
            .get_or_fetch(&self.client, &self.collection_id)
            .await;
        let permitted = filter_fields(fields, &snapshot);

        match self
            .client
            .query_page_id(&self.collection_id, columns::DATE, key)
            .await?
        {
            Some(page_id) => {
                debug!("{}: updating existing record {}", key, page_id);
                self.client.update_page(&page_id, &permitted).await
            }
            None => {
                debug!("{}: creating record", key);
                self.client.create_page(&self.collection_id, &permitted).await
            }
        }
    }

    /// Add any expected columns the collection does not have yet.
    /// Invalidates the cached snapshot when columns were added.
    pub async fn ensure_schema(&self) -> NotionResult<usize> {
        let body = self.client.collection_schema(&self.collection_id).await?;
        let snapshot = SchemaSnapshot::from_response(&body);
        let (count, payload) = missing_column_payload(&snapshot)?;
        if count == 0 {
            debug!("schema already has every expected column");
            return Ok(0);
        }

        info!("adding {} missing columns to {}", count, self.collection_id);
        self.client.add_columns(&self.collection_id, payload).await?;
        self.cache.invalidate(&self.collection_id);
        Ok(count)
    }
}

/// Drop fields the snapshot says we cannot write: unknown columns,
/// computed formulas, and wrapper/type mismatches. The title field is
/// the natural key and always goes through.
fn filter_fields(fields: &FieldMap, snapshot: &SchemaSnapshot) -> FieldMap {
    fields
        .iter()
        .filter(|(name, value)| {
            if name.as_str() == columns::DATE {
                return true;
            }
            if !snapshot.can_write(name) {
                debug!("dropping `{}`: not writable in the collection", name);
                return false;
            }
            if let Some(kind) = snapshot.kind(name) {
                if !value.matches(kind) {
                    warn!(
                        "dropping `{}`: wrapper does not match remote type `{}`",
                        name,
                        kind.as_str()
                    );
                    return false;
                }
            }
            true
        })
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NotionConfig;
    use crate::notion::fields::FieldValue;
    use crate::notion::schema::PropKind;
    use mockito::Matcher;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn test_client(base_url: String) -> UpsertClient {
        let config = NotionConfig {
            base_url,
            api_version: "2022-06-28".to_string(),
            token: "test-token".to_string(),
            collection_id: "db1".to_string(),
            timeout_secs: 5,
            max_attempts: 4,
            backoff_base_ms: 1,
        };
        UpsertClient::new(NotionClient::new(&config).unwrap(), "db1")
    }

    fn sample_fields() -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert(
            "Date".to_string(),
            FieldValue::Title("2025-12-01".to_string()),
        );
        fields.insert("Total kWh".to_string(), FieldValue::Number(48.0));
        fields.insert(
            "Irradiance (kWh/m²)".to_string(),
            FieldValue::Number(1.85),
        );
        fields.insert("Yield vs Target".to_string(), FieldValue::Number(0.9));
        fields
    }

    fn schema_body() -> serde_json::Value {
        json!({"properties": {
            "Date": {"type": "title"},
            "Total kWh": {"type": "number"},
            "Yield vs Target": {"type": "formula"},
        }})
    }

    #[test]
    fn test_filter_keeps_title_and_permitted_fields_only() {
        let snapshot = SchemaSnapshot::from_response(&schema_body());
        let filtered = filter_fields(&sample_fields(), &snapshot);

        let names: Vec<&str> = filtered.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["Date", "Total kWh"]);
    }

    #[test]
    fn test_filter_drops_wrapper_mismatches() {
        let snapshot = SchemaSnapshot::Known(BTreeMap::from([
            ("Date".to_string(), PropKind::Title),
            ("Station".to_string(), PropKind::Number),
        ]));
        let mut fields = FieldMap::new();
        fields.insert(
            "Date".to_string(),
            FieldValue::Title("2025-12-01".to_string()),
        );
        fields.insert(
            "Station".to_string(),
            FieldValue::Text("Point Lane".to_string()),
        );

        let filtered = filter_fields(&fields, &snapshot);
        assert!(filtered.contains_key("Date"));
        assert!(!filtered.contains_key("Station"));
    }

    #[test]
    fn test_unknown_snapshot_passes_everything() {
        let filtered = filter_fields(&sample_fields(), &SchemaSnapshot::Unknown);
        assert_eq!(filtered.len(), 4);
    }

    #[tokio::test]
    async fn test_upsert_creates_when_key_is_absent() {
        let mut server = mockito::Server::new_async().await;
        let _schema = server
            .mock("GET", "/v1/databases/db1")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(schema_body().to_string())
            .create_async()
            .await;
        let _query = server
            .mock("POST", "/v1/databases/db1/query")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"results": []}).to_string())
            .create_async()
            .await;

        // Exact body match proves the schema filter ran: no irradiance,
        // no formula column.
        let create = server
            .mock("POST", "/v1/pages")
            .match_body(Matcher::Json(json!({
                "parent": {"database_id": "db1"},
                "properties": {
                    "Date": {"title": [{"text": {"content": "2025-12-01"}}]},
                    "Total kWh": {"number": 48.0},
                },
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"id": "page-new"}).to_string())
            .expect(1)
            .create_async()
            .await;

        let client = test_client(server.url());
        let id = client.upsert("2025-12-01", &sample_fields()).await.unwrap();

        create.assert_async().await;
        assert_eq!(id, "page-new");
    }

    #[tokio::test]
    async fn test_upsert_updates_when_key_exists() {
        let mut server = mockito::Server::new_async().await;
        let _schema = server
            .mock("GET", "/v1/databases/db1")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(schema_body().to_string())
            .create_async()
            .await;
        let _query = server
            .mock("POST", "/v1/databases/db1/query")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"results": [{"id": "page-123"}]}).to_string())
            .create_async()
            .await;

        let update = server
            .mock("PATCH", "/v1/pages/page-123")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"id": "page-123"}).to_string())
            .expect(1)
            .create_async()
            .await;

        let client = test_client(server.url());
        let id = client.upsert("2025-12-01", &sample_fields()).await.unwrap();

        update.assert_async().await;
        assert_eq!(id, "page-123");
    }

    #[tokio::test]
    async fn test_upsert_fails_open_when_schema_fetch_breaks() {
        let mut server = mockito::Server::new_async().await;
        let _schema = server
            .mock("GET", "/v1/databases/db1")
            .with_status(500)
            .create_async()
            .await;
        let _query = server
            .mock("POST", "/v1/databases/db1/query")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"results": []}).to_string())
            .create_async()
            .await;

        // With no snapshot every field must go through untouched.
        let create = server
            .mock("POST", "/v1/pages")
            .match_body(Matcher::PartialJson(json!({
                "properties": {
                    "Irradiance (kWh/m²)": {"number": 1.85},
                    "Yield vs Target": {"number": 0.9},
                },
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"id": "page-new"}).to_string())
            .expect(1)
            .create_async()
            .await;

        let client = test_client(server.url());
        let id = client.upsert("2025-12-01", &sample_fields()).await.unwrap();

        create.assert_async().await;
        assert_eq!(id, "page-new");
    }

    #[tokio::test]
    async fn test_write_rejection_fails_fast() {
        let mut server = mockito::Server::new_async().await;
        let _schema = server
            .mock("GET", "/v1/databases/db1")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(schema_body().to_string())
            .create_async()
            .await;
        let _query = server
            .mock("POST", "/v1/databases/db1/query")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"results": []}).to_string())
            .create_async()
            .await;
        let create = server
            .mock("POST", "/v1/pages")
            .with_status(400)
            .with_body("validation error")
            .expect(1)
            .create_async()
            .await;

        let client = test_client(server.url());
        let err = client.upsert("2025-12-01", &sample_fields()).await.unwrap_err();

        create.assert_async().await;
        assert!(matches!(
            err,
            crate::error::NotionError::Rejected { status: 400, .. }
        ));
    }

    #[tokio::test]
    async fn test_ensure_schema_adds_only_missing_columns() {
        let mut server = mockito::Server::new_async().await;
        let _schema = server
            .mock("GET", "/v1/databases/db1")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(schema_body().to_string())
            .create_async()
            .await;

        let patch = server
            .mock("PATCH", "/v1/databases/db1")
            .match_body(Matcher::PartialJson(json!({
                "properties": {
                    "SP01_kWh": {"number": {}},
                    "SP48_SSP": {"number": {}},
                    "Station": {"rich_text": {}},
                },
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"id": "db1"}).to_string())
            .expect(1)
            .create_async()
            .await;

        let client = test_client(server.url());
        let added = client.ensure_schema().await.unwrap();

        patch.assert_async().await;
        assert_eq!(added, 103);
    }
}
