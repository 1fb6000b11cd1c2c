//! Per-collection metadata.

use crate::error::{DbError, DbResult};
use chrono::{DateTime, TimeZone, Utc};
use gasdb_codec::Value;
use uuid::Uuid;

/// Wire tag discriminating metadata objects.
const METADATA_TAG: &str = "CollectionMetadata";

/// Statistics and coordination state of one collection.
///
/// The metadata travels in two places: embedded in the collection blob
/// (so the blob is self-describing) and in the master index (so other
/// instances can detect concurrent writes). `modification_token` is a
/// fresh opaque string on every persist; a mismatch between an
/// instance's remembered token and the indexed one means someone else
/// wrote the collection in between.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionMetadata {
    /// Collection name.
    pub name: String,
    /// Blob handle, assigned on first persist.
    pub file_handle: Option<String>,
    /// Creation instant.
    pub created: DateTime<Utc>,
    /// Instant of the last persist. Monotone under a well-behaved clock.
    pub last_updated: DateTime<Utc>,
    /// Number of documents at the last persist.
    pub document_count: u64,
    /// Opaque token regenerated on every persist.
    pub modification_token: String,
}

impl CollectionMetadata {
    /// Creates metadata for a brand-new, empty collection.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let now = now_ms();
        Self {
            name: name.into(),
            file_handle: None,
            created: now,
            last_updated: now,
            document_count: 0,
            modification_token: fresh_token(),
        }
    }

    /// Records a persist: updates the timestamp and document count and
    /// regenerates the modification token.
    pub fn bump(&mut self, document_count: u64) {
        self.last_updated = now_ms();
        self.document_count = document_count;
        self.modification_token = fresh_token();
    }

    /// Encodes to the tagged JSON wire form.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let encode_date = |d: &DateTime<Utc>| {
            // Dates inside metadata use the same tagged form as
            // document dates; encoding a date cannot fail.
            gasdb_codec::to_json(&Value::Date(*d)).unwrap_or(serde_json::Value::Null)
        };
        serde_json::json!({
            "__type": METADATA_TAG,
            "name": self.name,
            "fileHandle": self.file_handle,
            "created": encode_date(&self.created),
            "lastUpdated": encode_date(&self.last_updated),
            "documentCount": self.document_count,
            "modificationToken": self.modification_token,
        })
    }

    /// Decodes from the tagged JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns `Internal` when the stored form is malformed - metadata
    /// is only ever written by this engine.
    pub fn from_json(json: &serde_json::Value) -> DbResult<Self> {
        let bad = |what: &str| DbError::internal(format!("stored metadata: {what}"));

        if json.get(gasdb_codec::TYPE_KEY).and_then(serde_json::Value::as_str)
            != Some(METADATA_TAG)
        {
            return Err(bad("missing type tag"));
        }
        let name = json
            .get("name")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| bad("missing name"))?
            .to_string();
        let file_handle = match json.get("fileHandle") {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(handle)) => Some(handle.clone()),
            Some(_) => return Err(bad("fileHandle is not a string")),
        };
        let created = gasdb_codec::decode_date(
            json.get("created").ok_or_else(|| bad("missing created"))?,
        )
        .map_err(|e| bad(&e.to_string()))?;
        let last_updated = gasdb_codec::decode_date(
            json.get("lastUpdated")
                .ok_or_else(|| bad("missing lastUpdated"))?,
        )
        .map_err(|e| bad(&e.to_string()))?;
        let document_count = json
            .get("documentCount")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| bad("missing documentCount"))?;
        let modification_token = json
            .get("modificationToken")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| bad("missing modificationToken"))?
            .to_string();

        Ok(Self {
            name,
            file_handle,
            created,
            last_updated,
            document_count,
            modification_token,
        })
    }
}

/// Generates a fresh opaque modification token.
#[must_use]
pub fn fresh_token() -> String {
    Uuid::new_v4().to_string()
}

/// The current instant at millisecond precision - the resolution the
/// wire form preserves, so timestamps survive round trips unchanged.
pub(crate) fn now_ms() -> DateTime<Utc> {
    let now = Utc::now();
    Utc.timestamp_millis_opt(now.timestamp_millis())
        .single()
        .unwrap_or(now)
}
