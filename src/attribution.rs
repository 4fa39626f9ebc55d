//! Conversion records for attribution.
//!
//! Each successful download appends one record. The log is read back only
//! for reporting and never feeds a gate decision.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::storage::{KeyValueStore, StorageError, load_json, save_json};

/// Storage key of the conversion log.
pub const CONVERSIONS_KEY: &str = "download_gate.conversions";

/// Number of most recent records kept.
pub const MAX_CONVERSION_RECORDS: usize = 50;

/// One attributed download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionRecord {
    pub venture: String,
    pub timestamp: u64,
    pub session_id: String,
    #[serde(default)]
    pub referrer: Option<String>,
}

/// Append-only, capped conversion log in a [`KeyValueStore`].
#[derive(Debug, Clone)]
pub struct AttributionLog {
    store: Arc<dyn KeyValueStore>,
}

impl AttributionLog {
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Appends `record`, dropping the oldest entries beyond the cap.
    ///
    /// A log that no longer parses is replaced. Backend failures leave the
    /// stored log untouched.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the log cannot be read from or written to
    /// the backend.
    pub fn record(&self, record: ConversionRecord) -> Result<(), StorageError> {
        let mut records = match self.records() {
            Ok(records) => records,
            Err(error @ StorageError::Malformed { .. }) => {
                warn!(error = %error, "corrupt conversion log, starting over");
                Vec::new()
            }
            Err(error) => return Err(error),
        };
        records.push(record);
        if records.len() > MAX_CONVERSION_RECORDS {
            let excess = records.len() - MAX_CONVERSION_RECORDS;
            records.drain(..excess);
        }
        save_json(self.store.as_ref(), CONVERSIONS_KEY, &records)?;
        debug!(total = records.len(), "conversion recorded");
        Ok(())
    }

    /// All stored records, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the log cannot be read or parsed.
    pub fn records(&self) -> Result<Vec<ConversionRecord>, StorageError> {
        Ok(load_json(self.store.as_ref(), CONVERSIONS_KEY)?.unwrap_or_default())
    }

    /// Removes the log.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend cannot be written.
    pub fn clear(&self) -> Result<(), StorageError> {
        self.store.delete(CONVERSIONS_KEY)
    }
}
