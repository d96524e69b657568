//! Maps decoded payloads to typed scan results.

use std::sync::Arc;

use tracing::{debug, warn};

use super::lookup::{MockCatalog, RecordLookup};
use super::result::{ScanDetails, ScanResult};
use super::schema::SchemaTable;
use crate::payload::DecodedPayload;

/// Routes a payload through the schema table and the lookup service.
///
/// Never fails: unmatched payloads and lookup failures both become
/// `Unknown` results, the latter carrying the error message.
#[derive(Clone)]
pub struct ScanResultClassifier {
    schema: SchemaTable,
    lookup: Arc<dyn RecordLookup>,
}

impl ScanResultClassifier {
    pub fn new(schema: SchemaTable, lookup: Arc<dyn RecordLookup>) -> Self {
        Self { schema, lookup }
    }

    /// Default schema over the sample catalog.
    pub fn with_mock_catalog(catalog: MockCatalog) -> Self {
        Self::new(SchemaTable::default(), Arc::new(catalog))
    }

    pub async fn classify(&self, payload: &DecodedPayload) -> ScanResult {
        let details = match self.schema.parse(&payload.raw) {
            None => {
                debug!(provenance = %payload.provenance, "Payload matches no schema");
                ScanDetails::unknown(&payload.raw)
            }
            Some(query) => match self.lookup.resolve(&query).await {
                Ok(details) => details,
                Err(e) => {
                    warn!(kind = %query.kind, key = %query.key, error = %e, "Lookup failed, degrading to unknown");
                    ScanDetails::failed_lookup(&payload.raw, e.to_string())
                }
            },
        };
        ScanResult::new(payload, details)
    }
}

impl std::fmt::Debug for ScanResultClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanResultClassifier")
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}
