//! Prefix schema table mapping raw payloads to record queries.

use serde::Serialize;

/// Kind of record a payload refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Product,
    Order,
    Location,
    Document,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RecordKind::Product => "product",
            RecordKind::Order => "order",
            RecordKind::Location => "location",
            RecordKind::Document => "document",
        };
        f.write_str(name)
    }
}

/// A parsed payload: which kind of record and its lookup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordQuery {
    pub kind: RecordKind,
    pub key: String,
}

/// Ordered prefix → kind table.
///
/// Matching is case-insensitive and ignores surrounding whitespace. Longer
/// prefixes are tried first.
#[derive(Debug, Clone)]
pub struct SchemaTable {
    entries: Vec<(String, RecordKind)>,
}

impl Default for SchemaTable {
    fn default() -> Self {
        Self::empty()
            .with_prefix("product:", RecordKind::Product)
            .with_prefix("order:", RecordKind::Order)
            .with_prefix("location:", RecordKind::Location)
            .with_prefix("loc:", RecordKind::Location)
            .with_prefix("document:", RecordKind::Document)
            .with_prefix("doc:", RecordKind::Document)
    }
}

impl SchemaTable {
    /// A table with no entries; every payload is unknown.
    pub fn empty() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn with_prefix(mut self, prefix: &str, kind: RecordKind) -> Self {
        self.entries.push((prefix.to_ascii_lowercase(), kind));
        self.entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        self
    }

    /// Parses a raw payload. `None` means the payload matches no schema or
    /// carries an empty key.
    pub fn parse(&self, raw: &str) -> Option<RecordQuery> {
        let trimmed = raw.trim();
        self.entries.iter().find_map(|(prefix, kind)| {
            let head = trimmed.get(..prefix.len())?;
            if !head.eq_ignore_ascii_case(prefix) {
                return None;
            }
            let key = trimmed[prefix.len()..].trim();
            (!key.is_empty()).then(|| RecordQuery {
                kind: *kind,
                key: key.to_string(),
            })
        })
    }
}
