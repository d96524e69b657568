//! Classified scan results handed to presentation surfaces.
//!
//! Results serialize as camelCase JSON with a `type` tag:
//!
//! ```json
//! {
//!   "id": "…",
//!   "scannedTimestamp": "2024-06-02T10:15:00Z",
//!   "rawData": "product:WH-BT100",
//!   "type": "product",
//!   "name": "Wireless Headphones",
//!   "sku": "WH-BT100",
//!   …
//! }
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::payload::DecodedPayload;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDetails {
    pub name: String,
    pub sku: String,
    pub category: String,
    pub quantity: u32,
    pub location: String,
    pub manufacturer: String,
    pub manufacture_date: NaiveDate,
    pub is_authentic: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Purchase,
    Sales,
    Transfer,
    Return,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub sku: String,
    pub name: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetails {
    pub order_number: String,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub customer: String,
    pub order_date: NaiveDate,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationDetails {
    pub warehouse: String,
    pub section: String,
    pub aisle: String,
    pub shelf: String,
    pub available: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentDetails {
    pub title: String,
    pub document_type: String,
    pub issue_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<NaiveDate>,
    pub issuer: String,
    pub is_authentic: bool,
}

/// Fallback for payloads that match no schema or failed lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnknownDetails {
    pub raw_payload: String,
    /// Set when a lookup failed rather than the payload being unrecognised.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Variant-specific result data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ScanDetails {
    Product(ProductDetails),
    Order(OrderDetails),
    Location(LocationDetails),
    Document(DocumentDetails),
    Unknown(UnknownDetails),
}

impl ScanDetails {
    pub fn unknown(raw_payload: impl Into<String>) -> Self {
        ScanDetails::Unknown(UnknownDetails {
            raw_payload: raw_payload.into(),
            error: None,
        })
    }

    pub fn failed_lookup(raw_payload: impl Into<String>, error: impl Into<String>) -> Self {
        ScanDetails::Unknown(UnknownDetails {
            raw_payload: raw_payload.into(),
            error: Some(error.into()),
        })
    }

    /// Variant name as it appears in the `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            ScanDetails::Product(_) => "product",
            ScanDetails::Order(_) => "order",
            ScanDetails::Location(_) => "location",
            ScanDetails::Document(_) => "document",
            ScanDetails::Unknown(_) => "unknown",
        }
    }
}

/// An immutable classified scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub id: Uuid,
    pub scanned_timestamp: DateTime<Utc>,
    pub raw_data: String,
    #[serde(flatten)]
    pub details: ScanDetails,
}

impl ScanResult {
    /// Builds a result for `payload`.
    ///
    /// The id is derived from the payload text and capture time, so
    /// classifying the same payload twice yields equal results.
    pub fn new(payload: &DecodedPayload, details: ScanDetails) -> Self {
        let seed = format!("{}\u{0}{}", payload.raw, payload.captured_at.to_rfc3339());
        Self {
            id: Uuid::new_v5(&Uuid::NAMESPACE_OID, seed.as_bytes()),
            scanned_timestamp: payload.captured_at,
            raw_data: payload.raw.clone(),
            details,
        }
    }

    pub fn kind(&self) -> &'static str {
        self.details.kind()
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
