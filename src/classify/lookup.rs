//! # Record Lookup
//!
//! Backing service that resolves a parsed payload into record details.
//!
//! [`MockCatalog`] is an in-memory stand-in with sample records and an
//! artificial latency in place of a remote call. Its contents are
//! illustrative; the [`RecordLookup`] boundary is what presentation code
//! depends on.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::debug;

use super::result::{
    DocumentDetails, LocationDetails, OrderDetails, OrderItem, OrderStatus, OrderType, ProductDetails,
    ScanDetails,
};
use super::schema::{RecordKind, RecordQuery};
use crate::error::{ScannerError, ScannerResult};

/// Resolves record queries into variant details.
#[async_trait]
pub trait RecordLookup: Send + Sync {
    /// Looks up a record. Unknown keys are `lookup` errors.
    async fn resolve(&self, query: &RecordQuery) -> ScannerResult<ScanDetails>;
}

/// In-memory catalog of sample records.
#[derive(Debug, Clone, Default)]
pub struct MockCatalog {
    latency: Duration,
    products: HashMap<String, ProductDetails>,
    orders: HashMap<String, OrderDetails>,
    documents: HashMap<String, DocumentDetails>,
    warehouses: HashSet<String>,
    occupied: HashSet<String>,
}

impl MockCatalog {
    /// Catalog with the sample records and no latency.
    pub fn new() -> Self {
        Self::empty()
            .with_product(product(
                "WH-BT100",
                "Wireless Headphones",
                "Electronics",
                45,
                "WH1-A-03-2",
                "Acme Audio",
                date(2024, 3, 15),
                true,
            ))
            .with_product(product(
                "SW-PRO5",
                "Smart Watch Pro",
                "Wearables",
                12,
                "WH1-B-01-4",
                "Tempo Devices",
                date(2024, 1, 22),
                true,
            ))
            .with_product(product(
                "CF-X200",
                "Bluetooth Speaker X200",
                "Electronics",
                3,
                "WH2-C-07-1",
                "Unverified Supplier",
                date(2023, 11, 2),
                false,
            ))
            .with_order(OrderDetails {
                order_number: "ORD-2024-0042".into(),
                order_type: OrderType::Sales,
                status: OrderStatus::Processing,
                customer: "Northwind Retail".into(),
                order_date: date(2024, 6, 2),
                items: vec![item("WH-BT100", "Wireless Headphones", 2), item("SW-PRO5", "Smart Watch Pro", 1)],
            })
            .with_order(OrderDetails {
                order_number: "PO-7781".into(),
                order_type: OrderType::Purchase,
                status: OrderStatus::Delivered,
                customer: "Acme Audio".into(),
                order_date: date(2024, 5, 18),
                items: vec![item("WH-BT100", "Wireless Headphones", 50)],
            })
            .with_document("INV-88231", DocumentDetails {
                title: "Invoice INV-88231".into(),
                document_type: "invoice".into(),
                issue_date: date(2024, 6, 3),
                expiry_date: None,
                issuer: "Northwind Retail".into(),
                is_authentic: true,
            })
            .with_document("CERT-ISO9001", DocumentDetails {
                title: "ISO 9001 Quality Certificate".into(),
                document_type: "certificate".into(),
                issue_date: date(2023, 2, 1),
                expiry_date: Some(date(2026, 1, 31)),
                issuer: "Global Certification Body".into(),
                is_authentic: true,
            })
            .with_warehouse("WH1")
            .with_warehouse("WH2")
            .with_occupied("WH1-A-03-2")
            .with_occupied("WH1-B-01-4")
            .with_occupied("WH2-C-07-1")
    }

    /// Catalog with no records.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn latency(&self) -> Duration {
        self.latency
    }

    pub fn with_product(mut self, product: ProductDetails) -> Self {
        self.products.insert(normalize(&product.sku), product);
        self
    }

    pub fn with_order(mut self, order: OrderDetails) -> Self {
        self.orders.insert(normalize(&order.order_number), order);
        self
    }

    pub fn with_document(mut self, key: &str, document: DocumentDetails) -> Self {
        self.documents.insert(normalize(key), document);
        self
    }

    pub fn with_warehouse(mut self, warehouse: &str) -> Self {
        self.warehouses.insert(normalize(warehouse));
        self
    }

    /// Marks a `WAREHOUSE-SECTION-AISLE-SHELF` location as occupied.
    pub fn with_occupied(mut self, location: &str) -> Self {
        self.occupied.insert(normalize(location));
        self
    }

    fn resolve_now(&self, query: &RecordQuery) -> ScannerResult<ScanDetails> {
        let key = normalize(&query.key);
        let found = match query.kind {
            RecordKind::Product => self.products.get(&key).cloned().map(ScanDetails::Product),
            RecordKind::Order => self.orders.get(&key).cloned().map(ScanDetails::Order),
            RecordKind::Document => self.documents.get(&key).cloned().map(ScanDetails::Document),
            RecordKind::Location => return self.resolve_location(&key).map(ScanDetails::Location),
        };
        found.ok_or_else(|| ScannerError::lookup(&query.key, format!("no {} record for this key", query.kind)))
    }

    fn resolve_location(&self, key: &str) -> ScannerResult<LocationDetails> {
        let parts: Vec<&str> = key.split('-').collect();
        let [warehouse, section, aisle, shelf] = parts.as_slice() else {
            return Err(ScannerError::lookup(key, "expected WAREHOUSE-SECTION-AISLE-SHELF"));
        };
        if [warehouse, section, aisle, shelf].iter().any(|part| part.is_empty()) {
            return Err(ScannerError::lookup(key, "expected WAREHOUSE-SECTION-AISLE-SHELF"));
        }
        if !self.warehouses.contains(*warehouse) {
            return Err(ScannerError::lookup(key, format!("unknown warehouse {warehouse}")));
        }
        Ok(LocationDetails {
            warehouse: warehouse.to_string(),
            section: section.to_string(),
            aisle: aisle.to_string(),
            shelf: shelf.to_string(),
            available: !self.occupied.contains(key),
        })
    }
}

#[async_trait]
impl RecordLookup for MockCatalog {
    async fn resolve(&self, query: &RecordQuery) -> ScannerResult<ScanDetails> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let result = self.resolve_now(query);
        debug!(kind = %query.kind, key = %query.key, found = result.is_ok(), "Catalog lookup");
        result
    }
}

fn normalize(key: &str) -> String {
    key.trim().to_ascii_uppercase()
}

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default()
}

fn item(sku: &str, name: &str, quantity: u32) -> OrderItem {
    OrderItem {
        sku: sku.into(),
        name: name.into(),
        quantity,
    }
}

#[allow(clippy::too_many_arguments)]
fn product(
    sku: &str,
    name: &str,
    category: &str,
    quantity: u32,
    location: &str,
    manufacturer: &str,
    manufacture_date: NaiveDate,
    is_authentic: bool,
) -> ProductDetails {
    ProductDetails {
        name: name.into(),
        sku: sku.into(),
        category: category.into(),
        quantity,
        location: location.into(),
        manufacturer: manufacturer.into(),
        manufacture_date,
        is_authentic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(kind: RecordKind, key: &str) -> RecordQuery {
        RecordQuery {
            kind,
            key: key.to_string(),
        }
    }

    #[tokio::test]
    async fn test_product_lookup_is_case_insensitive() {
        let catalog = MockCatalog::new();
        let ScanDetails::Product(product) = catalog.resolve(&query(RecordKind::Product, "wh-bt100")).await.unwrap()
        else {
            panic!("expected product");
        };
        assert_eq!(product.sku, "WH-BT100");
        assert!(product.is_authentic);
    }

    #[tokio::test]
    async fn test_unknown_key_is_lookup_error() {
        let catalog = MockCatalog::new();
        let err = catalog.resolve(&query(RecordKind::Order, "ORD-0000")).await.unwrap_err();
        assert_eq!(err.category(), "lookup");
    }

    #[tokio::test]
    async fn test_documents() {
        let catalog = MockCatalog::new();
        let invoice = catalog.resolve(&query(RecordKind::Document, "INV-88231")).await.unwrap();
        assert_eq!(invoice.kind(), "document");
        let ScanDetails::Document(cert) = catalog.resolve(&query(RecordKind::Document, "cert-iso9001")).await.unwrap()
        else {
            panic!("expected document");
        };
        assert_eq!(cert.expiry_date, NaiveDate::from_ymd_opt(2026, 1, 31));
    }

    #[tokio::test]
    async fn test_locations() {
        let catalog = MockCatalog::new();

        let ScanDetails::Location(free) = catalog.resolve(&query(RecordKind::Location, "wh2-d-11-3")).await.unwrap()
        else {
            panic!("expected location");
        };
        assert_eq!(free.warehouse, "WH2");
        assert_eq!(free.aisle, "11");
        assert!(free.available);

        let ScanDetails::Location(taken) = catalog.resolve(&query(RecordKind::Location, "WH1-A-03-2")).await.unwrap()
        else {
            panic!("expected location");
        };
        assert!(!taken.available);

        for bad in ["WH9-A-01-1", "WH1-A-01", "WH1--01-1", "WH1-A-01-1-9"] {
            let err = catalog.resolve(&query(RecordKind::Location, bad)).await.unwrap_err();
            assert_eq!(err.category(), "lookup", "{bad}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_is_simulated() {
        let catalog = MockCatalog::new().with_latency(Duration::from_millis(800));
        let started = tokio::time::Instant::now();
        catalog.resolve(&query(RecordKind::Product, "SW-PRO5")).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(800));
    }
}
