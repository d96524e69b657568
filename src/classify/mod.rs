//! # Scan Result Classification
//!
//! Turns raw payload strings into typed results:
//!
//! 1. [`SchemaTable`] parses the payload prefix into a [`RecordQuery`]
//! 2. [`RecordLookup`] resolves the query into variant details
//! 3. [`ScanResultClassifier`] wraps the details in a [`ScanResult`]
//!
//! Payloads that match no prefix become `Unknown`; lookup failures become
//! `Unknown` with an error marker.

pub mod classifier;
pub mod lookup;
pub mod result;
pub mod schema;

pub use classifier::ScanResultClassifier;
pub use lookup::{MockCatalog, RecordLookup};
pub use result::{
    DocumentDetails, LocationDetails, OrderDetails, OrderItem, OrderStatus, OrderType, ProductDetails,
    ScanDetails, ScanResult, UnknownDetails,
};
pub use schema::{RecordKind, RecordQuery, SchemaTable};
