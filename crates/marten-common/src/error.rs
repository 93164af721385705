//! Error types for Marten.

use crate::page::PageId;
use crate::types::AttrType;
use thiserror::Error;

/// Result type alias using MartenError.
pub type Result<T> = std::result::Result<T, MartenError>;

/// Errors that can occur in Marten operations.
#[derive(Debug, Error)]
pub enum MartenError {
    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {0}")]
    FileNotFound(String),

    // Buffer pool errors
    #[error("Page not found: {page_id}")]
    PageNotFound { page_id: PageId },

    #[error("Buffer pool full, unable to allocate frame")]
    BufferPoolFull,

    // Heap errors
    #[error("Page full, unable to insert record")]
    PageFull,

    // Index errors
    #[error("Index metadata mismatch for {index_file}")]
    BadIndexInfo { index_file: String },

    #[error("Invalid scan operators: low must be GT or GTE, high must be LT or LTE")]
    BadOpcodes,

    #[error("Invalid scan range: low {low} exceeds high {high}")]
    BadScanRange { low: i32, high: i32 },

    #[error("No key in the index satisfies the scan predicates")]
    NoSuchKeyFound,

    #[error("No scan is currently in progress")]
    ScanNotInitialized,

    #[error("Index scan completed")]
    IndexScanCompleted,

    #[error("Unsupported attribute type: {attr_type}")]
    UnsupportedAttrType { attr_type: AttrType },

    #[error("Corruption detected: {0}")]
    Corruption(String),
}
