//! Error types for fb2mend operations.

use thiserror::Error;

/// Errors that can occur while repairing, re-encoding, or harvesting documents.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Structural failure of a single document. Fatal to that document,
    /// never to the batch.
    #[error("invalid FictionBook format: {0}")]
    InvalidFormat(String),

    /// Too many characters needed numeric-reference substitution for the
    /// chosen encoding. Triggers the one-shot UTF-8 retry.
    #[error("too many unencodable characters for {0}")]
    FallbackOverflow(&'static str),

    /// Schema validation rejected the serialized document. Redirects output
    /// to the not-valid bucket instead of rejecting the document.
    #[error("schema validation failed: {0}")]
    ValidationFailed(String),

    /// Output root or bucket could not be established. Fatal to the batch.
    #[error("output location unavailable: {0}")]
    Resource(#[source] std::io::Error),

    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Archive could not be opened or extracted. That archive is abandoned,
    /// the batch continues.
    #[error("archive error: {0}")]
    Archive(String),

    #[error("unknown encoding label: {0}")]
    UnknownEncoding(String),
}

pub type Result<T> = std::result::Result<T, Error>;
