//! Error types for the synchronization pipeline

use thiserror::Error;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the reconciliation engine and its collaborators.
///
/// Transport and decode errors abort a single fetch cycle; the polling
/// loop logs them and retries on the next tick. Only `connect` and
/// `start_polling` return errors to the caller.
#[derive(Error, Debug)]
pub enum Error {
    /// Polling requested before a successful connect
    #[error("not connected to MeOS")]
    NotConnected,

    /// Network-level failure talking to the upstream server
    #[error("failed to connect to MeOS: {0}")]
    Transport(#[from] reqwest::Error),

    /// Upstream answered with a non-success status
    #[error("unexpected status code: {0}")]
    HttpStatus(u16),

    /// Malformed XML in the upstream response
    #[error("failed to parse XML: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Response root element was neither MOPComplete nor MOPDiff
    #[error("unknown XML root element: {0}")]
    UnknownRoot(String),

    /// Configuration loading or validation error
    #[error("configuration error: {0}")]
    Config(String),
}
