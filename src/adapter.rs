//! Producer contract shared by the live upstream adapter and the
//! simulation generator.

use async_trait::async_trait;

use crate::error::Result;

/// A data source that feeds the shared state.
///
/// Object-safe so the composition root can pick an implementation at
/// startup and hold it as a `Box<dyn SourceAdapter>`.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Perform one fetch-and-reconcile cycle from a baseline cursor.
    /// On success, polling becomes available; after `stop`, a new call
    /// reconnects cleanly.
    async fn connect(&self) -> Result<()>;

    /// Start the background polling loop. Fails with
    /// [`crate::error::Error::NotConnected`] unless a `connect` call
    /// has succeeded.
    fn start_polling(&self) -> Result<()>;

    /// Signal the polling loop to exit and mark the source
    /// disconnected. Idempotent.
    fn stop(&self);
}
