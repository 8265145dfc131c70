//! Archive destination interface
//!
//! An archiver is the narrow write-only surface an archive-only backend
//! (e.g. a Glacier-style vault) exposes. Full backends implement it too,
//! so any backend can be an archive destination.

use crate::error::Result;
use async_trait::async_trait;
use tokio::io::AsyncRead;

/// A streaming object reader returned by Get
pub type ObjectReader = Box<dyn AsyncRead + Send + Unpin>;

/// Write-only archive destination
#[async_trait]
pub trait Archiver: Send + Sync {
    /// Store the object under the given key
    async fn archive(&self, key: &str, data: ObjectReader) -> Result<()>;
}
