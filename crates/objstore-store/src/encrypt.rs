//! Streaming at-rest encryption seam
//!
//! Backends never know the algorithm: an installed factory hands out
//! encrypters that wrap the data stream on the way in and out. The
//! algorithm and key id land in the reserved custom metadata keys so Get
//! knows the object needs decryption.

use async_trait::async_trait;
use objstore_common::{ObjectReader, Result};
use std::sync::Arc;

/// Wraps object byte streams with encryption and decryption
#[async_trait]
pub trait Encrypter: Send + Sync {
    /// Algorithm identifier recorded in metadata bookkeeping
    fn algorithm(&self) -> &str;

    /// Key identifier recorded in metadata bookkeeping
    fn key_id(&self) -> &str;

    /// Wrap a plaintext stream; the returned reader yields ciphertext
    async fn encrypt(&self, plaintext: ObjectReader) -> Result<ObjectReader>;

    /// Wrap a ciphertext stream; the returned reader yields plaintext
    async fn decrypt(&self, ciphertext: ObjectReader) -> Result<ObjectReader>;
}

/// Produces encrypters on demand (one per operation)
pub trait EncrypterFactory: Send + Sync {
    /// Obtain an encrypter for the next operation
    fn encrypter(&self) -> Result<Arc<dyn Encrypter>>;
}
