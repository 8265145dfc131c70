//! ObjStore Storage - Backend contract and reference implementation
//!
//! This crate defines the uniform blob-storage contract every backend
//! implements, the streaming encrypter seam, the per-backend changelog,
//! the lifecycle engine, the process-wide facade registry, and the local
//! filesystem reference backend.

pub mod changelog;
pub mod encrypt;
pub mod facade;
pub mod lifecycle;
pub mod local;
pub mod store;

pub use changelog::{ChangeLog, FileChangeLog, MemoryChangeLog};
pub use encrypt::{Encrypter, EncrypterFactory};
pub use facade::Facade;
pub use lifecycle::{
    LifecycleManager, LifecycleManagerKind, MemoryLifecycleManager, PersistentLifecycleManager,
};
pub use local::{LocalStore, DEFAULT_LIFECYCLE_POLICY_FILE, METADATA_SUFFIX};
pub use store::{ObjectStore, OpContext, StoreArchiver};
