//! ObjStore Common - Shared types and utilities
//!
//! This crate provides common types, error definitions, and utilities
//! used across all ObjStore components.

pub mod archive;
pub mod change;
pub mod error;
pub mod key;
pub mod metadata;
pub mod policy;
pub mod principal;
pub mod replication;

pub use archive::{Archiver, ObjectReader};
pub use change::{ChangeEvent, ChangeOperation};
pub use error::{Error, Result};
pub use key::{validate_key, KeyError, ObjectKey};
pub use metadata::{
    ListOptions, ListResult, Metadata, ObjectInfo, DEFAULT_MAX_RESULTS, ENCRYPTION_ALGORITHM_KEY,
    ENCRYPTION_KEY_ID_KEY,
};
pub use policy::{LifecycleAction, LifecyclePolicy};
pub use principal::Principal;
pub use replication::{
    EncryptionConfig, EncryptionPolicy, ReplicationDriver, ReplicationMode, ReplicationPolicy,
    ReplicationStatus, ReplicationStatusSource, SyncResult,
};
