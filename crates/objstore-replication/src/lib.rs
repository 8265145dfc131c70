//! ObjStore Replication - Cross-backend mirroring engine
//!
//! Periodically mirrors objects under a source prefix to a destination
//! backend. Sync passes are cold (full listing) until a change feed is
//! registered for the source backend, after which passes are incremental.

pub mod feed;
pub mod manager;

pub use feed::ChangeFeed;
pub use manager::ReplicationManager;
