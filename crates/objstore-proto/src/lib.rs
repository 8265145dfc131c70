//! ObjStore Protocol - gRPC service definitions
//!
//! This crate contains the protobuf-generated code for ObjStore's
//! streaming RPC surface.

/// Object storage service (blob operations)
pub mod v1 {
    tonic::include_proto!("objstore.v1");
}
