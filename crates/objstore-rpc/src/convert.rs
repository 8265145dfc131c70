//! Proto ↔ domain conversions and the wire error mapping

use chrono::{DateTime, Utc};
use objstore_common::{Error, ListResult, Metadata, ObjectInfo, Result};
use objstore_proto::v1 as pb;
use tonic::Status;

pub fn metadata_to_proto(meta: &Metadata) -> pb::Metadata {
    pb::Metadata {
        content_type: meta.content_type.clone(),
        content_encoding: meta.content_encoding.clone(),
        size: meta.size,
        last_modified: meta.last_modified.to_rfc3339(),
        etag: meta.etag.clone(),
        custom: meta.custom.clone(),
    }
}

pub fn metadata_from_proto(meta: pb::Metadata) -> Result<Metadata> {
    let last_modified = if meta.last_modified.is_empty() {
        DateTime::<Utc>::default()
    } else {
        DateTime::parse_from_rfc3339(&meta.last_modified)
            .map_err(|e| Error::invalid_metadata(format!("lastModified: {e}")))?
            .with_timezone(&Utc)
    };
    Ok(Metadata {
        content_type: meta.content_type,
        content_encoding: meta.content_encoding,
        size: meta.size,
        last_modified,
        etag: meta.etag,
        custom: meta.custom,
    })
}

pub fn object_info_to_proto(info: &ObjectInfo) -> pb::ObjectInfo {
    pb::ObjectInfo {
        key: info.key.clone(),
        metadata: Some(metadata_to_proto(&info.metadata)),
    }
}

pub fn list_result_to_proto(result: &ListResult) -> pb::ListResponse {
    pb::ListResponse {
        objects: result.objects.iter().map(object_info_to_proto).collect(),
        common_prefixes: result.common_prefixes.clone(),
        next_token: result.next_token.clone().unwrap_or_default(),
        truncated: result.truncated,
    }
}

/// Map a domain error to the nearest wire status code
pub fn status_from_error(err: &Error) -> Status {
    match err {
        Error::InvalidKey(_)
        | Error::InvalidMetadata(_)
        | Error::InvalidLifecycleManagerType(_)
        | Error::DestinationTypeRequired
        | Error::ArchiveDestinationNil => Status::invalid_argument(err.to_string()),
        Error::PolicyExists(_) => Status::already_exists(err.to_string()),
        Error::KeyNotFound(_)
        | Error::MetadataNotFound(_)
        | Error::PolicyNotFound(_)
        | Error::BackendNotFound(_) => Status::not_found(err.to_string()),
        Error::Unauthenticated(_) => Status::unauthenticated(err.to_string()),
        Error::ResourceExhausted(_) => Status::resource_exhausted(err.to_string()),
        Error::Cancelled => Status::cancelled(err.to_string()),
        Error::DeadlineExceeded => Status::deadline_exceeded(err.to_string()),
        Error::ReplicationNotSupported(_) => Status::unimplemented(err.to_string()),
        _ => Status::internal(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use objstore_common::KeyError;

    #[test]
    fn test_metadata_roundtrip() {
        let mut meta = Metadata {
            content_type: "text/plain".into(),
            content_encoding: "gzip".into(),
            size: 42,
            last_modified: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            etag: "1700000000-42".into(),
            ..Metadata::default()
        };
        meta.custom.insert("k".into(), "v".into());

        let proto = metadata_to_proto(&meta);
        let back = metadata_from_proto(proto).unwrap();
        assert_eq!(back, meta);
    }

    #[test]
    fn test_bad_timestamp_rejected() {
        let proto = pb::Metadata {
            last_modified: "not a timestamp".into(),
            ..pb::Metadata::default()
        };
        assert!(matches!(
            metadata_from_proto(proto),
            Err(Error::InvalidMetadata(_))
        ));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            status_from_error(&Error::InvalidKey(KeyError::Empty)).code(),
            tonic::Code::InvalidArgument
        );
        assert_eq!(
            status_from_error(&Error::KeyNotFound("k".into())).code(),
            tonic::Code::NotFound
        );
        assert_eq!(
            status_from_error(&Error::Unauthenticated("no".into())).code(),
            tonic::Code::Unauthenticated
        );
        assert_eq!(
            status_from_error(&Error::ResourceExhausted("rl".into())).code(),
            tonic::Code::ResourceExhausted
        );
        assert_eq!(
            status_from_error(&Error::Cancelled).code(),
            tonic::Code::Cancelled
        );
        assert_eq!(
            status_from_error(&Error::internal("boom")).code(),
            tonic::Code::Internal
        );
    }
}
