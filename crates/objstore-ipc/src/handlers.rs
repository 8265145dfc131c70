//! JSON-RPC method dispatch
//!
//! One handler per wire method. Backends resolve through the facade; a
//! `backend:key` reference selects a non-default backend when the prefix
//! names a registered one, otherwise the whole string is the key.

use crate::protocol::{
    RpcError, RpcRequest, RpcResponse, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND,
    PARSE_ERROR,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use objstore_common::{
    Archiver, Error, LifecycleAction, LifecyclePolicy, ListOptions, Metadata, ReplicationDriver,
    ReplicationMode, ReplicationPolicy, ReplicationStatus, SyncResult,
};
use objstore_store::{Facade, LocalStore, ObjectStore, OpContext, StoreArchiver};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;

type HandlerResult = Result<Value, RpcError>;

/// Dispatches parsed requests to backend operations
pub struct MethodHandler {
    facade: Arc<Facade>,
}

#[derive(Deserialize)]
struct KeyParams {
    key: String,
}

#[derive(Deserialize)]
struct PutParams {
    key: String,
    data: String,
    #[serde(default)]
    metadata: Option<Metadata>,
}

#[derive(Deserialize)]
struct ListParams {
    #[serde(default)]
    prefix: String,
    #[serde(default)]
    delimiter: String,
    #[serde(default)]
    max_results: usize,
    #[serde(default)]
    continue_from: Option<String>,
}

#[derive(Deserialize)]
struct UpdateMetadataParams {
    key: String,
    metadata: Metadata,
}

#[derive(Deserialize)]
struct ArchiveParams {
    key: String,
    #[serde(default)]
    destination_type: String,
    #[serde(default)]
    destination_settings: HashMap<String, String>,
}

#[derive(Deserialize)]
struct AddPolicyParams {
    id: String,
    prefix: String,
    action: String,
    after_days: u64,
    #[serde(default)]
    destination_type: String,
    #[serde(default)]
    destination_settings: HashMap<String, String>,
}

#[derive(Deserialize)]
struct IdParams {
    id: String,
}

#[derive(Deserialize)]
struct AddReplicationPolicyParams {
    id: String,
    #[serde(default)]
    source_backend: Option<String>,
    #[serde(default)]
    source_prefix: String,
    destination_type: String,
    #[serde(default)]
    destination: HashMap<String, String>,
    schedule: u64,
    enabled: bool,
    #[serde(default)]
    mode: Option<ReplicationMode>,
    #[serde(default)]
    mirror_delete: bool,
}

#[derive(Deserialize)]
struct TriggerParams {
    #[serde(default)]
    id: Option<String>,
}

fn parse<T: DeserializeOwned>(params: Value) -> Result<T, RpcError> {
    let params = if params.is_null() { json!({}) } else { params };
    serde_json::from_value(params)
        .map_err(|e| RpcError::new(INVALID_PARAMS, format!("invalid params: {e}")))
}

fn domain(err: Error) -> RpcError {
    RpcError::from_domain(&err)
}

fn metadata_json(meta: &Metadata) -> Value {
    serde_json::to_value(meta).unwrap_or(Value::Null)
}

fn sync_result_json(result: &SyncResult) -> Value {
    json!({
        "policy_id": result.policy_id,
        "synced": result.synced,
        "deleted": result.deleted,
        "failed": result.failed,
        "bytes_total": result.bytes_total,
        "duration_ms": result.duration.as_millis() as u64,
        "errors": result.errors,
    })
}

fn status_json(status: &ReplicationStatus) -> Value {
    json!({
        "total_synced": status.total_synced,
        "total_deleted": status.total_deleted,
        "total_bytes": status.total_bytes,
        "total_errors": status.total_errors,
        "sync_count": status.sync_count,
        "average_duration_ms": status.average_duration.as_millis() as u64,
        "last_sync_time": status.last_sync_time.map(|t| t.to_rfc3339()),
    })
}

impl MethodHandler {
    #[must_use]
    pub fn new(facade: Arc<Facade>) -> Self {
        Self { facade }
    }

    /// Handle one newline-framed request line
    pub async fn dispatch_line(&self, line: &str) -> RpcResponse {
        let parsed: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(err) => {
                return RpcResponse::error(
                    Value::Null,
                    RpcError::new(PARSE_ERROR, format!("parse error: {err}")),
                );
            }
        };
        let request: RpcRequest = match serde_json::from_value(parsed) {
            Ok(request) => request,
            Err(err) => {
                return RpcResponse::error(
                    Value::Null,
                    RpcError::new(INVALID_REQUEST, format!("invalid request: {err}")),
                );
            }
        };
        let id = request.id.clone();
        if request.jsonrpc.as_deref() != Some("2.0") {
            return RpcResponse::error(
                id,
                RpcError::new(INVALID_REQUEST, "jsonrpc must be \"2.0\""),
            );
        }
        let Some(method) = request.method else {
            return RpcResponse::error(id, RpcError::new(INVALID_REQUEST, "method is required"));
        };
        match self.call(&method, request.params).await {
            Ok(result) => RpcResponse::ok(id, result),
            Err(error) => RpcResponse::error(id, error),
        }
    }

    async fn call(&self, method: &str, params: Value) -> HandlerResult {
        match method {
            "put" => self.put(parse(params)?).await,
            "get" => self.get(parse(params)?).await,
            "delete" => self.delete(parse(params)?).await,
            "exists" => self.exists(parse(params)?).await,
            "list" => self.list(parse(params)?).await,
            "get_metadata" => self.get_metadata(parse(params)?).await,
            "update_metadata" => self.update_metadata(parse(params)?).await,
            "archive" => self.archive(parse(params)?).await,
            "add_policy" => self.add_policy(parse(params)?).await,
            "remove_policy" => self.remove_policy(parse(params)?).await,
            "get_policies" => self.get_policies().await,
            "apply_policies" => self.apply_policies().await,
            "add_replication_policy" => self.add_replication_policy(parse(params)?).await,
            "remove_replication_policy" => self.remove_replication_policy(parse(params)?).await,
            "get_replication_policy" => self.get_replication_policy(parse(params)?).await,
            "get_replication_policies" => self.get_replication_policies().await,
            "trigger_replication" => self.trigger_replication(parse(params)?).await,
            "get_replication_status" => self.get_replication_status(parse(params)?).await,
            "health" | "ping" => Ok(json!({
                "status": "ok",
                "version": env!("CARGO_PKG_VERSION"),
            })),
            other => Err(RpcError::new(
                METHOD_NOT_FOUND,
                format!("method not found: {other}"),
            )),
        }
    }

    /// Split a `backend:key` reference. The prefix wins only when it
    /// names a registered backend; keys may legally contain `:`.
    fn resolve_key<'a>(&self, key: &'a str) -> Result<(Arc<dyn ObjectStore>, &'a str), RpcError> {
        if let Some((backend, rest)) = key.split_once(':') {
            if self.facade.is_registered(backend) {
                return Ok((self.facade.backend(backend).map_err(domain)?, rest));
            }
        }
        Ok((self.facade.default_backend().map_err(domain)?, key))
    }

    fn default_backend(&self) -> Result<Arc<dyn ObjectStore>, RpcError> {
        self.facade.default_backend().map_err(domain)
    }

    fn replication_driver(&self) -> Result<Arc<dyn ReplicationDriver>, RpcError> {
        let backend = self.default_backend()?;
        backend.replication_manager().ok_or_else(|| {
            domain(Error::ReplicationNotSupported(
                "default backend has no replication manager".into(),
            ))
        })
    }

    async fn resolve_archiver(
        &self,
        destination_type: &str,
        settings: &HashMap<String, String>,
    ) -> Result<Arc<dyn Archiver>, RpcError> {
        if destination_type.is_empty() {
            return Err(domain(Error::DestinationTypeRequired));
        }
        if self.facade.is_registered(destination_type) {
            let backend = self.facade.backend(destination_type).map_err(domain)?;
            return Ok(Arc::new(StoreArchiver(backend)));
        }
        if destination_type == "local" {
            let store = LocalStore::new();
            store.configure(settings).await.map_err(domain)?;
            return Ok(Arc::new(store));
        }
        Err(domain(Error::BackendNotFound(destination_type.to_string())))
    }

    async fn put(&self, params: PutParams) -> HandlerResult {
        let (backend, key) = self.resolve_key(&params.key)?;
        let data = BASE64
            .decode(params.data.as_bytes())
            .map_err(|e| RpcError::new(INVALID_PARAMS, format!("invalid base64 data: {e}")))?;
        backend
            .put_with_metadata(
                &OpContext::background(),
                key,
                Box::new(Cursor::new(data)),
                params.metadata,
            )
            .await
            .map_err(domain)?;
        Ok(json!({"status": "ok"}))
    }

    async fn get(&self, params: KeyParams) -> HandlerResult {
        let (backend, key) = self.resolve_key(&params.key)?;
        let mut reader = backend
            .get_with_context(&OpContext::background(), key)
            .await
            .map_err(domain)?;
        let mut data = Vec::new();
        reader
            .read_to_end(&mut data)
            .await
            .map_err(|e| domain(e.into()))?;
        let metadata = backend.get_metadata(key).await.ok();
        Ok(json!({
            "data": BASE64.encode(&data),
            "metadata": metadata.as_ref().map(metadata_json),
        }))
    }

    async fn delete(&self, params: KeyParams) -> HandlerResult {
        let (backend, key) = self.resolve_key(&params.key)?;
        backend
            .delete_with_context(&OpContext::background(), key)
            .await
            .map_err(domain)?;
        Ok(json!({"status": "ok"}))
    }

    async fn exists(&self, params: KeyParams) -> HandlerResult {
        let (backend, key) = self.resolve_key(&params.key)?;
        let exists = backend.exists(key).await.map_err(domain)?;
        Ok(json!({"exists": exists}))
    }

    async fn list(&self, params: ListParams) -> HandlerResult {
        let (backend, prefix) = self.resolve_key(&params.prefix)?;
        let options = ListOptions {
            prefix: prefix.to_string(),
            delimiter: params.delimiter,
            max_results: params.max_results,
            continue_from: params.continue_from,
        };
        let result = backend
            .list_with_options(&OpContext::background(), Some(options))
            .await
            .map_err(domain)?;
        let objects: Vec<Value> = result
            .objects
            .iter()
            .map(|o| json!({"key": o.key, "metadata": metadata_json(&o.metadata)}))
            .collect();
        Ok(json!({
            "objects": objects,
            "common_prefixes": result.common_prefixes,
            "next_token": result.next_token,
            "truncated": result.truncated,
        }))
    }

    async fn get_metadata(&self, params: KeyParams) -> HandlerResult {
        let (backend, key) = self.resolve_key(&params.key)?;
        let metadata = backend.get_metadata(key).await.map_err(domain)?;
        Ok(json!({"metadata": metadata_json(&metadata)}))
    }

    async fn update_metadata(&self, params: UpdateMetadataParams) -> HandlerResult {
        let (backend, key) = self.resolve_key(&params.key)?;
        let updated = backend
            .update_metadata(key, params.metadata)
            .await
            .map_err(domain)?;
        Ok(json!({"metadata": metadata_json(&updated)}))
    }

    async fn archive(&self, params: ArchiveParams) -> HandlerResult {
        let (backend, key) = self.resolve_key(&params.key)?;
        let destination = self
            .resolve_archiver(&params.destination_type, &params.destination_settings)
            .await?;
        backend
            .archive(key, Some(destination))
            .await
            .map_err(domain)?;
        Ok(json!({"status": "ok"}))
    }

    async fn add_policy(&self, params: AddPolicyParams) -> HandlerResult {
        let retention = Duration::from_secs(params.after_days * 24 * 60 * 60);
        let policy = match params.action.as_str() {
            "delete" => LifecyclePolicy::delete(params.id, params.prefix, retention),
            "archive" => {
                let destination = self
                    .resolve_archiver(&params.destination_type, &params.destination_settings)
                    .await?;
                LifecyclePolicy::archive(params.id, params.prefix, retention, destination)
            }
            other => {
                return Err(RpcError::new(
                    INVALID_PARAMS,
                    format!("invalid action: {other}"),
                ));
            }
        };
        self.default_backend()?.add_policy(policy).map_err(domain)?;
        Ok(json!({"status": "ok"}))
    }

    async fn remove_policy(&self, params: IdParams) -> HandlerResult {
        self.default_backend()?
            .remove_policy(&params.id)
            .map_err(domain)?;
        Ok(json!({"status": "ok"}))
    }

    async fn get_policies(&self) -> HandlerResult {
        let mut policies = self.default_backend()?.policies().map_err(domain)?;
        policies.sort_by(|a, b| a.id.cmp(&b.id));
        let policies: Vec<Value> = policies
            .iter()
            .map(|p| {
                json!({
                    "id": p.id,
                    "prefix": p.prefix,
                    "retention_days": p.retention.as_secs() / (24 * 60 * 60),
                    "action": match p.action {
                        LifecycleAction::Delete => "delete",
                        LifecycleAction::Archive => "archive",
                    },
                })
            })
            .collect();
        Ok(json!({"policies": policies}))
    }

    async fn apply_policies(&self) -> HandlerResult {
        let actions = self
            .default_backend()?
            .apply_lifecycle_policies()
            .await
            .map_err(domain)?;
        Ok(json!({"status": "ok", "actions": actions}))
    }

    async fn add_replication_policy(&self, params: AddReplicationPolicyParams) -> HandlerResult {
        if params.destination_type.is_empty() {
            return Err(domain(Error::DestinationTypeRequired));
        }
        if !self.facade.is_registered(&params.destination_type) {
            return Err(domain(Error::BackendNotFound(params.destination_type)));
        }
        let source_backend = match params.source_backend {
            Some(name) => name,
            None => self.facade.default_backend_name().map_err(domain)?,
        };
        let policy = ReplicationPolicy {
            id: params.id,
            source_backend,
            source_settings: HashMap::new(),
            source_prefix: params.source_prefix,
            destination_backend: params.destination_type,
            destination_settings: params.destination,
            check_interval: Duration::from_secs(params.schedule),
            last_sync_time: None,
            enabled: params.enabled,
            mode: params.mode.unwrap_or_default(),
            encryption: Default::default(),
            mirror_delete: params.mirror_delete,
        };
        self.replication_driver()?
            .add_policy(policy)
            .map_err(domain)?;
        Ok(json!({"status": "ok"}))
    }

    async fn remove_replication_policy(&self, params: IdParams) -> HandlerResult {
        self.replication_driver()?
            .remove_policy(&params.id)
            .map_err(domain)?;
        Ok(json!({"status": "ok"}))
    }

    async fn get_replication_policy(&self, params: IdParams) -> HandlerResult {
        let policy = self.replication_driver()?.policy(&params.id).map_err(domain)?;
        let policy =
            serde_json::to_value(&policy).map_err(|e| domain(Error::serialization(e.to_string())))?;
        Ok(json!({"policy": policy}))
    }

    async fn get_replication_policies(&self) -> HandlerResult {
        let policies = self.replication_driver()?.policies();
        let policies = serde_json::to_value(&policies)
            .map_err(|e| domain(Error::serialization(e.to_string())))?;
        Ok(json!({"policies": policies}))
    }

    async fn trigger_replication(&self, params: TriggerParams) -> HandlerResult {
        let driver = self.replication_driver()?;
        match params.id {
            Some(id) => {
                let result = driver.sync_policy(&id).await.map_err(domain)?;
                Ok(json!({"result": sync_result_json(&result)}))
            }
            None => {
                let results = driver.sync_all().await.map_err(domain)?;
                let results: Vec<Value> = results.iter().map(sync_result_json).collect();
                Ok(json!({"results": results}))
            }
        }
    }

    async fn get_replication_status(&self, params: IdParams) -> HandlerResult {
        let driver = self.replication_driver()?;
        let Some(source) = driver.status_source() else {
            return Err(domain(Error::ReplicationNotSupported(
                "driver does not expose status".into(),
            )));
        };
        let status = source.replication_status(&params.id).map_err(domain)?;
        Ok(json!({"status": status_json(&status)}))
    }
}
