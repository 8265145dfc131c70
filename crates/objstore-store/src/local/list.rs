//! Listing and pagination for the local backend
//!
//! The walk visits directory entries in lexicographic order (sorted names,
//! depth-first), which is the documented, platform-independent order that
//! pagination tokens rely on across pages.

use super::{LocalStore, METADATA_SUFFIX};
use crate::store::OpContext;
use chrono::{DateTime, Utc};
use objstore_common::{validate_key, ListOptions, ListResult, ObjectInfo, Result};
use std::collections::BTreeSet;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;

/// One file discovered by the walk, with the stat attributes needed to
/// synthesize metadata when the sidecar is missing or corrupt
#[derive(Clone, Debug)]
pub(crate) struct WalkEntry {
    pub key: String,
    pub size: i64,
    pub modified: DateTime<Utc>,
}

impl LocalStore {
    /// Walk the storage root, producing relative forward-slash keys in
    /// lexicographic order. Sidecars, sidecar temp files, and the
    /// persistent lifecycle policy file are invisible.
    pub(crate) async fn walk(&self, ctx: &OpContext) -> Result<Vec<WalkEntry>> {
        let root = self.root()?;
        ctx.check()?;
        match tokio::fs::metadata(&root).await {
            Ok(_) => {}
            // Empty search path: no root directory yet means no objects
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        }

        let policy_file = self.lifecycle_policy_file();
        let policy_tmp = format!("{policy_file}.tmp");
        let mut entries = Vec::new();
        walk_dir(ctx, &root, String::new(), &policy_file, &policy_tmp, &mut entries).await?;
        Ok(entries)
    }

    pub(super) async fn list_paginated(
        &self,
        ctx: &OpContext,
        opts: ListOptions,
    ) -> Result<ListResult> {
        if !opts.prefix.is_empty() {
            validate_key(&opts.prefix)?;
        }
        let entries = self.walk(ctx).await?;

        let mut objects: Vec<WalkEntry> = Vec::new();
        let mut common_prefixes: BTreeSet<String> = BTreeSet::new();
        for entry in entries {
            if !entry.key.starts_with(&opts.prefix) {
                continue;
            }
            if !opts.delimiter.is_empty() {
                let remainder = &entry.key[opts.prefix.len()..];
                if let Some(idx) = remainder.find(&opts.delimiter) {
                    // Collapse everything past the delimiter into one
                    // directory-like common prefix
                    common_prefixes.insert(format!(
                        "{}{}",
                        opts.prefix,
                        &remainder[..idx + opts.delimiter.len()]
                    ));
                    continue;
                }
            }
            objects.push(entry);
        }

        // Unknown continuation tokens restart from the beginning (I4)
        let start = match &opts.continue_from {
            Some(token) => objects
                .iter()
                .position(|e| &e.key == token)
                .map_or(0, |i| i + 1),
            None => 0,
        };
        let end = (start + opts.effective_max()).min(objects.len());
        let truncated = end < objects.len();

        let mut page = Vec::with_capacity(end - start);
        for entry in &objects[start..end] {
            ctx.check()?;
            let metadata = match self.read_sidecar(&entry.key).await {
                Some(meta) => meta,
                None => Self::synthesize_metadata(entry.size, entry.modified),
            };
            page.push(ObjectInfo {
                key: entry.key.clone(),
                metadata,
            });
        }

        let next_token = if truncated {
            page.last().map(|o| o.key.clone())
        } else {
            None
        };
        Ok(ListResult {
            objects: page,
            common_prefixes: common_prefixes.into_iter().collect(),
            next_token,
            truncated,
        })
    }
}

fn walk_dir<'a>(
    ctx: &'a OpContext,
    dir: &'a Path,
    rel: String,
    policy_file: &'a str,
    policy_tmp: &'a str,
    out: &'a mut Vec<WalkEntry>,
) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        let mut read_dir = tokio::fs::read_dir(dir).await?;
        let mut names: Vec<String> = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            ctx.check()?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();

        for name in names {
            ctx.check()?;
            let path = dir.join(&name);
            let stat = match tokio::fs::metadata(&path).await {
                Ok(stat) => stat,
                // Entry vanished between readdir and stat; a concurrent
                // delete is not a listing error
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };
            if stat.is_dir() {
                walk_dir(ctx, &path, format!("{rel}{name}/"), policy_file, policy_tmp, out)
                    .await?;
                continue;
            }
            if name.ends_with(METADATA_SUFFIX) || name.ends_with(".metadata.json.tmp") {
                continue;
            }
            if rel.is_empty() && (name == policy_file || name == policy_tmp) {
                continue;
            }
            let modified: DateTime<Utc> = stat.modified()?.into();
            out.push(WalkEntry {
                key: format!("{rel}{name}"),
                size: stat.len() as i64,
                modified,
            });
        }
        Ok(())
    })
}
