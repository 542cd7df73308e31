//! Filesystem backend: one pretty-printed JSON file per document.
//!
//! Layout on disk:
//!
//! ```text
//! <base>/
//!   users/
//!     0192f0c4-...          {"_id": "0192f0c4-...", "name": "erin"}
//!     teams/red/lead        nested id "teams/red/lead"
//!     .lead.<uuid>.tmp      in-flight write, ignored by listings
//! ```
//!
//! Writes go to a temp file in the target's directory and are renamed over
//! the target, so a reader sees either the old document or the new one and
//! never a torn write. There is no in-process lock. Two concurrent updates
//! of the same id both read, merge and rename; the last rename wins and the
//! other update is lost. Callers that need stronger guarantees must
//! serialize writes to an id themselves.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::context::OpContext;
use crate::entity::{self, Entity, ID_FIELD};
use crate::error::{StoreError, StoreResult};
use crate::query::{QueryNode, describe};
use crate::storage::Storage;

const TEMP_SUFFIX: &str = ".tmp";

/// Scan tuning for [`FileStorage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileOptions {
    /// Collections with at least this many files are scanned in parallel.
    pub parallel_threshold: usize,
    /// Maximum concurrent file loads during a parallel scan.
    pub scan_workers: usize,
}

impl Default for FileOptions {
    fn default() -> Self {
        Self {
            parallel_threshold: 64,
            scan_workers: 16,
        }
    }
}

/// [`Storage`] over a local directory tree.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: Arc<PathBuf>,
    options: FileOptions,
}

impl FileStorage {
    /// Open (creating if needed) a store rooted at `base`.
    pub async fn new(base: impl AsRef<Path>) -> StoreResult<Self> {
        Self::with_options(base, FileOptions::default()).await
    }

    /// Open with explicit scan tuning.
    pub async fn with_options(base: impl AsRef<Path>, options: FileOptions) -> StoreResult<Self> {
        let base = base.as_ref();
        if options.parallel_threshold == 0 || options.scan_workers == 0 {
            return Err(StoreError::InvalidArgument(
                "scan tuning values must be positive".into(),
            ));
        }
        tokio::fs::create_dir_all(base)
            .await
            .map_err(|e| StoreError::io("open", base, e))?;
        debug!(path = %base.display(), ?options, "file storage ready");
        Ok(Self {
            root: Arc::new(base.to_path_buf()),
            options,
        })
    }

    /// The base directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The scan tuning in effect.
    pub fn options(&self) -> FileOptions {
        self.options
    }

    fn collection_dir(&self, collection: &str) -> StoreResult<PathBuf> {
        check_segment("collection", collection)?;
        Ok(self.root.join(collection))
    }

    fn document_path(&self, collection: &str, id: &str) -> StoreResult<PathBuf> {
        check_segment("id", id)?;
        Ok(self.collection_dir(collection)?.join(id))
    }

    /// Load, filter and collect up to `count` documents (0 = all), each
    /// paired with the id its file is listed under.
    async fn scan(
        &self,
        ctx: &OpContext,
        op: &'static str,
        collection: &str,
        count: usize,
        query: Option<&QueryNode>,
    ) -> StoreResult<Vec<(String, Entity)>> {
        ctx.check(op)?;
        let dir = self.collection_dir(collection)?;
        let ids = list_ids(ctx, op, &dir).await?;
        let limit = if count == 0 { usize::MAX } else { count };
        let mut found = Vec::new();

        if ids.len() < self.options.parallel_threshold {
            for id in ids {
                ctx.check(op)?;
                let loaded = load(&dir.join(&id), &id).await;
                if let Some(doc) = keep(collection, &id, loaded, query) {
                    found.push((id, doc));
                    if found.len() >= limit {
                        break;
                    }
                }
            }
            return Ok(found);
        }

        debug!(
            collection,
            files = ids.len(),
            workers = self.options.scan_workers,
            "parallel scan"
        );
        let mut loads = futures::stream::iter(ids)
            .map(|id| {
                let path = dir.join(&id);
                async move {
                    let loaded = load(&path, &id).await;
                    (id, loaded)
                }
            })
            .buffer_unordered(self.options.scan_workers);

        while let Some((id, loaded)) = loads.next().await {
            ctx.check(op)?;
            if let Some(doc) = keep(collection, &id, loaded, query) {
                found.push((id, doc));
                if found.len() >= limit {
                    break;
                }
            }
        }
        Ok(found)
    }

    async fn resolve_ids(
        &self,
        ctx: &OpContext,
        op: &'static str,
        collection: &str,
        query: Option<&QueryNode>,
    ) -> StoreResult<Vec<String>> {
        let ids: Vec<String> = ctx
            .race(op, self.scan(ctx, op, collection, 0, query))
            .await?
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        if ids.is_empty() {
            return Err(StoreError::not_found(collection, describe(query)));
        }
        Ok(ids)
    }
}

#[async_trait]
impl Storage for FileStorage {
    #[instrument(skip(self, ctx, query), fields(query = %describe(query)))]
    async fn get(
        &self,
        ctx: &OpContext,
        collection: &str,
        count: usize,
        query: Option<&QueryNode>,
    ) -> StoreResult<Vec<Entity>> {
        let found = ctx
            .race("get", self.scan(ctx, "get", collection, count, query))
            .await?;
        Ok(found.into_iter().map(|(_, doc)| doc).collect())
    }

    #[instrument(skip(self, ctx, query), fields(query = %describe(query)))]
    async fn get_one(
        &self,
        ctx: &OpContext,
        collection: &str,
        query: Option<&QueryNode>,
    ) -> StoreResult<Entity> {
        ctx.race("get_one", self.scan(ctx, "get_one", collection, 1, query))
            .await?
            .pop()
            .map(|(_, doc)| doc)
            .ok_or_else(|| StoreError::not_found(collection, describe(query)))
    }

    #[instrument(skip(self, ctx, query), fields(query = %describe(query)))]
    async fn get_ids(
        &self,
        ctx: &OpContext,
        collection: &str,
        count: usize,
        query: Option<&QueryNode>,
    ) -> StoreResult<Vec<String>> {
        let found = ctx
            .race("get_ids", self.scan(ctx, "get_ids", collection, count, query))
            .await?;
        Ok(found.into_iter().map(|(id, _)| id).collect())
    }

    #[instrument(skip(self, ctx))]
    async fn get_by_id(&self, ctx: &OpContext, collection: &str, id: &str) -> StoreResult<Entity> {
        let path = self.document_path(collection, id)?;
        let collection = collection.to_string();
        let id = id.to_string();
        ctx.spawn("get_by_id", async move {
            load(&path, &id)
                .await?
                .ok_or_else(|| StoreError::not_found(collection, format!("id `{id}`")))
        })
        .await
    }

    #[instrument(skip(self, ctx, entity))]
    async fn create(
        &self,
        ctx: &OpContext,
        collection: &str,
        mut entity: Entity,
    ) -> StoreResult<String> {
        let requested = entity::take_requested_id(&mut entity)?;
        let explicit = requested.is_some();
        let id = requested.unwrap_or_else(entity::generate_id);
        let path = self.document_path(collection, &id)?;
        entity.insert(ID_FIELD.to_string(), Value::String(id.clone()));

        let collection = collection.to_string();
        ctx.spawn("create", async move {
            // Check-then-rename: two creates racing on the same explicit id
            // both succeed and the later one wins.
            if explicit && exists(&path).await? {
                return Err(StoreError::AlreadyExists { collection, id });
            }
            save(&path, &entity).await?;
            debug!(collection = %collection, id = %id, "document created");
            Ok(id)
        })
        .await
    }

    #[instrument(skip(self, ctx, patch))]
    async fn update_by_id(
        &self,
        ctx: &OpContext,
        collection: &str,
        id: &str,
        patch: Entity,
    ) -> StoreResult<()> {
        let path = self.document_path(collection, id)?;
        let patch = entity::prepare_patch(Some(id), patch)?;
        let collection = collection.to_string();
        let id = id.to_string();
        ctx.spawn("update_by_id", async move {
            let mut doc = load(&path, &id)
                .await?
                .ok_or_else(|| StoreError::not_found(collection, format!("id `{id}`")))?;
            entity::merge_patch(&mut doc, patch);
            save(&path, &doc).await
        })
        .await
    }

    #[instrument(skip(self, ctx, query, patch), fields(query = %describe(query)))]
    async fn update(
        &self,
        ctx: &OpContext,
        collection: &str,
        query: Option<&QueryNode>,
        patch: Entity,
    ) -> StoreResult<usize> {
        let patch = entity::prepare_patch(None, patch)?;
        let ids = self.resolve_ids(ctx, "update", collection, query).await?;

        let mut updated = 0;
        for id in ids {
            ctx.check("update")?;
            match self.update_by_id(ctx, collection, &id, patch.clone()).await {
                Ok(()) => updated += 1,
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => warn!(collection, id = %id, error = %e, "update skipped"),
            }
        }
        debug!(collection, updated, "bulk update finished");
        Ok(updated)
    }

    #[instrument(skip(self, ctx))]
    async fn delete_by_id(&self, ctx: &OpContext, collection: &str, id: &str) -> StoreResult<()> {
        let path = self.document_path(collection, id)?;
        let collection = collection.to_string();
        let id = id.to_string();
        ctx.spawn("delete_by_id", async move {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    Err(StoreError::not_found(collection, format!("id `{id}`")))
                }
                Err(e) => {
                    // A nested-id prefix is a directory, not a document.
                    if tokio::fs::metadata(&path).await.is_ok_and(|m| m.is_dir()) {
                        return Err(StoreError::not_found(collection, format!("id `{id}`")));
                    }
                    Err(StoreError::io("delete_by_id", path, e))
                }
            }
        })
        .await
    }

    #[instrument(skip(self, ctx, query), fields(query = %describe(query)))]
    async fn delete(
        &self,
        ctx: &OpContext,
        collection: &str,
        query: Option<&QueryNode>,
    ) -> StoreResult<usize> {
        let ids = self.resolve_ids(ctx, "delete", collection, query).await?;

        let mut deleted = 0;
        for id in ids {
            ctx.check("delete")?;
            match self.delete_by_id(ctx, collection, &id).await {
                Ok(()) => deleted += 1,
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => warn!(collection, id = %id, error = %e, "delete skipped"),
            }
        }
        debug!(collection, deleted, "bulk delete finished");
        Ok(deleted)
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Disk helpers
// ═══════════════════════════════════════════════════════════════════════

/// Reject names that would escape the base directory or collide with temp
/// files.
fn check_segment(kind: &str, value: &str) -> StoreResult<()> {
    if value.is_empty() {
        return Err(StoreError::InvalidArgument(format!("{kind} is empty")));
    }
    if value.ends_with(TEMP_SUFFIX) {
        return Err(StoreError::InvalidArgument(format!(
            "{kind} `{value}` must not end in `{TEMP_SUFFIX}`"
        )));
    }
    let path = Path::new(value);
    if !path
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
    {
        return Err(StoreError::InvalidArgument(format!(
            "{kind} `{value}` must be a plain relative path"
        )));
    }
    Ok(())
}

fn is_temp(name: &str) -> bool {
    name.ends_with(TEMP_SUFFIX)
}

/// Every document id under `dir`, nested ids joined with `/`. A missing
/// directory is an empty collection.
async fn list_ids(ctx: &OpContext, op: &'static str, dir: &Path) -> StoreResult<Vec<String>> {
    let mut ids = Vec::new();
    let mut pending = vec![(dir.to_path_buf(), String::new())];

    while let Some((current, prefix)) = pending.pop() {
        ctx.check(op)?;
        let mut entries = match tokio::fs::read_dir(&current).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => return Err(StoreError::io(op, current, e)),
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(op, &current, e))?
        {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                warn!(path = %entry.path().display(), "skipping non-utf8 file name");
                continue;
            };
            let id = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}/{name}")
            };
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| StoreError::io(op, entry.path(), e))?;
            if file_type.is_dir() {
                pending.push((entry.path(), id));
            } else if !is_temp(&name) {
                ids.push(id);
            }
        }
    }
    Ok(ids)
}

/// Read one document. `Ok(None)` when no file exists at `path`.
async fn load(path: &Path, id: &str) -> StoreResult<Option<Entity>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            // A nested-id prefix is a directory, not a document.
            if tokio::fs::metadata(path).await.is_ok_and(|m| m.is_dir()) {
                return Ok(None);
            }
            return Err(StoreError::io("load", path, e));
        }
    };
    let mut doc: Entity =
        serde_json::from_slice(&bytes).map_err(|e| StoreError::json("load", path, e))?;
    doc.entry(ID_FIELD)
        .or_insert_with(|| Value::String(id.to_string()));
    Ok(Some(doc))
}

async fn exists(path: &Path) -> StoreResult<bool> {
    tokio::fs::try_exists(path)
        .await
        .map_err(|e| StoreError::io("exists", path, e))
}

/// Write `doc` to a sibling temp file and rename it over `path`.
async fn save(path: &Path, doc: &Entity) -> StoreResult<()> {
    let parent = path
        .parent()
        .ok_or_else(|| StoreError::InvalidArgument(format!("{} has no parent", path.display())))?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| StoreError::InvalidArgument(format!("{} has no file name", path.display())))?;

    tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| StoreError::io("save", parent, e))?;

    let bytes = serde_json::to_vec_pretty(doc).map_err(|e| StoreError::json("save", path, e))?;
    let temp = parent.join(format!(".{name}.{}{TEMP_SUFFIX}", Uuid::new_v4()));

    if let Err(e) = write_synced(&temp, &bytes).await {
        discard(&temp).await;
        return Err(StoreError::io("save", &temp, e));
    }
    if let Err(e) = tokio::fs::rename(&temp, path).await {
        discard(&temp).await;
        return Err(StoreError::io("save", path, e));
    }
    Ok(())
}

async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

async fn discard(temp: &Path) {
    if let Err(e) = tokio::fs::remove_file(temp).await {
        if e.kind() != ErrorKind::NotFound {
            warn!(path = %temp.display(), error = %e, "failed to remove temp file");
        }
    }
}

/// Apply `query` to a loaded document; unreadable documents and evaluation
/// errors are logged and dropped.
fn keep(
    collection: &str,
    id: &str,
    loaded: StoreResult<Option<Entity>>,
    query: Option<&QueryNode>,
) -> Option<Entity> {
    let doc = match loaded {
        Ok(Some(doc)) => doc,
        // Deleted between listing and reading.
        Ok(None) => return None,
        Err(e) => {
            warn!(collection, id, error = %e, "skipping unreadable document");
            return None;
        }
    };
    let Some(query) = query else {
        return Some(doc);
    };
    match query.evaluate(&doc) {
        Ok(true) => Some(doc),
        Ok(false) => None,
        Err(e) => {
            warn!(collection, id, error = %e, "skipping document: query failed");
            None
        }
    }
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[path = "file_tests.rs"]
mod tests;
