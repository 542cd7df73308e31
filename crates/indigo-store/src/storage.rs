//! The storage capability contract.
//!
//! Both backends implement [`Storage`] with the same result shapes:
//!
//! | operation              | zero matches        |
//! |------------------------|---------------------|
//! | `get`, `get_ids`       | `Ok(vec![])`        |
//! | `get_one`, `get_by_id` | `NotFound`          |
//! | `update`, `delete`     | `NotFound`          |
//! | `*_by_id`              | `NotFound`          |
//!
//! Collections are created on first write, so reading a collection that was
//! never written is the same as reading an empty one.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::{StorageConfig, StorageKind};
use crate::context::OpContext;
use crate::entity::Entity;
use crate::error::{StoreError, StoreResult};
use crate::file::FileStorage;
use crate::query::QueryNode;

/// Create / read / update / delete against named collections.
///
/// `count == 0` means unlimited; a `None` query matches every document.
/// Every method checks `ctx` on entry and gives up with
/// [`StoreError::Context`] once it stops.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Up to `count` documents matching `query`, in unspecified order.
    async fn get(
        &self,
        ctx: &OpContext,
        collection: &str,
        count: usize,
        query: Option<&QueryNode>,
    ) -> StoreResult<Vec<Entity>>;

    /// The first document matching `query`.
    async fn get_one(
        &self,
        ctx: &OpContext,
        collection: &str,
        query: Option<&QueryNode>,
    ) -> StoreResult<Entity>;

    /// The ids of up to `count` documents matching `query`.
    async fn get_ids(
        &self,
        ctx: &OpContext,
        collection: &str,
        count: usize,
        query: Option<&QueryNode>,
    ) -> StoreResult<Vec<String>>;

    /// The document stored under `id`.
    async fn get_by_id(&self, ctx: &OpContext, collection: &str, id: &str) -> StoreResult<Entity>;

    /// Store a new document and return its id.
    ///
    /// A fresh id is generated unless the entity carries a string `_id`.
    async fn create(&self, ctx: &OpContext, collection: &str, entity: Entity)
    -> StoreResult<String>;

    /// Merge `patch` into the document stored under `id`.
    async fn update_by_id(
        &self,
        ctx: &OpContext,
        collection: &str,
        id: &str,
        patch: Entity,
    ) -> StoreResult<()>;

    /// Merge `patch` into every document matching `query`; returns how many
    /// were updated.
    async fn update(
        &self,
        ctx: &OpContext,
        collection: &str,
        query: Option<&QueryNode>,
        patch: Entity,
    ) -> StoreResult<usize>;

    /// Remove the document stored under `id`.
    async fn delete_by_id(&self, ctx: &OpContext, collection: &str, id: &str) -> StoreResult<()>;

    /// Remove every document matching `query`; returns how many were removed.
    async fn delete(
        &self,
        ctx: &OpContext,
        collection: &str,
        query: Option<&QueryNode>,
    ) -> StoreResult<usize>;
}

/// Open the backend selected by `config`.
///
/// Called once at startup; the returned handle is shared by every caller.
pub async fn open_storage(config: &StorageConfig) -> StoreResult<Arc<dyn Storage>> {
    config.validate()?;

    match config.kind {
        StorageKind::File => {
            let file = config
                .file
                .as_ref()
                .ok_or_else(|| StoreError::Config("missing [storage.file] section".into()))?;
            info!(path = %file.path.display(), "opening file storage");
            let storage = FileStorage::with_options(&file.path, file.options()).await?;
            Ok(Arc::new(storage))
        }
        #[cfg(feature = "mongo")]
        StorageKind::Mongo => {
            let mongo = config
                .mongo
                .as_ref()
                .ok_or_else(|| StoreError::Config("missing [storage.mongo] section".into()))?;
            info!(db = %mongo.db, "opening mongo storage");
            let storage = crate::mongo::MongoStorage::connect(&mongo.uri, &mongo.db).await?;
            Ok(Arc::new(storage))
        }
        #[cfg(not(feature = "mongo"))]
        StorageKind::Mongo => Err(StoreError::Config(
            "storage type `mongo` requires the `mongo` feature".into(),
        )),
    }
}
