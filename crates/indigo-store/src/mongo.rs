//! MongoDB backend.
//!
//! One [`mongodb::Client`] is created at startup and shared by every call;
//! the driver pools connections internally. Queries compile to native
//! filters through [`QueryNode::compile_filter`].

use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{Document, doc};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::{Client, Collection, Database};
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::context::{ContextError, OpContext};
use crate::entity::{self, Entity, ID_FIELD};
use crate::error::{StoreError, StoreResult};
use crate::filter::{
    compile_optional, document_to_entity, entity_to_document, id_filter, id_to_string,
};
use crate::query::{QueryNode, describe};
use crate::storage::Storage;

const PING_TIMEOUT: Duration = Duration::from_secs(2);
const DUPLICATE_KEY: i32 = 11000;

/// [`Storage`] backed by a MongoDB database.
#[derive(Debug, Clone)]
pub struct MongoStorage {
    client: Client,
    db: Database,
}

impl MongoStorage {
    /// Connect to `uri`, select database `db` and check the server answers.
    pub async fn connect(uri: &str, db: &str) -> StoreResult<Self> {
        let client = Client::with_uri_str(uri)
            .await
            .map_err(|e| StoreError::mongo("connect", e))?;
        let storage = Self::from_client(client, db);
        storage.ping().await?;
        info!(db, "connected to mongo");
        Ok(storage)
    }

    /// Wrap an existing client without pinging.
    pub fn from_client(client: Client, db: &str) -> Self {
        let db = client.database(db);
        Self { client, db }
    }

    /// Round-trip a `ping` command.
    pub async fn ping(&self) -> StoreResult<()> {
        match tokio::time::timeout(PING_TIMEOUT, self.db.run_command(doc! { "ping": 1 })).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(StoreError::mongo("ping", e)),
            Err(_) => Err(StoreError::Context {
                op: "ping",
                source: ContextError::DeadlineExceeded,
            }),
        }
    }

    /// The underlying client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// The selected database.
    pub fn database(&self) -> &Database {
        &self.db
    }

    fn collection(&self, name: &str) -> StoreResult<Collection<Document>> {
        if name.is_empty() {
            return Err(StoreError::InvalidArgument("collection is empty".into()));
        }
        Ok(self.db.collection::<Document>(name))
    }

    /// Drain a cursor, checking the context between documents.
    async fn find_all(
        &self,
        ctx: &OpContext,
        op: &'static str,
        collection: &str,
        filter: Document,
        count: usize,
        projection: Option<Document>,
    ) -> StoreResult<Vec<Document>> {
        let coll = self.collection(collection)?;
        let mut find = coll.find(filter);
        if count > 0 {
            find = find.limit(i64::try_from(count).unwrap_or(i64::MAX));
        }
        if let Some(projection) = projection {
            find = find.projection(projection);
        }
        let mut cursor = find.await.map_err(|e| StoreError::mongo(op, e))?;

        let mut docs = Vec::new();
        while let Some(doc) = cursor
            .try_next()
            .await
            .map_err(|e| StoreError::mongo(op, e))?
        {
            ctx.check(op)?;
            docs.push(doc);
        }
        Ok(docs)
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == DUPLICATE_KEY
    )
}

fn to_count(n: u64) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}

#[async_trait]
impl Storage for MongoStorage {
    #[instrument(skip(self, ctx, query), fields(query = %describe(query)))]
    async fn get(
        &self,
        ctx: &OpContext,
        collection: &str,
        count: usize,
        query: Option<&QueryNode>,
    ) -> StoreResult<Vec<Entity>> {
        let filter = compile_optional(query)?;
        let docs = ctx
            .race("get", self.find_all(ctx, "get", collection, filter, count, None))
            .await?;
        Ok(docs.into_iter().map(document_to_entity).collect())
    }

    #[instrument(skip(self, ctx, query), fields(query = %describe(query)))]
    async fn get_one(
        &self,
        ctx: &OpContext,
        collection: &str,
        query: Option<&QueryNode>,
    ) -> StoreResult<Entity> {
        let filter = compile_optional(query)?;
        let coll = self.collection(collection)?;
        let found = ctx
            .race("get_one", async {
                coll.find_one(filter)
                    .await
                    .map_err(|e| StoreError::mongo("get_one", e))
            })
            .await?;
        found
            .map(document_to_entity)
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
        let filter = compile_optional(query)?;
        let projection = doc! { ID_FIELD: 1 };
        let docs = ctx
            .race(
                "get_ids",
                self.find_all(ctx, "get_ids", collection, filter, count, Some(projection)),
            )
            .await?;
        Ok(docs
            .into_iter()
            .filter_map(|mut doc| doc.remove(ID_FIELD).map(id_to_string))
            .collect())
    }

    #[instrument(skip(self, ctx))]
    async fn get_by_id(&self, ctx: &OpContext, collection: &str, id: &str) -> StoreResult<Entity> {
        let coll = self.collection(collection)?;
        let found = ctx
            .race("get_by_id", async {
                coll.find_one(id_filter(id))
                    .await
                    .map_err(|e| StoreError::mongo("get_by_id", e))
            })
            .await?;
        found
            .map(document_to_entity)
            .ok_or_else(|| StoreError::not_found(collection, format!("id `{id}`")))
    }

    #[instrument(skip(self, ctx, entity))]
    async fn create(
        &self,
        ctx: &OpContext,
        collection: &str,
        mut entity: Entity,
    ) -> StoreResult<String> {
        let requested = entity::take_requested_id(&mut entity)?;
        if let Some(id) = &requested {
            entity.insert(ID_FIELD.to_string(), Value::String(id.clone()));
        }
        let doc = entity_to_document(&entity)?;
        let coll = self.collection(collection)?;

        let inserted = ctx
            .race("create", async {
                coll.insert_one(doc).await.map_err(|e| {
                    if is_duplicate_key(&e) {
                        StoreError::AlreadyExists {
                            collection: collection.to_string(),
                            id: requested.clone().unwrap_or_default(),
                        }
                    } else {
                        StoreError::mongo("create", e)
                    }
                })
            })
            .await?;
        let id = id_to_string(inserted.inserted_id);
        debug!(collection, id = %id, "document created");
        Ok(id)
    }

    #[instrument(skip(self, ctx, patch))]
    async fn update_by_id(
        &self,
        ctx: &OpContext,
        collection: &str,
        id: &str,
        patch: Entity,
    ) -> StoreResult<()> {
        let patch = entity::prepare_patch(Some(id), patch)?;
        let set = entity_to_document(&patch)?;
        let coll = self.collection(collection)?;

        let result = ctx
            .race("update_by_id", async {
                coll.update_one(id_filter(id), doc! { "$set": set })
                    .await
                    .map_err(|e| StoreError::mongo("update_by_id", e))
            })
            .await?;
        if result.matched_count == 0 {
            return Err(StoreError::not_found(collection, format!("id `{id}`")));
        }
        if result.modified_count == 0 {
            return Err(StoreError::NothingModified {
                op: "update_by_id",
                collection: collection.to_string(),
            });
        }
        Ok(())
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
        let set = entity_to_document(&patch)?;
        let filter = compile_optional(query)?;
        let coll = self.collection(collection)?;

        let result = ctx
            .race("update", async {
                coll.update_many(filter, doc! { "$set": set })
                    .await
                    .map_err(|e| StoreError::mongo("update", e))
            })
            .await?;
        if result.matched_count == 0 {
            return Err(StoreError::not_found(collection, describe(query)));
        }
        if result.modified_count == 0 {
            return Err(StoreError::NothingModified {
                op: "update",
                collection: collection.to_string(),
            });
        }
        let updated = to_count(result.modified_count);
        debug!(collection, updated, "bulk update finished");
        Ok(updated)
    }

    #[instrument(skip(self, ctx))]
    async fn delete_by_id(&self, ctx: &OpContext, collection: &str, id: &str) -> StoreResult<()> {
        let coll = self.collection(collection)?;
        let result = ctx
            .race("delete_by_id", async {
                coll.delete_one(id_filter(id))
                    .await
                    .map_err(|e| StoreError::mongo("delete_by_id", e))
            })
            .await?;
        if result.deleted_count == 0 {
            return Err(StoreError::not_found(collection, format!("id `{id}`")));
        }
        Ok(())
    }

    #[instrument(skip(self, ctx, query), fields(query = %describe(query)))]
    async fn delete(
        &self,
        ctx: &OpContext,
        collection: &str,
        query: Option<&QueryNode>,
    ) -> StoreResult<usize> {
        let filter = compile_optional(query)?;
        let coll = self.collection(collection)?;
        let result = ctx
            .race("delete", async {
                coll.delete_many(filter)
                    .await
                    .map_err(|e| StoreError::mongo("delete", e))
            })
            .await?;
        if result.deleted_count == 0 {
            return Err(StoreError::not_found(collection, describe(query)));
        }
        let deleted = to_count(result.deleted_count);
        debug!(collection, deleted, "bulk delete finished");
        Ok(deleted)
    }
}

