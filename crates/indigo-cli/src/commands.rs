//! Subcommand execution.
//!
//! Every subcommand maps to one [`Storage`] call and yields the JSON value
//! printed on stdout.

use anyhow::{Context, Result};
use indigo_store::{OpContext, Storage, StorageConfig};
use serde_json::{Value, json};

use crate::cli::Commands;
use crate::helpers::parse_entity;

/// Run `command` against `storage`.
pub async fn execute(
    storage: &dyn Storage,
    ctx: &OpContext,
    config: &StorageConfig,
    command: Commands,
) -> Result<Value> {
    let output = match command {
        Commands::Create { collection, json } => {
            let entity = parse_entity(&json)?;
            let id = storage
                .create(ctx, &collection, entity)
                .await
                .with_context(|| format!("create in `{collection}` failed"))?;
            json!({ "_id": id })
        }
        Commands::Get {
            collection,
            filter,
            limit,
        } => {
            let query = filter.query()?;
            let docs = storage
                .get(ctx, &collection, limit, query.as_ref())
                .await
                .with_context(|| format!("get from `{collection}` failed"))?;
            Value::Array(docs.into_iter().map(Value::Object).collect())
        }
        Commands::GetOne { collection, filter } => {
            let query = filter.query()?;
            let doc = storage
                .get_one(ctx, &collection, query.as_ref())
                .await
                .with_context(|| format!("get-one from `{collection}` failed"))?;
            Value::Object(doc)
        }
        Commands::Ids {
            collection,
            filter,
            limit,
        } => {
            let query = filter.query()?;
            let ids = storage
                .get_ids(ctx, &collection, limit, query.as_ref())
                .await
                .with_context(|| format!("ids from `{collection}` failed"))?;
            json!(ids)
        }
        Commands::GetById { collection, id } => {
            let doc = storage
                .get_by_id(ctx, &collection, &id)
                .await
                .with_context(|| format!("get `{id}` from `{collection}` failed"))?;
            Value::Object(doc)
        }
        Commands::Update {
            collection,
            json,
            filter,
        } => {
            let patch = parse_entity(&json)?;
            let query = filter.query()?;
            let updated = storage
                .update(ctx, &collection, query.as_ref(), patch)
                .await
                .with_context(|| format!("update in `{collection}` failed"))?;
            json!({ "updated": updated })
        }
        Commands::UpdateById {
            collection,
            id,
            json,
        } => {
            let patch = parse_entity(&json)?;
            storage
                .update_by_id(ctx, &collection, &id, patch)
                .await
                .with_context(|| format!("update `{id}` in `{collection}` failed"))?;
            json!({ "updated": 1 })
        }
        Commands::Delete { collection, filter } => {
            let query = filter.query()?;
            let deleted = storage
                .delete(ctx, &collection, query.as_ref())
                .await
                .with_context(|| format!("delete from `{collection}` failed"))?;
            json!({ "deleted": deleted })
        }
        Commands::DeleteById { collection, id } => {
            storage
                .delete_by_id(ctx, &collection, &id)
                .await
                .with_context(|| format!("delete `{id}` from `{collection}` failed"))?;
            json!({ "deleted": 1 })
        }
        Commands::Check => json!({ "status": "ok", "backend": config.kind.to_string() }),
    };
    Ok(output)
}
