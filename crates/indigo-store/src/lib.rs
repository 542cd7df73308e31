//! # indigo-store
//!
//! Entity storage engine for Indigo.
//!
//! Schemaless JSON documents live in named collections behind one
//! [`Storage`] trait. A backend is chosen once at startup from
//! [`StorageConfig`]; callers build queries with [`QueryBuilder`] (or the
//! [`condition`] / [`and`] / [`or`] constructors) and never see backend
//! filter syntax.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  QueryBuilder / condition / and / or         │
//! ├──────────────────────────────────────────────┤
//! │  QueryNode (Condition | BinaryOp)            │
//! │    evaluate()        compile_filter()        │
//! ├──────────────────────┬───────────────────────┤
//! │  FileStorage         │  MongoStorage         │
//! │  JSON file per doc,  │  pooled client,       │
//! │  temp + rename       │  native filters       │
//! ├──────────────────────┴───────────────────────┤
//! │  Storage trait · OpContext · StoreError      │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```ignore
//! use indigo_store::{CompareOp, OpContext, StorageConfig, condition, open_storage};
//!
//! let storage = open_storage(&StorageConfig::file("data/storage")).await?;
//! let ctx = OpContext::with_timeout(std::time::Duration::from_secs(5));
//!
//! let id = storage.create(&ctx, "users", user).await?;
//! let adults = storage
//!     .get(&ctx, "users", 0, Some(&condition("age", CompareOp::Ge, 18)))
//!     .await?;
//! ```

pub mod builder;
pub mod config;
pub mod context;
pub mod entity;
pub mod error;
pub mod file;
#[cfg(feature = "mongo")]
pub mod filter;
#[cfg(feature = "mongo")]
pub mod mongo;
pub mod query;
pub mod storage;

// ── re-exports ───────────────────────────────────────────────────────

pub use builder::{QueryBuilder, and, condition, or, parse_condition};
pub use config::{FileSection, MongoSection, StorageConfig, StorageKind};
pub use context::{ContextError, OpContext};
pub use entity::{Entity, ID_FIELD};
pub use error::{StoreError, StoreResult};
pub use file::{FileOptions, FileStorage};
#[cfg(feature = "mongo")]
pub use mongo::MongoStorage;
pub use query::{BinaryOp, CompareOp, Condition, LogicalOp, QueryError, QueryNode};
pub use storage::{Storage, open_storage};
