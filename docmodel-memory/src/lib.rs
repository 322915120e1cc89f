//! In-memory document storage backend for docmodel.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreBackend` trait.
//! It uses async-aware read-write locks for concurrent access and is ideal for development
//! and testing.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **Document database semantics** - Dotted paths, sequence matching, upserts
//! - **Full query support** - Supports filtering, multi-key sorting, and pagination
//! - **Atomic updates** - Every update is applied to a document as a whole or not at all
//!
//! # Quick Start
//!
//! ```ignore
//! use docmodel::prelude::*;
//!
//! #[derive(Debug, Clone, PartialEq, Record)]
//! #[record(collection = "users")]
//! pub struct User {
//!     #[record(id)]
//!     pub id: Option<ObjectId>,
//!     pub name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = InMemoryStore::builder().build().await?;
//!     let store = DocumentStore::new(backend);
//!     let users = store.typed_collection::<User>()?;
//!
//!     let mut user = User { id: None, name: "Alice".to_string() };
//!     users.insert_one(&mut user).await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmodel_memory;

pub mod store;
pub(crate) mod evaluator;
pub(crate) mod update;

pub use store::{InMemoryStore, InMemoryStoreBuilder};
