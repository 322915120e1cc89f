//! Convenient re-exports of commonly used types from docmodel.
//!
//! ```ignore
//! use docmodel::prelude::*;
//! ```

pub use docmodel_core::{
    backend::{StoreBackend, StoreBackendBuilder, UpdateResult},
    collection::TypedCollection,
    cursor::Cursor,
    error::{ModelError, ModelResult, StoreError, StoreResult},
    query::{Filter, FindOptions, Sort, SortDirection},
    record::{Model, Record, RecordExt},
    store::DocumentStore,
    update::Update,
};
pub use docmodel_macros::Record;
pub use docmodel_memory::InMemoryStore;

pub use bson::oid::ObjectId;
pub use futures::{StreamExt, TryStreamExt};
