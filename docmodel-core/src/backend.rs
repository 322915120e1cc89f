//! Storage backend abstraction for the document store.
//!
//! This module defines the contract every store collaborator fulfils: execute a query and
//! stream the matching documents, count, apply an update, insert, delete and drop.
//! Filters and updates arrive as expression trees ([`Expr`], [`UpdateDoc`]); each
//! backend translates them into its own representation.
//!
//! # Traits
//!
//! - [`StoreBackend`]: The core trait for storage backends
//! - [`StoreBackendBuilder`]: Factory trait for creating backend instances
//!
//! # Examples
//!
//! ```ignore
//! use docmodel::backend::StoreBackend;
//! use docmodel::query::Query;
//! use bson::doc;
//! use futures::TryStreamExt;
//!
//! let backend = MyBackendImpl::new();
//!
//! let ids = backend.insert_documents(vec![doc! { "name": "Alice" }], "users").await?;
//! let all = backend
//!     .find_documents(Query::new(), "users")
//!     .await?
//!     .try_collect::<Vec<_>>()
//!     .await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use async_trait::async_trait;
use bson::{Bson, Document};
use futures::stream::BoxStream;
use std::fmt::Debug;

use crate::{
    error::StoreResult,
    query::{Expr, Query},
    update::UpdateDoc,
};

/// A lazily produced sequence of raw documents.
pub type DocumentStream = BoxStream<'static, StoreResult<Document>>;

/// Options for [`StoreBackend::update_documents`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Update every matching document instead of the first one.
    pub multi: bool,
    /// Insert a document when nothing matches.
    pub upsert: bool,
}

/// Options for [`StoreBackend::delete_documents`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    /// Delete every matching document instead of the first one.
    pub multi: bool,
}

/// Outcome of an update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateResult {
    /// Number of documents matched by the filter.
    pub matched: u64,
    /// Number of documents actually changed.
    pub modified: u64,
    /// Identifier of the document inserted by an upsert.
    pub upserted_id: Option<Bson>,
}

/// Abstract interface for document storage backends.
///
/// # Thread Safety
///
/// All implementations must be thread-safe and support concurrent access from multiple
/// async tasks. The exact concurrency model is implementation-specific but should be
/// documented by the implementer.
///
/// # Atomicity
///
/// A single update must be applied atomically per document; merging saves rely on it.
///
/// # Error Handling
///
/// Operations return [`StoreResult<T>`](crate::error::StoreResult). Failures are never
/// retried by callers.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Inserts new documents into a collection.
    ///
    /// Documents without an `_id` receive one assigned by the backend. Inserting an
    /// `_id` that already exists fails with
    /// [`StoreError::DuplicateKey`](crate::error::StoreError::DuplicateKey).
    ///
    /// # Returns
    ///
    /// The identifiers of the inserted documents, in input order.
    async fn insert_documents(
        &self,
        documents: Vec<Document>,
        collection: &str,
    ) -> StoreResult<Vec<Bson>>;

    /// Executes a query and streams the matching documents.
    ///
    /// A missing collection yields an empty stream.
    async fn find_documents(&self, query: Query, collection: &str) -> StoreResult<DocumentStream>;

    /// Counts the documents matching `filter` (`None` matches everything).
    async fn count_documents(&self, filter: Option<Expr>, collection: &str) -> StoreResult<u64>;

    /// Applies `update` to the first or every document matching `filter`.
    ///
    /// With `upsert`, a document is inserted when nothing matches; it is seeded from the
    /// equality constraints of the filter before the update is applied.
    async fn update_documents(
        &self,
        filter: Option<Expr>,
        update: UpdateDoc,
        options: UpdateOptions,
        collection: &str,
    ) -> StoreResult<UpdateResult>;

    /// Deletes the first or every document matching `filter`.
    ///
    /// # Returns
    ///
    /// The number of deleted documents.
    async fn delete_documents(
        &self,
        filter: Option<Expr>,
        options: DeleteOptions,
        collection: &str,
    ) -> StoreResult<u64>;

    /// Drops a collection and all its documents. Dropping a missing collection succeeds.
    async fn drop_collection(&self, name: &str) -> StoreResult<()>;

    /// Lists the names of all collections in the store.
    async fn list_collections(&self) -> StoreResult<Vec<String>>;

    /// Cleanly shuts down the backend, releasing all resources.
    ///
    /// The default implementation is a no-op.
    async fn shutdown(self) -> StoreResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

#[async_trait]
impl<B> StoreBackend for &B
where
    B: StoreBackend,
{
    async fn insert_documents(
        &self,
        documents: Vec<Document>,
        collection: &str,
    ) -> StoreResult<Vec<Bson>> {
        (*self)
            .insert_documents(documents, collection)
            .await
    }

    async fn find_documents(&self, query: Query, collection: &str) -> StoreResult<DocumentStream> {
        (*self).find_documents(query, collection).await
    }

    async fn count_documents(&self, filter: Option<Expr>, collection: &str) -> StoreResult<u64> {
        (*self).count_documents(filter, collection).await
    }

    async fn update_documents(
        &self,
        filter: Option<Expr>,
        update: UpdateDoc,
        options: UpdateOptions,
        collection: &str,
    ) -> StoreResult<UpdateResult> {
        (*self)
            .update_documents(filter, update, options, collection)
            .await
    }

    async fn delete_documents(
        &self,
        filter: Option<Expr>,
        options: DeleteOptions,
        collection: &str,
    ) -> StoreResult<u64> {
        (*self)
            .delete_documents(filter, options, collection)
            .await
    }

    async fn drop_collection(&self, name: &str) -> StoreResult<()> {
        (*self).drop_collection(name).await
    }

    async fn list_collections(&self) -> StoreResult<Vec<String>> {
        (*self).list_collections().await
    }
}

/// Factory for backends whose construction is asynchronous (connecting, pinging).
#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> StoreResult<Self::Backend>;
}
