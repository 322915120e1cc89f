//! Main document store interface.
//!
//! [`DocumentStore`] owns a backend and hands out [`TypedCollection`]s for model types.
//!
//! # Example
//!
//! ```ignore
//! use docmodel::store::DocumentStore;
//!
//! let store = DocumentStore::new(backend);
//!
//! // Uses the collection declared with `#[record(collection = "...")]`.
//! let users = store.typed_collection::<User>()?;
//!
//! // Any model can be bound to any collection explicitly.
//! let archive = store.bind::<User>("users_archive");
//! ```

use tracing::debug;

use crate::{
    backend::StoreBackend,
    collection::TypedCollection,
    error::{ModelError, ModelResult, StoreResult},
    record::Model,
};

/// A document store bound to a specific backend implementation.
///
/// # Type Parameters
///
/// * `B` - The backend implementation type
#[derive(Debug)]
pub struct DocumentStore<B: StoreBackend> {
    backend: B,
}

impl<B: StoreBackend> DocumentStore<B> {
    /// Creates a new document store with the given backend.
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// The backend this store delegates to.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Binds the model `T` to the collection `name`.
    pub fn bind<'a, T: Model>(&'a self, name: &str) -> TypedCollection<'a, B, T> {
        TypedCollection::new(name.to_string(), &self.backend)
    }

    /// Gets the collection declared by the model type.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Unbound`] when the type declares no collection; use
    /// [`DocumentStore::bind`] for those.
    pub fn typed_collection<'a, T: Model>(&'a self) -> ModelResult<TypedCollection<'a, B, T>> {
        T::collection_name()
            .map(|name| self.bind(name))
            .ok_or(ModelError::Unbound(T::schema().name()))
    }

    /// Drops a collection with the given name. Missing collections are ignored.
    pub async fn drop_collection(&self, name: &str) -> StoreResult<()> {
        self.backend.drop_collection(name).await
    }

    /// Lists all collections in the store.
    pub async fn list_collections(&self) -> StoreResult<Vec<String>> {
        self.backend.list_collections().await
    }

    /// Shuts down the store and releases backend resources.
    ///
    /// This consumes the store and should be called when no longer needed.
    pub async fn shutdown(self) -> StoreResult<()> {
        self.backend.shutdown().await?;

        debug!("document store shut down");
        Ok(())
    }
}
