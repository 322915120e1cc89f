//! Typed persistence over one collection.
//!
//! [`TypedCollection`] binds a [`Model`] type to a named collection of a backend and
//! offers the full set of persistence operations for it. Records are encoded with
//! [`Record::to_document`](crate::record::Record::to_document) on the way in and
//! decoded lazily on the way out.
//!
//! # Example
//!
//! ```ignore
//! use docmodel::prelude::*;
//!
//! # async fn example(store: &DocumentStore<InMemoryStore>) -> ModelResult<()> {
//! let people = store.typed_collection::<Person>()?;
//! let f = Person::fields();
//!
//! let mut ada = Person { id: None, name: "Ada".into(), age: 36 };
//! people.insert_one(&mut ada).await?;
//!
//! people.update_many(f.age.gte(30), f.age.inc(1)).await?;
//! let found = people.find_one(f.name.eq("Ada")).await?;
//! # Ok(()) }
//! ```

use bson::{Bson, Document};
use futures::StreamExt;
use std::marker::PhantomData;
use tracing::debug;

use crate::{
    backend::{DeleteOptions, StoreBackend, UpdateOptions, UpdateResult},
    cursor::Cursor,
    error::{ExpressionError, ModelError, ModelResult},
    field::ID_KEY,
    query::{Filter, FindOptions},
    record::Model,
    update::{Update, UpdateLeaf, UpdateOp},
    value::{FieldValue, Identifier},
};

/// A collection holding documents of the model `T`.
///
/// # Type Parameters
///
/// * `'a` - Lifetime of the backend reference
/// * `B` - The storage backend type
/// * `T` - The model stored in the collection
#[derive(Debug)]
pub struct TypedCollection<'a, B: StoreBackend, T: Model> {
    name: String,
    backend: &'a B,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, B: StoreBackend, T: Model> TypedCollection<'a, B, T> {
    pub(crate) fn new(name: String, backend: &'a B) -> Self {
        Self { name, backend, _marker: PhantomData }
    }

    /// Returns the name of this collection.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Inserts one record and populates its identifier.
    ///
    /// An unset identifier is generated client-side. Identifier types that cannot be
    /// generated must be set by the caller.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::MissingIdentifier`] when the identifier is unset and its
    /// type cannot be generated, and
    /// [`StoreError::DuplicateKey`](crate::error::StoreError::DuplicateKey)
    /// (wrapped in [`ModelError::Store`]) when the identifier is already taken.
    pub async fn insert_one(&self, instance: &mut T) -> ModelResult<()> {
        self.insert_many(std::slice::from_mut(instance)).await
    }

    /// Inserts several records in one call and populates their identifiers.
    ///
    /// Nothing is sent to the store when any record lacks an identifier that
    /// cannot be generated.
    pub async fn insert_many(&self, instances: &mut [T]) -> ModelResult<()> {
        if instances.is_empty() {
            return Ok(());
        }

        if T::Id::generate().is_none() && instances.iter().any(|instance| instance.id().is_none()) {
            return Err(ModelError::MissingIdentifier(T::schema().name()));
        }

        let documents = instances
            .iter_mut()
            .map(prepare_insert)
            .collect::<Vec<Document>>();

        let ids = self
            .backend
            .insert_documents(documents, &self.name)
            .await?;

        debug!(collection = %self.name, count = ids.len(), "inserted records");
        Ok(())
    }

    /// Returns the first record matching `filter`.
    pub async fn find_one(&self, filter: Filter<T>) -> ModelResult<Option<T>> {
        let mut cursor = self
            .find_with(filter, FindOptions::new().limit(1))
            .await?;

        cursor.next().await.transpose()
    }

    /// Returns a lazy cursor over every record matching `filter`.
    pub async fn find(&self, filter: Filter<T>) -> ModelResult<Cursor<T>> {
        self.find_with(filter, FindOptions::new()).await
    }

    /// Returns a lazy cursor honoring limit, skip and sort options.
    pub async fn find_with(&self, filter: Filter<T>, options: FindOptions) -> ModelResult<Cursor<T>> {
        let query = options.into_query(filter.into_expr());
        let documents = self
            .backend
            .find_documents(query, &self.name)
            .await?;

        Ok(Cursor::new(documents))
    }

    /// Returns the record stored under `id`.
    pub async fn find_by_id(&self, id: &T::Id) -> ModelResult<Option<T>> {
        self.find_one(Filter::by_id(id)).await
    }

    /// Counts the records matching `filter`.
    pub async fn count(&self, filter: Filter<T>) -> ModelResult<u64> {
        Ok(self
            .backend
            .count_documents(filter.into_expr(), &self.name)
            .await?)
    }

    /// Saves a record, merging it into the stored document.
    ///
    /// A record without identifier is inserted. Otherwise a single upserting update is
    /// sent that sets every present field, descending into nested records; fields absent
    /// from the record keep their stored value. Sequences are replaced whole.
    pub async fn save(&self, instance: &mut T) -> ModelResult<()> {
        let Some(id) = instance.id().cloned() else {
            return self.insert_one(instance).await;
        };

        let mut update = Update::merge(instance).into_doc();
        if update.is_empty() {
            update.push(UpdateLeaf {
                path: ID_KEY.to_string(),
                op: UpdateOp::SetOnInsert,
                value: id.to_bson().unwrap_or(Bson::Null),
            })?;
        }

        let result = self
            .backend
            .update_documents(
                Filter::<T>::by_id(&id).into_expr(),
                update,
                UpdateOptions { multi: false, upsert: true },
                &self.name,
            )
            .await?;

        debug!(
            collection = %self.name,
            id = ?id,
            upserted = result.upserted_id.is_some(),
            "saved record"
        );
        Ok(())
    }

    /// Applies `update` to the first record matching `filter`.
    pub async fn update_one(&self, filter: Filter<T>, update: Update<T>) -> ModelResult<UpdateResult> {
        self.update(filter, update, false).await
    }

    /// Applies `update` to every record matching `filter`.
    pub async fn update_many(&self, filter: Filter<T>, update: Update<T>) -> ModelResult<UpdateResult> {
        self.update(filter, update, true).await
    }

    async fn update(&self, filter: Filter<T>, update: Update<T>, multi: bool) -> ModelResult<UpdateResult> {
        if update.is_empty() {
            return Err(ExpressionError::EmptyUpdate.into());
        }

        let result = self
            .backend
            .update_documents(
                filter.into_expr(),
                update.into_doc(),
                UpdateOptions { multi, upsert: false },
                &self.name,
            )
            .await?;

        debug!(
            collection = %self.name,
            matched = result.matched,
            modified = result.modified,
            "updated records"
        );
        Ok(result)
    }

    /// Deletes the first record matching `filter`, returning the number deleted.
    pub async fn delete_one(&self, filter: Filter<T>) -> ModelResult<u64> {
        self.delete(filter, false).await
    }

    /// Deletes every record matching `filter`, returning the number deleted.
    pub async fn delete_many(&self, filter: Filter<T>) -> ModelResult<u64> {
        self.delete(filter, true).await
    }

    async fn delete(&self, filter: Filter<T>, multi: bool) -> ModelResult<u64> {
        let deleted = self
            .backend
            .delete_documents(filter.into_expr(), DeleteOptions { multi }, &self.name)
            .await?;

        debug!(collection = %self.name, deleted, "deleted records");
        Ok(deleted)
    }

    /// Deletes the stored document of `instance`. The instance itself stays usable.
    ///
    /// # Returns
    ///
    /// Whether a document was deleted.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::MissingIdentifier`] when the identifier is unset.
    pub async fn remove(&self, instance: &T) -> ModelResult<bool> {
        let id = instance
            .id()
            .ok_or(ModelError::MissingIdentifier(T::schema().name()))?;

        Ok(self.delete_one(Filter::by_id(id)).await? > 0)
    }

    /// Drops the collection. Dropping a missing collection succeeds.
    pub async fn drop(&self) -> ModelResult<()> {
        self.backend.drop_collection(&self.name).await?;

        debug!(collection = %self.name, "dropped collection");
        Ok(())
    }
}

fn prepare_insert<T: Model>(instance: &mut T) -> Document {
    if instance.id().is_none() {
        if let Some(id) = T::Id::generate() {
            instance.set_id(id);
        }
    }

    instance.to_document()
}
