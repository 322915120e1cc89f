//! In-memory storage implementation for document stores.
//!
//! Collections are vectors of BSON documents in insertion order, kept behind an
//! async-aware read-write lock.

use std::{cmp::Ordering, collections::HashMap, sync::Arc};
use async_trait::async_trait;
use futures::{StreamExt, stream};
use mea::rwlock::RwLock;
use bson::{Bson, Document, oid::ObjectId};
use tracing::trace;

use docmodel_core::{
    backend::{
        DeleteOptions, DocumentStream, StoreBackend, StoreBackendBuilder, UpdateOptions,
        UpdateResult,
    },
    error::{StoreError, StoreResult},
    field::ID_KEY,
    query::{Expr, Query, SortDirection},
    update::UpdateDoc,
};

use crate::{
    evaluator::{Comparable, DocumentEvaluator, sort_order},
    update::{apply_update, get_path, seed_document},
};

type StoreMap = HashMap<String, Vec<Document>>;

/// Thread-safe in-memory document storage backend.
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, allowing it to
/// be shared across async tasks. Clones of the same instance share the same data.
///
/// Queries scan every document of a collection; there is no indexing.
///
/// # Example
///
/// ```ignore
/// use docmodel_memory::InMemoryStore;
/// use docmodel::backend::StoreBackend;
/// use bson::doc;
///
/// let store = InMemoryStore::new();
/// let ids = store.insert_documents(vec![doc! { "name": "Alice" }], "users").await?;
/// assert_eq!(store.count_documents(None, "users").await?, 1);
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    /// collection name -> documents in insertion order
    store: Arc<RwLock<StoreMap>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory document store.
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(StoreMap::new())),
        }
    }

    /// Creates a builder for constructing an `InMemoryStore`.
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }
}

fn matching(documents: &[Document], filter: Option<&Expr>) -> StoreResult<Vec<usize>> {
    let mut positions = Vec::new();

    for (position, document) in documents.iter().enumerate() {
        if DocumentEvaluator::matches(document, filter)? {
            positions.push(position);
        }
    }

    Ok(positions)
}

/// Puts `_id` first, generating one when missing.
fn with_identifier(document: Document) -> Document {
    let id = document
        .get(ID_KEY)
        .cloned()
        .unwrap_or_else(|| Bson::ObjectId(ObjectId::new()));

    let mut ordered = Document::new();
    ordered.insert(ID_KEY, id);
    for (key, value) in document {
        if key != ID_KEY {
            ordered.insert(key, value);
        }
    }
    ordered
}

fn contains_id(documents: &[Document], id: &Bson) -> bool {
    let id = Comparable::from(id);
    documents
        .iter()
        .filter_map(|document| document.get(ID_KEY))
        .any(|existing| Comparable::from(existing) == id)
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn insert_documents(
        &self,
        documents: Vec<Document>,
        collection: &str,
    ) -> StoreResult<Vec<Bson>> {
        let documents = documents
            .into_iter()
            .map(with_identifier)
            .collect::<Vec<_>>();

        let mut store = self.store.write().await;
        let existing = store.get(collection).map(Vec::as_slice).unwrap_or_default();

        // The batch is rejected as a whole before anything is written.
        for (position, document) in documents.iter().enumerate() {
            if let Some(id) = document.get(ID_KEY) {
                if contains_id(existing, id) || contains_id(&documents[..position], id) {
                    return Err(StoreError::DuplicateKey(id.to_string(), collection.to_string()));
                }
            }
        }

        let ids = documents
            .iter()
            .filter_map(|document| document.get(ID_KEY).cloned())
            .collect::<Vec<_>>();

        trace!(collection, count = documents.len(), "inserting documents");

        store
            .entry(collection.to_string())
            .or_default()
            .extend(documents);

        Ok(ids)
    }

    async fn find_documents(&self, query: Query, collection: &str) -> StoreResult<DocumentStream> {
        let store = self.store.read().await;
        let documents = match store.get(collection) {
            Some(documents) => documents,
            None => return Ok(stream::empty().boxed()),
        };

        let mut found = matching(documents, query.filter.as_ref())?
            .into_iter()
            .map(|position| &documents[position])
            .collect::<Vec<_>>();

        if !query.sort.is_empty() {
            found.sort_by(|a, b| {
                query
                    .sort
                    .iter()
                    .map(|sort| {
                        let order = sort_order(get_path(a, &sort.field), get_path(b, &sort.field));
                        match sort.direction {
                            SortDirection::Asc => order,
                            SortDirection::Desc => order.reverse(),
                        }
                    })
                    .find(|order| *order != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            });
        }

        let results = found
            .into_iter()
            .skip(query.offset.unwrap_or(0))
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .map(Ok)
            .collect::<Vec<_>>();

        trace!(collection, count = results.len(), "found documents");

        Ok(stream::iter(results).boxed())
    }

    async fn count_documents(&self, filter: Option<Expr>, collection: &str) -> StoreResult<u64> {
        let store = self.store.read().await;

        match store.get(collection) {
            Some(documents) => Ok(matching(documents, filter.as_ref())?.len() as u64),
            None => Ok(0),
        }
    }

    async fn update_documents(
        &self,
        filter: Option<Expr>,
        update: UpdateDoc,
        options: UpdateOptions,
        collection: &str,
    ) -> StoreResult<UpdateResult> {
        let mut store = self.store.write().await;
        if !options.upsert && !store.contains_key(collection) {
            return Ok(UpdateResult::default());
        }
        let documents = store.entry(collection.to_string()).or_default();

        let mut positions = matching(documents, filter.as_ref())?;
        if !options.multi {
            positions.truncate(1);
        }

        let mut result = UpdateResult {
            matched: positions.len() as u64,
            ..UpdateResult::default()
        };

        for position in positions {
            let document = &mut documents[position];
            let before = document.clone();

            apply_update(document, &update, false)?;

            if *document != before {
                result.modified += 1;
            }
        }

        if result.matched == 0 && options.upsert {
            let mut document = seed_document(filter.as_ref())?;
            apply_update(&mut document, &update, true)?;

            let document = with_identifier(document);
            if let Some(id) = document.get(ID_KEY) {
                if contains_id(documents, id) {
                    return Err(StoreError::DuplicateKey(id.to_string(), collection.to_string()));
                }
                result.upserted_id = Some(id.clone());
            }

            documents.push(document);
        }

        trace!(
            collection,
            matched = result.matched,
            modified = result.modified,
            upserted = result.upserted_id.is_some(),
            "updated documents"
        );

        Ok(result)
    }

    async fn delete_documents(
        &self,
        filter: Option<Expr>,
        options: DeleteOptions,
        collection: &str,
    ) -> StoreResult<u64> {
        let mut store = self.store.write().await;
        let Some(documents) = store.get_mut(collection) else {
            return Ok(0);
        };

        let mut positions = matching(documents, filter.as_ref())?;
        if !options.multi {
            positions.truncate(1);
        }

        for position in positions.iter().rev() {
            documents.remove(*position);
        }

        trace!(collection, count = positions.len(), "deleted documents");

        Ok(positions.len() as u64)
    }

    async fn drop_collection(&self, name: &str) -> StoreResult<()> {
        let mut store = self.store.write().await;

        if store.remove(name).is_some() {
            trace!(collection = name, "dropped collection");
        }

        Ok(())
    }

    async fn list_collections(&self) -> StoreResult<Vec<String>> {
        let mut names = self
            .store
            .read()
            .await
            .keys()
            .cloned()
            .collect::<Vec<_>>();

        names.sort();
        Ok(names)
    }
}

/// Builder for constructing [`InMemoryStore`] instances.
///
/// # Example
///
/// ```ignore
/// use docmodel_memory::InMemoryStore;
/// use docmodel::backend::StoreBackendBuilder;
///
/// let store = InMemoryStore::builder().build().await?;
/// ```
#[derive(Default)]
pub struct InMemoryStoreBuilder;

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    /// Builds a freshly initialized [`InMemoryStore`]. This always succeeds.
    async fn build(self) -> StoreResult<Self::Backend> {
        Ok(InMemoryStore::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use docmodel_core::{
        query::{FieldOp, Sort},
        update::{UpdateLeaf, UpdateOp},
    };
    use futures::TryStreamExt;

    fn eq(path: &str, value: impl Into<Bson>) -> Option<Expr> {
        Some(Expr::field(path.to_string(), FieldOp::Eq, value.into()))
    }

    fn set(path: &str, value: impl Into<Bson>) -> UpdateDoc {
        let mut update = UpdateDoc::new();
        update
            .push(UpdateLeaf { path: path.to_string(), op: UpdateOp::Set, value: value.into() })
            .unwrap();
        update
    }

    async fn find_all(store: &InMemoryStore, query: Query) -> Vec<Document> {
        store
            .find_documents(query, "items")
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn insert_assigns_identifiers_and_rejects_duplicates() {
        let store = InMemoryStore::new();

        let ids = store
            .insert_documents(vec![doc! { "x": 1 }, doc! { "_id": 5, "x": 2 }], "items")
            .await
            .unwrap();

        assert!(matches!(ids[0], Bson::ObjectId(_)));
        assert_eq!(ids[1], Bson::Int32(5));

        let err = store
            .insert_documents(vec![doc! { "_id": 5_i64 }], "items")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey(_, _)));
        assert_eq!(store.count_documents(None, "items").await.unwrap(), 2);

        let stored = find_all(&store, Query::new()).await;
        assert_eq!(stored[1], doc! { "_id": 5, "x": 2 });
        assert_eq!(stored[0].keys().next().map(String::as_str), Some(ID_KEY));
    }

    #[tokio::test]
    async fn find_sorts_skips_and_limits() {
        let store = InMemoryStore::new();
        store
            .insert_documents(
                (0..6).map(|i| doc! { "_id": i, "group": i % 2, "n": 10 - i }).collect(),
                "items",
            )
            .await
            .unwrap();

        let query = Query::builder()
            .sort(Sort { field: "group".into(), direction: SortDirection::Desc })
            .sort(Sort { field: "n".into(), direction: SortDirection::Asc })
            .offset(Some(1))
            .limit(Some(3))
            .build();

        let ids = find_all(&store, query)
            .await
            .iter()
            .map(|document| document.get_i32("_id").unwrap())
            .collect::<Vec<_>>();

        assert_eq!(ids, vec![3, 1, 4]);
    }

    #[tokio::test]
    async fn missing_collections_are_empty() {
        let store = InMemoryStore::new();

        assert!(find_all(&store, Query::new()).await.is_empty());
        assert_eq!(store.count_documents(None, "items").await.unwrap(), 0);
        assert_eq!(store.delete_documents(None, DeleteOptions { multi: true }, "items").await.unwrap(), 0);
        store.drop_collection("items").await.unwrap();
    }

    #[tokio::test]
    async fn update_first_or_every_match() {
        let store = InMemoryStore::new();
        store
            .insert_documents(vec![doc! { "k": 1 }, doc! { "k": 1 }, doc! { "k": 2 }], "items")
            .await
            .unwrap();

        let single = store
            .update_documents(eq("k", 1), set("flag", true), UpdateOptions::default(), "items")
            .await
            .unwrap();
        assert_eq!((single.matched, single.modified), (1, 1));

        let multi = store
            .update_documents(
                eq("k", 1),
                set("flag", true),
                UpdateOptions { multi: true, upsert: false },
                "items",
            )
            .await
            .unwrap();
        assert_eq!((multi.matched, multi.modified), (2, 1));
        assert_eq!(store.count_documents(eq("flag", true), "items").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn upsert_inserts_seeded_document() {
        let store = InMemoryStore::new();

        let result = store
            .update_documents(
                eq("_id", "abc"),
                set("m.x", 13),
                UpdateOptions { multi: false, upsert: true },
                "items",
            )
            .await
            .unwrap();

        assert_eq!(result.matched, 0);
        assert_eq!(result.upserted_id, Some(Bson::String("abc".into())));
        assert_eq!(find_all(&store, Query::new()).await, vec![doc! { "_id": "abc", "m": { "x": 13 } }]);

        let again = store
            .update_documents(
                eq("_id", "abc"),
                set("m.y", 1.5),
                UpdateOptions { multi: false, upsert: true },
                "items",
            )
            .await
            .unwrap();

        assert_eq!((again.matched, again.upserted_id), (1, None));
        assert_eq!(
            find_all(&store, Query::new()).await,
            vec![doc! { "_id": "abc", "m": { "x": 13, "y": 1.5 } }]
        );
    }

    #[tokio::test]
    async fn delete_first_or_every_match() {
        let store = InMemoryStore::new();
        store
            .insert_documents(vec![doc! { "k": 1 }, doc! { "k": 1 }, doc! { "k": 1 }], "items")
            .await
            .unwrap();

        assert_eq!(store.delete_documents(eq("k", 1), DeleteOptions { multi: false }, "items").await.unwrap(), 1);
        assert_eq!(store.delete_documents(eq("k", 1), DeleteOptions { multi: true }, "items").await.unwrap(), 2);
        assert_eq!(store.list_collections().await.unwrap(), vec!["items".to_string()]);
    }
}
