//! MongoDB storage implementation for document stores.
//!
//! Filters, sorts and updates are translated by [`MongoQueryTranslator`]; unique index
//! violations surface as [`StoreError::DuplicateKey`].

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use bson::{Bson, Document};
use mongodb::{
    Client, Collection as MongoCollection, Database,
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::{ClientOptions, FindOptions},
};
use tracing::trace;

use docmodel_core::{
    backend::{
        DeleteOptions, DocumentStream, StoreBackend, StoreBackendBuilder, UpdateOptions,
        UpdateResult,
    },
    error::{StoreError, StoreResult},
    field::ID_KEY,
    query::{Expr, Query},
    update::UpdateDoc,
};

use crate::{config::MongoDbConfig, query::MongoQueryTranslator};

/// Server error code of a unique index violation.
const DUPLICATE_KEY_CODE: i32 = 11000;

/// A [`StoreBackend`] over one MongoDB database.
#[derive(Debug)]
pub struct MongoDbStore {
    client: Client,
    database: Database,
    batch_size: Option<u32>,
}

impl MongoDbStore {
    /// Wraps a connected client, storing collections in `database`.
    pub fn new(client: Client, database: &str) -> Self {
        Self {
            database: client.database(database),
            client,
            batch_size: None,
        }
    }

    /// Starts a builder connecting to `uri` on [`StoreBackendBuilder::build`].
    pub fn builder(uri: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(uri, database)
    }

    fn get_collection(&self, collection_name: &str) -> MongoCollection<Document> {
        self.database.collection(collection_name)
    }
}

fn backend_error(err: MongoError) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn is_duplicate_key(err: &MongoError) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(failure)) => failure.code == DUPLICATE_KEY_CODE,
        ErrorKind::InsertMany(failure) => failure
            .write_errors
            .as_ref()
            .is_some_and(|errors| errors.iter().any(|error| error.code == DUPLICATE_KEY_CODE)),
        _ => false,
    }
}

/// The identifier an `_id` equality filter targets.
fn filter_id(filter: &Document) -> Option<Bson> {
    match filter.get(ID_KEY)? {
        Bson::Document(operators) => operators.get("$eq").cloned(),
        id => Some(id.clone()),
    }
}

/// Maps driver errors, reporting unique index violations as duplicate keys.
fn write_error(err: MongoError, id: Option<&Bson>, collection: &str) -> StoreError {
    if is_duplicate_key(&err) {
        let id = id.map_or_else(|| err.to_string(), Bson::to_string);
        StoreError::DuplicateKey(id, collection.to_string())
    } else {
        backend_error(err)
    }
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    async fn insert_documents(
        &self,
        documents: Vec<Document>,
        collection: &str,
    ) -> StoreResult<Vec<Bson>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let count = documents.len();
        let result = self
            .get_collection(collection)
            .insert_many(documents)
            .await
            .map_err(|e| write_error(e, None, collection))?;

        trace!(collection, count, "inserted documents");

        (0..count)
            .map(|position| {
                result
                    .inserted_ids
                    .get(&position)
                    .cloned()
                    .ok_or_else(|| StoreError::Backend(format!("no identifier reported for document {position}")))
            })
            .collect()
    }

    async fn find_documents(&self, query: Query, collection: &str) -> StoreResult<DocumentStream> {
        let filter = MongoQueryTranslator::filter(query.filter.as_ref())?;

        let mut options = FindOptions::default();
        options.limit = query.limit.map(|limit| limit as i64);
        options.skip = query.offset.map(|skip| skip as u64);
        options.sort = MongoQueryTranslator::sort(&query.sort);
        options.batch_size = self.batch_size;

        trace!(collection, filter = %filter, "finding documents");

        let cursor = self
            .get_collection(collection)
            .find(filter)
            .with_options(options)
            .await
            .map_err(backend_error)?;

        Ok(cursor.map_err(backend_error).boxed())
    }

    async fn count_documents(&self, filter: Option<Expr>, collection: &str) -> StoreResult<u64> {
        let filter = MongoQueryTranslator::filter(filter.as_ref())?;

        self.get_collection(collection)
            .count_documents(filter)
            .await
            .map_err(backend_error)
    }

    async fn update_documents(
        &self,
        filter: Option<Expr>,
        update: UpdateDoc,
        options: UpdateOptions,
        collection: &str,
    ) -> StoreResult<UpdateResult> {
        let filter = MongoQueryTranslator::filter(filter.as_ref())?;
        let update = MongoQueryTranslator::update(&update);
        let id = filter_id(&filter);

        trace!(collection, filter = %filter, update = %update, multi = options.multi, "updating documents");

        let target = self.get_collection(collection);
        let result = if options.multi {
            target
                .update_many(filter, update)
                .upsert(options.upsert)
                .await
        } else {
            target
                .update_one(filter, update)
                .upsert(options.upsert)
                .await
        }
        .map_err(|e| write_error(e, id.as_ref(), collection))?;

        Ok(UpdateResult {
            matched: result.matched_count,
            modified: result.modified_count,
            upserted_id: result.upserted_id,
        })
    }

    async fn delete_documents(
        &self,
        filter: Option<Expr>,
        options: DeleteOptions,
        collection: &str,
    ) -> StoreResult<u64> {
        let filter = MongoQueryTranslator::filter(filter.as_ref())?;
        let target = self.get_collection(collection);

        let result = if options.multi {
            target.delete_many(filter).await
        } else {
            target.delete_one(filter).await
        }
        .map_err(backend_error)?;

        trace!(collection, count = result.deleted_count, "deleted documents");

        Ok(result.deleted_count)
    }

    async fn drop_collection(&self, name: &str) -> StoreResult<()> {
        self.get_collection(name)
            .drop()
            .await
            .map_err(backend_error)
    }

    async fn list_collections(&self) -> StoreResult<Vec<String>> {
        self.database
            .list_collection_names()
            .await
            .map_err(backend_error)
    }

    async fn shutdown(self) -> StoreResult<()> {
        self.client.shutdown().await;

        Ok(())
    }
}

/// Connection settings for a [`MongoDbStore`].
pub struct MongoDbStoreBuilder {
    uri: String,
    database: String,
    app_name: Option<String>,
    batch_size: Option<u32>,
}

impl MongoDbStoreBuilder {
    pub fn new(uri: &str, database: &str) -> Self {
        Self {
            uri: uri.to_string(),
            database: database.to_string(),
            app_name: None,
            batch_size: None,
        }
    }

    /// Takes every setting from a deserialized [`MongoDbConfig`].
    pub fn from_config(config: MongoDbConfig) -> Self {
        Self {
            uri: config.uri,
            database: config.database,
            app_name: config.app_name,
            batch_size: config.batch_size,
        }
    }

    /// Application name reported to the server.
    pub fn app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }

    /// Number of documents fetched per cursor round trip.
    pub fn batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = Some(batch_size);
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> StoreResult<Self::Backend> {
        let mut options = ClientOptions::parse(&self.uri)
            .await
            .map_err(|e| StoreError::Initialization(e.to_string()))?;

        if self.app_name.is_some() {
            options.app_name = self.app_name;
        }

        let client = Client::with_options(options)
            .map_err(|e| StoreError::Initialization(e.to_string()))?;

        Ok(MongoDbStore {
            batch_size: self.batch_size,
            ..MongoDbStore::new(client, &self.database)
        })
    }
}
