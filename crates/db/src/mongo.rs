//! MongoDB-backed document store.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use mongodb::{
    bson::{doc, Bson, Document},
    options::{ClientOptions, CreateCollectionOptions, FindOptions},
    Client, Collection, Database, IndexModel,
};

use crate::error::{StoreError, StoreResult};
use crate::store::{
    CollectionSpec, DocumentStore, FindQuery, IndexSpec, InsertManyOutcome, InsertOneOutcome,
    UpdateOutcome,
};

/// Client tuning applied on top of the connection string.
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    pub app_name: Option<String>,
    pub server_selection_timeout: Option<Duration>,
}

/// Store backed by a single MongoDB database. The driver pools connections
/// internally; one instance is shared by every request.
#[derive(Clone, Debug)]
pub struct MongoStore {
    database: Database,
}

impl MongoStore {
    /// Build a client for `uri` and select `database`. The driver connects
    /// lazily, so this only fails on a malformed URI.
    pub async fn connect(uri: &str, database: &str, tuning: ConnectOptions) -> StoreResult<Self> {
        let mut options = ClientOptions::parse(uri)
            .await
            .map_err(StoreError::Driver)?;
        options.app_name = tuning.app_name;
        if let Some(timeout) = tuning.server_selection_timeout {
            options.server_selection_timeout = Some(timeout);
        }

        let client = Client::with_options(options).map_err(StoreError::Driver)?;
        let database = client.database(database);

        tracing::debug!(target: "libris-db", db = %database.name(), "mongodb client created");
        Ok(Self { database })
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.database.collection::<Document>(name)
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    fn backend(&self) -> &'static str {
        "mongodb"
    }

    async fn ping(&self) -> StoreResult<()> {
        self.database
            .run_command(doc! { "ping": 1 })
            .await
            .map(|_| ())
            .map_err(StoreError::Driver)
    }

    async fn create_collection(&self, spec: &CollectionSpec) -> StoreResult<()> {
        let mut options = CreateCollectionOptions::default();
        options.validator = spec.validator.clone();
        if let Some(capped) = spec.capped {
            options.capped = Some(true);
            options.size = Some(capped.size);
        }

        self.database
            .create_collection(&spec.name)
            .with_options(options)
            .await
            .map_err(|e| StoreError::from_driver(&spec.name, e))
    }

    async fn create_index(&self, spec: &IndexSpec) -> StoreResult<String> {
        let model = IndexModel::builder().keys(spec.keys()).build();
        self.collection(&spec.collection)
            .create_index(model)
            .await
            .map(|result| result.index_name)
            .map_err(|e| StoreError::from_driver(&spec.collection, e))
    }

    async fn insert_one(&self, collection: &str, doc: Document) -> StoreResult<InsertOneOutcome> {
        let result = self
            .collection(collection)
            .insert_one(doc)
            .await
            .map_err(|e| StoreError::from_driver(collection, e))?;

        Ok(InsertOneOutcome {
            inserted_id: result.inserted_id,
        })
    }

    async fn insert_many(
        &self,
        collection: &str,
        docs: Vec<Document>,
    ) -> StoreResult<InsertManyOutcome> {
        if docs.is_empty() {
            return Err(StoreError::InvalidDocument(
                "insert_many requires at least one document".to_string(),
            ));
        }

        let result = self
            .collection(collection)
            .insert_many(docs)
            .await
            .map_err(|e| StoreError::from_driver(collection, e))?;

        let mut indexed: Vec<(usize, Bson)> = result.inserted_ids.into_iter().collect();
        indexed.sort_by_key(|(index, _)| *index);

        Ok(InsertManyOutcome {
            inserted_ids: indexed.into_iter().map(|(_, id)| id).collect(),
        })
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> StoreResult<UpdateOutcome> {
        let result = self
            .collection(collection)
            .update_one(filter, update)
            .await
            .map_err(|e| StoreError::from_driver(collection, e))?;

        Ok(UpdateOutcome {
            matched_count: result.matched_count,
            modified_count: result.modified_count,
        })
    }

    async fn find_one(&self, collection: &str, filter: Document) -> StoreResult<Option<Document>> {
        self.collection(collection)
            .find_one(filter)
            .await
            .map_err(|e| StoreError::from_driver(collection, e))
    }

    async fn find(&self, collection: &str, query: FindQuery) -> StoreResult<Vec<Document>> {
        let mut options = FindOptions::default();
        options.sort = query.sort;
        options.skip = query.skip;
        options.limit = query.limit;

        let cursor = self
            .collection(collection)
            .find(query.filter)
            .with_options(options)
            .await
            .map_err(|e| StoreError::from_driver(collection, e))?;

        cursor
            .try_collect()
            .await
            .map_err(|e| StoreError::from_driver(collection, e))
    }

    async fn delete_many(&self, collection: &str, filter: Document) -> StoreResult<u64> {
        self.collection(collection)
            .delete_many(filter)
            .await
            .map(|result| result.deleted_count)
            .map_err(|e| StoreError::from_driver(collection, e))
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> StoreResult<Vec<Document>> {
        let cursor = self
            .collection(collection)
            .aggregate(pipeline)
            .await
            .map_err(|e| StoreError::from_driver(collection, e))?;

        cursor
            .try_collect()
            .await
            .map_err(|e| StoreError::from_driver(collection, e))
    }
}
