use async_trait::async_trait;
use mongodb::bson::{Bson, Document};

use crate::error::StoreResult;

/// Options for a `find` call beyond the filter itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindQuery {
    pub filter: Document,
    pub sort: Option<Document>,
    pub skip: Option<u64>,
    pub limit: Option<i64>,
}

impl FindQuery {
    pub fn new(filter: Document) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    pub fn sort(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Size-bounded collection settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capped {
    /// Maximum total size of the collection in bytes.
    pub size: u64,
}

/// Explicit collection creation request.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionSpec {
    pub name: String,
    pub validator: Option<Document>,
    pub capped: Option<Capped>,
}

impl CollectionSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            validator: None,
            capped: None,
        }
    }

    pub fn validator(mut self, validator: Document) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn capped(mut self, size: u64) -> Self {
        self.capped = Some(Capped { size });
        self
    }
}

/// Single-field ascending index on a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub collection: String,
    pub field: String,
}

impl IndexSpec {
    pub fn ascending(collection: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            field: field.into(),
        }
    }

    pub fn keys(&self) -> Document {
        let mut keys = Document::new();
        keys.insert(self.field.clone(), 1_i32);
        keys
    }

    /// Name the server assigns to this index by default.
    pub fn name(&self) -> String {
        format!("{}_1", self.field)
    }
}

/// A schema-level change contributed by a module.
#[derive(Debug, Clone, PartialEq)]
pub enum Provision {
    Collection(CollectionSpec),
    Index(IndexSpec),
}

impl Provision {
    pub fn describe(&self) -> String {
        match self {
            Provision::Collection(spec) => format!("collection {}", spec.name),
            Provision::Index(spec) => format!("index {}.{}", spec.collection, spec.name()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertOneOutcome {
    pub inserted_id: Bson,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertManyOutcome {
    /// Generated identifiers in input order.
    pub inserted_ids: Vec<Bson>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub matched_count: u64,
    pub modified_count: u64,
}

/// The operations the gateway needs from a document database.
///
/// Implementations must be cheap to share behind an `Arc`; every request
/// handler holds the same instance.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Short backend label used in logs.
    fn backend(&self) -> &'static str;

    /// Round-trip to the backend to confirm it is reachable.
    async fn ping(&self) -> StoreResult<()>;

    async fn create_collection(&self, spec: &CollectionSpec) -> StoreResult<()>;

    /// Returns the created index name.
    async fn create_index(&self, spec: &IndexSpec) -> StoreResult<String>;

    async fn insert_one(&self, collection: &str, doc: Document) -> StoreResult<InsertOneOutcome>;

    async fn insert_many(
        &self,
        collection: &str,
        docs: Vec<Document>,
    ) -> StoreResult<InsertManyOutcome>;

    /// Applies `update` to the first document matching `filter`.
    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> StoreResult<UpdateOutcome>;

    async fn find_one(&self, collection: &str, filter: Document) -> StoreResult<Option<Document>>;

    async fn find(&self, collection: &str, query: FindQuery) -> StoreResult<Vec<Document>>;

    /// Returns the number of deleted documents.
    async fn delete_many(&self, collection: &str, filter: Document) -> StoreResult<u64>;

    async fn aggregate(&self, collection: &str, pipeline: Vec<Document>)
        -> StoreResult<Vec<Document>>;

    async fn apply(&self, provision: &Provision) -> StoreResult<()> {
        match provision {
            Provision::Collection(spec) => self.create_collection(spec).await,
            Provision::Index(spec) => self.create_index(spec).await.map(|_| ()),
        }
    }
}
