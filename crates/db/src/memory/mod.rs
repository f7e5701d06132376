//! In-process document store.
//!
//! Implements the subset of MongoDB semantics the gateway relies on so that
//! routes can be exercised without a running server.

mod matcher;
mod pipeline;

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use mongodb::bson::{doc, oid::ObjectId, Bson, Document};

use crate::error::{StoreError, StoreResult};
use crate::store::{
    Capped, CollectionSpec, DocumentStore, FindQuery, IndexSpec, InsertManyOutcome,
    InsertOneOutcome, UpdateOutcome,
};
use pipeline::ForeignSource;

#[derive(Debug, Default, Clone)]
struct MemCollection {
    documents: Vec<Document>,
    validator: Option<Document>,
    capped: Option<Capped>,
    indexes: Vec<String>,
}

impl MemCollection {
    fn insert(&mut self, name: &str, doc: Document) -> StoreResult<Bson> {
        let doc = with_id(doc);

        if let Some(validator) = &self.validator {
            if !matcher::matches(&doc, validator)? {
                return Err(StoreError::ValidationFailed {
                    collection: name.to_string(),
                });
            }
        }

        let id = doc.get("_id").cloned().unwrap_or(Bson::Null);
        if self
            .documents
            .iter()
            .any(|existing| existing.get("_id") == Some(&id))
        {
            return Err(StoreError::DuplicateKey(format!("{name} _id {id}")));
        }

        self.documents.push(doc);
        self.evict()?;
        Ok(id)
    }

    /// Drop the oldest documents until a capped collection fits its size bound.
    fn evict(&mut self) -> StoreResult<()> {
        let Some(capped) = self.capped else {
            return Ok(());
        };

        let mut sizes = self
            .documents
            .iter()
            .map(encoded_len)
            .collect::<StoreResult<Vec<u64>>>()?;
        let mut total: u64 = sizes.iter().sum();

        while total > capped.size && self.documents.len() > 1 {
            self.documents.remove(0);
            total -= sizes.remove(0);
        }
        Ok(())
    }
}

fn with_id(doc: Document) -> Document {
    if doc.contains_key("_id") {
        return doc;
    }
    let mut identified = doc! { "_id": ObjectId::new() };
    for (key, value) in doc {
        identified.insert(key, value);
    }
    identified
}

fn encoded_len(doc: &Document) -> StoreResult<u64> {
    let mut buf = Vec::new();
    doc.to_writer(&mut buf)
        .map_err(|e| StoreError::InvalidDocument(e.to_string()))?;
    Ok(buf.len() as u64)
}

/// Apply `$set` / `$unset` operators. Returns whether the document changed.
fn apply_update(doc: &mut Document, update: &Document) -> StoreResult<bool> {
    let mut changed = false;

    for (op, fields) in update {
        let Bson::Document(fields) = fields else {
            return Err(StoreError::InvalidDocument(format!(
                "{op} expects a document"
            )));
        };

        match op.as_str() {
            "$set" => {
                for (field, value) in fields {
                    if doc.get(field) != Some(value) {
                        doc.insert(field.clone(), value.clone());
                        changed = true;
                    }
                }
            }
            "$unset" => {
                for field in fields.keys() {
                    changed |= doc.remove(field).is_some();
                }
            }
            other if other.starts_with('$') => {
                return Err(StoreError::Unsupported(format!("update operator {other}")));
            }
            _ => {
                return Err(StoreError::InvalidDocument(
                    "update document requires atomic operators".to_string(),
                ));
            }
        }
    }

    Ok(changed)
}

/// Thread-safe in-memory [`DocumentStore`].
#[derive(Debug, Default)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, MemCollection>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every document currently stored in `collection`.
    pub fn snapshot(&self, collection: &str) -> Vec<Document> {
        self.read()
            .map(|collections| {
                collections
                    .get(collection)
                    .map(|c| c.documents.clone())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    /// Index names created on `collection`.
    pub fn indexes(&self, collection: &str) -> Vec<String> {
        self.read()
            .map(|collections| {
                collections
                    .get(collection)
                    .map(|c| c.indexes.clone())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, HashMap<String, MemCollection>>> {
        self.collections.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, HashMap<String, MemCollection>>> {
        self.collections.write().map_err(|_| StoreError::Poisoned)
    }
}

struct Snapshot<'a>(&'a HashMap<String, MemCollection>);

impl ForeignSource for Snapshot<'_> {
    fn documents(&self, collection: &str) -> Vec<Document> {
        self.0
            .get(collection)
            .map(|c| c.documents.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> StoreResult<()> {
        self.read().map(|_| ())
    }

    async fn create_collection(&self, spec: &CollectionSpec) -> StoreResult<()> {
        let mut collections = self.write()?;
        if collections.contains_key(&spec.name) {
            return Err(StoreError::NamespaceExists(spec.name.clone()));
        }

        collections.insert(
            spec.name.clone(),
            MemCollection {
                validator: spec.validator.clone(),
                capped: spec.capped,
                ..MemCollection::default()
            },
        );
        Ok(())
    }

    async fn create_index(&self, spec: &IndexSpec) -> StoreResult<String> {
        let mut collections = self.write()?;
        let collection = collections.entry(spec.collection.clone()).or_default();
        let name = spec.name();
        if !collection.indexes.contains(&name) {
            collection.indexes.push(name.clone());
        }
        Ok(name)
    }

    async fn insert_one(&self, collection: &str, doc: Document) -> StoreResult<InsertOneOutcome> {
        let mut collections = self.write()?;
        let inserted_id = collections
            .entry(collection.to_string())
            .or_default()
            .insert(collection, doc)?;
        Ok(InsertOneOutcome { inserted_id })
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

        let mut collections = self.write()?;
        let target = collections.entry(collection.to_string()).or_default();

        // Ordered insert: documents before a failure stay inserted.
        let inserted_ids = docs
            .into_iter()
            .map(|doc| target.insert(collection, doc))
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(InsertManyOutcome { inserted_ids })
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> StoreResult<UpdateOutcome> {
        let mut collections = self.write()?;
        let Some(target) = collections.get_mut(collection) else {
            return Ok(UpdateOutcome {
                matched_count: 0,
                modified_count: 0,
            });
        };

        let mut position = None;
        for (index, doc) in target.documents.iter().enumerate() {
            if matcher::matches(doc, &filter)? {
                position = Some(index);
                break;
            }
        }

        let Some(index) = position else {
            return Ok(UpdateOutcome {
                matched_count: 0,
                modified_count: 0,
            });
        };

        let mut updated = target.documents[index].clone();
        let changed = apply_update(&mut updated, &update)?;
        if changed {
            if let Some(validator) = &target.validator {
                if !matcher::matches(&updated, validator)? {
                    return Err(StoreError::ValidationFailed {
                        collection: collection.to_string(),
                    });
                }
            }
            target.documents[index] = updated;
        }

        Ok(UpdateOutcome {
            matched_count: 1,
            modified_count: u64::from(changed),
        })
    }

    async fn find_one(&self, collection: &str, filter: Document) -> StoreResult<Option<Document>> {
        let collections = self.read()?;
        let Some(source) = collections.get(collection) else {
            return Ok(None);
        };

        for doc in &source.documents {
            if matcher::matches(doc, &filter)? {
                return Ok(Some(doc.clone()));
            }
        }
        Ok(None)
    }

    async fn find(&self, collection: &str, query: FindQuery) -> StoreResult<Vec<Document>> {
        let collections = self.read()?;
        let Some(source) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut found = Vec::new();
        for doc in &source.documents {
            if matcher::matches(doc, &query.filter)? {
                found.push(doc.clone());
            }
        }

        if let Some(sort) = &query.sort {
            matcher::sort_documents(&mut found, sort)?;
        }

        let skip = usize::try_from(query.skip.unwrap_or(0)).unwrap_or(usize::MAX);
        let found = found.into_iter().skip(skip);
        Ok(match query.limit.map(i64::unsigned_abs) {
            Some(limit) if limit > 0 => found
                .take(usize::try_from(limit).unwrap_or(usize::MAX))
                .collect(),
            _ => found.collect(),
        })
    }

    async fn delete_many(&self, collection: &str, filter: Document) -> StoreResult<u64> {
        let mut collections = self.write()?;
        let Some(target) = collections.get_mut(collection) else {
            return Ok(0);
        };

        // Match every document before removing any.
        let hits = target
            .documents
            .iter()
            .map(|doc| matcher::matches(doc, &filter))
            .collect::<StoreResult<Vec<bool>>>()?;

        let deleted = hits.iter().filter(|hit| **hit).count() as u64;
        let mut hits = hits.into_iter();
        target.documents.retain(|_| !hits.next().unwrap_or(false));
        Ok(deleted)
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> StoreResult<Vec<Document>> {
        let collections = self.read()?;
        let source = Snapshot(&collections);
        let docs = source.documents(collection);
        pipeline::run(&pipeline, docs, &source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_assigns_object_id_first() {
        let store = InMemoryStore::new();
        let outcome = store
            .insert_one("books", doc! {"title": "Dune"})
            .await
            .unwrap();

        let stored = store.snapshot("books");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].keys().next().map(String::as_str), Some("_id"));
        assert_eq!(stored[0].get("_id"), Some(&outcome.inserted_id));
    }

    #[tokio::test]
    async fn duplicate_collection_is_rejected() {
        let store = InMemoryStore::new();
        let spec = CollectionSpec::new("books");
        store.create_collection(&spec).await.unwrap();
        let err = store.create_collection(&spec).await.unwrap_err();
        assert!(matches!(err, StoreError::NamespaceExists(name) if name == "books"));
    }

    #[tokio::test]
    async fn implicit_collection_blocks_explicit_creation() {
        let store = InMemoryStore::new();
        store.insert_one("authors", doc! {"name": "Le Guin"}).await.unwrap();
        let err = store
            .create_collection(&CollectionSpec::new("authors"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NamespaceExists(_)));
    }

    #[tokio::test]
    async fn validator_rejects_missing_title() {
        let store = InMemoryStore::new();
        store
            .create_collection(
                &CollectionSpec::new("books").validator(doc! {"title": {"$ne": null}}),
            )
            .await
            .unwrap();

        let err = store
            .insert_one("books", doc! {"year": 2001_i32})
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ValidationFailed { .. }));
        assert!(store.snapshot("books").is_empty());
    }

    #[tokio::test]
    async fn capped_collection_evicts_oldest() {
        let store = InMemoryStore::new();
        let sample = with_id(doc! {"message": "entry 0"});
        let one = encoded_len(&sample).unwrap();

        store
            .create_collection(&CollectionSpec::new("logs").capped(one * 2))
            .await
            .unwrap();

        for i in 0..5 {
            store
                .insert_one("logs", doc! {"message": format!("entry {i}")})
                .await
                .unwrap();
        }

        let remaining: Vec<String> = store
            .snapshot("logs")
            .iter()
            .map(|d| d.get_str("message").unwrap().to_string())
            .collect();
        assert_eq!(remaining, vec!["entry 3", "entry 4"]);
    }

    #[tokio::test]
    async fn update_reports_matched_and_modified() {
        let store = InMemoryStore::new();
        store
            .insert_one("books", doc! {"title": "Future", "year": 1999_i32})
            .await
            .unwrap();

        let filter = doc! {"title": "Future"};
        let update = doc! {"$set": {"year": 2022_i32}};

        let first = store
            .update_one("books", filter.clone(), update.clone())
            .await
            .unwrap();
        assert_eq!(
            first,
            UpdateOutcome {
                matched_count: 1,
                modified_count: 1
            }
        );

        let second = store.update_one("books", filter, update).await.unwrap();
        assert_eq!(
            second,
            UpdateOutcome {
                matched_count: 1,
                modified_count: 0
            }
        );
    }

    #[tokio::test]
    async fn update_without_operators_is_invalid() {
        let store = InMemoryStore::new();
        store.insert_one("books", doc! {"title": "A"}).await.unwrap();
        let err = store
            .update_one("books", doc! {"title": "A"}, doc! {"year": 1_i32})
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidDocument(_)));
    }

    #[tokio::test]
    async fn find_sorts_skips_and_limits() {
        let store = InMemoryStore::new();
        let docs = (1990..1996)
            .map(|year| doc! {"year": year})
            .collect::<Vec<_>>();
        store.insert_many("books", docs).await.unwrap();

        let found = store
            .find(
                "books",
                FindQuery::new(doc! {})
                    .sort(doc! {"year": -1_i32})
                    .skip(2)
                    .limit(3),
            )
            .await
            .unwrap();
        let years: Vec<i32> = found.iter().map(|d| d.get_i32("year").unwrap()).collect();
        assert_eq!(years, vec![1993, 1992, 1991]);
    }

    #[tokio::test]
    async fn ordered_insert_many_stops_at_failure() {
        let store = InMemoryStore::new();
        store
            .create_collection(
                &CollectionSpec::new("books").validator(doc! {"title": {"$ne": null}}),
            )
            .await
            .unwrap();

        let result = store
            .insert_many(
                "books",
                vec![doc! {"title": "A"}, doc! {"year": 1_i32}, doc! {"title": "C"}],
            )
            .await;
        assert!(result.is_err());
        assert_eq!(store.snapshot("books").len(), 1);
    }

    #[tokio::test]
    async fn delete_many_counts_removed() {
        let store = InMemoryStore::new();
        store
            .insert_many(
                "books",
                vec![
                    doc! {"year": 1990_i32},
                    doc! {"year": 2000_i32},
                    doc! {"year": 2010_i32},
                ],
            )
            .await
            .unwrap();

        let deleted = store
            .delete_many("books", doc! {"year": {"$lt": 2000_i32}})
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.snapshot("books").len(), 2);
    }

    #[tokio::test]
    async fn failed_delete_keeps_every_document() {
        let store = InMemoryStore::new();
        store
            .insert_many("books", vec![doc! {"title": "a"}, doc! {"title": "b"}])
            .await
            .unwrap();

        let err = store
            .delete_many("books", doc! {"title": {"$regex": "^z"}})
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unsupported(_)));
        assert_eq!(store.snapshot("books").len(), 2);
    }

    #[tokio::test]
    async fn create_index_is_idempotent() {
        let store = InMemoryStore::new();
        let spec = IndexSpec::ascending("books", "title");
        assert_eq!(store.create_index(&spec).await.unwrap(), "title_1");
        store.create_index(&spec).await.unwrap();
        assert_eq!(store.indexes("books"), vec!["title_1".to_string()]);
    }
}
