//! Acknowledgment bodies returned by the write routes.
//!
//! Field names follow the MongoDB driver result objects clients already
//! parse (`insertedId`, `matchedCount`, ...).

use libris_db::{
    codec::bson_to_json, InsertManyOutcome, InsertOneOutcome, UpdateOutcome,
};
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InsertOneAck {
    pub acknowledged: bool,
    pub inserted_id: Value,
}

impl From<InsertOneOutcome> for InsertOneAck {
    fn from(outcome: InsertOneOutcome) -> Self {
        Self {
            acknowledged: true,
            inserted_id: bson_to_json(outcome.inserted_id),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InsertManyAck {
    pub acknowledged: bool,
    pub inserted_count: usize,
    /// Keyed by the position of each document in the request array.
    pub inserted_ids: Map<String, Value>,
}

impl From<InsertManyOutcome> for InsertManyAck {
    fn from(outcome: InsertManyOutcome) -> Self {
        let inserted_ids: Map<String, Value> = outcome
            .inserted_ids
            .into_iter()
            .enumerate()
            .map(|(index, id)| (index.to_string(), bson_to_json(id)))
            .collect();

        Self {
            acknowledged: true,
            inserted_count: inserted_ids.len(),
            inserted_ids,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAck {
    pub acknowledged: bool,
    pub matched_count: u64,
    pub modified_count: u64,
    pub upserted_count: u64,
    pub upserted_id: Option<Value>,
}

impl From<UpdateOutcome> for UpdateAck {
    fn from(outcome: UpdateOutcome) -> Self {
        Self {
            acknowledged: true,
            matched_count: outcome.matched_count,
            modified_count: outcome.modified_count,
            upserted_count: 0,
            upserted_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeleteAck {
    pub acknowledged: bool,
    pub deleted_count: u64,
}

impl DeleteAck {
    pub fn new(deleted_count: u64) -> Self {
        Self {
            acknowledged: true,
            deleted_count,
        }
    }
}
