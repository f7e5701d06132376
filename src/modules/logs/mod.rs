//! Write access to the capped `logs` collection.
//!
//! Entries are free-form; a `book_id` field holding a book's `_id` makes the
//! entry show up in `GET /books/aggregate4`.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{extract::State, routing::post, Json, Router};
use libris_db::{codec, SharedStore};
use libris_http::AppError;
use libris_kernel::Module;
use serde_json::{json, Value};

use super::ack::InsertOneAck;
use super::LOGS;
use crate::utils::openapi::{error_response, json_body, json_response, operation, schema_ref};

pub struct LogsModule {
    store: SharedStore,
}

impl LogsModule {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Module for LogsModule {
    fn name(&self) -> &'static str {
        "logs"
    }

    fn routes(&self) -> Router {
        Router::new()
            .route("/logs", post(append_entry))
            .with_state(self.store.clone())
    }

    fn openapi(&self) -> Option<Value> {
        Some(json!({
            "paths": {
                "/logs": {
                    "post": operation("Logs", "Append a log entry", vec![],
                        Some(json_body("Log entry; `book_id` links it to a book", json!({"type": "object"}))),
                        vec![
                            ("200", json_response("Insert acknowledgment", schema_ref("InsertOneAck"))),
                            ("400", error_response("Body is not a JSON object")),
                        ]),
                }
            }
        }))
    }
}

async fn append_entry(
    State(store): State<SharedStore>,
    Json(body): Json<Value>,
) -> Result<Json<InsertOneAck>, AppError> {
    let entry = codec::json_to_document(body)?;
    let outcome = store.insert_one(LOGS, entry).await?;
    Ok(Json(outcome.into()))
}

/// Create a new instance of the logs module
pub fn create_module(store: SharedStore) -> Arc<dyn Module> {
    Arc::new(LogsModule::new(store))
}
