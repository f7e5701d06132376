//! Schema provisioning routes plus the implicit `authors` collection.

use async_trait::async_trait;
use axum::{extract::State, routing::post, Json, Router};
use libris_db::{
    bson::doc, codec, CollectionSpec, IndexSpec, Provision, SharedStore,
};
use libris_http::AppError;
use libris_kernel::{settings::LibrarySettings, InitCtx, Module};
use serde_json::{json, Value};

use super::ack::InsertOneAck;
use super::{AUTHORS, BOOKS, LOGS};
use crate::utils::openapi::{error_response, json_body, json_response, operation, text_response};

/// `books` with a validator rejecting documents whose title is null or missing.
pub fn books_collection() -> CollectionSpec {
    CollectionSpec::new(BOOKS).validator(doc! { "title": { "$ne": null } })
}

/// `logs` capped at `size` bytes; the database evicts the oldest entries.
pub fn logs_collection(size: u64) -> CollectionSpec {
    CollectionSpec::new(LOGS).capped(size)
}

pub fn title_index() -> IndexSpec {
    IndexSpec::ascending(BOOKS, "title")
}

#[derive(Clone)]
struct CollectionsState {
    store: SharedStore,
    logs_capped_size: u64,
}

pub struct CollectionsModule {
    state: CollectionsState,
}

impl CollectionsModule {
    pub fn new(store: SharedStore, library: &LibrarySettings) -> Self {
        Self {
            state: CollectionsState {
                store,
                logs_capped_size: library.logs_capped_size,
            },
        }
    }
}

#[async_trait]
impl Module for CollectionsModule {
    fn name(&self) -> &'static str {
        "collections"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(
            module = self.name(),
            backend = ctx.store.backend(),
            logs_capped_size = self.state.logs_capped_size,
            "collections module initialized"
        );
        Ok(())
    }

    fn routes(&self) -> Router {
        Router::new()
            .route("/collection/books", post(create_books_collection))
            .route("/collection/authors", post(insert_author))
            .route("/collection/logs/capped", post(create_logs_collection))
            .route("/collection/books/index", post(create_title_index))
            .with_state(self.state.clone())
    }

    fn openapi(&self) -> Option<Value> {
        let tag = "Collections";
        let created = |what: &str| {
            vec![
                ("200", text_response(what)),
                ("409", error_response("Already exists")),
            ]
        };

        Some(json!({
            "paths": {
                "/collection/books": {
                    "post": operation(tag, "Create the validated books collection", vec![], None,
                        created("books collection created")),
                },
                "/collection/authors": {
                    "post": operation(tag, "Insert an author (creates the collection implicitly)", vec![],
                        Some(json_body("Author document", json!({"type": "object"}))),
                        vec![
                            ("200", json_response("Insert acknowledgment",
                                json!({"$ref": "#/components/schemas/InsertOneAck"}))),
                            ("400", error_response("Body is not a JSON object")),
                        ]),
                },
                "/collection/logs/capped": {
                    "post": operation(tag, "Create the capped logs collection", vec![], None,
                        created("logs capped collection created")),
                },
                "/collection/books/index": {
                    "post": operation(tag, "Create an ascending index on books.title", vec![], None,
                        vec![("200", text_response("index created"))]),
                },
            },
            "components": {
                "schemas": {
                    "InsertOneAck": {
                        "type": "object",
                        "properties": {
                            "acknowledged": { "type": "boolean" },
                            "insertedId": { "type": "string" }
                        },
                        "required": ["acknowledged", "insertedId"]
                    }
                }
            }
        }))
    }

    fn provisions(&self) -> Vec<Provision> {
        vec![
            Provision::Collection(books_collection()),
            Provision::Collection(logs_collection(self.state.logs_capped_size)),
            Provision::Index(title_index()),
        ]
    }

    async fn stop(&self) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "collections module stopped");
        Ok(())
    }
}

async fn create_books_collection(
    State(state): State<CollectionsState>,
) -> Result<&'static str, AppError> {
    state.store.create_collection(&books_collection()).await?;
    tracing::info!(collection = BOOKS, "collection created");
    Ok("books collection created")
}

async fn insert_author(
    State(state): State<CollectionsState>,
    Json(body): Json<Value>,
) -> Result<Json<InsertOneAck>, AppError> {
    let doc = codec::json_to_document(body)?;
    let outcome = state.store.insert_one(AUTHORS, doc).await?;
    Ok(Json(outcome.into()))
}

async fn create_logs_collection(
    State(state): State<CollectionsState>,
) -> Result<&'static str, AppError> {
    let spec = logs_collection(state.logs_capped_size);
    state.store.create_collection(&spec).await?;
    tracing::info!(collection = LOGS, size = state.logs_capped_size, "capped collection created");
    Ok("logs capped collection created")
}

async fn create_title_index(State(state): State<CollectionsState>) -> Result<&'static str, AppError> {
    let name = state.store.create_index(&title_index()).await?;
    tracing::info!(collection = BOOKS, index = %name, "index created");
    Ok("index created")
}

/// Create a new instance of the collections module
pub fn create_module(store: SharedStore, library: &LibrarySettings) -> std::sync::Arc<dyn Module> {
    std::sync::Arc::new(CollectionsModule::new(store, library))
}
