pub mod models;
pub mod queries;
mod routes;

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    routing::{delete, get, patch, post},
    Router,
};
use libris_db::SharedStore;
use libris_kernel::{settings::LibrarySettings, InitCtx, Module};
use serde_json::{json, Value};

use crate::utils::openapi::{
    array_of, error_response, json_body, json_response, operation, query_param, schema_ref,
};
use routes::BooksState;

/// Document-level operations on the `books` collection.
pub struct BooksModule {
    state: BooksState,
}

impl BooksModule {
    pub fn new(store: SharedStore, library: &LibrarySettings) -> Self {
        Self {
            state: BooksState {
                store,
                library: Arc::new(library.clone()),
            },
        }
    }
}

#[async_trait]
impl Module for BooksModule {
    fn name(&self) -> &'static str {
        "books"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(
            module = self.name(),
            backend = ctx.store.backend(),
            environment = ?ctx.settings.environment,
            excluded_genres = ?self.state.library.excluded_genres,
            "books module initialized"
        );
        Ok(())
    }

    fn routes(&self) -> Router {
        Router::new()
            .route("/books", post(routes::insert_book))
            .route("/books/batch", post(routes::insert_books))
            .route("/books/Future", patch(routes::apply_future_year))
            .route("/books/title", get(routes::find_by_title))
            .route("/books/year", get(routes::find_by_year_range))
            .route("/books/genre", get(routes::find_by_genre))
            .route("/books/skip-limit", get(routes::newest_page))
            .route("/books/year-integer", get(routes::integer_years))
            .route("/books/exclude-genres", get(routes::without_excluded_genres))
            .route("/books/before-year", delete(routes::delete_before_year))
            .route("/books/aggregate1", get(routes::recent_sorted))
            .route("/books/aggregate2", get(routes::recent_summary))
            .route("/books/aggregate3", get(routes::genre_pairs))
            .route("/books/aggregate4", get(routes::with_logs))
            .with_state(self.state.clone())
    }

    fn openapi(&self) -> Option<Value> {
        let tag = "Books";
        let book = json!({
            "type": "object",
            "properties": {
                "_id": { "type": "string" },
                "title": { "type": "string" },
                "author": { "type": "string" },
                "year": { "type": "number" },
                "genres": { "type": "array", "items": { "type": "string" } }
            },
            "additionalProperties": true
        });
        let books = || json_response("Matching books", array_of(schema_ref("Book")));
        let bad_request = || ("400", error_response("Missing or malformed query parameter"));

        Some(json!({
            "paths": {
                "/books": {
                    "post": operation(tag, "Insert one book", vec![],
                        Some(json_body("Book document", schema_ref("Book"))),
                        vec![
                            ("200", json_response("Insert acknowledgment", schema_ref("InsertOneAck"))),
                            ("400", error_response("Body is not a JSON object")),
                            ("422", error_response("Document failed collection validation")),
                        ]),
                },
                "/books/batch": {
                    "post": operation(tag, "Insert several books in order", vec![],
                        Some(json_body("Array of book documents", array_of(schema_ref("Book")))),
                        vec![
                            ("200", json_response("Insert acknowledgment", schema_ref("InsertManyAck"))),
                            ("400", error_response("Body is not an array of objects")),
                            ("422", error_response("A document failed collection validation")),
                        ]),
                },
                "/books/Future": {
                    "patch": operation(tag, "Correct the year of the configured book", vec![], None,
                        vec![("200", json_response("Update acknowledgment", schema_ref("UpdateAck")))]),
                },
                "/books/title": {
                    "get": operation(tag, "Find the first book with an exact title",
                        vec![query_param("title", "Exact title", "string")], None,
                        vec![
                            ("200", json_response("The book, or null", schema_ref("Book"))),
                            bad_request(),
                        ]),
                },
                "/books/year": {
                    "get": operation(tag, "Books published within an inclusive year range",
                        vec![
                            query_param("from", "Lower bound, inclusive", "number"),
                            query_param("to", "Upper bound, inclusive", "number"),
                        ], None,
                        vec![("200", books()), bad_request()]),
                },
                "/books/genre": {
                    "get": operation(tag, "Books listing a genre",
                        vec![query_param("genre", "Genre name", "string")], None,
                        vec![("200", books()), bad_request()]),
                },
                "/books/skip-limit": {
                    "get": operation(tag, "One page of books, newest first", vec![], None,
                        vec![("200", books())]),
                },
                "/books/year-integer": {
                    "get": operation(tag, "Books whose year is stored as a 32-bit integer", vec![], None,
                        vec![("200", books())]),
                },
                "/books/exclude-genres": {
                    "get": operation(tag, "Books outside the excluded genres", vec![], None,
                        vec![("200", books())]),
                },
                "/books/before-year": {
                    "delete": operation(tag, "Delete books published before a year",
                        vec![query_param("year", "Exclusive upper bound", "number")], None,
                        vec![
                            ("200", json_response("Delete acknowledgment", schema_ref("DeleteAck"))),
                            bad_request(),
                        ]),
                },
                "/books/aggregate1": {
                    "get": operation(tag, "Recent books, newest first", vec![], None,
                        vec![("200", books())]),
                },
                "/books/aggregate2": {
                    "get": operation(tag, "Recent books as title, author, and year", vec![], None,
                        vec![("200", json_response("Projected books", array_of(json!({"type": "object"}))))]),
                },
                "/books/aggregate3": {
                    "get": operation(tag, "One row per book and genre", vec![], None,
                        vec![("200", json_response("Unwound books", array_of(json!({"type": "object"}))))]),
                },
                "/books/aggregate4": {
                    "get": operation(tag, "Books with their log entries attached", vec![], None,
                        vec![("200", json_response("Joined books", array_of(json!({"type": "object"}))))]),
                },
            },
            "components": {
                "schemas": {
                    "Book": book,
                    "InsertManyAck": {
                        "type": "object",
                        "properties": {
                            "acknowledged": { "type": "boolean" },
                            "insertedCount": { "type": "integer" },
                            "insertedIds": { "type": "object", "additionalProperties": true }
                        },
                        "required": ["acknowledged", "insertedCount", "insertedIds"]
                    },
                    "UpdateAck": {
                        "type": "object",
                        "properties": {
                            "acknowledged": { "type": "boolean" },
                            "matchedCount": { "type": "integer" },
                            "modifiedCount": { "type": "integer" },
                            "upsertedCount": { "type": "integer" },
                            "upsertedId": { "type": ["string", "null"] }
                        },
                        "required": ["acknowledged", "matchedCount", "modifiedCount"]
                    },
                    "DeleteAck": {
                        "type": "object",
                        "properties": {
                            "acknowledged": { "type": "boolean" },
                            "deletedCount": { "type": "integer" }
                        },
                        "required": ["acknowledged", "deletedCount"]
                    }
                }
            }
        }))
    }

    async fn stop(&self) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "books module stopped");
        Ok(())
    }
}

/// Create a new instance of the books module
pub fn create_module(store: SharedStore, library: &LibrarySettings) -> Arc<dyn Module> {
    Arc::new(BooksModule::new(store, library))
}
