//! HTTP handlers for the Books module.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use libris_db::{bson::Document, codec, FindQuery, SharedStore};
use libris_http::AppError;
use libris_kernel::settings::LibrarySettings;
use serde_json::Value;

use super::models::{BeforeYearQuery, GenreQuery, TitleQuery, YearRangeQuery};
use super::queries;
use crate::modules::ack::{DeleteAck, InsertManyAck, InsertOneAck, UpdateAck};
use crate::modules::{BOOKS, LOGS};

#[derive(Clone)]
pub struct BooksState {
    pub store: SharedStore,
    pub library: Arc<LibrarySettings>,
}

fn documents(docs: Vec<Document>) -> Json<Vec<Value>> {
    Json(docs.into_iter().map(codec::document_to_json).collect())
}

pub async fn insert_book(
    State(state): State<BooksState>,
    Json(body): Json<Value>,
) -> Result<Json<InsertOneAck>, AppError> {
    let doc = codec::json_to_document(body)?;
    let outcome = state.store.insert_one(BOOKS, doc).await?;
    Ok(Json(outcome.into()))
}

pub async fn insert_books(
    State(state): State<BooksState>,
    Json(body): Json<Value>,
) -> Result<Json<InsertManyAck>, AppError> {
    let docs = codec::json_to_documents(body)?;
    let outcome = state.store.insert_many(BOOKS, docs).await?;
    tracing::debug!(
        collection = BOOKS,
        inserted = outcome.inserted_ids.len(),
        "batch inserted"
    );
    Ok(Json(outcome.into()))
}

pub async fn apply_future_year(
    State(state): State<BooksState>,
) -> Result<Json<UpdateAck>, AppError> {
    let (filter, update) =
        queries::title_year_update(&state.library.future_title, state.library.future_year);
    let outcome = state.store.update_one(BOOKS, filter, update).await?;
    tracing::debug!(
        title = %state.library.future_title,
        matched = outcome.matched_count,
        modified = outcome.modified_count,
        "year correction applied"
    );
    Ok(Json(outcome.into()))
}

pub async fn find_by_title(
    State(state): State<BooksState>,
    Query(query): Query<TitleQuery>,
) -> Result<Json<Value>, AppError> {
    let found = state
        .store
        .find_one(BOOKS, queries::title_filter(query.title()?))
        .await?;
    Ok(Json(found.map_or(Value::Null, codec::document_to_json)))
}

pub async fn find_by_year_range(
    State(state): State<BooksState>,
    Query(query): Query<YearRangeQuery>,
) -> Result<Json<Vec<Value>>, AppError> {
    let (from, to) = query.bounds()?;
    let filter = queries::year_range_filter(from, to);
    Ok(documents(state.store.find(BOOKS, FindQuery::new(filter)).await?))
}

pub async fn find_by_genre(
    State(state): State<BooksState>,
    Query(query): Query<GenreQuery>,
) -> Result<Json<Vec<Value>>, AppError> {
    let filter = queries::genre_filter(query.genre()?);
    Ok(documents(state.store.find(BOOKS, FindQuery::new(filter)).await?))
}

pub async fn newest_page(State(state): State<BooksState>) -> Result<Json<Vec<Value>>, AppError> {
    let query = queries::newest_first_page(state.library.page_skip, state.library.page_limit);
    Ok(documents(state.store.find(BOOKS, query).await?))
}

pub async fn integer_years(State(state): State<BooksState>) -> Result<Json<Vec<Value>>, AppError> {
    let filter = queries::integer_year_filter();
    Ok(documents(state.store.find(BOOKS, FindQuery::new(filter)).await?))
}

pub async fn without_excluded_genres(
    State(state): State<BooksState>,
) -> Result<Json<Vec<Value>>, AppError> {
    let filter = queries::excluded_genres_filter(&state.library.excluded_genres);
    Ok(documents(state.store.find(BOOKS, FindQuery::new(filter)).await?))
}

pub async fn delete_before_year(
    State(state): State<BooksState>,
    Query(query): Query<BeforeYearQuery>,
) -> Result<Json<DeleteAck>, AppError> {
    let threshold = query.threshold()?;
    let deleted = state
        .store
        .delete_many(BOOKS, queries::before_year_filter(threshold))
        .await?;
    tracing::info!(collection = BOOKS, threshold, deleted, "books deleted");
    Ok(Json(DeleteAck::new(deleted)))
}

pub async fn recent_sorted(State(state): State<BooksState>) -> Result<Json<Vec<Value>>, AppError> {
    let pipeline = queries::recent_sorted_pipeline(state.library.aggregate_after_year);
    Ok(documents(state.store.aggregate(BOOKS, pipeline).await?))
}

pub async fn recent_summary(
    State(state): State<BooksState>,
) -> Result<Json<Vec<Value>>, AppError> {
    let pipeline = queries::recent_summary_pipeline(state.library.aggregate_after_year);
    Ok(documents(state.store.aggregate(BOOKS, pipeline).await?))
}

pub async fn genre_pairs(State(state): State<BooksState>) -> Result<Json<Vec<Value>>, AppError> {
    let pipeline = queries::genre_unwind_pipeline();
    Ok(documents(state.store.aggregate(BOOKS, pipeline).await?))
}

pub async fn with_logs(State(state): State<BooksState>) -> Result<Json<Vec<Value>>, AppError> {
    let pipeline = queries::logs_join_pipeline(LOGS);
    Ok(documents(state.store.aggregate(BOOKS, pipeline).await?))
}
