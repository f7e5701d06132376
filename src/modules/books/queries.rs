//! Filters, updates, and aggregation pipelines behind the `/books` routes.
//!
//! Every builder is a pure function of its parameters; handlers feed them
//! request input and the configured library rules.

use libris_db::{
    bson::{doc, Bson, Document},
    FindQuery,
};

/// Exact title match.
pub fn title_filter(title: &str) -> Document {
    doc! { "title": title }
}

/// Inclusive `from <= year <= to`.
pub fn year_range_filter(from: f64, to: f64) -> Document {
    doc! { "year": { "$gte": year_value(from), "$lte": year_value(to) } }
}

/// Books whose `genres` array contains `genre`.
pub fn genre_filter(genre: &str) -> Document {
    doc! { "genres": genre }
}

/// Books whose `year` is stored as a 32-bit integer.
pub fn integer_year_filter() -> Document {
    doc! { "year": { "$type": "int" } }
}

/// Books whose `genres` share nothing with `excluded`.
pub fn excluded_genres_filter(excluded: &[String]) -> Document {
    doc! { "genres": { "$nin": excluded.to_vec() } }
}

/// Strictly `year < threshold`.
pub fn before_year_filter(threshold: f64) -> Document {
    doc! { "year": { "$lt": year_value(threshold) } }
}

/// Filter and update that set `year` on the book titled `title`.
pub fn title_year_update(title: &str, year: i32) -> (Document, Document) {
    (title_filter(title), doc! { "$set": { "year": year } })
}

/// Every book, newest first, paged by `skip`/`limit`.
pub fn newest_first_page(skip: u64, limit: i64) -> FindQuery {
    FindQuery::new(doc! {})
        .sort(doc! { "year": -1 })
        .skip(skip)
        .limit(limit)
}

/// Books published after `after_year`, newest first.
pub fn recent_sorted_pipeline(after_year: i32) -> Vec<Document> {
    vec![
        doc! { "$match": { "year": { "$gt": after_year } } },
        doc! { "$sort": { "year": -1 } },
    ]
}

/// Books published after `after_year`, reduced to title, author, and year.
pub fn recent_summary_pipeline(after_year: i32) -> Vec<Document> {
    vec![
        doc! { "$match": { "year": { "$gt": after_year } } },
        doc! { "$project": { "_id": 0, "title": 1, "author": 1, "year": 1 } },
    ]
}

/// One output document per (book, genre) pair.
pub fn genre_unwind_pipeline() -> Vec<Document> {
    vec![doc! { "$unwind": "$genres" }]
}

/// Attach every document of `logs` whose `book_id` equals the book's `_id`.
pub fn logs_join_pipeline(logs: &str) -> Vec<Document> {
    vec![doc! {
        "$lookup": {
            "from": logs,
            "localField": "_id",
            "foreignField": "book_id",
            "as": "logs",
        }
    }]
}

/// Whole numbers are sent as integers so the stored filter reads naturally;
/// the server compares numeric types by value either way.
fn year_value(year: f64) -> Bson {
    if year.fract() == 0.0 && year >= f64::from(i32::MIN) && year <= f64::from(i32::MAX) {
        Bson::Int32(year as i32)
    } else {
        Bson::Double(year)
    }
}
