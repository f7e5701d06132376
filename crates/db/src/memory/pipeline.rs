//! Aggregation stages supported by the in-memory store.

use mongodb::bson::{Bson, Document};

use super::matcher::{as_i64, equals, lookup, matches, sort_documents};
use crate::error::{StoreError, StoreResult};

/// Source of documents for `$lookup` stages.
pub(crate) trait ForeignSource {
    fn documents(&self, collection: &str) -> Vec<Document>;
}

pub(crate) fn run(
    pipeline: &[Document],
    mut docs: Vec<Document>,
    foreign: &dyn ForeignSource,
) -> StoreResult<Vec<Document>> {
    for stage in pipeline {
        let mut entries = stage.iter();
        let (Some((name, spec)), None) = (entries.next(), entries.next()) else {
            return Err(StoreError::InvalidDocument(
                "each pipeline stage must have exactly one key".to_string(),
            ));
        };

        docs = match name.as_str() {
            "$match" => {
                let filter = stage_document(name, spec)?;
                let mut kept = Vec::with_capacity(docs.len());
                for doc in docs {
                    if matches(&doc, filter)? {
                        kept.push(doc);
                    }
                }
                kept
            }
            "$sort" => {
                sort_documents(&mut docs, stage_document(name, spec)?)?;
                docs
            }
            "$skip" => {
                let n = stage_count(name, spec)?;
                docs.into_iter().skip(n).collect()
            }
            "$limit" => {
                let n = stage_count(name, spec)?;
                docs.into_iter().take(n).collect()
            }
            "$project" => project(docs, stage_document(name, spec)?)?,
            "$unwind" => unwind(docs, spec)?,
            "$lookup" => join(docs, stage_document(name, spec)?, foreign)?,
            other => {
                return Err(StoreError::Unsupported(format!("pipeline stage {other}")));
            }
        };
    }

    Ok(docs)
}

fn stage_document<'a>(name: &str, spec: &'a Bson) -> StoreResult<&'a Document> {
    match spec {
        Bson::Document(doc) => Ok(doc),
        _ => Err(StoreError::InvalidDocument(format!(
            "{name} expects a document"
        ))),
    }
}

fn stage_count(name: &str, spec: &Bson) -> StoreResult<usize> {
    as_i64(spec)
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| StoreError::InvalidDocument(format!("{name} expects a non-negative integer")))
}

fn field_path(value: &str) -> StoreResult<&str> {
    value
        .strip_prefix('$')
        .ok_or_else(|| StoreError::InvalidDocument(format!("`{value}` is not a field path")))
}

fn project(docs: Vec<Document>, spec: &Document) -> StoreResult<Vec<Document>> {
    let mut include_id = true;
    let mut included = Vec::new();
    let mut excluded = Vec::new();

    for (field, flag) in spec {
        let on = match flag {
            Bson::Boolean(b) => *b,
            other => match as_i64(other) {
                Some(n) => n != 0,
                None => {
                    return Err(StoreError::Unsupported(format!(
                        "computed projection for `{field}`"
                    )))
                }
            },
        };

        if field.contains('.') {
            return Err(StoreError::Unsupported(format!(
                "dotted projection `{field}`"
            )));
        }

        match (field.as_str(), on) {
            ("_id", on) => include_id = on,
            (_, true) => included.push(field.as_str()),
            (_, false) => excluded.push(field.as_str()),
        }
    }

    if !included.is_empty() && !excluded.is_empty() {
        return Err(StoreError::InvalidDocument(
            "cannot mix inclusion and exclusion in $project".to_string(),
        ));
    }

    Ok(docs
        .into_iter()
        .map(|doc| {
            doc.into_iter()
                .filter(|(key, _)| {
                    if key == "_id" {
                        include_id
                    } else if included.is_empty() {
                        !excluded.contains(&key.as_str())
                    } else {
                        included.contains(&key.as_str())
                    }
                })
                .collect()
        })
        .collect())
}

fn unwind(docs: Vec<Document>, spec: &Bson) -> StoreResult<Vec<Document>> {
    let (path, preserve) = match spec {
        Bson::String(path) => (field_path(path)?, false),
        Bson::Document(options) => {
            let path = options
                .get_str("path")
                .map_err(|_| StoreError::InvalidDocument("$unwind requires `path`".to_string()))?;
            let preserve = options
                .get_bool("preserveNullAndEmptyArrays")
                .unwrap_or(false);
            (field_path(path)?, preserve)
        }
        _ => {
            return Err(StoreError::InvalidDocument(
                "$unwind expects a field path".to_string(),
            ))
        }
    };

    if path.contains('.') {
        return Err(StoreError::Unsupported(format!("dotted $unwind `{path}`")));
    }

    let mut out = Vec::new();
    for doc in docs {
        match doc.get(path) {
            Some(Bson::Array(items)) if !items.is_empty() => {
                for item in items.clone() {
                    let mut copy = doc.clone();
                    copy.insert(path, item);
                    out.push(copy);
                }
            }
            Some(Bson::Array(_)) | Some(Bson::Null) | None => {
                if preserve {
                    out.push(doc);
                }
            }
            Some(_) => out.push(doc),
        }
    }
    Ok(out)
}

fn join(
    docs: Vec<Document>,
    spec: &Document,
    foreign: &dyn ForeignSource,
) -> StoreResult<Vec<Document>> {
    let required = |key: &str| {
        spec.get_str(key)
            .map_err(|_| StoreError::InvalidDocument(format!("$lookup requires `{key}`")))
    };
    let from = required("from")?;
    let local_field = required("localField")?;
    let foreign_field = required("foreignField")?;
    let as_field = required("as")?;

    let candidates = foreign.documents(from);

    Ok(docs
        .into_iter()
        .map(|mut doc| {
            let local = lookup(&doc, local_field).cloned().unwrap_or(Bson::Null);
            let keys = match local {
                Bson::Array(items) if !items.is_empty() => items,
                other => vec![other],
            };

            let joined: Vec<Bson> = candidates
                .iter()
                .filter(|candidate| {
                    let value = lookup(candidate, foreign_field);
                    keys.iter().any(|key| equals(value, key))
                })
                .cloned()
                .map(Bson::Document)
                .collect();

            doc.insert(as_field, joined);
            doc
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::{doc, oid::ObjectId};
    use std::collections::HashMap;

    #[derive(Default)]
    struct Fixtures(HashMap<String, Vec<Document>>);

    impl ForeignSource for Fixtures {
        fn documents(&self, collection: &str) -> Vec<Document> {
            self.0.get(collection).cloned().unwrap_or_default()
        }
    }

    fn books() -> Vec<Document> {
        vec![
            doc! {"title": "A", "year": 1999_i32, "genres": ["X", "Y"]},
            doc! {"title": "B", "year": 2005_i32, "genres": []},
            doc! {"title": "C", "year": 2010_i32},
            doc! {"title": "D", "year": 2001_i32, "genres": ["Z"]},
        ]
    }

    #[test]
    fn match_then_sort_descending() {
        let pipeline = vec![
            doc! {"$match": {"year": {"$gt": 2000_i32}}},
            doc! {"$sort": {"year": -1_i32}},
        ];
        let out = run(&pipeline, books(), &Fixtures::default()).unwrap();
        let titles: Vec<&str> = out.iter().map(|d| d.get_str("title").unwrap()).collect();
        assert_eq!(titles, vec!["C", "B", "D"]);
    }

    #[test]
    fn inclusion_projection_drops_id_and_other_fields() {
        let docs = vec![doc! {"_id": 1_i32, "title": "A", "author": "x", "year": 1_i32, "genres": ["g"]}];
        let pipeline = vec![doc! {"$project": {"_id": 0_i32, "title": 1_i32, "author": 1_i32, "year": 1_i32}}];
        let out = run(&pipeline, docs, &Fixtures::default()).unwrap();
        assert_eq!(out, vec![doc! {"title": "A", "author": "x", "year": 1_i32}]);
    }

    #[test]
    fn mixed_projection_is_rejected() {
        let pipeline = vec![doc! {"$project": {"title": 1_i32, "year": 0_i32}}];
        assert!(run(&pipeline, books(), &Fixtures::default()).is_err());
    }

    #[test]
    fn unwind_fans_out_and_drops_empty() {
        let out = run(&[doc! {"$unwind": "$genres"}], books(), &Fixtures::default()).unwrap();
        let pairs: Vec<(&str, &str)> = out
            .iter()
            .map(|d| (d.get_str("title").unwrap(), d.get_str("genres").unwrap()))
            .collect();
        assert_eq!(pairs, vec![("A", "X"), ("A", "Y"), ("D", "Z")]);
    }

    #[test]
    fn unwind_can_preserve_empty() {
        let stage = doc! {"$unwind": {"path": "$genres", "preserveNullAndEmptyArrays": true}};
        let out = run(&[stage], books(), &Fixtures::default()).unwrap();
        assert_eq!(out.len(), 5);
    }

    #[test]
    fn lookup_attaches_matches_or_empty_array() {
        let first = ObjectId::new();
        let second = ObjectId::new();
        let docs = vec![doc! {"_id": first}, doc! {"_id": second}];

        let mut fixtures = Fixtures::default();
        fixtures.0.insert(
            "logs".to_string(),
            vec![
                doc! {"book_id": first, "action": "borrowed"},
                doc! {"book_id": first, "action": "returned"},
                doc! {"book_id": "unrelated"},
            ],
        );

        let stage = doc! {"$lookup": {"from": "logs", "localField": "_id", "foreignField": "book_id", "as": "logs"}};
        let out = run(&[stage], docs, &fixtures).unwrap();
        assert_eq!(out[0].get_array("logs").unwrap().len(), 2);
        assert!(out[1].get_array("logs").unwrap().is_empty());
    }

    #[test]
    fn skip_and_limit_page_results() {
        let pipeline = vec![doc! {"$skip": 1_i32}, doc! {"$limit": 2_i64}];
        let out = run(&pipeline, books(), &Fixtures::default()).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].get_str("title").unwrap(), "B");
    }

    #[test]
    fn unknown_stage_is_unsupported() {
        let err = run(&[doc! {"$facet": {}}], books(), &Fixtures::default()).unwrap_err();
        assert!(matches!(err, StoreError::Unsupported(_)));
    }
}
