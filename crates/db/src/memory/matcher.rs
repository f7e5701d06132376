//! Query filter evaluation for the in-memory store.

use std::cmp::Ordering;

use mongodb::bson::{Bson, Document};

use crate::codec::type_label;
use crate::error::{StoreError, StoreResult};

/// Returns true when `doc` satisfies `filter`.
pub(crate) fn matches(doc: &Document, filter: &Document) -> StoreResult<bool> {
    for (key, condition) in filter {
        let satisfied = match key.as_str() {
            "$and" => logical_list(key, condition)?
                .iter()
                .map(|sub| matches(doc, sub))
                .collect::<StoreResult<Vec<_>>>()?
                .into_iter()
                .all(|m| m),
            "$or" => logical_list(key, condition)?
                .iter()
                .map(|sub| matches(doc, sub))
                .collect::<StoreResult<Vec<_>>>()?
                .into_iter()
                .any(|m| m),
            "$nor" => !logical_list(key, condition)?
                .iter()
                .map(|sub| matches(doc, sub))
                .collect::<StoreResult<Vec<_>>>()?
                .into_iter()
                .any(|m| m),
            op if op.starts_with('$') => {
                return Err(StoreError::Unsupported(format!("top-level operator {op}")))
            }
            path => field_matches(lookup(doc, path), condition)?,
        };

        if !satisfied {
            return Ok(false);
        }
    }

    Ok(true)
}

fn logical_list<'a>(op: &str, condition: &'a Bson) -> StoreResult<Vec<&'a Document>> {
    let Bson::Array(items) = condition else {
        return Err(StoreError::InvalidDocument(format!("{op} expects an array")));
    };

    items
        .iter()
        .map(|item| match item {
            Bson::Document(doc) => Ok(doc),
            _ => Err(StoreError::InvalidDocument(format!(
                "{op} entries must be documents"
            ))),
        })
        .collect()
}

/// Resolve a dotted path through embedded documents.
pub(crate) fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = doc.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Bson::Document(inner) => inner.get(segment)?,
            _ => return None,
        };
    }
    Some(current)
}

fn is_operator_document(condition: &Bson) -> Option<&Document> {
    match condition {
        Bson::Document(doc) if doc.keys().next().is_some_and(|k| k.starts_with('$')) => Some(doc),
        _ => None,
    }
}

fn field_matches(value: Option<&Bson>, condition: &Bson) -> StoreResult<bool> {
    let Some(operators) = is_operator_document(condition) else {
        return Ok(equals(value, condition));
    };

    for (op, operand) in operators {
        let satisfied = match op.as_str() {
            "$eq" => equals(value, operand),
            "$ne" => !equals(value, operand),
            "$gt" => any_candidate(value, |c| compare(c, operand) == Some(Ordering::Greater)),
            "$gte" => any_candidate(value, |c| {
                matches!(compare(c, operand), Some(Ordering::Greater | Ordering::Equal))
            }),
            "$lt" => any_candidate(value, |c| compare(c, operand) == Some(Ordering::Less)),
            "$lte" => any_candidate(value, |c| {
                matches!(compare(c, operand), Some(Ordering::Less | Ordering::Equal))
            }),
            "$in" => in_list(value, op, operand)?,
            "$nin" => !in_list(value, op, operand)?,
            "$exists" => value.is_some() == truthy(operand),
            "$type" => has_type(value, operand)?,
            "$not" => !field_matches(value, operand)?,
            other => return Err(StoreError::Unsupported(format!("query operator {other}"))),
        };

        if !satisfied {
            return Ok(false);
        }
    }

    Ok(true)
}

/// Equality with the server's array semantics: an array field matches when
/// any element equals the target, or when the whole array does. A `null`
/// target also matches a missing field.
pub(crate) fn equals(value: Option<&Bson>, target: &Bson) -> bool {
    match value {
        None => matches!(target, Bson::Null),
        Some(Bson::Array(items)) => {
            items.iter().any(|item| values_equal(item, target))
                || values_equal(&Bson::Array(items.clone()), target)
        }
        Some(v) => values_equal(v, target),
    }
}

fn any_candidate(value: Option<&Bson>, predicate: impl Fn(&Bson) -> bool) -> bool {
    match value {
        None => false,
        Some(Bson::Array(items)) => items.iter().any(&predicate),
        Some(v) => predicate(v),
    }
}

fn in_list(value: Option<&Bson>, op: &str, operand: &Bson) -> StoreResult<bool> {
    let Bson::Array(candidates) = operand else {
        return Err(StoreError::InvalidDocument(format!("{op} expects an array")));
    };
    Ok(candidates.iter().any(|candidate| equals(value, candidate)))
}

fn has_type(value: Option<&Bson>, operand: &Bson) -> StoreResult<bool> {
    let wanted: Vec<&str> = match operand {
        Bson::String(alias) => vec![alias.as_str()],
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => {
            vec![type_code_alias(as_i64(operand).unwrap_or_default())?]
        }
        Bson::Array(items) => items
            .iter()
            .map(|item| match item {
                Bson::String(alias) => Ok(alias.as_str()),
                other => type_code_alias(as_i64(other).unwrap_or_default()),
            })
            .collect::<StoreResult<Vec<_>>>()?,
        _ => return Err(StoreError::InvalidDocument("$type expects an alias".to_string())),
    };

    let type_matches = |v: &Bson| {
        let label = type_label(v);
        wanted
            .iter()
            .any(|w| *w == label || (*w == "number" && is_number(v)))
    };

    Ok(match value {
        None => false,
        Some(Bson::Array(items)) => {
            wanted.contains(&"array") || items.iter().any(type_matches)
        }
        Some(v) => type_matches(v),
    })
}

fn type_code_alias(code: i64) -> StoreResult<&'static str> {
    Ok(match code {
        1 => "double",
        2 => "string",
        3 => "object",
        4 => "array",
        5 => "binData",
        7 => "objectId",
        8 => "bool",
        9 => "date",
        10 => "null",
        11 => "regex",
        16 => "int",
        17 => "timestamp",
        18 => "long",
        19 => "decimal",
        other => return Err(StoreError::Unsupported(format!("$type code {other}"))),
    })
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Null | Bson::Undefined => false,
        other => as_f64(other).map_or(true, |n| n != 0.0),
    }
}

pub(crate) fn is_number(value: &Bson) -> bool {
    matches!(value, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_))
}

pub(crate) fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(i) => Some(f64::from(*i)),
        Bson::Int64(i) => Some(*i as f64),
        Bson::Double(f) => Some(*f),
        _ => None,
    }
}

pub(crate) fn as_i64(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(i) => Some(i64::from(*i)),
        Bson::Int64(i) => Some(*i),
        Bson::Double(f) if f.fract() == 0.0 => Some(*f as i64),
        _ => None,
    }
}

fn values_equal(a: &Bson, b: &Bson) -> bool {
    match (a, b) {
        (Bson::Array(x), Bson::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| values_equal(l, r))
        }
        (Bson::Document(x), Bson::Document(y)) => {
            x.len() == y.len()
                && x.iter()
                    .zip(y)
                    .all(|((lk, lv), (rk, rv))| lk == rk && values_equal(lv, rv))
        }
        _ if is_number(a) && is_number(b) => compare(a, b) == Some(Ordering::Equal),
        _ => a == b,
    }
}

/// Comparison within a single type bracket. Values of different brackets are
/// incomparable, which makes range operators skip them.
pub(crate) fn compare(a: &Bson, b: &Bson) -> Option<Ordering> {
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => Some(x.bytes().cmp(&y.bytes())),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.cmp(y)),
        (Bson::Null, Bson::Null) => Some(Ordering::Equal),
        _ => {
            let (x, y) = (as_f64(a)?, as_f64(b)?);
            // NaN sorts below every other number and equals itself.
            Some(match (x.is_nan(), y.is_nan()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                (false, false) => x.partial_cmp(&y)?,
            })
        }
    }
}

fn bracket(value: Option<&Bson>) -> u8 {
    match value {
        None | Some(Bson::Null) | Some(Bson::Undefined) => 1,
        Some(v) if is_number(v) => 2,
        Some(Bson::String(_)) | Some(Bson::Symbol(_)) => 3,
        Some(Bson::Document(_)) => 4,
        Some(Bson::Array(_)) => 5,
        Some(Bson::Binary(_)) => 6,
        Some(Bson::ObjectId(_)) => 7,
        Some(Bson::Boolean(_)) => 8,
        Some(Bson::DateTime(_)) => 9,
        Some(Bson::Timestamp(_)) => 10,
        Some(Bson::RegularExpression(_)) => 11,
        Some(_) => 12,
    }
}

/// Total order used by sort stages: type bracket first, then value.
pub(crate) fn sort_order(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
    bracket(a).cmp(&bracket(b)).then_with(|| match (a, b) {
        (Some(x), Some(y)) => compare(x, y).unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    })
}

/// Stable multi-key sort following a `{field: 1 | -1}` specification.
pub(crate) fn sort_documents(docs: &mut [Document], spec: &Document) -> StoreResult<()> {
    let keys = spec
        .iter()
        .map(|(field, direction)| match as_i64(direction) {
            Some(1) => Ok((field.clone(), false)),
            Some(-1) => Ok((field.clone(), true)),
            _ => Err(StoreError::InvalidDocument(format!(
                "sort direction for `{field}` must be 1 or -1"
            ))),
        })
        .collect::<StoreResult<Vec<_>>>()?;

    docs.sort_by(|a, b| {
        keys.iter().fold(Ordering::Equal, |acc, (field, descending)| {
            acc.then_with(|| {
                let ord = sort_order(lookup(a, field), lookup(b, field));
                if *descending {
                    ord.reverse()
                } else {
                    ord
                }
            })
        })
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    fn book() -> Document {
        doc! {
            "title": "Dune",
            "year": 1965_i32,
            "genres": ["Science Fiction", "Adventure"],
            "meta": { "pages": 412_i32 },
        }
    }

    #[test]
    fn implicit_equality_matches_array_elements() {
        assert!(matches(&book(), &doc! {"genres": "Adventure"}).unwrap());
        assert!(!matches(&book(), &doc! {"genres": "Horror"}).unwrap());
    }

    #[test]
    fn numeric_comparisons_cross_integer_widths() {
        assert!(matches(&book(), &doc! {"year": {"$gte": 1965.0, "$lte": 1965_i64}}).unwrap());
        assert!(!matches(&book(), &doc! {"year": {"$gt": 1965_i32}}).unwrap());
        assert!(!matches(&book(), &doc! {"year": {"$lt": 1965_i32}}).unwrap());
    }

    #[test]
    fn range_operators_skip_other_brackets() {
        let doc = doc! {"year": "1999"};
        assert!(!matches(&doc, &doc! {"year": {"$lt": 2000_i32}}).unwrap());
    }

    #[test]
    fn nin_rejects_any_overlap() {
        let filter = doc! {"genres": {"$nin": ["Horror", "Science Fiction"]}};
        assert!(!matches(&book(), &filter).unwrap());
        assert!(matches(&doc! {"genres": ["Drama"]}, &filter).unwrap());
        assert!(matches(&doc! {"title": "no genres"}, &filter).unwrap());
    }

    #[test]
    fn ne_null_requires_presence() {
        let filter = doc! {"title": {"$ne": null}};
        assert!(matches(&book(), &filter).unwrap());
        assert!(!matches(&doc! {"year": 1_i32}, &filter).unwrap());
        assert!(!matches(&doc! {"title": null}, &filter).unwrap());
    }

    #[test]
    fn type_int_excludes_long_and_double() {
        let filter = doc! {"year": {"$type": "int"}};
        assert!(matches(&doc! {"year": 2001_i32}, &filter).unwrap());
        assert!(!matches(&doc! {"year": 2001_i64}, &filter).unwrap());
        assert!(!matches(&doc! {"year": 2001.0}, &filter).unwrap());
        assert!(!matches(&doc! {"year": "2001"}, &filter).unwrap());
    }

    #[test]
    fn type_number_alias_covers_all_numerics() {
        let filter = doc! {"year": {"$type": "number"}};
        assert!(matches(&doc! {"year": 2001.5}, &filter).unwrap());
        assert!(matches(&doc! {"year": 2001_i64}, &filter).unwrap());
    }

    #[test]
    fn dotted_paths_reach_embedded_documents() {
        assert!(matches(&book(), &doc! {"meta.pages": {"$gt": 400_i32}}).unwrap());
        assert!(!matches(&book(), &doc! {"meta.isbn": {"$exists": true}}).unwrap());
    }

    #[test]
    fn logical_operators_combine() {
        let filter = doc! {"$or": [{"year": 1_i32}, {"title": "Dune"}]};
        assert!(matches(&book(), &filter).unwrap());
        let filter = doc! {"$and": [{"year": 1965_i32}, {"title": "Emma"}]};
        assert!(!matches(&book(), &filter).unwrap());
    }

    #[test]
    fn unknown_operator_is_unsupported() {
        let err = matches(&book(), &doc! {"title": {"$regex": "^D"}}).unwrap_err();
        assert!(matches!(err, StoreError::Unsupported(_)));
    }

    #[test]
    fn sort_places_missing_before_numbers() {
        let mut docs = vec![
            doc! {"n": 3_i32},
            doc! {"other": true},
            doc! {"n": 1.5},
            doc! {"n": 2_i64},
        ];
        sort_documents(&mut docs, &doc! {"n": 1_i32}).unwrap();
        let order: Vec<Option<f64>> = docs
            .iter()
            .map(|d| d.get("n").and_then(as_f64))
            .collect();
        assert_eq!(order, vec![None, Some(1.5), Some(2.0), Some(3.0)]);
    }

    #[test]
    fn sort_rejects_bad_direction() {
        let mut docs = vec![doc! {"n": 1_i32}];
        assert!(sort_documents(&mut docs, &doc! {"n": 2_i32}).is_err());
    }
}
