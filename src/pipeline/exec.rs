use bson::{Bson, Document as BsonDocument};

use super::{ConcatPart, Pipeline, ProjectField, Stage};
use crate::errors::{RegistryError, Result};
use crate::query::{Collation, UpdateDoc, apply_update, compare_bson, compare_docs, eval_filter_with, get_path};

/// Runs every stage of `pipeline` over `rows` in order.
///
/// # Errors
/// `QueryExecution` carrying the index of the stage that rejected its input.
pub fn run_pipeline(pipeline: &Pipeline, rows: Vec<BsonDocument>) -> Result<Vec<BsonDocument>> {
    let collation = pipeline.collation.as_ref();
    let mut rows = rows;
    for (i, stage) in pipeline.stages.iter().enumerate() {
        rows = apply_stage(i, stage, rows, collation)?;
    }
    Ok(rows)
}

fn apply_stage(
    i: usize,
    stage: &Stage,
    rows: Vec<BsonDocument>,
    collation: Option<&Collation>,
) -> Result<Vec<BsonDocument>> {
    match stage {
        Stage::Project(fields) => rows.iter().map(|row| project_row(i, row, fields)).collect(),
        Stage::Match(filter) => Ok(rows.into_iter().filter(|r| eval_filter_with(r, filter, collation)).collect()),
        Stage::Sort(specs) => {
            if specs.is_empty() {
                return Err(RegistryError::stage(i, "$sort needs at least one key"));
            }
            let mut rows = rows;
            rows.sort_by(|a, b| compare_docs(a, b, specs, collation));
            Ok(rows)
        }
        Stage::Skip(n) => Ok(rows.into_iter().skip(*n).collect()),
        Stage::Limit(0) => Err(RegistryError::stage(i, "$limit must be positive")),
        Stage::Limit(n) => Ok(rows.into_iter().take(*n).collect()),
        Stage::Unwind(path) => Ok(rows.into_iter().flat_map(|row| unwind_row(row, path)).collect()),
        Stage::Group { by, count_as } => group_rows(i, &rows, by, count_as, collation),
        Stage::Count(field) => {
            let mut out = BsonDocument::new();
            out.insert(field.clone(), i64::try_from(rows.len()).unwrap_or(i64::MAX));
            Ok(vec![out])
        }
    }
}

fn project_row(i: usize, row: &BsonDocument, fields: &[ProjectField]) -> Result<BsonDocument> {
    let mut out = BsonDocument::new();
    for field in fields {
        let (to, value) = match field {
            ProjectField::Include(path) => (path, get_path(row, path).cloned()),
            ProjectField::Rename { to, from } => (to, get_path(row, from).cloned()),
            ProjectField::Concat { to, parts } => (to, Some(concat(i, row, parts)?)),
        };
        if let Some(v) = value {
            apply_update(&mut out, &UpdateDoc::set(to.clone(), v));
        }
    }
    Ok(out)
}

/// String concatenation where any null or missing part nulls the result.
fn concat(i: usize, row: &BsonDocument, parts: &[ConcatPart]) -> Result<Bson> {
    let mut s = String::new();
    for part in parts {
        match part {
            ConcatPart::Literal(lit) => s.push_str(lit),
            ConcatPart::Field(path) => match get_path(row, path) {
                Some(Bson::String(v)) => s.push_str(v),
                None | Some(Bson::Null) => return Ok(Bson::Null),
                Some(other) => {
                    return Err(RegistryError::stage(
                        i,
                        format!("$concat supports only strings, found {:?} at {path}", other.element_type()),
                    ));
                }
            },
        }
    }
    Ok(Bson::String(s))
}

fn unwind_row(row: BsonDocument, path: &str) -> Vec<BsonDocument> {
    match get_path(&row, path) {
        Some(Bson::Array(items)) => items
            .iter()
            .map(|item| {
                let mut copy = row.clone();
                apply_update(&mut copy, &UpdateDoc::set(path, item.clone()));
                copy
            })
            .collect(),
        None | Some(Bson::Null) => Vec::new(),
        Some(_) => vec![row],
    }
}

fn group_rows(
    i: usize,
    rows: &[BsonDocument],
    by: &str,
    count_as: &str,
    collation: Option<&Collation>,
) -> Result<Vec<BsonDocument>> {
    let mut groups: Vec<(Bson, i64)> = Vec::new();
    for row in rows {
        let key = match get_path(row, by) {
            None => Bson::Null,
            Some(v @ (Bson::Document(_) | Bson::Array(_))) => {
                return Err(RegistryError::stage(
                    i,
                    format!("$group key {by} must be a scalar, found {:?}", v.element_type()),
                ));
            }
            Some(v) => v.clone(),
        };
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, n)) => *n += 1,
            None => groups.push((key, 1)),
        }
    }
    groups.sort_by(|(a, _), (b, _)| compare_bson(a, b, collation));
    Ok(groups
        .into_iter()
        .map(|(key, n)| {
            let mut out = BsonDocument::new();
            out.insert("_id", key);
            out.insert(count_as.to_string(), n);
            out
        })
        .collect())
}
