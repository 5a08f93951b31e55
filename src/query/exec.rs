use crate::collection::Collection;
use crate::errors::Result;
use bson::{Bson, Document as BsonDocument};

use super::collation::Collation;
use super::eval::{compare_docs, eval_filter_with};
use super::types::{Filter, FindOptions, MAX_LIMIT, MAX_SORT_FIELDS, UpdateDoc, UpdateReport};

/// Filters, sorts and slices a collection, returning owned BSON bodies.
pub fn find_docs(col: &Collection, filter: &Filter, opts: &FindOptions, collation: Option<&Collation>) -> Vec<BsonDocument> {
    let bench_start = std::time::Instant::now();
    let mut docs: Vec<BsonDocument> = col
        .all_documents()
        .into_iter()
        .map(|d| d.data)
        .filter(|d| eval_filter_with(d, filter, collation))
        .collect();

    if let Some(sort) = &opts.sort {
        if sort.len() > MAX_SORT_FIELDS {
            log::warn!("sort spec too long: {}", sort.len());
        }
        docs.sort_by(|a, b| compare_docs(a, b, sort, collation));
    }

    let skip = opts.skip.unwrap_or(0);
    let limit = opts.limit.unwrap_or(usize::MAX).min(MAX_LIMIT);
    let docs: Vec<BsonDocument> = docs.into_iter().skip(skip).take(limit).collect();
    log::debug!(
        "find collection={} duration_ms={} result_count={} skip={} limit={:?}",
        col.name(),
        bench_start.elapsed().as_millis(),
        docs.len(),
        skip,
        opts.limit
    );
    docs
}

pub fn find_one(col: &Collection, filter: &Filter, collation: Option<&Collation>) -> Option<BsonDocument> {
    col.all_documents().into_iter().map(|d| d.data).find(|d| eval_filter_with(d, filter, collation))
}

/// # Errors
/// Propagates unique-index violations from the collection.
pub fn update_many(col: &Collection, filter: &Filter, update: &UpdateDoc) -> Result<UpdateReport> {
    let bench_start = std::time::Instant::now();
    let report = col.update_matching(filter, update, true, None)?;
    log::debug!(
        "update_many collection={} duration_ms={} matched={} modified={}",
        col.name(),
        bench_start.elapsed().as_millis(),
        report.matched,
        report.modified
    );
    Ok(report)
}

/// # Errors
/// Propagates unique-index violations from the collection.
pub fn update_one(col: &Collection, filter: &Filter, update: &UpdateDoc) -> Result<UpdateReport> {
    col.update_matching(filter, update, false, None)
}

/// Applies `$set` / `$unset` paths in place; returns whether anything changed.
pub fn apply_update(doc: &mut BsonDocument, upd: &UpdateDoc) -> bool {
    fn ensure_subdoc<'a>(root: &'a mut BsonDocument, key: &str) -> &'a mut BsonDocument {
        if !matches!(root.get(key), Some(Bson::Document(_))) {
            root.insert(key.to_string(), Bson::Document(BsonDocument::new()));
        }
        match root.get_mut(key) {
            Some(Bson::Document(d)) => d,
            _ => unreachable!("sub-document inserted above"),
        }
    }
    fn traverse_to_parent<'a>(root: &'a mut BsonDocument, path: &str) -> (&'a mut BsonDocument, String) {
        let mut cur = root;
        let mut iter = path.split('.').peekable();
        let mut last = String::new();
        while let Some(seg) = iter.next() {
            if iter.peek().is_none() {
                last = seg.to_string();
                break;
            }
            cur = ensure_subdoc(cur, seg);
        }
        (cur, last)
    }
    fn set_path(root: &mut BsonDocument, path: &str, value: Bson) -> bool {
        let (parent, last) = traverse_to_parent(root, path);
        let old = parent.insert(last, value.clone());
        old.as_ref() != Some(&value)
    }
    fn unset_path(root: &mut BsonDocument, path: &str) -> bool {
        let (parent, last) = traverse_to_parent(root, path);
        parent.remove(&last).is_some()
    }

    let mut changed = false;
    for (k, v) in &upd.set {
        if set_path(doc, k, v.clone()) {
            changed = true;
        }
    }
    for k in &upd.unset {
        if unset_path(doc, k) {
            changed = true;
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::SortSpec;
    use bson::doc;

    #[test]
    fn update_doc_set_and_unset_nested() {
        let mut d = doc! {"basic": {"firstName": "ann", "state": "CA"}};
        let ud = UpdateDoc {
            set: vec![("basic.firstName".into(), "Anna".into()), ("profile.bio".into(), "hi".into())],
            unset: vec!["basic.state".into()],
        };
        assert!(apply_update(&mut d, &ud));
        let basic = d.get_document("basic").unwrap();
        assert_eq!(basic.get_str("firstName").unwrap(), "Anna");
        assert!(basic.get("state").is_none());
        assert_eq!(d.get_document("profile").unwrap().get_str("bio").unwrap(), "hi");
        assert!(!apply_update(&mut d, &UpdateDoc::set("basic.firstName", "Anna")));
    }

    #[test]
    fn find_docs_sort_and_pagination() {
        let col = Collection::new("u_find", vec![]);
        for (k, v) in [(1, 3), (2, 1), (3, 2)] {
            col.insert_document(doc! {"k": k, "v": v, "x": 0}).unwrap();
        }
        let opts = FindOptions { sort: Some(vec![SortSpec::asc("v")]), limit: Some(2), skip: None };
        let docs = find_docs(&col, &Filter::eq("x", 0), &opts, None);
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].get_i32("k").unwrap(), 2);
        assert_eq!(docs[1].get_i32("k").unwrap(), 3);

        let opts = FindOptions { sort: Some(vec![SortSpec::asc("v")]), limit: Some(2), skip: Some(usize::MAX / 2) };
        assert!(find_docs(&col, &Filter::True, &opts, None).is_empty());
    }
}
