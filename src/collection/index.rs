use crate::query::get_path;
use crate::types::RecordId;
use bson::{Bson, Document as BsonDocument};
use std::collections::HashMap;

/// Declares a unique index on a dotted path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub path: String,
    pub case_insensitive: bool,
}

impl IndexSpec {
    pub fn unique_ci(path: impl Into<String>) -> Self {
        Self { path: path.into(), case_insensitive: true }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct UniqueIndex {
    pub(crate) spec: IndexSpec,
    keys: HashMap<String, RecordId>,
}

impl UniqueIndex {
    pub(crate) fn new(spec: IndexSpec) -> Self {
        Self { spec, keys: HashMap::new() }
    }

    /// Documents without a scalar value at the path are not indexed.
    pub(crate) fn key_of(&self, doc: &BsonDocument) -> Option<String> {
        let raw = match get_path(doc, &self.spec.path)? {
            Bson::String(s) => s.trim().to_string(),
            Bson::Int32(i) => i.to_string(),
            Bson::Int64(i) => i.to_string(),
            Bson::Boolean(b) => b.to_string(),
            _ => return None,
        };
        Some(if self.spec.case_insensitive { raw.to_lowercase() } else { raw })
    }

    /// Returns the holder of `key` when it is some record other than `owner`.
    pub(crate) fn conflict(&self, key: &str, owner: &RecordId) -> Option<&RecordId> {
        self.keys.get(key).filter(|holder| *holder != owner)
    }

    pub(crate) fn insert(&mut self, key: String, owner: RecordId) {
        self.keys.insert(key, owner);
    }

    pub(crate) fn remove(&mut self, key: &str, owner: &RecordId) {
        if self.keys.get(key) == Some(owner) {
            self.keys.remove(key);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.keys.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn case_insensitive_keys_fold() {
        let idx = UniqueIndex::new(IndexSpec::unique_ci("basic.email"));
        let d = doc! {"basic": {"email": " A@X.com "}};
        assert_eq!(idx.key_of(&d).as_deref(), Some("a@x.com"));
        assert_eq!(idx.key_of(&doc! {"basic": {}}), None);
    }

    #[test]
    fn conflict_ignores_owner() {
        let mut idx = UniqueIndex::new(IndexSpec { path: "code".into(), case_insensitive: false });
        let a = RecordId::from("a");
        idx.insert("1".into(), a.clone());
        assert!(idx.conflict("1", &a).is_none());
        assert_eq!(idx.conflict("1", &RecordId::from("b")), Some(&a));
        idx.remove("1", &RecordId::from("b"));
        assert_eq!(idx.len(), 1);
        idx.remove("1", &a);
        assert_eq!(idx.len(), 0);
    }
}
