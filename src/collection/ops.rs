use super::core::{Collection, State};
use crate::document::{Document, ID_FIELD};
use crate::errors::{RegistryError, Result};
use crate::logger::AUDIT_TARGET as AUDIT;
use crate::query::{Collation, Filter, UpdateDoc, UpdateReport, apply_update, eval_filter_with};
use crate::types::RecordId;
use bson::Document as BsonDocument;


impl Collection {
    /// Inserts a new document, stamping `_id`, `createdAt` and `updatedAt`.
    ///
    /// # Errors
    /// `DuplicateKey` when a unique index already holds the document's key;
    /// the collection is left unchanged.
    pub fn insert_document(&self, data: BsonDocument) -> Result<RecordId> {
        let mut document = Document::new(data);
        document.stamp_created();
        let id = document.id.clone();
        let mut st = self.state.write();
        if st.docs.contains_key(&id) {
            return Err(RegistryError::DuplicateKey { field: ID_FIELD.into(), value: id.to_string() });
        }
        check_unique(&st, &document.data, &id)?;
        index_insert(&mut st, &document.data, &id);
        st.docs.insert(id.clone(), document);
        st.order.push(id.clone());
        drop(st);
        log::info!(target: AUDIT, "op=insert collection={} id={}", self.name(), id);
        Ok(id)
    }

    #[must_use]
    pub fn find_document(&self, id: &RecordId) -> Option<Document> {
        self.state.read().docs.get(id).cloned()
    }

    /// Clones every document in insertion order.
    #[must_use]
    pub fn all_documents(&self) -> Vec<Document> {
        let st = self.state.read();
        st.order.iter().filter_map(|id| st.docs.get(id).cloned()).collect()
    }

    /// Applies `update` to the first (`many == false`) or every matching document.
    ///
    /// Index checks for all affected documents run before any write, so the
    /// update lands completely or not at all. Documents whose body does not
    /// change keep their `updatedAt`.
    ///
    /// # Errors
    /// `DuplicateKey` when the new values collide with another document.
    pub fn update_matching(
        &self,
        filter: &Filter,
        update: &UpdateDoc,
        many: bool,
        collation: Option<&Collation>,
    ) -> Result<UpdateReport> {
        let mut st = self.state.write();
        let mut staged: Vec<Document> = Vec::new();
        let mut matched = 0u64;
        for id in &st.order {
            let Some(doc) = st.docs.get(id) else { continue };
            if !eval_filter_with(&doc.data, filter, collation) {
                continue;
            }
            matched += 1;
            let mut next = doc.clone();
            if apply_update(&mut next.data, update) {
                next.data.insert(ID_FIELD, id.as_str());
                next.touch();
                staged.push(next);
            }
            if !many {
                break;
            }
        }
        for (i, doc) in staged.iter().enumerate() {
            check_unique(&st, &doc.data, &doc.id)?;
            for other in &staged[..i] {
                for idx in &st.indexes {
                    if idx.key_of(&doc.data).is_some() && idx.key_of(&doc.data) == idx.key_of(&other.data) {
                        return Err(RegistryError::DuplicateKey {
                            field: idx.spec.path.clone(),
                            value: idx.key_of(&doc.data).unwrap_or_default(),
                        });
                    }
                }
            }
        }
        let modified = staged.len() as u64;
        for doc in staged {
            if let Some(old) = st.docs.get(&doc.id).map(|d| d.data.clone()) {
                index_remove(&mut st, &old, &doc.id);
            }
            index_insert(&mut st, &doc.data, &doc.id);
            log::info!(target: AUDIT, "op=update collection={} id={}", self.name(), doc.id);
            st.docs.insert(doc.id.clone(), doc);
        }
        Ok(UpdateReport { matched, modified })
    }

    /// Drops every document, keeping the declared indexes.
    pub fn clear(&self) {
        let mut st = self.state.write();
        st.docs.clear();
        st.order.clear();
        let specs: Vec<_> = st.indexes.iter().map(|i| i.spec.clone()).collect();
        st.indexes = specs.into_iter().map(super::index::UniqueIndex::new).collect();
    }
}

fn check_unique(st: &State, data: &BsonDocument, owner: &RecordId) -> Result<()> {
    for idx in &st.indexes {
        if let Some(key) = idx.key_of(data)
            && idx.conflict(&key, owner).is_some()
        {
            return Err(RegistryError::DuplicateKey { field: idx.spec.path.clone(), value: key });
        }
    }
    Ok(())
}

fn index_insert(st: &mut State, data: &BsonDocument, owner: &RecordId) {
    for idx in &mut st.indexes {
        if let Some(key) = idx.key_of(data) {
            idx.insert(key, owner.clone());
        }
    }
}

fn index_remove(st: &mut State, data: &BsonDocument, owner: &RecordId) {
    for idx in &mut st.indexes {
        if let Some(key) = idx.key_of(data) {
            idx.remove(&key, owner);
        }
    }
}
