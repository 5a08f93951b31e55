use crate::types::{RecordId, now_millis};
use bson::{Bson, Document as BsonDocument};

pub const ID_FIELD: &str = "_id";
pub const CREATED_AT_FIELD: &str = "createdAt";
pub const UPDATED_AT_FIELD: &str = "updatedAt";

/// A stored document: its identifier plus the BSON body. The body always
/// carries `_id`, `createdAt` and `updatedAt` once it has been stamped.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: RecordId,
    pub data: BsonDocument,
}

impl Document {
    /// Wraps `data`, reusing an existing string `_id` or generating a fresh one.
    #[must_use]
    pub fn new(mut data: BsonDocument) -> Self {
        let id = match data.get(ID_FIELD) {
            Some(Bson::String(s)) if !s.is_empty() => RecordId(s.clone()),
            _ => RecordId::new(),
        };
        data.insert(ID_FIELD, id.as_str());
        Self { id, data }
    }

    /// Sets both timestamps unless the body already carries them (snapshot restore).
    pub fn stamp_created(&mut self) {
        let now = now_millis();
        if !matches!(self.data.get(CREATED_AT_FIELD), Some(Bson::Int64(_))) {
            self.data.insert(CREATED_AT_FIELD, now);
        }
        if !matches!(self.data.get(UPDATED_AT_FIELD), Some(Bson::Int64(_))) {
            self.data.insert(UPDATED_AT_FIELD, now);
        }
    }

    pub fn touch(&mut self) {
        self.data.insert(UPDATED_AT_FIELD, now_millis());
    }

    #[must_use]
    pub fn created_at(&self) -> Option<i64> {
        self.data.get(CREATED_AT_FIELD).and_then(Bson::as_i64)
    }
}
