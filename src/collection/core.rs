use super::index::{IndexSpec, UniqueIndex};
use crate::document::Document;
use crate::types::RecordId;
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub(crate) struct State {
    pub(crate) docs: HashMap<RecordId, Document>,
    /// Insertion order; listings without a sort come back in this order.
    pub(crate) order: Vec<RecordId>,
    pub(crate) indexes: Vec<UniqueIndex>,
}

pub struct Collection {
    name: String,
    pub(crate) state: RwLock<State>,
}

impl Collection {
    pub fn new(name: impl Into<String>, indexes: Vec<IndexSpec>) -> Self {
        let state = State {
            indexes: indexes.into_iter().map(UniqueIndex::new).collect(),
            ..State::default()
        };
        Self { name: name.into(), state: RwLock::new(state) }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
