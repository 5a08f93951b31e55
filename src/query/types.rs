use bson::Bson;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::errors::{RegistryError, Result};

// Safety limits to prevent resource abuse
pub(crate) const MAX_PATH_DEPTH: usize = 32;
pub(crate) const MAX_IN_SET: usize = 1000;
pub(crate) const MAX_SORT_FIELDS: usize = 8;
pub(crate) const MAX_LIMIT: usize = 10_000;
pub(crate) const MAX_PATTERN_LEN: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Order {
    Asc,
    Desc,
}

impl Order {
    /// Maps the `+1` / `-1` convention used by listing requests.
    pub fn from_sign(sign: i32) -> Result<Self> {
        match sign {
            1 => Ok(Self::Asc),
            -1 => Ok(Self::Desc),
            other => Err(RegistryError::InvalidParameter(format!("order must be 1 or -1, got {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub order: Order,
}

impl SortSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        Self { field: field.into(), order: Order::Asc }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self { field: field.into(), order: Order::Desc }
    }
}

/// Options for `find_docs`.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub sort: Option<Vec<SortSpec>>,
    pub limit: Option<usize>,
    pub skip: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

#[derive(Debug, Clone)]
pub enum Filter {
    True,
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Exists { path: String, exists: bool },
    In { path: String, values: Vec<Bson> },
    Nin { path: String, values: Vec<Bson> },
    Cmp { path: String, op: CmpOp, value: Bson },
    Regex { path: String, regex: Regex },
}

impl Filter {
    pub fn eq(path: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::Cmp { path: path.into(), op: CmpOp::Eq, value: value.into() }
    }

    pub fn ne(path: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::Cmp { path: path.into(), op: CmpOp::Ne, value: value.into() }
    }

    pub fn cmp(path: impl Into<String>, op: CmpOp, value: impl Into<Bson>) -> Self {
        Self::Cmp { path: path.into(), op, value: value.into() }
    }

    /// Compiles `pattern` as-is; callers wanting a literal match escape it first.
    pub fn regex(path: impl Into<String>, pattern: &str, case_insensitive: bool) -> Result<Self> {
        if pattern.len() > MAX_PATTERN_LEN {
            return Err(RegistryError::InvalidParameter(format!(
                "pattern longer than {MAX_PATTERN_LEN} bytes"
            )));
        }
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(case_insensitive)
            .build()
            .map_err(|e| RegistryError::InvalidParameter(format!("bad pattern: {e}")))?;
        Ok(Self::Regex { path: path.into(), regex })
    }

    /// Conjunction that drops `True` terms and collapses single-term lists.
    #[must_use]
    pub fn all(terms: Vec<Filter>) -> Self {
        let mut terms: Vec<Filter> = terms.into_iter().filter(|f| !matches!(f, Filter::True)).collect();
        match terms.len() {
            0 => Filter::True,
            1 => terms.remove(0),
            _ => Filter::And(terms),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct UpdateDoc {
    pub set: Vec<(String, Bson)>,
    pub unset: Vec<String>,
}

impl UpdateDoc {
    pub fn set(path: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self { set: vec![(path.into(), value.into())], unset: Vec::new() }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty()
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateReport {
    pub matched: u64,
    pub modified: u64,
}
