//! Multi-stage transforms (project, match, sort, skip, limit, unwind, group,
//! count) executed over a snapshot of a collection.

mod exec;
pub mod reports;

use crate::query::{Collation, Filter, SortSpec};

pub use exec::run_pipeline;
pub use reports::{
    OwnerSelector, count_pipeline, dashboard_pipeline, deactivation_update, listing_pipeline, unpaid_filter,
    unpaid_pipeline,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConcatPart {
    Field(String),
    Literal(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectField {
    /// Copies the value at a dotted path to the same path in the output.
    Include(String),
    Rename { to: String, from: String },
    Concat { to: String, parts: Vec<ConcatPart> },
}

#[derive(Debug, Clone)]
pub enum Stage {
    Project(Vec<ProjectField>),
    Match(Filter),
    Sort(Vec<SortSpec>),
    Skip(usize),
    Limit(usize),
    Unwind(String),
    Group { by: String, count_as: String },
    Count(String),
}

impl Stage {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Project(_) => "$project",
            Self::Match(_) => "$match",
            Self::Sort(_) => "$sort",
            Self::Skip(_) => "$skip",
            Self::Limit(_) => "$limit",
            Self::Unwind(_) => "$unwind",
            Self::Group { .. } => "$group",
            Self::Count(_) => "$count",
        }
    }
}

/// An ordered list of stages plus the collation used by every string
/// comparison inside them.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    pub stages: Vec<Stage>,
    pub collation: Option<Collation>,
}

impl Pipeline {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_collation(mut self, collation: Collation) -> Self {
        self.collation = Some(collation);
        self
    }

    #[must_use]
    pub fn project(mut self, fields: Vec<ProjectField>) -> Self {
        self.stages.push(Stage::Project(fields));
        self
    }

    #[must_use]
    pub fn matching(mut self, filter: Filter) -> Self {
        self.stages.push(Stage::Match(filter));
        self
    }

    #[must_use]
    pub fn sort(mut self, specs: Vec<SortSpec>) -> Self {
        self.stages.push(Stage::Sort(specs));
        self
    }

    #[must_use]
    pub fn skip(mut self, n: usize) -> Self {
        self.stages.push(Stage::Skip(n));
        self
    }

    #[must_use]
    pub fn limit(mut self, n: usize) -> Self {
        self.stages.push(Stage::Limit(n));
        self
    }

    #[must_use]
    pub fn unwind(mut self, path: impl Into<String>) -> Self {
        self.stages.push(Stage::Unwind(path.into()));
        self
    }

    #[must_use]
    pub fn group_count(mut self, by: impl Into<String>, count_as: impl Into<String>) -> Self {
        self.stages.push(Stage::Group { by: by.into(), count_as: count_as.into() });
        self
    }

    #[must_use]
    pub fn count(mut self, field: impl Into<String>) -> Self {
        self.stages.push(Stage::Count(field.into()));
        self
    }

    /// Stage names in order, for logs.
    #[must_use]
    pub fn describe(&self) -> String {
        self.stages.iter().map(Stage::name).collect::<Vec<_>>().join(" -> ")
    }
}
