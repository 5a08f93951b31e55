//! The concrete pipelines behind listings, dashboard stats, the unpaid-member
//! report and the bulk deactivation sweep.

use super::{ConcatPart, Pipeline, ProjectField};
use crate::errors::{RegistryError, Result};
use crate::query::{CmpOp, Collation, FULL_NAME_FIELD, Filter, ListQuery, UpdateDoc};

pub const ROLES_PATH: &str = "basic.roles";
pub const ROLE_NAME_FIELD: &str = "roleName";
pub const TOTAL_FIELD: &str = "total";
pub const COUNT_FIELD: &str = "count";

/// Fields a listing row exposes; the password never leaves the store.
const LISTING_FIELDS: &[&str] = &[
    "_id",
    "basic.firstName",
    "basic.lastName",
    "basic.email",
    "basic.birthDate",
    "basic.isActive",
    "basic.profileImageURL",
    "basic.roles",
    "basic.mobileNumber",
    "basic.zipCode",
    "basic.state",
    "isActive",
    "userStatus",
    "sessionStatus",
    "programName",
    "isPaidMember",
    "planId",
    "planExpiry",
    "agentId",
    "brokerId",
    "createdAt",
    "updatedAt",
];

fn full_name(to: &str) -> ProjectField {
    ProjectField::Concat {
        to: to.to_string(),
        parts: vec![
            ConcatPart::Field("basic.firstName".into()),
            ConcatPart::Literal(" ".into()),
            ConcatPart::Field("basic.lastName".into()),
        ],
    }
}

fn listing_projection() -> Vec<ProjectField> {
    let mut fields: Vec<ProjectField> = LISTING_FIELDS.iter().map(|f| ProjectField::Include((*f).to_string())).collect();
    fields.push(full_name(FULL_NAME_FIELD));
    fields
}

/// project → match → sort → skip → limit, under the listing collation.
#[must_use]
pub fn listing_pipeline(q: &ListQuery, collation: &Collation) -> Pipeline {
    Pipeline::new()
        .with_collation(collation.clone())
        .project(listing_projection())
        .matching(q.filter.clone())
        .sort(q.sort.clone())
        .skip(q.skip)
        .limit(q.limit)
}

/// Same projection, match and collation as [`listing_pipeline`], counted.
#[must_use]
pub fn count_pipeline(q: &ListQuery, collation: &Collation) -> Pipeline {
    Pipeline::new()
        .with_collation(collation.clone())
        .project(listing_projection())
        .matching(q.filter.clone())
        .count(TOTAL_FIELD)
}

/// The owning entity whose records feed a dashboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnerSelector {
    Agent(String),
    Broker(String),
}

impl OwnerSelector {
    /// Exactly one of the two selectors must be supplied.
    ///
    /// # Errors
    /// `InvalidParameter` when both or neither are present.
    pub fn from_parts(agent_id: Option<String>, broker_id: Option<String>) -> Result<Self> {
        let agent_id = agent_id.filter(|s| !s.trim().is_empty());
        let broker_id = broker_id.filter(|s| !s.trim().is_empty());
        match (agent_id, broker_id) {
            (Some(a), None) => Ok(Self::Agent(a)),
            (None, Some(b)) => Ok(Self::Broker(b)),
            (Some(_), Some(_)) => Err(RegistryError::InvalidParameter("agentId and brokerId are mutually exclusive".into())),
            (None, None) => Err(RegistryError::InvalidParameter("one of agentId or brokerId is required".into())),
        }
    }

    fn filter(&self) -> Filter {
        match self {
            Self::Agent(id) => Filter::eq("agentId", id.as_str()),
            Self::Broker(id) => Filter::eq("brokerId", id.as_str()),
        }
    }
}

/// match owner → unwind roles → project role name → group by role name.
#[must_use]
pub fn dashboard_pipeline(owner: &OwnerSelector) -> Pipeline {
    Pipeline::new()
        .matching(owner.filter())
        .unwind(ROLES_PATH)
        .project(vec![ProjectField::Rename { to: ROLE_NAME_FIELD.into(), from: "basic.roles.name".into() }])
        .group_count(ROLE_NAME_FIELD, COUNT_FIELD)
}

/// Active, unpaid records whose plan expired at or before `cutoff` (epoch ms).
#[must_use]
pub fn unpaid_filter(cutoff_ms: i64) -> Filter {
    Filter::And(vec![
        Filter::eq("isActive", true),
        Filter::eq("isPaidMember", false),
        Filter::cmp("planExpiry", CmpOp::Lte, cutoff_ms),
    ])
}

/// One flat row per (record, role) pair.
#[must_use]
pub fn unpaid_pipeline(cutoff_ms: i64) -> Pipeline {
    Pipeline::new().matching(unpaid_filter(cutoff_ms)).unwind(ROLES_PATH).project(vec![
        ProjectField::Rename { to: "id".into(), from: "_id".into() },
        full_name("name"),
        ProjectField::Rename { to: "email".into(), from: "basic.email".into() },
        ProjectField::Rename { to: ROLE_NAME_FIELD.into(), from: "basic.roles.name".into() },
        ProjectField::Include("planId".into()),
        ProjectField::Include("planExpiry".into()),
    ])
}

/// The sweep's write; re-applying it to already inactive records changes nothing.
#[must_use]
pub fn deactivation_update() -> UpdateDoc {
    UpdateDoc::set("isActive", false)
}
