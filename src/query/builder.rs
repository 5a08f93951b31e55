//! Turns listing request parameters into a filter / sort / skip / limit
//! description without touching the store.

use serde::{Deserialize, Deserializer, de};

use super::types::{Filter, MAX_LIMIT, Order, SortSpec};
use crate::errors::{RegistryError, Result};

pub const FULL_NAME_FIELD: &str = "fullName";
pub const EMAIL_PATH: &str = "basic.email";
pub const ROLE_NAME_PATH: &str = "basic.roles.name";
const ADMIN_ROLE: &str = "admin";
pub const DEFAULT_LIMIT: i64 = 10;

/// Sort keys addressable by the numeric `key` request parameter.
pub const SORT_FIELDS: &[&str] = &["createdAt", FULL_NAME_FIELD, EMAIL_PATH, "updatedAt", "userStatus", "basic.state"];

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    #[serde(default = "default_page")]
    pub page_number: i64,
    /// Falls back to [`DEFAULT_LIMIT`] when absent.
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub key: usize,
    /// `1` or `-1`; a leading `+` (or the space a bare `+` decodes to in a
    /// query string) is accepted.
    #[serde(default = "default_order", deserialize_with = "signed_order")]
    pub order: i32,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    /// The caller's own record id; excluded when listing fellow admins.
    #[serde(default)]
    pub user_id: Option<String>,
}

const fn default_page() -> i64 {
    1
}

const fn default_order() -> i32 {
    -1
}

fn signed_order<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<i32, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i32),
        Text(String),
    }
    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => {
            let t = s.trim();
            t.strip_prefix('+').unwrap_or(t).parse().map_err(|_| de::Error::custom(format!("invalid order {s:?}")))
        }
    }
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page_number: default_page(),
            limit: None,
            key: 0,
            order: default_order(),
            pattern: None,
            role: None,
            user_id: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ListQuery {
    pub filter: Filter,
    pub sort: Vec<SortSpec>,
    pub skip: usize,
    pub limit: usize,
    pub page_number: usize,
}

/// # Errors
/// `InvalidParameter` when `pageNumber < 1`, `limit <= 0` (or above the
/// engine maximum), the sort key or order is unknown, or the pattern is too long.
pub fn build_list_query(params: &ListParams) -> Result<ListQuery> {
    if params.page_number < 1 {
        return Err(RegistryError::InvalidParameter(format!(
            "pageNumber must be at least 1, got {}",
            params.page_number
        )));
    }
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT);
    if limit <= 0 {
        return Err(RegistryError::InvalidParameter(format!("limit must be positive, got {limit}")));
    }
    let limit = usize::try_from(limit)
        .ok()
        .filter(|l| *l <= MAX_LIMIT)
        .ok_or_else(|| RegistryError::InvalidParameter(format!("limit may not exceed {MAX_LIMIT}")))?;
    let page_number = usize::try_from(params.page_number)
        .map_err(|_| RegistryError::InvalidParameter("pageNumber out of range".into()))?;
    let skip = (page_number - 1)
        .checked_mul(limit)
        .ok_or_else(|| RegistryError::InvalidParameter("pageNumber out of range".into()))?;

    let field = SORT_FIELDS
        .get(params.key)
        .ok_or_else(|| RegistryError::InvalidParameter(format!("unknown sort key {}", params.key)))?;
    let order = Order::from_sign(params.order)?;
    let mut sort = vec![SortSpec { field: (*field).to_string(), order }];
    if *field != "_id" {
        sort.push(SortSpec::asc("_id"));
    }

    let mut terms = Vec::new();
    if let Some(pattern) = params.pattern.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
        let literal = regex::escape(pattern);
        terms.push(Filter::Or(vec![
            Filter::regex(FULL_NAME_FIELD, &literal, true)?,
            Filter::regex(EMAIL_PATH, &literal, true)?,
        ]));
    }
    if let Some(role) = params.role.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
        terms.push(Filter::eq(ROLE_NAME_PATH, role));
        if role.eq_ignore_ascii_case(ADMIN_ROLE)
            && let Some(me) = params.user_id.as_deref().filter(|u| !u.is_empty())
        {
            terms.push(Filter::ne("_id", me));
        }
    }

    Ok(ListQuery { filter: Filter::all(terms), sort, skip, limit, page_number })
}
