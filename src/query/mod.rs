// Submodules for separation of concerns
mod builder;
mod collation;
mod eval;
mod exec;
mod types;

pub use builder::{
    DEFAULT_LIMIT, EMAIL_PATH, FULL_NAME_FIELD, ListParams, ListQuery, ROLE_NAME_PATH, SORT_FIELDS, build_list_query,
};
pub use collation::Collation;
pub use eval::{compare_bson, compare_docs, eval_filter, eval_filter_with, get_path, resolve_path};
pub use exec::{apply_update, find_docs, find_one, update_many, update_one};
pub use types::{CmpOp, Filter, FindOptions, Order, SortSpec, UpdateDoc, UpdateReport};
