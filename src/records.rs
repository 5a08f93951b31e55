//! Hospital/user records: the data model, the pre-persist hook and the
//! service that implements every record, report and auth operation.

pub mod hooks;
pub mod model;
pub mod service;

pub use hooks::{PrePersist, normalize_email};
pub use model::{
    Basic, ChangePasswordRequest, CodeRequest, HospitalRecord, IssuedCode, ListPage, LoginOutcome, LoginRequest,
    NewBasic, NewHospital, NewRole, NewRoleEntry, PositionImage, Role, RoleEntry, UnpaidRow, VerifyCodeRequest,
};
pub use service::{RecordService, ServiceSettings, flatten_update, json_to_bson};
