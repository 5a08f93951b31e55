use chrono::serde::ts_milliseconds_option;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PROFILE_IMAGE_URL: &str = "https://s3.amazonaws.com/hospital-registry/default-profile.png";
pub const STATUS_NOT_VERIFIED: &str = "Not Verified";
pub const STATUS_VERIFIED: &str = "Verified";
pub const SESSION_ACTIVE: &str = "Active";
pub const SESSION_LOGGED_OUT: &str = "LoggedOut";

pub const PASSWORD_PATH: &str = "basic.password";

fn not_verified() -> String {
    STATUS_NOT_VERIFIED.to_string()
}

/// One account/profile record as stored in the `hospitals` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HospitalRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub basic: Basic,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default = "not_verified")]
    pub user_status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program_name: Option<String>,
    #[serde(default)]
    pub position_images: Vec<PositionImage>,
    #[serde(default)]
    pub is_paid_member: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<String>,
    #[serde(default, with = "ts_milliseconds_option", skip_serializing_if = "Option::is_none")]
    pub plan_expiry: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broker_id: Option<String>,
    /// Synthesized `firstName + " " + lastName`; only present on listing rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, with = "ts_milliseconds_option", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, with = "ts_milliseconds_option", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl HospitalRecord {
    /// Strips the password hash; every record leaving the service goes through here.
    #[must_use]
    pub fn redacted(mut self) -> Self {
        self.basic.password = None;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Basic {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, with = "ts_milliseconds_option", skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(rename = "profileImageURL", default)]
    pub profile_image_url: String,
    #[serde(default)]
    pub roles: Vec<RoleEntry>,
    #[serde(default)]
    pub mobile_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

/// A role held by a record: the role's name plus a weak reference to the
/// `roles` collection, resolved on read when the referenced role exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_ref: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<Role>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionImage {
    pub image_path: String,
    #[serde(default)]
    pub month: i32,
    #[serde(default)]
    pub month_name: String,
    #[serde(default)]
    pub year: i32,
    #[serde(default)]
    pub position_key: String,
    #[serde(default)]
    pub is_first_month: bool,
    #[serde(default)]
    pub is_first_year: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// Account-creation payload. Status fields are absent on purpose: a new
/// record always starts inactive and unverified.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewHospital {
    pub basic: NewBasic,
    #[serde(default)]
    pub program_name: Option<String>,
    #[serde(default)]
    pub position_images: Vec<PositionImage>,
    #[serde(default)]
    pub is_paid_member: bool,
    #[serde(default)]
    pub plan_id: Option<String>,
    #[serde(default, with = "ts_milliseconds_option")]
    pub plan_expiry: Option<DateTime<Utc>>,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub broker_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBasic {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    pub email: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default, with = "ts_milliseconds_option")]
    pub birth_date: Option<DateTime<Utc>>,
    #[serde(rename = "profileImageURL", default)]
    pub profile_image_url: Option<String>,
    #[serde(default)]
    pub roles: Vec<NewRoleEntry>,
    #[serde(default)]
    pub mobile_number: Option<String>,
    pub zip_code: String,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRoleEntry {
    #[serde(default)]
    pub role_ref: Option<String>,
    pub name: String,
}

impl NewHospital {
    /// Builds the record to persist; `default_image` fills a missing profile image.
    #[must_use]
    pub fn into_record(self, id: String, default_image: &str) -> HospitalRecord {
        let b = self.basic;
        HospitalRecord {
            id,
            basic: Basic {
                first_name: b.first_name,
                last_name: b.last_name,
                email: b.email,
                password: b.password,
                birth_date: b.birth_date,
                is_active: false,
                profile_image_url: b
                    .profile_image_url
                    .filter(|u| !u.trim().is_empty())
                    .unwrap_or_else(|| default_image.to_string()),
                roles: b
                    .roles
                    .into_iter()
                    .map(|r| RoleEntry { role_ref: r.role_ref, name: r.name, resolved: None })
                    .collect(),
                mobile_number: b.mobile_number.unwrap_or_default(),
                zip_code: Some(b.zip_code),
                state: b.state,
            },
            is_active: false,
            user_status: not_verified(),
            session_status: None,
            program_name: self.program_name,
            position_images: self.position_images,
            is_paid_member: self.is_paid_member,
            plan_id: self.plan_id,
            plan_expiry: self.plan_expiry,
            agent_id: self.agent_id,
            broker_id: self.broker_id,
            full_name: None,
            created_at: None,
            updated_at: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRole {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// One page of a listing plus the total the same filter matches.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPage {
    pub items: Vec<HospitalRecord>,
    pub total: u64,
    pub page_number: usize,
    pub limit: usize,
}

/// A flat row of the unpaid-members report (one per record and role).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnpaidRow {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub email: String,
    #[serde(default)]
    pub role_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<String>,
    #[serde(default, with = "ts_milliseconds_option", skip_serializing_if = "Option::is_none")]
    pub plan_expiry: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginOutcome {
    pub token: String,
    pub user: HospitalRecord,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedCode {
    pub code: String,
    pub expires_in_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeRequest {
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyCodeRequest {
    pub email: String,
    pub code: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn new_hospital() -> NewHospital {
        serde_json::from_value(json!({
            "basic": {
                "firstName": "Ann", "lastName": "Lee", "email": "ann@x.com",
                "zipCode": "94110", "roles": [{"name": "agent", "roleRef": "r1"}]
            },
            "isActive": true,
            "userStatus": "Verified",
            "planExpiry": 1_700_000_000_000_i64
        }))
        .unwrap()
    }

    #[test]
    fn new_records_start_inactive_and_unverified() {
        let rec = new_hospital().into_record("id1".into(), DEFAULT_PROFILE_IMAGE_URL);
        assert!(!rec.is_active);
        assert!(!rec.basic.is_active);
        assert_eq!(rec.user_status, STATUS_NOT_VERIFIED);
        assert_eq!(rec.basic.profile_image_url, DEFAULT_PROFILE_IMAGE_URL);
        assert_eq!(rec.plan_expiry.map(|d| d.timestamp_millis()), Some(1_700_000_000_000));
    }

    #[test]
    fn bson_form_uses_camel_case_and_int64_timestamps() {
        let rec = new_hospital().into_record("id1".into(), "img");
        let doc = bson::serialize_to_document(&rec).unwrap();
        assert_eq!(doc.get_str("_id").unwrap(), "id1");
        assert_eq!(doc.get_i64("planExpiry").unwrap(), 1_700_000_000_000);
        let basic = doc.get_document("basic").unwrap();
        assert_eq!(basic.get_str("profileImageURL").unwrap(), "img");
        assert!(basic.get("password").is_none());
        let back: HospitalRecord = bson::deserialize_from_document(doc).unwrap();
        assert_eq!(back, rec);
    }

    #[test]
    fn redaction_drops_password() {
        let mut rec = new_hospital().into_record("id1".into(), "img");
        rec.basic.password = Some("$argon2id$...".into());
        let json = serde_json::to_value(rec.redacted()).unwrap();
        assert!(json["basic"].get("password").is_none());
    }
}
