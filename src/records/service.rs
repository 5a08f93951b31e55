use bson::{Bson, Document as BsonDocument};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::hooks::{PrePersist, normalize_email};
use super::model::{
    ChangePasswordRequest, CodeRequest, DEFAULT_PROFILE_IMAGE_URL, HospitalRecord, IssuedCode, ListPage, LoginOutcome,
    LoginRequest, NewHospital, NewRole, PASSWORD_PATH, Role, SESSION_ACTIVE, SESSION_LOGGED_OUT, STATUS_VERIFIED,
    UnpaidRow, VerifyCodeRequest,
};
use crate::auth::TokenService;
use crate::crypto::verify_password;
use crate::document::{CREATED_AT_FIELD, ID_FIELD, UPDATED_AT_FIELD};
use crate::errors::{FieldError, RegistryError, Result};
use crate::logger::AUDIT_TARGET;
use crate::pipeline::reports::{COUNT_FIELD, TOTAL_FIELD};
use crate::pipeline::{
    OwnerSelector, count_pipeline, dashboard_pipeline, deactivation_update, listing_pipeline, unpaid_filter,
    unpaid_pipeline,
};
use crate::query::{
    Collation, DEFAULT_LIMIT, EMAIL_PATH, Filter, FindOptions, ListParams, UpdateDoc, UpdateReport, apply_update,
    build_list_query,
};
use crate::store::{HOSPITALS, ROLES, RecordStore};
use crate::types::RecordId;

const INVALID_CREDENTIALS: &str = "invalid email or password";

/// Paths a partial update may write; everything else is rejected. Status
/// fields are left out: they move only through login, logout, code
/// verification and the deactivation sweep.
const UPDATABLE: &[&str] = &[
    "basic.firstName",
    "basic.lastName",
    EMAIL_PATH,
    PASSWORD_PATH,
    "basic.birthDate",
    "basic.profileImageURL",
    "basic.roles",
    "basic.mobileNumber",
    "basic.zipCode",
    "basic.state",
    "programName",
    "positionImages",
    "isPaidMember",
    "planId",
    "planExpiry",
    "agentId",
    "brokerId",
];

const PROTECTED: &[&str] = &[ID_FIELD, CREATED_AT_FIELD, UPDATED_AT_FIELD];

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub default_page_limit: i64,
    pub max_page_limit: i64,
    pub default_profile_image_url: String,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            default_page_limit: DEFAULT_LIMIT,
            max_page_limit: 100,
            default_profile_image_url: DEFAULT_PROFILE_IMAGE_URL.to_string(),
        }
    }
}

/// Record operations on top of a [`RecordStore`] and a [`TokenService`].
/// Holds no per-request state; clone the `Arc` freely.
pub struct RecordService {
    store: Arc<dyn RecordStore>,
    tokens: Arc<dyn TokenService>,
    settings: ServiceSettings,
    collation: Collation,
}

impl RecordService {
    pub fn new(store: Arc<dyn RecordStore>, tokens: Arc<dyn TokenService>, settings: ServiceSettings) -> Self {
        Self { store, tokens, settings, collation: Collation::default() }
    }

    #[must_use]
    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    // --- records ---

    /// # Errors
    /// `DuplicateKey` when the email is taken; `Hash` if hashing fails.
    pub async fn create(&self, input: NewHospital) -> Result<HospitalRecord> {
        let record = input.into_record(RecordId::new().0, &self.settings.default_profile_image_url);
        let mut doc = bson::serialize_to_document(&record)?;
        doc.pre_persist()?;
        let id = self.store.insert(HOSPITALS, doc).await?;
        log::info!(target: AUDIT_TARGET, "op=create_record id={id}");
        self.get_by_id(id.as_str()).await
    }

    /// Reads one record with its role references resolved.
    ///
    /// # Errors
    /// `NotFound` when no record has this id.
    pub async fn get_by_id(&self, id: &str) -> Result<HospitalRecord> {
        let doc = self.raw_by_id(id).await?;
        self.present(doc).await
    }

    /// # Errors
    /// `NotFound` when no record uses this email.
    pub async fn get_by_email(&self, email: &str) -> Result<HospitalRecord> {
        let email = normalize_email(email);
        let doc = self
            .store
            .find_one(HOSPITALS, &Filter::eq(EMAIL_PATH, email.as_str()))
            .await?
            .ok_or_else(|| RegistryError::NotFound(format!("no record with email {email}")))?;
        self.present(doc).await
    }

    /// Every record in insertion order, unpaginated.
    ///
    /// # Errors
    /// Store failures.
    pub async fn list_all(&self) -> Result<Vec<HospitalRecord>> {
        let docs = self.store.find(HOSPITALS, &Filter::True, &FindOptions::default()).await?;
        docs.into_iter().map(|d| decode_record(d).map(HospitalRecord::redacted)).collect()
    }

    /// One listing page plus the total matching the same filter. The page
    /// and count pipelines run concurrently; either failing fails the call.
    ///
    /// # Errors
    /// `InvalidParameter` for bad pagination or sort input, `QueryExecution`
    /// when a stage fails.
    pub async fn list(&self, mut params: ListParams) -> Result<ListPage> {
        let limit = *params.limit.get_or_insert(self.settings.default_page_limit);
        if limit > self.settings.max_page_limit {
            return Err(RegistryError::InvalidParameter(format!(
                "limit may not exceed {}",
                self.settings.max_page_limit
            )));
        }
        let q = build_list_query(&params)?;
        let page = listing_pipeline(&q, &self.collation);
        let count = count_pipeline(&q, &self.collation);
        let (rows, counted) =
            tokio::try_join!(self.store.aggregate(HOSPITALS, &page), self.store.aggregate(HOSPITALS, &count))?;
        let total = counted
            .first()
            .and_then(|d| d.get(TOTAL_FIELD))
            .and_then(Bson::as_i64)
            .and_then(|n| u64::try_from(n).ok())
            .unwrap_or(0);
        let items = rows.into_iter().map(|d| decode_record(d).map(HospitalRecord::redacted)).collect::<Result<_>>()?;
        Ok(ListPage { items, total, page_number: q.page_number, limit: q.limit })
    }

    /// Partial update. Nested objects flatten into dotted paths, the
    /// password is re-hashed only when the payload carries it, and an email
    /// change is checked against other records first.
    ///
    /// # Errors
    /// `Validation` for protected, unknown or ill-typed fields; `NotFound`
    /// for an unknown id; `DuplicateKey` when the new email is taken.
    pub async fn update(&self, id: &str, fields: &Map<String, Value>) -> Result<HospitalRecord> {
        let mut update = flatten_update(fields)?;
        update.pre_persist()?;
        let mut preview = self.raw_by_id(id).await?;
        if let Some((_, Bson::String(email))) = update.set.iter().find(|(p, _)| p == EMAIL_PATH)
            && self.find_email_conflict(Some(id), email).await?.is_some()
        {
            return Err(RegistryError::DuplicateKey { field: EMAIL_PATH.into(), value: email.clone() });
        }

        apply_update(&mut preview, &update);
        bson::deserialize_from_document::<HospitalRecord>(preview)
            .map_err(|e| RegistryError::validation("body", e.to_string()))?;

        let report = self.store.update_one(HOSPITALS, &Filter::eq(ID_FIELD, id), &update).await?;
        if report.matched == 0 {
            return Err(RegistryError::NotFound(format!("record {id}")));
        }
        log::info!(target: AUDIT_TARGET, "op=update_record id={id} fields={}", update.set.len());
        self.get_by_id(id).await
    }

    /// Another record (not `exclude_id`) already using `email`, if any.
    ///
    /// # Errors
    /// Store failures.
    pub async fn find_email_conflict(&self, exclude_id: Option<&str>, email: &str) -> Result<Option<HospitalRecord>> {
        let mut terms = vec![Filter::eq(EMAIL_PATH, normalize_email(email))];
        if let Some(id) = exclude_id {
            terms.push(Filter::ne(ID_FIELD, id));
        }
        match self.store.find_one(HOSPITALS, &Filter::all(terms)).await? {
            Some(doc) => Ok(Some(decode_record(doc)?.redacted())),
            None => Ok(None),
        }
    }

    // --- reports ---

    /// Role-name histogram over the records owned by one agent or broker.
    ///
    /// # Errors
    /// `QueryExecution` when a stage fails.
    pub async fn dashboard_stats(&self, owner: &OwnerSelector) -> Result<BTreeMap<String, u64>> {
        let rows = self.store.aggregate(HOSPITALS, &dashboard_pipeline(owner)).await?;
        let mut stats = BTreeMap::new();
        for row in rows {
            let Some(Bson::String(role)) = row.get(ID_FIELD) else {
                log::debug!("dashboard: skipping group without a role name: {row}");
                continue;
            };
            let n = row.get(COUNT_FIELD).and_then(Bson::as_i64).and_then(|n| u64::try_from(n).ok()).unwrap_or(0);
            stats.insert(role.clone(), n);
        }
        Ok(stats)
    }

    /// # Errors
    /// `QueryExecution` when a stage fails.
    pub async fn unpaid_members(&self, cutoff_ms: i64) -> Result<Vec<UnpaidRow>> {
        let rows = self.store.aggregate(HOSPITALS, &unpaid_pipeline(cutoff_ms)).await?;
        rows.into_iter().map(|d| Ok(bson::deserialize_from_document(d)?)).collect()
    }

    /// Deactivates every active, unpaid record whose plan expired by
    /// `cutoff_ms`. Running it again changes nothing.
    ///
    /// # Errors
    /// Store failures; no record is modified in that case.
    pub async fn deactivate_expired(&self, cutoff_ms: i64) -> Result<UpdateReport> {
        let report = self.store.update_many(HOSPITALS, &unpaid_filter(cutoff_ms), &deactivation_update()).await?;
        log::info!(
            target: AUDIT_TARGET,
            "op=deactivate_expired cutoff={cutoff_ms} matched={} modified={}",
            report.matched,
            report.modified
        );
        Ok(report)
    }

    // --- roles ---

    /// # Errors
    /// Store failures.
    pub async fn create_role(&self, input: NewRole) -> Result<Role> {
        let role = Role {
            id: RecordId::new().0,
            name: input.name.trim().to_string(),
            description: input.description,
            permissions: input.permissions,
        };
        self.store.insert(ROLES, bson::serialize_to_document(&role)?).await?;
        log::info!(target: AUDIT_TARGET, "op=create_role id={} name={}", role.id, role.name);
        Ok(role)
    }

    /// # Errors
    /// Store failures.
    pub async fn list_roles(&self) -> Result<Vec<Role>> {
        let docs = self.store.find(ROLES, &Filter::True, &FindOptions::default()).await?;
        docs.into_iter().map(|d| Ok(bson::deserialize_from_document(d)?)).collect()
    }

    // --- auth ---

    /// # Errors
    /// `Unauthorized` for an unknown email or a wrong password.
    pub async fn login(&self, req: LoginRequest) -> Result<LoginOutcome> {
        let email = normalize_email(&req.email);
        let Some(doc) = self.store.find_one(HOSPITALS, &Filter::eq(EMAIL_PATH, email.as_str())).await? else {
            return Err(RegistryError::Unauthorized(INVALID_CREDENTIALS.into()));
        };
        let record = decode_record(doc)?;
        let Some(hash) = record.basic.password.as_deref() else {
            return Err(RegistryError::Unauthorized(INVALID_CREDENTIALS.into()));
        };
        if !verify_password(&req.password, hash)? {
            log::warn!(target: AUDIT_TARGET, "op=login outcome=denied id={}", record.id);
            return Err(RegistryError::Unauthorized(INVALID_CREDENTIALS.into()));
        }
        self.write_status(&record.id, &UpdateDoc::set("sessionStatus", SESSION_ACTIVE)).await?;
        let token = self.tokens.issue(&RecordId::from(record.id.as_str())).await?;
        log::info!(target: AUDIT_TARGET, "op=login outcome=ok id={}", record.id);
        let user = self.get_by_id(&record.id).await?;
        Ok(LoginOutcome { token, user })
    }

    /// The record a bearer token belongs to.
    ///
    /// # Errors
    /// `Unauthorized` for unknown or expired tokens.
    pub async fn authenticate(&self, token: &str) -> Result<RecordId> {
        self.tokens
            .resolve(token)
            .await?
            .ok_or_else(|| RegistryError::Unauthorized("invalid or expired session".into()))
    }

    /// # Errors
    /// `Unauthorized` for unknown or expired tokens.
    pub async fn logout(&self, token: &str) -> Result<()> {
        let subject = self.authenticate(token).await?;
        self.tokens.revoke(token).await?;
        self.write_status(subject.as_str(), &UpdateDoc::set("sessionStatus", SESSION_LOGGED_OUT)).await?;
        log::info!(target: AUDIT_TARGET, "op=logout id={subject}");
        Ok(())
    }

    /// # Errors
    /// `Unauthorized` for a bad token or a wrong current password.
    pub async fn change_password(&self, token: &str, req: ChangePasswordRequest) -> Result<()> {
        let subject = self.authenticate(token).await?;
        let record = decode_record(self.raw_by_id(subject.as_str()).await?)?;
        let current_ok = match record.basic.password.as_deref() {
            Some(hash) => verify_password(&req.old_password, hash)?,
            None => false,
        };
        if !current_ok {
            return Err(RegistryError::Unauthorized("current password is incorrect".into()));
        }
        let mut update = UpdateDoc::set(PASSWORD_PATH, req.new_password);
        update.pre_persist()?;
        self.store.update_one(HOSPITALS, &Filter::eq(ID_FIELD, subject.as_str()), &update).await?;
        log::info!(target: AUDIT_TARGET, "op=change_password id={subject}");
        Ok(())
    }

    /// Issues a verification code for the record using `email`. The code is
    /// returned to the caller; delivering it is left to the deployment.
    ///
    /// # Errors
    /// `NotFound` when no record uses the email.
    pub async fn generate_code(&self, req: CodeRequest) -> Result<IssuedCode> {
        let record = self.get_by_email(&req.email).await?;
        let code = self.tokens.issue_code(&RecordId::from(record.id.as_str())).await?;
        log::info!(target: AUDIT_TARGET, "op=generate_code id={}", record.id);
        Ok(IssuedCode { code, expires_in_secs: self.tokens.code_ttl().as_secs() })
    }

    /// Redeems a code and activates the record: `userStatus` becomes
    /// `Verified` and both active flags are set.
    ///
    /// # Errors
    /// `NotFound` for an unknown email, `Unauthorized` for a wrong or expired code.
    pub async fn verify_code(&self, req: VerifyCodeRequest) -> Result<HospitalRecord> {
        let record = self.get_by_email(&req.email).await?;
        if !self.tokens.redeem_code(&RecordId::from(record.id.as_str()), &req.code).await? {
            return Err(RegistryError::Unauthorized("invalid or expired code".into()));
        }
        let mut activate = UpdateDoc::set("userStatus", STATUS_VERIFIED);
        activate.set.push(("isActive".into(), Bson::Boolean(true)));
        activate.set.push(("basic.isActive".into(), Bson::Boolean(true)));
        self.write_status(&record.id, &activate).await?;
        log::info!(target: AUDIT_TARGET, "op=verify_code id={}", record.id);
        self.get_by_id(&record.id).await
    }

    // --- helpers ---

    async fn raw_by_id(&self, id: &str) -> Result<BsonDocument> {
        self.store
            .find_one(HOSPITALS, &Filter::eq(ID_FIELD, id))
            .await?
            .ok_or_else(|| RegistryError::NotFound(format!("record {id}")))
    }

    async fn write_status(&self, id: &str, update: &UpdateDoc) -> Result<()> {
        let report = self.store.update_one(HOSPITALS, &Filter::eq(ID_FIELD, id), update).await?;
        if report.matched == 0 {
            return Err(RegistryError::NotFound(format!("record {id}")));
        }
        Ok(())
    }

    /// Decodes, resolves role references and strips the password.
    async fn present(&self, doc: BsonDocument) -> Result<HospitalRecord> {
        let mut record = decode_record(doc)?;
        self.populate_roles(&mut record).await?;
        Ok(record.redacted())
    }

    /// Resolves `basic.roles[].roleRef`; a reference with no matching role
    /// stays unresolved.
    async fn populate_roles(&self, record: &mut HospitalRecord) -> Result<()> {
        let refs: Vec<Bson> =
            record.basic.roles.iter().filter_map(|r| r.role_ref.clone()).map(Bson::String).collect();
        if refs.is_empty() {
            return Ok(());
        }
        let filter = Filter::In { path: ID_FIELD.into(), values: refs };
        let roles: HashMap<String, Role> = self
            .store
            .find(ROLES, &filter, &FindOptions::default())
            .await?
            .into_iter()
            .filter_map(|d| bson::deserialize_from_document::<Role>(d).ok())
            .map(|r| (r.id.clone(), r))
            .collect();
        for entry in &mut record.basic.roles {
            entry.resolved = entry.role_ref.as_ref().and_then(|id| roles.get(id).cloned());
        }
        Ok(())
    }
}

fn decode_record(doc: BsonDocument) -> Result<HospitalRecord> {
    Ok(bson::deserialize_from_document(doc)?)
}

/// Flattens a JSON patch into `$set` paths, rejecting protected and unknown fields.
///
/// # Errors
/// `Validation` listing every rejected path, or when nothing is left to set.
pub fn flatten_update(fields: &Map<String, Value>) -> Result<UpdateDoc> {
    let mut update = UpdateDoc::default();
    let mut errors = Vec::new();
    flatten_into("", fields, &mut update, &mut errors);
    if !errors.is_empty() {
        return Err(RegistryError::Validation(errors));
    }
    if update.is_empty() {
        return Err(RegistryError::validation("body", "no updatable fields supplied"));
    }
    Ok(update)
}

fn flatten_into(prefix: &str, fields: &Map<String, Value>, update: &mut UpdateDoc, errors: &mut Vec<FieldError>) {
    for (key, value) in fields {
        let path = if prefix.is_empty() { key.clone() } else { format!("{prefix}.{key}") };
        if key.contains('.') {
            errors.push(FieldError::new(path, "nest fields as objects instead of dotted keys"));
        } else if PROTECTED.contains(&path.as_str()) {
            errors.push(FieldError::new(path, "field cannot be modified"));
        } else if UPDATABLE.contains(&path.as_str()) {
            update.set.push((path, json_to_bson(value)));
        } else if let Value::Object(inner) = value
            && UPDATABLE.iter().any(|u| u.starts_with(&format!("{path}.")))
        {
            flatten_into(&path, inner, update, errors);
        } else {
            errors.push(FieldError::new(path, "unknown field"));
        }
    }
}

/// JSON to BSON keeping every integer as `Int64`, so timestamps written
/// through an update compare numerically with stored ones.
#[must_use]
pub fn json_to_bson(value: &Value) -> Bson {
    match value {
        Value::Null => Bson::Null,
        Value::Bool(b) => Bson::Boolean(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Bson::Int64(i),
            None => Bson::Double(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => Bson::String(s.clone()),
        Value::Array(items) => Bson::Array(items.iter().map(json_to_bson).collect()),
        Value::Object(map) => {
            Bson::Document(map.iter().map(|(k, v)| (k.clone(), json_to_bson(v))).collect::<BsonDocument>())
        }
    }
}
