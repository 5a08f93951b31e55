//! Request validation that runs before any handler body.
//!
//! A [`Gate`] holds a list of [`Rule`]s, runs all of them against the JSON
//! body and reports every failure at once. [`Schema`] ties a gate to the
//! payload type the handler receives once the gate has passed.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::{FieldError, RegistryError, Result};
use crate::records::{ChangePasswordRequest, CodeRequest, LoginRequest, NewHospital, NewRole, VerifyCodeRequest};

/// Looks up a dotted path (`basic.email`) in a JSON value.
#[must_use]
pub fn lookup<'a>(body: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(body, |cur, seg| cur.get(seg))
}

fn present(v: Option<&Value>) -> Option<&Value> {
    v.filter(|v| !v.is_null())
}

pub trait Rule: Send + Sync {
    fn check(&self, body: &Value, errors: &mut Vec<FieldError>);
}

/// The field must be present, non-null and, for strings, non-blank.
pub struct Required(pub &'static str);

impl Rule for Required {
    fn check(&self, body: &Value, errors: &mut Vec<FieldError>) {
        let ok = match present(lookup(body, self.0)) {
            Some(Value::String(s)) => !s.trim().is_empty(),
            Some(_) => true,
            None => false,
        };
        if !ok {
            errors.push(FieldError::new(self.0, format!("{} is required", self.0)));
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    String,
    Number,
    Bool,
    Array,
    Object,
    Email,
    /// Exactly six ASCII digits.
    Code,
}

impl Kind {
    fn accepts(self, v: &Value) -> bool {
        match self {
            Self::String => v.is_string(),
            Self::Number => v.is_i64() || v.is_u64(),
            Self::Bool => v.is_boolean(),
            Self::Array => v.is_array(),
            Self::Object => v.is_object(),
            Self::Email => v.as_str().is_some_and(looks_like_email),
            Self::Code => v.as_str().is_some_and(|s| s.len() == 6 && s.bytes().all(|b| b.is_ascii_digit())),
        }
    }

    const fn describe(self) -> &'static str {
        match self {
            Self::String => "a string",
            Self::Number => "an integer",
            Self::Bool => "a boolean",
            Self::Array => "an array",
            Self::Object => "an object",
            Self::Email => "a valid email address",
            Self::Code => "a 6-digit code",
        }
    }
}

fn looks_like_email(s: &str) -> bool {
    let s = s.trim();
    let Some((local, domain)) = s.split_once('@') else { return false };
    !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !s.chars().any(char::is_whitespace)
        && !domain.contains('@')
}

/// When the field is present (and non-null) it must have the given shape.
pub struct Shape(pub &'static str, pub Kind);

impl Rule for Shape {
    fn check(&self, body: &Value, errors: &mut Vec<FieldError>) {
        if let Some(v) = present(lookup(body, self.0))
            && !self.1.accepts(v)
        {
            errors.push(FieldError::new(self.0, format!("{} must be {}", self.0, self.1.describe())));
        }
    }
}

/// Two fields must be equal when both are present.
pub struct FieldsMatch(pub &'static str, pub &'static str);

impl Rule for FieldsMatch {
    fn check(&self, body: &Value, errors: &mut Vec<FieldError>) {
        if let (Some(a), Some(b)) = (present(lookup(body, self.0)), present(lookup(body, self.1)))
            && a != b
        {
            errors.push(FieldError::new(self.1, format!("{} must match {}", self.1, self.0)));
        }
    }
}

/// Two fields must differ when both are present.
pub struct FieldsDiffer(pub &'static str, pub &'static str);

impl Rule for FieldsDiffer {
    fn check(&self, body: &Value, errors: &mut Vec<FieldError>) {
        if let (Some(a), Some(b)) = (present(lookup(body, self.0)), present(lookup(body, self.1)))
            && a == b
        {
            errors.push(FieldError::new(self.1, format!("{} must differ from {}", self.1, self.0)));
        }
    }
}

/// Exactly one of the listed selectors must be supplied.
pub struct OneOf(pub &'static [&'static str]);

impl Rule for OneOf {
    fn check(&self, body: &Value, errors: &mut Vec<FieldError>) {
        let supplied = self
            .0
            .iter()
            .filter(|f| match present(lookup(body, f)) {
                Some(Value::String(s)) => !s.trim().is_empty(),
                Some(_) => true,
                None => false,
            })
            .count();
        if supplied != 1 {
            errors.push(FieldError::new(self.0.join("|"), format!("exactly one of {} is required", self.0.join(", "))));
        }
    }
}

/// Rejects field names the body may not carry at all.
pub struct Forbidden(pub &'static [&'static str]);

impl Rule for Forbidden {
    fn check(&self, body: &Value, errors: &mut Vec<FieldError>) {
        for f in self.0 {
            if lookup(body, f).is_some() {
                errors.push(FieldError::new(*f, format!("{f} cannot be modified")));
            }
        }
    }
}

struct IsObject;

impl Rule for IsObject {
    fn check(&self, body: &Value, errors: &mut Vec<FieldError>) {
        match body.as_object() {
            Some(map) if !map.is_empty() => {}
            Some(_) => errors.push(FieldError::new("body", "body must not be empty")),
            None => errors.push(FieldError::new("body", "body must be a JSON object")),
        }
    }
}

#[derive(Default)]
pub struct Gate {
    rules: Vec<Box<dyn Rule>>,
}

impl Gate {
    #[must_use]
    pub fn new() -> Self {
        Self::default().rule(IsObject)
    }

    #[must_use]
    pub fn rule(mut self, rule: impl Rule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    /// # Errors
    /// `Validation` listing every failed rule; nothing is reported on success.
    pub fn check(&self, body: &Value) -> Result<()> {
        let mut errors = Vec::new();
        for rule in &self.rules {
            rule.check(body, &mut errors);
        }
        if errors.is_empty() { Ok(()) } else { Err(RegistryError::Validation(errors)) }
    }
}

/// A request body contract: the gate to pass and the type it then decodes to.
pub trait Schema: Send + Sync + 'static {
    type Output: DeserializeOwned + Send;

    fn gate() -> Gate;

    /// Runs the gate, then decodes. Decoding failures the gate did not catch
    /// are reported as validation errors too.
    ///
    /// # Errors
    /// `Validation` on any failure.
    fn validate(body: Value) -> Result<Self::Output> {
        Self::gate().check(&body)?;
        serde_json::from_value(body).map_err(|e| RegistryError::validation("body", e.to_string()))
    }
}

const PROTECTED: &[&str] = &["_id", "createdAt", "updatedAt"];

fn profile_shapes(gate: Gate) -> Gate {
    gate.rule(Shape("basic", Kind::Object))
        .rule(Shape("basic.firstName", Kind::String))
        .rule(Shape("basic.lastName", Kind::String))
        .rule(Shape("basic.email", Kind::Email))
        .rule(Shape("basic.password", Kind::String))
        .rule(Shape("basic.birthDate", Kind::Number))
        .rule(Shape("basic.isActive", Kind::Bool))
        .rule(Shape("basic.profileImageURL", Kind::String))
        .rule(Shape("basic.roles", Kind::Array))
        .rule(Shape("basic.mobileNumber", Kind::String))
        .rule(Shape("basic.zipCode", Kind::String))
        .rule(Shape("basic.state", Kind::String))
        .rule(Shape("isActive", Kind::Bool))
        .rule(Shape("isPaidMember", Kind::Bool))
        .rule(Shape("planId", Kind::String))
        .rule(Shape("planExpiry", Kind::Number))
        .rule(Shape("programName", Kind::String))
        .rule(Shape("positionImages", Kind::Array))
        .rule(Shape("agentId", Kind::String))
        .rule(Shape("brokerId", Kind::String))
}

pub struct CreateHospital;

impl Schema for CreateHospital {
    type Output = NewHospital;

    fn gate() -> Gate {
        profile_shapes(Gate::new())
            .rule(Required("basic.firstName"))
            .rule(Required("basic.lastName"))
            .rule(Required("basic.email"))
            .rule(Required("basic.zipCode"))
    }
}

pub struct UpdateHospital;

impl Schema for UpdateHospital {
    type Output = serde_json::Map<String, Value>;

    fn gate() -> Gate {
        profile_shapes(Gate::new()).rule(Forbidden(PROTECTED))
    }
}

pub struct CreateRole;

impl Schema for CreateRole {
    type Output = NewRole;

    fn gate() -> Gate {
        Gate::new()
            .rule(Required("name"))
            .rule(Shape("name", Kind::String))
            .rule(Shape("description", Kind::String))
            .rule(Shape("permissions", Kind::Array))
    }
}

pub struct Login;

impl Schema for Login {
    type Output = LoginRequest;

    fn gate() -> Gate {
        Gate::new().rule(Required("email")).rule(Shape("email", Kind::Email)).rule(Required("password"))
    }
}

pub struct ChangePassword;

impl Schema for ChangePassword {
    type Output = ChangePasswordRequest;

    fn gate() -> Gate {
        Gate::new()
            .rule(Required("oldPassword"))
            .rule(Required("newPassword"))
            .rule(Shape("newPassword", Kind::String))
            .rule(FieldsMatch("newPassword", "confirmPassword"))
            .rule(FieldsDiffer("oldPassword", "newPassword"))
    }
}

pub struct GenerateCode;

impl Schema for GenerateCode {
    type Output = CodeRequest;

    fn gate() -> Gate {
        Gate::new().rule(Required("email")).rule(Shape("email", Kind::Email))
    }
}

pub struct VerifyCode;

impl Schema for VerifyCode {
    type Output = VerifyCodeRequest;

    fn gate() -> Gate {
        Gate::new()
            .rule(Required("email"))
            .rule(Shape("email", Kind::Email))
            .rule(Required("code"))
            .rule(Shape("code", Kind::Code))
    }
}
