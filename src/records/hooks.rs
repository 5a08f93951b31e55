//! The pre-persist step every record write passes through.
//!
//! It normalizes `basic.email` (trimmed, lower-cased) and replaces a
//! plaintext `basic.password` with its Argon2 hash. A value that is already a
//! PHC hash is left alone, so re-saving a loaded record never double-hashes,
//! and a write that does not carry the password never touches the stored one.

use bson::{Bson, Document as BsonDocument};

use super::model::PASSWORD_PATH;
use crate::crypto::{hash_password, is_password_hash};
use crate::errors::Result;
use crate::query::{EMAIL_PATH, UpdateDoc};

pub trait PrePersist {
    /// # Errors
    /// `Hash` when password hashing fails.
    fn pre_persist(&mut self) -> Result<()>;
}

#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn hash_if_plain(value: &str) -> Result<String> {
    if is_password_hash(value) { Ok(value.to_string()) } else { hash_password(value) }
}

impl PrePersist for BsonDocument {
    fn pre_persist(&mut self) -> Result<()> {
        let Ok(basic) = self.get_document_mut("basic") else {
            return Ok(());
        };
        if let Some(Bson::String(email)) = basic.get("email") {
            let normalized = normalize_email(email);
            basic.insert("email", normalized);
        }
        if let Some(Bson::String(password)) = basic.get("password") {
            let hashed = hash_if_plain(password)?;
            basic.insert("password", hashed);
        }
        Ok(())
    }
}

impl PrePersist for UpdateDoc {
    fn pre_persist(&mut self) -> Result<()> {
        for (path, value) in &mut self.set {
            match (path.as_str(), &*value) {
                (EMAIL_PATH, Bson::String(email)) => *value = Bson::String(normalize_email(email)),
                (PASSWORD_PATH, Bson::String(password)) => *value = Bson::String(hash_if_plain(password)?),
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::verify_password;
    use bson::doc;

    #[test]
    fn document_hook_hashes_and_normalizes() {
        let mut d = doc! {"basic": {"email": "  Ann@X.com ", "password": "pw"}};
        d.pre_persist().unwrap();
        let basic = d.get_document("basic").unwrap();
        assert_eq!(basic.get_str("email").unwrap(), "ann@x.com");
        let hash = basic.get_str("password").unwrap();
        assert!(verify_password("pw", hash).unwrap());
    }

    #[test]
    fn existing_hash_is_not_rehashed() {
        let hash = hash_password("pw").unwrap();
        let mut d = doc! {"basic": {"email": "a@x.com", "password": hash.clone()}};
        d.pre_persist().unwrap();
        assert_eq!(d.get_document("basic").unwrap().get_str("password").unwrap(), hash);
    }

    #[test]
    fn update_hook_only_touches_carried_fields() {
        let mut u = UpdateDoc::set("basic.state", "CA");
        u.pre_persist().unwrap();
        assert_eq!(u.set, vec![("basic.state".to_string(), Bson::from("CA"))]);

        let mut u = UpdateDoc { set: vec![(PASSWORD_PATH.into(), "new".into())], unset: vec![] };
        u.pre_persist().unwrap();
        let Bson::String(h) = &u.set[0].1 else { panic!("password must stay a string") };
        assert!(is_password_hash(h));
    }
}
