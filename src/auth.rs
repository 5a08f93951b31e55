//! Session tokens and verification codes.
//!
//! [`TokenService`] is the seam the record service authenticates through.
//! [`InMemoryTokens`] keeps only SHA-256 digests of what it hands out, each
//! with an expiry; nothing survives a restart.

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::crypto::sha256_hex;
use crate::errors::Result;
use crate::types::RecordId;

const TOKEN_BYTES: usize = 32;
const CODE_SPACE: u32 = 1_000_000;

#[async_trait]
pub trait TokenService: Send + Sync {
    /// Issues a bearer token for `subject`.
    async fn issue(&self, subject: &RecordId) -> Result<String>;

    /// The subject of a live token, or `None` for unknown or expired tokens.
    async fn resolve(&self, token: &str) -> Result<Option<RecordId>>;

    /// Returns whether the token was live.
    async fn revoke(&self, token: &str) -> Result<bool>;

    /// Issues a 6-digit verification code, replacing any outstanding one.
    async fn issue_code(&self, subject: &RecordId) -> Result<String>;

    /// Consumes the subject's code when it matches and has not expired.
    async fn redeem_code(&self, subject: &RecordId, code: &str) -> Result<bool>;

    fn code_ttl(&self) -> Duration;
}

#[derive(Debug, Clone)]
struct Grant {
    subject: RecordId,
    expires_at: Instant,
}

#[derive(Debug, Clone)]
struct PendingCode {
    digest: String,
    expires_at: Instant,
}

#[derive(Debug)]
pub struct InMemoryTokens {
    session_ttl: Duration,
    code_ttl: Duration,
    sessions: Mutex<HashMap<String, Grant>>,
    codes: Mutex<HashMap<RecordId, PendingCode>>,
}

impl InMemoryTokens {
    #[must_use]
    pub fn new(session_ttl: Duration, code_ttl: Duration) -> Self {
        Self { session_ttl, code_ttl, sessions: Mutex::new(HashMap::new()), codes: Mutex::new(HashMap::new()) }
    }

    /// Drops expired sessions and codes; returns how many entries went away.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|_, g| g.expires_at > now);
        let mut removed = before - sessions.len();
        drop(sessions);
        let mut codes = self.codes.lock();
        let before = codes.len();
        codes.retain(|_, c| c.expires_at > now);
        removed += before - codes.len();
        removed
    }
}

#[async_trait]
impl TokenService for InMemoryTokens {
    async fn issue(&self, subject: &RecordId) -> Result<String> {
        let purged = self.purge_expired();
        if purged > 0 {
            log::debug!("tokens: purged {purged} expired entries");
        }
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::rng().fill(&mut bytes[..]);
        let token = hex::encode(bytes);
        let grant = Grant { subject: subject.clone(), expires_at: Instant::now() + self.session_ttl };
        self.sessions.lock().insert(sha256_hex(&token), grant);
        Ok(token)
    }

    async fn resolve(&self, token: &str) -> Result<Option<RecordId>> {
        let digest = sha256_hex(token);
        let mut sessions = self.sessions.lock();
        match sessions.get(&digest) {
            Some(g) if g.expires_at > Instant::now() => Ok(Some(g.subject.clone())),
            Some(_) => {
                sessions.remove(&digest);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn revoke(&self, token: &str) -> Result<bool> {
        let removed = self.sessions.lock().remove(&sha256_hex(token));
        Ok(removed.is_some_and(|g| g.expires_at > Instant::now()))
    }

    async fn issue_code(&self, subject: &RecordId) -> Result<String> {
        let code = format!("{:06}", rand::rng().random_range(0..CODE_SPACE));
        let pending = PendingCode { digest: sha256_hex(&code), expires_at: Instant::now() + self.code_ttl };
        self.codes.lock().insert(subject.clone(), pending);
        Ok(code)
    }

    async fn redeem_code(&self, subject: &RecordId, code: &str) -> Result<bool> {
        let mut codes = self.codes.lock();
        let valid = codes
            .get(subject)
            .is_some_and(|p| p.expires_at > Instant::now() && p.digest == sha256_hex(code.trim()));
        if valid {
            codes.remove(subject);
        }
        Ok(valid)
    }

    fn code_ttl(&self) -> Duration {
        self.code_ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens() -> InMemoryTokens {
        InMemoryTokens::new(Duration::from_secs(60), Duration::from_secs(60))
    }

    #[tokio::test]
    async fn issue_resolve_revoke() {
        let t = tokens();
        let who = RecordId::from("u1");
        let token = t.issue(&who).await.unwrap();
        assert_eq!(token.len(), TOKEN_BYTES * 2);
        assert_eq!(t.resolve(&token).await.unwrap(), Some(who));
        assert!(t.revoke(&token).await.unwrap());
        assert_eq!(t.resolve(&token).await.unwrap(), None);
        assert!(!t.revoke(&token).await.unwrap());
    }

    #[tokio::test]
    async fn expired_tokens_do_not_resolve() {
        let t = InMemoryTokens::new(Duration::ZERO, Duration::ZERO);
        let who = RecordId::from("u1");
        let token = t.issue(&who).await.unwrap();
        assert_eq!(t.resolve(&token).await.unwrap(), None);
        let code = t.issue_code(&who).await.unwrap();
        assert!(!t.redeem_code(&who, &code).await.unwrap());
        assert_eq!(t.purge_expired(), 1);
    }

    #[tokio::test]
    async fn issuing_sweeps_expired_sessions() {
        let t = InMemoryTokens::new(Duration::ZERO, Duration::from_secs(60));
        for who in ["u1", "u2", "u3"] {
            t.issue(&RecordId::from(who)).await.unwrap();
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        // only the last grant is still held
        assert_eq!(t.purge_expired(), 1);
    }

    #[tokio::test]
    async fn codes_are_six_digits_and_single_use() {
        let t = tokens();
        let who = RecordId::from("u1");
        let code = t.issue_code(&who).await.unwrap();
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
        assert!(!t.redeem_code(&RecordId::from("u2"), &code).await.unwrap());
        assert!(t.redeem_code(&who, &code).await.unwrap());
        assert!(!t.redeem_code(&who, &code).await.unwrap());
    }
}
