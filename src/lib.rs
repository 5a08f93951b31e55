//! Hospital/user record registry.
//!
//! An in-memory document [`engine`] with unique indexes and an aggregation
//! [`pipeline`], a [`records`] service carrying the account lifecycle, and an
//! axum [`api`] on top.

pub mod api;
pub mod auth;
pub mod collection;
pub mod config;
pub mod crypto;
pub mod document;
pub mod engine;
pub mod errors;
pub mod logger;
pub mod pipeline;
pub mod query;
pub mod records;
pub mod store;
pub mod types;
pub mod validation;

use std::sync::Arc;

use crate::api::AppState;
use crate::auth::InMemoryTokens;
use crate::config::AppConfig;
use crate::engine::Engine;
use crate::query::UpdateReport;
use crate::records::RecordService;

pub use crate::errors::{RegistryError, Result};

/// The wired-up application: one engine, one token store and the service
/// that binds them.
#[derive(Clone)]
pub struct Registry {
    pub engine: Arc<Engine>,
    pub tokens: Arc<InMemoryTokens>,
    pub service: Arc<RecordService>,
}

impl Registry {
    #[must_use]
    pub fn new(config: &AppConfig) -> Self {
        Self::with_engine(Arc::new(Engine::new()), config)
    }

    #[must_use]
    pub fn with_engine(engine: Arc<Engine>, config: &AppConfig) -> Self {
        let tokens = Arc::new(InMemoryTokens::new(config.session_ttl(), config.code_ttl()));
        let service = Arc::new(RecordService::new(
            engine.clone(),
            tokens.clone(),
            config.service_settings(),
        ));
        Self { engine, tokens, service }
    }

    #[must_use]
    pub fn router(&self) -> axum::Router {
        api::router(AppState::new(self.service.clone()))
    }

    /// One maintenance pass: deactivate records whose plan expired before
    /// `cutoff_ms` and drop expired sessions and codes.
    ///
    /// # Errors
    /// Propagates store failures from the deactivation update.
    pub async fn sweep(&self, cutoff_ms: i64) -> Result<UpdateReport> {
        let report = self.service.deactivate_expired(cutoff_ms).await?;
        let purged = self.tokens.purge_expired();
        log::info!(
            "sweep: cutoff={} matched={} modified={} tokens_purged={}",
            cutoff_ms,
            report.matched,
            report.modified,
            purged
        );
        Ok(report)
    }
}
