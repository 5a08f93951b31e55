//! The axum HTTP surface: thin handlers that translate requests into
//! [`RecordService`] calls and serialize the results.

mod error;
mod extract;
mod handlers;
mod router;

use std::sync::Arc;

use crate::records::RecordService;

pub use error::{ApiError, ErrorBody, ErrorDetail};
pub use extract::{Bearer, Params, Validated};
pub use router::router;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RecordService>,
}

impl AppState {
    #[must_use]
    pub fn new(service: Arc<RecordService>) -> Self {
        Self { service }
    }
}
