use axum::Router;
use axum::routing::{get, post, put};

use super::AppState;
use super::handlers;

/// Builds the HTTP router.
///
/// NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7); static
/// segments such as `/hospitals/stats` win over `/hospitals/:id`.
pub fn router(state: AppState) -> Router {
    let hospitals = Router::new()
        .route("/", get(handlers::list))
        .route("/save", post(handlers::save))
        .route("/getAll", get(handlers::get_all))
        .route("/email-available", get(handlers::email_available))
        .route("/stats", get(handlers::stats))
        .route("/reports/unpaid", get(handlers::unpaid))
        .route("/deactivate-expired", post(handlers::deactivate_expired))
        .route("/update/:id", put(handlers::update))
        .route("/by-email/:email", get(handlers::get_by_email))
        .route("/:id", get(handlers::get_by_id));

    Router::new()
        .nest("/hospitals", hospitals)
        .route("/roles", post(handlers::create_role).get(handlers::list_roles))
        .route("/login", post(handlers::login))
        .route("/logout", get(handlers::logout))
        .route("/changePassword", put(handlers::change_password))
        .route("/generateCode", post(handlers::generate_code))
        .route("/verifyCode", post(handlers::verify_code))
        .with_state(state)
}
