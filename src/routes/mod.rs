use axum::{
    routing::{get, patch, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, create_security_headers_layer};
use crate::handlers::{admin, checkin, health_check, registration, session};
use crate::state::AppState;

fn checkin_routes() -> Router<AppState> {
    Router::new()
        .route("/booths", get(checkin::list_booths))
        .route("/tickets/:code", get(checkin::find_ticket))
        .route("/tickets/:code/checkin", post(checkin::check_in))
        .route("/search", get(checkin::search))
        .route("/visits", post(checkin::record_visit))
        .route("/scan", post(checkin::scan))
        .route("/feed", get(checkin::feed))
}

fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/attendees", get(admin::list_attendees))
        .route(
            "/attendees/:id",
            patch(admin::update_attendee).delete(admin::delete_attendee),
        )
        .route("/export.csv", get(admin::export_csv))
        .route("/tickets/:id/label", get(admin::ticket_label))
        .route("/tickets/:id/reset", post(admin::reset_ticket))
        .route("/booths", post(admin::create_booth))
        .route("/booths/:id", patch(admin::rename_booth))
}

pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/registrations", post(registration::register))
        .route("/api/session", get(session::current_session))
        .route("/api/session/sign-out", post(session::sign_out))
        .nest("/api/checkin", checkin_routes())
        .nest("/api/admin", admin_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(create_security_headers_layer())
        .layer(create_cors_layer())
}
