use axum::{extract::State, response::Response};
use tracing::info;

use crate::auth::{AnySession, Staff};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{empty_success, success};

pub async fn current_session(staff: Staff<AnySession>) -> Response {
    success(staff.session, "Session retrieved")
}

pub async fn sign_out(
    staff: Staff<AnySession>,
    State(state): State<AppState>,
) -> Result<Response, AppError> {
    state.backend.sign_out(&staff.token).await?;
    info!(user_id = %staff.session.user_id, "Signed out");
    Ok(empty_success("Signed out"))
}
