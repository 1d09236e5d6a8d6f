use axum::{extract::State, response::Response, Json};

use crate::services::RegistrationForm;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::created;

/// Public self-registration. Responds with the code to show and print.
pub async fn register(
    State(state): State<AppState>,
    Json(form): Json<RegistrationForm>,
) -> Result<Response, AppError> {
    let registration = state.issuer.register(form).await?;
    Ok(created(registration, "Registration complete"))
}
