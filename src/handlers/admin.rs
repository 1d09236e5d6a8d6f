//! Administrator endpoints: attendee management, export, labels, booths.

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::auth::{AdminOnly, Staff};
use crate::models::{slugify, AttendeeQuery, SortColumn, SortDirection};
use crate::services::export::{export_attendees, EXPORT_FILENAME};
use crate::services::label::render_label;
use crate::services::validation::validate_booth_name;
use crate::services::{RegistrationForm, ValidationErrors};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, empty_success, success};

/// Labels carry inline styles and an inline SVG; nothing else is allowed.
const LABEL_CSP: &str = "default-src 'none'; style-src 'unsafe-inline'; frame-ancestors 'none'";

#[derive(Debug, Default, Deserialize)]
pub struct AttendeeListParams {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub sort: SortColumn,
    #[serde(default)]
    pub dir: SortDirection,
}

pub async fn list_attendees(
    _staff: Staff<AdminOnly>,
    State(state): State<AppState>,
    Query(params): Query<AttendeeListParams>,
) -> Result<Response, AppError> {
    let query = AttendeeQuery {
        search: params.q,
        sort: params.sort,
        direction: params.dir,
        limit: state.config.admin_page_limit,
    };
    let records = state.backend.list_attendees(&query).await?;
    Ok(success(records, "Attendees retrieved"))
}

pub async fn update_attendee(
    staff: Staff<AdminOnly>,
    State(state): State<AppState>,
    Path(attendee_id): Path<Uuid>,
    Json(form): Json<RegistrationForm>,
) -> Result<Response, AppError> {
    let fields = form.validate()?;
    let attendee = state.backend.update_attendee(attendee_id, &fields).await?;
    info!(%attendee_id, admin = %staff.session.email, "Attendee updated");
    Ok(success(attendee, "Attendee updated"))
}

pub async fn delete_attendee(
    staff: Staff<AdminOnly>,
    State(state): State<AppState>,
    Path(attendee_id): Path<Uuid>,
) -> Result<Response, AppError> {
    state.backend.delete_attendee(attendee_id).await?;
    info!(%attendee_id, admin = %staff.session.email, "Attendee deleted");
    Ok(empty_success("Attendee deleted"))
}

pub async fn export_csv(
    staff: Staff<AdminOnly>,
    State(state): State<AppState>,
) -> Result<Response, AppError> {
    let query = AttendeeQuery {
        limit: i64::MAX as usize,
        ..AttendeeQuery::default()
    };
    let records = state.backend.list_attendees(&query).await?;
    info!(rows = records.len(), admin = %staff.session.email, "Exporting attendees");

    let csv = export_attendees(&records);
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{EXPORT_FILENAME}\""),
            ),
        ],
        csv,
    )
        .into_response())
}

pub async fn ticket_label(
    _staff: Staff<AdminOnly>,
    State(state): State<AppState>,
    Path(ticket_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let lookup = state
        .backend
        .find_ticket_by_id(ticket_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Ticket '{ticket_id}' not found")))?;
    let html = render_label(&lookup).map_err(|e| AppError::InternalServerError(e.to_string()))?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8"),
            (header::CONTENT_SECURITY_POLICY, LABEL_CSP),
        ],
        html,
    )
        .into_response())
}

/// The one backward transition: `checked_in -> issued`.
pub async fn reset_ticket(
    staff: Staff<AdminOnly>,
    State(state): State<AppState>,
    Path(ticket_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let ticket = state.backend.reset_ticket(ticket_id).await?;
    info!(%ticket_id, admin = %staff.session.email, "Ticket reset to issued");
    Ok(success(ticket, "Ticket reset"))
}

#[derive(Debug, Deserialize)]
pub struct NewBoothRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
}

pub async fn create_booth(
    staff: Staff<AdminOnly>,
    State(state): State<AppState>,
    Json(body): Json<NewBoothRequest>,
) -> Result<Response, AppError> {
    let name = validate_booth_name(&body.name)?;
    let slug = match body.slug.as_deref().map(str::trim) {
        Some(slug) if !slug.is_empty() => slugify(slug),
        _ => slugify(&name),
    };
    if slug.is_empty() {
        return Err(ValidationErrors::single("slug", "Slug must contain a letter or number").into());
    }

    let booth = state.backend.create_booth(&name, &slug).await?;
    info!(slug = %booth.slug, admin = %staff.session.email, "Booth created");
    Ok(created(booth, "Booth created"))
}

#[derive(Debug, Deserialize)]
pub struct RenameBoothRequest {
    #[serde(default)]
    pub name: String,
}

pub async fn rename_booth(
    staff: Staff<AdminOnly>,
    State(state): State<AppState>,
    Path(booth_id): Path<Uuid>,
    Json(body): Json<RenameBoothRequest>,
) -> Result<Response, AppError> {
    let name = validate_booth_name(&body.name)?;
    let booth = state.backend.rename_booth(booth_id, &name).await?;
    info!(%booth_id, admin = %staff.session.email, "Booth renamed");
    Ok(success(booth, "Booth renamed"))
}
