//! Check-in station endpoints: lookup, entry check-in, booth visits and
//! the live visit feed.

use std::convert::Infallible;

use axum::{
    extract::{Path, Query, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        Response,
    },
    Json,
};
use futures::Stream;
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::auth::{CheckinStaff, RoleSet, Staff};
use crate::models::CheckinEvent;
use crate::services::{Access, ScanOutcome};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

pub async fn list_booths(
    _staff: Staff<CheckinStaff>,
    State(state): State<AppState>,
) -> Result<Response, AppError> {
    let booths = state.backend.list_booths().await?;
    Ok(success(booths, "Booths retrieved"))
}

pub async fn find_ticket(
    _staff: Staff<CheckinStaff>,
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Response, AppError> {
    let lookup = state.redeemer.find_by_code(&code).await?;
    Ok(success(lookup, "Ticket found"))
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

pub async fn search(
    _staff: Staff<CheckinStaff>,
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Response, AppError> {
    let hits = state.redeemer.search(&params.q).await?;
    Ok(success(hits, "Search complete"))
}

pub async fn check_in(
    staff: Staff<CheckinStaff>,
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Response, AppError> {
    let outcome = state.redeemer.check_in(&staff.session, &code).await?;
    let message = if outcome.already_checked_in {
        "Already checked in"
    } else {
        "Checked in"
    };
    Ok(success(outcome, message))
}

#[derive(Debug, Deserialize)]
pub struct VisitRequest {
    pub code: String,
    pub booth_slug: String,
    #[serde(default)]
    pub note: Option<String>,
}

pub async fn record_visit(
    staff: Staff<CheckinStaff>,
    State(state): State<AppState>,
    Json(body): Json<VisitRequest>,
) -> Result<Response, AppError> {
    let event = state
        .redeemer
        .record_visit(&staff.session, &body.code, &body.booth_slug, body.note.as_deref())
        .await?;
    Ok(created(event, "Booth visit recorded"))
}

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub outcome: ScanOutcome,
    #[serde(default)]
    pub booth_slug: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

pub async fn scan(
    staff: Staff<CheckinStaff>,
    State(state): State<AppState>,
    Json(body): Json<ScanRequest>,
) -> Result<Response, AppError> {
    let resolution = state
        .redeemer
        .accept_scan(
            &staff.session,
            body.outcome,
            body.booth_slug.as_deref(),
            body.note.as_deref(),
        )
        .await?;
    Ok(success(resolution, "Scan accepted"))
}

enum FeedStep {
    Access(Option<Access>),
    Visit(Result<CheckinEvent, RecvError>),
}

/// Booth visits as server-sent events. The stream lives only as long as
/// the caller's session does: it ends with a `denied` event once the guard
/// withdraws access.
pub async fn feed(
    staff: Staff<CheckinStaff>,
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut access = state.guard.watch(staff.token, CheckinStaff::ROLES);
    let mut visits = state.redeemer.subscribe_feed();
    let user_id = staff.session.user_id;

    let stream = async_stream::stream! {
        loop {
            let step = tokio::select! {
                next = access.changed() => FeedStep::Access(next),
                visit = visits.recv() => FeedStep::Visit(visit),
            };

            match step {
                FeedStep::Access(Some(Access::Granted(_) | Access::Checking)) => continue,
                FeedStep::Access(_) => {
                    debug!(%user_id, "Access withdrawn, closing visit feed");
                    yield Ok(Event::default().event("denied").data("Session ended"));
                    break;
                }
                FeedStep::Visit(Ok(visit)) => match Event::default().event("visit").json_data(&visit) {
                    Ok(event) => {
                        yield Ok(event);
                    }
                    Err(e) => warn!(error = %e, "Failed to encode visit event"),
                },
                FeedStep::Visit(Err(RecvError::Lagged(skipped))) => {
                    warn!(%user_id, skipped, "Visit feed subscriber lagged");
                }
                FeedStep::Visit(Err(RecvError::Closed)) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}
