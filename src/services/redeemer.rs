use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{info, warn};

use super::code::normalize_code;
use super::guard::{require, CHECKIN_STAFF};
use crate::models::{slugify, CheckinEvent, CheckinOutcome, SearchHit, Session, TicketLookup};
use crate::store::{Backend, BackendError};

pub const DEFAULT_SEARCH_LIMIT: usize = 20;
const FEED_CAPACITY: usize = 256;

/// Failure reported by the camera/decoder on the station. These never
/// touch ticket state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(rename_all = "snake_case")]
pub enum ScanError {
    #[error("Camera permission was denied")]
    PermissionDenied,
    #[error("No camera is available on this device")]
    Unavailable,
    #[error("The camera is in use by another application")]
    DeviceBusy,
    #[error("Could not read a code from the image")]
    DecodeFailed,
}

/// What the scanning capability hands over: either decoded text or the
/// reason it could not produce any.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanOutcome {
    Decoded(String),
    Failed(ScanError),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScanResolution {
    Visit(CheckinEvent),
    Lookup(TicketLookup),
}

#[derive(Debug, Error)]
pub enum RedeemError {
    #[error("No ticket matches code '{0}'")]
    UnknownCode(String),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Lookup, entry check-in and booth attendance for a live event.
pub struct CodeRedeemer {
    backend: Arc<dyn Backend>,
    search_limit: usize,
    feed: broadcast::Sender<CheckinEvent>,
}

impl CodeRedeemer {
    pub fn new(backend: Arc<dyn Backend>, search_limit: usize) -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            backend,
            search_limit,
            feed,
        }
    }

    /// Exact-match resolution of a typed or scanned code.
    pub async fn find_by_code(&self, raw: &str) -> Result<TicketLookup, RedeemError> {
        let code = normalize_code(raw);
        if code.is_empty() {
            return Err(RedeemError::UnknownCode(code));
        }
        let found = self.backend.find_ticket_by_code(&code).await?;
        found.ok_or(RedeemError::UnknownCode(code))
    }

    /// Read-only, case-insensitive, capped. A blank query is not an error.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>, RedeemError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.backend.search_attendees(query, self.search_limit).await?)
    }

    /// Event entry: `issued -> checked_in`, once. Repeats report the
    /// original timestamp with `already_checked_in` set.
    pub async fn check_in(&self, session: &Session, raw: &str) -> Result<CheckinOutcome, RedeemError> {
        require(session, CHECKIN_STAFF)?;
        let lookup = self.find_by_code(raw).await?;
        let outcome = self.backend.record_checkin(lookup.ticket.id).await?;

        if outcome.already_checked_in {
            info!(ticket_id = %outcome.ticket_id, staff = %session.email, "Ticket was already checked in");
        } else {
            info!(ticket_id = %outcome.ticket_id, staff = %session.email, "Checked in");
        }
        Ok(outcome)
    }

    /// Booth attendance. Appends a visit and leaves the ticket status alone.
    pub async fn record_visit(
        &self,
        session: &Session,
        raw: &str,
        booth_slug: &str,
        note: Option<&str>,
    ) -> Result<CheckinEvent, RedeemError> {
        require(session, CHECKIN_STAFF)?;
        let code = normalize_code(raw);
        let booth_slug = slugify(booth_slug);
        let note = note.map(str::trim).filter(|n| !n.is_empty());

        let event = match self.backend.record_booth_visit(&code, &booth_slug, note).await {
            Ok(event) => event,
            Err(BackendError::UnknownCode(code)) => return Err(RedeemError::UnknownCode(code)),
            Err(e) => return Err(e.into()),
        };

        info!(
            attendee_id = %event.attendee_id,
            booth = %event.booth_slug,
            staff = %session.email,
            "Recorded booth visit"
        );
        // Nobody watching the feed is not an error.
        let _ = self.feed.send(event.clone());
        Ok(event)
    }

    /// Treats a decoded scan exactly like typed input: a booth visit when
    /// a booth is selected, a lookup otherwise.
    pub async fn accept_scan(
        &self,
        session: &Session,
        outcome: ScanOutcome,
        booth_slug: Option<&str>,
        note: Option<&str>,
    ) -> Result<ScanResolution, RedeemError> {
        let decoded = match outcome {
            ScanOutcome::Decoded(text) => text,
            ScanOutcome::Failed(err) => {
                warn!(error = %err, staff = %session.email, "Scanner reported a failure");
                return Err(err.into());
            }
        };

        match booth_slug.map(str::trim).filter(|s| !s.is_empty()) {
            Some(slug) => Ok(ScanResolution::Visit(
                self.record_visit(session, &decoded, slug, note).await?,
            )),
            None => {
                require(session, CHECKIN_STAFF)?;
                Ok(ScanResolution::Lookup(self.find_by_code(&decoded).await?))
            }
        }
    }

    pub fn subscribe_feed(&self) -> broadcast::Receiver<CheckinEvent> {
        self.feed.subscribe()
    }
}
