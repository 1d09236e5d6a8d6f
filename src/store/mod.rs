//! Persistence and identity backend.
//!
//! Every read and write the services perform goes through [`Backend`].
//! `PgBackend` is the production store; `MemoryBackend` backs tests and
//! local runs without a database.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::{
    Attendee, AttendeeQuery, AttendeeRecord, AuthEvent, Booth, CheckinEvent, CheckinOutcome,
    NewAttendee, Registration, SearchHit, Session, Ticket, TicketLookup,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryBackend;
pub use postgres::PgBackend;

const AUTH_EVENT_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{0}")]
    NotFound(String),

    #[error("No ticket with code '{0}'")]
    UnknownCode(String),

    #[error("{0}")]
    Conflict(String),

    /// The minted code collided with an existing ticket. Nothing was written.
    #[error("ticket code already in use")]
    CodeTaken,

    #[error("{0}")]
    PermissionDenied(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("malformed row: {0}")]
    Decode(String),

    #[error("database error")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Writes one attendee and one ticket carrying `code`, atomically.
    /// Returns [`BackendError::CodeTaken`] on a code collision.
    async fn create_attendee_and_ticket(
        &self,
        attendee: &NewAttendee,
        code: &str,
    ) -> Result<Registration, BackendError>;

    async fn find_ticket_by_code(&self, code: &str) -> Result<Option<TicketLookup>, BackendError>;

    async fn find_ticket_by_id(&self, ticket_id: Uuid)
        -> Result<Option<TicketLookup>, BackendError>;

    async fn search_attendees(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>, BackendError>;

    /// Moves the ticket to `checked_in`; repeated calls report
    /// `already_checked_in` and keep the first timestamp.
    async fn record_checkin(&self, ticket_id: Uuid) -> Result<CheckinOutcome, BackendError>;

    async fn reset_ticket(&self, ticket_id: Uuid) -> Result<Ticket, BackendError>;

    async fn record_booth_visit(
        &self,
        code: &str,
        booth_slug: &str,
        note: Option<&str>,
    ) -> Result<CheckinEvent, BackendError>;

    async fn list_booths(&self) -> Result<Vec<Booth>, BackendError>;

    async fn create_booth(&self, name: &str, slug: &str) -> Result<Booth, BackendError>;

    async fn rename_booth(&self, booth_id: Uuid, name: &str) -> Result<Booth, BackendError>;

    async fn list_attendees(
        &self,
        query: &AttendeeQuery,
    ) -> Result<Vec<AttendeeRecord>, BackendError>;

    async fn update_attendee(
        &self,
        attendee_id: Uuid,
        fields: &NewAttendee,
    ) -> Result<Attendee, BackendError>;

    async fn delete_attendee(&self, attendee_id: Uuid) -> Result<(), BackendError>;

    /// Resolves a bearer token to a live, unexpired session.
    async fn get_session(&self, token: &str) -> Result<Option<Session>, BackendError>;

    async fn sign_out(&self, token: &str) -> Result<(), BackendError>;

    fn subscribe_auth(&self) -> broadcast::Receiver<AuthEvent>;
}

/// Fan-out of authentication state changes to every open guard watch.
#[derive(Debug, Clone)]
pub struct AuthEvents {
    sender: broadcast::Sender<AuthEvent>,
}

impl AuthEvents {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(AUTH_EVENT_CAPACITY);
        Self { sender }
    }

    pub fn publish(&self, event: AuthEvent) {
        tracing::debug!(?event, "auth state changed");
        // No receivers is fine: nobody is watching right now.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.sender.subscribe()
    }
}

impl Default for AuthEvents {
    fn default() -> Self {
        Self::new()
    }
}

/// Session tokens are stored hashed; this is the lookup key.
pub fn token_digest(token: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(token.as_bytes()))
}

/// Escapes `%`, `_` and `\` for use inside an `ILIKE` pattern.
pub(crate) fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for ch in needle.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}
