use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use super::{token_digest, AuthEvents, Backend, BackendError};
use crate::models::attendee::matches_search;
use crate::models::{
    Attendee, AttendeeQuery, AttendeeRecord, AuthEvent, Booth, CheckinEvent, CheckinOutcome,
    NewAttendee, Registration, Role, SearchHit, Session, SortColumn, SortDirection, Ticket,
    TicketLookup,
};

#[derive(Default)]
struct Tables {
    attendees: HashMap<Uuid, Attendee>,
    tickets: HashMap<Uuid, Ticket>,
    tickets_by_code: HashMap<String, Uuid>,
    booths: HashMap<Uuid, Booth>,
    checkins: Vec<CheckinEvent>,
    sessions: HashMap<String, Session>,
}

impl Tables {
    fn first_ticket(&self, attendee_id: Uuid) -> Option<Ticket> {
        self.tickets
            .values()
            .filter(|t| t.attendee_id == attendee_id)
            .min_by_key(|t| t.created_at)
            .cloned()
    }

    fn lookup(&self, ticket_id: Uuid) -> Option<TicketLookup> {
        let ticket = self.tickets.get(&ticket_id)?;
        let attendee = self.attendees.get(&ticket.attendee_id)?;
        Some(TicketLookup {
            ticket: ticket.clone(),
            attendee: attendee.clone(),
        })
    }
}

/// Process-local backend with the same semantics as the Postgres store.
pub struct MemoryBackend {
    tables: RwLock<Tables>,
    auth_events: AuthEvents,
    session_latency: std::time::Duration,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            auth_events: AuthEvents::new(),
            session_latency: std::time::Duration::ZERO,
        }
    }

    /// Delays every session lookup, like a slow identity provider.
    pub fn with_session_latency(mut self, latency: std::time::Duration) -> Self {
        self.session_latency = latency;
        self
    }

    /// Issues a staff session and returns its bearer token. The identity
    /// provider does this in production.
    pub async fn issue_session(&self, email: &str, role: Role, ttl: Duration) -> String {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(40)
            .map(char::from)
            .collect();
        self.insert_session(&token, email, role, ttl).await;
        token
    }

    /// Registers a caller-chosen token, used for the bootstrap admin token.
    pub async fn insert_session(&self, token: &str, email: &str, role: Role, ttl: Duration) {
        let session = Session {
            user_id: Uuid::new_v4(),
            email: email.to_string(),
            role,
            expires_at: Utc::now() + ttl,
        };
        let user_id = session.user_id;
        self.tables
            .write()
            .await
            .sessions
            .insert(token_digest(token), session);
        self.auth_events.publish(AuthEvent::SignedIn { user_id });
    }

    /// Drops a session without the caller's involvement, as an identity
    /// provider does when an account is disabled.
    pub async fn revoke_session(&self, token: &str) {
        let removed = self.tables.write().await.sessions.remove(&token_digest(token));
        if let Some(session) = removed {
            self.auth_events.publish(AuthEvent::SignedOut {
                user_id: session.user_id,
            });
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn create_attendee_and_ticket(
        &self,
        new: &NewAttendee,
        code: &str,
    ) -> Result<Registration, BackendError> {
        let mut tables = self.tables.write().await;
        if tables.tickets_by_code.contains_key(code) {
            return Err(BackendError::CodeTaken);
        }

        let now = Utc::now();
        let attendee = Attendee {
            id: Uuid::new_v4(),
            first_name: new.first_name.clone(),
            last_name: new.last_name.clone(),
            email: new.email.clone(),
            phone: new.phone.clone(),
            language: new.language,
            opt_info: new.opt_info.clone(),
            created_at: now,
        };
        let ticket = Ticket::issue(attendee.id, code.to_string(), now);

        let registration = Registration {
            attendee_id: attendee.id,
            ticket_id: ticket.id,
            code: ticket.code.clone(),
            first_name: attendee.first_name.clone(),
            last_name: attendee.last_name.clone(),
        };

        tables.tickets_by_code.insert(ticket.code.clone(), ticket.id);
        tables.tickets.insert(ticket.id, ticket);
        tables.attendees.insert(attendee.id, attendee);

        Ok(registration)
    }

    async fn find_ticket_by_code(&self, code: &str) -> Result<Option<TicketLookup>, BackendError> {
        let tables = self.tables.read().await;
        Ok(tables
            .tickets_by_code
            .get(code)
            .and_then(|id| tables.lookup(*id)))
    }

    async fn find_ticket_by_id(
        &self,
        ticket_id: Uuid,
    ) -> Result<Option<TicketLookup>, BackendError> {
        Ok(self.tables.read().await.lookup(ticket_id))
    }

    async fn search_attendees(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>, BackendError> {
        let needle = query.to_lowercase();
        let tables = self.tables.read().await;

        let mut hits: Vec<SearchHit> = tables
            .attendees
            .values()
            .filter(|a| matches_search(a, &needle))
            .map(|a| SearchHit {
                attendee: a.clone(),
                ticket: tables.first_ticket(a.id),
            })
            .collect();

        hits.sort_by(|a, b| {
            (&a.attendee.last_name, &a.attendee.first_name)
                .cmp(&(&b.attendee.last_name, &b.attendee.first_name))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn record_checkin(&self, ticket_id: Uuid) -> Result<CheckinOutcome, BackendError> {
        let mut tables = self.tables.write().await;
        let ticket = tables
            .tickets
            .get_mut(&ticket_id)
            .ok_or_else(|| BackendError::NotFound(format!("Ticket '{ticket_id}' not found")))?;
        Ok(ticket.check_in(Utc::now()))
    }

    async fn reset_ticket(&self, ticket_id: Uuid) -> Result<Ticket, BackendError> {
        let mut tables = self.tables.write().await;
        let ticket = tables
            .tickets
            .get_mut(&ticket_id)
            .ok_or_else(|| BackendError::NotFound(format!("Ticket '{ticket_id}' not found")))?;
        ticket.reset();
        Ok(ticket.clone())
    }

    async fn record_booth_visit(
        &self,
        code: &str,
        booth_slug: &str,
        note: Option<&str>,
    ) -> Result<CheckinEvent, BackendError> {
        let mut tables = self.tables.write().await;

        let attendee_id = tables
            .tickets_by_code
            .get(code)
            .and_then(|id| tables.tickets.get(id))
            .map(|t| t.attendee_id)
            .ok_or_else(|| BackendError::UnknownCode(code.to_string()))?;

        let booth = tables
            .booths
            .values()
            .find(|b| b.slug == booth_slug)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(format!("No booth with slug '{booth_slug}'")))?;

        let event = CheckinEvent {
            id: Uuid::new_v4(),
            attendee_id,
            booth_id: booth.id,
            booth_slug: booth.slug,
            booth_name: booth.name,
            note: note.map(str::to_string),
            created_at: Utc::now(),
        };
        tables.checkins.push(event.clone());
        Ok(event)
    }

    async fn list_booths(&self) -> Result<Vec<Booth>, BackendError> {
        let mut booths: Vec<Booth> = self.tables.read().await.booths.values().cloned().collect();
        booths.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(booths)
    }

    async fn create_booth(&self, name: &str, slug: &str) -> Result<Booth, BackendError> {
        let mut tables = self.tables.write().await;
        if tables.booths.values().any(|b| b.slug == slug) {
            return Err(BackendError::Conflict(format!(
                "A booth with slug '{slug}' already exists"
            )));
        }
        let booth = Booth {
            id: Uuid::new_v4(),
            slug: slug.to_string(),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        tables.booths.insert(booth.id, booth.clone());
        Ok(booth)
    }

    async fn rename_booth(&self, booth_id: Uuid, name: &str) -> Result<Booth, BackendError> {
        let mut tables = self.tables.write().await;
        let booth = tables
            .booths
            .get_mut(&booth_id)
            .ok_or_else(|| BackendError::NotFound(format!("Booth '{booth_id}' not found")))?;
        booth.name = name.to_string();
        let renamed = booth.clone();
        // Visits carry a denormalised booth name, like the v_checkins view.
        for event in tables.checkins.iter_mut().filter(|c| c.booth_id == booth_id) {
            event.booth_name = renamed.name.clone();
        }
        Ok(renamed)
    }

    async fn list_attendees(
        &self,
        query: &AttendeeQuery,
    ) -> Result<Vec<AttendeeRecord>, BackendError> {
        let tables = self.tables.read().await;
        let needle = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        let mut attendees: Vec<&Attendee> = tables
            .attendees
            .values()
            .filter(|a| needle.as_deref().map_or(true, |n| matches_search(a, n)))
            .collect();

        attendees.sort_by(|a, b| {
            let ordering = match query.sort {
                SortColumn::CreatedAt => a.created_at.cmp(&b.created_at),
                SortColumn::LastName => a.last_name.cmp(&b.last_name),
            };
            match query.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });

        Ok(attendees
            .into_iter()
            .take(query.limit)
            .map(|a| {
                let mut visits: Vec<CheckinEvent> = tables
                    .checkins
                    .iter()
                    .filter(|c| c.attendee_id == a.id)
                    .cloned()
                    .collect();
                visits.sort_by_key(|c| c.created_at);
                AttendeeRecord {
                    attendee: a.clone(),
                    ticket: tables.first_ticket(a.id),
                    visits,
                }
            })
            .collect())
    }

    async fn update_attendee(
        &self,
        attendee_id: Uuid,
        fields: &NewAttendee,
    ) -> Result<Attendee, BackendError> {
        let mut tables = self.tables.write().await;
        let attendee = tables
            .attendees
            .get_mut(&attendee_id)
            .ok_or_else(|| BackendError::NotFound(format!("Attendee '{attendee_id}' not found")))?;
        attendee.first_name = fields.first_name.clone();
        attendee.last_name = fields.last_name.clone();
        attendee.email = fields.email.clone();
        attendee.phone = fields.phone.clone();
        attendee.language = fields.language;
        attendee.opt_info = fields.opt_info.clone();
        Ok(attendee.clone())
    }

    async fn delete_attendee(&self, attendee_id: Uuid) -> Result<(), BackendError> {
        let mut tables = self.tables.write().await;
        if tables.attendees.remove(&attendee_id).is_none() {
            return Err(BackendError::NotFound(format!(
                "Attendee '{attendee_id}' not found"
            )));
        }
        let removed: Vec<Ticket> = tables
            .tickets
            .values()
            .filter(|t| t.attendee_id == attendee_id)
            .cloned()
            .collect();
        for ticket in removed {
            tables.tickets_by_code.remove(&ticket.code);
            tables.tickets.remove(&ticket.id);
        }
        tables.checkins.retain(|c| c.attendee_id != attendee_id);
        Ok(())
    }

    async fn get_session(&self, token: &str) -> Result<Option<Session>, BackendError> {
        if !self.session_latency.is_zero() {
            tokio::time::sleep(self.session_latency).await;
        }
        let tables = self.tables.read().await;
        Ok(tables
            .sessions
            .get(&token_digest(token))
            .filter(|s| s.expires_at > Utc::now())
            .cloned())
    }

    async fn sign_out(&self, token: &str) -> Result<(), BackendError> {
        self.revoke_session(token).await;
        Ok(())
    }

    fn subscribe_auth(&self) -> broadcast::Receiver<AuthEvent> {
        self.auth_events.subscribe()
    }
}
