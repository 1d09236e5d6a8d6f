use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::postgres::{PgListener, PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::FromRow;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::{like_pattern, token_digest, AuthEvents, Backend, BackendError};
use crate::models::{
    Attendee, AttendeeQuery, AttendeeRecord, AuthEvent, Booth, CheckinEvent, CheckinOutcome,
    NewAttendee, Registration, Role, SearchHit, Session, SortColumn, SortDirection,
    SurveyAnswers, Ticket, TicketLookup, TicketStatus,
};

const TICKET_CODE_CONSTRAINT: &str = "tickets_code_key";
const BOOTH_SLUG_CONSTRAINT: &str = "booths_slug_key";
const AUTH_CHANNEL: &str = "auth_state";
const LISTENER_BACKOFF: Duration = Duration::from_secs(1);

/// Attendee columns joined with the attendee's first ticket. Ticket
/// columns are null when the attendee has none.
const ATTENDEE_WITH_TICKET: &str = r#"
    SELECT a.id, a.first_name, a.last_name, a.email, a.phone, a.language,
           a.opt_info, a.created_at,
           t.id AS ticket_id, t.code AS ticket_code, t.status AS ticket_status,
           t.checked_in_at AS ticket_checked_in_at, t.created_at AS ticket_created_at
    FROM attendees a
    LEFT JOIN LATERAL (
        SELECT * FROM tickets WHERE tickets.attendee_id = a.id
        ORDER BY tickets.created_at LIMIT 1
    ) t ON true
"#;

const TICKET_WITH_ATTENDEE: &str = r#"
    SELECT a.id, a.first_name, a.last_name, a.email, a.phone, a.language,
           a.opt_info, a.created_at,
           t.id AS ticket_id, t.code AS ticket_code, t.status AS ticket_status,
           t.checked_in_at AS ticket_checked_in_at, t.created_at AS ticket_created_at
    FROM tickets t
    JOIN attendees a ON a.id = t.attendee_id
"#;

#[derive(Debug, FromRow)]
struct AttendeeRow {
    id: Uuid,
    first_name: String,
    last_name: String,
    email: String,
    phone: String,
    language: String,
    opt_info: Option<Json<SurveyAnswers>>,
    created_at: DateTime<Utc>,
    ticket_id: Option<Uuid>,
    ticket_code: Option<String>,
    ticket_status: Option<String>,
    ticket_checked_in_at: Option<DateTime<Utc>>,
    ticket_created_at: Option<DateTime<Utc>>,
}

impl AttendeeRow {
    fn split(self) -> Result<(Attendee, Option<Ticket>), BackendError> {
        let ticket = match (self.ticket_id, self.ticket_code, self.ticket_status, self.ticket_created_at) {
            (Some(id), Some(code), Some(status), Some(created_at)) => Some(Ticket {
                id,
                attendee_id: self.id,
                code,
                status: status.parse::<TicketStatus>().map_err(BackendError::Decode)?,
                checked_in_at: self.ticket_checked_in_at,
                created_at,
            }),
            _ => None,
        };

        let attendee = Attendee {
            id: self.id,
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            phone: self.phone,
            language: self.language.parse().map_err(BackendError::Decode)?,
            opt_info: self.opt_info.map(|Json(answers)| answers),
            created_at: self.created_at,
        };

        Ok((attendee, ticket))
    }

    fn into_lookup(self) -> Result<TicketLookup, BackendError> {
        let (attendee, ticket) = self.split()?;
        let ticket = ticket.ok_or_else(|| BackendError::Decode("ticket columns missing".into()))?;
        Ok(TicketLookup { ticket, attendee })
    }
}

#[derive(Debug, FromRow)]
struct TicketRow {
    id: Uuid,
    attendee_id: Uuid,
    code: String,
    status: String,
    checked_in_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<TicketRow> for Ticket {
    type Error = BackendError;

    fn try_from(row: TicketRow) -> Result<Self, Self::Error> {
        Ok(Ticket {
            id: row.id,
            attendee_id: row.attendee_id,
            code: row.code,
            status: row.status.parse().map_err(BackendError::Decode)?,
            checked_in_at: row.checked_in_at,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct BoothRow {
    id: Uuid,
    slug: String,
    name: String,
    created_at: DateTime<Utc>,
}

impl From<BoothRow> for Booth {
    fn from(row: BoothRow) -> Self {
        Booth {
            id: row.id,
            slug: row.slug,
            name: row.name,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct CheckinRow {
    id: Uuid,
    attendee_id: Uuid,
    booth_id: Uuid,
    booth_slug: String,
    booth_name: String,
    note: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<CheckinRow> for CheckinEvent {
    fn from(row: CheckinRow) -> Self {
        CheckinEvent {
            id: row.id,
            attendee_id: row.attendee_id,
            booth_id: row.booth_id,
            booth_slug: row.booth_slug,
            booth_name: row.booth_name,
            note: row.note,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct SessionRow {
    user_id: Uuid,
    email: String,
    role: String,
    expires_at: DateTime<Utc>,
}

/// Payload sent by the `staff_sessions` notify trigger.
#[derive(Debug, Deserialize)]
struct SessionNotice {
    op: String,
    user_id: Uuid,
}

impl SessionNotice {
    fn into_event(self) -> Option<AuthEvent> {
        let user_id = self.user_id;
        match self.op.as_str() {
            "INSERT" => Some(AuthEvent::SignedIn { user_id }),
            "UPDATE" => Some(AuthEvent::TokenRefreshed { user_id }),
            "DELETE" => Some(AuthEvent::SignedOut { user_id }),
            _ => None,
        }
    }
}

fn unique_violation(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            db.is_unique_violation() && db.constraint() == Some(constraint)
        }
        _ => false,
    }
}

fn attendee_order(query: &AttendeeQuery) -> &'static str {
    match (query.sort, query.direction) {
        (SortColumn::CreatedAt, SortDirection::Asc) => "a.created_at ASC",
        (SortColumn::CreatedAt, SortDirection::Desc) => "a.created_at DESC",
        (SortColumn::LastName, SortDirection::Asc) => "a.last_name ASC, a.first_name ASC",
        (SortColumn::LastName, SortDirection::Desc) => "a.last_name DESC, a.first_name DESC",
    }
}

pub struct PgBackend {
    pool: PgPool,
    auth_events: AuthEvents,
}

impl PgBackend {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, BackendError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        tracing::info!("Successfully connected to database");

        sqlx::migrate!()
            .run(&pool)
            .await
            .map_err(|e| BackendError::Unavailable(format!("migrations failed: {e}")))?;

        tracing::info!("Migrations run successfully");

        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            auth_events: AuthEvents::new(),
        }
    }

    /// Forwards `staff_sessions` changes made by the identity provider
    /// into the in-process auth event stream.
    pub async fn spawn_auth_listener(&self) -> Result<tokio::task::JoinHandle<()>, BackendError> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(AUTH_CHANNEL).await?;
        let events = self.auth_events.clone();

        Ok(tokio::spawn(async move {
            loop {
                match listener.recv().await {
                    Ok(notification) => {
                        match serde_json::from_str::<SessionNotice>(notification.payload()) {
                            Ok(notice) => {
                                if let Some(event) = notice.into_event() {
                                    events.publish(event);
                                }
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, payload = notification.payload(), "Ignoring malformed auth notice");
                            }
                        }
                    }
                    Err(e) => {
                        // PgListener reconnects on the next recv.
                        tracing::error!(error = ?e, "Auth listener error");
                        tokio::time::sleep(LISTENER_BACKOFF).await;
                    }
                }
            }
        }))
    }

    async fn visits_for(&self, attendee_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<CheckinEvent>>, BackendError> {
        let rows: Vec<CheckinRow> = sqlx::query_as(
            r#"
            SELECT id, attendee_id, booth_id, booth_slug, booth_name, note, created_at
            FROM v_checkins
            WHERE attendee_id = ANY($1)
            ORDER BY created_at ASC
            "#,
        )
        .bind(attendee_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_attendee: HashMap<Uuid, Vec<CheckinEvent>> = HashMap::new();
        for row in rows {
            by_attendee.entry(row.attendee_id).or_default().push(row.into());
        }
        Ok(by_attendee)
    }
}

#[async_trait]
impl Backend for PgBackend {
    async fn create_attendee_and_ticket(
        &self,
        new: &NewAttendee,
        code: &str,
    ) -> Result<Registration, BackendError> {
        let mut tx = self.pool.begin().await?;
        let attendee_id = Uuid::new_v4();
        let ticket_id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO attendees (id, first_name, last_name, email, phone, language, opt_info)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(attendee_id)
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(&new.email)
        .bind(&new.phone)
        .bind(new.language.as_str())
        .bind(new.opt_info.as_ref().map(Json))
        .execute(&mut *tx)
        .await?;

        let inserted = sqlx::query("INSERT INTO tickets (id, attendee_id, code) VALUES ($1, $2, $3)")
            .bind(ticket_id)
            .bind(attendee_id)
            .bind(code)
            .execute(&mut *tx)
            .await;

        if let Err(e) = inserted {
            // Dropping `tx` rolls back the attendee insert as well.
            if unique_violation(&e, TICKET_CODE_CONSTRAINT) {
                return Err(BackendError::CodeTaken);
            }
            return Err(e.into());
        }

        tx.commit().await?;

        Ok(Registration {
            attendee_id,
            ticket_id,
            code: code.to_string(),
            first_name: new.first_name.clone(),
            last_name: new.last_name.clone(),
        })
    }

    async fn find_ticket_by_code(&self, code: &str) -> Result<Option<TicketLookup>, BackendError> {
        let row: Option<AttendeeRow> =
            sqlx::query_as(&format!("{TICKET_WITH_ATTENDEE} WHERE t.code = $1"))
                .bind(code)
                .fetch_optional(&self.pool)
                .await?;
        row.map(AttendeeRow::into_lookup).transpose()
    }

    async fn find_ticket_by_id(
        &self,
        ticket_id: Uuid,
    ) -> Result<Option<TicketLookup>, BackendError> {
        let row: Option<AttendeeRow> =
            sqlx::query_as(&format!("{TICKET_WITH_ATTENDEE} WHERE t.id = $1"))
                .bind(ticket_id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(AttendeeRow::into_lookup).transpose()
    }

    async fn search_attendees(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>, BackendError> {
        let rows: Vec<AttendeeRow> = sqlx::query_as(&format!(
            r#"{ATTENDEE_WITH_TICKET}
            WHERE a.first_name ILIKE $1 OR a.last_name ILIKE $1
               OR a.email ILIKE $1 OR a.phone ILIKE $1
            ORDER BY a.last_name ASC, a.first_name ASC
            LIMIT $2"#
        ))
        .bind(like_pattern(query))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let (attendee, ticket) = row.split()?;
                Ok(SearchHit { attendee, ticket })
            })
            .collect()
    }

    async fn record_checkin(&self, ticket_id: Uuid) -> Result<CheckinOutcome, BackendError> {
        // Conditional update: only the first redeemer moves the ticket.
        let updated: Option<(DateTime<Utc>,)> = sqlx::query_as(
            r#"
            UPDATE tickets SET status = 'checked_in', checked_in_at = now()
            WHERE id = $1 AND status = 'issued'
            RETURNING checked_in_at
            "#,
        )
        .bind(ticket_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some((checked_in_at,)) = updated {
            return Ok(CheckinOutcome {
                ticket_id,
                status: TicketStatus::CheckedIn,
                checked_in_at,
                already_checked_in: false,
            });
        }

        let existing: Option<(Option<DateTime<Utc>>,)> =
            sqlx::query_as("SELECT checked_in_at FROM tickets WHERE id = $1")
                .bind(ticket_id)
                .fetch_optional(&self.pool)
                .await?;

        match existing {
            None => Err(BackendError::NotFound(format!("Ticket '{ticket_id}' not found"))),
            Some((checked_in_at,)) => Ok(CheckinOutcome {
                ticket_id,
                status: TicketStatus::CheckedIn,
                checked_in_at: checked_in_at.ok_or_else(|| {
                    BackendError::Decode(format!("ticket '{ticket_id}' checked in without timestamp"))
                })?,
                already_checked_in: true,
            }),
        }
    }

    async fn reset_ticket(&self, ticket_id: Uuid) -> Result<Ticket, BackendError> {
        let row: Option<TicketRow> = sqlx::query_as(
            r#"
            UPDATE tickets SET status = 'issued', checked_in_at = NULL
            WHERE id = $1
            RETURNING id, attendee_id, code, status, checked_in_at, created_at
            "#,
        )
        .bind(ticket_id)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| BackendError::NotFound(format!("Ticket '{ticket_id}' not found")))?
            .try_into()
    }

    async fn record_booth_visit(
        &self,
        code: &str,
        booth_slug: &str,
        note: Option<&str>,
    ) -> Result<CheckinEvent, BackendError> {
        let mut tx = self.pool.begin().await?;

        let attendee: Option<(Uuid,)> =
            sqlx::query_as("SELECT attendee_id FROM tickets WHERE code = $1")
                .bind(code)
                .fetch_optional(&mut *tx)
                .await?;
        let (attendee_id,) =
            attendee.ok_or_else(|| BackendError::UnknownCode(code.to_string()))?;

        let booth: Option<BoothRow> =
            sqlx::query_as("SELECT id, slug, name, created_at FROM booths WHERE slug = $1")
                .bind(booth_slug)
                .fetch_optional(&mut *tx)
                .await?;
        let booth = booth
            .ok_or_else(|| BackendError::NotFound(format!("No booth with slug '{booth_slug}'")))?;

        let (id, created_at): (Uuid, DateTime<Utc>) = sqlx::query_as(
            r#"
            INSERT INTO checkins (id, attendee_id, booth_id, note)
            VALUES ($1, $2, $3, $4)
            RETURNING id, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(attendee_id)
        .bind(booth.id)
        .bind(note)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(CheckinEvent {
            id,
            attendee_id,
            booth_id: booth.id,
            booth_slug: booth.slug,
            booth_name: booth.name,
            note: note.map(str::to_string),
            created_at,
        })
    }

    async fn list_booths(&self) -> Result<Vec<Booth>, BackendError> {
        let rows: Vec<BoothRow> =
            sqlx::query_as("SELECT id, slug, name, created_at FROM booths ORDER BY name ASC")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(Booth::from).collect())
    }

    async fn create_booth(&self, name: &str, slug: &str) -> Result<Booth, BackendError> {
        let inserted: Result<BoothRow, sqlx::Error> = sqlx::query_as(
            r#"
            INSERT INTO booths (id, slug, name) VALUES ($1, $2, $3)
            RETURNING id, slug, name, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(slug)
        .bind(name)
        .fetch_one(&self.pool)
        .await;

        match inserted {
            Ok(row) => Ok(row.into()),
            Err(e) if unique_violation(&e, BOOTH_SLUG_CONSTRAINT) => Err(BackendError::Conflict(
                format!("A booth with slug '{slug}' already exists"),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn rename_booth(&self, booth_id: Uuid, name: &str) -> Result<Booth, BackendError> {
        let row: Option<BoothRow> = sqlx::query_as(
            "UPDATE booths SET name = $2 WHERE id = $1 RETURNING id, slug, name, created_at",
        )
        .bind(booth_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Booth::from)
            .ok_or_else(|| BackendError::NotFound(format!("Booth '{booth_id}' not found")))
    }

    async fn list_attendees(
        &self,
        query: &AttendeeQuery,
    ) -> Result<Vec<AttendeeRecord>, BackendError> {
        let search = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        let rows: Vec<AttendeeRow> = sqlx::query_as(&format!(
            r#"{ATTENDEE_WITH_TICKET}
            WHERE $1::text IS NULL
               OR a.first_name ILIKE $1 OR a.last_name ILIKE $1
               OR a.email ILIKE $1 OR a.phone ILIKE $1
            ORDER BY {order}
            LIMIT $2"#,
            order = attendee_order(query)
        ))
        .bind(search.map(like_pattern))
        .bind(query.limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let pairs = rows
            .into_iter()
            .map(AttendeeRow::split)
            .collect::<Result<Vec<_>, _>>()?;
        let ids: Vec<Uuid> = pairs.iter().map(|(a, _)| a.id).collect();
        let mut visits = self.visits_for(&ids).await?;

        Ok(pairs
            .into_iter()
            .map(|(attendee, ticket)| AttendeeRecord {
                visits: visits.remove(&attendee.id).unwrap_or_default(),
                attendee,
                ticket,
            })
            .collect())
    }

    async fn update_attendee(
        &self,
        attendee_id: Uuid,
        fields: &NewAttendee,
    ) -> Result<Attendee, BackendError> {
        let updated = sqlx::query(
            r#"
            UPDATE attendees
            SET first_name = $2, last_name = $3, email = $4, phone = $5,
                language = $6, opt_info = $7
            WHERE id = $1
            "#,
        )
        .bind(attendee_id)
        .bind(&fields.first_name)
        .bind(&fields.last_name)
        .bind(&fields.email)
        .bind(&fields.phone)
        .bind(fields.language.as_str())
        .bind(fields.opt_info.as_ref().map(Json))
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(BackendError::NotFound(format!(
                "Attendee '{attendee_id}' not found"
            )));
        }

        let row: AttendeeRow = sqlx::query_as(&format!("{ATTENDEE_WITH_TICKET} WHERE a.id = $1"))
            .bind(attendee_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.split()?.0)
    }

    async fn delete_attendee(&self, attendee_id: Uuid) -> Result<(), BackendError> {
        // tickets and checkins cascade.
        let deleted = sqlx::query("DELETE FROM attendees WHERE id = $1")
            .bind(attendee_id)
            .execute(&self.pool)
            .await?;

        if deleted.rows_affected() == 0 {
            return Err(BackendError::NotFound(format!(
                "Attendee '{attendee_id}' not found"
            )));
        }
        Ok(())
    }

    async fn get_session(&self, token: &str) -> Result<Option<Session>, BackendError> {
        let row: Option<SessionRow> = sqlx::query_as(
            r#"
            SELECT user_id, email, role, expires_at FROM staff_sessions
            WHERE token_hash = $1 AND expires_at > now()
            "#,
        )
        .bind(token_digest(token))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| Session {
            user_id: row.user_id,
            email: row.email,
            role: row.role.parse().unwrap_or(Role::None),
            expires_at: row.expires_at,
        }))
    }

    async fn sign_out(&self, token: &str) -> Result<(), BackendError> {
        let removed: Option<(Uuid,)> =
            sqlx::query_as("DELETE FROM staff_sessions WHERE token_hash = $1 RETURNING user_id")
                .bind(token_digest(token))
                .fetch_optional(&self.pool)
                .await?;

        if let Some((user_id,)) = removed {
            self.auth_events.publish(AuthEvent::SignedOut { user_id });
        }
        Ok(())
    }

    fn subscribe_auth(&self) -> broadcast::Receiver<AuthEvent> {
        self.auth_events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_notice_maps_trigger_ops() {
        let user_id = Uuid::new_v4();
        let notice: SessionNotice =
            serde_json::from_str(&format!(r#"{{"op":"DELETE","user_id":"{user_id}"}}"#)).unwrap();
        assert_eq!(notice.into_event(), Some(AuthEvent::SignedOut { user_id }));

        let notice = SessionNotice {
            op: "TRUNCATE".into(),
            user_id,
        };
        assert_eq!(notice.into_event(), None);
    }

    #[test]
    fn test_attendee_order_is_whitelisted() {
        let query = AttendeeQuery {
            sort: SortColumn::LastName,
            direction: SortDirection::Asc,
            ..AttendeeQuery::default()
        };
        assert_eq!(attendee_order(&query), "a.last_name ASC, a.first_name ASC");
        assert_eq!(attendee_order(&AttendeeQuery::default()), "a.created_at DESC");
    }
}
