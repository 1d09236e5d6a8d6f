use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::attendee::Attendee;

/// Entry status of a ticket. The only forward move is `Issued -> CheckedIn`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Issued,
    CheckedIn,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Issued => "issued",
            TicketStatus::CheckedIn => "checked_in",
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "issued" => Ok(TicketStatus::Issued),
            "checked_in" => Ok(TicketStatus::CheckedIn),
            other => Err(format!("unknown ticket status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: Uuid,
    pub attendee_id: Uuid,
    pub code: String,
    pub status: TicketStatus,
    pub checked_in_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Ticket {
    pub fn issue(attendee_id: Uuid, code: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            attendee_id,
            code,
            status: TicketStatus::Issued,
            checked_in_at: None,
            created_at: now,
        }
    }

    /// Applies the entry transition. A ticket that is already checked in
    /// keeps its original timestamp.
    pub fn check_in(&mut self, now: DateTime<Utc>) -> CheckinOutcome {
        match (self.status, self.checked_in_at) {
            (TicketStatus::CheckedIn, Some(at)) => CheckinOutcome {
                ticket_id: self.id,
                status: self.status,
                checked_in_at: at,
                already_checked_in: true,
            },
            _ => {
                self.status = TicketStatus::CheckedIn;
                self.checked_in_at = Some(now);
                CheckinOutcome {
                    ticket_id: self.id,
                    status: self.status,
                    checked_in_at: now,
                    already_checked_in: false,
                }
            }
        }
    }

    /// Administrative override: back to `Issued`.
    pub fn reset(&mut self) {
        self.status = TicketStatus::Issued;
        self.checked_in_at = None;
    }
}

/// Result of `record_checkin`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckinOutcome {
    pub ticket_id: Uuid,
    pub status: TicketStatus,
    pub checked_in_at: DateTime<Utc>,
    pub already_checked_in: bool,
}

/// A ticket resolved together with its attendee.
#[derive(Debug, Clone, Serialize)]
pub struct TicketLookup {
    pub ticket: Ticket,
    pub attendee: Attendee,
}

/// What a successful registration hands back to the registrant.
#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub attendee_id: Uuid,
    pub ticket_id: Uuid,
    pub code: String,
    pub first_name: String,
    pub last_name: String,
}
