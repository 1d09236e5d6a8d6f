use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Append-only record of one attendee visiting one booth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckinEvent {
    pub id: Uuid,
    pub attendee_id: Uuid,
    pub booth_id: Uuid,
    pub booth_slug: String,
    pub booth_name: String,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CheckinEvent {
    /// `Name (note) @ timestamp`, as shown in the admin table and export.
    pub fn summary(&self) -> String {
        let when = self.created_at.format("%Y-%m-%d %H:%M");
        match self.note.as_deref() {
            Some(note) if !note.is_empty() => format!("{} ({}) @ {}", self.booth_name, note, when),
            _ => format!("{} @ {}", self.booth_name, when),
        }
    }
}
