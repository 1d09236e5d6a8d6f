use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::checkin::CheckinEvent;
use super::survey::SurveyAnswers;
use super::ticket::Ticket;

/// Preferred language chosen at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Es,
    Ko,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Es => "es",
            Language::Ko => "ko",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" => Ok(Language::En),
            "es" => Ok(Language::Es),
            "ko" => Ok(Language::Ko),
            other => Err(format!("unsupported language '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attendee {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub language: Language,
    pub opt_info: Option<SurveyAnswers>,
    pub created_at: DateTime<Utc>,
}

impl Attendee {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Identity fields that passed local validation and may be written.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAttendee {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub language: Language,
    pub opt_info: Option<SurveyAnswers>,
}

/// Lookup result: an attendee and their first ticket, if any.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub attendee: Attendee,
    pub ticket: Option<Ticket>,
}

/// Administrative view of one attendee.
#[derive(Debug, Clone, Serialize)]
pub struct AttendeeRecord {
    pub attendee: Attendee,
    pub ticket: Option<Ticket>,
    pub visits: Vec<CheckinEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortColumn {
    #[default]
    CreatedAt,
    LastName,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

/// Filter and ordering for the admin attendee table.
#[derive(Debug, Clone, Default)]
pub struct AttendeeQuery {
    pub search: Option<String>,
    pub sort: SortColumn,
    pub direction: SortDirection,
    pub limit: usize,
}

/// Case-insensitive substring match over the searchable identity fields.
pub(crate) fn matches_search(attendee: &Attendee, needle_lower: &str) -> bool {
    [
        &attendee.first_name,
        &attendee.last_name,
        &attendee.email,
        &attendee.phone,
    ]
    .iter()
    .any(|field| field.to_lowercase().contains(needle_lower))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ana() -> Attendee {
        Attendee {
            id: Uuid::new_v4(),
            first_name: "Ana".into(),
            last_name: "Li".into(),
            email: "ana@x.com".into(),
            phone: "555-0100".into(),
            language: Language::Es,
            opt_info: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_language_parses_case_insensitively() {
        assert_eq!("ES".parse::<Language>(), Ok(Language::Es));
        assert_eq!(" ko ".parse::<Language>(), Ok(Language::Ko));
        assert!("fr".parse::<Language>().is_err());
    }

    #[test]
    fn test_search_matches_any_field() {
        let attendee = ana();
        assert!(matches_search(&attendee, "ana"));
        assert!(matches_search(&attendee, "x.com"));
        assert!(matches_search(&attendee, "0100"));
        assert!(!matches_search(&attendee, "bob"));
    }
}
