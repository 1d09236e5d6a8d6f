//! Attendee CSV export.

use crate::models::AttendeeRecord;

pub const EXPORT_FILENAME: &str = "expo-attendees.csv";

pub const CSV_HEADERS: [&str; 15] = [
    "first_name",
    "last_name",
    "email",
    "phone",
    "language",
    "code",
    "status",
    "checked_in_at",
    "created_at",
    "hear_about",
    "hear_about_other_text",
    "contact_interests",
    "want_prayer",
    "prayer_request",
    "booths",
];

const BOM: char = '\u{FEFF}';
const LIST_SEPARATOR: &str = "; ";

/// Quotes a field when it holds a comma, quote, CR or LF; embedded quotes
/// are doubled.
pub fn escape_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn row(record: &AttendeeRecord) -> [String; 15] {
    let attendee = &record.attendee;
    let ticket = record.ticket.as_ref();
    let answers = attendee.opt_info.clone().unwrap_or_default();

    [
        attendee.first_name.clone(),
        attendee.last_name.clone(),
        attendee.email.clone(),
        attendee.phone.clone(),
        attendee.language.to_string(),
        ticket.map(|t| t.code.clone()).unwrap_or_default(),
        ticket.map(|t| t.status.to_string()).unwrap_or_default(),
        ticket
            .and_then(|t| t.checked_in_at)
            .map(|at| at.to_rfc3339())
            .unwrap_or_default(),
        attendee.created_at.to_rfc3339(),
        answers.hear_about.join(LIST_SEPARATOR),
        answers.hear_about_other_text.unwrap_or_default(),
        answers.contact_interests.join(LIST_SEPARATOR),
        if answers.want_prayer { "yes" } else { "no" }.to_string(),
        answers.prayer_request.unwrap_or_default(),
        record
            .visits
            .iter()
            .map(|visit| visit.summary())
            .collect::<Vec<_>>()
            .join(LIST_SEPARATOR),
    ]
}

/// One header line plus one line per attendee, `\n`-separated, prefixed
/// with a UTF-8 BOM.
pub fn export_attendees(records: &[AttendeeRecord]) -> String {
    let mut out = String::new();
    out.push(BOM);
    out.push_str(&CSV_HEADERS.join(","));

    for record in records {
        out.push('\n');
        let fields: Vec<String> = row(record).iter().map(|f| escape_field(f)).collect();
        out.push_str(&fields.join(","));
    }

    out
}
