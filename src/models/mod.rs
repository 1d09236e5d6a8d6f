pub mod attendee;
pub mod booth;
pub mod checkin;
pub mod session;
pub mod survey;
pub mod ticket;

pub use attendee::{Attendee, AttendeeQuery, AttendeeRecord, Language, NewAttendee, SearchHit, SortColumn, SortDirection};
pub use booth::{slugify, Booth};
pub use checkin::CheckinEvent;
pub use session::{AuthEvent, Role, Session};
pub use survey::SurveyAnswers;
pub use ticket::{CheckinOutcome, Registration, Ticket, TicketLookup, TicketStatus};
