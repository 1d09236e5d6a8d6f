use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use super::code::{mint_code, MAX_CODE_LENGTH, MIN_CODE_LENGTH};
use super::validation::{RegistrationForm, ValidationErrors};
use crate::models::Registration;
use crate::store::{Backend, BackendError};

pub const DEFAULT_MAX_MINT_ATTEMPTS: u32 = 3;

type Minter = dyn Fn(usize) -> String + Send + Sync;

#[derive(Debug, Error)]
pub enum IssueError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error("could not mint a unique code after {attempts} attempts")]
    CodeExhausted { attempts: u32 },

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Turns a registration form into one attendee plus one ticket.
pub struct RegistrantIssuer {
    backend: Arc<dyn Backend>,
    code_length: usize,
    max_attempts: u32,
    minter: Box<Minter>,
}

impl RegistrantIssuer {
    pub fn new(backend: Arc<dyn Backend>, code_length: usize, max_attempts: u32) -> Self {
        Self {
            backend,
            code_length: code_length.clamp(MIN_CODE_LENGTH, MAX_CODE_LENGTH),
            max_attempts: max_attempts.max(1),
            minter: Box::new(mint_code),
        }
    }

    /// Replaces the random code source.
    pub fn with_minter(mut self, minter: impl Fn(usize) -> String + Send + Sync + 'static) -> Self {
        self.minter = Box::new(minter);
        self
    }

    /// Validates locally, then writes attendee and ticket in one backend
    /// call. A code collision writes nothing and is retried with a fresh
    /// code.
    pub async fn register(&self, form: RegistrationForm) -> Result<Registration, IssueError> {
        let attendee = form.validate()?;

        for attempt in 1..=self.max_attempts {
            let code = (self.minter)(self.code_length);
            match self.backend.create_attendee_and_ticket(&attendee, &code).await {
                Ok(registration) => {
                    info!(
                        attendee_id = %registration.attendee_id,
                        ticket_id = %registration.ticket_id,
                        attempt,
                        "Registered attendee"
                    );
                    return Ok(registration);
                }
                Err(BackendError::CodeTaken) => {
                    warn!(attempt, max_attempts = self.max_attempts, "Ticket code collision, minting a new one");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(IssueError::CodeExhausted {
            attempts: self.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Language, TicketStatus};
    use crate::services::code::{is_well_formed, DEFAULT_CODE_LENGTH};
    use crate::store::MemoryBackend;
    use std::collections::{HashSet, VecDeque};
    use std::sync::Mutex;

    fn form(first: &str) -> RegistrationForm {
        RegistrationForm {
            first_name: first.into(),
            last_name: "Li".into(),
            email: "ana@x.com".into(),
            phone: "555-0100".into(),
            language: Some("es".into()),
            opt_info: None,
        }
    }

    fn scripted(codes: &[&str]) -> impl Fn(usize) -> String + Send + Sync + 'static {
        let queue = Mutex::new(codes.iter().map(|c| c.to_string()).collect::<VecDeque<_>>());
        move |_| queue.lock().unwrap().pop_front().unwrap_or_else(|| "EXHAUSTED".into())
    }

    #[tokio::test]
    async fn test_register_returns_resolvable_code() {
        let backend = Arc::new(MemoryBackend::new());
        let issuer = RegistrantIssuer::new(backend.clone(), DEFAULT_CODE_LENGTH, DEFAULT_MAX_MINT_ATTEMPTS);

        let registration = issuer.register(form("Ana")).await.unwrap();
        assert_eq!(registration.code.len(), DEFAULT_CODE_LENGTH);
        assert!(is_well_formed(&registration.code));

        let lookup = backend.find_ticket_by_code(&registration.code).await.unwrap().unwrap();
        assert_eq!(lookup.attendee.id, registration.attendee_id);
        assert_eq!(lookup.attendee.language, Language::Es);
        assert_eq!(lookup.ticket.status, TicketStatus::Issued);
    }

    #[tokio::test]
    async fn test_code_length_is_clamped() {
        let backend = Arc::new(MemoryBackend::new());

        let short = RegistrantIssuer::new(backend.clone(), 0, DEFAULT_MAX_MINT_ATTEMPTS);
        let registration = short.register(form("Ana")).await.unwrap();
        assert_eq!(registration.code.len(), MIN_CODE_LENGTH);
        assert!(is_well_formed(&registration.code));

        let long = RegistrantIssuer::new(backend, 500, DEFAULT_MAX_MINT_ATTEMPTS);
        let registration = long.register(form("Bo")).await.unwrap();
        assert_eq!(registration.code.len(), MAX_CODE_LENGTH);
    }

    #[tokio::test]
    async fn test_codes_unique_across_registrations() {
        let backend = Arc::new(MemoryBackend::new());
        let issuer = RegistrantIssuer::new(backend, DEFAULT_CODE_LENGTH, DEFAULT_MAX_MINT_ATTEMPTS);

        let mut codes = HashSet::new();
        for i in 0..200 {
            let registration = issuer.register(form(&format!("Ana{i}"))).await.unwrap();
            assert!(codes.insert(registration.code));
        }
    }

    #[tokio::test]
    async fn test_collision_is_retried_with_fresh_code() {
        let backend = Arc::new(MemoryBackend::new());
        RegistrantIssuer::new(backend.clone(), 4, 3)
            .with_minter(scripted(&["AAAA"]))
            .register(form("Ana"))
            .await
            .unwrap();

        let issuer = RegistrantIssuer::new(backend.clone(), 4, 3)
            .with_minter(scripted(&["AAAA", "AAAA", "BBBB"]));
        let registration = issuer.register(form("Bo")).await.unwrap();
        assert_eq!(registration.code, "BBBB");

        let hits = backend.search_attendees("bo", 20).await.unwrap();
        assert_eq!(hits.len(), 1, "collisions must not leave orphaned attendees");
    }

    #[tokio::test]
    async fn test_gives_up_after_bounded_attempts() {
        let backend = Arc::new(MemoryBackend::new());
        RegistrantIssuer::new(backend.clone(), 4, 3)
            .with_minter(scripted(&["AAAA"]))
            .register(form("Ana"))
            .await
            .unwrap();

        let issuer = RegistrantIssuer::new(backend, 4, 3).with_minter(|_| "AAAA".to_string());
        let err = issuer.register(form("Bo")).await.unwrap_err();
        assert!(matches!(err, IssueError::CodeExhausted { attempts: 3 }));
    }

    #[tokio::test]
    async fn test_invalid_form_never_reaches_backend() {
        let backend = Arc::new(MemoryBackend::new());
        let issuer = RegistrantIssuer::new(backend.clone(), 4, 3)
            .with_minter(|_| panic!("minter must not run for invalid input"));

        let mut input = form("Ana");
        input.email = "not-an-email".into();
        let err = issuer.register(input).await.unwrap_err();
        assert!(matches!(err, IssueError::Validation(_)));
        assert!(backend.search_attendees("ana", 20).await.unwrap().is_empty());
    }
}
