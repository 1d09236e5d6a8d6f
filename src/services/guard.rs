//! Role gate for staff-only operations.
//!
//! [`AccessGuard::evaluate`] is the one-shot form used per request.
//! [`AccessGuard::watch`] keeps a decision current for long-lived
//! consumers (streams): it re-runs the check on every auth state change
//! and when a granted session reaches its expiry, and drops any in-flight
//! check the moment a newer event arrives, so a stale answer can never
//! overwrite a fresh one.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::models::{AuthEvent, Role, Session};
use crate::store::{Backend, BackendError};

pub const ADMIN_ONLY: &[Role] = &[Role::Admin];
pub const CHECKIN_STAFF: &[Role] = &[Role::Admin, Role::Checkin];
pub const ANY_SESSION: &[Role] = &[Role::Admin, Role::Checkin, Role::None];

pub const DEFAULT_GUARD_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on how long a watch trusts a granted session without
/// asking again.
const MAX_EXPIRY_WAIT: Duration = Duration::from_secs(24 * 60 * 60);

pub fn allowed(role: Role, required: &[Role]) -> bool {
    required.contains(&role)
}

/// Last line of defence inside the services, for callers that already
/// hold a session.
pub fn require(session: &Session, required: &[Role]) -> Result<(), BackendError> {
    if allowed(session.role, required) {
        Ok(())
    } else {
        Err(BackendError::PermissionDenied(format!(
            "Role '{}' may not perform this action",
            session.role
        )))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Access {
    Checking,
    Granted(Session),
    /// No usable session, or the check did not finish in time.
    Unauthenticated,
    /// Authenticated with the wrong role. The session has been ended.
    Forbidden,
}

impl Access {
    pub fn is_granted(&self) -> bool {
        matches!(self, Access::Granted(_))
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, Access::Unauthenticated | Access::Forbidden)
    }
}

#[derive(Clone)]
pub struct AccessGuard {
    backend: Arc<dyn Backend>,
    timeout: Duration,
}

impl AccessGuard {
    pub fn new(backend: Arc<dyn Backend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    /// Resolves the caller's session within the configured bound. Anything
    /// other than a live session with a permitted role is a denial.
    pub async fn evaluate(&self, token: Option<&str>, required: &[Role]) -> Access {
        let Some(token) = token else {
            return Access::Unauthenticated;
        };

        let session = match tokio::time::timeout(self.timeout, self.backend.get_session(token)).await {
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "Identity check timed out");
                return Access::Unauthenticated;
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Identity check failed");
                return Access::Unauthenticated;
            }
            Ok(Ok(None)) => return Access::Unauthenticated,
            Ok(Ok(Some(session))) => session,
        };

        if allowed(session.role, required) {
            return Access::Granted(session);
        }

        info!(
            user_id = %session.user_id,
            role = %session.role,
            "Role not permitted here, ending session"
        );
        if let Err(e) = self.backend.sign_out(token).await {
            warn!(error = %e, user_id = %session.user_id, "Failed to end session after denial");
        }
        Access::Forbidden
    }

    async fn evaluate_owned(self, token: String, required: &'static [Role]) -> Access {
        self.evaluate(Some(&token), required).await
    }

    /// Starts a watch that follows auth state changes for `token`.
    pub fn watch(&self, token: String, required: &'static [Role]) -> GuardWatch {
        let (tx, rx) = watch::channel(Access::Checking);
        // Subscribe before the first check so no event can slip between.
        let events = self.backend.subscribe_auth();
        let task = tokio::spawn(run_watch(self.clone(), token, required, tx, events));
        GuardWatch { access: rx, task }
    }
}

/// When a granted session stops being valid on its own.
fn expiry_deadline(session: &Session) -> Instant {
    let remaining = (session.expires_at - chrono::Utc::now())
        .to_std()
        .unwrap_or(Duration::ZERO);
    Instant::now() + remaining.min(MAX_EXPIRY_WAIT)
}

async fn run_watch(
    guard: AccessGuard,
    token: String,
    required: &'static [Role],
    tx: watch::Sender<Access>,
    mut events: broadcast::Receiver<AuthEvent>,
) {
    let mut check = Box::pin(guard.clone().evaluate_owned(token.clone(), required));
    let mut pending = true;
    let expiry = tokio::time::sleep(Duration::ZERO);
    tokio::pin!(expiry);
    let mut expiry_armed = false;

    loop {
        tokio::select! {
            access = &mut check, if pending => {
                pending = false;
                expiry_armed = false;
                if let Access::Granted(session) = &access {
                    expiry.as_mut().reset(expiry_deadline(session));
                    expiry_armed = true;
                }
                let denied = access.is_denied();
                tx.send_replace(access);
                if denied {
                    break;
                }
            }
            () = &mut expiry, if expiry_armed => {
                expiry_armed = false;
                debug!("Session reached its expiry, re-checking access");
                check = Box::pin(guard.clone().evaluate_owned(token.clone(), required));
                pending = true;
            }
            event = events.recv() => {
                match event {
                    Ok(event) => debug!(?event, "Auth state changed, re-checking access"),
                    Err(RecvError::Lagged(skipped)) => debug!(skipped, "Missed auth events, re-checking access"),
                    Err(RecvError::Closed) => {
                        tx.send_replace(Access::Unauthenticated);
                        break;
                    }
                }
                // Replacing the future cancels whichever check was still running.
                check = Box::pin(guard.clone().evaluate_owned(token.clone(), required));
                pending = true;
            }
            _ = tx.closed() => break,
        }
    }
}

/// A live access decision. Dropping it stops the background check.
pub struct GuardWatch {
    access: watch::Receiver<Access>,
    task: JoinHandle<()>,
}

impl GuardWatch {
    pub fn current(&self) -> Access {
        self.access.borrow().clone()
    }

    /// Waits for the first decision.
    pub async fn settled(&mut self) -> Access {
        match self
            .access
            .wait_for(|access| !matches!(access, Access::Checking))
            .await
        {
            Ok(access) => access.clone(),
            Err(_) => Access::Unauthenticated,
        }
    }

    /// Waits for the next decision. `None` once the watch has ended.
    pub async fn changed(&mut self) -> Option<Access> {
        self.access.changed().await.ok()?;
        Some(self.current())
    }
}

impl Drop for GuardWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBackend;
    use chrono::Duration as ChronoDuration;

    fn guard(backend: &Arc<MemoryBackend>, timeout: Duration) -> AccessGuard {
        AccessGuard::new(backend.clone(), timeout)
    }

    #[test]
    fn test_allowed() {
        assert!(allowed(Role::Admin, ADMIN_ONLY));
        assert!(!allowed(Role::Checkin, ADMIN_ONLY));
        assert!(allowed(Role::Checkin, CHECKIN_STAFF));
        assert!(!allowed(Role::None, CHECKIN_STAFF));
        assert!(allowed(Role::None, ANY_SESSION));
    }

    #[tokio::test]
    async fn test_missing_or_unknown_token_is_denied() {
        let backend = Arc::new(MemoryBackend::new());
        let guard = guard(&backend, DEFAULT_GUARD_TIMEOUT);

        assert_eq!(guard.evaluate(None, CHECKIN_STAFF).await, Access::Unauthenticated);
        assert_eq!(
            guard.evaluate(Some("bogus"), CHECKIN_STAFF).await,
            Access::Unauthenticated
        );
    }

    #[tokio::test]
    async fn test_wrong_role_is_forbidden_and_signed_out() {
        let backend = Arc::new(MemoryBackend::new());
        let token = backend
            .issue_session("desk@expo.org", Role::Checkin, ChronoDuration::hours(1))
            .await;
        let guard = guard(&backend, DEFAULT_GUARD_TIMEOUT);

        assert!(guard.evaluate(Some(&token), CHECKIN_STAFF).await.is_granted());
        assert_eq!(guard.evaluate(Some(&token), ADMIN_ONLY).await, Access::Forbidden);
        assert!(backend.get_session(&token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_slow_identity_check_is_denied_in_bounded_time() {
        let backend = Arc::new(
            MemoryBackend::new().with_session_latency(Duration::from_secs(30)),
        );
        let token = backend
            .issue_session("admin@expo.org", Role::Admin, ChronoDuration::hours(1))
            .await;
        let guard = guard(&backend, Duration::from_millis(50));

        let access = tokio::time::timeout(
            Duration::from_secs(2),
            guard.evaluate(Some(&token), ADMIN_ONLY),
        )
        .await
        .expect("guard must not hang");
        assert_eq!(access, Access::Unauthenticated);
    }

    #[tokio::test]
    async fn test_watch_follows_revocation() {
        let backend = Arc::new(MemoryBackend::new());
        let token = backend
            .issue_session("desk@expo.org", Role::Checkin, ChronoDuration::hours(1))
            .await;
        let guard = guard(&backend, DEFAULT_GUARD_TIMEOUT);

        let mut watch = guard.watch(token.clone(), CHECKIN_STAFF);
        assert!(watch.settled().await.is_granted());

        backend.revoke_session(&token).await;

        let next = tokio::time::timeout(Duration::from_secs(2), watch.changed())
            .await
            .expect("watch must react to revocation");
        assert_eq!(next, Some(Access::Unauthenticated));
    }

    #[tokio::test]
    async fn test_watch_denies_once_session_expires() {
        let backend = Arc::new(MemoryBackend::new());
        let token = backend
            .issue_session("desk@expo.org", Role::Checkin, ChronoDuration::seconds(1))
            .await;
        let guard = guard(&backend, DEFAULT_GUARD_TIMEOUT);

        let mut watch = guard.watch(token.clone(), CHECKIN_STAFF);
        assert!(watch.settled().await.is_granted());

        // No auth event is published; expiry alone must end access.
        let next = tokio::time::timeout(Duration::from_secs(3), async {
            loop {
                match watch.changed().await {
                    Some(Access::Granted(_) | Access::Checking) => continue,
                    other => return other,
                }
            }
        })
        .await
        .expect("watch must react to expiry");
        assert_eq!(next, Some(Access::Unauthenticated));
        assert!(backend.get_session(&token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_watch_denies_wrong_role() {
        let backend = Arc::new(MemoryBackend::new());
        let token = backend
            .issue_session("someone@expo.org", Role::None, ChronoDuration::hours(1))
            .await;
        let guard = guard(&backend, DEFAULT_GUARD_TIMEOUT);

        let mut watch = guard.watch(token, ADMIN_ONLY);
        assert_eq!(watch.settled().await, Access::Forbidden);
    }

    #[tokio::test]
    async fn test_newer_event_supersedes_slow_check() {
        let backend = Arc::new(
            MemoryBackend::new().with_session_latency(Duration::from_millis(200)),
        );
        let token = backend
            .issue_session("desk@expo.org", Role::Checkin, ChronoDuration::hours(1))
            .await;
        let guard = guard(&backend, Duration::from_secs(5));

        let mut watch = guard.watch(token.clone(), CHECKIN_STAFF);
        // Revoke while the first (slow) check is still in flight; the
        // restarted check must be the one that decides.
        tokio::time::sleep(Duration::from_millis(20)).await;
        backend.revoke_session(&token).await;

        let decided = tokio::time::timeout(Duration::from_secs(2), watch.settled())
            .await
            .expect("watch must settle");
        assert_eq!(decided, Access::Unauthenticated);
    }
}
