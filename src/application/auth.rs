//! Session gate in front of the admin section.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::remote::{AuthClient, RemoteError, Session};

const SOURCE: &str = "application::auth";

/// Outcome of checking the current session before an admin view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow(Session),
    RedirectToLogin,
}

impl GuardDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GuardDecision::Allow(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardEvent {
    SignedIn,
    /// The session went away; mounted admin views must leave for the login page.
    SignedOut,
}

#[derive(Clone)]
pub struct AuthGuard {
    auth: Arc<dyn AuthClient>,
}

impl AuthGuard {
    pub fn new(auth: Arc<dyn AuthClient>) -> Self {
        Self { auth }
    }

    pub fn check(&self) -> GuardDecision {
        match self.auth.session() {
            Some(session) => GuardDecision::Allow(session),
            None => GuardDecision::RedirectToLogin,
        }
    }

    /// Observe session transitions from now on.
    pub fn watch(&self) -> GuardWatch {
        let mut rx = self.auth.on_session_change();
        let signed_in = rx.borrow_and_update().is_some();
        GuardWatch { rx, signed_in }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, RemoteError> {
        match self.auth.sign_in(email.trim(), password).await {
            Ok(session) => {
                info!(target: SOURCE, user_id = %session.user_id, "Admin signed in");
                Ok(session)
            }
            Err(err) => {
                warn!(target: SOURCE, error = %err, "Admin sign-in rejected");
                Err(err)
            }
        }
    }

    /// Sign out; watchers see `SignedOut` even when the remote call fails.
    pub async fn sign_out(&self) -> Result<(), RemoteError> {
        let outcome = self.auth.sign_out().await;
        info!(target: SOURCE, "Admin signed out");
        outcome
    }
}

/// Stream of guard events derived from the auth client's session channel.
#[derive(Debug)]
pub struct GuardWatch {
    rx: watch::Receiver<Option<Session>>,
    signed_in: bool,
}

impl GuardWatch {
    /// Next transition, or `None` once the auth client is gone.
    ///
    /// Token refreshes (one session replaced by another) are not transitions.
    pub async fn next(&mut self) -> Option<GuardEvent> {
        loop {
            self.rx.changed().await.ok()?;
            let present = self.rx.borrow_and_update().is_some();
            if present == self.signed_in {
                continue;
            }
            self.signed_in = present;
            return Some(if present {
                GuardEvent::SignedIn
            } else {
                GuardEvent::SignedOut
            });
        }
    }

    /// Wait until the session is gone.
    pub async fn signed_out(&mut self) -> Option<()> {
        if !self.signed_in {
            return Some(());
        }
        while self.next().await? != GuardEvent::SignedOut {}
        Some(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryBackend;

    fn create_guard() -> (Arc<MemoryBackend>, AuthGuard) {
        let backend = Arc::new(MemoryBackend::new().with_admin("admin@example.com", "secret"));
        let guard = AuthGuard::new(backend.clone());
        (backend, guard)
    }

    #[tokio::test]
    async fn check_redirects_without_session() {
        let (_backend, guard) = create_guard();
        assert_eq!(guard.check(), GuardDecision::RedirectToLogin);

        let session = guard
            .sign_in(" admin@example.com ", "secret")
            .await
            .expect("sign in");
        assert_eq!(guard.check(), GuardDecision::Allow(session));
    }

    #[tokio::test]
    async fn sign_out_is_observed_as_signed_out() {
        let (_backend, guard) = create_guard();
        guard
            .sign_in("admin@example.com", "secret")
            .await
            .expect("sign in");

        let mut events = guard.watch();
        guard.sign_out().await.expect("sign out");

        assert_eq!(events.next().await, Some(GuardEvent::SignedOut));
        assert!(!guard.check().is_allowed());
    }

    #[tokio::test]
    async fn wrong_password_is_an_auth_error() {
        let (_backend, guard) = create_guard();
        let err = guard
            .sign_in("admin@example.com", "nope")
            .await
            .expect_err("rejected");
        assert!(matches!(err, RemoteError::Auth { .. }));
        assert_eq!(guard.check(), GuardDecision::RedirectToLogin);
    }
}
