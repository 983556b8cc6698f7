//! Authentication state holder.
//!
//! The mirror never signs in on its own. It reads the current session and reacts to
//! [`AuthenticationState::subscribe`] events, which carry the new session or `None` on
//! sign-out.

use crate::events::EventChannel;
use crate::host::context_keys::{ContextId, ContextKeys};
use crate::host::notifier::Notifier;
use crate::host::tokens;
use mirror_api::{ApiAuth, RemoteApi};
use mirror_core::Result;
use mirror_core::container::{Dependencies, Injectable, Token};
use mirror_core::logger::Logger;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::broadcast;

/// A signed-in session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    /// Team selected at sign-in; `None` for a personal account.
    pub team_id: Option<String>,
    pub scopes: Vec<String>,
}

impl Session {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            team_id: None,
            scopes: Vec::new(),
        }
    }

    pub fn with_team(mut self, team_id: impl Into<String>) -> Self {
        self.team_id = Some(team_id.into());
        self
    }

    pub fn with_scopes(mut self, scopes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Credentials scoped to the session's own team.
    pub fn auth(&self) -> ApiAuth {
        ApiAuth::new(&self.access_token).with_team(self.team_id.as_deref())
    }

    /// Credentials scoped to `team_id`, falling back to the session's team when it is
    /// missing or empty.
    pub fn auth_for_team(&self, team_id: Option<&str>) -> ApiAuth {
        let team_id = team_id
            .filter(|team| !team.is_empty())
            .or(self.team_id.as_deref());
        ApiAuth::new(&self.access_token).with_team(team_id)
    }
}

pub struct AuthenticationState {
    logger: Logger,
    session: RwLock<Option<Session>>,
    stored_session: Option<Session>,
    changes: EventChannel<Option<Session>>,
    context_keys: Arc<ContextKeys>,
    api: Arc<dyn RemoteApi>,
    notifier: Arc<dyn Notifier>,
}

impl AuthenticationState {
    pub fn current_session(&self) -> Option<Session> {
        self.session.read().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.read().is_some()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Option<Session>> {
        self.changes.subscribe()
    }

    /// Restore the stored session without notifying subscribers. Only the context key
    /// is updated.
    pub async fn load_session_on_bootstrap(&self) -> Result<()> {
        let session = self.stored_session.clone();
        let authenticated = session.is_some();
        *self.session.write() = session;
        self.context_keys
            .set(ContextId::IsAuthenticated, authenticated)
            .await
    }

    /// Replace the session and notify subscribers.
    pub async fn set_session(&self, session: Option<Session>) -> Result<()> {
        let authenticated = session.is_some();
        *self.session.write() = session.clone();
        self.changes.emit(session);
        self.context_keys
            .set(ContextId::IsAuthenticated, authenticated)
            .await
    }

    pub async fn sign_out(&self) -> Result<()> {
        self.logger.info("Signing out");
        self.set_session(None).await
    }

    /// Verify the stored token still works. A rejected token signs out and asks the
    /// user to sign in again; any other failure is ignored.
    pub async fn check_still_valid(&self) -> Result<bool> {
        let Some(session) = self.current_session() else {
            return Ok(false);
        };

        match self.api.get_user(&session.auth()).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_forbidden() => {
                self.logger.warn(format!("Stored access token was rejected: {e}"));
                self.sign_out().await?;
                self.notifier
                    .show_error("Saved access token seems to have expired. Please sign in again.");
                Ok(false)
            }
            Err(e) => {
                self.logger.debug(format!("Could not verify access token: {e}"));
                Ok(true)
            }
        }
    }
}

impl Injectable for AuthenticationState {
    fn dependencies() -> Vec<Token> {
        vec![
            Token::of::<ContextKeys>(),
            Token::named(tokens::REMOTE_API),
            Token::named(tokens::NOTIFIER),
            Token::named(tokens::STORED_SESSION),
        ]
    }

    fn construct(deps: &mut Dependencies) -> Result<Arc<Self>> {
        Ok(Arc::new(Self {
            logger: Logger::new("Authentication"),
            context_keys: deps.next()?,
            api: deps.next_value()?,
            notifier: deps.next_value()?,
            stored_session: deps.next_value()?,
            session: RwLock::new(None),
            changes: EventChannel::new(),
        }))
    }
}
