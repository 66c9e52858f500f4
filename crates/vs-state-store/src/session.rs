//! The single active login session

use arc_swap::ArcSwapOption;
use std::sync::Arc;
use tracing::info;
use vs_core::Session;

/// Holds at most one session; a new login replaces the previous one
#[derive(Debug, Default)]
pub struct SessionStore {
    current: ArcSwapOption<Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a session, invalidating whatever token was active before
    pub fn login(&self, session: Session) -> Arc<Session> {
        let session = Arc::new(session);
        info!(account_id = %session.account_id, "Session opened");
        self.current.store(Some(session.clone()));
        session
    }

    pub fn current(&self) -> Option<Arc<Session>> {
        self.current.load_full()
    }
}
