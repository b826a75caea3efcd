//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::{GameSession, SessionHandle};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub session: SessionHandle,
}

impl AppState {
    /// Build the state and the session it talks to. The caller spawns the
    /// session's tick loop.
    pub fn new(config: Config) -> (Self, GameSession) {
        let config = Arc::new(config);

        // Initialize the single global session
        let (session, handle) = GameSession::new(&config);

        let state = Self {
            config,
            session: handle,
        };
        (state, session)
    }
}
