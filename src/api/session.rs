//! Session context passed explicitly to whoever needs the active session.

use std::sync::RwLock;

use super::client::Theme;

/// Supplies the id of the booth session the photo belongs to.
pub trait SessionProvider: Send + Sync {
    fn session_id(&self) -> Option<String>;
}

/// Lifetime-scoped session state for one booth run.
///
/// Create one per guest session and hand it to the orchestrator; dropping it
/// ends the session.
#[derive(Debug, Default)]
pub struct SessionContext {
    session_id: RwLock<Option<String>>,
    theme: RwLock<Option<Theme>>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context that already belongs to a session.
    pub fn with_session(session_id: impl Into<String>) -> Self {
        let ctx = Self::new();
        ctx.set_session_id(Some(session_id.into()));
        ctx
    }

    pub fn set_session_id(&self, session_id: Option<String>) {
        if let Ok(mut slot) = self.session_id.write() {
            *slot = session_id;
        }
    }

    pub fn theme(&self) -> Option<Theme> {
        self.theme.read().ok().and_then(|t| t.clone())
    }

    pub fn set_theme(&self, theme: Option<Theme>) {
        if let Ok(mut slot) = self.theme.write() {
            *slot = theme;
        }
    }

    /// Forget the session and theme.
    pub fn clear(&self) {
        self.set_session_id(None);
        self.set_theme(None);
    }
}

impl SessionProvider for SessionContext {
    fn session_id(&self) -> Option<String> {
        self.session_id.read().ok().and_then(|s| s.clone())
    }
}
