//! Identity as seen by the sync layer.
//!
//! The coordinator only asks one question: is someone signed in? When nobody
//! is, mutations stay local and no remote call is made.

use parking_lot::RwLock;

use crate::domain::UserId;

/// Source of the current user.
pub trait Session: Send + Sync {
    /// The signed-in user, if any.
    fn user_id(&self) -> Option<UserId>;

    /// Returns `true` when a user is signed in.
    fn is_authenticated(&self) -> bool {
        self.user_id().is_some()
    }
}

/// A session whose user never changes.
#[derive(Debug, Clone, Default)]
pub struct StaticSession {
    user_id: Option<UserId>,
}

impl StaticSession {
    #[must_use]
    pub const fn authenticated(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
        }
    }

    #[must_use]
    pub const fn anonymous() -> Self {
        Self { user_id: None }
    }
}

impl Session for StaticSession {
    fn user_id(&self) -> Option<UserId> {
        self.user_id.clone()
    }
}

/// A session that can sign in and out at runtime.
#[derive(Debug, Default)]
pub struct SharedSession {
    user_id: RwLock<Option<UserId>>,
}

impl SharedSession {
    #[must_use]
    pub fn new(user_id: Option<UserId>) -> Self {
        Self {
            user_id: RwLock::new(user_id),
        }
    }

    pub fn sign_in(&self, user_id: UserId) {
        tracing::info!(user_id = %user_id, "Signed in");
        *self.user_id.write() = Some(user_id);
    }

    pub fn sign_out(&self) {
        tracing::info!("Signed out");
        *self.user_id.write() = None;
    }
}

impl Session for SharedSession {
    fn user_id(&self) -> Option<UserId> {
        self.user_id.read().clone()
    }
}
