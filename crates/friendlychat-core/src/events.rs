//! Notification payloads delivered by the collaborators.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::traits::DatabaseError;

/// A user as reported by the auth provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    /// Provider-assigned user id.
    pub uid: String,
    /// Display name, if the provider knows one.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Email address, if any.
    #[serde(default)]
    pub email: Option<String>,
}

impl AuthUser {
    /// Create a user with a display name.
    #[must_use]
    pub fn new(uid: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            display_name: Some(display_name.into()),
            email: None,
        }
    }

    /// Create a user without a display name, as anonymous sign-in does.
    #[must_use]
    pub fn anonymous(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            display_name: None,
            email: None,
        }
    }
}

/// Auth-state notification: the current user, or none when signed out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthState {
    pub user: Option<AuthUser>,
}

impl AuthState {
    #[must_use]
    pub const fn signed_in(user: AuthUser) -> Self {
        Self { user: Some(user) }
    }

    #[must_use]
    pub const fn signed_out() -> Self {
        Self { user: None }
    }
}

/// Child event on an ordered collection.
///
/// `previous_key` is the key of the sibling ordered immediately before the
/// child, or `None` when it is first.
#[derive(Debug, Clone, PartialEq)]
pub enum ChildEvent {
    /// A child was appended or replayed on subscription.
    Added {
        key: String,
        value: Value,
        previous_key: Option<String>,
    },
    /// An existing child's value was replaced.
    Changed {
        key: String,
        value: Value,
        previous_key: Option<String>,
    },
    /// A child was deleted.
    Removed { key: String, value: Value },
    /// A child changed position.
    Moved {
        key: String,
        value: Value,
        previous_key: Option<String>,
    },
    /// The listener was revoked, typically for lack of read permission.
    /// No further events follow.
    Cancelled(DatabaseError),
}

impl ChildEvent {
    /// Key of the child this event concerns.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Added { key, .. }
            | Self::Changed { key, .. }
            | Self::Removed { key, .. }
            | Self::Moved { key, .. } => Some(key),
            Self::Cancelled(_) => None,
        }
    }

    /// Short name for logging.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Added { .. } => "added",
            Self::Changed { .. } => "changed",
            Self::Removed { .. } => "removed",
            Self::Moved { .. } => "moved",
            Self::Cancelled(_) => "cancelled",
        }
    }
}
