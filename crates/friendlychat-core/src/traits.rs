//! Collaborator traits for authentication and the realtime database.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{
    events::{AuthState, ChildEvent},
    subscription::Subscription,
};

/// Identity provider offered by the sign-in flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignInProvider {
    /// Federated OAuth provider, e.g. `google.com`.
    #[serde(rename = "oauth")]
    OAuth { provider_id: String },
    /// Email and password.
    EmailPassword,
    /// Anonymous guest account.
    Anonymous,
}

/// Parameters for launching the external sign-in flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignInRequest {
    /// Providers the user may pick from, in display order.
    pub providers: Vec<SignInProvider>,
    /// Whether the flow may save and auto-fill credentials.
    pub credential_caching: bool,
}

impl Default for SignInRequest {
    fn default() -> Self {
        Self {
            providers: vec![
                SignInProvider::OAuth {
                    provider_id: "google.com".to_string(),
                },
                SignInProvider::EmailPassword,
                SignInProvider::Anonymous,
            ],
            credential_caching: false,
        }
    }
}

/// How the external sign-in flow ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SignInOutcome {
    /// A user signed in. The provider also reports it as an auth-state change.
    Success,
    /// The user backed out of the flow.
    Cancelled,
    /// The flow failed.
    Failed { reason: String },
}

/// Auth provider error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Auth provider unavailable: {0}")]
    Unavailable(String),
    #[error("Auth error: {0}")]
    Internal(String),
}

/// Realtime database error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DatabaseError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Database disconnected")]
    Disconnected,
    #[error("Database error: {0}")]
    Internal(String),
}

/// Trait for the external authentication service.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Register an auth-state listener.
    ///
    /// The current state is delivered immediately, then every change.
    /// Dropping the returned handle removes the listener.
    async fn subscribe(&self) -> Result<Subscription<AuthState>, AuthError>;

    /// Run the interactive sign-in flow and report how it ended.
    async fn launch_sign_in(&self, request: SignInRequest) -> Result<SignInOutcome, AuthError>;

    /// Sign the current user out.
    async fn sign_out(&self) -> Result<(), AuthError>;
}

/// Trait for the external realtime database.
#[async_trait]
pub trait RealtimeDatabase: Send + Sync {
    /// Append a value under `path` with a generated, chronologically
    /// ordered key. Returns the key.
    async fn push(&self, path: &str, value: Value) -> Result<String, DatabaseError>;

    /// Register a child-event listener on the collection at `path`.
    ///
    /// Existing children are replayed as [`ChildEvent::Added`] in key
    /// order before live events. Dropping the handle removes the listener.
    async fn subscribe_child_events(
        &self,
        path: &str,
    ) -> Result<Subscription<ChildEvent>, DatabaseError>;
}
