//! Session manager following the auth provider's state.

use std::sync::Arc;

use friendlychat_core::{
    AuthProvider, AuthState, SessionContext, Subscription,
    traits::{AuthError, SignInOutcome, SignInRequest},
};

/// Session manager error.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),
    #[error("Sign in cancelled")]
    SignInCancelled,
    #[error("Sign in failed: {0}")]
    SignInFailed(String),
}

/// What an auth-state notification did to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthTransition {
    /// A user is present; the feed should be attached.
    SignedIn { display_name: String },
    /// Nobody is signed in; the feed should be cleared and sign-in launched.
    SignedOut,
}

/// Session manager tracking who is signed in.
///
/// While active it holds an auth-state subscription. The subscription is
/// released when the manager is deactivated or dropped.
pub struct SessionManager<A> {
    auth: Arc<A>,
    sign_in: SignInRequest,
    context: SessionContext,
    listener: Option<Subscription<AuthState>>,
}

impl<A: AuthProvider> SessionManager<A> {
    /// Create an inactive, signed-out session manager.
    #[must_use]
    pub fn new(auth: Arc<A>, sign_in: SignInRequest) -> Self {
        Self {
            auth,
            sign_in,
            context: SessionContext::default(),
            listener: None,
        }
    }

    /// Current session context.
    #[must_use]
    pub const fn context(&self) -> &SessionContext {
        &self.context
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.listener.is_some()
    }

    /// Subscribe to auth-state changes. No-op when already active.
    ///
    /// # Errors
    /// Returns error if the provider refuses the subscription.
    pub async fn activate(&mut self) -> Result<bool, SessionError> {
        if self.listener.is_some() {
            return Ok(false);
        }
        let listener = self.auth.subscribe().await?;
        tracing::debug!(listener = %listener.id(), "auth listener registered");
        self.listener = Some(listener);
        Ok(true)
    }

    /// Drop the auth-state subscription. No-op when inactive.
    pub fn deactivate(&mut self) -> bool {
        match self.listener.take() {
            Some(listener) => {
                tracing::debug!(listener = %listener.id(), "auth listener removed");
                listener.unsubscribe();
                true
            }
            None => false,
        }
    }

    /// Wait for the next auth-state notification.
    ///
    /// Pends forever while inactive. If the provider closes the stream the
    /// manager deactivates and returns `None`.
    pub async fn next_event(&mut self) -> Option<AuthState> {
        let Some(listener) = self.listener.as_mut() else {
            return std::future::pending().await;
        };
        let state = listener.recv().await;
        if state.is_none() {
            tracing::warn!("auth provider closed the state stream");
            self.deactivate();
        }
        state
    }

    /// Take an already delivered notification without waiting.
    pub fn try_next_event(&mut self) -> Option<AuthState> {
        self.listener.as_mut().and_then(Subscription::try_recv)
    }

    /// Update the session from an auth-state notification.
    pub fn handle(&mut self, state: &AuthState) -> AuthTransition {
        match &state.user {
            Some(user) => {
                self.context.sign_in(user.display_name.as_deref());
                tracing::info!(user = %user.uid, name = %self.context.display_name, "signed in");
                AuthTransition::SignedIn {
                    display_name: self.context.display_name.clone(),
                }
            }
            None => {
                if self.context.signed_in {
                    tracing::info!(name = %self.context.display_name, "signed out");
                }
                self.context.sign_out();
                AuthTransition::SignedOut
            }
        }
    }

    /// Run the external sign-in flow.
    ///
    /// A successful flow is also reported through the auth-state stream;
    /// this only tells whether the user went through with it.
    ///
    /// # Errors
    /// Returns `SignInCancelled` or `SignInFailed` when the flow does not
    /// complete, or the provider's error.
    pub async fn launch_sign_in(&self) -> Result<(), SessionError> {
        tracing::info!(providers = self.sign_in.providers.len(), "launching sign-in flow");
        match self.auth.launch_sign_in(self.sign_in.clone()).await? {
            SignInOutcome::Success => Ok(()),
            SignInOutcome::Cancelled => Err(SessionError::SignInCancelled),
            SignInOutcome::Failed { reason } => Err(SessionError::SignInFailed(reason)),
        }
    }

    /// Ask the provider to sign the user out.
    ///
    /// # Errors
    /// Returns the provider's error.
    pub async fn sign_out(&self) -> Result<(), SessionError> {
        self.auth.sign_out().await?;
        Ok(())
    }
}
