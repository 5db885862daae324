//! Client-local session context.

use serde::{Deserialize, Serialize};

use crate::message::ANONYMOUS;

/// Who the client is currently signed in as.
///
/// Owned by the session manager and handed by reference to whatever needs
/// the display name, such as the composer when building a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    /// Name stamped on outgoing messages.
    pub display_name: String,
    /// Whether the auth provider currently reports a user.
    pub signed_in: bool,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self {
            display_name: ANONYMOUS.to_string(),
            signed_in: false,
        }
    }
}

impl SessionContext {
    /// Create a signed-out context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the session signed in under the given name.
    ///
    /// Absent or blank names resolve to [`ANONYMOUS`].
    pub fn sign_in(&mut self, display_name: Option<&str>) {
        self.display_name = resolve_display_name(display_name);
        self.signed_in = true;
    }

    /// Reset to the signed-out state.
    pub fn sign_out(&mut self) {
        *self = Self::default();
    }
}

/// Resolve a provider-reported display name to the name shown in the feed.
#[must_use]
pub fn resolve_display_name(display_name: Option<&str>) -> String {
    match display_name.map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => ANONYMOUS.to_string(),
    }
}
