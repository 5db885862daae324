//! Message input box: length cap and send gating.

use thiserror::Error;

use crate::{ChatMessage, SessionContext, message::DEFAULT_MSG_LENGTH_LIMIT};

/// Compose error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ComposeError {
    #[error("Message too long: {attempted} characters exceeds limit of {limit}")]
    TooLong { limit: usize, attempted: usize },
}

/// Text input for new messages.
///
/// Edits that would push the text past the character limit are rejected
/// whole and leave the text unchanged.
#[derive(Debug, Clone)]
pub struct Composer {
    text: String,
    limit: usize,
}

impl Default for Composer {
    fn default() -> Self {
        Self::new(DEFAULT_MSG_LENGTH_LIMIT)
    }
}

impl Composer {
    /// Create an empty composer with the given character limit.
    #[must_use]
    pub const fn new(limit: usize) -> Self {
        Self {
            text: String::new(),
            limit,
        }
    }

    /// Current input text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Character limit.
    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }

    /// Replace the whole input.
    ///
    /// # Errors
    /// Returns error if `text` exceeds the limit.
    pub fn set_text(&mut self, text: impl Into<String>) -> Result<(), ComposeError> {
        let text = text.into();
        self.check(text.chars().count())?;
        self.text = text;
        Ok(())
    }

    /// Append a character at the end of the input.
    ///
    /// # Errors
    /// Returns error if the input is already at the limit.
    pub fn insert(&mut self, c: char) -> Result<(), ComposeError> {
        self.check(self.text.chars().count() + 1)?;
        self.text.push(c);
        Ok(())
    }

    /// Delete the last character, if any.
    pub fn backspace(&mut self) {
        self.text.pop();
    }

    /// Whether the send control is enabled.
    #[must_use]
    pub fn is_send_enabled(&self) -> bool {
        !self.text.trim().is_empty()
    }

    /// Build a message from the input and clear it.
    ///
    /// Returns `None`, leaving the input alone, when send is disabled. The
    /// text is sent as typed, without trimming.
    pub fn take_message(&mut self, ctx: &SessionContext) -> Option<ChatMessage> {
        if !self.is_send_enabled() {
            return None;
        }
        let text = std::mem::take(&mut self.text);
        Some(ChatMessage::new(text, ctx.display_name.clone()))
    }

    /// Clear the input.
    pub fn clear(&mut self) {
        self.text.clear();
    }

    fn check(&self, attempted: usize) -> Result<(), ComposeError> {
        if attempted > self.limit {
            return Err(ComposeError::TooLong {
                limit: self.limit,
                attempted,
            });
        }
        Ok(())
    }
}
