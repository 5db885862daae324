//! Front-end bridges for the chat screen.
//!
//! Provides:
//! - TUI bridge mapping terminal input to screen commands (feature: tui)
//! - View state folded from screen events (feature: tui)

#[cfg(feature = "tui")]
pub mod tui;

#[cfg(feature = "tui")]
pub use tui::{SendError, TuiAction, TuiBridge, TuiState};
