//! Session handling and message feed synchronization for FriendlyChat.
//!
//! Provides:
//! - `SessionManager` - Follow auth state and drive the sign-in flow
//! - `FeedSynchronizer` - Mirror the remote message collection locally
//! - `ChatScreen` - Single dispatch loop tying both to user commands
//! - In-memory auth and database backends (feature: memory)

pub mod backend;
pub mod manager;
pub mod screen;
pub mod synchronizer;

pub use manager::{AuthTransition, SessionError, SessionManager};
pub use screen::{ChatScreen, CloseReason, Notice, ScreenCommand, ScreenError, ScreenEvent};
pub use synchronizer::{FeedChange, FeedSynchronizer, SyncError};
