//! Core abstractions for the FriendlyChat client.
//!
//! This crate provides the fundamental building blocks:
//! - `ChatMessage` - The message record and its wire form
//! - `SessionContext` - Who the client is currently signed in as
//! - `MessageFeed` - Local ordered message list with live updates
//! - `Composer` - Input box with length cap and send gating
//! - `AuthProvider` and `RealtimeDatabase` collaborator traits
//! - `ChatConfig` - Client configuration

pub mod compose;
pub mod config;
pub mod context;
pub mod events;
pub mod feed;
pub mod message;
pub mod subscription;
pub mod traits;

pub use compose::{ComposeError, Composer};
pub use config::{ChatConfig, ConfigError};
pub use context::SessionContext;
pub use events::{AuthState, AuthUser, ChildEvent};
pub use feed::{FeedUpdate, MessageFeed};
pub use message::{ANONYMOUS, ChatMessage, DEFAULT_MSG_LENGTH_LIMIT};
pub use subscription::{ListenerId, Subscription};
pub use traits::{AuthProvider, RealtimeDatabase};
