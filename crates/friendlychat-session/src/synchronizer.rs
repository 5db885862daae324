//! Mirror of the remote message collection into the local feed.

use std::sync::Arc;

use friendlychat_core::{
    ChatMessage, ChildEvent, MessageFeed, RealtimeDatabase, Subscription,
    traits::DatabaseError,
};

/// Synchronizer error.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Effect of one child event on the local feed.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedChange {
    /// The message was appended at `index`.
    Appended { index: usize },
    /// The event was received but does not alter the feed.
    Unchanged,
    /// The payload was not a message and was skipped.
    Malformed,
    /// The synchronizer is detached; the event was dropped.
    Ignored,
    /// The database revoked the listener.
    Cancelled(DatabaseError),
}

/// Keeps a [`MessageFeed`] in step with an append-only remote collection.
///
/// Only additions are mirrored. Changed, removed and moved children are
/// acknowledged without touching the feed, so local positions never shift
/// under the reader.
pub struct FeedSynchronizer<D> {
    database: Arc<D>,
    path: String,
    feed: Arc<MessageFeed>,
    listener: Option<Subscription<ChildEvent>>,
}

impl<D: RealtimeDatabase> FeedSynchronizer<D> {
    /// Create a detached synchronizer for the collection at `path`.
    #[must_use]
    pub fn new(database: Arc<D>, path: impl Into<String>, feed: Arc<MessageFeed>) -> Self {
        Self {
            database,
            path: path.into(),
            feed,
            listener: None,
        }
    }

    /// The feed this synchronizer fills.
    #[must_use]
    pub fn feed(&self) -> &Arc<MessageFeed> {
        &self.feed
    }

    #[must_use]
    pub const fn is_attached(&self) -> bool {
        self.listener.is_some()
    }

    /// Register the child listener.
    ///
    /// Returns `false` without registering a second listener when already
    /// attached.
    ///
    /// # Errors
    /// Returns error if the database refuses the subscription.
    pub async fn attach(&mut self) -> Result<bool, SyncError> {
        if self.listener.is_some() {
            return Ok(false);
        }
        let listener = self.database.subscribe_child_events(&self.path).await?;
        tracing::debug!(path = %self.path, listener = %listener.id(), "attached feed listener");
        self.listener = Some(listener);
        Ok(true)
    }

    /// Deregister the listener and empty the feed.
    ///
    /// Returns `false` and leaves the feed alone when not attached.
    pub fn detach(&mut self) -> bool {
        let Some(listener) = self.listener.take() else {
            return false;
        };
        tracing::debug!(path = %self.path, listener = %listener.id(), "detached feed listener");
        listener.unsubscribe();
        self.feed.clear();
        true
    }

    /// Wait for the next child event.
    ///
    /// Pends forever while detached. If the database closes the listener,
    /// the synchronizer detaches itself and returns `None`.
    pub async fn next_event(&mut self) -> Option<ChildEvent> {
        let Some(listener) = self.listener.as_mut() else {
            return std::future::pending().await;
        };
        let event = listener.recv().await;
        if event.is_none() {
            tracing::warn!(path = %self.path, "feed listener closed by database");
            self.detach();
        }
        event
    }

    /// Take an already delivered event without waiting.
    pub fn try_next_event(&mut self) -> Option<ChildEvent> {
        self.listener.as_mut().and_then(Subscription::try_recv)
    }

    /// Apply one child event to the feed.
    pub fn apply(&mut self, event: ChildEvent) -> FeedChange {
        if self.listener.is_none() {
            tracing::debug!(kind = event.kind(), "dropping child event while detached");
            return FeedChange::Ignored;
        }

        match event {
            ChildEvent::Added { key, value, .. } => match ChatMessage::from_value(&value) {
                Ok(message) => FeedChange::Appended {
                    index: self.feed.append(message),
                },
                Err(e) => {
                    tracing::warn!(%key, "skipping malformed message: {e}");
                    FeedChange::Malformed
                }
            },
            ChildEvent::Changed { key, .. }
            | ChildEvent::Removed { key, .. }
            | ChildEvent::Moved { key, .. } => {
                tracing::debug!(%key, "ignoring child update on append-only feed");
                FeedChange::Unchanged
            }
            ChildEvent::Cancelled(error) => {
                tracing::warn!(path = %self.path, "feed listener cancelled: {error}");
                FeedChange::Cancelled(error)
            }
        }
    }
}

impl<D> Drop for FeedSynchronizer<D> {
    fn drop(&mut self) {
        if self.listener.take().is_some() {
            self.feed.clear();
        }
    }
}
