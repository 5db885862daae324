//! Local message feed with broadcast of changes to views.

use std::sync::{PoisonError, RwLock};

use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::ChatMessage;

/// Capacity of the live update channel.
const UPDATE_CAPACITY: usize = 1024;

/// Change to the local feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedUpdate {
    /// A message was appended at `index`.
    Appended { index: usize, message: ChatMessage },
    /// The feed was emptied.
    Cleared,
}

/// Ordered, append-only list of messages mirrored from the remote collection.
///
/// Views take a snapshot and then follow live updates; the list itself is
/// only mutated by the synchronizer.
pub struct MessageFeed {
    messages: RwLock<Vec<ChatMessage>>,
    sender: broadcast::Sender<FeedUpdate>,
}

impl Default for MessageFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageFeed {
    /// Create an empty feed.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(UPDATE_CAPACITY);
        Self {
            messages: RwLock::new(Vec::with_capacity(32)),
            sender,
        }
    }

    /// Append a message to the end of the feed. Returns its index.
    pub fn append(&self, message: ChatMessage) -> usize {
        // Broadcast under the write lock so views see updates in list order.
        let mut messages = self.messages.write().unwrap_or_else(PoisonError::into_inner);
        messages.push(message.clone());
        let index = messages.len() - 1;
        let _ = self.sender.send(FeedUpdate::Appended { index, message });
        index
    }

    /// Remove every message.
    pub fn clear(&self) {
        let mut messages = self.messages.write().unwrap_or_else(PoisonError::into_inner);
        if !messages.is_empty() {
            messages.clear();
            let _ = self.sender.send(FeedUpdate::Cleared);
        }
    }

    /// Number of messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the current messages, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.messages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Get a receiver for live updates.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<FeedUpdate> {
        self.sender.subscribe()
    }

    /// Stream that yields the current messages as `Appended`, then live updates.
    #[must_use]
    pub fn snapshot_plus_stream(&self) -> futures::stream::BoxStream<'static, FeedUpdate> {
        // Subscribe under the read lock so nothing lands between snapshot and stream.
        let (snapshot, rx) = {
            let messages = self.messages.read().unwrap_or_else(PoisonError::into_inner);
            (messages.clone(), self.sender.subscribe())
        };

        let hist = futures::stream::iter(
            snapshot
                .into_iter()
                .enumerate()
                .map(|(index, message)| FeedUpdate::Appended { index, message }),
        );
        let live = BroadcastStream::new(rx).filter_map(|res| async move {
            match res {
                Ok(update) => Some(update),
                Err(e) => {
                    tracing::warn!("feed view fell behind: {e}");
                    None
                }
            }
        });

        Box::pin(hist.chain(live))
    }
}
