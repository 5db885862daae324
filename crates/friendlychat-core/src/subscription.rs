//! Listener registration handle.

use std::fmt;

use tokio::sync::mpsc;
use uuid::Uuid;

/// Listener identifier assigned by a collaborator.
pub type ListenerId = Uuid;

type Release = Box<dyn FnOnce(ListenerId) + Send + Sync>;

/// A registered listener and the events delivered to it.
///
/// Dropping the handle deregisters the listener, so a listener can never
/// outlive the code that registered it. [`Subscription::unsubscribe`] does
/// the same explicitly.
pub struct Subscription<T> {
    id: ListenerId,
    events: mpsc::UnboundedReceiver<T>,
    release: Option<Release>,
}

impl<T> Subscription<T> {
    /// Wrap a receiver and the hook that deregisters it.
    pub fn new(
        id: ListenerId,
        events: mpsc::UnboundedReceiver<T>,
        release: impl FnOnce(ListenerId) + Send + Sync + 'static,
    ) -> Self {
        Self {
            id,
            events,
            release: Some(Box::new(release)),
        }
    }

    /// Listener id.
    #[must_use]
    pub const fn id(&self) -> ListenerId {
        self.id
    }

    /// Wait for the next event.
    ///
    /// Returns `None` once the collaborator has dropped its side.
    pub async fn recv(&mut self) -> Option<T> {
        self.events.recv().await
    }

    /// Take an already delivered event without waiting.
    pub fn try_recv(&mut self) -> Option<T> {
        self.events.try_recv().ok()
    }

    /// Deregister the listener now.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.events.close();
        if let Some(release) = self.release.take() {
            release(self.id);
        }
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;

    #[tokio::test]
    async fn test_drop_releases_once() {
        let released = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::unbounded_channel::<u32>();
        let counter = Arc::clone(&released);
        let mut sub = Subscription::new(Uuid::new_v4(), rx, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tx.send(7).unwrap();
        assert_eq!(sub.recv().await, Some(7));
        sub.unsubscribe();

        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert!(tx.send(8).is_err());
    }

    #[test]
    fn test_handle_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Subscription<u32>>();
    }

    #[test]
    fn test_release_receives_own_id() {
        let seen = Arc::new(std::sync::Mutex::new(None));
        let (_tx, rx) = mpsc::unbounded_channel::<()>();
        let id = Uuid::new_v4();
        let slot = Arc::clone(&seen);
        drop(Subscription::new(id, rx, move |released| {
            *slot.lock().unwrap() = Some(released);
        }));
        assert_eq!(*seen.lock().unwrap(), Some(id));
    }
}
