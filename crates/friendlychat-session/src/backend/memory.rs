//! In-memory auth provider and realtime database.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use async_trait::async_trait;
use friendlychat_core::{
    AuthProvider, AuthState, AuthUser, ChildEvent, ListenerId, RealtimeDatabase, Subscription,
    traits::{AuthError, DatabaseError, SignInOutcome, SignInRequest},
};
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

struct Child {
    key: String,
    value: Value,
}

struct ChildListener {
    id: ListenerId,
    path: String,
    tx: mpsc::UnboundedSender<ChildEvent>,
}

#[derive(Default)]
struct DatabaseInner {
    collections: HashMap<String, Vec<Child>>,
    listeners: Vec<ChildListener>,
    denied: HashSet<String>,
    key_counter: u64,
}

impl DatabaseInner {
    fn next_key(&mut self) -> String {
        self.key_counter += 1;
        format!("{:016x}", self.key_counter)
    }

    /// Deliver to every listener on `path`, dropping those whose handle is gone.
    fn notify(&mut self, path: &str, event: &ChildEvent) {
        self.listeners
            .retain(|l| l.path != path || l.tx.send(event.clone()).is_ok());
    }
}

fn previous_key(children: &[Child], index: usize) -> Option<String> {
    index
        .checked_sub(1)
        .and_then(|i| children.get(i))
        .map(|c| c.key.clone())
}

/// In-memory realtime database.
///
/// Useful for development and tests. Children are kept in key order, and
/// pushed keys increase monotonically so pushes stay in arrival order.
/// Data is lost on drop.
#[derive(Clone, Default)]
pub struct MemoryDatabase {
    inner: Arc<Mutex<DatabaseInner>>,
}

impl MemoryDatabase {
    /// Create an empty database.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, DatabaseInner>, DatabaseError> {
        self.inner
            .lock()
            .map_err(|e| DatabaseError::Internal(e.to_string()))
    }

    /// Write `value` under `key`, replacing any existing child.
    ///
    /// Emits `Changed` for an existing key and `Added` otherwise.
    ///
    /// # Errors
    /// Returns error if writes to `path` are denied.
    pub fn set_child(&self, path: &str, key: &str, value: Value) -> Result<(), DatabaseError> {
        let mut inner = self.lock()?;
        if inner.denied.contains(path) {
            return Err(DatabaseError::PermissionDenied(path.to_string()));
        }

        let children = inner.collections.entry(path.to_string()).or_default();
        let event = match children.binary_search_by(|c| c.key.as_str().cmp(key)) {
            Ok(index) => {
                children[index].value = value.clone();
                ChildEvent::Changed {
                    key: key.to_string(),
                    value,
                    previous_key: previous_key(children, index),
                }
            }
            Err(index) => {
                children.insert(
                    index,
                    Child {
                        key: key.to_string(),
                        value: value.clone(),
                    },
                );
                ChildEvent::Added {
                    key: key.to_string(),
                    value,
                    previous_key: previous_key(children, index),
                }
            }
        };
        inner.notify(path, &event);
        Ok(())
    }

    /// Delete a child. Returns its value if it existed.
    ///
    /// # Errors
    /// Returns error if writes to `path` are denied.
    pub fn remove_child(&self, path: &str, key: &str) -> Result<Option<Value>, DatabaseError> {
        let mut inner = self.lock()?;
        if inner.denied.contains(path) {
            return Err(DatabaseError::PermissionDenied(path.to_string()));
        }

        let Some(children) = inner.collections.get_mut(path) else {
            return Ok(None);
        };
        let Ok(index) = children.binary_search_by(|c| c.key.as_str().cmp(key)) else {
            return Ok(None);
        };
        let removed = children.remove(index);
        inner.notify(
            path,
            &ChildEvent::Removed {
                key: removed.key,
                value: removed.value.clone(),
            },
        );
        Ok(Some(removed.value))
    }

    /// Revoke access to `path`: reads are cancelled and writes refused.
    ///
    /// Current listeners receive `Cancelled` and are dropped; later
    /// subscriptions are cancelled immediately.
    ///
    /// # Errors
    /// Returns error if the database lock is poisoned.
    pub fn revoke_access(&self, path: &str) -> Result<(), DatabaseError> {
        let mut inner = self.lock()?;
        inner.denied.insert(path.to_string());
        let error = DatabaseError::PermissionDenied(path.to_string());
        inner.listeners.retain(|l| {
            if l.path == path {
                let _ = l.tx.send(ChildEvent::Cancelled(error.clone()));
                false
            } else {
                true
            }
        });
        Ok(())
    }

    /// Restore access to `path`.
    ///
    /// # Errors
    /// Returns error if the database lock is poisoned.
    pub fn grant_access(&self, path: &str) -> Result<(), DatabaseError> {
        self.lock()?.denied.remove(path);
        Ok(())
    }

    /// Children under `path` as `(key, value)`, in key order.
    #[must_use]
    pub fn children(&self, path: &str) -> Vec<(String, Value)> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner
            .collections
            .get(path)
            .map(|children| {
                children
                    .iter()
                    .map(|c| (c.key.clone(), c.value.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of live listeners on `path`.
    #[must_use]
    pub fn listener_count(&self, path: &str) -> usize {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner
            .listeners
            .iter()
            .filter(|l| l.path == path && !l.tx.is_closed())
            .count()
    }
}

fn release_child_listener(inner: Weak<Mutex<DatabaseInner>>) -> impl FnOnce(ListenerId) + Send + Sync {
    move |id| {
        if let Some(inner) = inner.upgrade() {
            let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner.listeners.retain(|l| l.id != id);
        }
    }
}

#[async_trait]
impl RealtimeDatabase for MemoryDatabase {
    async fn push(&self, path: &str, value: Value) -> Result<String, DatabaseError> {
        let mut inner = self.lock()?;
        if inner.denied.contains(path) {
            return Err(DatabaseError::PermissionDenied(path.to_string()));
        }

        let key = inner.next_key();
        let children = inner.collections.entry(path.to_string()).or_default();
        let previous_key = children.last().map(|c| c.key.clone());
        children.push(Child {
            key: key.clone(),
            value: value.clone(),
        });
        inner.notify(
            path,
            &ChildEvent::Added {
                key: key.clone(),
                value,
                previous_key,
            },
        );
        Ok(key)
    }

    async fn subscribe_child_events(
        &self,
        path: &str,
    ) -> Result<Subscription<ChildEvent>, DatabaseError> {
        let mut inner = self.lock()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();

        if inner.denied.contains(path) {
            let _ = tx.send(ChildEvent::Cancelled(DatabaseError::PermissionDenied(
                path.to_string(),
            )));
            return Ok(Subscription::new(id, rx, |_| {}));
        }

        if let Some(children) = inner.collections.get(path) {
            for (index, child) in children.iter().enumerate() {
                let _ = tx.send(ChildEvent::Added {
                    key: child.key.clone(),
                    value: child.value.clone(),
                    previous_key: previous_key(children, index),
                });
            }
        }
        inner.listeners.push(ChildListener {
            id,
            path: path.to_string(),
            tx,
        });

        Ok(Subscription::new(
            id,
            rx,
            release_child_listener(Arc::downgrade(&self.inner)),
        ))
    }
}

/// Scripted result for the next [`MemoryAuth::launch_sign_in`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedSignIn {
    /// Sign this user in.
    Succeed(AuthUser),
    /// Back out of the flow.
    Cancel,
    /// Fail with a reason.
    Fail(String),
}

#[derive(Default)]
struct AuthInner {
    user: Option<AuthUser>,
    listeners: Vec<(ListenerId, mpsc::UnboundedSender<AuthState>)>,
    script: VecDeque<ScriptedSignIn>,
    requests: Vec<SignInRequest>,
}

impl AuthInner {
    fn set_user(&mut self, user: Option<AuthUser>) {
        self.user = user;
        let state = AuthState {
            user: self.user.clone(),
        };
        self.listeners
            .retain(|(_, tx)| tx.send(state.clone()).is_ok());
    }
}

/// In-memory auth provider.
///
/// The sign-in flow is scripted: each call to `launch_sign_in` consumes
/// the next [`ScriptedSignIn`], and an empty script behaves like the user
/// backing out.
#[derive(Clone, Default)]
pub struct MemoryAuth {
    inner: Arc<Mutex<AuthInner>>,
}

impl MemoryAuth {
    /// Create a provider with nobody signed in.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a provider with `user` already signed in.
    #[must_use]
    pub fn with_user(user: AuthUser) -> Self {
        let auth = Self::default();
        auth.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .user = Some(user);
        auth
    }

    fn lock(&self) -> Result<MutexGuard<'_, AuthInner>, AuthError> {
        self.inner
            .lock()
            .map_err(|e| AuthError::Internal(e.to_string()))
    }

    /// Queue the result of a future sign-in flow.
    pub fn script_sign_in(&self, outcome: ScriptedSignIn) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .script
            .push_back(outcome);
    }

    /// Change the current user out of band, notifying listeners.
    pub fn set_user(&self, user: Option<AuthUser>) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set_user(user);
    }

    /// Currently signed-in user.
    #[must_use]
    pub fn current_user(&self) -> Option<AuthUser> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .user
            .clone()
    }

    /// Every sign-in request received so far.
    #[must_use]
    pub fn sign_in_requests(&self) -> Vec<SignInRequest> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .requests
            .clone()
    }

    /// Number of live auth-state listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .listeners
            .iter()
            .filter(|(_, tx)| !tx.is_closed())
            .count()
    }
}

#[async_trait]
impl AuthProvider for MemoryAuth {
    async fn subscribe(&self) -> Result<Subscription<AuthState>, AuthError> {
        let mut inner = self.lock()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();

        let _ = tx.send(AuthState {
            user: inner.user.clone(),
        });
        inner.listeners.push((id, tx));

        let weak = Arc::downgrade(&self.inner);
        Ok(Subscription::new(id, rx, move |id| {
            if let Some(inner) = weak.upgrade() {
                let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
                inner.listeners.retain(|(listener, _)| *listener != id);
            }
        }))
    }

    async fn launch_sign_in(&self, request: SignInRequest) -> Result<SignInOutcome, AuthError> {
        let mut inner = self.lock()?;
        inner.requests.push(request);

        match inner.script.pop_front() {
            Some(ScriptedSignIn::Succeed(user)) => {
                inner.set_user(Some(user));
                Ok(SignInOutcome::Success)
            }
            Some(ScriptedSignIn::Fail(reason)) => Ok(SignInOutcome::Failed { reason }),
            Some(ScriptedSignIn::Cancel) | None => Ok(SignInOutcome::Cancelled),
        }
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        let mut inner = self.lock()?;
        // Only a real change is reported, matching provider behavior.
        if inner.user.is_some() {
            inner.set_user(None);
        }
        Ok(())
    }
}
