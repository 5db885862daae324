//! Chat screen: one dispatch loop over auth, feed and user commands.

use std::{fmt, sync::Arc};

use friendlychat_core::{
    AuthProvider, AuthState, ChatConfig, ChatMessage, ChildEvent, Composer, MessageFeed,
    RealtimeDatabase, SessionContext,
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::{
    manager::{AuthTransition, SessionError, SessionManager},
    synchronizer::{FeedChange, FeedSynchronizer},
};

/// User action on the chat screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScreenCommand {
    /// Type a character at the end of the input.
    Insert { c: char },
    /// Delete the last input character.
    Backspace,
    /// Replace the whole input, e.g. on paste.
    SetInput { text: String },
    /// Send the input as a message.
    Send,
    /// Sign the current user out.
    SignOut,
    /// Leave the screen.
    Close,
}

/// Transient notification for the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Notice {
    Welcome,
    SignedIn,
    SignInCancelled,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Welcome => "You're now signed in. Welcome to FriendlyChat !",
            Self::SignedIn => "Signed in!",
            Self::SignInCancelled => "Sign in canceled",
        })
    }
}

/// Why the screen closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum CloseReason {
    /// The user closed the screen.
    UserClosed,
    /// The user backed out of the sign-in flow.
    SignInCancelled,
    /// The sign-in flow failed.
    SignInFailed { message: String },
}

/// State change for the view to render.
///
/// Messages are not carried here; views read them from the screen's
/// [`MessageFeed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScreenEvent {
    /// Input text and send-button state after an edit or send.
    InputChanged { text: String, send_enabled: bool },
    /// An edit was refused because it would exceed the character limit.
    InputRejected { limit: usize },
    SignedIn { display_name: String },
    SignedOut,
    Notice { notice: Notice },
    Closed { reason: CloseReason },
}

/// Screen error.
#[derive(Debug, thiserror::Error)]
pub enum ScreenError {
    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

enum Dispatch {
    Auth(Option<AuthState>),
    Feed(Option<ChildEvent>),
    Command(Option<ScreenCommand>),
}

/// The chat screen.
///
/// Owns the session manager, the feed synchronizer and the composer, and
/// applies every input to them from a single loop. Sign-in gates the feed:
/// it is attached while a user is signed in and detached and cleared
/// otherwise.
pub struct ChatScreen<A, D> {
    session: SessionManager<A>,
    sync: FeedSynchronizer<D>,
    composer: Composer,
    database: Arc<D>,
    messages_path: String,
    events: mpsc::UnboundedSender<ScreenEvent>,
}

impl<A, D> ChatScreen<A, D>
where
    A: AuthProvider,
    D: RealtimeDatabase,
{
    /// Create a paused screen. Returns it with the receiver for view events.
    #[must_use]
    pub fn new(
        auth: Arc<A>,
        database: Arc<D>,
        config: &ChatConfig,
    ) -> (Self, mpsc::UnboundedReceiver<ScreenEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let feed = Arc::new(MessageFeed::new());
        let screen = Self {
            session: SessionManager::new(auth, config.sign_in.clone()),
            sync: FeedSynchronizer::new(Arc::clone(&database), config.messages_path.clone(), feed),
            composer: Composer::new(config.message_length_limit),
            database,
            messages_path: config.messages_path.clone(),
            events,
        };
        (screen, rx)
    }

    /// The message list shown by this screen.
    #[must_use]
    pub fn feed(&self) -> Arc<MessageFeed> {
        Arc::clone(self.sync.feed())
    }

    #[must_use]
    pub const fn context(&self) -> &SessionContext {
        self.session.context()
    }

    #[must_use]
    pub const fn composer(&self) -> &Composer {
        &self.composer
    }

    #[must_use]
    pub const fn is_feed_attached(&self) -> bool {
        self.sync.is_attached()
    }

    /// Start following auth state.
    ///
    /// # Errors
    /// Returns error if the auth provider refuses the subscription.
    pub async fn resume(&mut self) -> Result<(), ScreenError> {
        self.session.activate().await?;
        Ok(())
    }

    /// Stop following auth state, detach the feed and clear it.
    pub fn pause(&mut self) {
        self.session.deactivate();
        self.sync.detach();
    }

    /// Run the screen until it closes.
    ///
    /// The screen is paused on the way out whatever the result.
    ///
    /// # Errors
    /// Returns error if a collaborator fails in a way the screen cannot
    /// carry on from.
    pub async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<ScreenCommand>,
    ) -> Result<CloseReason, ScreenError> {
        self.resume().await?;
        let result = self.dispatch(&mut commands).await;
        self.pause();

        match &result {
            Ok(reason) => {
                tracing::info!(?reason, "chat screen closed");
                self.emit(ScreenEvent::Closed {
                    reason: reason.clone(),
                });
            }
            Err(e) => tracing::error!("chat screen failed: {e}"),
        }
        result
    }

    async fn dispatch(
        &mut self,
        commands: &mut mpsc::UnboundedReceiver<ScreenCommand>,
    ) -> Result<CloseReason, ScreenError> {
        loop {
            let next = tokio::select! {
                biased;
                state = self.session.next_event() => Dispatch::Auth(state),
                event = self.sync.next_event() => Dispatch::Feed(event),
                command = commands.recv() => Dispatch::Command(command),
            };

            let closed = match next {
                Dispatch::Auth(Some(state)) => self.handle_auth_state(&state).await?,
                Dispatch::Feed(Some(event)) => {
                    self.handle_child_event(event);
                    None
                }
                Dispatch::Auth(None) | Dispatch::Feed(None) => None,
                Dispatch::Command(Some(command)) => self.handle_command(command).await,
                Dispatch::Command(None) => Some(CloseReason::UserClosed),
            };
            if let Some(reason) = closed {
                return Ok(reason);
            }
        }
    }

    /// Handle every auth notification and child event already delivered,
    /// without waiting for more.
    ///
    /// # Errors
    /// Same as [`ChatScreen::handle_auth_state`].
    pub async fn process_pending(&mut self) -> Result<Option<CloseReason>, ScreenError> {
        loop {
            if let Some(state) = self.session.try_next_event() {
                if let Some(reason) = self.handle_auth_state(&state).await? {
                    return Ok(Some(reason));
                }
            } else if let Some(event) = self.sync.try_next_event() {
                self.handle_child_event(event);
            } else {
                return Ok(None);
            }
        }
    }

    /// Apply an auth-state notification.
    ///
    /// Signing in attaches the feed; if the database refuses the listener
    /// the user stays signed in with an empty feed. Signing out detaches and
    /// clears it, then launches the sign-in flow once; a cancelled or failed
    /// flow closes the screen.
    ///
    /// # Errors
    /// Returns error if the auth provider cannot be reached.
    pub async fn handle_auth_state(
        &mut self,
        state: &AuthState,
    ) -> Result<Option<CloseReason>, ScreenError> {
        match self.session.handle(state) {
            AuthTransition::SignedIn { display_name } => {
                if let Err(e) = self.sync.attach().await {
                    tracing::warn!(path = %self.messages_path, "feed unavailable: {e}");
                }
                self.emit(ScreenEvent::SignedIn { display_name });
                self.emit(ScreenEvent::Notice {
                    notice: Notice::Welcome,
                });
                Ok(None)
            }
            AuthTransition::SignedOut => {
                self.sync.detach();
                self.emit(ScreenEvent::SignedOut);

                match self.session.launch_sign_in().await {
                    Ok(()) => {
                        self.emit(ScreenEvent::Notice {
                            notice: Notice::SignedIn,
                        });
                        Ok(None)
                    }
                    Err(SessionError::SignInCancelled) => {
                        self.emit(ScreenEvent::Notice {
                            notice: Notice::SignInCancelled,
                        });
                        Ok(Some(CloseReason::SignInCancelled))
                    }
                    Err(SessionError::SignInFailed(message)) => {
                        tracing::warn!("sign-in failed: {message}");
                        Ok(Some(CloseReason::SignInFailed { message }))
                    }
                    Err(e) => Err(e.into()),
                }
            }
        }
    }

    /// Apply a child event from the message collection.
    pub fn handle_child_event(&mut self, event: ChildEvent) -> FeedChange {
        self.sync.apply(event)
    }

    /// Apply a user command. Returns the close reason if it closes the screen.
    pub async fn handle_command(&mut self, command: ScreenCommand) -> Option<CloseReason> {
        match command {
            ScreenCommand::Insert { c } => {
                let edit = self.composer.insert(c);
                self.after_edit(edit);
            }
            ScreenCommand::SetInput { text } => {
                let edit = self.composer.set_text(text);
                self.after_edit(edit);
            }
            ScreenCommand::Backspace => {
                self.composer.backspace();
                self.emit_input();
            }
            ScreenCommand::Send => {
                if let Some(message) = self.composer.take_message(self.session.context()) {
                    self.emit_input();
                    self.push(message).await;
                }
            }
            ScreenCommand::SignOut => {
                if let Err(e) = self.session.sign_out().await {
                    tracing::warn!("sign-out failed: {e}");
                }
            }
            ScreenCommand::Close => return Some(CloseReason::UserClosed),
        }
        None
    }

    /// Push without waiting on the outcome beyond logging it.
    async fn push(&self, message: ChatMessage) {
        let value = match message.to_value() {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("could not encode message: {e}");
                return;
            }
        };
        match self.database.push(&self.messages_path, value).await {
            Ok(key) => tracing::debug!(%key, "message pushed"),
            Err(e) => tracing::warn!(path = %self.messages_path, "message push failed: {e}"),
        }
    }

    fn after_edit(&self, edit: Result<(), friendlychat_core::ComposeError>) {
        match edit {
            Ok(()) => self.emit_input(),
            Err(e) => {
                tracing::debug!("input rejected: {e}");
                self.emit(ScreenEvent::InputRejected {
                    limit: self.composer.limit(),
                });
            }
        }
    }

    fn emit_input(&self) {
        self.emit(ScreenEvent::InputChanged {
            text: self.composer.text().to_string(),
            send_enabled: self.composer.is_send_enabled(),
        });
    }

    fn emit(&self, event: ScreenEvent) {
        // The view may already be gone.
        let _ = self.events.send(event);
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use friendlychat_core::{ANONYMOUS, AuthUser};
    use serde_json::json;

    use super::*;
    use crate::backend::{MemoryAuth, MemoryDatabase, ScriptedSignIn};

    const PATH: &str = "messages";

    type Screen = ChatScreen<MemoryAuth, MemoryDatabase>;

    fn screen(
        auth: &Arc<MemoryAuth>,
        db: &Arc<MemoryDatabase>,
    ) -> (Screen, mpsc::UnboundedReceiver<ScreenEvent>) {
        ChatScreen::new(Arc::clone(auth), Arc::clone(db), &ChatConfig::default())
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ScreenEvent>) -> Vec<ScreenEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    async fn seed(db: &MemoryDatabase, texts: &[&str]) {
        for text in texts {
            let value = ChatMessage::new(*text, "seed").to_value().unwrap();
            db.push(PATH, value).await.unwrap();
        }
    }

    fn texts(screen: &Screen) -> Vec<String> {
        screen.feed().snapshot().into_iter().map(|m| m.text).collect()
    }

    #[tokio::test]
    async fn test_signed_in_user_sees_feed() {
        let auth = Arc::new(MemoryAuth::with_user(AuthUser::new("u1", "Ada")));
        let db = Arc::new(MemoryDatabase::new());
        seed(&db, &["hello", "world"]).await;
        let (mut screen, mut rx) = screen(&auth, &db);

        screen.resume().await.unwrap();
        assert_eq!(screen.process_pending().await.unwrap(), None);

        assert!(screen.is_feed_attached());
        assert_eq!(texts(&screen), ["hello", "world"]);
        assert_eq!(screen.context().display_name, "Ada");
        assert_eq!(
            drain(&mut rx),
            vec![
                ScreenEvent::SignedIn {
                    display_name: "Ada".to_string()
                },
                ScreenEvent::Notice {
                    notice: Notice::Welcome
                },
            ]
        );
        assert!(auth.sign_in_requests().is_empty());
    }

    #[tokio::test]
    async fn test_sign_out_clears_feed_and_requests_sign_in_once() {
        let auth = Arc::new(MemoryAuth::with_user(AuthUser::new("u1", "Ada")));
        auth.script_sign_in(ScriptedSignIn::Succeed(AuthUser::new("u2", "Bob")));
        let db = Arc::new(MemoryDatabase::new());
        seed(&db, &["before"]).await;
        let (mut screen, mut rx) = screen(&auth, &db);
        screen.resume().await.unwrap();
        screen.process_pending().await.unwrap();
        assert_eq!(screen.feed().len(), 1);
        drain(&mut rx);

        let mut updates = screen.feed().subscribe();
        assert_eq!(screen.handle_command(ScreenCommand::SignOut).await, None);
        let state = screen.session.try_next_event().unwrap();
        assert_eq!(screen.handle_auth_state(&state).await.unwrap(), None);

        // Cleared the moment the sign-out was handled.
        assert_eq!(updates.try_recv().ok(), Some(friendlychat_core::FeedUpdate::Cleared));
        assert!(screen.feed().is_empty());
        assert!(!screen.is_feed_attached());
        assert_eq!(db.listener_count(PATH), 0);
        assert_eq!(auth.sign_in_requests().len(), 1);
        assert_eq!(
            drain(&mut rx),
            vec![
                ScreenEvent::SignedOut,
                ScreenEvent::Notice {
                    notice: Notice::SignedIn
                },
            ]
        );

        // The successful flow reports the new user, which re-attaches.
        screen.process_pending().await.unwrap();
        assert_eq!(screen.context().display_name, "Bob");
        assert_eq!(texts(&screen), ["before"]);
        assert_eq!(auth.sign_in_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_sign_in_closes_screen() {
        let auth = Arc::new(MemoryAuth::new());
        let db = Arc::new(MemoryDatabase::new());
        let (mut screen, mut rx) = screen(&auth, &db);

        screen.resume().await.unwrap();
        assert_eq!(
            screen.process_pending().await.unwrap(),
            Some(CloseReason::SignInCancelled)
        );
        assert_eq!(screen.context().display_name, ANONYMOUS);
        assert_eq!(
            drain(&mut rx),
            vec![
                ScreenEvent::SignedOut,
                ScreenEvent::Notice {
                    notice: Notice::SignInCancelled
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_sign_in_closes_screen() {
        let auth = Arc::new(MemoryAuth::new());
        auth.script_sign_in(ScriptedSignIn::Fail("no network".to_string()));
        let db = Arc::new(MemoryDatabase::new());
        let (mut screen, _rx) = screen(&auth, &db);

        screen.resume().await.unwrap();
        assert_eq!(
            screen.process_pending().await.unwrap(),
            Some(CloseReason::SignInFailed {
                message: "no network".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_send_pushes_and_clears_input() {
        let auth = Arc::new(MemoryAuth::with_user(AuthUser::new("u1", "Ada")));
        let db = Arc::new(MemoryDatabase::new());
        let (mut screen, mut rx) = screen(&auth, &db);
        screen.resume().await.unwrap();
        screen.process_pending().await.unwrap();
        drain(&mut rx);

        for c in "hi".chars() {
            screen.handle_command(ScreenCommand::Insert { c }).await;
        }
        screen.handle_command(ScreenCommand::Send).await;

        let (_, value) = db.children(PATH).pop().unwrap();
        assert_eq!(value, json!({"text": "hi", "name": "Ada"}));
        assert_eq!(screen.composer().text(), "");

        let events = drain(&mut rx);
        assert_eq!(
            events.last(),
            Some(&ScreenEvent::InputChanged {
                text: String::new(),
                send_enabled: false
            })
        );

        screen.process_pending().await.unwrap();
        assert_eq!(texts(&screen), ["hi"]);
    }

    #[tokio::test]
    async fn test_blank_input_does_not_send() {
        let auth = Arc::new(MemoryAuth::with_user(AuthUser::new("u1", "Ada")));
        let db = Arc::new(MemoryDatabase::new());
        let (mut screen, mut rx) = screen(&auth, &db);

        screen
            .handle_command(ScreenCommand::SetInput {
                text: "   ".to_string(),
            })
            .await;
        assert_eq!(
            drain(&mut rx),
            vec![ScreenEvent::InputChanged {
                text: "   ".to_string(),
                send_enabled: false
            }]
        );

        screen.handle_command(ScreenCommand::Send).await;
        assert!(db.children(PATH).is_empty());
        assert_eq!(screen.composer().text(), "   ");
    }

    #[tokio::test]
    async fn test_oversized_input_rejected() {
        let auth = Arc::new(MemoryAuth::new());
        let db = Arc::new(MemoryDatabase::new());
        let (mut screen, mut rx) = screen(&auth, &db);

        screen
            .handle_command(ScreenCommand::SetInput {
                text: "a".repeat(1000),
            })
            .await;
        screen.handle_command(ScreenCommand::Insert { c: 'b' }).await;

        let events = drain(&mut rx);
        assert!(matches!(
            &events[0],
            ScreenEvent::InputChanged { send_enabled: true, text } if text.len() == 1000
        ));
        assert_eq!(events[1], ScreenEvent::InputRejected { limit: 1000 });
        assert_eq!(screen.composer().text().len(), 1000);
    }

    #[tokio::test]
    async fn test_push_failure_still_clears_input() {
        let auth = Arc::new(MemoryAuth::with_user(AuthUser::new("u1", "Ada")));
        let db = Arc::new(MemoryDatabase::new());
        db.revoke_access(PATH).unwrap();
        let (mut screen, _rx) = screen(&auth, &db);

        screen
            .handle_command(ScreenCommand::SetInput {
                text: "lost".to_string(),
            })
            .await;
        screen.handle_command(ScreenCommand::Send).await;

        assert_eq!(screen.composer().text(), "");
        assert!(db.children(PATH).is_empty());
    }

    #[tokio::test]
    async fn test_pause_releases_everything() {
        let auth = Arc::new(MemoryAuth::with_user(AuthUser::new("u1", "Ada")));
        let db = Arc::new(MemoryDatabase::new());
        seed(&db, &["x"]).await;
        let (mut screen, _rx) = screen(&auth, &db);
        screen.resume().await.unwrap();
        screen.process_pending().await.unwrap();
        assert_eq!(auth.listener_count(), 1);
        assert_eq!(db.listener_count(PATH), 1);

        screen.pause();
        assert_eq!(auth.listener_count(), 0);
        assert_eq!(db.listener_count(PATH), 0);
        assert!(screen.feed().is_empty());
    }

    #[tokio::test]
    async fn test_run_until_closed() {
        let auth = Arc::new(MemoryAuth::with_user(AuthUser::new("u1", "Ada")));
        let db = Arc::new(MemoryDatabase::new());
        let (screen, mut rx) = screen(&auth, &db);
        let feed = screen.feed();
        let mut updates = feed.subscribe();
        let (tx, commands) = mpsc::unbounded_channel();

        let task = tokio::spawn(screen.run(commands));

        tx.send(ScreenCommand::SetInput {
            text: "from the loop".to_string(),
        })
        .unwrap();
        tx.send(ScreenCommand::Send).unwrap();

        match updates.recv().await.unwrap() {
            friendlychat_core::FeedUpdate::Appended { index, message } => {
                assert_eq!(index, 0);
                assert_eq!(message, ChatMessage::new("from the loop", "Ada"));
            }
            other => panic!("unexpected update {other:?}"),
        }

        tx.send(ScreenCommand::Close).unwrap();
        assert_eq!(task.await.unwrap().unwrap(), CloseReason::UserClosed);

        assert!(feed.is_empty());
        assert_eq!(auth.listener_count(), 0);
        assert_eq!(db.listener_count(PATH), 0);

        let events = drain(&mut rx);
        assert_eq!(
            events.last(),
            Some(&ScreenEvent::Closed {
                reason: CloseReason::UserClosed
            })
        );
    }

    fn assert_send<T: Send>(_: &T) {}

    #[test]
    fn test_run_future_is_send() {
        let auth = Arc::new(MemoryAuth::new());
        let db = Arc::new(MemoryDatabase::new());
        let (screen, _rx) = screen(&auth, &db);
        let (_tx, commands) = mpsc::unbounded_channel();
        let run = screen.run(commands);
        assert_send(&run);
    }

    /// Database that refuses every listener.
    struct RefusingDatabase;

    #[async_trait::async_trait]
    impl RealtimeDatabase for RefusingDatabase {
        async fn push(
            &self,
            path: &str,
            _value: serde_json::Value,
        ) -> Result<String, friendlychat_core::traits::DatabaseError> {
            Err(friendlychat_core::traits::DatabaseError::PermissionDenied(
                path.to_string(),
            ))
        }

        async fn subscribe_child_events(
            &self,
            path: &str,
        ) -> Result<
            friendlychat_core::Subscription<ChildEvent>,
            friendlychat_core::traits::DatabaseError,
        > {
            Err(friendlychat_core::traits::DatabaseError::PermissionDenied(
                path.to_string(),
            ))
        }
    }

    #[tokio::test]
    async fn test_refused_feed_keeps_screen_open() {
        let auth = Arc::new(MemoryAuth::with_user(AuthUser::new("u1", "Ada")));
        let (screen, mut rx) =
            ChatScreen::new(Arc::clone(&auth), Arc::new(RefusingDatabase), &ChatConfig::default());
        let (tx, commands) = mpsc::unbounded_channel();
        let task = tokio::spawn(screen.run(commands));

        tx.send(ScreenCommand::SetInput {
            text: "still here".to_string(),
        })
        .unwrap();
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            let edited = matches!(event, ScreenEvent::InputChanged { .. });
            events.push(event);
            if edited {
                break;
            }
        }
        assert!(!task.is_finished());
        assert!(events.contains(&ScreenEvent::SignedIn {
            display_name: "Ada".to_string()
        }));

        tx.send(ScreenCommand::Send).unwrap();
        tx.send(ScreenCommand::Close).unwrap();
        assert_eq!(task.await.unwrap().unwrap(), CloseReason::UserClosed);
    }
}
