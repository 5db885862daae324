//! TUI transport bridge for terminal chat front ends.

use std::collections::VecDeque;

use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use friendlychat_core::ANONYMOUS;
use friendlychat_session::{CloseReason, ScreenCommand, ScreenEvent};
use tokio::sync::mpsc;

/// Notices kept on screen at once.
const MAX_NOTICES: usize = 3;

/// Lines moved by PageUp/PageDown.
const PAGE: i32 = 10;

/// What a key press means to the terminal front end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TuiAction {
    /// Forward to the chat screen.
    Screen(ScreenCommand),
    /// Scroll the message list by this many lines; negative is up.
    Scroll(i32),
}

/// TUI bridge connecting a terminal to a running chat screen.
pub struct TuiBridge {
    commands: mpsc::UnboundedSender<ScreenCommand>,
    events: mpsc::UnboundedReceiver<ScreenEvent>,
}

impl TuiBridge {
    /// Create a bridge over the screen's event receiver.
    ///
    /// Returns the bridge and the command receiver to hand to
    /// `ChatScreen::run`.
    #[must_use]
    pub fn new(
        events: mpsc::UnboundedReceiver<ScreenEvent>,
    ) -> (Self, mpsc::UnboundedReceiver<ScreenCommand>) {
        let (commands, commands_rx) = mpsc::unbounded_channel();
        (Self { commands, events }, commands_rx)
    }

    /// Send a command to the screen.
    ///
    /// # Errors
    /// Returns error if the screen has stopped.
    pub fn send(&self, command: ScreenCommand) -> Result<(), SendError> {
        self.commands
            .send(command)
            .map_err(|_| SendError::ChannelClosed)
    }

    /// Map a key press to an action.
    #[must_use]
    pub fn key_to_action(key: &KeyEvent) -> Option<TuiAction> {
        if key.kind != KeyEventKind::Press {
            return None;
        }
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        let action = match key.code {
            KeyCode::Char('c') if ctrl => TuiAction::Screen(ScreenCommand::Close),
            KeyCode::Char('o') if ctrl => TuiAction::Screen(ScreenCommand::SignOut),
            KeyCode::Char(_) if ctrl => return None,
            KeyCode::Char(c) => TuiAction::Screen(ScreenCommand::Insert { c }),
            KeyCode::Esc => TuiAction::Screen(ScreenCommand::Close),
            KeyCode::Enter => TuiAction::Screen(ScreenCommand::Send),
            KeyCode::Backspace => TuiAction::Screen(ScreenCommand::Backspace),
            KeyCode::Up => TuiAction::Scroll(-1),
            KeyCode::Down => TuiAction::Scroll(1),
            KeyCode::PageUp => TuiAction::Scroll(-PAGE),
            KeyCode::PageDown => TuiAction::Scroll(PAGE),
            _ => return None,
        };
        Some(action)
    }

    /// Handle a crossterm event.
    ///
    /// Returns true if the event was handled.
    pub fn handle_event(&self, event: &Event, state: &mut TuiState) -> bool {
        match event {
            Event::Key(key) => match Self::key_to_action(key) {
                Some(TuiAction::Screen(command)) => {
                    self.forward(command);
                    true
                }
                Some(TuiAction::Scroll(delta)) => {
                    state.scroll_by(delta);
                    true
                }
                None => false,
            },
            Event::Paste(text) => {
                let text = format!("{}{text}", state.input);
                self.forward(ScreenCommand::SetInput { text });
                true
            }
            _ => false,
        }
    }

    fn forward(&self, command: ScreenCommand) {
        if let Err(e) = self.send(command) {
            tracing::debug!("input dropped: {e}");
        }
    }

    /// Apply every screen event received so far to `state`.
    ///
    /// Returns the number of events applied.
    pub fn drain_events(&mut self, state: &mut TuiState) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events.try_recv() {
            state.apply(event);
            applied += 1;
        }
        applied
    }
}

/// Send error.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("Channel closed")]
    ChannelClosed,
}

/// Everything the terminal view shows apart from the messages.
#[derive(Debug, Clone)]
pub struct TuiState {
    pub input: String,
    pub send_enabled: bool,
    pub display_name: String,
    pub signed_in: bool,
    pub status: String,
    pub notices: VecDeque<String>,
    pub closed: Option<CloseReason>,
    /// First visible message line.
    pub scroll: u16,
    /// Keep the newest message in view.
    pub follow: bool,
}

impl Default for TuiState {
    fn default() -> Self {
        Self {
            input: String::new(),
            send_enabled: false,
            display_name: ANONYMOUS.to_string(),
            signed_in: false,
            status: "Connecting...".to_string(),
            notices: VecDeque::with_capacity(MAX_NOTICES),
            closed: None,
            scroll: 0,
            follow: true,
        }
    }
}

impl TuiState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one screen event into the view.
    pub fn apply(&mut self, event: ScreenEvent) {
        match event {
            ScreenEvent::InputChanged { text, send_enabled } => {
                self.input = text;
                self.send_enabled = send_enabled;
            }
            ScreenEvent::InputRejected { limit } => {
                self.status = format!("Messages are limited to {limit} characters");
            }
            ScreenEvent::SignedIn { display_name } => {
                self.status = format!("Signed in as {display_name}");
                self.display_name = display_name;
                self.signed_in = true;
                self.follow = true;
            }
            ScreenEvent::SignedOut => {
                self.display_name = ANONYMOUS.to_string();
                self.signed_in = false;
                self.status = "Signed out".to_string();
                self.scroll = 0;
            }
            ScreenEvent::Notice { notice } => {
                if self.notices.len() == MAX_NOTICES {
                    self.notices.pop_front();
                }
                self.notices.push_back(notice.to_string());
            }
            ScreenEvent::Closed { reason } => {
                self.status = match &reason {
                    CloseReason::UserClosed => "Closed".to_string(),
                    CloseReason::SignInCancelled => "Sign in canceled".to_string(),
                    CloseReason::SignInFailed { message } => format!("Sign in failed: {message}"),
                };
                self.closed = Some(reason);
            }
        }
    }

    /// Scroll the message list. Scrolling up stops following new messages.
    pub fn scroll_by(&mut self, delta: i32) {
        let next = i32::from(self.scroll).saturating_add(delta).max(0);
        self.scroll = u16::try_from(next).unwrap_or(u16::MAX);
        if delta < 0 {
            self.follow = false;
        }
    }

    /// Scroll offset for a list of `total` lines in a `visible`-line pane.
    ///
    /// Pins to the bottom while following, otherwise clamps the manual
    /// offset so the list cannot scroll past its end.
    #[must_use]
    pub fn effective_scroll(&mut self, total: usize, visible: usize) -> u16 {
        let max = u16::try_from(total.saturating_sub(visible)).unwrap_or(u16::MAX);
        if self.follow || self.scroll >= max {
            self.follow = true;
            self.scroll = max;
        }
        self.scroll
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed.is_some()
    }
}

#[cfg(test)]
mod tests {
    use friendlychat_session::Notice;
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    fn press(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    #[test]
    fn test_key_mapping() {
        let cases = [
            (press(KeyCode::Char('a'), KeyModifiers::NONE), Some(TuiAction::Screen(ScreenCommand::Insert { c: 'a' }))),
            (press(KeyCode::Char('A'), KeyModifiers::SHIFT), Some(TuiAction::Screen(ScreenCommand::Insert { c: 'A' }))),
            (press(KeyCode::Enter, KeyModifiers::NONE), Some(TuiAction::Screen(ScreenCommand::Send))),
            (press(KeyCode::Char('o'), KeyModifiers::CONTROL), Some(TuiAction::Screen(ScreenCommand::SignOut))),
            (press(KeyCode::Char('c'), KeyModifiers::CONTROL), Some(TuiAction::Screen(ScreenCommand::Close))),
            (press(KeyCode::Char('x'), KeyModifiers::CONTROL), None),
            (press(KeyCode::PageUp, KeyModifiers::NONE), Some(TuiAction::Scroll(-10))),
            (press(KeyCode::F(5), KeyModifiers::NONE), None),
        ];
        for (key, expected) in cases {
            assert_eq!(TuiBridge::key_to_action(&key), expected, "{key:?}");
        }
    }

    #[test]
    fn test_key_release_ignored() {
        let mut key = press(KeyCode::Enter, KeyModifiers::NONE);
        key.kind = KeyEventKind::Release;
        assert_eq!(TuiBridge::key_to_action(&key), None);
    }

    #[test]
    fn test_handle_event_forwards_commands() {
        let (_events_tx, events_rx) = mpsc::unbounded_channel();
        let (bridge, mut commands) = TuiBridge::new(events_rx);
        let mut state = TuiState::new();
        state.input = "hel".to_string();

        assert!(bridge.handle_event(&Event::Key(press(KeyCode::Enter, KeyModifiers::NONE)), &mut state));
        assert!(bridge.handle_event(&Event::Paste("lo".to_string()), &mut state));
        assert!(!bridge.handle_event(&Event::FocusGained, &mut state));

        assert_eq!(commands.try_recv().unwrap(), ScreenCommand::Send);
        assert_eq!(
            commands.try_recv().unwrap(),
            ScreenCommand::SetInput {
                text: "hello".to_string()
            }
        );
    }

    #[test]
    fn test_send_after_screen_stopped() {
        let (_events_tx, events_rx) = mpsc::unbounded_channel();
        let (bridge, commands) = TuiBridge::new(events_rx);
        assert_ok!(bridge.send(ScreenCommand::Backspace));

        drop(commands);
        assert_err!(bridge.send(ScreenCommand::Send));
        // Keys are still consumed so the terminal loop keeps running.
        let mut state = TuiState::new();
        assert!(bridge.handle_event(&Event::Key(press(KeyCode::Enter, KeyModifiers::NONE)), &mut state));
        assert!(bridge.handle_event(&Event::Paste("late".to_string()), &mut state));
        assert_eq!(state.input, "");
    }

    #[test]
    fn test_drain_events_folds_state() {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (mut bridge, _commands) = TuiBridge::new(events_rx);
        let mut state = TuiState::new();

        events_tx
            .send(ScreenEvent::SignedIn {
                display_name: "Ada".to_string(),
            })
            .unwrap();
        events_tx
            .send(ScreenEvent::InputChanged {
                text: "hi".to_string(),
                send_enabled: true,
            })
            .unwrap();
        assert_eq!(bridge.drain_events(&mut state), 2);
        assert!(state.signed_in);
        assert_eq!(state.display_name, "Ada");
        assert!(state.send_enabled);

        events_tx.send(ScreenEvent::SignedOut).unwrap();
        events_tx
            .send(ScreenEvent::Closed {
                reason: CloseReason::SignInCancelled,
            })
            .unwrap();
        bridge.drain_events(&mut state);
        assert_eq!(state.display_name, ANONYMOUS);
        assert!(state.is_closed());
        assert_eq!(state.status, "Sign in canceled");
    }

    #[test]
    fn test_notices_are_bounded() {
        let mut state = TuiState::new();
        for _ in 0..5 {
            state.apply(ScreenEvent::Notice {
                notice: Notice::Welcome,
            });
        }
        state.apply(ScreenEvent::Notice {
            notice: Notice::SignInCancelled,
        });
        assert_eq!(state.notices.len(), MAX_NOTICES);
        assert_eq!(state.notices.back().map(String::as_str), Some("Sign in canceled"));
    }

    #[test]
    fn test_scroll_follow() {
        let mut state = TuiState::new();
        assert_eq!(state.effective_scroll(30, 10), 20);

        state.scroll_by(-5);
        assert!(!state.follow);
        assert_eq!(state.effective_scroll(31, 10), 15);

        state.scroll_by(100);
        assert_eq!(state.effective_scroll(31, 10), 21);
        assert!(state.follow);

        state.scroll_by(-100);
        assert_eq!(state.scroll, 0);
    }
}
