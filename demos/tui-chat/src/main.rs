//! Terminal FriendlyChat client on the in-memory backend.
//!
//! Run with: cargo run -p tui-chat-demo
//!
//! Enter sends, Ctrl+O signs out, Esc or Ctrl+C quits. Logs go to
//! `friendlychat.log` in the temp directory (filter with `RUST_LOG`).

use std::{io, sync::Arc, time::Duration};

use anyhow::Context as _;
use crossterm::{
    event::{self, DisableBracketedPaste, EnableBracketedPaste},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use friendlychat_core::{AuthUser, ChatConfig, ChatMessage, MessageFeed, RealtimeDatabase};
use friendlychat_session::{
    ChatScreen,
    backend::{MemoryAuth, MemoryDatabase, ScriptedSignIn},
};
use friendlychat_transport::{TuiBridge, TuiState};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;

    let config = ChatConfig::from_user_config().context("loading config")?;
    let (auth, database) = demo_backend(&config).await?;

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableBracketedPaste)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run app
    let result = run_app(&mut terminal, auth, database, &config).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        DisableBracketedPaste,
        LeaveAlternateScreen
    )?;
    terminal.show_cursor()?;

    result
}

fn init_tracing() -> anyhow::Result<()> {
    let path = std::env::temp_dir().join("friendlychat.log");
    let file = std::fs::File::create(&path)
        .with_context(|| format!("creating log file {}", path.display()))?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file)),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();
    Ok(())
}

/// Backend with a seeded feed and a scripted sign-in: the first flow signs
/// in as the local user, the second as a guest, and the third is cancelled.
async fn demo_backend(config: &ChatConfig) -> anyhow::Result<(Arc<MemoryAuth>, Arc<MemoryDatabase>)> {
    let name = std::env::var("USER").unwrap_or_else(|_| "Friend".to_string());
    let auth = MemoryAuth::new();
    auth.script_sign_in(ScriptedSignIn::Succeed(AuthUser::new("local", name)));
    auth.script_sign_in(ScriptedSignIn::Succeed(AuthUser::anonymous("guest")));

    let database = MemoryDatabase::new();
    for text in [
        "Welcome to FriendlyChat!",
        "Type a message and press Enter to send it.",
    ] {
        let value = ChatMessage::new(text, "FriendlyChat").to_value()?;
        database.push(&config.messages_path, value).await?;
    }

    Ok((Arc::new(auth), Arc::new(database)))
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    auth: Arc<MemoryAuth>,
    database: Arc<MemoryDatabase>,
    config: &ChatConfig,
) -> anyhow::Result<()> {
    let (screen, events) = ChatScreen::new(auth, database, config);
    let feed = screen.feed();
    let (mut bridge, commands) = TuiBridge::new(events);
    let screen_task = tokio::spawn(screen.run(commands));

    let mut state = TuiState::new();
    let limit = config.message_length_limit;

    while !state.is_closed() && !screen_task.is_finished() {
        bridge.drain_events(&mut state);
        terminal.draw(|f| ui(f, &mut state, &feed, limit))?;

        if event::poll(Duration::from_millis(50))? {
            let event = event::read()?;
            bridge.handle_event(&event, &mut state);
        }
    }

    let reason = screen_task.await.context("chat screen task panicked")??;
    tracing::info!(?reason, "exiting");
    Ok(())
}

fn ui(f: &mut Frame, state: &mut TuiState, feed: &MessageFeed, limit: usize) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),    // Messages
            Constraint::Length(3), // Input
            Constraint::Length(1), // Status
        ])
        .split(f.area());

    // Message list
    let width = usize::from(chunks[0].width.saturating_sub(2));
    let lines: Vec<Line> = feed
        .snapshot()
        .iter()
        .flat_map(|m| message_rows(m, width))
        .collect();
    let visible = usize::from(chunks[0].height.saturating_sub(2));
    let scroll = state.effective_scroll(lines.len(), visible);

    let messages = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Messages"))
        .scroll((scroll, 0));
    f.render_widget(messages, chunks[0]);

    // Input area
    let count = state.input.chars().count();
    let input_style = if state.send_enabled {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    let input = Paragraph::new(state.input.as_str())
        .style(input_style)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("Message ({count}/{limit})")),
        );
    f.render_widget(input, chunks[1]);

    // Set cursor
    let cursor_x = u16::try_from(count).unwrap_or(u16::MAX);
    f.set_cursor_position((
        chunks[1].x.saturating_add(cursor_x).saturating_add(1),
        chunks[1].y + 1,
    ));

    // Status bar
    let status_style = if state.signed_in {
        Style::default().fg(Color::Green)
    } else {
        Style::default().fg(Color::Yellow)
    };
    let mut spans = vec![
        Span::raw(" "),
        Span::styled(state.status.as_str(), status_style),
    ];
    if let Some(notice) = state.notices.back() {
        spans.push(Span::raw(" | "));
        spans.push(Span::styled(notice.as_str(), Style::default().fg(Color::Magenta)));
    }
    spans.extend([
        Span::raw(" | "),
        Span::styled("Enter", Style::default().fg(Color::Yellow)),
        Span::raw(" send | "),
        Span::styled("Ctrl+O", Style::default().fg(Color::Yellow)),
        Span::raw(" sign out | "),
        Span::styled("Esc", Style::default().fg(Color::Yellow)),
        Span::raw(" quit "),
    ]);
    f.render_widget(Paragraph::new(Line::from(spans)), chunks[2]);
}

/// Break a message into rows of at most `width` characters, so the scroll
/// offset counts the rows actually drawn.
fn message_rows(message: &ChatMessage, width: usize) -> Vec<Line<'static>> {
    let sender_style = Style::default()
        .fg(Color::Cyan)
        .add_modifier(Modifier::BOLD);
    let prefix = format!("{}: ", message.sender);
    let prefix_len = prefix.chars().count();
    let chars: Vec<char> = prefix.chars().chain(message.text.chars()).collect();
    let width = width.max(1);

    chars
        .chunks(width)
        .enumerate()
        .map(|(i, row)| {
            let split = prefix_len.saturating_sub(i * width).min(row.len());
            let (head, tail) = row.split_at(split);
            Line::from(vec![
                Span::styled(head.iter().collect::<String>(), sender_style),
                Span::raw(tail.iter().collect::<String>()),
            ])
        })
        .collect()
}
