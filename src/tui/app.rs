//! Main TUI application

use std::io::{self, Stdout};
use std::time::{Duration, Instant};

use crossterm::{
    event::{self, Event, MouseEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    text::Line,
    widgets::{Block, Borders, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState},
    Frame, Terminal,
};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use super::clipboard;
use super::commands::{parse_command, LocalCommand, ParsedCommand};
use super::input::{InputAction, InputState};
use super::theme::Theme;
use super::widgets::{
    render_notice_lines, render_turn_lines, HeaderBar, HelpBar, InputBox, StatusBar, VoiceModal,
};
use crate::connection::ConnectionState;
use crate::markup;
use crate::protocol::InboundEvent;
use crate::session::{ClientSession, VoiceUpdate};
use crate::transcript::Transcript;
use crate::voice::Recognition;

const SCROLL_STEP: usize = 3;
const PAGE_STEP: usize = 10;

/// A client-side note, shown after the first `after_turns` turns.
struct Notice {
    after_turns: usize,
    text: String,
}

/// What the voice modal shows, plus the last error it reported.
#[derive(Debug)]
struct ModalText {
    status: String,
    error: Option<String>,
}

/// What the event loop does after a recognition update.
#[derive(Debug, PartialEq, Eq)]
enum VoiceStep {
    /// Take the next event.
    Continue,
    /// Draw the new text before taking more events.
    Show,
    /// Close the modal; an error is kept as a notice.
    Close(Option<String>),
}

impl ModalText {
    fn new(status: &str) -> Self {
        Self {
            status: status.to_string(),
            error: None,
        }
    }

    fn apply(&mut self, update: VoiceUpdate) -> VoiceStep {
        match update {
            VoiceUpdate::Status(text) => {
                self.status = text;
                VoiceStep::Show
            }
            VoiceUpdate::Error(text) => {
                self.status = text.clone();
                self.error = Some(text);
                VoiceStep::Show
            }
            VoiceUpdate::Submitted(_) => {
                self.status = "Sent.".to_string();
                VoiceStep::Continue
            }
            VoiceUpdate::Dismiss => VoiceStep::Close(self.error.take()),
        }
    }
}

/// An open voice capture and the text shown in its modal.
struct VoiceCapture {
    recognition: Recognition,
    text: ModalText,
}

/// Main application state
pub struct App {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    session: ClientSession,
    inbound: mpsc::Receiver<InboundEvent>,
    connection: watch::Receiver<ConnectionState>,
    last_connection: ConnectionState,
    url: String,
    input: InputState,
    notices: Vec<Notice>,
    /// Turns before this index are hidden by `/clear`
    first_visible_turn: usize,
    scroll_offset: usize,
    spinner_frame: usize,
    voice: Option<VoiceCapture>,
    should_quit: bool,
}

impl App {
    pub fn new(
        session: ClientSession,
        inbound: mpsc::Receiver<InboundEvent>,
        connection: watch::Receiver<ConnectionState>,
        url: String,
    ) -> io::Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, crossterm::event::EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;

        let last_connection = *connection.borrow();
        Ok(Self {
            terminal,
            session,
            inbound,
            connection,
            last_connection,
            url,
            input: InputState::new(),
            notices: vec![Notice {
                after_turns: 0,
                text: "Type a message and press Enter. /help lists local commands.".to_string(),
            }],
            first_visible_turn: 0,
            scroll_offset: 0,
            spinner_frame: 0,
            voice: None,
            should_quit: false,
        })
    }

    /// Run the main event loop
    pub async fn run(&mut self) -> io::Result<()> {
        let poll_timeout = Duration::from_millis(16);
        let spinner_interval = Duration::from_millis(80);
        let mut last_spinner_update = Instant::now();

        while !self.should_quit {
            self.check_inbound();
            self.check_connection();
            self.check_voice();

            if last_spinner_update.elapsed() >= spinner_interval {
                self.spinner_frame = self.spinner_frame.wrapping_add(1);
                last_spinner_update = Instant::now();
            }

            self.draw()?;

            if event::poll(poll_timeout)? {
                match event::read()? {
                    Event::Key(key) => {
                        let action = self.input.handle_key(key);
                        self.handle_action(action);
                    }
                    Event::Mouse(mouse) => match mouse.kind {
                        MouseEventKind::ScrollUp => {
                            self.scroll_offset = self.scroll_offset.saturating_add(SCROLL_STEP);
                        }
                        MouseEventKind::ScrollDown => {
                            self.scroll_offset = self.scroll_offset.saturating_sub(SCROLL_STEP);
                        }
                        _ => {}
                    },
                    _ => {}
                }
            }
        }

        self.session.stop_speaking();
        Ok(())
    }

    fn check_inbound(&mut self) {
        while let Ok(event) = self.inbound.try_recv() {
            debug!("inbound {:?}", event);
            self.session.handle_event(event);
        }
    }

    fn check_connection(&mut self) {
        let state = *self.connection.borrow();
        if state == self.last_connection {
            return;
        }
        self.last_connection = state;
        if state == ConnectionState::Closed {
            self.notice(format!(
                "Connection to {} closed. New messages will not be delivered.",
                self.url
            ));
        }
    }

    fn check_voice(&mut self) {
        let Some(capture) = self.voice.as_mut() else {
            return;
        };
        while let Some(event) = capture.recognition.try_next() {
            let Some(update) = self.session.handle_recognition(event) else {
                continue;
            };
            if let VoiceUpdate::Submitted(id) = &update {
                debug!("voice prompt submitted as {}", id);
                self.scroll_offset = 0;
            }
            match capture.text.apply(update) {
                VoiceStep::Continue => {}
                VoiceStep::Show => break,
                VoiceStep::Close(error) => {
                    self.voice = None;
                    if let Some(error) = error {
                        self.notice(format!("Voice input: {error}"));
                    }
                    return;
                }
            }
        }
    }

    fn handle_action(&mut self, action: InputAction) {
        match action {
            InputAction::Quit => self.should_quit = true,
            InputAction::Submit(text) => self.submit(&text),
            InputAction::ScrollUp => {
                self.scroll_offset = self.scroll_offset.saturating_add(PAGE_STEP);
            }
            InputAction::ScrollDown => {
                self.scroll_offset = self.scroll_offset.saturating_sub(PAGE_STEP);
            }
            InputAction::Listen => self.start_listening(),
            InputAction::ToggleTts => self.toggle_tts(),
            InputAction::Escape => self.close_voice(),
            InputAction::Edited | InputAction::None => {}
        }
    }

    fn submit(&mut self, text: &str) {
        if let Some(parsed) = parse_command(text) {
            self.execute_local_command(parsed);
            return;
        }
        if self.session.submit(text).is_some() {
            self.scroll_offset = 0;
        }
    }

    fn execute_local_command(&mut self, parsed: ParsedCommand) {
        match parsed.command {
            LocalCommand::Help => {
                self.notice(format!("Local commands:\n{}", LocalCommand::help_text()));
            }
            LocalCommand::Tts => self.toggle_tts(),
            LocalCommand::Voice => self.start_listening(),
            LocalCommand::Copy => match parsed.copy_index() {
                Some(index) => self.copy_code_block(index),
                None => self.notice("Usage: /copy N".to_string()),
            },
            LocalCommand::Clear => {
                self.first_visible_turn = self.session.transcript().len();
                self.notices.clear();
                self.scroll_offset = 0;
            }
            LocalCommand::Quit => self.should_quit = true,
        }
    }

    fn toggle_tts(&mut self) {
        let on = self.session.toggle_tts();
        self.notice(format!("Voice output {}.", if on { "on" } else { "off" }));
    }

    fn start_listening(&mut self) {
        if self.voice.is_some() {
            return;
        }
        if !self.session.voice_input_available() {
            self.notice("Voice input is not available. Set [voice] listen_command in the config.".to_string());
            return;
        }
        info!("voice capture started");
        let recognition = self.session.start_listening();
        self.voice = Some(VoiceCapture {
            recognition,
            text: ModalText::new("Starting..."),
        });
    }

    fn close_voice(&mut self) {
        if let Some(mut capture) = self.voice.take() {
            capture.recognition.stop();
            self.session.stop_speaking();
            info!("voice capture cancelled");
        }
    }

    fn copy_code_block(&mut self, index: usize) {
        let code = find_code_block(self.session.transcript(), index);
        let message = match code {
            None => format!("No code block {index}."),
            Some(code) => match clipboard::copy_text(&code) {
                Ok(()) => format!("Copied code block {index}."),
                Err(e) => format!("Copy failed: {e}"),
            },
        };
        self.notice(message);
    }

    fn notice(&mut self, text: String) {
        self.notices.push(Notice {
            after_turns: self.session.transcript().len(),
            text,
        });
        self.scroll_offset = 0;
    }

    fn draw(&mut self) -> io::Result<()> {
        let transcript = self.session.transcript();
        let notices = &self.notices;
        let first_visible_turn = self.first_visible_turn;
        let input = &self.input;
        let url = &self.url;
        let connection = self.last_connection;
        let tts_enabled = self.session.tts_enabled();
        let spinner_frame = self.spinner_frame;
        let scroll_offset = self.scroll_offset;
        let voice_status = self.voice.as_ref().map(|v| v.text.status.as_str());

        self.terminal.draw(|f| {
            let size = f.area();

            let main_chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(1), // Header
                    Constraint::Length(1), // Status
                    Constraint::Min(6),    // Conversation
                    Constraint::Length(4), // Input
                    Constraint::Length(1), // Help
                ])
                .split(size);

            let in_flight = transcript.in_flight();
            f.render_widget(
                HeaderBar {
                    title: "Jarvix",
                    url,
                    connection,
                    tts_enabled,
                    is_processing: in_flight > 0,
                },
                main_chunks[0],
            );
            f.render_widget(
                StatusBar {
                    in_flight,
                    spinner_frame,
                },
                main_chunks[1],
            );

            Self::render_conversation(
                f,
                main_chunks[2],
                transcript,
                notices,
                first_visible_turn,
                scroll_offset,
                spinner_frame,
            );

            f.render_widget(
                InputBox {
                    content: &input.buffer,
                    focused: voice_status.is_none(),
                },
                main_chunks[3],
            );
            let cursor_x = main_chunks[3].x + 1 + input.cursor_display_width() as u16;
            let cursor_y = main_chunks[3].y + 1;
            f.set_cursor_position((
                cursor_x.min(main_chunks[3].x + main_chunks[3].width.saturating_sub(2)),
                cursor_y,
            ));

            f.render_widget(HelpBar, main_chunks[4]);

            if let Some(status) = voice_status {
                f.render_widget(
                    VoiceModal {
                        status,
                        spinner_frame,
                    },
                    size,
                );
            }
        })?;

        Ok(())
    }

    fn render_conversation(
        f: &mut Frame,
        area: Rect,
        transcript: &Transcript,
        notices: &[Notice],
        first_visible_turn: usize,
        scroll_offset: usize,
        spinner_frame: usize,
    ) {
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Theme::border())
            .title_top(Line::styled(" Conversation ", Theme::muted()));

        let inner = block.inner(area);
        f.render_widget(block, area);

        // Leave a column for the scrollbar
        let content_width = inner.width.saturating_sub(1) as usize;
        let mut all_lines: Vec<Line> = Vec::new();
        let mut pending = notices.iter().peekable();
        for (i, turn) in transcript.turns().iter().enumerate() {
            while let Some(notice) = pending.next_if(|n| n.after_turns <= i) {
                all_lines.extend(render_notice_lines(&notice.text, content_width));
            }
            if i >= first_visible_turn {
                all_lines.extend(render_turn_lines(turn, content_width, spinner_frame));
            }
        }
        for notice in pending {
            all_lines.extend(render_notice_lines(&notice.text, content_width));
        }

        let total_lines = all_lines.len();
        let visible_height = inner.height as usize;
        let max_scroll = total_lines.saturating_sub(visible_height);
        let actual_scroll = scroll_offset.min(max_scroll);

        // Anchor to the bottom, then step back by the scroll offset
        let start = total_lines
            .saturating_sub(visible_height)
            .saturating_sub(actual_scroll);
        let visible: Vec<Line> = all_lines
            .into_iter()
            .skip(start)
            .take(visible_height)
            .collect();

        f.render_widget(Paragraph::new(visible), inner);

        if total_lines > visible_height {
            let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
                .begin_symbol(Some("▲"))
                .end_symbol(Some("▼"))
                .track_symbol(Some("│"))
                .thumb_symbol("█");

            let mut scrollbar_state =
                ScrollbarState::new(max_scroll).position(max_scroll.saturating_sub(actual_scroll));

            f.render_stateful_widget(
                scrollbar,
                area.inner(ratatui::layout::Margin {
                    vertical: 1,
                    horizontal: 0,
                }),
                &mut scrollbar_state,
            );
        }
    }
}

/// Code of the block annotated `copy N`, wherever it is in the transcript.
pub fn find_code_block(transcript: &Transcript, index: usize) -> Option<String> {
    transcript
        .turns()
        .iter()
        .filter_map(|turn| turn.response_markup())
        .find_map(|markup| markup::code_block(markup, index))
}

impl Drop for App {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(
            self.terminal.backend_mut(),
            crossterm::event::DisableMouseCapture,
            LeaveAlternateScreen
        );
        let _ = self.terminal.show_cursor();
    }
}
