//! Custom widgets for the TUI

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Widget, Wrap},
};
use unicode_width::UnicodeWidthChar;

use super::shimmer::{shimmer_spans, AnimatedDots};
use super::theme::Theme;
use crate::connection::ConnectionState;
use crate::markup::{self, Segment};
use crate::transcript::{Turn, TurnStatus};

/// Break styled spans into lines no wider than `max_width` columns.
fn wrap_spans(spans: Vec<Span<'static>>, max_width: usize, indent: &str) -> Vec<Line<'static>> {
    let indent_width: usize = indent.chars().filter_map(UnicodeWidthChar::width).sum();
    let content_width = max_width.saturating_sub(indent_width);
    if max_width == 0 || content_width == 0 {
        let mut line = vec![Span::raw(indent.to_string())];
        line.extend(spans);
        return vec![Line::from(line)];
    }

    let mut lines = Vec::new();
    let mut current: Vec<Span<'static>> = vec![Span::raw(indent.to_string())];
    let mut width = 0usize;

    for span in spans {
        let mut chunk = String::new();
        for c in span.content.chars() {
            let w = c.width().unwrap_or(0);
            if width + w > content_width && width > 0 {
                if !chunk.is_empty() {
                    current.push(Span::styled(std::mem::take(&mut chunk), span.style));
                }
                lines.push(Line::from(std::mem::take(&mut current)));
                current.push(Span::raw(indent.to_string()));
                width = 0;
            }
            chunk.push(c);
            width += w;
        }
        if !chunk.is_empty() {
            current.push(Span::styled(chunk, span.style));
        }
    }
    lines.push(Line::from(current));
    lines
}

/// Render formatter markup as terminal lines.
pub fn markup_lines(markup: &str, base: Style, max_width: usize) -> Vec<Line<'static>> {
    let indent = "  ";
    let mut lines = Vec::new();
    let mut current: Vec<Span<'static>> = Vec::new();
    // The newline closing a fence belongs to the block
    let mut after_block = false;

    let flush = |current: &mut Vec<Span<'static>>, lines: &mut Vec<Line<'static>>| {
        lines.extend(wrap_spans(std::mem::take(current), max_width, indent));
    };

    for segment in markup::parse(markup) {
        match segment {
            Segment::Text { text, bold, code } => {
                let text = match text.strip_prefix('\n') {
                    Some(rest) if after_block => rest.to_string(),
                    _ => text,
                };
                after_block = false;
                let mut style = if code { Theme::inline_code() } else { base };
                if bold {
                    style = style.add_modifier(Modifier::BOLD);
                }
                for (i, part) in text.split('\n').enumerate() {
                    if i > 0 {
                        flush(&mut current, &mut lines);
                    }
                    if !part.is_empty() {
                        current.push(Span::styled(part.to_string(), style));
                    }
                }
            }
            Segment::Break => {
                after_block = false;
                flush(&mut current, &mut lines);
            }
            Segment::CodeBlock(block) => {
                if !current.is_empty() {
                    flush(&mut current, &mut lines);
                }
                let mut header = vec![Span::raw(indent.to_string())];
                if let Some(n) = block.copy_index {
                    header.push(Span::styled(format!(" copy {n} "), Theme::copy_badge()));
                    header.push(Span::raw(" "));
                }
                if let Some(lang) = block.lang {
                    header.push(Span::styled(lang, Theme::muted()));
                }
                lines.push(Line::from(header));
                for code_line in block.text.trim_end_matches('\n').split('\n') {
                    lines.push(Line::from(vec![
                        Span::styled(format!("{indent}│ "), Theme::muted()),
                        Span::styled(code_line.to_string(), Theme::code_block()),
                    ]));
                }
                after_block = true;
            }
        }
    }
    if !current.is_empty() {
        flush(&mut current, &mut lines);
    }
    lines
}

/// Render one turn: the prompt, its status, log entries and response.
pub fn render_turn_lines(turn: &Turn, max_width: usize, spinner_frame: usize) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    let timestamp = turn.created_at.format("%H:%M").to_string();

    lines.push(Line::from(vec![
        Span::styled(" You ", Theme::user_badge()),
        Span::styled(format!(" {timestamp}"), Theme::muted()),
    ]));
    lines.extend(wrap_spans(
        vec![Span::styled(turn.prompt.clone(), Theme::text())],
        max_width,
        "  ",
    ));

    let glyph = if turn.status == TurnStatus::Processing {
        AnimatedDots::new(spinner_frame).current()
    } else {
        turn.status.glyph()
    };
    lines.push(Line::from(vec![
        Span::styled(" Jarvix ", Theme::jarvix_badge()),
        Span::raw(" "),
        Span::styled(format!("{} {}", glyph, turn.status.label()), Theme::status(turn.status)),
    ]));

    for entry in &turn.logs {
        lines.extend(markup_lines(entry, Theme::log_entry(), max_width));
    }
    if let Some(markup) = turn.response_markup() {
        lines.extend(markup_lines(markup, Theme::text(), max_width));
    }

    lines.push(Line::from(""));
    lines
}

/// A client-side note (help text, copy confirmations, errors).
pub fn render_notice_lines(text: &str, max_width: usize) -> Vec<Line<'static>> {
    let style = Theme::system_badge();
    let mut lines = Vec::new();
    for line in text.lines() {
        lines.extend(wrap_spans(vec![Span::styled(line.to_string(), style)], max_width, "  "));
    }
    lines.push(Line::from(""));
    lines
}

/// Header bar with title, backend and voice state
pub struct HeaderBar<'a> {
    pub title: &'a str,
    pub url: &'a str,
    pub connection: ConnectionState,
    pub tts_enabled: bool,
    pub is_processing: bool,
}

impl Widget for HeaderBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.height < 1 {
            return;
        }

        // Shimmer the title while anything is in flight
        let title_spans = if self.is_processing {
            let mut spans = vec![Span::styled("◆ ", Theme::accent())];
            spans.extend(shimmer_spans(self.title));
            spans
        } else {
            vec![
                Span::styled("◆ ", Theme::accent()),
                Span::styled(self.title, Theme::title()),
            ]
        };
        buf.set_line(area.x + 1, area.y, &Line::from(title_spans), area.width.saturating_sub(2));

        let (dot, dot_style) = match self.connection {
            ConnectionState::Open => ("●", Theme::success()),
            ConnectionState::Connecting => ("○", Theme::warning()),
            ConnectionState::Closed => ("●", Theme::error()),
        };
        let voice = if self.tts_enabled { "🔊" } else { "🔇" };
        let right = Line::from(vec![
            Span::styled(format!("{voice} "), Theme::muted()),
            Span::styled(format!("{dot} "), dot_style),
            Span::styled(format!("{} {} ", self.url, self.connection.label()), Theme::muted()),
        ]);
        let right_len = right.width() as u16;
        let right_x = area.x + area.width.saturating_sub(right_len + 1);
        buf.set_line(right_x, area.y, &right, right_len + 1);
    }
}

/// Status bar showing in-flight work
pub struct StatusBar {
    pub in_flight: usize,
    pub spinner_frame: usize,
}

impl Widget for StatusBar {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let line = if self.in_flight > 0 {
            let spinner = AnimatedDots::new(self.spinner_frame);
            let text = if self.in_flight == 1 {
                "1 request in flight".to_string()
            } else {
                format!("{} requests in flight", self.in_flight)
            };
            Line::from(vec![
                Span::styled(format!("{} ", spinner.current()), Theme::accent()),
                Span::styled(text, Theme::accent()),
            ])
        } else {
            Line::from(vec![
                Span::styled("● ", Theme::success()),
                Span::styled("Ready", Theme::dim()),
            ])
        };

        buf.set_line(area.x + 1, area.y, &line, area.width.saturating_sub(2));
    }
}

/// Input box widget
pub struct InputBox<'a> {
    pub content: &'a str,
    pub focused: bool,
}

impl Widget for InputBox<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let border_style = if self.focused {
            Theme::border_focused()
        } else {
            Theme::border()
        };

        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(border_style)
            .title(Span::styled(" Message ", Theme::muted()));

        let inner = block.inner(area);
        block.render(area, buf);

        let (display_text, style) = if self.content.is_empty() {
            ("Ask Jarvix... (Enter to send, Ctrl+R to speak)", Theme::muted())
        } else {
            (self.content, Theme::text())
        };

        Paragraph::new(display_text)
            .style(style)
            .wrap(Wrap { trim: false })
            .render(inner, buf);
    }
}

/// Help bar showing key bindings
pub struct HelpBar;

impl Widget for HelpBar {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let bindings = [
            ("Enter", "Send"),
            ("Ctrl+R", "Speak"),
            ("Ctrl+T", "Voice out"),
            ("/copy N", "Copy code"),
            ("PgUp/PgDn", "Scroll"),
            ("Ctrl+C", "Quit"),
        ];

        let mut spans = vec![Span::raw(" ")];
        for (i, (key, desc)) in bindings.iter().enumerate() {
            if i > 0 {
                spans.push(Span::styled(" │ ", Theme::muted()));
            }
            spans.push(Span::styled(*key, Theme::key()));
            spans.push(Span::styled(format!(" {}", desc), Theme::key_desc()));
        }

        buf.set_line(area.x, area.y, &Line::from(spans), area.width);
    }
}

/// Centered overlay shown while listening for a spoken prompt
pub struct VoiceModal<'a> {
    pub status: &'a str,
    pub spinner_frame: usize,
}

impl VoiceModal<'_> {
    pub fn area(outer: Rect) -> Rect {
        let width = 44.min(outer.width.saturating_sub(4));
        let height = 5.min(outer.height);
        Rect {
            x: outer.x + outer.width.saturating_sub(width) / 2,
            y: outer.y + outer.height.saturating_sub(height) / 2,
            width,
            height,
        }
    }
}

impl Widget for VoiceModal<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let area = Self::area(area);
        Clear.render(area, buf);

        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Theme::warning())
            .title_top(Line::styled(" 🎤 Voice ", Theme::warning().add_modifier(Modifier::BOLD)));
        let inner = block.inner(area);
        block.render(area, buf);

        let spinner = AnimatedDots::new(self.spinner_frame);
        let lines = vec![
            Line::from(vec![
                Span::styled(format!("{} ", spinner.current()), Theme::accent()),
                Span::styled(self.status.to_string(), Theme::bold()),
            ]),
            Line::from(Span::styled("Esc to cancel", Theme::muted())),
        ];
        Paragraph::new(lines).render(inner, buf);
    }
}
