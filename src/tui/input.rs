//! Input handling for the TUI

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// Result of handling an input event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputAction {
    /// No action needed
    None,
    /// Submit the current input
    Submit(String),
    /// Quit the application
    Quit,
    /// Scroll up in the transcript
    ScrollUp,
    /// Scroll down in the transcript
    ScrollDown,
    /// Start voice capture
    Listen,
    /// Toggle spoken summaries
    ToggleTts,
    /// Escape pressed (close modal)
    Escape,
    /// Buffer changed
    Edited,
}

/// Input state manager
///
/// Note: `cursor` is a CHARACTER index, not a byte index, so multi-byte
/// characters edit correctly.
#[derive(Debug, Clone, Default)]
pub struct InputState {
    /// Current input buffer
    pub buffer: String,
    /// Cursor position in buffer (character index, not byte index!)
    pub cursor: usize,
    /// Submitted inputs, oldest first
    pub history: Vec<String>,
    /// Position while browsing history; `None` means editing the live buffer
    history_index: Option<usize>,
    /// Live buffer saved while browsing history
    saved_input: String,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    fn char_count(&self) -> usize {
        self.buffer.chars().count()
    }

    fn char_to_byte_index(&self, char_idx: usize) -> usize {
        self.buffer
            .char_indices()
            .nth(char_idx)
            .map(|(byte_idx, _)| byte_idx)
            .unwrap_or(self.buffer.len())
    }

    fn insert_char(&mut self, c: char) {
        let byte_idx = self.char_to_byte_index(self.cursor);
        self.buffer.insert(byte_idx, c);
        self.cursor += 1;
    }

    fn remove_char_before_cursor(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let byte_idx = self.char_to_byte_index(self.cursor);
            self.buffer.remove(byte_idx);
        }
    }

    fn remove_char_at_cursor(&mut self) {
        if self.cursor < self.char_count() {
            let byte_idx = self.char_to_byte_index(self.cursor);
            self.buffer.remove(byte_idx);
        }
    }

    /// Replace the buffer and move the cursor to its end
    pub fn set_buffer(&mut self, content: &str) {
        self.buffer = content.to_string();
        self.cursor = self.char_count();
    }

    /// Take the buffer for submission. Blank input stays where it is.
    fn take_submission(&mut self) -> Option<String> {
        if self.buffer.trim().is_empty() {
            return None;
        }
        let input = std::mem::take(&mut self.buffer);
        self.history.push(input.clone());
        self.cursor = 0;
        self.history_index = None;
        Some(input)
    }

    /// Handle a key event and return the action
    pub fn handle_key(&mut self, key: KeyEvent) -> InputAction {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('c') | KeyCode::Char('d') if ctrl => InputAction::Quit,
            KeyCode::Char('r') if ctrl => InputAction::Listen,
            KeyCode::Char('t') if ctrl => InputAction::ToggleTts,

            KeyCode::Enter => match self.take_submission() {
                Some(input) => InputAction::Submit(input),
                None => InputAction::None,
            },

            KeyCode::Backspace => {
                self.remove_char_before_cursor();
                InputAction::Edited
            }
            KeyCode::Delete => {
                self.remove_char_at_cursor();
                InputAction::Edited
            }
            KeyCode::Char('u') if ctrl => {
                self.buffer.clear();
                self.cursor = 0;
                InputAction::Edited
            }
            KeyCode::Char('w') if ctrl => {
                self.delete_word();
                InputAction::Edited
            }

            KeyCode::Left => {
                self.cursor = self.cursor.saturating_sub(1);
                InputAction::None
            }
            KeyCode::Right => {
                if self.cursor < self.char_count() {
                    self.cursor += 1;
                }
                InputAction::None
            }
            KeyCode::Home => {
                self.cursor = 0;
                InputAction::None
            }
            KeyCode::Char('a') if ctrl => {
                self.cursor = 0;
                InputAction::None
            }
            KeyCode::End => {
                self.cursor = self.char_count();
                InputAction::None
            }
            KeyCode::Char('e') if ctrl => {
                self.cursor = self.char_count();
                InputAction::None
            }

            KeyCode::Up => {
                self.history_prev();
                InputAction::Edited
            }
            KeyCode::Down => {
                self.history_next();
                InputAction::Edited
            }

            KeyCode::PageUp => InputAction::ScrollUp,
            KeyCode::PageDown => InputAction::ScrollDown,

            KeyCode::Esc => InputAction::Escape,

            KeyCode::Char(c) if !ctrl => {
                self.insert_char(c);
                InputAction::Edited
            }

            _ => InputAction::None,
        }
    }

    fn delete_word(&mut self) {
        let chars: Vec<char> = self.buffer.chars().collect();
        while self.cursor > 0 && chars.get(self.cursor - 1) == Some(&' ') {
            self.remove_char_before_cursor();
        }
        let chars: Vec<char> = self.buffer.chars().collect();
        while self.cursor > 0 && chars.get(self.cursor - 1) != Some(&' ') {
            self.remove_char_before_cursor();
        }
    }

    fn history_prev(&mut self) {
        if self.history.is_empty() {
            return;
        }
        let next = match self.history_index {
            None => {
                self.saved_input = self.buffer.clone();
                self.history.len() - 1
            }
            Some(0) => 0,
            Some(i) => i - 1,
        };
        self.history_index = Some(next);
        let entry = self.history[next].clone();
        self.set_buffer(&entry);
    }

    fn history_next(&mut self) {
        match self.history_index {
            None => {}
            Some(i) if i + 1 < self.history.len() => {
                self.history_index = Some(i + 1);
                let entry = self.history[i + 1].clone();
                self.set_buffer(&entry);
            }
            Some(_) => {
                self.history_index = None;
                let saved = std::mem::take(&mut self.saved_input);
                self.set_buffer(&saved);
            }
        }
    }

    /// Cursor position in terminal columns (wide characters take 2)
    pub fn cursor_display_width(&self) -> usize {
        self.buffer
            .chars()
            .take(self.cursor)
            .map(|c| unicode_width::UnicodeWidthChar::width(c).unwrap_or(1))
            .sum()
    }
}
