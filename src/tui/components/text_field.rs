//! Single-line editable text with a cursor, shared by the auth form and the
//! message input.
//!
//! The cursor is a byte offset into `buffer` that always sits on a char
//! boundary. Newlines never enter the buffer; pasted ones become spaces.

use unicode_width::UnicodeWidthStr;

use crate::tui::event::TuiEvent;

const MASK: char = '•';

#[derive(Debug, Default, Clone)]
pub struct TextField {
    buffer: String,
    cursor: usize,
    masked: bool,
}

impl TextField {
    pub fn new() -> Self {
        Self::default()
    }

    /// A field that renders every character as a bullet.
    pub fn masked() -> Self {
        Self {
            masked: true,
            ..Self::default()
        }
    }

    pub fn value(&self) -> &str {
        &self.buffer
    }

    pub fn is_blank(&self) -> bool {
        self.buffer.trim().is_empty()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.cursor = 0;
    }

    /// What the user sees: the text, or bullets for a masked field.
    pub fn display_text(&self) -> String {
        if self.masked {
            MASK.to_string().repeat(self.buffer.chars().count())
        } else {
            self.buffer.clone()
        }
    }

    /// Display columns between the start of the text and the cursor.
    pub fn cursor_column(&self) -> u16 {
        let before = &self.buffer[..self.cursor];
        let width = if self.masked {
            before.chars().count()
        } else {
            before.width()
        };
        width.min(u16::MAX as usize) as u16
    }

    /// Applies an editing event. Returns `true` if the event was consumed.
    pub fn apply(&mut self, event: &TuiEvent) -> bool {
        match event {
            TuiEvent::InputChar(c) if !c.is_control() => {
                self.buffer.insert(self.cursor, *c);
                self.cursor += c.len_utf8();
                true
            }
            TuiEvent::Paste(text) => {
                let clean: String = text
                    .chars()
                    .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
                    .filter(|c| !c.is_control())
                    .collect();
                self.buffer.insert_str(self.cursor, &clean);
                self.cursor += clean.len();
                true
            }
            TuiEvent::Backspace => {
                if self.cursor > 0 {
                    let prev = prev_char_boundary(&self.buffer, self.cursor);
                    self.buffer.drain(prev..self.cursor);
                    self.cursor = prev;
                }
                true
            }
            TuiEvent::Delete => {
                if self.cursor < self.buffer.len() {
                    let next = next_char_boundary(&self.buffer, self.cursor);
                    self.buffer.drain(self.cursor..next);
                }
                true
            }
            TuiEvent::CursorLeft => {
                self.cursor = prev_char_boundary(&self.buffer, self.cursor);
                true
            }
            TuiEvent::CursorRight => {
                self.cursor = next_char_boundary(&self.buffer, self.cursor);
                true
            }
            TuiEvent::CursorHome => {
                self.cursor = 0;
                true
            }
            TuiEvent::CursorEnd => {
                self.cursor = self.buffer.len();
                true
            }
            _ => false,
        }
    }
}

/// Byte offset of the char boundary before `pos`, or 0.
fn prev_char_boundary(text: &str, pos: usize) -> usize {
    text[..pos]
        .char_indices()
        .next_back()
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Byte offset of the char boundary after `pos`, or the end of `text`.
fn next_char_boundary(text: &str, pos: usize) -> usize {
    text[pos..]
        .char_indices()
        .nth(1)
        .map(|(i, _)| pos + i)
        .unwrap_or(text.len())
}
