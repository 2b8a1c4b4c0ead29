//! # InputBox Component
//!
//! The message composer at the bottom of the chat view.
//!
//! ## Responsibilities
//!
//! - Capture text input (via [`TextField`])
//! - Emit `Submit` on Enter when there is something to send
//! - Grey out while a send is in flight
//!
//! The buffer is NOT cleared on submit. The parent clears it once the send
//! succeeds, so a failed send leaves the text in place for another try.

use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::style::Style;
use ratatui::widgets::{Block, BorderType, Paragraph};
use unicode_width::UnicodeWidthChar;

use crate::tui::component::{Component, EventHandler};
use crate::tui::components::text_field::TextField;
use crate::tui::event::TuiEvent;
use crate::tui::theme::Palette;

/// Border (2) + padding (2) consumed horizontally by the bordered block
const HORIZONTAL_OVERHEAD: u16 = 4;
pub const INPUT_HEIGHT: u16 = 3;

/// High-level events emitted by the InputBox
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    /// User submitted the text (Enter pressed)
    Submit(String),
    ContentChanged,
}

pub struct InputBox {
    field: TextField,
    /// A send is in flight (Prop)
    pub disabled: bool,
    /// Colours (Prop)
    pub palette: Palette,
}

impl InputBox {
    pub fn new(palette: Palette) -> Self {
        Self {
            field: TextField::new(),
            disabled: false,
            palette,
        }
    }

    pub fn value(&self) -> &str {
        self.field.value()
    }

    pub fn clear(&mut self) {
        self.field.clear();
    }
}

/// Drops leading characters until `text` fits in `width` columns with the
/// cursor still visible. Returns the visible slice and the columns skipped.
fn visible_tail(text: &str, cursor_col: u16, width: u16) -> (String, u16) {
    if width == 0 || cursor_col < width {
        return (text.to_string(), 0);
    }
    let overflow = cursor_col + 1 - width;
    let mut skipped = 0u16;
    let mut chars = text.chars();
    while skipped < overflow {
        match chars.next() {
            Some(c) => skipped += c.width().unwrap_or(0) as u16,
            None => break,
        }
    }
    (chars.collect(), skipped)
}

impl Component for InputBox {
    fn render(&mut self, frame: &mut Frame, area: Rect) {
        let inner_width = area.width.saturating_sub(HORIZONTAL_OVERHEAD);
        let (title, style) = if self.disabled {
            (" Sending... ", self.palette.muted_style())
        } else {
            (" Message (Enter to send) ", Style::default().fg(self.palette.accent))
        };

        let cursor_col = self.field.cursor_column();
        let (visible, skipped) = visible_tail(self.field.value(), cursor_col, inner_width);

        let block = Block::bordered()
            .border_type(BorderType::Rounded)
            .border_style(style)
            .title(title)
            .padding(ratatui::widgets::Padding::horizontal(1));

        let input = Paragraph::new(visible)
            .block(block)
            .style(self.palette.text_style());
        frame.render_widget(input, area);

        if !self.disabled && area.height >= INPUT_HEIGHT {
            let x = area.x + 2 + (cursor_col - skipped);
            frame.set_cursor_position((x.min(area.right().saturating_sub(2)), area.y + 1));
        }
    }
}

impl EventHandler for InputBox {
    type Event = InputEvent;

    fn handle_event(&mut self, event: &TuiEvent) -> Option<Self::Event> {
        match event {
            TuiEvent::Submit => {
                if self.disabled || self.field.is_blank() {
                    None
                } else {
                    Some(InputEvent::Submit(self.field.value().to_string()))
                }
            }
            other => self
                .field
                .apply(other)
                .then_some(InputEvent::ContentChanged),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Theme;
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;

    fn input_box() -> InputBox {
        InputBox::new(Palette::for_theme(Theme::Dark))
    }

    fn type_text(input: &mut InputBox, text: &str) {
        for c in text.chars() {
            input.handle_event(&TuiEvent::InputChar(c));
        }
    }

    #[test]
    fn test_submit_keeps_buffer() {
        let mut input = input_box();
        type_text(&mut input, "hello");

        let res = input.handle_event(&TuiEvent::Submit);
        assert_eq!(res, Some(InputEvent::Submit("hello".to_string())));
        assert_eq!(input.value(), "hello");

        input.clear();
        assert!(input.value().is_empty());
    }

    #[test]
    fn test_blank_submit_is_ignored() {
        let mut input = input_box();
        type_text(&mut input, "   ");
        assert_eq!(input.handle_event(&TuiEvent::Submit), None);
    }

    #[test]
    fn test_disabled_refuses_submit() {
        let mut input = input_box();
        type_text(&mut input, "hi");
        input.disabled = true;
        assert_eq!(input.handle_event(&TuiEvent::Submit), None);
    }

    #[test]
    fn test_visible_tail_keeps_cursor_in_view() {
        assert_eq!(visible_tail("hello", 5, 10), ("hello".to_string(), 0));
        let (shown, skipped) = visible_tail("abcdefghij", 10, 4);
        assert_eq!(skipped, 7);
        assert_eq!(shown, "hij");
    }

    #[test]
    fn test_render_shows_sending_title() {
        let backend = TestBackend::new(40, 3);
        let mut terminal = Terminal::new(backend).unwrap();
        let mut input = input_box();
        input.disabled = true;

        terminal.draw(|f| input.render(f, f.area())).unwrap();

        let text = terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|c| c.symbol())
            .collect::<String>();
        assert!(text.contains("Sending..."));
    }
}
