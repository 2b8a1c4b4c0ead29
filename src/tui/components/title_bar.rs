//! # TitleBar Component
//!
//! Top status bar showing who is signed in and what is going on.
//!
//! ## Responsibilities
//!
//! - Display the signed-in identity
//! - Display status messages (e.g., "Signed in as ...", "Message not sent: ...")
//! - Show "↓ New" indicator when there's unseen content below scroll
//!
//! TitleBar is purely presentational: it receives all data as props and has
//! no internal state.
//!
//! The text collapses based on what it has to say:
//!
//! 1. **Unseen content**: `"Natter | ada | Signed in as ada@example.com | ↓ New"`
//! 2. **Status message**: `"Natter | ada | Signed in as ada@example.com"`
//! 3. **Default**: `"Natter | ada"`

use crate::tui::component::Component;
use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::style::Style;
use ratatui::text::Span;

pub struct TitleBar {
    /// Username or email of the signed-in user
    pub identity: String,
    /// Transient status, empty when there's nothing to report
    pub status_message: String,
    /// Whether there's content below the current scroll position
    pub has_unseen_content: bool,
    pub style: Style,
}

impl TitleBar {
    pub fn new(identity: String, status_message: String, has_unseen_content: bool) -> Self {
        Self {
            identity,
            status_message,
            has_unseen_content,
            style: Style::default(),
        }
    }

    fn text(&self) -> String {
        let mut parts = vec!["Natter", self.identity.as_str()];
        if !self.status_message.is_empty() {
            parts.push(self.status_message.as_str());
        }
        if self.has_unseen_content {
            parts.push("↓ New");
        }
        parts.join(" | ")
    }
}

impl Component for TitleBar {
    fn render(&mut self, frame: &mut Frame, area: Rect) {
        frame.render_widget(Span::styled(self.text(), self.style), area);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;

    fn rendered(title_bar: &mut TitleBar) -> String {
        let backend = TestBackend::new(80, 1);
        let mut terminal = Terminal::new(backend).unwrap();
        terminal
            .draw(|f| {
                title_bar.render(f, f.area());
            })
            .unwrap();
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|c| c.symbol())
            .collect::<String>()
    }

    #[test]
    fn test_title_bar_with_unseen_content() {
        let mut title_bar = TitleBar::new("ada".to_string(), "Signed in as ada@x.io".to_string(), true);
        let text = rendered(&mut title_bar);

        assert!(text.contains("Natter | ada"));
        assert!(text.contains("Signed in as ada@x.io"));
        assert!(text.contains("↓ New"));
    }

    #[test]
    fn test_title_bar_unseen_without_status() {
        let title_bar = TitleBar::new("ada".to_string(), String::new(), true);
        assert_eq!(title_bar.text(), "Natter | ada | ↓ New");
    }

    #[test]
    fn test_title_bar_default_no_status() {
        let mut title_bar = TitleBar::new("ada".to_string(), String::new(), false);
        let text = rendered(&mut title_bar);

        assert!(text.contains("Natter | ada"));
        assert_eq!(text.matches('|').count(), 1);
        assert!(!text.contains("↓ New"));
    }
}
