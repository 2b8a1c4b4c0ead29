//! Sidebar listing who is online, each with their avatar initial.

use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, BorderType, Paragraph};

use crate::backend::Profile;
use crate::tui::component::Component;
use crate::tui::theme::{Palette, avatar_color};

pub const SIDEBAR_WIDTH: u16 = 24;

pub struct OnlineUsers<'a> {
    pub users: &'a [&'a Profile],
    pub own_id: Option<&'a str>,
    pub palette: Palette,
}

impl<'a> OnlineUsers<'a> {
    fn lines(&self) -> Vec<Line<'a>> {
        if self.users.is_empty() {
            return vec![Line::styled("Nobody online", self.palette.muted_style())];
        }
        self.users
            .iter()
            .map(|profile| {
                let color = avatar_color(&profile.avatar_color);
                let mut spans = vec![
                    Span::styled(
                        profile.initial().to_string(),
                        Style::default()
                            .bg(color)
                            .fg(Color::Black)
                            .add_modifier(Modifier::BOLD),
                    ),
                    Span::raw(" "),
                    Span::styled(profile.username.clone(), self.palette.text_style()),
                ];
                if self.own_id == Some(profile.id.as_str()) {
                    spans.push(Span::styled(" (you)", self.palette.muted_style()));
                }
                Line::from(spans)
            })
            .collect()
    }
}

impl<'a> Component for OnlineUsers<'a> {
    fn render(&mut self, frame: &mut Frame, area: Rect) {
        let block = Block::bordered()
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(self.palette.border))
            .title(format!(" Online ({}) ", self.users.len()));
        frame.render_widget(Paragraph::new(self.lines()).block(block), area);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Theme;
    use crate::test_support::profile;
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;

    fn rendered(users: &[&Profile], own_id: Option<&str>) -> String {
        let mut terminal = Terminal::new(TestBackend::new(SIDEBAR_WIDTH, 6)).unwrap();
        terminal
            .draw(|f| {
                let mut sidebar = OnlineUsers {
                    users,
                    own_id,
                    palette: Palette::for_theme(Theme::Dark),
                };
                sidebar.render(f, f.area());
            })
            .unwrap();
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|c| c.symbol())
            .collect()
    }

    #[test]
    fn test_lists_users_with_count() {
        let ada = profile("u1", "ada");
        let bob = profile("u2", "bob");
        let text = rendered(&[&ada, &bob], Some("u1"));

        assert!(text.contains("Online (2)"));
        assert!(text.contains("A ada (you)"));
        assert!(text.contains("B bob"));
    }

    #[test]
    fn test_empty_sidebar() {
        let text = rendered(&[], None);
        assert!(text.contains("Online (0)"));
        assert!(text.contains("Nobody online"));
    }
}
