use chrono::{DateTime, Utc};
use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, BorderType, Padding, Paragraph, Widget, Wrap};
use unicode_width::UnicodeWidthStr;

use crate::backend::{Message, Profile};
use crate::core::time_format::{Locale, format_relative};
use crate::tui::theme::{Palette, avatar_color};

/// Horizontal padding (per side) between the border and text content.
const CONTENT_PAD_H: u16 = 1;
/// Total horizontal space consumed by borders (1 left + 1 right) and padding.
const HORIZONTAL_OVERHEAD: u16 = 2 + CONTENT_PAD_H * 2;
/// Total vertical space consumed by borders (1 top + 1 bottom).
const VERTICAL_OVERHEAD: u16 = 2;
/// Blank row kept under each bubble.
const GAP: u16 = 1;
/// Bubbles never grow past this share of the row, in percent.
const MAX_WIDTH_PERCENT: u16 = 80;

/// One chat message drawn as a bubble: avatar initial, username and relative
/// time in the border title, content inside. The signed-in user's own
/// messages sit on the right.
///
/// `MessageBubble` is a transient component, rebuilt every frame from the
/// message, its author, and the clock.
#[derive(Clone, Copy)]
pub struct MessageBubble<'a> {
    pub message: &'a Message,
    pub author: &'a Profile,
    pub is_own: bool,
    pub now: DateTime<Utc>,
    pub locale: Locale,
    pub palette: Palette,
}

impl<'a> MessageBubble<'a> {
    fn time_label(&self) -> String {
        format_relative(self.message.created_at, self.now, self.locale)
    }

    fn header_width(&self) -> usize {
        // "A" + " " + username + " · " + time
        2 + self.author.username.width() + 3 + self.time_label().width()
    }

    /// Width of the bubble inside a row of `row_width` columns.
    ///
    /// Content and usernames are unbounded, so the sums run in `usize` and
    /// only the final value is narrowed.
    fn bubble_width(&self, row_width: u16) -> u16 {
        let row = usize::from(row_width);
        let max_width = (row * usize::from(MAX_WIDTH_PERCENT) / 100)
            .max(usize::from(HORIZONTAL_OVERHEAD) + 1);
        let content_width = self
            .message
            .content
            .lines()
            .map(|line| line.width())
            .max()
            .unwrap_or(0);
        let needed = content_width.max(self.header_width() + 2) + usize::from(HORIZONTAL_OVERHEAD);
        let width = needed.min(max_width).min(row);
        u16::try_from(width).unwrap_or(u16::MAX)
    }

    /// Rows this message occupies in a list `row_width` columns wide,
    /// including the gap below it.
    ///
    /// Uses `textwrap` with options that match `Paragraph` wrapping, so
    /// the list can size its canvas without rendering.
    pub fn calculate_height(&self, row_width: u16) -> u16 {
        let inner = self.bubble_width(row_width).saturating_sub(HORIZONTAL_OVERHEAD);
        if inner == 0 {
            return 1;
        }
        let content = self.message.content.trim();
        if content.is_empty() {
            return VERTICAL_OVERHEAD + GAP;
        }
        let options = textwrap::Options::new(inner as usize)
            .break_words(true)
            .word_separator(textwrap::WordSeparator::AsciiSpace);
        let lines = u16::try_from(textwrap::wrap(content, options).len()).unwrap_or(u16::MAX);
        lines
            .max(1)
            .saturating_add(VERTICAL_OVERHEAD + GAP)
    }

    fn title(&self) -> Line<'a> {
        let color = avatar_color(&self.author.avatar_color);
        Line::from(vec![
            Span::styled(
                self.author.initial().to_string(),
                Style::default()
                    .bg(color)
                    .fg(Color::Black)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw(" "),
            Span::styled(
                self.author.username.clone(),
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            ),
            Span::styled(format!(" · {}", self.time_label()), self.palette.muted_style()),
        ])
    }
}

impl<'a> Widget for MessageBubble<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let width = self.bubble_width(area.width);
        let height = area.height.saturating_sub(GAP).max(1);
        let x = if self.is_own {
            area.right().saturating_sub(width)
        } else {
            area.x
        };
        let bubble = Rect::new(x, area.y, width, height);

        let border_style = if self.is_own {
            Style::default().fg(self.palette.own_bubble)
        } else {
            Style::default().fg(self.palette.border)
        };

        let block = Block::bordered()
            .border_type(BorderType::Rounded)
            .border_style(border_style)
            .title(self.title())
            .padding(Padding::horizontal(CONTENT_PAD_H));

        Paragraph::new(self.message.content.trim())
            .block(block)
            .style(self.palette.text_style())
            .wrap(Wrap { trim: true })
            .render(bubble, buf);
    }
}
