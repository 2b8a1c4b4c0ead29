//! # MessageList Component
//!
//! Scrollable view of the room's messages.
//!
//! ## Responsibilities
//!
//! - Display the visible messages as bubbles
//! - Stick to the bottom while new messages arrive, unless scrolled away
//! - Show placeholders while loading, after a failed load, and for an empty room
//! - Cache bubble heights between frames
//!
//! ## Architecture
//!
//! `MessageList` is a transient component (created each frame) that wraps
//! `&'a mut MessageListState` (persistent state) and the visible entries
//! (props).

use chrono::{DateTime, Utc};
use ratatui::Frame;
use ratatui::layout::{Alignment, Position, Rect, Size};
use ratatui::text::Line;
use ratatui::widgets::Paragraph;
use tui_scrollview::{ScrollView, ScrollViewState, ScrollbarVisibility};

use crate::backend::{Message, Profile};
use crate::core::feed::LoadState;
use crate::core::time_format::Locale;
use crate::tui::component::{Component, EventHandler};
use crate::tui::components::message::MessageBubble;
use crate::tui::event::TuiEvent;
use crate::tui::theme::Palette;

/// Layout and scroll state for the message list.
/// Persisted in the TUI state across frames.
pub struct MessageListState {
    pub scroll_state: ScrollViewState,
    pub layout: LayoutCache,
    /// When true, auto-scroll to bottom on new content
    pub stick_to_bottom: bool,
    /// Last known viewport height (for scroll clamping between frames)
    pub viewport_height: u16,
}

impl Default for MessageListState {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageListState {
    pub fn new() -> Self {
        Self {
            scroll_state: ScrollViewState::default(),
            layout: LayoutCache::new(),
            stick_to_bottom: true,
            viewport_height: 0,
        }
    }

    fn max_offset(&self) -> u16 {
        self.layout.total_height().saturating_sub(self.viewport_height)
    }

    /// Clamp scroll offset so it never exceeds the content bounds.
    pub fn clamp_scroll(&mut self) {
        let max_y = self.max_offset();
        let current = self.scroll_state.offset();
        if current.y > max_y {
            self.scroll_state.set_offset(Position {
                x: current.x,
                y: max_y,
            });
        }
    }

    /// Re-engage auto-scroll once the user has scrolled back to the bottom.
    pub fn repin_if_at_bottom(&mut self) {
        let max_y = self.max_offset();
        let current = self.scroll_state.offset();
        if current.y >= max_y {
            self.stick_to_bottom = true;
            self.scroll_state.set_offset(Position {
                x: current.x,
                y: max_y,
            });
        }
    }

    /// Whether messages exist below the viewport the user hasn't scrolled to.
    pub fn has_unseen_content(&self) -> bool {
        !self.stick_to_bottom && self.scroll_state.offset().y < self.max_offset()
    }

    /// Forget scroll position and cached heights, e.g. after signing out.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

/// Scrollable message view.
/// Created fresh each frame with references to state and data.
pub struct MessageList<'a> {
    pub state: &'a mut MessageListState,
    pub entries: &'a [(&'a Message, &'a Profile)],
    pub own_id: Option<&'a str>,
    pub load_state: &'a LoadState,
    pub now: DateTime<Utc>,
    pub locale: Locale,
    pub palette: Palette,
}

impl<'a> MessageList<'a> {
    fn bubble(&self, index: usize) -> MessageBubble<'a> {
        let (message, author) = self.entries[index];
        MessageBubble {
            message,
            author,
            is_own: self.own_id == Some(message.user_id.as_str()),
            now: self.now,
            locale: self.locale,
            palette: self.palette,
        }
    }

    /// Centered one-line notice used while there is nothing to list.
    fn placeholder(&self) -> Option<Line<'static>> {
        if !self.entries.is_empty() {
            return None;
        }
        let line = match self.load_state {
            LoadState::Loading => Line::styled("Loading messages...", self.palette.muted_style()),
            LoadState::Failed(reason) => Line::styled(
                format!("Couldn't load messages: {reason}. Press Ctrl+L to retry."),
                ratatui::style::Style::default().fg(self.palette.error),
            ),
            LoadState::Idle | LoadState::Loaded => Line::styled(
                "No messages yet. Say hello!",
                self.palette.muted_style(),
            ),
        };
        Some(line)
    }
}

impl<'a> Component for MessageList<'a> {
    fn render(&mut self, frame: &mut Frame, area: Rect) {
        self.state.viewport_height = area.height;

        if let Some(line) = self.placeholder() {
            self.state.layout.clear();
            let y = area.y + area.height / 2;
            let row = Rect::new(area.x, y.min(area.bottom().saturating_sub(1)), area.width, 1);
            frame.render_widget(Paragraph::new(line).alignment(Alignment::Center), row);
            return;
        }

        let content_width = area.width.saturating_sub(1); // -1 for scrollbar safe area

        // 1. Update layout cache
        let reusable = self.state.layout.reusable_count(self.entries, content_width);
        self.state.layout.truncate(reusable);
        for i in reusable..self.entries.len() {
            let height = self.bubble(i).calculate_height(content_width);
            self.state.layout.push(&self.entries[i].0.id, height);
        }
        self.state.layout.set_width(content_width);

        // 2. Clamp scroll offset to prevent overscrolling past content
        if !self.state.stick_to_bottom {
            self.state.clamp_scroll();
        }

        let total_height = self.state.layout.total_height();
        let scroll_offset = if self.state.stick_to_bottom {
            total_height.saturating_sub(area.height)
        } else {
            self.state.scroll_state.offset().y
        };
        let visible_range = self.state.layout.visible_range(scroll_offset, area.height);

        // 3. Render visible bubbles into a ScrollView
        let mut scroll_view = ScrollView::new(Size::new(content_width, total_height))
            .vertical_scrollbar_visibility(ScrollbarVisibility::Automatic)
            .horizontal_scrollbar_visibility(ScrollbarVisibility::Never);

        let mut y_offset = self.state.layout.top_of(visible_range.start);
        for i in visible_range {
            let height = self.state.layout.heights[i];
            let rect = Rect::new(0, y_offset, content_width, height);
            scroll_view.render_widget(self.bubble(i), rect);
            y_offset = y_offset.saturating_add(height);
        }

        if self.state.stick_to_bottom {
            self.state.scroll_state.scroll_to_bottom();
        }

        frame.render_stateful_widget(scroll_view, area, &mut self.state.scroll_state);
    }
}

/// EventHandler lives on `MessageListState` because `MessageList` is rebuilt
/// every frame and can't hold the scroll position.
impl EventHandler for MessageListState {
    type Event = ();

    fn handle_event(&mut self, event: &TuiEvent) -> Option<Self::Event> {
        match event {
            TuiEvent::ScrollUp => {
                self.scroll_state.scroll_up();
                self.stick_to_bottom = false;
            }
            TuiEvent::ScrollDown => {
                self.scroll_state.scroll_down();
                self.repin_if_at_bottom();
            }
            TuiEvent::ScrollPageUp => {
                self.scroll_state.scroll_page_up();
                self.stick_to_bottom = false;
            }
            TuiEvent::ScrollPageDown => {
                self.scroll_state.scroll_page_down();
                self.repin_if_at_bottom();
            }
            _ => {}
        }
        None
    }
}

/// Cached bubble heights, keyed by message id so a reloaded feed only
/// re-measures what changed.
pub struct LayoutCache {
    ids: Vec<String>,
    pub heights: Vec<u16>,
    prefix_heights: Vec<u16>,
    content_width: u16,
}

impl Default for LayoutCache {
    fn default() -> Self {
        Self::new()
    }
}

impl LayoutCache {
    pub fn new() -> Self {
        Self {
            ids: Vec::new(),
            heights: Vec::new(),
            prefix_heights: Vec::new(),
            content_width: 0,
        }
    }

    /// Number of leading cached heights still valid for `entries` at `content_width`.
    pub fn reusable_count(&self, entries: &[(&Message, &Profile)], content_width: u16) -> usize {
        if self.content_width != content_width {
            return 0;
        }
        self.ids
            .iter()
            .zip(entries)
            .take_while(|(id, (message, _))| **id == message.id)
            .count()
    }

    fn truncate(&mut self, len: usize) {
        self.ids.truncate(len);
        self.heights.truncate(len);
        self.prefix_heights.truncate(len);
    }

    fn push(&mut self, id: &str, height: u16) {
        let top = self.total_height();
        self.ids.push(id.to_string());
        self.heights.push(height);
        self.prefix_heights.push(top.saturating_add(height));
    }

    fn set_width(&mut self, content_width: u16) {
        self.content_width = content_width;
    }

    fn clear(&mut self) {
        self.truncate(0);
    }

    pub fn len(&self) -> usize {
        self.heights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heights.is_empty()
    }

    pub fn total_height(&self) -> u16 {
        self.prefix_heights.last().copied().unwrap_or(0)
    }

    /// Canvas row where entry `index` starts.
    fn top_of(&self, index: usize) -> u16 {
        match index {
            0 => 0,
            i => self.prefix_heights.get(i - 1).copied().unwrap_or(0),
        }
    }

    /// Entries intersecting the viewport, padded by half a screen each way.
    pub fn visible_range(&self, scroll_offset: u16, viewport_height: u16) -> std::ops::Range<usize> {
        let buffer = viewport_height / 2;
        let buffered_start = scroll_offset.saturating_sub(buffer);
        let buffered_end = scroll_offset
            .saturating_add(viewport_height)
            .saturating_add(buffer);

        let start = self
            .prefix_heights
            .partition_point(|&end| end <= buffered_start);
        let end = self
            .prefix_heights
            .partition_point(|&end| end < buffered_end)
            .saturating_add(1)
            .min(self.prefix_heights.len());

        start..end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Theme;
    use crate::test_support::{message, profile, t0};
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;

    fn draw(
        state: &mut MessageListState,
        entries: &[(&Message, &Profile)],
        load_state: &LoadState,
        width: u16,
        height: u16,
    ) -> String {
        let mut terminal = Terminal::new(TestBackend::new(width, height)).unwrap();
        terminal
            .draw(|f| {
                let mut list = MessageList {
                    state: &mut *state,
                    entries,
                    own_id: Some("u1"),
                    load_state,
                    now: t0(),
                    locale: Locale::En,
                    palette: Palette::for_theme(Theme::Dark),
                };
                list.render(f, f.area());
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
    fn test_placeholders() {
        let mut state = MessageListState::new();
        let text = draw(&mut state, &[], &LoadState::Loading, 60, 5);
        assert!(text.contains("Loading messages..."));

        let text = draw(&mut state, &[], &LoadState::Loaded, 60, 5);
        assert!(text.contains("No messages yet"));

        let failed = LoadState::Failed("offline".to_string());
        let text = draw(&mut state, &[], &failed, 80, 5);
        assert!(text.contains("Ctrl+L"));
    }

    #[test]
    fn test_renders_messages_and_caches_heights() {
        let ada = profile("u1", "ada");
        let bob = profile("u2", "bob");
        let m1 = message("m1", "u1", "hi bob", 0);
        let m2 = message("m2", "u2", "hey ada", 1);
        let entries = vec![(&m1, &ada), (&m2, &bob)];

        let mut state = MessageListState::new();
        let text = draw(&mut state, &entries, &LoadState::Loaded, 60, 20);

        assert!(text.contains("hi bob"));
        assert!(text.contains("hey ada"));
        assert_eq!(state.layout.len(), 2);
        assert_eq!(state.layout.reusable_count(&entries, 59), 2);
        assert_eq!(state.layout.reusable_count(&entries, 40), 0);
    }

    #[test]
    fn test_reload_invalidates_from_first_changed_id() {
        let ada = profile("u1", "ada");
        let m1 = message("m1", "u1", "one", 0);
        let m2 = message("m2", "u1", "two", 1);
        let m3 = message("m3", "u1", "three", 2);

        let mut state = MessageListState::new();
        draw(&mut state, &[(&m1, &ada), (&m2, &ada)], &LoadState::Loaded, 60, 20);

        let reloaded = vec![(&m1, &ada), (&m3, &ada)];
        assert_eq!(state.layout.reusable_count(&reloaded, 59), 1);
    }

    #[test]
    fn test_scroll_up_unpins_and_scroll_down_repins() {
        let ada = profile("u1", "ada");
        let messages: Vec<Message> = (0..20)
            .map(|i| message(&format!("m{i}"), "u1", "line", i))
            .collect();
        let entries: Vec<(&Message, &Profile)> = messages.iter().map(|m| (m, &ada)).collect();

        let mut state = MessageListState::new();
        draw(&mut state, &entries, &LoadState::Loaded, 40, 10);
        assert!(state.stick_to_bottom);
        assert!(!state.has_unseen_content());

        state.handle_event(&TuiEvent::ScrollPageUp);
        assert!(!state.stick_to_bottom);
        assert!(state.has_unseen_content());

        for _ in 0..200 {
            state.handle_event(&TuiEvent::ScrollDown);
        }
        assert!(state.stick_to_bottom);
    }

    #[test]
    fn test_visible_range() {
        let mut cache = LayoutCache::new();
        for i in 0..10 {
            cache.push(&format!("m{i}"), 4);
        }
        assert_eq!(cache.total_height(), 40);
        assert_eq!(cache.top_of(3), 12);

        // viewport rows 20..28, padded by 4 each side: rows 16..32
        assert_eq!(cache.visible_range(20, 8), 4..8);
    }
}
