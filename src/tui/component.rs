use ratatui::Frame;
use ratatui::layout::Rect;

use super::event::TuiEvent;

/// Something that draws itself into a `Rect`.
///
/// Props are plain struct fields. `render` takes `&mut self` so a component
/// can refresh its layout cache or clamp its scroll offset while drawing.
pub trait Component {
    fn render(&mut self, frame: &mut Frame, area: Rect);
}

/// Turns raw terminal input into a component-level event.
pub trait EventHandler {
    type Event;

    /// Returns `None` when the input was consumed without producing anything.
    fn handle_event(&mut self, event: &TuiEvent) -> Option<Self::Event>;
}
