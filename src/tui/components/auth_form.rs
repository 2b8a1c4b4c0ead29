//! # AuthForm Component
//!
//! The signed-out screen: a centered form that signs in or creates an
//! account.
//!
//! ## Responsibilities
//!
//! - Switch between sign-in and sign-up (Ctrl+S)
//! - Move focus between fields (Tab / Shift+Tab / Up / Down)
//! - Emit an [`AuthRequest`] on Enter
//! - Show the pending state, the last error, and any notice
//!
//! Field checks (required email, password, username) happen in the session
//! store so every entry point gets the same messages.

use ratatui::Frame;
use ratatui::layout::{Constraint, Flex, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::Line;
use ratatui::widgets::{Block, BorderType, Clear, Paragraph, Wrap};

use crate::core::action::AuthRequest;
use crate::core::state::AuthState;
use crate::tui::component::{Component, EventHandler};
use crate::tui::components::text_field::TextField;
use crate::tui::event::TuiEvent;
use crate::tui::theme::Palette;

const FORM_WIDTH: u16 = 48;
const FIELD_HEIGHT: u16 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    #[default]
    SignIn,
    SignUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Username,
    Email,
    Password,
}

impl Field {
    fn label(self) -> &'static str {
        match self {
            Field::Username => " Username ",
            Field::Email => " Email ",
            Field::Password => " Password ",
        }
    }
}

impl AuthMode {
    fn fields(self) -> &'static [Field] {
        match self {
            AuthMode::SignIn => &[Field::Email, Field::Password],
            AuthMode::SignUp => &[Field::Username, Field::Email, Field::Password],
        }
    }

    fn title(self) -> &'static str {
        match self {
            AuthMode::SignIn => " Sign in to Natter ",
            AuthMode::SignUp => " Create a Natter account ",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuthFormEvent {
    Submit(AuthRequest),
    ModeChanged(AuthMode),
}

/// Form contents and focus. Lives in the TUI state so typed text survives
/// a failed attempt.
#[derive(Debug, Clone)]
pub struct AuthFormState {
    pub mode: AuthMode,
    focus: usize,
    username: TextField,
    email: TextField,
    password: TextField,
}

impl Default for AuthFormState {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthFormState {
    pub fn new() -> Self {
        Self {
            mode: AuthMode::SignIn,
            focus: 0,
            username: TextField::new(),
            email: TextField::new(),
            password: TextField::masked(),
        }
    }

    pub fn focused(&self) -> Field {
        let fields = self.mode.fields();
        fields[self.focus.min(fields.len() - 1)]
    }

    fn field(&self, field: Field) -> &TextField {
        match field {
            Field::Username => &self.username,
            Field::Email => &self.email,
            Field::Password => &self.password,
        }
    }

    fn field_mut(&mut self, field: Field) -> &mut TextField {
        match field {
            Field::Username => &mut self.username,
            Field::Email => &mut self.email,
            Field::Password => &mut self.password,
        }
    }

    fn move_focus(&mut self, forward: bool) {
        let count = self.mode.fields().len();
        self.focus = if forward {
            (self.focus + 1) % count
        } else {
            (self.focus + count - 1) % count
        };
    }

    fn toggle_mode(&mut self) {
        let current = self.focused();
        self.mode = match self.mode {
            AuthMode::SignIn => AuthMode::SignUp,
            AuthMode::SignUp => AuthMode::SignIn,
        };
        // Keep the cursor on the same field when it exists in both modes.
        self.focus = self
            .mode
            .fields()
            .iter()
            .position(|f| *f == current)
            .unwrap_or(0);
    }

    fn request(&self) -> AuthRequest {
        let email = self.email.value().to_string();
        let password = self.password.value().to_string();
        match self.mode {
            AuthMode::SignIn => AuthRequest::SignIn { email, password },
            AuthMode::SignUp => AuthRequest::SignUp {
                email,
                password,
                username: self.username.value().to_string(),
            },
        }
    }

    /// Clears the password after the session changes hands.
    pub fn reset_secret(&mut self) {
        self.password.clear();
    }
}

impl EventHandler for AuthFormState {
    type Event = AuthFormEvent;

    fn handle_event(&mut self, event: &TuiEvent) -> Option<Self::Event> {
        match event {
            TuiEvent::Submit => Some(AuthFormEvent::Submit(self.request())),
            TuiEvent::ToggleAuthMode => {
                self.toggle_mode();
                Some(AuthFormEvent::ModeChanged(self.mode))
            }
            TuiEvent::FocusNext | TuiEvent::CursorDown => {
                self.move_focus(true);
                None
            }
            TuiEvent::FocusPrev | TuiEvent::CursorUp => {
                self.move_focus(false);
                None
            }
            other => {
                let field = self.focused();
                self.field_mut(field).apply(other);
                None
            }
        }
    }
}

/// Transient view over [`AuthFormState`] and the core [`AuthState`].
pub struct AuthForm<'a> {
    pub state: &'a AuthFormState,
    pub auth: &'a AuthState,
    pub palette: Palette,
}

impl<'a> AuthForm<'a> {
    fn footer(&self) -> Vec<Line<'static>> {
        let mut lines = Vec::new();
        if self.auth.pending {
            lines.push(Line::styled("Loading...", self.palette.muted_style()));
        } else if let Some(error) = &self.auth.error {
            lines.push(Line::styled(
                error.clone(),
                Style::default().fg(self.palette.error),
            ));
        } else if let Some(notice) = &self.auth.notice {
            lines.push(Line::styled(
                notice.clone(),
                Style::default().fg(self.palette.accent),
            ));
        }
        let hint = match self.state.mode {
            AuthMode::SignIn => "Enter: sign in · Ctrl+S: create account · Esc: quit",
            AuthMode::SignUp => "Enter: sign up · Ctrl+S: back to sign in · Esc: quit",
        };
        lines.push(Line::styled(hint, self.palette.muted_style()));
        lines
    }
}

impl<'a> Component for AuthForm<'a> {
    fn render(&mut self, frame: &mut Frame, area: Rect) {
        let fields = self.state.mode.fields();
        let footer = self.footer();
        // fields + 2 borders + 1 spacer + footer (wrapped onto up to two rows each)
        let height = fields.len() as u16 * FIELD_HEIGHT + 3 + footer.len() as u16 * 2;

        let [row] = Layout::vertical([Constraint::Length(height)])
            .flex(Flex::Center)
            .areas(area);
        let [form_area] = Layout::horizontal([Constraint::Length(FORM_WIDTH)])
            .flex(Flex::Center)
            .areas(row);

        frame.render_widget(Clear, form_area);
        let outer = Block::bordered()
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(self.palette.accent))
            .title(self.state.mode.title());
        let inner = outer.inner(form_area);
        frame.render_widget(outer, form_area);

        let mut constraints: Vec<Constraint> =
            fields.iter().map(|_| Constraint::Length(FIELD_HEIGHT)).collect();
        constraints.push(Constraint::Length(1));
        constraints.push(Constraint::Min(0));
        let rows = Layout::vertical(constraints).split(inner);

        let focused = self.state.focused();
        for (i, field) in fields.iter().enumerate() {
            let is_focused = *field == focused;
            let border = if is_focused {
                Style::default()
                    .fg(self.palette.accent)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(self.palette.border)
            };
            let text_field = self.state.field(*field);
            let block = Block::bordered()
                .border_type(BorderType::Rounded)
                .border_style(border)
                .title(field.label());
            frame.render_widget(
                Paragraph::new(text_field.display_text())
                    .block(block)
                    .style(self.palette.text_style()),
                rows[i],
            );

            if is_focused && !self.auth.pending {
                let x = rows[i].x + 1 + text_field.cursor_column();
                frame.set_cursor_position((x.min(rows[i].right().saturating_sub(2)), rows[i].y + 1));
            }
        }

        frame.render_widget(
            Paragraph::new(footer).wrap(Wrap { trim: true }),
            rows[fields.len() + 1],
        );
    }
}
