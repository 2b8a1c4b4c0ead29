use chrono::{DateTime, Utc};
use ratatui::Frame;
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::widgets::Block;

use crate::backend::{Message, Profile};
use crate::core::state::App;
use crate::tui::TuiState;
use crate::tui::component::Component;
use crate::tui::components::input_box::INPUT_HEIGHT;
use crate::tui::components::online_users::SIDEBAR_WIDTH;
use crate::tui::components::{AuthForm, MessageList, OnlineUsers, TitleBar};
use crate::tui::theme::Palette;

/// Narrowest message column the sidebar is allowed to leave behind.
const MIN_CHAT_WIDTH: u16 = 30;

pub fn draw_ui(frame: &mut Frame, app: &App, tui: &mut TuiState, now: DateTime<Utc>) {
    let palette = Palette::for_theme(app.theme);
    frame.render_widget(Block::default().style(palette.text_style()), frame.area());

    if app.user.is_none() {
        let mut form = AuthForm {
            state: &tui.auth_form,
            auth: &app.auth,
            palette,
        };
        form.render(frame, frame.area());
        return;
    }

    use Constraint::{Length, Min};
    let [title_area, body_area, input_area] =
        Layout::vertical([Length(1), Min(0), Length(INPUT_HEIGHT)]).areas(frame.area());

    let (chat_area, sidebar_area) = split_sidebar(body_area, app.show_sidebar);

    let own_id = app.user_id();
    let entries: Vec<(&Message, &Profile)> = app.feed.visible(&app.profiles).collect();

    let mut list = MessageList {
        state: &mut tui.message_list,
        entries: &entries,
        own_id,
        load_state: &app.feed.load_state,
        now,
        locale: app.locale,
        palette,
    };
    list.render(frame, chat_area);

    if let Some(sidebar_area) = sidebar_area {
        let online: Vec<&Profile> = app.presence.present(now).collect();
        let mut sidebar = OnlineUsers {
            users: &online,
            own_id,
            palette,
        };
        sidebar.render(frame, sidebar_area);
    }

    let mut title_bar = TitleBar::new(
        identity(app),
        app.status_message.clone(),
        tui.message_list.has_unseen_content(),
    );
    title_bar.style = palette.muted_style();
    title_bar.render(frame, title_area);

    tui.input_box.palette = palette;
    tui.input_box.disabled = app.feed.sending;
    tui.input_box.render(frame, input_area);
}

/// Splits off the presence sidebar when it is enabled and there is room.
fn split_sidebar(area: Rect, show_sidebar: bool) -> (Rect, Option<Rect>) {
    if !show_sidebar || area.width < SIDEBAR_WIDTH + MIN_CHAT_WIDTH {
        return (area, None);
    }
    let [chat, sidebar] =
        Layout::horizontal([Constraint::Min(0), Constraint::Length(SIDEBAR_WIDTH)]).areas(area);
    (chat, Some(sidebar))
}

/// The signed-in user's username, falling back to e-mail, then id.
fn identity(app: &App) -> String {
    let Some(user) = &app.user else {
        return String::new();
    };
    app.profiles
        .get(&user.id)
        .map(|p| p.username.clone())
        .or_else(|| user.email.clone())
        .unwrap_or_else(|| user.id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::User;
    use crate::core::action::{Action, Effect, update};
    use crate::core::feed::FeedSnapshot;
    use crate::test_support::{message, profile, t0};
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;

    fn screen(app: &App, tui: &mut TuiState, width: u16) -> String {
        let mut terminal = Terminal::new(TestBackend::new(width, 20)).unwrap();
        terminal.draw(|f| draw_ui(f, app, tui, t0())).unwrap();
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|c| c.symbol())
            .collect()
    }

    fn signed_in_app() -> App {
        let mut app = App::new();
        let user = User {
            id: "u1".to_string(),
            email: Some("ada@example.com".to_string()),
        };
        let Effect::MountChat(mount) = update(&mut app, Action::SessionChanged(Some(user))) else {
            panic!("expected mount");
        };
        update(
            &mut app,
            Action::FeedLoaded {
                mount,
                snapshot: FeedSnapshot {
                    messages: vec![message("m1", "u2", "hello from bob", -30)],
                    profiles: vec![profile("u1", "ada"), profile("u2", "bob")],
                },
            },
        );
        update(
            &mut app,
            Action::PresenceLoaded {
                mount,
                profiles: vec![profile("u2", "bob")],
            },
        );
        app
    }

    #[test]
    fn test_signed_out_shows_auth_form() {
        let app = App::new();
        let mut tui = TuiState::new(&app);
        let text = screen(&app, &mut tui, 80);
        assert!(text.contains("Sign in to Natter"));
        assert!(!text.contains("Natter | "));
    }

    #[test]
    fn test_signed_in_layout() {
        let app = signed_in_app();
        let mut tui = TuiState::new(&app);
        let text = screen(&app, &mut tui, 100);

        assert!(text.contains("Natter | ada | Signed in as ada@example.com"));
        assert!(text.contains("hello from bob"));
        assert!(text.contains("Online (1)"));
        assert!(text.contains("Message (Enter to send)"));
    }

    #[test]
    fn test_sidebar_hidden_when_toggled_or_narrow() {
        let mut app = signed_in_app();
        let mut tui = TuiState::new(&app);
        assert!(!screen(&app, &mut tui, 50).contains("Online ("));

        update(&mut app, Action::ToggleSidebar);
        assert!(!screen(&app, &mut tui, 100).contains("Online ("));
    }
}
