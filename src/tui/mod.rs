//! # TUI Adapter
//!
//! The ratatui-specific layer. Handles terminal I/O, renders the UI,
//! translates keyboard events into core::Action values, and carries out the
//! effects `update()` asks for.
//!
//! This is the only module that knows about ratatui and crossterm.
//!
//! ## Redraw Strategy
//!
//! The loop redraws after input, after any background action, and once a
//! second so relative timestamps and presence leases stay current. Otherwise
//! it sleeps in `poll`.
//!
//! ## Background Work
//!
//! Network calls run on `tokio::spawn` and report back as `Action`s over a
//! `std::sync::mpsc` channel. Everything a chat view starts is tracked by
//! its [`Mount`], which aborts it on unmount.

mod component;
mod components;
mod event;
mod theme;
mod ui;

use log::{debug, info, warn};
use std::future::Future;
use std::io::stdout;
use std::sync::{Arc, mpsc};
use std::time::{Duration, Instant};

use crossterm::cursor::{SetCursorStyle, Show};
use crossterm::event::{
    DisableBracketedPaste, DisableMouseCapture, EnableBracketedPaste, EnableMouseCapture,
    KeyboardEnhancementFlags, PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
};
use crossterm::execute;

use crate::backend::{Backend, ChangeEvent, ChangeFilter, Message, Table};
use crate::core::action::{Action, AuthRequest, Effect, update};
use crate::core::config::ResolvedConfig;
use crate::core::feed::load_feed;
use crate::core::mount::Mount;
use crate::core::profiles::ProfileCache;
use crate::core::session::{SessionStore, SignUpOutcome};
use crate::core::state::{App, MountId};
use crate::tui::component::EventHandler;
use crate::tui::components::{AuthFormEvent, AuthFormState, InputBox, InputEvent, MessageListState};
use crate::tui::event::{TuiEvent, poll_event_immediate, poll_event_timeout};
use crate::tui::theme::Palette;

/// Longest the loop sleeps waiting for input.
const POLL_TIMEOUT: Duration = Duration::from_millis(250);
/// Redraw at least this often so "N min ago" labels move on their own.
const CLOCK_TICK: Duration = Duration::from_secs(1);

/// TUI-specific presentation state (not part of core business logic)
pub struct TuiState {
    pub message_list: MessageListState,
    pub input_box: InputBox,
    pub auth_form: AuthFormState,
}

impl TuiState {
    pub fn new(app: &App) -> Self {
        Self {
            message_list: MessageListState::new(),
            input_box: InputBox::new(Palette::for_theme(app.theme)),
            auth_form: AuthFormState::new(),
        }
    }
}

struct TerminalModeGuard;

impl TerminalModeGuard {
    fn new() -> std::io::Result<Self> {
        // Kitty keyboard protocol is ignored by terminals that don't support it
        execute!(
            stdout(),
            EnableMouseCapture,
            EnableBracketedPaste,
            Show,
            SetCursorStyle::SteadyBlock,
            PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES)
        )?;
        info!("Terminal modes enabled (mouse, bracketed paste, steady block cursor)");
        Ok(Self)
    }
}

impl Drop for TerminalModeGuard {
    fn drop(&mut self) {
        let _ = execute!(
            stdout(),
            PopKeyboardEnhancementFlags,
            DisableMouseCapture,
            DisableBracketedPaste
        );
    }
}

/// Runs the chat client until the user quits. Must be called from inside a
/// tokio runtime. The caller keeps `store` and tears it down afterwards.
pub fn run(config: &ResolvedConfig, store: Arc<SessionStore>) -> std::io::Result<()> {
    let mut app = App::from_config(config);
    let mut tui = TuiState::new(&app);

    let mut terminal = ratatui::init();
    let _terminal_mode_guard = TerminalModeGuard::new();

    // Channel for actions from background tasks
    let (tx, rx) = mpsc::channel();
    let mut executor = Executor::new(store.clone(), config.history_limit, tx.clone());

    let session_watch = spawn_session_watch(&store, tx);
    let mut should_quit = dispatch(
        &mut app,
        &mut tui,
        &mut executor,
        Action::SessionChanged(store.current_user()),
    );

    let mut needs_redraw = true;
    let mut last_tick = Instant::now();

    while !should_quit {
        if last_tick.elapsed() >= CLOCK_TICK {
            needs_redraw = true;
            last_tick = Instant::now();
        }

        if needs_redraw {
            let now = chrono::Utc::now();
            terminal.draw(|f| ui::draw_ui(f, &app, &mut tui, now))?;
            needs_redraw = false;
        }

        // Process first event + drain ALL pending events before next draw
        let first_event = poll_event_timeout(POLL_TIMEOUT);
        if first_event.is_some() {
            needs_redraw = true;
        }
        for event in first_event
            .into_iter()
            .chain(std::iter::from_fn(poll_event_immediate))
        {
            if let Some(action) = route_event(&app, &mut tui, event) {
                should_quit |= dispatch(&mut app, &mut tui, &mut executor, action);
            }
        }

        // Handle background task actions
        while let Ok(action) = rx.try_recv() {
            needs_redraw = true;
            debug!("Event loop received: {:?}", action);
            should_quit |= dispatch(&mut app, &mut tui, &mut executor, action);
        }
    }

    info!("Leaving chat");
    executor.unmount();
    session_watch.abort();
    ratatui::restore();
    Ok(())
}

/// Maps a terminal event to an action, letting the focused component
/// consume it first. Returns `None` when the event was purely local.
fn route_event(app: &App, tui: &mut TuiState, event: TuiEvent) -> Option<Action> {
    match event {
        TuiEvent::Resize => return None,
        TuiEvent::ForceQuit | TuiEvent::Escape => return Some(Action::Quit),
        TuiEvent::ToggleTheme => return Some(Action::ToggleTheme),
        _ => {}
    }

    if app.user.is_none() {
        return match tui.auth_form.handle_event(&event)? {
            AuthFormEvent::Submit(request) => Some(Action::SubmitAuth(request)),
            AuthFormEvent::ModeChanged(mode) => {
                debug!("Auth form switched to {:?}", mode);
                None
            }
        };
    }

    match event {
        TuiEvent::ToggleSidebar => Some(Action::ToggleSidebar),
        TuiEvent::RetryLoad => Some(Action::RetryLoad),
        TuiEvent::SignOut => Some(Action::SignOut),
        TuiEvent::ScrollUp | TuiEvent::CursorUp => {
            tui.message_list.handle_event(&TuiEvent::ScrollUp);
            None
        }
        TuiEvent::ScrollDown | TuiEvent::CursorDown => {
            tui.message_list.handle_event(&TuiEvent::ScrollDown);
            None
        }
        TuiEvent::ScrollPageUp | TuiEvent::ScrollPageDown => {
            tui.message_list.handle_event(&event);
            None
        }
        other => match tui.input_box.handle_event(&other)? {
            InputEvent::Submit(text) => Some(Action::SendMessage(text)),
            InputEvent::ContentChanged => None,
        },
    }
}

/// Runs `action` through the reducer and executes the resulting effect.
/// Returns `true` when the app should quit.
fn dispatch(app: &mut App, tui: &mut TuiState, executor: &mut Executor, action: Action) -> bool {
    let effect = update(app, action);
    executor.execute(effect, tui)
}

/// Forwards every session change published by the store as an action.
fn spawn_session_watch(
    store: &SessionStore,
    tx: mpsc::Sender<Action>,
) -> tokio::task::JoinHandle<()> {
    let mut session_rx = store.subscribe();
    tokio::spawn(async move {
        while session_rx.changed().await.is_ok() {
            let user = session_rx.borrow_and_update().clone();
            if tx.send(Action::SessionChanged(user)).is_err() {
                break;
            }
        }
    })
}

fn send(tx: &mpsc::Sender<Action>, action: Action) {
    if tx.send(action).is_err() {
        warn!("Failed to deliver action: receiver dropped");
    }
}

/// Carries out effects: spawns background work and owns the current mount.
struct Executor {
    store: Arc<SessionStore>,
    backend: Arc<dyn Backend>,
    history_limit: usize,
    tx: mpsc::Sender<Action>,
    mount: Option<Mount>,
}

impl Executor {
    fn new(store: Arc<SessionStore>, history_limit: usize, tx: mpsc::Sender<Action>) -> Self {
        let backend = store.backend();
        Self {
            store,
            backend,
            history_limit,
            tx,
            mount: None,
        }
    }

    /// Returns `true` when the app should quit.
    fn execute(&mut self, effect: Effect, tui: &mut TuiState) -> bool {
        match effect {
            Effect::None => {}
            Effect::Quit => return true,
            Effect::Authenticate(request) => self.authenticate(request),
            Effect::SignOut => self.sign_out(),
            Effect::MountChat(id) => {
                tui.message_list.reset();
                tui.input_box.clear();
                tui.auth_form.reset_secret();
                self.mount_chat(id);
            }
            Effect::UnmountChat => {
                tui.message_list.reset();
                tui.input_box.clear();
                tui.auth_form.reset_secret();
                self.unmount();
            }
            Effect::LoadFeed { mount, known } => {
                if let Some(mount) = self.current(mount) {
                    spawn_load(
                        self.backend.clone(),
                        mount,
                        self.history_limit,
                        known,
                        self.tx.clone(),
                    );
                }
            }
            Effect::FetchProfile { mount, user_id } => {
                let backend = self.backend.clone();
                let tx = self.tx.clone();
                self.spawn_for(mount, async move {
                    let error = match backend.profile(&user_id).await {
                        Ok(Some(profile)) => {
                            send(&tx, Action::ProfileResolved { mount, profile });
                            return;
                        }
                        Ok(None) => "no profile row".to_string(),
                        Err(e) => e.to_string(),
                    };
                    warn!("Failed to fetch profile {}: {}", user_id, error);
                    send(&tx, Action::ProfileFailed { mount, user_id, error });
                });
            }
            Effect::FetchPresence(mount) => {
                let backend = self.backend.clone();
                let tx = self.tx.clone();
                self.spawn_for(mount, async move {
                    match backend.online_profiles().await {
                        Ok(profiles) => send(&tx, Action::PresenceLoaded { mount, profiles }),
                        Err(e) => {
                            warn!("Failed to fetch online users: {}", e);
                            send(&tx, Action::PresenceFailed { mount, error: e.to_string() });
                        }
                    }
                });
            }
            Effect::Resubscribe { mount, table } => {
                if let Some(mount) = self.current(mount).cloned() {
                    info!("Reopening {} feed for mount {}", table.as_str(), mount.id().get());
                    self.spawn_feed(&mount, table, FeedStart::Reconnect);
                }
            }
            Effect::InsertMessage {
                mount,
                user_id,
                content,
            } => {
                let backend = self.backend.clone();
                let tx = self.tx.clone();
                self.spawn_for(mount, async move {
                    match backend.insert_message(&user_id, &content).await {
                        Ok(()) => send(&tx, Action::MessageSent { mount }),
                        Err(e) => {
                            warn!("Failed to send message: {}", e);
                            send(&tx, Action::SendFailed { mount, error: e.to_string() });
                        }
                    }
                });
            }
            Effect::ClearInput => tui.input_box.clear(),
            Effect::Batch(effects) => {
                let mut quit = false;
                for effect in effects {
                    quit |= self.execute(effect, tui);
                }
                return quit;
            }
        }
        false
    }

    fn current(&self, id: MountId) -> Option<&Mount> {
        self.mount.as_ref().filter(|m| m.id() == id)
    }

    /// Spawns `task` on behalf of mount `id`; skipped if that mount is gone.
    fn spawn_for<F>(&self, id: MountId, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match self.current(id) {
            Some(mount) => mount.track(tokio::spawn(task).abort_handle()),
            None => debug!("Skipping work for stale mount {:?}", id),
        }
    }

    fn authenticate(&self, request: AuthRequest) {
        let store = self.store.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            // Success arrives through the session watch
            let result = match request {
                AuthRequest::SignIn { email, password } => {
                    store.sign_in(&email, &password).await.map(|_| None)
                }
                AuthRequest::SignUp {
                    email,
                    password,
                    username,
                } => store
                    .sign_up(&email, &password, &username)
                    .await
                    .map(|outcome| match outcome {
                        SignUpOutcome::SignedIn(_) => None,
                        SignUpOutcome::ConfirmationRequired => Some(Action::ConfirmationRequired),
                    }),
            };
            match result {
                Ok(Some(action)) => send(&tx, action),
                Ok(None) => {}
                Err(e) => {
                    warn!("Authentication failed: {}", e);
                    send(&tx, Action::AuthFailed(e.to_string()));
                }
            }
        });
    }

    fn sign_out(&self) {
        let store = self.store.clone();
        tokio::spawn(async move {
            if let Err(e) = store.sign_out().await {
                warn!("Sign-out failed: {}", e);
            }
        });
    }

    /// Opens the two change feeds for a fresh chat view.
    fn mount_chat(&mut self, id: MountId) {
        self.unmount();
        info!("Mounting chat view {}", id.get());
        let mount = Mount::new(id);
        self.spawn_feed(&mount, Table::Messages, FeedStart::Mount);
        self.spawn_feed(&mount, Table::Profiles, FeedStart::Mount);
        self.mount = Some(mount);
    }

    /// Subscribes to `table` and forwards its events until the feed closes,
    /// which is reported as [`Action::FeedDisconnected`].
    ///
    /// The first fetch starts only once the subscription is in place, so
    /// changes racing it are caught. On mount the forwarder kicks that fetch
    /// off itself; on reconnect the reducer does, via `FeedReconnected`.
    fn spawn_feed(&self, mount: &Mount, table: Table, start: FeedStart) {
        let id = mount.id();
        let backend = self.backend.clone();
        let tx = self.tx.clone();
        let limit = self.history_limit;
        let owner = mount.clone();
        let task = tokio::spawn(async move {
            let filter = match table {
                Table::Messages => ChangeFilter::Insert,
                Table::Profiles => ChangeFilter::Any,
            };
            let events = open_feed(&*backend, &owner, table, filter).await;
            if owner.is_torn_down() {
                return;
            }
            match (start, table) {
                (FeedStart::Mount, Table::Messages) => {
                    spawn_load(backend.clone(), &owner, limit, ProfileCache::new(), tx.clone())
                }
                (FeedStart::Mount, Table::Profiles) => {
                    send(&tx, Action::PresenceChanged { mount: id })
                }
                (FeedStart::Reconnect, _) if events.is_some() => {
                    send(&tx, Action::FeedReconnected { mount: id, table })
                }
                (FeedStart::Reconnect, _) => {}
            }
            if let Some(mut events) = events {
                while let Some(event) = events.recv().await {
                    let Some(action) = forward(id, table, event) else {
                        continue;
                    };
                    if tx.send(action).is_err() {
                        return;
                    }
                }
                warn!("{} feed for mount {} closed", table.as_str(), id.get());
            }
            send(&tx, Action::FeedDisconnected { mount: id, table });
        });
        mount.track(task.abort_handle());
    }

    /// Tears down the current mount, if any.
    fn unmount(&mut self) {
        if let Some(mount) = self.mount.take() {
            mount.teardown();
        }
    }
}

/// Why a feed forwarder is being started.
#[derive(Debug, Clone, Copy, PartialEq)]
enum FeedStart {
    Mount,
    Reconnect,
}

/// Turns a change event into the action its table calls for.
fn forward(mount: MountId, table: Table, event: ChangeEvent) -> Option<Action> {
    match table {
        Table::Messages => match event.decode_record::<Message>() {
            Ok(message) => Some(Action::MessageInserted { mount, message }),
            Err(e) => {
                warn!("Skipping undecodable message event: {}", e);
                None
            }
        },
        Table::Profiles => {
            debug!("Profile {:?} on mount {}", event.kind, mount.get());
            Some(Action::PresenceChanged { mount })
        }
    }
}

/// Subscribes to `table` and parks the guard on `mount`. Returns the event
/// stream, or `None` if the subscription failed or the mount is gone.
async fn open_feed(
    backend: &dyn Backend,
    mount: &Mount,
    table: Table,
    filter: ChangeFilter,
) -> Option<tokio::sync::mpsc::Receiver<ChangeEvent>> {
    match backend.subscribe(table, filter).await {
        Ok(subscription) => {
            let (events, guard) = subscription.into_parts();
            mount.hold(guard).then_some(events)
        }
        Err(e) => {
            warn!("Failed to subscribe to {}: {}", table.as_str(), e);
            None
        }
    }
}

fn spawn_load(
    backend: Arc<dyn Backend>,
    mount: &Mount,
    limit: usize,
    known: ProfileCache,
    tx: mpsc::Sender<Action>,
) {
    let id = mount.id();
    let task = tokio::spawn(async move {
        let action = match load_feed(&*backend, limit, &known).await {
            Ok(snapshot) => Action::FeedLoaded { mount: id, snapshot },
            Err(e) => {
                warn!("Failed to load messages: {}", e);
                Action::FeedFailed {
                    mount: id,
                    error: e.to_string(),
                }
            }
        };
        send(&tx, action);
    });
    mount.track(task.abort_handle());
}
