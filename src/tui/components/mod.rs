//! # TUI Components
//!
//! This module contains all UI components for the terminal interface.
//!
//! ## Component Architecture
//!
//! Components in this directory follow two patterns:
//!
//! ### Stateless Components (Props-Based Rendering)
//!
//! Display components rebuilt every frame from the data they show:
//! - `TitleBar`: Top status bar with identity and status
//! - `MessageBubble`: A single chat message
//! - `OnlineUsers`: Sidebar of who is online
//! - `AuthForm`: View over the sign-in / sign-up form state
//!
//! ### Stateful Components (Event-Driven)
//!
//! Components that keep local state and emit events:
//! - `InputBox`: Message composer
//! - `MessageListState`: Scroll position and cached bubble heights
//! - `AuthFormState`: Form fields, focus, and mode
//!
//! Components receive external data as props, never by reaching into `App`.
//!
//! ## Module Structure
//!
//! ```text
//! components/
//! ├── mod.rs           (this file)
//! ├── auth_form.rs     (Sign in / sign up)
//! ├── input_box.rs     (Message composer)
//! ├── message.rs       (Single message bubble)
//! ├── message_list.rs  (Scrollable message container)
//! ├── online_users.rs  (Presence sidebar)
//! ├── text_field.rs    (Single-line editing shared by the above)
//! └── title_bar.rs     (Top status bar)
//! ```

mod title_bar;
pub use title_bar::TitleBar;

pub mod auth_form;
pub mod input_box;
pub mod message;
pub mod message_list;
pub mod online_users;
pub mod text_field;

pub use auth_form::{AuthForm, AuthFormEvent, AuthFormState};
pub use input_box::{InputBox, InputEvent};
pub use message_list::{MessageList, MessageListState};
pub use online_users::OnlineUsers;
