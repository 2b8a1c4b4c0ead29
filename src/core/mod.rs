//! # Core Application Logic
//!
//! This module contains Natter's business logic.
//! It knows nothing about any specific UI technology.
//!
//! ```text
//!                    ┌─────────────────────────┐
//!                    │         CORE            │
//!                    │  (this module)          │
//!                    │                         │
//!                    │  • State (app data)     │
//!                    │  • Action (events)      │
//!                    │  • update() (reducer)   │
//!                    │                         │
//!                    └───────────┬─────────────┘
//!                                │
//!                  ┌─────────────┴─────────────┐
//!                  ▼                           ▼
//!           ┌────────────┐              ┌────────────┐
//!           │    TUI     │              │  Backend   │
//!           │  Adapter   │              │ (Supabase) │
//!           │ (ratatui)  │              │            │
//!           └────────────┘              └────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`state`]: The `App` struct, all application state in one place
//! - [`action`]: The `Action` enum and the `update()` reducer
//! - [`session`]: Sign-in, sign-up, sign-out and the presence heartbeat
//! - [`feed`]: The room's message list and its bulk load
//! - [`profiles`]: Author profile cache
//! - [`presence`]: Online-user set
//! - [`mount`]: Resources owned by one mounted chat view
//! - [`time_format`]: "5 min ago" labels
//! - [`config`]: Layered settings

pub mod action;
pub mod config;
pub mod feed;
pub mod mount;
pub mod presence;
pub mod profiles;
pub mod session;
pub mod state;
pub mod time_format;
