//! # Backend Boundary
//!
//! Everything that crosses the network lives here: auth, table reads and
//! writes, and the live change feed. The rest of the crate talks to the
//! [`Backend`] trait only, so tests swap in an in-memory fake.

pub mod realtime;
pub mod service;
pub mod subscription;
pub mod supabase;
pub mod types;

pub use service::{Backend, BackendError, SignUpResponse};
pub use subscription::{Subscription, SubscriptionGuard};
pub use supabase::SupabaseBackend;
pub use types::{
    AuthSession, ChangeEvent, ChangeFilter, ChangeKind, Message, Profile, SignUpProfile, Table,
    User, UserId,
};
