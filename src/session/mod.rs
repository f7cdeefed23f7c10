//! Session record, transport codec and persistence
//!
//! - [`state`] - The decoded session record
//! - [`codec`] - Record to transport string and back, including legacy formats
//! - [`store`] - The store contract and backend selection
//! - [`cookie`] / [`cache`] - Store backends
//! - [`manager`] - Login, per-request authentication and sign-out

pub mod cache;
pub mod codec;
pub mod cookie;
pub mod manager;
pub mod state;
pub mod store;

pub use codec::{decode_session_state, encode_session_state, CodecError};
pub use cookie::{CookieOptions, COOKIE_NAME};
pub use manager::{AuthOutcome, RefreshFailurePolicy, SessionError, SessionManager};
pub use state::SessionState;
pub use store::{new_session_store, SessionStore, StoreError, StoreKind, StoreOptions};
