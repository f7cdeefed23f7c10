#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![deny(warnings)]
#![allow(clippy::multiple_crate_versions)]

/// Version of the sessionvault application
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod handlers;
pub mod oauth;
pub mod session;
pub mod settings;
pub mod utils;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Re-export commonly used items
pub use handlers::{configure_services, oauth_callback, oauth_sign_out, oauth_start, oauth_userinfo, ping};
pub use oauth::{AzureProvider, Provider, ProviderError};
pub use session::{SessionManager, SessionState, SessionStore};
pub use settings::Settings;
