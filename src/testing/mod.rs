//! Testing utilities for sessionvault
//!
//! - [`fixtures`] - Pre-built test objects (cookie options, stores, settings)
//! - [`builders`] - Fluent builder for session records
//! - [`mock`] - In-process provider and cipher fakes
//!
//! ```rust
//! use sessionvault::testing::{fixtures::TestFixtures, TestSessionBuilder};
//!
//! let session = TestSessionBuilder::new().expired().build();
//! let store = TestFixtures::cookie_store();
//! # let _ = (session, store);
//! ```

pub mod builders;
pub mod fixtures;
pub mod mock;

pub use builders::TestSessionBuilder;
pub use fixtures::TestFixtures;

/// Common test constants
pub mod constants {
    /// Default test email address
    pub const TEST_EMAIL: &str = "test@example.com";

    /// Default test principal identifier
    pub const TEST_USER: &str = "test-user";

    /// Secret used for cookie signing and field encryption in tests
    pub const TEST_SECRET: &[u8] = b"test_secret_32_bytes_long_for_ok";
}
