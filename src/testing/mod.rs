//! Testing utilities shared by unit and integration tests
//!
//! - [`fixtures`] - Settings, codecs and fully wired components
//! - [`mock`] - A profile resolver that never leaves the process
//! - [`requests`] - Request builders for calling the app under test
//!
//! Integration tests enable the `testing` feature to reach this module.

pub mod fixtures;
pub mod mock;
pub mod requests;

pub use fixtures::TestFixtures;
pub use mock::StaticProfileResolver;
pub use requests::RequestBuilder;

/// Common test constants
pub mod constants {
    /// Raw HMAC key used by test codecs (256 bits)
    pub const TEST_TOKEN_KEY: &[u8] = b"streamgate-test-key-32-bytes-ok!";

    /// Frontend URI allowed to receive session tokens in tests
    pub const TEST_REDIRECT_URI: &str = "http://localhost:3000/oauth2/redirect";

    /// Default test email address
    pub const TEST_EMAIL: &str = "test@example.com";

    /// Default test user name
    pub const TEST_USER_NAME: &str = "Test User";

    /// Default test provider subject
    pub const TEST_PROVIDER_ID: &str = "123456789";
}
