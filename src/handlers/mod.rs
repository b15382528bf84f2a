// HTTP request handlers for the gateway
pub mod oauth;
pub mod proxy_upstream;
pub mod system;
pub mod user;

// Re-export the main handler functions
pub use oauth::{oauth_authorize, oauth_callback};
pub use proxy_upstream::proxy_upstream;
pub use system::{error_page, health, index, login_page};
pub use user::current_user;
