#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

/// Version of the streamgate application
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod app;
pub mod directory;
pub mod filter;
pub mod handlers;
pub mod login;
pub mod models;
pub mod oauth;
pub mod reconcile;
pub mod settings;
pub mod token;
pub mod utils;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Re-export commonly used items
pub use app::{build_cors, AppComponents};
pub use directory::{MemoryUserDirectory, UserDirectory};
pub use filter::{authenticate_request, AuthState, AuthenticatedUser};
pub use login::{LoginError, LoginRedirect, LoginSuccessHandler};
pub use models::{AuthProvider, ProviderProfile, User};
pub use reconcile::{IdentityReconciler, ReconcileError};
pub use settings::Settings;
pub use token::{TokenCodec, TokenError};
