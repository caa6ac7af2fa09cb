pub mod auth_service;
pub use auth_service::{AuthError, AuthService, LoginOutcome};

pub mod auth_service_impl;
pub use auth_service_impl::DirectoryAuthService;

pub mod console;
pub use console::ServerConsole;

pub mod two_factor;
pub use two_factor::{Enrollment, TwoFactor};

pub mod user_directory;
pub use user_directory::UserDirectory;
