pub mod auth;
pub mod client;
pub mod commands;
pub mod error;
pub mod types;

pub use auth::{AuthManager, Token};
pub use client::CloudClient;
pub use error::CloudError;
