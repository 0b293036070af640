// Apigee management API client - library root

pub mod auth;
pub mod config;
pub mod error;
pub mod http_client;

pub use auth::{AuthMode, CredentialBundle, TokenManager};
pub use error::ApiError;
pub use http_client::{ApiResponse, ApigeeClient, HttpOptions};
