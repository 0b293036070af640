// Authentication module
// Resolves the auth strategy and manages the OAuth token lifecycle

mod credentials;
mod manager;
mod refresh;
mod types;

pub use credentials::resolve;
pub use manager::TokenManager;
pub use refresh::GrantEndpoint;
pub use types::{
    AuthMode, CredentialBundle, TokenState, DEFAULT_OAUTH_SERVER_PATH, DEFAULT_PORT,
    DEFAULT_SERVER_PATH, PUBLIC_APIGEE_SERVER,
};
