//! OAuth2 authorization-code + PKCE session handling.

pub mod credential;
pub mod error;
pub mod pkce;
pub mod session;
pub mod store;
pub mod token_endpoint;

pub use credential::{is_expired, Credential, InvalidTokenResponse, TokenResponse};
pub use error::AuthError;
pub use session::{CallbackParams, SessionManager, SessionState};
pub use store::{CredentialStore, FileStore, MemoryStore, StoreError};
pub use token_endpoint::{HttpTokenEndpoint, TokenEndpoint, TokenEndpointError, TokenRequest};
