pub mod credential_models;
pub mod credential_service;

pub use credential_models::{parse_scopes, Credential, REQUIRED_SCOPES};
pub use credential_service::{
    AccessTokenProvider, ConsentFlow, CredentialError, CredentialManager, CredentialStore,
    TokenRefresher,
};
