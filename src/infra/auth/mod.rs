// Credential plumbing for Google: where the token cache lives, how tokens are
// refreshed, and how a first credential is obtained.

pub mod client_secrets;
pub mod installed_flow;
pub mod oauth_client;
pub mod service_account;
pub mod token_file_store;

pub use client_secrets::CredentialsFile;
pub use installed_flow::LoopbackConsentFlow;
pub use oauth_client::GoogleOAuthClient;
pub use service_account::ServiceAccountAuth;
pub use token_file_store::TokenFileStore;
