// =============================================================================
// SERVICE ACCOUNT AUTHENTICATION
// =============================================================================
//
// Alternative to the consent flow for unattended setups: the server signs a JWT
// with the service account key and trades it for an access token.
//
// **Setup:**
// 1. Create a service account in the Cloud Console and download a JSON key
// 2. Enable the Google Docs and Drive APIs for the project
// 3. Share each document with the service account email
//    (looks like: name@project.iam.gserviceaccount.com)
// 4. Point `--creds-file-path` / `GOOGLE_CREDS_FILE` at the key file
//
// There is no refresh token: "refreshing" simply signs a new assertion.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::Serialize;

use super::client_secrets::ServiceAccountKey;
use super::oauth_client::{classify_token_error, credential_from_response, TokenResponse};
use crate::core::credentials::{
    ConsentFlow, Credential, CredentialError, TokenRefresher, REQUIRED_SCOPES,
};

/// JWT claims for Google OAuth2.
#[derive(Debug, Serialize)]
struct JwtClaims {
    /// Issuer (service account email).
    iss: String,

    /// Space-separated scopes.
    scope: String,

    /// Audience (token endpoint).
    aud: String,

    /// Issued at (Unix timestamp).
    iat: i64,

    /// Expiration (Unix timestamp, max 1 hour from iat).
    exp: i64,
}

#[derive(Clone)]
pub struct ServiceAccountAuth {
    key: ServiceAccountKey,
    http: Client,
}

impl ServiceAccountAuth {
    pub fn new(key: ServiceAccountKey, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { key, http })
    }

    pub fn client_email(&self) -> &str {
        &self.key.client_email
    }

    fn assertion(&self, scopes: &[String]) -> Result<String, CredentialError> {
        let now = Utc::now().timestamp();
        let claims = JwtClaims {
            iss: self.key.client_email.clone(),
            scope: scopes.join(" "),
            aud: self.key.token_uri.clone(),
            iat: now,
            exp: now + 3600,
        };

        let header = Header::new(Algorithm::RS256);
        // A broken key will not fix itself, so it is treated like a revoked grant.
        let key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
            .map_err(|e| CredentialError::Revoked(format!("unusable service account key: {}", e)))?;
        encode(&header, &claims, &key)
            .map_err(|e| CredentialError::Revoked(format!("could not sign assertion: {}", e)))
    }

    async fn fetch_token(&self, scopes: &[String]) -> Result<Credential, CredentialError> {
        let jwt = self.assertion(scopes)?;

        let response = self
            .http
            .post(&self.key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", jwt.as_str()),
            ])
            .send()
            .await
            .map_err(|e| CredentialError::Backend(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(classify_token_error(status.as_u16(), &text));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| CredentialError::Backend(format!("undecodable token response: {}", e)))?;
        tracing::debug!(account = %self.key.client_email, "Fetched service account token");
        Ok(credential_from_response(token, None, scopes, Utc::now()))
    }
}

#[async_trait]
impl ConsentFlow for ServiceAccountAuth {
    async fn acquire_new_credential(&self, scopes: &[&str]) -> Result<Credential, CredentialError> {
        let scopes: Vec<String> = scopes.iter().map(|s| s.to_string()).collect();
        self.fetch_token(&scopes).await
    }
}

#[async_trait]
impl TokenRefresher for ServiceAccountAuth {
    async fn refresh(&self, credential: &Credential) -> Result<Credential, CredentialError> {
        let scopes: Vec<String> = if credential.scopes.is_empty() {
            REQUIRED_SCOPES.iter().map(|s| s.to_string()).collect()
        } else {
            credential.scopes.iter().cloned().collect()
        };
        self.fetch_token(&scopes).await
    }
}
