// Token endpoint client for installed/web OAuth clients.
//
// Refresh failures are split in two: the grant itself is dead (revoked, client
// deleted) or the endpoint could not answer. Only the first clears the cache.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;

use super::client_secrets::OAuthClientSecrets;
use crate::core::credentials::{parse_scopes, Credential, CredentialError, TokenRefresher};

const REVOKED_ERRORS: [&str; 3] = ["invalid_grant", "invalid_client", "unauthorized_client"];

#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_expires_in")]
    pub expires_in: i64,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
}

fn default_expires_in() -> i64 {
    3600
}

#[derive(Debug, Default, Deserialize)]
struct TokenErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: String,
}

#[derive(Clone)]
pub struct GoogleOAuthClient {
    http: Client,
    secrets: OAuthClientSecrets,
}

impl GoogleOAuthClient {
    pub fn new(secrets: OAuthClientSecrets, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http, secrets })
    }

    pub fn secrets(&self) -> &OAuthClientSecrets {
        &self.secrets
    }

    /// Exchange an authorization code from the consent redirect.
    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
        requested_scopes: &[&str],
    ) -> Result<Credential, CredentialError> {
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("code_verifier", code_verifier),
            ("redirect_uri", redirect_uri),
            ("client_id", self.secrets.client_id.as_str()),
        ];
        if let Some(secret) = &self.secrets.client_secret {
            form.push(("client_secret", secret.as_str()));
        }

        let response = self
            .post_form(&form)
            .await
            .map_err(|e| CredentialError::Consent(e.to_string()))?;
        let fallback: Vec<String> = requested_scopes.iter().map(|s| s.to_string()).collect();
        Ok(credential_from_response(response, None, &fallback, Utc::now()))
    }

    async fn post_form(&self, form: &[(&str, &str)]) -> Result<TokenResponse, CredentialError> {
        let response = self
            .http
            .post(&self.secrets.token_uri)
            .form(form)
            .send()
            .await
            .map_err(|e| CredentialError::Backend(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_token_error(status.as_u16(), &body));
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| CredentialError::Backend(format!("undecodable token response: {}", e)))
    }
}

#[async_trait]
impl TokenRefresher for GoogleOAuthClient {
    async fn refresh(&self, credential: &Credential) -> Result<Credential, CredentialError> {
        let refresh_token = credential
            .refresh_token
            .as_deref()
            .ok_or_else(|| CredentialError::Revoked("cached credential has no refresh token".into()))?;

        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.secrets.client_id.as_str()),
        ];
        if let Some(secret) = &self.secrets.client_secret {
            form.push(("client_secret", secret.as_str()));
        }

        let response = self.post_form(&form).await?;
        let previous: Vec<String> = credential.scopes.iter().cloned().collect();
        Ok(credential_from_response(
            response,
            Some(credential),
            &previous,
            Utc::now(),
        ))
    }
}

/// A dead grant is `Revoked`; anything else is the endpoint's problem.
pub(crate) fn classify_token_error(status: u16, body: &str) -> CredentialError {
    let parsed: TokenErrorBody = serde_json::from_str(body).unwrap_or_default();
    let detail = if parsed.error.is_empty() {
        format!("HTTP {}", status)
    } else if parsed.error_description.is_empty() {
        format!("HTTP {}: {}", status, parsed.error)
    } else {
        format!("HTTP {}: {} ({})", status, parsed.error, parsed.error_description)
    };

    if (status == 400 || status == 401) && REVOKED_ERRORS.contains(&parsed.error.as_str()) {
        CredentialError::Revoked(detail)
    } else {
        CredentialError::Backend(detail)
    }
}

/// Build the credential a token response describes. Google omits the refresh token
/// on refresh responses; the previous one stays valid in that case.
pub(crate) fn credential_from_response(
    response: TokenResponse,
    previous: Option<&Credential>,
    fallback_scopes: &[String],
    now: DateTime<Utc>,
) -> Credential {
    let scopes = match response.scope.as_deref() {
        Some(raw) if !raw.trim().is_empty() => parse_scopes(raw),
        _ => fallback_scopes.iter().cloned().collect(),
    };
    Credential {
        access_token: response.access_token,
        expiry: now + chrono::Duration::seconds(response.expires_in),
        refresh_token: response
            .refresh_token
            .or_else(|| previous.and_then(|p| p.refresh_token.clone())),
        scopes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn dead_grants_are_revoked() {
        let body = r#"{"error":"invalid_grant","error_description":"Token has been expired or revoked."}"#;
        assert!(matches!(
            classify_token_error(400, body),
            CredentialError::Revoked(_)
        ));
        assert!(matches!(
            classify_token_error(401, r#"{"error":"invalid_client"}"#),
            CredentialError::Revoked(_)
        ));
    }

    #[test]
    fn endpoint_trouble_is_backend() {
        assert!(matches!(
            classify_token_error(503, "<html>"),
            CredentialError::Backend(_)
        ));
        assert!(matches!(
            classify_token_error(429, r#"{"error":"rate_limit_exceeded"}"#),
            CredentialError::Backend(_)
        ));
        assert!(matches!(
            classify_token_error(400, r#"{"error":"invalid_request"}"#),
            CredentialError::Backend(_)
        ));
    }

    #[test]
    fn refresh_response_keeps_previous_refresh_token() {
        let previous = Credential {
            access_token: "old".into(),
            expiry: now(),
            refresh_token: Some("1//keep".into()),
            scopes: Default::default(),
        };
        let response: TokenResponse = serde_json::from_str(
            r#"{"access_token":"new","expires_in":3599,"scope":"https://www.googleapis.com/auth/drive https://www.googleapis.com/auth/documents","token_type":"Bearer"}"#,
        )
        .unwrap();

        let credential = credential_from_response(response, Some(&previous), &[], now());

        assert_eq!(credential.access_token, "new");
        assert_eq!(credential.refresh_token.as_deref(), Some("1//keep"));
        assert_eq!(credential.expiry, now() + chrono::Duration::seconds(3599));
        assert_eq!(credential.scopes.len(), 2);
    }

    #[test]
    fn missing_scope_falls_back_to_requested() {
        let response: TokenResponse =
            serde_json::from_str(r#"{"access_token":"t","refresh_token":"r"}"#).unwrap();
        let fallback = vec!["https://www.googleapis.com/auth/documents".to_string()];

        let credential = credential_from_response(response, None, &fallback, now());

        assert_eq!(credential.refresh_token.as_deref(), Some("r"));
        assert!(credential
            .scopes
            .contains("https://www.googleapis.com/auth/documents"));
        assert_eq!(credential.expiry, now() + chrono::Duration::seconds(3600));
    }
}
