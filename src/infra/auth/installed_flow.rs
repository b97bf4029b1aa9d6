// =============================================================================
// LOOPBACK CONSENT FLOW
// =============================================================================
//
// First-run authorization for installed OAuth clients:
//
// 1. Bind a one-shot HTTP listener on 127.0.0.1 with a random port
// 2. Log the consent URL (PKCE S256 challenge + random state) to stderr
// 3. The user approves in a browser and Google redirects to the listener
// 4. Check `state`, answer the browser, exchange the code for tokens
//
// stdout belongs to the MCP transport, so nothing here may print to it.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;
use sha2::{Digest, Sha256};
use tiny_http::{Header, Request, Response, Server};
use tokio::sync::mpsc;
use url::Url;

use super::oauth_client::GoogleOAuthClient;
use crate::core::credentials::{ConsentFlow, Credential, CredentialError};

const SUCCESS_PAGE: &str = "<html><body><h3>Authorization complete.</h3><p>You can close this window and return to your assistant.</p></body></html>";
const FAILURE_PAGE: &str =
    "<html><body><h3>Authorization failed.</h3><p>Check the server log for details.</p></body></html>";

pub struct LoopbackConsentFlow {
    oauth: GoogleOAuthClient,
    timeout: Duration,
}

impl LoopbackConsentFlow {
    pub fn new(oauth: GoogleOAuthClient, timeout: Duration) -> Self {
        Self { oauth, timeout }
    }
}

#[async_trait]
impl ConsentFlow for LoopbackConsentFlow {
    async fn acquire_new_credential(&self, scopes: &[&str]) -> Result<Credential, CredentialError> {
        let listener = RedirectListener::bind()?;
        let redirect_uri = listener.redirect_uri();

        let verifier = random_token(32);
        let state = random_token(16);
        let consent_url = build_consent_url(
            &self.oauth.secrets().auth_uri,
            &self.oauth.secrets().client_id,
            &redirect_uri,
            scopes,
            &state,
            &pkce_challenge(&verifier),
        )?;

        tracing::warn!(
            "Authorization required. Open this URL in a browser to grant access:\n{}",
            consent_url
        );

        let code = tokio::time::timeout(self.timeout, listener.wait_for_code(&state))
            .await
            .map_err(|_| {
                CredentialError::Consent(format!(
                    "no authorization redirect within {}s",
                    self.timeout.as_secs()
                ))
            })??;
        drop(listener);

        let credential = self
            .oauth
            .exchange_code(&code, &verifier, &redirect_uri, scopes)
            .await?;
        tracing::info!("Authorization granted");
        Ok(credential)
    }
}

/// One-shot HTTP server on 127.0.0.1 that waits for Google's redirect.
///
/// `tiny_http` is blocking, so a plain thread pulls requests off the socket
/// and hands them to the async side over a channel.
struct RedirectListener {
    server: Arc<Server>,
    port: u16,
}

impl RedirectListener {
    fn bind() -> Result<Self, CredentialError> {
        let server = Server::http("127.0.0.1:0").map_err(|e| {
            CredentialError::Consent(format!("could not bind redirect listener: {}", e))
        })?;
        let port = server
            .server_addr()
            .to_ip()
            .map(|addr| addr.port())
            .ok_or_else(|| CredentialError::Consent("redirect listener has no IP address".into()))?;
        Ok(Self {
            server: Arc::new(server),
            port,
        })
    }

    fn redirect_uri(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    async fn wait_for_code(&self, state: &str) -> Result<String, CredentialError> {
        let (tx, mut rx) = mpsc::channel::<Request>(8);
        let server = Arc::clone(&self.server);
        std::thread::spawn(move || {
            while let Ok(request) = server.recv() {
                if tx.blocking_send(request).is_err() {
                    break;
                }
            }
        });

        while let Some(request) = rx.recv().await {
            match parse_redirect(request.url(), state) {
                Ok(Some(code)) => {
                    respond(request, page(200, SUCCESS_PAGE)).await;
                    return Ok(code);
                }
                // Browsers also ask for /favicon.ico and the like.
                Ok(None) => {
                    let not_found = Response::from_string("Not Found").with_status_code(404);
                    respond(request, not_found).await;
                }
                Err(err) => {
                    respond(request, page(400, FAILURE_PAGE)).await;
                    return Err(err);
                }
            }
        }
        Err(CredentialError::Consent("redirect listener stopped".into()))
    }
}

impl Drop for RedirectListener {
    fn drop(&mut self) {
        self.server.unblock();
    }
}

fn page(status: u16, html: &str) -> Response<Cursor<Vec<u8>>> {
    let response = Response::from_string(html).with_status_code(status);
    match Header::from_bytes(&b"Content-Type"[..], &b"text/html; charset=utf-8"[..]) {
        Ok(header) => response.with_header(header),
        Err(()) => response,
    }
}

async fn respond(request: Request, response: Response<Cursor<Vec<u8>>>) {
    let sent = tokio::task::spawn_blocking(move || request.respond(response)).await;
    if let Ok(Err(e)) = sent {
        tracing::debug!("Could not answer browser: {}", e);
    }
}

fn random_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

pub(crate) fn pkce_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

pub(crate) fn build_consent_url(
    auth_uri: &str,
    client_id: &str,
    redirect_uri: &str,
    scopes: &[&str],
    state: &str,
    code_challenge: &str,
) -> Result<Url, CredentialError> {
    let scope = scopes.join(" ");
    Url::parse_with_params(
        auth_uri,
        &[
            ("response_type", "code"),
            ("client_id", client_id),
            ("redirect_uri", redirect_uri),
            ("scope", scope.as_str()),
            ("state", state),
            ("code_challenge", code_challenge),
            ("code_challenge_method", "S256"),
            ("access_type", "offline"),
            ("prompt", "consent"),
        ],
    )
    .map_err(|e| CredentialError::Consent(format!("bad auth_uri '{}': {}", auth_uri, e)))
}

/// `Ok(None)` for requests that are not the OAuth redirect.
pub(crate) fn parse_redirect(
    target: &str,
    expected_state: &str,
) -> Result<Option<String>, CredentialError> {
    let url = Url::parse(&format!("http://127.0.0.1{}", target))
        .map_err(|e| CredentialError::Consent(format!("malformed redirect: {}", e)))?;

    let mut code = None;
    let mut state = None;
    let mut error = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        return Err(CredentialError::Consent(format!("consent denied: {}", error)));
    }
    let Some(code) = code else {
        return Ok(None);
    };
    if state.as_deref() != Some(expected_state) {
        return Err(CredentialError::Consent(
            "state mismatch in authorization redirect".into(),
        ));
    }
    Ok(Some(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn challenge_matches_rfc7636_example() {
        assert_eq!(
            pkce_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn random_tokens_are_url_safe_and_distinct() {
        let a = random_token(32);
        let b = random_token(32);
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn consent_url_requests_offline_access() {
        let url = build_consent_url(
            "https://accounts.google.com/o/oauth2/auth",
            "client-1",
            "http://127.0.0.1:5555",
            &["scope-a", "scope-b"],
            "st4te",
            "chall",
        )
        .unwrap();

        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["access_type"], "offline");
        assert_eq!(pairs["prompt"], "consent");
        assert_eq!(pairs["scope"], "scope-a scope-b");
        assert_eq!(pairs["code_challenge_method"], "S256");
        assert_eq!(pairs["redirect_uri"], "http://127.0.0.1:5555");
    }

    #[test]
    fn redirect_with_matching_state_yields_code() {
        let code = parse_redirect("/?state=abc&code=4%2F0AX&scope=x", "abc").unwrap();
        assert_eq!(code.as_deref(), Some("4/0AX"));
    }

    #[test]
    fn redirect_problems_are_consent_errors() {
        assert!(matches!(
            parse_redirect("/?state=evil&code=c", "abc"),
            Err(CredentialError::Consent(_))
        ));
        assert!(matches!(
            parse_redirect("/?error=access_denied&state=abc", "abc"),
            Err(CredentialError::Consent(_))
        ));
        assert_eq!(parse_redirect("/favicon.ico", "abc").unwrap(), None);
    }

    fn http_client() -> reqwest::Client {
        reqwest::Client::builder().no_proxy().build().unwrap()
    }

    #[tokio::test]
    async fn listener_answers_browser_and_returns_code() {
        let listener = RedirectListener::bind().unwrap();
        let base = listener.redirect_uri();

        let browser = tokio::spawn(async move {
            let http = http_client();
            let favicon = http.get(format!("{}/favicon.ico", base)).send().await.unwrap();
            assert_eq!(favicon.status().as_u16(), 404);

            let page = http
                .get(format!("{}/?code=the-code&state=s1", base))
                .send()
                .await
                .unwrap();
            let content_type = page.headers()["content-type"].to_str().unwrap().to_string();
            (page.status().as_u16(), content_type, page.text().await.unwrap())
        });

        let code = listener.wait_for_code("s1").await.unwrap();
        let (status, content_type, body) = browser.await.unwrap();

        assert_eq!(code, "the-code");
        assert_eq!(status, 200);
        assert!(content_type.starts_with("text/html"));
        assert!(body.contains("Authorization complete"));
    }

    #[tokio::test]
    async fn forged_state_is_answered_with_failure_page() {
        let listener = RedirectListener::bind().unwrap();
        let base = listener.redirect_uri();

        let browser = tokio::spawn(async move {
            let page = http_client()
                .get(format!("{}/?code=c&state=evil", base))
                .send()
                .await
                .unwrap();
            (page.status().as_u16(), page.text().await.unwrap())
        });

        let err = listener.wait_for_code("s1").await.unwrap_err();
        let (status, body) = browser.await.unwrap();

        assert!(matches!(err, CredentialError::Consent(_)));
        assert_eq!(status, 400);
        assert!(body.contains("Authorization failed"));
    }
}
