// Error taxonomy shared by the document synchronizer, the comment manager and the
// remote client. Every failure that reaches a tool caller is one of these kinds.

use serde::Serialize;
use thiserror::Error;

use crate::core::credentials::CredentialError;

/// Hint appended to authentication failures so the caller knows what to do next.
pub const REAUTH_HINT: &str =
    "Re-authenticate: delete the token cache file and restart the server to run the consent flow again.";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DocsError {
    #[error("Authentication failed: {0}. {REAUTH_HINT}")]
    Authentication(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Document changed since it was read: {0}")]
    StaleState(String),

    #[error("Temporary failure talking to Google: {0}")]
    Transient(String),

    #[error("Invalid input: {0}")]
    Validation(String),
}

/// Machine-readable error kind reported to tool callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Authentication,
    NotFound,
    Permission,
    StaleState,
    Transient,
    Validation,
}

impl DocsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DocsError::Authentication(_) => ErrorKind::Authentication,
            DocsError::NotFound(_) => ErrorKind::NotFound,
            DocsError::Permission(_) => ErrorKind::Permission,
            DocsError::StaleState(_) => ErrorKind::StaleState,
            DocsError::Transient(_) => ErrorKind::Transient,
            DocsError::Validation(_) => ErrorKind::Validation,
        }
    }

    /// Only stale revisions and transient failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DocsError::StaleState(_) | DocsError::Transient(_))
    }
}

impl From<CredentialError> for DocsError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::Backend(msg) => {
                DocsError::Transient(format!("token endpoint unavailable: {msg}"))
            }
            other => DocsError::Authentication(other.to_string()),
        }
    }
}

/// Google document, comment and reply IDs only use `[A-Za-z0-9_-]`.
///
/// IDs end up as URL path segments, so anything else (`?`, `#`, `/`, `%`, ...)
/// would let one ID address a different resource.
pub fn validate_id(field: &str, value: &str) -> Result<(), DocsError> {
    if value.is_empty() {
        return Err(DocsError::Validation(format!("{field} must not be empty")));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(DocsError::Validation(format!(
            "{field} '{value}' contains characters that are not allowed in an ID"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_stale_and_transient_are_retryable() {
        assert!(DocsError::StaleState("rev".into()).is_retryable());
        assert!(DocsError::Transient("timeout".into()).is_retryable());
        assert!(!DocsError::NotFound("doc".into()).is_retryable());
        assert!(!DocsError::Permission("doc".into()).is_retryable());
        assert!(!DocsError::Authentication("revoked".into()).is_retryable());
        assert!(!DocsError::Validation("empty".into()).is_retryable());
    }

    #[test]
    fn credential_errors_map_to_auth_or_transient() {
        let revoked: DocsError = CredentialError::Revoked("invalid_grant".into()).into();
        assert_eq!(revoked.kind(), ErrorKind::Authentication);
        assert!(revoked.to_string().contains("Re-authenticate"));

        let backend: DocsError = CredentialError::Backend("503".into()).into();
        assert_eq!(backend.kind(), ErrorKind::Transient);
    }

    #[test]
    fn error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::StaleState).unwrap();
        assert_eq!(json, "\"stale_state\"");
    }

    #[test]
    fn validate_id_rejects_empty_and_paths() {
        assert!(validate_id("document_id", "").is_err());
        assert!(validate_id("document_id", "   ").is_err());
        assert!(validate_id("document_id", "a/b").is_err());
        assert!(validate_id("document_id", "1abc XYZ").is_err());
        assert!(validate_id("document_id", "1abcXYZ_-").is_ok());
    }

    #[test]
    fn validate_id_rejects_url_syntax() {
        for bad in ["C1?", "C1#", "C1%2F", "..", "C1;x", "é"] {
            assert!(
                matches!(validate_id("comment_id", bad), Err(DocsError::Validation(_))),
                "{bad} should be rejected"
            );
        }
    }
}
