use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Scopes every credential must carry: document read/write plus Drive access for comments.
pub const REQUIRED_SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/documents",
    "https://www.googleapis.com/auth/drive",
];

/// A bearer credential plus the material needed to renew it.
///
/// The token cache written by Google's Python client stores the access token under
/// `token`, so that name is accepted when loading. Extra fields in that file
/// (`client_id`, `token_uri`, ...) are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(alias = "token")]
    pub access_token: String,

    pub expiry: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    #[serde(default)]
    pub scopes: BTreeSet<String>,
}

impl Credential {
    /// True when the access token is still usable `margin` from `now`.
    pub fn is_fresh_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        self.expiry > now + margin
    }

    /// A credential with no recorded scopes is trusted; otherwise every required
    /// scope has to be present.
    pub fn covers_scopes(&self, required: &[&str]) -> bool {
        self.scopes.is_empty() || required.iter().all(|s| self.scopes.contains(*s))
    }
}

/// Parse a space-separated OAuth `scope` string.
pub fn parse_scopes(raw: &str) -> BTreeSet<String> {
    raw.split_whitespace().map(str::to_string).collect()
}
