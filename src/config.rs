// Startup configuration. `.env` is loaded before parsing so its values act as
// environment defaults for every flag.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use thiserror::Error;

#[derive(Debug, Parser)]
#[command(name = "googledocs-mcp", version, about = "Google Docs MCP server")]
pub struct Args {
    /// OAuth client secrets (installed or web app) or a service account key file.
    #[arg(long = "creds-file-path", alias = "creds_file_path", env = "GOOGLE_CREDS_FILE")]
    pub creds_file_path: PathBuf,

    /// Where the OAuth token cache is read from and written to.
    #[arg(long = "token-path", alias = "token_path", env = "GOOGLE_TOKEN_FILE")]
    pub token_path: PathBuf,

    /// Timeout for each call to Google, in seconds.
    #[arg(long, env = "GOOGLE_DOCS_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// How long the first-run consent flow waits for the browser redirect, in seconds.
    #[arg(long, env = "GOOGLE_DOCS_CONSENT_TIMEOUT_SECS", default_value_t = 300)]
    pub consent_timeout_secs: u64,

    /// Attempts for a whole-document rewrite before giving up.
    #[arg(long, env = "GOOGLE_DOCS_REWRITE_ATTEMPTS", default_value_t = 3)]
    pub rewrite_attempts: u32,

    /// Attempts for reads (documents and comments) that fail transiently.
    #[arg(long, env = "GOOGLE_DOCS_READ_ATTEMPTS", default_value_t = 3)]
    pub read_attempts: u32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must not be empty")]
    EmptyPath(&'static str),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub creds_file: PathBuf,
    pub token_file: PathBuf,
    pub request_timeout: Duration,
    pub consent_timeout: Duration,
    pub rewrite_attempts: u32,
    pub read_attempts: u32,
}

impl Settings {
    /// Validate `args` and make both paths absolute against `cwd`.
    pub fn from_args(args: Args, cwd: &Path) -> Result<Self, ConfigError> {
        if args.creds_file_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyPath("creds-file-path"));
        }
        if args.token_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyPath("token-path"));
        }
        if args.request_timeout_secs == 0 {
            return Err(ConfigError::Zero("request-timeout-secs"));
        }
        if args.consent_timeout_secs == 0 {
            return Err(ConfigError::Zero("consent-timeout-secs"));
        }
        if args.rewrite_attempts == 0 {
            return Err(ConfigError::Zero("rewrite-attempts"));
        }
        if args.read_attempts == 0 {
            return Err(ConfigError::Zero("read-attempts"));
        }

        Ok(Self {
            creds_file: absolute(cwd, args.creds_file_path),
            token_file: absolute(cwd, args.token_path),
            request_timeout: Duration::from_secs(args.request_timeout_secs),
            consent_timeout: Duration::from_secs(args.consent_timeout_secs),
            rewrite_attempts: args.rewrite_attempts,
            read_attempts: args.read_attempts,
        })
    }
}

fn absolute(cwd: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        cwd.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec![
            "googledocs-mcp",
            "--creds-file-path",
            "secrets/client.json",
            "--token-path",
            "/var/lib/mcp/token.json",
        ];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults_and_absolute_paths() {
        let settings = Settings::from_args(parse(&[]), Path::new("/home/me")).unwrap();

        assert_eq!(
            settings.creds_file,
            PathBuf::from("/home/me/secrets/client.json")
        );
        assert_eq!(settings.token_file, PathBuf::from("/var/lib/mcp/token.json"));
        assert_eq!(settings.request_timeout, Duration::from_secs(30));
        assert_eq!(settings.consent_timeout, Duration::from_secs(300));
        assert_eq!(settings.rewrite_attempts, 3);
        assert_eq!(settings.read_attempts, 3);
    }

    #[test]
    fn underscore_aliases_are_accepted() {
        let args = Args::try_parse_from([
            "googledocs-mcp",
            "--creds_file_path",
            "c.json",
            "--token_path",
            "t.json",
        ])
        .unwrap();
        assert_eq!(args.creds_file_path, PathBuf::from("c.json"));
    }

    #[test]
    fn zero_attempts_are_rejected() {
        let err = Settings::from_args(parse(&["--rewrite-attempts", "0"]), Path::new("/")).unwrap_err();
        assert_eq!(err, ConfigError::Zero("rewrite-attempts"));
    }

    #[test]
    fn custom_timeouts() {
        let settings = Settings::from_args(
            parse(&["--request-timeout-secs", "5", "--consent-timeout-secs", "60"]),
            Path::new("/"),
        )
        .unwrap();
        assert_eq!(settings.request_timeout, Duration::from_secs(5));
        assert_eq!(settings.consent_timeout, Duration::from_secs(60));
    }
}
