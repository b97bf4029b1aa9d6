// Entry point of the Google Docs MCP server.
//
// **Architecture Overview:**
// - `core/` = Business logic (credentials, document sync, comment threads)
// - `infra/` = Implementations of core traits (Google HTTP APIs, token cache)
// - `mcp/` = Tool-calling adapter (MCP over stdio)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Serve the tools on stdin/stdout
//
// stdout carries the MCP protocol, so all logging goes to stderr.

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "infra/infra_layer.rs"]
mod infra;
#[path = "mcp/mcp_layer.rs"]
mod mcp;

mod config;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::config::{Args, Settings};
use crate::core::comments::CommentManager;
use crate::core::credentials::{
    AccessTokenProvider, ConsentFlow, CredentialManager, TokenRefresher,
};
use crate::core::documents::{DocumentService, RetryPolicy};
use crate::infra::auth::{
    CredentialsFile, GoogleOAuthClient, LoopbackConsentFlow, ServiceAccountAuth, TokenFileStore,
};
use crate::infra::google_docs::GoogleDocsClient;
use crate::mcp::{DocsServer, DocsTools, SharedDocsApi};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env first so its values act as defaults for the flags below
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let cwd = std::env::current_dir().context("Failed to read the current directory")?;
    let settings = Settings::from_args(args, &cwd)?;

    let secrets = CredentialsFile::from_file(&settings.creds_file)
        .await
        .with_context(|| format!("Failed to load {}", settings.creds_file.display()))?;

    // Both credential sources can refresh and both can mint a first credential
    let (refresher, consent): (Box<dyn TokenRefresher>, Box<dyn ConsentFlow>) = match secrets {
        CredentialsFile::OAuthClient(client) => {
            let oauth = GoogleOAuthClient::new(client, settings.request_timeout)
                .context("Failed to build OAuth HTTP client")?;
            let flow = LoopbackConsentFlow::new(oauth.clone(), settings.consent_timeout);
            (Box::new(oauth), Box::new(flow))
        }
        CredentialsFile::ServiceAccount(key) => {
            let account = ServiceAccountAuth::new(key, settings.request_timeout)
                .context("Failed to build service account HTTP client")?;
            tracing::info!(account = account.client_email(), "Using service account credentials");
            (Box::new(account.clone()), Box::new(account))
        }
    };

    let store = TokenFileStore::new(&settings.token_file);
    let credentials = Arc::new(CredentialManager::load(store, refresher, Some(consent)).await);

    // Authenticate up front so the consent prompt shows at startup rather than
    // in the middle of the first tool call
    if let Err(e) = credentials.acquire().await {
        tracing::warn!(
            "Could not obtain Google credentials yet ({}). Tools will report authentication errors until this is fixed.",
            e
        );
    }

    let tokens: Arc<dyn AccessTokenProvider> = credentials;
    let api: SharedDocsApi = Arc::new(
        GoogleDocsClient::new(tokens, settings.request_timeout)
            .context("Failed to build Google API HTTP client")?,
    );

    let read_policy = RetryPolicy::with_attempts(settings.read_attempts);
    let documents = DocumentService::new(
        api.clone(),
        RetryPolicy::with_attempts(settings.rewrite_attempts),
    )
    .with_read_policy(read_policy);
    let comments = CommentManager::new(api, read_policy);
    let server = DocsServer::new(DocsTools::new(documents, comments));

    tracing::info!(
        token_file = %settings.token_file.display(),
        "Google Docs MCP server listening on stdio"
    );
    server
        .serve_stdio()
        .await
        .context("MCP server stopped with an error")?;

    Ok(())
}
