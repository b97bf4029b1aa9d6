// Credential lifecycle: hands out a bearer credential that is valid right now,
// refreshing it when it is close to expiry and acquiring a new one on first run.
//
// The cached credential is the only shared mutable state in the server. Reads of a
// fresh credential go through a shared RwLock read guard; refresh and first-time
// acquisition are funnelled through a single async gate so concurrent callers never
// trigger duplicate refreshes.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

use super::credential_models::{Credential, REQUIRED_SCOPES};

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("no cached credential and no consent flow is configured")]
    Missing,

    #[error("refresh token was revoked or is invalid: {0}")]
    Revoked(String),

    #[error("token endpoint error: {0}")]
    Backend(String),

    #[error("consent flow failed: {0}")]
    Consent(String),

    #[error("token cache error: {0}")]
    Store(String),
}

// ============================================================================
// PORTS
// ============================================================================

/// Persisted location of the credential (the token cache).
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self) -> Result<Option<Credential>, CredentialError>;
    async fn save(&self, credential: &Credential) -> Result<(), CredentialError>;
    async fn clear(&self) -> Result<(), CredentialError>;
}

/// Exchanges refresh material for a new access token.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Returns the renewed credential. `Revoked` means the refresh material is dead and
    /// the credential must be discarded.
    async fn refresh(&self, credential: &Credential) -> Result<Credential, CredentialError>;
}

#[async_trait]
impl TokenRefresher for Box<dyn TokenRefresher> {
    async fn refresh(&self, credential: &Credential) -> Result<Credential, CredentialError> {
        (**self).refresh(credential).await
    }
}

/// First-time acquisition (browser consent or a service-account assertion).
#[async_trait]
pub trait ConsentFlow: Send + Sync {
    async fn acquire_new_credential(&self, scopes: &[&str]) -> Result<Credential, CredentialError>;
}

/// What the remote client needs from the credential layer.
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String, CredentialError>;

    /// The remote rejected the current token; force a refresh on next use.
    async fn invalidate(&self);
}

// ============================================================================
// SERVICE
// ============================================================================

pub struct CredentialManager<S: CredentialStore, R: TokenRefresher> {
    store: S,
    refresher: R,
    consent: Option<Box<dyn ConsentFlow>>,
    cached: RwLock<Option<Credential>>,
    /// Held while a refresh or first-time acquisition is in flight.
    refresh_gate: Mutex<()>,
    refresh_margin: Duration,
}

impl<S, R> CredentialManager<S, R>
where
    S: CredentialStore,
    R: TokenRefresher,
{
    /// Build the manager and read the token cache once.
    pub async fn load(store: S, refresher: R, consent: Option<Box<dyn ConsentFlow>>) -> Self {
        let cached = match store.load().await {
            Ok(Some(credential)) if credential.covers_scopes(&REQUIRED_SCOPES) => Some(credential),
            Ok(Some(_)) => {
                tracing::warn!("Cached credential is missing required scopes; consent is needed again");
                None
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Ignoring unreadable token cache: {}", e);
                None
            }
        };

        Self {
            store,
            refresher,
            consent,
            cached: RwLock::new(cached),
            refresh_gate: Mutex::new(()),
            refresh_margin: Duration::seconds(60),
        }
    }

    #[cfg(test)]
    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    /// Returns a credential that is valid for immediate use.
    pub async fn acquire(&self) -> Result<Credential, CredentialError> {
        if let Some(credential) = self.fresh_cached().await {
            return Ok(credential);
        }

        let _gate = self.refresh_gate.lock().await;

        // Whoever held the gate before us may already have refreshed.
        if let Some(credential) = self.fresh_cached().await {
            return Ok(credential);
        }

        let stale = self.cached.read().await.clone();
        match stale {
            Some(stale) => self.refresh(stale).await,
            None => self.first_acquisition().await,
        }
    }

    /// Mark the cached access token as expired without touching the token cache.
    pub async fn invalidate_access_token(&self) {
        let mut cached = self.cached.write().await;
        if let Some(credential) = cached.as_mut() {
            credential.expiry = Utc::now() - Duration::seconds(1);
        }
    }

    async fn fresh_cached(&self) -> Option<Credential> {
        let cached = self.cached.read().await;
        cached
            .as_ref()
            .filter(|c| c.is_fresh_at(Utc::now(), self.refresh_margin))
            .cloned()
    }

    async fn refresh(&self, stale: Credential) -> Result<Credential, CredentialError> {
        tracing::debug!(expiry = %stale.expiry, "Refreshing access token");

        match self.refresher.refresh(&stale).await {
            Ok(fresh) => {
                self.commit(fresh.clone()).await;
                tracing::info!(expiry = %fresh.expiry, "Access token refreshed");
                Ok(fresh)
            }
            Err(CredentialError::Revoked(reason)) => {
                tracing::warn!("Refresh token rejected, discarding credential: {}", reason);
                *self.cached.write().await = None;
                if let Err(e) = self.store.clear().await {
                    tracing::error!("Failed to clear token cache: {}", e);
                }
                Err(CredentialError::Revoked(reason))
            }
            Err(e) => {
                tracing::warn!("Token refresh failed: {}", e);
                Err(e)
            }
        }
    }

    async fn first_acquisition(&self) -> Result<Credential, CredentialError> {
        let consent = self.consent.as_ref().ok_or(CredentialError::Missing)?;

        tracing::info!("No cached credential, starting first-time acquisition");
        let credential = consent.acquire_new_credential(&REQUIRED_SCOPES).await?;
        self.commit(credential.clone()).await;
        Ok(credential)
    }

    /// Swap the cache in one write, then persist. A failed write to disk only costs a
    /// refresh after the next restart.
    async fn commit(&self, credential: Credential) {
        *self.cached.write().await = Some(credential.clone());
        if let Err(e) = self.store.save(&credential).await {
            tracing::error!("Failed to persist credential: {}", e);
        }
    }
}

#[async_trait]
impl<S, R> AccessTokenProvider for CredentialManager<S, R>
where
    S: CredentialStore,
    R: TokenRefresher,
{
    async fn access_token(&self) -> Result<String, CredentialError> {
        Ok(self.acquire().await?.access_token)
    }

    async fn invalidate(&self) {
        self.invalidate_access_token().await;
    }
}

// ============================================================================
// TESTS
// ============================================================================
