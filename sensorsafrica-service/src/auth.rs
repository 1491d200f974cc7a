//! Caller verification
//!
//! Registration and ingestion take a [`VerifiedCaller`]. The type has no
//! public constructor: the only way to obtain one is
//! [`Authenticator::verify`], so an unverified request cannot reach the
//! resolver or the executor by construction.

use async_trait::async_trait;
use log::{debug, warn};
use std::collections::BTreeMap;
use std::fmt;

use crate::config::AuthConfig;
use crate::ServiceError;

/// Proof that a request passed caller verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedCaller {
    subject: String,
}

impl VerifiedCaller {
    /// Who the caller is, e.g. a field team or a gateway
    pub fn subject(&self) -> &str {
        &self.subject
    }
}

impl fmt::Display for VerifiedCaller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.subject)
    }
}

/// Maps a presented credential to a caller subject
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Subject owning `token`, or `None` when the token is not accepted
    async fn subject_for(&self, token: &str) -> Option<String>;

    /// Verify a credential, producing the caller proof on success
    async fn verify(&self, token: &str) -> Result<VerifiedCaller, ServiceError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(ServiceError::Unauthorized("missing API token".to_string()));
        }

        match self.subject_for(token).await {
            Some(subject) => {
                debug!("verified caller {}", subject);
                Ok(VerifiedCaller { subject })
            }
            None => {
                warn!("rejected request with unknown API token");
                Err(ServiceError::Unauthorized("unknown API token".to_string()))
            }
        }
    }
}

/// Authenticator over a fixed token table loaded from configuration
#[derive(Clone, Default)]
pub struct StaticTokenAuthenticator {
    tokens: BTreeMap<String, String>,
}

impl fmt::Debug for StaticTokenAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Tokens are credentials; only show who holds one
        f.debug_struct("StaticTokenAuthenticator")
            .field("subjects", &self.tokens.values().collect::<Vec<_>>())
            .finish()
    }
}

impl StaticTokenAuthenticator {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            tokens: config.tokens.clone(),
        }
    }

    /// Number of accepted tokens
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl Authenticator for StaticTokenAuthenticator {
    async fn subject_for(&self, token: &str) -> Option<String> {
        self.tokens.get(token).cloned()
    }
}
