pub mod jwks;

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config;

pub use jwks::JwksVerifier;

/// Claims extracted from a verified bearer token. Only the subject matters
/// to this service; everything else the issuer puts in the token is ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing bearer token")]
    MissingToken,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Auth not configured: {0}")]
    Config(&'static str),
}

/// Token verification as an injected capability: given a bearer token,
/// return the stable subject identifier or fail. Implementations own their
/// key material and caching; nothing else in the service sees a key.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Claims, AuthError>;
}

/// HS256 verification against a locally shared secret. Development and test
/// deployments; production uses [`JwksVerifier`].
pub struct SharedSecretVerifier {
    secret: String,
}

impl SharedSecretVerifier {
    pub fn new(secret: String) -> Self {
        Self { secret }
    }
}

#[async_trait]
impl TokenVerifier for SharedSecretVerifier {
    async fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        if self.secret.is_empty() {
            return Err(AuthError::Config("AUTH_SHARED_SECRET"));
        }

        let decoding_key = DecodingKey::from_secret(self.secret.as_bytes());
        let token_data = decode::<Claims>(token, &decoding_key, &Validation::default())
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        Ok(token_data.claims)
    }
}

/// Process-wide verifier, chosen from config on first use: a shared secret
/// selects local HS256, otherwise tokens are checked against the issuer's
/// published key set.
pub fn verifier() -> &'static Arc<dyn TokenVerifier> {
    static VERIFIER: OnceLock<Arc<dyn TokenVerifier>> = OnceLock::new();
    VERIFIER.get_or_init(|| {
        let auth = &config::config().auth;
        let verifier: Arc<dyn TokenVerifier> = match &auth.shared_secret {
            Some(secret) => Arc::new(SharedSecretVerifier::new(secret.clone())),
            None => Arc::new(JwksVerifier::from_config(auth)),
        };
        verifier
    })
}
