use std::collections::HashMap;

use async_trait::async_trait;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use tokio::sync::RwLock;
use url::Url;

use super::{AuthError, Claims, TokenVerifier};
use crate::config::AuthConfig;

/// RS256 verification against the issuer's published key set.
///
/// Keys are fetched from `<issuer>/.well-known/jwks.json` on first use and
/// cached for the process lifetime; an unknown `kid` triggers one refetch so
/// issuer key rotation does not require a restart. The cryptography itself
/// is `jsonwebtoken`'s job.
pub struct JwksVerifier {
    issuer: Option<String>,
    audience: Option<String>,
    http: reqwest::Client,
    keys: RwLock<HashMap<String, Jwk>>,
}

impl JwksVerifier {
    pub fn from_config(auth: &AuthConfig) -> Self {
        Self {
            // Issuer is normalized with a trailing slash: that is the form
            // identity providers put in the iss claim
            issuer: auth.issuer_base_url.as_deref().map(normalize_issuer),
            audience: auth.audience.clone(),
            http: reqwest::Client::new(),
            keys: RwLock::new(HashMap::new()),
        }
    }

    async fn key_for(&self, kid: &str, issuer: &str) -> Result<Jwk, AuthError> {
        // Fast path: cached key
        {
            let keys = self.keys.read().await;
            if let Some(jwk) = keys.get(kid) {
                return Ok(jwk.clone());
            }
        }

        let set = self.fetch_keys(issuer).await?;
        let mut keys = self.keys.write().await;
        keys.clear();
        for jwk in set.keys {
            if let Some(id) = jwk.common.key_id.clone() {
                keys.insert(id, jwk);
            }
        }

        keys.get(kid)
            .cloned()
            .ok_or_else(|| AuthError::InvalidToken("no signing key matches token".to_string()))
    }

    async fn fetch_keys(&self, issuer: &str) -> Result<JwkSet, AuthError> {
        let url = jwks_url(issuer)?;
        tracing::debug!("fetching signing keys from {}", url);

        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AuthError::InvalidToken(format!("key set fetch failed: {}", e)))?;

        response
            .json::<JwkSet>()
            .await
            .map_err(|e| AuthError::InvalidToken(format!("malformed key set: {}", e)))
    }
}

#[async_trait]
impl TokenVerifier for JwksVerifier {
    async fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let issuer = self
            .issuer
            .as_deref()
            .ok_or(AuthError::Config("AUTH_ISSUER_BASE_URL"))?;
        let audience = self
            .audience
            .as_deref()
            .ok_or(AuthError::Config("AUTH_AUDIENCE"))?;

        let header =
            decode_header(token).map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        if header.alg != Algorithm::RS256 {
            return Err(AuthError::InvalidToken(
                "unexpected signing algorithm".to_string(),
            ));
        }
        let kid = header
            .kid
            .ok_or_else(|| AuthError::InvalidToken("token header missing kid".to_string()))?;

        let jwk = self.key_for(&kid, issuer).await?;
        let decoding_key =
            DecodingKey::from_jwk(&jwk).map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[issuer]);
        validation.set_audience(&[audience]);

        let token_data = decode::<Claims>(token, &decoding_key, &validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        Ok(token_data.claims)
    }
}

fn normalize_issuer(issuer: &str) -> String {
    if issuer.ends_with('/') {
        issuer.to_string()
    } else {
        format!("{}/", issuer)
    }
}

fn jwks_url(issuer: &str) -> Result<Url, AuthError> {
    Url::parse(issuer)
        .and_then(|base| base.join(".well-known/jwks.json"))
        .map_err(|_| AuthError::Config("AUTH_ISSUER_BASE_URL"))
}
