use axum::{
    extract::Request,
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use crate::auth::{self, AuthError};
use crate::error::ApiError;

/// Authenticated subject extracted from a verified bearer token
#[derive(Clone, Debug)]
pub struct AuthSubject {
    pub sub: String,
}

/// Bearer-token middleware: rejects the request before any handler or
/// storage access when the token is missing or fails verification, and
/// injects [`AuthSubject`] into request extensions otherwise.
pub async fn auth_middleware(
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer_token(&headers)?;
    let claims = auth::verifier().verify(&token).await?;

    request
        .extensions_mut()
        .insert(AuthSubject { sub: claims.sub });

    Ok(next.run(request).await)
}

/// Extract the token from an `Authorization: Bearer <token>` header
fn extract_bearer_token(headers: &HeaderMap) -> Result<String, AuthError> {
    let auth_header = headers
        .get("authorization")
        .ok_or(AuthError::MissingToken)?;

    let auth_str = auth_header
        .to_str()
        .map_err(|_| AuthError::InvalidToken("malformed Authorization header".to_string()))?;

    let token = auth_str
        .strip_prefix("Bearer ")
        .ok_or(AuthError::MissingToken)?
        .trim();

    if token.is_empty() {
        return Err(AuthError::MissingToken);
    }
    Ok(token.to_string())
}
