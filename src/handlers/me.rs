use axum::{response::Json, Extension};
use serde_json::{json, Value};

use crate::middleware::AuthSubject;

/// GET /me - echo the authenticated subject identifier
pub async fn get(Extension(subject): Extension<AuthSubject>) -> Json<Value> {
    Json(json!({ "sub": subject.sub }))
}
