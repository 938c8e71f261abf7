use axum::extract::rejection::JsonRejection;
use axum::extract::Path;
use axum::http::StatusCode;
use axum::{response::Json, Extension};
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::middleware::AuthSubject;
use crate::store;

/// GET /snapshots - every snapshot owned by the caller, ascending by date
pub async fn get(Extension(subject): Extension<AuthSubject>) -> Result<Json<Value>, ApiError> {
    let snapshots = store::store().list(&subject.sub).await?;
    Ok(Json(json!({ "snapshots": snapshots })))
}

/// POST /snapshots - upsert one snapshot, keyed by its date
///
/// Body: `{"snapshot": {"date": "...", "netWorth": <number>, ...}}`.
/// A body that is not JSON, has no `snapshot` object, or fails validation
/// is a 400 before the store is touched.
pub async fn post(
    Extension(subject): Extension<AuthSubject>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(body) = body.map_err(|_| ApiError::validation("Invalid snapshot payload"))?;
    let snapshot = body
        .get("snapshot")
        .ok_or_else(|| ApiError::validation("Invalid snapshot payload"))?;

    store::store().upsert(&subject.sub, snapshot).await?;
    Ok((StatusCode::CREATED, Json(json!({ "ok": true }))))
}

/// DELETE /snapshots/:date - remove one snapshot; succeeds when absent
pub async fn delete(
    Extension(subject): Extension<AuthSubject>,
    Path(date): Path<String>,
) -> Result<Json<Value>, ApiError> {
    store::store().delete(&subject.sub, &date).await?;
    Ok(Json(json!({ "ok": true })))
}
