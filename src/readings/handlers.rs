use axum::{
    body::Body,
    extract::{DefaultBodyLimit, FromRef, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use super::dto::{ConfirmRequest, PendingImageQuery, UploadResponse};
use super::pending;
use super::repo::MeterReading;
use super::services;
use crate::auth::tokens::{AuthUser, JwtKeys};
use crate::config::MAX_UPLOAD_BYTES;
use crate::error::ApiError;
use crate::state::AppState;
use crate::storage::UploadStore;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/readings/upload", post(upload))
        .route("/readings/confirm", post(confirm))
        .route("/readings/pending-image", get(pending_image))
        .route("/readings/image/:id", get(reading_image))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

/// POST /readings/upload (multipart, field `file`)
#[instrument(skip(state, mp))]
pub async fn upload(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    mut mp: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    while let Ok(Some(field)) = mp.next_field().await {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::Validation(format!("Could not read upload: {e}")))?;
        let draft = services::ingest(&state, user_id, &filename, bytes).await?;
        return Ok(Json(draft));
    }
    Err(ApiError::Validation("A meter photo is required".into()))
}

/// POST /readings/confirm
#[instrument(skip(state, payload))]
pub async fn confirm(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<ConfirmRequest>,
) -> Result<(StatusCode, Json<MeterReading>), ApiError> {
    let reading = services::confirm(&state, user_id, payload).await?;
    Ok((StatusCode::CREATED, Json(reading)))
}

/// GET /readings/pending-image?token=…
///
/// Possession of a valid pending token is the only gate; the token is the
/// session's claim on the staged image.
#[instrument(skip(state, query))]
pub async fn pending_image(
    State(state): State<AppState>,
    Query(query): Query<PendingImageQuery>,
) -> Result<Response, ApiError> {
    let keys = JwtKeys::from_ref(&state);
    let staged = pending::load(&keys, &query.token)
        .map_err(|_| ApiError::NotFound("No pending reading"))?;
    serve_image(&state.uploads, &staged.image).await
}

/// GET /readings/image/{id} — only the owning user may view a persisted
/// reading's image.
#[instrument(skip(state))]
pub async fn reading_image(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let reading = MeterReading::find_by_id(&state.db, id)
        .await?
        .ok_or(ApiError::NotFound("Reading not found"))?;
    if reading.user_id != user_id {
        return Err(ApiError::Forbidden);
    }
    serve_image(&state.uploads, &reading.image_path).await
}

/// Shared serving path for staged and persisted images: strict in-directory
/// resolution, long-lived immutable caching, no-sniff. Ownership decisions
/// happen before this point.
async fn serve_image(store: &UploadStore, name: &str) -> Result<Response, ApiError> {
    let path = store
        .resolve(name)
        .ok_or(ApiError::NotFound("Image not found"))?;
    let bytes = match tokio::fs::read(&path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::NotFound("Image not found"))
        }
        Err(e) => return Err(ApiError::Internal(e.into())),
    };

    Response::builder()
        .header(header::CONTENT_TYPE, UploadStore::guess_mime(name))
        .header(header::CACHE_CONTROL, "public, max-age=31536000, immutable")
        .header(header::X_CONTENT_TYPE_OPTIONS, "nosniff")
        .body(Body::from(bytes))
        .map_err(|e| ApiError::Internal(e.into()))
}
