use axum::extract::FromRef;
use bytes::Bytes;
use tracing::{info, warn};

use super::dto::{ConfirmRequest, UploadResponse};
use super::pending;
use super::repo::MeterReading;
use crate::auth::tokens::JwtKeys;
use crate::error::ApiError;
use crate::state::AppState;
use crate::storage::UploadStore;

/// The ingestion pipeline: validate extension, store under a random name,
/// OCR, stage the draft. An OCR failure removes the stored file before the
/// error is surfaced, so a rejected upload leaves no state behind.
pub async fn ingest(
    state: &AppState,
    user_id: i64,
    filename: &str,
    bytes: Bytes,
) -> Result<UploadResponse, ApiError> {
    if filename.is_empty() {
        return Err(ApiError::Validation("A meter photo is required".into()));
    }
    let Some(ext) = UploadStore::allowed_extension(filename) else {
        return Err(ApiError::Validation(
            "Unsupported file type; use bmp, jpg, jpeg, png, tiff, tif or pnm".into(),
        ));
    };

    let stored = state.uploads.save(&ext, &bytes).await?;

    let engine = state.ocr.clone();
    let data = bytes.clone();
    let recognized = tokio::task::spawn_blocking(move || crate::ocr::extract_kwh(engine.as_ref(), &data))
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;

    let kwh = match recognized {
        Ok(v) => v,
        Err(e) => {
            state.uploads.delete(&stored).await;
            warn!(error = %e, file = %stored, "ocr failed, upload removed");
            return Err(ApiError::Ocr(
                "Could not read a value from the image; try a clearer photo".into(),
            ));
        }
    };

    let keys = JwtKeys::from_ref(state);
    let pending_token = pending::stage(&keys, user_id, &stored, kwh)?;

    info!(user_id, file = %stored, kwh, "reading staged for confirmation");
    Ok(UploadResponse {
        kwh,
        image: stored,
        pending_token,
    })
}

/// The confirmation step: check the staged draft belongs to the caller,
/// validate the corrected value, re-check the stored image, persist.
pub async fn confirm(
    state: &AppState,
    user_id: i64,
    payload: ConfirmRequest,
) -> Result<MeterReading, ApiError> {
    let keys = JwtKeys::from_ref(state);
    let Ok(staged) = pending::load(&keys, &payload.pending_token) else {
        return Err(ApiError::NotFound("No pending reading; upload a photo first"));
    };
    if staged.sub != user_id {
        return Err(ApiError::Forbidden);
    }

    let kwh: f64 = payload
        .kwh
        .trim()
        .parse()
        .map_err(|_| ApiError::Validation("Enter the reading as a number".into()))?;
    if !kwh.is_finite() || kwh < 0.0 {
        return Err(ApiError::Validation(
            "Reading must be a non-negative number".into(),
        ));
    }

    // The image may have vanished between upload and confirm.
    let path = state
        .uploads
        .resolve(&staged.image)
        .ok_or(ApiError::NotFound("Stored image not found"))?;
    if !tokio::fs::try_exists(&path)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?
    {
        return Err(ApiError::NotFound("Stored image not found"));
    }

    let reading = MeterReading::create(&state.db, user_id, kwh, &staged.image).await?;
    info!(
        user_id,
        reading_id = reading.id,
        kwh,
        "meter reading confirmed"
    );
    Ok(reading)
}
