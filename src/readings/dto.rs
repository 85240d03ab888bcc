use serde::{Deserialize, Serialize};

/// Response to a successful upload: the OCR draft plus the token that stages
/// it for confirmation.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub kwh: f64,
    pub image: String,
    pub pending_token: String,
}

/// Confirmation submission. `kwh` arrives as entered by the user and is
/// parsed server-side so bad input is a validation error, not a decode error.
#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub pending_token: String,
    pub kwh: String,
}

/// Query string for the staged-image endpoint.
#[derive(Debug, Deserialize)]
pub struct PendingImageQuery {
    pub token: String,
}
