use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use serde_json::json;
use tracing::instrument;

use crate::auth::repo::User;
use crate::auth::tokens::AuthUser;
use crate::error::ApiError;
use crate::readings::repo::MeterReading;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dashboard/", get(dashboard))
        .route("/alerts/", get(alerts))
}

#[derive(Debug, Serialize)]
pub struct DashboardReading {
    pub id: i64,
    pub kwh: f64,
    pub image_path: String,
    pub estimated_cost: f64,
}

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub electricity_rate: f64,
    pub readings: Vec<DashboardReading>,
}

/// GET /dashboard/ — the user's readings newest-first with a cost estimate
/// from their configured rate. Charts/analytics come later.
#[instrument(skip(state))]
pub async fn dashboard(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<DashboardResponse>, ApiError> {
    let user = User::find_by_id(&state.db, user_id)
        .await?
        .ok_or(ApiError::Unauthorized("User not found"))?;
    let readings = MeterReading::list_by_user(&state.db, user_id).await?;

    let rate = user.electricity_rate;
    let readings = readings
        .into_iter()
        .map(|r| DashboardReading {
            id: r.id,
            estimated_cost: r.kwh * rate,
            kwh: r.kwh,
            image_path: r.image_path,
        })
        .collect();

    Ok(Json(DashboardResponse {
        electricity_rate: rate,
        readings,
    }))
}

/// GET /alerts/ — placeholder until usage alerts exist.
pub async fn alerts() -> Json<serde_json::Value> {
    Json(json!({ "alerts": [] }))
}
