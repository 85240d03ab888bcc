use axum::{
    extract::{FromRef, State},
    routing::{get, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{AuthResponse, LoginRequest, ProfileUpdateRequest, PublicUser, RegisterRequest},
        password::{hash_password, verify_password},
        repo::User,
        tokens::{AuthUser, JwtKeys},
    },
    error::ApiError,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/profile", get(get_profile).post(update_profile))
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    email.len() <= 255 && EMAIL_RE.is_match(email)
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    payload.email = payload.email.trim().to_lowercase();
    payload.username = payload.username.trim().to_string();

    if !(3..=50).contains(&payload.username.len()) {
        return Err(ApiError::Validation(
            "Username must be 3 to 50 characters".into(),
        ));
    }
    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(ApiError::Validation("Invalid email".into()));
    }
    if payload.password.len() < 8 {
        return Err(ApiError::Validation(
            "Password must be at least 8 characters".into(),
        ));
    }
    if payload.password != payload.confirm {
        return Err(ApiError::Validation("Passwords do not match".into()));
    }

    // Pre-checks keep the common case friendly; the UNIQUE constraints below
    // catch the insert race.
    if User::find_by_email(&state.db, &payload.email).await?.is_some() {
        warn!(email = %payload.email, "email already registered");
        return Err(ApiError::Duplicate("Email already registered"));
    }
    if User::find_by_username(&state.db, &payload.username)
        .await?
        .is_some()
    {
        warn!(username = %payload.username, "username already taken");
        return Err(ApiError::Duplicate("Username already taken"));
    }

    let hash = hash_password(&payload.password)?;
    let user = match User::create(&state.db, &payload.username, &payload.email, &hash).await {
        Ok(u) => u,
        Err(e) if e.as_database_error().is_some_and(|d| d.is_unique_violation()) => {
            warn!(email = %payload.email, "registration lost uniqueness race");
            return Err(ApiError::Duplicate("Email or username already taken"));
        }
        Err(e) => return Err(ApiError::Internal(e.into())),
    };

    let keys = JwtKeys::from_ref(&state);
    let access_token = keys.sign_access(user.id)?;

    info!(user_id = user.id, username = %user.username, "user registered");
    Ok(Json(AuthResponse {
        access_token,
        user: user.into(),
    }))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(mut payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    payload.email = payload.email.trim().to_lowercase();

    let Some(user) = User::find_by_email(&state.db, &payload.email).await? else {
        warn!(email = %payload.email, "login unknown email");
        return Err(ApiError::Unauthorized("Invalid credentials"));
    };

    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(user_id = user.id, "login invalid password");
        return Err(ApiError::Unauthorized("Invalid credentials"));
    }

    let keys = JwtKeys::from_ref(&state);
    let access_token = keys.sign_access(user.id)?;

    info!(user_id = user.id, "user logged in");
    Ok(Json(AuthResponse {
        access_token,
        user: user.into(),
    }))
}

/// Tokens are client-held; logout is an acknowledgement that the client
/// drops its token.
#[instrument(skip_all)]
pub async fn logout(AuthUser(user_id): AuthUser) -> Json<serde_json::Value> {
    info!(user_id, "user logged out");
    Json(json!({ "ok": true }))
}

#[instrument(skip(state))]
pub async fn get_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<PublicUser>, ApiError> {
    let user = User::find_by_id(&state.db, user_id)
        .await?
        .ok_or(ApiError::Unauthorized("User not found"))?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, payload))]
pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<ProfileUpdateRequest>,
) -> Result<Json<PublicUser>, ApiError> {
    let rate = payload.electricity_rate;
    if !rate.is_finite() || !(0.0..=100_000.0).contains(&rate) {
        return Err(ApiError::Validation(
            "Electricity rate must be between 0 and 100000".into(),
        ));
    }

    User::update_rate(&state.db, user_id, rate).await?;
    let user = User::find_by_id(&state.db, user_id)
        .await?
        .ok_or(ApiError::Unauthorized("User not found"))?;

    info!(user_id, rate, "electricity rate updated");
    Ok(Json(user.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_state;

    #[test]
    fn email_validation_table() {
        assert!(is_valid_email("a@b.co"));
        assert!(is_valid_email("user.name+tag@example.org"));
        assert!(!is_valid_email("no-at-sign"));
        assert!(!is_valid_email("two@@example.com"));
        assert!(!is_valid_email("spaces in@example.com"));
        assert!(!is_valid_email("nodot@domain"));
    }

    fn register_payload(username: &str, email: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.into(),
            email: email.into(),
            password: "long-enough-password".into(),
            confirm: "long-enough-password".into(),
        }
    }

    #[tokio::test]
    async fn register_then_login_roundtrip() {
        let state = test_state().await;

        let resp = register(
            State(state.clone()),
            Json(register_payload("dana", "Dana@Example.com")),
        )
        .await
        .expect("register");
        assert_eq!(resp.0.user.username, "dana");
        // Email is normalised before storage.
        assert_eq!(resp.0.user.email, "dana@example.com");
        assert!(!resp.0.access_token.is_empty());

        let resp = login(
            State(state),
            Json(LoginRequest {
                email: "dana@example.com".into(),
                password: "long-enough-password".into(),
            }),
        )
        .await
        .expect("login");
        assert_eq!(resp.0.user.username, "dana");
    }

    #[tokio::test]
    async fn register_rejects_duplicate_email_and_username() {
        let state = test_state().await;
        register(
            State(state.clone()),
            Json(register_payload("erin", "erin@example.com")),
        )
        .await
        .expect("first register");

        let err = register(
            State(state.clone()),
            Json(register_payload("erin2", "erin@example.com")),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Duplicate(_)));

        let err = register(
            State(state.clone()),
            Json(register_payload("erin", "erin2@example.com")),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Duplicate(_)));

        // Neither failed attempt created a row.
        let second = User::find_by_email(&state.db, "erin2@example.com")
            .await
            .expect("query");
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn register_validates_form_fields() {
        let state = test_state().await;

        let mut bad = register_payload("fred", "fred@example.com");
        bad.password = "short".into();
        bad.confirm = "short".into();
        assert!(matches!(
            register(State(state.clone()), Json(bad)).await.unwrap_err(),
            ApiError::Validation(_)
        ));

        let mut mismatch = register_payload("fred", "fred@example.com");
        mismatch.confirm = "different-password!".into();
        assert!(matches!(
            register(State(state.clone()), Json(mismatch))
                .await
                .unwrap_err(),
            ApiError::Validation(_)
        ));

        let short_name = register_payload("ab", "fred@example.com");
        assert!(matches!(
            register(State(state), Json(short_name)).await.unwrap_err(),
            ApiError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn login_rejects_wrong_password() {
        let state = test_state().await;
        register(
            State(state.clone()),
            Json(register_payload("gina", "gina@example.com")),
        )
        .await
        .expect("register");

        let err = login(
            State(state),
            Json(LoginRequest {
                email: "gina@example.com".into(),
                password: "not-the-password".into(),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn profile_rate_update_and_validation() {
        let state = test_state().await;
        let resp = register(
            State(state.clone()),
            Json(register_payload("hank", "hank@example.com")),
        )
        .await
        .expect("register");
        let user_id = resp.0.user.id;

        let updated = update_profile(
            State(state.clone()),
            AuthUser(user_id),
            Json(ProfileUpdateRequest {
                electricity_rate: 9.75,
            }),
        )
        .await
        .expect("update profile");
        assert_eq!(updated.0.electricity_rate, 9.75);

        let err = update_profile(
            State(state),
            AuthUser(user_id),
            Json(ProfileUpdateRequest {
                electricity_rate: -1.0,
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }
}
