use jsonwebtoken::{decode, encode, Header};
use serde::{Deserialize, Serialize};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;

use crate::auth::tokens::{JwtKeys, TokenKind};

/// The session's staged draft reading: an OCR result waiting for the user to
/// confirm or correct it. Carried as a signed short-lived token so no
/// server-side session store is needed; a new upload supersedes the old
/// draft by issuing a new token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingReading {
    pub sub: i64,
    pub image: String,
    pub kwh: f64,
    pub iat: usize,
    pub exp: usize,
    pub iss: String,
    pub aud: String,
    pub kind: TokenKind,
}

/// Sign a pending-reading token for the given principal.
pub fn stage(keys: &JwtKeys, user_id: i64, image: &str, kwh: f64) -> anyhow::Result<String> {
    let now = OffsetDateTime::now_utc();
    let exp = now + TimeDuration::seconds(keys.pending_ttl.as_secs() as i64);
    let claims = PendingReading {
        sub: user_id,
        image: image.to_string(),
        kwh,
        iat: now.unix_timestamp() as usize,
        exp: exp.unix_timestamp() as usize,
        iss: keys.issuer.clone(),
        aud: keys.audience.clone(),
        kind: TokenKind::Pending,
    };
    let token = encode(&Header::default(), &claims, &keys.encoding)?;
    debug!(user_id, image, kwh, "pending reading staged");
    Ok(token)
}

/// Verify and decode a pending-reading token. Expired, malformed or
/// wrong-kind tokens all fail.
pub fn load(keys: &JwtKeys, token: &str) -> anyhow::Result<PendingReading> {
    let data = decode::<PendingReading>(token, &keys.decoding, &keys.validation())?;
    anyhow::ensure!(
        data.claims.kind == TokenKind::Pending,
        "not a pending-reading token"
    );
    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppState;
    use axum::extract::FromRef;

    fn make_keys() -> JwtKeys {
        JwtKeys::from_ref(&AppState::fake())
    }

    #[test]
    fn stage_and_load_roundtrip() {
        let keys = make_keys();
        let token = stage(&keys, 7, "abc123.jpg", 45231.0).expect("stage");
        let pending = load(&keys, &token).expect("load");
        assert_eq!(pending.sub, 7);
        assert_eq!(pending.image, "abc123.jpg");
        assert_eq!(pending.kwh, 45231.0);
    }

    #[test]
    fn access_token_is_not_a_pending_reading() {
        let keys = make_keys();
        let access = keys.sign_access(7).expect("sign access");
        assert!(load(&keys, &access).is_err());
    }

    #[test]
    fn pending_token_is_not_a_session() {
        let keys = make_keys();
        let token = stage(&keys, 7, "abc123.jpg", 1.0).expect("stage");
        assert!(keys.verify_access(&token).is_err());
    }

    #[test]
    fn tampered_token_fails() {
        let keys = make_keys();
        let mut token = stage(&keys, 7, "abc123.jpg", 1.0).expect("stage");
        token.push('x');
        assert!(load(&keys, &token).is_err());
    }
}
