use aeropool_domain::user::UserRole;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::{AppState, AuthSettings};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub role: String,
    /// "access" or "refresh"; a refresh token never authorizes a request.
    pub typ: String,
    pub exp: usize,
}

/// The verified principal handlers read from request extensions.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub role: UserRole,
}

pub fn issue_access(
    settings: &AuthSettings,
    user_id: Uuid,
    email: &str,
    role: UserRole,
    now: DateTime<Utc>,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims {
        sub: user_id.to_string(),
        email: email.to_string(),
        role: role.as_str().to_string(),
        typ: "access".into(),
        exp: (now.timestamp() + settings.access_ttl_seconds as i64) as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(settings.jwt_secret.as_bytes()))
}

pub fn issue_refresh(
    settings: &AuthSettings,
    user_id: Uuid,
    email: &str,
    role: UserRole,
    now: DateTime<Utc>,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims {
        sub: user_id.to_string(),
        email: email.to_string(),
        role: role.as_str().to_string(),
        typ: "refresh".into(),
        exp: (now.timestamp() + settings.refresh_ttl_seconds as i64) as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(settings.refresh_secret.as_bytes()))
}

pub fn verify_refresh(settings: &AuthSettings, token: &str) -> Option<AuthUser> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(settings.refresh_secret.as_bytes()),
        &Validation::default(),
    )
    .ok()?;
    if data.claims.typ != "refresh" {
        return None;
    }
    claims_to_user(&data.claims)
}

fn claims_to_user(claims: &Claims) -> Option<AuthUser> {
    Some(AuthUser {
        id: Uuid::parse_str(&claims.sub).ok()?,
        email: claims.email.clone(),
        role: UserRole::parse(&claims.role)?,
    })
}

/// Bearer-token middleware: decodes the access token and injects the
/// principal into request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = auth_header.strip_prefix("Bearer ").ok_or(StatusCode::UNAUTHORIZED)?;

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.auth.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| StatusCode::UNAUTHORIZED)?;

    if data.claims.typ != "access" {
        return Err(StatusCode::UNAUTHORIZED);
    }

    let user = claims_to_user(&data.claims).ok_or(StatusCode::UNAUTHORIZED)?;
    req.extensions_mut().insert(user);

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> AuthSettings {
        AuthSettings {
            jwt_secret: "access-secret".into(),
            refresh_secret: "refresh-secret".into(),
            access_ttl_seconds: 900,
            refresh_ttl_seconds: 604_800,
        }
    }

    #[test]
    fn access_token_round_trip() {
        let s = settings();
        let user_id = Uuid::new_v4();
        let token = issue_access(&s, user_id, "a@b.c", UserRole::Both, Utc::now()).unwrap();
        let data = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(s.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .unwrap();
        assert_eq!(data.claims.sub, user_id.to_string());
        assert_eq!(data.claims.typ, "access");
    }

    #[test]
    fn refresh_token_is_not_an_access_token() {
        let s = settings();
        let token = issue_refresh(&s, Uuid::new_v4(), "a@b.c", UserRole::Driver, Utc::now()).unwrap();
        // Wrong secret: access decode must fail.
        assert!(decode::<Claims>(
            &token,
            &DecodingKey::from_secret(s.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .is_err());
        // Right path verifies and preserves the role.
        let user = verify_refresh(&s, &token).unwrap();
        assert_eq!(user.role, UserRole::Driver);
    }

    #[test]
    fn expired_refresh_is_rejected() {
        let s = settings();
        let past = Utc::now() - chrono::Duration::days(30);
        let token = issue_refresh(&s, Uuid::new_v4(), "a@b.c", UserRole::Both, past).unwrap();
        assert!(verify_refresh(&s, &token).is_none());
    }
}
