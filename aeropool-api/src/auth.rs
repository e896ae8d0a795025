use aeropool_domain::user::{User, UserRole};
use axum::{
    extract::State,
    routing::{delete, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::{issue_access, issue_refresh, verify_refresh, AuthUser};
use crate::response::{ok, ok_message, ApiResponse};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
}

pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/logout", post(logout))
        .route("/auth/me", delete(delete_me))
        .route("/me", axum::routing::get(get_me).patch(update_me))
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    email: String,
    password: String,
    display_name: String,
    #[serde(default)]
    role: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct RefreshRequest {
    refresh_token: String,
}

#[derive(Debug, Serialize)]
struct UserView {
    id: Uuid,
    email: String,
    display_name: String,
    role: UserRole,
    rating_mean: f64,
    rating_count: i64,
    avatar_url: Option<String>,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            display_name: user.display_name.clone(),
            role: user.role,
            rating_mean: user.rating_mean,
            rating_count: user.rating_count,
            avatar_url: user.avatar_url.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct AuthResponse {
    user: UserView,
    access_token: String,
    refresh_token: String,
}

fn validate_credentials(email: &str, password: &str) -> Result<(), AppError> {
    if !email.contains('@') || email.len() < 5 {
        return Err(AppError::Validation("a valid email is required".into()));
    }
    if password.len() < 8 {
        return Err(AppError::Validation("password must be at least 8 characters".into()));
    }
    Ok(())
}

fn tokens_for(state: &AppState, user: &User) -> Result<(String, String), AppError> {
    let now = state.clock.now();
    let access = issue_access(&state.auth, user.id, &user.email, user.role, now)
        .map_err(|e| AppError::Anyhow(e.into()))?;
    let refresh = issue_refresh(&state.auth, user.id, &user.email, user.role, now)
        .map_err(|e| AppError::Anyhow(e.into()))?;
    Ok((access, refresh))
}

async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<ApiResponse<AuthResponse>>, AppError> {
    validate_credentials(&req.email, &req.password)?;
    if req.display_name.trim().is_empty() {
        return Err(AppError::Validation("display_name is required".into()));
    }
    let role = match req.role.as_deref() {
        None => UserRole::Both,
        Some(r) => UserRole::parse(r)
            .ok_or_else(|| AppError::Validation(format!("unknown role {r}")))?,
    };

    let hash = bcrypt::hash(&req.password, bcrypt::DEFAULT_COST)
        .map_err(|e| AppError::Anyhow(e.into()))?;
    let user = state
        .users
        .create(&req.email, &hash, req.display_name.trim(), role)
        .await?;

    let (access_token, refresh_token) = tokens_for(&state, &user)?;
    Ok(ok(AuthResponse { user: UserView::from(&user), access_token, refresh_token }))
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<ApiResponse<AuthResponse>>, AppError> {
    // Tighter throttle on credential guessing, fail-open when Redis is out.
    let rl_key = format!("ratelimit:login:{}", req.email.to_lowercase());
    if let Some(count) = state.cache.incr_window(&rl_key, 60).await {
        if count > 10 {
            return Err(AppError::RateLimit);
        }
    }

    let user = state
        .users
        .find_by_email(&req.email)
        .await?
        .ok_or_else(|| AppError::Auth("invalid credentials".into()))?;
    if user.is_deleted() {
        return Err(AppError::Auth("invalid credentials".into()));
    }
    let valid = bcrypt::verify(&req.password, &user.password_hash)
        .map_err(|e| AppError::Anyhow(e.into()))?;
    if !valid {
        return Err(AppError::Auth("invalid credentials".into()));
    }

    let (access_token, refresh_token) = tokens_for(&state, &user)?;
    Ok(ok(AuthResponse { user: UserView::from(&user), access_token, refresh_token }))
}

async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<ApiResponse<AuthResponse>>, AppError> {
    let principal = verify_refresh(&state.auth, &req.refresh_token)
        .ok_or_else(|| AppError::Auth("invalid refresh token".into()))?;
    let user = state
        .users
        .get(principal.id)
        .await?
        .ok_or_else(|| AppError::Auth("invalid refresh token".into()))?;
    if user.is_deleted() {
        return Err(AppError::Auth("invalid refresh token".into()));
    }
    let (access_token, refresh_token) = tokens_for(&state, &user)?;
    Ok(ok(AuthResponse { user: UserView::from(&user), access_token, refresh_token }))
}

async fn logout(Extension(_user): Extension<AuthUser>) -> Json<ApiResponse<()>> {
    // Tokens are stateless; the client discards them.
    ok_message("logged out")
}

async fn delete_me(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    state.users.soft_delete(user.id).await?;
    Ok(ok_message("account deleted"))
}

#[derive(Debug, Serialize)]
struct ProfileView {
    #[serde(flatten)]
    user: UserView,
    phone: Option<String>,
    phone_verified: bool,
    saved_locations: Vec<aeropool_domain::user::SavedLocation>,
    has_connected_account: bool,
}

fn profile_view(user: &User) -> ProfileView {
    ProfileView {
        user: UserView::from(user),
        phone: user.phone.clone(),
        phone_verified: user.phone_verified,
        saved_locations: user.saved_locations.clone(),
        has_connected_account: user.connected_account_id.is_some(),
    }
}

async fn get_me(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ApiResponse<ProfileView>>, AppError> {
    let profile = state.users.get(user.id).await?.ok_or(AppError::NotFound("user"))?;
    Ok(ok(profile_view(&profile)))
}

#[derive(Debug, Deserialize)]
struct UpdateMeRequest {
    display_name: Option<String>,
    phone: Option<String>,
    avatar_url: Option<String>,
    saved_locations: Option<Vec<aeropool_domain::user::SavedLocation>>,
}

async fn update_me(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<UpdateMeRequest>,
) -> Result<Json<ApiResponse<ProfileView>>, AppError> {
    if req.display_name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(AppError::Validation("display_name must not be empty".into()));
    }
    if let Some(locations) = &req.saved_locations {
        if locations.iter().any(|l| !l.point.is_valid()) {
            return Err(AppError::Validation("saved location coordinates out of range".into()));
        }
    }
    let profile = state
        .users
        .update_profile(
            user.id,
            req.display_name.as_deref(),
            req.phone.as_deref(),
            req.avatar_url.as_deref(),
            req.saved_locations.as_deref(),
        )
        .await?
        .ok_or(AppError::NotFound("user"))?;
    Ok(ok(profile_view(&profile)))
}
