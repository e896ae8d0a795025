use aeropool_domain::notification::Notification;
use aeropool_domain::search::Page;
use aeropool_store::cache::notifications_key;
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::response::{ok, ok_message, ApiResponse};
use crate::rides::PageQuery;
use crate::state::AppState;

pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(list_notifications))
        .route("/notifications/:id/read", post(mark_read))
}

#[derive(Debug, Serialize, serde::Deserialize)]
struct NotificationList {
    notifications: Vec<Notification>,
    unread: i64,
}

/// First page is cached under `notifications:<userId>`; every emit and
/// read-marking invalidates it.
async fn list_notifications(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(page): Query<PageQuery>,
) -> Result<Json<ApiResponse<NotificationList>>, AppError> {
    let page = Page::clamped(page.page, page.limit);
    let cacheable = page.page == 1;
    let key = notifications_key(user.id);

    if cacheable {
        if let Some(cached) = state.cache.get(&key).await {
            if let Ok(list) = serde_json::from_str::<NotificationList>(&cached) {
                return Ok(ok(list));
            }
        }
    }

    let notifications = state.notifier.list_for_user(user.id, page.limit, page.offset()).await?;
    let unread = state.notifier.unread_count(user.id).await?;
    let list = NotificationList { notifications, unread };

    if cacheable {
        if let Ok(serialized) = serde_json::to_string(&list) {
            state.cache.set_ex(&key, &serialized, 120).await;
        }
    }
    Ok(ok(list))
}

async fn mark_read(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    if !state.notifier.mark_read(user.id, id).await? {
        return Err(AppError::NotFound("notification"));
    }
    Ok(ok_message("notification read"))
}
