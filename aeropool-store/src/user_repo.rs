use aeropool_domain::user::{normalize_email, SavedLocation, User, UserRole};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{is_unique_violation, StoreError, StoreResult};

pub struct UserRepo {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    phone: Option<String>,
    phone_verified: bool,
    password_hash: String,
    display_name: String,
    role: String,
    connected_account_id: Option<String>,
    connected_account_ready: bool,
    avatar_url: Option<String>,
    rating_mean: f64,
    rating_count: i64,
    saved_locations: serde_json::Value,
    deleted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

const USER_COLUMNS: &str = "id, email, phone, phone_verified, password_hash, display_name, role, \
     connected_account_id, connected_account_ready, avatar_url, rating_mean, rating_count, \
     saved_locations, deleted_at, created_at, updated_at";

fn map_user(row: UserRow) -> StoreResult<User> {
    let role = UserRole::parse(&row.role)
        .ok_or_else(|| StoreError::Decode(format!("unknown user role {}", row.role)))?;
    let saved_locations: Vec<SavedLocation> = serde_json::from_value(row.saved_locations)
        .map_err(|e| StoreError::Decode(format!("saved_locations: {e}")))?;
    Ok(User {
        id: row.id,
        email: row.email,
        phone: row.phone,
        phone_verified: row.phone_verified,
        password_hash: row.password_hash,
        display_name: row.display_name,
        role,
        connected_account_id: row.connected_account_id,
        connected_account_ready: row.connected_account_ready,
        avatar_url: row.avatar_url,
        rating_mean: row.rating_mean,
        rating_count: row.rating_count,
        saved_locations,
        deleted_at: row.deleted_at,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

impl UserRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        email: &str,
        password_hash: &str,
        display_name: &str,
        role: UserRole,
    ) -> StoreResult<User> {
        let id = Uuid::new_v4();
        let email = normalize_email(email);
        let sql = format!(
            "INSERT INTO users (id, email, password_hash, display_name, role) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {USER_COLUMNS}"
        );
        let row: UserRow = sqlx::query_as(&sql)
            .bind(id)
            .bind(&email)
            .bind(password_hash)
            .bind(display_name)
            .bind(role.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::Conflict("email already registered".into())
                } else {
                    e.into()
                }
            })?;
        map_user(row)
    }

    pub async fn get(&self, id: Uuid) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row: Option<UserRow> = sqlx::query_as(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.map(map_user).transpose()
    }

    pub async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE LOWER(email) = $1");
        let row: Option<UserRow> = sqlx::query_as(&sql)
            .bind(normalize_email(email))
            .fetch_optional(&self.pool)
            .await?;
        row.map(map_user).transpose()
    }

    pub async fn soft_delete(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query("UPDATE users SET deleted_at = NOW(), updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn update_profile(
        &self,
        id: Uuid,
        display_name: Option<&str>,
        phone: Option<&str>,
        avatar_url: Option<&str>,
        saved_locations: Option<&[SavedLocation]>,
    ) -> StoreResult<Option<User>> {
        let locations_json = match saved_locations {
            Some(locations) => Some(
                serde_json::to_value(locations)
                    .map_err(|e| StoreError::Decode(format!("saved_locations: {e}")))?,
            ),
            None => None,
        };
        let sql = format!(
            "UPDATE users SET \
                display_name = COALESCE($2, display_name), \
                phone = COALESCE($3, phone), \
                avatar_url = COALESCE($4, avatar_url), \
                saved_locations = COALESCE($5, saved_locations), \
                updated_at = NOW() \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        let row: Option<UserRow> = sqlx::query_as(&sql)
            .bind(id)
            .bind(display_name)
            .bind(phone)
            .bind(avatar_url)
            .bind(locations_json)
            .fetch_optional(&self.pool)
            .await?;
        row.map(map_user).transpose()
    }

    pub async fn set_connected_account(&self, id: Uuid, account_id: &str) -> StoreResult<()> {
        sqlx::query(
            "UPDATE users SET connected_account_id = $2, connected_account_ready = FALSE, \
             updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(account_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Webhook-side update of the cached connected-account status.
pub async fn set_connected_account_ready<'e>(
    exec: impl sqlx::PgExecutor<'e>,
    account_id: &str,
    ready: bool,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE users SET connected_account_ready = $2, updated_at = NOW() \
         WHERE connected_account_id = $1",
    )
    .bind(account_id)
    .bind(ready)
    .execute(exec)
    .await?;
    Ok(result.rows_affected())
}

/// Folds a new star value into the recipient's rolling aggregates.
pub async fn apply_rating<'e>(
    exec: impl sqlx::PgExecutor<'e>,
    user_id: Uuid,
    stars: i32,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE users SET \
            rating_mean = (rating_mean * rating_count + $2) / (rating_count + 1), \
            rating_count = rating_count + 1, \
            updated_at = NOW() \
         WHERE id = $1",
    )
    .bind(user_id)
    .bind(stars as f64)
    .execute(exec)
    .await?;
    Ok(())
}
