use log::info;
use sqlx::{Pool, Postgres};

use crate::{
    authentication::cryptography::{hash_password, verify_password},
    error::ApiError,
    form::{ValidPasswordChange, ValidUser},
    pagination::{Page, PageContext},
    schema::{CreatedUser, User, UserRow, Uuid},
};

const USER_ROW_COLUMNS: &str = "
    u.email, u.id, u.username, u.first_name, u.last_name,
    EXISTS (SELECT 1 FROM follows f WHERE f.author_id = u.id AND f.user_id = $1) AS is_subscribed
";

pub async fn get_user_by_id(pool: &Pool<Postgres>, user_id: Uuid) -> Result<Option<User>, ApiError> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

/// Public view of `user_id`, with `is_subscribed` relative to `viewer`.
pub async fn get_user_row(
    pool: &Pool<Postgres>,
    user_id: Uuid,
    viewer: Option<Uuid>,
) -> Result<UserRow, ApiError> {
    let row: Option<UserRow> =
        sqlx::query_as(&format!("SELECT {USER_ROW_COLUMNS} FROM users u WHERE u.id = $2"))
            .bind(viewer)
            .bind(user_id)
            .fetch_optional(pool)
            .await?;

    row.ok_or_else(|| ApiError::NotFound(String::from("No user exists with specified id")))
}

pub async fn list_user_rows(
    pool: &Pool<Postgres>,
    user_ids: &[Uuid],
    viewer: Option<Uuid>,
) -> Result<Vec<UserRow>, ApiError> {
    let rows: Vec<UserRow> =
        sqlx::query_as(&format!("SELECT {USER_ROW_COLUMNS} FROM users u WHERE u.id = ANY($2)"))
            .bind(viewer)
            .bind(user_ids.to_vec())
            .fetch_all(pool)
            .await?;

    Ok(rows)
}

pub async fn fetch_users(
    pool: &Pool<Postgres>,
    page: Page,
    viewer: Option<Uuid>,
) -> Result<PageContext<UserRow>, ApiError> {
    let rows: Vec<UserRow> = sqlx::query_as(&format!(
        "SELECT {USER_ROW_COLUMNS}, COUNT(*) OVER() AS count FROM users u ORDER BY u.id LIMIT $2 OFFSET $3"
    ))
    .bind(viewer)
    .bind(page.size)
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    let total_count = rows.first().map(|u| u.count).unwrap_or(0);
    PageContext::from_rows(rows, total_count, page)
}

/// Creates an account; the password is stored as an argon2 hash.
pub async fn register_user(pool: &Pool<Postgres>, user: ValidUser) -> Result<CreatedUser, ApiError> {
    let taken: Option<(String, String)> =
        sqlx::query_as("SELECT username, email FROM users WHERE username = $1 OR LOWER(email) = LOWER($2) LIMIT 1")
            .bind(&user.username)
            .bind(&user.email)
            .fetch_optional(pool)
            .await?;

    if let Some((username, _)) = taken {
        if username == user.username {
            return Err(ApiError::validation(
                "username",
                "A user with this username already exists",
            ));
        }
        return Err(ApiError::validation("email", "A user with this email already exists"));
    }

    let password = hash_password(&user.password)
        .map_err(|e| ApiError::Internal(format!("Failed to hash password: {e}")))?;

    let created: CreatedUser = sqlx::query_as(
        "
        INSERT INTO users (email, username, first_name, last_name, password)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING email, id, username, first_name, last_name
    ",
    )
    .bind(&user.email)
    .bind(&user.username)
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(password)
    .fetch_one(pool)
    .await?;

    info!("Registered user {} ({})", created.username, created.id);
    Ok(created)
}

pub async fn set_password(
    pool: &Pool<Postgres>,
    user_id: Uuid,
    change: ValidPasswordChange,
) -> Result<(), ApiError> {
    let user = get_user_by_id(pool, user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(String::from("No user exists with specified id")))?;

    let authenticated = verify_password(&change.current_password, &user.password)
        .map_err(|e| ApiError::Internal(format!("Stored password hash is unreadable: {e}")))?;
    if !authenticated {
        return Err(ApiError::validation("current_password", "Wrong password"));
    }
    if change.current_password == change.new_password {
        return Err(ApiError::validation(
            "new_password",
            "The new password must differ from the current one",
        ));
    }

    let password = hash_password(&change.new_password)
        .map_err(|e| ApiError::Internal(format!("Failed to hash password: {e}")))?;

    sqlx::query("UPDATE users SET password = $1 WHERE id = $2")
        .bind(password)
        .bind(user_id)
        .execute(pool)
        .await?;

    info!("User {} changed their password", user.username);
    Ok(())
}
