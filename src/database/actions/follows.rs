use std::collections::HashMap;

use log::info;
use sqlx::{Pool, Postgres};

use super::users::{get_user_by_id, get_user_row};
use crate::{
    error::ApiError,
    jwt::SessionData,
    pagination::{Page, PageContext},
    permissions::ActionType,
    schema::{AuthorRecipeRow, RecipeShort, Subscription, UserRow, Uuid},
};

// A follows row (user_id, author_id) reads "user follows author".
// Subscriptions of U are the authors U follows, subscribers of U follow U.

pub async fn is_subscribed(
    user_id: Uuid,
    author_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<bool, ApiError> {
    let result: Option<(i32,)> =
        sqlx::query_as("SELECT id FROM follows WHERE user_id = $1 AND author_id = $2")
            .bind(user_id)
            .bind(author_id)
            .fetch_optional(pool)
            .await?;

    Ok(result.is_some())
}

async fn get_author(author_id: Uuid, pool: &Pool<Postgres>) -> Result<(), ApiError> {
    match get_user_by_id(pool, author_id).await? {
        Some(_) => Ok(()),
        None => Err(ApiError::NotFound(String::from(
            "No user exists with specified id",
        ))),
    }
}

fn reject_self(session: &SessionData, author_id: Uuid) -> Result<(), ApiError> {
    if session.user_id == author_id {
        return Err(ApiError::validation("author", "You cannot subscribe to yourself"));
    }
    Ok(())
}

pub async fn subscribe(
    session: &SessionData,
    author_id: Uuid,
    recipes_limit: Option<usize>,
    pool: &Pool<Postgres>,
) -> Result<Subscription, ApiError> {
    session.authenticate(ActionType::ManageOwnSubscriptions)?;
    get_author(author_id, pool).await?;
    reject_self(session, author_id)?;

    if is_subscribed(session.user_id, author_id, pool).await? {
        return Err(ApiError::Conflict(String::from(
            "Already subscribed to this author",
        )));
    }

    // unique_subscription settles concurrent duplicates
    sqlx::query("INSERT INTO follows (user_id, author_id) VALUES ($1, $2)")
        .bind(session.user_id)
        .bind(author_id)
        .execute(pool)
        .await?;

    info!("User {} subscribed to {}", session.user_id, author_id);

    let author = get_user_row(pool, author_id, Some(session.user_id)).await?;
    let mut subscriptions = attach_recipes(vec![author], recipes_limit, pool).await?;

    subscriptions
        .pop()
        .ok_or_else(|| ApiError::Internal(String::from("Subscription vanished")))
}

pub async fn unsubscribe(
    session: &SessionData,
    author_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<(), ApiError> {
    session.authenticate(ActionType::ManageOwnSubscriptions)?;
    get_author(author_id, pool).await?;
    reject_self(session, author_id)?;

    let result = sqlx::query("DELETE FROM follows WHERE user_id = $1 AND author_id = $2")
        .bind(session.user_id)
        .bind(author_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound(String::from(
            "You are not subscribed to this author",
        )));
    }

    info!("User {} unsubscribed from {}", session.user_id, author_id);
    Ok(())
}

/// Authors `user_id` follows, each with their recipes.
pub async fn fetch_subscriptions(
    user_id: Uuid,
    page: Page,
    recipes_limit: Option<usize>,
    pool: &Pool<Postgres>,
) -> Result<PageContext<Subscription>, ApiError> {
    let rows: Vec<UserRow> = sqlx::query_as(
        "
        SELECT u.email, u.id, u.username, u.first_name, u.last_name,
            TRUE AS is_subscribed, COUNT(*) OVER() AS count
        FROM follows f
        INNER JOIN users u ON u.id = f.author_id
        WHERE f.user_id = $1
        ORDER BY u.username
        LIMIT $2 OFFSET $3
    ",
    )
    .bind(user_id)
    .bind(page.size)
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    let total_count = rows.first().map(|u| u.count).unwrap_or(0);
    let subscriptions = attach_recipes(rows, recipes_limit, pool).await?;

    PageContext::from_rows(subscriptions, total_count, page)
}

/// Users following `user_id`.
pub async fn fetch_subscribers(
    user_id: Uuid,
    page: Page,
    pool: &Pool<Postgres>,
) -> Result<PageContext<UserRow>, ApiError> {
    let rows: Vec<UserRow> = sqlx::query_as(
        "
        SELECT u.email, u.id, u.username, u.first_name, u.last_name,
            EXISTS (SELECT 1 FROM follows b WHERE b.user_id = $1 AND b.author_id = u.id) AS is_subscribed,
            COUNT(*) OVER() AS count
        FROM follows f
        INNER JOIN users u ON u.id = f.user_id
        WHERE f.author_id = $1
        ORDER BY u.username
        LIMIT $2 OFFSET $3
    ",
    )
    .bind(user_id)
    .bind(page.size)
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    let total_count = rows.first().map(|u| u.count).unwrap_or(0);
    PageContext::from_rows(rows, total_count, page)
}

async fn attach_recipes(
    authors: Vec<UserRow>,
    recipes_limit: Option<usize>,
    pool: &Pool<Postgres>,
) -> Result<Vec<Subscription>, ApiError> {
    let author_ids: Vec<Uuid> = authors.iter().map(|a| a.id).collect();

    let rows: Vec<AuthorRecipeRow> = sqlx::query_as(
        "
        SELECT author_id, id, name, image, cooking_time
        FROM recipes
        WHERE author_id = ANY($1)
        ORDER BY pub_date DESC, id DESC
    ",
    )
    .bind(author_ids)
    .fetch_all(pool)
    .await?;

    let mut recipes: HashMap<Uuid, Vec<RecipeShort>> = HashMap::new();
    rows.into_iter().for_each(|row| {
        recipes.entry(row.author_id).or_default().push(row.into());
    });

    Ok(authors
        .into_iter()
        .map(|user| {
            let mut recipes = recipes.remove(&user.id).unwrap_or_default();
            let recipes_count = recipes.len() as i64;
            if let Some(limit) = recipes_limit {
                recipes.truncate(limit);
            }

            Subscription {
                user,
                recipes,
                recipes_count,
            }
        })
        .collect())
}
