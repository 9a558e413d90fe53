use log::info;
use sqlx::{Pool, Postgres};

use super::recipes::get_recipe_short;
use crate::{
    error::ApiError,
    jwt::SessionData,
    permissions::ActionType,
    schema::{RecipeShort, Uuid},
};

/// A per-user bookmark on a recipe. Favorites and the shopping cart share
/// the same shape and differ only in where they are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engagement {
    Favorite,
    ShoppingCart,
}

impl Engagement {
    fn table(self) -> &'static str {
        match self {
            Engagement::Favorite => "favorites",
            Engagement::ShoppingCart => "shopping_cart",
        }
    }

    fn action(self) -> ActionType {
        match self {
            Engagement::Favorite => ActionType::ManageOwnFavorites,
            Engagement::ShoppingCart => ActionType::ManageOwnShoppingCart,
        }
    }

    fn already_present(self) -> ApiError {
        ApiError::Conflict(String::from(match self {
            Engagement::Favorite => "Recipe is already in favorites",
            Engagement::ShoppingCart => "Recipe is already in the shopping cart",
        }))
    }

    fn not_present(self) -> ApiError {
        ApiError::NotFound(String::from(match self {
            Engagement::Favorite => "Recipe is not in favorites",
            Engagement::ShoppingCart => "Recipe is not in the shopping cart",
        }))
    }
}

pub async fn is_engaged(
    kind: Engagement,
    user_id: Uuid,
    recipe_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<bool, ApiError> {
    let row: Option<(i32,)> = sqlx::query_as(&format!(
        "SELECT id FROM {} WHERE user_id = $1 AND recipe_id = $2",
        kind.table()
    ))
    .bind(user_id)
    .bind(recipe_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.is_some())
}

pub async fn add(
    kind: Engagement,
    session: &SessionData,
    recipe_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<RecipeShort, ApiError> {
    session.authenticate(kind.action())?;
    let recipe = get_recipe_short(recipe_id, pool).await?;

    if is_engaged(kind, session.user_id, recipe_id, pool).await? {
        return Err(kind.already_present());
    }

    // a concurrent duplicate trips the unique constraint and maps to the same conflict
    sqlx::query(&format!(
        "INSERT INTO {} (user_id, recipe_id) VALUES ($1, $2)",
        kind.table()
    ))
    .bind(session.user_id)
    .bind(recipe_id)
    .execute(pool)
    .await?;

    info!("User {} added recipe {} to {}", session.user_id, recipe_id, kind.table());
    Ok(recipe)
}

pub async fn remove(
    kind: Engagement,
    session: &SessionData,
    recipe_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<(), ApiError> {
    session.authenticate(kind.action())?;
    get_recipe_short(recipe_id, pool).await?;

    let result = sqlx::query(&format!(
        "DELETE FROM {} WHERE user_id = $1 AND recipe_id = $2",
        kind.table()
    ))
    .bind(session.user_id)
    .bind(recipe_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(kind.not_present());
    }

    info!("User {} removed recipe {} from {}", session.user_id, recipe_id, kind.table());
    Ok(())
}
