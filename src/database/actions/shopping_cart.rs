use log::debug;
use sqlx::{Pool, Postgres};

use crate::{
    error::ApiError,
    jwt::SessionData,
    permissions::ActionType,
    schema::Uuid,
    shopping_list::{ShoppingList, ShoppingListItem},
};

/// Sums the ingredients of every recipe in the cart of `user_id`, one line
/// per ingredient row. Two ingredients sharing a name but not an id stay apart.
pub async fn aggregate_shopping_list(
    user_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<ShoppingList, ApiError> {
    let items: Vec<ShoppingListItem> = sqlx::query_as(
        "
        SELECT i.name, SUM(ri.amount)::BIGINT AS total_amount, i.measurement_unit
        FROM recipe_ingredients ri
        INNER JOIN shopping_cart sc ON sc.recipe_id = ri.recipe_id
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE sc.user_id = $1
        GROUP BY i.id, i.name, i.measurement_unit
        ORDER BY i.name, i.id
    ",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    debug!("Shopping list of {} has {} lines", user_id, items.len());
    Ok(ShoppingList::new(items))
}

pub async fn download_shopping_list(
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<String, ApiError> {
    session.authenticate(ActionType::ManageOwnShoppingCart)?;
    let list = aggregate_shopping_list(session.user_id, pool).await?;
    if list.is_empty() {
        debug!("User {} downloaded an empty shopping list", session.user_id);
    }

    Ok(list.render())
}
