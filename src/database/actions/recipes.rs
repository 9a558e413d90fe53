use std::collections::{HashMap, HashSet};

use log::info;
use sqlx::{PgConnection, Pool, Postgres, QueryBuilder};
use warp::http::Method;

use super::users::list_user_rows;
use crate::{
    error::ApiError,
    form::{RecipeFilter, RecipeForm, RecipeLimits, ValidRecipe},
    jwt::SessionData,
    pagination::{Page, PageContext},
    permissions::{is_author_or_read_only, ActionType},
    schema::{
        Recipe, RecipeDetail, RecipeIngredientRow, RecipeShort, RecipeTagRow, Tag, UserRow, Uuid,
    },
};

pub async fn get_recipe(id: Uuid, pool: &Pool<Postgres>) -> Result<Option<Recipe>, ApiError> {
    let row: Option<Recipe> = sqlx::query_as("SELECT * FROM recipes WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

pub async fn get_recipe_short(id: Uuid, pool: &Pool<Postgres>) -> Result<RecipeShort, ApiError> {
    let row: Option<RecipeShort> =
        sqlx::query_as("SELECT id, name, image, cooking_time FROM recipes WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;

    row.ok_or_else(recipe_not_found)
}

fn recipe_not_found() -> ApiError {
    ApiError::NotFound(String::from("No recipe exists with specified id"))
}

/// Loads a recipe for `method`, failing unless the session may perform it.
pub async fn get_recipe_mut(
    id: Uuid,
    session: &SessionData,
    method: &Method,
    pool: &Pool<Postgres>,
) -> Result<Recipe, ApiError> {
    let recipe = get_recipe(id, pool).await?.ok_or_else(recipe_not_found)?;
    session.authenticate(ActionType::ManageOwnRecipes)?;

    if !is_author_or_read_only(method, Some(session), recipe.author_id) {
        return Err(ApiError::PermissionDenied(String::from(
            "Only the author may change this recipe",
        )));
    }

    Ok(recipe)
}

async fn find_recipe(
    name: &str,
    exclude: Option<Uuid>,
    conn: &mut PgConnection,
) -> Result<Option<Uuid>, ApiError> {
    let row: Option<(i32,)> =
        sqlx::query_as("SELECT id FROM recipes WHERE name = $1 AND ($2::INT IS NULL OR id <> $2)")
            .bind(name)
            .bind(exclude)
            .fetch_optional(&mut *conn)
            .await?;

    Ok(row.map(|r| r.0))
}

async fn missing_ids(
    table: &'static str,
    ids: &[Uuid],
    conn: &mut PgConnection,
) -> Result<Option<Uuid>, ApiError> {
    let found: Vec<(i32,)> = sqlx::query_as(&format!("SELECT id FROM {table} WHERE id = ANY($1)"))
        .bind(ids.to_vec())
        .fetch_all(&mut *conn)
        .await?;

    let found: HashSet<Uuid> = found.into_iter().map(|r| r.0).collect();
    Ok(ids.iter().find(|id| !found.contains(id)).copied())
}

/// Replaces the tag and ingredient sets of a recipe. Runs inside the caller's transaction.
async fn set_recipe_links(
    recipe_id: Uuid,
    recipe: &ValidRecipe,
    conn: &mut PgConnection,
) -> Result<(), ApiError> {
    if let Some(id) = missing_ids("tags", &recipe.tags, conn).await? {
        return Err(ApiError::validation(
            "tags",
            format!("Tag with id {id} does not exist"),
        ));
    }

    let ingredient_ids: Vec<Uuid> = recipe.ingredients.iter().map(|i| i.id).collect();
    let amounts: Vec<i32> = recipe.ingredients.iter().map(|i| i.amount).collect();

    if let Some(id) = missing_ids("ingredients", &ingredient_ids, conn).await? {
        return Err(ApiError::validation(
            "ingredients",
            format!("Ingredient with id {id} does not exist"),
        ));
    }

    sqlx::query("DELETE FROM recipe_tags WHERE recipe_id = $1")
        .bind(recipe_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = $1")
        .bind(recipe_id)
        .execute(&mut *conn)
        .await?;

    sqlx::query(
        "
        INSERT INTO recipe_tags (recipe_id, tag_id)
        SELECT $1, UNNEST($2::INT[])
        ON CONFLICT DO NOTHING
    ",
    )
    .bind(recipe_id)
    .bind(recipe.tags.clone())
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        "
        INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount)
        SELECT $1, t.ingredient_id, t.amount
        FROM UNNEST($2::INT[], $3::INT[]) AS t(ingredient_id, amount)
    ",
    )
    .bind(recipe_id)
    .bind(ingredient_ids)
    .bind(amounts)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

fn duplicate_name() -> ApiError {
    ApiError::validation("name", "A recipe with this name already exists")
}

/// Creates the recipe with all of its tags and ingredients, or nothing at all.
pub async fn create_recipe(
    session: &SessionData,
    form: RecipeForm,
    limits: RecipeLimits,
    pool: &Pool<Postgres>,
) -> Result<RecipeDetail, ApiError> {
    session.authenticate(ActionType::CreateRecipes)?;
    let recipe = form.validate(limits, true)?;

    let mut tx = pool.begin().await?;

    if find_recipe(&recipe.name, None, &mut *tx).await?.is_some() {
        return Err(duplicate_name());
    }

    let id: (i32,) = sqlx::query_as(
        "
        INSERT INTO recipes (name, author_id, image, text, cooking_time)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
    ",
    )
    .bind(&recipe.name)
    .bind(session.user_id)
    .bind(recipe.image.clone().unwrap_or_default())
    .bind(&recipe.text)
    .bind(recipe.cooking_time)
    .fetch_one(&mut *tx)
    .await?;

    set_recipe_links(id.0, &recipe, &mut *tx).await?;
    tx.commit().await?;

    info!("Recipe {} ({}) created by {}", recipe.name, id.0, session.username);
    get_recipe_detail(id.0, Some(session.user_id), pool).await
}

/// Full replace: fields, tags and ingredients all take the submitted values.
/// The image is kept when none is submitted. Existence and authorship are
/// checked before the payload is validated.
pub async fn update_recipe(
    id: Uuid,
    session: &SessionData,
    form: RecipeForm,
    limits: RecipeLimits,
    pool: &Pool<Postgres>,
) -> Result<RecipeDetail, ApiError> {
    get_recipe_mut(id, session, &Method::PATCH, pool).await?;
    let recipe = form.validate(limits, false)?;

    let mut tx = pool.begin().await?;

    // holds off a concurrent delete until commit
    let locked: Option<(i32,)> = sqlx::query_as("SELECT id FROM recipes WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
    if locked.is_none() {
        return Err(recipe_not_found());
    }

    if find_recipe(&recipe.name, Some(id), &mut *tx).await?.is_some() {
        return Err(duplicate_name());
    }

    sqlx::query(
        "
        UPDATE recipes
        SET name = $1, text = $2, cooking_time = $3, image = COALESCE($4, image)
        WHERE id = $5
    ",
    )
    .bind(&recipe.name)
    .bind(&recipe.text)
    .bind(recipe.cooking_time)
    .bind(recipe.image.clone())
    .bind(id)
    .execute(&mut *tx)
    .await?;

    set_recipe_links(id, &recipe, &mut *tx).await?;
    tx.commit().await?;

    info!("Recipe {} updated by {}", id, session.username);
    get_recipe_detail(id, Some(session.user_id), pool).await
}

pub async fn delete_recipe(
    id: Uuid,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<(), ApiError> {
    get_recipe_mut(id, session, &Method::DELETE, pool).await?;

    sqlx::query("DELETE FROM recipes WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    info!("Recipe {} deleted by {}", id, session.username);
    Ok(())
}

pub async fn get_recipe_detail(
    id: Uuid,
    viewer: Option<Uuid>,
    pool: &Pool<Postgres>,
) -> Result<RecipeDetail, ApiError> {
    load_recipe_details(&[id], viewer, pool)
        .await?
        .pop()
        .ok_or_else(recipe_not_found)
}

fn push_engagement_filter(
    query: &mut QueryBuilder<'_, Postgres>,
    table: &'static str,
    flag: Option<bool>,
    viewer: Option<Uuid>,
) {
    match (flag, viewer) {
        (Some(true), Some(user_id)) => {
            query
                .push(format!(
                    " AND EXISTS (SELECT 1 FROM {table} e WHERE e.recipe_id = r.id AND e.user_id = "
                ))
                .push_bind(user_id)
                .push(")");
        }
        (Some(false), Some(user_id)) => {
            query
                .push(format!(
                    " AND NOT EXISTS (SELECT 1 FROM {table} e WHERE e.recipe_id = r.id AND e.user_id = "
                ))
                .push_bind(user_id)
                .push(")");
        }
        // an anonymous viewer has no favorites and no cart
        (Some(true), None) => {
            query.push(" AND FALSE");
        }
        (Some(false), None) | (None, _) => {}
    }
}

pub async fn fetch_recipes(
    filter: &RecipeFilter,
    page: Page,
    viewer: Option<Uuid>,
    pool: &Pool<Postgres>,
) -> Result<PageContext<RecipeDetail>, ApiError> {
    let mut query: QueryBuilder<Postgres> =
        QueryBuilder::new("SELECT r.id, COUNT(*) OVER() AS count FROM recipes r WHERE TRUE");

    if let Some(author) = filter.author {
        query.push(" AND r.author_id = ").push_bind(author);
    }
    if !filter.tags.is_empty() {
        query
            .push(
                " AND EXISTS (SELECT 1 FROM recipe_tags rt INNER JOIN tags t ON t.id = rt.tag_id WHERE rt.recipe_id = r.id AND t.slug = ANY(",
            )
            .push_bind(filter.tags.clone())
            .push("))");
    }
    push_engagement_filter(&mut query, "favorites", filter.is_favorited, viewer);
    push_engagement_filter(&mut query, "shopping_cart", filter.is_in_shopping_cart, viewer);

    query
        .push(" ORDER BY r.pub_date DESC, r.id DESC LIMIT ")
        .push_bind(page.size)
        .push(" OFFSET ")
        .push_bind(page.offset());

    let rows: Vec<(i32, i64)> = query.build_query_as::<(i32, i64)>().fetch_all(pool).await?;

    let total_count = rows.first().map(|r| r.1).unwrap_or(0);
    let ids: Vec<Uuid> = rows.into_iter().map(|r| r.0).collect();
    let details = load_recipe_details(&ids, viewer, pool).await?;

    PageContext::from_rows(details, total_count, page)
}

async fn engaged_recipe_ids(
    table: &'static str,
    user_id: Uuid,
    recipe_ids: &[Uuid],
    pool: &Pool<Postgres>,
) -> Result<HashSet<Uuid>, ApiError> {
    let rows: Vec<(i32,)> = sqlx::query_as(&format!(
        "SELECT recipe_id FROM {table} WHERE user_id = $1 AND recipe_id = ANY($2)"
    ))
    .bind(user_id)
    .bind(recipe_ids.to_vec())
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.0).collect())
}

/// Detail representations for `ids`, in the order given. Unknown ids are skipped.
pub async fn load_recipe_details(
    ids: &[Uuid],
    viewer: Option<Uuid>,
    pool: &Pool<Postgres>,
) -> Result<Vec<RecipeDetail>, ApiError> {
    if ids.is_empty() {
        return Ok(vec![]);
    }

    let recipes: Vec<Recipe> = sqlx::query_as("SELECT * FROM recipes WHERE id = ANY($1)")
        .bind(ids.to_vec())
        .fetch_all(pool)
        .await?;

    let tag_rows: Vec<RecipeTagRow> = sqlx::query_as(
        "
        SELECT rt.recipe_id, t.id, t.name, t.color, t.slug
        FROM recipe_tags rt
        INNER JOIN tags t ON t.id = rt.tag_id
        WHERE rt.recipe_id = ANY($1)
        ORDER BY t.name
    ",
    )
    .bind(ids.to_vec())
    .fetch_all(pool)
    .await?;

    let ingredient_rows: Vec<RecipeIngredientRow> = sqlx::query_as(
        "
        SELECT ri.recipe_id, i.id, i.name, i.measurement_unit, ri.amount
        FROM recipe_ingredients ri
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE ri.recipe_id = ANY($1)
        ORDER BY ri.id
    ",
    )
    .bind(ids.to_vec())
    .fetch_all(pool)
    .await?;

    let author_ids: Vec<Uuid> = recipes
        .iter()
        .filter_map(|r| r.author_id)
        .collect::<HashSet<Uuid>>()
        .into_iter()
        .collect();
    let authors: HashMap<Uuid, UserRow> = list_user_rows(pool, &author_ids, viewer)
        .await?
        .into_iter()
        .map(|u| (u.id, u))
        .collect();

    let (favorited, in_cart) = match viewer {
        Some(user_id) => (
            engaged_recipe_ids("favorites", user_id, ids, pool).await?,
            engaged_recipe_ids("shopping_cart", user_id, ids, pool).await?,
        ),
        None => (HashSet::new(), HashSet::new()),
    };

    let mut tags: HashMap<Uuid, Vec<Tag>> = HashMap::new();
    tag_rows.into_iter().for_each(|row| {
        tags.entry(row.recipe_id).or_default().push(row.into());
    });

    let mut ingredients: HashMap<Uuid, Vec<RecipeIngredientRow>> = HashMap::new();
    ingredient_rows.into_iter().for_each(|row| {
        ingredients.entry(row.recipe_id).or_default().push(row);
    });

    let mut recipes: HashMap<Uuid, Recipe> = recipes.into_iter().map(|r| (r.id, r)).collect();

    Ok(ids
        .iter()
        .filter_map(|id| recipes.remove(id))
        .map(|recipe| RecipeDetail {
            id: recipe.id,
            tags: tags.remove(&recipe.id).unwrap_or_default(),
            author: recipe.author_id.and_then(|a| authors.get(&a).cloned()),
            ingredients: ingredients.remove(&recipe.id).unwrap_or_default(),
            is_favorited: favorited.contains(&recipe.id),
            is_in_shopping_cart: in_cart.contains(&recipe.id),
            name: recipe.name,
            image: recipe.image,
            text: recipe.text,
            cooking_time: recipe.cooking_time,
            pub_date: recipe.pub_date,
        })
        .collect())
}
