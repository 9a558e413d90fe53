use log::info;
use sqlx::{Pool, Postgres};

use crate::{
    error::ApiError,
    form::IngredientForm,
    jwt::SessionData,
    permissions::ActionType,
    schema::{Ingredient, Uuid},
};

/// Escapes LIKE metacharacters so user input only ever matches literally.
pub fn like_prefix(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

pub async fn list_ingredients(
    name_prefix: Option<&str>,
    pool: &Pool<Postgres>,
) -> Result<Vec<Ingredient>, ApiError> {
    let rows: Vec<Ingredient> = match name_prefix.map(str::trim).filter(|p| !p.is_empty()) {
        Some(prefix) => {
            sqlx::query_as(
                "SELECT id, name, measurement_unit FROM ingredients WHERE name ILIKE $1 ORDER BY name, id",
            )
            .bind(like_prefix(prefix))
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as("SELECT id, name, measurement_unit FROM ingredients ORDER BY name, id")
                .fetch_all(pool)
                .await?
        }
    };

    Ok(rows)
}

pub async fn get_ingredient(id: Uuid, pool: &Pool<Postgres>) -> Result<Ingredient, ApiError> {
    let row: Option<Ingredient> =
        sqlx::query_as("SELECT id, name, measurement_unit FROM ingredients WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;

    row.ok_or_else(|| ApiError::NotFound(String::from("No ingredient exists with specified id")))
}

pub async fn create_ingredient(
    session: &SessionData,
    form: IngredientForm,
    pool: &Pool<Postgres>,
) -> Result<Ingredient, ApiError> {
    session.authenticate(ActionType::ManageCatalog)?;
    let ingredient = form.validate()?;

    let created: Ingredient = sqlx::query_as(
        "
        INSERT INTO ingredients (name, measurement_unit)
        VALUES ($1, $2)
        RETURNING id, name, measurement_unit
    ",
    )
    .bind(ingredient.name)
    .bind(ingredient.measurement_unit)
    .fetch_one(pool)
    .await?;

    info!("Ingredient {} ({}) created by {}", created.name, created.id, session.username);
    Ok(created)
}
