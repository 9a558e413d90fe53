use log::info;
use sqlx::{Pool, Postgres};

use crate::{
    error::ApiError,
    form::TagForm,
    jwt::SessionData,
    permissions::ActionType,
    schema::{Tag, Uuid},
};

pub async fn list_tags(pool: &Pool<Postgres>) -> Result<Vec<Tag>, ApiError> {
    let list: Vec<Tag> = sqlx::query_as("SELECT id, name, color, slug FROM tags ORDER BY name")
        .fetch_all(pool)
        .await?;

    Ok(list)
}

pub async fn get_tag(id: Uuid, pool: &Pool<Postgres>) -> Result<Tag, ApiError> {
    let tag: Option<Tag> = sqlx::query_as("SELECT id, name, color, slug FROM tags WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    tag.ok_or_else(|| ApiError::NotFound(String::from("No tag exists with specified id")))
}

/// Name, color and slug uniqueness is left to the storage constraints.
pub async fn create_tag(
    session: &SessionData,
    form: TagForm,
    pool: &Pool<Postgres>,
) -> Result<Tag, ApiError> {
    session.authenticate(ActionType::ManageCatalog)?;
    let tag = form.validate()?;

    let created: Tag = sqlx::query_as(
        "INSERT INTO tags (name, color, slug) VALUES ($1, $2, $3) RETURNING id, name, color, slug",
    )
    .bind(tag.name)
    .bind(tag.color)
    .bind(tag.slug)
    .fetch_one(pool)
    .await?;

    info!("Tag {} created by {}", created.slug, session.username);
    Ok(created)
}
