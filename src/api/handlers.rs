use std::sync::Arc;

use serde_json::json;
use warp::{http::StatusCode, reject::Rejection, Reply};

use crate::{
    actions::{
        engagement::{self, Engagement},
        follows, ingredients, recipes, shopping_cart, tags, users,
    },
    form::{
        IngredientForm, IngredientQuery, RecipeFilter, RecipeForm, SetPasswordForm,
        SubscriptionQuery, TagForm, UserForm,
    },
    jwt::SessionData,
    pagination::PageQuery,
    permissions::ActionType,
    schema::Uuid,
    shopping_list::attachment_disposition,
    state::State,
};

fn viewer(session: &Option<SessionData>) -> Option<Uuid> {
    session.as_ref().map(|s| s.user_id)
}

fn no_content() -> impl Reply {
    warp::reply::with_status(warp::reply(), StatusCode::NO_CONTENT)
}

// Users

pub async fn list_users(
    query: PageQuery,
    session: Option<SessionData>,
    state: Arc<State>,
) -> Result<impl Reply, Rejection> {
    let page = query.resolve(state.config.page_size);
    let users = users::fetch_users(&state.pool, page, viewer(&session)).await?;

    Ok(warp::reply::json(&users))
}

pub async fn register_user(form: UserForm, state: Arc<State>) -> Result<impl Reply, Rejection> {
    let user = form.validate()?;
    let created = users::register_user(&state.pool, user).await?;

    Ok(warp::reply::with_status(
        warp::reply::json(&created),
        StatusCode::CREATED,
    ))
}

pub async fn get_me(session: SessionData, state: Arc<State>) -> Result<impl Reply, Rejection> {
    session.authenticate(ActionType::ManageOwnAccount)?;
    let user = users::get_user_row(&state.pool, session.user_id, Some(session.user_id)).await?;

    Ok(warp::reply::json(&user))
}

pub async fn set_password(
    session: SessionData,
    form: SetPasswordForm,
    state: Arc<State>,
) -> Result<impl Reply, Rejection> {
    session.authenticate(ActionType::ManageOwnAccount)?;
    let change = form.validate()?;
    users::set_password(&state.pool, session.user_id, change).await?;

    Ok(no_content())
}

pub async fn get_user(
    id: Uuid,
    session: Option<SessionData>,
    state: Arc<State>,
) -> Result<impl Reply, Rejection> {
    let user = users::get_user_row(&state.pool, id, viewer(&session)).await?;

    Ok(warp::reply::json(&user))
}

pub async fn list_subscriptions(
    session: SessionData,
    query: SubscriptionQuery,
    state: Arc<State>,
) -> Result<impl Reply, Rejection> {
    session.authenticate(ActionType::ManageOwnSubscriptions)?;
    let page = query.page_query().resolve(state.config.page_size);
    let subscriptions =
        follows::fetch_subscriptions(session.user_id, page, query.recipes_limit, &state.pool).await?;

    Ok(warp::reply::json(&subscriptions))
}

pub async fn list_subscribers(
    session: SessionData,
    query: PageQuery,
    state: Arc<State>,
) -> Result<impl Reply, Rejection> {
    session.authenticate(ActionType::ManageOwnSubscriptions)?;
    let page = query.resolve(state.config.page_size);
    let subscribers = follows::fetch_subscribers(session.user_id, page, &state.pool).await?;

    Ok(warp::reply::json(&subscribers))
}

pub async fn subscribe(
    author_id: Uuid,
    session: SessionData,
    query: SubscriptionQuery,
    state: Arc<State>,
) -> Result<impl Reply, Rejection> {
    let subscription =
        follows::subscribe(&session, author_id, query.recipes_limit, &state.pool).await?;

    Ok(warp::reply::with_status(
        warp::reply::json(&subscription),
        StatusCode::CREATED,
    ))
}

pub async fn unsubscribe(
    author_id: Uuid,
    session: SessionData,
    state: Arc<State>,
) -> Result<impl Reply, Rejection> {
    follows::unsubscribe(&session, author_id, &state.pool).await?;

    Ok(warp::reply::json(&json!({
        "detail": "Unsubscribed",
        "author": author_id,
    })))
}

// Tags

pub async fn list_tags(state: Arc<State>) -> Result<impl Reply, Rejection> {
    let list = tags::list_tags(&state.pool).await?;
    Ok(warp::reply::json(&list))
}

pub async fn get_tag(id: Uuid, state: Arc<State>) -> Result<impl Reply, Rejection> {
    let tag = tags::get_tag(id, &state.pool).await?;
    Ok(warp::reply::json(&tag))
}

pub async fn create_tag(
    session: SessionData,
    form: TagForm,
    state: Arc<State>,
) -> Result<impl Reply, Rejection> {
    let tag = tags::create_tag(&session, form, &state.pool).await?;

    Ok(warp::reply::with_status(warp::reply::json(&tag), StatusCode::CREATED))
}

// Ingredients

pub async fn list_ingredients(
    query: IngredientQuery,
    state: Arc<State>,
) -> Result<impl Reply, Rejection> {
    let list = ingredients::list_ingredients(query.name.as_deref(), &state.pool).await?;
    Ok(warp::reply::json(&list))
}

pub async fn get_ingredient(id: Uuid, state: Arc<State>) -> Result<impl Reply, Rejection> {
    let ingredient = ingredients::get_ingredient(id, &state.pool).await?;
    Ok(warp::reply::json(&ingredient))
}

pub async fn create_ingredient(
    session: SessionData,
    form: IngredientForm,
    state: Arc<State>,
) -> Result<impl Reply, Rejection> {
    let ingredient = ingredients::create_ingredient(&session, form, &state.pool).await?;

    Ok(warp::reply::with_status(
        warp::reply::json(&ingredient),
        StatusCode::CREATED,
    ))
}

// Recipes

pub async fn list_recipes(
    pairs: Vec<(String, String)>,
    session: Option<SessionData>,
    state: Arc<State>,
) -> Result<impl Reply, Rejection> {
    let filter = RecipeFilter::from_pairs(pairs)?;
    let page = filter.page.resolve(state.config.page_size);
    let list = recipes::fetch_recipes(&filter, page, viewer(&session), &state.pool).await?;

    Ok(warp::reply::json(&list))
}

pub async fn get_recipe(
    id: Uuid,
    session: Option<SessionData>,
    state: Arc<State>,
) -> Result<impl Reply, Rejection> {
    let recipe = recipes::get_recipe_detail(id, viewer(&session), &state.pool).await?;
    Ok(warp::reply::json(&recipe))
}

pub async fn create_recipe(
    session: SessionData,
    form: RecipeForm,
    state: Arc<State>,
) -> Result<impl Reply, Rejection> {
    let recipe = recipes::create_recipe(&session, form, state.recipe_limits(), &state.pool).await?;

    Ok(warp::reply::with_status(
        warp::reply::json(&recipe),
        StatusCode::CREATED,
    ))
}

pub async fn update_recipe(
    id: Uuid,
    session: SessionData,
    form: RecipeForm,
    state: Arc<State>,
) -> Result<impl Reply, Rejection> {
    let recipe =
        recipes::update_recipe(id, &session, form, state.recipe_limits(), &state.pool).await?;

    Ok(warp::reply::json(&recipe))
}

pub async fn delete_recipe(
    id: Uuid,
    session: SessionData,
    state: Arc<State>,
) -> Result<impl Reply, Rejection> {
    recipes::delete_recipe(id, &session, &state.pool).await?;
    Ok(no_content())
}

pub async fn add_engagement(
    kind: Engagement,
    id: Uuid,
    session: SessionData,
    state: Arc<State>,
) -> Result<impl Reply, Rejection> {
    let recipe = engagement::add(kind, &session, id, &state.pool).await?;

    Ok(warp::reply::with_status(
        warp::reply::json(&recipe),
        StatusCode::CREATED,
    ))
}

pub async fn remove_engagement(
    kind: Engagement,
    id: Uuid,
    session: SessionData,
    state: Arc<State>,
) -> Result<impl Reply, Rejection> {
    engagement::remove(kind, &session, id, &state.pool).await?;
    Ok(no_content())
}

pub async fn download_shopping_cart(
    session: SessionData,
    state: Arc<State>,
) -> Result<impl Reply, Rejection> {
    let text = shopping_cart::download_shopping_list(&session, &state.pool).await?;

    Ok(warp::reply::with_header(
        text,
        "content-disposition",
        attachment_disposition(&state.config.shopping_list_file_name),
    ))
}
