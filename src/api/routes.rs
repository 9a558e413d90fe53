use std::{convert::Infallible, sync::Arc};

use log::info;
use serde::de::DeserializeOwned;
use warp::{filters::BoxedFilter, reject::Rejection, Filter, Reply};

use super::{handlers, rejection::handle_rejection};
use crate::{
    actions::engagement::Engagement,
    constants::MAX_BODY_SIZE,
    form::{IngredientQuery, SubscriptionQuery},
    middleware::{with_possible_session, with_session},
    pagination::PageQuery,
    schema::Uuid,
    state::State,
};

fn with_state(state: Arc<State>) -> impl Filter<Extract = (Arc<State>,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

fn json_body<T: DeserializeOwned + Send>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone {
    warp::body::content_length_limit(MAX_BODY_SIZE).and(warp::body::json())
}

// Paths are matched before methods so an unknown path is a 404 rather than a 405.

fn users(state: Arc<State>) -> BoxedFilter<(impl Reply,)> {
    let key = state.session_key.clone();

    let list = warp::path!("users")
        .and(warp::get())
        .and(warp::query::<PageQuery>())
        .and(with_possible_session(key.clone()))
        .and(with_state(state.clone()))
        .and_then(handlers::list_users);

    let register = warp::path!("users")
        .and(warp::post())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(handlers::register_user);

    let me = warp::path!("users" / "me")
        .and(warp::get())
        .and(with_session(key.clone()))
        .and(with_state(state.clone()))
        .and_then(handlers::get_me);

    let set_password = warp::path!("users" / "set_password")
        .and(warp::post())
        .and(with_session(key.clone()))
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(handlers::set_password);

    let subscriptions = warp::path!("users" / "subscriptions")
        .and(warp::get())
        .and(with_session(key.clone()))
        .and(warp::query::<SubscriptionQuery>())
        .and(with_state(state.clone()))
        .and_then(handlers::list_subscriptions);

    let subscribers = warp::path!("users" / "subscribers")
        .and(warp::get())
        .and(with_session(key.clone()))
        .and(warp::query::<PageQuery>())
        .and(with_state(state.clone()))
        .and_then(handlers::list_subscribers);

    let detail = warp::path!("users" / Uuid)
        .and(warp::get())
        .and(with_possible_session(key.clone()))
        .and(with_state(state.clone()))
        .and_then(handlers::get_user);

    let subscribe = warp::path!("users" / Uuid / "subscribe")
        .and(warp::post())
        .and(with_session(key.clone()))
        .and(warp::query::<SubscriptionQuery>())
        .and(with_state(state.clone()))
        .and_then(handlers::subscribe);

    let unsubscribe = warp::path!("users" / Uuid / "subscribe")
        .and(warp::delete())
        .and(with_session(key))
        .and(with_state(state))
        .and_then(handlers::unsubscribe);

    list.or(register)
        .or(me)
        .or(set_password)
        .or(subscriptions)
        .or(subscribers)
        .or(detail)
        .or(subscribe)
        .or(unsubscribe)
        .boxed()
}

fn tags(state: Arc<State>) -> BoxedFilter<(impl Reply,)> {
    let list = warp::path!("tags")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handlers::list_tags);

    let create = warp::path!("tags")
        .and(warp::post())
        .and(with_session(state.session_key.clone()))
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(handlers::create_tag);

    let detail = warp::path!("tags" / Uuid)
        .and(warp::get())
        .and(with_state(state))
        .and_then(handlers::get_tag);

    list.or(create).or(detail).boxed()
}

fn ingredients(state: Arc<State>) -> BoxedFilter<(impl Reply,)> {
    let list = warp::path!("ingredients")
        .and(warp::get())
        .and(warp::query::<IngredientQuery>())
        .and(with_state(state.clone()))
        .and_then(handlers::list_ingredients);

    let create = warp::path!("ingredients")
        .and(warp::post())
        .and(with_session(state.session_key.clone()))
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(handlers::create_ingredient);

    let detail = warp::path!("ingredients" / Uuid)
        .and(warp::get())
        .and(with_state(state))
        .and_then(handlers::get_ingredient);

    list.or(create).or(detail).boxed()
}

fn engagement(state: Arc<State>, kind: Engagement, segment: &'static str) -> BoxedFilter<(impl Reply,)> {
    let path = warp::any()
        .map(move || kind)
        .and(warp::path("recipes"))
        .and(warp::path::param::<Uuid>())
        .and(warp::path(segment))
        .and(warp::path::end());

    let add = path
        .clone()
        .and(warp::post())
        .and(with_session(state.session_key.clone()))
        .and(with_state(state.clone()))
        .and_then(handlers::add_engagement);

    let remove = path
        .and(warp::delete())
        .and(with_session(state.session_key.clone()))
        .and(with_state(state))
        .and_then(handlers::remove_engagement);

    add.or(remove).boxed()
}

fn recipes(state: Arc<State>) -> BoxedFilter<(impl Reply,)> {
    let key = state.session_key.clone();

    let list = warp::path!("recipes")
        .and(warp::get())
        .and(warp::query::<Vec<(String, String)>>())
        .and(with_possible_session(key.clone()))
        .and(with_state(state.clone()))
        .and_then(handlers::list_recipes);

    let create = warp::path!("recipes")
        .and(warp::post())
        .and(with_session(key.clone()))
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(handlers::create_recipe);

    let download = warp::path!("recipes" / "download_shopping_cart")
        .and(warp::get())
        .and(with_session(key.clone()))
        .and(with_state(state.clone()))
        .and_then(handlers::download_shopping_cart);

    let detail = warp::path!("recipes" / Uuid)
        .and(warp::get())
        .and(with_possible_session(key.clone()))
        .and(with_state(state.clone()))
        .and_then(handlers::get_recipe);

    let update = warp::path!("recipes" / Uuid)
        .and(warp::patch())
        .and(with_session(key.clone()))
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(handlers::update_recipe);

    let delete = warp::path!("recipes" / Uuid)
        .and(warp::delete())
        .and(with_session(key))
        .and(with_state(state.clone()))
        .and_then(handlers::delete_recipe);

    list.or(create)
        .or(download)
        .or(detail)
        .or(update)
        .or(delete)
        .or(engagement(state.clone(), Engagement::Favorite, "favorite"))
        .or(engagement(state, Engagement::ShoppingCart, "shopping_cart"))
        .boxed()
}

fn access_log(info: warp::log::Info) {
    info!(
        "{} {} {} {:?}",
        info.method(),
        info.path(),
        info.status().as_u16(),
        info.elapsed()
    );
}

/// The whole HTTP surface, mounted under `/api`.
pub fn routes(state: Arc<State>) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    warp::path("api")
        .and(
            users(state.clone())
                .or(tags(state.clone()))
                .or(ingredients(state.clone()))
                .or(recipes(state)),
        )
        .recover(handle_rejection)
        .with(warp::log::custom(access_log))
}
