//! Storage-backed behaviour. Needs a disposable PostgreSQL database in
//! `DATABASE_URL`; run with `cargo test -- --ignored`.

use std::{
    collections::HashSet,
    env,
    sync::atomic::{AtomicU32, Ordering},
};

use chrono::Utc;
use foodgram::{
    actions::{
        engagement::{self, Engagement},
        follows, recipes,
        shopping_cart::aggregate_shopping_list,
    },
    error::ApiError,
    form::{IngredientAmountForm, RecipeFilter, RecipeForm, RecipeLimits},
    jwt::SessionData,
    pagination::Page,
    schema::{UserRole, Uuid},
    Bounds,
};
use sqlx::{postgres::PgPoolOptions, Pool, Postgres};

async fn pool() -> Pool<Postgres> {
    let url = env::var("DATABASE_URL").expect("DATABASE_URL is not set");
    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(&url)
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

static COUNTER: AtomicU32 = AtomicU32::new(0);

fn unique(prefix: &str) -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_{}_{n}", Utc::now().timestamp_micros())
}

fn limits() -> RecipeLimits {
    let bounds = Bounds { min: 1, max: 32000 };
    RecipeLimits {
        amount: bounds,
        cooking_time: bounds,
    }
}

async fn user(pool: &Pool<Postgres>) -> SessionData {
    let username = unique("cook");
    let (id,): (i32,) = sqlx::query_as(
        "
        INSERT INTO users (email, username, first_name, last_name, password)
        VALUES ($1, $2, 'Ann', 'Lee', 'unused')
        RETURNING id
    ",
    )
    .bind(format!("{username}@example.com"))
    .bind(&username)
    .fetch_one(pool)
    .await
    .unwrap();

    SessionData {
        user_id: id,
        username,
        role: UserRole::User,
    }
}

async fn tag(pool: &Pool<Postgres>) -> Uuid {
    let slug = unique("tag");
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let seed = (Utc::now().timestamp_micros() as u32) ^ n.wrapping_mul(2_654_435_761);
    let color = format!("#{:06X}", seed & 0xFF_FFFF);
    let (id,): (i32,) =
        sqlx::query_as("INSERT INTO tags (name, color, slug) VALUES ($1, $2, $1) RETURNING id")
            .bind(&slug)
            .bind(color)
            .fetch_one(pool)
            .await
            .unwrap();
    id
}

async fn ingredient(pool: &Pool<Postgres>, name: &str, unit: &str) -> Uuid {
    let (id,): (i32,) = sqlx::query_as(
        "INSERT INTO ingredients (name, measurement_unit) VALUES ($1, $2) RETURNING id",
    )
    .bind(name)
    .bind(unit)
    .fetch_one(pool)
    .await
    .unwrap();
    id
}

fn form(name: &str, tags: Vec<Uuid>, ingredients: &[(Uuid, i32)]) -> RecipeForm {
    RecipeForm {
        name: Some(name.to_string()),
        text: Some(String::from("Mix everything and bake")),
        cooking_time: Some(30),
        image: Some(String::from("data:image/png;base64,iVBORw0KGgo=")),
        tags,
        ingredients: ingredients
            .iter()
            .map(|&(id, amount)| IngredientAmountForm { id, amount })
            .collect(),
    }
}

async fn stored_ingredients(pool: &Pool<Postgres>, recipe_id: Uuid) -> HashSet<(Uuid, i32)> {
    recipes::get_recipe_detail(recipe_id, None, pool)
        .await
        .unwrap()
        .ingredients
        .into_iter()
        .map(|i| (i.id, i.amount))
        .collect()
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database in DATABASE_URL"]
async fn created_recipe_keeps_the_submitted_ingredients() {
    let pool = pool().await;
    let author = user(&pool).await;
    let tag = tag(&pool).await;
    let flour = ingredient(&pool, "Flour", "g").await;
    let milk = ingredient(&pool, "Milk", "ml").await;

    let recipe = recipes::create_recipe(
        &author,
        form(&unique("pancakes"), vec![tag], &[(flour, 200), (milk, 300)]),
        limits(),
        &pool,
    )
    .await
    .unwrap();

    assert_eq!(
        stored_ingredients(&pool, recipe.id).await,
        HashSet::from([(flour, 200), (milk, 300)])
    );
    assert_eq!(recipe.author.map(|a| a.id), Some(author.user_id));
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database in DATABASE_URL"]
async fn rejected_recipe_leaves_no_rows() {
    let pool = pool().await;
    let author = user(&pool).await;
    let tag = tag(&pool).await;
    let flour = ingredient(&pool, "Flour", "g").await;

    let repeated = unique("repeated");
    let result = recipes::create_recipe(
        &author,
        form(&repeated, vec![tag], &[(flour, 100), (flour, 200)]),
        limits(),
        &pool,
    )
    .await;
    assert!(matches!(result, Err(ApiError::Validation { ref field, .. }) if field == "ingredients"));

    // an unknown ingredient is only noticed inside the transaction
    let dangling = unique("dangling");
    let result = recipes::create_recipe(
        &author,
        form(&dangling, vec![tag], &[(flour, 100), (i32::MAX, 1)]),
        limits(),
        &pool,
    )
    .await;
    assert!(matches!(result, Err(ApiError::Validation { ref field, .. }) if field == "ingredients"));

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM recipes WHERE name = ANY($1)")
        .bind(vec![repeated, dangling])
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database in DATABASE_URL"]
async fn second_favorite_is_a_conflict() {
    let pool = pool().await;
    let author = user(&pool).await;
    let fan = user(&pool).await;
    let tag = tag(&pool).await;
    let flour = ingredient(&pool, "Flour", "g").await;
    let recipe = recipes::create_recipe(
        &author,
        form(&unique("bread"), vec![tag], &[(flour, 500)]),
        limits(),
        &pool,
    )
    .await
    .unwrap();

    engagement::add(Engagement::Favorite, &fan, recipe.id, &pool).await.unwrap();
    let second = engagement::add(Engagement::Favorite, &fan, recipe.id, &pool).await;
    assert_eq!(
        second.unwrap_err(),
        ApiError::Conflict(String::from("Recipe is already in favorites"))
    );

    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM favorites WHERE user_id = $1 AND recipe_id = $2")
            .bind(fan.user_id)
            .bind(recipe.id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database in DATABASE_URL"]
async fn removing_a_missing_entry_is_not_found() {
    let pool = pool().await;
    let author = user(&pool).await;
    let tag = tag(&pool).await;
    let flour = ingredient(&pool, "Flour", "g").await;
    let recipe = recipes::create_recipe(
        &author,
        form(&unique("buns"), vec![tag], &[(flour, 250)]),
        limits(),
        &pool,
    )
    .await
    .unwrap();

    for kind in [Engagement::Favorite, Engagement::ShoppingCart] {
        let result = engagement::remove(kind, &author, recipe.id, &pool).await;
        assert!(matches!(result, Err(ApiError::NotFound(_))), "{kind:?}");
    }

    let result = engagement::remove(Engagement::Favorite, &author, i32::MAX, &pool).await;
    assert!(matches!(result, Err(ApiError::NotFound(_))));
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database in DATABASE_URL"]
async fn following_yourself_is_refused() {
    let pool = pool().await;
    let cook = user(&pool).await;
    let author = user(&pool).await;

    let result = follows::subscribe(&cook, cook.user_id, None, &pool).await;
    assert!(matches!(result, Err(ApiError::Validation { ref field, .. }) if field == "author"));

    let subscription = follows::subscribe(&cook, author.user_id, None, &pool).await.unwrap();
    assert!(subscription.user.is_subscribed);
    assert_eq!(subscription.recipes_count, 0);

    let again = follows::subscribe(&cook, author.user_id, None, &pool).await;
    assert!(matches!(again, Err(ApiError::Conflict(_))));

    follows::unsubscribe(&cook, author.user_id, &pool).await.unwrap();
    let gone = follows::unsubscribe(&cook, author.user_id, &pool).await;
    assert!(matches!(gone, Err(ApiError::NotFound(_))));
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database in DATABASE_URL"]
async fn cart_amounts_are_summed_per_ingredient() {
    let pool = pool().await;
    let cook = user(&pool).await;
    let tag = tag(&pool).await;
    let flour = ingredient(&pool, "Flour", "g").await;

    assert_eq!(
        aggregate_shopping_list(cook.user_id, &pool).await.unwrap().render(),
        "Shopping list:\n"
    );

    for (name, amount) in [("pie", 200), ("cake", 300)] {
        let recipe = recipes::create_recipe(
            &cook,
            form(&unique(name), vec![tag], &[(flour, amount)]),
            limits(),
            &pool,
        )
        .await
        .unwrap();
        engagement::add(Engagement::ShoppingCart, &cook, recipe.id, &pool)
            .await
            .unwrap();
    }

    let list = aggregate_shopping_list(cook.user_id, &pool).await.unwrap();
    assert_eq!(list.items().len(), 1);
    assert_eq!(list.render(), "Shopping list:\nFlour - 500 g.");
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database in DATABASE_URL"]
async fn same_name_ingredients_stay_apart_by_id() {
    let pool = pool().await;
    let cook = user(&pool).await;
    let tag = tag(&pool).await;
    let grams = ingredient(&pool, "Flour", "g").await;
    let kilos = ingredient(&pool, "Flour", "kg").await;

    for (name, ingredients) in [
        ("loaf", vec![(grams, 200), (kilos, 1)]),
        ("rolls", vec![(grams, 300)]),
    ] {
        let recipe = recipes::create_recipe(
            &cook,
            form(&unique(name), vec![tag], &ingredients),
            limits(),
            &pool,
        )
        .await
        .unwrap();
        engagement::add(Engagement::ShoppingCart, &cook, recipe.id, &pool)
            .await
            .unwrap();
    }

    let list = aggregate_shopping_list(cook.user_id, &pool).await.unwrap();
    assert_eq!(list.items().len(), 2);
    assert_eq!(list.render(), "Shopping list:\nFlour - 500 g.\nFlour - 1 kg.");
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database in DATABASE_URL"]
async fn concurrent_favorites_store_one_row() {
    let pool = pool().await;
    let author = user(&pool).await;
    let fan = user(&pool).await;
    let tag = tag(&pool).await;
    let flour = ingredient(&pool, "Flour", "g").await;
    let recipe = recipes::create_recipe(
        &author,
        form(&unique("brioche"), vec![tag], &[(flour, 400)]),
        limits(),
        &pool,
    )
    .await
    .unwrap();
    let recipe_id = recipe.id;

    let attempts: Vec<_> = (0..8)
        .map(|_| {
            let pool = pool.clone();
            let fan = fan.clone();
            tokio::spawn(async move {
                engagement::add(Engagement::Favorite, &fan, recipe_id, &pool).await
            })
        })
        .collect();

    let mut added = 0;
    for attempt in attempts {
        match attempt.await.unwrap() {
            Ok(_) => added += 1,
            Err(e) => assert_eq!(
                e,
                ApiError::Conflict(String::from("Recipe is already in favorites"))
            ),
        }
    }
    assert_eq!(added, 1);

    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM favorites WHERE user_id = $1 AND recipe_id = $2")
            .bind(fan.user_id)
            .bind(recipe.id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database in DATABASE_URL"]
async fn page_past_the_last_is_not_found() {
    let pool = pool().await;
    let author = user(&pool).await;
    let tag = tag(&pool).await;
    let flour = ingredient(&pool, "Flour", "g").await;
    recipes::create_recipe(
        &author,
        form(&unique("focaccia"), vec![tag], &[(flour, 500)]),
        limits(),
        &pool,
    )
    .await
    .unwrap();

    let filter = RecipeFilter {
        author: Some(author.user_id),
        ..RecipeFilter::default()
    };

    let first = recipes::fetch_recipes(&filter, Page { number: 1, size: 1 }, None, &pool)
        .await
        .unwrap();
    assert_eq!(first.count, 1);
    assert_eq!(first.next, None);

    let beyond = recipes::fetch_recipes(&filter, Page { number: 2, size: 1 }, None, &pool).await;
    assert_eq!(
        beyond.unwrap_err(),
        ApiError::NotFound(String::from("Invalid page"))
    );
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database in DATABASE_URL"]
async fn update_racing_a_delete_is_not_found_or_applied() {
    let pool = pool().await;
    let author = user(&pool).await;
    let tag = tag(&pool).await;
    let flour = ingredient(&pool, "Flour", "g").await;

    for _ in 0..5 {
        let recipe = recipes::create_recipe(
            &author,
            form(&unique("tart"), vec![tag], &[(flour, 100)]),
            limits(),
            &pool,
        )
        .await
        .unwrap();
        let recipe_id = recipe.id;

        let update = {
            let (pool, author) = (pool.clone(), author.clone());
            let changed = form(&unique("tart_v2"), vec![tag], &[(flour, 150)]);
            tokio::spawn(async move {
                recipes::update_recipe(recipe_id, &author, changed, limits(), &pool).await
            })
        };
        let delete = {
            let (pool, author) = (pool.clone(), author.clone());
            tokio::spawn(async move { recipes::delete_recipe(recipe_id, &author, &pool).await })
        };

        delete.await.unwrap().unwrap();
        match update.await.unwrap() {
            Ok(_) | Err(ApiError::NotFound(_)) => {}
            Err(e) => panic!("unexpected update error: {e:?}"),
        }
    }
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database in DATABASE_URL"]
async fn only_the_author_may_change_a_recipe() {
    let pool = pool().await;
    let author = user(&pool).await;
    let stranger = user(&pool).await;
    let tag = tag(&pool).await;
    let flour = ingredient(&pool, "Flour", "g").await;
    let recipe = recipes::create_recipe(
        &author,
        form(&unique("scones"), vec![tag], &[(flour, 300)]),
        limits(),
        &pool,
    )
    .await
    .unwrap();

    let update = recipes::update_recipe(
        recipe.id,
        &stranger,
        form(&unique("stolen"), vec![tag], &[(flour, 1)]),
        limits(),
        &pool,
    )
    .await;
    assert!(matches!(update, Err(ApiError::PermissionDenied(_))));

    let delete = recipes::delete_recipe(recipe.id, &stranger, &pool).await;
    assert!(matches!(delete, Err(ApiError::PermissionDenied(_))));

    recipes::delete_recipe(recipe.id, &author, &pool).await.unwrap();
    let gone = recipes::get_recipe_detail(recipe.id, None, &pool).await;
    assert!(matches!(gone, Err(ApiError::NotFound(_))));
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database in DATABASE_URL"]
async fn update_replaces_the_ingredient_set() {
    let pool = pool().await;
    let author = user(&pool).await;
    let tag = tag(&pool).await;
    let a = ingredient(&pool, "Apples", "pcs").await;
    let b = ingredient(&pool, "Butter", "g").await;
    let c = ingredient(&pool, "Cinnamon", "tsp").await;

    let name = unique("crumble");
    let recipe = recipes::create_recipe(&author, form(&name, vec![tag], &[(a, 1), (b, 2)]), limits(), &pool)
        .await
        .unwrap();

    let mut changed = form(&name, vec![tag], &[(c, 3)]);
    changed.image = None;
    let updated = recipes::update_recipe(recipe.id, &author, changed, limits(), &pool)
        .await
        .unwrap();

    assert_eq!(stored_ingredients(&pool, recipe.id).await, HashSet::from([(c, 3)]));
    assert_eq!(updated.image, recipe.image);
}
