//! HTTP surface of the service as warp filters.
//!
//! Every handler resolves the actor from the session cookie and hands it to
//! the action, which decides whether an anonymous actor is acceptable. Errors
//! leave as `potion::Error` rejections carrying the status of the failure.

use std::convert::Infallible;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use warp::{
    filters::BoxedFilter,
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
        StatusCode,
    },
    reject::Rejection,
    reply::Response,
    Filter, Reply,
};

use crate::{
    actions::{self, IngredientForm, RecipeList, RecipeRelation, SubscriptionRelation, TagForm},
    config::Config,
    error::ServiceError,
    form::{Form, FormData},
    jwt::SessionData,
    middleware::with_actor,
    pagination::PageQuery,
    schema::Id,
    shopping_list::ShoppingList,
    state::AppState,
    toggle::{toggle, Intent, ToggleOutcome},
};

const MAX_BODY_SIZE: u64 = 1024 * 64;

#[derive(Deserialize, Debug, Default)]
struct IngredientQuery {
    name: Option<String>,
}

fn reject(e: ServiceError) -> Rejection {
    e.into()
}

fn with_state(state: AppState) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// POST adds to a relation, DELETE removes from it.
fn with_intent() -> impl Filter<Extract = (Intent,), Error = Rejection> + Clone {
    warp::post()
        .map(|| Intent::Add)
        .or(warp::delete().map(|| Intent::Remove))
        .unify()
}

fn json_body<T: DeserializeOwned + Send>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone
{
    warp::body::content_length_limit(MAX_BODY_SIZE).and(warp::body::json())
}

/// Falls back to the configured page size when the request names none.
fn page(query: PageQuery, config: &Config) -> PageQuery {
    PageQuery {
        limit: query.limit.or(Some(config.page_size)),
        offset: query.offset,
    }
}

fn json<T: Serialize>(value: &T) -> Response {
    warp::reply::json(value).into_response()
}

fn created<T: Serialize>(value: &T) -> Response {
    warp::reply::with_status(warp::reply::json(value), StatusCode::CREATED).into_response()
}

fn toggle_reply<T: Serialize>(outcome: ToggleOutcome<T>) -> Response {
    match outcome {
        ToggleOutcome::Created(summary) => created(&summary),
        ToggleOutcome::Removed => StatusCode::NO_CONTENT.into_response(),
    }
}

/// Every route of the service.
pub fn api(state: AppState) -> BoxedFilter<(Response,)> {
    let key = state.session_key.clone();

    // Reference data

    let tags_list = warp::path!("tags")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(list_tags);

    let tags_create = warp::path!("tags")
        .and(warp::post())
        .and(json_body::<TagForm>())
        .and(with_actor(key.clone()))
        .and(with_state(state.clone()))
        .and_then(create_tag);

    let tags_get = warp::path!("tags" / Id)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(get_tag);

    let ingredients_list = warp::path!("ingredients")
        .and(warp::get())
        .and(warp::query::<IngredientQuery>())
        .and(with_state(state.clone()))
        .and_then(list_ingredients);

    let ingredients_create = warp::path!("ingredients")
        .and(warp::post())
        .and(json_body::<IngredientForm>())
        .and(with_actor(key.clone()))
        .and(with_state(state.clone()))
        .and_then(create_ingredient);

    let ingredients_get = warp::path!("ingredients" / Id)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(get_ingredient);

    // Recipes

    let recipes_list = warp::path!("recipes")
        .and(warp::get())
        .and(warp::query::<Vec<(String, String)>>())
        .and(warp::query::<PageQuery>())
        .and(with_actor(key.clone()))
        .and(with_state(state.clone()))
        .and_then(list_recipes);

    let recipes_create = warp::path!("recipes")
        .and(warp::post())
        .and(json_body::<FormData>())
        .and(with_actor(key.clone()))
        .and(with_state(state.clone()))
        .and_then(create_recipe);

    let shopping_cart_download = warp::path!("recipes" / "download_shopping_cart")
        .and(warp::get())
        .and(with_actor(key.clone()))
        .and(with_state(state.clone()))
        .and_then(download_shopping_cart);

    let recipes_get = warp::path!("recipes" / Id)
        .and(warp::get())
        .and(with_actor(key.clone()))
        .and(with_state(state.clone()))
        .and_then(get_recipe);

    let recipes_update = warp::path!("recipes" / Id)
        .and(warp::patch())
        .and(json_body::<FormData>())
        .and(with_actor(key.clone()))
        .and(with_state(state.clone()))
        .and_then(update_recipe);

    let recipes_delete = warp::path!("recipes" / Id)
        .and(warp::delete())
        .and(with_actor(key.clone()))
        .and(with_state(state.clone()))
        .and_then(delete_recipe);

    let favorite = warp::path!("recipes" / Id / "favorite")
        .and(with_intent())
        .and(with_actor(key.clone()))
        .and(with_state(state.clone()))
        .and_then(
            |id: Id, intent: Intent, actor: Option<SessionData>, state: AppState| {
                toggle_recipe(RecipeList::Favorites, id, intent, actor, state)
            },
        );

    let shopping_cart = warp::path!("recipes" / Id / "shopping_cart")
        .and(with_intent())
        .and(with_actor(key.clone()))
        .and(with_state(state.clone()))
        .and_then(
            |id: Id, intent: Intent, actor: Option<SessionData>, state: AppState| {
                toggle_recipe(RecipeList::ShoppingCart, id, intent, actor, state)
            },
        );

    // Users

    let subscriptions = warp::path!("users" / "subscriptions")
        .and(warp::get())
        .and(warp::query::<PageQuery>())
        .and(with_actor(key.clone()))
        .and(with_state(state.clone()))
        .and_then(list_subscriptions);

    let current_user = warp::path!("users" / "me")
        .and(warp::get())
        .and(with_actor(key.clone()))
        .and(with_state(state.clone()))
        .and_then(get_current_user);

    let user_profile = warp::path!("users" / Id)
        .and(warp::get())
        .and(with_actor(key.clone()))
        .and(with_state(state.clone()))
        .and_then(get_user_profile);

    let subscribe = warp::path!("users" / Id / "subscribe")
        .and(with_intent())
        .and(with_actor(key))
        .and(with_state(state))
        .and_then(toggle_subscription);

    tags_list
        .or(tags_create)
        .unify()
        .or(tags_get)
        .unify()
        .or(ingredients_list)
        .unify()
        .or(ingredients_create)
        .unify()
        .or(ingredients_get)
        .unify()
        .or(recipes_list)
        .unify()
        .or(recipes_create)
        .unify()
        .or(shopping_cart_download)
        .unify()
        .or(recipes_get)
        .unify()
        .or(recipes_update)
        .unify()
        .or(recipes_delete)
        .unify()
        .or(favorite)
        .unify()
        .or(shopping_cart)
        .unify()
        .or(subscriptions)
        .unify()
        .or(current_user)
        .unify()
        .or(user_profile)
        .unify()
        .or(subscribe)
        .unify()
        .boxed()
}

async fn list_tags(state: AppState) -> Result<Response, Rejection> {
    let mut cache = state.cache.clone();
    let tags = actions::list_tags(&state.pool, &mut cache)
        .await
        .map_err(reject)?;

    Ok(json(&tags))
}

async fn create_tag(
    form: TagForm,
    actor: Option<SessionData>,
    state: AppState,
) -> Result<Response, Rejection> {
    let mut cache = state.cache.clone();
    let tag = actions::create_tag(form, actor.as_ref(), &state.pool, &mut cache)
        .await
        .map_err(reject)?;

    Ok(created(&tag))
}

async fn get_tag(id: Id, state: AppState) -> Result<Response, Rejection> {
    let tag = actions::get_tag(id, &state.pool)
        .await
        .map_err(reject)?
        .ok_or_else(|| reject(ServiceError::NotFound(format!("Tag {id}"))))?;

    Ok(json(&tag))
}

async fn list_ingredients(query: IngredientQuery, state: AppState) -> Result<Response, Rejection> {
    let mut cache = state.cache.clone();
    let ingredients = actions::list_ingredients(query.name, &state.pool, &mut cache)
        .await
        .map_err(reject)?;

    Ok(json(&ingredients))
}

async fn create_ingredient(
    form: IngredientForm,
    actor: Option<SessionData>,
    state: AppState,
) -> Result<Response, Rejection> {
    let mut cache = state.cache.clone();
    let ingredient = actions::create_ingredient(form, actor.as_ref(), &state.pool, &mut cache)
        .await
        .map_err(reject)?;

    Ok(created(&ingredient))
}

async fn get_ingredient(id: Id, state: AppState) -> Result<Response, Rejection> {
    let ingredient = actions::get_ingredient(id, &state.pool)
        .await
        .map_err(reject)?
        .ok_or_else(|| reject(ServiceError::NotFound(format!("Ingredient {id}"))))?;

    Ok(json(&ingredient))
}

async fn list_recipes(
    params: Vec<(String, String)>,
    query: PageQuery,
    actor: Option<SessionData>,
    state: AppState,
) -> Result<Response, Rejection> {
    let page = actions::list_recipes(
        &params,
        page(query, &state.config),
        actor.as_ref(),
        &state.pool,
    )
    .await
    .map_err(reject)?;

    Ok(json(&page))
}

async fn create_recipe(
    data: FormData,
    actor: Option<SessionData>,
    state: AppState,
) -> Result<Response, Rejection> {
    let recipe = actions::create_recipe(&Form::from_data(data), actor.as_ref(), &state.pool)
        .await
        .map_err(reject)?;

    Ok(created(&recipe))
}

async fn get_recipe(
    id: Id,
    actor: Option<SessionData>,
    state: AppState,
) -> Result<Response, Rejection> {
    let recipe = actions::get_recipe_detail(id, actor.as_ref(), &state.pool)
        .await
        .map_err(reject)?;

    Ok(json(&recipe))
}

async fn update_recipe(
    id: Id,
    data: FormData,
    actor: Option<SessionData>,
    state: AppState,
) -> Result<Response, Rejection> {
    let recipe = actions::update_recipe(id, &Form::from_data(data), actor.as_ref(), &state.pool)
        .await
        .map_err(reject)?;

    Ok(json(&recipe))
}

async fn delete_recipe(
    id: Id,
    actor: Option<SessionData>,
    state: AppState,
) -> Result<Response, Rejection> {
    actions::delete_recipe(id, actor.as_ref(), &state.pool)
        .await
        .map_err(reject)?;

    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn toggle_recipe(
    list: RecipeList,
    id: Id,
    intent: Intent,
    actor: Option<SessionData>,
    state: AppState,
) -> Result<Response, Rejection> {
    let relation = RecipeRelation::new(list, &state.pool);
    let outcome = toggle(&relation, actor.as_ref(), id, intent)
        .await
        .map_err(reject)?;

    Ok(toggle_reply(outcome))
}

async fn download_shopping_cart(
    actor: Option<SessionData>,
    state: AppState,
) -> Result<Response, Rejection> {
    let list = actions::build_shopping_list(actor.as_ref(), &state.pool)
        .await
        .map_err(reject)?;
    let username = actor.map(|session| session.username).unwrap_or_default();

    let reply = warp::reply::with_header(list.render(), CONTENT_TYPE, "text/plain; charset=utf-8");
    let reply = warp::reply::with_header(
        reply,
        CONTENT_DISPOSITION,
        format!("attachment; filename={}", ShoppingList::file_name(&username)),
    );

    Ok(reply.into_response())
}

async fn list_subscriptions(
    query: PageQuery,
    actor: Option<SessionData>,
    state: AppState,
) -> Result<Response, Rejection> {
    let page = actions::list_subscriptions(actor.as_ref(), page(query, &state.config), &state.pool)
        .await
        .map_err(reject)?;

    Ok(json(&page))
}

async fn get_current_user(actor: Option<SessionData>, state: AppState) -> Result<Response, Rejection> {
    let user = actions::get_current_user(actor.as_ref(), &state.pool)
        .await
        .map_err(reject)?;

    Ok(json(&user))
}

async fn get_user_profile(
    id: Id,
    actor: Option<SessionData>,
    state: AppState,
) -> Result<Response, Rejection> {
    let user = actions::get_user_profile(id, actor.as_ref(), &state.pool)
        .await
        .map_err(reject)?;

    Ok(json(&user))
}

async fn toggle_subscription(
    id: Id,
    intent: Intent,
    actor: Option<SessionData>,
    state: AppState,
) -> Result<Response, Rejection> {
    let relation = SubscriptionRelation::new(&state.pool);
    let outcome = toggle(&relation, actor.as_ref(), id, intent)
        .await
        .map_err(reject)?;

    Ok(toggle_reply(outcome))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(page_size: i64) -> Config {
        Config {
            database_url: String::new(),
            redis_url: String::new(),
            jwt_secret: String::from("secret"),
            page_size,
            max_connections: 1,
        }
    }

    #[test]
    fn page_size_falls_back_to_config() {
        let query = page(PageQuery::default(), &config(9));
        assert_eq!(query.limit(), 9);

        let query = page(
            PageQuery {
                limit: Some(3),
                offset: Some(6),
            },
            &config(9),
        );
        assert_eq!((query.limit(), query.offset()), (3, 6));
    }

    #[test]
    fn removal_has_no_body() {
        let response = toggle_reply::<String>(ToggleOutcome::Removed);
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[test]
    fn addition_is_created() {
        let response = toggle_reply(ToggleOutcome::Created(String::from("Pancakes")));
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn intent_follows_method() {
        let filter = with_intent();

        let add = warp::test::request().method("POST").filter(&filter).await;
        assert_eq!(add.ok(), Some(Intent::Add));

        let remove = warp::test::request().method("DELETE").filter(&filter).await;
        assert_eq!(remove.ok(), Some(Intent::Remove));

        assert!(warp::test::request()
            .method("GET")
            .filter(&filter)
            .await
            .is_err());
    }
}
