use redis::aio::MultiplexedConnection;
use serde::Deserialize;
use sqlx::{Pool, Postgres};

use crate::{
    error::ServiceError,
    jwt::SessionData,
    permissions::ActionType,
    schema::{Id, Ingredient},
    CacheKeyType, CacheLifetime, RedisValue,
};

#[derive(Deserialize, Debug, Clone)]
pub struct IngredientForm {
    pub name: String,
    pub measurement_unit: String,
}

impl IngredientForm {
    fn validate(self) -> Result<IngredientForm, ServiceError> {
        let name = self.name.trim().to_owned();
        let measurement_unit = self.measurement_unit.trim().to_owned();

        if name.is_empty() {
            return Err(ServiceError::invalid("name", "\"\""));
        }
        if measurement_unit.is_empty() {
            return Err(ServiceError::invalid("measurement_unit", "\"\""));
        }

        Ok(IngredientForm {
            name,
            measurement_unit,
        })
    }
}

/// `(contains, prefix)` ILIKE patterns for a search term, with the LIKE
/// wildcards of the term escaped.
pub fn search_patterns(search: &str) -> (String, String) {
    let escaped = search
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");

    (format!("%{escaped}%"), format!("{escaped}%"))
}

pub async fn fetch_ingredients(pool: &Pool<Postgres>) -> Result<Vec<Ingredient>, ServiceError> {
    let list: Vec<Ingredient> = sqlx::query_as("SELECT * FROM ingredients ORDER BY name")
        .fetch_all(pool)
        .await?;

    Ok(list)
}

/// Lists ingredients whose name contains `search`, names starting with it
/// first. Only the unfiltered list is cached.
pub async fn list_ingredients(
    search: Option<String>,
    pool: &Pool<Postgres>,
    cache: &mut MultiplexedConnection,
) -> Result<Vec<Ingredient>, ServiceError> {
    let search = search.filter(|search| !search.trim().is_empty());

    let search = match search {
        Some(search) => search,
        None => {
            return RedisValue::get_or(CacheKeyType::Ingredients.new("all"), cache, || {
                fetch_ingredients(pool)
            })
            .await
        }
    };

    let (contains, prefix) = search_patterns(&search);
    let list: Vec<Ingredient> = sqlx::query_as(
        "
        SELECT * FROM ingredients
        WHERE name ILIKE $1
        ORDER BY (name ILIKE $2) DESC, name
    ",
    )
    .bind(contains)
    .bind(prefix)
    .fetch_all(pool)
    .await?;

    Ok(list)
}

pub async fn get_ingredient(
    id: Id,
    pool: &Pool<Postgres>,
) -> Result<Option<Ingredient>, ServiceError> {
    let ingredient: Option<Ingredient> = sqlx::query_as("SELECT * FROM ingredients WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(ingredient)
}

pub async fn fetch_ingredients_by_ids(
    ids: Vec<Id>,
    pool: &Pool<Postgres>,
) -> Result<Vec<Ingredient>, ServiceError> {
    if ids.is_empty() {
        return Ok(vec![]);
    }

    let list: Vec<Ingredient> = sqlx::query_as("SELECT * FROM ingredients WHERE id = ANY($1)")
        .bind(ids)
        .fetch_all(pool)
        .await?;

    Ok(list)
}

pub async fn create_ingredient(
    form: IngredientForm,
    session: Option<&SessionData>,
    pool: &Pool<Postgres>,
    cache: &mut MultiplexedConnection,
) -> Result<Ingredient, ServiceError> {
    let session = session.ok_or(ServiceError::Unauthorized)?;
    session.authenticate(ActionType::ManageReferenceData)?;

    let form = form.validate()?;
    let ingredient: Ingredient = sqlx::query_as(
        "INSERT INTO ingredients (name, measurement_unit) VALUES ($1, $2) RETURNING *",
    )
    .bind(form.name)
    .bind(form.measurement_unit)
    .fetch_one(pool)
    .await?;

    log::info!(
        "{} created ingredient {} ({})",
        session.username,
        ingredient.name,
        ingredient.measurement_unit
    );
    if let Err(e) = CacheLifetime::BindIngredientCache.rotate(cache).await {
        log::error!("> Failed to invalidate ingredient cache: {e}");
    }

    Ok(ingredient)
}
