use std::collections::HashSet;

use sqlx::{Pool, Postgres};

use crate::{
    error::ServiceError,
    schema::{AuthorSummary, Id, Recipe, RecipeSummary, User},
    toggle::Relation,
};

use super::{author_summary, get_recipe, get_user_by_id};

/// The two per-user recipe sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeList {
    Favorites,
    ShoppingCart,
}

impl RecipeList {
    pub fn table(&self) -> &'static str {
        match self {
            RecipeList::Favorites => "recipe_favorites",
            RecipeList::ShoppingCart => "recipe_carts",
        }
    }
}

pub struct RecipeRelation<'a> {
    pub list: RecipeList,
    pub pool: &'a Pool<Postgres>,
}

impl<'a> RecipeRelation<'a> {
    pub fn new(list: RecipeList, pool: &'a Pool<Postgres>) -> Self {
        Self { list, pool }
    }

    /// Which of `recipe_ids` are in the actor's list, in one query.
    pub async fn members_among(
        &self,
        actor: Id,
        recipe_ids: &[Id],
    ) -> Result<HashSet<Id>, ServiceError> {
        let rows: Vec<(Id,)> = sqlx::query_as(&format!(
            "SELECT recipe_id FROM {} WHERE user_id = $1 AND recipe_id = ANY($2)",
            self.list.table()
        ))
        .bind(actor)
        .bind(recipe_ids)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

impl Relation for RecipeRelation<'_> {
    type Target = Recipe;
    type Summary = RecipeSummary;

    fn name(&self) -> &'static str {
        match self.list {
            RecipeList::Favorites => "favorites",
            RecipeList::ShoppingCart => "shopping cart",
        }
    }

    async fn resolve(&self, target_id: Id) -> Result<Option<Recipe>, ServiceError> {
        get_recipe(target_id, self.pool).await
    }

    async fn contains(&self, actor: Id, target_id: Id) -> Result<bool, ServiceError> {
        let row: Option<(i32,)> = sqlx::query_as(&format!(
            "SELECT 1 FROM {} WHERE user_id = $1 AND recipe_id = $2",
            self.list.table()
        ))
        .bind(actor)
        .bind(target_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.is_some())
    }

    async fn add(&self, actor: Id, target_id: Id) -> Result<bool, ServiceError> {
        let query = sqlx::query(&format!(
            "INSERT INTO {} (user_id, recipe_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            self.list.table()
        ))
        .bind(actor)
        .bind(target_id)
        .execute(self.pool)
        .await?;

        Ok(query.rows_affected() > 0)
    }

    async fn remove(&self, actor: Id, target_id: Id) -> Result<bool, ServiceError> {
        let query = sqlx::query(&format!(
            "DELETE FROM {} WHERE user_id = $1 AND recipe_id = $2",
            self.list.table()
        ))
        .bind(actor)
        .bind(target_id)
        .execute(self.pool)
        .await?;

        Ok(query.rows_affected() > 0)
    }

    async fn summarize(&self, _actor: Id, target: Recipe) -> Result<RecipeSummary, ServiceError> {
        Ok(RecipeSummary::from(&target))
    }
}

/// Directed follower -> followee edges.
pub struct SubscriptionRelation<'a> {
    pub pool: &'a Pool<Postgres>,
}

impl<'a> SubscriptionRelation<'a> {
    pub fn new(pool: &'a Pool<Postgres>) -> Self {
        Self { pool }
    }
}

impl Relation for SubscriptionRelation<'_> {
    type Target = User;
    type Summary = AuthorSummary;

    fn name(&self) -> &'static str {
        "subscriptions"
    }

    async fn resolve(&self, target_id: Id) -> Result<Option<User>, ServiceError> {
        get_user_by_id(target_id, self.pool).await
    }

    fn admit(&self, actor: Id, target: &User) -> Result<(), ServiceError> {
        if actor == target.id {
            return Err(ServiceError::conflict("Cannot subscribe to yourself"));
        }
        Ok(())
    }

    async fn contains(&self, actor: Id, target_id: Id) -> Result<bool, ServiceError> {
        is_subscribed(actor, target_id, self.pool).await
    }

    async fn add(&self, actor: Id, target_id: Id) -> Result<bool, ServiceError> {
        let query = sqlx::query(
            "
            INSERT INTO user_subscriptions (follower_id, followee_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
        ",
        )
        .bind(actor)
        .bind(target_id)
        .execute(self.pool)
        .await?;

        Ok(query.rows_affected() > 0)
    }

    async fn remove(&self, actor: Id, target_id: Id) -> Result<bool, ServiceError> {
        let query = sqlx::query(
            "DELETE FROM user_subscriptions WHERE follower_id = $1 AND followee_id = $2",
        )
        .bind(actor)
        .bind(target_id)
        .execute(self.pool)
        .await?;

        Ok(query.rows_affected() > 0)
    }

    async fn summarize(&self, _actor: Id, target: User) -> Result<AuthorSummary, ServiceError> {
        author_summary(target, true, self.pool).await
    }
}

pub async fn is_subscribed(
    follower: Id,
    followee: Id,
    pool: &Pool<Postgres>,
) -> Result<bool, ServiceError> {
    let row: Option<(i32,)> = sqlx::query_as(
        "SELECT 1 FROM user_subscriptions WHERE follower_id = $1 AND followee_id = $2",
    )
    .bind(follower)
    .bind(followee)
    .fetch_optional(pool)
    .await?;

    Ok(row.is_some())
}

/// The subset of `followees` that `follower` is subscribed to.
pub async fn subscribed_among(
    follower: Id,
    followees: &[Id],
    pool: &Pool<Postgres>,
) -> Result<HashSet<Id>, ServiceError> {
    let rows: Vec<(Id,)> = sqlx::query_as(
        "
        SELECT followee_id
        FROM user_subscriptions
        WHERE follower_id = $1 AND followee_id = ANY($2)
    ",
    )
    .bind(follower)
    .bind(followees)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}
