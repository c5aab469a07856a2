use chrono::Local;
use sqlx::{Pool, Postgres};

use crate::{
    error::ServiceError,
    jwt::SessionData,
    permissions::ActionType,
    schema::CartLine,
    shopping_list::ShoppingList,
};

/// Merges the ingredient lines of every recipe in the actor's cart.
pub async fn build_shopping_list(
    session: Option<&SessionData>,
    pool: &Pool<Postgres>,
) -> Result<ShoppingList, ServiceError> {
    let session = session.ok_or(ServiceError::Unauthorized)?;
    session.authenticate(ActionType::ManageOwnLists)?;

    // Count and lines come from the same snapshot
    let mut tr = pool.begin().await?;
    sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
        .execute(&mut *tr)
        .await?;

    let (recipes_in_cart,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM recipe_carts WHERE user_id = $1")
            .bind(session.user_id)
            .fetch_one(&mut *tr)
            .await?;

    let lines: Vec<CartLine> = sqlx::query_as(
        "
        SELECT i.name AS name, i.measurement_unit AS measurement_unit, ri.amount AS amount
        FROM recipe_carts c
        INNER JOIN recipe_ingredients ri ON ri.recipe_id = c.recipe_id
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE c.user_id = $1
    ",
    )
    .bind(session.user_id)
    .fetch_all(&mut *tr)
    .await?;

    tr.commit().await?;

    log::trace!(
        "> Aggregating {} lines from {recipes_in_cart} recipes for {}",
        lines.len(),
        session.username
    );
    ShoppingList::aggregate(recipes_in_cart, lines, Local::now())
}
