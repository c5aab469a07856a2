use std::collections::{HashMap, HashSet};

use sqlx::{PgConnection, Pool, Postgres, QueryBuilder};

use crate::{
    error::ServiceError,
    filter::RecipeFilter,
    form::Form,
    jwt::SessionData,
    pagination::{Page, PageQuery},
    permissions::ActionType,
    schema::{Id, IngredientAmount, Recipe, RecipeDetail, RecipeRow, Tag, User, UserSummary},
    validation::{PayloadKind, RecipeDraft, ReferenceData, ValidatedLine},
};

use super::{
    fetch_ingredients_by_ids, fetch_tags_by_ids, subscribed_among, RecipeList, RecipeRelation,
};

pub async fn get_recipe(id: Id, pool: &Pool<Postgres>) -> Result<Option<Recipe>, ServiceError> {
    let row: Option<Recipe> = sqlx::query_as("SELECT * FROM recipes WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

/// Returns a recipe that `session` may modify.
pub async fn get_recipe_mut(
    id: Id,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<Recipe, ServiceError> {
    let recipe = get_recipe(id, pool)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Recipe {id}")))?;

    if recipe.author_id == session.user_id {
        session.authenticate(ActionType::ManageOwnRecipes)?;
    } else {
        session.authenticate(ActionType::ManageAllRecipes)?;
    }

    Ok(recipe)
}

/// Fetches every tag and ingredient a draft references in two queries.
pub async fn fetch_reference_data(
    draft: &RecipeDraft,
    pool: &Pool<Postgres>,
) -> Result<ReferenceData, ServiceError> {
    let tags = fetch_tags_by_ids(draft.tag_ids(), pool).await?;
    let ingredients = fetch_ingredients_by_ids(draft.ingredient_ids(), pool).await?;

    Ok(ReferenceData::new(tags, ingredients))
}

async fn replace_tags(
    recipe_id: Id,
    tags: &[Tag],
    conn: &mut PgConnection,
) -> Result<(), ServiceError> {
    sqlx::query("DELETE FROM recipe_tags WHERE recipe_id = $1")
        .bind(recipe_id)
        .execute(&mut *conn)
        .await?;

    if tags.is_empty() {
        return Ok(());
    }

    let ids: Vec<Id> = tags.iter().map(|tag| tag.id).collect();
    sqlx::query(
        "
        INSERT INTO recipe_tags (recipe_id, tag_id)
        SELECT $1, UNNEST($2::int4[])
    ",
    )
    .bind(recipe_id)
    .bind(ids)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn replace_ingredients(
    recipe_id: Id,
    lines: &[ValidatedLine],
    conn: &mut PgConnection,
) -> Result<(), ServiceError> {
    sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = $1")
        .bind(recipe_id)
        .execute(&mut *conn)
        .await?;

    if lines.is_empty() {
        return Ok(());
    }

    let (ids, amounts): (Vec<Id>, Vec<i32>) = lines
        .iter()
        .map(|line| (line.ingredient.id, line.amount))
        .unzip();
    sqlx::query(
        "
        INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount)
        SELECT $1, UNNEST($2::int4[]), UNNEST($3::int4[])
    ",
    )
    .bind(recipe_id)
    .bind(ids)
    .bind(amounts)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn create_recipe(
    form: &Form,
    session: Option<&SessionData>,
    pool: &Pool<Postgres>,
) -> Result<RecipeDetail, ServiceError> {
    let session = session.ok_or(ServiceError::Unauthorized)?;
    session.authenticate(ActionType::CreateRecipes)?;

    let draft = RecipeDraft::parse(form, PayloadKind::Create)?;
    let refs = fetch_reference_data(&draft, pool).await?;
    let recipe = draft.resolve(&refs, session.user_id)?;

    let (Some(name), Some(text), Some(image), Some(cooking_time)) =
        (recipe.name, recipe.text, recipe.image, recipe.cooking_time)
    else {
        return Err(ServiceError::malformed("body", "incomplete recipe"));
    };
    let tags = recipe.tags.unwrap_or_default();
    let ingredients = recipe.ingredients.unwrap_or_default();

    let mut tr = pool.begin().await?;

    let (id,): (Id,) = sqlx::query_as(
        "
        INSERT INTO recipes (author_id, name, text, image, cooking_time)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
    ",
    )
    .bind(recipe.author_id)
    .bind(name)
    .bind(text)
    .bind(image)
    .bind(cooking_time)
    .fetch_one(&mut *tr)
    .await?;

    replace_tags(id, &tags, &mut *tr).await?;
    replace_ingredients(id, &ingredients, &mut *tr).await?;

    tr.commit().await?;
    log::info!("{} created recipe {id}", session.username);

    get_recipe_detail(id, Some(session), pool).await
}

/// Absent fields keep their stored value. Present tag or ingredient lists,
/// empty ones included, replace the stored set.
pub async fn update_recipe(
    id: Id,
    form: &Form,
    session: Option<&SessionData>,
    pool: &Pool<Postgres>,
) -> Result<RecipeDetail, ServiceError> {
    let session = session.ok_or(ServiceError::Unauthorized)?;
    let existing = get_recipe_mut(id, session, pool).await?;

    let draft = RecipeDraft::parse(form, PayloadKind::Update)?;
    let refs = fetch_reference_data(&draft, pool).await?;
    let recipe = draft.resolve(&refs, existing.author_id)?;

    let mut tr = pool.begin().await?;

    sqlx::query(
        "
        UPDATE recipes SET
            name = COALESCE($2, name),
            text = COALESCE($3, text),
            image = COALESCE($4, image),
            cooking_time = COALESCE($5, cooking_time)
        WHERE id = $1
    ",
    )
    .bind(id)
    .bind(recipe.name)
    .bind(recipe.text)
    .bind(recipe.image)
    .bind(recipe.cooking_time)
    .execute(&mut *tr)
    .await?;

    if let Some(tags) = &recipe.tags {
        replace_tags(id, tags, &mut *tr).await?;
    }
    if let Some(ingredients) = &recipe.ingredients {
        replace_ingredients(id, ingredients, &mut *tr).await?;
    }

    tr.commit().await?;
    log::info!("{} updated recipe {id}", session.username);

    get_recipe_detail(id, Some(session), pool).await
}

pub async fn delete_recipe(
    id: Id,
    session: Option<&SessionData>,
    pool: &Pool<Postgres>,
) -> Result<(), ServiceError> {
    let session = session.ok_or(ServiceError::Unauthorized)?;
    get_recipe_mut(id, session, pool).await?;

    let query = sqlx::query("DELETE FROM recipes WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    if query.rows_affected() == 0 {
        return Err(ServiceError::NotFound(format!("Recipe {id}")));
    }

    log::info!("{} deleted recipe {id}", session.username);
    Ok(())
}

pub async fn get_recipe_detail(
    id: Id,
    viewer: Option<&SessionData>,
    pool: &Pool<Postgres>,
) -> Result<RecipeDetail, ServiceError> {
    let recipe = get_recipe(id, pool)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Recipe {id}")))?;

    assemble_detail(recipe, viewer.map(|session| session.user_id), pool).await
}

#[derive(sqlx::FromRow)]
struct TaggedRow {
    recipe_id: Id,
    #[sqlx(flatten)]
    tag: Tag,
}

#[derive(sqlx::FromRow)]
struct LineRow {
    recipe_id: Id,
    #[sqlx(flatten)]
    line: IngredientAmount,
}

/// Groups rows per recipe, keeping the order they arrived in.
fn group_by_recipe<T>(rows: impl IntoIterator<Item = (Id, T)>) -> HashMap<Id, Vec<T>> {
    let mut groups: HashMap<Id, Vec<T>> = HashMap::new();
    for (recipe_id, item) in rows {
        groups.entry(recipe_id).or_default().push(item);
    }
    groups
}

pub async fn assemble_detail(
    recipe: Recipe,
    viewer: Option<Id>,
    pool: &Pool<Postgres>,
) -> Result<RecipeDetail, ServiceError> {
    let id = recipe.id;
    assemble_details(vec![recipe], viewer, pool)
        .await?
        .pop()
        .ok_or_else(|| ServiceError::NotFound(format!("Recipe {id}")))
}

/// Loads tags, ingredient lines, authors and the viewer's memberships for
/// every recipe at once. The query count does not grow with the page.
pub async fn assemble_details(
    recipes: Vec<Recipe>,
    viewer: Option<Id>,
    pool: &Pool<Postgres>,
) -> Result<Vec<RecipeDetail>, ServiceError> {
    if recipes.is_empty() {
        return Ok(Vec::new());
    }

    let recipe_ids: Vec<Id> = recipes.iter().map(|recipe| recipe.id).collect();
    let mut author_ids: Vec<Id> = recipes.iter().map(|recipe| recipe.author_id).collect();
    author_ids.sort_unstable();
    author_ids.dedup();

    let tag_rows: Vec<TaggedRow> = sqlx::query_as(
        "
        SELECT rt.recipe_id, t.*
        FROM recipe_tags rt
        INNER JOIN tags t ON t.id = rt.tag_id
        WHERE rt.recipe_id = ANY($1)
        ORDER BY t.id
    ",
    )
    .bind(&recipe_ids)
    .fetch_all(pool)
    .await?;

    let line_rows: Vec<LineRow> = sqlx::query_as(
        "
        SELECT ri.recipe_id, i.id AS id, i.name AS name, i.measurement_unit AS measurement_unit, ri.amount AS amount
        FROM recipe_ingredients ri
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE ri.recipe_id = ANY($1)
        ORDER BY i.name
    ",
    )
    .bind(&recipe_ids)
    .fetch_all(pool)
    .await?;

    let authors: Vec<User> = sqlx::query_as("SELECT * FROM users WHERE id = ANY($1)")
        .bind(&author_ids)
        .fetch_all(pool)
        .await?;
    let authors: HashMap<Id, User> = authors.into_iter().map(|user| (user.id, user)).collect();

    let (subscribed, favorites, cart) = match viewer {
        Some(viewer) => (
            subscribed_among(viewer, &author_ids, pool).await?,
            RecipeRelation::new(RecipeList::Favorites, pool)
                .members_among(viewer, &recipe_ids)
                .await?,
            RecipeRelation::new(RecipeList::ShoppingCart, pool)
                .members_among(viewer, &recipe_ids)
                .await?,
        ),
        None => (HashSet::new(), HashSet::new(), HashSet::new()),
    };

    let mut tags = group_by_recipe(tag_rows.into_iter().map(|row| (row.recipe_id, row.tag)));
    let mut lines = group_by_recipe(line_rows.into_iter().map(|row| (row.recipe_id, row.line)));

    recipes
        .into_iter()
        .map(|recipe| -> Result<RecipeDetail, ServiceError> {
            let author = authors
                .get(&recipe.author_id)
                .cloned()
                .ok_or_else(|| ServiceError::NotFound(format!("Author {}", recipe.author_id)))?;
            let is_subscribed = viewer != Some(author.id) && subscribed.contains(&author.id);

            Ok(RecipeDetail {
                id: recipe.id,
                tags: tags.remove(&recipe.id).unwrap_or_default(),
                author: UserSummary::from_user(author, is_subscribed),
                ingredients: lines.remove(&recipe.id).unwrap_or_default(),
                is_favorited: favorites.contains(&recipe.id),
                is_in_shopping_cart: cart.contains(&recipe.id),
                name: recipe.name,
                image: recipe.image,
                text: recipe.text,
                cooking_time: recipe.cooking_time,
            })
        })
        .collect()
}

/// Newest first. `params` are the raw query pairs of the request, paging
/// keys included.
pub async fn list_recipes(
    params: &[(String, String)],
    query: PageQuery,
    viewer: Option<&SessionData>,
    pool: &Pool<Postgres>,
) -> Result<Page<RecipeDetail>, ServiceError> {
    let filter = RecipeFilter::from_query(params)?;
    let viewer = viewer.map(|session| session.user_id);

    let mut builder: QueryBuilder<Postgres> =
        QueryBuilder::new("SELECT r.*, COUNT(*) OVER() AS count FROM recipes r WHERE TRUE");
    filter.push_conditions(&mut builder, viewer);
    builder.push(" ORDER BY r.created_at DESC, r.id DESC LIMIT ");
    builder.push_bind(query.limit());
    builder.push(" OFFSET ");
    builder.push_bind(query.offset());

    let rows: Vec<RecipeRow> = builder.build_query_as().fetch_all(pool).await?;
    let total_count = rows.first().map(|row| row.count).unwrap_or(0);

    let recipes: Vec<Recipe> = rows.into_iter().map(Recipe::from).collect();
    let results = assemble_details(recipes, viewer, pool).await?;

    Ok(Page::from_rows(results, total_count, query))
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use sqlx::PgPool;

    use super::*;
    use crate::{schema::UserRole, toggle::Relation};

    async fn user(pool: &PgPool, username: &str) -> SessionData {
        let (id,): (Id,) = sqlx::query_as(
            "
            INSERT INTO users (email, username, first_name, last_name, password_hash)
            VALUES ($1, $2, 'Test', 'Cook', 'x')
            RETURNING id
        ",
        )
        .bind(format!("{username}@example.com"))
        .bind(username)
        .fetch_one(pool)
        .await
        .unwrap();

        SessionData {
            user_id: id,
            username: username.to_owned(),
            role: UserRole::User,
            is_admin: false,
        }
    }

    async fn tags(pool: &PgPool) -> Vec<Id> {
        let rows: Vec<(Id,)> = sqlx::query_as(
            "
            INSERT INTO tags (name, color, slug)
            VALUES ('Breakfast', '#E26C2D', 'breakfast'), ('Lunch', '#49B64E', 'lunch')
            RETURNING id
        ",
        )
        .fetch_all(pool)
        .await
        .unwrap();

        rows.into_iter().map(|(id,)| id).collect()
    }

    async fn ingredient(pool: &PgPool) -> Id {
        let (id,): (Id,) = sqlx::query_as(
            "INSERT INTO ingredients (name, measurement_unit) VALUES ('flour', 'g') RETURNING id",
        )
        .fetch_one(pool)
        .await
        .unwrap();

        id
    }

    fn recipe_form(name: &str, tags: &[Id], ingredient: Id) -> Form {
        Form::from_data(
            serde_json::from_value(json!({
                "name": name,
                "text": "Mix and bake.",
                "image": "recipes/bread.png",
                "cooking_time": 40,
                "tags": tags,
                "ingredients": [{ "id": ingredient, "amount": 500 }],
            }))
            .unwrap(),
        )
    }

    fn filters(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    async fn count(pool: &PgPool, table: &str, recipe_id: Id) -> i64 {
        let (count,): (i64,) = sqlx::query_as(&format!(
            "SELECT COUNT(*) FROM {table} WHERE recipe_id = $1"
        ))
        .bind(recipe_id)
        .fetch_one(pool)
        .await
        .unwrap();

        count
    }

    #[test]
    fn rows_are_grouped_in_arrival_order() {
        let groups = group_by_recipe(vec![(1, "b"), (2, "x"), (1, "a")]);

        assert_eq!(groups[&1], vec!["b", "a"]);
        assert_eq!(groups[&2], vec!["x"]);
        assert!(!groups.contains_key(&3));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn empty_ingredient_list_clears_stored_lines(pool: PgPool) {
        let cook = user(&pool, "baker").await;
        let tag_ids = tags(&pool).await;
        let flour = ingredient(&pool).await;

        let created = create_recipe(&recipe_form("bread", &tag_ids, flour), Some(&cook), &pool)
            .await
            .unwrap();
        assert_eq!(created.ingredients.len(), 1);
        assert_eq!(count(&pool, "recipe_ingredients", created.id).await, 1);

        let update = Form::from_data(serde_json::from_value(json!({ "ingredients": [] })).unwrap());
        let updated = update_recipe(created.id, &update, Some(&cook), &pool)
            .await
            .unwrap();

        assert!(updated.ingredients.is_empty());
        assert_eq!(count(&pool, "recipe_ingredients", created.id).await, 0);
        // absent key keeps the stored tags
        assert_eq!(count(&pool, "recipe_tags", created.id).await, 2);
        assert_eq!(updated.name, "Bread");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn strangers_cannot_update(pool: PgPool) {
        let cook = user(&pool, "baker").await;
        let stranger = user(&pool, "stranger").await;
        let flour = ingredient(&pool).await;

        let created = create_recipe(&recipe_form("bread", &[], flour), Some(&cook), &pool)
            .await
            .unwrap();
        let update = Form::from_data(serde_json::from_value(json!({ "name": "mine" })).unwrap());

        let error = update_recipe(created.id, &update, Some(&stranger), &pool)
            .await
            .unwrap_err();
        assert_eq!(error, ServiceError::Forbidden);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn several_matching_tags_list_a_recipe_once(pool: PgPool) {
        let cook = user(&pool, "baker").await;
        let tag_ids = tags(&pool).await;
        let flour = ingredient(&pool).await;

        create_recipe(&recipe_form("bread", &tag_ids, flour), Some(&cook), &pool)
            .await
            .unwrap();
        create_recipe(&recipe_form("buns", &[], flour), Some(&cook), &pool)
            .await
            .unwrap();

        let page = list_recipes(
            &filters(&[("tags", "breakfast"), ("tags", "lunch")]),
            PageQuery::default(),
            None,
            &pool,
        )
        .await
        .unwrap();

        assert_eq!(page.count, 1);
        assert_eq!(page.results.len(), 1);
        assert_eq!(page.results[0].name, "Bread");
        assert_eq!(page.results[0].tags.len(), 2);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn favorite_filter_returns_each_favorite_once(pool: PgPool) {
        let cook = user(&pool, "baker").await;
        let fan = user(&pool, "fan").await;
        let flour = ingredient(&pool).await;

        let bread = create_recipe(&recipe_form("bread", &[], flour), Some(&cook), &pool)
            .await
            .unwrap();
        create_recipe(&recipe_form("buns", &[], flour), Some(&cook), &pool)
            .await
            .unwrap();

        let favorites = RecipeRelation::new(RecipeList::Favorites, &pool);
        assert!(favorites.add(fan.user_id, bread.id).await.unwrap());
        // another user's favorite must not duplicate the row
        assert!(favorites.add(cook.user_id, bread.id).await.unwrap());

        let page = list_recipes(
            &filters(&[("is_favorited", "1")]),
            PageQuery::default(),
            Some(&fan),
            &pool,
        )
        .await
        .unwrap();

        assert_eq!(page.count, 1);
        assert_eq!(page.results.len(), 1);
        assert_eq!(page.results[0].id, bread.id);
        assert!(page.results[0].is_favorited);
        assert!(!page.results[0].is_in_shopping_cart);

        let anonymous = list_recipes(
            &filters(&[("is_favorited", "1")]),
            PageQuery::default(),
            None,
            &pool,
        )
        .await
        .unwrap();
        assert_eq!(anonymous.count, 2);
        assert!(anonymous.results.iter().all(|recipe| !recipe.is_favorited));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn listed_authors_carry_the_viewers_subscription(pool: PgPool) {
        let cook = user(&pool, "baker").await;
        let fan = user(&pool, "fan").await;
        let flour = ingredient(&pool).await;

        create_recipe(&recipe_form("bread", &[], flour), Some(&cook), &pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO user_subscriptions (follower_id, followee_id) VALUES ($1, $2)")
            .bind(fan.user_id)
            .bind(cook.user_id)
            .execute(&pool)
            .await
            .unwrap();

        let seen_by_fan = list_recipes(&[], PageQuery::default(), Some(&fan), &pool)
            .await
            .unwrap();
        assert!(seen_by_fan.results[0].author.is_subscribed);

        let seen_by_cook = list_recipes(&[], PageQuery::default(), Some(&cook), &pool)
            .await
            .unwrap();
        assert!(!seen_by_cook.results[0].author.is_subscribed);
        assert_eq!(seen_by_cook.results[0].ingredients[0].amount, 500);
    }
}
