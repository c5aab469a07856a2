use sqlx::{Pool, Postgres};

use crate::{
    error::ServiceError,
    jwt::SessionData,
    pagination::{Page, PageQuery},
    schema::{AuthorSummary, Id, RecipeSummary, User, UserSummary},
};

use super::is_subscribed;

#[derive(sqlx::FromRow)]
struct FollowedRow {
    #[sqlx(flatten)]
    user: User,
    count: i64,
}

pub async fn get_user_by_id(user_id: Id, pool: &Pool<Postgres>) -> Result<Option<User>, ServiceError> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

/// `is_subscribed` is always false for anonymous viewers and for the user
/// looking at themselves.
pub async fn get_user_summary(
    user_id: Id,
    viewer: Option<Id>,
    pool: &Pool<Postgres>,
) -> Result<Option<UserSummary>, ServiceError> {
    let user = match get_user_by_id(user_id, pool).await? {
        Some(user) => user,
        None => return Ok(None),
    };

    let subscribed = match viewer {
        Some(viewer) if viewer != user_id => is_subscribed(viewer, user_id, pool).await?,
        _ => false,
    };

    Ok(Some(UserSummary::from_user(user, subscribed)))
}

/// A profile as the viewer sees it.
pub async fn get_user_profile(
    user_id: Id,
    viewer: Option<&SessionData>,
    pool: &Pool<Postgres>,
) -> Result<UserSummary, ServiceError> {
    get_user_summary(user_id, viewer.map(|session| session.user_id), pool)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("User {user_id}")))
}

/// The actor's own profile. Anonymous actors have none.
pub async fn get_current_user(
    session: Option<&SessionData>,
    pool: &Pool<Postgres>,
) -> Result<UserSummary, ServiceError> {
    let session = session.ok_or(ServiceError::Unauthorized)?;
    get_user_profile(session.user_id, Some(session), pool).await
}

pub async fn author_summary(
    user: User,
    is_subscribed: bool,
    pool: &Pool<Postgres>,
) -> Result<AuthorSummary, ServiceError> {
    let recipes: Vec<RecipeSummary> = sqlx::query_as(
        "
        SELECT id, name, image, cooking_time
        FROM recipes
        WHERE author_id = $1
        ORDER BY created_at DESC, id DESC
    ",
    )
    .bind(user.id)
    .fetch_all(pool)
    .await?;

    Ok(AuthorSummary {
        user: UserSummary::from_user(user, is_subscribed),
        recipes_count: recipes.len() as i64,
        recipes,
    })
}

/// Authors the actor follows, one page at a time.
pub async fn list_subscriptions(
    session: Option<&SessionData>,
    query: PageQuery,
    pool: &Pool<Postgres>,
) -> Result<Page<AuthorSummary>, ServiceError> {
    let session = session.ok_or(ServiceError::Unauthorized)?;

    let rows: Vec<FollowedRow> = sqlx::query_as(
        "
        SELECT u.*, COUNT(*) OVER() AS count
        FROM user_subscriptions s
        INNER JOIN users u ON u.id = s.followee_id
        WHERE s.follower_id = $1
        ORDER BY u.username
        LIMIT $2 OFFSET $3
    ",
    )
    .bind(session.user_id)
    .bind(query.limit())
    .bind(query.offset())
    .fetch_all(pool)
    .await?;

    let total_count = rows.first().map(|row| row.count).unwrap_or(0);

    let mut authors = Vec::with_capacity(rows.len());
    for row in rows {
        authors.push(author_summary(row.user, true, pool).await?);
    }

    Ok(Page::from_rows(authors, total_count, query))
}
