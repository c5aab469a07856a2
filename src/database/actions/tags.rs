use redis::aio::MultiplexedConnection;
use serde::Deserialize;
use sqlx::{Pool, Postgres};

use crate::{
    constants::DEFAULT_TAG_COLOR,
    error::ServiceError,
    jwt::SessionData,
    permissions::ActionType,
    schema::{Id, Tag},
    CacheKeyType, CacheLifetime, RedisValue,
};

#[derive(Deserialize, Debug, Clone)]
pub struct TagForm {
    pub name: String,
    pub color: Option<String>,
    pub slug: String,
}

/// `#` followed by exactly six hex digits.
pub fn is_hex_color(color: &str) -> bool {
    color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit())
}

impl TagForm {
    fn validate(self) -> Result<TagForm, ServiceError> {
        let name = self.name.trim().to_owned();
        let slug = self.slug.trim().to_owned();
        let color = self
            .color
            .map(|color| color.trim().to_uppercase())
            .unwrap_or_else(|| DEFAULT_TAG_COLOR.to_owned());

        if name.is_empty() {
            return Err(ServiceError::invalid("name", "\"\""));
        }
        if slug.is_empty() {
            return Err(ServiceError::invalid("slug", "\"\""));
        }
        if !is_hex_color(&color) {
            return Err(ServiceError::invalid("color", color));
        }

        Ok(TagForm {
            name,
            color: Some(color),
            slug,
        })
    }
}

pub async fn fetch_tags(pool: &Pool<Postgres>) -> Result<Vec<Tag>, ServiceError> {
    let list: Vec<Tag> = sqlx::query_as("SELECT * FROM tags ORDER BY name")
        .fetch_all(pool)
        .await?;

    Ok(list)
}

pub async fn list_tags(
    pool: &Pool<Postgres>,
    cache: &mut MultiplexedConnection,
) -> Result<Vec<Tag>, ServiceError> {
    RedisValue::get_or(CacheKeyType::Tags.new("all"), cache, || fetch_tags(pool)).await
}

pub async fn get_tag(id: Id, pool: &Pool<Postgres>) -> Result<Option<Tag>, ServiceError> {
    let tag: Option<Tag> = sqlx::query_as("SELECT * FROM tags WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(tag)
}

/// One round trip for every tag a recipe payload references.
pub async fn fetch_tags_by_ids(
    ids: Vec<Id>,
    pool: &Pool<Postgres>,
) -> Result<Vec<Tag>, ServiceError> {
    if ids.is_empty() {
        return Ok(vec![]);
    }

    let list: Vec<Tag> = sqlx::query_as("SELECT * FROM tags WHERE id = ANY($1)")
        .bind(ids)
        .fetch_all(pool)
        .await?;

    Ok(list)
}

pub async fn create_tag(
    form: TagForm,
    session: Option<&SessionData>,
    pool: &Pool<Postgres>,
    cache: &mut MultiplexedConnection,
) -> Result<Tag, ServiceError> {
    let session = session.ok_or(ServiceError::Unauthorized)?;
    session.authenticate(ActionType::ManageReferenceData)?;

    let form = form.validate()?;
    let tag: Tag = sqlx::query_as(
        "INSERT INTO tags (name, color, slug) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(form.name)
    .bind(form.color)
    .bind(form.slug)
    .fetch_one(pool)
    .await?;

    log::info!("{} created tag {}", session.username, tag.slug);
    if let Err(e) = CacheLifetime::BindTagCache.rotate(cache).await {
        log::error!("> Failed to invalidate tag cache: {e}");
    }

    Ok(tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(name: &str, color: Option<&str>, slug: &str) -> TagForm {
        TagForm {
            name: name.to_owned(),
            color: color.map(str::to_owned),
            slug: slug.to_owned(),
        }
    }

    #[test]
    fn hex_colors() {
        assert!(is_hex_color("#E26C2D"));
        assert!(is_hex_color("#ffff00"));
        assert!(!is_hex_color("E26C2D"));
        assert!(!is_hex_color("#E26C2"));
        assert!(!is_hex_color("#GGGGGG"));
    }

    #[test]
    fn color_defaults_to_yellow() {
        let tag = form(" Lunch ", None, "lunch").validate().unwrap();

        assert_eq!(tag.name, "Lunch");
        assert_eq!(tag.color.as_deref(), Some(DEFAULT_TAG_COLOR));
    }

    #[test]
    fn empty_fields_are_rejected() {
        assert_eq!(
            form("", None, "lunch").validate().unwrap_err(),
            ServiceError::invalid("name", "\"\"")
        );
        assert_eq!(
            form("Lunch", None, " ").validate().unwrap_err(),
            ServiceError::invalid("slug", "\"\"")
        );
        assert_eq!(
            form("Lunch", Some("red"), "lunch").validate().unwrap_err(),
            ServiceError::invalid("color", "RED")
        );
    }
}
