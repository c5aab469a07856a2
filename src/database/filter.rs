use sqlx::{Postgres, QueryBuilder};

use crate::{
    constants::{FALSY_FLAGS, TRUTHY_FLAGS},
    error::ServiceError,
    schema::Id,
};

/// Optional restrictions on a recipe listing. Kinds combine with AND, the
/// tag slugs among themselves with OR.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecipeFilter {
    pub tags: Vec<String>,
    pub author: Option<Id>,
    pub is_favorited: Option<bool>,
    pub is_in_shopping_cart: Option<bool>,
}

/// `"1"`/`"true"` and `"0"`/`"false"`, anything else means "don't filter".
pub fn parse_flag(value: &str) -> Option<bool> {
    let value = value.trim().to_lowercase();
    if TRUTHY_FLAGS.contains(&value.as_str()) {
        Some(true)
    } else if FALSY_FLAGS.contains(&value.as_str()) {
        Some(false)
    } else {
        None
    }
}

impl RecipeFilter {
    /// Reads the filter from raw query pairs; `tags` may repeat.
    pub fn from_query(params: &[(String, String)]) -> Result<Self, ServiceError> {
        let mut filter = Self::default();

        for (key, value) in params {
            match key.as_str() {
                "tags" => {
                    let slug = value.trim();
                    if !slug.is_empty() && !filter.tags.iter().any(|t| t == slug) {
                        filter.tags.push(slug.to_owned());
                    }
                }
                "author" => {
                    let author = value
                        .trim()
                        .parse::<Id>()
                        .map_err(|_| ServiceError::invalid("author", value))?;
                    filter.author = Some(author);
                }
                "is_favorited" => filter.is_favorited = parse_flag(value),
                "is_in_shopping_cart" => filter.is_in_shopping_cart = parse_flag(value),
                _ => {}
            }
        }

        Ok(filter)
    }

    /// Appends ` AND ...` clauses for a query whose recipe alias is `r`.
    /// Membership flags only apply when there is a viewer.
    pub fn push_conditions(&self, builder: &mut QueryBuilder<'_, Postgres>, viewer: Option<Id>) {
        if !self.tags.is_empty() {
            // EXISTS keeps a recipe matching several slugs from repeating
            builder.push(
                " AND EXISTS (SELECT 1 FROM recipe_tags rt INNER JOIN tags t ON t.id = rt.tag_id WHERE rt.recipe_id = r.id AND t.slug = ANY(",
            );
            builder.push_bind(self.tags.clone());
            builder.push("))");
        }

        if let Some(author) = self.author {
            builder.push(" AND r.author_id = ");
            builder.push_bind(author);
        }

        let viewer = match viewer {
            Some(viewer) => viewer,
            None => return,
        };

        for (flag, table) in [
            (self.is_favorited, "recipe_favorites"),
            (self.is_in_shopping_cart, "recipe_carts"),
        ] {
            if let Some(member) = flag {
                builder.push(if member { " AND EXISTS" } else { " AND NOT EXISTS" });
                builder.push(format!(
                    " (SELECT 1 FROM {table} m WHERE m.recipe_id = r.id AND m.user_id = "
                ));
                builder.push_bind(viewer);
                builder.push(")");
            }
        }
    }
}
