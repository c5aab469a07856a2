//! Checks recipe create/update payloads before anything touches the store.
//!
//! Validation happens in two passes. [`RecipeDraft::parse`] checks the shape
//! of the payload and collects every referenced tag and ingredient id, the
//! caller then batch-fetches those rows once, and [`RecipeDraft::resolve`]
//! checks that every id exists.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::{
    error::{ServiceError, TypeError},
    form::Form,
    schema::{Id, Ingredient, Tag},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// Every field is required
    Create,
    /// Absent fields keep their stored value
    Update,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngredientEntry {
    pub id: Id,
    pub amount: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecipeDraft {
    pub name: Option<String>,
    pub text: Option<String>,
    pub image: Option<String>,
    pub cooking_time: Option<i32>,
    pub tags: Option<Vec<Id>>,
    pub ingredients: Option<Vec<IngredientEntry>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedLine {
    pub ingredient: Ingredient,
    pub amount: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRecipe {
    pub name: Option<String>,
    pub text: Option<String>,
    pub image: Option<String>,
    pub cooking_time: Option<i32>,
    pub tags: Option<Vec<Tag>>,
    pub ingredients: Option<Vec<ValidatedLine>>,
    pub author_id: Id,
}

/// Tag and ingredient rows fetched for the ids a draft references.
#[derive(Debug, Default)]
pub struct ReferenceData {
    tags: HashMap<Id, Tag>,
    ingredients: HashMap<Id, Ingredient>,
}

impl ReferenceData {
    pub fn new(tags: Vec<Tag>, ingredients: Vec<Ingredient>) -> Self {
        Self {
            tags: tags.into_iter().map(|tag| (tag.id, tag)).collect(),
            ingredients: ingredients.into_iter().map(|i| (i.id, i)).collect(),
        }
    }
}

impl RecipeDraft {
    pub fn parse(form: &Form, kind: PayloadKind) -> Result<Self, ServiceError> {
        let tags = required(form.get_list("tags"), "tags", kind)?;
        let ingredients = required(form.get_list("ingredients"), "ingredients", kind)?;

        let name = required(form.get_str("name"), "name", kind)?
            .map(|name| capitalize(name.trim()));
        if let Some(name) = &name {
            if name.is_empty() {
                return Err(ServiceError::invalid("name", "\"\""));
            }
        }

        let text = required(form.get_str("text"), "text", kind)?;
        let image = required(form.get_str("image"), "image", kind)?;

        let cooking_time = match form.get("cooking_time") {
            None | Some(Value::Null) => None,
            Some(value) => Some(non_negative(value, "cooking_time")?),
        };

        let tags = match tags {
            Some(list) => {
                let mut seen = HashSet::new();
                let mut ids = vec![];
                for value in list {
                    let id = positive(value, "tags")?;
                    if seen.insert(id) {
                        ids.push(id);
                    }
                }
                Some(ids)
            }
            None => None,
        };

        let ingredients = match ingredients {
            Some(list) => {
                let mut seen = HashSet::new();
                let mut entries = vec![];
                for value in list {
                    let entry = match value.as_object() {
                        Some(entry) => entry,
                        None => {
                            return Err(ServiceError::malformed(
                                "ingredients",
                                "each entry must be an object with `id` and `amount`",
                            ))
                        }
                    };
                    let id = positive(entry.get("id").unwrap_or(&Value::Null), "ingredients.id")?;
                    let amount = positive(
                        entry.get("amount").unwrap_or(&Value::Null),
                        "ingredients.amount",
                    )?;
                    if !seen.insert(id) {
                        return Err(ServiceError::invalid("ingredients.id", id));
                    }
                    entries.push(IngredientEntry { id, amount });
                }
                Some(entries)
            }
            None => None,
        };

        Ok(Self {
            name,
            text,
            image,
            cooking_time: cooking_time.or(match kind {
                PayloadKind::Create => Some(0),
                PayloadKind::Update => None,
            }),
            tags,
            ingredients,
        })
    }

    pub fn tag_ids(&self) -> Vec<Id> {
        self.tags.clone().unwrap_or_default()
    }

    pub fn ingredient_ids(&self) -> Vec<Id> {
        self.ingredients
            .iter()
            .flatten()
            .map(|entry| entry.id)
            .collect()
    }

    pub fn resolve(
        self,
        refs: &ReferenceData,
        author_id: Id,
    ) -> Result<ValidatedRecipe, ServiceError> {
        let tags = match self.tags {
            Some(ids) => Some(
                ids.into_iter()
                    .map(|id| {
                        refs.tags
                            .get(&id)
                            .cloned()
                            .ok_or(ServiceError::ReferenceNotFound {
                                field: String::from("tags"),
                                id: id.into(),
                            })
                    })
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            None => None,
        };

        let ingredients = match self.ingredients {
            Some(entries) => Some(
                entries
                    .into_iter()
                    .map(|entry| match refs.ingredients.get(&entry.id) {
                        Some(ingredient) => Ok(ValidatedLine {
                            ingredient: ingredient.to_owned(),
                            amount: entry.amount,
                        }),
                        None => Err(ServiceError::invalid("ingredients.id", entry.id)),
                    })
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            None => None,
        };

        Ok(ValidatedRecipe {
            name: self.name,
            text: self.text,
            image: self.image,
            cooking_time: self.cooking_time,
            tags,
            ingredients,
            author_id,
        })
    }
}

/// Turns a form lookup into an optional value, treating absence as an error
/// for create payloads.
fn required<T>(
    value: Result<Option<T>, TypeError>,
    field: &str,
    kind: PayloadKind,
) -> Result<Option<T>, ServiceError> {
    match value {
        Ok(None) if kind == PayloadKind::Create => {
            Err(ServiceError::malformed(field, "this field is required"))
        }
        Ok(value) => Ok(value),
        Err(e) => Err(ServiceError::malformed(field, &e.to_string())),
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.to_owned(),
        other => other.to_string(),
    }
}

/// Parses a JSON number or a string of ASCII digits.
fn parse_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) => {
            s.parse().ok()
        }
        _ => None,
    }
}

fn positive(value: &Value, field: &str) -> Result<i32, ServiceError> {
    parse_integer(value)
        .filter(|n| *n > 0)
        .and_then(|n| i32::try_from(n).ok())
        .ok_or_else(|| ServiceError::invalid(field, render(value)))
}

fn non_negative(value: &Value, field: &str) -> Result<i32, ServiceError> {
    parse_integer(value)
        .filter(|n| *n >= 0)
        .and_then(|n| i32::try_from(n).ok())
        .ok_or_else(|| ServiceError::invalid(field, render(value)))
}

/// Uppercases the first character and leaves the rest untouched.
pub fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn form(value: Value) -> Form {
        Form::from_data(serde_json::from_value(value).unwrap())
    }

    fn refs() -> ReferenceData {
        ReferenceData::new(
            vec![Tag {
                id: 1,
                name: String::from("Breakfast"),
                color: String::from("#E26C2D"),
                slug: String::from("breakfast"),
            }],
            vec![
                Ingredient {
                    id: 10,
                    name: String::from("sugar"),
                    measurement_unit: String::from("g"),
                },
                Ingredient {
                    id: 11,
                    name: String::from("milk"),
                    measurement_unit: String::from("ml"),
                },
            ],
        )
    }

    fn payload() -> Value {
        json!({
            "name": "  pancakes ",
            "text": "Mix and fry.",
            "image": "recipes/pancakes.png",
            "cooking_time": 20,
            "tags": [1],
            "ingredients": [{ "id": 10, "amount": 100 }, { "id": "11", "amount": "250" }],
        })
    }

    #[test]
    fn normalizes_a_valid_payload() {
        let draft = RecipeDraft::parse(&form(payload()), PayloadKind::Create).unwrap();
        assert_eq!(draft.tag_ids(), vec![1]);
        assert_eq!(draft.ingredient_ids(), vec![10, 11]);

        let recipe = draft.resolve(&refs(), 5).unwrap();
        assert_eq!(recipe.name.as_deref(), Some("Pancakes"));
        assert_eq!(recipe.author_id, 5);
        assert_eq!(recipe.cooking_time, Some(20));
        assert_eq!(recipe.tags.unwrap()[0].slug, "breakfast");

        let lines = recipe.ingredients.unwrap();
        assert_eq!(lines[1].ingredient.name, "milk");
        assert_eq!(lines[1].amount, 250);
    }

    #[test]
    fn lists_must_be_lists() {
        let mut value = payload();
        value["tags"] = json!("1,2");

        let error = RecipeDraft::parse(&form(value), PayloadKind::Create).unwrap_err();
        assert_eq!(error, ServiceError::malformed("tags", "Expected a list"));

        let mut value = payload();
        value["ingredients"] = json!({ "id": 10, "amount": 1 });
        let error = RecipeDraft::parse(&form(value), PayloadKind::Update).unwrap_err();
        assert!(
            matches!(error, ServiceError::MalformedInput { field, .. } if field == "ingredients")
        );
    }

    #[test]
    fn zero_amount_is_an_invalid_value() {
        let mut value = payload();
        value["ingredients"] = json!([{ "id": 10, "amount": 0 }]);

        assert_eq!(
            RecipeDraft::parse(&form(value), PayloadKind::Create).unwrap_err(),
            ServiceError::invalid("ingredients.amount", "0")
        );
    }

    #[test]
    fn non_numeric_id_is_an_invalid_value() {
        let mut value = payload();
        value["ingredients"] = json!([{ "id": "sugar", "amount": 5 }]);

        assert_eq!(
            RecipeDraft::parse(&form(value), PayloadKind::Create).unwrap_err(),
            ServiceError::invalid("ingredients.id", "sugar")
        );

        let mut value = payload();
        value["ingredients"] = json!([{ "id": -3, "amount": 5 }]);
        assert_eq!(
            RecipeDraft::parse(&form(value), PayloadKind::Create).unwrap_err(),
            ServiceError::invalid("ingredients.id", "-3")
        );
    }

    #[test]
    fn unknown_references_are_reported() {
        let mut value = payload();
        value["tags"] = json!([1, 99]);
        let draft = RecipeDraft::parse(&form(value), PayloadKind::Create).unwrap();
        assert_eq!(
            draft.resolve(&refs(), 5).unwrap_err(),
            ServiceError::ReferenceNotFound {
                field: String::from("tags"),
                id: 99
            }
        );

        let mut value = payload();
        value["ingredients"] = json!([{ "id": 404, "amount": 5 }]);
        let draft = RecipeDraft::parse(&form(value), PayloadKind::Create).unwrap();
        assert_eq!(
            draft.resolve(&refs(), 5).unwrap_err(),
            ServiceError::invalid("ingredients.id", 404)
        );
    }

    #[test]
    fn the_same_ingredient_cannot_appear_twice() {
        let mut value = payload();
        value["ingredients"] = json!([{ "id": 10, "amount": 5 }, { "id": 10, "amount": 7 }]);

        assert_eq!(
            RecipeDraft::parse(&form(value), PayloadKind::Create).unwrap_err(),
            ServiceError::invalid("ingredients.id", 10)
        );
    }

    #[test]
    fn duplicate_tags_collapse() {
        let mut value = payload();
        value["tags"] = json!([1, "1", 1]);

        let draft = RecipeDraft::parse(&form(value), PayloadKind::Create).unwrap();
        assert_eq!(draft.tag_ids(), vec![1]);
    }

    #[test]
    fn create_requires_every_field() {
        let mut value = payload();
        value.as_object_mut().unwrap().remove("image");

        let error = RecipeDraft::parse(&form(value), PayloadKind::Create).unwrap_err();
        assert!(matches!(error, ServiceError::MalformedInput { field, .. } if field == "image"));
    }

    #[test]
    fn blank_names_are_rejected() {
        let mut value = payload();
        value["name"] = json!("   ");

        assert!(matches!(
            RecipeDraft::parse(&form(value), PayloadKind::Create).unwrap_err(),
            ServiceError::InvalidValue { field, .. } if field == "name"
        ));
    }

    #[test]
    fn update_distinguishes_empty_from_absent() {
        let draft = RecipeDraft::parse(&form(json!({ "ingredients": [] })), PayloadKind::Update)
            .unwrap();
        assert_eq!(draft.ingredients, Some(vec![]));
        assert_eq!(draft.tags, None);
        assert_eq!(draft.cooking_time, None);

        let recipe = draft.resolve(&refs(), 5).unwrap();
        assert_eq!(recipe.ingredients, Some(vec![]));
        assert_eq!(recipe.name, None);
    }

    #[test]
    fn cooking_time_cannot_be_negative() {
        let mut value = payload();
        value["cooking_time"] = json!(-1);

        assert_eq!(
            RecipeDraft::parse(&form(value), PayloadKind::Create).unwrap_err(),
            ServiceError::invalid("cooking_time", "-1")
        );
    }

    #[test]
    fn capitalize_only_touches_the_first_letter() {
        assert_eq!(capitalize("borscht with SMETANA"), "Borscht with SMETANA");
        assert_eq!(capitalize("éclair"), "Éclair");
        assert_eq!(capitalize(""), "");
    }
}
