use std::collections::BTreeMap;

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::{
    constants::{SHOPPING_LIST_HEADER, SHOPPING_LIST_TIME_FORMAT},
    error::ServiceError,
    schema::CartLine,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShoppingItem {
    pub name: String,
    pub amount: i64,
    pub measurement_unit: String,
}

/// Ingredients of every recipe in a cart, merged by name and unit.
#[derive(Debug, Clone, Serialize)]
pub struct ShoppingList {
    pub generated_at: DateTime<Local>,
    pub items: Vec<ShoppingItem>,
}

impl ShoppingList {
    /// Lines are grouped on `(name, measurement_unit)` rather than ingredient
    /// id, so two ingredient rows spelled the same way collapse into one.
    /// Items come out sorted by name, then unit.
    pub fn aggregate(
        recipes_in_cart: i64,
        lines: Vec<CartLine>,
        generated_at: DateTime<Local>,
    ) -> Result<Self, ServiceError> {
        if recipes_in_cart <= 0 {
            return Err(ServiceError::EmptyCart);
        }

        let mut totals: BTreeMap<(String, String), i64> = BTreeMap::new();
        for line in lines {
            *totals
                .entry((line.name, line.measurement_unit))
                .or_insert(0) += i64::from(line.amount);
        }

        let items = totals
            .into_iter()
            .map(|((name, measurement_unit), amount)| ShoppingItem {
                name,
                amount,
                measurement_unit,
            })
            .collect();

        Ok(Self {
            generated_at,
            items,
        })
    }

    pub fn render(&self) -> String {
        let mut document = format!(
            "{SHOPPING_LIST_HEADER} {}",
            self.generated_at.format(SHOPPING_LIST_TIME_FORMAT)
        );
        for item in &self.items {
            document.push_str(&format!(
                "\n- {}: {} {}",
                item.name, item.amount, item.measurement_unit
            ));
        }
        document
    }

    pub fn file_name(username: &str) -> String {
        format!("{username}_shopping_list.txt")
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn line(name: &str, unit: &str, amount: i32) -> CartLine {
        CartLine {
            name: name.to_string(),
            measurement_unit: unit.to_string(),
            amount,
        }
    }

    fn noon() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap()
    }

    #[test]
    fn sums_like_ingredients_across_recipes() {
        let list = ShoppingList::aggregate(
            2,
            vec![line("Sugar", "g", 100), line("Eggs", "pcs", 2), line("Sugar", "g", 50)],
            noon(),
        )
        .unwrap();

        assert_eq!(
            list.items,
            vec![
                ShoppingItem {
                    name: String::from("Eggs"),
                    amount: 2,
                    measurement_unit: String::from("pcs"),
                },
                ShoppingItem {
                    name: String::from("Sugar"),
                    amount: 150,
                    measurement_unit: String::from("g"),
                },
            ]
        );
        assert!(list.render().contains("\n- Sugar: 150 g"));
    }

    #[test]
    fn different_units_stay_apart() {
        let list = ShoppingList::aggregate(
            1,
            vec![line("Milk", "ml", 200), line("Milk", "cup", 1)],
            noon(),
        )
        .unwrap();

        assert_eq!(list.items.len(), 2);
    }

    #[test]
    fn empty_cart_is_an_error() {
        assert_eq!(
            ShoppingList::aggregate(0, vec![], noon()).unwrap_err(),
            ServiceError::EmptyCart
        );
    }

    #[test]
    fn recipes_without_lines_give_a_header_only_document() {
        let list = ShoppingList::aggregate(1, vec![], noon()).unwrap();

        assert_eq!(list.render(), "Shopping list from 01.03.2024, 12:30");
    }

    #[test]
    fn render_puts_one_item_per_line() {
        let list = ShoppingList::aggregate(
            1,
            vec![line("Flour", "g", 500), line("Salt", "pinch", 1)],
            noon(),
        )
        .unwrap();

        assert_eq!(
            list.render(),
            "Shopping list from 01.03.2024, 12:30\n- Flour: 500 g\n- Salt: 1 pinch"
        );
        assert_eq!(ShoppingList::file_name("anna"), "anna_shopping_list.txt");
    }
}
