use std::fmt::{self, Display};

use serde::Serialize;

use crate::constants::SHOPPING_LIST_HEADER;

/// One consolidated purchase: every cart recipe's share of a single ingredient.
#[derive(sqlx::FromRow, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ShoppingListItem {
    pub name: String,
    pub total_amount: i64,
    pub measurement_unit: String,
}

impl Display for ShoppingListItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} {}.",
            self.name, self.total_amount, self.measurement_unit
        )
    }
}

#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ShoppingList {
    items: Vec<ShoppingListItem>,
}

impl ShoppingList {
    pub fn new(items: Vec<ShoppingListItem>) -> Self {
        Self { items }
    }

    pub fn items(&self) -> &[ShoppingListItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn render(&self) -> String {
        let lines = self
            .items
            .iter()
            .map(|item| item.to_string())
            .collect::<Vec<String>>()
            .join("\n");

        format!("{SHOPPING_LIST_HEADER}\n{lines}")
    }
}

pub fn attachment_disposition(file_name: &str) -> String {
    let file_name = file_name.replace(['"', '\\', '\r', '\n'], "_");
    format!("attachment; filename=\"{file_name}\"")
}
