pub mod engagement;
pub mod follows;
pub mod ingredients;
pub mod recipes;
pub mod shopping_cart;
pub mod tags;
pub mod users;
