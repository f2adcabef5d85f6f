pub mod expense;
pub mod ingredient;
pub mod product;
pub mod recipe_line;
pub mod sale;
pub mod sale_item;
pub mod shop;
pub mod stock_balance;
pub mod stock_movement;
pub mod unit;
pub mod wastage_rule;
