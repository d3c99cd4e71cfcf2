//! Procedural macros for FlowQuery
//!
//! This crate provides the `Entity` derive, which publishes the static metadata
//! (table, columns, relationships) the translator resolves property paths against.

mod attributes;
mod macros;
mod utils;

use proc_macro::TokenStream;

/// Derive macro for `Entity` - generates `flowquery::Entity` and `flowquery::Typed`
///
/// Struct attributes:
/// - `#[table_name = "users"]` (defaults to the snake_case struct name)
///
/// Field attributes:
/// - `#[primary_key]`
/// - `#[column_name = "first_name"]`
/// - `#[many_to_one]` / `#[many_to_one(column = "setting_id")]`
/// - `#[one_to_many]` / `#[one_to_many(key = "user_id")]`
/// - `#[transient]` (not mapped)
///
/// # Example
///
/// ```no_run
/// use flowquery::Entity;
///
/// #[derive(Entity)]
/// #[table_name = "users"]
/// pub struct User {
///     #[primary_key]
///     pub id: i64,
///     pub username: String,
///     #[many_to_one(column = "setting_id")]
///     pub setting: Option<Setting>,
/// }
///
/// #[derive(Entity)]
/// #[table_name = "settings"]
/// pub struct Setting {
///     #[primary_key]
///     pub id: i64,
/// }
/// ```
#[proc_macro_derive(
    Entity,
    attributes(table_name, primary_key, column_name, many_to_one, one_to_many, transient)
)]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    macros::derive_entity(input)
}
