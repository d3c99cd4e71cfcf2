//! The query facade: alias bookkeeping, ordering, selection and execution.
//!
//! [`FlowQuery`] owns the builder state and drives the expression builders
//! with a [`TranslationContext`](crate::expression::TranslationContext) rooted
//! at each lambda's first parameter.

mod alias;
mod context;
mod delayed;
mod flow_query;
mod order;
mod rebase;
mod select;

pub use alias::{AliasTable, Registration};
pub(crate) use alias::validate_path;
pub use context::QueryContext;
pub use delayed::Delayed;
pub use flow_query::{FlowQuery, QueryKind};
pub use order::{resolve_orders, NamedProjection, OrderState, OrderStatement};
pub use rebase::rebase_filter;
