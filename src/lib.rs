//! # FlowQuery
//!
//! Fluent, typed query builder that translates expression trees into a
//! criteria model and runs it against PostgreSQL.
//!
//! Lambdas are plain data ([`Expr`] trees, usually built with [`lambda!`]).
//! [`FlowQuery`] translates them eagerly into [`Criteria`], which renders to
//! SQL through SeaQuery and executes on a [`Session`].
//!
//! ```ignore
//! use flowquery::{lambda, FlowQuery, Is};
//!
//! let names: Vec<String> = FlowQuery::<User>::immediate(&session)
//!     .where_(lambda!(|u: User| u.get("id").gt(2)))?
//!     .where_is(lambda!(|u: User| u.get("name")), Is::like("a%"))?
//!     .order_by(lambda!(|u: User| u.get("name")))?
//!     .select(lambda!(|u: User| u.get("name")))?;
//! ```

// Lets `#[derive(Entity)]` expand to `::flowquery::...` inside this crate too.
extern crate self as flowquery;

pub mod config;
pub mod connection;
pub mod criteria;
pub mod entity;
pub mod error;
pub mod executor;
pub mod expression;
pub mod handlers;
mod macros;
pub mod metrics;
pub mod query;
pub mod reveal;
pub mod value;

pub use flowquery_derive::Entity;

pub use config::FlowQueryConfig;
pub use criteria::{Criteria, Criterion, JoinType, MatchMode, Order, Projection};
pub use entity::{Entity, EntityMeta, EntityRef, PropertyMeta, Relation};
pub use error::FlowError;
pub use executor::mock::MockSession;
pub use executor::{CompiledQuery, MayPostgresSession, ResultRow, Session, SessionError};
pub use expression::{Aggregate, Expr, Is, IsExpression, Lambda, Parameter, WhereDelegate};
pub use handlers::{ExpressionHandler, HandlerRegistry};
pub use query::{rebase_filter, AliasTable, Delayed, FlowQuery, QueryContext, QueryKind};
pub use reveal::{PrefixConvention, Reveal, RevealConvention};
pub use value::{Callable, DataType, Typed, Value};
