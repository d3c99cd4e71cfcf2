//! Expression trees and their translation into the criteria model.
//!
//! Lambdas are built with [`crate::lambda!`] or by hand from [`Expr`] nodes.
//! [`project`] turns value-producing trees into projections, [`restrict`] turns
//! boolean trees into restrictions, and [`construct`] rebuilds select shapes
//! from result rows. All three consult the handler registry first.

mod ast;
mod construct;
mod criterion;
pub mod eval;
mod is;
mod projection;
mod resolver;

pub use ast::{BinaryOp, Expr, ExprKind, Lambda, MethodCall, Parameter, UnaryOp};
pub use construct::{construct, RowCursor};
pub use criterion::{comparison, restrict};
pub(crate) use criterion::compare_op;
pub use is::{Is, IsExpression, IsKind};
pub use projection::{project, project_typed};
pub use resolver::{get_root, has_constant_root, value, TranslationContext};

use crate::criteria::Criteria;
use crate::value::{DataType, Typed};

/// Marker type for the second parameter of a filter lambda
///
/// Invoking it with `(property, Is::...)` binds the predicate to the property.
pub struct WhereDelegate;

impl Typed for WhereDelegate {
    fn data_type() -> DataType {
        DataType::WhereDelegate
    }
}

/// Aggregate and projection helpers, usable inside select lambdas
pub struct Aggregate;

impl Aggregate {
    fn call(method: &str, arg: impl Into<Expr>, ty: impl FnOnce(&Expr) -> DataType) -> Expr {
        let arg = arg.into();
        let ty = ty(&arg);
        Expr::static_call(method, vec![arg], ty)
    }

    pub fn sum(value: impl Into<Expr>) -> Expr {
        Aggregate::call("sum", value, Expr::data_type)
    }

    /// Average, always computed as a decimal
    pub fn average(value: impl Into<Expr>) -> Expr {
        Aggregate::call("average", value, |_| DataType::Decimal)
    }

    pub fn min(value: impl Into<Expr>) -> Expr {
        Aggregate::call("min", value, Expr::data_type)
    }

    pub fn max(value: impl Into<Expr>) -> Expr {
        Aggregate::call("max", value, Expr::data_type)
    }

    pub fn count(value: impl Into<Expr>) -> Expr {
        Aggregate::call("count", value, |_| DataType::Long)
    }

    /// `count(*)`
    pub fn count_all() -> Expr {
        Expr::static_call("count", vec![], DataType::Long)
    }

    pub fn count_distinct(value: impl Into<Expr>) -> Expr {
        Aggregate::call("count_distinct", value, |_| DataType::Long)
    }

    pub fn group_by(value: impl Into<Expr>) -> Expr {
        Aggregate::call("group_by", value, Expr::data_type)
    }

    /// Names the property behind `value`; also accepts a literal property path
    pub fn as_(value: impl Into<Expr>) -> Expr {
        Aggregate::call("as", value, Expr::data_type)
    }

    /// A detached query used as a scalar sub-select
    pub fn subquery(query: Criteria) -> Expr {
        let ty = query
            .projections
            .as_ref()
            .and_then(|p| p.first())
            .map(|p| p.data_type())
            .unwrap_or(DataType::Unknown);
        Expr::static_call("subquery", vec![Expr::constant(query)], ty)
    }

    pub fn like(value: impl Into<Expr>, pattern: impl Into<Expr>) -> Expr {
        Expr::static_call("like", vec![value.into(), pattern.into()], DataType::Bool)
    }

    pub fn in_(value: impl Into<Expr>, values: impl Into<Expr>) -> Expr {
        Expr::static_call("in", vec![value.into(), values.into()], DataType::Bool)
    }

    pub fn between(value: impl Into<Expr>, low: impl Into<Expr>, high: impl Into<Expr>) -> Expr {
        Expr::static_call(
            "between",
            vec![value.into(), low.into(), high.into()],
            DataType::Bool,
        )
    }
}
