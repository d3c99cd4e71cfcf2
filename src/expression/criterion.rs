//! Expression → [`Criterion`].

use crate::criteria::{CompareOp, Criterion, Projection};
use crate::error::FlowError;
use crate::expression::eval::evaluate;
use crate::expression::projection::project;
use crate::expression::{BinaryOp, Expr, TranslationContext, UnaryOp};
use crate::value::{DataType, Value};

/// Translates a boolean expression into a restriction
pub fn restrict(expr: &Expr, ctx: &TranslationContext<'_>) -> Result<Criterion, FlowError> {
    for handler in ctx.registry.handlers_for(expr) {
        if handler.can_restrict(expr, ctx) {
            log::trace!("restricting {:?} through a registered handler", expr.kind());
            return handler.restrict(expr, ctx);
        }
    }

    match expr {
        Expr::Binary {
            op: BinaryOp::AndAlso,
            left,
            right,
            ..
        } => Ok(Criterion::and(restrict(left, ctx)?, restrict(right, ctx)?)),
        Expr::Binary {
            op: BinaryOp::OrElse,
            left,
            right,
            ..
        } => Ok(Criterion::or(restrict(left, ctx)?, restrict(right, ctx)?)),
        Expr::Binary {
            op: BinaryOp::ExclusiveOr,
            left,
            right,
            ..
        } => {
            let a = restrict(left, ctx)?;
            let b = restrict(right, ctx)?;
            Ok(Criterion::or(
                Criterion::and(a.clone(), Criterion::not(b.clone())),
                Criterion::and(b, Criterion::not(a)),
            ))
        }
        Expr::Binary { op, left, right, .. } if op.is_comparison() => {
            comparison(compare_op(*op)?, left, right, ctx)
        }
        Expr::Unary {
            op: UnaryOp::Not,
            operand,
            ..
        } => Ok(Criterion::not(restrict(operand, ctx)?)),
        Expr::Unary {
            op: UnaryOp::Convert,
            operand,
            ..
        } => restrict(operand, ctx),
        Expr::Member { .. } if ctx.is_rooted(expr) => Ok(Criterion::compare(
            CompareOp::Eq,
            Projection::property(ctx.required_property_name(expr)?),
            true,
        )),
        Expr::Call(call) if ctx.is_rooted(expr) || expr.references_parameters() => Err(
            FlowError::not_supported(format!("method '{}' has no restriction", call.method)),
        ),
        Expr::Invoke { target, args, .. } if target.data_type() == DataType::WhereDelegate => {
            where_delegate(args, ctx)
        }
        Expr::Conditional {
            test,
            if_true,
            if_false,
            ..
        } if expr.references_parameters() => {
            let test = restrict(test, ctx)?;
            Ok(Criterion::or(
                Criterion::and(test.clone(), restrict(if_true, ctx)?),
                Criterion::and(Criterion::not(test), restrict(if_false, ctx)?),
            ))
        }
        Expr::Parameter(p) => Err(FlowError::not_supported(format!(
            "parameter '{}' is not a condition",
            p.name
        ))),
        Expr::Lambda(_) | Expr::New { .. } => Err(FlowError::not_supported(format!(
            "{:?} is not a condition",
            expr.kind()
        ))),
        Expr::Binary { .. } if expr.references_parameters() => Err(FlowError::not_supported(
            "arithmetic is not a condition",
        )),
        _ => constant_criterion(expr),
    }
}

fn constant_criterion(expr: &Expr) -> Result<Criterion, FlowError> {
    match evaluate(expr)? {
        Value::Bool(b) => Ok(Criterion::constant(b)),
        Value::Null => Ok(Criterion::constant(false)),
        other => Err(FlowError::invalid_argument(format!(
            "{other:?} is not a boolean condition"
        ))),
    }
}

pub(crate) fn compare_op(op: BinaryOp) -> Result<CompareOp, FlowError> {
    Ok(match op {
        BinaryOp::Equal => CompareOp::Eq,
        BinaryOp::NotEqual => CompareOp::Ne,
        BinaryOp::GreaterThan => CompareOp::Gt,
        BinaryOp::GreaterThanOrEqual => CompareOp::Ge,
        BinaryOp::LessThan => CompareOp::Lt,
        BinaryOp::LessThanOrEqual => CompareOp::Le,
        other => {
            return Err(FlowError::not_supported(format!(
                "{other:?} is not a comparison"
            )))
        }
    })
}

fn unwrap_convert(expr: &Expr) -> &Expr {
    match expr {
        Expr::Unary {
            op: UnaryOp::Convert,
            operand,
            ..
        } => unwrap_convert(operand),
        other => other,
    }
}

/// Operands translated into SQL rather than evaluated
fn is_projected(expr: &Expr, ctx: &TranslationContext<'_>) -> bool {
    match expr {
        Expr::Member { .. } | Expr::Call(_) | Expr::Parameter(_) => ctx.is_rooted(expr),
        Expr::Binary { .. } | Expr::Conditional { .. } | Expr::Unary { .. } => {
            expr.references_parameters()
        }
        _ => false,
    }
}

/// Translates `left op right`
pub fn comparison(
    op: CompareOp,
    left: &Expr,
    right: &Expr,
    ctx: &TranslationContext<'_>,
) -> Result<Criterion, FlowError> {
    let left = unwrap_convert(left);
    let right = unwrap_convert(right);

    match (is_projected(left, ctx), is_projected(right, ctx)) {
        (true, true) => {
            let l = project(left, ctx)?;
            let r = project(right, ctx)?;
            match (l.as_property(), r.as_property()) {
                (Some(property), _) => Ok(Criterion::PropertyCompare {
                    op,
                    property: property.to_string(),
                    other: r,
                }),
                (None, Some(property)) => Ok(Criterion::PropertyCompare {
                    op: op.mirror(),
                    property: property.to_string(),
                    other: l,
                }),
                (None, None) => Ok(Criterion::ProjectionCompare {
                    op,
                    left: l,
                    right: r,
                }),
            }
        }
        (true, false) => value_comparison(op, left, right, ctx),
        (false, true) => value_comparison(op.mirror(), right, left, ctx),
        (false, false) => {
            if left.references_parameters() || right.references_parameters() {
                return Err(FlowError::not_supported(
                    "comparison between expressions that are neither rooted nor constant",
                ));
            }
            let l = evaluate(left)?;
            let r = evaluate(right)?;
            let holds = match op {
                CompareOp::Eq => l.loose_eq(&r),
                CompareOp::Ne => !l.loose_eq(&r),
                _ => l.compare(&r).is_some_and(|ordering| match op {
                    CompareOp::Gt => ordering.is_gt(),
                    CompareOp::Ge => ordering.is_ge(),
                    CompareOp::Lt => ordering.is_lt(),
                    _ => ordering.is_le(),
                }),
            };
            Ok(Criterion::constant(holds))
        }
    }
}

/// `projected op value`, the value side evaluated once
fn value_comparison(
    op: CompareOp,
    projected: &Expr,
    value: &Expr,
    ctx: &TranslationContext<'_>,
) -> Result<Criterion, FlowError> {
    if let Expr::Constant {
        value: Value::Bool(literal),
        ..
    } = value
    {
        if matches!(op, CompareOp::Eq | CompareOp::Ne) {
            let own = restrict(projected, ctx)?;
            return Ok(if *literal == (op == CompareOp::Eq) {
                own
            } else {
                Criterion::not(own)
            });
        }
    }

    let projection = project(projected, ctx)?;
    match evaluate(value)? {
        Value::Null => match op {
            CompareOp::Eq => Ok(Criterion::IsNull(projection)),
            CompareOp::Ne => Ok(Criterion::IsNotNull(projection)),
            other => Err(FlowError::invalid_argument(format!(
                "cannot compare with null using '{}'",
                other.symbol()
            ))),
        },
        Value::Query(query) => Ok(Criterion::SubqueryCompare {
            op,
            projection,
            quantifier: None,
            query,
        }),
        literal => Ok(Criterion::compare(
            op,
            projection,
            literal.coerce_to(&projected.data_type())?,
        )),
    }
}

/// `delegate(property, is)`: binds a deferred `Is` predicate to a property
fn where_delegate(args: &[Expr], ctx: &TranslationContext<'_>) -> Result<Criterion, FlowError> {
    let [property, predicate] = args else {
        return Err(FlowError::argument_shape(format!(
            "the where-delegate takes a property and a predicate, got {} argument(s)",
            args.len()
        )));
    };
    let projection = project(property, ctx)?;
    match evaluate(predicate)? {
        Value::Is(is) => is.compile_as(projection, &property.data_type()),
        other => Err(FlowError::invalid_argument(format!(
            "expected an Is predicate, got {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::{Is, Parameter};
    use crate::handlers::HandlerRegistry;
    use crate::query::AliasTable;

    fn user() -> Expr {
        Expr::Parameter(Parameter::new("u", DataType::Object))
    }

    fn id() -> Expr {
        user().get_as("id", DataType::Long)
    }

    fn active() -> Expr {
        user().get_as("active", DataType::Bool)
    }

    fn run<R>(f: impl FnOnce(&TranslationContext<'_>) -> R) -> R {
        let registry = HandlerRegistry::new();
        let aliases = AliasTable::new();
        let ctx = TranslationContext::new("u", "this", &aliases, &registry);
        f(&ctx)
    }

    #[test]
    fn test_equality_coerces_literal_to_property_type() {
        run(|ctx| {
            let c = restrict(&id().eq(2), ctx).unwrap();
            assert_eq!(
                c,
                Criterion::compare(CompareOp::Eq, Projection::property("id"), Value::Long(2))
            );
        });
    }

    #[test]
    fn test_value_on_left_flips_operator() {
        run(|ctx| {
            let a = restrict(&Expr::constant(5).lt(id()), ctx).unwrap();
            let b = restrict(&id().gt(5), ctx).unwrap();
            assert_eq!(a, b);
        });
    }

    #[test]
    fn test_boolean_literal_laws() {
        run(|ctx| {
            let own = restrict(&active(), ctx).unwrap();
            assert_eq!(restrict(&active().eq(true), ctx).unwrap(), own);
            assert_eq!(restrict(&active().eq(false), ctx).unwrap(), Criterion::not(own.clone()));
            assert_eq!(restrict(&active().ne(false), ctx).unwrap(), own);
            assert_eq!(restrict(&active().not().not(), ctx).unwrap(), own);
        });
    }

    #[test]
    fn test_null_comparisons() {
        let name = || user().get_as("name", DataType::String);
        run(|ctx| {
            assert!(matches!(
                restrict(&name().eq(Value::Null), ctx).unwrap(),
                Criterion::IsNull(_)
            ));
            assert!(matches!(
                restrict(&Expr::null(DataType::String).ne(name()), ctx).unwrap(),
                Criterion::IsNotNull(_)
            ));
            assert!(restrict(&name().gt(Value::Null), ctx).is_err());
        });
    }

    #[test]
    fn test_property_to_property() {
        let other = user().get_as("parent_id", DataType::Long);
        run(|ctx| {
            let c = restrict(&(id() + 1).lt(other.clone()), ctx).unwrap();
            let Criterion::PropertyCompare { op, property, .. } = c else {
                panic!("expected a property comparison");
            };
            assert_eq!(op, CompareOp::Gt);
            assert_eq!(property, "parent_id");
        });
    }

    #[test]
    fn test_xor_expands() {
        run(|ctx| {
            let c = restrict(&active().xor(id().eq(1)), ctx).unwrap();
            assert!(matches!(c, Criterion::Or(_, _)));
        });
    }

    #[test]
    fn test_constant_conditions_fold() {
        run(|ctx| {
            assert_eq!(
                restrict(&Expr::constant(1).lt(2), ctx).unwrap(),
                Criterion::constant(true)
            );
            assert_eq!(restrict(&Expr::constant(false), ctx).unwrap(), Criterion::constant(false));
        });
    }

    #[test]
    fn test_where_delegate() {
        let delegate = Expr::Parameter(Parameter::new("is", DataType::WhereDelegate));
        let e = delegate.invoke(vec![id(), Expr::from(Is::between(2, 3))]);
        run(|ctx| {
            let c = restrict(&e, ctx).unwrap();
            assert!(matches!(c, Criterion::Between { .. }));
        });
    }
}
