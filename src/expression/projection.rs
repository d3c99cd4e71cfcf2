//! Expression → [`Projection`].

use crate::criteria::{ArithmeticOp, Projection, SqlFunction};
use crate::error::FlowError;
use crate::expression::criterion::restrict;
use crate::expression::eval::evaluate;
use crate::expression::{BinaryOp, Expr, TranslationContext, UnaryOp};
use crate::value::{DataType, Value};

/// Translates a value-producing expression
///
/// Registered handlers get the first chance; built-in structural rules apply
/// when none accepts the node.
pub fn project(expr: &Expr, ctx: &TranslationContext<'_>) -> Result<Projection, FlowError> {
    for handler in ctx.registry.handlers_for(expr) {
        if handler.can_project(expr, ctx) {
            log::trace!("projecting {:?} through a registered handler", expr.kind());
            return handler.project(expr, ctx);
        }
    }

    match expr {
        Expr::Binary { op, .. } if op.is_comparison() || op.is_logical() => {
            Ok(Projection::boolean(restrict(expr, ctx)?))
        }
        Expr::Unary {
            op: UnaryOp::Not, ..
        } => Ok(Projection::boolean(restrict(expr, ctx)?)),
        Expr::Binary {
            op: BinaryOp::Add,
            ty: DataType::String,
            ..
        } => concat(expr, ctx),
        Expr::Binary { ty, .. } if !expr.references_parameters() => constant(expr, ty),
        Expr::Binary {
            op,
            left,
            right,
            ty,
        } => {
            let ty = match left.data_type() {
                DataType::Unknown => ty.clone(),
                left_ty => left_ty,
            };
            let l = project_typed(left, ctx, &ty)?;
            let r = project_typed(right, ctx, &ty)?;
            Ok(Projection::arithmetic(arithmetic_op(*op)?, l, r, ty))
        }
        Expr::Unary {
            op: UnaryOp::Negate,
            operand,
            ty,
        } => {
            if !operand.references_parameters() {
                return constant(expr, ty);
            }
            Ok(Projection::Function {
                function: SqlFunction::Negate,
                ty: ty.clone(),
                args: vec![project(operand, ctx)?],
            })
        }
        Expr::Unary {
            op: UnaryOp::Convert,
            operand,
            ..
        } => project(operand, ctx),
        Expr::Conditional {
            test,
            if_true,
            if_false,
            ty,
        } => {
            if !expr.references_parameters() {
                return constant(expr, ty);
            }
            Ok(Projection::conditional(
                restrict(test, ctx)?,
                project_typed(if_true, ctx, ty)?,
                project_typed(if_false, ctx, ty)?,
            ))
        }
        Expr::Member { ty, .. } => {
            if ctx.is_rooted(expr) {
                Ok(Projection::property(ctx.required_property_name(expr)?))
            } else {
                constant(expr, ty)
            }
        }
        Expr::Parameter(p) => Err(FlowError::not_supported(format!(
            "'{}' cannot be projected as a value; select its properties",
            p.name
        ))),
        Expr::Constant { value, ty } => Ok(typed_constant(value.clone(), ty)),
        Expr::Default(ty) => Ok(typed_constant(ty.default_value(), ty)),
        Expr::New { members, .. } => members
            .iter()
            .map(|(_, member)| project(member, ctx))
            .collect::<Result<Vec<_>, _>>()
            .map(Projection::List),
        Expr::Call(call) => {
            if ctx.is_rooted(expr) || expr.references_parameters() {
                Err(FlowError::not_supported(format!(
                    "method '{}' has no projection",
                    call.method
                )))
            } else {
                constant(expr, &call.ty)
            }
        }
        Expr::Invoke { ty, .. } => {
            if expr.references_parameters() {
                Err(FlowError::not_supported("invocation over query values"))
            } else {
                constant(expr, ty)
            }
        }
        Expr::Lambda(_) => Err(FlowError::not_supported("a lambda cannot be projected")),
    }
}

/// Projects `expr`, coercing a numeric constant result to `ty`
pub fn project_typed(
    expr: &Expr,
    ctx: &TranslationContext<'_>,
    ty: &DataType,
) -> Result<Projection, FlowError> {
    match project(expr, ctx)? {
        Projection::Constant { value, ty: own }
            if ty.is_numeric() && value.is_numeric() && &own != ty =>
        {
            Ok(Projection::typed_constant(value.convert_to(ty)?, ty.clone()))
        }
        other => Ok(other),
    }
}

fn typed_constant(value: Value, ty: &DataType) -> Projection {
    let ty = if ty.sql_name().is_some() {
        ty.clone()
    } else {
        value.data_type()
    };
    Projection::typed_constant(value, ty)
}

fn constant(expr: &Expr, ty: &DataType) -> Result<Projection, FlowError> {
    let value = evaluate(expr)?;
    if let Value::Query(query) = value {
        return Ok(Projection::SubQuery(query));
    }
    Ok(typed_constant(value, ty))
}

fn arithmetic_op(op: BinaryOp) -> Result<ArithmeticOp, FlowError> {
    Ok(match op {
        BinaryOp::Add => ArithmeticOp::Add,
        BinaryOp::Subtract => ArithmeticOp::Subtract,
        BinaryOp::Multiply => ArithmeticOp::Multiply,
        BinaryOp::Divide => ArithmeticOp::Divide,
        BinaryOp::Modulo => ArithmeticOp::Modulo,
        other => {
            return Err(FlowError::not_supported(format!(
                "{other:?} is not an arithmetic operator"
            )))
        }
    })
}

/// Flattens a string `+` chain into one `concat(...)` call
fn concat(expr: &Expr, ctx: &TranslationContext<'_>) -> Result<Projection, FlowError> {
    if !expr.references_parameters() {
        return constant(expr, &DataType::String);
    }
    let mut operands = Vec::new();
    collect_concat_operands(expr, &mut operands);
    let args = operands
        .into_iter()
        .map(|operand| project(operand, ctx))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Projection::function("concat", DataType::String, args))
}

fn collect_concat_operands<'e>(expr: &'e Expr, out: &mut Vec<&'e Expr>) {
    match expr {
        Expr::Binary {
            op: BinaryOp::Add,
            left,
            right,
            ty: DataType::String,
        } => {
            collect_concat_operands(left, out);
            collect_concat_operands(right, out);
        }
        other => out.push(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::Criterion;
    use crate::expression::Parameter;
    use crate::handlers::HandlerRegistry;
    use crate::query::AliasTable;

    fn person() -> Expr {
        Expr::Parameter(Parameter::new("p", DataType::Object))
    }

    fn run<R>(f: impl FnOnce(&TranslationContext<'_>) -> R) -> R {
        let registry = HandlerRegistry::new();
        let aliases = AliasTable::new();
        let ctx = TranslationContext::new("p", "this", &aliases, &registry);
        f(&ctx)
    }

    #[test]
    fn test_rooted_member_is_property() {
        let e = person().get_as("name", DataType::String);
        run(|ctx| assert_eq!(project(&e, ctx).unwrap(), Projection::property("name")));
    }

    #[test]
    fn test_string_chain_is_single_concat() {
        let name = |n: &str| person().get_as(n, DataType::String);
        let e = name("a") + " " + name("b") + "-" + name("c");
        run(|ctx| {
            let Projection::Function { function, args, .. } = project(&e, ctx).unwrap() else {
                panic!("expected a function projection");
            };
            assert_eq!(function, SqlFunction::Named("concat".into()));
            assert_eq!(args.len(), 5);
        });
    }

    #[test]
    fn test_arithmetic_coerces_constant_to_left_type() {
        let e = person().get_as("id", DataType::Long) + 1;
        run(|ctx| {
            let Projection::Function { args, ty, .. } = project(&e, ctx).unwrap() else {
                panic!("expected arithmetic");
            };
            assert_eq!(ty, DataType::Long);
            assert_eq!(args[1], Projection::typed_constant(Value::Long(1), DataType::Long));
        });
    }

    #[test]
    fn test_comparison_becomes_boolean_projection() {
        let e = person().get_as("age", DataType::Int).gt(18);
        run(|ctx| {
            let Projection::Conditional { test, .. } = project(&e, ctx).unwrap() else {
                panic!("expected conditional");
            };
            assert!(matches!(*test, Criterion::Compare { .. }));
        });
    }

    #[test]
    fn test_closed_subtrees_fold() {
        let e = Expr::constant(2) * Expr::constant(21);
        run(|ctx| {
            assert_eq!(
                project(&e, ctx).unwrap(),
                Projection::typed_constant(Value::Int(42), DataType::Int)
            )
        });
    }

    #[test]
    fn test_unknown_rooted_method_is_not_supported() {
        let e = person()
            .get_as("name", DataType::String)
            .method("soundex", vec![], DataType::String);
        run(|ctx| assert!(project(&e, ctx).unwrap_err().is_not_supported()));
    }
}
