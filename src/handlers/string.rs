use crate::criteria::{ArithmeticOp, Criterion, MatchMode, Projection};
use crate::error::FlowError;
use crate::expression::{eval, project, project_typed, Expr, TranslationContext};
use crate::handlers::{as_call, call_of, operand_of, subject_of, ExpressionHandler};
use crate::value::{DataType, Value};

pub(super) const LIKE_METHODS: &[&str] =
    &["contains", "starts_with", "ends_with", "like", "is_like"];
pub(super) const TRIM_METHODS: &[&str] = &["trim", "trim_start", "trim_end"];

fn match_mode(method: &str) -> MatchMode {
    match method {
        "contains" => MatchMode::Anywhere,
        "starts_with" => MatchMode::Start,
        "ends_with" => MatchMode::End,
        _ => MatchMode::Exact,
    }
}

fn rooted_subject(expr: &Expr, ctx: &TranslationContext<'_>) -> bool {
    as_call(expr)
        .and_then(|call| call.subject())
        .is_some_and(|subject| ctx.is_rooted(subject))
}

/// `list.contains(x.prop)` with a closed list
fn is_membership(expr: &Expr, ctx: &TranslationContext<'_>) -> bool {
    let Some(call) = as_call(expr) else {
        return false;
    };
    call.method == "contains"
        && call.subject().is_some_and(|s| !s.references_parameters())
        && call.operands().first().is_some_and(|arg| ctx.is_rooted(arg))
}

/// `contains`, `starts_with`, `ends_with`, `like`, `is_like`
pub(super) struct LikeHandler;

impl ExpressionHandler for LikeHandler {
    fn can_project(&self, expr: &Expr, ctx: &TranslationContext<'_>) -> bool {
        self.can_restrict(expr, ctx)
    }

    fn project(&self, expr: &Expr, ctx: &TranslationContext<'_>) -> Result<Projection, FlowError> {
        Ok(Projection::boolean(self.restrict(expr, ctx)?))
    }

    fn can_restrict(&self, expr: &Expr, ctx: &TranslationContext<'_>) -> bool {
        rooted_subject(expr, ctx) || is_membership(expr, ctx)
    }

    fn restrict(&self, expr: &Expr, ctx: &TranslationContext<'_>) -> Result<Criterion, FlowError> {
        let call = call_of(expr)?;
        let subject = subject_of(call)?;
        let argument = operand_of(call, 0)?;

        if is_membership(expr, ctx) {
            let values = match eval::evaluate(subject)?.coerce_to(&argument.data_type())? {
                Value::List(items) => items,
                other => {
                    return Err(FlowError::invalid_argument(format!(
                        "'contains' membership needs a list, got {other:?}"
                    )))
                }
            };
            return Ok(Criterion::In {
                projection: project(argument, ctx)?,
                values,
            });
        }

        let pattern = match eval::evaluate(argument)? {
            Value::String(s) => s,
            other => {
                return Err(FlowError::invalid_argument(format!(
                    "'{}' expects a string pattern, got {other:?}",
                    call.method
                )))
            }
        };
        Ok(Criterion::Like {
            projection: project(subject, ctx)?,
            pattern,
            mode: match_mode(&call.method),
        })
    }
}

/// Zero-based `substring(start[, length])`, rendered with SQL's one-based start
pub(super) struct SubstringHandler;

impl ExpressionHandler for SubstringHandler {
    fn can_project(&self, expr: &Expr, ctx: &TranslationContext<'_>) -> bool {
        rooted_subject(expr, ctx)
    }

    fn project(&self, expr: &Expr, ctx: &TranslationContext<'_>) -> Result<Projection, FlowError> {
        let call = call_of(expr)?;
        let text = project(subject_of(call)?, ctx)?;
        let start = operand_of(call, 0)?;
        let start = if start.references_parameters() {
            Projection::arithmetic(
                ArithmeticOp::Add,
                project_typed(start, ctx, &DataType::Int)?,
                Projection::typed_constant(Value::Int(1), DataType::Int),
                DataType::Int,
            )
        } else {
            let zero_based = eval::evaluate(start)?
                .as_i64()
                .ok_or_else(|| FlowError::invalid_argument("substring start must be an integer"))?;
            let one_based = i32::try_from(zero_based + 1)
                .map_err(|_| FlowError::invalid_argument("substring start out of range"))?;
            Projection::typed_constant(Value::Int(one_based), DataType::Int)
        };

        let mut args = vec![text, start];
        if let Some(length) = call.operands().get(1) {
            args.push(project_typed(length, ctx, &DataType::Int)?);
        }
        Ok(Projection::function("substring", DataType::String, args))
    }
}

/// `trim` is `ltrim(rtrim(x))`
pub(super) struct TrimHandler;

impl ExpressionHandler for TrimHandler {
    fn can_project(&self, expr: &Expr, ctx: &TranslationContext<'_>) -> bool {
        rooted_subject(expr, ctx)
    }

    fn project(&self, expr: &Expr, ctx: &TranslationContext<'_>) -> Result<Projection, FlowError> {
        let call = call_of(expr)?;
        let text = project(subject_of(call)?, ctx)?;
        let ltrim = |p| Projection::function("ltrim", DataType::String, vec![p]);
        let rtrim = |p| Projection::function("rtrim", DataType::String, vec![p]);
        Ok(match call.method.as_str() {
            "trim_start" => ltrim(text),
            "trim_end" => rtrim(text),
            _ => ltrim(rtrim(text)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::SqlFunction;
    use crate::expression::{restrict, Aggregate, Parameter};
    use crate::handlers::HandlerRegistry;
    use crate::query::AliasTable;

    fn user() -> Expr {
        Expr::Parameter(Parameter::new("u", DataType::Object))
    }

    fn first_name() -> Expr {
        user().get_as("first_name", DataType::String)
    }

    fn run<R>(f: impl FnOnce(&TranslationContext<'_>) -> R) -> R {
        let registry = HandlerRegistry::new();
        let aliases = AliasTable::new();
        let ctx = TranslationContext::new("u", "this", &aliases, &registry);
        f(&ctx)
    }

    #[test]
    fn test_like_modes() {
        run(|ctx| {
            let c = restrict(&first_name().starts_with("Jo"), ctx).unwrap();
            assert_eq!(
                c,
                Criterion::Like {
                    projection: Projection::property("first_name"),
                    pattern: "Jo".into(),
                    mode: MatchMode::Start,
                }
            );
            let c = restrict(&Aggregate::like(first_name(), "J_n%"), ctx).unwrap();
            assert!(matches!(c, Criterion::Like { mode: MatchMode::Exact, .. }));
        });
    }

    #[test]
    fn test_list_contains_is_membership() {
        run(|ctx| {
            let ids = Expr::constant(vec![1i64, 2, 3]);
            let c = restrict(&ids.contains(user().get_as("id", DataType::Long)), ctx).unwrap();
            assert!(matches!(c, Criterion::In { ref values, .. } if values.len() == 3));
        });
    }

    #[test]
    fn test_initials_concat() {
        let last = user().get_as("last_name", DataType::String);
        let e = first_name().substring(0, 1) + last.substring(0, 1);
        run(|ctx| {
            let Projection::Function { function, args, .. } = project(&e, ctx).unwrap() else {
                panic!("expected concat");
            };
            assert_eq!(function, SqlFunction::Named("concat".into()));
            assert_eq!(args.len(), 2);
            for arg in args {
                let Projection::Function { function, args, .. } = arg else {
                    panic!("expected substring");
                };
                assert_eq!(function, SqlFunction::Named("substring".into()));
                assert_eq!(args[1], Projection::typed_constant(Value::Int(1), DataType::Int));
                assert_eq!(args[2], Projection::typed_constant(Value::Int(1), DataType::Int));
            }
        });
    }

    #[test]
    fn test_trim_composes() {
        run(|ctx| {
            let p = project(&first_name().trim(), ctx).unwrap();
            let Projection::Function { function, args, .. } = p else {
                panic!("expected ltrim");
            };
            assert_eq!(function, SqlFunction::Named("ltrim".into()));
            assert!(matches!(
                &args[0],
                Projection::Function { function: SqlFunction::Named(n), .. } if n == "rtrim"
            ));
        });
    }

    #[test]
    fn test_closed_string_call_folds() {
        run(|ctx| {
            let c = restrict(&Expr::constant("abc").contains("b"), ctx).unwrap();
            assert_eq!(c, Criterion::constant(true));
        });
    }
}
