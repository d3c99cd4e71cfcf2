use crate::criteria::{AggregateFunction, Projection};
use crate::error::FlowError;
use crate::expression::{eval, project, Expr, TranslationContext};
use crate::handlers::{call_of, subject_of, ExpressionHandler};
use crate::query::validate_path;
use crate::value::{DataType, Value};

pub(super) const METHODS: &[&str] = &["average", "sum", "min", "max", "count", "group_by"];

/// `sum`, `average`, `min`, `max`, `count` and `group_by`
pub(super) struct AggregateHandler;

impl ExpressionHandler for AggregateHandler {
    fn can_project(&self, expr: &Expr, _ctx: &TranslationContext<'_>) -> bool {
        matches!(expr, Expr::Call(call) if call.target.is_none())
    }

    fn project(&self, expr: &Expr, ctx: &TranslationContext<'_>) -> Result<Projection, FlowError> {
        let call = call_of(expr)?;
        if call.method == "count" && call.args.is_empty() {
            return Ok(Projection::RowCount);
        }
        let inner = project(subject_of(call)?, ctx)?;
        Ok(match call.method.as_str() {
            "average" => Projection::cast(
                Projection::aggregate(AggregateFunction::Avg, inner),
                DataType::Decimal,
            ),
            "sum" => Projection::aggregate(AggregateFunction::Sum, inner),
            "min" => Projection::aggregate(AggregateFunction::Min, inner),
            "max" => Projection::aggregate(AggregateFunction::Max, inner),
            "count" => Projection::aggregate(AggregateFunction::Count, inner),
            "group_by" => Projection::group_by(inner),
            other => return Err(FlowError::not_supported(format!("aggregate '{other}'"))),
        })
    }
}

/// `count_distinct(x.path)` counts distinct values of the resolved path
pub(super) struct CountDistinctHandler;

impl ExpressionHandler for CountDistinctHandler {
    fn can_project(&self, _expr: &Expr, _ctx: &TranslationContext<'_>) -> bool {
        true
    }

    fn project(&self, expr: &Expr, ctx: &TranslationContext<'_>) -> Result<Projection, FlowError> {
        let call = call_of(expr)?;
        let path = ctx.required_property_name(subject_of(call)?)?;
        Ok(Projection::CountDistinct(path))
    }
}

/// `as(x.path)` or `as("path")`: a bare property
pub(super) struct AsHandler;

impl ExpressionHandler for AsHandler {
    fn can_project(&self, _expr: &Expr, _ctx: &TranslationContext<'_>) -> bool {
        true
    }

    fn project(&self, expr: &Expr, ctx: &TranslationContext<'_>) -> Result<Projection, FlowError> {
        let call = call_of(expr)?;
        let subject = subject_of(call)?;
        if ctx.is_rooted(subject) {
            return Ok(Projection::property(ctx.required_property_name(subject)?));
        }
        match eval::evaluate(subject)? {
            Value::String(path) => {
                validate_path(&path)?;
                Ok(Projection::property(path))
            }
            other => Err(FlowError::invalid_argument(format!(
                "'as' expects a property or a property path, got {other:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::criteria::{AggregateFunction, Projection, SqlFunction};
    use crate::expression::{project, Aggregate, Expr, Parameter, TranslationContext};
    use crate::handlers::HandlerRegistry;
    use crate::query::AliasTable;
    use crate::value::DataType;

    fn age() -> Expr {
        Expr::Parameter(Parameter::new("u", DataType::Object)).get_as("age", DataType::Int)
    }

    fn run<R>(f: impl FnOnce(&TranslationContext<'_>) -> R) -> R {
        let registry = HandlerRegistry::new();
        let aliases = AliasTable::new();
        let ctx = TranslationContext::new("u", "this", &aliases, &registry);
        f(&ctx)
    }

    #[test]
    fn test_average_is_cast_to_decimal() {
        run(|ctx| {
            let p = project(&Aggregate::average(age()), ctx).unwrap();
            let Projection::Function { function, args, .. } = p else {
                panic!("expected a cast");
            };
            assert_eq!(function, SqlFunction::Cast(DataType::Decimal));
            assert_eq!(
                args[0],
                Projection::aggregate(AggregateFunction::Avg, Projection::property("age"))
            );
        });
    }

    #[test]
    fn test_count_variants() {
        run(|ctx| {
            assert_eq!(project(&Aggregate::count_all(), ctx).unwrap(), Projection::RowCount);
            assert_eq!(
                project(&Aggregate::count_distinct(age()), ctx).unwrap(),
                Projection::CountDistinct("age".into())
            );
        });
    }

    #[test]
    fn test_as_accepts_paths() {
        run(|ctx| {
            assert_eq!(project(&Aggregate::as_(age()), ctx).unwrap(), Projection::property("age"));
            assert_eq!(
                project(&Aggregate::as_("setting.name"), ctx).unwrap(),
                Projection::property("setting.name")
            );
            assert!(project(&Aggregate::as_("not a path"), ctx).is_err());
        });
    }
}
