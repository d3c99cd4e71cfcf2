use crate::criteria::Projection;
use crate::error::FlowError;
use crate::expression::{project, project_typed, Expr, TranslationContext};
use crate::handlers::{as_call, call_of, subject_of, ExpressionHandler};
use crate::value::DataType;

/// `round(x[, digits])`; with digits the argument is cast to `numeric` first
pub(super) struct RoundHandler;

impl ExpressionHandler for RoundHandler {
    fn can_project(&self, expr: &Expr, _ctx: &TranslationContext<'_>) -> bool {
        as_call(expr)
            .and_then(|call| call.subject())
            .is_some_and(Expr::references_parameters)
    }

    fn project(&self, expr: &Expr, ctx: &TranslationContext<'_>) -> Result<Projection, FlowError> {
        let call = call_of(expr)?;
        let value = project(subject_of(call)?, ctx)?;
        match call.operands().first() {
            None => Ok(Projection::function("round", DataType::Decimal, vec![value])),
            Some(digits) => Ok(Projection::function(
                "round",
                DataType::Decimal,
                vec![
                    Projection::cast(value, DataType::Decimal),
                    project_typed(digits, ctx, &DataType::Int)?,
                ],
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::{ArithmeticOp, SqlFunction};
    use crate::expression::Parameter;
    use crate::handlers::HandlerRegistry;
    use crate::query::AliasTable;
    use crate::value::Value;

    #[test]
    fn test_round_with_digits_casts() {
        let price = Expr::Parameter(Parameter::new("o", DataType::Object))
            .get_as("price", DataType::Double);
        let registry = HandlerRegistry::new();
        let aliases = AliasTable::new();
        let ctx = TranslationContext::new("o", "this", &aliases, &registry);

        let p = project(&(price.clone() * 2).round(2), &ctx).unwrap();
        let Projection::Function { function, args, .. } = p else {
            panic!("expected round");
        };
        assert_eq!(function, SqlFunction::Named("round".into()));
        let Projection::Function { function: cast, args: inner, .. } = &args[0] else {
            panic!("expected a cast");
        };
        assert_eq!(cast, &SqlFunction::Cast(DataType::Decimal));
        assert!(matches!(
            &inner[0],
            Projection::Function { function: SqlFunction::Arithmetic(ArithmeticOp::Multiply), .. }
        ));
        assert_eq!(args[1], Projection::typed_constant(Value::Int(2), DataType::Int));
    }
}
