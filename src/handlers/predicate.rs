use crate::criteria::{CompareOp, Criterion, Projection};
use crate::error::FlowError;
use crate::expression::{comparison, eval, project, Expr, Is, TranslationContext};
use crate::handlers::{as_call, call_of, operand_of, subject_of, ExpressionHandler};
use crate::value::Value;

pub(super) const METHODS: &[&str] = &[
    "in",
    "is_in",
    "between",
    "is_between",
    "is_equal_to",
    "is_greater_than",
    "is_greater_than_or_equal_to",
    "is_less_than",
    "is_less_than_or_equal_to",
    "is_null",
    "is_not_null",
];

/// Predicate helpers callable on any projected value
pub(super) struct PredicateHandler;

impl ExpressionHandler for PredicateHandler {
    fn can_project(&self, expr: &Expr, ctx: &TranslationContext<'_>) -> bool {
        self.can_restrict(expr, ctx)
    }

    fn project(&self, expr: &Expr, ctx: &TranslationContext<'_>) -> Result<Projection, FlowError> {
        Ok(Projection::boolean(self.restrict(expr, ctx)?))
    }

    fn can_restrict(&self, expr: &Expr, _ctx: &TranslationContext<'_>) -> bool {
        as_call(expr)
            .and_then(|call| call.subject())
            .is_some_and(Expr::references_parameters)
    }

    fn restrict(&self, expr: &Expr, ctx: &TranslationContext<'_>) -> Result<Criterion, FlowError> {
        let call = call_of(expr)?;
        let subject = subject_of(call)?;
        let ty = subject.data_type();
        let value_at = |index: usize| -> Result<Value, FlowError> {
            eval::evaluate(operand_of(call, index)?)?.coerce_to(&ty)
        };

        let compare = |op: CompareOp| -> Result<Criterion, FlowError> {
            comparison(op, subject, operand_of(call, 0)?, ctx)
        };

        match call.method.as_str() {
            "in" | "is_in" => Is::in_values(value_at(0)?).compile(project(subject, ctx)?),
            "between" | "is_between" => {
                Is::between(value_at(0)?, value_at(1)?).compile(project(subject, ctx)?)
            }
            "is_equal_to" => compare(CompareOp::Eq),
            "is_greater_than" => compare(CompareOp::Gt),
            "is_greater_than_or_equal_to" => compare(CompareOp::Ge),
            "is_less_than" => compare(CompareOp::Lt),
            "is_less_than_or_equal_to" => compare(CompareOp::Le),
            "is_null" => Ok(Criterion::IsNull(project(subject, ctx)?)),
            "is_not_null" => Ok(Criterion::IsNotNull(project(subject, ctx)?)),
            other => Err(FlowError::not_supported(format!("predicate '{other}'"))),
        }
    }
}
