use crate::criteria::{Criterion, Projection};
use crate::error::FlowError;
use crate::expression::{construct, project, restrict, Expr, RowCursor, TranslationContext};
use crate::handlers::{as_call, call_of, operand_of, subject_of, ExpressionHandler};
use crate::value::Value;

/// `source.project(lambda)`: inlines a reusable projection
///
/// The lambda's parameter is replaced by the source expression, so it shadows
/// any join alias of the same name.
pub(super) struct ProjectHandler;

impl ProjectHandler {
    fn inline(expr: &Expr) -> Result<Expr, FlowError> {
        let call = call_of(expr)?;
        let source = subject_of(call)?;
        let Expr::Lambda(lambda) = operand_of(call, 0)? else {
            return Err(FlowError::argument_shape("'project' expects a lambda"));
        };
        let param = lambda.single_param()?;
        Ok(lambda.body().substitute(&param.name, source))
    }

    fn applies(expr: &Expr) -> bool {
        as_call(expr).is_some_and(|call| {
            call.target.is_some() && matches!(call.args.first(), Some(Expr::Lambda(_)))
        })
    }
}

impl ExpressionHandler for ProjectHandler {
    fn can_project(&self, expr: &Expr, _ctx: &TranslationContext<'_>) -> bool {
        ProjectHandler::applies(expr)
    }

    fn project(&self, expr: &Expr, ctx: &TranslationContext<'_>) -> Result<Projection, FlowError> {
        project(&ProjectHandler::inline(expr)?, ctx)
    }

    fn can_construct(&self, expr: &Expr, _ctx: &TranslationContext<'_>) -> bool {
        ProjectHandler::applies(expr)
    }

    fn construct(
        &self,
        expr: &Expr,
        ctx: &TranslationContext<'_>,
        row: &mut RowCursor<'_>,
    ) -> Result<Value, FlowError> {
        construct(&ProjectHandler::inline(expr)?, ctx, row)
    }

    fn can_restrict(&self, expr: &Expr, _ctx: &TranslationContext<'_>) -> bool {
        ProjectHandler::applies(expr)
    }

    fn restrict(&self, expr: &Expr, ctx: &TranslationContext<'_>) -> Result<Criterion, FlowError> {
        restrict(&ProjectHandler::inline(expr)?, ctx)
    }
}

#[cfg(test)]
mod tests {
    use crate::criteria::Projection;
    use crate::expression::{project, Expr, Lambda, Parameter, TranslationContext};
    use crate::handlers::HandlerRegistry;
    use crate::query::AliasTable;
    use crate::value::DataType;

    #[test]
    fn test_lambda_parameter_shadows_alias() {
        let registry = HandlerRegistry::new();
        let mut aliases = AliasTable::new();
        aliases.register("groups", "link").unwrap();
        let ctx = TranslationContext::new("u", "this", &aliases, &registry);

        let link = Expr::Parameter(Parameter::new("link", DataType::Object));
        let mapping = Lambda::new(
            vec![Parameter::new("link", DataType::Object)],
            Expr::object([("name", link.get_as("name", DataType::String))]),
        );
        let source = Expr::Parameter(Parameter::new("u", DataType::Object))
            .get_as("setting", DataType::Object);
        let e = source.project(mapping);

        let p = project(&e, &ctx).unwrap();
        assert_eq!(p, Projection::List(vec![Projection::property("setting.name")]));
    }
}
