use crate::criteria::Projection;
use crate::error::FlowError;
use crate::expression::{eval, Expr, TranslationContext};
use crate::handlers::{call_of, subject_of, ExpressionHandler};
use crate::value::Value;

/// `subquery(criteria)`: a scalar sub-select
pub(super) struct SubqueryHandler;

impl ExpressionHandler for SubqueryHandler {
    fn can_project(&self, _expr: &Expr, _ctx: &TranslationContext<'_>) -> bool {
        true
    }

    fn project(&self, expr: &Expr, _ctx: &TranslationContext<'_>) -> Result<Projection, FlowError> {
        let call = call_of(expr)?;
        let source = subject_of(call)?;
        if source.references_parameters() {
            return Err(FlowError::not_supported(
                "correlated sub-queries cannot be built from lambda values",
            ));
        }
        match eval::evaluate(source)? {
            Value::Query(query) => Ok(Projection::SubQuery(query)),
            other => Err(FlowError::not_supported(format!(
                "{other:?} does not expose a detached query"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::criteria::{Criteria, Projection};
    use crate::entity::{EntityMeta, EntityRef};
    use crate::expression::{project, Aggregate, Expr, TranslationContext};
    use crate::handlers::HandlerRegistry;
    use crate::query::AliasTable;
    use crate::value::DataType;

    static PLAIN: EntityMeta = EntityMeta {
        name: "Plain",
        table: "plain",
        properties: Vec::new(),
    };

    #[test]
    fn test_subquery_projection() {
        let registry = HandlerRegistry::new();
        let aliases = AliasTable::new();
        let ctx = TranslationContext::new("u", "this", &aliases, &registry);
        let mut inner = Criteria::new(EntityRef::new(&PLAIN), "sub");
        inner.set_projections(vec![Projection::RowCount]);

        let p = project(&Aggregate::subquery(inner.clone()), &ctx).unwrap();
        assert!(matches!(p, Projection::SubQuery(ref q) if **q == inner));

        let bad = Expr::static_call("subquery", vec![Expr::constant(3)], DataType::Long);
        assert!(project(&bad, &ctx).unwrap_err().is_not_supported());
    }
}
