//! Custom expression handlers registered on isolated registries.

mod common;

use std::sync::Arc;

use common::User;
use flowquery::criteria::SqlFunction;
use flowquery::expression::{project, ExprKind, TranslationContext};
use flowquery::{
    lambda, Criterion, DataType, Expr, ExpressionHandler, FlowError, FlowQuery, HandlerRegistry,
    MockSession, Projection, QueryContext, Value,
};

/// `x.shout()` becomes `upper(x)`
struct Shout;

impl ExpressionHandler for Shout {
    fn can_project(&self, expr: &Expr, ctx: &TranslationContext<'_>) -> bool {
        matches!(expr, Expr::Call(call) if call.subject().is_some_and(|s| ctx.is_rooted(s)))
    }

    fn project(&self, expr: &Expr, ctx: &TranslationContext<'_>) -> Result<Projection, FlowError> {
        let Expr::Call(call) = expr else {
            return Err(FlowError::not_supported("shout expects a method call"));
        };
        let subject = call
            .subject()
            .ok_or_else(|| FlowError::invalid_argument("shout needs a subject"))?;
        Ok(Projection::function("upper", DataType::String, vec![project(subject, ctx)?]))
    }
}

/// Restricts every equality to `FALSE`
struct NeverEqual;

impl ExpressionHandler for NeverEqual {
    fn can_restrict(&self, _expr: &Expr, _ctx: &TranslationContext<'_>) -> bool {
        true
    }

    fn restrict(
        &self,
        _expr: &Expr,
        _ctx: &TranslationContext<'_>,
    ) -> Result<Criterion, FlowError> {
        Ok(Criterion::constant(false))
    }
}

fn shout(value: Expr) -> Expr {
    value.method("shout", vec![], DataType::String)
}

#[test]
fn test_method_call_handler_on_isolated_registry() {
    let registry = Arc::new(HandlerRegistry::new());
    assert!(registry.add_method_call_handler("shout", Arc::new(Shout), false));
    assert!(!registry.add_method_call_handler("shout", Arc::new(Shout), false));
    assert!(registry.add_method_call_handler("shout", Arc::new(Shout), true));

    let context = QueryContext::new().with_registry(registry.clone());
    let criteria = FlowQuery::<User>::detached()
        .with_context(context)
        .build_select(&lambda!(|u: User| shout(u.get("username"))))
        .unwrap();
    let projections = criteria.projections.unwrap();
    assert!(matches!(
        projections.as_slice(),
        [Projection::Function { function: SqlFunction::Named(name), .. }] if name == "upper"
    ));

    let global = FlowQuery::<User>::detached()
        .build_select(&lambda!(|u: User| shout(u.get("username"))));
    assert!(matches!(global, Err(FlowError::NotSupported(_))));

    registry.clear_handlers();
    assert!(registry.method_call_handlers("shout").is_empty());
}

#[test]
fn test_custom_kind_handler_shadows_builtin_translation() {
    let registry = Arc::new(HandlerRegistry::new());
    assert!(registry.add_handler(ExprKind::Equal, Arc::new(NeverEqual), false));

    let criteria = FlowQuery::<User>::detached()
        .with_context(QueryContext::new().with_registry(registry))
        .where_(lambda!(|u: User| u.get("id").eq(1)))
        .unwrap()
        .build_entities()
        .unwrap();
    assert_eq!(criteria.restrictions, vec![Criterion::constant(false)]);

    let session = MockSession::new();
    session.push_values(vec![vec![Value::Long(0)]]);
    let count = FlowQuery::<User>::immediate(&session)
        .where_(lambda!(|u: User| u.get("id").eq(1)))
        .unwrap()
        .count()
        .unwrap();
    assert_eq!(count, 0);
    let sql = session.last_sql().unwrap();
    assert!(sql.contains(r#""this"."id" = $1"#), "{sql}");
}

#[test]
fn test_custom_root_alias() {
    let criteria = FlowQuery::<User>::detached()
        .with_context(QueryContext::new().with_root_alias("usr"))
        .where_(lambda!(|u: User| u.get("id").gt(3)))
        .unwrap()
        .build_entities()
        .unwrap();
    let (sql, _) = criteria.to_sql().unwrap();
    assert!(sql.contains(r#"FROM "users" AS "usr""#), "{sql}");
    assert!(sql.contains(r#""usr"."id" > $1"#), "{sql}");
}
