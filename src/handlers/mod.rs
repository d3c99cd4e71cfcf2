//! Pluggable expression handlers and the built-in method translations.

mod aggregate;
mod numeric;
mod predicate;
mod project;
mod registry;
mod string;
mod subquery;

pub use registry::{ExpressionHandler, HandlerKey, HandlerRegistry};

use std::sync::Arc;

use crate::error::FlowError;
use crate::expression::{Expr, MethodCall};

pub(crate) fn install_defaults(registry: &HandlerRegistry) {
    let method = |names: &[&str], handler: Arc<dyn ExpressionHandler>| {
        for name in names {
            registry.add_default(HandlerKey::MethodCall((*name).to_string()), Arc::clone(&handler));
        }
    };

    method(aggregate::METHODS, Arc::new(aggregate::AggregateHandler));
    method(&["count_distinct"], Arc::new(aggregate::CountDistinctHandler));
    method(&["as"], Arc::new(aggregate::AsHandler));
    method(string::LIKE_METHODS, Arc::new(string::LikeHandler));
    method(&["substring"], Arc::new(string::SubstringHandler));
    method(string::TRIM_METHODS, Arc::new(string::TrimHandler));
    method(&["round"], Arc::new(numeric::RoundHandler));
    method(&["subquery"], Arc::new(subquery::SubqueryHandler));
    method(&["project"], Arc::new(project::ProjectHandler));
    method(predicate::METHODS, Arc::new(predicate::PredicateHandler));
}

/// The method call behind `expr`, when it is one
pub(crate) fn as_call(expr: &Expr) -> Option<&MethodCall> {
    match expr {
        Expr::Call(call) => Some(call),
        _ => None,
    }
}

pub(crate) fn call_of(expr: &Expr) -> Result<&MethodCall, FlowError> {
    as_call(expr).ok_or_else(|| {
        FlowError::invalid_argument(format!("expected a method call, got {:?}", expr.kind()))
    })
}

pub(crate) fn subject_of(call: &MethodCall) -> Result<&Expr, FlowError> {
    call.subject()
        .ok_or_else(|| FlowError::argument_shape(format!("'{}' requires a subject", call.method)))
}

pub(crate) fn operand_of(call: &MethodCall, index: usize) -> Result<&Expr, FlowError> {
    call.operands().get(index).ok_or_else(|| {
        FlowError::argument_shape(format!(
            "'{}' requires at least {} argument(s)",
            call.method,
            index + 1
        ))
    })
}
