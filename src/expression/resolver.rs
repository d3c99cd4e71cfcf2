//! Root and property-path resolution.

use crate::error::FlowError;
use crate::expression::eval;
use crate::expression::{Expr, Parameter, UnaryOp};
use crate::handlers::HandlerRegistry;
use crate::query::AliasTable;
use crate::value::Value;

/// Everything a builder needs to translate one lambda body
#[derive(Clone, Copy)]
pub struct TranslationContext<'a> {
    /// Name of the parameter whose paths are relative to the query root
    pub root: &'a str,
    /// The query's root alias, also accepted as a root reference
    pub root_alias: &'a str,
    pub aliases: &'a AliasTable,
    pub registry: &'a HandlerRegistry,
}

impl<'a> TranslationContext<'a> {
    pub fn new(
        root: &'a str,
        root_alias: &'a str,
        aliases: &'a AliasTable,
        registry: &'a HandlerRegistry,
    ) -> Self {
        TranslationContext {
            root,
            root_alias,
            aliases,
            registry,
        }
    }

    fn is_root_name(&self, name: &str) -> bool {
        name == self.root || name == self.root_alias
    }

    /// Whether `expr` bottoms out at the root parameter or a join alias
    pub fn is_rooted(&self, expr: &Expr) -> bool {
        get_root(expr)
            .is_some_and(|p| self.is_root_name(&p.name) || self.aliases.contains_alias(&p.name))
    }

    /// Dotted column path of a rooted member chain
    ///
    /// Paths under a join alias carry the alias as first segment.
    ///
    /// # Errors
    ///
    /// - `InvalidOperation` when the chain ends at a parameter that is neither root nor alias
    /// - `NotSupported` for nodes that cannot be part of a path
    pub fn property_name(&self, expr: &Expr) -> Result<String, FlowError> {
        match expr {
            Expr::Parameter(p) if self.is_root_name(&p.name) => Ok(String::new()),
            Expr::Parameter(p) if self.aliases.contains_alias(&p.name) => Ok(p.name.clone()),
            Expr::Parameter(p) => Err(FlowError::invalid_operation(format!(
                "'{}' is neither the query root nor a joined alias",
                p.name
            ))),
            Expr::Member { target, name, .. } => {
                let prefix = self.property_name(target)?;
                if prefix.is_empty() {
                    Ok(name.clone())
                } else {
                    Ok(format!("{prefix}.{name}"))
                }
            }
            Expr::Unary {
                op: UnaryOp::Convert,
                operand,
                ..
            } => self.property_name(operand),
            Expr::Call(call) if call.method == "as" => match call.subject() {
                Some(subject) => self.property_name(subject),
                None => Err(FlowError::invalid_argument("'as' requires an argument")),
            },
            other => Err(FlowError::not_supported(format!(
                "{:?} node cannot name a property",
                other.kind()
            ))),
        }
    }

    /// Non-empty property path, for contexts that need a column
    pub fn required_property_name(&self, expr: &Expr) -> Result<String, FlowError> {
        let path = self.property_name(expr)?;
        if path.is_empty() {
            return Err(FlowError::invalid_operation(
                "the query root itself is not a property",
            ));
        }
        Ok(path)
    }
}

/// The parameter a member/method-call chain starts from
pub fn get_root(expr: &Expr) -> Option<&Parameter> {
    match expr {
        Expr::Parameter(p) => Some(p),
        Expr::Member { target, .. } => get_root(target),
        Expr::Call(call) => call.subject().and_then(get_root),
        Expr::Unary {
            op: UnaryOp::Convert,
            operand,
            ..
        } => get_root(operand),
        _ => None,
    }
}

/// True when the chain has no parameter root and can be evaluated
pub fn has_constant_root(expr: &Expr) -> bool {
    get_root(expr).is_none() && !expr.references_parameters()
}

/// Evaluates a closed sub-tree
pub fn value(expr: &Expr) -> Result<Value, FlowError> {
    eval::evaluate(expr)
}
