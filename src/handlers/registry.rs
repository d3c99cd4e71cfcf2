use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use once_cell::sync::Lazy;

use crate::criteria::{Criterion, Projection};
use crate::error::FlowError;
use crate::expression::{Expr, ExprKind, RowCursor, TranslationContext};
use crate::value::Value;

/// Custom translation for a node kind or a named method call
///
/// Every capability defaults to "not handled"; implement the pairs you need.
pub trait ExpressionHandler: Send + Sync {
    fn can_project(&self, _expr: &Expr, _ctx: &TranslationContext<'_>) -> bool {
        false
    }

    fn project(&self, expr: &Expr, _ctx: &TranslationContext<'_>) -> Result<Projection, FlowError> {
        Err(FlowError::not_supported(format!(
            "{:?} cannot be projected by this handler",
            expr.kind()
        )))
    }

    fn can_construct(&self, _expr: &Expr, _ctx: &TranslationContext<'_>) -> bool {
        false
    }

    fn construct(
        &self,
        expr: &Expr,
        _ctx: &TranslationContext<'_>,
        _row: &mut RowCursor<'_>,
    ) -> Result<Value, FlowError> {
        Err(FlowError::not_supported(format!(
            "{:?} cannot be constructed by this handler",
            expr.kind()
        )))
    }

    fn can_restrict(&self, _expr: &Expr, _ctx: &TranslationContext<'_>) -> bool {
        false
    }

    fn restrict(&self, expr: &Expr, _ctx: &TranslationContext<'_>) -> Result<Criterion, FlowError> {
        Err(FlowError::not_supported(format!(
            "{:?} cannot be restricted by this handler",
            expr.kind()
        )))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HandlerKey {
    Kind(ExprKind),
    MethodCall(String),
}

#[derive(Default)]
struct Tiers {
    custom: HashMap<HandlerKey, Arc<dyn ExpressionHandler>>,
    defaults: HashMap<HandlerKey, Vec<Arc<dyn ExpressionHandler>>>,
}

/// Two-tier handler lookup: custom registrations shadow the built-ins
pub struct HandlerRegistry {
    tiers: RwLock<Tiers>,
}

static GLOBAL: Lazy<Arc<HandlerRegistry>> = Lazy::new(|| Arc::new(HandlerRegistry::new()));

impl HandlerRegistry {
    /// A registry with the built-in handlers installed
    pub fn new() -> Self {
        let registry = HandlerRegistry::empty();
        super::install_defaults(&registry);
        registry
    }

    /// A registry with no handlers at all
    pub fn empty() -> Self {
        HandlerRegistry {
            tiers: RwLock::new(Tiers::default()),
        }
    }

    /// The process-wide registry
    pub fn global() -> Arc<HandlerRegistry> {
        Arc::clone(&GLOBAL)
    }

    fn read(&self) -> RwLockReadGuard<'_, Tiers> {
        self.tiers.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tiers> {
        self.tiers.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn add_default(&self, key: HandlerKey, handler: Arc<dyn ExpressionHandler>) {
        self.write().defaults.entry(key).or_default().push(handler);
    }

    fn add(&self, key: HandlerKey, handler: Arc<dyn ExpressionHandler>, force: bool) -> bool {
        let mut tiers = self.write();
        if tiers.custom.contains_key(&key) && !force {
            log::debug!("handler for {key:?} already registered, not replacing");
            return false;
        }
        log::debug!("registering custom handler for {key:?}");
        tiers.custom.insert(key, handler);
        true
    }

    /// Registers a custom handler for a node kind
    ///
    /// Returns `false` when a custom handler already exists and `force` is not set.
    pub fn add_handler(
        &self,
        kind: ExprKind,
        handler: Arc<dyn ExpressionHandler>,
        force: bool,
    ) -> bool {
        self.add(HandlerKey::Kind(kind), handler, force)
    }

    /// Registers a custom handler for calls of the method `name`
    pub fn add_method_call_handler(
        &self,
        name: impl Into<String>,
        handler: Arc<dyn ExpressionHandler>,
        force: bool,
    ) -> bool {
        self.add(HandlerKey::MethodCall(name.into()), handler, force)
    }

    /// Drops every custom handler, keeping the built-ins
    pub fn clear_handlers(&self) {
        self.write().custom.clear();
    }

    fn lookup(&self, key: &HandlerKey) -> Vec<Arc<dyn ExpressionHandler>> {
        let tiers = self.read();
        tiers
            .custom
            .get(key)
            .cloned()
            .into_iter()
            .chain(tiers.defaults.get(key).into_iter().flatten().cloned())
            .collect()
    }

    /// Handlers for a node kind, custom first
    pub fn handlers(&self, kind: ExprKind) -> Vec<Arc<dyn ExpressionHandler>> {
        self.lookup(&HandlerKey::Kind(kind))
    }

    /// Handlers for a method name, custom first
    pub fn method_call_handlers(&self, name: &str) -> Vec<Arc<dyn ExpressionHandler>> {
        self.lookup(&HandlerKey::MethodCall(name.to_string()))
    }

    /// Every handler that may apply to `expr`: method-call handlers, then node-kind handlers
    ///
    /// The returned list is a snapshot; no lock is held while handlers run.
    pub fn handlers_for(&self, expr: &Expr) -> Vec<Arc<dyn ExpressionHandler>> {
        let mut found = match expr {
            Expr::Call(call) => self.method_call_handlers(&call.method),
            _ => Vec::new(),
        };
        found.extend(self.handlers(expr.kind()));
        found
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        HandlerRegistry::new()
    }
}
