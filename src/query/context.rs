use std::sync::Arc;

use crate::config::FlowQueryConfig;
use crate::handlers::HandlerRegistry;

/// Process-level settings a query is built with
#[derive(Clone)]
pub struct QueryContext {
    pub registry: Arc<HandlerRegistry>,
    pub root_alias: String,
    pub default_timeout: Option<u64>,
    pub default_fetch_size: Option<u32>,
    pub log_sql: bool,
}

impl QueryContext {
    /// The global handler registry with the root alias `this`
    pub fn new() -> Self {
        QueryContext {
            registry: HandlerRegistry::global(),
            root_alias: "this".to_string(),
            default_timeout: None,
            default_fetch_size: None,
            log_sql: false,
        }
    }

    /// Applies the `query` section of the configuration
    pub fn from_config(config: &FlowQueryConfig) -> Self {
        QueryContext {
            root_alias: config.query.root_alias.clone(),
            default_timeout: config.query.default_timeout_seconds,
            default_fetch_size: config.query.default_fetch_size,
            log_sql: config.query.log_sql,
            ..QueryContext::new()
        }
    }

    /// Uses an isolated registry, typically in tests
    pub fn with_registry(mut self, registry: Arc<HandlerRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_root_alias(mut self, alias: impl Into<String>) -> Self {
        self.root_alias = alias.into();
        self
    }
}

impl Default for QueryContext {
    fn default() -> Self {
        QueryContext::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config() {
        let mut cfg = FlowQueryConfig::default();
        cfg.query.root_alias = "root".into();
        cfg.query.default_fetch_size = Some(50);
        let ctx = QueryContext::from_config(&cfg);
        assert_eq!(ctx.root_alias, "root");
        assert_eq!(ctx.default_fetch_size, Some(50));
        assert!(Arc::ptr_eq(&ctx.registry, &HandlerRegistry::global()));
    }
}
