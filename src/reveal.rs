//! Access to mapped members that are not exposed under their public name.
//!
//! An entity may map a backing field (`m_name`) rather than the name callers
//! use (`name`). [`Reveal`] builds member accesses through a naming convention
//! so lambdas can stay in terms of the public name.

use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;

use crate::expression::Expr;

/// Maps a public member name to the mapped property name
pub trait RevealConvention: Send + Sync {
    fn reveal(&self, name: &str) -> String;
}

impl<F> RevealConvention for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn reveal(&self, name: &str) -> String {
        self(name)
    }
}

/// Prepends a fixed prefix, `m_` by default
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixConvention {
    prefix: String,
}

impl PrefixConvention {
    pub fn new(prefix: impl Into<String>) -> Self {
        PrefixConvention {
            prefix: prefix.into(),
        }
    }
}

impl Default for PrefixConvention {
    fn default() -> Self {
        PrefixConvention::new("m_")
    }
}

impl RevealConvention for PrefixConvention {
    fn reveal(&self, name: &str) -> String {
        format!("{}{name}", self.prefix)
    }
}

static DEFAULT_CONVENTION: Lazy<RwLock<Arc<dyn RevealConvention>>> =
    Lazy::new(|| RwLock::new(Arc::new(PrefixConvention::default())));

pub struct Reveal;

impl Reveal {
    /// Member access through the process-wide default convention
    pub fn by_convention(target: &Expr, name: &str) -> Expr {
        let convention = Reveal::default_convention();
        Reveal::by_convention_with(target, name, convention.as_ref())
    }

    pub fn by_convention_with(
        target: &Expr,
        name: &str,
        convention: &dyn RevealConvention,
    ) -> Expr {
        target.get(convention.reveal(name))
    }

    /// Member access by the exact mapped name
    pub fn member(target: &Expr, name: &str) -> Expr {
        target.get(name)
    }

    pub fn default_convention() -> Arc<dyn RevealConvention> {
        DEFAULT_CONVENTION
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn set_default_convention(convention: Arc<dyn RevealConvention>) {
        log::debug!("replacing the default reveal convention");
        *DEFAULT_CONVENTION.write().unwrap_or_else(|p| p.into_inner()) = convention;
    }

    /// Restores the `m_` prefix convention
    pub fn reset_default_convention() {
        Reveal::set_default_convention(Arc::new(PrefixConvention::default()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::DataType;

    fn target() -> Expr {
        Expr::param::<String>("x")
    }

    fn member_name(expr: &Expr) -> &str {
        match expr {
            Expr::Member { name, .. } => name,
            other => panic!("expected a member access, got {other:?}"),
        }
    }

    #[test]
    fn test_explicit_conventions() {
        let upper = |name: &str| name.to_uppercase();
        assert_eq!(
            member_name(&Reveal::by_convention_with(&target(), "name", &upper)),
            "NAME"
        );
        let prefixed = Reveal::by_convention_with(&target(), "name", &PrefixConvention::new("_"));
        assert_eq!(member_name(&prefixed), "_name");
        assert_eq!(member_name(&Reveal::member(&target(), "name")), "name");
    }

    #[test]
    fn test_default_convention_is_replaceable() {
        assert_eq!(member_name(&Reveal::by_convention(&target(), "name")), "m_name");

        Reveal::set_default_convention(Arc::new(|name: &str| format!("{name}_field")));
        let revealed = Reveal::by_convention(&target(), "name");
        Reveal::reset_default_convention();

        assert_eq!(member_name(&revealed), "name_field");
        assert_eq!(member_name(&Reveal::by_convention(&target(), "name")), "m_name");
        assert_eq!(revealed.data_type(), DataType::Unknown);
    }
}
