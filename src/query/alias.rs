//! Join alias bookkeeping.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::FlowError;

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap_or_else(|_| unreachable!("static pattern"))
});

static PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$")
        .unwrap_or_else(|_| unreachable!("static pattern"))
});

/// Ordered mapping of association path to alias
///
/// A path maps to at most one alias and an alias names at most one path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AliasTable {
    entries: Vec<(String, String)>,
}

/// Outcome of [`AliasTable::register`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Added,
    /// The same path was already joined under the same alias
    Existing,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `path` under `alias`
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for malformed paths or aliases
    /// - `InvalidOperation` when the path is aliased differently or the alias is taken
    pub fn register(&mut self, path: &str, alias: &str) -> Result<Registration, FlowError> {
        validate_path(path)?;
        validate_alias(alias)?;

        if let Some(existing) = self.alias_for(path) {
            if existing == alias {
                return Ok(Registration::Existing);
            }
            return Err(FlowError::invalid_operation(format!(
                "property '{path}' is already aliased as '{existing}'"
            )));
        }
        if let Some(other) = self.path_for(alias) {
            return Err(FlowError::invalid_operation(format!(
                "alias '{alias}' is already in use for '{other}'"
            )));
        }

        self.entries.push((path.to_string(), alias.to_string()));
        Ok(Registration::Added)
    }

    pub fn alias_for(&self, path: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, a)| a.as_str())
    }

    pub fn path_for(&self, alias: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, a)| a == alias)
            .map(|(p, _)| p.as_str())
    }

    pub fn contains_alias(&self, alias: &str) -> bool {
        self.path_for(alias).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(p, a)| (p.as_str(), a.as_str()))
    }
}

fn validate_alias(alias: &str) -> Result<(), FlowError> {
    if IDENTIFIER.is_match(alias) {
        Ok(())
    } else {
        Err(FlowError::invalid_argument(format!(
            "'{alias}' is not a valid alias name"
        )))
    }
}

pub(crate) fn validate_path(path: &str) -> Result<(), FlowError> {
    if PATH.is_match(path) {
        Ok(())
    } else {
        Err(FlowError::invalid_argument(format!(
            "'{path}' is not a valid property path"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_path_same_alias_is_idempotent() {
        let mut table = AliasTable::new();
        assert_eq!(table.register("groups", "link").unwrap(), Registration::Added);
        assert_eq!(table.register("groups", "link").unwrap(), Registration::Existing);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_same_path_other_alias_fails() {
        let mut table = AliasTable::new();
        table.register("groups", "link").unwrap();
        let err = table.register("groups", "other").unwrap_err();
        assert!(matches!(err, FlowError::InvalidOperation(_)));
        assert!(err.to_string().contains("already aliased"));
    }

    #[test]
    fn test_alias_reuse_for_other_path_fails() {
        let mut table = AliasTable::new();
        table.register("groups", "link").unwrap();
        let err = table.register("setting", "link").unwrap_err();
        assert!(err.to_string().contains("already in use"));
    }

    #[test]
    fn test_malformed_names_rejected() {
        let mut table = AliasTable::new();
        assert!(matches!(table.register("", "a"), Err(FlowError::InvalidArgument(_))));
        assert!(matches!(table.register("groups", "a b"), Err(FlowError::InvalidArgument(_))));
        assert!(matches!(table.register("link..group", "g"), Err(FlowError::InvalidArgument(_))));
    }

    #[test]
    fn test_lookup_both_ways() {
        let mut table = AliasTable::new();
        table.register("groups", "link").unwrap();
        table.register("link.group", "group").unwrap();
        assert_eq!(table.alias_for("link.group"), Some("group"));
        assert_eq!(table.path_for("link"), Some("groups"));
        assert!(table.contains_alias("group"));
        assert!(!table.contains_alias("link.group"));
    }
}
