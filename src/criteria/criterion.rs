use std::sync::Arc;

use crate::criteria::{Criteria, Projection};
use crate::value::Value;

/// Comparison operator of a criterion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    /// The operator that holds when the operands are swapped
    pub fn mirror(self) -> Self {
        match self {
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::Ge => CompareOp::Le,
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::Le => CompareOp::Ge,
            op => op,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
        }
    }
}

/// Where a `LIKE` pattern may match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchMode {
    Exact,
    Anywhere,
    Start,
    End,
}

impl MatchMode {
    pub fn to_pattern(self, value: &str) -> String {
        match self {
            MatchMode::Exact => value.to_string(),
            MatchMode::Anywhere => format!("%{value}%"),
            MatchMode::Start => format!("{value}%"),
            MatchMode::End => format!("%{value}"),
        }
    }
}

/// Quantifier of a sub-query comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quantifier {
    All,
    Some,
    Any,
}

/// A boolean restriction in the criteria model
#[derive(Debug, Clone, PartialEq)]
pub enum Criterion {
    And(Box<Criterion>, Box<Criterion>),
    Or(Box<Criterion>, Box<Criterion>),
    Not(Box<Criterion>),
    /// projection `op` literal
    Compare {
        op: CompareOp,
        projection: Projection,
        value: Value,
    },
    /// property `op` another projection
    PropertyCompare {
        op: CompareOp,
        property: String,
        other: Projection,
    },
    /// projection `op` projection, neither a plain property
    ProjectionCompare {
        op: CompareOp,
        left: Projection,
        right: Projection,
    },
    IsNull(Projection),
    IsNotNull(Projection),
    Between {
        projection: Projection,
        low: Value,
        high: Value,
    },
    In {
        projection: Projection,
        values: Vec<Value>,
    },
    InSubquery {
        projection: Projection,
        query: Arc<Criteria>,
    },
    SubqueryCompare {
        op: CompareOp,
        projection: Projection,
        quantifier: Option<Quantifier>,
        query: Arc<Criteria>,
    },
    Like {
        projection: Projection,
        pattern: String,
        mode: MatchMode,
    },
}

impl Criterion {
    pub fn and(left: Criterion, right: Criterion) -> Criterion {
        Criterion::And(Box::new(left), Box::new(right))
    }

    pub fn or(left: Criterion, right: Criterion) -> Criterion {
        Criterion::Or(Box::new(left), Box::new(right))
    }

    /// Negation; a double negation collapses
    pub fn not(inner: Criterion) -> Criterion {
        match inner {
            Criterion::Not(inner) => *inner,
            Criterion::IsNull(p) => Criterion::IsNotNull(p),
            Criterion::IsNotNull(p) => Criterion::IsNull(p),
            other => Criterion::Not(Box::new(other)),
        }
    }

    pub fn compare(op: CompareOp, projection: Projection, value: impl Into<Value>) -> Criterion {
        Criterion::Compare {
            op,
            projection,
            value: value.into(),
        }
    }

    /// A criterion that always holds (`true`) or never holds (`false`)
    pub fn constant(value: bool) -> Criterion {
        Criterion::Compare {
            op: CompareOp::Eq,
            projection: Projection::constant(value),
            value: Value::Bool(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mirror() {
        assert_eq!(CompareOp::Gt.mirror(), CompareOp::Lt);
        assert_eq!(CompareOp::Eq.mirror(), CompareOp::Eq);
        assert_eq!(CompareOp::Le.mirror(), CompareOp::Ge);
    }

    #[test]
    fn test_match_mode_patterns() {
        assert_eq!(MatchMode::Anywhere.to_pattern("a"), "%a%");
        assert_eq!(MatchMode::Start.to_pattern("a"), "a%");
        assert_eq!(MatchMode::End.to_pattern("a"), "%a");
        assert_eq!(MatchMode::Exact.to_pattern("a"), "a");
    }

    #[test]
    fn test_not_collapses() {
        let c = Criterion::IsNull(Projection::property("name"));
        assert_eq!(Criterion::not(c.clone()), Criterion::IsNotNull(Projection::property("name")));
        let cmp = Criterion::compare(CompareOp::Eq, Projection::property("id"), 1);
        assert_eq!(Criterion::not(Criterion::not(cmp.clone())), cmp);
    }
}
