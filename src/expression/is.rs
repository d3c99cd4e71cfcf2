//! Deferred predicates: `Is::between(2, 3)`, `Is::in_values([..])`, ...
//!
//! An [`IsExpression`] carries no property. It is bound to one when compiled,
//! either by `FlowQuery::where_is` or by invoking the where-delegate inside a
//! filter lambda.

use std::sync::Arc;

use crate::criteria::{CompareOp, Criterion, MatchMode, Projection, Quantifier};
use crate::error::FlowError;
use crate::value::{DataType, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum IsKind {
    Compare {
        op: CompareOp,
        operand: Value,
        quantifier: Option<Quantifier>,
    },
    Between {
        low: Value,
        high: Value,
    },
    In(Value),
    Like {
        pattern: String,
        mode: MatchMode,
    },
    Null,
    /// The empty string or null
    Empty,
}

/// A predicate waiting for its left-hand side
#[derive(Debug, Clone, PartialEq)]
pub struct IsExpression {
    pub kind: IsKind,
    pub negated: bool,
}

impl IsExpression {
    fn new(kind: IsKind) -> Self {
        IsExpression {
            kind,
            negated: false,
        }
    }

    pub fn negate(mut self) -> Self {
        self.negated = !self.negated;
        self
    }

    fn quantified(mut self, quantifier: Quantifier) -> Self {
        if let IsKind::Compare { quantifier: q, .. } = &mut self.kind {
            *q = Some(quantifier);
        }
        self
    }

    /// Compares against every row of the sub-query operand
    pub fn all(self) -> Self {
        self.quantified(Quantifier::All)
    }

    pub fn some(self) -> Self {
        self.quantified(Quantifier::Some)
    }

    pub fn any(self) -> Self {
        self.quantified(Quantifier::Any)
    }

    /// Binds the predicate to `projection` of type `ty`
    ///
    /// Numeric operands are converted to `ty` first, so `Is::between(2, 3)`
    /// on a `bigint` property binds `bigint` parameters.
    ///
    /// # Errors
    ///
    /// As [`compile`](Self::compile), plus `InvalidArgument` for operands that
    /// do not fit `ty`.
    pub fn compile_as(
        &self,
        projection: Projection,
        ty: &DataType,
    ) -> Result<Criterion, FlowError> {
        let kind = match &self.kind {
            IsKind::Compare {
                op,
                operand,
                quantifier,
            } => IsKind::Compare {
                op: *op,
                operand: operand.clone().coerce_to(ty)?,
                quantifier: *quantifier,
            },
            IsKind::Between { low, high } => IsKind::Between {
                low: low.clone().coerce_to(ty)?,
                high: high.clone().coerce_to(ty)?,
            },
            IsKind::In(values) => IsKind::In(values.clone().coerce_to(ty)?),
            other => other.clone(),
        };
        IsExpression {
            kind,
            negated: self.negated,
        }
        .compile(projection)
    }

    /// Binds the predicate to `projection`
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for null operands used with ordering comparisons, for
    /// quantifiers without a sub-query and for malformed `in` operands.
    pub fn compile(&self, projection: Projection) -> Result<Criterion, FlowError> {
        let criterion = match &self.kind {
            IsKind::Compare {
                op,
                operand,
                quantifier,
            } => compile_compare(*op, projection, operand, *quantifier, self.negated)?,
            IsKind::Between { low, high } => Criterion::Between {
                projection,
                low: low.clone(),
                high: high.clone(),
            },
            IsKind::In(values) => compile_in(projection, values)?,
            IsKind::Like { pattern, mode } => Criterion::Like {
                projection,
                pattern: pattern.clone(),
                mode: *mode,
            },
            IsKind::Null => Criterion::IsNull(projection),
            IsKind::Empty => Criterion::or(
                Criterion::IsNull(projection.clone()),
                Criterion::compare(CompareOp::Eq, projection, ""),
            ),
        };

        // null comparisons already folded the negation into the operator
        let folded = matches!(
            &self.kind,
            IsKind::Compare { operand: Value::Null, .. }
        );
        if self.negated && !folded {
            Ok(Criterion::not(criterion))
        } else {
            Ok(criterion)
        }
    }
}

fn compile_compare(
    op: CompareOp,
    projection: Projection,
    operand: &Value,
    quantifier: Option<Quantifier>,
    negated: bool,
) -> Result<Criterion, FlowError> {
    match operand {
        Value::Query(query) => Ok(Criterion::SubqueryCompare {
            op,
            projection,
            quantifier,
            query: Arc::clone(query),
        }),
        _ if quantifier.is_some() => Err(FlowError::invalid_argument(
            "all/some/any require a sub-query operand",
        )),
        Value::Null => {
            let is_null = match op {
                CompareOp::Eq => true,
                CompareOp::Ne => false,
                other => {
                    return Err(FlowError::invalid_argument(format!(
                        "cannot compare with null using '{}'",
                        other.symbol()
                    )))
                }
            };
            if is_null != negated {
                Ok(Criterion::IsNull(projection))
            } else {
                Ok(Criterion::IsNotNull(projection))
            }
        }
        value => Ok(Criterion::compare(op, projection, value.clone())),
    }
}

fn compile_in(projection: Projection, values: &Value) -> Result<Criterion, FlowError> {
    match values {
        Value::List(items) => Ok(Criterion::In {
            projection,
            values: items.clone(),
        }),
        Value::Query(query) => Ok(Criterion::InSubquery {
            projection,
            query: Arc::clone(query),
        }),
        Value::Null => Err(FlowError::invalid_argument("'in' requires a list of values")),
        single => Ok(Criterion::In {
            projection,
            values: vec![single.clone()],
        }),
    }
}

/// Factory for [`IsExpression`]s
pub struct Is;

impl Is {
    fn compare(op: CompareOp, operand: impl Into<Value>) -> IsExpression {
        IsExpression::new(IsKind::Compare {
            op,
            operand: operand.into(),
            quantifier: None,
        })
    }

    pub fn equal_to(value: impl Into<Value>) -> IsExpression {
        Is::compare(CompareOp::Eq, value)
    }

    pub fn not_equal_to(value: impl Into<Value>) -> IsExpression {
        Is::compare(CompareOp::Ne, value)
    }

    pub fn greater_than(value: impl Into<Value>) -> IsExpression {
        Is::compare(CompareOp::Gt, value)
    }

    pub fn greater_than_or_equal_to(value: impl Into<Value>) -> IsExpression {
        Is::compare(CompareOp::Ge, value)
    }

    pub fn less_than(value: impl Into<Value>) -> IsExpression {
        Is::compare(CompareOp::Lt, value)
    }

    pub fn less_than_or_equal_to(value: impl Into<Value>) -> IsExpression {
        Is::compare(CompareOp::Le, value)
    }

    pub fn between(low: impl Into<Value>, high: impl Into<Value>) -> IsExpression {
        IsExpression::new(IsKind::Between {
            low: low.into(),
            high: high.into(),
        })
    }

    /// Membership in a list, or in a detached sub-query
    pub fn in_values(values: impl Into<Value>) -> IsExpression {
        IsExpression::new(IsKind::In(values.into()))
    }

    /// Exact `LIKE`; the pattern may carry its own wildcards
    pub fn like(pattern: impl Into<String>) -> IsExpression {
        Is::like_with(pattern, MatchMode::Exact)
    }

    pub fn like_with(pattern: impl Into<String>, mode: MatchMode) -> IsExpression {
        IsExpression::new(IsKind::Like {
            pattern: pattern.into(),
            mode,
        })
    }

    pub fn null() -> IsExpression {
        IsExpression::new(IsKind::Null)
    }

    pub fn not_null() -> IsExpression {
        Is::null().negate()
    }

    pub fn empty() -> IsExpression {
        IsExpression::new(IsKind::Empty)
    }

    pub fn not_empty() -> IsExpression {
        Is::empty().negate()
    }

    pub fn not(inner: IsExpression) -> IsExpression {
        inner.negate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> Projection {
        Projection::property("id")
    }

    #[test]
    fn test_between_compiles() {
        let c = Is::between(2, 3).compile(id()).unwrap();
        assert_eq!(
            c,
            Criterion::Between {
                projection: id(),
                low: Value::Int(2),
                high: Value::Int(3),
            }
        );
    }

    #[test]
    fn test_operands_take_the_property_type() {
        let c = Is::between(2, 3).compile_as(id(), &DataType::Long).unwrap();
        assert_eq!(
            c,
            Criterion::Between {
                projection: id(),
                low: Value::Long(2),
                high: Value::Long(3),
            }
        );
        assert_eq!(
            Is::in_values(vec![1, 2]).compile_as(id(), &DataType::Long).unwrap(),
            Criterion::In {
                projection: id(),
                values: vec![Value::Long(1), Value::Long(2)],
            }
        );
        assert_eq!(
            Is::greater_than(4).negate().compile_as(id(), &DataType::Double).unwrap(),
            Criterion::not(Criterion::compare(CompareOp::Gt, id(), Value::Double(4.0)))
        );
        assert!(Is::equal_to("x").compile_as(id(), &DataType::Long).is_ok());
    }

    #[test]
    fn test_null_operands_fold_into_null_checks() {
        assert_eq!(
            Is::equal_to(Value::Null).compile(id()).unwrap(),
            Criterion::IsNull(id())
        );
        assert_eq!(
            Is::not_equal_to(Value::Null).compile(id()).unwrap(),
            Criterion::IsNotNull(id())
        );
        assert_eq!(
            Is::equal_to(Value::Null).negate().compile(id()).unwrap(),
            Criterion::IsNotNull(id())
        );
        assert!(Is::greater_than(Value::Null).compile(id()).is_err());
    }

    #[test]
    fn test_not_null_and_negation() {
        assert_eq!(Is::not_null().compile(id()).unwrap(), Criterion::IsNotNull(id()));
        let c = Is::not(Is::in_values(vec![1, 2])).compile(id()).unwrap();
        assert!(matches!(c, Criterion::Not(_)));
    }

    #[test]
    fn test_scalar_in_becomes_single_element_list() {
        let c = Is::in_values(5).compile(id()).unwrap();
        assert_eq!(
            c,
            Criterion::In {
                projection: id(),
                values: vec![Value::Int(5)],
            }
        );
    }

    #[test]
    fn test_quantifier_needs_subquery() {
        let err = Is::greater_than(3).all().compile(id()).unwrap_err();
        assert!(matches!(err, FlowError::InvalidArgument(_)));
    }
}
