use std::sync::Arc;

use crate::criteria::{Criteria, Criterion};
use crate::value::{DataType, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFunction {
    Sum,
    Avg,
    Min,
    Max,
    Count,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithmeticOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
}

impl ArithmeticOp {
    pub fn symbol(self) -> &'static str {
        match self {
            ArithmeticOp::Add => "+",
            ArithmeticOp::Subtract => "-",
            ArithmeticOp::Multiply => "*",
            ArithmeticOp::Divide => "/",
            ArithmeticOp::Modulo => "%",
        }
    }
}

/// SQL template applied to the arguments of a function projection
#[derive(Debug, Clone, PartialEq)]
pub enum SqlFunction {
    /// `name(arg, ...)`
    Named(String),
    /// `(left op right)`
    Arithmetic(ArithmeticOp),
    /// `CAST(arg AS type)`
    Cast(DataType),
    /// `(0 - arg)`
    Negate,
}

/// A value-producing item in the criteria model
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// A property path, relative to the root or prefixed by a join alias
    Property(String),
    Constant {
        value: Value,
        ty: DataType,
    },
    Function {
        function: SqlFunction,
        ty: DataType,
        args: Vec<Projection>,
    },
    Conditional {
        test: Box<Criterion>,
        if_true: Box<Projection>,
        if_false: Box<Projection>,
    },
    Aggregate {
        function: AggregateFunction,
        arg: Box<Projection>,
    },
    CountDistinct(String),
    /// Grouping key; selected and added to `GROUP BY`
    GroupBy(Box<Projection>),
    SubQuery(Arc<Criteria>),
    RowCount,
    Aliased {
        projection: Box<Projection>,
        alias: String,
    },
    /// Several columns produced by one expression (nested objects)
    List(Vec<Projection>),
}

impl Projection {
    pub fn property(path: impl Into<String>) -> Projection {
        Projection::Property(path.into())
    }

    pub fn constant(value: impl Into<Value>) -> Projection {
        let value = value.into();
        let ty = value.data_type();
        Projection::Constant { value, ty }
    }

    pub fn typed_constant(value: Value, ty: DataType) -> Projection {
        Projection::Constant { value, ty }
    }

    pub fn function(name: impl Into<String>, ty: DataType, args: Vec<Projection>) -> Projection {
        Projection::Function {
            function: SqlFunction::Named(name.into()),
            ty,
            args,
        }
    }

    pub fn arithmetic(
        op: ArithmeticOp,
        left: Projection,
        right: Projection,
        ty: DataType,
    ) -> Projection {
        Projection::Function {
            function: SqlFunction::Arithmetic(op),
            ty,
            args: vec![left, right],
        }
    }

    pub fn cast(inner: Projection, ty: DataType) -> Projection {
        Projection::Function {
            function: SqlFunction::Cast(ty.clone()),
            ty,
            args: vec![inner],
        }
    }

    pub fn conditional(test: Criterion, if_true: Projection, if_false: Projection) -> Projection {
        Projection::Conditional {
            test: Box::new(test),
            if_true: Box::new(if_true),
            if_false: Box::new(if_false),
        }
    }

    /// `CASE WHEN test THEN true ELSE false END`
    pub fn boolean(test: Criterion) -> Projection {
        Projection::conditional(test, Projection::constant(true), Projection::constant(false))
    }

    pub fn aggregate(function: AggregateFunction, arg: Projection) -> Projection {
        Projection::Aggregate {
            function,
            arg: Box::new(arg),
        }
    }

    pub fn group_by(inner: Projection) -> Projection {
        Projection::GroupBy(Box::new(inner))
    }

    pub fn aliased(self, alias: impl Into<String>) -> Projection {
        Projection::Aliased {
            projection: Box::new(self),
            alias: alias.into(),
        }
    }

    pub fn as_property(&self) -> Option<&str> {
        match self {
            Projection::Property(path) => Some(path),
            Projection::Aliased { projection, .. } => projection.as_property(),
            _ => None,
        }
    }

    /// The projection with any alias wrapper removed
    pub fn unaliased(&self) -> &Projection {
        match self {
            Projection::Aliased { projection, .. } => projection.unaliased(),
            other => other,
        }
    }

    pub fn is_grouping(&self) -> bool {
        matches!(self.unaliased(), Projection::GroupBy(_))
    }

    /// Expands nested lists into a flat column sequence
    pub fn flatten(self) -> Vec<Projection> {
        match self {
            Projection::List(items) => items.into_iter().flat_map(Projection::flatten).collect(),
            other => vec![other],
        }
    }

    pub fn column_count(&self) -> usize {
        match self {
            Projection::List(items) => items.iter().map(Projection::column_count).sum(),
            _ => 1,
        }
    }

    /// Static type when it can be told without entity metadata
    pub fn data_type(&self) -> DataType {
        match self {
            Projection::Property(_) | Projection::List(_) => DataType::Unknown,
            Projection::Constant { ty, .. } | Projection::Function { ty, .. } => ty.clone(),
            Projection::Conditional { if_true, if_false, .. } => match if_true.data_type() {
                DataType::Unknown => if_false.data_type(),
                ty => ty,
            },
            Projection::Aggregate { function, arg } => match function {
                AggregateFunction::Count => DataType::Long,
                AggregateFunction::Avg => DataType::Decimal,
                _ => arg.data_type(),
            },
            Projection::CountDistinct(_) | Projection::RowCount => DataType::Long,
            Projection::GroupBy(inner) => inner.data_type(),
            Projection::Aliased { projection, .. } => projection.data_type(),
            Projection::SubQuery(query) => query
                .projections
                .as_ref()
                .and_then(|p| p.first())
                .map(Projection::data_type)
                .unwrap_or(DataType::Unknown),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_nested_lists() {
        let p = Projection::List(vec![
            Projection::property("a"),
            Projection::List(vec![Projection::property("b"), Projection::property("c")]),
        ]);
        assert_eq!(p.column_count(), 3);
        assert_eq!(p.flatten().len(), 3);
    }

    #[test]
    fn test_aggregate_types() {
        let avg = Projection::aggregate(AggregateFunction::Avg, Projection::property("age"));
        assert_eq!(avg.data_type(), DataType::Decimal);
        let count = Projection::aggregate(AggregateFunction::Count, Projection::property("age"));
        assert_eq!(count.data_type(), DataType::Long);
    }

    #[test]
    fn test_as_property_sees_through_alias() {
        let p = Projection::property("name").aliased("n");
        assert_eq!(p.as_property(), Some("name"));
        assert!(!p.is_grouping());
        assert!(Projection::group_by(Projection::property("x")).aliased("x").is_grouping());
    }
}
