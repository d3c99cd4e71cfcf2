//! Runtime values: literals captured in lambdas, query parameters and row cells.

mod convert;
mod types;

pub use convert::{from_sea_value, with_converted_params};
pub use types::{DataType, Typed};

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::criteria::Criteria;
use crate::error::FlowError;
use crate::expression::IsExpression;

/// A closure that can be invoked by an `Invoke` node during constant evaluation
#[derive(Clone)]
pub struct Callable(Arc<dyn Fn(&[Value]) -> Result<Value, FlowError> + Send + Sync>);

impl Callable {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, FlowError> + Send + Sync + 'static,
    {
        Callable(Arc::new(f))
    }

    pub fn call(&self, args: &[Value]) -> Result<Value, FlowError> {
        (self.0)(args)
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Callable")
    }
}

impl PartialEq for Callable {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// A dynamically typed value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    Decimal(Decimal),
    String(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Uuid(Uuid),
    List(Vec<Value>),
    Object(BTreeMap<String, Value>),
    /// A detached query, used for sub-query comparisons and projections
    Query(Arc<Criteria>),
    /// A deferred predicate built with [`crate::Is`]
    Is(Arc<IsExpression>),
    Callable(Callable),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Type guessed from the value itself
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Null | Value::Callable(_) => DataType::Unknown,
            Value::Bool(_) => DataType::Bool,
            Value::Int(_) => DataType::Int,
            Value::Long(_) => DataType::Long,
            Value::Double(_) => DataType::Double,
            Value::Decimal(_) => DataType::Decimal,
            Value::String(_) => DataType::String,
            Value::Date(_) => DataType::Date,
            Value::DateTime(_) => DataType::DateTime,
            Value::Uuid(_) => DataType::Uuid,
            Value::List(items) => DataType::Collection(Box::new(
                items.first().map(Value::data_type).unwrap_or(DataType::Unknown),
            )),
            Value::Object(_) => DataType::Object,
            Value::Query(_) => DataType::Query,
            Value::Is(_) => DataType::Is,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(i) => Some(*i != 0),
            Value::Long(i) => Some(*i != 0),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(i64::from(*i)),
            Value::Long(i) => Some(*i),
            Value::Decimal(d) if d.fract().is_zero() => d.to_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(f64::from(*i)),
            Value::Long(i) => Some(*i as f64),
            Value::Double(d) => Some(*d),
            Value::Decimal(d) => d.to_f64(),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Int(i) => Some(Decimal::from(*i)),
            Value::Long(i) => Some(Decimal::from(*i)),
            Value::Double(d) => Decimal::from_f64(*d),
            Value::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.data_type().is_numeric()
    }

    /// Orders two values; numbers compare across representations, `None` when incomparable
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::Bool(a), Value::Bool(b)) => a.partial_cmp(b),
            (Value::String(a), Value::String(b)) => a.partial_cmp(b),
            (Value::Date(a), Value::Date(b)) => a.partial_cmp(b),
            (Value::DateTime(a), Value::DateTime(b)) => a.partial_cmp(b),
            (Value::Uuid(a), Value::Uuid(b)) => a.partial_cmp(b),
            (a, b) if a.is_numeric() && b.is_numeric() => {
                match (a.data_type(), b.data_type()) {
                    (DataType::Double, _) | (_, DataType::Double) => {
                        a.as_f64()?.partial_cmp(&b.as_f64()?)
                    }
                    (DataType::Decimal, _) | (_, DataType::Decimal) => {
                        a.as_decimal()?.partial_cmp(&b.as_decimal()?)
                    }
                    _ => a.as_i64()?.partial_cmp(&b.as_i64()?),
                }
            }
            _ => None,
        }
    }

    /// Equality with numeric widening, used by constant folding
    pub fn loose_eq(&self, other: &Value) -> bool {
        match self.compare(other) {
            Some(ordering) => ordering == Ordering::Equal,
            None => self == other,
        }
    }

    /// Converts the value for a `Convert` node targeting `ty`
    pub fn convert_to(&self, ty: &DataType) -> Result<Value, FlowError> {
        if self.is_null() || !ty.is_known() || &self.data_type() == ty {
            return Ok(self.clone());
        }
        let converted = match ty {
            DataType::Int => self.as_i64().and_then(|i| i32::try_from(i).ok()).map(Value::Int),
            DataType::Long => self.as_i64().map(Value::Long),
            DataType::Double => self.as_f64().map(Value::Double),
            DataType::Decimal => self.as_decimal().map(Value::Decimal),
            DataType::String => Some(Value::String(self.to_string())),
            DataType::Bool => self.as_bool().map(Value::Bool),
            _ => Some(self.clone()),
        };
        converted.ok_or_else(|| {
            FlowError::invalid_argument(format!("cannot convert {self:?} to {ty:?}"))
        })
    }

    /// Numeric literals (and lists of them) take the numeric type of the
    /// property they are compared with; anything else is left as is
    pub fn coerce_to(self, ty: &DataType) -> Result<Value, FlowError> {
        match self {
            Value::List(items) => items
                .into_iter()
                .map(|item| item.coerce_to(ty))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            v if ty.is_numeric() && v.is_numeric() => v.convert_to(ty),
            v => Ok(v),
        }
    }

    /// JSON rendition used to deserialize constructed results into DTOs
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Null | Value::Query(_) | Value::Is(_) | Value::Callable(_) => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(i) => Json::from(*i),
            Value::Long(i) => Json::from(*i),
            Value::Double(d) => serde_json::Number::from_f64(*d)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::Decimal(d) => d
                .to_f64()
                .and_then(serde_json::Number::from_f64)
                .map(Json::Number)
                .unwrap_or_else(|| Json::String(d.to_string())),
            Value::String(s) => Json::String(s.clone()),
            Value::Date(d) => Json::String(d.format("%Y-%m-%d").to_string()),
            Value::DateTime(d) => Json::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
            Value::Uuid(u) => Json::String(u.to_string()),
            Value::List(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Object(map) => Json::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    /// Converts to a bound SQL parameter
    pub fn to_sea_value(&self) -> Result<sea_query::Value, FlowError> {
        Ok(match self {
            Value::Null => sea_query::Value::String(None),
            Value::Bool(b) => (*b).into(),
            Value::Int(i) => (*i).into(),
            Value::Long(i) => (*i).into(),
            Value::Double(d) => (*d).into(),
            Value::Decimal(d) => (*d).into(),
            Value::String(s) => s.clone().into(),
            Value::Date(d) => (*d).into(),
            Value::DateTime(d) => (*d).into(),
            Value::Uuid(u) => (*u).into(),
            other => {
                return Err(FlowError::invalid_argument(format!(
                    "{other:?} cannot be bound as a query parameter"
                )))
            }
        })
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Long(i) => write!(f, "{i}"),
            Value::Double(d) => write!(f, "{d}"),
            Value::Decimal(d) => write!(f, "{d}"),
            Value::String(s) => f.write_str(s),
            Value::Date(d) => write!(f, "{d}"),
            Value::DateTime(d) => write!(f, "{d}"),
            Value::Uuid(u) => write!(f, "{u}"),
            other => write!(f, "{other:?}"),
        }
    }
}

macro_rules! impl_from_scalar {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v.into())
                }
            }
        )*
    };
}

impl_from_scalar! {
    bool => Bool,
    i8 => Int,
    i16 => Int,
    i32 => Int,
    u8 => Int,
    u16 => Int,
    i64 => Long,
    u32 => Long,
    f32 => Double,
    f64 => Double,
    Decimal => Decimal,
    String => String,
    &str => String,
    NaiveDate => Date,
    NaiveDateTime => DateTime,
    Uuid => Uuid,
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::DateTime(v.naive_utc())
    }
}

impl From<Criteria> for Value {
    fn from(v: Criteria) -> Self {
        Value::Query(Arc::new(v))
    }
}

impl From<IsExpression> for Value {
    fn from(v: IsExpression) -> Self {
        Value::Is(Arc::new(v))
    }
}

impl From<Callable> for Value {
    fn from(v: Callable) -> Self {
        Value::Callable(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value> + Clone> From<&[T]> for Value {
    fn from(v: &[T]) -> Self {
        Value::List(v.iter().cloned().map(Into::into).collect())
    }
}
