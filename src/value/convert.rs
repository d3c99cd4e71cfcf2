//! Value conversion between SeaQuery, `Value` and may_postgres parameters.
//!
//! Rendered statements hand back their parameters as `sea_query::Values` in
//! placeholder order; they are mapped onto `Value` and then boxed as `ToSql`
//! trait objects that stay alive for the duration of the closure.

use chrono::{NaiveDate, NaiveDateTime};
use may_postgres::types::ToSql;
use rust_decimal::Decimal;
use sea_query::value::ValueType;
use uuid::Uuid;

use crate::error::FlowError;
use crate::value::Value;

/// Maps a SeaQuery parameter onto a `Value`
///
/// # Errors
///
/// Returns `FlowError::InvalidArgument` for parameter kinds that are never produced by
/// the renderer (binary blobs, arrays, ...).
pub fn from_sea_value(value: &sea_query::Value) -> Result<Value, FlowError> {
    use sea_query::Value as Sea;
    let converted = match value {
        Sea::Bool(v) => v.map(Value::Bool),
        Sea::TinyInt(v) => v.map(|i| Value::Int(i32::from(i))),
        Sea::SmallInt(v) => v.map(|i| Value::Int(i32::from(i))),
        Sea::Int(v) => v.map(Value::Int),
        Sea::BigInt(v) => v.map(Value::Long),
        Sea::TinyUnsigned(v) => v.map(|u| Value::Int(i32::from(u))),
        Sea::SmallUnsigned(v) => v.map(|u| Value::Int(i32::from(u))),
        Sea::Unsigned(v) => v.map(|u| Value::Long(i64::from(u))),
        Sea::BigUnsigned(v) => match v {
            Some(u) => Some(Value::Long(i64::try_from(*u).map_err(|_| {
                FlowError::invalid_argument(format!(
                    "BigUnsigned value {u} exceeds i64::MAX, cannot be safely cast to i64"
                ))
            })?)),
            None => None,
        },
        Sea::Float(v) => v.map(|f| Value::Double(f64::from(f))),
        Sea::Double(v) => v.map(Value::Double),
        Sea::String(v) => v.as_ref().map(|s| Value::String(s.to_string())),
        other => return from_extended(other),
    };
    Ok(converted.unwrap_or(Value::Null))
}

/// Feature-gated SeaQuery variants go through `ValueType` so boxing details stay inside sea-query
fn from_extended(value: &sea_query::Value) -> Result<Value, FlowError> {
    if let Ok(v) = <Option<NaiveDate> as ValueType>::try_from(value.clone()) {
        return Ok(v.map(Value::Date).unwrap_or(Value::Null));
    }
    if let Ok(v) = <Option<NaiveDateTime> as ValueType>::try_from(value.clone()) {
        return Ok(v.map(Value::DateTime).unwrap_or(Value::Null));
    }
    if let Ok(v) = <Option<Uuid> as ValueType>::try_from(value.clone()) {
        return Ok(v.map(Value::Uuid).unwrap_or(Value::Null));
    }
    if let Ok(v) = <Option<Decimal> as ValueType>::try_from(value.clone()) {
        return Ok(v.map(Value::Decimal).unwrap_or(Value::Null));
    }
    Err(FlowError::invalid_argument(format!(
        "Unsupported value type in query: {value:?}"
    )))
}

fn to_sql(value: Value) -> Result<Box<dyn ToSql + Sync>, FlowError> {
    Ok(match value {
        Value::Null => Box::new(Option::<String>::None),
        Value::Bool(b) => Box::new(b),
        Value::Int(i) => Box::new(i),
        Value::Long(i) => Box::new(i),
        Value::Double(d) => Box::new(d),
        Value::Decimal(d) => Box::new(d),
        Value::String(s) => Box::new(s),
        Value::Date(d) => Box::new(d),
        Value::DateTime(d) => Box::new(d),
        Value::Uuid(u) => Box::new(u),
        other => {
            return Err(FlowError::invalid_argument(format!(
                "{other:?} cannot be bound as a query parameter"
            )))
        }
    })
}

/// Convert SeaQuery values to may_postgres ToSql parameters and run `f` with them.
///
/// # Errors
///
/// Returns `FlowError::InvalidArgument` if an unsupported value type is encountered,
/// otherwise whatever `f` returns.
pub fn with_converted_params<F, R>(values: &sea_query::Values, f: F) -> Result<R, FlowError>
where
    F: FnOnce(&[&dyn ToSql]) -> Result<R, FlowError>,
{
    let owned = values
        .iter()
        .map(|v| from_sea_value(v).and_then(to_sql))
        .collect::<Result<Vec<_>, _>>()?;

    let params: Vec<&dyn ToSql> = owned.iter().map(|b| b.as_ref() as &dyn ToSql).collect();
    f(&params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_sea_value_scalars() {
        assert_eq!(from_sea_value(&sea_query::Value::Int(Some(3))).unwrap(), Value::Int(3));
        assert_eq!(from_sea_value(&sea_query::Value::BigInt(None)).unwrap(), Value::Null);
        assert_eq!(
            from_sea_value(&sea_query::Value::String(Some("a".into()))).unwrap(),
            Value::String("a".to_string())
        );
    }

    #[test]
    fn test_from_sea_value_extended() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let sea: sea_query::Value = date.into();
        assert_eq!(from_sea_value(&sea).unwrap(), Value::Date(date));

        let id = Uuid::nil();
        let sea: sea_query::Value = id.into();
        assert_eq!(from_sea_value(&sea).unwrap(), Value::Uuid(id));
    }

    #[test]
    fn test_big_unsigned_overflow_is_rejected() {
        let result = from_sea_value(&sea_query::Value::BigUnsigned(Some(u64::MAX)));
        assert!(result.is_err());
    }

    #[test]
    fn test_with_converted_params_counts() {
        let values = sea_query::Values(vec![
            sea_query::Value::Int(Some(1)),
            sea_query::Value::String(Some("x".into())),
        ]);
        let count = with_converted_params(&values, |params| Ok(params.len())).unwrap();
        assert_eq!(count, 2);
    }
}
