//! Static data types carried by expression nodes and entity properties.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::entity::{EntityMeta, EntityRef};
use crate::value::Value;

/// Type of an expression node, a property or a literal value
#[derive(Debug, Clone, PartialEq)]
pub enum DataType {
    Unknown,
    Bool,
    Int,
    Long,
    Double,
    Decimal,
    String,
    Date,
    DateTime,
    Uuid,
    /// A mapped entity (lambda parameters, many-to-one navigations)
    Entity(EntityRef),
    /// A collection navigation, element type inside
    Collection(Box<DataType>),
    /// An unmapped object: DTOs and anonymous projections
    Object,
    /// A detached query usable as a sub-query
    Query,
    /// A `(property, is)` delegate used by filter lambdas
    WhereDelegate,
    /// A deferred `Is` predicate
    Is,
}

impl DataType {
    pub fn is_known(&self) -> bool {
        !matches!(self, DataType::Unknown)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            DataType::Int | DataType::Long | DataType::Double | DataType::Decimal
        )
    }

    pub fn is_string(&self) -> bool {
        matches!(self, DataType::String)
    }

    /// Entity metadata for entity types and collections of entities
    pub fn entity(&self) -> Option<&'static EntityMeta> {
        match self {
            DataType::Entity(entity) => Some(entity.meta()),
            DataType::Collection(element) => element.entity(),
            _ => None,
        }
    }

    /// Canonical PostgreSQL type name, valid quoted or unquoted, used for casts
    pub fn sql_name(&self) -> Option<&'static str> {
        match self {
            DataType::Bool => Some("bool"),
            DataType::Int => Some("int4"),
            DataType::Long => Some("int8"),
            DataType::Double => Some("float8"),
            DataType::Decimal => Some("numeric"),
            DataType::String => Some("text"),
            DataType::Date => Some("date"),
            DataType::DateTime => Some("timestamp"),
            DataType::Uuid => Some("uuid"),
            _ => None,
        }
    }

    /// Value produced by a `default(T)` node
    pub fn default_value(&self) -> Value {
        match self {
            DataType::Bool => Value::Bool(false),
            DataType::Int => Value::Int(0),
            DataType::Long => Value::Long(0),
            DataType::Double => Value::Double(0.0),
            DataType::Decimal => Value::Decimal(Decimal::ZERO),
            DataType::Uuid => Value::Uuid(Uuid::nil()),
            _ => Value::Null,
        }
    }

    /// Two types are compatible when either is unknown, they are equal, or both are numeric
    pub fn compatible_with(&self, other: &DataType) -> bool {
        !self.is_known()
            || !other.is_known()
            || self == other
            || (self.is_numeric() && other.is_numeric())
    }

    /// Result type of an arithmetic operation over two numeric types
    pub fn promote(&self, other: &DataType) -> DataType {
        fn rank(ty: &DataType) -> u8 {
            match ty {
                DataType::Int => 1,
                DataType::Long => 2,
                DataType::Decimal => 3,
                DataType::Double => 4,
                _ => 0,
            }
        }
        if rank(self) >= rank(other) {
            self.clone()
        } else {
            other.clone()
        }
    }
}

/// Rust types that can appear as lambda parameters, properties or literals
///
/// Implemented for the supported scalars, `Option<T>`, `Vec<T>` and by
/// `#[derive(Entity)]` for mapped structs.
pub trait Typed {
    fn data_type() -> DataType;
}

macro_rules! impl_typed {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl Typed for $ty {
                fn data_type() -> DataType {
                    DataType::$variant
                }
            }
        )*
    };
}

impl_typed! {
    bool => Bool,
    i8 => Int,
    i16 => Int,
    i32 => Int,
    u8 => Int,
    u16 => Int,
    i64 => Long,
    u32 => Long,
    u64 => Long,
    f32 => Double,
    f64 => Double,
    Decimal => Decimal,
    String => String,
    &str => String,
    NaiveDate => Date,
    NaiveDateTime => DateTime,
    DateTime<Utc> => DateTime,
    Uuid => Uuid,
    serde_json::Value => Object,
}

impl<T: Typed> Typed for Option<T> {
    fn data_type() -> DataType {
        T::data_type()
    }
}

impl<T: Typed> Typed for Box<T> {
    fn data_type() -> DataType {
        T::data_type()
    }
}

impl<T: Typed> Typed for Vec<T> {
    fn data_type() -> DataType {
        DataType::Collection(Box::new(T::data_type()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrappers_unwrap_to_element_type() {
        assert_eq!(<Option<i64> as Typed>::data_type(), DataType::Long);
        assert_eq!(
            <Vec<String> as Typed>::data_type(),
            DataType::Collection(Box::new(DataType::String))
        );
    }

    #[test]
    fn test_compatibility() {
        assert!(DataType::Int.compatible_with(&DataType::Long));
        assert!(DataType::Unknown.compatible_with(&DataType::String));
        assert!(!DataType::String.compatible_with(&DataType::Int));
    }

    #[test]
    fn test_promote() {
        assert_eq!(DataType::Int.promote(&DataType::Long), DataType::Long);
        assert_eq!(DataType::Decimal.promote(&DataType::Int), DataType::Decimal);
        assert_eq!(DataType::Double.promote(&DataType::Decimal), DataType::Double);
    }
}
