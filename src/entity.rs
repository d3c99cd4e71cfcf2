//! Entity metadata: table, mapped properties and relationships.
//!
//! Metadata is normally produced by `#[derive(Entity)]`; the translator only
//! needs it when rendering (column names, join keys), translation itself works
//! on property names.

use std::fmt;

use crate::value::{DataType, Typed};

/// A mapped entity type
pub trait Entity: Typed {
    fn meta() -> &'static EntityMeta;
}

/// Relationship carried by a navigation property
#[derive(Clone, Copy)]
pub enum Relation {
    /// `source.column` references `target`'s primary key
    ManyToOne {
        target: fn() -> &'static EntityMeta,
        column: &'static str,
    },
    /// `target.key` references the source's primary key
    OneToMany {
        target: fn() -> &'static EntityMeta,
        key: &'static str,
    },
}

impl Relation {
    pub fn target(&self) -> &'static EntityMeta {
        match self {
            Relation::ManyToOne { target, .. } | Relation::OneToMany { target, .. } => target(),
        }
    }
}

impl fmt::Debug for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Relation::ManyToOne { column, .. } => {
                write!(f, "ManyToOne({} via {column})", self.target().name)
            }
            Relation::OneToMany { key, .. } => {
                write!(f, "OneToMany({} via {key})", self.target().name)
            }
        }
    }
}

/// A mapped property
#[derive(Debug, Clone)]
pub struct PropertyMeta {
    pub name: &'static str,
    /// Column name; for many-to-one properties this is the foreign key column
    pub column: &'static str,
    pub data_type: fn() -> DataType,
    pub relation: Option<Relation>,
    pub primary_key: bool,
}

impl PropertyMeta {
    pub fn data_type(&self) -> DataType {
        (self.data_type)()
    }

    /// Plain column properties, as opposed to navigations
    pub fn is_scalar(&self) -> bool {
        self.relation.is_none()
    }
}

/// Static description of an entity
#[derive(Debug)]
pub struct EntityMeta {
    pub name: &'static str,
    pub table: &'static str,
    pub properties: Vec<PropertyMeta>,
}

impl EntityMeta {
    pub fn property(&self, name: &str) -> Option<&PropertyMeta> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn primary_key(&self) -> Option<&PropertyMeta> {
        self.properties.iter().find(|p| p.primary_key)
    }

    /// Primary key column, `id` when no property is flagged
    pub fn primary_key_column(&self) -> &'static str {
        self.primary_key().map(|p| p.column).unwrap_or("id")
    }

    pub fn scalar_properties(&self) -> impl Iterator<Item = &PropertyMeta> {
        self.properties.iter().filter(|p| p.is_scalar())
    }
}

/// Identity-compared handle to static entity metadata
#[derive(Clone, Copy)]
pub struct EntityRef(&'static EntityMeta);

impl EntityRef {
    pub fn new(meta: &'static EntityMeta) -> Self {
        EntityRef(meta)
    }

    pub fn of<E: Entity>() -> Self {
        EntityRef(E::meta())
    }

    pub fn meta(&self) -> &'static EntityMeta {
        self.0
    }
}

impl PartialEq for EntityRef {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.0, other.0)
    }
}

impl fmt::Debug for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({})", self.0.name)
    }
}
