//! The ORM criteria model the translator targets.
//!
//! A [`Criteria`] is a complete, session-independent description of one query:
//! root entity and alias, joins, restrictions, projections, ordering, paging and
//! execution hints. It renders to a SeaQuery `SelectStatement` (see `render`).

mod criterion;
mod projection;
mod render;

pub use criterion::{CompareOp, Criterion, MatchMode, Quantifier};
pub use projection::{AggregateFunction, ArithmeticOp, Projection, SqlFunction};
pub use render::Ident;

use crate::entity::{Entity, EntityMeta, EntityRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinType {
    Inner,
    LeftOuter,
    RightOuter,
    FullOuter,
}

/// An association path joined under an alias
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub path: String,
    pub alias: String,
    pub join_type: JoinType,
    /// Extra on-clause restriction
    pub with: Option<Criterion>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub projection: Projection,
    pub ascending: bool,
}

impl Order {
    pub fn asc(projection: Projection) -> Self {
        Order {
            projection,
            ascending: true,
        }
    }

    pub fn desc(projection: Projection) -> Self {
        Order {
            projection,
            ascending: false,
        }
    }
}

/// Execution hints carried alongside the statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionOptions {
    pub cacheable: bool,
    pub cache_region: Option<String>,
    pub fetch_size: Option<u32>,
    /// Statement timeout in seconds
    pub timeout: Option<u64>,
    pub comment: Option<String>,
    pub read_only: bool,
}

/// A complete query description
#[derive(Debug, Clone, PartialEq)]
pub struct Criteria {
    pub entity: EntityRef,
    pub root_alias: String,
    pub joins: Vec<Join>,
    pub restrictions: Vec<Criterion>,
    /// `None` selects the root entity's mapped columns
    pub projections: Option<Vec<Projection>>,
    pub distinct: bool,
    pub orders: Vec<Order>,
    pub first_result: Option<u64>,
    pub max_results: Option<u64>,
    pub options: ExecutionOptions,
}

impl Criteria {
    pub fn new(entity: EntityRef, root_alias: impl Into<String>) -> Self {
        Criteria {
            entity,
            root_alias: root_alias.into(),
            joins: Vec::new(),
            restrictions: Vec::new(),
            projections: None,
            distinct: false,
            orders: Vec::new(),
            first_result: None,
            max_results: None,
            options: ExecutionOptions::default(),
        }
    }

    pub fn for_entity<E: Entity>(root_alias: impl Into<String>) -> Self {
        Criteria::new(EntityRef::of::<E>(), root_alias)
    }

    pub fn meta(&self) -> &'static EntityMeta {
        self.entity.meta()
    }

    pub fn add(&mut self, criterion: Criterion) -> &mut Self {
        self.restrictions.push(criterion);
        self
    }

    pub fn join(&mut self, join: Join) -> &mut Self {
        self.joins.push(join);
        self
    }

    pub fn order(&mut self, order: Order) -> &mut Self {
        self.orders.push(order);
        self
    }

    pub fn set_projections(&mut self, projections: Vec<Projection>) -> &mut Self {
        self.projections = Some(projections);
        self
    }
}
