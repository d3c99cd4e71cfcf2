//! Order statements and their resolution at build time.

use crate::criteria::{Order, Projection};
use crate::error::FlowError;
use crate::value::DataType;

/// A named select-list entry an order can refer to
#[derive(Debug, Clone, PartialEq)]
pub struct NamedProjection {
    pub name: String,
    pub projection: Projection,
    pub ty: DataType,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderState {
    /// Translated from a source lambda, waiting for the select to be built
    Pending(Order),
    /// Waiting for the select list to resolve the named projection
    Deferred {
        name: String,
        ty: Option<DataType>,
        ascending: bool,
    },
    Resolved(Order),
    /// Omitted from a detached query without skip or take
    Dropped,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderStatement {
    pub state: OrderState,
}

impl OrderStatement {
    pub fn source(projection: Projection, ascending: bool) -> Self {
        OrderStatement {
            state: OrderState::Pending(Order {
                projection,
                ascending,
            }),
        }
    }

    pub fn projected(name: impl Into<String>, ty: Option<DataType>, ascending: bool) -> Self {
        OrderStatement {
            state: OrderState::Deferred {
                name: name.into(),
                ty,
                ascending,
            },
        }
    }

    /// Resolves the statement against the final select list
    ///
    /// # Errors
    ///
    /// `InvalidOperation` when no projection carries the deferred name or its
    /// type does not match; the statement is left `Failed`. A dropped
    /// statement cannot be resolved.
    pub fn resolve(&mut self, names: &[NamedProjection]) -> Result<&Order, FlowError> {
        let next = match &self.state {
            OrderState::Pending(order) => Some(OrderState::Resolved(order.clone())),
            OrderState::Deferred {
                name,
                ty,
                ascending,
            } => Some(match names.iter().find(|n| &n.name == name) {
                None => OrderState::Failed(format!(
                    "cannot order by '{name}': the select list has no such projection"
                )),
                Some(found) if ty.as_ref().is_some_and(|t| !t.compatible_with(&found.ty)) => {
                    OrderState::Failed(format!(
                        "cannot order by '{name}': expected {:?}, the projection is {:?}",
                        ty.as_ref().unwrap_or(&DataType::Unknown),
                        found.ty
                    ))
                }
                Some(found) => OrderState::Resolved(Order {
                    projection: found.projection.clone(),
                    ascending: *ascending,
                }),
            }),
            _ => None,
        };
        if let Some(next) = next {
            self.state = next;
        }

        match &self.state {
            OrderState::Resolved(order) => Ok(order),
            OrderState::Failed(reason) => Err(FlowError::invalid_operation(reason.clone())),
            OrderState::Dropped => {
                Err(FlowError::invalid_operation("order statement was dropped"))
            }
            OrderState::Pending(_) | OrderState::Deferred { .. } => {
                Err(FlowError::invalid_operation("order statement is unresolved"))
            }
        }
    }

    /// Omits the statement from the built query; failed statements stay failed
    pub fn drop_order(&mut self) {
        if !matches!(self.state, OrderState::Failed(_)) {
            self.state = OrderState::Dropped;
        }
    }
}

/// Settles `statements` in registration order and returns the orders to apply
///
/// With `keep` unset every statement is dropped and no ordering is emitted.
pub fn resolve_orders(
    statements: &[OrderStatement],
    names: &[NamedProjection],
    keep: bool,
) -> Result<Vec<Order>, FlowError> {
    let mut orders = Vec::with_capacity(statements.len());
    for statement in statements {
        let mut statement = statement.clone();
        if keep {
            orders.push(statement.resolve(names)?.clone());
        } else {
            statement.drop_order();
            log::debug!("dropped order statement: {:?}", statement.state);
        }
    }
    Ok(orders)
}
