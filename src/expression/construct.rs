//! Result construction: rebuilding the shape of a select lambda from row cells.

use std::collections::BTreeMap;

use crate::error::FlowError;
use crate::expression::{Expr, TranslationContext, UnaryOp};
use crate::value::Value;

/// Sequential reader over the cells of one result row
///
/// Cells are consumed in the order the projection builder produced columns.
pub struct RowCursor<'r> {
    cells: &'r [Value],
    position: usize,
}

impl<'r> RowCursor<'r> {
    pub fn new(cells: &'r [Value]) -> Self {
        RowCursor { cells, position: 0 }
    }

    /// Takes the next cell
    ///
    /// # Errors
    ///
    /// `Mapping` when the row has fewer cells than the select shape needs.
    pub fn next_value(&mut self) -> Result<Value, FlowError> {
        let cell = self.cells.get(self.position).cloned().ok_or_else(|| {
            FlowError::mapping(format!(
                "row has {} column(s), construction needs more",
                self.cells.len()
            ))
        })?;
        self.position += 1;
        Ok(cell)
    }

    pub fn remaining(&self) -> usize {
        self.cells.len().saturating_sub(self.position)
    }
}

/// Builds the value `expr` denotes from the cursor
pub fn construct(
    expr: &Expr,
    ctx: &TranslationContext<'_>,
    row: &mut RowCursor<'_>,
) -> Result<Value, FlowError> {
    for handler in ctx.registry.handlers_for(expr) {
        if handler.can_construct(expr, ctx) {
            return handler.construct(expr, ctx, row);
        }
    }

    match expr {
        Expr::New { members, .. } => {
            let mut object = BTreeMap::new();
            for (name, member) in members {
                object.insert(name.clone(), construct(member, ctx, row)?);
            }
            Ok(Value::Object(object))
        }
        Expr::Unary {
            op: UnaryOp::Convert,
            operand,
            ty,
        } => construct(operand, ctx, row)?.convert_to(ty),
        _ => {
            let value = row.next_value()?;
            let ty = expr.data_type();
            if ty.is_numeric() && value.is_numeric() {
                value.convert_to(&ty)
            } else {
                Ok(value)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::HandlerRegistry;
    use crate::query::AliasTable;
    use crate::value::DataType;

    #[test]
    fn test_nested_objects_consume_cells_in_order() {
        let u = Expr::Parameter(crate::expression::Parameter::new("u", DataType::Object));
        let shape = Expr::object([
            ("name", u.get_as("name", DataType::String)),
            (
                "inner",
                Expr::object([("age", u.get_as("age", DataType::Long))]),
            ),
        ]);
        let registry = HandlerRegistry::new();
        let aliases = AliasTable::new();
        let ctx = TranslationContext::new("u", "this", &aliases, &registry);
        let cells = vec![Value::String("ann".into()), Value::Int(30)];
        let mut cursor = RowCursor::new(&cells);
        let value = construct(&shape, &ctx, &mut cursor).unwrap();
        assert_eq!(
            value.to_json(),
            serde_json::json!({"name": "ann", "inner": {"age": 30}})
        );
        assert_eq!(cursor.remaining(), 0);
    }

    #[test]
    fn test_short_row_is_a_mapping_error() {
        let cells: Vec<Value> = Vec::new();
        let mut cursor = RowCursor::new(&cells);
        assert!(matches!(cursor.next_value(), Err(FlowError::Mapping(_))));
    }
}
