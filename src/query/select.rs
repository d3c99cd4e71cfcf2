//! Select lists: projection naming and row mapping.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::criteria::Projection;
use crate::entity::EntityMeta;
use crate::error::FlowError;
use crate::executor::ResultRow;
use crate::expression::{construct, project, Expr, RowCursor, TranslationContext};
use crate::handlers::HandlerRegistry;
use crate::query::order::NamedProjection;
use crate::query::AliasTable;
use crate::value::Value;

/// The translated select list of one query
#[derive(Debug, Clone)]
pub(crate) struct Selection {
    /// `None` selects the root entity's mapped columns
    pub projections: Option<Vec<Projection>>,
    /// Name to projection map that projection-based orders resolve against
    pub names: Vec<NamedProjection>,
    /// Select lambda body results are constructed from; `None` for entity selects
    pub shape: Option<Expr>,
}

impl Selection {
    /// Every scalar column of `meta`, named by property
    pub fn entity(meta: &'static EntityMeta) -> Self {
        let names = meta
            .scalar_properties()
            .map(|p| NamedProjection {
                name: p.name.to_string(),
                projection: Projection::property(p.name),
                ty: p.data_type(),
            })
            .collect();
        Selection {
            projections: None,
            names,
            shape: None,
        }
    }

    /// Translates a select lambda body
    ///
    /// Members of object constructions are named after the member, nested
    /// members with a dotted name; a lone value is named by its property path.
    pub fn from_body(
        body: &Expr,
        ctx: &TranslationContext<'_>,
        meta: &'static EntityMeta,
    ) -> Result<Self, FlowError> {
        if matches!(body, Expr::Parameter(p) if p.name == ctx.root) {
            return Ok(Selection::entity(meta));
        }

        let mut projections = Vec::new();
        let mut names = Vec::new();
        match body {
            Expr::New { members, .. } => {
                for (name, member) in members {
                    collect(name, member, ctx, &mut projections, &mut names)?;
                }
            }
            other => {
                let projection = project(other, ctx)?;
                let name = projection
                    .as_property()
                    .map(str::to_string)
                    .unwrap_or_else(|| "value".to_string());
                names.push(NamedProjection {
                    name,
                    projection: projection.clone(),
                    ty: other.data_type(),
                });
                projections.push(projection);
            }
        }

        Ok(Selection {
            projections: Some(projections),
            names,
            shape: Some(body.clone()),
        })
    }
}

fn collect(
    name: &str,
    member: &Expr,
    ctx: &TranslationContext<'_>,
    projections: &mut Vec<Projection>,
    names: &mut Vec<NamedProjection>,
) -> Result<(), FlowError> {
    if let Expr::New { members, .. } = member {
        for (inner, expr) in members {
            collect(&format!("{name}.{inner}"), expr, ctx, projections, names)?;
        }
        return Ok(());
    }
    let projection = project(member, ctx)?;
    if projection.column_count() == 1 {
        names.push(NamedProjection {
            name: name.to_string(),
            projection: projection.clone(),
            ty: member.data_type(),
        });
    }
    projections.push(projection);
    Ok(())
}

/// Owned state needed to turn rows back into values after the builder is gone
#[derive(Clone)]
pub(crate) struct RowMapper {
    pub shape: Option<Expr>,
    pub root: String,
    pub root_alias: String,
    pub aliases: AliasTable,
    pub registry: Arc<HandlerRegistry>,
    pub entity: &'static EntityMeta,
}

impl RowMapper {
    fn row_value(&self, row: &ResultRow) -> Result<Value, FlowError> {
        match &self.shape {
            Some(shape) => {
                let ctx = TranslationContext::new(
                    &self.root,
                    &self.root_alias,
                    &self.aliases,
                    &self.registry,
                );
                let mut cursor = RowCursor::new(&row.values);
                construct(shape, &ctx, &mut cursor)
            }
            None => {
                let mut object = BTreeMap::new();
                for (index, property) in self.entity.scalar_properties().enumerate() {
                    let cell = row
                        .get(property.name)
                        .or_else(|| row.values.get(index))
                        .cloned()
                        .ok_or_else(|| {
                            FlowError::mapping(format!(
                                "row has no column for {}.{}",
                                self.entity.name, property.name
                            ))
                        })?;
                    let ty = property.data_type();
                    let cell = if ty.is_numeric() && cell.is_numeric() {
                        cell.convert_to(&ty)?
                    } else {
                        cell
                    };
                    object.insert(property.name.to_string(), cell);
                }
                Ok(Value::Object(object))
            }
        }
    }

    pub fn map<D: DeserializeOwned>(&self, rows: &[ResultRow]) -> Result<Vec<D>, FlowError> {
        rows.iter()
            .map(|row| {
                let json = self.row_value(row)?.to_json();
                serde_json::from_value(json).map_err(|e| {
                    FlowError::mapping(format!("could not deserialize result row: {e}"))
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::PropertyMeta;
    use crate::expression::Parameter;
    use crate::value::{DataType, Typed};
    use once_cell::sync::Lazy;

    static PERSON: Lazy<EntityMeta> = Lazy::new(|| EntityMeta {
        name: "Person",
        table: "person",
        properties: vec![
            PropertyMeta {
                name: "id",
                column: "id",
                data_type: <i64 as Typed>::data_type,
                relation: None,
                primary_key: true,
            },
            PropertyMeta {
                name: "name",
                column: "full_name",
                data_type: <String as Typed>::data_type,
                relation: None,
                primary_key: false,
            },
        ],
    });

    fn person() -> Expr {
        Expr::Parameter(Parameter::new("p", DataType::Object))
    }

    fn mapper(shape: Option<Expr>, registry: Arc<HandlerRegistry>) -> RowMapper {
        RowMapper {
            shape,
            root: "p".into(),
            root_alias: "this".into(),
            aliases: AliasTable::new(),
            registry,
            entity: &PERSON,
        }
    }

    #[test]
    fn test_nested_members_get_dotted_names() {
        let registry = HandlerRegistry::new();
        let aliases = AliasTable::new();
        let ctx = TranslationContext::new("p", "this", &aliases, &registry);
        let body = Expr::object([
            ("id", person().get_as("id", DataType::Long)),
            (
                "inner",
                Expr::object([("name", person().get_as("name", DataType::String))]),
            ),
        ]);
        let selection = Selection::from_body(&body, &ctx, &PERSON).unwrap();
        let names: Vec<_> = selection.names.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, ["id", "inner.name"]);
        assert_eq!(selection.projections.map(|p| p.len()), Some(2));
    }

    #[test]
    fn test_root_parameter_selects_the_entity() {
        let registry = HandlerRegistry::new();
        let aliases = AliasTable::new();
        let ctx = TranslationContext::new("p", "this", &aliases, &registry);
        let selection = Selection::from_body(&person(), &ctx, &PERSON).unwrap();
        assert!(selection.projections.is_none());
        assert_eq!(selection.names.len(), 2);
    }

    #[test]
    fn test_entity_rows_map_by_column_name_then_position() {
        #[derive(serde::Deserialize, Debug, PartialEq)]
        struct Person {
            id: i64,
            name: String,
        }
        let rows = vec![
            ResultRow::new(
                vec!["name".into(), "id".into()],
                vec![Value::String("ann".into()), Value::Int(1)],
            ),
            ResultRow::positional(vec![Value::Long(2), Value::String("bob".into())]),
        ];
        let people: Vec<Person> = mapper(None, Arc::new(HandlerRegistry::new()))
            .map(&rows)
            .unwrap();
        assert_eq!(people[0], Person { id: 1, name: "ann".into() });
        assert_eq!(people[1], Person { id: 2, name: "bob".into() });
    }

    #[test]
    fn test_deserialize_failure_is_a_mapping_error() {
        let shape = person().get_as("name", DataType::String);
        let rows = vec![ResultRow::positional(vec![Value::String("ann".into())])];
        let err = mapper(Some(shape), Arc::new(HandlerRegistry::new()))
            .map::<i64>(&rows)
            .unwrap_err();
        assert!(matches!(err, FlowError::Mapping(_)));
    }
}
