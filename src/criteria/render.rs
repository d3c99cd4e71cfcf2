//! Rendering of the criteria model to SeaQuery.
//!
//! Property paths are resolved against entity metadata: a leading segment naming
//! a join alias selects that join's entity, anything else is relative to the root
//! alias. `reference.id` on a many-to-one resolves to the foreign key column
//! without requiring a join.

use std::collections::HashMap;

use sea_query::{
    Asterisk, BinOper, Condition, Expr as SqlExpr, ExprTrait, Func, Iden, Order as SqlOrder,
    PostgresQueryBuilder, Query, SelectStatement,
};

use crate::criteria::{
    AggregateFunction, ArithmeticOp, CompareOp, Criteria, Criterion, Join, JoinType, Projection,
    Quantifier, SqlFunction,
};
use crate::entity::{EntityMeta, PropertyMeta, Relation};
use crate::error::FlowError;
use crate::value::{DataType, Value};

/// Dynamic identifier (table, alias or column name)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident(pub String);

impl Ident {
    pub fn new(name: impl Into<String>) -> Self {
        Ident(name.into())
    }
}

impl Iden for Ident {
    fn unquoted(&self) -> &str {
        &self.0
    }
}

impl From<JoinType> for sea_query::JoinType {
    fn from(join_type: JoinType) -> Self {
        match join_type {
            JoinType::Inner => sea_query::JoinType::InnerJoin,
            JoinType::LeftOuter => sea_query::JoinType::LeftJoin,
            JoinType::RightOuter => sea_query::JoinType::RightJoin,
            JoinType::FullOuter => sea_query::JoinType::FullOuterJoin,
        }
    }
}

/// Alias to entity bindings for one statement
struct Scope<'c> {
    criteria: &'c Criteria,
    aliases: HashMap<String, &'static EntityMeta>,
}

impl<'c> Scope<'c> {
    fn new(criteria: &'c Criteria) -> Self {
        let mut aliases = HashMap::new();
        aliases.insert(criteria.root_alias.clone(), criteria.meta());
        Scope { criteria, aliases }
    }

    /// Splits a path into its base alias, that alias' entity and the remaining segments
    fn base<'p>(&self, segments: &'p [&'p str]) -> (String, &'static EntityMeta, &'p [&'p str]) {
        if segments.len() > 1 {
            if let Some(meta) = self.aliases.get(segments[0]) {
                return (segments[0].to_string(), meta, &segments[1..]);
            }
        }
        (
            self.criteria.root_alias.clone(),
            self.criteria.meta(),
            segments,
        )
    }

    fn property(meta: &'static EntityMeta, name: &str) -> Result<&'static PropertyMeta, FlowError> {
        meta.property(name).ok_or_else(|| {
            FlowError::invalid_operation(format!(
                "could not resolve property '{name}' of entity {}",
                meta.name
            ))
        })
    }

    /// Registers a join alias and returns the joined table plus its on-clause
    fn bind_join(&mut self, join: &Join) -> Result<(&'static EntityMeta, SqlExpr), FlowError> {
        let segments: Vec<&str> = join.path.split('.').collect();
        let (base_alias, base_meta, rest) = self.base(&segments);
        let [name] = rest else {
            return Err(FlowError::invalid_operation(format!(
                "join path '{}' must name a single association of a joined alias",
                join.path
            )));
        };
        let property = Self::property(base_meta, name)?;
        let Some(relation) = property.relation else {
            return Err(FlowError::invalid_operation(format!(
                "'{}' is not an association of {}",
                join.path, base_meta.name
            )));
        };
        let target = relation.target();
        let on = match relation {
            Relation::ManyToOne { column, .. } => column_expr(&base_alias, column)
                .eq(column_expr(&join.alias, target.primary_key_column())),
            Relation::OneToMany { key, .. } => column_expr(&join.alias, key)
                .eq(column_expr(&base_alias, base_meta.primary_key_column())),
        };
        self.aliases.insert(join.alias.clone(), target);
        Ok((target, on))
    }

    fn column(&self, path: &str) -> Result<SqlExpr, FlowError> {
        let segments: Vec<&str> = path.split('.').collect();
        let (alias, meta, rest) = self.base(&segments);
        match rest {
            [name] if !name.is_empty() => {
                let property = Self::property(meta, name)?;
                match property.relation {
                    Some(Relation::OneToMany { .. }) => Err(FlowError::invalid_operation(format!(
                        "collection '{path}' cannot be used as a value, join it instead"
                    ))),
                    _ => Ok(column_expr(&alias, property.column)),
                }
            }
            [navigation, leaf] => {
                let property = Self::property(meta, navigation)?;
                match property.relation {
                    Some(Relation::ManyToOne { column, target })
                        if target().primary_key().map(|pk| pk.name).unwrap_or("id") == *leaf =>
                    {
                        Ok(column_expr(&alias, column))
                    }
                    _ => Err(FlowError::invalid_operation(format!(
                        "property path '{path}' crosses an association; \
                         join '{navigation}' under an alias first"
                    ))),
                }
            }
            _ => Err(FlowError::invalid_operation(format!(
                "could not resolve property path '{path}'"
            ))),
        }
    }

    fn projection(&self, projection: &Projection) -> Result<SqlExpr, FlowError> {
        Ok(match projection {
            Projection::Property(path) => self.column(path)?,
            Projection::Constant { value, ty } => constant_expr(value, ty)?,
            Projection::Function { function, ty, args } => {
                let args = args
                    .iter()
                    .map(|a| self.projection(a))
                    .collect::<Result<Vec<_>, _>>()?;
                function_expr(function, ty, args)?
            }
            Projection::Conditional { test, if_true, if_false } => {
                SqlExpr::case(self.criterion(test)?, self.projection(if_true)?)
                    .finally(self.projection(if_false)?)
                    .into()
            }
            Projection::Aggregate { function, arg } => {
                let arg = self.projection(arg)?;
                match function {
                    AggregateFunction::Sum => Func::sum(arg).into(),
                    AggregateFunction::Avg => Func::avg(arg).into(),
                    AggregateFunction::Min => Func::min(arg).into(),
                    AggregateFunction::Max => Func::max(arg).into(),
                    AggregateFunction::Count => Func::count(arg).into(),
                }
            }
            Projection::CountDistinct(path) => Func::count_distinct(self.column(path)?).into(),
            Projection::GroupBy(inner) => self.projection(inner)?,
            Projection::SubQuery(query) => sub_query(query)?,
            Projection::RowCount => Func::count(SqlExpr::col(Asterisk)).into(),
            Projection::Aliased { projection, .. } => self.projection(projection)?,
            Projection::List(_) => {
                return Err(FlowError::invalid_operation(
                    "a multi-column projection cannot be used as a single value",
                ))
            }
        })
    }

    fn criterion(&self, criterion: &Criterion) -> Result<SqlExpr, FlowError> {
        Ok(match criterion {
            Criterion::And(l, r) => self.criterion(l)?.and(self.criterion(r)?),
            Criterion::Or(l, r) => self.criterion(l)?.or(self.criterion(r)?),
            Criterion::Not(inner) => self.criterion(inner)?.not(),
            Criterion::Compare { op, projection, value } => match projection {
                Projection::Constant { value: left, .. } => fold_constant(*op, left, value),
                _ => compare(*op, self.projection(projection)?, value_expr(value)?),
            },
            Criterion::PropertyCompare { op, property, other } => {
                compare(*op, self.column(property)?, self.projection(other)?)
            }
            Criterion::ProjectionCompare { op, left, right } => {
                compare(*op, self.projection(left)?, self.projection(right)?)
            }
            Criterion::IsNull(p) => self.projection(p)?.is_null(),
            Criterion::IsNotNull(p) => self.projection(p)?.is_not_null(),
            Criterion::Between { projection, low, high } => {
                self.projection(projection)?.between(value_expr(low)?, value_expr(high)?)
            }
            Criterion::In { projection, values } => {
                let values = values
                    .iter()
                    .map(value_expr)
                    .collect::<Result<Vec<_>, _>>()?;
                self.projection(projection)?.is_in(values)
            }
            Criterion::InSubquery { projection, query } => {
                self.projection(projection)?.in_subquery(query.to_statement()?)
            }
            Criterion::SubqueryCompare { op, projection, quantifier, query } => {
                let statement = query.to_statement()?;
                let right = match quantifier {
                    None => sub_query(query)?,
                    Some(Quantifier::All) => SqlExpr::all(statement),
                    Some(Quantifier::Some) => SqlExpr::some(statement),
                    Some(Quantifier::Any) => SqlExpr::any(statement),
                };
                compare(*op, self.projection(projection)?, right)
            }
            Criterion::Like { projection, pattern, mode } => {
                self.projection(projection)?.like(mode.to_pattern(pattern))
            }
        })
    }
}

fn column_expr(alias: &str, column: &str) -> SqlExpr {
    SqlExpr::col((Ident::new(alias), Ident::new(column)))
}

fn value_expr(value: &Value) -> Result<SqlExpr, FlowError> {
    Ok(SqlExpr::val(value.to_sea_value()?))
}

/// Constants in select lists are cast so the parameter type is never left to inference
fn constant_expr(value: &Value, ty: &DataType) -> Result<SqlExpr, FlowError> {
    if value.is_null() {
        return Ok(SqlExpr::cust("NULL"));
    }
    let ty = if ty.is_known() { ty.clone() } else { value.data_type() };
    let bound = value.convert_to(&ty)?.to_sea_value()?;
    Ok(match ty.sql_name() {
        Some(name) => Func::cast_as(SqlExpr::val(bound), Ident::new(name)).into(),
        None => SqlExpr::val(bound),
    })
}

fn function_expr(
    function: &SqlFunction,
    ty: &DataType,
    mut args: Vec<SqlExpr>,
) -> Result<SqlExpr, FlowError> {
    Ok(match function {
        SqlFunction::Named(name) => Func::cust(Ident::new(name.as_str())).args(args).into(),
        SqlFunction::Arithmetic(op) => {
            if args.len() != 2 {
                return Err(FlowError::invalid_operation(format!(
                    "arithmetic '{}' expects two operands",
                    op.symbol()
                )));
            }
            let right = args.pop().unwrap_or_else(|| SqlExpr::cust("NULL"));
            let left = args.pop().unwrap_or_else(|| SqlExpr::cust("NULL"));
            let op = match op {
                ArithmeticOp::Add => BinOper::Add,
                ArithmeticOp::Subtract => BinOper::Sub,
                ArithmeticOp::Multiply => BinOper::Mul,
                ArithmeticOp::Divide => BinOper::Div,
                ArithmeticOp::Modulo => BinOper::Mod,
            };
            left.binary(op, right)
        }
        SqlFunction::Cast(target) => {
            let name = target.sql_name().or(ty.sql_name()).ok_or_else(|| {
                FlowError::invalid_operation(format!("no SQL type for cast to {target:?}"))
            })?;
            let arg = args
                .pop()
                .ok_or_else(|| FlowError::invalid_operation("cast expects one operand"))?;
            Func::cast_as(arg, Ident::new(name)).into()
        }
        SqlFunction::Negate => {
            let arg = args
                .pop()
                .ok_or_else(|| FlowError::invalid_operation("negation expects one operand"))?;
            SqlExpr::val(0).binary(BinOper::Sub, arg)
        }
    })
}

fn compare(op: CompareOp, left: SqlExpr, right: SqlExpr) -> SqlExpr {
    match op {
        CompareOp::Eq => left.eq(right),
        CompareOp::Ne => left.ne(right),
        CompareOp::Gt => left.gt(right),
        CompareOp::Ge => left.gte(right),
        CompareOp::Lt => left.lt(right),
        CompareOp::Le => left.lte(right),
    }
}

/// Both sides are literals: decide in process and emit `TRUE` / `FALSE`
fn fold_constant(op: CompareOp, left: &Value, right: &Value) -> SqlExpr {
    let ordering = left.compare(right);
    let holds = match op {
        CompareOp::Eq => left.loose_eq(right),
        CompareOp::Ne => !left.loose_eq(right),
        CompareOp::Gt => ordering.is_some_and(|o| o.is_gt()),
        CompareOp::Ge => ordering.is_some_and(|o| o.is_ge()),
        CompareOp::Lt => ordering.is_some_and(|o| o.is_lt()),
        CompareOp::Le => ordering.is_some_and(|o| o.is_le()),
    };
    SqlExpr::cust(if holds { "TRUE" } else { "FALSE" })
}

fn sub_query(query: &Criteria) -> Result<SqlExpr, FlowError> {
    Ok(SqlExpr::SubQuery(
        None,
        Box::new(query.to_statement()?.into_sub_query_statement()),
    ))
}

impl Criteria {
    /// Renders the criteria as a SeaQuery select statement
    ///
    /// # Errors
    ///
    /// Returns `FlowError::InvalidOperation` when a property path or join cannot be
    /// resolved against entity metadata.
    pub fn to_statement(&self) -> Result<SelectStatement, FlowError> {
        let mut scope = Scope::new(self);
        let mut statement = Query::select();
        statement.from_as(Ident::new(self.meta().table), Ident::new(self.root_alias.as_str()));

        for join in &self.joins {
            let (target, on) = scope.bind_join(join)?;
            let mut condition = Condition::all().add(on);
            if let Some(with) = &join.with {
                condition = condition.add(scope.criterion(with)?);
            }
            statement.join_as(
                join.join_type.into(),
                Ident::new(target.table),
                Ident::new(join.alias.as_str()),
                condition,
            );
        }

        match &self.projections {
            None => {
                for property in self.meta().scalar_properties() {
                    statement.expr_as(
                        column_expr(&self.root_alias, property.column),
                        Ident::new(property.name),
                    );
                }
            }
            Some(projections) => {
                let mut group_by = Vec::new();
                let columns = projections.iter().cloned().flat_map(Projection::flatten);
                for (index, projection) in columns.enumerate() {
                    let (inner, alias) = match projection {
                        Projection::Aliased { projection, alias } => (*projection, alias),
                        other => (other, format!("y{index}_")),
                    };
                    let expr = scope.projection(&inner)?;
                    if inner.is_grouping() {
                        group_by.push(expr.clone());
                    }
                    statement.expr_as(expr, Ident::new(alias));
                }
                if !group_by.is_empty() {
                    statement.add_group_by(group_by);
                }
            }
        }

        if self.distinct {
            statement.distinct();
        }
        for criterion in &self.restrictions {
            statement.and_where(scope.criterion(criterion)?);
        }
        for order in &self.orders {
            let direction = if order.ascending { SqlOrder::Asc } else { SqlOrder::Desc };
            statement.order_by_expr(scope.projection(&order.projection)?, direction);
        }
        if let Some(limit) = self.max_results {
            statement.limit(limit);
        }
        if let Some(offset) = self.first_result {
            statement.offset(offset);
        }

        Ok(statement)
    }

    /// Renders the criteria to PostgreSQL text plus bound parameters
    ///
    /// A query comment is emitted as a leading `/* ... */` block.
    pub fn to_sql(&self) -> Result<(String, sea_query::Values), FlowError> {
        let (sql, values) = self.to_statement()?.build(PostgresQueryBuilder);
        let sql = match &self.options.comment {
            Some(comment) => format!("/* {} */ {sql}", comment.replace("*/", "* /")),
            None => sql,
        };
        Ok((sql, values))
    }
}
