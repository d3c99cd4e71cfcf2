//! The fluent query builder.

use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;

use crate::criteria::{Criteria, Criterion, ExecutionOptions, Join, JoinType, Projection};
use crate::entity::{Entity, EntityRef};
use crate::error::FlowError;
use crate::executor::{CompiledQuery, ResultRow, Session};
use crate::expression::{project, restrict, IsExpression, Lambda, Parameter, TranslationContext};
use crate::query::delayed::Delayed;
use crate::query::order::{resolve_orders, OrderStatement};
use crate::query::select::{RowMapper, Selection};
use crate::query::{validate_path, AliasTable, QueryContext, Registration};
use crate::value::{DataType, Typed, Value};

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// How a query is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// Terminal calls run against the session right away
    Immediate,
    /// Terminal calls return [`Delayed`] handles
    Delayed,
    /// No session; the query is compiled into a [`Criteria`] for use as a sub-query
    Detached,
}

/// Typed, fluent query over entity `T`
///
/// Builder calls consume and return the query so translation errors surface
/// with `?` at the call that received the offending lambda. Terminal calls
/// borrow it, so a built query can run several times.
pub struct FlowQuery<'s, T: Entity> {
    kind: QueryKind,
    session: Option<&'s dyn Session>,
    context: QueryContext,
    aliases: AliasTable,
    joins: Vec<Join>,
    restrictions: Vec<Criterion>,
    orders: Vec<OrderStatement>,
    skip: Option<u64>,
    take: Option<u64>,
    distinct: bool,
    options: ExecutionOptions,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> Clone for FlowQuery<'_, T> {
    fn clone(&self) -> Self {
        FlowQuery {
            kind: self.kind,
            session: self.session,
            context: self.context.clone(),
            aliases: self.aliases.clone(),
            joins: self.joins.clone(),
            restrictions: self.restrictions.clone(),
            orders: self.orders.clone(),
            skip: self.skip,
            take: self.take,
            distinct: self.distinct,
            options: self.options.clone(),
            _entity: PhantomData,
        }
    }
}

impl<T: Entity> fmt::Debug for FlowQuery<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowQuery")
            .field("entity", &T::meta().name)
            .field("kind", &self.kind)
            .field("aliases", &self.aliases)
            .field("joins", &self.joins)
            .field("restrictions", &self.restrictions)
            .field("orders", &self.orders)
            .field("skip", &self.skip)
            .field("take", &self.take)
            .field("distinct", &self.distinct)
            .finish()
    }
}

macro_rules! join_variants {
    ($($join_type:expr => $name:ident, $name_on:ident, $name_path:ident;)*) => {
        $(
            pub fn $name(self, path: Lambda, alias: &str) -> Result<Self, FlowError> {
                self.join(path, alias, $join_type, None)
            }

            pub fn $name_on(
                self,
                path: Lambda,
                alias: &str,
                on: Lambda,
            ) -> Result<Self, FlowError> {
                self.join(path, alias, $join_type, Some(on))
            }

            pub fn $name_path(self, path: &str, alias: &str) -> Result<Self, FlowError> {
                self.join_path(path, alias, $join_type, None)
            }
        )*
    };
}

impl<T: Entity> FlowQuery<'static, T> {
    /// A session-less query, compiled with the `build_*` methods
    pub fn detached() -> Self {
        FlowQuery::new(QueryKind::Detached, None)
    }
}

impl<'s, T: Entity> FlowQuery<'s, T> {
    fn new(kind: QueryKind, session: Option<&'s dyn Session>) -> Self {
        FlowQuery {
            kind,
            session,
            context: QueryContext::new(),
            aliases: AliasTable::new(),
            joins: Vec::new(),
            restrictions: Vec::new(),
            orders: Vec::new(),
            skip: None,
            take: None,
            distinct: false,
            options: ExecutionOptions::default(),
            _entity: PhantomData,
        }
    }

    pub fn immediate(session: &'s dyn Session) -> Self {
        FlowQuery::new(QueryKind::Immediate, Some(session))
    }

    pub fn delayed(session: &'s dyn Session) -> Self {
        FlowQuery::new(QueryKind::Delayed, Some(session))
    }

    /// Replaces the handler registry and defaults the query translates with
    pub fn with_context(mut self, context: QueryContext) -> Self {
        self.context = context;
        self
    }

    pub fn kind(&self) -> QueryKind {
        self.kind
    }

    pub fn aliases(&self) -> &AliasTable {
        &self.aliases
    }

    pub fn context(&self) -> &QueryContext {
        &self.context
    }

    fn check_root(&self, root: &Parameter) -> Result<(), FlowError> {
        if self.aliases.contains_alias(&root.name) {
            return Ok(());
        }
        let expected = T::data_type();
        match &root.ty {
            DataType::Entity(_) if !root.ty.compatible_with(&expected) => {
                Err(FlowError::argument_shape(format!(
                    "lambda parameter '{}' is {:?}, the query is over {}",
                    root.name,
                    root.ty,
                    T::meta().name
                )))
            }
            _ => Ok(()),
        }
    }

    /// Runs `f` with a context rooted at the lambda's first parameter
    fn translate<R>(
        &self,
        operation: &'static str,
        lambda: &Lambda,
        f: impl FnOnce(&TranslationContext<'_>) -> Result<R, FlowError>,
    ) -> Result<R, FlowError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::translate_span(operation).entered();

        let result = lambda.root().and_then(|root| {
            self.check_root(root)?;
            // A parameter named after a join alias stands for the alias, not the root
            let root_name = if self.aliases.contains_alias(&root.name) {
                ""
            } else {
                root.name.as_str()
            };
            let ctx = TranslationContext::new(
                root_name,
                &self.context.root_alias,
                &self.aliases,
                &self.context.registry,
            );
            f(&ctx)
        });

        if let Err(e) = &result {
            log::debug!("could not translate {operation} lambda: {e}");
            #[cfg(feature = "metrics")]
            METRICS.record_translation_error();
        }
        result
    }

    /// Adds a restriction; several calls are ANDed in order
    ///
    /// The lambda takes the entity and optionally a [`WhereDelegate`](crate::WhereDelegate)
    /// second parameter that binds `Is` predicates to properties.
    pub fn where_(mut self, filter: Lambda) -> Result<Self, FlowError> {
        match filter.params.as_slice() {
            [_] => {}
            [_, delegate] if delegate.ty == DataType::WhereDelegate => {}
            [_, other] => {
                return Err(FlowError::argument_shape(format!(
                    "second filter parameter '{}' must be a where-delegate",
                    other.name
                )))
            }
            params => {
                return Err(FlowError::argument_shape(format!(
                    "a filter takes one or two parameters, got {}",
                    params.len()
                )))
            }
        }
        let criterion = self.translate("where", &filter, |ctx| restrict(filter.body(), ctx))?;
        self.restrictions.push(criterion);
        Ok(self)
    }

    /// Same as [`where_`](Self::where_)
    pub fn and(self, filter: Lambda) -> Result<Self, FlowError> {
        self.where_(filter)
    }

    /// Applies `is` to the value `property` selects
    pub fn where_is(mut self, property: Lambda, is: IsExpression) -> Result<Self, FlowError> {
        let criterion = self.translate("where_is", &property, |ctx| {
            is.compile_as(project(property.body(), ctx)?, &property.body().data_type())
        })?;
        self.restrictions.push(criterion);
        Ok(self)
    }

    /// Adds an already built restriction
    pub fn restriction(mut self, criterion: Criterion) -> Self {
        self.restrictions.push(criterion);
        self
    }

    /// Joins the association `path` selects under `alias`
    ///
    /// Joining the same path under the same alias again is a no-op. The
    /// on-clause may refer to the joined entity through
    /// [`Expr::alias`](crate::Expr::alias).
    pub fn join(
        self,
        path: Lambda,
        alias: &str,
        join_type: JoinType,
        on: Option<Lambda>,
    ) -> Result<Self, FlowError> {
        let path = self.translate("join", &path, |ctx| ctx.required_property_name(path.body()))?;
        self.register_join(path, alias, join_type, on)
    }

    /// Joins a dotted association path given as text
    pub fn join_path(
        self,
        path: &str,
        alias: &str,
        join_type: JoinType,
        on: Option<Lambda>,
    ) -> Result<Self, FlowError> {
        validate_path(path)?;
        self.register_join(path.to_string(), alias, join_type, on)
    }

    fn register_join(
        mut self,
        path: String,
        alias: &str,
        join_type: JoinType,
        on: Option<Lambda>,
    ) -> Result<Self, FlowError> {
        if self.aliases.register(&path, alias)? == Registration::Existing {
            log::debug!("'{path}' is already joined as '{alias}'");
            return Ok(self);
        }

        let with = match on {
            Some(on) => Some(self.translate("join_on", &on, |ctx| restrict(on.body(), ctx))?),
            None => None,
        };

        log::debug!("joining '{path}' as '{alias}' ({join_type:?})");
        self.joins.push(Join {
            path,
            alias: alias.to_string(),
            join_type,
            with,
        });
        Ok(self)
    }

    join_variants! {
        JoinType::Inner => inner_join, inner_join_on, inner_join_path;
        JoinType::LeftOuter => left_join, left_join_on, left_join_path;
        JoinType::RightOuter => right_join, right_join_on, right_join_path;
        JoinType::FullOuter => full_join, full_join_on, full_join_path;
    }

    fn order_source(mut self, key: Lambda, ascending: bool) -> Result<Self, FlowError> {
        let projection = self.translate("order_by", &key, |ctx| project(key.body(), ctx))?;
        self.orders.push(OrderStatement::source(projection, ascending));
        Ok(self)
    }

    pub fn order_by(self, key: Lambda) -> Result<Self, FlowError> {
        self.order_source(key, true)
    }

    pub fn order_by_descending(self, key: Lambda) -> Result<Self, FlowError> {
        self.order_source(key, false)
    }

    /// Orders by a named entry of the select list, resolved when the select is built
    pub fn order_by_projected(mut self, name: &str) -> Self {
        self.orders.push(OrderStatement::projected(name, None, true));
        self
    }

    pub fn order_by_projected_descending(mut self, name: &str) -> Self {
        self.orders.push(OrderStatement::projected(name, None, false));
        self
    }

    /// Like [`order_by_projected`](Self::order_by_projected), also checking the entry's type
    pub fn order_by_projected_typed<V: Typed>(mut self, name: &str, ascending: bool) -> Self {
        self.orders
            .push(OrderStatement::projected(name, Some(V::data_type()), ascending));
        self
    }

    pub fn skip(mut self, rows: u64) -> Self {
        self.skip = Some(rows);
        self
    }

    pub fn take(mut self, rows: u64) -> Self {
        self.take = Some(rows);
        self
    }

    pub fn limit(self, take: u64, skip: u64) -> Self {
        self.take(take).skip(skip)
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn cacheable(mut self) -> Self {
        self.options.cacheable = true;
        self
    }

    pub fn cache_region(mut self, region: impl Into<String>) -> Self {
        self.options.cacheable = true;
        self.options.cache_region = Some(region.into());
        self
    }

    /// Statement timeout in seconds
    pub fn timeout(mut self, seconds: u64) -> Self {
        self.options.timeout = Some(seconds);
        self
    }

    pub fn fetch_size(mut self, rows: u32) -> Self {
        self.options.fetch_size = Some(rows);
        self
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.options.comment = Some(comment.into());
        self
    }

    pub fn read_only(mut self) -> Self {
        self.options.read_only = true;
        self
    }

    /// Edits the execution hints directly
    pub fn options(mut self, edit: impl FnOnce(&mut ExecutionOptions)) -> Self {
        edit(&mut self.options);
        self
    }

    fn base_criteria(&self) -> Criteria {
        let mut criteria = Criteria::new(EntityRef::of::<T>(), self.context.root_alias.clone());
        criteria.joins = self.joins.clone();
        criteria.restrictions = self.restrictions.clone();
        criteria.distinct = self.distinct;
        criteria.first_result = self.skip;
        criteria.max_results = self.take;

        let mut options = self.options.clone();
        if options.timeout.is_none() {
            options.timeout = self.context.default_timeout;
        }
        if options.fetch_size.is_none() {
            options.fetch_size = self.context.default_fetch_size;
        }
        criteria.options = options;
        criteria
    }

    fn finish(&self, mut criteria: Criteria, selection: &Selection) -> Result<Criteria, FlowError> {
        criteria.projections = selection.projections.clone();
        let keeps_order =
            self.kind != QueryKind::Detached || self.skip.is_some() || self.take.is_some();
        if !keeps_order && !self.orders.is_empty() {
            log::warn!(
                "dropping {} order statement(s) of a detached query without skip or take",
                self.orders.len()
            );
        }
        criteria.orders = resolve_orders(&self.orders, &selection.names, keeps_order)?;
        Ok(criteria)
    }

    fn selection(&self, select: &Lambda) -> Result<Selection, FlowError> {
        self.translate("select", select, |ctx| {
            Selection::from_body(select.body(), ctx, T::meta())
        })
    }

    fn mapper(&self, select: &Lambda, selection: &Selection) -> Result<RowMapper, FlowError> {
        Ok(RowMapper {
            shape: selection.shape.clone(),
            root: select.root()?.name.clone(),
            root_alias: self.context.root_alias.clone(),
            aliases: self.aliases.clone(),
            registry: self.context.registry.clone(),
            entity: T::meta(),
        })
    }

    fn entity_mapper(&self) -> RowMapper {
        RowMapper {
            shape: None,
            root: String::new(),
            root_alias: self.context.root_alias.clone(),
            aliases: self.aliases.clone(),
            registry: self.context.registry.clone(),
            entity: T::meta(),
        }
    }

    /// Compiles a projected select without executing it
    pub fn build_select(&self, select: &Lambda) -> Result<Criteria, FlowError> {
        let selection = self.selection(select)?;
        self.finish(self.base_criteria(), &selection)
    }

    /// Compiles a select of the root entity's mapped columns
    pub fn build_entities(&self) -> Result<Criteria, FlowError> {
        self.finish(self.base_criteria(), &Selection::entity(T::meta()))
    }

    /// Compiles `count(*)`; ordering and paging do not apply
    pub fn build_count(&self) -> Result<Criteria, FlowError> {
        let mut criteria = self.base_criteria();
        criteria.first_result = None;
        criteria.max_results = None;
        criteria.distinct = false;
        criteria.projections = Some(vec![Projection::RowCount]);
        Ok(criteria)
    }

    /// The query as a sub-query value, for `is_in` and sub-query comparisons
    pub fn to_subquery(&self, select: &Lambda) -> Result<Value, FlowError> {
        Ok(Value::from(self.build_select(select)?))
    }

    fn session_for(
        &self,
        expected: QueryKind,
        operation: &str,
    ) -> Result<&'s dyn Session, FlowError> {
        match (self.kind, self.session) {
            (kind, Some(session)) if kind == expected => Ok(session),
            (QueryKind::Detached, _) | (_, None) => Err(FlowError::invalid_operation(format!(
                "a detached query cannot run {operation}; build it into a sub-query instead"
            ))),
            (kind, _) => Err(FlowError::invalid_operation(format!(
                "{operation} is not available on a {kind:?} query"
            ))),
        }
    }

    fn compile(&self, criteria: &Criteria) -> Result<CompiledQuery, FlowError> {
        let compiled = CompiledQuery::from_criteria(criteria)?;
        if self.context.log_sql {
            log::debug!("flowquery SQL: {}", compiled.sql);
        }
        Ok(compiled)
    }

    fn run(&self, criteria: &Criteria, operation: &str) -> Result<Vec<ResultRow>, FlowError> {
        let session = self.session_for(QueryKind::Immediate, operation)?;
        let compiled = self.compile(criteria)?;
        Ok(session.list(&compiled)?)
    }

    /// Runs a projected select and deserializes every row into `D`
    pub fn select<D: DeserializeOwned>(&self, select: Lambda) -> Result<Vec<D>, FlowError> {
        let selection = self.selection(&select)?;
        let criteria = self.finish(self.base_criteria(), &selection)?;
        let rows = self.run(&criteria, "select")?;
        self.mapper(&select, &selection)?.map(&rows)
    }

    pub fn select_distinct<D: DeserializeOwned>(
        &self,
        select: Lambda,
    ) -> Result<Vec<D>, FlowError> {
        self.clone().distinct().select(select)
    }

    /// Runs a select of the root entity
    pub fn select_all(&self) -> Result<Vec<T>, FlowError>
    where
        T: DeserializeOwned,
    {
        let criteria = self.build_entities()?;
        let rows = self.run(&criteria, "select_all")?;
        self.entity_mapper().map(&rows)
    }

    pub fn count(&self) -> Result<i64, FlowError> {
        let rows = self.run(&self.build_count()?, "count")?;
        Ok(count_of(&rows))
    }

    /// Number of distinct values the lambda selects
    pub fn count_distinct(&self, property: Lambda) -> Result<i64, FlowError> {
        let path = self.translate("count_distinct", &property, |ctx| {
            ctx.required_property_name(property.body())
        })?;
        let mut criteria = self.build_count()?;
        criteria.projections = Some(vec![Projection::CountDistinct(path)]);
        let rows = self.run(&criteria, "count_distinct")?;
        Ok(count_of(&rows))
    }

    /// Whether any row matches
    pub fn any(&self) -> Result<bool, FlowError> {
        let mut criteria = self.build_count()?;
        criteria.projections = Some(vec![Projection::constant(1)]);
        criteria.max_results = Some(1);
        Ok(!self.run(&criteria, "any")?.is_empty())
    }

    pub fn first<D: DeserializeOwned>(&self, select: Lambda) -> Result<Option<D>, FlowError> {
        Ok(self.clone().take(1).select(select)?.into_iter().next())
    }

    pub fn first_or_default<D: DeserializeOwned + Default>(
        &self,
        select: Lambda,
    ) -> Result<D, FlowError> {
        Ok(self.first(select)?.unwrap_or_default())
    }

    /// A projected select executed on first access
    pub fn select_delayed<D>(&self, select: Lambda) -> Result<Delayed<'s, Vec<D>>, FlowError>
    where
        D: DeserializeOwned + 's,
    {
        let session = self.session_for(QueryKind::Delayed, "select_delayed")?;
        let selection = self.selection(&select)?;
        let criteria = self.finish(self.base_criteria(), &selection)?;
        let compiled = self.compile(&criteria)?;
        let mapper = self.mapper(&select, &selection)?;
        Ok(Delayed::new(session, compiled, move |rows| mapper.map(&rows)))
    }

    pub fn count_delayed(&self) -> Result<Delayed<'s, i64>, FlowError> {
        let session = self.session_for(QueryKind::Delayed, "count_delayed")?;
        let compiled = self.compile(&self.build_count()?)?;
        Ok(Delayed::new(session, compiled, |rows| Ok(count_of(&rows))))
    }
}

fn count_of(rows: &[ResultRow]) -> i64 {
    rows.first()
        .and_then(|row| row.values.first())
        .and_then(Value::as_i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EntityMeta, PropertyMeta};
    use crate::executor::mock::MockSession;
    use crate::expression::Expr;
    use once_cell::sync::Lazy;

    struct Item;

    static ITEM: Lazy<EntityMeta> = Lazy::new(|| EntityMeta {
        name: "Item",
        table: "item",
        properties: vec![
            PropertyMeta {
                name: "id",
                column: "id",
                data_type: <i64 as Typed>::data_type,
                relation: None,
                primary_key: true,
            },
            PropertyMeta {
                name: "price",
                column: "price",
                data_type: <i32 as Typed>::data_type,
                relation: None,
                primary_key: false,
            },
        ],
    });

    impl Typed for Item {
        fn data_type() -> DataType {
            DataType::Entity(EntityRef::new(&ITEM))
        }
    }

    impl Entity for Item {
        fn meta() -> &'static EntityMeta {
            &ITEM
        }
    }

    fn item() -> Expr {
        Expr::param::<Item>("i")
    }

    fn lambda(body: Expr) -> Lambda {
        Lambda::new(vec![Parameter::of::<Item>("i")], body)
    }

    #[test]
    fn test_detached_query_refuses_to_execute() {
        let query = FlowQuery::<Item>::detached();
        assert!(matches!(query.count(), Err(FlowError::InvalidOperation(_))));
    }

    #[test]
    fn test_kind_gates_delayed_calls() {
        let session = MockSession::new();
        let immediate = FlowQuery::<Item>::immediate(&session);
        assert!(matches!(immediate.count_delayed(), Err(FlowError::InvalidOperation(_))));
        let delayed = FlowQuery::<Item>::delayed(&session);
        assert!(matches!(delayed.count(), Err(FlowError::InvalidOperation(_))));
        assert!(delayed.count_delayed().is_ok());
    }

    #[test]
    fn test_where_rejects_foreign_root_type() {
        let filter = Lambda::new(
            vec![Parameter::new("x", DataType::Entity(EntityRef::new(&ITEM)))],
            Expr::constant(true),
        );
        assert!(FlowQuery::<Item>::detached().where_(filter).is_ok());

        let other: &'static EntityMeta = Box::leak(Box::new(EntityMeta {
            name: "Other",
            table: "other",
            properties: Vec::new(),
        }));
        let filter = Lambda::new(
            vec![Parameter::new("x", DataType::Entity(EntityRef::new(other)))],
            Expr::constant(true),
        );
        assert!(matches!(
            FlowQuery::<Item>::detached().where_(filter),
            Err(FlowError::ArgumentShape(_))
        ));
    }

    #[test]
    fn test_second_filter_parameter_must_be_a_delegate() {
        let filter = Lambda::new(
            vec![Parameter::of::<Item>("i"), Parameter::of::<i32>("n")],
            Expr::constant(true),
        );
        assert!(matches!(
            FlowQuery::<Item>::detached().where_(filter),
            Err(FlowError::ArgumentShape(_))
        ));
    }

    #[test]
    fn test_count_ignores_paging_and_orders() {
        let query = FlowQuery::<Item>::detached()
            .order_by(lambda(item().get("price")))
            .unwrap()
            .skip(5)
            .take(10);
        let criteria = query.build_count().unwrap();
        assert!(criteria.orders.is_empty());
        assert_eq!(criteria.max_results, None);
        assert_eq!(criteria.projections, Some(vec![Projection::RowCount]));
    }

    #[test]
    fn test_context_defaults_fill_unset_options() {
        let mut context = QueryContext::new();
        context.default_timeout = Some(30);
        context.default_fetch_size = Some(100);
        let criteria = FlowQuery::<Item>::detached()
            .with_context(context)
            .timeout(5)
            .build_entities()
            .unwrap();
        assert_eq!(criteria.options.timeout, Some(5));
        assert_eq!(criteria.options.fetch_size, Some(100));
    }

    #[test]
    fn test_untranslatable_on_clause_fails_the_join() {
        let on = lambda(Expr::param::<i32>("n").gt(1));
        let result =
            FlowQuery::<Item>::detached().join_path("price", "p", JoinType::Inner, Some(on));
        assert!(matches!(result, Err(FlowError::NotSupported(_))));
    }

    #[test]
    fn test_clone_shares_nothing() {
        let base = FlowQuery::<Item>::detached()
            .where_(lambda(item().get("price").gt(1)))
            .unwrap();
        let copy = base.clone().where_(lambda(item().get("price").lt(9))).unwrap();
        assert_eq!(base.build_entities().unwrap().restrictions.len(), 1);
        assert_eq!(copy.build_entities().unwrap().restrictions.len(), 2);
    }
}
