//! Deferred execution handles.

use std::fmt;

use once_cell::unsync::OnceCell;

use crate::error::FlowError;
use crate::executor::{CompiledQuery, ResultRow, Session};

type Mapper<'s, R> = Box<dyn Fn(Vec<ResultRow>) -> Result<R, FlowError> + 's>;

/// A compiled query executed on first access
///
/// The result is cached; later accesses do not hit the session again. A failed
/// execution is not cached, the next access retries.
pub struct Delayed<'s, R> {
    session: &'s dyn Session,
    query: CompiledQuery,
    mapper: Mapper<'s, R>,
    cell: OnceCell<R>,
}

impl<'s, R> Delayed<'s, R> {
    pub(crate) fn new(
        session: &'s dyn Session,
        query: CompiledQuery,
        mapper: impl Fn(Vec<ResultRow>) -> Result<R, FlowError> + 's,
    ) -> Self {
        Delayed {
            session,
            query,
            mapper: Box::new(mapper),
            cell: OnceCell::new(),
        }
    }

    fn execute(
        session: &dyn Session,
        query: &CompiledQuery,
        mapper: &Mapper<'s, R>,
    ) -> Result<R, FlowError> {
        log::debug!("executing delayed query: {}", query.sql);
        let rows = session.list(query)?;
        mapper(rows)
    }

    /// Executes the query unless it already ran
    pub fn value(&self) -> Result<&R, FlowError> {
        self.cell
            .get_or_try_init(|| Self::execute(self.session, &self.query, &self.mapper))
    }

    pub fn into_value(self) -> Result<R, FlowError> {
        let Delayed {
            session,
            query,
            mapper,
            cell,
        } = self;
        match cell.into_inner() {
            Some(value) => Ok(value),
            None => Self::execute(session, &query, &mapper),
        }
    }

    pub fn is_evaluated(&self) -> bool {
        self.cell.get().is_some()
    }

    /// The statement that runs on first access
    pub fn query(&self) -> &CompiledQuery {
        &self.query
    }
}

impl<R: fmt::Debug> fmt::Debug for Delayed<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delayed")
            .field("sql", &self.query.sql)
            .field("value", &self.cell.get())
            .finish()
    }
}
