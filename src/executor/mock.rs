//! In-memory session that replays queued result sets.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::executor::{CompiledQuery, ResultRow, Session, SessionError};
use crate::value::Value;

/// Records executed queries and answers them from a queue
///
/// An empty queue answers with no rows.
#[derive(Default)]
pub struct MockSession {
    results: Mutex<VecDeque<Result<Vec<ResultRow>, String>>>,
    executed: Mutex<Vec<CompiledQuery>>,
}

impl MockSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the rows returned by the next execution
    pub fn push_rows(&self, rows: Vec<ResultRow>) -> &Self {
        self.results
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push_back(Ok(rows));
        self
    }

    /// Queues positional rows, one `Vec<Value>` per row
    pub fn push_values(&self, rows: Vec<Vec<Value>>) -> &Self {
        self.push_rows(rows.into_iter().map(ResultRow::positional).collect())
    }

    /// Queues a failure for the next execution
    pub fn push_error(&self, message: impl Into<String>) -> &Self {
        self.results
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push_back(Err(message.into()));
        self
    }

    /// Every query executed so far, oldest first
    pub fn executed(&self) -> Vec<CompiledQuery> {
        self.executed.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn last_sql(&self) -> Option<String> {
        self.executed
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .last()
            .map(|q| q.sql.clone())
    }

    pub fn execution_count(&self) -> usize {
        self.executed.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

impl Session for MockSession {
    fn list(&self, query: &CompiledQuery) -> Result<Vec<ResultRow>, SessionError> {
        log::debug!("mock session executing: {}", query.sql);
        self.executed
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(query.clone());
        match self.results.lock().unwrap_or_else(|p| p.into_inner()).pop_front() {
            Some(Ok(rows)) => Ok(rows),
            Some(Err(message)) => Err(SessionError::QueryError(message)),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::ExecutionOptions;

    fn query(sql: &str) -> CompiledQuery {
        CompiledQuery {
            sql: sql.to_string(),
            values: sea_query::Values(Vec::new()),
            options: ExecutionOptions::default(),
        }
    }

    #[test]
    fn test_replays_in_order_and_records() {
        let session = MockSession::new();
        session.push_values(vec![vec![Value::Int(1)]]).push_error("boom");

        assert_eq!(session.list(&query("a")).unwrap().len(), 1);
        assert!(matches!(session.list(&query("b")), Err(SessionError::QueryError(_))));
        assert!(session.list(&query("c")).unwrap().is_empty());
        assert_eq!(session.execution_count(), 3);
        assert_eq!(session.last_sql().as_deref(), Some("c"));
    }
}
