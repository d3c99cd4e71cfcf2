//! Session layer: runs compiled queries against PostgreSQL.
//!
//! The query facade never talks to the database directly. It compiles a
//! [`Criteria`] into a [`CompiledQuery`] and hands it to a [`Session`], which
//! returns rows of dynamically typed cells. [`MayPostgresSession`] is the
//! production implementation over `may_postgres`; [`mock::MockSession`] serves
//! canned rows in tests.

pub mod mock;

use std::fmt;
use std::time::Instant;

use may_postgres::types::Type;
use may_postgres::{Client, Error as PostgresError, Row};

use crate::criteria::{Criteria, ExecutionOptions};
use crate::error::FlowError;
use crate::value::{from_sea_value, with_converted_params, Value};

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Session error type
#[derive(Debug)]
pub enum SessionError {
    /// `PostgreSQL` error from `may_postgres`
    PostgresError(PostgresError),
    /// Query execution error
    QueryError(String),
    /// Cell decoding error
    ParseError(String),
    /// Other execution errors
    Other(String),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::PostgresError(e) => write!(f, "PostgreSQL error: {e}"),
            SessionError::QueryError(s) => write!(f, "Query error: {s}"),
            SessionError::ParseError(s) => write!(f, "Parse error: {s}"),
            SessionError::Other(s) => write!(f, "Execution error: {s}"),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::PostgresError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PostgresError> for SessionError {
    fn from(err: PostgresError) -> Self {
        SessionError::PostgresError(err)
    }
}

/// SQL text, bound parameters and execution hints for one statement
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub values: sea_query::Values,
    pub options: ExecutionOptions,
}

impl CompiledQuery {
    /// Renders `criteria` for PostgreSQL
    ///
    /// # Errors
    ///
    /// Propagates rendering failures (unknown properties, unjoined associations).
    pub fn from_criteria(criteria: &Criteria) -> Result<Self, FlowError> {
        let (sql, values) = criteria.to_sql()?;
        Ok(CompiledQuery {
            sql,
            values,
            options: criteria.options.clone(),
        })
    }

    /// Bound parameters as runtime values
    pub fn params(&self) -> Result<Vec<Value>, FlowError> {
        self.values.iter().map(from_sea_value).collect()
    }
}

/// One result row; cells follow the select list order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultRow {
    pub columns: Vec<String>,
    pub values: Vec<Value>,
}

impl ResultRow {
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        ResultRow { columns, values }
    }

    /// A row without column names, for positional construction
    pub fn positional(values: Vec<Value>) -> Self {
        ResultRow {
            columns: Vec::new(),
            values,
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
    }
}

/// Executes compiled queries
pub trait Session {
    /// Runs a select and returns every row
    ///
    /// # Errors
    ///
    /// Returns `SessionError` when execution or cell decoding fails.
    fn list(&self, query: &CompiledQuery) -> Result<Vec<ResultRow>, SessionError>;
}

/// [`Session`] over a `may_postgres::Client`
pub struct MayPostgresSession {
    client: Client,
}

impl MayPostgresSession {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Get a reference to the underlying client
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Consume the session and return the underlying client
    pub fn into_client(self) -> Client {
        self.client
    }

    fn log_hints(options: &ExecutionOptions) {
        if options.cacheable || options.fetch_size.is_some() || options.read_only {
            log::trace!(
                "execution hints without a session-side effect: \
                 cacheable={} region={:?} fetch_size={:?} read_only={}",
                options.cacheable,
                options.cache_region,
                options.fetch_size,
                options.read_only
            );
        }
    }

    fn run(&self, query: &CompiledQuery) -> Result<Vec<ResultRow>, SessionError> {
        Self::log_hints(&query.options);
        with_statement_timeout(
            &query.options,
            |sql| self.client.execute(sql, &[]).map(drop).map_err(SessionError::from),
            || self.query_rows(query),
        )
    }

    fn query_rows(&self, query: &CompiledQuery) -> Result<Vec<ResultRow>, SessionError> {
        let rows = with_converted_params(&query.values, |params| {
            Ok(self.client.query(query.sql.as_str(), params))
        })
        .map_err(|e| SessionError::QueryError(e.to_string()))??;
        rows.iter().map(decode_row).collect()
    }
}

const RESET_TIMEOUT: &str = "RESET statement_timeout";

/// Runs `body` under the query's statement timeout
///
/// `statement_timeout` is session-wide, so it is reset after `body` whether
/// or not `body` succeeded.
fn with_statement_timeout<R>(
    options: &ExecutionOptions,
    mut execute: impl FnMut(&str) -> Result<(), SessionError>,
    body: impl FnOnce() -> Result<R, SessionError>,
) -> Result<R, SessionError> {
    let Some(seconds) = options.timeout else {
        return body();
    };
    let set = format!("SET statement_timeout = {}", seconds.saturating_mul(1000));
    execute(&set)?;
    let result = body();
    match execute(RESET_TIMEOUT) {
        Ok(()) => result,
        Err(e) => {
            log::warn!("could not reset statement_timeout: {e}");
            result.and(Err(e))
        }
    }
}

impl Session for MayPostgresSession {
    fn list(&self, query: &CompiledQuery) -> Result<Vec<ResultRow>, SessionError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::execute_query_span(&query.sql).entered();

        let start = Instant::now();
        let result = self.run(query).inspect_err(|e| {
            log::debug!("query failed: {e}");
            #[cfg(feature = "metrics")]
            METRICS.record_query_error();
        });

        let duration = start.elapsed();
        #[cfg(feature = "metrics")]
        METRICS.record_query(duration);
        log::trace!("query finished in {duration:?}");

        result
    }
}

fn decode_row(row: &Row) -> Result<ResultRow, SessionError> {
    let mut columns = Vec::with_capacity(row.len());
    let mut values = Vec::with_capacity(row.len());
    for (index, column) in row.columns().iter().enumerate() {
        columns.push(column.name().to_string());
        values.push(decode_cell(row, index, column.type_())?);
    }
    Ok(ResultRow { columns, values })
}

fn decode_cell(row: &Row, index: usize, ty: &Type) -> Result<Value, SessionError> {
    fn get<'r, T>(row: &'r Row, index: usize) -> Result<Option<T>, SessionError>
    where
        T: may_postgres::types::FromSql<'r>,
    {
        row.try_get::<_, Option<T>>(index)
            .map_err(|e| SessionError::ParseError(format!("column {index}: {e}")))
    }

    let value = match ty.name() {
        "bool" => get::<bool>(row, index)?.map(Value::Bool),
        "int2" => get::<i16>(row, index)?.map(|v| Value::Int(i32::from(v))),
        "int4" => get::<i32>(row, index)?.map(Value::Int),
        "int8" => get::<i64>(row, index)?.map(Value::Long),
        "float4" => get::<f32>(row, index)?.map(|v| Value::Double(f64::from(v))),
        "float8" => get::<f64>(row, index)?.map(Value::Double),
        "numeric" => get::<rust_decimal::Decimal>(row, index)?.map(Value::Decimal),
        "text" | "varchar" | "bpchar" | "name" => get::<String>(row, index)?.map(Value::String),
        "date" => get::<chrono::NaiveDate>(row, index)?.map(Value::Date),
        "timestamp" => get::<chrono::NaiveDateTime>(row, index)?.map(Value::DateTime),
        "timestamptz" => get::<chrono::DateTime<chrono::Utc>>(row, index)?.map(Value::from),
        "uuid" => get::<uuid::Uuid>(row, index)?.map(Value::Uuid),
        other => {
            return Err(SessionError::ParseError(format!(
                "unsupported column type {other} at position {index}"
            )))
        }
    };
    Ok(value.unwrap_or(Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_error_display() {
        let err = SessionError::QueryError("test error".to_string());
        assert!(err.to_string().contains("Query error"));
        assert!(SessionError::ParseError("x".into()).to_string().contains("Parse error"));
        assert!(SessionError::Other("x".into()).to_string().contains("Execution error"));
    }

    fn run_timed(
        timeout: Option<u64>,
        body: Result<u8, SessionError>,
    ) -> (Vec<String>, Result<u8, SessionError>) {
        let options = ExecutionOptions {
            timeout,
            ..ExecutionOptions::default()
        };
        let mut executed = Vec::new();
        let result = with_statement_timeout(
            &options,
            |sql| {
                executed.push(sql.to_string());
                Ok(())
            },
            || body,
        );
        (executed, result)
    }

    #[test]
    fn test_statement_timeout_is_reset_after_the_query() {
        let (executed, result) = run_timed(Some(3), Ok(1));
        assert_eq!(executed, ["SET statement_timeout = 3000", "RESET statement_timeout"]);
        assert_eq!(result.unwrap(), 1);

        let (executed, result) =
            run_timed(Some(3), Err(SessionError::QueryError("timeout".into())));
        assert_eq!(executed.last().map(String::as_str), Some("RESET statement_timeout"));
        assert!(matches!(result, Err(SessionError::QueryError(_))));
    }

    #[test]
    fn test_untimed_queries_leave_the_session_alone() {
        let (executed, result) = run_timed(None, Ok(2));
        assert!(executed.is_empty());
        assert_eq!(result.unwrap(), 2);
    }

    #[test]
    fn test_result_row_lookup() {
        let row = ResultRow::new(
            vec!["id".into(), "name".into()],
            vec![Value::Long(1), Value::from("a")],
        );
        assert_eq!(row.get("name"), Some(&Value::from("a")));
        assert_eq!(row.get("missing"), None);
    }
}
