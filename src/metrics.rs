//! Observability: tracing spans (feature `tracing`) and Prometheus metrics (feature `metrics`).

#[cfg(feature = "metrics")]
pub use prometheus_metrics::{FlowQueryMetrics, METRICS};

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    //! Span constructors shared by the executor and the query facade.

    use tracing::{span, Level, Span};

    /// Span around one statement execution
    pub fn execute_query_span(sql: &str) -> Span {
        span!(Level::DEBUG, "flowquery.execute", sql = %sql)
    }

    /// Span around translating one lambda into the criteria model
    pub fn translate_span(operation: &'static str) -> Span {
        span!(Level::TRACE, "flowquery.translate", operation)
    }

    /// Span around opening a database connection
    pub fn acquire_connection_span() -> Span {
        span!(Level::DEBUG, "flowquery.connect")
    }
}

#[cfg(feature = "metrics")]
mod prometheus_metrics {
    use once_cell::sync::Lazy;
    use opentelemetry::{
        global,
        metrics::{Counter, Histogram},
    };
    use opentelemetry_prometheus::PrometheusExporter;

    pub static METRICS: Lazy<FlowQueryMetrics> = Lazy::new(FlowQueryMetrics::init);

    pub struct FlowQueryMetrics {
        /// `None` when the exporter could not be built; instruments still record
        pub exporter: Option<PrometheusExporter>,
        pub registry: prometheus::Registry,
        pub queries_total: Counter<u64>,
        pub query_errors_total: Counter<u64>,
        pub query_duration: Histogram<f64>,
        pub translation_errors_total: Counter<u64>,
    }

    impl FlowQueryMetrics {
        pub fn init() -> Self {
            let registry = prometheus::Registry::new();
            let exporter = match opentelemetry_prometheus::exporter()
                .with_registry(registry.clone())
                .build()
            {
                Ok(exporter) => Some(exporter),
                Err(e) => {
                    log::warn!("failed to build prometheus exporter, metrics stay local: {e}");
                    None
                }
            };
            let meter = global::meter("flowquery");

            let queries_total = meter
                .u64_counter("flowquery_queries_total")
                .with_description("Total queries executed")
                .build();

            let query_errors_total = meter
                .u64_counter("flowquery_query_errors_total")
                .with_description("Queries that failed in the session")
                .build();

            let query_duration = meter
                .f64_histogram("flowquery_query_duration_seconds")
                .with_description("Duration of queries")
                .build();

            let translation_errors_total = meter
                .u64_counter("flowquery_translation_errors_total")
                .with_description("Lambdas that could not be translated")
                .build();

            Self {
                exporter,
                registry,
                queries_total,
                query_errors_total,
                query_duration,
                translation_errors_total,
            }
        }

        pub fn record_query(&self, elapsed: std::time::Duration) {
            self.queries_total.add(1, &[]);
            self.query_duration.record(elapsed.as_secs_f64(), &[]);
        }

        pub fn record_query_error(&self) {
            self.query_errors_total.add(1, &[]);
        }

        pub fn record_translation_error(&self) {
            self.translation_errors_total.add(1, &[]);
        }
    }
}
