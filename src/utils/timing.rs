use std::future::Future;
use std::time::{Duration, Instant};

use tracing::Instrument;

/// Queries running longer than this are reported with a warning.
const SLOW_QUERY_THRESHOLD: Duration = Duration::from_millis(500);

/// Measures the duration of a database query and logs it using tracing.
pub async fn measure_db_query<T, F, Fut>(query_name: &str, f: F) -> T
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    let start = Instant::now();

    let span = tracing::trace_span!("Query", query = query_name);
    span.in_scope(|| {
        tracing::trace!("Starting");
    });

    let result = f().instrument(span.clone()).await;
    let duration = start.elapsed();

    span.in_scope(|| {
        let duration_ms = format!("{:.2}ms", duration.as_secs_f64() * 1000.0);
        if duration > SLOW_QUERY_THRESHOLD {
            tracing::warn!(duration = duration_ms, "Slow query {query_name}");
        } else {
            tracing::trace!(duration = duration_ms, "Completed");
        }
    });

    result
}
