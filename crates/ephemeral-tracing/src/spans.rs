//! Span builder helpers for ephemeral-id instrumentation.

/// Create a tracing span for one outgoing HTTP request.
///
/// Usage: `let span = outgoing_request_span!(correlation_id, method, url);`
///
/// Fields recorded once the response arrives:
/// - `status`: HTTP status code of the response
/// - `latency_ms`: milliseconds from send to fully read payload
/// - `ephemeral_id_sent`: whether the request carried an `x-ephemeral-id` header
#[macro_export]
macro_rules! outgoing_request_span {
    ($correlation_id:expr, $method:expr, $url:expr) => {
        tracing::info_span!(
            "outgoing_request",
            correlation_id = %$correlation_id,
            method = %$method,
            url = %$url,
            status = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
            ephemeral_id_sent = tracing::field::Empty,
        )
    };
}

/// Create a tracing span around response reconciliation.
#[macro_export]
macro_rules! reconcile_span {
    ($status:expr) => {
        tracing::debug_span!(
            "reconcile_ephemeral_id",
            status = %$status,
            adopted = tracing::field::Empty,
            cookie_written = tracing::field::Empty,
        )
    };
}
