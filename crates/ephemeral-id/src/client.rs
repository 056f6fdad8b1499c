//! Async HTTP client driving a [`Pipeline`] end to end.
//!
//! Each request takes its headers from the pipeline, is tagged with a
//! correlation ID, and has its status, headers and payload handed back to
//! the pipeline once the body is read.

use std::time::{Duration, Instant};

use bytes::Bytes;
use http::Method;
use tracing::Instrument;

use crate::config::ClientConfig;
use crate::correlation::{self, CORRELATION_HEADER};
use crate::error::{ClientError, PipelineError};
use crate::pipeline::{Pipeline, PipelineResponse, RequestData};
use crate::sender::EPHEMERAL_ID_HEADER;

/// HTTP client bound to a base URL and a pipeline.
pub struct EphemeralClient<P> {
    http: reqwest::Client,
    base_url: String,
    pipeline: P,
}

impl<P> EphemeralClient<P>
where
    P: Pipeline<Output = Result<PipelineResponse, PipelineError>>,
{
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, pipeline: P) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            pipeline,
        }
    }

    /// Build the reqwest client from config and wrap `pipeline`.
    pub fn from_config(config: &ClientConfig, pipeline: P) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self::new(http, config.base_url.clone(), pipeline))
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    pub async fn get(&mut self, path: &str) -> Result<PipelineResponse, ClientError> {
        self.request(Method::GET, path, None).await
    }

    /// Send a request to `path` (relative to the base URL).
    pub async fn request(
        &mut self,
        method: Method,
        path: &str,
        body: Option<Bytes>,
    ) -> Result<PipelineResponse, ClientError> {
        let url = join_url(&self.base_url, path);
        let correlation_id = correlation::generate_id();
        let span = ephemeral_tracing::outgoing_request_span!(&correlation_id, &method, &url);

        async move {
            let headers = self.pipeline.headers_for_request();
            tracing::Span::current()
                .record("ephemeral_id_sent", headers.contains_key(&EPHEMERAL_ID_HEADER));

            let mut builder = self
                .http
                .request(method.clone(), &url)
                .headers(headers)
                .header(CORRELATION_HEADER, &correlation_id);
            if let Some(body) = body {
                builder = builder.body(body);
            }

            let start = Instant::now();
            let response = builder.send().await.inspect_err(|e| {
                tracing::error!(error = %e, "Request failed before a response arrived");
            })?;

            let status = response.status();
            let response_headers = response.headers().clone();
            // Headers are reconciled even if the body never arrives.
            let payload = match response.bytes().await {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::error!(error = %e, status = status.as_u16(), "Failed to read response body");
                    let request = RequestData { method, url };
                    self.pipeline
                        .handle_interrupted_response(status, &response_headers, &request);
                    return Err(e.into());
                }
            };

            let latency = start.elapsed().as_millis() as u64;
            tracing::Span::current().record("status", status.as_u16());
            tracing::Span::current().record("latency_ms", latency);
            tracing::debug!(
                status = status.as_u16(),
                latency_ms = latency,
                bytes = payload.len(),
                "Response received"
            );

            let request = RequestData { method, url };
            let result = self
                .pipeline
                .handle_response(status, &response_headers, payload, &request)?;
            Ok(result)
        }
        .instrument(span)
        .await
    }
}

/// Join `path` onto `base` with exactly one slash between them.
/// Absolute URLs are returned unchanged.
fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        base.to_string()
    } else {
        format!("{base}/{path}")
    }
}
