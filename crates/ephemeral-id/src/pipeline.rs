//! Request/response extension points and the ephemeral ID decorator.
//!
//! A [`Pipeline`] supplies the headers for each outgoing request and turns a
//! raw response into a result. [`EphemeralIdPipeline`] wraps any pipeline:
//! it enriches the wrapped pipeline's headers, reconciles the ephemeral ID
//! against each response, and then hands the response to the wrapped
//! pipeline, returning whatever it returns.

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use serde::de::DeserializeOwned;

use crate::cookies::CookieStore;
use crate::error::PipelineError;
use crate::sender::{EphemeralIdSender, EPHEMERAL_ID_HEADER};

/// Echo of the request a response belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestData {
    pub method: Method,
    pub url: String,
}

/// Host HTTP pipeline contract.
pub trait Pipeline {
    type Output;

    /// Headers to attach to the next outgoing request.
    fn headers_for_request(&mut self) -> HeaderMap;

    /// Turn a received response into the pipeline's result.
    fn handle_response(
        &mut self,
        status: StatusCode,
        headers: &HeaderMap,
        payload: Bytes,
        request: &RequestData,
    ) -> Self::Output;

    /// Called instead of [`Pipeline::handle_response`] when the status and
    /// headers arrived but the payload could not be read.
    fn handle_interrupted_response(
        &mut self,
        _status: StatusCode,
        _headers: &HeaderMap,
        _request: &RequestData,
    ) {
    }
}

/// A successful response as produced by [`HttpPipeline`].
#[derive(Debug, Clone)]
pub struct PipelineResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl PipelineResponse {
    /// Deserialize the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Body as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Base pipeline: fixed default headers, 2xx is success, anything else is
/// [`PipelineError::Status`].
#[derive(Debug, Clone, Default)]
pub struct HttpPipeline {
    headers: HeaderMap,
}

impl HttpPipeline {
    pub fn new(headers: HeaderMap) -> Self {
        Self { headers }
    }
}

impl Pipeline for HttpPipeline {
    type Output = Result<PipelineResponse, PipelineError>;

    fn headers_for_request(&mut self) -> HeaderMap {
        self.headers.clone()
    }

    fn handle_response(
        &mut self,
        status: StatusCode,
        headers: &HeaderMap,
        payload: Bytes,
        request: &RequestData,
    ) -> Self::Output {
        if status.is_success() {
            return Ok(PipelineResponse {
                status,
                headers: headers.clone(),
                body: payload,
            });
        }

        let body = String::from_utf8_lossy(&payload).into_owned();
        tracing::warn!(
            status = status.as_u16(),
            method = %request.method,
            url = %request.url,
            "Request failed"
        );
        Err(PipelineError::Status { status, body })
    }
}

/// Decorator adding ephemeral ID handling to a base pipeline.
pub struct EphemeralIdPipeline<P, C> {
    inner: P,
    sender: EphemeralIdSender<C>,
}

impl<P: Pipeline, C: CookieStore> EphemeralIdPipeline<P, C> {
    /// Wrap `inner`, loading the ephemeral ID from `cookies`.
    pub fn new(inner: P, cookies: C) -> Self {
        Self {
            inner,
            sender: EphemeralIdSender::new(cookies),
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn ephemeral_id(&self) -> Option<&str> {
        self.sender.ephemeral_id()
    }

    fn reconcile(&mut self, status: StatusCode, headers: &HeaderMap, request: &RequestData) {
        if !headers.contains_key(&EPHEMERAL_ID_HEADER) {
            return;
        }
        let span = ephemeral_tracing::reconcile_span!(status);
        let _entered = span.enter();

        let outcome = self.sender.observe_response(headers);
        span.record("adopted", outcome.adopted);
        span.record("cookie_written", outcome.cookie_written);

        if outcome.adopted {
            tracing::info!(url = %request.url, "Adopted server-issued ephemeral ID");
        }
    }
}

impl<P: Pipeline, C: CookieStore> Pipeline for EphemeralIdPipeline<P, C> {
    type Output = P::Output;

    fn headers_for_request(&mut self) -> HeaderMap {
        self.sender.set_headers(self.inner.headers_for_request());
        self.sender.headers_for_request().clone()
    }

    fn handle_response(
        &mut self,
        status: StatusCode,
        headers: &HeaderMap,
        payload: Bytes,
        request: &RequestData,
    ) -> Self::Output {
        self.reconcile(status, headers, request);
        self.inner.handle_response(status, headers, payload, request)
    }

    fn handle_interrupted_response(
        &mut self,
        status: StatusCode,
        headers: &HeaderMap,
        request: &RequestData,
    ) {
        self.reconcile(status, headers, request);
        self.inner.handle_interrupted_response(status, headers, request);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use http::HeaderValue;

    use super::*;
    use crate::cookies::{CookieOptions, MemoryCookieStore};
    use crate::sender::EPHEMERAL_ID_COOKIE;

    /// Base pipeline that counts calls and returns a fixed marker.
    #[derive(Default)]
    struct CountingPipeline {
        responses: usize,
    }

    impl Pipeline for CountingPipeline {
        type Output = (usize, StatusCode, Bytes);

        fn headers_for_request(&mut self) -> HeaderMap {
            let mut headers = HeaderMap::new();
            headers.insert("accept", HeaderValue::from_static("application/json"));
            headers
        }

        fn handle_response(
            &mut self,
            status: StatusCode,
            _headers: &HeaderMap,
            payload: Bytes,
            _request: &RequestData,
        ) -> Self::Output {
            self.responses += 1;
            (self.responses, status, payload)
        }
    }

    fn request() -> RequestData {
        RequestData {
            method: Method::GET,
            url: "http://localhost/api/items".to_string(),
        }
    }

    fn response_with_id(id: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(EPHEMERAL_ID_HEADER, HeaderValue::from_static(id));
        headers
    }

    #[test]
    fn test_base_pipeline_accepts_success() {
        let mut pipeline = HttpPipeline::default();
        let result = pipeline
            .handle_response(
                StatusCode::OK,
                &HeaderMap::new(),
                Bytes::from_static(br#"{"items": [1, 2]}"#),
                &request(),
            )
            .unwrap();

        assert_eq!(result.status, StatusCode::OK);
        let body: serde_json::Value = result.json().unwrap();
        assert_eq!(body["items"][1], 2);
    }

    #[test]
    fn test_base_pipeline_rejects_error_status() {
        let mut pipeline = HttpPipeline::default();
        let err = pipeline
            .handle_response(
                StatusCode::UNPROCESSABLE_ENTITY,
                &HeaderMap::new(),
                Bytes::from_static(b"invalid"),
                &request(),
            )
            .unwrap_err();

        match err {
            PipelineError::Status { status, body } => {
                assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
                assert_eq!(body, "invalid");
            }
        }
    }

    #[test]
    fn test_decorator_enriches_base_headers() {
        let store = Arc::new(MemoryCookieStore::new());
        store.write(EPHEMERAL_ID_COOKIE, "abc123", &CookieOptions::root());
        let mut pipeline = EphemeralIdPipeline::new(CountingPipeline::default(), store);

        let headers = pipeline.headers_for_request();
        assert_eq!(headers["accept"], "application/json");
        assert_eq!(headers["x-ephemeral-id"], "abc123");
    }

    #[test]
    fn test_decorator_passes_base_headers_through_without_id() {
        let store = Arc::new(MemoryCookieStore::new());
        let mut pipeline = EphemeralIdPipeline::new(CountingPipeline::default(), store);

        let headers = pipeline.headers_for_request();
        assert_eq!(headers.len(), 1);
        assert!(!headers.contains_key("x-ephemeral-id"));
    }

    #[test]
    fn test_decorator_returns_base_result_unchanged() {
        let store = Arc::new(MemoryCookieStore::new());
        let mut pipeline = EphemeralIdPipeline::new(CountingPipeline::default(), store);

        let first = pipeline.handle_response(
            StatusCode::CREATED,
            &response_with_id("new-id"),
            Bytes::from_static(b"payload"),
            &request(),
        );
        let second = pipeline.handle_response(
            StatusCode::OK,
            &HeaderMap::new(),
            Bytes::new(),
            &request(),
        );

        assert_eq!(first, (1, StatusCode::CREATED, Bytes::from_static(b"payload")));
        assert_eq!(second, (2, StatusCode::OK, Bytes::new()));
        assert_eq!(pipeline.inner().responses, 2);
    }

    #[test]
    fn test_decorator_adopts_id_then_sends_it() {
        let store = Arc::new(MemoryCookieStore::new());
        let mut pipeline = EphemeralIdPipeline::new(CountingPipeline::default(), store.clone());

        pipeline.handle_response(
            StatusCode::OK,
            &response_with_id("new-id"),
            Bytes::new(),
            &request(),
        );

        assert_eq!(pipeline.ephemeral_id(), Some("new-id"));
        let cookie = store.get(EPHEMERAL_ID_COOKIE).unwrap();
        assert_eq!(cookie.to_string(), "x-ephemeral-id=new-id; path=/");
        assert_eq!(pipeline.headers_for_request()["x-ephemeral-id"], "new-id");
    }

    #[test]
    fn test_decorator_reconciles_interrupted_response() {
        let store = Arc::new(MemoryCookieStore::new());
        let mut pipeline = EphemeralIdPipeline::new(CountingPipeline::default(), store.clone());

        pipeline.handle_interrupted_response(
            StatusCode::OK,
            &response_with_id("before-body"),
            &request(),
        );

        assert_eq!(pipeline.ephemeral_id(), Some("before-body"));
        assert_eq!(store.read(EPHEMERAL_ID_COOKIE).as_deref(), Some("before-body"));
        assert_eq!(pipeline.inner().responses, 0);
    }

    #[test]
    fn test_decorator_adopts_id_from_error_response() {
        let store = Arc::new(MemoryCookieStore::new());
        let mut pipeline = EphemeralIdPipeline::new(HttpPipeline::default(), store);

        let result = pipeline.handle_response(
            StatusCode::UNAUTHORIZED,
            &response_with_id("issued-on-401"),
            Bytes::from_static(b"login required"),
            &request(),
        );

        assert!(matches!(
            result,
            Err(PipelineError::Status {
                status: StatusCode::UNAUTHORIZED,
                ..
            })
        ));
        assert_eq!(pipeline.ephemeral_id(), Some("issued-on-401"));
    }
}
