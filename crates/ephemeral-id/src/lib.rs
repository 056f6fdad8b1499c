//! Ephemeral ID sender: attaches a client `x-ephemeral-id` header to outgoing
//! HTTP requests, persists it in a cookie, and adopts the ID a server hands
//! back when none is known yet.
//!
//! The pieces compose explicitly:
//! - [`cookies`]: the cookie store the ID is mirrored into
//! - [`sender`]: the ID state and its read/reconcile/write protocol
//! - [`pipeline`]: the request/response extension points and the decorator
//!   that wires the sender into any base pipeline
//! - [`client`]: a reqwest client driving a pipeline end to end

pub mod client;
pub mod config;
pub mod cookies;
pub mod correlation;
pub mod error;
pub mod pipeline;
pub mod sender;

pub use client::EphemeralClient;
pub use cookies::{Cookie, CookieOptions, CookieStore, FileCookieStore, MemoryCookieStore};
pub use error::{ClientError, CookieError, PipelineError};
pub use pipeline::{EphemeralIdPipeline, HttpPipeline, Pipeline, PipelineResponse, RequestData};
pub use sender::{EphemeralIdSender, Reconciliation, EPHEMERAL_ID_COOKIE, EPHEMERAL_ID_HEADER};
