//! Ephemeral ID state and its read/reconcile/write protocol.
//!
//! The ID is loaded from the `x-ephemeral-id` cookie once, on construction.
//! While it is blank, the first response carrying an `x-ephemeral-id` header
//! supplies it; after that it never changes for the life of the sender. The
//! cookie is only written when it reads blank, so an existing cookie is never
//! rewritten.

use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;

use crate::cookies::{CookieOptions, CookieStore};

/// Request and response header carrying the ephemeral ID.
pub const EPHEMERAL_ID_HEADER: HeaderName = HeaderName::from_static("x-ephemeral-id");

/// Cookie the ephemeral ID is mirrored into.
pub const EPHEMERAL_ID_COOKIE: &str = "x-ephemeral-id";

/// Absent, empty, and whitespace-only values all count as blank.
pub fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

/// Which of the two independent reconciliation steps fired for a response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// The in-memory ID was blank and took the server's value.
    pub adopted: bool,
    /// The cookie read blank and the server's value was written to it.
    pub cookie_written: bool,
}

/// Holds the ephemeral ID, the cookie store it is mirrored into, and the
/// request header map it enriches.
pub struct EphemeralIdSender<C> {
    cookies: C,
    headers: HeaderMap,
    ephemeral_id: Option<String>,
}

impl<C: CookieStore> EphemeralIdSender<C> {
    /// Create a sender with an empty header map.
    pub fn new(cookies: C) -> Self {
        Self::with_headers(cookies, HeaderMap::new())
    }

    /// Create a sender over `headers`, loading the ID from the cookie store.
    pub fn with_headers(cookies: C, headers: HeaderMap) -> Self {
        let mut sender = Self {
            cookies,
            headers,
            ephemeral_id: None,
        };
        sender.ephemeral_id = sender.ephemeral_id_from_cookies();

        tracing::debug!(
            known = !is_blank(sender.ephemeral_id.as_deref()),
            "Ephemeral ID loaded from cookies"
        );

        sender
    }

    /// Current in-memory ID, if any. May be blank.
    pub fn ephemeral_id(&self) -> Option<&str> {
        self.ephemeral_id.as_deref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Replace the header map the sender enriches.
    pub fn set_headers(&mut self, headers: HeaderMap) {
        self.headers = headers;
    }

    /// Read the ID currently stored in the cookie.
    pub fn ephemeral_id_from_cookies(&self) -> Option<String> {
        self.cookies.read(EPHEMERAL_ID_COOKIE)
    }

    /// Store `ephemeral_id` in the cookie, scoped to `/`.
    pub fn update_ephemeral_id_in_cookies(&self, ephemeral_id: &str) {
        self.cookies
            .write(EPHEMERAL_ID_COOKIE, ephemeral_id, &CookieOptions::root());
    }

    /// The held header map with `x-ephemeral-id` set when an ID is known.
    ///
    /// Recomputed on every call from the current headers and ID. The header
    /// is inserted into the held map itself, which is then returned; with a
    /// blank ID the map is returned untouched.
    pub fn headers_with_ephemeral_id(&mut self) -> &HeaderMap {
        attach(&mut self.headers, self.ephemeral_id.as_deref());
        &self.headers
    }

    /// Headers to send with the next request.
    pub fn headers_for_request(&mut self) -> &HeaderMap {
        self.headers_with_ephemeral_id()
    }

    /// Adopt and persist the ID a server returned in `response_headers`.
    ///
    /// Without an `x-ephemeral-id` header this is a no-op and the cookie is
    /// not touched. Otherwise the in-memory ID takes the server's value only
    /// if it is blank, and the cookie is written only if it reads blank.
    pub fn observe_response(&mut self, response_headers: &HeaderMap) -> Reconciliation {
        let Some(raw) = response_headers.get(&EPHEMERAL_ID_HEADER) else {
            return Reconciliation::default();
        };
        // obs-text bytes are accepted on the way out, so accept them on the way in.
        let fresh = String::from_utf8_lossy(raw.as_bytes()).into_owned();

        let from_cookie = self.ephemeral_id_from_cookies();
        let mut outcome = Reconciliation::default();

        if is_blank(self.ephemeral_id.as_deref()) {
            tracing::debug!(ephemeral_id = %fresh, "Adopting server-issued ephemeral ID");
            self.ephemeral_id = Some(fresh.clone());
            outcome.adopted = true;
        }

        if is_blank(from_cookie.as_deref()) {
            self.update_ephemeral_id_in_cookies(&fresh);
            outcome.cookie_written = true;
        }

        outcome
    }
}

/// Insert `x-ephemeral-id` into `headers` unless `ephemeral_id` is blank.
pub fn attach(headers: &mut HeaderMap, ephemeral_id: Option<&str>) {
    let Some(id) = ephemeral_id.filter(|id| !is_blank(Some(*id))) else {
        return;
    };
    match HeaderValue::from_str(id) {
        Ok(value) => {
            headers.insert(EPHEMERAL_ID_HEADER, value);
        }
        Err(e) => {
            tracing::warn!(error = %e, "Ephemeral ID is not a valid header value, not sending it");
        }
    }
}
