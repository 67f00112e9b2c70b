//! Per-unit-of-work correlation headers.
//!
//! A [`CorrelationStore`] is created empty for every inbound message, filled
//! once by the header-capture step and then only read: by the logging step to
//! enrich its records, and by handlers to propagate correlation onto the events
//! they publish. It is owned by the unit of work and dropped with it; nothing
//! about it is process-wide.

use std::collections::{BTreeMap, HashMap};

use crate::message::headers;

/// Key of the request id in [`CorrelationStore::logging_headers`].
pub const REQUEST_ID: &str = "RequestId";
/// Key of the correlation context in [`CorrelationStore::logging_headers`].
pub const CORRELATION_CONTEXT: &str = "CorrelationContext";
/// Key of the principal email in [`CorrelationStore::logging_headers`].
pub const EMAIL: &str = "Email";
/// Email reported when the message carried none.
pub const UNKNOWN_EMAIL: &str = "unknown";

/// Separator used to join multiple values of one header.
const VALUE_SEPARATOR: &str = "; ";

/// Lower-cased header name → joined value, scoped to one unit of work.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorrelationStore {
    headers: HashMap<String, String>,
}

impl CorrelationStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores every `(key, values)` entry.
    ///
    /// Keys are lower-cased, multiple values are joined with `"; "`, and a key
    /// seen twice (case-insensitively) keeps the last value.
    ///
    /// ```
    /// use conveyor_core::CorrelationStore;
    ///
    /// let mut store = CorrelationStore::new();
    /// store.set_headers([("Accept", vec!["a", "b"]), ("ACCEPT", vec!["c"])]);
    /// assert_eq!(store.get("accept"), Some("c"));
    /// ```
    pub fn set_headers<I, K, V, S>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for (key, values) in entries {
            let joined = values
                .into_iter()
                .map(|v| v.as_ref().to_owned())
                .collect::<Vec<_>>()
                .join(VALUE_SEPARATOR);
            self.headers.insert(key.as_ref().to_lowercase(), joined);
        }
    }

    /// Looks up a stored header by name, case-insensitively.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.headers.get(&key.to_lowercase()).map(String::as_str)
    }

    /// The request id, falling back to the transport message id.
    pub fn request_id(&self) -> Option<&str> {
        self.get(headers::REQUEST_ID)
            .or_else(|| self.get(headers::MESSAGE_ID))
    }

    /// The correlation context, falling back to the transport correlation id.
    pub fn correlation_context(&self) -> Option<&str> {
        self.get(headers::CORRELATION_CONTEXT)
            .or_else(|| self.get(headers::CORRELATION_ID))
    }

    /// The principal email, or [`UNKNOWN_EMAIL`].
    pub fn email(&self) -> &str {
        self.get(headers::EMAIL).unwrap_or(UNKNOWN_EMAIL)
    }

    /// The fixed-shape header set attached to log records.
    ///
    /// Always contains [`REQUEST_ID`], [`CORRELATION_CONTEXT`] and [`EMAIL`];
    /// absent ids are reported as empty strings.
    pub fn logging_headers(&self) -> BTreeMap<&'static str, String> {
        BTreeMap::from([
            (REQUEST_ID, self.request_id().unwrap_or_default().to_owned()),
            (
                CORRELATION_CONTEXT,
                self.correlation_context().unwrap_or_default().to_owned(),
            ),
            (EMAIL, self.email().to_owned()),
        ])
    }

    /// The header set forwarded to tracing. Identical to
    /// [`logging_headers`](Self::logging_headers).
    pub fn trace_headers(&self) -> BTreeMap<&'static str, String> {
        self.logging_headers()
    }

    /// Headers to stamp onto events published from this unit of work so the
    /// correlation survives the hop.
    pub fn propagation_headers(&self) -> Vec<(&'static str, String)> {
        let mut out = Vec::with_capacity(4);
        if let Some(request_id) = self.request_id() {
            out.push((headers::REQUEST_ID, request_id.to_owned()));
        }
        if let Some(context) = self.correlation_context() {
            out.push((headers::CORRELATION_CONTEXT, context.to_owned()));
            out.push((headers::CORRELATION_ID, context.to_owned()));
        }
        if let Some(email) = self.get(headers::EMAIL) {
            out.push((headers::EMAIL, email.to_owned()));
        }
        out
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}
