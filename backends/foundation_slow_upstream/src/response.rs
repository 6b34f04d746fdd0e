//! Canned JSON response.
//!
//! WHY: Proxies under test only need a predictable body that echoes what
//! reached the upstream and how long it took.
//!
//! WHAT: [`ProcessedResponse`], serialized with `serde_json` and rendered as
//! a complete HTTP/1.1 200 response.

use chrono::{DateTime, Local, SecondsFormat};
use serde::Serialize;

use crate::delays::ProcessingDelay;
use crate::errors::ConnectionResult;
use crate::request::IncomingRequest;

pub const SUCCESS_MESSAGE: &str = "Request processed successfully";

const STATUS_LINE: &str = "HTTP/1.1 200 OK";
const CONTENT_TYPE: &str = "application/json";

// Fixed caching headers, written after content type and length.
const NO_CACHE_HEADERS: [(&str, &str); 3] = [
    ("Cache-Control", "no-cache, no-store, must-revalidate"),
    ("Pragma", "no-cache"),
    ("Expires", "0"),
];

/// Body of every response. Field order is the wire order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessedResponse {
    pub message: String,
    pub path: String,
    pub method: String,
    /// Delay actually applied, in whole seconds
    pub processing_time: u64,
    /// ISO-8601 time the response was generated
    pub timestamp: String,
    /// Header names in the order they were first received
    pub headers_received: Vec<String>,
}

impl ProcessedResponse {
    /// Build the response for `request`, stamped with the current local time.
    #[must_use]
    pub fn new(request: &IncomingRequest, delay: ProcessingDelay) -> Self {
        Self::generated_at(request, delay, Local::now())
    }

    #[must_use]
    pub fn generated_at(
        request: &IncomingRequest,
        delay: ProcessingDelay,
        generated: DateTime<Local>,
    ) -> Self {
        Self {
            message: SUCCESS_MESSAGE.to_owned(),
            path: request.path.clone(),
            method: request.method.clone(),
            processing_time: delay.seconds(),
            timestamp: generated.to_rfc3339_opts(SecondsFormat::Secs, false),
            headers_received: request.headers.names(),
        }
    }

    /// Serialized JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ConnectionError::Encoding`] if serialization fails.
    pub fn to_json(&self) -> ConnectionResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Render the full HTTP/1.1 response, status line to body.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ConnectionError::Encoding`] if serialization fails.
    pub fn render(&self) -> ConnectionResult<Vec<u8>> {
        let body = self.to_json()?;

        let mut response = format!("{STATUS_LINE}\r\n");
        response.push_str(&format!("Content-Type: {CONTENT_TYPE}\r\n"));
        response.push_str(&format!("Content-Length: {}\r\n", body.len()));
        for (key, value) in NO_CACHE_HEADERS {
            response.push_str(&format!("{key}: {value}\r\n"));
        }
        response.push_str("\r\n");
        response.push_str(&body);

        Ok(response.into_bytes())
    }
}
