//! Immutable request view handed to the request handler.

use std::borrow::Cow;

use crate::net::Address;
use crate::server::conn::ConnHandle;

use super::assembler::CompletedRequest;
use super::headers::Headers;

/// A fully assembled HTTP request.
///
/// Everything is read-only; the one action a request can perform is
/// asking for its connection to be closed, which the handler normally
/// leaves to [`Response::end`](super::Response::end).
pub struct Request {
    method: String,
    uri: String,
    version: String,
    headers: Headers,
    body: Vec<u8>,
    conn: ConnHandle,
}

impl Request {
    pub(crate) fn new(assembled: CompletedRequest, conn: ConnHandle) -> Self {
        Request {
            method: assembled.head.method,
            uri: assembled.head.uri,
            version: assembled.head.version,
            headers: assembled.head.headers,
            body: assembled.body,
            conn,
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// First value of `name`, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// All values of `name`, in arrival order.
    pub fn header_all(&self, name: &str) -> Vec<&str> {
        self.headers.get_all(name)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Textual view of the body; invalid UTF-8 is replaced.
    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Address of the peer that sent this request.
    pub fn remote_address(&self) -> Address {
        self.conn.remote()
    }

    /// Ask for the connection to carry no further traffic. The reactor
    /// closes it on its next pass.
    pub fn close_connection(&self) {
        self.conn.schedule_close();
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("version", &self.version)
            .field("headers", &self.headers.len())
            .field("body_bytes", &self.body.len())
            .finish()
    }
}
