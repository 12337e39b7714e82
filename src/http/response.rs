//! Response builder and wire serialization.

use std::time::SystemTime;

use crate::net::{self, Error, ErrorKind};
use crate::server::conn::ConnHandle;

use super::headers::Headers;
use super::{HEADER_CONNECTION, HTTP_VERSION_1_1};

/// Builder for the reply to one request.
///
/// A response starts as `HTTP/1.1 200 OK` with no headers and no body.
/// `send()` serializes and writes the whole reply; `end()` schedules the
/// connection close. Every response carries an automatic `Date` header
/// and `Connection: close`; this server never keeps a connection alive.
///
/// The handler must call `end()` eventually. `end()` without a prior
/// `send()` closes the connection without a wire response, which is how
/// abrupt terminations are expressed.
pub struct Response {
    version: String,
    status_code: u16,
    status_message: String,
    headers: Headers,
    trailers: Headers,
    body: Vec<u8>,
    conn: ConnHandle,
    sent: bool,
    ended: bool,
}

impl Response {
    pub(crate) fn new(conn: ConnHandle) -> Self {
        Response {
            version: HTTP_VERSION_1_1.to_string(),
            status_code: 200,
            status_message: "OK".to_string(),
            headers: Headers::new(),
            trailers: Headers::new(),
            body: Vec::new(),
            conn,
            sent: false,
            ended: false,
        }
    }

    pub fn set_status(&mut self, code: u16, message: impl Into<String>) {
        self.status_code = code;
        self.status_message = message.into();
    }

    pub fn set_version(&mut self, version: impl Into<String>) {
        self.version = version.into();
    }

    /// Append a header; repeated names keep all their values.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name, value);
    }

    /// Append a trailer, emitted after the body.
    pub fn add_trailer(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.trailers.insert(name, value);
    }

    pub fn set_body(&mut self, body: impl Into<Vec<u8>>) {
        self.body = body.into();
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn trailers(&self) -> &Headers {
        &self.trailers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Whether `send()` has delivered this response.
    pub fn is_sent(&self) -> bool {
        self.sent
    }

    /// Serialize and write the whole response, looping over partial
    /// writes until every byte is delivered.
    pub fn send(&mut self) -> net::Result<()> {
        if self.ended {
            return Err(Error::new(
                ErrorKind::Write,
                "response",
                "response already ended",
            ));
        }
        let wire = self.to_wire();
        self.conn.write_all(&wire)?;
        self.sent = true;
        Ok(())
    }

    /// Finish the response and schedule the connection close. Calling it
    /// again is a no-op. If `send()` was never called the connection is
    /// closed without a wire response.
    pub fn end(&mut self) {
        if self.ended {
            return;
        }
        self.ended = true;
        self.conn.schedule_close();
    }

    /// The serialized form: status line, automatic `Date` and
    /// `Connection: close`, headers (names upper-cased), blank line,
    /// body, then trailers.
    pub fn to_wire(&self) -> Vec<u8> {
        self.render(&httpdate::fmt_http_date(SystemTime::now()))
    }

    fn render(&self, date: &str) -> Vec<u8> {
        let mut wire = Vec::with_capacity(128 + self.body.len());
        wire.extend_from_slice(self.version.as_bytes());
        wire.push(b' ');
        wire.extend_from_slice(self.status_code.to_string().as_bytes());
        wire.push(b' ');
        wire.extend_from_slice(self.status_message.as_bytes());
        wire.extend_from_slice(b"\r\n");

        wire.extend_from_slice(b"Date: ");
        wire.extend_from_slice(date.as_bytes());
        wire.extend_from_slice(b"\r\n");

        // No keep-alive in this server; announce the close unless the
        // handler already set its own CONNECTION header.
        if !self.headers.contains(HEADER_CONNECTION) {
            wire.extend_from_slice(b"Connection: close\r\n");
        }

        for (name, value) in self.headers.iter() {
            wire.extend_from_slice(name.as_bytes());
            wire.extend_from_slice(b": ");
            wire.extend_from_slice(value.as_bytes());
            wire.extend_from_slice(b"\r\n");
        }

        wire.extend_from_slice(b"\r\n");
        wire.extend_from_slice(&self.body);

        for (name, value) in self.trailers.iter() {
            wire.extend_from_slice(name.as_bytes());
            wire.extend_from_slice(b": ");
            wire.extend_from_slice(value.as_bytes());
            wire.extend_from_slice(b"\r\n");
        }

        wire
    }
}

impl Drop for Response {
    /// A discarded response still releases its connection; the close
    /// happens exactly once either way.
    fn drop(&mut self) {
        if !self.ended {
            self.conn.schedule_close();
        }
    }
}
