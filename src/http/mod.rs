//! HTTP/1.1 protocol implementation.
//!
//! This module turns inbound byte streams into request objects and
//! response objects back into wire bytes. It is deliberately independent
//! of the event loop: the [`assembler`] consumes whatever bytes it is
//! given and reports progress, so requests may arrive across arbitrarily
//! many TCP segments.
//!
//! - **`headers`**: order-preserving multimap with case-insensitive lookup
//! - **`assembler`**: per-connection parsing state machine
//! - **`request`**: immutable view over a completed request
//! - **`response`**: builder that serializes and writes the reply
//!
//! The server always answers with `Connection: close` and the connection
//! is torn down after the response; there is no keep-alive reuse.

pub mod assembler;
pub mod headers;
pub mod request;
pub mod response;

pub use assembler::{Assembled, CompletedRequest, RequestAssembler, RequestHead};
pub use headers::Headers;
pub use request::Request;
pub use response::Response;

/// Protocol-error taxonomy.
///
/// Each code identifies why a connection's inbound stream stopped being
/// parseable; every one of them closes the offending connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum ProtocolError {
    /// Request line missing one of its three tokens.
    #[error("BAD_METHOD_OR_URI_OR_VERSION")]
    BadMethodOrUriOrVersion,

    /// Cumulative header size over the configured cap.
    #[error("BAD_HEADERS_TOO_LARGE")]
    BadHeadersTooLarge,

    /// Repeated Content-Length, or Content-Length combined with chunked
    /// transfer encoding.
    #[error("BAD_REPEATED_LENGTH_OR_TRANSFER_ENCODING_OR_BOTH")]
    BadRepeatedLengthOrTransferEncodingOrBoth,

    /// Declared or accumulated body size over the configured cap, or more
    /// body bytes than the declared length.
    #[error("BAD_CONTENT_TOO_LARGE")]
    BadContentTooLarge,

    /// Malformed chunk-size line or missing chunk delimiter.
    #[error("BAD_CHUNK_ENCODING")]
    BadChunkEncoding,

    /// Malformed trailer line after the terminal chunk.
    #[error("BAD_TRAILER_HEADERS")]
    BadTrailerHeaders,
}

impl ProtocolError {
    /// Stable code for logs and error callbacks.
    pub fn code(&self) -> &'static str {
        match self {
            ProtocolError::BadMethodOrUriOrVersion => "BAD_METHOD_OR_URI_OR_VERSION",
            ProtocolError::BadHeadersTooLarge => "BAD_HEADERS_TOO_LARGE",
            ProtocolError::BadRepeatedLengthOrTransferEncodingOrBoth => {
                "BAD_REPEATED_LENGTH_OR_TRANSFER_ENCODING_OR_BOTH"
            }
            ProtocolError::BadContentTooLarge => "BAD_CONTENT_TOO_LARGE",
            ProtocolError::BadChunkEncoding => "BAD_CHUNK_ENCODING",
            ProtocolError::BadTrailerHeaders => "BAD_TRAILER_HEADERS",
        }
    }
}

/// CRLF line ending
pub const CRLF: &str = "\r\n";

/// Default HTTP version emitted in responses
pub const HTTP_VERSION_1_1: &str = "HTTP/1.1";

// Header names the core itself consults, in their stored (upper-cased)
// form.
pub const HEADER_CONTENT_LENGTH: &str = "CONTENT-LENGTH";
pub const HEADER_TRANSFER_ENCODING: &str = "TRANSFER-ENCODING";
pub const HEADER_CONNECTION: &str = "CONNECTION";

/// Canonical reason phrase for a status code.
pub fn reason_phrase(code: u16) -> &'static str {
    match code {
        100 => "Continue",
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        206 => "Partial Content",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        406 => "Not Acceptable",
        408 => "Request Timeout",
        409 => "Conflict",
        410 => "Gone",
        411 => "Length Required",
        413 => "Payload Too Large",
        414 => "URI Too Long",
        415 => "Unsupported Media Type",
        417 => "Expectation Failed",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        505 => "HTTP Version Not Supported",
        _ => "Unknown",
    }
}
