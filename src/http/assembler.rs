//! Incremental HTTP/1.1 request assembly.
//!
//! One [`RequestAssembler`] exists per connection. The reactor feeds it
//! whatever bytes arrived; the assembler consumes what it can and answers
//! with [`Assembled::NeedMore`], a completed request, or a fatal protocol
//! error. State survives between feeds, so a request line, a header, a
//! chunk-size line or a body may be split across any number of segments.
//!
//! Phases:
//!
//! ```text
//! RequestLine -> Headers -> FixedBody ----------------+-> Complete
//!                        \-> ChunkSize <-> ChunkData  |
//!                        |        \-> Trailers -------+
//!                        \-> (no body) ---------------+
//! ```
//!
//! Any phase may end in `Fatal` instead; after that the machine stays
//! failed and the connection is expected to be closed.

use crate::net::DataBuffer;

use super::headers::Headers;
use super::{ProtocolError, HEADER_CONTENT_LENGTH, HEADER_TRANSFER_ENCODING};

/// Parsed request line and header section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: String,
    pub uri: String,
    pub version: String,
    pub headers: Headers,
}

/// A fully assembled request.
#[derive(Debug, PartialEq, Eq)]
pub struct CompletedRequest {
    pub head: RequestHead,
    pub body: Vec<u8>,
}

/// Progress report from one feed of bytes.
#[derive(Debug, PartialEq, Eq)]
pub enum Assembled {
    /// Nothing conclusive yet; feed more bytes when they arrive.
    NeedMore,
    /// A complete request was parsed; the machine has reset.
    Complete(CompletedRequest),
    /// The stream is not valid HTTP; close the connection.
    Fatal(ProtocolError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    RequestLine,
    Headers,
    FixedBody { remaining: usize },
    ChunkSize,
    ChunkData { remaining: usize },
    Trailers,
    Failed(ProtocolError),
}

enum Framing {
    None,
    ContentLength(usize),
    Chunked,
}

/// Per-connection HTTP/1.1 parsing state machine.
#[derive(Debug)]
pub struct RequestAssembler {
    max_header_size: usize,
    max_body_size: usize,
    announce_heads: bool,
    phase: Phase,
    inbound: DataBuffer,
    method: String,
    uri: String,
    version: String,
    headers: Headers,
    header_bytes: usize,
    body: Vec<u8>,
    pending_head: Option<RequestHead>,
}

impl RequestAssembler {
    /// `announce_heads` controls whether a [`RequestHead`] snapshot is
    /// staged when the header section completes (skipped when nobody
    /// listens, to avoid the clone).
    pub fn new(max_header_size: usize, max_body_size: usize, announce_heads: bool) -> Self {
        RequestAssembler {
            max_header_size,
            max_body_size,
            announce_heads,
            phase: Phase::RequestLine,
            inbound: DataBuffer::new(),
            method: String::new(),
            uri: String::new(),
            version: String::new(),
            headers: Headers::new(),
            header_bytes: 0,
            body: Vec::new(),
            pending_head: None,
        }
    }

    /// Feed newly arrived bytes and drive the machine as far as they
    /// allow.
    pub fn feed(&mut self, data: &[u8]) -> Assembled {
        self.inbound.append(data);

        // Hard cap on what a single request may ever keep buffered.
        if self.inbound.len() > self.max_header_size + self.max_body_size {
            let code = match self.phase {
                Phase::RequestLine | Phase::Headers => ProtocolError::BadHeadersTooLarge,
                Phase::FixedBody { .. } | Phase::ChunkSize | Phase::ChunkData { .. } => {
                    ProtocolError::BadContentTooLarge
                }
                Phase::Trailers => ProtocolError::BadTrailerHeaders,
                Phase::Failed(code) => return Assembled::Fatal(code),
            };
            return self.fail(code);
        }

        self.drive()
    }

    /// Take the staged header-section snapshot, at most once per request.
    pub fn take_head_event(&mut self) -> Option<RequestHead> {
        self.pending_head.take()
    }

    fn drive(&mut self) -> Assembled {
        loop {
            match self.phase {
                Phase::Failed(code) => return Assembled::Fatal(code),

                Phase::RequestLine => {
                    let line = match self.take_line() {
                        Some(line) => line,
                        None => return self.head_pending(),
                    };
                    let mut tokens = line.split_whitespace();
                    let method = tokens.next().unwrap_or_default();
                    let uri = tokens.next().unwrap_or_default();
                    let version = tokens.next().unwrap_or_default();
                    if method.is_empty() || uri.is_empty() || version.is_empty() {
                        return self.fail(ProtocolError::BadMethodOrUriOrVersion);
                    }
                    self.method = method.to_string();
                    self.uri = uri.to_string();
                    self.version = version.to_string();
                    self.phase = Phase::Headers;
                }

                Phase::Headers => {
                    let line = match self.take_line() {
                        Some(line) => line,
                        None => return self.head_pending(),
                    };
                    if line.is_empty() {
                        let framing = match self.select_framing() {
                            Ok(framing) => framing,
                            Err(code) => return self.fail(code),
                        };
                        self.stage_head();
                        match framing {
                            Framing::None => return self.complete(),
                            Framing::ContentLength(n) => {
                                self.phase = Phase::FixedBody { remaining: n }
                            }
                            Framing::Chunked => self.phase = Phase::ChunkSize,
                        }
                    } else if let Some((name, value)) = Headers::split_header_line(&line) {
                        self.header_bytes += name.len() + value.len();
                        if self.header_bytes > self.max_header_size {
                            return self.fail(ProtocolError::BadHeadersTooLarge);
                        }
                        self.headers.insert(name, value);
                    }
                    // A line without a colon is skipped; obs-fold
                    // continuations are never honored as folds.
                }

                Phase::FixedBody { remaining } => {
                    if remaining == 0 {
                        return self.complete();
                    }
                    let available = self.inbound.len();
                    if available == 0 {
                        return Assembled::NeedMore;
                    }
                    if available > remaining {
                        // More bytes than the declared length; there is no
                        // next request this could belong to.
                        return self.fail(ProtocolError::BadContentTooLarge);
                    }
                    self.body.extend_from_slice(self.inbound.as_slice());
                    self.inbound.consume(available);
                    self.phase = Phase::FixedBody {
                        remaining: remaining - available,
                    };
                }

                Phase::ChunkSize => {
                    let line = match self.take_line() {
                        Some(line) => line,
                        None => return Assembled::NeedMore,
                    };
                    if line.is_empty() {
                        return self.fail(ProtocolError::BadChunkEncoding);
                    }
                    // Chunk extensions after ';' are ignored.
                    let token = line.split(';').next().unwrap_or_default();
                    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_hexdigit()) {
                        return self.fail(ProtocolError::BadChunkEncoding);
                    }
                    let size = match usize::from_str_radix(token, 16) {
                        Ok(size) => size,
                        Err(_) => return self.fail(ProtocolError::BadChunkEncoding),
                    };
                    if size == 0 {
                        self.phase = Phase::Trailers;
                    } else if self.body.len() + size > self.max_body_size {
                        return self.fail(ProtocolError::BadContentTooLarge);
                    } else {
                        self.phase = Phase::ChunkData { remaining: size };
                    }
                }

                Phase::ChunkData { remaining } => {
                    if self.inbound.len() < remaining + 2 {
                        return Assembled::NeedMore;
                    }
                    let slice = self.inbound.as_slice();
                    if &slice[remaining..remaining + 2] != b"\r\n" {
                        return self.fail(ProtocolError::BadChunkEncoding);
                    }
                    self.body.extend_from_slice(&slice[..remaining]);
                    self.inbound.consume(remaining + 2);
                    self.phase = Phase::ChunkSize;
                }

                Phase::Trailers => {
                    let line = match self.take_line() {
                        Some(line) => line,
                        None => return Assembled::NeedMore,
                    };
                    if line.is_empty() {
                        return self.complete();
                    }
                    // Trailers are parsed for validation only and
                    // discarded.
                    if Headers::split_header_line(&line).is_none() {
                        return self.fail(ProtocolError::BadTrailerHeaders);
                    }
                }
            }
        }
    }

    /// Remove one line from the front of the buffer. Lines end in LF; a
    /// trailing CR is stripped if present.
    fn take_line(&mut self) -> Option<String> {
        let slice = self.inbound.as_slice();
        let lf = slice.iter().position(|&b| b == b'\n')?;
        let mut end = lf;
        if end > 0 && slice[end - 1] == b'\r' {
            end -= 1;
        }
        let line = String::from_utf8_lossy(&slice[..end]).into_owned();
        self.inbound.consume(lf + 1);
        Some(line)
    }

    /// No complete line in the head section: more data is needed unless
    /// the unterminated remainder already blows the header cap.
    fn head_pending(&mut self) -> Assembled {
        if self.header_bytes + self.inbound.len() > self.max_header_size {
            return self.fail(ProtocolError::BadHeadersTooLarge);
        }
        Assembled::NeedMore
    }

    /// Pick the body framing from the parsed headers.
    fn select_framing(&self) -> Result<Framing, ProtocolError> {
        let content_lengths = self.headers.count(HEADER_CONTENT_LENGTH);
        let chunked = self
            .headers
            .get_all(HEADER_TRANSFER_ENCODING)
            .iter()
            .any(|value| value.to_ascii_lowercase().contains("chunked"));

        if content_lengths > 1 || (content_lengths == 1 && chunked) {
            return Err(ProtocolError::BadRepeatedLengthOrTransferEncodingOrBoth);
        }
        if chunked {
            return Ok(Framing::Chunked);
        }
        if content_lengths == 1 {
            let value = self.headers.get(HEADER_CONTENT_LENGTH).unwrap_or_default();
            let n = value
                .parse::<usize>()
                .map_err(|_| ProtocolError::BadContentTooLarge)?;
            if n > self.max_body_size {
                return Err(ProtocolError::BadContentTooLarge);
            }
            return Ok(Framing::ContentLength(n));
        }
        Ok(Framing::None)
    }

    fn stage_head(&mut self) {
        if self.announce_heads {
            self.pending_head = Some(RequestHead {
                method: self.method.clone(),
                uri: self.uri.clone(),
                version: self.version.clone(),
                headers: self.headers.clone(),
            });
        }
    }

    fn complete(&mut self) -> Assembled {
        let request = CompletedRequest {
            head: RequestHead {
                method: std::mem::take(&mut self.method),
                uri: std::mem::take(&mut self.uri),
                version: std::mem::take(&mut self.version),
                headers: std::mem::take(&mut self.headers),
            },
            body: std::mem::take(&mut self.body),
        };
        self.header_bytes = 0;
        self.inbound.clear();
        self.phase = Phase::RequestLine;
        Assembled::Complete(request)
    }

    fn fail(&mut self, code: ProtocolError) -> Assembled {
        self.phase = Phase::Failed(code);
        Assembled::Fatal(code)
    }
}
