//! breakwater: event-driven HTTP/1.1 server core built directly on the
//! operating-system socket interface.
//!
//! The crate solves two coupled problems: multiplexing many concurrent
//! client connections on one listening endpoint with readiness-based
//! event notification, and assembling inbound byte streams into
//! well-formed HTTP requests, Content-Length and chunked bodies alike,
//! arriving across arbitrarily many segments, under bounded resource
//! usage.
//!
//! # Layers
//!
//! - [`net`]: typed sockets, addresses, buffers, readiness polling
//! - [`http`]: header multimap, request assembler, request/response types
//! - [`server`]: connection table, reactor, and the [`Server`] facade
//!
//! The reactor runs on one thread. Handlers receive an owned
//! request/response pair and may run inline or move the pair to another
//! executor; the reactor never waits on them. Every response carries
//! `Connection: close` and the connection is torn down once it has been
//! written; there is no keep-alive reuse.
//!
//! # Example
//!
//! ```no_run
//! use breakwater::{Address, Server, ServerError};
//!
//! fn main() -> Result<(), ServerError> {
//!     let mut server = Server::new(Address::parse("127.0.0.1", 8080)?);
//!     server.on_request(|request, mut response| {
//!         response.add_header("Content-Type", "text/plain");
//!         response.set_body(format!("you asked for {}\n", request.uri()));
//!         if response.send().is_ok() {
//!             response.end();
//!         }
//!     });
//!     // Blocks until a ServerHandle from server.handle() calls stop().
//!     server.listen()
//! }
//! ```

pub mod http;
pub mod net;
pub mod server;

pub use http::{Headers, ProtocolError, Request, RequestHead, Response};
pub use net::{Address, DataBuffer, Family, Protocol, Socket};
pub use server::{Config, Server, ServerError, ServerHandle};
