//! Server facade: configuration, event callbacks, and the listen loop.
//!
//! A [`Server`] wires the socket layer, the reactor and the HTTP
//! assembler together behind a small registration surface: one required
//! request handler plus optional hooks for connection lifecycle, errors
//! and ticks. `listen()` blocks on the reactor until a [`ServerHandle`]
//! flips the running flag from any thread.
//!
//! ```no_run
//! use breakwater::{Address, Server};
//!
//! # fn main() -> Result<(), breakwater::ServerError> {
//! let mut server = Server::new(Address::parse("127.0.0.1", 8080)?);
//! server.on_request(|_request, mut response| {
//!     response.add_header("Content-Type", "text/plain");
//!     response.set_body("hello\n");
//!     if response.send().is_ok() {
//!         response.end();
//!     }
//! });
//! server.listen()
//! # }
//! ```

pub(crate) mod conn;
mod reactor;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::http::{ProtocolError, Request, RequestHead, Response};
use crate::net::{self, Address, Socket};

use reactor::Reactor;

/// Resource and protocol bounds for one server.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen queue depth; the OS caps the effective value.
    pub backlog: i32,
    /// Cap on concurrent connections; accepts are deferred beyond it.
    pub max_connections: usize,
    /// Upper bound on one reactor wait.
    pub poll_timeout: Duration,
    /// Inactivity window after which a connection is closed.
    pub max_idle: Duration,
    /// Cap on the cumulative size of header names and values.
    pub max_header_size: usize,
    /// Cap on a request body, declared or accumulated.
    pub max_body_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            backlog: 1_048_576,
            max_connections: 32_768,
            poll_timeout: Duration::from_millis(1000),
            max_idle: Duration::from_secs(5),
            max_header_size: 16 * 1024,
            max_body_size: 5 * 1024 * 1024,
        }
    }
}

impl Config {
    pub fn with_backlog(mut self, backlog: i32) -> Self {
        self.backlog = backlog;
        self
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn with_max_idle(mut self, max_idle: Duration) -> Self {
        self.max_idle = max_idle;
        self
    }

    pub fn with_max_header_size(mut self, size: usize) -> Self {
        self.max_header_size = size;
        self
    }

    pub fn with_max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }
}

/// Errors surfaced through `on_error` and from `listen()`.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Socket-layer failure.
    #[error(transparent)]
    Net(#[from] net::Error),
    /// Malformed inbound HTTP; the offending connection is closed.
    #[error("protocol error: {0}")]
    Protocol(ProtocolError),
    /// The request handler failed or is missing.
    #[error("handler error: {0}")]
    Handler(String),
}

/// One optional slot per server event.
#[derive(Default)]
pub(crate) struct Callbacks {
    pub(crate) on_request: Option<Box<dyn Fn(Request, Response) + Send + Sync>>,
    pub(crate) on_connection_opened: Option<Box<dyn Fn(&Address) + Send + Sync>>,
    pub(crate) on_connection_closed: Option<Box<dyn Fn(&Address) + Send + Sync>>,
    pub(crate) on_listen_success: Option<Box<dyn Fn() + Send + Sync>>,
    pub(crate) on_shutdown: Option<Box<dyn Fn() + Send + Sync>>,
    pub(crate) on_error: Option<Box<dyn Fn(&ServerError) + Send + Sync>>,
    pub(crate) on_idle_tick: Option<Box<dyn Fn() + Send + Sync>>,
    pub(crate) on_headers_received: Option<Box<dyn Fn(&RequestHead) + Send + Sync>>,
}

/// Cloneable handle that can stop a running server from any thread.
#[derive(Clone)]
pub struct ServerHandle {
    running: Arc<AtomicBool>,
}

impl ServerHandle {
    /// Make the reactor exit at its next wake.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// HTTP/1.1 server over a single listening endpoint.
pub struct Server {
    address: Address,
    config: Config,
    callbacks: Callbacks,
    listener: Option<Socket>,
    running: Arc<AtomicBool>,
}

impl Server {
    pub fn new(address: Address) -> Self {
        Server::with_config(address, Config::default())
    }

    pub fn with_config(address: Address, config: Config) -> Self {
        Server {
            address,
            config,
            callbacks: Callbacks::default(),
            listener: None,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Handle for stopping the server from another thread or a signal
    /// handler.
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            running: self.running.clone(),
        }
    }

    /// Register the request handler. Required: without it every request
    /// is answered by closing the connection and reporting through
    /// `on_error`.
    pub fn on_request(&mut self, f: impl Fn(Request, Response) + Send + Sync + 'static) {
        self.callbacks.on_request = Some(Box::new(f));
    }

    pub fn on_connection_opened(&mut self, f: impl Fn(&Address) + Send + Sync + 'static) {
        self.callbacks.on_connection_opened = Some(Box::new(f));
    }

    pub fn on_connection_closed(&mut self, f: impl Fn(&Address) + Send + Sync + 'static) {
        self.callbacks.on_connection_closed = Some(Box::new(f));
    }

    pub fn on_listen_success(&mut self, f: impl Fn() + Send + Sync + 'static) {
        self.callbacks.on_listen_success = Some(Box::new(f));
    }

    pub fn on_shutdown(&mut self, f: impl Fn() + Send + Sync + 'static) {
        self.callbacks.on_shutdown = Some(Box::new(f));
    }

    pub fn on_error(&mut self, f: impl Fn(&ServerError) + Send + Sync + 'static) {
        self.callbacks.on_error = Some(Box::new(f));
    }

    /// Fires once per reactor wake, including timeout wakes.
    pub fn on_idle_tick(&mut self, f: impl Fn() + Send + Sync + 'static) {
        self.callbacks.on_idle_tick = Some(Box::new(f));
    }

    /// Fires once per request, as soon as its header section is parsed.
    pub fn on_headers_received(&mut self, f: impl Fn(&RequestHead) + Send + Sync + 'static) {
        self.callbacks.on_headers_received = Some(Box::new(f));
    }

    /// Create the listening socket now, without entering the loop. Useful
    /// to learn the bound port before `listen()`; `listen()` calls this
    /// implicitly.
    pub fn bind(&mut self) -> net::Result<()> {
        if self.listener.is_none() {
            self.listener = Some(Socket::listen_on(&self.address, self.config.backlog)?);
        }
        Ok(())
    }

    /// Address of the bound listener, once `bind()` has run. With port 0
    /// this is where the OS-chosen port shows up.
    pub fn local_addr(&self) -> Option<Address> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Run the server. Blocks on the reactor until [`ServerHandle::stop`]
    /// is called or the loop fails.
    pub fn listen(&mut self) -> Result<(), ServerError> {
        let listener = match self.listener.take() {
            Some(listener) => listener,
            None => Socket::listen_on(&self.address, self.config.backlog)?,
        };
        let bound = listener.local_addr().map(|a| a.to_string()).unwrap_or_default();
        tracing::info!(address = %bound, "listening");

        self.running.store(true, Ordering::SeqCst);
        if let Some(cb) = &self.callbacks.on_listen_success {
            cb();
        }

        let result =
            Reactor::new(listener, &self.config, &self.callbacks, self.running.clone()).run();
        self.running.store(false, Ordering::SeqCst);
        tracing::info!("server stopped");
        result
    }
}
