//! The readiness loop.
//!
//! A single thread owns the reactor. Each iteration polls the listener
//! and every live connection for readability, drains pending accepts and
//! reads, hands arriving bytes to the per-connection assembler, sweeps
//! idle connections once per second, and closes everything that was
//! scheduled for closing, exactly once per connection.
//!
//! An error on one connection closes that connection and nothing else; a
//! failure of the poll itself ends the loop and is returned to the
//! caller. Flipping the shared `running` flag makes the loop exit at its
//! next wake, closing the listener and every live connection.

use std::collections::HashMap;
use std::os::fd::AsRawFd;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::http::assembler::{Assembled, CompletedRequest, RequestAssembler};
use crate::http::{Request, Response};
use crate::net::{Interest, PollSet, ReadOutcome, Socket};

use super::conn::{lock, ConnHandle, ConnectionRecord, ConnectionTable};
use super::{Callbacks, Config, ServerError};

/// Stack buffer size for one read; reads loop until would-block, so this
/// bounds syscall granularity, not request size.
const READ_CHUNK: usize = 4096;

/// Cadence of the idle sweep.
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

pub(crate) struct Reactor<'a> {
    listener: Socket,
    config: &'a Config,
    callbacks: &'a Callbacks,
    running: Arc<AtomicBool>,
    table: ConnectionTable,
    assemblers: Mutex<HashMap<u64, RequestAssembler>>,
    next_id: u64,
}

impl<'a> Reactor<'a> {
    pub(crate) fn new(
        listener: Socket,
        config: &'a Config,
        callbacks: &'a Callbacks,
        running: Arc<AtomicBool>,
    ) -> Self {
        Reactor {
            listener,
            config,
            callbacks,
            running,
            table: ConnectionTable::new(),
            assemblers: Mutex::new(HashMap::new()),
            next_id: 0,
        }
    }

    /// Drive the loop until `running` is cleared or the poll fails.
    pub(crate) fn run(&mut self) -> Result<(), ServerError> {
        let mut pollset = PollSet::new();
        let mut last_sweep = Instant::now();

        while self.running.load(Ordering::SeqCst) {
            pollset.clear();
            let listener_slot = pollset.push(self.listener.as_raw_fd(), Interest::Read);

            let mut slots = Vec::new();
            self.table.for_each(|record| {
                if !record.is_closing() {
                    let slot = pollset.push(record.socket().as_raw_fd(), Interest::Read);
                    slots.push((slot, record.clone()));
                }
            });

            match pollset.wait(Some(self.config.poll_timeout)) {
                Ok(_) => {}
                Err(e) => {
                    let err = ServerError::Net(e);
                    tracing::error!("reactor poll failed: {}", err);
                    self.emit(&err);
                    return Err(err);
                }
            }

            if let Some(cb) = &self.callbacks.on_idle_tick {
                cb();
            }

            if pollset.readable(listener_slot) {
                self.accept_ready();
            }

            for (slot, record) in &slots {
                if pollset.readable(*slot) {
                    self.read_ready(record);
                }
            }

            if last_sweep.elapsed() >= SWEEP_INTERVAL {
                self.idle_sweep();
                last_sweep = Instant::now();
            }

            self.close_pass();
        }

        self.shutdown();
        Ok(())
    }

    /// Accept until would-block, deferring when the connection cap is
    /// reached; the listener stays registered and its backlog holds the
    /// rest.
    fn accept_ready(&mut self) {
        loop {
            if self.table.size() >= self.config.max_connections {
                tracing::warn!(
                    limit = self.config.max_connections,
                    "connection limit reached, deferring accepts"
                );
                break;
            }
            match self.listener.accept() {
                Ok(Some((socket, remote))) => {
                    self.next_id += 1;
                    let record = Arc::new(ConnectionRecord::new(self.next_id, socket, remote));
                    tracing::debug!(id = self.next_id, remote = %remote, "connection opened");
                    self.table.insert(record);
                    if let Some(cb) = &self.callbacks.on_connection_opened {
                        cb(&remote);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("accept failed: {}", e);
                    self.emit(&ServerError::Net(e));
                    break;
                }
            }
        }
    }

    /// Drain one connection's readable data into its assembler.
    fn read_ready(&self, record: &Arc<ConnectionRecord>) {
        // The slot list is a snapshot; skip records the sweep already
        // removed, or a stale feed would resurrect their assembler entry.
        if !self.table.contains(record.id()) {
            return;
        }
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if record.is_closing() {
                break;
            }
            match record.socket().read(&mut chunk) {
                Ok(ReadOutcome::Data(n)) => {
                    record.touch();
                    self.feed(record, &chunk[..n]);
                }
                Ok(ReadOutcome::WouldBlock) => break,
                Ok(ReadOutcome::Eof) => {
                    record.schedule_close();
                    break;
                }
                Err(e) => {
                    tracing::warn!(id = record.id(), "read failed: {}", e);
                    self.emit(&ServerError::Net(e));
                    record.schedule_close();
                    break;
                }
            }
        }
    }

    /// Hand bytes to the connection's assembler and act on the outcome.
    /// The assembler lock is released before any callback runs.
    fn feed(&self, record: &Arc<ConnectionRecord>, bytes: &[u8]) {
        let announce = self.callbacks.on_headers_received.is_some();
        let (outcome, head_event) = {
            let mut machines = lock(&self.assemblers);
            let machine = machines.entry(record.id()).or_insert_with(|| {
                RequestAssembler::new(
                    self.config.max_header_size,
                    self.config.max_body_size,
                    announce,
                )
            });
            let outcome = machine.feed(bytes);
            let head_event = machine.take_head_event();
            if matches!(outcome, Assembled::Complete(_) | Assembled::Fatal(_)) {
                machines.remove(&record.id());
            }
            (outcome, head_event)
        };

        if let Some(head) = head_event {
            if let Some(cb) = &self.callbacks.on_headers_received {
                cb(&head);
            }
        }

        match outcome {
            Assembled::NeedMore => {}
            Assembled::Complete(request) => self.dispatch(record, request),
            Assembled::Fatal(code) => {
                tracing::warn!(id = record.id(), code = code.code(), "protocol error");
                self.emit(&ServerError::Protocol(code));
                record.schedule_close();
            }
        }
    }

    /// Build the request/response pair and invoke the handler. A
    /// panicking handler is contained: the error surfaces through
    /// `on_error` and the connection still closes exactly once.
    fn dispatch(&self, record: &Arc<ConnectionRecord>, assembled: CompletedRequest) {
        let handle = ConnHandle::new(record.clone());
        let request = Request::new(assembled, handle.clone());
        let response = Response::new(handle);
        tracing::debug!(
            id = record.id(),
            method = request.method(),
            uri = request.uri(),
            "request assembled"
        );

        match &self.callbacks.on_request {
            Some(handler) => {
                if catch_unwind(AssertUnwindSafe(|| handler(request, response))).is_err() {
                    tracing::warn!(id = record.id(), "request handler panicked");
                    self.emit(&ServerError::Handler("request handler panicked".into()));
                    record.schedule_close();
                }
            }
            None => {
                self.emit(&ServerError::Handler(
                    "no request handler registered".into(),
                ));
                record.schedule_close();
            }
        }
    }

    /// Schedule closes for connections idle past the limit and sweep out
    /// records whose peer vanished without an observable event.
    fn idle_sweep(&self) {
        self.table.for_each(|record| {
            if !record.is_closing() && record.idle_for() >= self.config.max_idle {
                tracing::debug!(id = record.id(), "idle timeout");
                record.schedule_close();
            }
        });
        for record in self.table.cleanup() {
            self.finish_close(&record);
        }
    }

    /// Close everything scheduled for closing. The erase guard keeps the
    /// close-and-notify pair exactly-once even when a connection is
    /// scheduled from several places.
    fn close_pass(&self) {
        let mut closing = Vec::new();
        self.table.for_each(|record| {
            if record.is_closing() {
                closing.push(record.clone());
            }
        });
        for record in closing {
            if let Some(record) = self.table.erase(record.id()) {
                self.finish_close(&record);
            }
        }
    }

    fn finish_close(&self, record: &Arc<ConnectionRecord>) {
        lock(&self.assemblers).remove(&record.id());
        tracing::debug!(id = record.id(), remote = %record.remote(), "connection closed");
        if let Some(cb) = &self.callbacks.on_connection_closed {
            cb(&record.remote());
        }
        // The descriptor is released when the last Arc drops; a handler
        // still holding its ConnHandle only delays that, never doubles it.
    }

    /// Cooperative shutdown: discard partial requests, close every live
    /// connection, notify, and let the listener drop with the reactor.
    fn shutdown(&mut self) {
        tracing::info!(
            live = self.table.size(),
            highest_id = self.table.max_id().unwrap_or(0),
            "reactor shutting down"
        );
        self.table.for_each(|record| record.schedule_close());
        self.close_pass();
        lock(&self.assemblers).clear();
        if let Some(cb) = &self.callbacks.on_shutdown {
            cb();
        }
    }

    fn emit(&self, err: &ServerError) {
        if let Some(cb) = &self.callbacks.on_error {
            cb(err);
        }
    }
}
