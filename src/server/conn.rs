//! Per-connection state and the connection table.
//!
//! A [`ConnectionRecord`] owns the accepted socket and the bookkeeping
//! the reactor needs (activity timestamp, close flag). Records are kept
//! in a [`ConnectionTable`] keyed by connection id; handlers reach the
//! connection only through a [`ConnHandle`], which can write the response
//! and schedule the close but never closes the descriptor itself. The
//! descriptor is released when the last owner drops the record, after the
//! reactor has removed it from the table; there is a single close path.

use std::collections::HashMap;
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::net::poll::{wait_single, Interest};
use crate::net::{Address, Error, ErrorKind, Result, Socket, WriteOutcome};

/// How long the response writer waits for the socket to become writable
/// before giving up on a stalled peer.
const WRITE_READINESS_TIMEOUT: Duration = Duration::from_secs(10);

/// State for one accepted client.
#[derive(Debug)]
pub(crate) struct ConnectionRecord {
    id: u64,
    socket: Socket,
    remote: Address,
    last_activity: Mutex<Instant>,
    closing: AtomicBool,
}

impl ConnectionRecord {
    pub(crate) fn new(id: u64, socket: Socket, remote: Address) -> Self {
        ConnectionRecord {
            id,
            socket,
            remote,
            last_activity: Mutex::new(Instant::now()),
            closing: AtomicBool::new(false),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn socket(&self) -> &Socket {
        &self.socket
    }

    pub(crate) fn remote(&self) -> Address {
        self.remote
    }

    /// Refresh the activity timestamp; called whenever bytes arrive.
    pub(crate) fn touch(&self) {
        *lock(&self.last_activity) = Instant::now();
    }

    pub(crate) fn idle_for(&self) -> Duration {
        lock(&self.last_activity).elapsed()
    }

    /// Mark the connection for closing. Idempotent; the reactor performs
    /// the actual close on its next pass.
    pub(crate) fn schedule_close(&self) {
        self.closing.store(true, Ordering::Release);
    }

    pub(crate) fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }
}

/// Capability a request/response pair holds on its connection: write
/// bytes, request closure. Cloneable and sendable so handlers may be
/// offloaded to other threads.
#[derive(Clone)]
pub(crate) struct ConnHandle {
    record: Arc<ConnectionRecord>,
}

impl ConnHandle {
    pub(crate) fn new(record: Arc<ConnectionRecord>) -> Self {
        ConnHandle { record }
    }

    pub(crate) fn remote(&self) -> Address {
        self.record.remote()
    }

    pub(crate) fn schedule_close(&self) {
        self.record.schedule_close();
    }

    /// Deliver all of `bytes`, looping over partial writes and waiting
    /// for writability when the socket's send buffer is full.
    pub(crate) fn write_all(&self, bytes: &[u8]) -> Result<()> {
        if self.record.is_closing() {
            return Err(Error::new(
                ErrorKind::Write,
                "response",
                "connection is closing",
            ));
        }
        let socket = self.record.socket();
        let mut offset = 0;
        while offset < bytes.len() {
            match socket.write(&bytes[offset..])? {
                WriteOutcome::Written(0) => {
                    return Err(Error::new(
                        ErrorKind::Write,
                        "response",
                        "connection closed while writing",
                    ));
                }
                WriteOutcome::Written(n) => offset += n,
                WriteOutcome::WouldBlock => {
                    let ready = wait_single(
                        socket.as_raw_fd(),
                        Interest::Write,
                        Some(WRITE_READINESS_TIMEOUT),
                    )?;
                    if !ready {
                        return Err(Error::new(
                            ErrorKind::PartialWrite,
                            "response",
                            format!("stalled after {} of {} bytes", offset, bytes.len()),
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Thread-safe map from connection id to record.
#[derive(Default)]
pub(crate) struct ConnectionTable {
    inner: Mutex<HashMap<u64, Arc<ConnectionRecord>>>,
}

impl ConnectionTable {
    pub(crate) fn new() -> Self {
        ConnectionTable {
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn insert(&self, record: Arc<ConnectionRecord>) {
        lock(&self.inner).insert(record.id(), record);
    }

    pub(crate) fn erase(&self, id: u64) -> Option<Arc<ConnectionRecord>> {
        lock(&self.inner).remove(&id)
    }

    pub(crate) fn contains(&self, id: u64) -> bool {
        self.get(id).is_some()
    }

    pub(crate) fn get(&self, id: u64) -> Option<Arc<ConnectionRecord>> {
        lock(&self.inner).get(&id).cloned()
    }

    pub(crate) fn size(&self) -> usize {
        lock(&self.inner).len()
    }

    pub(crate) fn max_id(&self) -> Option<u64> {
        lock(&self.inner).keys().max().copied()
    }

    /// Clone the current records out under the lock.
    pub(crate) fn snapshot(&self) -> Vec<Arc<ConnectionRecord>> {
        lock(&self.inner).values().cloned().collect()
    }

    /// Visit every record. The callback runs on a snapshot, outside the
    /// lock, so it may call back into the table freely.
    pub(crate) fn for_each(&self, mut f: impl FnMut(&Arc<ConnectionRecord>)) {
        for record in self.snapshot() {
            f(&record);
        }
    }

    /// Remove records whose socket no longer has a live peer; returns the
    /// removed records so the caller can run its close bookkeeping.
    pub(crate) fn cleanup(&self) -> Vec<Arc<ConnectionRecord>> {
        let mut guard = lock(&self.inner);
        let dead: Vec<u64> = guard
            .values()
            .filter(|r| !r.socket().is_connected())
            .map(|r| r.id())
            .collect();
        dead.iter().filter_map(|id| guard.remove(id)).collect()
    }
}

/// Lock a mutex, recovering the guard from a poisoned lock; the guarded
/// maps stay usable even if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{Family, Protocol};
    use std::io::Read;
    use std::net::TcpStream;
    use std::thread;

    fn local(port: u16) -> Address {
        Address::parse("127.0.0.1", port).unwrap()
    }

    /// Accept one connection through our own socket layer; returns the
    /// server-side socket, the peer address, and the client stream.
    fn accept_pair() -> (Socket, Address, TcpStream) {
        let listener = Socket::listen_on(&local(0), 16).unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr.as_socket_addr()).unwrap();
        assert!(wait_single(
            listener.as_raw_fd(),
            Interest::Read,
            Some(Duration::from_secs(2))
        )
        .unwrap());
        let (socket, remote) = listener.accept().unwrap().unwrap();
        (socket, remote, client)
    }

    fn record(id: u64) -> (Arc<ConnectionRecord>, TcpStream) {
        let (socket, remote, client) = accept_pair();
        (Arc::new(ConnectionRecord::new(id, socket, remote)), client)
    }

    #[test]
    fn test_table_operations() {
        let table = ConnectionTable::new();
        let (first, _c1) = record(1);
        let (second, _c2) = record(7);

        table.insert(first);
        table.insert(second);
        assert_eq!(table.size(), 2);
        assert!(table.contains(1));
        assert!(table.contains(7));
        assert_eq!(table.max_id(), Some(7));
        assert_eq!(table.get(7).unwrap().id(), 7);

        let removed = table.erase(1).unwrap();
        assert_eq!(removed.id(), 1);
        assert!(!table.contains(1));
        assert_eq!(table.size(), 1);
        assert!(table.erase(99).is_none());
    }

    #[test]
    fn test_for_each_runs_outside_the_lock() {
        let table = ConnectionTable::new();
        let (first, _c1) = record(1);
        let (extra, _c2) = record(2);
        table.insert(first);

        // Mutating the table from inside the callback must not deadlock.
        let mut seen = 0;
        table.for_each(|_| {
            seen += 1;
            table.insert(extra.clone());
        });
        assert_eq!(seen, 1);
        assert_eq!(table.size(), 2);
    }

    #[test]
    fn test_cleanup_removes_unconnected_records() {
        let table = ConnectionTable::new();
        let (live, _client) = record(1);
        table.insert(live);

        // A socket that was never connected has no peer.
        let orphan = Socket::new(Protocol::Tcp, Family::V4).unwrap();
        table.insert(Arc::new(ConnectionRecord::new(2, orphan, local(9))));

        let removed = table.cleanup();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id(), 2);
        assert!(table.contains(1));
        assert!(!table.contains(2));
    }

    #[test]
    fn test_touch_and_idle_for() {
        let (rec, _client) = record(1);
        thread::sleep(Duration::from_millis(30));
        assert!(rec.idle_for() >= Duration::from_millis(30));
        rec.touch();
        assert!(rec.idle_for() < Duration::from_millis(30));
    }

    #[test]
    fn test_write_all_delivers_large_payload() {
        let (rec, mut client) = record(1);
        let handle = ConnHandle::new(rec.clone());

        let reader = thread::spawn(move || {
            let mut data = Vec::new();
            client.read_to_end(&mut data).unwrap();
            data
        });

        // Large enough to overrun the send buffer and exercise the
        // wait-for-writability path on the non-blocking socket.
        let payload = vec![0xAB; 1 << 20];
        handle.write_all(&payload).unwrap();
        drop(handle);
        drop(rec);

        let received = reader.join().unwrap();
        assert_eq!(received.len(), payload.len());
        assert!(received.iter().all(|&b| b == 0xAB));
    }

    #[test]
    fn test_write_after_schedule_close_fails() {
        let (rec, _client) = record(1);
        let handle = ConnHandle::new(rec.clone());
        handle.schedule_close();
        let err = handle.write_all(b"data").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Write);
    }
}
