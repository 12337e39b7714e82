//! Readiness polling over file descriptors.
//!
//! Thin wrapper around `poll(2)`. The reactor blocks here and nowhere
//! else; the response writer uses the single-descriptor form to wait for
//! writability on a non-blocking socket.

use std::os::fd::RawFd;
use std::time::Duration;

use libc::{nfds_t, pollfd, POLLERR, POLLHUP, POLLIN, POLLOUT};

use super::{Error, ErrorKind, Result};

/// Readiness the caller is interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Read,
    Write,
    Both,
}

impl Interest {
    fn events(self) -> libc::c_short {
        match self {
            Interest::Read => POLLIN,
            Interest::Write => POLLOUT,
            Interest::Both => POLLIN | POLLOUT,
        }
    }
}

/// A reusable set of descriptors to wait on.
///
/// The reactor rebuilds the set each iteration from the listener and the
/// live connections, then blocks in [`PollSet::wait`].
pub struct PollSet {
    fds: Vec<pollfd>,
}

impl PollSet {
    pub fn new() -> Self {
        PollSet { fds: Vec::new() }
    }

    pub fn clear(&mut self) {
        self.fds.clear();
    }

    pub fn len(&self) -> usize {
        self.fds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fds.is_empty()
    }

    /// Register a descriptor; returns its slot index.
    pub fn push(&mut self, fd: RawFd, interest: Interest) -> usize {
        self.fds.push(pollfd {
            fd,
            events: interest.events(),
            revents: 0,
        });
        self.fds.len() - 1
    }

    /// Block until at least one descriptor is ready or the timeout
    /// expires. Returns the number of ready descriptors; zero means the
    /// wait timed out. An interrupted wait is reported as zero ready.
    pub fn wait(&mut self, timeout: Option<Duration>) -> Result<usize> {
        let timeout_ms = timeout.map(|d| d.as_millis() as libc::c_int).unwrap_or(-1);
        let rc = unsafe { libc::poll(self.fds.as_mut_ptr(), self.fds.len() as nfds_t, timeout_ms) };
        if rc < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                return Ok(0);
            }
            return Err(Error::os(ErrorKind::Poll, "readiness wait", err));
        }
        Ok(rc as usize)
    }

    /// Whether the descriptor in `slot` is readable. Error and hangup
    /// conditions count as readable so the owner observes them through a
    /// read and can tear the connection down.
    pub fn readable(&self, slot: usize) -> bool {
        self.fds[slot].revents & (POLLIN | POLLERR | POLLHUP) != 0
    }

    pub fn writable(&self, slot: usize) -> bool {
        self.fds[slot].revents & (POLLOUT | POLLERR | POLLHUP) != 0
    }
}

impl Default for PollSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for readiness on a single descriptor.
///
/// Returns `true` if the descriptor became ready within the timeout.
pub fn wait_single(fd: RawFd, interest: Interest, timeout: Option<Duration>) -> Result<bool> {
    let mut set = PollSet::new();
    let slot = set.push(fd, interest);
    let ready = set.wait(timeout)?;
    if ready == 0 {
        return Ok(false);
    }
    Ok(match interest {
        Interest::Read => set.readable(slot),
        Interest::Write => set.writable(slot),
        Interest::Both => set.readable(slot) || set.writable(slot),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::{TcpListener, TcpStream};
    use std::os::fd::AsRawFd;
    use std::thread;

    #[test]
    fn test_readable_after_peer_write() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(b"ping").unwrap();
        });

        let stream = TcpStream::connect(addr).unwrap();
        let ready = wait_single(
            stream.as_raw_fd(),
            Interest::Read,
            Some(Duration::from_secs(2)),
        )
        .unwrap();
        assert!(ready);

        handle.join().unwrap();
    }

    #[test]
    fn test_timeout_on_idle_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = thread::spawn(move || listener.accept());

        let stream = TcpStream::connect(addr).unwrap();
        let ready = wait_single(
            stream.as_raw_fd(),
            Interest::Read,
            Some(Duration::from_millis(50)),
        )
        .unwrap();
        assert!(!ready);
    }

    #[test]
    fn test_writable_immediately() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = thread::spawn(move || listener.accept());

        let stream = TcpStream::connect(addr).unwrap();
        let ready = wait_single(
            stream.as_raw_fd(),
            Interest::Write,
            Some(Duration::from_secs(1)),
        )
        .unwrap();
        assert!(ready);
    }
}
