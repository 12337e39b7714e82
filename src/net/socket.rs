//! Typed wrapper over the OS socket primitives.
//!
//! A [`Socket`] exclusively owns its file descriptor; dropping it releases
//! the resource. Sockets are move-only, there is no copying and no shared
//! close path. Expected I/O conditions are explicit variants of
//! [`ReadOutcome`] / [`WriteOutcome`] so callers never match on error
//! strings to distinguish "try again" from real failures.
//!
//! Only TCP sockets participate in the HTTP core; the datagram operations
//! are auxiliary and guarded by protocol checks, as are the TCP-only
//! option setters.

use std::io;
use std::mem::MaybeUninit;
use std::os::fd::{AsRawFd, RawFd};

use socket2::{Domain, Socket as OsSocket, Type};

use super::addr::{Address, Family};
use super::{Error, ErrorKind, Result};

/// Transport protocol of a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
}

/// Result of a non-blocking read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `n` bytes were read into the buffer.
    Data(usize),
    /// No data available right now.
    WouldBlock,
    /// Orderly close by the peer.
    Eof,
}

/// Result of a single write attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// `n` bytes were accepted by the kernel; may be fewer than offered.
    Written(usize),
    /// The send buffer is full right now.
    WouldBlock,
}

/// Move-only owner of an OS socket.
#[derive(Debug)]
pub struct Socket {
    inner: OsSocket,
    protocol: Protocol,
    family: Family,
}

impl Socket {
    /// Create an unbound socket of the given protocol and family.
    pub fn new(protocol: Protocol, family: Family) -> Result<Self> {
        let domain = match family {
            Family::V4 => Domain::IPV4,
            Family::V6 => Domain::IPV6,
        };
        let (type_, proto) = match protocol {
            Protocol::Tcp => (Type::STREAM, socket2::Protocol::TCP),
            Protocol::Udp => (Type::DGRAM, socket2::Protocol::UDP),
        };
        let inner = OsSocket::new(domain, type_, Some(proto))
            .map_err(|e| Error::os(ErrorKind::Create, format!("{:?} socket", protocol), e))?;
        Ok(Socket {
            inner,
            protocol,
            family,
        })
    }

    /// Create a listening TCP socket bound to `addr`: address reuse on,
    /// bound, listening with the given backlog, and non-blocking. This is
    /// the listener the reactor registers.
    pub fn listen_on(addr: &Address, backlog: i32) -> Result<Self> {
        let sock = Socket::new(Protocol::Tcp, addr.family())?;
        sock.set_reuse_address(true)?;
        sock.bind(addr)?;
        sock.listen(backlog)?;
        sock.set_non_blocking(true)?;
        Ok(sock)
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn bind(&self, addr: &Address) -> Result<()> {
        self.inner
            .bind(&addr.to_os())
            .map_err(|e| Error::os(ErrorKind::Bind, addr.to_string(), e))
    }

    pub fn listen(&self, backlog: i32) -> Result<()> {
        self.require_tcp("listen")?;
        self.inner
            .listen(backlog)
            .map_err(|e| Error::os(ErrorKind::Listen, format!("backlog {}", backlog), e))
    }

    /// Accept one pending connection.
    ///
    /// Returns `None` when no connection is pending. The accepted socket
    /// is put into non-blocking mode before it is returned.
    pub fn accept(&self) -> Result<Option<(Socket, Address)>> {
        self.require_tcp("accept")?;
        match self.inner.accept() {
            Ok((client, sockaddr)) => {
                let remote = Address::from_os(&sockaddr)?;
                let socket = Socket {
                    inner: client,
                    protocol: Protocol::Tcp,
                    family: remote.family(),
                };
                socket.set_non_blocking(true)?;
                Ok(Some((socket, remote)))
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(Error::os(ErrorKind::Accept, "listener", e)),
        }
    }

    pub fn connect(&self, addr: &Address) -> Result<()> {
        self.require_tcp("connect")?;
        self.inner
            .connect(&addr.to_os())
            .map_err(|e| Error::os(ErrorKind::Connect, addr.to_string(), e))
    }

    /// Read available bytes from a connected stream.
    ///
    /// At most one OS read is performed.
    pub fn read(&self, buf: &mut [u8]) -> Result<ReadOutcome> {
        self.require_tcp("read")?;
        let rc = unsafe { libc::read(self.as_raw_fd(), buf.as_mut_ptr().cast(), buf.len()) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            return match err.kind() {
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => {
                    Ok(ReadOutcome::WouldBlock)
                }
                _ => Err(Error::os(ErrorKind::Read, "connection", err)),
            };
        }
        if rc == 0 {
            return Ok(ReadOutcome::Eof);
        }
        Ok(ReadOutcome::Data(rc as usize))
    }

    /// Write bytes to a connected stream.
    ///
    /// At most one OS write is performed; the caller owns partial-write
    /// handling.
    pub fn write(&self, buf: &[u8]) -> Result<WriteOutcome> {
        self.require_tcp("write")?;
        let rc = unsafe { libc::write(self.as_raw_fd(), buf.as_ptr().cast(), buf.len()) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            return match err.kind() {
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => {
                    Ok(WriteOutcome::WouldBlock)
                }
                _ => Err(Error::os(ErrorKind::Write, "connection", err)),
            };
        }
        Ok(WriteOutcome::Written(rc as usize))
    }

    /// Send a datagram to `addr` (UDP only).
    pub fn send_to(&self, addr: &Address, data: &[u8]) -> Result<usize> {
        self.require_udp("send_to")?;
        let n = self
            .inner
            .send_to(data, &addr.to_os())
            .map_err(|e| Error::os(ErrorKind::Write, addr.to_string(), e))?;
        if n != data.len() {
            return Err(Error::new(
                ErrorKind::PartialWrite,
                addr.to_string(),
                format!("sent {} of {} bytes", n, data.len()),
            ));
        }
        Ok(n)
    }

    /// Receive a datagram (UDP only).
    ///
    /// Returns `None` when the socket is non-blocking and no datagram is
    /// queued.
    pub fn receive_from(&self, buf: &mut [u8]) -> Result<Option<(usize, Address)>> {
        self.require_udp("receive_from")?;
        let uninit =
            unsafe { &mut *(buf as *mut [u8] as *mut [MaybeUninit<u8>]) };
        match self.inner.recv_from(uninit) {
            Ok((n, sockaddr)) => {
                let sender = Address::from_os(&sockaddr)?;
                Ok(Some((n, sender)))
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(Error::os(ErrorKind::Read, "datagram", e)),
        }
    }

    /// Switch the descriptor between blocking and non-blocking mode.
    pub fn set_non_blocking(&self, enable: bool) -> Result<()> {
        let fd = self.as_raw_fd();
        let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
        if flags < 0 {
            return Err(Error::last_os(ErrorKind::Option, "O_NONBLOCK"));
        }
        let flags = if enable {
            flags | libc::O_NONBLOCK
        } else {
            flags & !libc::O_NONBLOCK
        };
        if unsafe { libc::fcntl(fd, libc::F_SETFL, flags) } < 0 {
            return Err(Error::last_os(ErrorKind::Option, "O_NONBLOCK"));
        }
        Ok(())
    }

    pub fn set_reuse_address(&self, enable: bool) -> Result<()> {
        self.sockopt_int(
            libc::SOL_SOCKET,
            libc::SO_REUSEADDR,
            enable as libc::c_int,
            "SO_REUSEADDR",
        )
    }

    pub fn set_keep_alive(&self, enable: bool) -> Result<()> {
        self.require_tcp("SO_KEEPALIVE")?;
        self.sockopt_int(
            libc::SOL_SOCKET,
            libc::SO_KEEPALIVE,
            enable as libc::c_int,
            "SO_KEEPALIVE",
        )
    }

    /// Control what happens to unsent data on close. `timeout` is in
    /// seconds and ignored when `enable` is false.
    pub fn set_linger(&self, enable: bool, timeout: i32) -> Result<()> {
        let linger = libc::linger {
            l_onoff: enable as libc::c_int,
            l_linger: timeout,
        };
        let rc = unsafe {
            libc::setsockopt(
                self.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_LINGER,
                (&linger as *const libc::linger).cast(),
                std::mem::size_of::<libc::linger>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(Error::last_os(ErrorKind::Option, "SO_LINGER"));
        }
        Ok(())
    }

    pub fn set_send_buffer_size(&self, size: i32) -> Result<()> {
        if size <= 0 {
            return Err(Error::new(ErrorKind::Option, "SO_SNDBUF", "size must be positive"));
        }
        self.sockopt_int(libc::SOL_SOCKET, libc::SO_SNDBUF, size, "SO_SNDBUF")
    }

    pub fn set_receive_buffer_size(&self, size: i32) -> Result<()> {
        if size <= 0 {
            return Err(Error::new(ErrorKind::Option, "SO_RCVBUF", "size must be positive"));
        }
        self.sockopt_int(libc::SOL_SOCKET, libc::SO_RCVBUF, size, "SO_RCVBUF")
    }

    pub fn set_tcp_nodelay(&self, enable: bool) -> Result<()> {
        self.require_tcp("TCP_NODELAY")?;
        self.sockopt_int(
            libc::IPPROTO_TCP,
            libc::TCP_NODELAY,
            enable as libc::c_int,
            "TCP_NODELAY",
        )
    }

    pub fn set_ipv6_only(&self, enable: bool) -> Result<()> {
        if self.family != Family::V6 {
            return Err(Error::new(
                ErrorKind::ProtocolMismatch,
                "IPV6_V6ONLY",
                "not an IPv6 socket",
            ));
        }
        self.sockopt_int(
            libc::IPPROTO_IPV6,
            libc::IPV6_V6ONLY,
            enable as libc::c_int,
            "IPV6_V6ONLY",
        )
    }

    pub fn set_broadcast(&self, enable: bool) -> Result<()> {
        self.require_udp("SO_BROADCAST")?;
        self.sockopt_int(
            libc::SOL_SOCKET,
            libc::SO_BROADCAST,
            enable as libc::c_int,
            "SO_BROADCAST",
        )
    }

    /// Enable immediate ACKs (Linux only; `Unsupported` elsewhere rather
    /// than silently ignored).
    #[cfg(target_os = "linux")]
    pub fn set_quick_ack(&self, enable: bool) -> Result<()> {
        self.require_tcp("TCP_QUICKACK")?;
        self.sockopt_int(
            libc::IPPROTO_TCP,
            libc::TCP_QUICKACK,
            enable as libc::c_int,
            "TCP_QUICKACK",
        )
    }

    #[cfg(not(target_os = "linux"))]
    pub fn set_quick_ack(&self, _enable: bool) -> Result<()> {
        Err(Error::new(
            ErrorKind::Unsupported,
            "TCP_QUICKACK",
            "not available on this platform",
        ))
    }

    /// Set the ToS / traffic-class byte used for QoS marking.
    pub fn set_traffic_class(&self, value: i32) -> Result<()> {
        if !(0..=255).contains(&value) {
            return Err(Error::new(
                ErrorKind::Option,
                "traffic class",
                "value must be in 0..=255",
            ));
        }
        match self.family {
            Family::V4 => self.sockopt_int(libc::IPPROTO_IP, libc::IP_TOS, value, "IP_TOS"),
            Family::V6 => {
                self.sockopt_int(libc::IPPROTO_IPV6, libc::IPV6_TCLASS, value, "IPV6_TCLASS")
            }
        }
    }

    pub fn local_addr(&self) -> Result<Address> {
        let sockaddr = self
            .inner
            .local_addr()
            .map_err(|e| Error::os(ErrorKind::Option, "local address", e))?;
        Address::from_os(&sockaddr)
    }

    pub fn peer_addr(&self) -> Result<Address> {
        let sockaddr = self
            .inner
            .peer_addr()
            .map_err(|e| Error::os(ErrorKind::Option, "peer address", e))?;
        Address::from_os(&sockaddr)
    }

    /// Whether a TCP socket still has a live peer.
    pub fn is_connected(&self) -> bool {
        self.protocol == Protocol::Tcp && self.inner.peer_addr().is_ok()
    }

    fn require_tcp(&self, context: &str) -> Result<()> {
        if self.protocol != Protocol::Tcp {
            return Err(Error::new(
                ErrorKind::ProtocolMismatch,
                context,
                "not a TCP socket",
            ));
        }
        Ok(())
    }

    fn require_udp(&self, context: &str) -> Result<()> {
        if self.protocol != Protocol::Udp {
            return Err(Error::new(
                ErrorKind::ProtocolMismatch,
                context,
                "not a UDP socket",
            ));
        }
        Ok(())
    }

    fn sockopt_int(
        &self,
        level: libc::c_int,
        name: libc::c_int,
        value: libc::c_int,
        context: &str,
    ) -> Result<()> {
        let rc = unsafe {
            libc::setsockopt(
                self.as_raw_fd(),
                level,
                name,
                (&value as *const libc::c_int).cast(),
                std::mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(Error::last_os(ErrorKind::Option, context));
        }
        Ok(())
    }
}

impl AsRawFd for Socket {
    fn as_raw_fd(&self) -> RawFd {
        self.inner.as_raw_fd()
    }
}
