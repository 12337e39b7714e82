//! Socket address value type.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use socket2::SockAddr;

use super::{Error, ErrorKind, Result};

/// Address family of a socket endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    V4,
    V6,
}

/// An IP address plus port, carrying its family.
///
/// The family determines the layout of the underlying OS address
/// structure; conversions from textual or OS-level input fail closed
/// rather than guessing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    inner: SocketAddr,
}

impl Address {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Address {
            inner: SocketAddr::new(ip, port),
        }
    }

    /// Parse a textual IP and combine it with a port.
    ///
    /// Malformed input is rejected; no name resolution is attempted.
    pub fn parse(ip: &str, port: u16) -> Result<Self> {
        let ip = ip
            .parse::<IpAddr>()
            .map_err(|e| Error::new(ErrorKind::InvalidAddress, ip, e.to_string()))?;
        Ok(Address::new(ip, port))
    }

    pub fn ip(&self) -> IpAddr {
        self.inner.ip()
    }

    pub fn port(&self) -> u16 {
        self.inner.port()
    }

    pub fn family(&self) -> Family {
        match self.inner {
            SocketAddr::V4(_) => Family::V4,
            SocketAddr::V6(_) => Family::V6,
        }
    }

    pub fn as_socket_addr(&self) -> SocketAddr {
        self.inner
    }

    /// Convert to the OS-level address structure.
    pub(crate) fn to_os(self) -> SockAddr {
        SockAddr::from(self.inner)
    }

    /// Convert from an OS-level address structure.
    ///
    /// Fails closed on address families other than inet/inet6.
    pub(crate) fn from_os(addr: &SockAddr) -> Result<Self> {
        addr.as_socket()
            .map(|inner| Address { inner })
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::InvalidAddress,
                    "sockaddr conversion",
                    "not an inet address",
                )
            })
    }
}

impl From<SocketAddr> for Address {
    fn from(inner: SocketAddr) -> Self {
        Address { inner }
    }
}

impl FromStr for Address {
    type Err = Error;

    /// Parse `"ip:port"` notation, IPv6 in brackets.
    fn from_str(s: &str) -> Result<Self> {
        let inner = s
            .parse::<SocketAddr>()
            .map_err(|e| Error::new(ErrorKind::InvalidAddress, s, e.to_string()))?;
        Ok(Address { inner })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.fmt(f)
    }
}
