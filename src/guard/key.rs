//! Throttle key derivation.

use std::net::IpAddr;

/// Identifies a throttled source.
///
/// Nodes sharing one host in local setups are told apart by port, otherwise
/// sources are told apart by network origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThrottleKey {
    /// Keyed by remote address
    Address(IpAddr),
    /// Keyed by remote port
    Port(u16),
}

impl ThrottleKey {
    /// Derive the key for a caller.
    pub fn new(address: IpAddr, port: u16, key_by_port: bool) -> Self {
        if key_by_port {
            ThrottleKey::Port(port)
        } else {
            ThrottleKey::Address(address)
        }
    }
}

impl std::fmt::Display for ThrottleKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThrottleKey::Address(addr) => write!(f, "{}", addr),
            ThrottleKey::Port(port) => write!(f, "{}", port),
        }
    }
}
