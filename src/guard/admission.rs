//! Admission trait for abstracting the throttle behind an accept path.

use std::net::{IpAddr, SocketAddr};

/// Decides whether an inbound connection may proceed.
///
/// Implementations must be cheap and synchronous: they are consulted on the
/// accept path before any further processing of the connection.
pub trait Admission: Send + Sync {
    /// Classify a caller identified by its address and port.
    fn is_allowed(&self, address: IpAddr, port: u16) -> bool;

    /// Classify a caller identified by its socket address.
    fn is_allowed_peer(&self, peer: SocketAddr) -> bool {
        self.is_allowed(peer.ip(), peer.port())
    }
}
