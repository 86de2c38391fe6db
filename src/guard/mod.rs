//! Admission throttling for inbound peers.

mod admission;
mod key;
mod limiter;

pub use admission::Admission;
pub use key::ThrottleKey;
pub use limiter::Guard;
