//! Crate-wide error taxonomy.
//!
//! Only configuration-time failures are meant to surface as `Err` from a
//! public API. Per-packet runtime failures (resource exhaustion, malformed
//! peer protocol, transient transport) are absorbed into drop counters and
//! log lines by the caller; see the module docs on [`crate::switch`] and
//! [`crate::coap`] for where each variant is produced.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A chunk, packet header, or table slot could not be allocated.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(&'static str),

    /// A peer sent a malformed or protocol-violating message.
    #[error("peer protocol violation: {0}")]
    PeerProtocol(&'static str),

    /// The underlying transport isn't ready for this operation yet.
    #[error("transport not ready: {0}")]
    TransportNotReady(&'static str),

    /// A plug-in or caller violated an internal policy (e.g. changed a
    /// header's length during egress).
    #[error("policy violation: {0}")]
    PolicyViolation(&'static str),

    /// Invalid configuration supplied at construction time.
    #[error("invalid configuration: {0}")]
    Config(&'static str),
}

/// Return an [`Error`] if `cond` is false, in the style of `assert!`.
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $err:expr) => {
        if !($cond) {
            return Err($err);
        }
    };
}
