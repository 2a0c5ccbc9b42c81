//! CoAP (RFC 7252) message codec and per-connection state machine:
//! confirmable/non-confirmable request/response, separated responses,
//! retransmission, and duplicate suppression, over either UDP or (via
//! the opaque [`connection::ConnAddr::L2`] path for CCSDS-SPP-like
//! transports this crate doesn't itself frame) raw addressing.

pub mod connection;
pub mod history;
pub mod message;

pub use connection::{CoapConnection, ConnAddr, ConnEvent, ConnState, RetransmitProfile};
pub use history::{HistoryEntry, HistoryRing};
pub use message::{CoapMessage, CoapOption, MsgType, Token, OPTION_MAX_AGE, PAYLOAD_MARKER};

/// Default UDP port for "all CoAP nodes" unicast traffic.
pub const DEFAULT_PORT: u16 = 5683;
