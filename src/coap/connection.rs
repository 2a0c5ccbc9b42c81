//! Per-connection CoAP state machine.
//!
//! One [`CoapConnection`] drives a single exchange slot: either the
//! client role (send a request, track its ACK/response) or the server
//! role (receive a request, hand it to the application, emit the
//! response — possibly separated). Network I/O stays with the caller:
//! every method that needs to transmit returns the bytes to send in a
//! [`ConnEvent`] rather than touching a socket, the same split
//! `net::dhcp::client` uses.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use super::history::{HistoryEntry, HistoryRing};
use super::message::{CoapMessage, MsgType, Token};
use crate::net::addr::{Ipv4Addr, MacAddr};
use crate::{ensure, Error, Result};

/// RFC 7252 §4.8.2, derived from `ACK_TIMEOUT=2s`, `ACK_RANDOM_FACTOR=1.5`,
/// `MAX_RETRANSMIT=4`: `ACK_TIMEOUT * (2^(MAX_RETRANSMIT+1) - 1) *
/// ACK_RANDOM_FACTOR`. Used as the `REQUEST_SEP` watchdog span: a request
/// awaiting a separate response promotes to `REQUEST_SEP` with an
/// overall timeout of this span.
pub const MAX_SEPARATE_SPAN_MILLIS: u64 = 93_000;

/// `ACK_TIMEOUT * (2^MAX_RETRANSMIT - 1) * ACK_RANDOM_FACTOR`. Used as the
/// `WAIT_RESPONSE_*` watchdog span.
pub const MAX_TRANSMIT_SPAN_MILLIS: u64 = 45_000;

/// Upper bound of the multicast response leisure window: a response is
/// deferred by a random leisure in `[1, MAX_LEISURE]` ms.
pub const MAX_LEISURE_MILLIS: u32 = 5_000;

/// Per-exchange retransmission timing.
#[derive(Clone, Copy, Debug)]
pub struct RetransmitProfile {
    pub initial_timeout_millis: u32,
    pub max_retransmit: u8,
}

impl RetransmitProfile {
    /// LAN/bench profile: 125ms initial, 6 attempts.
    pub const fn fast() -> Self {
        Self { initial_timeout_millis: 125, max_retransmit: 6 }
    }

    /// WAN/lossy profile: 1000ms initial, 5 attempts.
    pub const fn safe() -> Self {
        Self { initial_timeout_millis: 1000, max_retransmit: 5 }
    }

    pub const fn custom(initial_timeout_millis: u32, max_retransmit: u8) -> Self {
        Self { initial_timeout_millis, max_retransmit }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConnAddr {
    L2(MacAddr),
    L3(Ipv4Addr, u16),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConnState {
    Idle,
    ConnectIdle,
    ConnectBusy,
    RequestCon,
    RequestNon,
    RequestSep,
    ResponseCache,
    ResponseSep1,
    ResponseSep2,
    ResponseDefer,
    WaitResponseU,
    WaitResponseM,
    Error,
}

/// Output of driving the state machine: whatever the caller should do as
/// a result of the call that produced it. Any subset of fields may be
/// populated; most calls populate at most one or two.
#[derive(Default, Debug)]
pub struct ConnEvent {
    /// Wire bytes the caller should transmit to `addr`.
    pub send: Option<Vec<u8>>,
    /// A complete application-visible message (an incoming response, or a
    /// freshly-arrived request to hand to a CoAP server handler).
    pub deliver: Option<CoapMessage>,
    /// The "separate response started" callback fired.
    pub separate_started: bool,
    /// The protocol-abort error callback fired (an `RST` arrived for an
    /// outstanding request).
    pub error: bool,
    /// A multicast response should be held back this many milliseconds
    /// before the server calls [`CoapConnection::respond`].
    pub defer_millis: Option<u32>,
    /// `true` if the incoming request that produced this event was a
    /// duplicate the connection already answered, so the server handler
    /// should not run again for it.
    pub was_duplicate: bool,
}

struct PendingRequest {
    msg_id: u16,
    token: Token,
    tkl: u8,
    attempt: u8,
    cached: Vec<u8>,
    multicast: bool,
    next_deadline_millis: u64,
}

struct PendingInbound {
    msg_id: u16,
    token: Token,
    multicast: bool,
}

/// One exchange slot: `N` is the compile-time history-ring capacity
///.
pub struct CoapConnection<const N: usize> {
    addr: ConnAddr,
    state: ConnState,
    profile: RetransmitProfile,
    history: HistoryRing<N>,
    rng: SmallRng,
    outgoing: Option<PendingRequest>,
    inbound: Option<PendingInbound>,
    cached_response: Option<Vec<u8>>,
    next_own_msg_id: u16,
    proxy_token: u32,
}

impl<const N: usize> CoapConnection<N> {
    pub fn new(addr: ConnAddr, profile: RetransmitProfile, rng_seed: u64) -> Self {
        Self {
            addr,
            state: ConnState::Idle,
            profile,
            history: HistoryRing::new(),
            rng: SmallRng::seed_from_u64(rng_seed),
            outgoing: None,
            inbound: None,
            cached_response: None,
            next_own_msg_id: 1,
            proxy_token: 0,
        }
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    pub fn addr(&self) -> ConnAddr {
        self.addr
    }

    pub fn set_proxy_token(&mut self, token: u32) {
        self.proxy_token = token;
    }

    pub fn proxy_token(&self) -> u32 {
        self.proxy_token
    }

    fn hard_reset(&mut self) {
        self.state = ConnState::Idle;
        self.outgoing = None;
        self.inbound = None;
    }

    fn jittered_timeout(&mut self, attempt: u8) -> u64 {
        let base = (self.profile.initial_timeout_millis as u64) << attempt;
        let factor: f64 = self.rng.gen_range(1.0..1.5);
        (base as f64 * factor) as u64
    }

    fn alloc_msg_id(&mut self) -> u16 {
        let id = self.next_own_msg_id;
        self.next_own_msg_id = self.next_own_msg_id.wrapping_add(1);
        id
    }

    // --- Client role -----------------------------------------------------

    /// Begin a new outgoing request. Valid only from `Idle`/`ConnectIdle`.
    /// Returns the wire bytes to transmit.
    pub fn open_request(&mut self, msg: &CoapMessage, multicast: bool, now_millis: u64) -> Result<Vec<u8>> {
        ensure!(
            matches!(self.state, ConnState::Idle | ConnState::ConnectIdle),
            Error::PolicyViolation("open_request requires an idle connection")
        );
        if multicast {
            ensure!(
                msg.msg_type == MsgType::Non,
                Error::PolicyViolation("multicast requests must be NON")
            );
        }
        ensure!(
            matches!(msg.msg_type, MsgType::Con | MsgType::Non),
            Error::PolicyViolation("open_request needs a CON or NON message")
        );

        let mut buf = Vec::new();
        msg.write(&mut buf);
        let tkl = msg.token.len();
        self.history.push(HistoryEntry { sep: false, msg_id: msg.msg_id, token: msg.token, tkl });

        let deadline = if msg.msg_type == MsgType::Con {
            now_millis + self.jittered_timeout(0)
        } else {
            // NON requests get a single probe timeout, no ladder.
            now_millis + self.profile.initial_timeout_millis as u64
        };
        self.outgoing = Some(PendingRequest {
            msg_id: msg.msg_id,
            token: msg.token,
            tkl,
            attempt: 0,
            cached: buf.clone(),
            multicast,
            next_deadline_millis: deadline,
        });
        self.state = match msg.msg_type {
            MsgType::Con => ConnState::RequestCon,
            _ => ConnState::RequestNon,
        };
        Ok(buf)
    }

    /// Drive retransmission/timeout for an outstanding client request.
    /// Returns bytes to resend, or `None` if nothing is due yet. Moves to
    /// `Error` (firing the error callback via the returned event) once
    /// `MAX_RETRANSMIT` is exhausted, or once a `NON` request's single
    /// probe timeout elapses.
    pub fn retransmit_tick(&mut self, now_millis: u64) -> ConnEvent {
        let mut ev = ConnEvent::default();
        let Some(pending) = self.outgoing.as_mut() else { return ev };
        if now_millis < pending.next_deadline_millis {
            return ev;
        }
        match self.state {
            ConnState::RequestCon => {
                if pending.attempt >= self.profile.max_retransmit {
                    self.state = ConnState::Error;
                    self.outgoing = None;
                    ev.error = true;
                } else {
                    pending.attempt += 1;
                    let attempt = pending.attempt;
                    ev.send = Some(pending.cached.clone());
                    let timeout = self.jittered_timeout(attempt);
                    self.outgoing.as_mut().unwrap().next_deadline_millis = now_millis + timeout;
                }
            }
            ConnState::RequestNon => {
                self.state = ConnState::Error;
                self.outgoing = None;
                ev.error = true;
            }
            _ => {}
        }
        ev
    }

    // --- Shared receive path ---------------------------------------------

    /// Feed one incoming message through the state machine. Handles CoAP
    /// pings, `RST` aborts, the client-side ACK/response/separate-response
    /// transitions, and (for request-class messages) duplicate detection
    /// and the transition into the server-side `WAIT_RESPONSE_*` states.
    pub fn receive(&mut self, msg: &CoapMessage, now_millis: u64) -> ConnEvent {
        let mut ev = ConnEvent::default();

        // Empty CON is a ping: RST it with the same msg-id, don't touch history.
        if msg.msg_type == MsgType::Con && msg.code == 0 {
            let rst = CoapMessage::new(MsgType::Rst, 0, msg.msg_id);
            let mut buf = Vec::new();
            rst.write(&mut buf);
            ev.send = Some(buf);
            return ev;
        }

        if msg.msg_type == MsgType::Rst {
            if self.outgoing.is_some() {
                ev.error = true;
            }
            self.hard_reset();
            return ev;
        }

        if is_request_code(msg.code) {
            return self.receive_request(msg, now_millis);
        }

        self.receive_response(msg, now_millis, &mut ev);
        ev
    }

    fn receive_response(&mut self, msg: &CoapMessage, now_millis: u64, ev: &mut ConnEvent) {
        match self.state {
            ConnState::RequestCon => {
                let Some(pending) = &self.outgoing else { return };
                if msg.msg_type == MsgType::Ack && msg.code == 0 && msg.msg_id == pending.msg_id {
                    // Bare ACK: a separated response will follow later.
                    self.state = ConnState::RequestSep;
                    self.outgoing.as_mut().unwrap().next_deadline_millis = now_millis + MAX_SEPARATE_SPAN_MILLIS;
                    ev.separate_started = true;
                    return;
                }
                if msg.token.as_bytes() == pending.token.as_bytes()
                    && (msg.msg_type != MsgType::Con || msg.msg_id == pending.msg_id)
                {
                    let multicast = pending.multicast;
                    ev.deliver = Some(msg.clone());
                    if !multicast {
                        self.hard_reset();
                    }
                }
            }
            ConnState::RequestNon => {
                let Some(pending) = &self.outgoing else { return };
                if msg.token.as_bytes() == pending.token.as_bytes() {
                    let multicast = pending.multicast;
                    ev.deliver = Some(msg.clone());
                    if !multicast {
                        self.hard_reset();
                    }
                }
            }
            ConnState::RequestSep => {
                let Some(pending) = &self.outgoing else { return };
                if msg.msg_type == MsgType::Con && msg.token.as_bytes() == pending.token.as_bytes() {
                    let ack = CoapMessage::new(MsgType::Ack, 0, msg.msg_id);
                    let mut buf = Vec::new();
                    ack.write(&mut buf);
                    ev.send = Some(buf);
                    ev.deliver = Some(msg.clone());
                    self.hard_reset();
                }
            }
            _ => {}
        }
    }

    fn receive_request(&mut self, msg: &CoapMessage, now_millis: u64) -> ConnEvent {
        let mut ev = ConnEvent::default();
        let tkl = msg.token.len();
        if let Some(entry) = self.history.find(msg.msg_id, &msg.token, tkl) {
            ev.was_duplicate = true;
            if entry.sep {
                let ack = CoapMessage::new(MsgType::Ack, 0, msg.msg_id);
                let mut buf = Vec::new();
                ack.write(&mut buf);
                ev.send = Some(buf);
            } else if let Some(cached) = &self.cached_response {
                ev.send = Some(cached.clone());
            }
            return ev;
        }

        let multicast = match self.addr {
            ConnAddr::L3(ip, _) => ip.is_multicast(),
            ConnAddr::L2(mac) => mac.is_multicast(),
        };
        self.history.push(HistoryEntry { sep: false, msg_id: msg.msg_id, token: msg.token, tkl });
        self.inbound = Some(PendingInbound { msg_id: msg.msg_id, token: msg.token, multicast });
        self.state = if multicast { ConnState::WaitResponseM } else { ConnState::WaitResponseU };
        if multicast {
            ev.defer_millis = Some(self.rng.gen_range(1..=MAX_LEISURE_MILLIS));
        }
        let _ = now_millis;
        ev.deliver = Some(msg.clone());
        ev
    }

    // --- Server role -------------------------------------------------------

    /// Emit an empty ACK now and keep the exchange open for a later
 /// separate response.
    pub fn defer_separate(&mut self) -> Result<ConnEvent> {
        let Some(inbound) = &self.inbound else {
            return Err(Error::PolicyViolation("defer_separate with no pending request"));
        };
        self.state = ConnState::ResponseSep1;
        let ack = CoapMessage::new(MsgType::Ack, 0, inbound.msg_id);
        let mut buf = Vec::new();
        ack.write(&mut buf);
        self.state = ConnState::ResponseSep2;
        Ok(ConnEvent { send: Some(buf), ..Default::default() })
    }

    /// Send the application's answer. If the connection is still in
    /// `WAIT_RESPONSE_*`, the response piggybacks on the ACK; if
    /// [`CoapConnection::defer_separate`] already ran, it goes out as a
 /// fresh `CON`.
    pub fn respond(&mut self, mut response: CoapMessage) -> Result<ConnEvent> {
        let Some(inbound) = &self.inbound else {
            return Err(Error::PolicyViolation("respond with no pending request"));
        };
        let separated = self.state == ConnState::ResponseSep2;
        response.token = inbound.token;
        response.msg_id = if separated { self.alloc_msg_id() } else { inbound.msg_id };
        response.msg_type = if separated { MsgType::Con } else { MsgType::Ack };

        let mut buf = Vec::new();
        response.write(&mut buf);
        let tkl = response.token.len();
        self.history.push(HistoryEntry { sep: separated, msg_id: response.msg_id, token: response.token, tkl });
        self.cached_response = Some(buf.clone());
        self.state = ConnState::ResponseCache;
        self.inbound = None;
        Ok(ConnEvent { send: Some(buf), ..Default::default() })
    }

    /// Fold the connection back to `Idle` once its cached response is no
    /// longer needed for duplicate suppression (the connection pool does
    /// this on reuse, not this type, since the history ring — not the
    /// state — is what answers duplicates).
    pub fn release(&mut self) {
        self.hard_reset();
        self.cached_response = None;
    }
}

fn is_request_code(code: u8) -> bool {
    // RFC 7252 §12.1.1: method codes are 0.01-0.31; everything >= 2.00 is a response.
    let class = code >> 5;
    class == 0 && code != 0
}
