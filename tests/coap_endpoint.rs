//! A client/server pair driven over a simulated lossy link: requests and
//! responses are dropped on a fixed schedule, and the test asserts the
//! exchange still completes within CoAP's retransmission budget.

use satcat5::coap::connection::{CoapConnection, ConnAddr, ConnState, RetransmitProfile};
use satcat5::coap::message::{CoapMessage, MsgType, Token};
use satcat5::net::addr::MacAddr;

const TICK_MILLIS: u64 = 50;
const MAX_TICKS: u32 = 20;

/// Advance `now` in `TICK_MILLIS` steps, calling `retransmit_tick` each
/// time, until it produces bytes to send (or the tick budget runs out).
fn drive_until_send(conn: &mut CoapConnection<8>, now: &mut u64) -> Option<Vec<u8>> {
    for _ in 0..MAX_TICKS {
        *now += TICK_MILLIS;
        let ev = conn.retransmit_tick(*now);
        if ev.send.is_some() {
            return ev.send;
        }
    }
    None
}

#[test]
fn request_and_response_survive_two_dropped_packets() {
    let mut client: CoapConnection<8> =
        CoapConnection::new(ConnAddr::L2(MacAddr([2, 0, 0, 0, 0, 1])), RetransmitProfile::fast(), 11);
    let mut server: CoapConnection<8> =
        CoapConnection::new(ConnAddr::L2(MacAddr([2, 0, 0, 0, 0, 2])), RetransmitProfile::fast(), 22);

    let mut now = 0u64;
    let req = CoapMessage::new(MsgType::Con, 1, 0x4242).with_token(Token::new(&[7, 7]));
    let first_send = client.open_request(&req, false, now).unwrap();
    assert_eq!(client.state(), ConnState::RequestCon);

    // Drop #1: the initial request never reaches the server. The client's
    // retransmission ladder should produce an identical resend.
    drop(first_send);
    let resend = drive_until_send(&mut client, &mut now).expect("client should retransmit after a drop");

    // This time the request arrives.
    let req_on_wire = CoapMessage::parse(&resend).unwrap();
    let server_ev = server.receive(&req_on_wire, now);
    assert!(!server_ev.was_duplicate);
    assert!(server_ev.deliver.is_some());

    let response = CoapMessage::new(MsgType::Ack, 69, 0);
    let ack_ev = server.respond(response).unwrap();
    let ack_bytes = ack_ev.send.unwrap();

    // Drop #2: the ACK carrying the piggybacked response is lost. The
    // client, still waiting, retransmits the CON again.
    drop(ack_bytes);
    let resend2 = drive_until_send(&mut client, &mut now).expect("client should retransmit a second time");

    let req_on_wire2 = CoapMessage::parse(&resend2).unwrap();
    let server_ev2 = server.receive(&req_on_wire2, now);
    assert!(server_ev2.was_duplicate);
    let replayed = server_ev2.send.expect("duplicate CON should replay the cached response");

    // This time the replayed ACK makes it through.
    let ack_on_wire = CoapMessage::parse(&replayed).unwrap();
    let client_ev = client.receive(&ack_on_wire, now);
    assert!(client_ev.deliver.is_some());
    assert_eq!(client.state(), ConnState::Idle);
}

#[test]
fn non_confirmable_request_has_no_retransmission_ladder() {
    let mut client: CoapConnection<8> =
        CoapConnection::new(ConnAddr::L2(MacAddr([2, 0, 0, 0, 0, 3])), RetransmitProfile::fast(), 33);
    let req = CoapMessage::new(MsgType::Non, 1, 1).with_token(Token::new(&[1]));
    client.open_request(&req, false, 0).unwrap();
    assert_eq!(client.state(), ConnState::RequestNon);

    // A NON request gets exactly one probe timeout; once it elapses with
    // no reply, the exchange moves straight to `Error`.
    let mut now = 0u64;
    let mut saw_error = false;
    for _ in 0..MAX_TICKS {
        now += TICK_MILLIS;
        let ev = client.retransmit_tick(now);
        if ev.error {
            saw_error = true;
            break;
        }
    }
    assert!(saw_error);
    assert_eq!(client.state(), ConnState::Error);
}
