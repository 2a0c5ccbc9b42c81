//! Reader/writer combinations beyond the single-field unit tests beside
//! `cbor`: a map whose fields a reader has to skip past (including a
//! byte-string field, which `MapReader` never decodes directly) before
//! reaching the one it wants, and a list of byte strings rather than the
//! list-of-ints the unit test already covers.

use satcat5::cbor::{ListReader, ListWriter, MapReader, MapWriter};

#[test]
fn reader_skips_over_a_bytes_field_to_reach_a_later_key() {
    let mut w = MapWriter::new(1024);
    w.insert_bytes("firmware-hash", &[0xde, 0xad, 0xbe, 0xef]).unwrap();
    w.insert_int("uptime-s", 86_400).unwrap();
    w.insert_bool("link-up", true).unwrap();
    w.insert_null("last-fault").unwrap();
    w.insert_text("hostname", "switch-07").unwrap();
    let bytes = w.finalize().unwrap();

    let r = MapReader::new(&bytes).unwrap();
    // Every one of these has to walk past the bytes field first.
    assert_eq!(r.get_int("uptime-s").unwrap(), Some(86_400));
    assert!(r.get_bool("link-up").unwrap().unwrap());
    assert!(r.is_null("last-fault").unwrap());
    assert_eq!(r.get_text("hostname").unwrap(), Some("switch-07".to_string()));
    // Present, but the wrong type for this accessor.
    assert!(r.get_int("firmware-hash").is_err());
    // Never written at all; that's just `None`, not an error.
    assert_eq!(r.get_text("does-not-exist").unwrap(), None);
}

#[test]
fn list_of_byte_strings_round_trips_and_rejects_int_decoding() {
    let mut w = ListWriter::new();
    w.push_bytes(&[1, 2, 3]).unwrap();
    w.push_bytes(&[4, 5]).unwrap();
    w.push_bytes(&[]).unwrap();
    let bytes = w.finalize(3).unwrap();

    let r = ListReader::new(&bytes).unwrap();
    assert_eq!(r.len(), Some(3));
    // `ints()` expects every element to decode as an integer; a list of
    // byte strings should fail cleanly rather than silently truncate.
    assert!(r.ints().is_err());
}

#[test]
fn empty_map_round_trips_to_a_zero_length_header() {
    let w = MapWriter::new(64);
    assert!(w.is_empty());
    let bytes = w.finalize().unwrap();
    let r = MapReader::new(&bytes).unwrap();
    assert_eq!(r.get_int("anything").unwrap(), None);
}
