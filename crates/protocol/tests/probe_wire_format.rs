//! Golden-byte tests for the probe handshake layouts.
//!
//! These pin the exact field offsets and endianness so a refactor of the
//! codecs cannot silently change what goes on the wire.

use protocol::probe::{
    CapabilityAck, CapabilityNego, ProbeRequest, ProbeResponse, SwitchAck, SwitchBaudrate,
};

#[test]
fn probe_request_layout() {
    let body = ProbeRequest {
        device_id: 0x4433_2211,
        protocol_version: 0x01,
        random_seed: 0x8877_6655,
    }
    .encode();

    assert_eq!(
        body,
        vec![
            0x11, 0x22, 0x33, 0x44, // device_id LE
            0x01, // protocol_version
            0x55, 0x66, 0x77, 0x88, // random_seed LE
        ]
    );
}

#[test]
fn probe_response_layout() {
    let body = ProbeResponse {
        device_id: 0x4433_2211,
        protocol_version: 0x01,
        random_seed: 0x8877_6655,
        supported_baudrates: vec![115_200, 921_600],
    }
    .encode();

    assert_eq!(&body[..9], &[0x11, 0x22, 0x33, 0x44, 0x01, 0x55, 0x66, 0x77, 0x88]);
    assert_eq!(&body[9..11], &[0x02, 0x00]); // count LE
    assert_eq!(&body[11..15], &115_200u32.to_le_bytes());
    assert_eq!(&body[15..19], &921_600u32.to_le_bytes());
}

#[test]
fn capability_nego_layout() {
    let body = CapabilityNego {
        session_id: 0x1000_0001,
        transfer_mode: 2,
        file_count: 5,
        total_size: 0x0102_0304_0506_0708,
        selected_baudrate: 921_600,
        chunk_size: 2048,
        root_path: "dir".to_owned(),
    }
    .encode();

    assert_eq!(&body[0..4], &0x1000_0001u32.to_le_bytes());
    assert_eq!(body[4], 2);
    assert_eq!(&body[5..9], &5u32.to_le_bytes());
    assert_eq!(&body[9..17], &0x0102_0304_0506_0708u64.to_le_bytes());
    assert_eq!(&body[17..21], &921_600u32.to_le_bytes());
    assert_eq!(&body[21..25], &2048u32.to_le_bytes());
    assert_eq!(&body[25..27], &3u16.to_le_bytes());
    assert_eq!(&body[27..], b"dir");
}

#[test]
fn capability_ack_layout() {
    let body = CapabilityAck {
        session_id: 0x1000_0001,
        accept_status: CapabilityAck::ACCEPT,
        negotiated_chunk_size: 1024,
    }
    .encode();

    assert_eq!(&body[0..4], &0x1000_0001u32.to_le_bytes());
    assert_eq!(body[4], 1);
    assert_eq!(&body[5..9], &1024u32.to_le_bytes());
}

#[test]
fn switch_layouts() {
    let body = SwitchBaudrate {
        session_id: 0x1000_0001,
        new_baudrate: 1_728_000,
        switch_delay_ms: 100,
    }
    .encode();
    assert_eq!(&body[0..4], &0x1000_0001u32.to_le_bytes());
    assert_eq!(&body[4..8], &1_728_000u32.to_le_bytes());
    assert_eq!(&body[8..10], &100u16.to_le_bytes());

    assert_eq!(
        SwitchAck { session_id: 0x7fff_ffff }.encode(),
        0x7fff_ffffu32.to_le_bytes().to_vec()
    );
}
