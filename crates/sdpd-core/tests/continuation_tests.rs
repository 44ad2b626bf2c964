//! End-to-end continuation behaviour through the dispatcher
//!
//! Each test plays the client side of a conversation: it sends a request,
//! follows continuation offsets and checks what the server streamed.


use std::sync::Arc;

use sdpd_core::codec::sequence_len;
use sdpd_core::record::{attribute_ids, service_classes};
use sdpd_core::{
    Attribute, AttributeRange, Dispatcher, ErrorCode, InMemoryRecordStore,
    InteropConfig, PeerAddress, RecordHandle, ServerConfig, ServiceRecord,
};
use test_utils::*;

const SERIAL: u16 = service_classes::SERIAL_PORT;

// ----------------------------------------------------------------------------
// Service Search
// ----------------------------------------------------------------------------

#[test]
fn test_search_spans_frames_in_store_order() {
    let records = (0..20).map(|i| serial_record(0x10020 - i, 4)).collect();
    let (_, dispatcher) = dispatcher_with(records);
    let mut conn = dispatcher.connection(TEST_PEER, Some(48));

    let (total, handles) = collect_handles(&dispatcher, &mut conn, &[SERIAL], 0xFFFF).unwrap();
    let expected: Vec<u32> = (0x1000D..=0x10020).collect();
    assert_eq!(total, 20);
    assert_eq!(handles, expected);
    assert!(conn.continuation().is_idle());
}

#[test]
fn test_search_respects_client_and_server_caps() {
    let records = (0..40).map(|i| serial_record(0x10000 + i, 4)).collect();
    let (_, dispatcher) = dispatcher_with(records);
    let mut conn = dispatcher.connection(TEST_PEER, None);

    let (total, handles) = collect_handles(&dispatcher, &mut conn, &[SERIAL], 5).unwrap();
    assert_eq!((total, handles.len()), (5, 5));

    let (total, handles) = collect_handles(&dispatcher, &mut conn, &[SERIAL], 100).unwrap();
    assert_eq!((total, handles.len()), (30, 30));
}

#[test]
fn test_search_offset_mismatch_is_rejected_without_losing_state() {
    let records = (0..20).map(|i| serial_record(0x10000 + i, 4)).collect();
    let (_, dispatcher) = dispatcher_with(records);
    let mut conn = dispatcher.connection(TEST_PEER, Some(48));

    let first = decode(&dispatcher.handle_request(&mut conn, &search_request(&[SERIAL], 30, None)));
    let Reply::Handles { continuation: Some(offset), handles, .. } = first else {
        panic!("expected a continued search, got {:?}", first);
    };
    assert_eq!(offset as usize, handles.len());

    let before = conn.continuation().clone();
    for wrong in [0, offset - 1, offset + 1, 0xFFFF] {
        let reply = decode(&dispatcher.handle_request(
            &mut conn,
            &search_request(&[SERIAL], 30, Some(wrong)),
        ));
        assert_eq!(reply, Reply::Error(ErrorCode::InvalidContinuationState));
        assert_eq!(conn.continuation(), &before);
    }

    let next = decode(&dispatcher.handle_request(
        &mut conn,
        &search_request(&[SERIAL], 30, Some(offset)),
    ));
    assert!(matches!(next, Reply::Handles { .. }));
}

#[test]
fn test_continuation_without_stream_is_rejected() {
    let (_, dispatcher) = dispatcher_with(vec![serial_record(0x10000, 4)]);
    let mut conn = dispatcher.connection(TEST_PEER, None);
    let reply = decode(&dispatcher.handle_request(&mut conn, &search_request(&[SERIAL], 10, Some(0))));
    assert_eq!(reply, Reply::Error(ErrorCode::InvalidContinuationState));
}

// ----------------------------------------------------------------------------
// Service Attribute
// ----------------------------------------------------------------------------

#[test]
fn test_attribute_frames_concatenate_to_unbounded_answer() {
    let handle = RecordHandle::new(0x10001);
    let record = serial_record(handle.value(), 120)
        .with_attribute(Attribute::text(0x0101, &"d".repeat(90)))
        .with_attribute(Attribute::uint32(0x0300, 0xDEADBEEF));
    let (_, dispatcher) = dispatcher_with(vec![record]);
    let ranges = [AttributeRange::ALL];

    let expected = unbounded_attributes(&dispatcher, attribute_request(handle, 0xFFFF, &ranges, None));

    for mtu in [48, 49, 57, 64, 100, 255, 672] {
        let mut conn = dispatcher.connection(TEST_PEER, Some(mtu));
        let (collected, frames) = collect_attributes(&dispatcher, &mut conn, |offset| {
            attribute_request(handle, 0xFFFF, &ranges, offset)
        })
        .unwrap();
        assert_eq!(collected, expected, "mtu {}", mtu);
        assert!(frames >= 1);
        assert!(conn.continuation().is_idle());
    }
}

#[test]
fn test_attribute_ranges_revisit_multi_id_entries() {
    let handle = RecordHandle::new(0x10001);
    let (_, dispatcher) = dispatcher_with(vec![serial_record(handle.value(), 10)]);
    let ranges = [
        AttributeRange::single(attribute_ids::SERVICE_NAME),
        AttributeRange::new(0x0000, 0x0005),
    ];

    let body = unbounded_attributes(&dispatcher, attribute_request(handle, 0xFFFF, &ranges, None));
    // Outer header, then service name first, then ids 0x0000..=0x0005 in order
    assert_eq!(body[0], 0x35);
    assert_eq!(&body[2..5], &[0x09, 0x01, 0x00]);
    let mut cursor = 2 + 3 + 2 + 10;
    for id in [0x0000u16, 0x0001, 0x0004, 0x0005] {
        assert_eq!(&body[cursor..cursor + 3], &[0x09, (id >> 8) as u8, id as u8]);
        let header = sdpd_core::protocol::ElementHeader::parse(&body[cursor + 3..]).unwrap();
        cursor += 3 + header.total_len();
    }
    assert_eq!(cursor, body.len());
}

#[test]
fn test_oversized_attribute_is_resource_error() {
    let handle = RecordHandle::new(0x10001);
    let record = ServiceRecord::new(handle).with_attribute(Attribute::text(0x0100, &"x".repeat(500)));
    let (_, dispatcher) = dispatcher_with(vec![record]);
    let mut conn = dispatcher.connection(TEST_PEER, Some(48));

    let reply = decode(&dispatcher.handle_request(
        &mut conn,
        &attribute_request(handle, 0xFFFF, &[AttributeRange::ALL], None),
    ));
    assert_eq!(reply, Reply::Error(ErrorCode::InsufficientResources));
    assert!(conn.continuation().is_idle());
}

#[test]
fn test_deleted_handle_leaves_stream_untouched() {
    let streaming = RecordHandle::new(0x10001);
    let deleted = RecordHandle::new(0x10002);
    let (store, dispatcher) = dispatcher_with(vec![
        serial_record(streaming.value(), 200),
        serial_record(deleted.value(), 10),
    ]);
    store.remove(deleted);
    let ranges = [AttributeRange::ALL];
    let mut conn = dispatcher.connection(TEST_PEER, Some(48));

    let first = decode(&dispatcher.handle_request(&mut conn, &attribute_request(streaming, 0xFFFF, &ranges, None)));
    let Reply::Attributes { continuation: Some(offset), .. } = first else {
        panic!("expected a continued response, got {:?}", first);
    };
    let before = conn.continuation().clone();

    let reply = decode(&dispatcher.handle_request(&mut conn, &attribute_request(deleted, 0xFFFF, &ranges, None)));
    assert_eq!(reply, Reply::Error(ErrorCode::InvalidRecordHandle));
    assert_eq!(conn.continuation(), &before);

    let resumed = decode(&dispatcher.handle_request(
        &mut conn,
        &attribute_request(streaming, 0xFFFF, &ranges, Some(offset)),
    ));
    assert!(matches!(resumed, Reply::Attributes { .. }));
}

#[test]
fn test_fresh_request_discards_previous_stream() {
    let handle = RecordHandle::new(0x10001);
    let (_, dispatcher) = dispatcher_with(vec![serial_record(handle.value(), 200)]);
    let ranges = [AttributeRange::ALL];
    let mut conn = dispatcher.connection(TEST_PEER, Some(48));

    dispatcher.handle_request(&mut conn, &attribute_request(handle, 0xFFFF, &ranges, None));
    assert!(!conn.continuation().is_idle());

    dispatcher.handle_request(&mut conn, &search_request(&[SERIAL], 10, None));
    assert!(conn.continuation().is_idle());

    let reply = decode(&dispatcher.handle_request(
        &mut conn,
        &attribute_request(handle, 0xFFFF, &ranges, Some(38)),
    ));
    assert_eq!(reply, Reply::Error(ErrorCode::InvalidContinuationState));
}

// ----------------------------------------------------------------------------
// Service Search Attribute
// ----------------------------------------------------------------------------

#[test]
fn test_search_attribute_two_records_in_ninety_byte_frames() {
    // Record sequences of 60 and 80 bytes: 8 handle + 8 class list + 5 name header
    let first = ServiceRecord::new(RecordHandle::new(0x10001))
        .with_service_classes(&[SERIAL])
        .with_service_name(&"a".repeat(36));
    let second = ServiceRecord::new(RecordHandle::new(0x10002))
        .with_service_classes(&[SERIAL])
        .with_service_name(&"b".repeat(56));
    let (_, dispatcher) = dispatcher_with(vec![first, second]);
    let ranges = [AttributeRange::ALL];
    let mut conn = dispatcher.connection(TEST_PEER, Some(100));

    let frame1 = decode(&dispatcher.handle_request(
        &mut conn,
        &search_attribute_request(&[SERIAL], 0xFFFF, &ranges, None),
    ));
    let Reply::Attributes { body: body1, continuation: Some(offset) } = frame1 else {
        panic!("expected a continued response, got {:?}", frame1);
    };
    // Two-byte outer header, all of record 1, the start of record 2
    assert_eq!(&body1[..2], &[0x35, 140]);
    assert_eq!(&body1[2..5], &[0x36, 0x00, 57]);
    assert_eq!(&body1[62..65], &[0x36, 0x00, 77]);
    assert_eq!(body1.len(), 89);
    assert_eq!(offset, 89);

    let frame2 = decode(&dispatcher.handle_request(
        &mut conn,
        &search_attribute_request(&[SERIAL], 0xFFFF, &ranges, Some(offset)),
    ));
    let Reply::Attributes { body: body2, continuation: None } = frame2 else {
        panic!("expected the final frame, got {:?}", frame2);
    };
    assert_eq!(body2.len(), 53);

    let expected = unbounded_attributes(
        &dispatcher,
        search_attribute_request(&[SERIAL], 0xFFFF, &ranges, None),
    );
    assert_eq!([body1, body2].concat(), expected);
    assert!(conn.continuation().is_idle());
}

#[test]
fn test_search_attribute_skips_records_without_selected_attributes() {
    let with_name = serial_record(0x10002, 12);
    let without_name = ServiceRecord::new(RecordHandle::new(0x10001)).with_service_classes(&[SERIAL]);
    let (_, dispatcher) = dispatcher_with(vec![with_name, without_name]);
    let ranges = [AttributeRange::single(attribute_ids::SERVICE_NAME)];

    let body = unbounded_attributes(
        &dispatcher,
        search_attribute_request(&[SERIAL], 0xFFFF, &ranges, None),
    );
    // One record sequence holding one 17-byte entry
    assert_eq!(&body[..5], &[0x35, 20, 0x36, 0x00, 17]);
    assert_eq!(body.len(), 22);
}

#[test]
fn test_record_deleted_mid_stream_is_rejected() {
    let records = (0..3).map(|i| serial_record(0x10001 + i, 60)).collect();
    let (store, dispatcher) = dispatcher_with(records);
    let ranges = [AttributeRange::ALL];
    let mut conn = dispatcher.connection(TEST_PEER, Some(48));

    let mut offset = None;
    // Stream until the second record is partially delivered
    loop {
        let reply = decode(&dispatcher.handle_request(
            &mut conn,
            &search_attribute_request(&[SERIAL], 0xFFFF, &ranges, offset),
        ));
        let Reply::Attributes { continuation: Some(next), .. } = reply else {
            panic!("stream finished before the deletion, got {:?}", reply);
        };
        offset = Some(next);
        let in_progress = conn.continuation().stream().and_then(|s| s.in_progress);
        if in_progress == Some(RecordHandle::new(0x10002)) {
            break;
        }
    }

    store.remove(RecordHandle::new(0x10002));
    for _ in 0..5 {
        let reply = decode(&dispatcher.handle_request(
            &mut conn,
            &search_attribute_request(&[SERIAL], 0xFFFF, &ranges, offset),
        ));
        assert_eq!(reply, Reply::Error(ErrorCode::InvalidContinuationState));
    }
}

#[test]
fn test_unsent_records_deleted_is_zero_progress_error() {
    let records: Vec<_> = (0..2).map(|i| serial_record(0x10001 + i, 10)).collect();
    let ranges = [AttributeRange::ALL];
    // Outer header plus the first record, leaving no room for the next header
    let first_frame = 3 + 3 + sequence_len(&records[0], &ranges);
    let (store, dispatcher) = dispatcher_with(records);
    let mut conn = dispatcher.connection(TEST_PEER, None);

    let reply = decode(&dispatcher.handle_request(
        &mut conn,
        &search_attribute_request(&[SERIAL], first_frame as u16, &ranges, None),
    ));
    let Reply::Attributes { continuation: Some(offset), .. } = reply else {
        panic!("expected a continued response, got {:?}", reply);
    };
    let stream = conn.continuation().stream().cloned().unwrap();
    assert_eq!(stream.cursor, Some(RecordHandle::new(0x10001)));
    assert_eq!(stream.in_progress, None);

    store.remove(RecordHandle::new(0x10002));
    for _ in 0..3 {
        let reply = decode(&dispatcher.handle_request(
            &mut conn,
            &search_attribute_request(&[SERIAL], first_frame as u16, &ranges, Some(offset)),
        ));
        assert_eq!(reply, Reply::Error(ErrorCode::InvalidContinuationState));
        assert_eq!(conn.continuation().stream(), Some(&stream));
    }
}

#[test]
fn test_rewritten_records_keep_total_length_exact() {
    const LEGACY_PEER: PeerAddress = PeerAddress::new([0x00, 0x1a, 0x7d, 0x00, 0x00, 0x01]);
    let pbap = |handle: u32| {
        ServiceRecord::new(RecordHandle::new(handle))
            .with_service_classes(&[service_classes::PBAP_PSE])
            .with_profile_descriptor(service_classes::PHONE_ACCESS, 0x0102)
            .with_service_name("Phonebook")
            .with_attribute(Attribute::uint16(attribute_ids::GOEP_L2CAP_PSM, 0x1005))
            .with_attribute(Attribute::uint32(attribute_ids::PBAP_SUPPORTED_FEATURES, 0x3FF))
    };
    let store = Arc::new(InMemoryRecordStore::with_records([
        pbap(0x10001),
        pbap(0x10002),
        pbap(0x10003),
    ]));
    let config = ServerConfig::default().with_interop(InteropConfig {
        pbap_1_1_peers: vec!["00:1a:7d".into()],
        ..Default::default()
    });
    let dispatcher = Dispatcher::new(store, config).unwrap();
    let ranges = [AttributeRange::ALL];

    let mut conn = dispatcher.connection(LEGACY_PEER, Some(48));
    let (collected, frames) = collect_attributes(&dispatcher, &mut conn, |offset| {
        search_attribute_request(&[service_classes::PBAP_PSE], 0xFFFF, &ranges, offset)
    })
    .unwrap();
    assert!(frames > 1);

    // The outer header announces exactly the bytes that followed
    let header = sdpd_core::protocol::ElementHeader::parse(&collected).unwrap();
    assert_eq!(header.total_len(), collected.len());

    let mut modern = dispatcher.connection(TEST_PEER, Some(48));
    let (canonical, _) = collect_attributes(&dispatcher, &mut modern, |offset| {
        search_attribute_request(&[service_classes::PBAP_PSE], 0xFFFF, &ranges, offset)
    })
    .unwrap();
    assert!(canonical.len() > collected.len());
}
