use std::cell::{Cell, RefCell};
use std::io::Write;
use std::rc::Rc;
use std::time::{Duration, Instant};

use bytes::{BufMut, BytesMut};
use routio_frame::{encode_frame, FrameKind, DEFAULT_MAX_PAYLOAD, MAGIC};
use routio_peer::{Channel, Client, ClientConfig, Hello, HelloConfig, IoLoop, PeerError};
use routio_transport::Endpoint;

fn pump(ioloop: &mut IoLoop, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        ioloop.wait(10).unwrap();
    }
}

fn client(name: &str) -> Client {
    Client::new(ClientConfig {
        name: name.to_string(),
        loopback: false,
        ..ClientConfig::default()
    })
}

fn tcp_any() -> Endpoint {
    Endpoint::parse("tcp://127.0.0.1:0").unwrap()
}

#[test]
fn direct_peers_exchange_data() {
    let mut ioloop = IoLoop::new();
    let listener = client("listener");
    let dialer = client("dialer");
    ioloop.add_handler(listener.clone()).unwrap();
    ioloop.add_handler(dialer.clone()).unwrap();

    let endpoint = listener.listen(&tcp_any()).unwrap();
    let channel = Channel::parse("chatter", "string").unwrap();
    let received = Rc::new(RefCell::new(Vec::new()));
    let sink = received.clone();
    let _sub = listener
        .subscriber(channel.clone(), move |mut reader| {
            sink.borrow_mut().push(reader.read_string()?);
            Ok(())
        })
        .unwrap();

    dialer.connect_peer(&endpoint).unwrap();
    pump(&mut ioloop, || dialer.peer_subscriptions(&channel) >= 1);
    assert_eq!(dialer.established_count(), 1);
    assert_eq!(listener.connection_count(), 1);

    let report = dialer
        .publisher(channel.clone())
        .unwrap()
        .send("over the wire")
        .unwrap();
    assert_eq!(report.queued, 1);
    assert!(!report.loopback);

    pump(&mut ioloop, || received.borrow().len() == 1);
    assert_eq!(*received.borrow(), vec!["over the wire"]);
    pump(&mut ioloop, || listener.peer_publishers(&channel) >= 1);
}

#[test]
fn peers_only_receive_channels_they_asked_for() {
    let mut ioloop = IoLoop::new();
    let listener = client("listener");
    let dialer = client("dialer");
    ioloop.add_handler(listener.clone()).unwrap();
    ioloop.add_handler(dialer.clone()).unwrap();

    let endpoint = listener.listen(&tcp_any()).unwrap();
    dialer.connect_peer(&endpoint).unwrap();
    pump(&mut ioloop, || {
        dialer.established_count() == 1 && listener.established_count() == 1
    });

    let unwanted = Channel::parse("noise", "u8").unwrap();
    let report = listener.publisher(unwanted).unwrap().send(&7u8).unwrap();
    assert_eq!(report.queued, 0);
    assert!(report.is_complete());
}

#[test]
fn peer_ids_are_only_assigned_by_routers() {
    let mut ioloop = IoLoop::new();
    let listener = client("listener");
    let dialer = client("dialer");
    ioloop.add_handler(listener.clone()).unwrap();
    ioloop.add_handler(dialer.clone()).unwrap();

    let endpoint = listener.listen(&tcp_any()).unwrap();
    dialer.connect_peer(&endpoint).unwrap();
    pump(&mut ioloop, || dialer.established_count() == 1);
    assert_eq!(dialer.peer_id(), None);
}

#[test]
fn oversized_frame_closes_connection_without_delivery() {
    let mut ioloop = IoLoop::new();
    let listener = client("listener");
    ioloop.add_handler(listener.clone()).unwrap();

    let endpoint = listener.listen(&tcp_any()).unwrap();
    let channel = Channel::parse("big", "bytes").unwrap();
    let calls = Rc::new(Cell::new(0));
    let seen = calls.clone();
    let _sub = listener
        .subscriber(channel.clone(), move |_| {
            seen.set(seen.get() + 1);
            Ok(())
        })
        .unwrap();

    let mut raw = routio_transport::connect(&endpoint).unwrap();
    let mut wire = BytesMut::new();
    let hello = Hello::new(&HelloConfig::default(), "raw").to_frame().unwrap();
    encode_frame(&hello, &mut wire).unwrap();
    wire.put_slice(&MAGIC);
    wire.put_u8(FrameKind::Data as u8);
    wire.put_u16_le(3);
    wire.put_slice(b"big");
    wire.put_u16_le(5);
    wire.put_slice(b"bytes");
    wire.put_u32_le((DEFAULT_MAX_PAYLOAD + 1) as u32);
    raw.write_all(&wire).unwrap();
    raw.flush().unwrap();

    let mut errors = Vec::new();
    pump(&mut ioloop, || {
        errors.extend(listener.take_errors());
        !errors.is_empty()
    });

    assert!(
        matches!(errors[0], PeerError::Protocol(_)),
        "unexpected error: {:?}",
        errors[0]
    );
    pump(&mut ioloop, || listener.connection_count() == 0);
    assert_eq!(calls.get(), 0);
}

#[test]
fn data_before_hello_is_rejected() {
    let mut ioloop = IoLoop::new();
    let listener = client("listener");
    ioloop.add_handler(listener.clone()).unwrap();
    let endpoint = listener.listen(&tcp_any()).unwrap();

    let mut raw = routio_transport::connect(&endpoint).unwrap();
    let mut wire = BytesMut::new();
    let frame = routio_frame::Frame::data(
        "early".to_string(),
        "u8".to_string(),
        routio_message::encode_message(&1u8),
    );
    encode_frame(&frame, &mut wire).unwrap();
    raw.write_all(&wire).unwrap();

    let mut errors = Vec::new();
    pump(&mut ioloop, || {
        errors.extend(listener.take_errors());
        !errors.is_empty()
    });
    assert!(errors[0].is_protocol());
    pump(&mut ioloop, || listener.connection_count() == 0);
}

#[test]
fn closed_client_refuses_new_connections() {
    let listener = client("listener");
    let endpoint = listener.listen(&tcp_any()).unwrap();
    let dialer = client("dialer");
    dialer.close();
    assert!(matches!(
        dialer.connect_peer(&endpoint),
        Err(PeerError::Closed)
    ));
    assert!(listener.take_errors().is_empty());
}

#[cfg(feature = "schema")]
#[test]
fn schema_payloads_are_validated_on_receipt() {
    use std::sync::Arc;

    use routio_message::Value;
    use routio_schema::{Record, SchemaRegistry};

    const POINT: &str = r#"{
        "id": "geometry.Point",
        "fields": [
            { "name": "x", "kind": "d" },
            { "name": "y", "kind": "d" }
        ]
    }"#;

    let mut registry = SchemaRegistry::new();
    registry.register(POINT).unwrap();
    let registry = Arc::new(registry);

    let mut ioloop = IoLoop::new();
    let listener = client("listener");
    let dialer = client("dialer");
    listener.set_schema_registry(registry.clone());
    ioloop.add_handler(listener.clone()).unwrap();
    ioloop.add_handler(dialer.clone()).unwrap();

    let channel = Channel::parse("pose", "schema:geometry.Point").unwrap();
    let calls = Rc::new(Cell::new(0));
    let seen = calls.clone();
    let _sub = listener
        .subscriber(channel.clone(), move |_| {
            seen.set(seen.get() + 1);
            Ok(())
        })
        .unwrap();

    let endpoint = listener.listen(&tcp_any()).unwrap();
    dialer.connect_peer(&endpoint).unwrap();
    pump(&mut ioloop, || dialer.peer_subscriptions(&channel) >= 1);

    let publisher = dialer.publisher(channel).unwrap();
    let good = Record::new()
        .with("x", Value::F64(1.0))
        .with("y", Value::F64(2.0));
    publisher
        .send_payload(registry.encode_message("geometry.Point", &good).unwrap())
        .unwrap();
    publisher.send("not a point").unwrap();

    let mut errors = Vec::new();
    pump(&mut ioloop, || {
        errors.extend(listener.take_errors());
        calls.get() == 1 && !errors.is_empty()
    });
    assert!(matches!(errors[0], PeerError::Schema(_)));
    assert_eq!(calls.get(), 1);
}
