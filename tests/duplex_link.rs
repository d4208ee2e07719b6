//! Half-duplex behavior through the whole stack: ordering, pacing,
//! receive-starvation and backpressure, driven over an in-memory port.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{test_config, wait_for, MockOpener, Wire};
use dstarlink::config::LinkConfig;
use dstarlink::dstar::framing::{encode, Decoded, FrameCodec};
use dstarlink::iface::DstarInterface;
use dstarlink::LinkError;

type Received = Arc<Mutex<Vec<Vec<u8>>>>;

async fn open_link(config: LinkConfig) -> (DstarInterface, Arc<Wire>, Received) {
    common::init_test_logging();
    let wire = Wire::new();
    let received: Received = Arc::new(Mutex::new(Vec::new()));
    let mut iface = DstarInterface::new(config).unwrap();
    let sink = Arc::clone(&received);
    iface.set_receive_callback(move |payload| sink.lock().unwrap().push(payload));
    iface
        .open_with(Box::new(MockOpener::new(Arc::clone(&wire))))
        .await
        .unwrap();
    assert!(wait_for(|| iface.is_online(), 1000).await, "link never came up");
    (iface, wire, received)
}

/// Decode every frame the link has written to the wire so far.
fn decode_written(wire: &Wire) -> Vec<Vec<u8>> {
    let mut codec = FrameCodec::new();
    codec
        .feed(&wire.written())
        .into_iter()
        .filter_map(|d| match d {
            Decoded::Payload(p) => Some(p),
            Decoded::Error(_) => None,
        })
        .collect()
}

#[tokio::test]
async fn inbound_frames_dispatch_in_arrival_order() {
    let (mut iface, wire, received) = open_link(test_config()).await;

    let p1 = vec![1u8; 10];
    let p2 = vec![2u8; 20];
    let p3 = vec![3u8; 30];
    let mut stream = encode(&p1);
    stream.extend_from_slice(&encode(&p2));
    stream.extend_from_slice(&encode(&p3));
    wire.push_inbound(&stream);

    assert!(wait_for(|| received.lock().unwrap().len() == 3, 1000).await);
    assert_eq!(*received.lock().unwrap(), vec![p1, p2, p3]);
    iface.close().await;
}

#[tokio::test]
async fn outbound_payloads_hit_the_wire_in_submission_order() {
    let (mut iface, wire, _received) = open_link(test_config()).await;

    let p1 = vec![0xA1u8; 50];
    let p2 = vec![0xB2u8; 60];
    let p3 = vec![0xC3u8; 70];
    iface.send(&p1).unwrap();
    iface.send(&p2).unwrap();
    iface.send(&p3).unwrap();

    assert!(wait_for(|| decode_written(&wire).len() == 3, 2000).await);
    assert_eq!(decode_written(&wire), vec![p1, p2, p3]);
    iface.close().await;
}

#[tokio::test]
async fn inbound_corruption_is_recovered_locally() {
    let (mut iface, wire, received) = open_link(test_config()).await;

    let good = vec![0x42u8; 25];
    let mut corrupt = encode(&vec![0x41u8; 25]);
    corrupt[7] ^= 0x80;
    wire.push_inbound(&corrupt);
    wire.push_inbound(&encode(&good));

    assert!(wait_for(|| !received.lock().unwrap().is_empty(), 1000).await);
    // Only the valid frame is delivered; the corrupt one is dropped silently.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(*received.lock().unwrap(), vec![good]);
    iface.close().await;
}

#[tokio::test]
async fn continuous_inbound_starves_sends_until_idle_timeout() {
    // receive_idle is 40ms; noise every 5ms keeps the channel in Receiving.
    let (mut iface, wire, _received) = open_link(test_config()).await;

    wire.push_inbound(&[0x00]);
    assert!(
        wait_for(
            || iface.link_state() == dstarlink::dstar::arbiter::LinkState::Receiving,
            1000
        )
        .await
    );
    iface.send(&[0x55u8; 16]).unwrap();

    for _ in 0..20 {
        wire.push_inbound(&[0x00]);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    // Still mid-"carrier": nothing may have been transmitted.
    assert_eq!(wire.written_len(), 0);
    assert_eq!(iface.pending_sends(), 1);

    // Once the noise stops, the receive-idle window elapses and the queued
    // send goes out.
    assert!(wait_for(|| wire.written_len() > 0, 1000).await);
    iface.close().await;
}

#[tokio::test]
async fn backpressure_when_channel_cannot_keep_up() {
    // A huge turnaround pins the channel after the first transmission, so the
    // queue fills and overflows deterministically.
    let mut config = test_config();
    config.tuning.turnaround_ms = 60_000;
    let (mut iface, wire, _received) = open_link(config).await;

    iface.send(&[0u8; 8]).unwrap();
    assert!(wait_for(|| wire.written_len() > 0, 1000).await);

    // max_pending_sends is 4
    for i in 0..4 {
        iface.send(&[i as u8; 8]).unwrap();
    }
    assert!(matches!(
        iface.send(&[9u8; 8]),
        Err(LinkError::Backpressure { capacity: 4 })
    ));
    // The rejection left the queue untouched.
    assert_eq!(iface.pending_sends(), 4);
    iface.close().await;
}

#[tokio::test]
async fn close_rejects_queued_and_future_sends() {
    let (mut iface, _wire, _received) = open_link(test_config()).await;
    iface.close().await;
    assert!(matches!(iface.send(&[1u8; 4]), Err(LinkError::LinkClosed)));
    // Closing twice is harmless.
    iface.close().await;
}
