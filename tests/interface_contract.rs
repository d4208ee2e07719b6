//! The mesh-stack facing contract: MTU gating, attribute pass-through,
//! idempotent open and lifecycle edges.

mod common;

use std::sync::Arc;

use common::{test_config, wait_for, MockOpener, Wire};
use dstarlink::config::InterfaceMode;
use dstarlink::iface::DstarInterface;
use dstarlink::LinkError;

#[tokio::test]
async fn mtu_boundary_is_exact() {
    let wire = Wire::new();
    let mut iface = DstarInterface::new(test_config()).unwrap();
    iface
        .open_with(Box::new(MockOpener::new(Arc::clone(&wire))))
        .await
        .unwrap();
    assert!(wait_for(|| iface.is_online(), 1000).await);

    assert_eq!(iface.mtu(), 500);
    // 500 bytes is accepted, 501 is rejected without touching the queue.
    iface.send(&[0u8; 500]).unwrap();
    assert!(matches!(
        iface.send(&[0u8; 501]),
        Err(LinkError::PayloadTooLarge {
            size: 501,
            mtu: 500
        })
    ));
    assert!(matches!(iface.send(&[]), Err(LinkError::EmptyPayload)));
    iface.close().await;
}

#[tokio::test]
async fn attributes_pass_through_unchanged() {
    let mut config = test_config();
    config.name = "hf-shack".to_string();
    config.mode = InterfaceMode::Gateway;
    config.speed = 4800;
    let iface = DstarInterface::new(config).unwrap();

    assert_eq!(iface.name(), "hf-shack");
    assert_eq!(iface.mode(), InterfaceMode::Gateway);
    assert_eq!(iface.bitrate(), 4800);
    assert_eq!(iface.to_string(), "DstarInterface[hf-shack]");
}

#[tokio::test]
async fn open_is_idempotent_safe() {
    let wire = Wire::new();
    let opener = MockOpener::new(Arc::clone(&wire));
    let opens = opener.open_count();

    let mut iface = DstarInterface::new(test_config()).unwrap();
    iface.open_with(Box::new(opener)).await.unwrap();
    assert!(wait_for(|| iface.is_online(), 1000).await);

    // A second open returns the existing state; no second transport appears.
    iface
        .open_with(Box::new(MockOpener::new(Arc::clone(&wire))))
        .await
        .unwrap();
    assert_eq!(opens.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert!(iface.is_online());
    iface.close().await;
}

#[tokio::test]
async fn send_before_open_is_rejected() {
    let iface = DstarInterface::new(test_config()).unwrap();
    assert!(matches!(iface.send(&[1u8; 4]), Err(LinkError::LinkClosed)));
}

#[tokio::test]
async fn reopen_after_close_is_rejected() {
    let wire = Wire::new();
    let mut iface = DstarInterface::new(test_config()).unwrap();
    iface
        .open_with(Box::new(MockOpener::new(Arc::clone(&wire))))
        .await
        .unwrap();
    iface.close().await;
    // Instances are single-use; a fresh session means a fresh interface.
    assert!(matches!(
        iface
            .open_with(Box::new(MockOpener::new(Arc::clone(&wire))))
            .await,
        Err(LinkError::LinkClosed)
    ));
}

#[tokio::test]
async fn byte_counters_track_payload_bytes() {
    let wire = Wire::new();
    let mut iface = DstarInterface::new(test_config()).unwrap();
    iface
        .open_with(Box::new(MockOpener::new(Arc::clone(&wire))))
        .await
        .unwrap();
    assert!(wait_for(|| iface.is_online(), 1000).await);

    iface.send(&[7u8; 40]).unwrap();
    assert!(wait_for(|| iface.tx_bytes() == 40, 1000).await);

    wire.push_inbound(&dstarlink::dstar::framing::encode(&[9u8; 25]));
    assert!(wait_for(|| iface.rx_bytes() == 25, 1000).await);
    iface.close().await;
}
