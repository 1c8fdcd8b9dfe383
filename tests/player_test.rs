//! Player node service tests
//!
//! Receive/playback session exclusivity, storage lifetime, and the
//! receive → play → stop → clear walkthrough.

mod common;

use std::sync::Arc;

use futures_util::future::join_all;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

use audiorelay::audio::StreamFormat;
use audiorelay::error::{Error, ErrorCode, ResourceKind};
use audiorelay::network::{MemorySource, Transport};
use audiorelay::PlayerService;
use common::{FailingTransport, FakePlaybackDevice, MemoryTransport};

fn player() -> (Arc<PlayerService>, MemoryTransport, FakePlaybackDevice) {
    let transport = MemoryTransport::new();
    let device = FakePlaybackDevice::new();
    let service = PlayerService::new(Arc::new(transport.clone()), Arc::new(device.clone()));
    (Arc::new(service), transport, device)
}

/// Given an idle player
/// When receive-start("9000"), play-start(B, "dev0", 2, 44100), play-stop, clear-storage
/// Then each step succeeds and a second clear-storage fails with ResourceNotFound
#[tokio::test]
async fn test_receive_play_stop_clear_walkthrough() {
    let (player, _, _) = player();

    let storage_id = player
        .receive_start("9000", None)
        .await
        .expect("receive-start should succeed");
    player
        .play_start(&storage_id, "dev0", StreamFormat::new(2, 44100))
        .await
        .expect("play-start should succeed");

    let state = player.state().await;
    assert_eq!(state.ports, vec!["9000"]);
    assert_eq!(state.devices, vec!["dev0"]);
    assert_eq!(state.storages, vec![storage_id.clone()]);

    player.play_stop("dev0").await.expect("play-stop should succeed");
    player
        .clear_storage(&storage_id)
        .await
        .expect("first clear should succeed");

    let err = player.clear_storage(&storage_id).await.unwrap_err();
    assert!(
        matches!(err, Error::ResourceNotFound { kind: ResourceKind::Storage, .. }),
        "second clear should be not-found, got {}",
        err
    );
}

/// Receiving on a busy port fails; stopping an idle port fails
#[tokio::test]
async fn test_receive_start_stop_exclusivity() {
    let (player, _, _) = player();

    assert_ok!(player.receive_start("9000", None).await);
    let err = assert_err!(player.receive_start("9000", None).await);
    assert!(err.is_busy());

    assert_ok!(player.receive_stop("9000").await);
    let err = assert_err!(player.receive_stop("9000").await);
    assert!(err.is_not_found());

    // Port is reusable once stopped
    assert_ok!(player.receive_start("9000", None).await);
}

/// The buffer survives receive-stop and can be resumed by id
#[tokio::test]
async fn test_storage_outlives_receive_session() {
    let (player, _, _) = player();

    let first = player.receive_start("9000", None).await.unwrap();
    player.receive_stop("9000").await.unwrap();
    assert_eq!(player.state().await.storages, vec![first.clone()]);

    let resumed = player.receive_start("9000", Some(&first)).await.unwrap();
    assert_eq!(resumed, first);
    assert_eq!(player.state().await.storages.len(), 1);

    // Unknown ids allocate a fresh buffer under a new id
    player.receive_stop("9000").await.unwrap();
    let fresh = player
        .receive_start("9000", Some("no-such-storage"))
        .await
        .unwrap();
    assert_ne!(fresh, "no-such-storage");
    assert_eq!(player.state().await.storages.len(), 2);
}

/// N concurrent receive-starts on one idle port: exactly one wins
#[tokio::test]
async fn test_concurrent_receive_start_single_winner() {
    let (player, _, _) = player();

    let attempts = (0..16).map(|_| {
        let player = player.clone();
        tokio::spawn(async move { player.receive_start("9000", None).await })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked"))
        .collect();

    let ok = results.iter().filter(|r| r.is_ok()).count();
    let busy = results
        .iter()
        .filter(|r| matches!(r, Err(e) if e.code() == ErrorCode::ResourceBusy))
        .count();
    assert_eq!(ok, 1);
    assert_eq!(busy, 15);

    // Losers did not leave buffers behind
    assert_eq!(player.state().await.storages.len(), 1);
}

/// Play-start checks the storage id before the device
#[tokio::test]
async fn test_play_unknown_storage_and_busy_device() {
    let (player, _, _) = player();
    let format = StreamFormat::new(2, 44100);

    let err = player.play_start("missing", "dev0", format).await.unwrap_err();
    assert!(matches!(
        err,
        Error::ResourceNotFound {
            kind: ResourceKind::Storage,
            ..
        }
    ));

    let id = player.receive_start("9000", None).await.unwrap();
    player.play_start(&id, "dev0", format).await.unwrap();
    let err = player.play_start(&id, "dev0", format).await.unwrap_err();
    assert!(matches!(
        err,
        Error::ResourceBusy {
            kind: ResourceKind::Device,
            ..
        }
    ));

    let err = player.play_stop("dev1").await.unwrap_err();
    assert!(err.is_not_found());
}

/// A device that fails to open leaves no playback session
#[tokio::test]
async fn test_failed_play_leaves_device_idle() {
    let (player, _, device) = player();
    device.remove_device("hw:9");

    let id = player.receive_start("9000", None).await.unwrap();
    let err = player
        .play_start(&id, "hw:9", StreamFormat::new(1, 8000))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Device);
    assert!(player.state().await.devices.is_empty());
}

/// A failed receive-start discards the buffer it allocated
#[tokio::test]
async fn test_failed_receive_discards_new_buffer() {
    let player = PlayerService::new(
        Arc::new(FailingTransport),
        Arc::new(FakePlaybackDevice::new()),
    );

    let err = player.receive_start("9000", None).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::Transport);

    let state = player.state().await;
    assert!(state.ports.is_empty());
    assert!(state.storages.is_empty());
}

/// Bytes sent to the receive port reach the device in order
#[tokio::test]
async fn test_received_audio_reaches_device() {
    let (player, transport, device) = player();

    let id = player.receive_start("9000", None).await.unwrap();
    player
        .play_start(&id, "dev0", StreamFormat::new(2, 44100))
        .await
        .unwrap();

    let payload: Vec<u8> = (0..4096u32).map(|i| (i % 256) as u8).collect();
    transport
        .send(
            "127.0.0.1:9000",
            Box::new(MemorySource::new(payload.clone(), 512)),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    let played = device.wait_for("dev0", payload.len()).await;
    assert_eq!(played, payload);
}

/// Shutdown cancels every live session
#[tokio::test]
async fn test_shutdown_releases_sessions() {
    let (player, transport, _) = player();

    let id = player.receive_start("9000", None).await.unwrap();
    player
        .play_start(&id, "dev0", StreamFormat::new(2, 44100))
        .await
        .unwrap();
    assert_eq!(transport.listening(), vec![9000]);

    player.shutdown().await;

    let state = player.state().await;
    assert!(state.ports.is_empty());
    assert!(state.devices.is_empty());
    assert!(transport.listening().is_empty());
    // Buffers are only released by clear-storage
    assert_eq!(state.storages, vec![id]);
}
