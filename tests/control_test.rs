//! Control API tests over real WebSocket connections
//!
//! Nodes are served on loopback with `ControlServer` and reached through the
//! remote clients, the same way the binaries wire them.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use audiorelay::audio::{read_wav_file, StreamFormat};
use audiorelay::config::OrchestratorConfig;
use audiorelay::control::{ControlClient, ControlHandler, ControlServer};
use audiorelay::error::{Error, ErrorCode};
use audiorelay::network::TcpTransport;
use audiorelay::player::{PlayerControl, RemotePlayer};
use audiorelay::protocol::{OrchestratorRequest, OrchestratorResponse, PlayerState};
use audiorelay::recorder::{RecorderControl, RemoteRecorder};
use audiorelay::{Orchestrator, PlayerService, RecorderService};
use common::{free_port, write_test_wav, FakeCaptureDevice, FakePlaybackDevice, MemoryTransport};

const TIMEOUT: Duration = Duration::from_secs(5);

/// Serve `handler` on a loopback port; returns the port and the server task
async fn serve<H: ControlHandler>(
    handler: Arc<H>,
    token: CancellationToken,
) -> (u16, JoinHandle<audiorelay::Result<()>>) {
    let server = ControlServer::bind("127.0.0.1:0", handler)
        .await
        .expect("Failed to bind control server");
    let port = server.local_addr().expect("Failed to read local addr").port();
    (port, tokio::spawn(server.run(token)))
}

/// Given a player served over WebSocket
/// When a remote client drives receive-start, play, stop and clear-storage
/// Then results match the in-process service, and errors keep their code
#[tokio::test]
async fn test_remote_player_round_trip() {
    let playback = FakePlaybackDevice::new();
    let service = Arc::new(PlayerService::new(
        Arc::new(MemoryTransport::new()),
        Arc::new(playback),
    ));
    let token = CancellationToken::new();
    let (port, server) = serve(service.clone(), token.clone()).await;
    let player = RemotePlayer::new(port, TIMEOUT);

    let storage_id = player
        .receive_start("127.0.0.1", "9000", None)
        .await
        .expect("receive-start over WebSocket should succeed");
    player
        .play("127.0.0.1", &storage_id, "dev0", StreamFormat::new(2, 44100))
        .await
        .expect("play over WebSocket should succeed");

    let state = player.state("127.0.0.1").await.unwrap();
    assert_eq!(
        state,
        PlayerState {
            ports: vec!["9000".into()],
            storages: vec![storage_id.clone()],
            devices: vec!["dev0".into()],
        }
    );
    assert_eq!(state, service.state().await);

    player.stop("127.0.0.1", "dev0").await.unwrap();
    player.receive_stop("127.0.0.1", "9000").await.unwrap();
    player.clear_storage("127.0.0.1", &storage_id).await.unwrap();

    let err = player
        .clear_storage("127.0.0.1", &storage_id)
        .await
        .unwrap_err();
    assert!(
        matches!(err, Error::Remote { code: ErrorCode::ResourceNotFound, .. }),
        "expected remote not-found, got {:?}",
        err
    );
    assert!(err.is_not_found());

    token.cancel();
    server.await.unwrap().unwrap();
}

/// A recorder whose destination refuses the stream reports a transport error
/// and keeps the device idle
#[tokio::test]
async fn test_remote_recorder_unreachable_destination() {
    let service = Arc::new(RecorderService::new(
        Arc::new(MemoryTransport::new()),
        Arc::new(FakeCaptureDevice::default()),
    ));
    let token = CancellationToken::new();
    let (port, server) = serve(service, token.clone()).await;
    let recorder = RemoteRecorder::new(port, TIMEOUT);

    let dest = format!("127.0.0.1:{}", free_port());
    let err = recorder
        .start("127.0.0.1", "mic0", StreamFormat::new(1, 48000), &dest)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Transport);
    assert!(recorder.state("127.0.0.1").await.unwrap().devices.is_empty());

    token.cancel();
    server.await.unwrap().unwrap();
}

/// Malformed frames get an error reply instead of dropping the connection
#[tokio::test]
async fn test_unknown_request_type_is_control_error() {
    let service = Arc::new(PlayerService::new(
        Arc::new(MemoryTransport::new()),
        Arc::new(FakePlaybackDevice::new()),
    ));
    let token = CancellationToken::new();
    let (port, server) = serve(service, token.clone()).await;

    let client = ControlClient::new("127.0.0.1", port, TIMEOUT);
    let err = client
        .call::<_, serde_json::Value>(serde_json::json!({ "type": "self_destruct" }))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Control);

    token.cancel();
    server.await.unwrap().unwrap();
}

/// Given an orchestrator and a player node, each on its own control port
/// When a FilePlay request reaches the orchestrator over WebSocket
/// Then the WAV's PCM travels over TCP to the player's device
#[tokio::test]
async fn test_orchestrated_file_play_over_tcp() {
    let playback = FakePlaybackDevice::new();
    let player = Arc::new(PlayerService::new(
        Arc::new(TcpTransport::new(1024)),
        Arc::new(playback.clone()),
    ));
    let token = CancellationToken::new();
    let (player_port, player_server) = serve(player.clone(), token.clone()).await;

    let config = OrchestratorConfig {
        advertise_ip: "127.0.0.1".parse().unwrap(),
        player_control_port: player_port,
        call_timeout: TIMEOUT,
        ..OrchestratorConfig::default()
    };
    let orchestrator = Arc::new(Orchestrator::new(
        config,
        Arc::new(TcpTransport::new(1024)),
        RemotePlayer::new(player_port, TIMEOUT),
        RemoteRecorder::new(free_port(), TIMEOUT),
    ));
    let (control_port, orchestrator_server) = serve(orchestrator.clone(), token.clone()).await;

    let file = write_test_wav(2, 44100, 2000);
    let expected = read_wav_file(&file).unwrap().pcm;
    let data_port = free_port().to_string();

    let client = ControlClient::new("127.0.0.1", control_port, TIMEOUT);
    let response: OrchestratorResponse = client
        .call(OrchestratorRequest::FilePlay {
            file: file.to_string_lossy().into_owned(),
            player_node: "127.0.0.1".into(),
            player_port: data_port.clone(),
            device: "dev0".into(),
        })
        .await
        .expect("FilePlay should succeed");
    let OrchestratorResponse::FilePlay(playback_info) = response else {
        panic!("unexpected response: {:?}", response);
    };
    assert_eq!(playback_info.format, StreamFormat::new(2, 44100));

    let played = playback.wait_for("dev0", expected.len()).await;
    assert_eq!(played, expected);

    let response: OrchestratorResponse = client
        .call(OrchestratorRequest::FileStop {
            player_node: "127.0.0.1".into(),
            player_port: data_port,
            device: "dev0".into(),
            storage_id: playback_info.storage_id,
        })
        .await
        .expect("FileStop should succeed");
    assert_eq!(response, OrchestratorResponse::Ack);
    assert_eq!(player.state().await, PlayerState::default());

    token.cancel();
    orchestrator.shutdown().await;
    player_server.await.unwrap().unwrap();
    orchestrator_server.await.unwrap().unwrap();
    std::fs::remove_file(file).ok();
}

/// An unreachable recorder node surfaces as a transport error through the
/// orchestrator, with nothing left reserved
#[tokio::test]
async fn test_orchestrator_reports_unreachable_node() {
    let orchestrator = Orchestrator::new(
        OrchestratorConfig::default(),
        Arc::new(MemoryTransport::new()),
        RemotePlayer::new(free_port(), Duration::from_millis(500)),
        RemoteRecorder::new(free_port(), Duration::from_millis(500)),
    );

    let err = orchestrator.recorder_state("127.0.0.1").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::Transport);

    let err = orchestrator
        .play_from_recorder(
            "127.0.0.1",
            "9400",
            "dev0",
            StreamFormat::new(2, 44100),
            "127.0.0.1",
            "mic0",
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Transport);
    assert!(orchestrator.local_state().await.remote_devices.is_empty());
}
