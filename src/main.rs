//! audiorelay - Networked audio distribution between player and recorder nodes

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use audiorelay::audio::{list_input_devices, list_output_devices, AudioDevice, StreamFormat};
use audiorelay::config::{
    default_advertise_ip, host_port, OrchestratorConfig, PlayerConfig, RecorderConfig,
    TransportConfig, TransportKind, DEFAULT_BUFFER_SIZE, DEFAULT_ORCHESTRATOR_PORT,
    DEFAULT_PLAYER_PORT, DEFAULT_RECORDER_PORT,
};
use audiorelay::control::{ControlClient, ControlHandler, ControlServer};
use audiorelay::protocol::{OrchestratorRequest, OrchestratorResponse};
use audiorelay::{Orchestrator, PlayerService, RecorderService};

#[derive(Parser)]
#[command(name = "audiorelay")]
#[command(about = "Networked audio distribution between player and recorder nodes")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List available audio devices
    Devices {
        #[command(subcommand)]
        action: DevicesAction,
    },

    /// Run a player node
    Player {
        /// Control API port
        #[arg(long, env = "PLAYER_PORT", default_value_t = DEFAULT_PLAYER_PORT)]
        port: u16,

        #[command(flatten)]
        transport: TransportArgs,
    },

    /// Run a recorder node
    Recorder {
        /// Control API port
        #[arg(long, env = "RECORDER_PORT", default_value_t = DEFAULT_RECORDER_PORT)]
        port: u16,

        #[command(flatten)]
        transport: TransportArgs,
    },

    /// Run the orchestrator
    Orchestrator {
        /// Control API port
        #[arg(long, env = "CONTROL_PORT", default_value_t = DEFAULT_ORCHESTRATOR_PORT)]
        port: u16,

        /// Address recorders stream to for file recording (default: LAN address)
        #[arg(long, env = "SERVER_IP")]
        server_ip: Option<IpAddr>,

        /// Control port of player nodes
        #[arg(long, env = "PLAYER_PORT", default_value_t = DEFAULT_PLAYER_PORT)]
        player_port: u16,

        /// Control port of recorder nodes
        #[arg(long, env = "RECORDER_PORT", default_value_t = DEFAULT_RECORDER_PORT)]
        recorder_port: u16,

        /// Deadline for each call to a node, in milliseconds
        #[arg(long, env = "CALL_TIMEOUT_MS", default_value_t = 5000)]
        call_timeout_ms: u64,

        #[command(flatten)]
        transport: TransportArgs,
    },

    /// Send one request to a running orchestrator
    Call {
        /// Orchestrator host
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Orchestrator control port
        #[arg(long, env = "CONTROL_PORT", default_value_t = DEFAULT_ORCHESTRATOR_PORT)]
        port: u16,

        /// Deadline in milliseconds
        #[arg(long, env = "CALL_TIMEOUT_MS", default_value_t = 5000)]
        timeout_ms: u64,

        #[command(subcommand)]
        op: CallOp,
    },
}

#[derive(Subcommand)]
enum DevicesAction {
    /// List all devices
    List,
}

#[derive(Args)]
struct TransportArgs {
    /// Data-plane transport
    #[arg(long, env = "TRANSPORT", value_enum, default_value_t = TransportKind::Tcp)]
    transport: TransportKind,

    /// Receive buffer size in bytes (maximum UDP datagram size)
    #[arg(long, env = "UDP_BUFF_SIZE", default_value_t = DEFAULT_BUFFER_SIZE)]
    buffer_size: usize,
}

impl From<TransportArgs> for TransportConfig {
    fn from(args: TransportArgs) -> Self {
        TransportConfig {
            kind: args.transport,
            buffer_size: args.buffer_size,
        }
    }
}

#[derive(Args)]
struct FormatArgs {
    /// Channel count
    #[arg(long, default_value_t = 2)]
    channels: u16,

    /// Sample rate in Hz
    #[arg(long, default_value_t = 44100)]
    rate: u32,

    /// Bits per sample
    #[arg(long, default_value_t = 16)]
    bits: u16,
}

impl From<FormatArgs> for StreamFormat {
    fn from(args: FormatArgs) -> Self {
        StreamFormat::new(args.channels, args.rate).with_bits(args.bits)
    }
}

#[derive(Subcommand)]
enum CallOp {
    /// Stream a WAV file to a player and play it
    FilePlay {
        file: String,
        #[arg(long)]
        player: String,
        #[arg(long)]
        player_port: String,
        #[arg(long)]
        device: String,
    },
    /// Stop a file playback
    FileStop {
        #[arg(long)]
        player: String,
        #[arg(long)]
        player_port: String,
        #[arg(long)]
        device: String,
        #[arg(long)]
        storage: String,
    },
    /// Record a recorder device into a WAV file on the orchestrator host
    StartRecording {
        file: String,
        #[arg(long)]
        recorder: String,
        #[arg(long)]
        device: String,
        #[arg(long)]
        receive_port: String,
        #[command(flatten)]
        format: FormatArgs,
    },
    /// Stop a file recording
    StopRecording {
        #[arg(long)]
        recorder: String,
        #[arg(long)]
        device: String,
        #[arg(long)]
        receive_port: String,
    },
    /// Bridge a recorder device into a player device
    Bridge {
        #[arg(long)]
        player: String,
        #[arg(long)]
        player_port: String,
        #[arg(long)]
        player_device: String,
        #[arg(long)]
        recorder: String,
        #[arg(long)]
        recorder_device: String,
        #[command(flatten)]
        format: FormatArgs,
    },
    /// Stop a bridge
    StopBridge {
        #[arg(long)]
        player: String,
        #[arg(long)]
        player_port: String,
        #[arg(long)]
        player_device: String,
        #[arg(long)]
        storage: String,
        #[arg(long)]
        recorder: String,
        #[arg(long)]
        recorder_device: String,
    },
    /// Show a player's sessions and buffers
    PlayerState { node: String },
    /// Show a recorder's sessions
    RecorderState { node: String },
    /// Open a receive session on a player
    PlayerReceiveStart {
        #[arg(long)]
        node: String,
        #[arg(long)]
        port: String,
        /// Resume into an existing buffer
        #[arg(long)]
        storage: Option<String>,
    },
    /// Close a player's receive session
    PlayerReceiveStop {
        #[arg(long)]
        node: String,
        #[arg(long)]
        port: String,
    },
    /// Play a player buffer on one of its devices
    PlayerPlay {
        #[arg(long)]
        node: String,
        #[arg(long)]
        storage: String,
        #[arg(long)]
        device: String,
        #[command(flatten)]
        format: FormatArgs,
    },
    /// Stop playback on a player device
    PlayerStop {
        #[arg(long)]
        node: String,
        #[arg(long)]
        device: String,
    },
    /// Discard a player buffer
    PlayerClearStorage {
        #[arg(long)]
        node: String,
        #[arg(long)]
        storage: String,
    },
    /// Start capturing on a recorder device towards `dest`
    RecorderStart {
        #[arg(long)]
        node: String,
        #[arg(long)]
        device: String,
        #[arg(long)]
        dest: String,
        #[command(flatten)]
        format: FormatArgs,
    },
    /// Stop capturing on a recorder device
    RecorderStop {
        #[arg(long)]
        node: String,
        #[arg(long)]
        device: String,
    },
}

impl From<CallOp> for OrchestratorRequest {
    fn from(op: CallOp) -> Self {
        match op {
            CallOp::FilePlay {
                file,
                player,
                player_port,
                device,
            } => OrchestratorRequest::FilePlay {
                file,
                player_node: player,
                player_port,
                device,
            },
            CallOp::FileStop {
                player,
                player_port,
                device,
                storage,
            } => OrchestratorRequest::FileStop {
                player_node: player,
                player_port,
                device,
                storage_id: storage,
            },
            CallOp::StartRecording {
                file,
                recorder,
                device,
                receive_port,
                format,
            } => OrchestratorRequest::StartFileRecording {
                recorder_node: recorder,
                device,
                format: format.into(),
                receive_port,
                file,
            },
            CallOp::StopRecording {
                recorder,
                device,
                receive_port,
            } => OrchestratorRequest::StopFileRecording {
                recorder_node: recorder,
                device,
                receive_port,
            },
            CallOp::Bridge {
                player,
                player_port,
                player_device,
                recorder,
                recorder_device,
                format,
            } => OrchestratorRequest::PlayFromRecorder {
                player_node: player,
                player_port,
                player_device,
                format: format.into(),
                recorder_node: recorder,
                recorder_device,
            },
            CallOp::StopBridge {
                player,
                player_port,
                player_device,
                storage,
                recorder,
                recorder_device,
            } => OrchestratorRequest::StopFromRecorder {
                player_node: player,
                player_port,
                player_device,
                storage_id: storage,
                recorder_node: recorder,
                recorder_device,
            },
            CallOp::PlayerState { node } => OrchestratorRequest::PlayerState { node },
            CallOp::RecorderState { node } => OrchestratorRequest::RecorderState { node },
            CallOp::PlayerReceiveStart {
                node,
                port,
                storage,
            } => OrchestratorRequest::PlayerReceiveStart {
                node,
                port,
                storage_id: storage,
            },
            CallOp::PlayerReceiveStop { node, port } => {
                OrchestratorRequest::PlayerReceiveStop { node, port }
            }
            CallOp::PlayerPlay {
                node,
                storage,
                device,
                format,
            } => OrchestratorRequest::PlayerPlay {
                node,
                storage_id: storage,
                device,
                format: format.into(),
            },
            CallOp::PlayerStop { node, device } => OrchestratorRequest::PlayerStop { node, device },
            CallOp::PlayerClearStorage { node, storage } => {
                OrchestratorRequest::PlayerClearStorage {
                    node,
                    storage_id: storage,
                }
            }
            CallOp::RecorderStart {
                node,
                device,
                dest,
                format,
            } => OrchestratorRequest::RecorderStart {
                node,
                device,
                format: format.into(),
                dest_addr: dest,
            },
            CallOp::RecorderStop { node, device } => {
                OrchestratorRequest::RecorderStop { node, device }
            }
        }
    }
}

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(level.into()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn print_devices(title: &str, devices: &[AudioDevice]) {
    println!("{}:", title);
    if devices.is_empty() {
        println!("  (none)");
    }
    for device in devices {
        let default_marker = if device.is_default { " (default)" } else { "" };
        println!("  - {}{}", device.name, default_marker);
        if !device.supported_sample_rates.is_empty() {
            println!(
                "      rates: {:?} channels: {:?}",
                device.supported_sample_rates, device.supported_channels
            );
        }
    }
}

fn list_devices() {
    print_devices("Input devices", &list_input_devices());
    println!();
    print_devices("Output devices", &list_output_devices());
}

/// Serve `handler` until Ctrl+C, then run `shutdown`
async fn serve<H, F, Fut>(addr: &str, handler: Arc<H>, shutdown: F) -> Result<()>
where
    H: ControlHandler,
    F: FnOnce(Arc<H>) -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let server = ControlServer::bind(addr, handler.clone()).await?;
    let token = CancellationToken::new();
    let server_task = tokio::spawn(server.run(token.clone()));

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    token.cancel();
    shutdown(handler).await;
    server_task.await??;
    Ok(())
}

async fn run_call(host: String, port: u16, timeout_ms: u64, op: CallOp) -> Result<()> {
    let client = ControlClient::new(&host, port, Duration::from_millis(timeout_ms));
    let request: OrchestratorRequest = op.into();
    let response: OrchestratorResponse = client.call(request).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Devices { action } => match action {
            DevicesAction::List => list_devices(),
        },
        Commands::Player { port, transport } => {
            let config = PlayerConfig {
                control_addr: host_port("0.0.0.0", port),
                transport: transport.into(),
            };
            info!("Player node on {} ({} transport)", config.control_addr, config.transport.kind);
            let service = Arc::new(PlayerService::from_config(&config));
            serve(&config.control_addr, service, |service| async move {
                service.shutdown().await
            })
            .await?;
        }
        Commands::Recorder { port, transport } => {
            let config = RecorderConfig {
                control_addr: host_port("0.0.0.0", port),
                transport: transport.into(),
            };
            info!("Recorder node on {} ({} transport)", config.control_addr, config.transport.kind);
            let service = Arc::new(RecorderService::from_config(&config));
            serve(&config.control_addr, service, |service| async move {
                service.shutdown().await
            })
            .await?;
        }
        Commands::Orchestrator {
            port,
            server_ip,
            player_port,
            recorder_port,
            call_timeout_ms,
            transport,
        } => {
            if call_timeout_ms == 0 {
                bail!("--call-timeout-ms must be positive");
            }
            let config = OrchestratorConfig {
                control_addr: host_port("0.0.0.0", port),
                advertise_ip: server_ip.unwrap_or_else(default_advertise_ip),
                player_control_port: player_port,
                recorder_control_port: recorder_port,
                call_timeout: Duration::from_millis(call_timeout_ms),
                send_chunk_size: transport.buffer_size,
                transport: transport.into(),
            };
            info!(
                "Orchestrator on {} advertising {} ({} transport)",
                config.control_addr, config.advertise_ip, config.transport.kind
            );
            let control_addr = config.control_addr.clone();
            let orchestrator = Arc::new(Orchestrator::from_config(config));
            serve(&control_addr, orchestrator, |orchestrator| async move {
                orchestrator.shutdown().await
            })
            .await?;
        }
        Commands::Call {
            host,
            port,
            timeout_ms,
            op,
        } => {
            run_call(host, port, timeout_ms, op).await?;
        }
    }

    Ok(())
}
