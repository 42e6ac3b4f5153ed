//! Recognition Link CLI
//!
//! Connects to a sensing device and prints its live classification results.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use crossbeam_channel::RecvTimeoutError;
use recognition_link::{
    create_shared_stats, ChannelObserver, Config, ConfigReconciler, ConnectRequest,
    ConnectionStateMachine, DataSource, DeviceBoundary, DeviceConfig, DeviceMode, SessionEnd,
    SessionEvent, SimulatedDevice, SimulatorConfig, VERSION,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[cfg(feature = "gateway")]
use recognition_link::{GatewayConfig, HttpGateway};

/// Field summarised across the sliding window.
const CLASSIFICATION_FIELD: &str = "Classification";

#[derive(Parser)]
#[command(name = "recognition-link")]
#[command(version = VERSION)]
#[command(about = "Live classification results from sensing devices", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to a device and stream its classification results
    Run(RunArgs),

    /// Show the device configuration reported by the gateway
    Status,

    /// Disconnect the device
    Disconnect,

    /// Show client configuration
    Config,

    /// Set the default sliding window length
    SetWindow {
        /// Number of recent results to keep (1-10)
        length: usize,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Device to connect to
    #[arg(long)]
    device_id: String,

    /// Data source (serial, ble, tcpip, test, microphone)
    #[arg(long, default_value = "serial")]
    source: DataSource,

    /// Device mode (recognition or data-capture)
    #[arg(long, default_value = "recognition")]
    mode: DeviceMode,

    /// Serial baud rate
    #[arg(long)]
    baud_rate: Option<u32>,

    /// Sample rate in Hz
    #[arg(long)]
    sample_rate: Option<u32>,

    /// Sliding window length (defaults to the configured value)
    #[arg(long)]
    window: Option<usize>,

    /// Use the in-process simulated device instead of the gateway
    #[arg(long)]
    simulate: bool,

    /// Stop after this many simulated results
    #[arg(long, requires = "simulate")]
    limit: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config ({e}), using defaults");
        Config::default()
    });
    init_logging(&config);

    match cli.command {
        Commands::Run(args) => cmd_run(args, &config).await,
        Commands::Status => cmd_status(&config).await,
        Commands::Disconnect => cmd_disconnect(&config).await,
        Commands::Config => cmd_config(&config),
        Commands::SetWindow { length } => cmd_set_window(config, length),
    }
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn cmd_run(args: RunArgs, config: &Config) -> Result<()> {
    println!("Recognition Link v{VERSION}");
    println!();

    let boundary: Arc<dyn DeviceBoundary> = if args.simulate {
        Arc::new(SimulatedDevice::new(SimulatorConfig {
            result_limit: args.limit,
            ..SimulatorConfig::default()
        }))
    } else {
        gateway_boundary(config)?
    };

    let window_length = args.window.unwrap_or(config.window_length);
    let stats = create_shared_stats();
    let machine = ConnectionStateMachine::new(boundary, window_length, Arc::clone(&stats))?;

    let mut request = ConnectRequest::new(args.device_id, args.source, args.mode);
    if let Some(baud_rate) = args.baud_rate {
        request = request.with_baud_rate(baud_rate);
    }
    if let Some(sample_rate) = args.sample_rate {
        request = request.with_sample_rate(sample_rate);
    }

    let device = machine.connect(request).await.context("Connect failed")?;
    print_device(&device);
    println!("  Window length: {window_length}");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let (observer, events) = ChannelObserver::new();
    let session = match machine.start_stream(vec![observer]).await {
        Ok(session) => session,
        Err(e) => {
            let _ = machine.disconnect().await;
            bail!("Could not start result stream: {e}");
        }
    };

    let printer = tokio::task::spawn_blocking(move || loop {
        match events.recv_timeout(Duration::from_millis(200)) {
            Ok(SessionEvent::Record { record, window, .. }) => {
                let value = record
                    .field(CLASSIFICATION_FIELD)
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "-".to_string());
                let majority = window
                    .majority(CLASSIFICATION_FIELD)
                    .map(|(v, count)| format!("{v} ({count}/{})", window.len()))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "[{}] #{} {CLASSIFICATION_FIELD}: {value} | window: {majority}",
                    record.received_at.format("%H:%M:%S%.3f"),
                    record.sequence
                );
            }
            Ok(SessionEvent::WindowResized { window, .. }) => {
                println!("Window resized to {}", window.capacity);
            }
            Ok(SessionEvent::Ended { end, .. }) => return end,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return SessionEnd::Cancelled,
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            println!();
            println!("Stopping stream...");
            machine.stop_stream();
        }
        end = session.closed() => {
            tracing::debug!(?end, "Session finished on its own");
        }
    }

    match printer.await {
        Ok(SessionEnd::Failed(e)) => eprintln!("Stream failed: {e}"),
        Ok(SessionEnd::Completed) => println!("Stream ended"),
        Ok(SessionEnd::Cancelled) => println!("Stream stopped"),
        Err(e) => eprintln!("Result printer failed: {e}"),
    }

    if let Err(e) = machine.disconnect().await {
        eprintln!("Warning: Disconnect failed: {e}");
    }

    println!();
    println!("{}", stats.summary());
    Ok(())
}

async fn cmd_status(config: &Config) -> Result<()> {
    let boundary = gateway_boundary(config)?;
    let snapshot = boundary
        .config()
        .await
        .context("Could not read device configuration")?;
    let device = ConfigReconciler::apply(&DeviceConfig::default(), &snapshot);

    println!("Recognition Link Status");
    println!("=======================");
    println!();
    println!("Gateway: {}", config.gateway_url);
    println!();
    println!("{}", serde_json::to_string_pretty(&device)?);
    Ok(())
}

async fn cmd_disconnect(config: &Config) -> Result<()> {
    let boundary = gateway_boundary(config)?;
    boundary.disconnect().await.context("Disconnect failed")?;
    println!("Device disconnected.");
    Ok(())
}

fn cmd_config(config: &Config) -> Result<()> {
    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

fn cmd_set_window(mut config: Config, length: usize) -> Result<()> {
    config
        .set_window_length(length)
        .context("Invalid window length")?;
    config.save().context("Error saving config")?;
    println!("Default window length set to {length}.");
    Ok(())
}

fn print_device(device: &DeviceConfig) {
    println!(
        "Device: {}",
        if device.device_id.is_empty() {
            "(none)"
        } else {
            &device.device_id
        }
    );
    println!("  Connected: {}", device.connected);
    println!("  Source: {}", device.source);
    println!("  Mode: {}", device.mode);
    if let Some(baud_rate) = device.baud_rate {
        println!("  Baud rate: {baud_rate}");
    }
    if let Some(sample_rate) = device.sample_rate {
        println!("  Sample rate: {sample_rate} Hz");
    }
    if !device.columns.is_empty() {
        let columns: Vec<&str> = device.columns.iter().map(String::as_str).collect();
        println!("  Columns: {}", columns.join(", "));
    }
    if let Some(protocol) = &device.protocol {
        println!("  Protocol: {protocol}");
    }
}

#[cfg(feature = "gateway")]
fn gateway_boundary(config: &Config) -> Result<Arc<dyn DeviceBoundary>> {
    let gateway = HttpGateway::new(GatewayConfig::new(
        config.gateway_url.as_str(),
        config.request_timeout,
    ))?;
    Ok(Arc::new(gateway))
}

#[cfg(not(feature = "gateway"))]
fn gateway_boundary(_config: &Config) -> Result<Arc<dyn DeviceBoundary>> {
    bail!("Gateway support not enabled at compile time; use --simulate")
}
