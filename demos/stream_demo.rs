//! Demonstration of Recognition Link result streaming.
//!
//! This example shows how to:
//! 1. Connect to a device through the connection state machine
//! 2. Start a stream session and receive records
//! 3. Read the sliding window majority
//! 4. Resize the window while streaming
//! 5. Stop the stream and disconnect
//! 6. Follow connection state changes through an observer
//!
//! Run with: cargo run --example stream_demo
//!
//! Uses the in-process simulated device, so no gateway or hardware is needed.

use std::sync::Arc;
use std::time::Duration;

use recognition_link::{
    create_shared_stats, ChannelObserver, ConnectRequest, ConnectionObserver,
    ConnectionStateMachine, ConnectionStatus, DataSource, DeviceMode, SessionEvent,
    SimulatedDevice, SimulatorConfig, TEST_IMU_DEVICE,
};

/// Prints each connection state change.
struct StatusPrinter;

impl ConnectionObserver for StatusPrinter {
    fn on_status(&self, status: &ConnectionStatus) {
        println!("[status] {}", status.state.name());
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Recognition Link - Stream Demo");
    println!("==============================");
    println!();

    let device = SimulatedDevice::new(SimulatorConfig {
        tick: Duration::from_millis(50),
        result_limit: Some(40),
    });
    let stats = create_shared_stats();
    let machine = ConnectionStateMachine::new(Arc::new(device), 5, Arc::clone(&stats))?;
    machine.subscribe(Arc::new(StatusPrinter));

    let config = machine
        .connect(ConnectRequest::new(
            TEST_IMU_DEVICE,
            DataSource::Test,
            DeviceMode::Recognition,
        ))
        .await?;
    println!("Connected to {}", config.device_id);
    println!("  Columns: {:?}", config.columns);
    println!("  Sample rate: {:?} Hz", config.sample_rate);
    println!();

    let (observer, events) = ChannelObserver::new();
    let session = machine.start_stream(vec![observer]).await?;

    let mut received = 0;
    while received < 20 {
        match events.recv_timeout(Duration::from_secs(2)) {
            Ok(SessionEvent::Record { record, window, .. }) => {
                received += 1;
                let majority = window.majority("Classification");
                println!(
                    "#{:>3} Classification: {} | window {:?} majority: {:?}",
                    record.sequence,
                    record.field("Classification").cloned().unwrap_or_default(),
                    window.sequences(),
                    majority
                );

                if received == 10 {
                    println!();
                    println!("Shrinking window to 2...");
                    machine.set_window_length(2)?;
                }
            }
            Ok(SessionEvent::WindowResized { window, .. }) => {
                println!("Window now holds {:?}", window.sequences());
                println!();
            }
            Ok(SessionEvent::Ended { end, .. }) => {
                println!("Stream ended: {end:?}");
                break;
            }
            Err(_) => {
                println!("No result within timeout");
                break;
            }
        }
    }

    println!();
    println!("Stopping stream...");
    machine.stop_stream();
    println!("Session ended as {:?}", session.closed().await);

    machine.disconnect().await?;
    println!("Disconnected");
    println!();
    println!("{}", stats.summary());

    Ok(())
}
