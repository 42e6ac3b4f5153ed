//! Integration tests for the connection state machine.

use async_trait::async_trait;
use recognition_link::{
    create_shared_stats, BoundaryError, ByteStream, ChannelObserver, ChannelStream,
    ConfigSnapshot, ConnectRequest, ConnectionError, ConnectionObserver, ConnectionState,
    ConnectionStateMachine, ConnectionStatus, DataSource, DeviceBoundary, DeviceMode, ErrorKind,
    SessionEnd, SessionEvent, SessionState, SimulatedDevice, TransportError, TEST_IMU_DEVICE,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Boundary that answers slowly and hands out pre-built streams.
struct SlowBoundary {
    delay: Duration,
    disconnect_delay: Duration,
    open_delay: Duration,
    reports_streaming: bool,
    streams: Mutex<Vec<ChannelStream>>,
}

impl SlowBoundary {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            disconnect_delay: Duration::ZERO,
            open_delay: Duration::ZERO,
            reports_streaming: true,
            streams: Mutex::new(Vec::new()),
        }
    }

    fn with_disconnect_delay(mut self, delay: Duration) -> Self {
        self.disconnect_delay = delay;
        self
    }

    fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    fn reporting_not_streaming(mut self) -> Self {
        self.reports_streaming = false;
        self
    }

    fn push_stream(&self, stream: ChannelStream) {
        self.streams.lock().unwrap().push(stream);
    }

    fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot {
            streaming: Some(self.reports_streaming),
            mode: Some(DeviceMode::Recognition),
            device_id: Some("bench".to_string()),
            ..ConfigSnapshot::default()
        }
    }
}

#[async_trait]
impl DeviceBoundary for SlowBoundary {
    async fn connect(&self, _request: &ConnectRequest) -> Result<ConfigSnapshot, BoundaryError> {
        tokio::time::sleep(self.delay).await;
        Ok(self.snapshot())
    }

    async fn disconnect(&self) -> Result<ConfigSnapshot, BoundaryError> {
        tokio::time::sleep(self.disconnect_delay).await;
        Ok(ConfigSnapshot {
            streaming: Some(false),
            ..ConfigSnapshot::default()
        })
    }

    async fn config(&self) -> Result<ConfigSnapshot, BoundaryError> {
        Ok(self.snapshot())
    }

    async fn open_stream(&self) -> Result<Box<dyn ByteStream>, TransportError> {
        tokio::time::sleep(self.open_delay).await;
        self.streams
            .lock()
            .unwrap()
            .pop()
            .map(|stream| Box::new(stream) as Box<dyn ByteStream>)
            .ok_or_else(|| TransportError::new("no stream available"))
    }
}

/// Observer that keeps every status it is told about.
#[derive(Default)]
struct RecordingObserver {
    statuses: Mutex<Vec<ConnectionStatus>>,
}

impl RecordingObserver {
    fn state_names(&self) -> Vec<&'static str> {
        self.statuses
            .lock()
            .unwrap()
            .iter()
            .map(|status| status.state.name())
            .collect()
    }
}

impl ConnectionObserver for RecordingObserver {
    fn on_status(&self, status: &ConnectionStatus) {
        self.statuses.lock().unwrap().push(status.clone());
    }
}

fn recognition_request(device_id: &str) -> ConnectRequest {
    ConnectRequest::new(device_id, DataSource::Serial, DeviceMode::Recognition)
        .with_baud_rate(115_200)
}

#[tokio::test]
async fn test_concurrent_connect_is_rejected_as_busy() {
    let machine = Arc::new(
        ConnectionStateMachine::new(
            Arc::new(SlowBoundary::new(Duration::from_millis(100))),
            1,
            create_shared_stats(),
        )
        .unwrap(),
    );

    let first = {
        let machine = Arc::clone(&machine);
        tokio::spawn(async move { machine.connect(recognition_request("bench")).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(machine.state(), ConnectionState::Connecting);

    let second = machine.connect(recognition_request("bench")).await;
    assert_eq!(second, Err(ConnectionError::Busy));
    assert_eq!(second.unwrap_err().kind(), ErrorKind::Busy);

    let config = first.await.unwrap().unwrap();
    assert!(config.connected);
    assert_eq!(config.baud_rate, Some(115_200));
    assert_eq!(machine.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_empty_device_id_is_rejected_without_state_change() {
    let machine = ConnectionStateMachine::new(
        Arc::new(SimulatedDevice::default()),
        1,
        create_shared_stats(),
    )
    .unwrap();

    let err = machine.connect(recognition_request("")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(machine.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_unknown_device_moves_to_error_and_can_retry() {
    let machine = ConnectionStateMachine::new(
        Arc::new(SimulatedDevice::default()),
        1,
        create_shared_stats(),
    )
    .unwrap();

    let err = machine
        .connect(recognition_request("Unknown Board"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Boundary);
    assert!(matches!(machine.state(), ConnectionState::Error { .. }));

    let config = machine
        .connect(recognition_request(TEST_IMU_DEVICE))
        .await
        .unwrap();
    assert_eq!(config.columns.len(), 6);
    assert_eq!(machine.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_disconnect_cancels_active_session() {
    let boundary = Arc::new(SlowBoundary::new(Duration::ZERO));
    let (sender, stream) = ChannelStream::new(16);
    boundary.push_stream(stream);

    let machine =
        ConnectionStateMachine::new(boundary.clone(), 3, create_shared_stats()).unwrap();
    machine.connect(recognition_request("bench")).await.unwrap();

    let (observer, events) = ChannelObserver::new();
    let session = machine.start_stream(vec![observer]).await.unwrap();
    sender.send(Ok(b"{\"Classification\":2}\n".to_vec())).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    // A second stream is refused while the first is running
    assert_eq!(
        machine.start_stream(Vec::new()).await.err(),
        Some(ConnectionError::StreamActive)
    );

    machine.disconnect().await.unwrap();
    assert_eq!(machine.state(), ConnectionState::Disconnected);
    assert_eq!(session.end(), Some(SessionEnd::Cancelled));

    let _ = sender.send(Ok(b"{\"Classification\":3}\n".to_vec())).await;
    session.closed().await;
    assert_eq!(session.state(), SessionState::Closed);

    let records = events
        .try_iter()
        .filter(|event| matches!(event, SessionEvent::Record { .. }))
        .count();
    assert_eq!(records, 1);
}

#[tokio::test]
async fn test_pushed_disconnect_snapshot_moves_to_error() {
    let machine = ConnectionStateMachine::new(
        Arc::new(SlowBoundary::new(Duration::ZERO)),
        1,
        create_shared_stats(),
    )
    .unwrap();
    machine.connect(recognition_request("bench")).await.unwrap();

    let status = machine.apply_snapshot(&ConfigSnapshot {
        streaming: Some(false),
        ..ConfigSnapshot::default()
    });
    assert!(matches!(status.state, ConnectionState::Error { .. }));
    assert_eq!(status.config.device_id, "bench");
    assert!(!status.config.connected);
}

#[tokio::test]
async fn test_observer_sees_connect_and_disconnect_transitions() {
    let machine = ConnectionStateMachine::new(
        Arc::new(SlowBoundary::new(Duration::ZERO)),
        1,
        create_shared_stats(),
    )
    .unwrap();
    let observer = Arc::new(RecordingObserver::default());
    machine.subscribe(observer.clone());

    machine.connect(recognition_request("bench")).await.unwrap();
    machine.disconnect().await.unwrap();

    assert_eq!(
        observer.state_names(),
        vec!["Connecting", "Connected", "Disconnected"]
    );
    let statuses = observer.statuses.lock().unwrap();
    assert_eq!(statuses[0].config.baud_rate, Some(115_200));
    assert!(statuses[1].config.connected);
    assert_eq!(statuses[2].config.device_id, "");
}

#[tokio::test]
async fn test_connect_answered_not_streaming_moves_to_error() {
    let machine = ConnectionStateMachine::new(
        Arc::new(SlowBoundary::new(Duration::ZERO).reporting_not_streaming()),
        1,
        create_shared_stats(),
    )
    .unwrap();
    let observer = Arc::new(RecordingObserver::default());
    machine.subscribe(observer.clone());

    let err = machine
        .connect(recognition_request("bench"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Boundary);
    assert_eq!(
        machine.state(),
        ConnectionState::Error {
            reason: "device reported not connected".to_string()
        }
    );
    assert_eq!(observer.state_names(), vec!["Connecting", "Error"]);
}

#[tokio::test]
async fn test_stream_start_during_disconnect_is_busy() {
    let boundary = Arc::new(
        SlowBoundary::new(Duration::ZERO).with_disconnect_delay(Duration::from_millis(100)),
    );
    let (_sender, stream) = ChannelStream::new(4);
    boundary.push_stream(stream);
    let machine = Arc::new(
        ConnectionStateMachine::new(boundary, 1, create_shared_stats()).unwrap(),
    );
    machine.connect(recognition_request("bench")).await.unwrap();

    let disconnecting = {
        let machine = Arc::clone(&machine);
        tokio::spawn(async move { machine.disconnect().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(machine.state(), ConnectionState::Connected);

    let err = machine.start_stream(Vec::new()).await.unwrap_err();
    assert_eq!(err, ConnectionError::Busy);

    disconnecting.await.unwrap().unwrap();
    assert_eq!(machine.state(), ConnectionState::Disconnected);
    assert!(machine.session().map_or(true, |s| !s.is_active()));
}

#[tokio::test]
async fn test_disconnect_while_stream_opens_leaves_no_session() {
    let boundary =
        Arc::new(SlowBoundary::new(Duration::ZERO).with_open_delay(Duration::from_millis(100)));
    let (sender, stream) = ChannelStream::new(4);
    boundary.push_stream(stream);
    let machine = Arc::new(
        ConnectionStateMachine::new(boundary, 1, create_shared_stats()).unwrap(),
    );
    machine.connect(recognition_request("bench")).await.unwrap();

    let (observer, events) = ChannelObserver::new();
    let starting = {
        let machine = Arc::clone(&machine);
        tokio::spawn(async move { machine.start_stream(vec![observer]).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    machine.disconnect().await.unwrap();

    let err = starting.await.unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);
    assert_eq!(machine.state(), ConnectionState::Disconnected);
    assert!(machine.session().is_none());

    // Nothing is ingested from the stream that finished opening late
    let _ = sender.send(Ok(b"{\"Classification\":1}\n".to_vec())).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(events
        .try_iter()
        .all(|event| !matches!(event, SessionEvent::Record { .. })));
}
