//! Connection lifecycle and stream gating.
//!
//! ```text
//!                 connect                 snapshot(connected)
//!  Disconnected ──────────▶ Connecting ──────────────────────▶ Connected
//!       ▲                       │  snapshot(!connected)             │
//!       │                       │  or boundary failure              │
//!       │                       ▼                                   │
//!       │      connect        Error ◀── snapshot(!connected) ───────┤
//!       │   ┌──────────────────┘                                   │
//!       │   ▼                                                      │
//!       └── (Connecting)                     disconnect ───────────┘
//! ```
//!
//! Only one connect/disconnect/refresh request may be in flight; a second
//! one is rejected as busy rather than queued. The [`DeviceConfig`] is
//! replaced as a whole under a write lock, so readers always see either the
//! old or the new value.

use crate::device::boundary::{BoundaryError, DeviceBoundary, TransportError};
use crate::device::reconcile::ConfigReconciler;
use crate::device::types::{ConfigSnapshot, ConnectRequest, DeviceConfig, DeviceMode};
use crate::error::{validate_window_length, ErrorKind, ValidationError};
use crate::session::{SessionError, SessionObserver, SessionState, StreamSession};
use crate::stats::SharedIngestStats;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Connection lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error { reason: String },
}

impl ConnectionState {
    pub fn name(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Error { .. } => "Error",
        }
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::Disconnected
    }
}

/// Immutable copy of the connection state and device configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub config: DeviceConfig,
}

/// Receives every connection status change.
pub trait ConnectionObserver: Send + Sync {
    fn on_status(&self, status: &ConnectionStatus);
}

/// Errors from connection requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// The request itself is invalid
    Validation(ValidationError),
    /// The device side reported a failure
    Boundary(BoundaryError),
    /// The result stream could not be opened
    Transport(TransportError),
    /// Another request is in flight
    Busy,
    /// Not allowed from the current state
    InvalidState {
        action: &'static str,
        state: &'static str,
    },
    /// A stream session is already running
    StreamActive,
    /// Results only stream while the device is in recognition mode
    NotRecognitionMode { mode: DeviceMode },
}

impl ConnectionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConnectionError::Validation(_) => ErrorKind::Validation,
            ConnectionError::Boundary(_) => ErrorKind::Boundary,
            ConnectionError::Transport(_) => ErrorKind::Transport,
            ConnectionError::Busy => ErrorKind::Busy,
            ConnectionError::InvalidState { .. }
            | ConnectionError::StreamActive
            | ConnectionError::NotRecognitionMode { .. } => ErrorKind::State,
        }
    }
}

impl std::fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionError::Validation(e) => write!(f, "{e}"),
            ConnectionError::Boundary(e) => write!(f, "{e}"),
            ConnectionError::Transport(e) => write!(f, "{e}"),
            ConnectionError::Busy => write!(f, "Another connection request is in progress"),
            ConnectionError::InvalidState { action, state } => {
                write!(f, "Cannot {action} while {state}")
            }
            ConnectionError::StreamActive => write!(f, "A result stream is already active"),
            ConnectionError::NotRecognitionMode { mode } => {
                write!(f, "Device is in {mode} mode; results require RECOGNITION")
            }
        }
    }
}

impl std::error::Error for ConnectionError {}

impl From<ValidationError> for ConnectionError {
    fn from(e: ValidationError) -> Self {
        ConnectionError::Validation(e)
    }
}

impl From<BoundaryError> for ConnectionError {
    fn from(e: BoundaryError) -> Self {
        ConnectionError::Boundary(e)
    }
}

/// Releases the single-flight slot when dropped.
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Tracks the device connection and gates stream sessions.
pub struct ConnectionStateMachine {
    boundary: Arc<dyn DeviceBoundary>,
    status: RwLock<ConnectionStatus>,
    in_flight: AtomicBool,
    session: Mutex<Option<Arc<StreamSession>>>,
    window_length: AtomicUsize,
    observers: RwLock<Vec<Arc<dyn ConnectionObserver>>>,
    stats: SharedIngestStats,
}

impl ConnectionStateMachine {
    pub fn new(
        boundary: Arc<dyn DeviceBoundary>,
        window_length: usize,
        stats: SharedIngestStats,
    ) -> Result<Self, ValidationError> {
        validate_window_length(window_length)?;
        Ok(Self {
            boundary,
            status: RwLock::new(ConnectionStatus::default()),
            in_flight: AtomicBool::new(false),
            session: Mutex::new(None),
            window_length: AtomicUsize::new(window_length),
            observers: RwLock::new(Vec::new()),
            stats,
        })
    }

    /// Register an observer for status changes.
    pub fn subscribe(&self, observer: Arc<dyn ConnectionObserver>) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    /// Current status.
    pub fn status(&self) -> ConnectionStatus {
        self.status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.status().state
    }

    pub fn config(&self) -> DeviceConfig {
        self.status().config
    }

    pub fn stats(&self) -> &SharedIngestStats {
        &self.stats
    }

    /// Connect with the given settings.
    ///
    /// An invalid request is rejected before anything else happens.
    pub async fn connect(&self, request: ConnectRequest) -> Result<DeviceConfig, ConnectionError> {
        request.validate()?;
        let _guard = self.begin_request()?;

        let current = self.state();
        if !matches!(
            current,
            ConnectionState::Disconnected | ConnectionState::Error { .. }
        ) {
            return Err(ConnectionError::InvalidState {
                action: "connect",
                state: current.name(),
            });
        }

        tracing::info!(
            device_id = %request.device_id,
            source = %request.source,
            mode = %request.mode,
            "Connecting"
        );
        self.replace_status(ConnectionStatus {
            state: ConnectionState::Connecting,
            config: DeviceConfig::from_request(&request),
        });

        match self.boundary.connect(&request).await {
            Ok(snapshot) => {
                let status = self.apply_snapshot(&snapshot);
                match status.state {
                    ConnectionState::Connected => Ok(status.config),
                    ConnectionState::Error { reason } => {
                        Err(ConnectionError::Boundary(BoundaryError::new(reason)))
                    }
                    other => Err(ConnectionError::InvalidState {
                        action: "connect",
                        state: other.name(),
                    }),
                }
            }
            Err(e) => {
                tracing::warn!("Connect failed: {}", e);
                self.enter_error(e.message.clone());
                Err(ConnectionError::Boundary(e))
            }
        }
    }

    /// Disconnect, tearing down any active stream session.
    ///
    /// The device configuration is reset to defaults.
    pub async fn disconnect(&self) -> Result<DeviceConfig, ConnectionError> {
        let _guard = self.begin_request()?;

        if self.state() == ConnectionState::Disconnected {
            return Ok(self.config());
        }

        self.stop_stream();

        match self.boundary.disconnect().await {
            Ok(snapshot) => {
                if snapshot.streaming == Some(true) {
                    tracing::warn!("Device still reports streaming after disconnect");
                }
                tracing::info!("Disconnected");
                let status = ConnectionStatus::default();
                self.replace_status(status.clone());
                self.stop_stream();
                Ok(status.config)
            }
            Err(e) => {
                tracing::warn!("Disconnect failed: {}", e);
                self.enter_error(e.message.clone());
                Err(ConnectionError::Boundary(e))
            }
        }
    }

    /// Query the device configuration and reconcile it.
    ///
    /// A failed query leaves the state as it was.
    pub async fn refresh(&self) -> Result<ConnectionStatus, ConnectionError> {
        let _guard = self.begin_request()?;
        let snapshot = self.boundary.config().await.map_err(|e| {
            tracing::warn!("Config query failed: {}", e);
            ConnectionError::Boundary(e)
        })?;
        Ok(self.apply_snapshot(&snapshot))
    }

    /// Reconcile a snapshot received from the device side.
    ///
    /// Completes a pending connect; a `connected=false` snapshot while
    /// connected moves to `Error` and cancels the active stream.
    pub fn apply_snapshot(&self, snapshot: &ConfigSnapshot) -> ConnectionStatus {
        let (previous, status) = {
            let mut status = self.status.write().unwrap_or_else(PoisonError::into_inner);
            let config = ConfigReconciler::apply(&status.config, snapshot);
            let state = match (&status.state, config.connected) {
                (ConnectionState::Connecting, true) => ConnectionState::Connected,
                (ConnectionState::Connecting, false) => ConnectionState::Error {
                    reason: "device reported not connected".to_string(),
                },
                (ConnectionState::Connected, false) => ConnectionState::Error {
                    reason: "device reported disconnected".to_string(),
                },
                (state, _) => state.clone(),
            };
            let previous = std::mem::replace(&mut status.state, state);
            status.config = config;
            (previous, status.clone())
        };

        if previous != status.state {
            tracing::info!(
                from = previous.name(),
                to = status.state.name(),
                "Connection state changed"
            );
        }
        if previous == ConnectionState::Connected && status.state != ConnectionState::Connected {
            self.stop_stream();
        }
        self.notify(&status);
        status
    }

    /// Start a stream session. Requires `Connected` and recognition mode.
    ///
    /// Rejected as busy while a connect/disconnect/refresh is in flight. A
    /// session whose connection is lost while it opens is cancelled before
    /// this returns.
    pub async fn start_stream(
        &self,
        observers: Vec<Arc<dyn SessionObserver>>,
    ) -> Result<Arc<StreamSession>, ConnectionError> {
        if self.in_flight.load(Ordering::Acquire) {
            return Err(ConnectionError::Busy);
        }
        let status = self.status();
        if status.state != ConnectionState::Connected {
            return Err(ConnectionError::InvalidState {
                action: "start streaming",
                state: status.state.name(),
            });
        }
        if status.config.mode != DeviceMode::Recognition {
            return Err(ConnectionError::NotRecognitionMode {
                mode: status.config.mode,
            });
        }

        let session = Arc::new(StreamSession::new(
            self.window_length.load(Ordering::SeqCst),
            observers,
            Arc::clone(&self.stats),
        )?);
        {
            let mut slot = self.session.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(existing) = slot.as_ref() {
                if matches!(existing.state(), SessionState::Idle | SessionState::Active) {
                    return Err(ConnectionError::StreamActive);
                }
            }
            *slot = Some(Arc::clone(&session));
        }

        if let Err(e) = session.start(self.boundary.as_ref()).await {
            self.release_session(&session);
            return Err(match e {
                SessionError::Transport(e) => ConnectionError::Transport(e),
                SessionError::Validation(e) => ConnectionError::Validation(e),
                // cancelled by a disconnect while the stream was opening
                SessionError::NotIdle { state } => ConnectionError::InvalidState {
                    action: "start streaming",
                    state: state.name(),
                },
            });
        }

        // The connection may have been torn down after the slot was filled
        let state = self.state();
        if state != ConnectionState::Connected {
            session.cancel();
            self.release_session(&session);
            return Err(ConnectionError::InvalidState {
                action: "start streaming",
                state: state.name(),
            });
        }
        Ok(session)
    }

    fn release_session(&self, session: &Arc<StreamSession>) {
        let mut slot = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|s| Arc::ptr_eq(s, session)) {
            *slot = None;
        }
    }

    /// Cancel the active stream session, if any. Returns whether one was cancelled.
    pub fn stop_stream(&self) -> bool {
        let session = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        session.map(|s| s.cancel()).unwrap_or(false)
    }

    /// The most recent stream session.
    pub fn session(&self) -> Option<Arc<StreamSession>> {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Set the window length for the active and all future sessions.
    pub fn set_window_length(&self, length: usize) -> Result<(), ValidationError> {
        validate_window_length(length)?;
        self.window_length.store(length, Ordering::SeqCst);
        if let Some(session) = self.session() {
            if session.is_active() {
                session.set_window_length(length)?;
            }
        }
        Ok(())
    }

    pub fn window_length(&self) -> usize {
        self.window_length.load(Ordering::SeqCst)
    }

    fn begin_request(&self) -> Result<InFlightGuard<'_>, ConnectionError> {
        self.in_flight
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .map_err(|_| ConnectionError::Busy)?;
        Ok(InFlightGuard {
            flag: &self.in_flight,
        })
    }

    fn enter_error(&self, reason: String) {
        let config = self.config();
        self.replace_status(ConnectionStatus {
            state: ConnectionState::Error { reason },
            config,
        });
        self.stop_stream();
    }

    fn replace_status(&self, status: ConnectionStatus) {
        {
            let mut current = self.status.write().unwrap_or_else(PoisonError::into_inner);
            if current.state != status.state {
                tracing::info!(
                    from = current.state.name(),
                    to = status.state.name(),
                    "Connection state changed"
                );
            }
            *current = status.clone();
        }
        self.notify(&status);
    }

    fn notify(&self, status: &ConnectionStatus) {
        let observers = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for observer in observers {
            observer.on_status(status);
        }
    }
}
