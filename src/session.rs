//! Stream sessions: one ingestion run from start to terminal close.
//!
//! ```text
//!  Idle ──start──▶ Active ──end of stream / read error──▶ Draining ──▶ Closed
//!                    │
//!                    └──────────cancel──────────▶ Cancelled ──▶ Closed
//! ```
//!
//! Each session owns a fresh [`IngestPipeline`] (new sequence counter, empty
//! window) and drives it from a single tokio task, so frames are decoded in
//! arrival order. Observers get immutable snapshots only.
//!
//! Delivery to observers and the transition to `Cancelled` take the same
//! lock, so once [`StreamSession::cancel`] returns no further record is
//! delivered, even if chunks are still buffered in the transport.

use crate::core::{Delivery, EventRecord, IngestPipeline, WindowSnapshot};
use crate::device::boundary::{ByteStream, DeviceBoundary, TransportError};
use crate::error::{validate_window_length, ErrorKind, ValidationError};
use crate::stats::SharedIngestStats;
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Lifecycle state of a stream session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Idle,
    Active,
    Draining,
    Cancelled,
    Closed,
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::Active => "Active",
            SessionState::Draining => "Draining",
            SessionState::Cancelled => "Cancelled",
            SessionState::Closed => "Closed",
        }
    }
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The transport signalled end of stream
    Completed,
    /// The transport failed mid-read
    Failed(TransportError),
    /// Stopped by request
    Cancelled,
}

impl SessionEnd {
    pub fn is_error(&self) -> bool {
        matches!(self, SessionEnd::Failed(_))
    }
}

/// Receives session output.
///
/// Callbacks run on the session task while the session lock is held; they
/// must not call back into the same session.
pub trait SessionObserver: Send + Sync {
    /// A record was accepted; `delivery.window` is the window after it.
    fn on_record(&self, session: Uuid, delivery: &Delivery);

    /// The window length changed and the window was re-trimmed.
    fn on_window_resized(&self, _session: Uuid, _window: &WindowSnapshot) {}

    /// The session stopped delivering records.
    fn on_end(&self, session: Uuid, end: &SessionEnd);
}

/// Session output as a message.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Record {
        session: Uuid,
        record: Arc<EventRecord>,
        window: WindowSnapshot,
    },
    WindowResized {
        session: Uuid,
        window: WindowSnapshot,
    },
    Ended {
        session: Uuid,
        end: SessionEnd,
    },
}

/// Observer that forwards every event into a crossbeam channel.
pub struct ChannelObserver {
    sender: Sender<SessionEvent>,
}

impl ChannelObserver {
    /// Create an observer and the receiver for its events.
    pub fn new() -> (Arc<Self>, Receiver<SessionEvent>) {
        let (sender, receiver) = unbounded();
        (Arc::new(Self { sender }), receiver)
    }

    fn send(&self, event: SessionEvent) {
        // A dropped receiver just means nobody is listening any more
        let _ = self.sender.send(event);
    }
}

impl SessionObserver for ChannelObserver {
    fn on_record(&self, session: Uuid, delivery: &Delivery) {
        self.send(SessionEvent::Record {
            session,
            record: Arc::clone(&delivery.record),
            window: delivery.window.clone(),
        });
    }

    fn on_window_resized(&self, session: Uuid, window: &WindowSnapshot) {
        self.send(SessionEvent::WindowResized {
            session,
            window: window.clone(),
        });
    }

    fn on_end(&self, session: Uuid, end: &SessionEnd) {
        self.send(SessionEvent::Ended {
            session,
            end: end.clone(),
        });
    }
}

/// Errors starting a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Sessions are single-use; this one already left `Idle`
    NotIdle { state: SessionState },
    /// The byte stream could not be opened
    Transport(TransportError),
    /// The configured window length is out of range
    Validation(ValidationError),
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::NotIdle { .. } => ErrorKind::State,
            SessionError::Transport(_) => ErrorKind::Transport,
            SessionError::Validation(e) => e.kind(),
        }
    }
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::NotIdle { state } => {
                write!(f, "Session cannot start from state {}", state.name())
            }
            SessionError::Transport(e) => write!(f, "Could not open stream: {e}"),
            SessionError::Validation(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for SessionError {}

struct Lifecycle {
    state: SessionState,
    end: Option<SessionEnd>,
}

/// State shared between the session handle and its ingest task.
struct SessionShared {
    id: Uuid,
    lifecycle: Mutex<Lifecycle>,
    observers: Vec<Arc<dyn SessionObserver>>,
    stats: SharedIngestStats,
}

impl SessionShared {
    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Hand one record to observers. Returns false once the session has left `Active`.
    fn deliver(&self, delivery: &Delivery) -> bool {
        let lifecycle = self.lock();
        if lifecycle.state != SessionState::Active {
            return false;
        }
        for observer in &self.observers {
            observer.on_record(self.id, delivery);
        }
        self.stats.record_delivery();
        true
    }

    fn publish_window(&self, window: &WindowSnapshot) {
        let lifecycle = self.lock();
        if lifecycle.state == SessionState::Active {
            for observer in &self.observers {
                observer.on_window_resized(self.id, window);
            }
        }
    }

    /// `Active → Draining` with the given end reason.
    fn drain(&self, end: SessionEnd) {
        let mut lifecycle = self.lock();
        if lifecycle.state != SessionState::Active {
            return;
        }
        lifecycle.state = SessionState::Draining;
        for observer in &self.observers {
            observer.on_end(self.id, &end);
        }
        lifecycle.end = Some(end);
    }

    /// `Idle | Active → Cancelled`. Returns whether the state changed.
    fn cancel(&self) -> bool {
        let mut lifecycle = self.lock();
        match lifecycle.state {
            SessionState::Idle | SessionState::Active => {
                let was_active = lifecycle.state == SessionState::Active;
                lifecycle.state = SessionState::Cancelled;
                lifecycle.end = Some(SessionEnd::Cancelled);
                if was_active {
                    for observer in &self.observers {
                        observer.on_end(self.id, &SessionEnd::Cancelled);
                    }
                }
                true
            }
            _ => false,
        }
    }

    /// `Draining | Cancelled → Closed`.
    fn close(&self) {
        let mut lifecycle = self.lock();
        if matches!(
            lifecycle.state,
            SessionState::Draining | SessionState::Cancelled
        ) {
            lifecycle.state = SessionState::Closed;
        }
    }
}

/// Handle to one ingestion run.
pub struct StreamSession {
    shared: Arc<SessionShared>,
    cancel_tx: watch::Sender<bool>,
    window_tx: watch::Sender<usize>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StreamSession {
    /// Create an idle session with the given window length.
    pub fn new(
        window_length: usize,
        observers: Vec<Arc<dyn SessionObserver>>,
        stats: SharedIngestStats,
    ) -> Result<Self, ValidationError> {
        validate_window_length(window_length)?;
        let (cancel_tx, _) = watch::channel(false);
        let (window_tx, _) = watch::channel(window_length);

        Ok(Self {
            shared: Arc::new(SessionShared {
                id: Uuid::new_v4(),
                lifecycle: Mutex::new(Lifecycle {
                    state: SessionState::Idle,
                    end: None,
                }),
                observers,
                stats,
            }),
            cancel_tx,
            window_tx,
            task: Mutex::new(None),
        })
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn state(&self) -> SessionState {
        self.shared.lock().state
    }

    /// Why the session stopped, once it has.
    pub fn end(&self) -> Option<SessionEnd> {
        self.shared.lock().end.clone()
    }

    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    /// Open the result stream through `boundary` and begin ingesting.
    pub async fn start(&self, boundary: &dyn DeviceBoundary) -> Result<(), SessionError> {
        let state = self.state();
        if state != SessionState::Idle {
            return Err(SessionError::NotIdle { state });
        }
        let stream = boundary
            .open_stream()
            .await
            .map_err(SessionError::Transport)?;
        self.attach(stream)
    }

    /// Begin ingesting from an already-open stream. Must run inside a tokio runtime.
    pub fn attach(&self, stream: Box<dyn ByteStream>) -> Result<(), SessionError> {
        let window_length = *self.window_tx.borrow();
        let pipeline = IngestPipeline::new(window_length, Arc::clone(&self.shared.stats))
            .map_err(SessionError::Validation)?;

        // Subscribe while holding the lock so a concurrent cancel cannot slip
        // between the state change and the receiver's creation.
        let (cancel_rx, window_rx) = {
            let mut lifecycle = self.shared.lock();
            if lifecycle.state != SessionState::Idle {
                return Err(SessionError::NotIdle {
                    state: lifecycle.state,
                });
            }
            lifecycle.state = SessionState::Active;
            (self.cancel_tx.subscribe(), self.window_tx.subscribe())
        };
        self.shared.stats.record_session_started();
        tracing::info!(session = %self.shared.id, window_length, "Stream session active");

        let handle = tokio::spawn(run_ingest(
            Arc::clone(&self.shared),
            stream,
            pipeline,
            cancel_rx,
            window_rx,
        ));
        *self
            .task
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    /// Stop the session.
    ///
    /// Returns without waiting for the transport; the connection is released
    /// by the ingest task on its next scheduling step. Returns whether this
    /// call changed the state.
    pub fn cancel(&self) -> bool {
        let changed = self.shared.cancel();
        self.cancel_tx.send_replace(true);
        if changed {
            tracing::info!(session = %self.shared.id, "Stream session cancelled");
        }
        changed
    }

    /// Change the window length. Takes effect on the ingest task's next step.
    pub fn set_window_length(&self, length: usize) -> Result<(), ValidationError> {
        validate_window_length(length)?;
        self.window_tx.send_replace(length);
        Ok(())
    }

    pub fn window_length(&self) -> usize {
        *self.window_tx.borrow()
    }

    /// Wait for the ingest task to finish and return how the session ended.
    pub async fn closed(&self) -> Option<SessionEnd> {
        let handle = self
            .task
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(session = %self.shared.id, "Ingest task failed: {}", e);
            }
        }
        self.end()
    }
}

impl std::fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSession")
            .field("id", &self.shared.id)
            .field("state", &self.state())
            .field("window_length", &self.window_length())
            .finish()
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.shared.cancel();
        self.cancel_tx.send_replace(true);
    }
}

async fn run_ingest(
    shared: Arc<SessionShared>,
    mut stream: Box<dyn ByteStream>,
    mut pipeline: IngestPipeline,
    mut cancel_rx: watch::Receiver<bool>,
    mut window_rx: watch::Receiver<usize>,
) {
    let mut resize_open = true;

    'ingest: loop {
        tokio::select! {
            biased;

            _ = cancel_rx.changed() => {
                tracing::debug!(session = %shared.id, "Cancellation observed");
                break 'ingest;
            }

            changed = window_rx.changed(), if resize_open => {
                if changed.is_err() {
                    resize_open = false;
                    continue 'ingest;
                }
                let length = *window_rx.borrow_and_update();
                match pipeline.resize_window(length) {
                    Ok(window) => shared.publish_window(&window),
                    Err(e) => tracing::warn!(session = %shared.id, "Ignoring window length: {}", e),
                }
            }

            next = stream.next_chunk() => match next {
                Ok(Some(chunk)) => {
                    tracing::trace!(session = %shared.id, bytes = chunk.len(), "Chunk received");
                    for delivery in pipeline.push_chunk(&chunk) {
                        if !shared.deliver(&delivery) {
                            break 'ingest;
                        }
                    }
                }
                Ok(None) => {
                    pipeline.finish();
                    tracing::info!(
                        session = %shared.id,
                        records = pipeline.records_accepted(),
                        "Stream ended"
                    );
                    shared.drain(SessionEnd::Completed);
                    break 'ingest;
                }
                Err(e) => {
                    pipeline.finish();
                    tracing::error!(session = %shared.id, "Stream failed: {}", e);
                    shared.stats.record_transport_error();
                    shared.drain(SessionEnd::Failed(e));
                    break 'ingest;
                }
            }
        }
    }

    drop(stream);
    shared.close();
    tracing::debug!(session = %shared.id, "Stream session closed");
}
