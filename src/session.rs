//! Session lifecycle for one logging run.
//!
//! A process runs exactly one [`Session`]. It owns the connection handle, the
//! accepting flag, and the sink writer, and it is driven from a single control
//! loop (see [`crate::app`]) that feeds it operator commands and transport
//! events one at a time. Because the flag is only read and written from that
//! loop, a frame can never be handled after `stop` has flipped it.
//!
//! # State Machine
//!
//! ```text
//! Idle ──start──> Active ──stop / remote close──> Stopped
//!                  │  ▲
//!                  └──┘ message (gated by accepting flag)
//! ```
//!
//! `Stopped` is terminal. Readings are persisted by a single worker on the
//! blocking pool (see [`PersistQueue`]) so a slow workbook rewrite never holds
//! up the loop. Queued writes are never cancelled and can be awaited with
//! [`Session::drain`].

use crate::error::{AppResult, LoggerError};
use crate::parser::{FrameParser, FrameRejection};
use crate::sink::{PersistQueue, PersistSummary, SinkTargets, SinkWriter};
use crate::transport::{normalize_url, ConnectionHandle, Transport, TransportEvent};
use chrono::{Local, NaiveDateTime};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Lifecycle state of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection yet; only `start` is meaningful.
    Idle,
    /// Connection open, frames are parsed and persisted.
    Active,
    /// Connection closed, nothing else is processed.
    Stopped,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::Active => write!(f, "Active"),
            SessionState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Everything `start` needs to open a connection and pick the sink files.
#[derive(Debug, Clone)]
pub struct StartRequest {
    /// Endpoint; a bare host gets `ws://` prepended.
    pub url: String,
    /// Operator-supplied base name; blank means the default prefix.
    pub custom_name: Option<String>,
    /// Directory for both sink files.
    pub output_dir: PathBuf,
    /// Write the CSV append log.
    pub csv_enabled: bool,
    /// Write the XLSX workbook.
    pub xlsx_enabled: bool,
    /// Capacity of the transport event channel.
    pub event_buffer: usize,
}

/// What handling one transport event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// Connection event that was only logged.
    Observed,
    /// Valid frame queued for persistence.
    Dispatched,
    /// Frame failed validation; nothing persisted.
    Rejected(FrameRejection),
    /// Frame arrived while not accepting; dropped without side effects.
    Discarded,
    /// The remote end closed an active session.
    TransportClosed,
}

/// Result of an operator stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The session was active and is now stopped.
    Stopped,
    /// Nothing was running; only reported.
    NotActive,
}

/// The single logging session of this process.
pub struct Session {
    state: SessionState,
    accepting: bool,
    connection: Option<ConnectionHandle>,
    writer: Option<Arc<SinkWriter>>,
    parser: FrameParser,
    queue: Option<PersistQueue>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// An idle session with the default tags.
    pub fn new() -> Self {
        Self::with_parser(FrameParser::default())
    }

    /// An idle session using `parser` for incoming frames.
    pub fn with_parser(parser: FrameParser) -> Self {
        Self {
            state: SessionState::Idle,
            accepting: false,
            connection: None,
            writer: None,
            parser,
            queue: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether incoming frames are parsed and persisted.
    pub fn is_accepting(&self) -> bool {
        self.accepting
    }

    /// Sink destinations, once the session has been started.
    pub fn targets(&self) -> Option<&SinkTargets> {
        self.writer.as_deref().map(SinkWriter::targets)
    }

    /// Readings queued but not yet persisted.
    pub fn in_flight(&self) -> usize {
        self.queue.as_ref().map_or(0, PersistQueue::pending)
    }

    /// `Idle -> Active`, naming the sink files after the current local time.
    pub fn start(
        &mut self,
        request: StartRequest,
        transport: Arc<dyn Transport>,
    ) -> AppResult<mpsc::Receiver<TransportEvent>> {
        self.start_at(request, transport, Local::now().naive_local())
    }

    /// `Idle -> Active` with an explicit start time.
    ///
    /// Derives both sink paths, creates the output directory, spawns the
    /// transport and opens the accepting gate. The returned receiver yields the
    /// connection's events.
    pub fn start_at(
        &mut self,
        request: StartRequest,
        transport: Arc<dyn Transport>,
        started_at: NaiveDateTime,
    ) -> AppResult<mpsc::Receiver<TransportEvent>> {
        if self.state != SessionState::Idle {
            warn!("Logging already started (session is {})", self.state);
            return Err(LoggerError::InvalidTransition {
                from: self.state,
                action: "start",
            });
        }

        let targets = SinkTargets::derive(
            &request.output_dir,
            request.custom_name.as_deref(),
            started_at,
            request.csv_enabled,
            request.xlsx_enabled,
        );
        if !targets.any_enabled() {
            return Err(LoggerError::Configuration(
                "at least one of the csv and xlsx sinks must be enabled".to_string(),
            ));
        }
        targets.ensure_dirs()?;

        for descriptor in [&targets.append, &targets.rewrite] {
            if descriptor.enabled {
                info!("Logging to {}", descriptor.path.display());
            }
        }

        let url = normalize_url(&request.url);
        info!("Connecting to {}", url);
        let (connection, events) = ConnectionHandle::open(transport, url, request.event_buffer);

        let writer = Arc::new(SinkWriter::new(targets));
        self.queue = Some(PersistQueue::spawn(Arc::clone(&writer)));
        self.writer = Some(writer);
        self.connection = Some(connection);
        self.accepting = true;
        self.state = SessionState::Active;
        info!("Logging started. Press 'q' to stop logging.");
        Ok(events)
    }

    /// Handle a transport event stamped with the current local time.
    pub fn handle_event(&mut self, event: TransportEvent) -> EventOutcome {
        self.handle_event_at(event, Local::now().naive_local())
    }

    /// Handle a transport event; `now` becomes the reading's timestamp.
    pub fn handle_event_at(&mut self, event: TransportEvent, now: NaiveDateTime) -> EventOutcome {
        match event {
            TransportEvent::Opened => {
                info!("WebSocket Connected.");
                EventOutcome::Observed
            }
            TransportEvent::Error(description) => {
                error!("WebSocket Error: {}", description);
                EventOutcome::Observed
            }
            TransportEvent::Closed { code, reason } => {
                info!(?code, reason = %reason, "WebSocket Closed.");
                if self.state == SessionState::Active {
                    // Remote close: the handle is finished and must not be reused.
                    self.accepting = false;
                    self.connection = None;
                    self.state = SessionState::Stopped;
                    warn!("Connection closed by remote end; no further data will be logged");
                    EventOutcome::TransportClosed
                } else {
                    EventOutcome::Observed
                }
            }
            TransportEvent::Message(frame) => self.accept_frame(frame, now),
        }
    }

    fn accept_frame(&mut self, frame: String, now: NaiveDateTime) -> EventOutcome {
        if !self.accepting {
            return EventOutcome::Discarded;
        }
        let Some(queue) = self.queue.as_ref() else {
            return EventOutcome::Discarded;
        };

        match self.parser.parse(&frame) {
            Ok(blocks) => {
                let reading = blocks.stamp(now, frame);
                if queue.submit(reading) {
                    EventOutcome::Dispatched
                } else {
                    error!("Reading could not be queued for persistence");
                    EventOutcome::Discarded
                }
            }
            Err(rejection) => {
                warn!(reason = %rejection, "Invalid Data Received, Skipping Log.");
                EventOutcome::Rejected(rejection)
            }
        }
    }

    /// `Active -> Stopped`. Anywhere else this only reports that nothing is running.
    pub fn stop(&mut self) -> StopOutcome {
        if self.state != SessionState::Active || !self.accepting {
            info!("Logging is not currently active.");
            return StopOutcome::NotActive;
        }

        self.accepting = false;
        if let Some(connection) = self.connection.as_mut() {
            connection.close();
        }
        self.state = SessionState::Stopped;
        info!("Logging stopped.");
        StopOutcome::Stopped
    }

    /// Close the persistence queue and wait for every queued reading.
    ///
    /// Frames handled after this are no longer persisted, so it belongs after
    /// [`Session::stop`].
    pub async fn drain(&mut self) -> PersistSummary {
        let Some(queue) = self.queue.as_mut() else {
            return PersistSummary::default();
        };
        let summary = queue.finish().await;
        if summary.readings > 0 {
            debug!(
                readings = summary.readings,
                lost = summary.lost,
                "Persistence finished"
            );
        }
        summary
    }
}
