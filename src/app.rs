//! The control loop.
//!
//! Selects over operator commands and transport events and feeds both into the
//! [`Session`]. Neither branch blocks: transport I/O runs on its own task and
//! persistence on the blocking pool, so a `q` is seen as soon as it is typed.

use crate::command::Command;
use crate::session::Session;
use crate::transport::TransportEvent;
use std::fmt;
use tokio::sync::mpsc;
use tracing::debug;

/// Why the control loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The operator typed `q`.
    Quit,
    /// Ctrl-C.
    Interrupted,
    /// Every command sender is gone.
    InputClosed,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Quit => write!(f, "quit"),
            ExitReason::Interrupted => write!(f, "interrupted"),
            ExitReason::InputClosed => write!(f, "input closed"),
        }
    }
}

/// Run until the operator quits, then stop the session and wait for pending writes.
///
/// A transport-initiated close leaves the session `Stopped` but keeps the loop
/// waiting for the operator; quitting and interrupting are the only exits.
pub async fn run(
    session: &mut Session,
    mut events: mpsc::Receiver<TransportEvent>,
    mut commands: mpsc::Receiver<Command>,
) -> ExitReason {
    let mut events_open = true;

    let reason = loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Quit) => break ExitReason::Quit,
                Some(Command::Interrupt) => break ExitReason::Interrupted,
                Some(Command::Unrecognized(c)) => debug!("Ignoring input {:?}", c),
                None => break ExitReason::InputClosed,
            },
            event = events.recv(), if events_open => match event {
                Some(event) => {
                    let outcome = session.handle_event(event);
                    debug!(?outcome, "Handled transport event");
                }
                None => events_open = false,
            },
        }
    };

    session.stop();
    session.drain().await;
    reason
}
