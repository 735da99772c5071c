//! Operator commands.
//!
//! The terminal is read on a dedicated OS thread with plain blocking reads and
//! each line becomes a [`Command`] on an mpsc channel. Ctrl-C is turned into
//! [`Command::Interrupt`] on the same channel, so the control loop only has one
//! place to look for operator input.

use std::future::Future;
use std::io::{BufRead, Write};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Capacity of the command channel. Operators type slowly.
pub const COMMAND_BUFFER: usize = 16;

/// Process exit status after a second Ctrl-C (128 + SIGINT).
pub const FORCED_EXIT_CODE: i32 = 130;

/// One operator input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `q` / `Q`: stop logging and exit.
    Quit,
    /// Ctrl-C.
    Interrupt,
    /// Any other first character; ignored by the control loop.
    Unrecognized(char),
}

impl Command {
    /// Interpret one line of input by its first non-whitespace character.
    ///
    /// Blank lines yield `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let first = line.trim().chars().next()?;
        if first.eq_ignore_ascii_case(&'q') {
            Some(Command::Quit)
        } else {
            Some(Command::Unrecognized(first))
        }
    }
}

/// Command channel sized for operator input.
pub fn channel() -> (mpsc::Sender<Command>, mpsc::Receiver<Command>) {
    mpsc::channel(COMMAND_BUFFER)
}

/// Read commands from `reader` on a new thread until EOF or the receiver is gone.
pub fn spawn_reader<R>(reader: R, tx: mpsc::Sender<Command>) -> std::io::Result<std::thread::JoinHandle<()>>
where
    R: BufRead + Send + 'static,
{
    std::thread::Builder::new()
        .name("command-reader".to_string())
        .spawn(move || {
            for line in reader.lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("Failed to read operator input: {}", e);
                        break;
                    }
                };
                if let Some(command) = Command::parse(&line) {
                    if tx.blocking_send(command).is_err() {
                        break;
                    }
                }
            }
            debug!("Operator input closed");
        })
}

/// Print `question` and read one answer line.
///
/// Blank answers and EOF yield `None` so the caller can fall back to a default.
pub fn ask<R, W>(input: &mut R, output: &mut W, question: &str) -> std::io::Result<Option<String>>
where
    R: BufRead,
    W: Write,
{
    write!(output, "{question}")?;
    output.flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    let answer = line.trim();
    Ok((!answer.is_empty()).then(|| answer.to_string()))
}

/// How [`relay_interrupts`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptRelay {
    /// A second interrupt arrived after the first was forwarded.
    Repeated,
    /// The first interrupt could not be delivered; the control loop is gone.
    Undelivered,
    /// Listening for the signal failed.
    ListenerFailed,
}

/// Forward the first interrupt from `next_interrupt` as [`Command::Interrupt`],
/// then wait for another one.
pub async fn relay_interrupts<F, Fut>(mut next_interrupt: F, tx: mpsc::Sender<Command>) -> InterruptRelay
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = next_interrupt().await {
        warn!("Cannot listen for Ctrl-C: {}", e);
        return InterruptRelay::ListenerFailed;
    }
    if tx.send(Command::Interrupt).await.is_err() {
        return InterruptRelay::Undelivered;
    }
    match next_interrupt().await {
        Ok(()) => InterruptRelay::Repeated,
        Err(e) => {
            warn!("Cannot listen for Ctrl-C: {}", e);
            InterruptRelay::ListenerFailed
        }
    }
}

/// Turn Ctrl-C into [`Command::Interrupt`]. A second Ctrl-C ends the process
/// at once with [`FORCED_EXIT_CODE`], abandoning any pending writes.
pub fn spawn_interrupt(tx: mpsc::Sender<Command>) -> JoinHandle<()> {
    tokio::spawn(async move {
        if relay_interrupts(tokio::signal::ctrl_c, tx).await == InterruptRelay::Repeated {
            warn!("Interrupted again; exiting without waiting for pending writes");
            std::process::exit(FORCED_EXIT_CODE);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::{self, BoxFuture, FutureExt};
    use std::io::Cursor;
    use std::time::Duration;

    /// Interrupt source that fires `presses` times and then never again.
    fn presses(count: usize) -> impl FnMut() -> BoxFuture<'static, std::io::Result<()>> {
        let mut seen = 0;
        move || {
            seen += 1;
            if seen <= count {
                future::ready(Ok::<(), std::io::Error>(())).boxed()
            } else {
                future::pending::<std::io::Result<()>>().boxed()
            }
        }
    }

    #[test]
    fn parse_recognizes_quit_in_either_case() {
        assert_eq!(Command::parse("q"), Some(Command::Quit));
        assert_eq!(Command::parse("Q"), Some(Command::Quit));
        assert_eq!(Command::parse("  quit\n"), Some(Command::Quit));
    }

    #[test]
    fn parse_other_input() {
        assert_eq!(Command::parse("x"), Some(Command::Unrecognized('x')));
        assert_eq!(Command::parse(""), None);
        assert_eq!(Command::parse("   "), None);
    }

    #[test]
    fn ask_returns_trimmed_answer_or_none() {
        let mut input = Cursor::new("  glove_run \n\n");
        let mut output = Vec::new();

        let first = ask(&mut input, &mut output, "Name: ").unwrap();
        let second = ask(&mut input, &mut output, "Again: ").unwrap();
        let at_eof = ask(&mut input, &mut output, "Eof: ").unwrap();

        assert_eq!(first.as_deref(), Some("glove_run"));
        assert_eq!(second, None);
        assert_eq!(at_eof, None);
        assert_eq!(String::from_utf8(output).unwrap(), "Name: Again: Eof: ");
    }

    #[tokio::test]
    async fn reader_forwards_commands_until_eof() {
        let (tx, mut rx) = channel();
        let input = Cursor::new("hello\n\nq\n");
        let thread = spawn_reader(input, tx).unwrap();

        assert_eq!(rx.recv().await, Some(Command::Unrecognized('h')));
        assert_eq!(rx.recv().await, Some(Command::Quit));
        assert_eq!(rx.recv().await, None);
        thread.join().unwrap();
    }

    #[tokio::test]
    async fn second_interrupt_is_reported_as_repeated() {
        let (tx, mut rx) = channel();
        let relay = relay_interrupts(presses(2), tx).await;
        assert_eq!(relay, InterruptRelay::Repeated);
        assert_eq!(rx.recv().await, Some(Command::Interrupt));
    }

    #[tokio::test]
    async fn single_interrupt_keeps_waiting() {
        let (tx, mut rx) = channel();
        let relay = tokio::spawn(relay_interrupts(presses(1), tx));

        assert_eq!(rx.recv().await, Some(Command::Interrupt));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!relay.is_finished());
        relay.abort();
    }

    #[tokio::test]
    async fn interrupt_without_receiver_is_undelivered() {
        let (tx, rx) = channel();
        drop(rx);
        assert_eq!(
            relay_interrupts(presses(2), tx).await,
            InterruptRelay::Undelivered
        );
    }

    #[tokio::test]
    async fn listener_failure_is_reported() {
        let (tx, _rx) = channel();
        let failing = || future::ready(Err(std::io::Error::other("no signal handler")));
        assert_eq!(
            relay_interrupts(failing, tx).await,
            InterruptRelay::ListenerFailed
        );
    }
}
