//! Interactive session bridge.
//!
//! `connect` walks Connecting -> PtyRequested -> ShellActive and ends in
//! Exited, Terminated or an error. While the shell is active the local
//! terminal is in raw mode; it is restored on every way out of `connect`.

pub mod channel;
pub mod relay;
pub mod terminal;
pub mod watchers;

use std::io;

use tokio::sync::mpsc::unbounded_channel;
use tokio::task;
use tracing::{info, warn};

use crate::error::{BridgeError, BridgeResult};
use crate::models::Entry;
use channel::Ssh2Shell;
use relay::{Relay, RelayEnd};
use terminal::RawTerminal;
use watchers::Watchers;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalSignal {
    Interrupt,
    Terminate,
    Quit,
}

impl LocalSignal {
    pub fn name(self) -> &'static str {
        match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
            Self::Quit => "SIGQUIT",
        }
    }
}

/// Messages from the watchers to the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeEvent {
    Resize { cols: u16, rows: u16 },
    Signal(LocalSignal),
}

/// How a session that did not fail came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The remote shell exited with status 0.
    Exited,
    /// A local terminate or quit signal ended the session.
    Terminated(LocalSignal),
}

impl SessionOutcome {
    fn from_relay(end: RelayEnd) -> BridgeResult<Self> {
        match end {
            RelayEnd::Exited(0) => Ok(Self::Exited),
            RelayEnd::Exited(code) => Err(BridgeError::RemoteExitStatus(code)),
            RelayEnd::Terminated(signal) => Ok(Self::Terminated(signal)),
        }
    }
}

/// Opens an interactive shell for `entry` and relays the local terminal to it
/// until the remote side exits.
pub async fn connect(entry: &Entry, term: &str) -> BridgeResult<SessionOutcome> {
    let target = entry.clone();
    let mut shell = task::spawn_blocking(move || Ssh2Shell::open(&target))
        .await
        .map_err(join_error)??;

    let mut raw = RawTerminal::acquire()?;
    let result = run_shell(&mut shell, term).await;
    if let Err(err) = raw.restore() {
        warn!(error = %err, "terminal restore failed");
    }

    let outcome = SessionOutcome::from_relay(result?);
    info!(?outcome, "session finished");
    outcome
}

async fn run_shell(shell: &mut Ssh2Shell, term: &str) -> BridgeResult<RelayEnd> {
    let (cols, rows) = terminal::current_size();
    task::block_in_place(|| {
        shell.request_pty(term, cols, rows)?;
        shell.start_shell()
    })?;
    info!(cols, rows, "shell active");

    let (event_tx, event_rx) = unbounded_channel();
    let watchers = Watchers::spawn(event_tx)?;
    let input = relay::spawn_stdin_reader()?;

    // Requires the multi-threaded runtime: the watchers keep running on the
    // other workers while this one blocks in the relay.
    let result = task::block_in_place(|| {
        Relay::new(shell, io::stdout(), io::stderr(), input, event_rx).run()
    });

    watchers.shutdown().await;
    result
}

fn join_error(err: task::JoinError) -> BridgeError {
    BridgeError::SessionError(format!("background task failed: {}", err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_exit_is_success() {
        assert_eq!(
            SessionOutcome::from_relay(RelayEnd::Exited(0)).unwrap(),
            SessionOutcome::Exited
        );
    }

    #[test]
    fn non_zero_exit_becomes_remote_exit_status() {
        let err = SessionOutcome::from_relay(RelayEnd::Exited(127)).unwrap_err();
        assert!(matches!(err, BridgeError::RemoteExitStatus(127)));
        assert_eq!(err.exit_code(), Some(127));
    }

    #[test]
    fn remote_killed_by_signal_is_a_failure() {
        let code = channel::signal_exit_code("KILL").unwrap();
        let err = SessionOutcome::from_relay(RelayEnd::Exited(code)).unwrap_err();
        assert!(matches!(err, BridgeError::RemoteExitStatus(137)));
        assert_eq!(err.exit_code(), Some(137));
    }

    #[test]
    fn local_termination_is_not_a_failure() {
        let outcome = SessionOutcome::from_relay(RelayEnd::Terminated(LocalSignal::Quit)).unwrap();
        assert_eq!(outcome, SessionOutcome::Terminated(LocalSignal::Quit));
    }

    #[test]
    fn signal_names() {
        assert_eq!(LocalSignal::Interrupt.name(), "SIGINT");
        assert_eq!(LocalSignal::Terminate.name(), "SIGTERM");
        assert_eq!(LocalSignal::Quit.name(), "SIGQUIT");
    }
}
