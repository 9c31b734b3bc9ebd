use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};
use std::thread;
use std::time::Duration;

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, trace};

use super::{BridgeEvent, LocalSignal};
use crate::error::{BridgeError, BridgeResult};

/// Interrupt character delivered to the remote pty for a local SIGINT.
///
/// libssh2 cannot send a channel `signal` request, so the interrupt travels
/// as input. It only takes effect while the remote pty has ISIG enabled;
/// programs that put the terminal in raw mode read it as a plain byte.
pub const ETX: u8 = 0x03;

const IDLE_WAIT: Duration = Duration::from_millis(10);
const CHUNK: usize = 16 * 1024;

/// Remote end of an interactive shell channel.
///
/// Reads and writes are non-blocking and report `ErrorKind::WouldBlock` when
/// nothing can be transferred right now.
pub trait RemoteShell {
    fn read_stdout(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn read_stderr(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn write_stdin(&mut self, data: &[u8]) -> io::Result<usize>;
    fn send_eof(&mut self) -> io::Result<()>;
    fn resize(&mut self, cols: u16, rows: u16) -> io::Result<()>;
    /// True once the remote side has closed its output.
    fn is_eof(&self) -> bool;
    /// Closes the channel and returns the remote exit status.
    fn close(&mut self) -> io::Result<i32>;
    /// Requests a close without waiting for the remote side.
    fn abort(&mut self);
}

impl<T: RemoteShell + ?Sized> RemoteShell for &mut T {
    fn read_stdout(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read_stdout(buf)
    }

    fn read_stderr(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read_stderr(buf)
    }

    fn write_stdin(&mut self, data: &[u8]) -> io::Result<usize> {
        (**self).write_stdin(data)
    }

    fn send_eof(&mut self) -> io::Result<()> {
        (**self).send_eof()
    }

    fn resize(&mut self, cols: u16, rows: u16) -> io::Result<()> {
        (**self).resize(cols, rows)
    }

    fn is_eof(&self) -> bool {
        (**self).is_eof()
    }

    fn close(&mut self) -> io::Result<i32> {
        (**self).close()
    }

    fn abort(&mut self) {
        (**self).abort()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayEnd {
    Exited(i32),
    Terminated(LocalSignal),
}

/// Byte-for-byte relay between local stdio and a remote shell.
pub struct Relay<S, O, E> {
    shell: S,
    stdout: O,
    stderr: E,
    input: UnboundedReceiver<Vec<u8>>,
    events: UnboundedReceiver<BridgeEvent>,
    /// Events received while a write was stalled, applied on the next pass.
    deferred: VecDeque<BridgeEvent>,
    input_open: bool,
    buf: Vec<u8>,
}

impl<S, O, E> Relay<S, O, E>
where
    S: RemoteShell,
    O: Write,
    E: Write,
{
    pub fn new(
        shell: S,
        stdout: O,
        stderr: E,
        input: UnboundedReceiver<Vec<u8>>,
        events: UnboundedReceiver<BridgeEvent>,
    ) -> Self {
        Self {
            shell,
            stdout,
            stderr,
            input,
            events,
            deferred: VecDeque::new(),
            input_open: true,
            buf: vec![0; CHUNK],
        }
    }

    /// Runs until the remote shell finishes or a local terminate signal arrives.
    pub fn run(mut self) -> BridgeResult<RelayEnd> {
        loop {
            let mut busy = false;

            let stop = match self.apply_events(&mut busy)? {
                Some(signal) => Some(signal),
                None => self.forward_input(&mut busy)?,
            };
            if let Some(signal) = stop {
                debug!(signal = signal.name(), "local signal ends the session");
                self.shell.abort();
                return Ok(RelayEnd::Terminated(signal));
            }
            self.drain_output(&mut busy)?;

            if self.shell.is_eof() {
                self.drain_output(&mut busy)?;
                let code = self.shell.close().map_err(session_error)?;
                debug!(code, "remote shell exited");
                return Ok(RelayEnd::Exited(code));
            }

            if !busy {
                thread::sleep(IDLE_WAIT);
            }
        }
    }

    fn next_event(&mut self) -> Option<BridgeEvent> {
        self.deferred
            .pop_front()
            .or_else(|| self.events.try_recv().ok())
    }

    fn apply_events(&mut self, busy: &mut bool) -> BridgeResult<Option<LocalSignal>> {
        while let Some(event) = self.next_event() {
            *busy = true;
            match event {
                BridgeEvent::Resize { cols, rows } => {
                    trace!(cols, rows, "forwarding window change");
                    self.shell.resize(cols, rows).map_err(session_error)?;
                }
                BridgeEvent::Signal(LocalSignal::Interrupt) => {
                    debug!("forwarding interrupt");
                    if let Some(signal) = self.write_remote(&[ETX])? {
                        return Ok(Some(signal));
                    }
                }
                BridgeEvent::Signal(signal) => return Ok(Some(signal)),
            }
        }
        Ok(None)
    }

    fn forward_input(&mut self, busy: &mut bool) -> BridgeResult<Option<LocalSignal>> {
        while self.input_open {
            match self.input.try_recv() {
                Ok(chunk) => {
                    *busy = true;
                    if let Some(signal) = self.write_remote(&chunk)? {
                        return Ok(Some(signal));
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.input_open = false;
                    self.shell.send_eof().map_err(session_error)?;
                    debug!("local input closed");
                }
            }
        }
        Ok(None)
    }

    /// Writes all of `data`, backing off while the remote window is full.
    ///
    /// Returns early with the signal if a terminate or quit arrives while
    /// stalled. Other events are kept for the next pass.
    fn write_remote(&mut self, mut data: &[u8]) -> BridgeResult<Option<LocalSignal>> {
        while !data.is_empty() {
            match self.shell.write_stdin(data) {
                Ok(0) => return Err(BridgeError::SessionError("remote channel closed".to_string())),
                Ok(n) => data = &data[n..],
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    if let Some(signal) = self.poll_stop() {
                        return Ok(Some(signal));
                    }
                    thread::sleep(IDLE_WAIT);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => return Err(session_error(err)),
            }
        }
        Ok(None)
    }

    fn poll_stop(&mut self) -> Option<LocalSignal> {
        while let Ok(event) = self.events.try_recv() {
            match event {
                BridgeEvent::Signal(signal @ (LocalSignal::Terminate | LocalSignal::Quit)) => {
                    return Some(signal)
                }
                other => self.deferred.push_back(other),
            }
        }
        None
    }

    fn drain_output(&mut self, busy: &mut bool) -> BridgeResult<()> {
        loop {
            let mut moved = false;

            let n = non_blocking(self.shell.read_stdout(&mut self.buf))?;
            if n > 0 {
                self.stdout.write_all(&self.buf[..n])?;
                self.stdout.flush()?;
                moved = true;
            }

            let n = non_blocking(self.shell.read_stderr(&mut self.buf))?;
            if n > 0 {
                self.stderr.write_all(&self.buf[..n])?;
                self.stderr.flush()?;
                moved = true;
            }

            if !moved {
                return Ok(());
            }
            *busy = true;
        }
    }
}

fn non_blocking(result: io::Result<usize>) -> BridgeResult<usize> {
    match result {
        Ok(n) => Ok(n),
        Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => Ok(0),
        Err(err) => Err(session_error(err)),
    }
}

fn session_error(err: io::Error) -> BridgeError {
    BridgeError::SessionError(err.to_string())
}

/// Forwards local stdin into an unbounded channel from a detached thread.
///
/// The thread ends at local EOF or once the receiving side is dropped and the
/// next read returns.
pub fn spawn_stdin_reader() -> io::Result<UnboundedReceiver<Vec<u8>>> {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    thread::Builder::new()
        .name("gate-stdin".to_string())
        .spawn(move || {
            let mut stdin = io::stdin();
            let mut buf = [0u8; 4096];
            loop {
                match stdin.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(err) if err.kind() == ErrorKind::Interrupted => {}
                    Err(_) => break,
                }
            }
        })?;
    Ok(rx)
}
