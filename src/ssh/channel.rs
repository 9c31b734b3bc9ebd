use std::io::{self, ErrorKind, Read, Write};
use std::net::TcpStream;

use ssh2::{Channel, PtyModeOpcode, PtyModes, Session};
use tracing::{debug, info};

use super::relay::RemoteShell;
use crate::error::{BridgeError, BridgeResult};
use crate::models::Entry;

const BAUD_RATE: u32 = 14400;
/// Upper bound in milliseconds for control requests made in blocking mode.
const CONTROL_TIMEOUT_MS: u32 = 5_000;

/// An authenticated libssh2 session with one session channel open.
pub struct Ssh2Shell {
    session: Session,
    channel: Channel,
}

impl Ssh2Shell {
    /// Connects, authenticates with the entry's password and opens a session
    /// channel. Blocks for the whole handshake.
    pub fn open(entry: &Entry) -> BridgeResult<Self> {
        info!(host = %entry.host, port = entry.port, user = %entry.user, "connecting");

        let tcp = TcpStream::connect((entry.host.as_str(), entry.port)).map_err(|err| {
            BridgeError::ConnectionFailed(format!("{}:{}: {}", entry.host, entry.port, err))
        })?;

        let mut session =
            Session::new().map_err(|err| BridgeError::ConnectionFailed(err.message().to_string()))?;
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .map_err(|err| BridgeError::ConnectionFailed(err.message().to_string()))?;

        session
            .userauth_password(&entry.user, &entry.password)
            .map_err(|err| BridgeError::AuthFailed(err.message().to_string()))?;
        if !session.authenticated() {
            return Err(BridgeError::AuthFailed(format!(
                "server rejected credentials for {}",
                entry.user
            )));
        }

        let channel = session.channel_session().map_err(channel_open_failed)?;
        debug!("session channel opened");
        Ok(Self { session, channel })
    }

    /// Requests a remote pty sized `cols` x `rows` with echo on.
    pub fn request_pty(&mut self, term: &str, cols: u16, rows: u16) -> BridgeResult<()> {
        let mut modes = PtyModes::new();
        modes.set_boolean(PtyModeOpcode::ECHO, true);
        modes.set_u32(PtyModeOpcode::TTY_OP_ISPEED, BAUD_RATE);
        modes.set_u32(PtyModeOpcode::TTY_OP_OSPEED, BAUD_RATE);

        self.channel
            .request_pty(term, Some(modes), Some((u32::from(cols), u32::from(rows), 0, 0)))
            .map_err(|err| BridgeError::SessionError(format!("RequestPty failed: {}", err.message())))?;
        debug!(term, cols, rows, "pty requested");
        Ok(())
    }

    /// Starts the login shell and switches the session to non-blocking I/O.
    pub fn start_shell(&mut self) -> BridgeResult<()> {
        self.channel
            .shell()
            .map_err(|err| BridgeError::SessionError(format!("shell error: {}", err.message())))?;
        self.session.set_timeout(CONTROL_TIMEOUT_MS);
        self.session.set_blocking(false);
        Ok(())
    }

    fn blocking<T>(&mut self, op: impl FnOnce(&mut Channel) -> Result<T, ssh2::Error>) -> io::Result<T> {
        self.session.set_blocking(true);
        let result = op(&mut self.channel);
        self.session.set_blocking(false);
        result.map_err(io::Error::from)
    }
}

impl RemoteShell for Ssh2Shell {
    fn read_stdout(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.channel.read(buf)
    }

    fn read_stderr(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.channel.stderr().read(buf)
    }

    fn write_stdin(&mut self, data: &[u8]) -> io::Result<usize> {
        self.channel.write(data)
    }

    fn send_eof(&mut self) -> io::Result<()> {
        self.blocking(|channel| channel.send_eof())
    }

    fn resize(&mut self, cols: u16, rows: u16) -> io::Result<()> {
        self.blocking(|channel| channel.request_pty_size(u32::from(cols), u32::from(rows), None, None))
    }

    fn is_eof(&self) -> bool {
        self.channel.eof()
    }

    fn close(&mut self) -> io::Result<i32> {
        let (status, signal) = self.blocking(|channel| {
            channel.close()?;
            channel.wait_close()?;
            Ok((channel.exit_status()?, channel.exit_signal()?.exit_signal))
        })?;

        // libssh2 leaves the status at 0 when the server reports a signal.
        match signal {
            Some(name) => signal_exit_code(&name).ok_or_else(|| {
                io::Error::new(ErrorKind::Other, format!("remote process killed by signal {}", name))
            }),
            None => Ok(status),
        }
    }

    fn abort(&mut self) {
        // Non-blocking: the close is queued and we do not wait for the peer.
        if let Err(err) = self.channel.close().map_err(io::Error::from) {
            if err.kind() != ErrorKind::WouldBlock {
                debug!(error = %err, "channel close failed");
            }
        }
    }
}

fn channel_open_failed(err: ssh2::Error) -> BridgeError {
    BridgeError::ConnectionFailed(format!("session channel: {}", err.message()))
}

/// Shell-style status for a process ended by `signal` (RFC 4254 name, no
/// `SIG` prefix): 128 plus the signal number.
pub fn signal_exit_code(signal: &str) -> Option<i32> {
    let number = match signal {
        "HUP" => 1,
        "INT" => 2,
        "QUIT" => 3,
        "ILL" => 4,
        "ABRT" => 6,
        "FPE" => 8,
        "KILL" => 9,
        "USR1" => 10,
        "SEGV" => 11,
        "USR2" => 12,
        "PIPE" => 13,
        "ALRM" => 14,
        "TERM" => 15,
        _ => return None,
    };
    Some(128 + number)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn killed_process_reports_shell_style_status() {
        assert_eq!(signal_exit_code("KILL"), Some(137));
        assert_eq!(signal_exit_code("TERM"), Some(143));
        assert_eq!(signal_exit_code("SEGV"), Some(139));
        assert_eq!(signal_exit_code("HUP"), Some(129));
    }

    #[test]
    fn channel_open_failure_is_a_connection_failure() {
        let err = ssh2::Error::new(ssh2::ErrorCode::Session(-21), "channel open refused");
        match channel_open_failed(err) {
            BridgeError::ConnectionFailed(msg) => assert!(msg.contains("channel open refused")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn unknown_signal_has_no_status() {
        assert_eq!(signal_exit_code("SIGKILL"), None);
        assert_eq!(signal_exit_code("WINCH"), None);
    }
}
