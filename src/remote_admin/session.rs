//! SSH session wrapper
//!
//! Thin blocking wrapper over `ssh2`: connect with a bounded timeout,
//! password auth, one-shot command execution, and raw channel streaming in
//! both directions. Host keys are not verified; devices are reached by
//! address on closed management networks (documented accepted risk).

use crate::error::{Error, Result};
use ssh2::Session;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

/// TCP connect timeout for new sessions
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(8);

/// Remote operations the backup/restore state machines are written
/// against. `SshSession` is the live implementation; tests drive the
/// machines with a fake to check command sequencing (restart-always,
/// rollback-before-restart) without an SSH peer.
pub trait RemoteShell {
    /// Run a command and require a zero exit status.
    fn exec_ok(&self, command: &str) -> Result<String>;

    /// Stream a remote command's stdout byte-for-byte into a local file.
    /// Returns the byte count written.
    fn read_to_file(&self, command: &str, local: &Path) -> Result<u64>;

    /// Stream a local file into a remote command's stdin, then close the
    /// input stream so the receiver terminates. Returns the byte count sent.
    fn stream_to_command(&self, local: &Path, command: &str) -> Result<u64>;
}

pub struct SshSession {
    session: Session,
    ip: String,
}

impl SshSession {
    /// Connect and authenticate with a password.
    pub fn connect(ip: &str, port: u16, username: &str, password: &str) -> Result<Self> {
        let addr = format!("{}:{}", ip, port)
            .to_socket_addrs()
            .map_err(|e| Error::Ssh(format!("{}: bad address: {}", ip, e)))?
            .next()
            .ok_or_else(|| Error::Ssh(format!("{}: unresolvable address", ip)))?;

        let tcp = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT)
            .map_err(|e| Error::Ssh(format!("{}: connect: {}", ip, e)))?;

        let mut session = Session::new()?;
        session.set_tcp_stream(tcp);
        session.handshake()?;
        session
            .userauth_password(username, password)
            .map_err(|e| Error::Ssh(format!("{}: auth: {}", ip, e)))?;

        Ok(Self {
            session,
            ip: ip.to_string(),
        })
    }

    /// Run a command, collecting stdout and the exit status.
    pub fn exec(&self, command: &str) -> Result<(String, i32)> {
        let mut channel = self.session.channel_session()?;
        channel.exec(command)?;
        let mut stdout = String::new();
        channel.read_to_string(&mut stdout)?;
        channel.wait_close()?;
        Ok((stdout, channel.exit_status()?))
    }
}

impl RemoteShell for SshSession {
    fn exec_ok(&self, command: &str) -> Result<String> {
        let (stdout, status) = self.exec(command)?;
        if status != 0 {
            return Err(Error::Ssh(format!(
                "{}: `{}` exited with {}",
                self.ip, command, status
            )));
        }
        Ok(stdout)
    }

    fn read_to_file(&self, command: &str, local: &Path) -> Result<u64> {
        let mut channel = self.session.channel_session()?;
        channel.exec(command)?;

        let mut file = std::fs::File::create(local)?;
        let copied = std::io::copy(&mut channel, &mut file)?;
        file.flush()?;

        channel.wait_close()?;
        let status = channel.exit_status()?;
        if status != 0 {
            return Err(Error::Ssh(format!(
                "{}: `{}` exited with {}",
                self.ip, command, status
            )));
        }
        Ok(copied)
    }

    fn stream_to_command(&self, local: &Path, command: &str) -> Result<u64> {
        let mut channel = self.session.channel_session()?;
        channel.exec(command)?;

        let mut file = std::fs::File::open(local)?;
        let sent = std::io::copy(&mut file, &mut channel)?;
        channel.send_eof()?;
        channel.wait_eof()?;
        channel.wait_close()?;

        let status = channel.exit_status()?;
        if status != 0 {
            return Err(Error::Ssh(format!(
                "{}: `{}` exited with {}",
                self.ip, command, status
            )));
        }
        Ok(sent)
    }
}
