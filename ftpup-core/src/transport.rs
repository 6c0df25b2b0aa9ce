//! Transport layer for the uploader
//!
//! This module owns the FTP control connection and the passive-mode
//! data connections opened for each store. Everything here is blocking:
//! one control socket, at most one data socket, no background work.

use crate::error::{Error, Result};
use crate::protocol::{self, Command, Reply, ReplyClass, TransferType};
use serde::{Deserialize, Serialize};
use std::io::{self, BufReader, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Server host name or address
    pub host: String,
    /// Control port
    pub port: u16,
    /// Connection timeout in seconds
    pub connect_timeout: u64,
    /// Read/write timeout in seconds on established sockets; `None` waits forever
    pub io_timeout: Option<u64>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: crate::DEFAULT_CONTROL_PORT,
            connect_timeout: 30,
            io_timeout: Some(300),
        }
    }
}

impl TransportConfig {
    /// Default configuration for `host`
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout.max(1))
    }

    fn io_timeout(&self) -> Option<Duration> {
        self.io_timeout.filter(|secs| *secs > 0).map(Duration::from_secs)
    }
}

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Greeting received, not logged in
    Connected,
    /// Logged in and ready for commands
    Authenticated,
    /// `QUIT` sent, socket released
    Closed,
}

/// Session statistics
#[derive(Debug, Clone, Default)]
struct SessionStatistics {
    /// Commands written to the control connection
    commands_sent: u64,
    /// Replies read from the control connection
    replies_received: u64,
    /// File bytes written to data connections
    bytes_sent: u64,
}

/// An open FTP control connection.
///
/// Dropping a session that was never `quit` sends a best-effort `QUIT`
/// and closes the socket, so every exit path releases the connection.
pub struct FtpSession {
    config: TransportConfig,
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    peer: SocketAddr,
    welcome: String,
    state: SessionState,
    statistics: SessionStatistics,
}

impl FtpSession {
    /// Open the control connection and read the server greeting
    pub fn connect(config: TransportConfig) -> Result<Self> {
        let stream = open_stream(&config.host, config.port, config.connect_timeout())?;
        stream.set_read_timeout(config.io_timeout())?;
        stream.set_write_timeout(config.io_timeout())?;

        let peer = stream.peer_addr()?;
        let writer = stream.try_clone()?;

        let mut session = Self {
            config,
            reader: BufReader::new(stream),
            writer,
            peer,
            welcome: String::new(),
            state: SessionState::Connected,
            statistics: SessionStatistics::default(),
        };

        let mut greeting = session.read_reply()?;
        if greeting.code == 120 {
            // "Service ready in nnn minutes": the real greeting follows
            greeting = session.read_reply()?;
        }
        if !greeting.is_completion() {
            return Err(Error::Connection(format!(
                "Server refused connection: {}",
                greeting
            )));
        }

        session.welcome = greeting.text();
        Ok(session)
    }

    /// Greeting banner sent by the server on connect
    pub fn welcome(&self) -> &str {
        &self.welcome
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Send a command and wait for its reply
    pub fn execute(&mut self, command: &Command) -> Result<Reply> {
        self.send(command)?;
        self.read_reply()
    }

    /// Log in with `USER`/`PASS`.
    ///
    /// `PASS` is only sent after a 331; any other 3xx asks for an account,
    /// which is not supported.
    pub fn login(&mut self, username: &str, password: &str) -> Result<()> {
        let mut reply = self.execute(&Command::User(username.to_string()))?;
        if reply.code == 331 {
            reply = self.execute(&Command::Pass(password.to_string()))?;
        }

        match reply.class() {
            ReplyClass::Completion => {
                self.state = SessionState::Authenticated;
                Ok(())
            }
            ReplyClass::Intermediate => Err(Error::Authentication(format!(
                "Server requires an account (ACCT is not supported): {}",
                reply
            ))),
            _ => Err(Error::Authentication(reply.text())),
        }
    }

    /// Change the remote working directory
    pub fn cwd(&mut self, path: &str) -> Result<()> {
        let reply = self.execute(&Command::Cwd(path.to_string()))?;
        if reply.is_completion() {
            Ok(())
        } else {
            Err(Error::RemoteDirectory(format!("{}: {}", path, reply)))
        }
    }

    /// Store `reader` as `remote_name` in binary mode.
    ///
    /// Data goes out in [`crate::BLOCK_SIZE`] blocks; `on_block` runs after each block
    /// has been written to the data connection and before the next one is
    /// read. Returns the number of bytes sent.
    pub fn store<R, F>(&mut self, remote_name: &str, reader: &mut R, on_block: F) -> Result<u64>
    where
        R: Read + ?Sized,
        F: FnMut(&[u8]) -> Result<()>,
    {
        self.store_blocks(remote_name, reader, on_block)
            .map_err(Error::into_transfer)
    }

    fn store_blocks<R, F>(&mut self, remote_name: &str, reader: &mut R, mut on_block: F) -> Result<u64>
    where
        R: Read + ?Sized,
        F: FnMut(&[u8]) -> Result<()>,
    {
        let stor = Command::Stor(remote_name.to_string());
        stor.validate()?;

        let reply = self.execute(&Command::Type(TransferType::Binary))?;
        if !reply.is_completion() {
            return Err(Error::Transfer(format!("Binary mode refused: {}", reply)));
        }

        let data_addr = self.passive_address()?;
        let mut data = TcpStream::connect_timeout(&data_addr, self.config.connect_timeout())
            .map_err(|e| Error::Transfer(format!("Data connection to {} failed: {}", data_addr, e)))?;
        data.set_write_timeout(self.config.io_timeout())?;

        let reply = self.execute(&stor)?;
        if !reply.is_preliminary() {
            return Err(Error::Transfer(format!(
                "Server refused STOR {}: {}",
                remote_name, reply
            )));
        }

        let mut block = vec![0u8; crate::BLOCK_SIZE];
        let mut sent = 0u64;
        loop {
            let n = read_block(reader, &mut block)
                .map_err(|e| Error::LocalFile(format!("Read failed: {}", e)))?;
            if n == 0 {
                break;
            }
            data.write_all(&block[..n])
                .map_err(|e| Error::Transfer(format!("Data connection lost: {}", e)))?;
            sent += n as u64;
            self.statistics.bytes_sent += n as u64;
            on_block(&block[..n])?;
        }

        data.flush()?;
        drop(data);

        let reply = self.read_reply()?;
        if !reply.is_completion() {
            return Err(Error::Transfer(format!(
                "Server did not confirm STOR {}: {}",
                remote_name, reply
            )));
        }
        Ok(sent)
    }

    /// Close the session with `QUIT`
    pub fn quit(mut self) -> Result<()> {
        let result = self.execute(&Command::Quit);
        self.state = SessionState::Closed;
        let _ = self.writer.shutdown(Shutdown::Both);

        let stats = &self.statistics;
        tracing::debug!(
            commands = stats.commands_sent,
            replies = stats.replies_received,
            bytes = stats.bytes_sent,
            "Session closed"
        );
        result.map(|_| ())
    }

    fn send(&mut self, command: &Command) -> Result<()> {
        command.validate()?;
        tracing::debug!(command = %command, "-> control");
        self.writer.write_all(command.to_wire().as_bytes())?;
        self.writer.flush()?;
        self.statistics.commands_sent += 1;
        Ok(())
    }

    fn read_reply(&mut self) -> Result<Reply> {
        let reply = protocol::read_reply(&mut self.reader)?;
        self.statistics.replies_received += 1;
        tracing::debug!(code = reply.code, reply = %reply, "<- control");
        Ok(reply)
    }

    /// Negotiate a passive data address, falling back to `EPSV`.
    ///
    /// The host part of a `227` reply is ignored in favour of the control
    /// connection's peer; servers behind NAT routinely advertise private
    /// addresses.
    fn passive_address(&mut self) -> Result<SocketAddr> {
        let reply = self.execute(&Command::Pasv)?;
        if reply.code == 227 {
            let advertised = protocol::parse_pasv(&reply.text())?;
            if SocketAddr::from(advertised).ip() != self.peer.ip() {
                tracing::debug!(%advertised, peer = %self.peer, "Ignoring advertised PASV host");
            }
            return Ok(SocketAddr::new(self.peer.ip(), advertised.port()));
        }

        if reply.class() == ReplyClass::PermanentNegative {
            let reply = self.execute(&Command::Epsv)?;
            if reply.code == 229 {
                let port = protocol::parse_epsv(&reply.text())?;
                return Ok(SocketAddr::new(self.peer.ip(), port));
            }
            return Err(Error::Transfer(format!("Passive mode refused: {}", reply)));
        }

        Err(Error::Transfer(format!("Passive mode refused: {}", reply)))
    }
}

impl Drop for FtpSession {
    fn drop(&mut self) {
        if self.state != SessionState::Closed {
            let _ = self.writer.write_all(Command::Quit.to_wire().as_bytes());
            let _ = self.writer.shutdown(Shutdown::Both);
            self.state = SessionState::Closed;
        }
    }
}

fn open_stream(host: &str, port: u16, timeout: Duration) -> Result<TcpStream> {
    let addrs = (host, port)
        .to_socket_addrs()
        .map_err(|e| Error::Connection(format!("Cannot resolve {}: {}", host, e)))?;

    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                tracing::debug!(%addr, error = %e, "Connect attempt failed");
                last_error = Some(e);
            }
        }
    }

    Err(Error::Connection(match last_error {
        Some(e) => format!("Cannot connect to {}:{}: {}", host, port, e),
        None => format!("No addresses found for {}", host),
    }))
}

/// Fill `buf` from `reader`, stopping early only at end of input
fn read_block<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    /// Reader that hands out at most `chunk` bytes per call
    struct Trickle<'a> {
        data: &'a [u8],
        chunk: usize,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.chunk.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    #[test]
    fn test_config_defaults() {
        let config = TransportConfig::new("ftp.example.com");
        assert_eq!(config.host, "ftp.example.com");
        assert_eq!(config.port, 21);
        assert_eq!(config.connect_timeout(), Duration::from_secs(30));
        assert_eq!(config.io_timeout(), Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_zero_timeouts_are_clamped() {
        let config = TransportConfig {
            connect_timeout: 0,
            io_timeout: Some(0),
            ..Default::default()
        };
        assert_eq!(config.connect_timeout(), Duration::from_secs(1));
        assert_eq!(config.io_timeout(), None);
    }

    #[test]
    fn test_read_block_fills_across_short_reads() {
        let data: Vec<u8> = (0..25u8).collect();
        let mut reader = Trickle { data: &data, chunk: 3 };
        let mut buf = [0u8; 10];

        assert_eq!(read_block(&mut reader, &mut buf).unwrap(), 10);
        assert_eq!(&buf[..], &data[..10]);
        assert_eq!(read_block(&mut reader, &mut buf).unwrap(), 10);
        assert_eq!(read_block(&mut reader, &mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], &data[20..]);
        assert_eq!(read_block(&mut reader, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_refused_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = TransportConfig {
            port,
            connect_timeout: 2,
            ..TransportConfig::new("127.0.0.1")
        };
        assert!(matches!(FtpSession::connect(config), Err(Error::Connection(_))));
    }

    #[test]
    fn test_unresolvable_host() {
        let config = TransportConfig::new("host.invalid");
        assert!(matches!(FtpSession::connect(config), Err(Error::Connection(_))));
    }
}
