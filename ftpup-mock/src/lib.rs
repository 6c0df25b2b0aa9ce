//! In-process FTP server for integration tests.
//!
//! Serves exactly one control connection on a loopback port, answering the
//! handful of commands the uploader issues and recording what it saw.

use ftpup_core::{ProgressSink, TransportConfig};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How the mock server should answer
#[derive(Debug, Clone)]
pub struct ServerBehavior {
    pub user: &'static str,
    pub pass: &'static str,
    pub directory: &'static str,
    /// Answer `USER` with 332 instead of 331
    pub account_required: bool,
    /// Answer `PASV` with 502 so the client has to use `EPSV`
    pub refuse_pasv: bool,
    /// Answer `STOR` with 553
    pub refuse_store: bool,
    /// Read this many data bytes, then drop both connections
    pub drop_after_bytes: Option<usize>,
}

impl Default for ServerBehavior {
    fn default() -> Self {
        Self {
            user: "deliveries",
            pass: "secret",
            directory: "/incoming",
            account_required: false,
            refuse_pasv: false,
            refuse_store: false,
            drop_after_bytes: None,
        }
    }
}

/// What the server observed
#[derive(Debug, Default)]
pub struct Recorded {
    /// Command lines in arrival order, CRLF stripped
    pub commands: Vec<String>,
    /// `(remote name, bytes)` per `STOR`
    pub stored: Vec<(String, Vec<u8>)>,
}

impl Recorded {
    pub fn verbs(&self) -> Vec<&str> {
        self.commands
            .iter()
            .map(|line| line.split(' ').next().unwrap_or(""))
            .collect()
    }
}

/// A mock server listening on a loopback port
pub struct MockFtpServer {
    pub port: u16,
    handle: JoinHandle<Recorded>,
}

impl MockFtpServer {
    pub fn start(behavior: ServerBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || serve(listener, behavior));
        Self { port, handle }
    }

    pub fn config(&self) -> TransportConfig {
        TransportConfig {
            port: self.port,
            connect_timeout: 5,
            io_timeout: Some(10),
            ..TransportConfig::new("127.0.0.1")
        }
    }

    /// Wait for the server thread and return what it recorded
    pub fn finish(self) -> Recorded {
        self.handle.join().unwrap()
    }
}

fn send(out: &mut TcpStream, reply: &str) {
    let _ = out.write_all(format!("{}\r\n", reply).as_bytes());
}

fn bind_data() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

fn serve(listener: TcpListener, behavior: ServerBehavior) -> Recorded {
    let mut recorded = Recorded::default();

    let (stream, _) = listener.accept().unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut out = stream;

    send(&mut out, "220-Welcome to the mock archive\r\n220 Ready for uploads");

    let mut user_ok = false;
    let mut data_listener: Option<TcpListener> = None;

    loop {
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let line = line.trim_end_matches(&['\r', '\n'][..]).to_string();
        recorded.commands.push(line.clone());

        let (verb, arg) = match line.split_once(' ') {
            Some((verb, arg)) => (verb.to_string(), arg.to_string()),
            None => (line.clone(), String::new()),
        };

        match verb.as_str() {
            "USER" if behavior.account_required => {
                send(&mut out, "332 Need account for login.");
            }
            "USER" => {
                user_ok = arg == behavior.user;
                send(&mut out, "331 Password required");
            }
            "PASS" => {
                if user_ok && arg == behavior.pass {
                    send(&mut out, "230 Logged in");
                } else {
                    send(&mut out, "530 Login incorrect.");
                }
            }
            "CWD" => {
                if arg == behavior.directory {
                    send(&mut out, "250 Directory successfully changed.");
                } else {
                    send(&mut out, "550 Failed to change directory.");
                }
            }
            "TYPE" => send(&mut out, "200 Switching to Binary mode."),
            "PASV" if behavior.refuse_pasv => send(&mut out, "502 PASV not implemented"),
            "PASV" => {
                let (data, port) = bind_data();
                data_listener = Some(data);
                // Deliberately unroutable host: clients must use the control peer
                send(
                    &mut out,
                    &format!(
                        "227 Entering Passive Mode (10,9,8,7,{},{}).",
                        port >> 8,
                        port & 0xff
                    ),
                );
            }
            "EPSV" => {
                let (data, port) = bind_data();
                data_listener = Some(data);
                send(
                    &mut out,
                    &format!("229 Entering Extended Passive Mode (|||{}|)", port),
                );
            }
            "STOR" if behavior.refuse_store => {
                data_listener = None;
                send(&mut out, "553 Could not create file.");
            }
            "STOR" => {
                let data = match data_listener.take() {
                    Some(data) => data,
                    None => {
                        send(&mut out, "425 Use PASV first.");
                        continue;
                    }
                };
                send(&mut out, "150 Ok to send data.");
                let (mut conn, _) = data.accept().unwrap();

                match behavior.drop_after_bytes {
                    Some(limit) => {
                        let mut received = vec![0u8; limit];
                        let n = read_up_to(&mut conn, &mut received);
                        received.truncate(n);
                        recorded.stored.push((arg, received));
                        // Both sockets go away with the thread's locals
                        return recorded;
                    }
                    None => {
                        let mut received = Vec::new();
                        conn.read_to_end(&mut received).unwrap();
                        recorded.stored.push((arg, received));
                        send(&mut out, "226 Transfer complete.");
                    }
                }
            }
            "QUIT" => {
                send(&mut out, "221 Goodbye.");
                break;
            }
            _ => send(&mut out, "502 Command not implemented."),
        }
    }

    recorded
}

fn read_up_to(conn: &mut TcpStream, buf: &mut [u8]) -> usize {
    let mut filled = 0;
    while filled < buf.len() {
        match conn.read(&mut buf[filled..]) {
            Ok(0) | Err(_) => break,
            Ok(n) => filled += n,
        }
    }
    filled
}

/// Progress sink remembering every update
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub updates: Vec<(String, u8)>,
}

impl RecordingSink {
    pub fn percents(&self) -> Vec<u8> {
        self.updates.iter().map(|(_, percent)| *percent).collect()
    }
}

impl ProgressSink for RecordingSink {
    fn report(&mut self, file_label: &str, percent: u8) -> io::Result<()> {
        self.updates.push((file_label.to_string(), percent));
        Ok(())
    }
}

/// Deterministic, non-repeating-looking payload
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}
