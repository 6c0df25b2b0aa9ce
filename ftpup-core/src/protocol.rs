//! FTP wire protocol
//!
//! This module defines the control-channel commands the uploader sends,
//! server reply parsing (including multi-line replies), and the
//! passive-mode address formats of RFC 959 and RFC 2428.

use crate::error::{Error, Result};
use std::fmt;
use std::io::{BufRead, Read};
use std::net::{Ipv4Addr, SocketAddrV4};

/// Upper bound on a single reply line; longer lines are a protocol error
const MAX_REPLY_LINE: usize = 8 * 1024;

/// Reply classes, keyed on the first digit of the reply code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyClass {
    /// 1xx: action started, expect another reply
    Preliminary,
    /// 2xx: action completed
    Completion,
    /// 3xx: more information needed
    Intermediate,
    /// 4xx: action not taken, may succeed later
    TransientNegative,
    /// 5xx: action not taken
    PermanentNegative,
}

/// One complete server reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Three-digit reply code
    pub code: u16,
    /// Raw reply lines, code prefix included, line terminators stripped
    pub lines: Vec<String>,
}

impl Reply {
    /// Reply class of this reply's code
    pub fn class(&self) -> ReplyClass {
        match self.code / 100 {
            1 => ReplyClass::Preliminary,
            2 => ReplyClass::Completion,
            3 => ReplyClass::Intermediate,
            4 => ReplyClass::TransientNegative,
            _ => ReplyClass::PermanentNegative,
        }
    }

    pub fn is_preliminary(&self) -> bool {
        self.class() == ReplyClass::Preliminary
    }

    pub fn is_completion(&self) -> bool {
        self.class() == ReplyClass::Completion
    }

    pub fn is_intermediate(&self) -> bool {
        self.class() == ReplyClass::Intermediate
    }

    pub fn is_negative(&self) -> bool {
        matches!(
            self.class(),
            ReplyClass::TransientNegative | ReplyClass::PermanentNegative
        )
    }

    /// All reply lines joined with `\n`
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}

/// Representation type for `TYPE`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferType {
    /// `TYPE I`
    Binary,
}

/// Control-channel commands
#[derive(Clone, PartialEq, Eq)]
pub enum Command {
    User(String),
    Pass(String),
    Cwd(String),
    Type(TransferType),
    Pasv,
    Epsv,
    Stor(String),
    Quit,
}

impl Command {
    fn argument(&self) -> Option<&str> {
        match self {
            Command::User(arg) | Command::Pass(arg) | Command::Cwd(arg) | Command::Stor(arg) => {
                Some(arg)
            }
            _ => None,
        }
    }

    /// Reject arguments that would smuggle a second command onto the wire
    pub fn validate(&self) -> Result<()> {
        match self.argument() {
            Some(arg) if arg.contains(&['\r', '\n'][..]) => Err(Error::InvalidInput(format!(
                "{} argument contains a line break",
                self.verb()
            ))),
            _ => Ok(()),
        }
    }

    pub fn verb(&self) -> &'static str {
        match self {
            Command::User(_) => "USER",
            Command::Pass(_) => "PASS",
            Command::Cwd(_) => "CWD",
            Command::Type(_) => "TYPE",
            Command::Pasv => "PASV",
            Command::Epsv => "EPSV",
            Command::Stor(_) => "STOR",
            Command::Quit => "QUIT",
        }
    }

    /// Exact line sent to the server, CRLF included
    pub fn to_wire(&self) -> String {
        match self {
            Command::Type(TransferType::Binary) => "TYPE I\r\n".to_string(),
            other => match other.argument() {
                Some(arg) => format!("{} {}\r\n", other.verb(), arg),
                None => format!("{}\r\n", other.verb()),
            },
        }
    }
}

/// Log-safe rendering: the password never leaves `to_wire`
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Pass(_) => f.write_str("PASS ****"),
            other => f.write_str(other.to_wire().trim_end()),
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Command({})", self)
    }
}

fn read_line<R: BufRead>(reader: &mut R) -> Result<String> {
    let mut buf = Vec::new();
    let n = Read::take(&mut *reader, MAX_REPLY_LINE as u64 + 1).read_until(b'\n', &mut buf)?;
    if n == 0 {
        return Err(Error::Connection("Connection closed by server".to_string()));
    }
    if buf.len() > MAX_REPLY_LINE {
        return Err(Error::Protocol("Reply line too long".to_string()));
    }
    let line = String::from_utf8_lossy(&buf);
    Ok(line.trim_end_matches(&['\r', '\n'][..]).to_string())
}

/// Split a reply line into its code and the separator byte after it
fn parse_code(line: &str) -> Option<(u16, u8)> {
    let bytes = line.as_bytes();
    if bytes.len() < 3 || !bytes[..3].iter().all(u8::is_ascii_digit) {
        return None;
    }
    let code: u16 = line[..3].parse().ok()?;
    if !(100..600).contains(&code) {
        return None;
    }
    Some((code, bytes.get(3).copied().unwrap_or(b' ')))
}

/// Read one complete reply from the control channel
pub fn read_reply<R: BufRead>(reader: &mut R) -> Result<Reply> {
    let first = read_line(reader)?;
    let (code, separator) = parse_code(&first)
        .ok_or_else(|| Error::Protocol(format!("Malformed reply: {:?}", first)))?;

    let mut lines = vec![first];
    if separator == b'-' {
        loop {
            let line = read_line(reader)?;
            let last = matches!(parse_code(&line), Some((c, sep)) if c == code && sep != b'-');
            lines.push(line);
            if last {
                break;
            }
        }
    }

    Ok(Reply { code, lines })
}

/// Extract the data address from a `227` reply
pub fn parse_pasv(text: &str) -> Result<SocketAddrV4> {
    text.split(|c: char| !(c.is_ascii_digit() || c == ','))
        .find_map(|token| {
            let fields = token
                .split(',')
                .map(|field| field.parse::<u8>().ok())
                .collect::<Option<Vec<u8>>>()?;
            if fields.len() != 6 {
                return None;
            }
            let ip = Ipv4Addr::new(fields[0], fields[1], fields[2], fields[3]);
            let port = u16::from(fields[4]) << 8 | u16::from(fields[5]);
            Some(SocketAddrV4::new(ip, port))
        })
        .ok_or_else(|| Error::Protocol(format!("Malformed PASV reply: {}", text)))
}

/// Extract the data port from a `229` reply, e.g. `(|||6446|)`
pub fn parse_epsv(text: &str) -> Result<u16> {
    let malformed = || Error::Protocol(format!("Malformed EPSV reply: {}", text));

    let start = text.find('(').ok_or_else(malformed)?;
    let end = text[start..].find(')').ok_or_else(malformed)? + start;
    let inner = &text[start + 1..end];
    let delimiter = inner.chars().next().ok_or_else(malformed)?;

    let fields: Vec<&str> = inner.split(delimiter).collect();
    if fields.len() != 5 {
        return Err(malformed());
    }
    fields[3].parse::<u16>().map_err(|_| malformed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_single_line_reply() {
        let mut input = Cursor::new(b"220 Service ready\r\n".to_vec());
        let reply = read_reply(&mut input).unwrap();
        assert_eq!(reply.code, 220);
        assert_eq!(reply.lines, vec!["220 Service ready".to_string()]);
        assert!(reply.is_completion());
    }

    #[test]
    fn test_multi_line_reply() {
        let raw = b"220-Welcome to the archive\r\n220-Uploads go to /incoming\r\n 220 is not the end\r\n220 Ready\r\n331 next\r\n";
        let mut input = Cursor::new(raw.to_vec());

        let reply = read_reply(&mut input).unwrap();
        assert_eq!(reply.code, 220);
        assert_eq!(reply.lines.len(), 4);
        assert_eq!(
            reply.text(),
            "220-Welcome to the archive\n220-Uploads go to /incoming\n 220 is not the end\n220 Ready"
        );

        let next = read_reply(&mut input).unwrap();
        assert_eq!(next.code, 331);
        assert!(next.is_intermediate());
    }

    #[test]
    fn test_reply_classes() {
        let reply = |code| Reply { code, lines: vec![] };
        assert_eq!(reply(150).class(), ReplyClass::Preliminary);
        assert_eq!(reply(226).class(), ReplyClass::Completion);
        assert_eq!(reply(331).class(), ReplyClass::Intermediate);
        assert_eq!(reply(421).class(), ReplyClass::TransientNegative);
        assert_eq!(reply(530).class(), ReplyClass::PermanentNegative);
        assert!(reply(421).is_negative());
        assert!(reply(550).is_negative());
    }

    #[test]
    fn test_eof_is_connection_error() {
        let mut input = Cursor::new(Vec::new());
        assert!(matches!(read_reply(&mut input), Err(Error::Connection(_))));

        let mut truncated = Cursor::new(b"220-first line only\r\n".to_vec());
        assert!(matches!(read_reply(&mut truncated), Err(Error::Connection(_))));
    }

    #[test]
    fn test_garbage_is_protocol_error() {
        let mut input = Cursor::new(b"hello there\r\n".to_vec());
        assert!(matches!(read_reply(&mut input), Err(Error::Protocol(_))));

        let mut input = Cursor::new(b"999 out of range\r\n".to_vec());
        assert!(matches!(read_reply(&mut input), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_overlong_line_is_rejected() {
        let mut raw = b"220 ".to_vec();
        raw.extend(std::iter::repeat(b'x').take(MAX_REPLY_LINE));
        raw.extend_from_slice(b"\r\n");
        let mut input = Cursor::new(raw);
        assert!(matches!(read_reply(&mut input), Err(Error::Protocol(_))));

        // Lines up to the limit still parse and leave the stream positioned
        let mut input = Cursor::new(b"220-banner\r\n220 ok\r\n230 in\r\n".to_vec());
        assert_eq!(read_reply(&mut input).unwrap().lines.len(), 2);
        assert_eq!(read_reply(&mut input).unwrap().code, 230);
    }

    #[test]
    fn test_command_wire_format() {
        assert_eq!(Command::User("anon".into()).to_wire(), "USER anon\r\n");
        assert_eq!(Command::Cwd("/incoming".into()).to_wire(), "CWD /incoming\r\n");
        assert_eq!(Command::Type(TransferType::Binary).to_wire(), "TYPE I\r\n");
        assert_eq!(Command::Stor("bar.mp4".into()).to_wire(), "STOR bar.mp4\r\n");
        assert_eq!(Command::Quit.to_wire(), "QUIT\r\n");
    }

    #[test]
    fn test_password_is_masked() {
        let pass = Command::Pass("hunter2".into());
        assert_eq!(pass.to_wire(), "PASS hunter2\r\n");
        assert_eq!(pass.to_string(), "PASS ****");
        assert!(!format!("{:?}", pass).contains("hunter2"));
    }

    #[test]
    fn test_line_breaks_rejected() {
        let cmd = Command::Stor("evil\r\nDELE x".into());
        assert!(matches!(cmd.validate(), Err(Error::InvalidInput(_))));
        assert!(Command::Stor("fine name.bin".into()).validate().is_ok());
    }

    #[test]
    fn test_parse_pasv() {
        let addr = parse_pasv("227 Entering Passive Mode (192,168,1,20,195,80).").unwrap();
        assert_eq!(addr, SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 20), 50000));

        let bare = parse_pasv("227 =10,0,0,1,4,1").unwrap();
        assert_eq!(bare.port(), 1025);

        assert!(parse_pasv("227 Entering Passive Mode").is_err());
        assert!(parse_pasv("227 (300,0,0,1,4,1)").is_err());
    }

    #[test]
    fn test_parse_epsv() {
        assert_eq!(parse_epsv("229 Entering Extended Passive Mode (|||6446|)").unwrap(), 6446);
        assert_eq!(parse_epsv("229 ok (!!!21000!)").unwrap(), 21000);
        assert!(parse_epsv("229 Entering Extended Passive Mode").is_err());
        assert!(parse_epsv("229 (|||notaport|)").is_err());
    }
}
