//! An authenticated POP3 session over any byte stream.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;

use tracing::{debug, trace, warn};

use super::response::{self, Status};
use crate::error::{FetchError, Result};
use crate::model::message::{Listing, MessageNumber};
use crate::pipeline::MailSource;

/// A byte stream a session can run over.
pub trait Transport: Read + Write {
    /// Orderly shutdown after `QUIT`. Dropping the stream closes it anyway.
    fn shutdown(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Transport for native_tls::TlsStream<TcpStream> {
    fn shutdown(&mut self) -> std::io::Result<()> {
        native_tls::TlsStream::shutdown(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Authorization,
    Transaction,
    Closed,
}

/// A POP3 session in the TRANSACTION state.
///
/// Obtained through [`Pop3Session::establish`], which only returns once the
/// server has accepted the credentials.
pub struct Pop3Session<S: Transport> {
    stream: BufReader<S>,
    state: State,
}

impl<S: Transport> Pop3Session<S> {
    /// Read the greeting and log in with `USER` / `PASS`.
    ///
    /// `addr` is only used for error messages. If the server rejects the
    /// credentials the session is closed before the error is returned.
    pub fn establish(stream: S, addr: &str, username: &str, password: &str) -> Result<Self> {
        let mut session = Self {
            stream: BufReader::new(stream),
            state: State::Authorization,
        };

        let greeting = session.read_line().map_err(|e| FetchError::Connection {
            addr: addr.to_string(),
            reason: e.to_string(),
        })?;
        match response::parse_status(&greeting) {
            Some(Status::Ok(text)) => debug!(greeting = %text, "Server ready"),
            _ => {
                return Err(FetchError::Connection {
                    addr: addr.to_string(),
                    reason: format!("unexpected greeting: {greeting}"),
                })
            }
        }

        if let Err(e) = session.login(username, password) {
            session.close();
            return Err(e);
        }
        session.state = State::Transaction;
        Ok(session)
    }

    fn login(&mut self, username: &str, password: &str) -> Result<()> {
        let auth_err = |reason: String| FetchError::Auth {
            user: username.to_string(),
            reason,
        };

        match self.exchange(&format!("USER {username}"), "USER") {
            Ok(Status::Ok(_)) => {}
            Ok(Status::Err(text)) => return Err(auth_err(text)),
            Err(e) => return Err(auth_err(e.to_string())),
        }
        match self.exchange(&format!("PASS {password}"), "PASS") {
            Ok(Status::Ok(_)) => Ok(()),
            Ok(Status::Err(text)) => Err(auth_err(text)),
            Err(e) => Err(auth_err(e.to_string())),
        }
    }

    /// Send a command and read its status line.
    ///
    /// `shown` is what gets logged in place of the wire text.
    fn exchange(&mut self, wire: &str, shown: &str) -> Result<Status> {
        trace!(command = shown, "Sending");
        let io_err = |e: std::io::Error| FetchError::protocol(shown, e.to_string());
        let out = self.stream.get_mut();
        out.write_all(wire.as_bytes()).map_err(io_err)?;
        out.write_all(b"\r\n").map_err(io_err)?;
        out.flush().map_err(io_err)?;

        let line = self.read_line().map_err(io_err)?;
        response::parse_status(&line)
            .ok_or_else(|| FetchError::protocol(shown, format!("unexpected reply: {line}")))
    }

    /// Send a command that must succeed; `-ERR` becomes a `Protocol` error.
    fn command(&mut self, command: &str, number: Option<MessageNumber>) -> Result<String> {
        self.ensure_open(command)?;
        match self.exchange(command, command) {
            Ok(Status::Ok(text)) => Ok(text),
            Ok(Status::Err(text)) => Err(FetchError::Protocol {
                command: command.to_string(),
                number,
                reason: format!("-ERR {text}"),
            }),
            Err(FetchError::Protocol { command, reason, .. }) => Err(FetchError::Protocol {
                command,
                number,
                reason,
            }),
            Err(e) => Err(e),
        }
    }

    /// Read the body of a multi-line reply up to the terminating `.` line.
    fn read_multiline(&mut self, command: &str, number: Option<MessageNumber>) -> Result<Vec<u8>> {
        let mut body = Vec::new();
        let mut line = Vec::with_capacity(1024);
        loop {
            line.clear();
            let n = self
                .stream
                .read_until(b'\n', &mut line)
                .map_err(|e| FetchError::Protocol {
                    command: command.to_string(),
                    number,
                    reason: e.to_string(),
                })?;
            if n == 0 || !line.ends_with(b"\n") {
                return Err(FetchError::Protocol {
                    command: command.to_string(),
                    number,
                    reason: "connection closed before end of reply".to_string(),
                });
            }
            if response::is_terminator(&line) {
                return Ok(body);
            }
            body.extend_from_slice(response::unstuff_line(&line));
            body.push(b'\n');
        }
    }

    fn read_line(&mut self) -> std::io::Result<String> {
        let mut buf = Vec::new();
        let n = self.stream.read_until(b'\n', &mut buf)?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed by server",
            ));
        }
        Ok(response::trim_line(&buf))
    }

    fn ensure_open(&self, command: &str) -> Result<()> {
        if self.state == State::Transaction {
            Ok(())
        } else {
            Err(FetchError::protocol(command, "session is not authenticated"))
        }
    }
}

impl<S: Transport> MailSource for Pop3Session<S> {
    fn list_all(&mut self) -> Result<Vec<Listing>> {
        self.command("LIST", None)?;
        let body = self.read_multiline("LIST", None)?;
        let mut listings = Vec::new();
        for line in String::from_utf8_lossy(&body).lines() {
            let listing = response::parse_listing(line).ok_or_else(|| {
                FetchError::protocol("LIST", format!("malformed scan listing: {line}"))
            })?;
            listings.push(listing);
        }
        listings.sort_by_key(|l| l.number);
        Ok(listings)
    }

    fn fetch(&mut self, number: MessageNumber) -> Result<Vec<u8>> {
        let command = format!("RETR {number}");
        self.command(&command, Some(number))?;
        self.read_multiline(&command, Some(number))
    }

    fn delete(&mut self, number: MessageNumber) -> Result<()> {
        self.command(&format!("DELE {number}"), Some(number))?;
        Ok(())
    }

    fn close(&mut self) {
        if self.state == State::Closed {
            return;
        }
        self.state = State::Closed;

        match self.exchange("QUIT", "QUIT") {
            Ok(Status::Ok(_)) => debug!("Session closed"),
            Ok(Status::Err(text)) => warn!(reply = %text, "Server refused QUIT"),
            Err(e) => warn!(error = %e, "Failed to close session cleanly"),
        }
        if let Err(e) = self.stream.get_mut().shutdown() {
            warn!(error = %e, "Failed to shut down connection");
        }
    }
}
