//! POP3 over implicit TLS (RFC 1939 / RFC 8314).

pub mod response;
pub mod session;

use std::fmt;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use native_tls::{TlsConnector, TlsStream};
use tracing::{debug, info};

use crate::error::{FetchError, Result};
use crate::pipeline::Connect;

pub use session::{Pop3Session, Transport};

/// Standard port for POP3 over TLS.
pub const DEFAULT_PORT: u16 = 995;

/// Opens authenticated POP3S sessions to one mailbox.
#[derive(Clone)]
pub struct Pop3Connector {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Bounds connect, read and write on the socket.
    pub timeout: Duration,
}

impl fmt::Debug for Pop3Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pop3Connector")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Pop3Connector {
    fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn connection_error(&self, reason: impl fmt::Display) -> FetchError {
        FetchError::Connection {
            addr: self.addr(),
            reason: reason.to_string(),
        }
    }

    /// Connect over TCP, trying every resolved address in turn.
    fn connect_tcp(&self) -> Result<TcpStream> {
        let addrs = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| self.connection_error(e))?;

        let mut last_err = None;
        for addr in addrs {
            debug!(%addr, "Connecting");
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(stream) => {
                    stream
                        .set_read_timeout(Some(self.timeout))
                        .and_then(|_| stream.set_write_timeout(Some(self.timeout)))
                        .map_err(|e| self.connection_error(e))?;
                    return Ok(stream);
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(match last_err {
            Some(e) => self.connection_error(e),
            None => self.connection_error("host name resolved to no addresses"),
        })
    }
}

impl Connect for Pop3Connector {
    type Session = Pop3Session<TlsStream<TcpStream>>;

    fn open(&self) -> Result<Self::Session> {
        let tcp = self.connect_tcp()?;
        let connector = TlsConnector::new().map_err(|e| self.connection_error(e))?;
        let tls = connector
            .connect(&self.host, tcp)
            .map_err(|e| self.connection_error(format!("TLS handshake failed: {e}")))?;

        let session = Pop3Session::establish(tls, &self.addr(), &self.username, &self.password)?;
        info!(addr = %self.addr(), user = %self.username, "Authenticated");
        Ok(session)
    }
}
