use std::fmt;
use std::str::FromStr;

use crate::error::LinkError;

/// Port used when an address omits one.
pub const DEFAULT_PORT: u16 = 6666;

/// Host used to mean "all interfaces".
pub const WILDCARD_HOST: &str = "*";

/// A TCP host/port descriptor.
///
/// Accepts `host`, `host:port`, `[v6]:port`, with or without a
/// `tcp://` prefix. `*` binds every interface.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// All interfaces on `port`.
    pub fn wildcard(port: u16) -> Self {
        Self::new(WILDCARD_HOST, port)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_wildcard(&self) -> bool {
        self.host == WILDCARD_HOST
    }

    /// Parse `[tcp://]host[:port]`, using `default_port` when none is given.
    pub fn parse(s: &str, default_port: u16) -> Result<Self, LinkError> {
        let invalid = || LinkError::InvalidEndpoint(s.to_string());
        let rest = s.trim();
        let rest = rest.strip_prefix("tcp://").unwrap_or(rest);
        if rest.is_empty() {
            return Err(invalid());
        }

        let (host, port) = if let Some(bracketed) = rest.strip_prefix('[') {
            let (host, tail) = bracketed.split_once(']').ok_or_else(invalid)?;
            let port = match tail {
                "" => None,
                t => Some(t.strip_prefix(':').ok_or_else(invalid)?),
            };
            (host, port)
        } else if rest.matches(':').count() > 1 {
            // Bare IPv6 literal without a port.
            (rest, None)
        } else {
            match rest.split_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (rest, None),
            }
        };

        if host.is_empty() || host.contains(char::is_whitespace) {
            return Err(invalid());
        }
        let port = match port {
            Some(p) => p.parse::<u16>().map_err(|_| invalid())?,
            None => default_port,
        };
        Ok(Self::new(host, port))
    }

    /// Address handed to `TcpListener::bind`.
    pub fn bind_addr(&self) -> Result<String, LinkError> {
        if self.is_wildcard() {
            return Ok(format!("0.0.0.0:{}", self.port));
        }
        self.check_host()?;
        Ok(self.socket_string())
    }

    /// Address handed to `TcpStream::connect`. A wildcard cannot be dialled.
    pub fn connect_addr(&self) -> Result<String, LinkError> {
        if self.is_wildcard() {
            return Err(LinkError::InvalidEndpoint(self.to_string()));
        }
        self.check_host()?;
        Ok(self.socket_string())
    }

    fn check_host(&self) -> Result<(), LinkError> {
        if self.host.trim().is_empty() || self.host.contains(char::is_whitespace) {
            return Err(LinkError::InvalidEndpoint(self.to_string()));
        }
        Ok(())
    }

    fn socket_string(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for Endpoint {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s, DEFAULT_PORT)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tcp://{}", self.socket_string())
    }
}
