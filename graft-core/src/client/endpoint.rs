//! Executor addresses.

use crate::error::{GraftError, Result};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Default executor address.
pub const DEFAULT_ADDR: &str = "tcp://127.0.0.1:8372";

/// Where the executor listens.
///
/// Accepted forms are `tcp://host:port` and `unix:///path/to/socket`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Tcp(String),
    Unix(PathBuf),
}

impl FromStr for Endpoint {
    type Err = GraftError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| GraftError::InvalidEndpoint {
            endpoint: s.to_string(),
            reason: reason.to_string(),
        };

        if let Some(rest) = s.strip_prefix("tcp://") {
            let (host, port) = rest.rsplit_once(':').ok_or_else(|| invalid("missing port"))?;
            if host.is_empty() {
                return Err(invalid("missing host"));
            }
            port.parse::<u16>().map_err(|_| invalid("port must be a number in 0-65535"))?;
            return Ok(Endpoint::Tcp(rest.to_string()));
        }

        if let Some(path) = s.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(invalid("missing socket path"));
            }
            return Ok(Endpoint::Unix(PathBuf::from(path)));
        }

        Err(invalid("expected tcp://host:port or unix:///path"))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Endpoint::Tcp(addr) => write!(f, "tcp://{}", addr),
            Endpoint::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Endpoint::Tcp("127.0.0.1:8372".to_string())
    }
}
