use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PulseError;

/// Credentials for an authenticating proxy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyCredentials {
    pub username: String,
    pub password: String,
}

/// A parsed proxy address, immutable once constructed
///
/// Canonical textual form is `host:port` or `host:port:username:password`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyAddress {
    pub host: String,
    pub port: u16,
    pub credentials: Option<ProxyCredentials>,
}

impl ProxyAddress {
    /// Get the `host:port` dial address
    pub fn dial_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Parse a batch of raw lines, silently dropping blanks and
    /// anything that does not parse
    pub fn parse_lines<S: AsRef<str>>(lines: &[S]) -> Vec<ProxyAddress> {
        lines
            .iter()
            .map(|line| line.as_ref().trim())
            .filter(|line| !line.is_empty())
            .filter_map(|line| line.parse().ok())
            .collect()
    }
}

impl FromStr for ProxyAddress {
    type Err = PulseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split(':').collect();

        let (host, port_str, credentials) = match parts.as_slice() {
            [host, port] => (*host, *port, None),
            [host, port, username, password] => (
                *host,
                *port,
                Some(ProxyCredentials {
                    username: (*username).to_string(),
                    password: (*password).to_string(),
                }),
            ),
            _ => return Err(PulseError::InvalidProxyAddress(s.to_string())),
        };

        if host.is_empty() {
            return Err(PulseError::InvalidProxyAddress(s.to_string()));
        }

        let port = port_str
            .parse::<u16>()
            .map_err(|_| PulseError::InvalidProxyAddress(s.to_string()))?;

        Ok(ProxyAddress {
            host: host.to_string(),
            port,
            credentials,
        })
    }
}

impl fmt::Display for ProxyAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.credentials {
            Some(creds) => write!(
                f,
                "{}:{}:{}:{}",
                self.host, self.port, creds.username, creds.password
            ),
            None => write!(f, "{}:{}", self.host, self.port),
        }
    }
}
