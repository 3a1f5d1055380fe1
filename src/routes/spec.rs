//! Route definitions as written by operators
//!
//! A route line names a source host and a target `host:port`:
//!
//! ```text
//! 10.0.0.1 10.0.0.2:8080
//! client.example.org [2001:db8::1]:22
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::RouteError;

/// Unresolved route: `<source-host> <target-host>:<port>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSpec {
    pub source_host: String,
    pub target_host: String,
    pub target_port: u16,
}

impl RouteSpec {
    pub fn new(
        source_host: impl Into<String>,
        target_host: impl Into<String>,
        target_port: u16,
    ) -> Self {
        Self {
            source_host: source_host.into(),
            target_host: target_host.into(),
            target_port,
        }
    }
}

impl FromStr for RouteSpec {
    type Err = RouteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut fields = s.split_whitespace();
        let (Some(source), Some(target), None) = (fields.next(), fields.next(), fields.next())
        else {
            return Err(RouteError::invalid(s.trim()));
        };

        let (host, port) = target
            .rsplit_once(':')
            .ok_or_else(|| RouteError::invalid(s.trim()))?;
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);

        let port: u16 = port.parse().map_err(|_| RouteError::invalid(s.trim()))?;
        if host.is_empty() || port == 0 {
            return Err(RouteError::invalid(s.trim()));
        }

        Ok(Self::new(source, host, port))
    }
}

impl fmt::Display for RouteSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.target_host.contains(':') {
            write!(
                f,
                "{} [{}]:{}",
                self.source_host, self.target_host, self.target_port
            )
        } else {
            write!(
                f,
                "{} {}:{}",
                self.source_host, self.target_host, self.target_port
            )
        }
    }
}
