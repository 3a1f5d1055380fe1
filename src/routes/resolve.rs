//! Host name resolution

use std::net::{IpAddr, ToSocketAddrs};

use tracing::debug;

use crate::error::RouteError;

/// Turns a host name or address literal into addresses
pub trait Resolver {
    /// All addresses for `host`, deduplicated, in resolver order
    ///
    /// # Errors
    ///
    /// Returns `RouteError::Resolve` when the lookup fails and
    /// `RouteError::NoAddress` when it yields nothing.
    fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, RouteError>;
}

/// Resolver backed by the system's `getaddrinfo`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl Resolver for SystemResolver {
    fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, RouteError> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(vec![ip]);
        }

        let addrs = (host, 0u16)
            .to_socket_addrs()
            .map_err(|e| RouteError::resolve(host, e.to_string()))?;

        let mut ips = Vec::new();
        for addr in addrs {
            let ip = addr.ip();
            if !ips.contains(&ip) {
                ips.push(ip);
            }
        }

        if ips.is_empty() {
            return Err(RouteError::NoAddress { host: host.into() });
        }

        debug!("Resolved {} to {:?}", host, ips);
        Ok(ips)
    }
}

#[cfg(test)]
pub use self::fixed::StaticResolver;

#[cfg(test)]
mod fixed {
    use std::collections::HashMap;
    use std::net::IpAddr;

    use super::Resolver;
    use crate::error::RouteError;

    /// In-memory host table; address literals pass through
    #[derive(Debug, Clone, Default)]
    pub struct StaticResolver {
        hosts: HashMap<String, Vec<IpAddr>>,
    }

    impl StaticResolver {
        pub fn with(mut self, host: &str, addrs: &[&str]) -> Self {
            let ips = addrs.iter().map(|a| a.parse().unwrap()).collect();
            self.hosts.insert(host.to_string(), ips);
            self
        }
    }

    impl Resolver for StaticResolver {
        fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, RouteError> {
            if let Ok(ip) = host.parse::<IpAddr>() {
                return Ok(vec![ip]);
            }
            match self.hosts.get(host) {
                Some(ips) if ips.is_empty() => Err(RouteError::NoAddress { host: host.into() }),
                Some(ips) => Ok(ips.clone()),
                None => Err(RouteError::resolve(host, "unknown host")),
            }
        }
    }
}
