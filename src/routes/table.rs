//! Resolved source-to-target routes
//!
//! One route per source address, each with at most one live session. The
//! table is small and scanned linearly.

use std::net::{IpAddr, SocketAddr};

use crate::reactor::Token;

/// A resolved route and its session marker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    source: IpAddr,
    target: SocketAddr,
    active: Option<Token>,
}

impl Route {
    #[must_use]
    pub const fn source(&self) -> IpAddr {
        self.source
    }

    #[must_use]
    pub const fn target(&self) -> SocketAddr {
        self.target
    }

    /// Client descriptor of the live session, if any
    #[must_use]
    pub const fn active(&self) -> Option<Token> {
        self.active
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active.is_some()
    }
}

/// Outcome of [`RouteTable::upsert`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteChange {
    /// New source address
    Inserted,
    /// Idle route retargeted in place
    Updated,
    /// Live session closed, then the route retargeted
    Replaced { closed: Token },
}

#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }

    #[must_use]
    pub fn find(&self, source: IpAddr) -> Option<&Route> {
        self.routes.iter().find(|r| r.source == source)
    }

    /// Insert a route or retarget the existing one for `source`
    ///
    /// A live session on the existing route is handed to `close_session`
    /// before the target changes; the route is left idle afterwards.
    pub fn upsert<F>(&mut self, source: IpAddr, target: SocketAddr, close_session: F) -> RouteChange
    where
        F: FnOnce(Token),
    {
        let Some(index) = self.routes.iter().position(|r| r.source == source) else {
            self.routes.push(Route {
                source,
                target,
                active: None,
            });
            return RouteChange::Inserted;
        };

        let route = &mut self.routes[index];
        match route.active.take() {
            None => {
                route.target = target;
                RouteChange::Updated
            }
            Some(closed) => {
                close_session(closed);
                route.target = target;
                RouteChange::Replaced { closed }
            }
        }
    }

    /// Mark the idle route for `source` as carrying `token`'s session
    ///
    /// Returns false if there is no such route or it is already active.
    pub fn activate(&mut self, source: IpAddr, token: Token) -> bool {
        match self.routes.iter_mut().find(|r| r.source == source) {
            Some(route) if route.active.is_none() => {
                route.active = Some(token);
                true
            }
            _ => false,
        }
    }

    /// Clear the marker of the route whose session is `token`
    ///
    /// Returns the freed route's source address.
    pub fn release(&mut self, token: Token) -> Option<IpAddr> {
        let route = self
            .routes
            .iter_mut()
            .find(|r| r.active == Some(token))?;
        route.active = None;
        Some(route.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactor::{Endpoint, Handler, Registry};
    use std::net::TcpListener;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    /// Real tokens from a throwaway registry
    fn tokens(n: usize) -> (Registry, Vec<Token>) {
        let mut registry = Registry::with_capacity(n);
        let tokens = (0..n)
            .map(|_| {
                let listener = TcpListener::bind("127.0.0.1:0").unwrap();
                registry
                    .register(Endpoint::Listener(listener), None, Some(Handler::Accept), None)
                    .unwrap()
            })
            .collect();
        (registry, tokens)
    }

    #[test]
    fn test_insert_and_find() {
        let mut table = RouteTable::new();
        let change = table.upsert(ip("10.0.0.1"), addr("10.0.0.2:8080"), |_| {
            panic!("nothing to close")
        });

        assert_eq!(change, RouteChange::Inserted);
        let route = table.find(ip("10.0.0.1")).unwrap();
        assert_eq!(route.target(), addr("10.0.0.2:8080"));
        assert!(!route.is_active());
        assert!(table.find(ip("10.0.0.9")).is_none());
    }

    #[test]
    fn test_idle_duplicate_updates_in_place() {
        let mut table = RouteTable::new();
        table.upsert(ip("10.0.0.1"), addr("10.0.0.2:8080"), |_| {});
        let change = table.upsert(ip("10.0.0.1"), addr("10.0.0.3:80"), |_| {
            panic!("idle route has no session")
        });

        assert_eq!(change, RouteChange::Updated);
        assert_eq!(table.len(), 1);
        assert_eq!(
            table.find(ip("10.0.0.1")).unwrap().target(),
            addr("10.0.0.3:80")
        );
    }

    #[test]
    fn test_active_duplicate_closes_first() {
        let (_registry, tokens) = tokens(1);
        let session = tokens[0];

        let mut table = RouteTable::new();
        table.upsert(ip("10.0.0.1"), addr("10.0.0.2:8080"), |_| {});
        assert!(table.activate(ip("10.0.0.1"), session));

        let mut closed = None;
        let change = table.upsert(ip("10.0.0.1"), addr("10.0.0.3:80"), |t| closed = Some(t));

        assert_eq!(change, RouteChange::Replaced { closed: session });
        assert_eq!(closed, Some(session));
        let route = table.find(ip("10.0.0.1")).unwrap();
        assert_eq!(route.target(), addr("10.0.0.3:80"));
        assert!(!route.is_active());
    }

    #[test]
    fn test_single_session_per_route() {
        let (_registry, tokens) = tokens(2);
        let mut table = RouteTable::new();
        table.upsert(ip("10.0.0.1"), addr("10.0.0.2:8080"), |_| {});

        assert!(table.activate(ip("10.0.0.1"), tokens[0]));
        assert!(!table.activate(ip("10.0.0.1"), tokens[1]));
        assert!(!table.activate(ip("10.0.0.7"), tokens[1]));
        assert_eq!(table.iter().filter(|r| r.is_active()).count(), 1);
        assert_eq!(table.find(ip("10.0.0.1")).unwrap().active(), Some(tokens[0]));
    }

    #[test]
    fn test_release() {
        let (_registry, tokens) = tokens(2);
        let mut table = RouteTable::new();
        table.upsert(ip("10.0.0.1"), addr("10.0.0.2:8080"), |_| {});
        table.activate(ip("10.0.0.1"), tokens[0]);

        assert_eq!(table.release(tokens[1]), None);
        assert_eq!(table.release(tokens[0]), Some(ip("10.0.0.1")));
        assert_eq!(table.release(tokens[0]), None);
        assert!(!table.find(ip("10.0.0.1")).unwrap().is_active());
    }
}
