//! Source-address routing
//!
//! Route lines (`<source-host> <target-host>:<port>`) are parsed into
//! [`RouteSpec`]s, resolved through a [`Resolver`] and stored in the
//! [`RouteTable`] keyed by source address.

mod resolve;
mod spec;
mod table;

pub use resolve::{Resolver, SystemResolver};
pub use spec::RouteSpec;
pub use table::{Route, RouteChange, RouteTable};

#[cfg(test)]
pub use resolve::StaticResolver;
