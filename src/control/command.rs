//! Control commands
//!
//! One command per writer cycle on the control channel:
//!
//! | Command                              | Effect                         |
//! |--------------------------------------|--------------------------------|
//! | `exit`                               | stop after the current pass    |
//! | `add <source> <target-host>:<port>`  | add or retarget a route        |
//!
//! Keywords are case-insensitive.

use std::fmt;
use std::str::FromStr;

use crate::error::ControlError;
use crate::routes::RouteSpec;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    /// Leave the event loop
    Exit,
    /// Add or retarget a route
    Add(RouteSpec),
}

impl FromStr for ControlCommand {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (keyword, args) = match s.split_once(char::is_whitespace) {
            Some((keyword, args)) => (keyword, args.trim()),
            None => (s, ""),
        };

        if keyword.eq_ignore_ascii_case("exit") && args.is_empty() {
            Ok(Self::Exit)
        } else if keyword.eq_ignore_ascii_case("add") {
            args.parse()
                .map(Self::Add)
                .map_err(ControlError::MalformedAdd)
        } else {
            Err(ControlError::UnknownCommand(s.to_string()))
        }
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exit => f.write_str("exit"),
            Self::Add(spec) => write!(f, "add {spec}"),
        }
    }
}
