//! Control channel
//!
//! Runtime commands reach the proxy through a named FIFO. See
//! [`ControlCommand`] for the command set and [`ControlClient`] for the
//! sending side.

mod channel;
mod command;

pub use channel::{ControlChannel, ControlClient, MAX_COMMAND_LEN};
pub use command::ControlCommand;
