//! Remote command execution.
//!
//! - [`RemoteCommand`] builds the command line, with an optional working
//!   directory override
//! - [`CommandExecutor`] runs it on a registered connection
//! - [`StateProbe`] holds the probe commands used for working-directory
//!   bookkeeping

mod command;
mod executor;
mod probe;
mod result;

pub use command::{quote, RemoteCommand};
pub use executor::CommandExecutor;
pub use probe::StateProbe;
pub use result::ExecOutput;
