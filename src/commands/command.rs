//! Command trait definition for CLI commands.
//!
//! Every bayescall subcommand implements [`Command`]; dispatch across the
//! variants goes through `enum_dispatch`.

use anyhow::Result;
use enum_dispatch::enum_dispatch;

/// Trait implemented by all bayescall CLI commands.
#[enum_dispatch]
pub trait Command {
    /// Runs the command's main logic.
    #[allow(clippy::missing_errors_doc)]
    fn execute(&self) -> Result<()>;
}
