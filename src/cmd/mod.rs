//! Subcommand dispatch and execution.
//!
//! The [`dispatch`] function routes the parsed CLI to the appropriate
//! subcommand handler: [`run`], [`validate`], or [`health`]. Each handler
//! lives in its own submodule.

pub mod health;
pub mod run;
pub mod validate;

use crate::cli::{Cli, Commands};
use crate::error::GatekeeperError;

pub async fn dispatch(cli: Cli) -> Result<(), GatekeeperError> {
    match cli.command {
        Some(Commands::Run(args)) => run::execute(*args).await,
        Some(Commands::Validate(ref args)) => validate::execute(args).await,
        Some(Commands::Health(args)) => health::execute(args).await,
        None => {
            print_welcome();
            Ok(())
        }
    }
}

fn print_welcome() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        "\n  specimen-gate v{version}: request gatekeeping for the sample service\n\n  \
         No command provided. To get started:\n\n    \
         specimen-gate run                   Start with built-in defaults\n    \
         specimen-gate run -c gate.yaml      Start with a specific config file\n    \
         specimen-gate validate gate.yaml    Check a config file\n    \
         specimen-gate --help                See all commands and options\n"
    );
}
