//! Command dispatch: bridges CLI args -> engine -> output formatting.

pub mod config_cmd;
pub mod path;
pub mod rooms;
pub mod sync;
pub mod util;

use clap::CommandFactory;

use crate::cli::{Cli, Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a parsed command to its handler.
pub async fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Path(args) => path::handle(&args, global),
        Command::Sync(args) => sync::handle(args, global).await,
        Command::Rooms(args) => rooms::handle(&args, global).await,
        Command::Config(args) => config_cmd::handle(&args, global),
        Command::Completions(args) => {
            let mut cmd = Cli::command();
            clap_complete::generate(args.shell, &mut cmd, "hubsync", &mut std::io::stdout());
            Ok(())
        }
    }
}
