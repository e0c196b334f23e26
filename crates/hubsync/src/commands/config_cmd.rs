//! Config subcommand handlers.

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util;

const MASK: &str = "****";

pub fn handle(args: &ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Show => {
            let mut cfg = util::load_config(global)?;
            if cfg.hub.client_secret.is_some() {
                cfg.hub.client_secret = Some(MASK.into());
            }
            let out = output::render_single(
                &global.output,
                &cfg,
                |c| output::render_toml(c),
                |c| c.namespace.clone(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&util::config_file(global).display().to_string(), global.quiet);
            Ok(())
        }
    }
}
