//! `embernode` subcommands, dispatched by `abscissa_core::EntryPoint`.

mod config;
mod start;

use std::path::PathBuf;

use abscissa_core::{Command, Configurable, FrameworkError, Options, Runnable};

use crate::config::EmberConfig;

pub use self::{config::ConfigCmd, start::StartCmd};

/// `embernode`'s top-level subcommands.
#[derive(Command, Debug, Options, Runnable)]
pub enum EmbernodeCmd {
    /// The `help` subcommand
    #[options(help = "show help for a command")]
    Help(abscissa_core::command::Help<Self>),

    /// The `start` subcommand: runs the node until interrupted.
    #[options(help = "start the node, connecting to the network and extending the best chain")]
    Start(StartCmd),

    /// The `config` subcommand: prints the effective configuration.
    #[options(help = "print the effective configuration and exit")]
    Config(ConfigCmd),
}

impl EmbernodeCmd {
    /// Whether `-v`/`--verbose` was passed, used to pick the tracing filter.
    pub fn verbose(&self) -> bool {
        match self {
            EmbernodeCmd::Start(cmd) => cmd.verbose,
            _ => false,
        }
    }
}

impl Configurable<EmberConfig> for EmbernodeCmd {
    fn config_path(&self) -> Option<PathBuf> {
        let default = PathBuf::from("embernode.toml");
        if default.exists() {
            Some(default)
        } else {
            None
        }
    }

    fn process_config(&self, config: EmberConfig) -> Result<EmberConfig, FrameworkError> {
        match self {
            EmbernodeCmd::Start(cmd) => cmd.override_config(config),
            _ => Ok(config),
        }
    }
}
