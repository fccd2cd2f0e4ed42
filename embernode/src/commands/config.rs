//! The `config` subcommand: prints the effective, fully-merged configuration.

use abscissa_core::{Command, Options, Runnable};

use crate::prelude::*;

/// The `config` subcommand.
#[derive(Command, Debug, Default, Options)]
pub struct ConfigCmd {}

impl Runnable for ConfigCmd {
    fn run(&self) {
        let config = app_config();
        match toml::to_string_pretty(&*config) {
            Ok(rendered) => println!("{}", rendered),
            Err(err) => status_err!("failed to render configuration: {}", err),
        }
    }
}
