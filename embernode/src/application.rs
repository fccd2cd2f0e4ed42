//! `embernode`'s `abscissa_core::Application` implementation: the entry
//! point that owns configuration, component registration, and the
//! top-level command dispatch.

use abscissa_core::{
    application::{self, AppCell},
    config::{self, CfgCell},
    trace, Application, EntryPoint, FrameworkError, StandardPaths,
};

use crate::{commands::EmbernodeCmd, config::EmberConfig};

/// The application singleton other modules reach through `app_reader()`.
pub static APPLICATION: AppCell<EmbernodeApplication> = AppCell::new();

/// Returns a read-only handle to the application's shared state.
pub fn app_reader() -> application::lock::Reader<EmbernodeApplication> {
    APPLICATION.read()
}

/// Returns a writable handle to the application's shared state.
pub fn app_writer() -> application::lock::Writer<EmbernodeApplication> {
    APPLICATION.write()
}

/// Returns a handle to the application's current configuration.
pub fn app_config() -> config::Reader<EmbernodeApplication> {
    config::Reader::new(&APPLICATION)
}

/// The `embernode` application: a thin daemon binary wiring
/// `ember-network`, `ember-consensus`, and `ember-state` together behind
/// `abscissa_core`'s `start`/`config`/`version`/`help` subcommand scaffold.
#[derive(Debug)]
pub struct EmbernodeApplication {
    config: CfgCell<EmberConfig>,
    state: application::State<Self>,
}

impl Default for EmbernodeApplication {
    fn default() -> Self {
        EmbernodeApplication {
            config: CfgCell::default(),
            state: application::State::default(),
        }
    }
}

impl Application for EmbernodeApplication {
    type Cmd = EntryPoint<EmbernodeCmd>;
    type Cfg = EmberConfig;
    type Paths = StandardPaths;

    fn config(&self) -> config::Reader<Self> {
        config::Reader::new(&APPLICATION)
    }

    fn state(&self) -> &application::State<Self> {
        &self.state
    }

    fn state_mut(&mut self) -> &mut application::State<Self> {
        &mut self.state
    }

    fn register_components(&mut self, command: &Self::Cmd) -> Result<(), FrameworkError> {
        let framework_components = self.framework_components(command)?;
        let mut app_components = self.state.components_mut();
        app_components.register(framework_components)
    }

    fn process_config(&self, config: Self::Cfg) -> Result<Self::Cfg, FrameworkError> {
        Ok(config)
    }

    fn after_config(&mut self, config: Self::Cfg) -> Result<(), FrameworkError> {
        let mut components = self.state.components_mut();
        components.after_config(&config)?;
        self.config.set_once(config);
        Ok(())
    }

    fn tracing_config(&self, command: &Self::Cmd) -> trace::Config {
        if command.verbose {
            trace::Config::verbose()
        } else {
            trace::Config::default()
        }
    }
}
