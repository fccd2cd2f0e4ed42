//! Application-wide convenience imports, brought in via `use crate::prelude::*`.

pub use abscissa_core::{status_err, Application};
pub use tracing::{debug, error, info, trace, warn};

pub use crate::application::{app_config, app_reader, APPLICATION};

/// The `Result` type used throughout `embernode`'s commands.
pub type Result<T> = color_eyre::eyre::Result<T>;
