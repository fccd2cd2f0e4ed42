//! Shared test support for the ember workspace: tracing/error-report setup,
//! a prelude for `#[test]` functions that return `Result`, and raw wire-format
//! test vectors.

pub mod prelude;
pub mod vectors;

use std::sync::Once;

static INIT: Once = Once::new();

/// Installs a tracing subscriber and a `color-eyre` panic/error report hook.
///
/// Safe to call from every test function: only the first call does anything,
/// later calls are no-ops.
pub fn init() {
    INIT.call_once(|| {
        let subscriber = tracing_subscriber::fmt::Subscriber::builder()
            .with_writer(std::io::stderr)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);

        let _ = color_eyre::install();
    });
}
