//! Convenience imports for test functions.

/// The `Result` type returned by `#[test]` functions that use `?`.
pub type Result<T> = color_eyre::eyre::Result<T>;
