//! Small formatting helpers shared across the data model.

use std::fmt;

/// Wraps a `Display` value so that it is also usable as a `Debug` value,
/// printing exactly what `Display` would. Used for fields (like hashes) whose
/// `Debug` output is otherwise a noisy byte dump.
pub struct DisplayToDebug<T>(pub T);

impl<T: fmt::Display> fmt::Debug for DisplayToDebug<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
