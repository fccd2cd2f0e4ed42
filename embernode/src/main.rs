//! Main entry point for `embernode`.

use embernode::application::APPLICATION;

fn main() {
    abscissa_core::boot(&APPLICATION);
}
