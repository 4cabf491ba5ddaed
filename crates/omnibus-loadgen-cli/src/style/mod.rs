//! Terminal styling for run reports and status lines.

use std::sync::atomic::{AtomicBool, Ordering};

pub mod colors;
pub mod output;
pub mod table;

pub use output::*;
pub use table::*;

/// Global flag to track if colors are disabled.
static NO_COLOR: AtomicBool = AtomicBool::new(false);

/// Disables colors when asked to, or when `NO_COLOR` is set.
pub fn set_no_color(value: bool) {
    let disabled = value || std::env::var_os("NO_COLOR").is_some();
    NO_COLOR.store(disabled, Ordering::SeqCst);
}

/// Checks if colors are disabled.
pub fn no_color() -> bool {
    NO_COLOR.load(Ordering::SeqCst)
}
