//! Global progress bar management
//!
//! This module provides a global `MultiProgress` instance shared across the
//! application, so batch progress bars and log/report lines don't interleave
//! on the terminal.

use indicatif::MultiProgress;
use once_cell::sync::Lazy;
use std::sync::Arc;

/// Global multi-progress bar instance
static MULTI: Lazy<Arc<MultiProgress>> = Lazy::new(|| Arc::new(MultiProgress::new()));

/// Get access to the global multi-progress bar.
///
/// Returns a cheap clone (just another `Arc` pointer) of the global
/// `MultiProgress` instance.
pub fn global_mp() -> Arc<MultiProgress> {
    MULTI.clone()
}

// Add progress bar to the global multi-progress instance
pub fn add_progress_bar(pb: indicatif::ProgressBar) {
    global_mp().add(pb);
}

/// Run `f` with any active progress bars hidden, so plain stdout output
/// (per-file report sections) prints cleanly.
pub fn suspend<F: FnOnce() -> R, R>(f: F) -> R {
    global_mp().suspend(f)
}
