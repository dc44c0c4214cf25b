//! Marks the thread that must stay responsive (the UI or main thread).
//!
//! Inference and frame submission block; calling them from the marked thread
//! is a programming error caught by debug assertions.

use std::cell::Cell;

thread_local! {
    static PRIMARY: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as the primary (UI) thread.
pub fn mark_primary_thread() {
    PRIMARY.with(|p| p.set(true));
}

/// Clears the primary-thread mark on the current thread.
pub fn unmark_primary_thread() {
    PRIMARY.with(|p| p.set(false));
}

/// Returns true if the current thread was marked with [`mark_primary_thread`].
#[must_use]
pub fn is_primary_thread() -> bool {
    PRIMARY.with(Cell::get)
}
