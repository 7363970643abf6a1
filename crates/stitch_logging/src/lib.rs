#![deny(missing_docs)]
//! Shared logging utilities for the pagestitch workspace.
//!
//! This crate provides the `stitch_*` logging macros used across the codebase
//! and a minimal test initializer for the global logger. Every line is
//! prefixed with the page-turn cycle the scrape loop is currently in, so a log
//! of a long book can be read back page by page.

use std::cell::Cell;

#[doc(hidden)]
pub use log;

thread_local! {
    /// Thread-local storage for the current page-turn cycle.
    static PAGE_CYCLE: Cell<u64> = const { Cell::new(0) };
}

/// Sets the page-turn cycle for the current thread.
/// The scrape loop calls this whenever it begins observing a new page.
pub fn set_page_cycle(cycle: u64) {
    PAGE_CYCLE.with(|v| v.set(cycle));
}

/// Retrieves the page-turn cycle for the current thread.
/// Returns 0 outside of a scrape session.
pub fn page_cycle() -> u64 {
    PAGE_CYCLE.with(|v| v.get())
}

/// Logs a trace-level message tagged with the current page cycle.
#[macro_export]
macro_rules! stitch_trace {
    ($($arg:tt)*) => {{
        $crate::log::trace!("[page {}] {}", $crate::page_cycle(), format_args!($($arg)*));
    }};
}

/// Logs a debug-level message tagged with the current page cycle.
#[macro_export]
macro_rules! stitch_debug {
    ($($arg:tt)*) => {{
        $crate::log::debug!("[page {}] {}", $crate::page_cycle(), format_args!($($arg)*));
    }};
}

/// Logs an info-level message tagged with the current page cycle.
#[macro_export]
macro_rules! stitch_info {
    ($($arg:tt)*) => {{
        $crate::log::info!("[page {}] {}", $crate::page_cycle(), format_args!($($arg)*));
    }};
}

/// Logs a warn-level message tagged with the current page cycle.
#[macro_export]
macro_rules! stitch_warn {
    ($($arg:tt)*) => {{
        $crate::log::warn!("[page {}] {}", $crate::page_cycle(), format_args!($($arg)*));
    }};
}

/// Logs an error-level message tagged with the current page cycle.
#[macro_export]
macro_rules! stitch_error {
    ($($arg:tt)*) => {{
        $crate::log::error!("[page {}] {}", $crate::page_cycle(), format_args!($($arg)*));
    }};
}

/// Initializes a simple terminal logger for use in unit tests.
///
/// This safely no-ops if another logger has already been initialized.
pub fn initialize_for_tests() {
    use simplelog::{ColorChoice, CombinedLogger, Config, TermLogger, TerminalMode};

    let level = if cfg!(debug_assertions) {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    // Ignore the error if a logger was already set by another test.
    let _ = CombinedLogger::init(vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )]);
}
