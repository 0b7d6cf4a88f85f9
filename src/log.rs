//! Process-wide switch for library logging.
//!
//! The library logs through the [`log`] facade under the `"debugger"` target. Embedding
//! applications that drive the debugger interactively may want a silent library, so every
//! `tw_*` macro checks this switch before touching the logger.

use std::sync::atomic::{AtomicBool, Ordering};

static ENABLED: AtomicBool = AtomicBool::new(true);

#[inline(always)]
pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::SeqCst)
}

pub fn disable() {
    ENABLED.store(false, Ordering::SeqCst)
}

pub fn enable() {
    ENABLED.store(true, Ordering::SeqCst)
}

#[doc(hidden)]
#[macro_export]
macro_rules! _tw_log {
    ($level: expr, target: $target:expr, $($arg:tt)+) => {
        if $crate::log::is_enabled() {
            log::log!(target: $target, $level, $($arg)+)
        }
    };
    ($level: expr, $($arg:tt)+) => {
        if $crate::log::is_enabled() {
            log::log!(target: "debugger", $level, $($arg)+)
        }
    };
}

#[macro_export]
macro_rules! tw_info {
    ($($arg:tt)+) => {
        $crate::_tw_log!(log::Level::Info, $($arg)+)
    };
}

#[macro_export]
macro_rules! tw_warn {
    ($($arg:tt)+) => {
        $crate::_tw_log!(log::Level::Warn, $($arg)+)
    };
}

#[macro_export]
macro_rules! tw_error {
    ($($arg:tt)+) => {
        $crate::_tw_log!(log::Level::Error, $($arg)+)
    };
}

#[macro_export]
macro_rules! tw_debug {
    ($($arg:tt)+) => {
        $crate::_tw_log!(log::Level::Debug, $($arg)+)
    };
}
