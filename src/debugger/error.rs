use crate::debugger::condition::EvalError;
use std::thread::ThreadId;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // --------------------------------- generic errors --------------------------------------------
    #[error(transparent)]
    IO(#[from] std::io::Error),

    // --------------------------------- debugger entity not found----------------------------------
    #[error("breakpoint number {0} not found")]
    BreakpointNotFound(u32),
    #[error("function `{0}` not found in the current scope")]
    FunctionNotFound(String),

    // --------------------------------- stream hijack errors --------------------------------------
    #[error("interpreter state of thread {0:?} is unavailable")]
    TargetUnavailable(ThreadId),

    // --------------------------------- condition errors ------------------------------------------
    #[error("condition evaluation: {0}")]
    Condition(#[from] EvalError),
}

impl Error {
    /// Return true if error is a consequence of a stale reference (entity removed or thread gone)
    /// rather than a broken request.
    pub fn is_stale(&self) -> bool {
        matches!(
            self,
            Error::BreakpointNotFound(_) | Error::TargetUnavailable(_)
        )
    }
}

#[macro_export]
macro_rules! _error {
    ($log_fn: path, $res: expr) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                if $crate::log::is_enabled() {
                    $log_fn!(target: "debugger", "{:#}", e);
                }
                None
            }
        }
    };
    ($log_fn: path, $res: expr, $msg: tt) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                if $crate::log::is_enabled() {
                    $log_fn!(target: "debugger", concat!($msg, " {:#}"), e);
                }
                None
            }
        }
    };
}

/// Transforms `Result` into `Option` and logs an error if it occurs.
#[macro_export]
macro_rules! weak_error {
    ($res: expr) => {
        $crate::_error!(log::warn, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!(log::warn, $res, $msg)
    };
}

/// Transforms `Result` into `Option` and put error into debug logs if it occurs.
#[macro_export]
macro_rules! muted_error {
    ($res: expr) => {
        $crate::_error!(log::debug, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!(log::debug, $res, $msg)
    };
}
