//! An interface to a debugger control plane.
//!
//! Contains commands and corresponding command handlers. Command is a request to
//! the control plane that defines an action and a list of input arguments. Command handler
//! validates command, defines what exactly must be done and returns result of it.

pub mod r#break;
pub mod parser;
pub mod step;

use crate::debugger::{Bindings, Error};

#[derive(thiserror::Error, Debug)]
pub enum CommandError {
    #[error("malformed command: {0}")]
    Parsing(String),
    #[error(transparent)]
    Handle(#[from] Error),
}

impl CommandError {
    /// Return true if command refers to an entity that no longer exists.
    pub fn is_stale(&self) -> bool {
        matches!(self, CommandError::Handle(e) if e.is_stale())
    }
}

pub type CommandResult<T> = Result<T, CommandError>;

/// External commands that can be processed by a session.
#[derive(Debug, Clone)]
pub enum Command {
    Breakpoint(r#break::Command),
    Party(String),
    Step(step::Command),
    Eval {
        expression: String,
        bindings: Bindings,
    },
    SkipInput,
}
