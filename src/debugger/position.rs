//! Execution position: where the program is now and what it can see.

use crate::debugger::variable::Bindings;
use crate::debugger::Error;

/// Source of information about current execution position. Implemented by the code that
/// instruments a program (it knows frames, functions and variables of the running thread).
pub trait ExecutionPosition {
    /// Source file of currently executed statement.
    fn file(&self) -> &str;

    /// Line number of currently executed statement.
    fn line(&self) -> u64;

    /// Name of the function enclosing current statement.
    fn function_name(&self) -> &str;

    /// Return first line of a function visible from the current scope.
    ///
    /// # Errors
    ///
    /// [`Error::FunctionNotFound`] if function can not be found in the current scope.
    fn function_first_line(&self, function: &str) -> Result<u64, Error>;

    /// Variables visible for condition evaluation.
    fn bindings(&self) -> &Bindings;
}

/// Plain execution position.
#[derive(Debug, Clone, Default)]
pub struct Position {
    pub file: String,
    pub line: u64,
    pub function: String,
    /// First line of the enclosing function, `None` if unknown.
    pub entry_line: Option<u64>,
    pub bindings: Bindings,
}

impl Position {
    pub fn new(file: impl Into<String>, line: u64, function: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line,
            function: function.into(),
            ..Default::default()
        }
    }

    pub fn with_entry_line(mut self, line: u64) -> Self {
        self.entry_line = Some(line);
        self
    }

    pub fn with_bindings(mut self, bindings: Bindings) -> Self {
        self.bindings = bindings;
        self
    }
}

impl ExecutionPosition for Position {
    fn file(&self) -> &str {
        &self.file
    }

    fn line(&self) -> u64 {
        self.line
    }

    fn function_name(&self) -> &str {
        &self.function
    }

    fn function_first_line(&self, function: &str) -> Result<u64, Error> {
        self.entry_line
            .filter(|_| function == self.function)
            .ok_or_else(|| Error::FunctionNotFound(function.to_string()))
    }

    fn bindings(&self) -> &Bindings {
        &self.bindings
    }
}
