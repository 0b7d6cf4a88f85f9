pub mod breakpoint;
pub mod condition;
mod error;
pub mod hijack;
pub mod position;
pub mod trip;
pub mod variable;

pub use breakpoint::{
    Breakpoint, BreakpointOptions, BreakpointRef, BreakpointRegistry, BreakpointView, Location,
    PartyId, Selector,
};
pub use condition::{EvalError, Evaluator, ExpressionEvaluator};
pub use error::Error;
pub use hijack::{
    ProxyIo, StdStreams, StreamHijacker, SysState, ThreadState, ThreadStateProvider, ThreadStates,
};
pub use position::{ExecutionPosition, Position};
pub use trip::TripEvaluator;
pub use variable::{Bindings, Value};
