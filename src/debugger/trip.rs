//! Trip algorithm: decide which breakpoints fire at current execution position.

use crate::debugger::breakpoint::{Breakpoint, BreakpointRegistry, Location, PartyId, Selector};
use crate::debugger::condition::Evaluator;
use crate::debugger::position::ExecutionPosition;
use crate::{muted_error, tw_debug, tw_warn};
use std::sync::Arc;

/// Evaluates registered breakpoints against execution positions on behalf of interested parties.
pub struct TripEvaluator<'a, E: Evaluator + ?Sized> {
    registry: &'a BreakpointRegistry,
    evaluator: &'a E,
}

impl<'a, E: Evaluator + ?Sized> TripEvaluator<'a, E> {
    pub fn new(registry: &'a BreakpointRegistry, evaluator: &'a E) -> Self {
        Self {
            registry,
            evaluator,
        }
    }

    /// Return breakpoints that should pause execution at `position` for the `party`.
    ///
    /// Side effects (hit counting, ignore counters, temporary breakpoints removal) are applied
    /// once per call.
    pub fn relevant_breakpoints<P>(&self, position: &P, party: PartyId) -> Vec<Arc<Breakpoint>>
    where
        P: ExecutionPosition + ?Sized,
    {
        let locations = [
            Location::line(position.file(), position.line()),
            Location::function(position.file(), position.function_name()),
        ];

        self.registry
            .candidates(&locations)
            .into_iter()
            .filter(|bp| self.pass(bp, position, party))
            .collect()
    }

    /// Single pass over a breakpoint. Return true if breakpoint fires.
    fn pass<P>(&self, bp: &Breakpoint, position: &P, party: PartyId) -> bool
    where
        P: ExecutionPosition + ?Sized,
    {
        {
            let state = bp.lock();
            if !state.is_registered() || !state.is_enabled(party) {
                return false;
            }
            if !trips(bp.location(), position) {
                return false;
            }
            bp.count_hit();
        }

        // condition evaluated without lock, it may execute arbitrary code
        if let Some(condition) = bp.condition() {
            match self.evaluator.evaluate(condition, position.bindings()) {
                Ok(true) => {}
                Ok(false) => return false,
                Err(e) => {
                    // erroneous condition fires, ignore counter stays intact
                    tw_warn!(target: "debugger", "{bp}: condition `{condition}` failed: {e}");
                    let state = bp.lock();
                    return state.is_registered() && state.is_enabled(party);
                }
            }
        }

        // breakpoint may be removed or disabled while condition is evaluated
        let mut state = bp.lock();
        if !state.is_registered() || !state.is_enabled(party) {
            return false;
        }
        if state.consume_ignore(party) {
            tw_debug!(target: "debugger", "{bp} ignored by {party}");
            return false;
        }
        if bp.is_temporary() {
            // only one of concurrent passes retires breakpoint
            return self.registry.detach(bp, &mut state);
        }
        true
    }
}

/// Return true if breakpoint location really matches current execution position.
fn trips<P>(location: &Location, position: &P) -> bool
where
    P: ExecutionPosition + ?Sized,
{
    match location.selector() {
        Selector::Line(line) => *line == position.line(),
        // function breakpoint trips only once per call, at the function first line
        Selector::Function(function) => {
            function == position.function_name()
                && muted_error!(position.function_first_line(function))
                    .is_some_and(|first_line| first_line == position.line())
        }
    }
}
