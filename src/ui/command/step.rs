use crate::debugger::{
    BreakpointRegistry, BreakpointView, Evaluator, PartyId, Position, TripEvaluator,
};

/// Report of an execution position reached by the program.
#[derive(Debug, Clone)]
pub struct Command {
    pub position: Position,
}

pub struct Handler<'a> {
    trip: TripEvaluator<'a, dyn Evaluator + 'a>,
    party: PartyId,
}

impl<'a> Handler<'a> {
    pub fn new(
        registry: &'a BreakpointRegistry,
        evaluator: &'a (dyn Evaluator + 'a),
        party: PartyId,
    ) -> Self {
        Self {
            trip: TripEvaluator::new(registry, evaluator),
            party,
        }
    }

    /// Return breakpoints fired at reported position.
    pub fn handle(&self, cmd: &Command) -> Vec<BreakpointView> {
        self.trip
            .relevant_breakpoints(&cmd.position, self.party)
            .iter()
            .map(|bp| bp.view())
            .collect()
    }
}
