use crate::debugger::{
    Breakpoint, BreakpointOptions, BreakpointRef, BreakpointRegistry, BreakpointView, Error,
    Location, PartyId,
};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum BreakpointIdentity {
    Number(u32),
    Location(Location),
}

impl From<BreakpointIdentity> for BreakpointRef {
    fn from(identity: BreakpointIdentity) -> Self {
        match identity {
            BreakpointIdentity::Number(number) => BreakpointRef::Id(number),
            BreakpointIdentity::Location(location) => BreakpointRef::Location(location),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Add {
        location: Location,
        temporary: bool,
        condition: Option<String>,
    },
    Enable(Vec<BreakpointIdentity>),
    Disable(Vec<BreakpointIdentity>),
    Remove(Vec<BreakpointIdentity>),
    Ignore(BreakpointIdentity, u32),
    Info,
}

pub struct Handler<'a> {
    registry: &'a BreakpointRegistry,
    party: PartyId,
}

pub enum ExecutionResult {
    New(BreakpointView),
    Enabled(Vec<BreakpointView>),
    Disabled(Vec<BreakpointView>),
    Removed(Vec<BreakpointView>),
    Ignored(Vec<BreakpointView>, u32),
    Dump(Vec<BreakpointView>),
}

impl<'a> Handler<'a> {
    pub fn new(registry: &'a BreakpointRegistry, party: PartyId) -> Self {
        Self { registry, party }
    }

    pub fn handle(&self, cmd: &Command) -> Result<ExecutionResult, Error> {
        let result = match cmd {
            Command::Add {
                location,
                temporary,
                condition,
            } => {
                let mut options = BreakpointOptions {
                    temporary: *temporary,
                    ..Default::default()
                };
                if let Some(condition) = condition {
                    options = options.with_condition(condition);
                }
                let bp = self.registry.add(location.clone(), options);
                // new breakpoint is active for the party that asked for it
                bp.enable(self.party);
                ExecutionResult::New(bp.view())
            }
            Command::Enable(refs) => {
                ExecutionResult::Enabled(views(self.registry.enable(self.party, refs.clone())?))
            }
            Command::Disable(refs) => {
                ExecutionResult::Disabled(views(self.registry.disable(self.party, refs.clone())?))
            }
            Command::Remove(refs) => {
                ExecutionResult::Removed(views(self.registry.remove_all(refs.clone())?))
            }
            Command::Ignore(identity, count) => {
                let bps = self
                    .registry
                    .ignore(self.party, BreakpointRef::from(identity.clone()), *count)?;
                ExecutionResult::Ignored(views(bps), *count)
            }
            Command::Info => ExecutionResult::Dump(self.registry.snapshot()),
        };
        Ok(result)
    }
}

fn views(breakpoints: Vec<Arc<Breakpoint>>) -> Vec<BreakpointView> {
    breakpoints.iter().map(|bp| bp.view()).collect()
}
