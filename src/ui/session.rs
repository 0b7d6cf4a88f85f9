//! Interactive session over a breakpoint registry.
//!
//! Session reads line commands, dispatches them to command handlers on behalf of the current
//! party and renders results into the output writer.

use crate::debugger::{BreakpointRegistry, BreakpointView, Error, ExpressionEvaluator, PartyId};
use crate::tw_warn;
use crate::ui::command::{r#break, step, Command, CommandError, CommandResult};
use indexmap::IndexMap;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

/// Name of the party active when session starts.
pub const INITIAL_PARTY: &str = "main";

pub struct Session<W: Write> {
    registry: Arc<BreakpointRegistry>,
    evaluator: ExpressionEvaluator,
    parties: IndexMap<String, PartyId>,
    party_name: String,
    party: PartyId,
    out: W,
}

impl<W: Write> Session<W> {
    pub fn new(registry: Arc<BreakpointRegistry>, out: W) -> Self {
        Self::with_evaluator(registry, ExpressionEvaluator::default(), out)
    }

    pub fn with_evaluator(
        registry: Arc<BreakpointRegistry>,
        evaluator: ExpressionEvaluator,
        out: W,
    ) -> Self {
        let party = PartyId::new();
        let mut parties = IndexMap::new();
        parties.insert(INITIAL_PARTY.to_string(), party);
        Self {
            registry,
            evaluator,
            parties,
            party_name: INITIAL_PARTY.to_string(),
            party,
            out,
        }
    }

    pub fn registry(&self) -> &Arc<BreakpointRegistry> {
        &self.registry
    }

    /// Name of the current party.
    pub fn party_name(&self) -> &str {
        &self.party_name
    }

    /// Identity of the current party.
    pub fn party(&self) -> PartyId {
        self.party
    }

    /// Identity of a party by its name, `None` if party never was used.
    pub fn party_by_name(&self, name: &str) -> Option<PartyId> {
        self.parties.get(name).copied()
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Parse and execute single command line.
    pub fn handle_line(&mut self, line: &str) -> CommandResult<()> {
        let cmd = Command::parse(line)?;
        self.handle(cmd)
    }

    pub fn handle(&mut self, cmd: Command) -> CommandResult<()> {
        match cmd {
            Command::Breakpoint(cmd) => {
                let result = r#break::Handler::new(&self.registry, self.party()).handle(&cmd)?;
                self.print_breakpoint_result(result).map_err(Error::IO)?;
            }
            Command::Party(name) => {
                self.party = *self.parties.entry(name.clone()).or_insert_with(PartyId::new);
                self.party_name = name;
                writeln!(self.out, "Current party: {}", self.party_name).map_err(Error::IO)?;
            }
            Command::Step(cmd) => {
                let fired =
                    step::Handler::new(&self.registry, &self.evaluator, self.party()).handle(&cmd);
                if fired.is_empty() {
                    writeln!(
                        self.out,
                        "No breakpoints at {}:{}",
                        cmd.position.file, cmd.position.line
                    )
                    .map_err(Error::IO)?;
                }
                for view in fired {
                    writeln!(self.out, "Hit {}", render_view(&view)).map_err(Error::IO)?;
                }
            }
            Command::Eval {
                expression,
                bindings,
            } => {
                let value = self
                    .evaluator
                    .value(&expression, &bindings)
                    .map_err(Error::Condition)?;
                writeln!(self.out, "{}", value.repr()).map_err(Error::IO)?;
            }
            Command::SkipInput => {}
        }
        Ok(())
    }

    fn print_breakpoint_result(&mut self, result: r#break::ExecutionResult) -> io::Result<()> {
        use r#break::ExecutionResult;

        let party = self.party_name.clone();
        match result {
            ExecutionResult::New(view) => writeln!(self.out, "New {}", render_view(&view)),
            ExecutionResult::Enabled(views) => views.iter().try_for_each(|view| {
                writeln!(self.out, "Enabled {} for {party}", render_view(view))
            }),
            ExecutionResult::Disabled(views) => views.iter().try_for_each(|view| {
                writeln!(self.out, "Disabled {} for {party}", render_view(view))
            }),
            ExecutionResult::Removed(views) => views
                .iter()
                .try_for_each(|view| writeln!(self.out, "Removed {}", render_view(view))),
            ExecutionResult::Ignored(views, count) => views.iter().try_for_each(|view| {
                writeln!(
                    self.out,
                    "Will ignore next {count} crossings of {} for {party}",
                    render_view(view)
                )
            }),
            ExecutionResult::Dump(views) if views.is_empty() => {
                writeln!(self.out, "No breakpoints")
            }
            ExecutionResult::Dump(views) => views.iter().try_for_each(|view| {
                writeln!(self.out, "{} hits: {}", render_view(view), view.hits)
            }),
        }
    }

    /// Execute commands line by line. Errors are reported into output and don't stop
    /// execution. Return number of failed lines.
    pub fn run(&mut self, input: impl BufRead) -> io::Result<usize> {
        let mut failed = 0;
        for (num, line) in input.lines().enumerate() {
            let line = line?;
            match self.handle_line(&line) {
                Ok(()) => {}
                Err(CommandError::Handle(Error::IO(e))) => return Err(e),
                Err(e) if e.is_stale() => {
                    failed += 1;
                    tw_warn!(target: "debugger", "line {}: {e}", num + 1);
                    writeln!(self.out, "warning: {e}")?;
                }
                Err(e) => {
                    failed += 1;
                    writeln!(self.out, "error: line {}: {e}", num + 1)?;
                }
            }
        }
        self.out.flush()?;
        Ok(failed)
    }
}

/// Render breakpoint view like `Breakpoint 1 at a.py:10 [temporary] if x > 1`.
pub fn render_view(view: &BreakpointView) -> String {
    let mut rendered = match view.id {
        Some(id) => format!("Breakpoint {id} at {}", view.location),
        None => format!("Breakpoint at {}", view.location),
    };
    if view.temporary {
        rendered.push_str(" [temporary]");
    }
    if let Some(ref condition) = view.condition {
        rendered.push_str(" if ");
        rendered.push_str(condition);
    }
    rendered
}
