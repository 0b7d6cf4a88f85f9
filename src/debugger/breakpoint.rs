use crate::debugger::Error;
use crate::{tw_debug, tw_info};
use indexmap::IndexMap;
use itertools::Itertools;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, RwLock};
use uuid::Uuid;

/// Identity of an interested party (typically a debugger session). Each party has its own
/// enable/ignore state on shared breakpoints.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PartyId(Uuid);

impl PartyId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PartyId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for PartyId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Selector {
    Line(u64),
    Function(String),
}

/// Place in source code where breakpoint applies.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Location {
    file: String,
    selector: Selector,
}

impl Location {
    pub fn new(file: impl Into<String>, selector: Selector) -> Self {
        Self {
            file: file.into(),
            selector,
        }
    }

    pub fn line(file: impl Into<String>, line: u64) -> Self {
        Self::new(file, Selector::Line(line))
    }

    pub fn function(file: impl Into<String>, function: impl Into<String>) -> Self {
        Self::new(file, Selector::Function(function.into()))
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.selector {
            Selector::Line(line) => write!(f, "{}:{line}", self.file),
            Selector::Function(function) => write!(f, "{}:{function}", self.file),
        }
    }
}

#[derive(Clone, Copy, Default)]
struct PartyState {
    enabled: bool,
    ignored: u32,
}

/// Mutable part of a breakpoint.
#[derive(Default)]
pub(super) struct State {
    registered: bool,
    parties: HashMap<PartyId, PartyState>,
}

impl State {
    pub(super) fn is_registered(&self) -> bool {
        self.registered
    }

    pub(super) fn is_enabled(&self, party: PartyId) -> bool {
        self.parties.get(&party).map(|p| p.enabled).unwrap_or_default()
    }

    fn ignore_count(&self, party: PartyId) -> u32 {
        self.parties.get(&party).map(|p| p.ignored).unwrap_or_default()
    }

    /// Decrement party ignore counter if it is positive. Return true if pass is ignored.
    pub(super) fn consume_ignore(&mut self, party: PartyId) -> bool {
        match self.parties.get_mut(&party) {
            Some(state) if state.ignored > 0 => {
                state.ignored -= 1;
                true
            }
            _ => false,
        }
    }
}

/// Breakpoint creation options.
#[derive(Clone, Debug, Default)]
pub struct BreakpointOptions {
    /// Remove breakpoint after first (not ignored) hit.
    pub temporary: bool,
    /// Expression that must be truthy for the breakpoint to fire.
    pub condition: Option<String>,
    /// Free-form annotation.
    pub note: String,
}

impl BreakpointOptions {
    pub fn temporary() -> Self {
        Self {
            temporary: true,
            ..Default::default()
        }
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }
}

static GLOBAL_BP_COUNTER: AtomicU32 = AtomicU32::new(1);

/// Breakpoint representation. Breakpoint is shared between all parties, but each party
/// enables it or ignores it independently.
pub struct Breakpoint {
    /// Breakpoint number, assigned at first registration.
    id: OnceLock<u32>,
    location: Location,
    temporary: bool,
    condition: Option<String>,
    note: String,
    hits: AtomicU64,
    state: Mutex<State>,
}

impl Breakpoint {
    fn new(location: Location, options: BreakpointOptions) -> Self {
        Self {
            id: OnceLock::new(),
            location,
            temporary: options.temporary,
            condition: options.condition,
            note: options.note,
            hits: AtomicU64::new(0),
            state: Mutex::default(),
        }
    }

    pub(super) fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return breakpoint number, `None` if breakpoint was never registered.
    pub fn id(&self) -> Option<u32> {
        self.id.get().copied()
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn is_temporary(&self) -> bool {
        self.temporary
    }

    pub fn condition(&self) -> Option<&str> {
        self.condition.as_deref()
    }

    pub fn note(&self) -> &str {
        &self.note
    }

    /// Return the number of passes over this breakpoint while it was enabled for some party.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::SeqCst)
    }

    pub(super) fn count_hit(&self) -> u64 {
        self.hits.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_registered(&self) -> bool {
        self.lock().is_registered()
    }

    /// Enable breakpoint for the party.
    pub fn enable(&self, party: PartyId) {
        self.lock().parties.entry(party).or_default().enabled = true;
    }

    /// Disable breakpoint for the party (this is the default state).
    pub fn disable(&self, party: PartyId) {
        self.lock().parties.entry(party).or_default().enabled = false;
    }

    /// Ignore this breakpoint `num_passes` times for the party.
    pub fn ignore(&self, party: PartyId, num_passes: u32) {
        self.lock().parties.entry(party).or_default().ignored = num_passes;
    }

    pub fn is_enabled(&self, party: PartyId) -> bool {
        self.lock().is_enabled(party)
    }

    pub fn ignore_count(&self, party: PartyId) -> u32 {
        self.lock().ignore_count(party)
    }

    /// Return a snapshot of breakpoint state.
    pub fn view(&self) -> BreakpointView {
        BreakpointView {
            id: self.id(),
            location: self.location.clone(),
            temporary: self.temporary,
            condition: self.condition.clone(),
            note: self.note.clone(),
            hits: self.hits(),
            registered: self.is_registered(),
        }
    }
}

impl Display for Breakpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut meta = vec![];
        if self.temporary {
            meta.push("'temporary'");
        }
        if self.condition.is_some() {
            meta.push("'conditional'");
        }
        let meta = if meta.is_empty() {
            String::new()
        } else {
            format!(" [{}]", meta.join(", "))
        };

        let func = match self.location.selector() {
            Selector::Function(name) => format!(" for {name}"),
            Selector::Line(_) => String::new(),
        };

        let at = match self.location.selector() {
            Selector::Function(name) => name.clone(),
            Selector::Line(line) => line.to_string(),
        };

        write!(
            f,
            "<Breakpoint{func} in {} at {at}{meta}>",
            self.location.file()
        )
    }
}

impl std::fmt::Debug for Breakpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Breakpoint")
            .field("id", &self.id())
            .field("location", &self.location)
            .field("temporary", &self.temporary)
            .field("condition", &self.condition)
            .field("hits", &self.hits())
            .finish()
    }
}

/// Snapshot of a breakpoint state.
#[derive(Clone, Debug, PartialEq)]
pub struct BreakpointView {
    pub id: Option<u32>,
    pub location: Location,
    pub temporary: bool,
    pub condition: Option<String>,
    pub note: String,
    pub hits: u64,
    pub registered: bool,
}

/// Reference to one or more breakpoints.
#[derive(Clone, Debug)]
pub enum BreakpointRef {
    /// Breakpoint itself.
    Breakpoint(Arc<Breakpoint>),
    /// Breakpoint number.
    Id(u32),
    /// All breakpoints registered at the location.
    Location(Location),
}

impl From<Arc<Breakpoint>> for BreakpointRef {
    fn from(bp: Arc<Breakpoint>) -> Self {
        BreakpointRef::Breakpoint(bp)
    }
}

impl From<&Arc<Breakpoint>> for BreakpointRef {
    fn from(bp: &Arc<Breakpoint>) -> Self {
        BreakpointRef::Breakpoint(bp.clone())
    }
}

impl From<u32> for BreakpointRef {
    fn from(id: u32) -> Self {
        BreakpointRef::Id(id)
    }
}

impl From<Location> for BreakpointRef {
    fn from(location: Location) -> Self {
        BreakpointRef::Location(location)
    }
}

/// Single reference may be used wherever a collection of references is expected.
impl IntoIterator for BreakpointRef {
    type Item = BreakpointRef;
    type IntoIter = std::iter::Once<BreakpointRef>;

    fn into_iter(self) -> Self::IntoIter {
        std::iter::once(self)
    }
}

#[derive(Default)]
struct Indices {
    by_id: HashMap<u32, Arc<Breakpoint>>,
    by_location: HashMap<Location, IndexMap<u32, Arc<Breakpoint>>>,
}

/// Breakpoints candidates for a single execution position.
pub(super) type Candidates = SmallVec<[Arc<Breakpoint>; 4]>;

/// Container for all breakpoints registered in the process.
///
/// Lock order: a breakpoint state lock is always taken before registry indices lock.
#[derive(Default)]
pub struct BreakpointRegistry {
    indices: RwLock<Indices>,
}

impl BreakpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Indices> {
        self.indices.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Indices> {
        self.indices.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a new detached breakpoint. Breakpoint has no effect until it is registered.
    pub fn create(&self, location: Location, options: BreakpointOptions) -> Arc<Breakpoint> {
        Arc::new(Breakpoint::new(location, options))
    }

    /// Create and register a breakpoint.
    pub fn add(&self, location: Location, options: BreakpointOptions) -> Arc<Breakpoint> {
        let bp = self.create(location, options);
        self.register(&bp);
        bp
    }

    /// Register breakpoint and return its number. Breakpoint that already has a number
    /// (registered now, or registered and removed before) is left as is.
    pub fn register(&self, bp: &Arc<Breakpoint>) -> u32 {
        let mut state = bp.lock();
        if let Some(id) = bp.id() {
            return id;
        }

        let id = GLOBAL_BP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut indices = self.write();
        indices.by_id.insert(id, bp.clone());
        indices
            .by_location
            .entry(bp.location.clone())
            .or_default()
            .insert(id, bp.clone());
        drop(indices);

        bp.id.get_or_init(|| id);
        state.registered = true;
        tw_info!(target: "debugger", "breakpoint {id} set at {}", bp.location);
        id
    }

    /// Remove breakpoint from registry. Return false if breakpoint wasn't registered.
    pub fn remove(&self, bp: &Breakpoint) -> bool {
        let mut state = bp.lock();
        self.detach(bp, &mut state)
    }

    /// Remove breakpoint, caller must hold a breakpoint state lock.
    pub(super) fn detach(&self, bp: &Breakpoint, state: &mut State) -> bool {
        let Some(id) = bp.id().filter(|_| state.registered) else {
            return false;
        };
        state.registered = false;
        state.parties.values_mut().for_each(|p| p.enabled = false);

        let mut indices = self.write();
        indices.by_id.remove(&id);
        if let Some(at_location) = indices.by_location.get_mut(&bp.location) {
            at_location.shift_remove(&id);
            if at_location.is_empty() {
                indices.by_location.remove(&bp.location);
            }
        }
        tw_info!(target: "debugger", "breakpoint {id} at {} removed", bp.location);
        true
    }

    /// Return registered breakpoint by its number.
    pub fn get(&self, id: u32) -> Option<Arc<Breakpoint>> {
        self.read().by_id.get(&id).cloned()
    }

    /// Return all breakpoints registered at location.
    pub fn at(&self, location: &Location) -> Vec<Arc<Breakpoint>> {
        self.read()
            .by_location
            .get(location)
            .map(|bps| bps.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Return breakpoints registered at any of the locations.
    pub(super) fn candidates(&self, locations: &[Location]) -> Candidates {
        let indices = self.read();
        locations
            .iter()
            .filter_map(|loc| indices.by_location.get(loc))
            .flat_map(|bps| bps.values().cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return snapshots of all registered breakpoints ordered by number.
    pub fn snapshot(&self) -> Vec<BreakpointView> {
        let breakpoints = self.read().by_id.values().cloned().collect::<Vec<_>>();
        breakpoints
            .iter()
            .map(|bp| bp.view())
            .sorted_by_key(|view| view.id)
            .collect()
    }

    /// Resolve breakpoint references into breakpoints.
    ///
    /// # Arguments
    ///
    /// * `refs`: single reference or a collection of references, output order follows
    ///   the order of references, a location reference expands into all breakpoints
    ///   registered at this location (possibly none)
    ///
    /// # Errors
    ///
    /// [`Error::BreakpointNotFound`] if referenced breakpoint number is unknown.
    pub fn resolve<I, R>(&self, refs: I) -> Result<Vec<Arc<Breakpoint>>, Error>
    where
        I: IntoIterator<Item = R>,
        R: Into<BreakpointRef>,
    {
        let indices = self.read();
        let mut breakpoints = vec![];
        for r in refs {
            match r.into() {
                BreakpointRef::Breakpoint(bp) => breakpoints.push(bp),
                BreakpointRef::Id(id) => {
                    let bp = indices
                        .by_id
                        .get(&id)
                        .ok_or(Error::BreakpointNotFound(id))?;
                    breakpoints.push(bp.clone());
                }
                BreakpointRef::Location(location) => {
                    if let Some(bps) = indices.by_location.get(&location) {
                        breakpoints.extend(bps.values().cloned());
                    } else {
                        tw_debug!(target: "debugger", "no breakpoints at {location}");
                    }
                }
            }
        }
        Ok(breakpoints)
    }

    /// Enable all referenced breakpoints for the party.
    pub fn enable<I, R>(&self, party: PartyId, refs: I) -> Result<Vec<Arc<Breakpoint>>, Error>
    where
        I: IntoIterator<Item = R>,
        R: Into<BreakpointRef>,
    {
        let breakpoints = self.resolve(refs)?;
        breakpoints.iter().for_each(|bp| bp.enable(party));
        Ok(breakpoints)
    }

    /// Disable all referenced breakpoints for the party.
    pub fn disable<I, R>(&self, party: PartyId, refs: I) -> Result<Vec<Arc<Breakpoint>>, Error>
    where
        I: IntoIterator<Item = R>,
        R: Into<BreakpointRef>,
    {
        let breakpoints = self.resolve(refs)?;
        breakpoints.iter().for_each(|bp| bp.disable(party));
        Ok(breakpoints)
    }

    /// Ignore all referenced breakpoints `num_passes` times for the party.
    pub fn ignore<I, R>(
        &self,
        party: PartyId,
        refs: I,
        num_passes: u32,
    ) -> Result<Vec<Arc<Breakpoint>>, Error>
    where
        I: IntoIterator<Item = R>,
        R: Into<BreakpointRef>,
    {
        let breakpoints = self.resolve(refs)?;
        breakpoints
            .iter()
            .for_each(|bp| bp.ignore(party, num_passes));
        Ok(breakpoints)
    }

    /// Remove all referenced breakpoints. Return breakpoints that were actually removed.
    pub fn remove_all<I, R>(&self, refs: I) -> Result<Vec<Arc<Breakpoint>>, Error>
    where
        I: IntoIterator<Item = R>,
        R: Into<BreakpointRef>,
    {
        let breakpoints = self.resolve(refs)?;
        Ok(breakpoints
            .into_iter()
            .filter(|bp| self.remove(bp))
            .collect())
    }
}
