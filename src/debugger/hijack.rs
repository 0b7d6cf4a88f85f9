//! Per-thread standard streams hijacking.
//!
//! A debugger session that wants to talk to a particular thread replaces the thread standard
//! streams (stdin, stdout, stderr and the display hook) with proxy endpoints. Other threads keep
//! their own streams. Original streams are restored when the hijacker is released or dropped.

use crate::config::{self, HijackConfig};
use crate::debugger::position::ExecutionPosition;
use crate::debugger::variable::Value;
use crate::debugger::Error;
use crate::{tw_info, weak_error};
use chrono::{DateTime, Local};
use os_pipe::{PipeReader, PipeWriter};
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, ThreadId};
use strum_macros::Display;

/// Readable standard stream endpoint. Clones share the same underlying reader.
#[derive(Clone)]
pub struct InputStream(Arc<Mutex<dyn Read + Send>>);

impl InputStream {
    pub fn new(reader: impl Read + Send + 'static) -> Self {
        Self(Arc::new(Mutex::new(reader)))
    }

    /// Return true if both handles point to the same endpoint.
    pub fn same_as(&self, other: &InputStream) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Read for InputStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .read(buf)
    }
}

impl Debug for InputStream {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "InputStream({:p})", Arc::as_ptr(&self.0))
    }
}

/// Writable standard stream endpoint. Clones share the same underlying writer.
#[derive(Clone)]
pub struct OutputStream(Arc<Mutex<dyn Write + Send>>);

impl OutputStream {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self(Arc::new(Mutex::new(writer)))
    }

    /// Return true if both handles point to the same endpoint.
    pub fn same_as(&self, other: &OutputStream) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Write for OutputStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).flush()
    }
}

impl Debug for OutputStream {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "OutputStream({:p})", Arc::as_ptr(&self.0))
    }
}

/// Hook that prints results of interactively evaluated expressions.
#[derive(Clone)]
pub struct DisplayHook(Arc<dyn Fn(&Value) + Send + Sync>);

impl DisplayHook {
    pub fn new(hook: impl Fn(&Value) + Send + Sync + 'static) -> Self {
        Self(Arc::new(hook))
    }

    pub fn display(&self, value: &Value) {
        (self.0)(value)
    }

    /// Return true if both handles point to the same hook.
    pub fn same_as(&self, other: &DisplayHook) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Debug for DisplayHook {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "DisplayHook({:p})", Arc::as_ptr(&self.0))
    }
}

/// Set of thread standard streams.
#[derive(Clone, Debug)]
pub struct StdStreams {
    pub stdin: InputStream,
    pub stdout: OutputStream,
    pub stderr: OutputStream,
    pub display_hook: DisplayHook,
}

impl StdStreams {
    /// Process standard streams.
    pub fn process() -> Self {
        Self {
            stdin: InputStream::new(io::stdin()),
            stdout: OutputStream::new(io::stdout()),
            stderr: OutputStream::new(io::stderr()),
            display_hook: DisplayHook::new(|value| {
                if *value != Value::None {
                    println!("{}", value.repr());
                }
            }),
        }
    }

    /// Return true if all endpoints are the same as in `other`.
    pub fn same_as(&self, other: &StdStreams) -> bool {
        self.stdin.same_as(&other.stdin)
            && self.stdout.same_as(&other.stdout)
            && self.stderr.same_as(&other.stderr)
            && self.display_hook.same_as(&other.display_hook)
    }
}

/// Kind of event passed to trace and profile callbacks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum TraceEvent {
    Call,
    Line,
    Return,
    Exception,
}

/// Trace or profile callback installed on a thread.
pub type TraceFn = Arc<dyn Fn(&dyn ExecutionPosition, TraceEvent) + Send + Sync>;

/// Interpreter visible state of a single thread.
pub trait ThreadState: Send + Sync {
    /// Return current thread streams.
    fn streams(&self) -> StdStreams;

    /// Atomically replace thread streams, return replaced ones.
    fn swap_streams(&self, streams: StdStreams) -> StdStreams;

    /// Set (or clear if `None`) thread trace callback.
    fn set_trace(&self, trace: Option<TraceFn>);

    /// Set (or clear if `None`) thread profile callback.
    fn set_profile(&self, profile: Option<TraceFn>);

    /// Return thread trace callback.
    fn trace(&self) -> Option<TraceFn>;

    /// Return thread profile callback.
    fn profile(&self) -> Option<TraceFn>;
}

/// Source of thread states.
pub trait ThreadStateProvider: Send + Sync {
    /// Return thread state, `None` if thread is unknown or already finished.
    fn thread_state(&self, thread: ThreadId) -> Option<Arc<dyn ThreadState>>;
}

/// In-process thread state.
pub struct SysState {
    streams: Mutex<StdStreams>,
    trace: Mutex<Option<TraceFn>>,
    profile: Mutex<Option<TraceFn>>,
}

impl SysState {
    pub fn new(streams: StdStreams) -> Self {
        Self {
            streams: Mutex::new(streams),
            trace: Mutex::default(),
            profile: Mutex::default(),
        }
    }

    pub fn stdin(&self) -> InputStream {
        self.streams().stdin
    }

    pub fn stdout(&self) -> OutputStream {
        self.streams().stdout
    }

    pub fn stderr(&self) -> OutputStream {
        self.streams().stderr
    }

    pub fn display_hook(&self) -> DisplayHook {
        self.streams().display_hook
    }
}

impl ThreadState for SysState {
    fn streams(&self) -> StdStreams {
        self.streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn swap_streams(&self, streams: StdStreams) -> StdStreams {
        let mut current = self.streams.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *current, streams)
    }

    fn set_trace(&self, trace: Option<TraceFn>) {
        *self.trace.lock().unwrap_or_else(PoisonError::into_inner) = trace;
    }

    fn set_profile(&self, profile: Option<TraceFn>) {
        *self.profile.lock().unwrap_or_else(PoisonError::into_inner) = profile;
    }

    fn trace(&self) -> Option<TraceFn> {
        self.trace.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn profile(&self) -> Option<TraceFn> {
        self.profile
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Registry of in-process thread states.
#[derive(Default)]
pub struct ThreadStates {
    states: RwLock<HashMap<ThreadId, Arc<SysState>>>,
}

impl ThreadStates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach state to a thread, previous thread state is replaced.
    pub fn attach(&self, thread: ThreadId, state: Arc<SysState>) {
        self.states
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(thread, state);
    }

    /// Attach new state with `streams` to the current thread.
    pub fn attach_current(&self, streams: StdStreams) -> Arc<SysState> {
        let state = Arc::new(SysState::new(streams));
        self.attach(thread::current().id(), state.clone());
        state
    }

    /// Detach thread state (typically when thread finishes).
    pub fn detach(&self, thread: ThreadId) -> Option<Arc<SysState>> {
        self.states
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&thread)
    }

    pub fn get(&self, thread: ThreadId) -> Option<Arc<SysState>> {
        self.states
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&thread)
            .cloned()
    }
}

impl ThreadStateProvider for ThreadStates {
    fn thread_state(&self, thread: ThreadId) -> Option<Arc<dyn ThreadState>> {
        self.get(thread).map(|state| state as Arc<dyn ThreadState>)
    }
}

/// Proxy streams backed by OS pipes. Thread side endpoints are installed into a hijacked
/// thread, session side lets a debugger feed the thread input and read its output.
pub struct ProxyIo {
    endpoints: StdStreams,
    input: Mutex<PipeWriter>,
    output: PipeReader,
    errors: PipeReader,
}

impl ProxyIo {
    /// Create proxy using current configuration.
    pub fn new() -> io::Result<Self> {
        Self::with_config(&config::current().hijack)
    }

    pub fn with_config(cfg: &HijackConfig) -> io::Result<Self> {
        let (stdin_reader, input) = os_pipe::pipe()?;
        let (output, stdout_writer) = os_pipe::pipe()?;
        let (errors, stderr_writer) = os_pipe::pipe()?;

        let stdout = OutputStream::new(stdout_writer);
        let display_out = stdout.clone();
        let display_none = cfg.display_none;
        let display_hook = DisplayHook::new(move |value| {
            if *value == Value::None && !display_none {
                return;
            }
            let mut out = display_out.clone();
            weak_error!(writeln!(out, "{}", value.repr()), "display hook:");
        });

        Ok(Self {
            endpoints: StdStreams {
                stdin: InputStream::new(stdin_reader),
                stdout,
                stderr: OutputStream::new(stderr_writer),
                display_hook,
            },
            input: Mutex::new(input),
            output,
            errors,
        })
    }

    /// Thread side endpoints.
    pub fn endpoints(&self) -> &StdStreams {
        &self.endpoints
    }

    /// Send data into the proxy stdin.
    pub fn send_input(&self, data: &[u8]) -> io::Result<()> {
        let mut input = self.input.lock().unwrap_or_else(PoisonError::into_inner);
        input.write_all(data)?;
        input.flush()
    }

    /// Return reader of data written into the proxy stdout (and display hook).
    pub fn output(&self) -> io::Result<PipeReader> {
        self.output.try_clone()
    }

    /// Return reader of data written into the proxy stderr.
    pub fn errors(&self) -> io::Result<PipeReader> {
        self.errors.try_clone()
    }
}

/// Captures a thread standard streams and redirects them to proxy endpoints.
///
/// Stream accessors depend on the asking thread: the target thread sees proxy endpoints, any other
/// thread sees original streams of the target. Original streams are restored exactly once, on
/// [`StreamHijacker::release`], [`StreamHijacker::restore`] or drop.
pub struct StreamHijacker {
    target: ThreadId,
    provider: Arc<dyn ThreadStateProvider>,
    proxy: ProxyIo,
    original: StdStreams,
    installed_at: DateTime<Local>,
    installed: AtomicBool,
}

impl StreamHijacker {
    /// Hijack standard streams of the `target` thread.
    ///
    /// # Errors
    ///
    /// [`Error::TargetUnavailable`] if there is no state for the target thread,
    /// [`Error::IO`] if proxy pipes can't be created.
    pub fn install(
        provider: Arc<dyn ThreadStateProvider>,
        target: ThreadId,
    ) -> Result<Self, Error> {
        let state = provider
            .thread_state(target)
            .ok_or(Error::TargetUnavailable(target))?;
        let proxy = ProxyIo::new()?;
        Ok(Self::hijack(provider, state, target, proxy))
    }

    /// Same as [`StreamHijacker::install`] but with an already created proxy.
    pub fn install_with(
        provider: Arc<dyn ThreadStateProvider>,
        target: ThreadId,
        proxy: ProxyIo,
    ) -> Result<Self, Error> {
        let state = provider
            .thread_state(target)
            .ok_or(Error::TargetUnavailable(target))?;
        Ok(Self::hijack(provider, state, target, proxy))
    }

    fn hijack(
        provider: Arc<dyn ThreadStateProvider>,
        state: Arc<dyn ThreadState>,
        target: ThreadId,
        proxy: ProxyIo,
    ) -> Self {
        let original = state.swap_streams(proxy.endpoints().clone());
        tw_info!(target: "debugger", "standard streams of thread {:?} hijacked", target);
        Self {
            target,
            provider,
            proxy,
            original,
            installed_at: Local::now(),
            installed: AtomicBool::new(true),
        }
    }

    pub fn target(&self) -> ThreadId {
        self.target
    }

    pub fn installed_at(&self) -> DateTime<Local> {
        self.installed_at
    }

    pub fn is_installed(&self) -> bool {
        self.installed.load(Ordering::SeqCst)
    }

    pub fn proxy(&self) -> &ProxyIo {
        &self.proxy
    }

    /// Return wrapped state of the target thread.
    pub fn thread_state(&self) -> Result<Arc<dyn ThreadState>, Error> {
        self.provider
            .thread_state(self.target)
            .ok_or(Error::TargetUnavailable(self.target))
    }

    fn endpoints_for(&self, caller: ThreadId) -> &StdStreams {
        if caller == self.target && self.is_installed() {
            self.proxy.endpoints()
        } else {
            &self.original
        }
    }

    pub fn stdin_for(&self, caller: ThreadId) -> InputStream {
        self.endpoints_for(caller).stdin.clone()
    }

    pub fn stdout_for(&self, caller: ThreadId) -> OutputStream {
        self.endpoints_for(caller).stdout.clone()
    }

    pub fn stderr_for(&self, caller: ThreadId) -> OutputStream {
        self.endpoints_for(caller).stderr.clone()
    }

    pub fn display_hook_for(&self, caller: ThreadId) -> DisplayHook {
        self.endpoints_for(caller).display_hook.clone()
    }

    /// Stdin as seen by the current thread.
    pub fn stdin(&self) -> InputStream {
        self.stdin_for(thread::current().id())
    }

    /// Stdout as seen by the current thread.
    pub fn stdout(&self) -> OutputStream {
        self.stdout_for(thread::current().id())
    }

    /// Stderr as seen by the current thread.
    pub fn stderr(&self) -> OutputStream {
        self.stderr_for(thread::current().id())
    }

    /// Display hook as seen by the current thread.
    pub fn display_hook(&self) -> DisplayHook {
        self.display_hook_for(thread::current().id())
    }

    /// Set trace callback of the target thread, `None` clears it.
    pub fn install_trace(&self, trace: Option<TraceFn>) -> Result<(), Error> {
        self.thread_state()?.set_trace(trace);
        Ok(())
    }

    /// Set profile callback of the target thread, `None` clears it.
    pub fn install_profile(&self, profile: Option<TraceFn>) -> Result<(), Error> {
        self.thread_state()?.set_profile(profile);
        Ok(())
    }

    /// Restore original streams of the target thread. Return false if streams were already
    /// restored. If target thread is gone there is nothing to restore, it is not an error.
    pub fn restore(&self) -> bool {
        if !self.installed.swap(false, Ordering::SeqCst) {
            return false;
        }

        if let Some(state) = weak_error!(self.thread_state(), "restore standard streams:") {
            state.swap_streams(self.original.clone());
            let elapsed = Local::now() - self.installed_at;
            tw_info!(
                target: "debugger",
                "standard streams of thread {:?} restored after {} ms",
                self.target,
                elapsed.num_milliseconds()
            );
        }
        true
    }

    /// Restore original streams and dispose hijacker.
    pub fn release(self) {
        self.restore();
    }
}

impl Drop for StreamHijacker {
    fn drop(&mut self) {
        self.restore();
    }
}
