use serial_test::serial;
use std::io::{BufRead, BufReader, Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use tripwire::config::HijackConfig;
use tripwire::debugger::hijack::{
    DisplayHook, InputStream, OutputStream, StdStreams, TraceEvent, TraceFn,
};
use tripwire::debugger::{
    Error, ExecutionPosition, Position, ProxyIo, StreamHijacker, SysState, ThreadState,
    ThreadStateProvider, ThreadStates, Value,
};

fn test_streams() -> StdStreams {
    StdStreams {
        stdin: InputStream::new(std::io::empty()),
        stdout: OutputStream::new(std::io::sink()),
        stderr: OutputStream::new(std::io::sink()),
        display_hook: DisplayHook::new(|_| {}),
    }
}

fn other_thread() -> thread::ThreadId {
    thread::spawn(|| thread::current().id()).join().unwrap()
}

fn read_line(reader: impl Read) -> String {
    let mut line = String::new();
    BufReader::new(reader).read_line(&mut line).unwrap();
    line
}

#[test]
fn test_install_on_unknown_thread() {
    let states = Arc::new(ThreadStates::new());
    let target = other_thread();

    let err = StreamHijacker::install(states, target).err().unwrap();
    assert!(matches!(err, Error::TargetUnavailable(t) if t == target));
    assert!(err.is_stale());
}

#[test]
fn test_streams_depend_on_caller() {
    let states = Arc::new(ThreadStates::new());
    let target = other_thread();
    let original = test_streams();
    states.attach(target, Arc::new(SysState::new(original.clone())));

    let hijacker = StreamHijacker::install(states.clone(), target).unwrap();
    assert!(hijacker.is_installed());
    assert_eq!(hijacker.target(), target);

    let proxy = hijacker.proxy().endpoints().clone();
    let state = states.get(target).unwrap();
    assert!(state.streams().same_as(&proxy));
    assert!(!proxy.same_as(&original));

    assert!(hijacker.stdin_for(target).same_as(&proxy.stdin));
    assert!(hijacker.stdout_for(target).same_as(&proxy.stdout));
    assert!(hijacker.stderr_for(target).same_as(&proxy.stderr));
    assert!(hijacker.display_hook_for(target).same_as(&proxy.display_hook));

    // current thread is not a target
    assert!(hijacker.stdin().same_as(&original.stdin));
    assert!(hijacker.stdout().same_as(&original.stdout));
    assert!(hijacker.stderr().same_as(&original.stderr));
    assert!(hijacker.display_hook().same_as(&original.display_hook));

    hijacker.release();
    assert!(state.streams().same_as(&original));
}

#[test]
fn test_restore_once() {
    let states = Arc::new(ThreadStates::new());
    let original = test_streams();
    let state = states.attach_current(original.clone());
    let target = thread::current().id();

    let hijacker = StreamHijacker::install(states.clone(), target).unwrap();
    assert!(hijacker.stdout().same_as(&hijacker.proxy().endpoints().stdout));

    assert!(hijacker.restore());
    assert!(!hijacker.is_installed());
    assert!(state.streams().same_as(&original));
    assert!(hijacker.stdout().same_as(&original.stdout));

    // streams changed after restoration are left as is
    let replaced = test_streams();
    state.swap_streams(replaced.clone());
    assert!(!hijacker.restore());
    drop(hijacker);
    assert!(state.streams().same_as(&replaced));
}

#[test]
fn test_drop_restores_streams() {
    let states = Arc::new(ThreadStates::new());
    let original = test_streams();
    let state = states.attach_current(original.clone());

    {
        let _hijacker = StreamHijacker::install(states.clone(), thread::current().id()).unwrap();
        assert!(!state.streams().same_as(&original));
    }
    assert!(state.streams().same_as(&original));
}

#[test]
fn test_proxy_io() {
    let states = Arc::new(ThreadStates::new());
    let state = states.attach_current(test_streams());
    let hijacker = StreamHijacker::install(states.clone(), thread::current().id()).unwrap();

    let mut stdout = state.stdout();
    writeln!(stdout, "hello").unwrap();
    stdout.flush().unwrap();
    assert_eq!(read_line(hijacker.proxy().output().unwrap()), "hello\n");

    let mut stderr = hijacker.stderr();
    writeln!(stderr, "oops").unwrap();
    assert_eq!(read_line(hijacker.proxy().errors().unwrap()), "oops\n");

    hijacker.proxy().send_input(b"input line\n").unwrap();
    assert_eq!(read_line(state.stdin()), "input line\n");
}

#[test]
fn test_display_hook() {
    let proxy = ProxyIo::with_config(&HijackConfig::default()).unwrap();
    let hook = proxy.endpoints().display_hook.clone();
    hook.display(&Value::None);
    hook.display(&Value::Str("a".to_string()));
    assert_eq!(read_line(proxy.output().unwrap()), "\"a\"\n");

    let proxy = ProxyIo::with_config(&HijackConfig { display_none: true }).unwrap();
    proxy.endpoints().display_hook.display(&Value::None);
    assert_eq!(read_line(proxy.output().unwrap()), "None\n");
}

#[test]
fn test_trace_and_profile() {
    let states = Arc::new(ThreadStates::new());
    let target = other_thread();
    states.attach(target, Arc::new(SysState::new(test_streams())));
    let hijacker = StreamHijacker::install(states.clone(), target).unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let trace: TraceFn = Arc::new(move |position: &dyn ExecutionPosition, event: TraceEvent| {
        assert_eq!(position.line(), 3);
        assert_eq!(event, TraceEvent::Line);
        counter.fetch_add(1, Ordering::SeqCst);
    });
    hijacker.install_trace(Some(trace)).unwrap();
    hijacker.install_profile(None).unwrap();

    let state = hijacker.thread_state().unwrap();
    let installed = state.trace().unwrap();
    installed(&Position::new("a.py", 3, "foo"), TraceEvent::Line);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(state.profile().is_none());

    hijacker.install_trace(None).unwrap();
    assert!(state.trace().is_none());
}

#[test]
fn test_trace_event_names() {
    assert_eq!(TraceEvent::Exception.to_string(), "exception");
    assert_eq!(TraceEvent::Call.to_string(), "call");
    assert_eq!(format!("{}", TraceEvent::Return), "return");
}

#[test]
#[serial]
fn test_target_gone() {
    let states = Arc::new(ThreadStates::new());
    let target = other_thread();
    states.attach(target, Arc::new(SysState::new(test_streams())));
    let hijacker = StreamHijacker::install(states.clone(), target).unwrap();

    states.detach(target);
    assert!(states.thread_state(target).is_none());
    assert!(matches!(
        hijacker.install_trace(None),
        Err(Error::TargetUnavailable(_))
    ));

    tripwire::log::disable();
    assert!(hijacker.restore());
    tripwire::log::enable();
    assert!(!hijacker.restore());
}
