use std::sync::Arc;
use tripwire::debugger::{BreakpointRegistry, ExpressionEvaluator, Location};
use tripwire::ui::command::CommandError;
use tripwire::ui::session::{Session, INITIAL_PARTY};

fn session(registry: Arc<BreakpointRegistry>) -> Session<Vec<u8>> {
    Session::with_evaluator(registry, ExpressionEvaluator::new(16), vec![])
}

fn run(session: &mut Session<Vec<u8>>, script: &str) -> usize {
    session.run(script.as_bytes()).unwrap()
}

#[test]
fn test_session_script() {
    let registry = Arc::new(BreakpointRegistry::new());
    let mut session = session(registry.clone());

    let failed = run(
        &mut session,
        r#"
# breakpoints of the main party
b app.py:10
tbreak app.py:handle if request == 'stop'
ignore app.py:10 1
step app.py:10
step app.py:10
step app.py:3 in handle entry 3 with request='go'
step app.py:3 in handle entry 3 with request='stop'
step app.py:3 in handle entry 3 with request='stop'
info
"#,
    );
    assert_eq!(failed, 0);

    let out = String::from_utf8(session.into_inner()).unwrap();
    let lines: Vec<_> = out.lines().collect();
    let line_bp = registry.at(&Location::line("app.py", 10))[0].id().unwrap();

    assert_eq!(lines[0], format!("New Breakpoint {line_bp} at app.py:10"));
    assert!(lines[1].ends_with(" at app.py:handle [temporary] if request == 'stop'"));
    assert_eq!(
        lines[2],
        format!(
            "Will ignore next 1 crossings of Breakpoint {line_bp} at app.py:10 for {INITIAL_PARTY}"
        )
    );
    assert_eq!(lines[3], "No breakpoints at app.py:10");
    assert_eq!(lines[4], format!("Hit Breakpoint {line_bp} at app.py:10"));
    assert_eq!(lines[5], "No breakpoints at app.py:3");
    assert!(lines[6].starts_with("Hit Breakpoint "));
    assert!(lines[6].ends_with("[temporary] if request == 'stop'"));
    assert_eq!(lines[7], "No breakpoints at app.py:3");
    assert_eq!(lines[8], format!("Breakpoint {line_bp} at app.py:10 hits: 2"));
    assert_eq!(lines.len(), 9);
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_session_parties() {
    let registry = Arc::new(BreakpointRegistry::new());
    let mut session = session(registry.clone());

    let failed = run(
        &mut session,
        "b lib.py:5\nparty other\nstep lib.py:5\nenable lib.py:5\nstep lib.py:5\ndisable lib.py:5\nparty main\nstep lib.py:5\n",
    );
    assert_eq!(failed, 0);

    let out = String::from_utf8(session.into_inner()).unwrap();
    let lines: Vec<_> = out.lines().collect();
    assert_eq!(lines[1], "Current party: other");
    assert_eq!(lines[2], "No breakpoints at lib.py:5");
    assert!(lines[3].starts_with("Enabled Breakpoint ") && lines[3].ends_with(" for other"));
    assert!(lines[4].starts_with("Hit Breakpoint "));
    assert!(lines[5].starts_with("Disabled Breakpoint "));
    assert_eq!(lines[6], "Current party: main");
    assert!(lines[7].starts_with("Hit Breakpoint "));
}

#[test]
fn test_session_errors() {
    let registry = Arc::new(BreakpointRegistry::new());
    let mut session = session(registry.clone());

    assert!(matches!(
        session.handle_line("b app.py:1 if x >"),
        Err(CommandError::Parsing(_))
    ));
    assert!(registry.is_empty());

    let err = session.handle_line("delete 4294967295").unwrap_err();
    assert!(err.is_stale());

    let err = session.handle_line("eval y with x=1").unwrap_err();
    assert!(!err.is_stale());
    assert_eq!(err.to_string(), "condition evaluation: name `y` is not defined");

    session.handle_line("b app.py:1").unwrap();
    session.handle_line("delete app.py:1").unwrap();
    session.handle_line("delete app.py:1").unwrap();
    assert!(registry.is_empty());

    let out = String::from_utf8(session.into_inner()).unwrap();
    assert!(out.lines().nth(1).unwrap().starts_with("Removed Breakpoint "));
    assert_eq!(out.lines().count(), 2);
}
