use crate::assert_fired;
use crate::common::{at_line, enter, BlockingEvaluator};
use serial_test::serial;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use tripwire::debugger::{
    BreakpointOptions, BreakpointRegistry, ExpressionEvaluator, Location, PartyId, TripEvaluator,
};

const THREADS: usize = 8;

/// Run `pass` concurrently on `THREADS` threads, return total number of fired breakpoints.
fn run_concurrently<F>(pass: F) -> usize
where
    F: Fn() -> usize + Send + Sync,
{
    let barrier = Barrier::new(THREADS);
    let fired = AtomicUsize::new(0);
    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                barrier.wait();
                fired.fetch_add(pass(), Ordering::SeqCst);
            });
        }
    });
    fired.into_inner()
}

#[test]
#[serial]
fn test_temporary_retired_once() {
    for _ in 0..20 {
        let registry = BreakpointRegistry::new();
        let evaluator = ExpressionEvaluator::new(8);
        let party = PartyId::new();
        let bp = registry.add(Location::line("mt.py", 7), BreakpointOptions::temporary());
        bp.enable(party);

        let fired = run_concurrently(|| {
            TripEvaluator::new(&registry, &evaluator)
                .relevant_breakpoints(&at_line("mt.py", 7), party)
                .len()
        });

        assert_eq!(fired, 1);
        assert!(!bp.is_registered());
        assert!(registry.is_empty());
    }
}

#[test]
#[serial]
fn test_ignore_count_consumed_once() {
    let registry = BreakpointRegistry::new();
    let evaluator = ExpressionEvaluator::new(8);
    let party = PartyId::new();
    let bp = registry.add(
        Location::function("mt.py", "worker"),
        BreakpointOptions::default().with_condition("True"),
    );
    bp.enable(party);
    bp.ignore(party, 5);

    let fired = run_concurrently(|| {
        TripEvaluator::new(&registry, &evaluator)
            .relevant_breakpoints(&enter("mt.py", "worker", 3), party)
            .len()
    });

    assert_eq!(fired, THREADS - 5);
    assert_eq!(bp.hits(), THREADS as u64);
    assert_eq!(bp.ignore_count(party), 0);
}

#[test]
#[serial]
fn test_parties_are_independent() {
    let registry = BreakpointRegistry::new();
    let evaluator = ExpressionEvaluator::new(8);
    let parties = [PartyId::new(), PartyId::new()];
    let bp = registry.add(Location::line("mt.py", 1), BreakpointOptions::default());
    for (n, party) in parties.iter().enumerate() {
        bp.enable(*party);
        bp.ignore(*party, n as u32 + 1);
    }

    let fired = thread::scope(|s| {
        let handles = parties.map(|party| {
            let registry = &registry;
            let evaluator = &evaluator;
            s.spawn(move || {
                let trip = TripEvaluator::new(registry, evaluator);
                (0..4)
                    .map(|_| trip.relevant_breakpoints(&at_line("mt.py", 1), party).len())
                    .sum::<usize>()
            })
        });
        handles.map(|h| h.join().unwrap())
    });

    assert_eq!(fired, [3, 2]);
    assert_eq!(bp.hits(), 8);
}

#[test]
#[serial]
fn test_removed_during_condition_evaluation() {
    let registry = Arc::new(BreakpointRegistry::new());
    let (evaluator, control) = BlockingEvaluator::new();
    let evaluator = Arc::new(evaluator);
    let party = PartyId::new();
    let bp = registry.add(
        Location::line("mt.py", 1),
        BreakpointOptions::default().with_condition("slow()"),
    );
    bp.enable(party);

    let handle = {
        let registry = registry.clone();
        let evaluator = evaluator.clone();
        thread::spawn(move || {
            TripEvaluator::new(registry.as_ref(), evaluator.as_ref())
                .relevant_breakpoints(&at_line("mt.py", 1), party)
        })
    };

    // evaluation in progress, no locks are held
    control.entered.recv().unwrap();
    assert!(registry.remove(&bp));
    control.proceed.send(()).unwrap();

    let fired = handle.join().unwrap();
    assert_fired!(fired, []);
    assert_eq!(bp.hits(), 1);
}

#[test]
#[serial]
fn test_disabled_during_condition_evaluation() {
    let registry = Arc::new(BreakpointRegistry::new());
    let (evaluator, control) = BlockingEvaluator::new();
    let evaluator = Arc::new(evaluator);
    let party = PartyId::new();
    let bp = registry.add(
        Location::line("mt.py", 1),
        BreakpointOptions::temporary().with_condition("slow()"),
    );
    bp.enable(party);

    let handle = {
        let registry = registry.clone();
        let evaluator = evaluator.clone();
        thread::spawn(move || {
            TripEvaluator::new(registry.as_ref(), evaluator.as_ref())
                .relevant_breakpoints(&at_line("mt.py", 1), party)
        })
    };

    control.entered.recv().unwrap();
    bp.disable(party);
    control.proceed.send(()).unwrap();

    let fired = handle.join().unwrap();
    assert_fired!(fired, []);
    // temporary breakpoint is not retired by a disabled party
    assert!(bp.is_registered());
    assert_eq!(registry.len(), 1);
}
