use tripwire::debugger::{Bindings, EvalError, Evaluator, ExpressionEvaluator, Value};

fn bindings() -> Bindings {
    Bindings::default()
        .with_global("count", 10)
        .with_global("name", "worker")
        .with_local("count", 3)
        .with_local("ratio", 0.5)
        .with_local("empty", "")
        .with_local("nothing", Value::None)
}

#[test]
fn test_evaluate_truth_value() {
    struct TestCase {
        expression: &'static str,
        result: Result<bool, EvalError>,
    }
    let cases = vec![
        TestCase {
            expression: "count == 3",
            result: Ok(true),
        },
        TestCase {
            expression: "count > 5 or name == 'worker'",
            result: Ok(true),
        },
        TestCase {
            expression: "not (count < 5 and ratio >= 0.5)",
            result: Ok(false),
        },
        TestCase {
            expression: "empty or nothing",
            result: Ok(false),
        },
        TestCase {
            expression: "count % 2",
            result: Ok(true),
        },
        TestCase {
            expression: "nothing == None",
            result: Ok(true),
        },
        TestCase {
            expression: "name",
            result: Ok(true),
        },
        TestCase {
            expression: "missing > 1",
            result: Err(EvalError::UnknownVariable("missing".to_string())),
        },
        TestCase {
            expression: "count / (count - 3)",
            result: Err(EvalError::DivisionByZero),
        },
        TestCase {
            expression: "name > 1",
            result: Err(EvalError::TypeMismatch(">", "str", "int")),
        },
        // short-circuit, right side is never evaluated
        TestCase {
            expression: "count == 3 or missing",
            result: Ok(true),
        },
    ];

    let evaluator = ExpressionEvaluator::new(4);
    let bindings = bindings();
    for tc in cases {
        assert_eq!(
            evaluator.evaluate(tc.expression, &bindings),
            tc.result,
            "{}",
            tc.expression
        );
    }
}

#[test]
fn test_value() {
    let evaluator = ExpressionEvaluator::new(4);
    let bindings = bindings();

    assert_eq!(evaluator.value("count * 2 + 1", &bindings), Ok(Value::Int(7)));
    assert_eq!(evaluator.value("count / 2", &bindings), Ok(Value::Float(1.5)));
    assert_eq!(evaluator.value("-7 % 3", &bindings), Ok(Value::Int(2)));
    assert_eq!(
        evaluator.value("name + '-1'", &bindings),
        Ok(Value::Str("worker-1".to_string()))
    );
    assert_eq!(
        evaluator.value("empty or name", &bindings),
        Ok(Value::Str("worker".to_string()))
    );
}

#[test]
fn test_malformed_expression() {
    let evaluator = ExpressionEvaluator::new(4);
    for expression in ["", "count >", "(count", "count == == 3", "and"] {
        let result = evaluator.evaluate(expression, &Bindings::default());
        assert!(
            matches!(result, Err(EvalError::Parse(_))),
            "{expression}: {result:?}"
        );
    }
}

#[test]
fn test_cached_expression_sees_new_bindings() {
    // cache of a single expression
    let evaluator = ExpressionEvaluator::new(0);
    let expression = "x > 1";

    for (x, expected) in [(0, false), (2, true), (1, false)] {
        let bindings = Bindings::default().with_local("x", x);
        assert_eq!(evaluator.evaluate(expression, &bindings), Ok(expected));
        assert_eq!(evaluator.evaluate("x == x", &bindings), Ok(true));
    }
}
