use super::r#break::BreakpointIdentity;
use super::{r#break, step, Command, CommandError, CommandResult};
use crate::debugger::condition::{self, keyword};
use crate::debugger::{Bindings, Location, Position, Selector, Value};
use chumsky::error::Rich;
use chumsky::prelude::{any, choice, end, just, none_of, one_of};
use chumsky::{extra, text, Boxed, IterParser, Parser};
use itertools::Itertools;
use std::fmt::Display;
use std::str::FromStr;

pub const BREAK_COMMAND: &str = "break";
pub const BREAK_COMMAND_SHORT: &str = "b";
pub const TBREAK_COMMAND: &str = "tbreak";
pub const ENABLE_COMMAND: &str = "enable";
pub const DISABLE_COMMAND: &str = "disable";
pub const DELETE_COMMAND: &str = "delete";
pub const DELETE_COMMAND_SHORT: &str = "d";
pub const IGNORE_COMMAND: &str = "ignore";
pub const INFO_COMMAND: &str = "info";
pub const PARTY_COMMAND: &str = "party";
pub const STEP_COMMAND: &str = "step";
pub const STEP_COMMAND_IN_KEY: &str = "in";
pub const STEP_COMMAND_ENTRY_KEY: &str = "entry";
pub const EVAL_COMMAND: &str = "eval";
pub const CONDITION_KEY: &str = "if";
pub const BINDINGS_KEY: &str = "with";
pub const COMMENT_PREFIX: char = '#';

/// Function name of statements outside of any function.
pub const MODULE_FUNCTION: &str = "<module>";

type Err<'a> = extra::Err<Rich<'a, char>>;

fn number<'a, T>() -> impl Parser<'a, &'a str, T, Err<'a>> + Clone
where
    T: FromStr,
    T::Err: Display,
{
    text::int(10)
        .try_map(|s: &str, span| s.parse::<T>().map_err(|e| Rich::custom(span, e)))
        .padded()
        .labelled("number")
}

fn file_name<'a>() -> impl Parser<'a, &'a str, &'a str, Err<'a>> + Clone {
    any()
        .filter(|c: &char| *c != ':' && !c.is_whitespace())
        .repeated()
        .at_least(1)
        .to_slice()
        .labelled("file name")
}

fn function_name<'a>() -> impl Parser<'a, &'a str, &'a str, Err<'a>> + Clone {
    text::ascii::ident()
        .separated_by(just('.'))
        .at_least(1)
        .to_slice()
        .padded()
        .labelled("function name")
}

/// Parser of `file:line` and `file:function` locations.
pub fn location<'a>() -> impl Parser<'a, &'a str, Location, Err<'a>> + Clone {
    file_name()
        .then_ignore(just(':'))
        .then(choice((
            number::<u64>().map(Selector::Line),
            function_name().map(|f: &str| Selector::Function(f.to_string())),
        )))
        .map(|(file, selector)| Location::new(file, selector))
        .padded()
        .labelled("location")
}

pub fn brkpt_identity<'a>() -> impl Parser<'a, &'a str, BreakpointIdentity, Err<'a>> + Clone {
    choice((
        location().map(BreakpointIdentity::Location),
        number::<u32>().map(BreakpointIdentity::Number),
    ))
}

/// Parser of `with name=literal, ...` clause.
pub fn bindings<'a>() -> impl Parser<'a, &'a str, Bindings, Err<'a>> + Clone {
    let value = just('-')
        .padded()
        .or_not()
        .then(condition::literal())
        .try_map(|(minus, value): (Option<char>, Value), span| match (minus, value) {
            (None, value) => Ok(value),
            (Some(_), Value::Int(i)) => Ok(Value::Int(-i)),
            (Some(_), Value::Float(f)) => Ok(Value::Float(-f)),
            (Some(_), value) => Err(Rich::custom(
                span,
                format!("bad operand type for unary -: {}", value.type_name()),
            )),
        });

    let assignment = text::ascii::ident()
        .padded()
        .then_ignore(just('=').padded())
        .then(value);

    keyword(BINDINGS_KEY)
        .ignore_then(
            assignment
                .separated_by(just(',').padded())
                .at_least(1)
                .collect::<Vec<_>>(),
        )
        .map(|assignments| {
            assignments
                .into_iter()
                .fold(Bindings::default(), |bindings, (name, value)| {
                    bindings.with_local(name, value)
                })
        })
        .labelled("bindings")
}

fn command<'a, I>(ctx: &'static str, inner: I) -> Boxed<'a, 'a, &'a str, Command, Err<'a>>
where
    I: Parser<'a, &'a str, Command, Err<'a>> + 'a,
{
    inner.then_ignore(end()).labelled(ctx).boxed()
}

impl Command {
    /// Parse input string into command. Blank lines and comments are skipped.
    pub fn parse(input: &str) -> CommandResult<Command> {
        let input = input.trim();
        if input.is_empty() || input.starts_with(COMMENT_PREFIX) {
            return Ok(Command::SkipInput);
        }

        Self::parser()
            .parse(input)
            .into_result()
            .map_err(|errors| CommandError::Parsing(errors.iter().join("; ")))
    }

    fn parser<'a>() -> impl Parser<'a, &'a str, Command, Err<'a>> {
        let op = |sym| keyword(sym);
        let op2 = |full, short| keyword(full).or(keyword(short));

        let condition = keyword(CONDITION_KEY).ignore_then(
            any()
                .repeated()
                .at_least(1)
                .to_slice()
                .try_map(|s: &str, span| {
                    let s = s.trim();
                    condition::parse(s)
                        .map(|_| s.to_string())
                        .map_err(|e| Rich::custom(span, e))
                }),
        );
        let add = move |temporary| {
            location()
                .then(condition.clone().or_not())
                .map(move |(location, condition)| {
                    Command::Breakpoint(r#break::Command::Add {
                        location,
                        temporary,
                        condition,
                    })
                })
        };

        let r#break = op2(BREAK_COMMAND, BREAK_COMMAND_SHORT)
            .ignore_then(add(false))
            .boxed();
        let tbreak = op(TBREAK_COMMAND).ignore_then(add(true)).boxed();

        let refs = || brkpt_identity().repeated().at_least(1).collect::<Vec<_>>();
        let enable = op(ENABLE_COMMAND)
            .ignore_then(refs())
            .map(|refs| Command::Breakpoint(r#break::Command::Enable(refs)))
            .boxed();
        let disable = op(DISABLE_COMMAND)
            .ignore_then(refs())
            .map(|refs| Command::Breakpoint(r#break::Command::Disable(refs)))
            .boxed();
        let delete = op2(DELETE_COMMAND, DELETE_COMMAND_SHORT)
            .ignore_then(refs())
            .map(|refs| Command::Breakpoint(r#break::Command::Remove(refs)))
            .boxed();

        let ignore = op(IGNORE_COMMAND)
            .ignore_then(brkpt_identity().then(number::<u32>()))
            .map(|(identity, count)| Command::Breakpoint(r#break::Command::Ignore(identity, count)))
            .boxed();

        let info = op(INFO_COMMAND)
            .to(Command::Breakpoint(r#break::Command::Info))
            .boxed();

        let party = op(PARTY_COMMAND)
            .ignore_then(text::ascii::ident().padded())
            .map(|name: &str| Command::Party(name.to_string()))
            .boxed();

        let function = op(STEP_COMMAND_IN_KEY)
            .ignore_then(function_name())
            .then(op(STEP_COMMAND_ENTRY_KEY).ignore_then(number::<u64>()).or_not());
        let step = op(STEP_COMMAND)
            .ignore_then(file_name().then_ignore(just(':')).then(number::<u64>()))
            .then(function.or_not())
            .then(bindings().or_not())
            .map(|(((file, line), function), bindings)| {
                let mut position = match function {
                    None => Position::new(file, line, MODULE_FUNCTION),
                    Some((function, None)) => Position::new(file, line, function),
                    Some((function, Some(entry))) => {
                        Position::new(file, line, function).with_entry_line(entry)
                    }
                };
                if let Some(bindings) = bindings {
                    position = position.with_bindings(bindings);
                }
                Command::Step(step::Command { position })
            })
            .boxed();

        // `with` inside string literals is a part of an expression
        let quoted = |quote: char| {
            just(quote)
                .then(none_of([quote]).repeated())
                .then(just(quote))
                .ignored()
        };
        let bindings_start = text::whitespace().at_least(1).then(keyword(BINDINGS_KEY));
        let expression_part = choice((
            quoted('"'),
            quoted('\''),
            any()
                .and_is(one_of("'\"").not())
                .and_is(bindings_start.not())
                .ignored(),
        ));
        let eval = op(EVAL_COMMAND)
            .ignore_then(expression_part.repeated().at_least(1).to_slice())
            .then(bindings().or_not())
            .map(|(expression, bindings): (&str, _)| Command::Eval {
                expression: expression.trim().to_string(),
                bindings: bindings.unwrap_or_default(),
            })
            .boxed();

        choice((
            command(BREAK_COMMAND, r#break),
            command(TBREAK_COMMAND, tbreak),
            command(ENABLE_COMMAND, enable),
            command(DISABLE_COMMAND, disable),
            command(DELETE_COMMAND, delete),
            command(IGNORE_COMMAND, ignore),
            command(INFO_COMMAND, info),
            command(PARTY_COMMAND, party),
            command(STEP_COMMAND, step),
            command(EVAL_COMMAND, eval),
        ))
        .map_err(|e| {
            let span = e.span();
            if span.start == 0 && span.end == 0 {
                Rich::custom(*e.span(), "unknown command")
            } else {
                e
            }
        })
    }
}

#[test]
fn test_location_parser() {
    struct TestCase {
        string: &'static str,
        result: Result<Location, ()>,
    }
    let cases = vec![
        TestCase {
            string: "a.py:10",
            result: Ok(Location::line("a.py", 10)),
        },
        TestCase {
            string: "  src/app/main.py:foo ",
            result: Ok(Location::function("src/app/main.py", "foo")),
        },
        TestCase {
            string: "a.py:Cls.method",
            result: Ok(Location::function("a.py", "Cls.method")),
        },
        TestCase {
            string: "a.py",
            result: Err(()),
        },
        TestCase {
            string: ":10",
            result: Err(()),
        },
        TestCase {
            string: "a.py:99999999999999999999999",
            result: Err(()),
        },
    ];

    for tc in cases {
        let loc = location().then_ignore(end()).parse(tc.string).into_result();
        assert_eq!(loc.map_err(|_| ()), tc.result, "{}", tc.string);
    }
}

#[test]
fn test_bindings_parser() {
    let bindings = bindings()
        .then_ignore(end())
        .parse(" with x = 1, name='bob', y=-2.5, flag=True")
        .into_result()
        .unwrap();
    assert_eq!(bindings.lookup("x"), Some(&Value::Int(1)));
    assert_eq!(bindings.lookup("name"), Some(&Value::Str("bob".into())));
    assert_eq!(bindings.lookup("y"), Some(&Value::Float(-2.5)));
    assert_eq!(bindings.lookup("flag"), Some(&Value::Bool(true)));

    assert!(self::bindings()
        .then_ignore(end())
        .parse("with x=-'a'")
        .into_result()
        .is_err());
    assert!(self::bindings()
        .then_ignore(end())
        .parse("with")
        .into_result()
        .is_err());
}

#[test]
fn test_parser() {
    struct TestCase {
        inputs: Vec<&'static str>,
        command_matcher: fn(result: Result<Command, CommandError>),
    }
    let cases = vec![
        TestCase {
            inputs: vec!["b a.py:10", "break a.py:10", "   break   a.py:10  "],
            command_matcher: |result| {
                assert!(matches!(
                    result.unwrap(),
                    Command::Breakpoint(r#break::Command::Add { location, temporary: false, condition: None })
                        if location == Location::line("a.py", 10)
                ));
            },
        },
        TestCase {
            inputs: vec!["tbreak a.py:foo if x > 1", "tbreak a.py:foo   if   x > 1  "],
            command_matcher: |result| {
                assert!(matches!(
                    result.unwrap(),
                    Command::Breakpoint(r#break::Command::Add { location, temporary: true, condition: Some(c) })
                        if location == Location::function("a.py", "foo") && c == "x > 1"
                ));
            },
        },
        TestCase {
            inputs: vec!["b a.py:10 if x >", "b a.py:10 if", "b", "bb a.py:10"],
            command_matcher: |result| assert!(result.is_err()),
        },
        TestCase {
            inputs: vec!["enable 1 a.py:10 2"],
            command_matcher: |result| {
                assert!(matches!(
                    result.unwrap(),
                    Command::Breakpoint(r#break::Command::Enable(refs)) if refs == vec![
                        BreakpointIdentity::Number(1),
                        BreakpointIdentity::Location(Location::line("a.py", 10)),
                        BreakpointIdentity::Number(2),
                    ]
                ));
            },
        },
        TestCase {
            inputs: vec!["disable a.py:foo"],
            command_matcher: |result| {
                assert!(matches!(
                    result.unwrap(),
                    Command::Breakpoint(r#break::Command::Disable(refs))
                        if refs == vec![BreakpointIdentity::Location(Location::function("a.py", "foo"))]
                ));
            },
        },
        TestCase {
            inputs: vec!["d 3", "delete 3"],
            command_matcher: |result| {
                assert!(matches!(
                    result.unwrap(),
                    Command::Breakpoint(r#break::Command::Remove(refs))
                        if refs == vec![BreakpointIdentity::Number(3)]
                ));
            },
        },
        TestCase {
            inputs: vec!["delete", "enable", "disable x"],
            command_matcher: |result| assert!(result.is_err()),
        },
        TestCase {
            inputs: vec!["ignore 1 3", " ignore  1  3 "],
            command_matcher: |result| {
                assert!(matches!(
                    result.unwrap(),
                    Command::Breakpoint(r#break::Command::Ignore(BreakpointIdentity::Number(1), 3))
                ));
            },
        },
        TestCase {
            inputs: vec!["ignore 1", "ignore 1 -3"],
            command_matcher: |result| assert!(result.is_err()),
        },
        TestCase {
            inputs: vec!["info"],
            command_matcher: |result| {
                assert!(matches!(
                    result.unwrap(),
                    Command::Breakpoint(r#break::Command::Info)
                ));
            },
        },
        TestCase {
            inputs: vec!["party worker", "party   worker "],
            command_matcher: |result| {
                assert!(matches!(result.unwrap(), Command::Party(p) if p == "worker"));
            },
        },
        TestCase {
            inputs: vec!["step a.py:10"],
            command_matcher: |result| {
                assert!(matches!(
                    result.unwrap(),
                    Command::Step(step::Command { position })
                        if position.file == "a.py"
                            && position.line == 10
                            && position.function == MODULE_FUNCTION
                            && position.entry_line.is_none()
                            && position.bindings.is_empty()
                ));
            },
        },
        TestCase {
            inputs: vec!["step a.py:5 in foo entry 5 with x=2, y='a'"],
            command_matcher: |result| {
                assert!(matches!(
                    result.unwrap(),
                    Command::Step(step::Command { position })
                        if position.function == "foo"
                            && position.entry_line == Some(5)
                            && position.bindings.lookup("x") == Some(&Value::Int(2))
                            && position.bindings.lookup("y") == Some(&Value::Str("a".into()))
                ));
            },
        },
        TestCase {
            inputs: vec!["step a.py", "step a.py:1 in", "step a.py:1 with"],
            command_matcher: |result| assert!(result.is_err()),
        },
        TestCase {
            inputs: vec!["eval x + 1 with x=1", "eval   x + 1   with   x = 1"],
            command_matcher: |result| {
                assert!(matches!(
                    result.unwrap(),
                    Command::Eval { expression, bindings }
                        if expression == "x + 1" && bindings.lookup("x") == Some(&Value::Int(1))
                ));
            },
        },
        TestCase {
            inputs: vec![
                "eval name == 'a with b'",
                "eval name == 'a with b' with name='a with b'",
            ],
            command_matcher: |result| {
                assert!(matches!(
                    result.unwrap(),
                    Command::Eval { expression, .. } if expression == "name == 'a with b'"
                ));
            },
        },
        TestCase {
            inputs: vec!["eval \"with\" with x=1"],
            command_matcher: |result| {
                assert!(matches!(
                    result.unwrap(),
                    Command::Eval { expression, bindings }
                        if expression == "\"with\"" && bindings.lookup("x") == Some(&Value::Int(1))
                ));
            },
        },
        TestCase {
            inputs: vec!["eval without"],
            command_matcher: |result| {
                assert!(matches!(
                    result.unwrap(),
                    Command::Eval { expression, bindings } if expression == "without" && bindings.is_empty()
                ));
            },
        },
        TestCase {
            inputs: vec!["", "   ", "# comment", "  # b a.py:1"],
            command_matcher: |result| {
                assert!(matches!(result.unwrap(), Command::SkipInput));
            },
        },
        TestCase {
            inputs: vec!["eval 'unterminated with x=1"],
            command_matcher: |result| assert!(matches!(result, Err(CommandError::Parsing(_)))),
        },
        TestCase {
            inputs: vec!["continue", "eval"],
            command_matcher: |result| assert!(matches!(result, Err(CommandError::Parsing(_)))),
        },
    ];

    for case in cases {
        for input in case.inputs {
            (case.command_matcher)(Command::parse(input));
        }
    }
}

#[test]
fn test_deeply_nested_condition() {
    let condition = format!("{}x{}", "(".repeat(1000), ")".repeat(1000));
    let result = Command::parse(&format!("b a.py:1 if {condition}"));
    assert!(matches!(result, Err(CommandError::Parsing(_))));

    let result = Command::parse("tbreak a.py:1 if 0 < x < 10");
    assert!(matches!(
        result.unwrap(),
        Command::Breakpoint(r#break::Command::Add { condition: Some(c), temporary: true, .. })
            if c == "0 < x < 10"
    ));
}
