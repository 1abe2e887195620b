//! Script parser and runner for chain sessions.
//!
//! Script format, one command per line:
//! ```text
//! # keep the words starting with "a", longest first
//! PATTERN regex /^a/ I
//! FILTER
//! WORKER len
//! SORT DESC BY
//! ```
//!
//! - Keywords are case-insensitive
//! - Lines starting with `#` are comments
//! - Patterns and string literals are delimited strings: the first
//!   non-blank character is the delimiter (`/x/`, `"x"`, `.x.`)
//!
//! Supported commands:
//! - `AS one|many|edit|query|auto|manual` - Switch a mode
//! - `WORKER upper|lower|trim|len|int|float|str|reverse|split` - Built-in worker
//! - `PATTERN parse|regex|glob /pattern/ [I]` - Pattern worker, `I` ignores case
//! - `WRAP list|set|tuple|map|ascii|utf8|text [strict|replace|ignore]` - Output wrapper
//! - `SNAPSHOT [BASELINE] [ORIGINAL]` - Checkpoint incoming
//! - `UNDO [n|BASELINE|ORIGINAL]` - Restore incoming
//! - `OUTIN` / `INOUT` - Rebalance
//! - `MAP`, `ITEMS`, `ENUMERATE`
//! - `FILTER`, `REJECT`, `FIND`, `PARTITION`, `PICK key`
//! - `MERGE`, `SMASH`, `ZIP`
//! - `AT n [default]`, `FIRST n`, `LAST n`, `INITIAL`, `REST`, `DICE n [fill]`
//! - `UNION`, `INTERSECTION`, `DIFFERENCE`, `SYMDIFF`, `UNIQUE`
//! - `EACH n`, `TIMES n`, `RANGE start stop [step]`
//! - `SORT [DESC] [BY]`, `REVERSE`, `GROUP`
//! - `SUM`, `COUNT`, `MIN`, `MAX`, `AVERAGE`, `MEDIAN`

use std::str::FromStr;

use crate::chain::Chain;
use crate::config::Mode;
use crate::error::{ChainError, Result};
use crate::history::Restore;
use crate::op::{CompareOp, FilterOp, MapOp, MathOp, Op, OrderOp, ReduceOp, RepeatOp, SliceOp};
use crate::output::ErrorPolicy;
use crate::trace::OpTrace;
use crate::value::Value;
use crate::worker::{Engine, PatternFlags};

/// Built-in workers available to scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinWorker {
    Upper,
    Lower,
    Trim,
    Len,
    Int,
    Float,
    Str,
    Reverse,
    Split,
}

impl FromStr for BuiltinWorker {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        match s.to_ascii_lowercase().as_str() {
            "upper" => Ok(BuiltinWorker::Upper),
            "lower" => Ok(BuiltinWorker::Lower),
            "trim" => Ok(BuiltinWorker::Trim),
            "len" => Ok(BuiltinWorker::Len),
            "int" => Ok(BuiltinWorker::Int),
            "float" => Ok(BuiltinWorker::Float),
            "str" => Ok(BuiltinWorker::Str),
            "reverse" => Ok(BuiltinWorker::Reverse),
            "split" => Ok(BuiltinWorker::Split),
            _ => Err(format!("Unknown worker: {s}")),
        }
    }
}

fn expect_text<'a>(value: &'a Value, expected: &'static str) -> Result<&'a str> {
    value.as_str().ok_or(ChainError::Type {
        op: "WORKER",
        expected,
        found: value.type_name(),
    })
}

impl BuiltinWorker {
    pub fn apply(&self, value: &Value) -> Result<Value> {
        match self {
            BuiltinWorker::Upper => Ok(Value::from(expect_text(value, "str")?.to_uppercase())),
            BuiltinWorker::Lower => Ok(Value::from(expect_text(value, "str")?.to_lowercase())),
            BuiltinWorker::Trim => Ok(Value::from(expect_text(value, "str")?.trim())),
            BuiltinWorker::Reverse => Ok(Value::from(
                expect_text(value, "str")?.chars().rev().collect::<String>(),
            )),
            BuiltinWorker::Split => Ok(expect_text(value, "str")?
                .split_whitespace()
                .collect()),
            BuiltinWorker::Len => match value {
                Value::Str(s) => Ok(Value::from(s.chars().count())),
                Value::Bytes(b) => Ok(Value::from(b.len())),
                other => other.len().map(Value::from).ok_or(ChainError::Type {
                    op: "WORKER",
                    expected: "sized",
                    found: other.type_name(),
                }),
            },
            BuiltinWorker::Int => match value {
                Value::Int(n) => Ok(Value::Int(*n)),
                Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
                Value::Float(f) => Ok(Value::Int(f.trunc() as i64)),
                other => {
                    let text = expect_text(other, "number")?.trim();
                    text.parse::<i64>()
                        .map(Value::Int)
                        .map_err(|_| ChainError::Worker(format!("not an integer: '{text}'")))
                }
            },
            BuiltinWorker::Float => match value {
                Value::Str(s) => {
                    let text = s.trim();
                    text.parse::<f64>()
                        .map(Value::Float)
                        .map_err(|_| ChainError::Worker(format!("not a number: '{text}'")))
                }
                other => other.as_f64().map(Value::Float).ok_or(ChainError::Type {
                    op: "WORKER",
                    expected: "number",
                    found: other.type_name(),
                }),
            },
            BuiltinWorker::Str => Ok(Value::from(value.to_string())),
        }
    }
}

/// Output wrappers available to scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapKind {
    List,
    Set,
    Tuple,
    Map,
    Ascii,
    Utf8,
    Text,
}

impl FromStr for WrapKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        match s.to_ascii_lowercase().as_str() {
            "list" => Ok(WrapKind::List),
            "set" => Ok(WrapKind::Set),
            "tuple" => Ok(WrapKind::Tuple),
            "map" => Ok(WrapKind::Map),
            "ascii" => Ok(WrapKind::Ascii),
            "utf8" => Ok(WrapKind::Utf8),
            "text" => Ok(WrapKind::Text),
            _ => Err(format!("Unknown wrapper: {s}")),
        }
    }
}

/// Parsed script command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// AS mode
    As(Mode),
    /// WORKER name
    Worker(BuiltinWorker),
    /// PATTERN engine /pattern/ [I]
    Pattern {
        engine: Engine,
        pattern: String,
        ignore_case: bool,
    },
    /// WRAP kind [policy]
    Wrap { kind: WrapKind, policy: ErrorPolicy },
    /// SNAPSHOT [BASELINE] [ORIGINAL]
    Snapshot { baseline: bool, original: bool },
    /// UNDO [n|BASELINE|ORIGINAL]
    Undo(Restore),
    /// OUTIN - copy outgoing into incoming
    OutIn,
    /// INOUT - copy incoming into outgoing
    InOut,
    /// Any operation
    Apply(Op),
}

impl Command {
    /// Get the command name for error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Command::As(_) => "AS",
            Command::Worker(_) => "WORKER",
            Command::Pattern { .. } => "PATTERN",
            Command::Wrap { .. } => "WRAP",
            Command::Snapshot { .. } => "SNAPSHOT",
            Command::Undo(_) => "UNDO",
            Command::OutIn => "OUTIN",
            Command::InOut => "INOUT",
            Command::Apply(op) => op.name(),
        }
    }
}

/// Run a script against input text.
///
/// Every non-empty input line becomes one text element. Returns
/// (output_text, input_count, output_count) on success.
pub fn execute_script(input_text: &str, script: &str) -> Result<(String, usize, usize)> {
    let (output, input_count, output_count, _) = execute_script_traced(input_text, script)?;
    Ok((output, input_count, output_count))
}

/// Run a script and also return the trace of every applied operation.
pub fn execute_script_traced(
    input_text: &str,
    script: &str,
) -> Result<(String, usize, usize, Vec<OpTrace>)> {
    let commands = parse_commands(script)?;

    let inputs: Vec<Value> = input_text
        .lines()
        .filter(|line| !line.is_empty())
        .map(Value::from)
        .collect();
    let input_count = inputs.len();

    let mut chain = Chain::from_things(inputs);
    let mut blame = Blame::default();
    for (line, cmd) in &commands {
        let applied = chain.trace().len();
        let result = apply_command(&mut chain, cmd);
        if chain.trace().len() > applied {
            blame.op_lines.push(*line);
        }
        result.map_err(|e| blame.error(&chain, Some((*line, cmd.name())), e))?;
    }

    let result = chain.read().map_err(|e| blame.error(&chain, None, e))?;
    let (output_text, output_count) = format_result(result);
    Ok((output_text, input_count, output_count, chain.trace()))
}

/// Script lines of the applied operations, for pinning an element error
/// on the operation that raised it rather than the one that read it.
#[derive(Default)]
struct Blame {
    op_lines: Vec<usize>,
}

impl Blame {
    fn error(&self, chain: &Chain, current: Option<(usize, &'static str)>, e: ChainError) -> ChainError {
        let failed = chain
            .trace()
            .into_iter()
            .find(|t| t.failed)
            .and_then(|t| Some((*self.op_lines.get(t.index)?, t.name)));
        match failed.or(current) {
            Some((line, name)) => ChainError::Script {
                line,
                message: format!("{name}: {e}"),
            },
            None => e,
        }
    }
}

/// Containers print one member per line, anything else on one line.
fn format_result(result: Value) -> (String, usize) {
    match result.into_items() {
        Ok(items) => {
            let count = items.len();
            let text = items
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("\n");
            (text, count)
        }
        Err(scalar) => (scalar.to_string(), 1),
    }
}

/// Apply one parsed command to a chain.
pub fn apply_command(chain: &mut Chain, cmd: &Command) -> Result<()> {
    match cmd {
        Command::As(mode) => {
            let config = chain.config().with_mode(*mode);
            chain.set_config(config);
        }
        Command::Worker(builtin) => {
            let builtin = *builtin;
            chain.set_worker(move |value, _| builtin.apply(value));
        }
        Command::Pattern {
            engine,
            pattern,
            ignore_case,
        } => {
            let flags = PatternFlags {
                ignore_case: *ignore_case,
                ..PatternFlags::default()
            };
            chain.set_pattern(pattern, *engine, flags)?;
        }
        Command::Wrap { kind, policy } => {
            match kind {
                WrapKind::List => chain.as_list(),
                WrapKind::Set => chain.as_set(),
                WrapKind::Tuple => chain.as_tuple(),
                WrapKind::Map => chain.as_map(),
                WrapKind::Ascii => chain.as_ascii(*policy),
                WrapKind::Utf8 => chain.as_utf8(*policy),
                WrapKind::Text => chain.as_text(*policy),
            };
        }
        Command::Snapshot { baseline, original } => {
            chain.snapshot(*baseline, *original);
        }
        Command::Undo(restore) => {
            match restore {
                Restore::Steps(n) => chain.undo(*n),
                Restore::Baseline => chain.undo_baseline(),
                Restore::Original => chain.undo_original(),
            };
        }
        Command::OutIn => {
            chain.out_in();
        }
        Command::InOut => {
            chain.in_out();
        }
        Command::Apply(op) => {
            chain.apply(op.clone())?;
        }
    }
    Ok(())
}

/// Parse script text into commands, each with its 1-based line number.
pub fn parse_commands(text: &str) -> Result<Vec<(usize, Command)>> {
    let mut commands = Vec::new();

    for (line_num, line) in text.lines().enumerate() {
        let line = line.trim();

        // Skip empty lines and comments
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let cmd = parse_command(line).map_err(|message| ChainError::Script {
            line: line_num + 1,
            message,
        })?;
        commands.push((line_num + 1, cmd));
    }

    Ok(commands)
}

/// Parse a single command line.
pub fn parse_command(line: &str) -> std::result::Result<Command, String> {
    let (keyword, rest) = match line.split_once(char::is_whitespace) {
        Some((keyword, rest)) => (keyword, rest.trim()),
        None => (line, ""),
    };
    let keyword = keyword.to_uppercase();
    let args: Vec<&str> = rest.split_whitespace().collect();

    let op = match keyword.as_str() {
        "AS" => return parse_as(&args),
        "WORKER" => return parse_worker(&args),
        "PATTERN" => return parse_pattern(rest),
        "WRAP" => return parse_wrap(&args),
        "SNAPSHOT" => return parse_snapshot(&args),
        "UNDO" => return parse_undo(&args),
        "OUTIN" => return no_args("OUTIN", &args, Command::OutIn),
        "INOUT" => return no_args("INOUT", &args, Command::InOut),
        "MAP" => Op::Map(MapOp::Each),
        "ITEMS" => Op::Map(MapOp::Items),
        "ENUMERATE" => Op::Map(MapOp::Enumerate),
        "FILTER" => Op::Filter(FilterOp::Keep),
        "REJECT" => Op::Filter(FilterOp::Reject),
        "FIND" => Op::Filter(FilterOp::Find),
        "PARTITION" => Op::Filter(FilterOp::Partition),
        "PICK" => {
            if rest.is_empty() {
                return Err("PICK requires a key".to_string());
            }
            Op::Filter(FilterOp::Pick(parse_literal(rest)?))
        }
        "MERGE" => Op::Reduce(ReduceOp::Merge),
        "SMASH" => Op::Reduce(ReduceOp::Smash),
        "ZIP" => Op::Reduce(ReduceOp::Zip),
        "AT" => parse_at(rest)?,
        "FIRST" => Op::Slice(SliceOp::First(parse_count("FIRST", &args)?)),
        "LAST" => Op::Slice(SliceOp::Last(parse_count("LAST", &args)?)),
        "INITIAL" => Op::Slice(SliceOp::Initial),
        "REST" => Op::Slice(SliceOp::Rest),
        "DICE" => parse_dice(rest)?,
        "UNION" => Op::Compare(CompareOp::Union),
        "INTERSECTION" => Op::Compare(CompareOp::Intersection),
        "DIFFERENCE" => Op::Compare(CompareOp::Difference),
        "SYMDIFF" => Op::Compare(CompareOp::SymmetricDifference),
        "UNIQUE" => Op::Compare(CompareOp::Unique),
        "EACH" => Op::Repeat(RepeatOp::Each(parse_count("EACH", &args)?)),
        "TIMES" => Op::Repeat(RepeatOp::Times(parse_count("TIMES", &args)?)),
        "RANGE" => parse_range(&args)?,
        "SORT" => parse_sort(&args)?,
        "REVERSE" => Op::Order(OrderOp::Reverse),
        "GROUP" => Op::Order(OrderOp::Group),
        "SUM" => Op::Math(MathOp::Sum),
        "COUNT" => Op::Math(MathOp::Count),
        "MIN" => Op::Math(MathOp::Min),
        "MAX" => Op::Math(MathOp::Max),
        "AVERAGE" => Op::Math(MathOp::Average),
        "MEDIAN" => Op::Math(MathOp::Median),
        _ => return Err(format!("Unknown command: {keyword}")),
    };
    Ok(Command::Apply(op))
}

fn no_args(name: &str, args: &[&str], cmd: Command) -> std::result::Result<Command, String> {
    if args.is_empty() {
        Ok(cmd)
    } else {
        Err(format!("{name} takes no arguments"))
    }
}

fn parse_as(args: &[&str]) -> std::result::Result<Command, String> {
    match args {
        [mode] => mode.parse::<Mode>().map(Command::As).map_err(|e: ChainError| e.to_string()),
        _ => Err("AS requires one mode".to_string()),
    }
}

fn parse_worker(args: &[&str]) -> std::result::Result<Command, String> {
    match args {
        [name] => Ok(Command::Worker(name.parse::<BuiltinWorker>()?)),
        _ => Err("WORKER requires one worker name".to_string()),
    }
}

/// Parse PATTERN command.
/// Format: PATTERN engine /pattern/ [I]
fn parse_pattern(rest: &str) -> std::result::Result<Command, String> {
    let (engine, pattern_part) = match rest.split_once(char::is_whitespace) {
        Some((engine, pattern_part)) => (engine, pattern_part),
        None => return Err("PATTERN requires an engine and a pattern".to_string()),
    };
    let engine: Engine = engine.parse().map_err(|e: ChainError| e.to_string())?;
    let (pattern, tail) = parse_delimited_string(pattern_part)?;
    let ignore_case = match tail.trim() {
        "" => false,
        flag if flag.eq_ignore_ascii_case("I") => true,
        other => return Err(format!("Unknown pattern flag: {other}")),
    };
    Ok(Command::Pattern {
        engine,
        pattern,
        ignore_case,
    })
}

fn parse_wrap(args: &[&str]) -> std::result::Result<Command, String> {
    let (kind, policy) = match args {
        [kind] => (kind.parse::<WrapKind>()?, ErrorPolicy::Strict),
        [kind, policy] => (
            kind.parse::<WrapKind>()?,
            policy.parse::<ErrorPolicy>().map_err(|e: ChainError| e.to_string())?,
        ),
        _ => return Err("WRAP requires a wrapper and an optional policy".to_string()),
    };
    Ok(Command::Wrap { kind, policy })
}

fn parse_snapshot(args: &[&str]) -> std::result::Result<Command, String> {
    let mut baseline = false;
    let mut original = false;
    for arg in args {
        match arg.to_uppercase().as_str() {
            "BASELINE" => baseline = true,
            "ORIGINAL" => original = true,
            other => return Err(format!("Unknown SNAPSHOT option: {other}")),
        }
    }
    Ok(Command::Snapshot { baseline, original })
}

fn parse_undo(args: &[&str]) -> std::result::Result<Command, String> {
    let restore = match args {
        [] => Restore::Steps(0),
        [arg] if arg.eq_ignore_ascii_case("BASELINE") => Restore::Baseline,
        [arg] if arg.eq_ignore_ascii_case("ORIGINAL") => Restore::Original,
        [arg] => Restore::Steps(
            arg.parse::<usize>()
                .map_err(|_| format!("UNDO requires a step count, got '{arg}'"))?,
        ),
        _ => return Err("UNDO takes at most one argument".to_string()),
    };
    Ok(Command::Undo(restore))
}

fn parse_count(name: &str, args: &[&str]) -> std::result::Result<usize, String> {
    match args {
        [n] => n.parse().map_err(|_| format!("{name} requires a number")),
        _ => Err(format!("{name} requires a number")),
    }
}

/// Parse AT command.
/// Format: AT n [default]
fn parse_at(rest: &str) -> std::result::Result<Op, String> {
    let (index, default) = match rest.split_once(char::is_whitespace) {
        Some((index, default)) => (index, parse_literal(default)?),
        None => (rest, Value::Null),
    };
    let index: i64 = index
        .parse()
        .map_err(|_| "AT requires an index".to_string())?;
    Ok(Op::Slice(SliceOp::At { index, default }))
}

/// Parse DICE command.
/// Format: DICE n [fill]
fn parse_dice(rest: &str) -> std::result::Result<Op, String> {
    let (size, fill) = match rest.split_once(char::is_whitespace) {
        Some((size, fill)) => (size, Some(parse_literal(fill)?)),
        None => (rest, None),
    };
    let size: usize = size
        .parse()
        .map_err(|_| "DICE requires a size".to_string())?;
    if size == 0 {
        return Err("DICE size must be at least 1".to_string());
    }
    Ok(Op::Slice(SliceOp::Dice { size, fill }))
}

fn parse_range(args: &[&str]) -> std::result::Result<Op, String> {
    let numbers = args
        .iter()
        .map(|arg| arg.parse::<i64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|_| "RANGE requires integer bounds".to_string())?;
    let (start, stop, step) = match numbers.as_slice() {
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => return Err("RANGE requires start stop [step]".to_string()),
    };
    if step == 0 {
        return Err("RANGE step must not be zero".to_string());
    }
    Ok(Op::Repeat(RepeatOp::Range { start, stop, step }))
}

fn parse_sort(args: &[&str]) -> std::result::Result<Op, String> {
    let mut by_worker = false;
    let mut descending = false;
    for arg in args {
        match arg.to_uppercase().as_str() {
            "DESC" => descending = true,
            "BY" => by_worker = true,
            other => return Err(format!("Unknown SORT option: {other}")),
        }
    }
    Ok(Op::Order(OrderOp::Sort {
        by_worker,
        descending,
    }))
}

/// A literal argument: `null`, an integer, a float, or text. Text may be
/// delimited like patterns are, which is needed when it holds spaces.
fn parse_literal(s: &str) -> std::result::Result<Value, String> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("null") {
        return Ok(Value::Null);
    }
    if let Ok(n) = s.parse::<i64>() {
        return Ok(Value::Int(n));
    }
    if let Ok(f) = s.parse::<f64>() {
        return Ok(Value::Float(f));
    }
    match s.chars().next() {
        Some(c) if !c.is_alphanumeric() => {
            let (text, tail) = parse_delimited_string(s)?;
            if !tail.trim().is_empty() {
                return Err(format!("Unexpected text after literal: {}", tail.trim()));
            }
            Ok(Value::from(text))
        }
        _ => Ok(Value::from(s)),
    }
}

/// Parse a delimited string.
/// The first non-blank character is the delimiter, and the string
/// continues until the next occurrence of that delimiter.
/// Returns (extracted_string, rest_of_input).
fn parse_delimited_string(s: &str) -> std::result::Result<(String, &str), String> {
    let s = s.trim_start();
    let Some(delim) = s.chars().next() else {
        return Err("Expected delimited string".to_string());
    };
    let after_delim = &s[delim.len_utf8()..];

    // Find the closing delimiter
    if let Some(end) = after_delim.find(delim) {
        let extracted = after_delim[..end].to_string();
        let rest = &after_delim[end + delim.len_utf8()..];
        Ok((extracted, rest))
    } else {
        Err(format!("Unclosed delimiter '{delim}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Shape;

    fn run(input: &str, script: &str) -> String {
        let (output, _, _) = execute_script(input, script).unwrap();
        output
    }

    #[test]
    fn test_parse_skips_comments_and_blank_lines() {
        let commands = parse_commands("# header\n\nSUM\n  # indented\nmax\n").unwrap();
        assert_eq!(
            commands,
            vec![
                (3, Command::Apply(Op::Math(MathOp::Sum))),
                (5, Command::Apply(Op::Math(MathOp::Max))),
            ]
        );
    }

    #[test]
    fn test_parse_error_has_line_number() {
        let err = parse_commands("SUM\nFROBNICATE\n").unwrap_err();
        assert!(matches!(err, ChainError::Script { line: 2, .. }));
        assert_eq!(err.to_string(), "line 2: Unknown command: FROBNICATE");
    }

    #[test]
    fn test_parse_arguments() {
        assert_eq!(
            parse_command("as Many").unwrap(),
            Command::As(Mode::Shape(Shape::Many))
        );
        assert_eq!(
            parse_command("PATTERN regex /a b/ i").unwrap(),
            Command::Pattern {
                engine: Engine::Regex,
                pattern: "a b".to_string(),
                ignore_case: true
            }
        );
        assert_eq!(
            parse_command("AT -1 \"none left\"").unwrap(),
            Command::Apply(Op::Slice(SliceOp::At {
                index: -1,
                default: Value::from("none left")
            }))
        );
        assert_eq!(
            parse_command("RANGE 10 0 -5").unwrap(),
            Command::Apply(Op::Repeat(RepeatOp::Range {
                start: 10,
                stop: 0,
                step: -5
            }))
        );
        assert_eq!(parse_command("UNDO baseline").unwrap(), Command::Undo(Restore::Baseline));
        assert_eq!(parse_command("UNDO 2").unwrap(), Command::Undo(Restore::Steps(2)));
        assert_eq!(
            parse_command("WRAP text replace").unwrap(),
            Command::Wrap {
                kind: WrapKind::Text,
                policy: ErrorPolicy::Replace
            }
        );
    }

    #[test]
    fn test_parse_rejects_bad_arguments() {
        assert!(parse_command("FIRST").is_err());
        assert!(parse_command("DICE 0").is_err());
        assert!(parse_command("RANGE 1 5 0").is_err());
        assert!(parse_command("PATTERN sed /x/").is_err());
        assert!(parse_command("PATTERN regex /x").is_err());
        assert!(parse_command("WORKER shout").is_err());
        assert!(parse_command("OUTIN now").is_err());
        assert!(parse_command("SORT SIDEWAYS").is_err());
    }

    #[test]
    fn test_builtin_workers() {
        assert_eq!(BuiltinWorker::Upper.apply(&Value::from("ab")).unwrap(), Value::from("AB"));
        assert_eq!(BuiltinWorker::Int.apply(&Value::from(" 42 ")).unwrap(), Value::Int(42));
        assert_eq!(BuiltinWorker::Len.apply(&Value::from("héllo")).unwrap(), Value::Int(5));
        assert_eq!(
            BuiltinWorker::Split.apply(&Value::from("a  b")).unwrap(),
            Value::from(vec!["a", "b"])
        );
        assert!(BuiltinWorker::Int.apply(&Value::from("x")).is_err());
        assert!(BuiltinWorker::Upper.apply(&Value::Int(1)).is_err());
    }

    #[test]
    fn test_sum_of_numbers() {
        let (output, input_count, output_count) =
            execute_script("1\n2\n3\n", "WORKER int\nMAP\nSUM\n").unwrap();
        assert_eq!(output, "6");
        assert_eq!((input_count, output_count), (3, 1));
    }

    #[test]
    fn test_filter_with_pattern() {
        let output = run("apple\nBanana\navocado\n", "PATTERN glob /a*/\nFILTER\nWORKER upper\nMAP");
        assert_eq!(output, "APPLE\nAVOCADO");
    }

    #[test]
    fn test_sort_by_length_descending() {
        let output = run("bb\na\nccc\n", "WORKER len\nSORT DESC BY");
        assert_eq!(output, "ccc\nbb\na");
    }

    #[test]
    fn test_group_words() {
        let output = run("ant\nbee\nape\n", "PATTERN regex /^(.)/\nGROUP");
        assert_eq!(output, "('a', ['ant', 'ape'])\n('b', ['bee'])");
    }

    #[test]
    fn test_query_mode_script() {
        let output = run("3\n1\n2\n", "AS query\nWORKER int\nMAP\nMAX");
        assert_eq!(output, "3");
    }

    #[test]
    fn test_undo_in_script() {
        let output = run("x\ny\n", "SNAPSHOT\nCOUNT\nUNDO\nINOUT");
        assert_eq!(output, "x\ny");
    }

    #[test]
    fn test_runtime_error_reports_line() {
        let err = execute_script("a\n", "# numbers only\nWORKER int\nMAP\n").unwrap_err();
        assert!(matches!(err, ChainError::Script { line: 3, .. }));
        assert!(err.to_string().starts_with("line 3: MAP: "));
    }

    #[test]
    fn test_trace_is_returned() {
        let (_, _, _, trace) = execute_script_traced("1\n2\n", "FIRST 1\nCOUNT").unwrap();
        let names: Vec<&str> = trace.iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["FIRST", "COUNT"]);
        assert_eq!((trace[0].consumed, trace[0].emitted), (1, 1));
    }

    #[test]
    fn test_error_read_later_reports_its_operation() {
        let err = execute_script("1\nx\n", "WORKER int\nMAP\nWORKER upper\nSUM\n").unwrap_err();
        assert!(matches!(err, ChainError::Script { line: 2, .. }));
        assert!(err.to_string().starts_with("line 2: MAP: "));

        let script = "WORKER int\nMAP\nWORKER upper\nMAP\nCOUNT\n";
        let err = execute_script("1\n2\n", script).unwrap_err();
        assert!(err.to_string().starts_with("line 4: MAP: "));
    }

    #[test]
    fn test_error_after_undo_reports_its_own_line() {
        let err = execute_script("x\n", "SNAPSHOT\nWORKER int\nMAP\nUNDO 1\nINOUT\nSUM\n").unwrap_err();
        assert!(err.to_string().starts_with("line 6: SUM: "));
    }

    #[test]
    fn test_times_overflow_is_an_error() {
        let err = execute_script("a\nb\n", "TIMES 18446744073709551615\n").unwrap_err();
        assert!(matches!(err, ChainError::Script { line: 1, .. }));
        assert!(err.to_string().contains("TIMES"));
    }
}
