//! The worker: the per-element callable or pattern that drives operations.
//!
//! A chain holds at most one worker. It is either a plain callable or a
//! compiled pattern; both are applied through [`Worker::apply`], and
//! filtering operations use the truthiness of the result.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use regex::{Regex, RegexBuilder};

use crate::error::{ChainError, Result};
use crate::value::Value;

/// Extra arguments handed to every worker call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    pub args: Vec<Value>,
    pub kwargs: BTreeMap<String, Value>,
}

impl Params {
    pub fn new(args: Vec<Value>, kwargs: BTreeMap<String, Value>) -> Self {
        Params { args, kwargs }
    }

    pub fn arg(&self, idx: usize) -> Option<&Value> {
        self.args.get(idx)
    }

    pub fn kwarg(&self, name: &str) -> Option<&Value> {
        self.kwargs.get(name)
    }
}

/// Signature of a callable worker.
pub type WorkerFn = dyn Fn(&Value, &Params) -> Result<Value>;

/// Pattern matching engines a worker can be compiled with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    /// `{}` / `{name:d}` field templates matched against the whole text.
    Parse,
    /// Regular expressions, searched anywhere in the text.
    Regex,
    /// Shell-style wildcards matched against the whole text.
    Glob,
}

impl Engine {
    pub fn name(&self) -> &'static str {
        match self {
            Engine::Parse => "parse",
            Engine::Regex => "regex",
            Engine::Glob => "glob",
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Engine {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "parse" => Ok(Engine::Parse),
            "regex" => Ok(Engine::Regex),
            "glob" => Ok(Engine::Glob),
            _ => Err(ChainError::UnknownEngine(s.to_string())),
        }
    }
}

/// Compilation flags shared by all engines. Glob only honours
/// `ignore_case`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatternFlags {
    pub ignore_case: bool,
    pub multi_line: bool,
    pub dot_matches_new_line: bool,
}

impl PatternFlags {
    pub fn ignore_case() -> Self {
        PatternFlags {
            ignore_case: true,
            ..PatternFlags::default()
        }
    }

    fn regex(&self, pattern: &str) -> Result<Regex> {
        Ok(RegexBuilder::new(pattern)
            .case_insensitive(self.ignore_case)
            .multi_line(self.multi_line)
            .dot_matches_new_line(self.dot_matches_new_line)
            .build()?)
    }
}

/// A compiled pattern used as a predicate or extractor.
pub trait Matcher {
    fn engine(&self) -> Engine;

    /// What the pattern pulls out of `text`, or `None` on a miss.
    fn extract(&self, text: &str) -> Option<Value>;

    fn is_match(&self, text: &str) -> bool {
        self.extract(text).is_some()
    }
}

/// Regex search. Yields the matched text when the pattern has no groups,
/// the group when it has one, a tuple of groups otherwise, and a map when
/// any group is named.
pub struct RegexMatcher {
    regex: Regex,
}

impl RegexMatcher {
    pub fn new(pattern: &str, flags: PatternFlags) -> Result<Self> {
        Ok(RegexMatcher {
            regex: flags.regex(pattern)?,
        })
    }
}

fn group_value(group: Option<regex::Match<'_>>) -> Value {
    group.map_or(Value::Null, |m| Value::from(m.as_str()))
}

impl Matcher for RegexMatcher {
    fn engine(&self) -> Engine {
        Engine::Regex
    }

    fn extract(&self, text: &str) -> Option<Value> {
        let caps = self.regex.captures(text)?;
        let named: Vec<&str> = self.regex.capture_names().flatten().collect();
        if !named.is_empty() {
            let entries = named
                .into_iter()
                .map(|name| (Value::from(name), group_value(caps.name(name))))
                .collect();
            return Some(Value::Map(entries));
        }
        match caps.len() {
            1 => Some(group_value(caps.get(0))),
            2 => Some(group_value(caps.get(1))),
            n => Some(Value::Tuple((1..n).map(|i| group_value(caps.get(i))).collect())),
        }
    }

    fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

/// Shell-style wildcard match over the whole text; yields the text.
pub struct GlobMatcher {
    pattern: glob::Pattern,
    options: glob::MatchOptions,
}

impl GlobMatcher {
    pub fn new(pattern: &str, flags: PatternFlags) -> Result<Self> {
        Ok(GlobMatcher {
            pattern: glob::Pattern::new(pattern)?,
            options: glob::MatchOptions {
                case_sensitive: !flags.ignore_case,
                require_literal_separator: false,
                require_literal_leading_dot: false,
            },
        })
    }
}

impl Matcher for GlobMatcher {
    fn engine(&self) -> Engine {
        Engine::Glob
    }

    fn extract(&self, text: &str) -> Option<Value> {
        self.is_match(text).then(|| Value::from(text))
    }

    fn is_match(&self, text: &str) -> bool {
        self.pattern.matches_with(text, self.options)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Conversion {
    Text,
    Int,
    Float,
    Word,
}

impl Conversion {
    fn group(&self) -> &'static str {
        match self {
            Conversion::Text => r"(.+?)",
            Conversion::Int => r"([-+]?\d+)",
            Conversion::Float => r"([-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?)",
            Conversion::Word => r"(\w+)",
        }
    }

    fn convert(&self, raw: &str) -> Option<Value> {
        match self {
            Conversion::Int => raw.parse::<i64>().ok().map(Value::Int),
            Conversion::Float => raw.parse::<f64>().ok().map(Value::Float),
            Conversion::Text | Conversion::Word => Some(Value::from(raw)),
        }
    }
}

struct Field {
    name: Option<String>,
    conversion: Conversion,
}

/// Template extraction: `"{} is {age:d}"` matches `"Bob is 42"`.
///
/// Positional-only templates yield a tuple; templates with named fields
/// yield a map, positional fields keyed by their position.
pub struct ParseMatcher {
    regex: Regex,
    fields: Vec<Field>,
}

fn parse_error(message: impl Into<String>) -> ChainError {
    ChainError::Pattern {
        engine: "parse",
        message: message.into(),
    }
}

fn parse_field(body: &str) -> Result<Field> {
    let (name, conversion) = match body.split_once(':') {
        Some((name, conv)) => (name, conv),
        None => (body, ""),
    };
    let conversion = match conversion {
        "" => Conversion::Text,
        "d" => Conversion::Int,
        "f" => Conversion::Float,
        "w" => Conversion::Word,
        other => return Err(parse_error(format!("unsupported conversion '{other}'"))),
    };
    if !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(parse_error(format!("invalid field name '{name}'")));
    }
    Ok(Field {
        name: (!name.is_empty()).then(|| name.to_string()),
        conversion,
    })
}

impl ParseMatcher {
    pub fn new(template: &str, flags: PatternFlags) -> Result<Self> {
        let mut pattern = String::from("^");
        let mut literal = String::new();
        let mut fields = Vec::new();
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut body = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(c) => body.push(c),
                            None => return Err(parse_error("unclosed '{'")),
                        }
                    }
                    pattern.push_str(&regex::escape(&literal));
                    literal.clear();
                    let field = parse_field(&body)?;
                    pattern.push_str(field.conversion.group());
                    fields.push(field);
                }
                '}' => return Err(parse_error("single '}' in template")),
                c => literal.push(c),
            }
        }
        pattern.push_str(&regex::escape(&literal));
        pattern.push('$');

        Ok(ParseMatcher {
            regex: flags.regex(&pattern)?,
            fields,
        })
    }
}

impl Matcher for ParseMatcher {
    fn engine(&self) -> Engine {
        Engine::Parse
    }

    fn extract(&self, text: &str) -> Option<Value> {
        let caps = self.regex.captures(text)?;
        let mut values = Vec::with_capacity(self.fields.len());
        for (i, field) in self.fields.iter().enumerate() {
            let raw = caps.get(i + 1)?.as_str();
            values.push(field.conversion.convert(raw)?);
        }

        if self.fields.iter().all(|field| field.name.is_none()) {
            return Some(Value::Tuple(values));
        }
        let mut entries = BTreeMap::new();
        let mut position = 0usize;
        for (field, value) in self.fields.iter().zip(values) {
            let key = match &field.name {
                Some(name) => Value::from(name.as_str()),
                None => {
                    position += 1;
                    Value::from(position - 1)
                }
            };
            entries.insert(key, value);
        }
        Some(Value::Map(entries))
    }
}

/// Compiles `pattern` with the chosen engine.
pub fn compile(pattern: &str, engine: Engine, flags: PatternFlags) -> Result<Box<dyn Matcher>> {
    Ok(match engine {
        Engine::Parse => Box::new(ParseMatcher::new(pattern, flags)?),
        Engine::Regex => Box::new(RegexMatcher::new(pattern, flags)?),
        Engine::Glob => Box::new(GlobMatcher::new(pattern, flags)?),
    })
}

/// The active worker of a chain.
pub enum Worker {
    Call(Box<WorkerFn>),
    Pattern(Box<dyn Matcher>),
}

impl Worker {
    pub fn call<F>(f: F) -> Self
    where
        F: Fn(&Value, &Params) -> Result<Value> + 'static,
    {
        Worker::Call(Box::new(f))
    }

    pub fn pattern(pattern: &str, engine: Engine, flags: PatternFlags) -> Result<Self> {
        Ok(Worker::Pattern(compile(pattern, engine, flags)?))
    }

    /// Runs the worker on one element. Patterns yield their extraction, or
    /// `Null` on a miss.
    pub fn apply(&self, value: &Value, params: &Params) -> Result<Value> {
        match self {
            Worker::Call(f) => f(value, params),
            Worker::Pattern(matcher) => {
                let extracted = match value {
                    Value::Str(text) => matcher.extract(text),
                    Value::Bytes(bytes) => matcher.extract(&String::from_utf8_lossy(bytes)),
                    other => {
                        return Err(ChainError::Type {
                            op: "PATTERN",
                            expected: "str",
                            found: other.type_name(),
                        });
                    }
                };
                Ok(extracted.unwrap_or(Value::Null))
            }
        }
    }

    /// Truthiness of [`Worker::apply`].
    pub fn test(&self, value: &Value, params: &Params) -> Result<bool> {
        Ok(self.apply(value, params)?.is_truthy())
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Worker::Call(_) => f.write_str("Worker::Call"),
            Worker::Pattern(matcher) => write!(f, "Worker::Pattern({})", matcher.engine()),
        }
    }
}
