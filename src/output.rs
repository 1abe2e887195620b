//! Output wrappers: how the outgoing elements are packaged on read.
//!
//! A wrapper receives every element read from outgoing and returns the
//! value handed to the caller. The encoding wrappers convert element-wise
//! and honour an [`ErrorPolicy`] for characters or bytes they cannot
//! represent.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::error::{ChainError, Result};
use crate::value::Value;

/// Packages the elements read from outgoing.
pub type OutputWrapper = Box<dyn Fn(Vec<Value>) -> Result<Value>>;

/// What an encoding wrapper does with unrepresentable input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorPolicy {
    #[default]
    Strict,
    Replace,
    Ignore,
}

impl fmt::Display for ErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorPolicy::Strict => "strict",
            ErrorPolicy::Replace => "replace",
            ErrorPolicy::Ignore => "ignore",
        })
    }
}

impl FromStr for ErrorPolicy {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(ErrorPolicy::Strict),
            "replace" => Ok(ErrorPolicy::Replace),
            "ignore" => Ok(ErrorPolicy::Ignore),
            _ => Err(ChainError::UnknownPolicy(s.to_string())),
        }
    }
}

pub fn to_list() -> OutputWrapper {
    Box::new(|items| Ok(Value::List(items)))
}

pub fn to_tuple() -> OutputWrapper {
    Box::new(|items| Ok(Value::Tuple(items)))
}

pub fn to_set() -> OutputWrapper {
    Box::new(|items| Ok(Value::Set(items.into_iter().collect::<BTreeSet<_>>())))
}

/// Builds a map from `(key, value)` pairs.
pub fn to_map() -> OutputWrapper {
    Box::new(|items| {
        let mut entries = BTreeMap::new();
        for item in items {
            let found = item.type_name();
            match item {
                Value::List(mut pair) | Value::Tuple(mut pair) if pair.len() == 2 => {
                    let value = pair.pop().unwrap_or_default();
                    let key = pair.pop().unwrap_or_default();
                    entries.insert(key, value);
                }
                _ => {
                    return Err(ChainError::Type {
                        op: "MAP WRAPPER",
                        expected: "pair",
                        found,
                    });
                }
            }
        }
        Ok(Value::Map(entries))
    })
}

/// Encodes every element to ASCII bytes.
pub fn to_ascii(policy: ErrorPolicy) -> OutputWrapper {
    Box::new(move |items| {
        items
            .into_iter()
            .map(|item| encode_ascii(item, policy))
            .collect::<Result<Vec<_>>>()
            .map(Value::List)
    })
}

/// Encodes every element to UTF-8 bytes.
pub fn to_utf8(policy: ErrorPolicy) -> OutputWrapper {
    Box::new(move |items| {
        items
            .into_iter()
            .map(|item| encode_utf8(item, policy))
            .collect::<Result<Vec<_>>>()
            .map(Value::List)
    })
}

/// Decodes every element to text.
pub fn to_text(policy: ErrorPolicy) -> OutputWrapper {
    Box::new(move |items| {
        items
            .into_iter()
            .map(|item| decode_text(item, policy))
            .collect::<Result<Vec<_>>>()
            .map(Value::List)
    })
}

fn text_of(item: Value) -> String {
    match item {
        Value::Str(s) => s,
        other => other.to_string(),
    }
}

fn encode_ascii(item: Value, policy: ErrorPolicy) -> Result<Value> {
    let text = match item {
        Value::Bytes(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        other => text_of(other),
    };
    let mut out = Vec::with_capacity(text.len());
    for (pos, c) in text.char_indices() {
        if c.is_ascii() {
            out.push(c as u8);
            continue;
        }
        match policy {
            ErrorPolicy::Strict => {
                return Err(ChainError::Encode {
                    codec: "ascii",
                    message: format!("character {c:?} at position {pos} is not ascii"),
                });
            }
            ErrorPolicy::Replace => out.push(b'?'),
            ErrorPolicy::Ignore => {}
        }
    }
    Ok(Value::Bytes(out))
}

fn encode_utf8(item: Value, policy: ErrorPolicy) -> Result<Value> {
    match item {
        Value::Bytes(bytes) => decode_bytes(&bytes, policy, "utf8").map(|s| Value::Bytes(s.into_bytes())),
        other => Ok(Value::Bytes(text_of(other).into_bytes())),
    }
}

fn decode_text(item: Value, policy: ErrorPolicy) -> Result<Value> {
    match item {
        Value::Bytes(bytes) => decode_bytes(&bytes, policy, "text").map(Value::Str),
        other => Ok(Value::Str(text_of(other))),
    }
}

fn decode_bytes(bytes: &[u8], policy: ErrorPolicy, codec: &'static str) -> Result<String> {
    match policy {
        ErrorPolicy::Strict => String::from_utf8(bytes.to_vec()).map_err(|err| ChainError::Decode {
            codec,
            message: err.utf8_error().to_string(),
        }),
        ErrorPolicy::Replace => Ok(String::from_utf8_lossy(bytes).into_owned()),
        ErrorPolicy::Ignore => Ok(bytes.utf8_chunks().map(|chunk| chunk.valid()).collect()),
    }
}

/// The lone member of a one-member container result; anything else is
/// returned as is. A one-entry map yields its `(key, value)` tuple.
pub fn unwrap_single(result: Value) -> Value {
    if !result.is_container() {
        return result;
    }
    match result.into_single() {
        Ok(single) => single,
        Err(whole) => whole,
    }
}
