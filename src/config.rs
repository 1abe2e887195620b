//! Chain modes and their textual form.
//!
//! Three independent axes: how working is split into units ([`Shape`]),
//! what happens to incoming after results are read ([`Context`]) and
//! whether incoming and outgoing are kept in step automatically
//! ([`Balance`]).

use std::fmt;
use std::str::FromStr;

use crate::error::{ChainError, Result};

/// How an operation groups the working buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Shape {
    /// The whole working buffer is one unit.
    #[default]
    One,
    /// Every working element is its own unit.
    Many,
}

/// What reading results does to incoming.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Context {
    /// Incoming is left as it is.
    #[default]
    Edit,
    /// Incoming reverts to the baseline after each read.
    Query,
}

/// Whether buffers are rebalanced around insertions and operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Balance {
    #[default]
    Auto,
    Manual,
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Shape::One => "one",
            Shape::Many => "many",
        })
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Context::Edit => "edit",
            Context::Query => "query",
        })
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Balance::Auto => "auto",
            Balance::Manual => "manual",
        })
    }
}

impl FromStr for Shape {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "one" => Ok(Shape::One),
            "many" => Ok(Shape::Many),
            _ => Err(ChainError::UnknownMode(s.to_string())),
        }
    }
}

impl FromStr for Context {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "edit" => Ok(Context::Edit),
            "query" => Ok(Context::Query),
            _ => Err(ChainError::UnknownMode(s.to_string())),
        }
    }
}

impl FromStr for Balance {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Balance::Auto),
            "manual" => Ok(Balance::Manual),
            _ => Err(ChainError::UnknownMode(s.to_string())),
        }
    }
}

/// One value per mode axis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChainConfig {
    pub shape: Shape,
    pub context: Context,
    pub balance: Balance,
}

/// A single mode name resolved to its axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Shape(Shape),
    Context(Context),
    Balance(Balance),
}

impl FromStr for Mode {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self> {
        if let Ok(shape) = s.parse() {
            return Ok(Mode::Shape(shape));
        }
        if let Ok(context) = s.parse() {
            return Ok(Mode::Context(context));
        }
        if let Ok(balance) = s.parse() {
            return Ok(Mode::Balance(balance));
        }
        Err(ChainError::UnknownMode(s.trim().to_string()))
    }
}

impl ChainConfig {
    pub fn with_mode(mut self, mode: Mode) -> Self {
        match mode {
            Mode::Shape(shape) => self.shape = shape,
            Mode::Context(context) => self.context = context,
            Mode::Balance(balance) => self.balance = balance,
        }
        self
    }
}

impl fmt::Display for ChainConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.shape, self.context, self.balance)
    }
}

impl FromStr for ChainConfig {
    type Err = ChainError;

    /// Parses a comma separated list such as `"many,query"`. Axes left out
    /// keep their defaults; naming one axis twice is a conflict.
    fn from_str(s: &str) -> Result<Self> {
        let mut config = ChainConfig::default();
        let mut seen: [Option<String>; 3] = [None, None, None];

        for name in s.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            let mode: Mode = name.parse()?;
            let axis = match mode {
                Mode::Shape(_) => 0,
                Mode::Context(_) => 1,
                Mode::Balance(_) => 2,
            };
            if let Some(previous) = &seen[axis] {
                return Err(ChainError::ModeConflict(format!("{previous} and {name}")));
            }
            seen[axis] = Some(name.to_string());
            config = config.with_mode(mode);
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ChainConfig::default();
        assert_eq!(config.shape, Shape::One);
        assert_eq!(config.context, Context::Edit);
        assert_eq!(config.balance, Balance::Auto);
        assert_eq!(config.to_string(), "one,edit,auto");
    }

    #[test]
    fn test_parse_list() {
        let config: ChainConfig = "many, QUERY".parse().unwrap();
        assert_eq!(config.shape, Shape::Many);
        assert_eq!(config.context, Context::Query);
        assert_eq!(config.balance, Balance::Auto);
        assert_eq!("".parse::<ChainConfig>().unwrap(), ChainConfig::default());
    }

    #[test]
    fn test_parse_round_trips_display() {
        let config: ChainConfig = "manual,many,query".parse().unwrap();
        assert_eq!(config.to_string().parse::<ChainConfig>().unwrap(), config);
    }

    #[test]
    fn test_unknown_mode() {
        assert!(matches!(
            "many,sideways".parse::<ChainConfig>(),
            Err(ChainError::UnknownMode(name)) if name == "sideways"
        ));
    }

    #[test]
    fn test_conflicting_modes() {
        let err = "one,many".parse::<ChainConfig>().unwrap_err();
        assert!(matches!(err, ChainError::ModeConflict(_)));
        assert_eq!(err.to_string(), "conflicting modes: one and many");
    }
}
