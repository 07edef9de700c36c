//! Port and parameter values.
//!
//! Every value crossing a port, parameter or netcomm channel is a [`Value`].
//! Each value has a canonical string encoding ([`Value::encode`] /
//! [`Value::parse`]) used by parameters, netcomm writers and the
//! serialization boundary. The encoding is lossless when the type is known.
//! Untyped contexts use [`Value::encode_tagged`], which prefixes the type
//! name (`double:2`) whenever inference alone would read the value back as
//! something else.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while parsing or coercing values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValueError {
    /// The string is not a valid encoding for the requested type.
    #[error("cannot parse '{input}' as {ty}")]
    Parse {
        /// Requested type.
        ty: ValueType,
        /// Offending input.
        input: String,
    },

    /// Unknown type name.
    #[error("unknown value type '{0}'")]
    UnknownType(String),

    /// A value of one type was supplied where another was required.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Declared type.
        expected: ValueType,
        /// Supplied type.
        actual: ValueType,
    },
}

/// Declared type of a port or parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    /// Boolean flag.
    #[serde(rename = "bool")]
    Bool,
    /// Signed 64-bit integer.
    #[serde(rename = "int")]
    Int,
    /// IEEE-754 double.
    #[serde(rename = "double")]
    Double,
    /// UTF-8 string.
    #[serde(rename = "string")]
    String,
    /// Fixed-length double array.
    #[serde(rename = "double[]")]
    DoubleArray,
    /// Untyped; compatible with every other type.
    #[serde(rename = "any")]
    Any,
}

impl ValueType {
    /// Canonical type name used in serialized nets.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Double => "double",
            Self::String => "string",
            Self::DoubleArray => "double[]",
            Self::Any => "any",
        }
    }

    /// Whether a port of type `self` may be connected to a source of type `other`.
    #[inline]
    pub fn accepts(self, other: ValueType) -> bool {
        self == Self::Any || other == Self::Any || self == other
    }

    /// Check that `value` conforms to this type.
    pub fn check(self, value: &Value) -> Result<(), ValueError> {
        if self.accepts(value.value_type()) {
            Ok(())
        } else {
            Err(ValueError::TypeMismatch {
                expected: self,
                actual: value.value_type(),
            })
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ValueType {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bool" => Ok(Self::Bool),
            "int" => Ok(Self::Int),
            "double" => Ok(Self::Double),
            "string" => Ok(Self::String),
            "double[]" => Ok(Self::DoubleArray),
            "any" => Ok(Self::Any),
            other => Err(ValueError::UnknownType(other.to_string())),
        }
    }
}

/// A runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Boolean flag.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Double.
    Double(f64),
    /// String.
    String(String),
    /// Double array.
    DoubleArray(Vec<f64>),
}

impl Value {
    /// Concrete type of this value (never `Any`).
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Bool(_) => ValueType::Bool,
            Self::Int(_) => ValueType::Int,
            Self::Double(_) => ValueType::Double,
            Self::String(_) => ValueType::String,
            Self::DoubleArray(_) => ValueType::DoubleArray,
        }
    }

    /// Boolean view.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer view.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view; integers widen to doubles.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Double(d) => Some(*d),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// String view.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Array view.
    pub fn as_doubles(&self) -> Option<&[f64]> {
        match self {
            Self::DoubleArray(a) => Some(a),
            _ => None,
        }
    }

    /// Canonical string encoding.
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Parse the canonical encoding of a value of type `ty`.
    ///
    /// `ValueType::Any` infers the type: booleans, then integers, doubles,
    /// bracketed arrays, and finally plain strings.
    pub fn parse(ty: ValueType, input: &str) -> Result<Value, ValueError> {
        let err = || ValueError::Parse {
            ty,
            input: input.to_string(),
        };
        match ty {
            ValueType::Bool => match input.trim() {
                "true" => Ok(Self::Bool(true)),
                "false" => Ok(Self::Bool(false)),
                _ => Err(err()),
            },
            ValueType::Int => input.trim().parse().map(Self::Int).map_err(|_| err()),
            ValueType::Double => input.trim().parse().map(Self::Double).map_err(|_| err()),
            ValueType::String => Ok(Self::String(input.to_string())),
            ValueType::DoubleArray => parse_array(input).ok_or_else(err),
            ValueType::Any => Ok(Self::infer(input)),
        }
    }

    /// Parse either encoding: a `type:value` tag naming a concrete type that
    /// `ty` accepts selects that type, anything else goes to [`Value::parse`].
    pub fn decode(ty: ValueType, input: &str) -> Result<Value, ValueError> {
        if let Some((tag, rest)) = input.split_once(':') {
            if let Ok(tagged) = tag.parse::<ValueType>() {
                if tagged != ValueType::Any && ty.accepts(tagged) {
                    return Self::parse(tagged, rest);
                }
            }
        }
        Self::parse(ty, input)
    }

    /// Encoding that survives `decode(ValueType::Any, ..)`: bare when
    /// inference recovers the value, `type:value` otherwise.
    pub fn encode_tagged(&self) -> String {
        let bare = self.encode();
        if Self::decode(ValueType::Any, &bare).as_ref() == Ok(self) {
            bare
        } else {
            format!("{}:{bare}", self.value_type())
        }
    }

    fn infer(input: &str) -> Value {
        let trimmed = input.trim();
        if let Ok(v) = Self::parse(ValueType::Bool, trimmed) {
            return v;
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return Self::Int(i);
        }
        if let Ok(d) = trimmed.parse::<f64>() {
            return Self::Double(d);
        }
        if let Some(a) = parse_array(trimmed) {
            return a;
        }
        Self::String(input.to_string())
    }
}

fn parse_array(input: &str) -> Option<Value> {
    let inner = input.trim().strip_prefix('[')?.strip_suffix(']')?.trim();
    if inner.is_empty() {
        return Some(Value::DoubleArray(Vec::new()));
    }
    inner
        .split(',')
        .map(|item| item.trim().parse::<f64>().ok())
        .collect::<Option<Vec<_>>>()
        .map(Value::DoubleArray)
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Double(d) => write!(f, "{d}"),
            Self::String(s) => f.write_str(s),
            Self::DoubleArray(a) => {
                f.write_str("[")?;
                for (i, d) in a.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{d}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Self::Double(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Vec<f64>> for Value {
    fn from(a: Vec<f64>) -> Self {
        Self::DoubleArray(a)
    }
}
