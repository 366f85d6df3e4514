//! Script values
//!
//! The script language has four value kinds. Strings carry raw text exactly
//! as a foreign caller handed it over; no encoding conversion happens on the
//! way into the VM.

use crate::{VmError, VmResult};
use std::fmt;

/// A script value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Absence of a value
    #[default]
    Null,
    /// Boolean
    Bool(bool),
    /// Number (all script numbers are f64)
    Number(f64),
    /// String
    Str(String),
}

impl Value {
    /// Create a null value
    #[inline]
    pub const fn null() -> Self {
        Value::Null
    }

    /// Create a string value
    pub fn string(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    /// Extract a number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Extract a string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Truthiness used by `if`, `while` and `!`
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::Str(s) => !s.is_empty(),
        }
    }

    /// Name of the value kind, for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
        }
    }

    /// `+`: numeric addition, or concatenation when either side is a string
    pub fn add(&self, rhs: &Value) -> VmResult<Value> {
        match (self, rhs) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
            (Value::Str(_), _) | (_, Value::Str(_)) => Ok(Value::Str(format!("{}{}", self, rhs))),
            _ => Err(self.binary_mismatch("+", rhs)),
        }
    }

    /// Numeric-only binary operators (`-`, `*`, `/`)
    pub fn arith(&self, op: char, rhs: &Value) -> VmResult<Value> {
        let (a, b) = match (self, rhs) {
            (Value::Number(a), Value::Number(b)) => (*a, *b),
            _ => return Err(self.binary_mismatch(&op.to_string(), rhs)),
        };
        let result = match op {
            '-' => a - b,
            '*' => a * b,
            '/' => {
                if b == 0.0 {
                    return Err(VmError::RuntimeError("Division by zero".to_string()));
                }
                a / b
            }
            _ => return Err(VmError::RuntimeError(format!("Unknown operator {}", op))),
        };
        Ok(Value::Number(result))
    }

    /// Ordering comparison; numbers with numbers, strings with strings
    pub fn compare(&self, rhs: &Value) -> VmResult<std::cmp::Ordering> {
        match (self, rhs) {
            (Value::Number(a), Value::Number(b)) => a
                .partial_cmp(b)
                .ok_or_else(|| VmError::TypeError("Cannot order NaN".to_string())),
            (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
            _ => Err(self.binary_mismatch("compare", rhs)),
        }
    }

    fn binary_mismatch(&self, op: &str, rhs: &Value) -> VmError {
        VmError::TypeError(format!(
            "Cannot apply {} to {} and {}",
            op,
            self.type_name(),
            rhs.type_name()
        ))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            Value::Number(n) => write!(f, "{}", n),
            Value::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}
