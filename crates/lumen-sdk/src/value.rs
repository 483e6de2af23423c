//! NativeValue: values exchanged between program code and native callbacks
//!
//! Payloads crossing the native boundary are opaque to the runtime. A
//! `NativeValue` is the small closed set of shapes a callback can receive or
//! return; strings are reference-counted so cloning an argument list is cheap.

use std::fmt;
use std::sync::Arc;

/// A value passed to or returned from a native callback.
#[derive(Clone, Default, PartialEq)]
pub enum NativeValue {
    /// Absence of a value
    #[default]
    Null,
    /// Boolean
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit float
    Double(f64),
    /// Immutable string
    String(Arc<str>),
}

impl NativeValue {
    /// Create a null value
    #[inline]
    pub const fn null() -> Self {
        Self::Null
    }

    /// Create a boolean value
    #[inline]
    pub const fn bool(b: bool) -> Self {
        Self::Bool(b)
    }

    /// Create an integer value
    #[inline]
    pub const fn int(i: i64) -> Self {
        Self::Int(i)
    }

    /// Create a double value
    #[inline]
    pub const fn double(f: f64) -> Self {
        Self::Double(f)
    }

    /// Create a string value
    #[inline]
    pub fn string(s: impl Into<Arc<str>>) -> Self {
        Self::String(s.into())
    }

    /// Check if this value is null
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get as bool (if this is a bool value)
    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as i64 (if this is an integer value)
    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as f64. Integers widen.
    #[inline]
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Self::Double(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Borrow the string payload (if this is a string value)
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Name of this value's shape, used in conversion errors
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Double(_) => "double",
            Self::String(_) => "string",
        }
    }
}

impl fmt::Debug for NativeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Double(d) => write!(f, "{}", d),
            Self::String(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<bool> for NativeValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for NativeValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for NativeValue {
    fn from(f: f64) -> Self {
        Self::Double(f)
    }
}

impl From<&str> for NativeValue {
    fn from(s: &str) -> Self {
        Self::String(s.into())
    }
}

impl From<String> for NativeValue {
    fn from(s: String) -> Self {
        Self::String(s.into())
    }
}
