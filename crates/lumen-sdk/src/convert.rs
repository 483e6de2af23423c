//! Conversions from native arguments into Rust values.
//!
//! Callbacks receive a `&[NativeValue]`; these helpers pull typed arguments
//! out of it with a descriptive error instead of open-coded matches.

use crate::error::{NativeError, NativeResult};
use crate::value::NativeValue;

/// Convert a `NativeValue` into a Rust value.
pub trait FromNative: Sized {
    /// Name used in mismatch errors
    const TYPE_NAME: &'static str;

    /// Convert, returning `None` on a shape mismatch
    fn from_native(value: &NativeValue) -> Option<Self>;
}

impl FromNative for bool {
    const TYPE_NAME: &'static str = "bool";

    fn from_native(value: &NativeValue) -> Option<Self> {
        value.as_bool()
    }
}

impl FromNative for i64 {
    const TYPE_NAME: &'static str = "int";

    fn from_native(value: &NativeValue) -> Option<Self> {
        value.as_int()
    }
}

impl FromNative for f64 {
    const TYPE_NAME: &'static str = "double";

    fn from_native(value: &NativeValue) -> Option<Self> {
        value.as_double()
    }
}

impl FromNative for String {
    const TYPE_NAME: &'static str = "string";

    fn from_native(value: &NativeValue) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

/// Extract argument `index` as `T`.
///
/// Mirrors the "get native argument N" accessor of embedding APIs.
pub fn native_argument<T: FromNative>(args: &[NativeValue], index: usize) -> NativeResult<T> {
    let value = args.get(index).ok_or_else(|| {
        NativeError::ArgumentError(format!(
            "expected at least {} argument(s), got {}",
            index + 1,
            args.len()
        ))
    })?;
    T::from_native(value).ok_or_else(|| NativeError::TypeMismatch {
        expected: T::TYPE_NAME.to_string(),
        got: value.type_name().to_string(),
    })
}
