//! Native callback signature and the name-keyed registry type
//!
//! The registry type lives in the SDK so native callback crates can build
//! and test tables without depending on the engine. The engine keeps the
//! process-wide instance.

use crate::context::NativeContext;
use crate::error::NativeError;
use crate::value::NativeValue;
use std::collections::HashMap;
use std::sync::Arc;

// ============================================================================
// NativeCallResult
// ============================================================================

/// Result of a native call handler
#[derive(Debug, Clone, PartialEq)]
pub enum NativeCallResult {
    /// Call handled successfully, returned a value
    Value(NativeValue),
    /// Call failed with an error message
    Error(String),
}

impl NativeCallResult {
    /// Create a successful result with null value
    #[inline]
    pub fn null() -> Self {
        Self::Value(NativeValue::null())
    }

    /// Create a successful result with a bool value
    #[inline]
    pub fn bool(val: bool) -> Self {
        Self::Value(NativeValue::bool(val))
    }

    /// Create a successful result with an integer value
    #[inline]
    pub fn int(val: i64) -> Self {
        Self::Value(NativeValue::int(val))
    }

    /// Convert into a `Result`, for `?` at the call site
    pub fn into_result(self) -> Result<NativeValue, String> {
        match self {
            Self::Value(v) => Ok(v),
            Self::Error(e) => Err(e),
        }
    }
}

impl From<Result<NativeValue, NativeError>> for NativeCallResult {
    fn from(result: Result<NativeValue, NativeError>) -> Self {
        match result {
            Ok(v) => Self::Value(v),
            Err(e) => Self::Error(e.to_string()),
        }
    }
}

// ============================================================================
// Native Function Registry (name-based dispatch)
// ============================================================================

/// A native function handler, resolved by symbolic name
pub type NativeHandlerFn =
    Arc<dyn Fn(&dyn NativeContext, &[NativeValue]) -> NativeCallResult + Send + Sync>;

/// Registry of native functions indexed by symbolic name.
///
/// Consulted when program code calls a native symbol it does not define
/// itself (e.g. "NotifyNative").
#[derive(Clone, Default)]
pub struct NativeFunctionRegistry {
    handlers: HashMap<String, NativeHandlerFn>,
}

impl NativeFunctionRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a native function by name, returning the handler it replaced
    pub fn register(
        &mut self,
        name: &str,
        handler: impl Fn(&dyn NativeContext, &[NativeValue]) -> NativeCallResult
            + Send
            + Sync
            + 'static,
    ) -> Option<NativeHandlerFn> {
        self.handlers.insert(name.to_string(), Arc::new(handler))
    }

    /// Get a handler by name
    pub fn get(&self, name: &str) -> Option<NativeHandlerFn> {
        self.handlers.get(name).cloned()
    }

    /// Check if a handler is registered
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Get the number of registered handlers
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for NativeFunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("NativeFunctionRegistry")
            .field("names", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullContext;

    impl NativeContext for NullContext {
        fn isolate_id(&self) -> u64 {
            0
        }
        fn debug_name(&self) -> &str {
            "null"
        }
        fn is_root_isolate(&self) -> bool {
            false
        }
        fn get_global(&self, _name: &str) -> Option<NativeValue> {
            None
        }
        fn set_global(&self, _name: &str, _value: NativeValue) {}
    }

    #[test]
    fn test_registry_register_and_get() {
        let mut registry = NativeFunctionRegistry::new();
        assert!(registry
            .register("math.abs", |_ctx, _args| NativeCallResult::int(42))
            .is_none());

        assert!(registry.contains("math.abs"));
        assert!(!registry.contains("math.sqrt"));
        assert_eq!(registry.len(), 1);

        let handler = registry.get("math.abs").unwrap();
        assert_eq!(handler(&NullContext, &[]), NativeCallResult::int(42));
    }

    #[test]
    fn test_registry_replace_returns_previous() {
        let mut registry = NativeFunctionRegistry::new();
        registry.register("NotifyNative", |_ctx, _args| NativeCallResult::null());
        let previous = registry.register("NotifyNative", |_ctx, _args| NativeCallResult::bool(true));
        assert!(previous.is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_call_result_from_error() {
        let result: NativeCallResult = Err(NativeError::Failed("boom".into())).into();
        assert_eq!(result.into_result(), Err("boom".to_string()));
    }
}
