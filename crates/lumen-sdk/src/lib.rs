//! Lumen SDK - types shared between the engine and native callback authors
//!
//! Native callbacks are plain closures registered by name. They receive a
//! [`NativeContext`] describing the calling isolate and the call's arguments
//! as [`NativeValue`]s.
//!
//! # Example
//!
//! ```ignore
//! use lumen_sdk::{native_argument, NativeCallResult, NativeFunctionRegistry};
//!
//! let mut registry = NativeFunctionRegistry::new();
//! registry.register("PassMessage", |_ctx, args| {
//!     native_argument::<String>(args, 0)
//!         .map(|message| message.len() as i64)
//!         .map(Into::into)
//!         .into()
//! });
//! ```

#![warn(missing_docs)]

pub mod context;
pub mod convert;
pub mod error;
pub mod handler;
pub mod value;

pub use context::NativeContext;
pub use convert::{native_argument, FromNative};
pub use error::{NativeError, NativeResult};
pub use handler::{NativeCallResult, NativeFunctionRegistry, NativeHandlerFn};
pub use value::NativeValue;
