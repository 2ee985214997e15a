//! # opbridge
//!
//! Dynamic binding to an introspectable native operation library.
//!
//! The native library publishes its operations only at runtime: each
//! operation is a class whose arguments (name, type, flags) can be
//! queried, set from typed value slots, built, and read back. This crate
//! turns that into one generic entry point, [`call`], that takes an
//! operation name plus host values and returns host values.
//!
//! ## Overview
//!
//! - [`Value`]: dynamic host value (numbers, strings, bytes, arrays,
//!   dicts, images)
//! - [`VariantValue`]: typed native value slot, released on drop
//! - [`ObjectRef`]: one native reference, released exactly once
//! - [`introspect`]: memoized per-operation argument [`Manifest`]
//! - [`call`] / [`call_method`]: the call pipeline
//! - [`imageize`](imageize::imageize): constants to images
//!
//! ## Example
//!
//! ```ignore
//! use opbridge::{call, CallOptions, Value};
//!
//! let black = call("black", &[10.into(), 10.into()], &CallOptions::new())?;
//! let image = black.as_image().unwrap();
//! let brighter = image.call("linear", &[1.into(), 20.into()], &CallOptions::new())?;
//! ```
//!
//! ## Module Structure
//!
//! - [`value`]: host and variant values
//! - [`conversion`]: `ToValue` / `FromValue`
//! - [`object`]: reference guard
//! - [`image`]: image handles
//! - [`introspect`]: manifests and the introspection cache
//! - [`imageize`]: constant coercion
//! - [`call`]: the call pipeline
//! - [`config`]: bridge configuration
//! - [`error`]: error types

pub mod call;
pub mod config;
pub mod conversion;
pub mod error;
pub mod image;
pub mod imageize;
pub mod introspect;
pub mod object;
pub mod value;

// Re-export main types for convenience
pub use call::{call, call_method, CallOptions, STRING_OPTIONS};
pub use config::{config, init, BridgeConfig};
pub use conversion::{bytes_from_value, FromValue, ToValue};
pub use error::{take_native_error, BridgeError, BridgeResult};
pub use image::Image;
pub use imageize::{find_match_image, imageize};
pub use introspect::{flush, introspect, operations, ArgumentDescriptor, Manifest};
pub use object::ObjectRef;
pub use value::{Value, VariantValue};

pub use opbridge_native::{self as native, BandFormat, ImageHeader};
