//! Call Pipeline
//!
//! Generic invocation of a native operation by name.
//!
//! ## Steps
//!
//! 1. Take the reserved `string_options` keyword out of the options
//! 2. Resolve the operation's [`Manifest`]
//! 3. Check the positional count and the keyword names
//! 4. Create a transient native operation
//! 5. Apply the option string, then bind required inputs, then optional
//!    inputs, all in declaration order. An argument the option string
//!    assigned is not rebound
//! 6. Build through the native operation cache
//! 7. Read the required outputs and any requested optional outputs
//! 8. Release the transient and built operations
//!
//! Every native reference taken along the way is held by an [`ObjectRef`]
//! or a [`VariantValue`], so an error at any step releases everything
//! acquired so far.
//!
//! ## Results
//!
//! No outputs gives [`Value::Null`]. A single output with no optional
//! outputs requested gives that value. Otherwise the result is an array of
//! the required outputs followed by a dict of the requested optional ones.

use std::borrow::Cow;

use indexmap::IndexMap;
use opbridge_native::{
    cache_operation_build, object_argument_isset, object_get_property, object_set_from_string,
    object_set_property, object_unref_outputs, operation_new,
};
use smol_str::SmolStr;
use tracing::{debug, trace, warn};

use crate::config::config;
use crate::error::{take_native_error, BridgeError, BridgeResult};
use crate::image::Image;
use crate::imageize::{find_match_image, imageize, imageize_each};
use crate::introspect::{host_name, introspect, ArgumentDescriptor, Manifest};
use crate::object::ObjectRef;
use crate::value::{Value, VariantValue};

/// Reserved keyword carrying a verbatim native option string
pub const STRING_OPTIONS: &str = "string_options";

// ============================================================================
// Call Options
// ============================================================================

/// Keyword arguments of a call, in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallOptions {
    values: IndexMap<SmolStr, Value>,
}

impl CallOptions {
    /// Create an empty option set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an option, builder style.
    pub fn with(mut self, name: impl Into<SmolStr>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Add or replace an option
    pub fn set(&mut self, name: impl Into<SmolStr>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    /// Look up an option
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Remove an option, keeping the order of the rest
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.values.shift_remove(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SmolStr, &Value)> {
        self.values.iter()
    }
}

impl<K: Into<SmolStr>, V: Into<Value>> FromIterator<(K, V)> for CallOptions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut options = Self::new();
        for (name, value) in iter {
            options.set(name, value);
        }
        options
    }
}

// ============================================================================
// Entry Points
// ============================================================================

/// Call an operation by name.
///
/// Every required input, the image receiver included, is passed
/// positionally in declaration order.
pub fn call(operation: &str, args: &[Value], options: &CallOptions) -> BridgeResult<Value> {
    invoke(operation, None, args, options)
}

/// Call an operation with `receiver` bound to its image receiver.
///
/// `args` holds the remaining required inputs.
pub fn call_method(
    operation: &str,
    receiver: &Image,
    args: &[Value],
    options: &CallOptions,
) -> BridgeResult<Value> {
    invoke(operation, Some(receiver), args, options)
}

// ============================================================================
// Pipeline
// ============================================================================

fn invoke(
    operation: &str,
    receiver: Option<&Image>,
    args: &[Value],
    options: &CallOptions,
) -> BridgeResult<Value> {
    let mut options = options.clone();
    let string_options = options.remove(STRING_OPTIONS);

    let manifest = introspect(operation)?;
    debug!(
        operation,
        positional = args.len(),
        keywords = options.len(),
        method = receiver.is_some(),
        "calling operation"
    );

    let required = match receiver {
        Some(_) if manifest.member_x().is_none() => {
            return Err(BridgeError::Type {
                context: operation.to_string(),
                message: "operation does not take an image receiver".to_string(),
            })
        }
        Some(_) => manifest.required_input_count(),
        None => manifest.positional_count(),
    };
    if args.len() != required {
        return Err(BridgeError::Arity {
            operation: SmolStr::new(operation),
            given: args.len(),
            required,
        });
    }

    let keywords = check_keywords(&manifest, &options)?;
    if manifest.is_deprecated() && config().warn_on_deprecated {
        warn!(operation, "operation is deprecated");
    }

    let match_image = find_match_image(receiver, args);

    let op = operation_new(operation).map_err(|_| BridgeError::UnknownOperation {
        operation: SmolStr::new(operation),
        native: take_native_error(),
    })?;
    let op = ObjectRef::steal(op);

    // Arguments assigned by the option string keep that value.
    let preset = match string_options {
        Some(text) => {
            let text = text.as_str().ok_or_else(|| {
                BridgeError::unsupported(format!("expected string, got {}", text.type_name()))
                    .in_argument(operation, STRING_OPTIONS)
            })?;
            trace!(operation, options = text, "applying option string");
            object_set_from_string(op.as_ptr(), text)
                .map_err(|_| BridgeError::invocation(operation, STRING_OPTIONS))?;
            assigned_inputs(&op, &manifest)
        }
        None => Vec::new(),
    };

    // Required inputs, receiver included, in declaration order.
    let receiver_value = receiver.map(|image| Value::Image(image.clone()));
    let member_x = manifest.member_x().map(|arg| arg.name.clone());
    let mut supplied = args.iter();
    for arg in manifest.positional() {
        let value = match &receiver_value {
            Some(value) if member_x.as_ref() == Some(&arg.name) => value,
            _ => supplied.next().ok_or_else(|| BridgeError::Arity {
                operation: SmolStr::new(operation),
                given: args.len(),
                required,
            })?,
        };
        if preset.contains(&arg.native_name) {
            debug!(operation, argument = %arg.name, "kept value from option string");
            continue;
        }
        set_argument(&op, operation, arg, value, match_image)?;
    }

    for arg in keywords.inputs {
        if arg.is_deprecated() && config().warn_on_deprecated {
            warn!(operation, argument = %arg.name, "argument is deprecated");
        }
        if preset.contains(&arg.native_name) {
            debug!(operation, argument = %arg.name, "kept value from option string");
            continue;
        }
        let value = options.get(&arg.name).or_else(|| options.get(arg.native_name));
        if let Some(value) = value {
            set_argument(&op, operation, arg, value, match_image)?;
        }
    }

    let built = match cache_operation_build(op.as_ptr()) {
        Ok(ptr) => ObjectRef::steal(ptr),
        Err(_) => {
            let err = BridgeError::build(operation);
            object_unref_outputs(op.as_ptr());
            debug!(operation, error = %err, "build failed");
            return Err(err);
        }
    };
    debug!(operation, cached = built != op, "operation built");

    let mut results = manifest
        .required_output()
        .map(|arg| get_argument(&built, operation, arg))
        .collect::<BridgeResult<Vec<Value>>>()?;

    if !keywords.outputs.is_empty() {
        let mut optional = IndexMap::with_capacity(keywords.outputs.len());
        for arg in keywords.outputs {
            optional.insert(arg.name.clone(), get_argument(&built, operation, arg)?);
        }
        results.push(Value::Dict(optional));
    }

    Ok(match results.len() {
        0 => Value::Null,
        1 => results.pop().unwrap_or_default(),
        _ => Value::Array(results),
    })
}

/// Keyword arguments resolved against the manifest, in declaration order.
struct Keywords<'m> {
    inputs: Vec<&'m ArgumentDescriptor>,
    outputs: Vec<&'m ArgumentDescriptor>,
}

/// Validate every keyword before anything is bound.
fn check_keywords<'m>(manifest: &'m Manifest, options: &CallOptions) -> BridgeResult<Keywords<'m>> {
    let operation = manifest.operation();
    let mut given = Vec::with_capacity(options.len());

    for (name, value) in options.iter() {
        let name = host_name(name);
        if manifest.find_optional_input(&name).is_some() {
            given.push(name);
        } else if manifest.find_optional_output(&name).is_some() {
            match value {
                Value::Bool(true) => given.push(name),
                Value::Bool(false) => {}
                other => {
                    return Err(BridgeError::unsupported(format!(
                        "optional output is requested with true, got {}",
                        other.type_name()
                    ))
                    .in_argument(operation, &name))
                }
            }
        } else {
            return Err(BridgeError::UnknownArgument {
                operation: SmolStr::new(operation),
                argument: name,
            });
        }
    }

    let wanted = |arg: &&ArgumentDescriptor| given.contains(&arg.name);
    Ok(Keywords {
        inputs: manifest.optional_input().filter(wanted).collect(),
        outputs: manifest.optional_output().filter(wanted).collect(),
    })
}

/// Native names of the inputs already assigned on `op`.
fn assigned_inputs(op: &ObjectRef, manifest: &Manifest) -> Vec<&'static str> {
    manifest
        .arguments()
        .filter(|arg| arg.is_input())
        .filter(|arg| object_argument_isset(op.as_ptr(), arg.native_name).unwrap_or(false))
        .map(|arg| arg.native_name)
        .collect()
}

/// Convert a host value for one argument and assign it.
fn set_argument(
    op: &ObjectRef,
    operation: &str,
    arg: &ArgumentDescriptor,
    value: &Value,
    match_image: Option<&Image>,
) -> BridgeResult<()> {
    let in_arg = |err: BridgeError| err.in_argument(operation, &arg.name);

    let value = coerce(arg, value, match_image).map_err(in_arg)?;
    let variant = VariantValue::from_value(arg.type_id, &value).map_err(in_arg)?;
    trace!(operation, argument = %arg.name, value = %value, "binding argument");

    object_set_property(op.as_ptr(), arg.native_name, variant.raw())
        .map_err(|_| BridgeError::invocation(operation, arg.name.clone()))
}

/// Imageize image arguments and copy modify arguments.
fn coerce<'v>(
    arg: &ArgumentDescriptor,
    value: &'v Value,
    match_image: Option<&Image>,
) -> BridgeResult<Cow<'v, Value>> {
    if arg.is_image() {
        let image = imageize(match_image, value)?;
        let image = if arg.is_modify() {
            image.copy_memory()?
        } else {
            image
        };
        Ok(Cow::Owned(Value::Image(image)))
    } else if arg.is_image_array() {
        let images = imageize_each(match_image, value)?;
        Ok(Cow::Owned(Value::Array(
            images.into_iter().map(Value::Image).collect(),
        )))
    } else {
        Ok(Cow::Borrowed(value))
    }
}

/// Read one output argument of the built operation.
fn get_argument(op: &ObjectRef, operation: &str, arg: &ArgumentDescriptor) -> BridgeResult<Value> {
    let mut variant = VariantValue::new();
    variant
        .set_type(arg.type_id)
        .map_err(|err| err.in_argument(operation, &arg.name))?;
    object_get_property(op.as_ptr(), arg.native_name, variant.raw_mut())
        .map_err(|_| BridgeError::invocation(operation, arg.name.clone()))?;
    variant.get().map_err(|err| err.in_argument(operation, &arg.name))
}
