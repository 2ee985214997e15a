//! Operation Registry
//!
//! Operations are objects created by nickname from a process-wide class
//! registry. Each class declares its arguments in order, with flags that
//! say whether an argument is required, an input or an output, deprecated,
//! or modified in place. Bindings discover all of this at runtime through
//! [`object_get_args`]; nothing about an operation's signature is known
//! at compile time on the caller's side.
//!
//! ## Lifecycle
//!
//! 1. [`operation_new`] creates an unbuilt operation holding one reference
//! 2. [`object_set_from_string`] and [`object_set_property`] assign inputs
//! 3. [`cache_operation_build`](crate::cache::cache_operation_build) checks
//!    the required inputs, runs the operation and may hand back a cached
//!    instance instead
//! 4. [`object_get_property`] reads outputs from the built operation
//!
//! Each argument slot owns the references it holds; they are released
//! when the operation is finalised, or earlier via [`object_unref_outputs`].

use std::fmt;
use std::ops::BitOr;
use std::sync::OnceLock;

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::error::{raise, NativeError, NativeResult};
use crate::object::{object_data, object_new, object_type, object_unref, ObjectData, ObjectPtr};
use crate::types::{self, enum_from_nick, flags_from_nick, type_fundamental, NativeType};
use crate::value::{
    value_copy, value_describe, value_get_array_double, value_get_array_image,
    value_get_blob, value_get_boolean, value_get_enum, value_get_flags,
    value_get_int, value_get_object, value_get_string, value_init, value_set_array_double,
    value_set_blob, value_set_boolean, value_set_double, value_set_enum, value_set_flags,
    value_set_int, value_set_object, value_set_string, value_unset, NativeValue,
};

// ============================================================================
// Flags
// ============================================================================

/// Per-argument flags
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ArgumentFlags(u32);

impl ArgumentFlags {
    /// Must be assigned before build
    pub const REQUIRED: Self = Self(1);
    /// Assigned during construction
    pub const CONSTRUCT: Self = Self(2);
    /// May only be assigned once
    pub const SET_ONCE: Self = Self(4);
    /// Always assigned by the operation
    pub const SET_ALWAYS: Self = Self(8);
    /// Supplied by the caller
    pub const INPUT: Self = Self(16);
    /// Produced by the operation
    pub const OUTPUT: Self = Self(32);
    /// Kept for compatibility only
    pub const DEPRECATED: Self = Self(64);
    /// Input that the operation changes in place
    pub const MODIFY: Self = Self(128);

    const NAMES: [(Self, &'static str); 8] = [
        (Self::REQUIRED, "required"),
        (Self::CONSTRUCT, "construct"),
        (Self::SET_ONCE, "set-once"),
        (Self::SET_ALWAYS, "set-always"),
        (Self::INPUT, "input"),
        (Self::OUTPUT, "output"),
        (Self::DEPRECATED, "deprecated"),
        (Self::MODIFY, "modify"),
    ];

    /// Raw bit mask
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Rebuild flags from a raw bit mask
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Combine two sets of flags
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Check whether every flag in `other` is set
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ArgumentFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl fmt::Display for ArgumentFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        if names.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&names.join("|"))
        }
    }
}

impl fmt::Debug for ArgumentFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArgumentFlags({})", self)
    }
}

/// Per-class flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OperationFlags(u32);

impl OperationFlags {
    /// No special behaviour
    pub const NONE: Self = Self(0);
    /// Never reuse a previous result
    pub const NOCACHE: Self = Self(4);
    /// Kept for compatibility only
    pub const DEPRECATED: Self = Self(8);

    /// Raw bit mask
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Check whether every flag in `other` is set
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for OperationFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

// ============================================================================
// Classes
// ============================================================================

/// Declaration of one operation argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgSpec {
    /// Native name, `-` separated
    pub name: &'static str,
    /// One-line description
    pub blurb: &'static str,
    /// Declared type
    pub type_id: NativeType,
    /// Argument flags
    pub flags: ArgumentFlags,
}

pub(crate) type BuildFn = fn(&mut BuildContext<'_>) -> NativeResult<()>;

/// A registered operation class
pub struct OperationClass {
    /// Name the class is registered under
    pub nickname: &'static str,
    /// One-line description
    pub description: &'static str,
    /// Class flags
    pub flags: OperationFlags,
    /// Arguments in declaration order
    pub args: Vec<ArgSpec>,
    pub(crate) build: BuildFn,
}

impl fmt::Debug for OperationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationClass")
            .field("nickname", &self.nickname)
            .field("flags", &self.flags)
            .field("args", &self.args.len())
            .finish()
    }
}

/// Class registry under construction
pub(crate) struct Registry {
    classes: IndexMap<&'static str, OperationClass>,
}

impl Registry {
    pub(crate) fn register(&mut self, class: OperationClass) {
        self.classes.insert(class.nickname, class);
    }
}

fn registry() -> &'static IndexMap<&'static str, OperationClass> {
    static REGISTRY: OnceLock<IndexMap<&'static str, OperationClass>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut registry = Registry {
            classes: IndexMap::new(),
        };
        crate::ops::register_all(&mut registry);
        tracing::debug!(classes = registry.classes.len(), "operation registry initialised");
        registry.classes
    })
}

/// Look up an operation class by nickname.
pub fn operation_class(nickname: &str) -> Option<&'static OperationClass> {
    registry().get(nickname)
}

/// Every registered class, in registration order.
pub fn operation_classes() -> impl Iterator<Item = &'static OperationClass> {
    registry().values()
}

// ============================================================================
// Operation Instances
// ============================================================================

/// State of one operation instance
pub(crate) struct OperationData {
    class: &'static OperationClass,
    values: Vec<NativeValue>,
    assigned: Vec<bool>,
    built: bool,
}

impl OperationData {
    fn new(class: &'static OperationClass) -> NativeResult<Self> {
        let mut values = Vec::with_capacity(class.args.len());
        for spec in &class.args {
            let mut value = NativeValue::new();
            value_init(&mut value, spec.type_id)?;
            values.push(value);
        }
        Ok(Self {
            class,
            assigned: vec![false; values.len()],
            values,
            built: false,
        })
    }

    fn index(&self, name: &str) -> NativeResult<usize> {
        match self.class.args.iter().position(|spec| spec.name == name) {
            Some(index) => Ok(index),
            None => raise(NativeError::NoSuchArgument {
                object: self.class.nickname.to_string(),
                name: name.to_string(),
            }),
        }
    }

    fn set_input(&mut self, name: &str, value: &NativeValue) -> NativeResult<()> {
        let index = self.index(name)?;
        let spec = self.class.args[index];
        let object = self.class.nickname.to_string();

        if !spec.flags.contains(ArgumentFlags::INPUT) {
            return raise(NativeError::NotAnInput {
                object,
                name: name.to_string(),
            });
        }
        if self.built {
            return raise(NativeError::AlreadyBuilt { object });
        }
        if spec.flags.contains(ArgumentFlags::SET_ONCE) && self.assigned[index] {
            return raise(NativeError::ArgumentAlreadySet {
                object,
                name: name.to_string(),
            });
        }

        value_copy(value, &mut self.values[index])?;
        self.assigned[index] = true;
        Ok(())
    }

    /// Text form of the assigned inputs, or `None` when the class is uncacheable.
    pub(crate) fn cache_key(&self) -> Option<String> {
        if self.class.flags.contains(OperationFlags::NOCACHE) {
            return None;
        }
        let mut key = String::from(self.class.nickname);
        for (index, spec) in self.class.args.iter().enumerate() {
            if spec.flags.contains(ArgumentFlags::INPUT) && self.assigned[index] {
                key.push(' ');
                key.push_str(spec.name);
                key.push('=');
                key.push_str(&value_describe(&self.values[index]));
            }
        }
        Some(key)
    }

    pub(crate) fn nickname(&self) -> &'static str {
        self.class.nickname
    }

    pub(crate) fn is_built(&self) -> bool {
        self.built
    }

    /// Check required inputs, then run the class body.
    pub(crate) fn build(&mut self) -> NativeResult<()> {
        if self.built {
            return raise(NativeError::AlreadyBuilt {
                object: self.class.nickname.to_string(),
            });
        }
        let missing = self.class.args.iter().enumerate().find(|(index, spec)| {
            spec.flags.contains(ArgumentFlags::REQUIRED | ArgumentFlags::INPUT)
                && !self.assigned[*index]
        });
        if let Some((_, spec)) = missing {
            return raise(NativeError::ParameterNotSet {
                object: self.class.nickname.to_string(),
                name: spec.name.to_string(),
            });
        }

        let build = self.class.build;
        build(&mut BuildContext { op: self })?;
        self.built = true;
        Ok(())
    }

    fn unref_outputs(&mut self) {
        for (index, spec) in self.class.args.iter().enumerate() {
            if spec.flags.contains(ArgumentFlags::OUTPUT) && self.assigned[index] {
                let value = &mut self.values[index];
                value_unset(value);
                // Re-typing a just-unset slot with a registered type cannot fail.
                let _ = value_init(value, spec.type_id);
                self.assigned[index] = false;
            }
        }
    }

    /// Release every reference held by the argument slots.
    pub(crate) fn finalize(&mut self) {
        for value in &mut self.values {
            value_unset(value);
        }
    }
}

fn with_operation<R>(
    ptr: ObjectPtr,
    f: impl FnOnce(&mut OperationData) -> NativeResult<R>,
) -> NativeResult<R> {
    let data = object_data(ptr)?;
    match data.as_operation() {
        Some(op) => f(&mut op.lock()),
        None => raise(NativeError::type_mismatch("Operation", object_type(ptr).name())),
    }
}

/// Create an operation by nickname. The handle holds one reference.
pub fn operation_new(nickname: &str) -> NativeResult<ObjectPtr> {
    let class = match operation_class(nickname) {
        Some(class) => class,
        None => {
            return raise(NativeError::ClassNotFound {
                name: nickname.to_string(),
            })
        }
    };
    let data = OperationData::new(class)?;
    Ok(object_new(types::OPERATION, ObjectData::Operation(Mutex::new(data))))
}

/// Nickname of an operation instance.
pub fn operation_nickname(ptr: ObjectPtr) -> NativeResult<&'static str> {
    with_operation(ptr, |op| Ok(op.class.nickname))
}

/// Description of an operation instance's class.
pub fn object_get_description(ptr: ObjectPtr) -> NativeResult<&'static str> {
    with_operation(ptr, |op| Ok(op.class.description))
}

/// Class flags of an operation instance.
pub fn operation_get_flags(ptr: ObjectPtr) -> NativeResult<OperationFlags> {
    with_operation(ptr, |op| Ok(op.class.flags))
}

/// Argument declarations of an operation, in declaration order.
pub fn object_get_args(ptr: ObjectPtr) -> NativeResult<Vec<ArgSpec>> {
    with_operation(ptr, |op| Ok(op.class.args.clone()))
}

/// Assign an input argument from a value slot.
///
/// The slot is copied; the caller keeps ownership of `value`.
pub fn object_set_property(ptr: ObjectPtr, name: &str, value: &NativeValue) -> NativeResult<()> {
    with_operation(ptr, |op| op.set_input(name, value))
}

/// Copy an argument into `dest`, which must already carry a compatible type.
pub fn object_get_property(ptr: ObjectPtr, name: &str, dest: &mut NativeValue) -> NativeResult<()> {
    with_operation(ptr, |op| {
        let index = op.index(name)?;
        value_copy(&op.values[index], dest)
    })
}

/// Check whether an argument has been assigned.
pub fn object_argument_isset(ptr: ObjectPtr, name: &str) -> NativeResult<bool> {
    with_operation(ptr, |op| {
        let index = op.index(name)?;
        Ok(op.assigned[index])
    })
}

/// Release the references held by every assigned output.
pub fn object_unref_outputs(ptr: ObjectPtr) {
    if let Err(err) = with_operation(ptr, |op| {
        op.unref_outputs();
        Ok(())
    }) {
        tracing::warn!(handle = ?ptr, error = %err, "object_unref_outputs on a non-operation");
    }
}

// ============================================================================
// Option Strings
// ============================================================================

/// Apply an option string such as `"[shift,format=float]"`.
///
/// The brackets are optional. Each entry is `key=value`, or a bare `key`
/// that sets a boolean argument to true. Keys may use `_` or `-`.
pub fn object_set_from_string(ptr: ObjectPtr, options: &str) -> NativeResult<()> {
    let trimmed = options.trim();
    let body = trimmed
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .unwrap_or(trimmed);

    for entry in body.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (key, text) = match entry.split_once('=') {
            Some((key, text)) => (key.trim(), Some(text.trim())),
            None => (entry, None),
        };
        let name = key.replace('_', "-");
        let type_id = with_operation(ptr, |op| {
            let index = op.index(&name)?;
            Ok(op.class.args[index].type_id)
        })?;

        let mut value = NativeValue::new();
        let parsed = parse_option(&mut value, type_id, text);
        let result = match parsed {
            Ok(()) => object_set_property(ptr, &name, &value),
            Err(reason) => raise(NativeError::BadOptionString {
                options: options.to_string(),
                reason,
            }),
        };
        value_unset(&mut value);
        result?;
    }
    Ok(())
}

fn parse_option(value: &mut NativeValue, type_id: NativeType, text: Option<&str>) -> Result<(), String> {
    value_init(value, type_id).map_err(|e| e.to_string())?;
    let fundamental = type_fundamental(type_id);
    let text = match (text, fundamental) {
        (Some(text), _) => text,
        (None, types::BOOLEAN) => "true",
        (None, _) => return Err(format!("{} needs a value", type_id)),
    };
    let bad = || format!("\"{}\" is not a valid {}", text, type_id);

    match fundamental {
        types::BOOLEAN => {
            let b = match text.to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => true,
                "false" | "no" | "off" | "0" => false,
                _ => return Err(format!("\"{}\" is not a boolean", text)),
            };
            value_set_boolean(value, b)
        }
        types::INT => value_set_int(value, text.parse().map_err(|_| bad())?),
        types::DOUBLE => value_set_double(value, text.parse().map_err(|_| bad())?),
        types::STRING => value_set_string(value, text),
        types::ENUM => match text.parse::<i32>() {
            Ok(n) => value_set_enum(value, n),
            Err(_) => enum_from_nick(type_id, text).and_then(|n| value_set_enum(value, n)),
        },
        types::FLAGS => match text.parse::<u32>() {
            Ok(mask) => value_set_flags(value, mask),
            Err(_) => flags_from_nick(type_id, text).and_then(|mask| value_set_flags(value, mask)),
        },
        _ => return Err(format!("{} cannot be set from a string", type_id)),
    }
    .map_err(|e| e.to_string())
}

// ============================================================================
// Build Context
// ============================================================================

/// Argument access for operation bodies.
///
/// Getters borrow: an image returned by [`BuildContext::image`] is owned by
/// the argument slot. Setters for objects steal the reference passed in.
pub(crate) struct BuildContext<'a> {
    op: &'a mut OperationData,
}

impl BuildContext<'_> {
    fn slot(&self, name: &str) -> NativeResult<&NativeValue> {
        let index = self.op.index(name)?;
        Ok(&self.op.values[index])
    }

    fn output(&mut self, name: &str) -> NativeResult<&mut NativeValue> {
        let index = self.op.index(name)?;
        self.op.assigned[index] = true;
        Ok(&mut self.op.values[index])
    }

    /// Check whether an optional input was assigned.
    pub(crate) fn is_set(&self, name: &str) -> bool {
        self.op
            .index(name)
            .map(|index| self.op.assigned[index])
            .unwrap_or(false)
    }

    /// Fail the build with a message attributed to this operation.
    pub(crate) fn fail<T>(&self, message: impl Into<String>) -> NativeResult<T> {
        raise(NativeError::operation_failed(self.op.class.nickname, message))
    }

    pub(crate) fn image(&self, name: &str) -> NativeResult<ObjectPtr> {
        match value_get_object(self.slot(name)?)? {
            Some(ptr) => Ok(ptr),
            None => self.fail(format!("{} is null", name)),
        }
    }

    pub(crate) fn int(&self, name: &str) -> NativeResult<i32> {
        value_get_int(self.slot(name)?)
    }

    pub(crate) fn boolean(&self, name: &str) -> NativeResult<bool> {
        value_get_boolean(self.slot(name)?)
    }

    pub(crate) fn string(&self, name: &str) -> NativeResult<String> {
        match value_get_string(self.slot(name)?)? {
            Some(s) => Ok(s),
            None => self.fail(format!("{} is null", name)),
        }
    }

    pub(crate) fn enum_value(&self, name: &str) -> NativeResult<i32> {
        value_get_enum(self.slot(name)?)
    }

    pub(crate) fn flags(&self, name: &str) -> NativeResult<u32> {
        value_get_flags(self.slot(name)?)
    }

    pub(crate) fn array_double(&self, name: &str) -> NativeResult<Vec<f64>> {
        value_get_array_double(self.slot(name)?)
    }

    pub(crate) fn array_image(&self, name: &str) -> NativeResult<Vec<ObjectPtr>> {
        value_get_array_image(self.slot(name)?)
    }

    pub(crate) fn blob(&self, name: &str) -> NativeResult<Vec<u8>> {
        value_get_blob(self.slot(name)?)
    }

    /// Store an output image, stealing the reference `image` holds.
    pub(crate) fn set_image(&mut self, name: &str, image: ObjectPtr) -> NativeResult<()> {
        let result = self
            .output(name)
            .and_then(|slot| value_set_object(slot, Some(image)));
        object_unref(image);
        result
    }

    pub(crate) fn set_int(&mut self, name: &str, n: i32) -> NativeResult<()> {
        value_set_int(self.output(name)?, n)
    }

    pub(crate) fn set_double(&mut self, name: &str, d: f64) -> NativeResult<()> {
        value_set_double(self.output(name)?, d)
    }

    pub(crate) fn set_array_double(&mut self, name: &str, values: &[f64]) -> NativeResult<()> {
        value_set_array_double(self.output(name)?, values)
    }

    pub(crate) fn set_blob(&mut self, name: &str, bytes: &[u8]) -> NativeResult<()> {
        value_set_blob(self.output(name)?, bytes)
    }
}
