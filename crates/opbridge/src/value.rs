//! Host Values and Variant Values
//!
//! This module provides the two value representations of the bridge.
//!
//! ## Value
//!
//! [`Value`] is the dynamic host value that callers pass to and receive
//! from operations, much like a JSON value with images in it.
//!
//! ## VariantValue
//!
//! [`VariantValue`] wraps a native value slot. It is typed once with
//! [`VariantValue::set_type`], filled from a host value with
//! [`VariantValue::set`], read back with [`VariantValue::get`], and
//! unset exactly once when dropped.
//!
//! Conversion is driven by the native type: the exact type is tried first
//! (images, blobs, the array types), then its fundamental kind.

use std::fmt;

use indexmap::IndexMap;
use opbridge_native::{
    enum_from_nick, enum_nick, flags_from_nick, type_fundamental, types, value_get_array_double,
    value_get_array_image, value_get_array_int, value_get_blob, value_get_boolean,
    value_get_double, value_get_enum, value_get_flags, value_get_int, value_get_object,
    value_get_string, value_init, value_set_array_double, value_set_array_image,
    value_set_array_int, value_set_blob, value_set_boolean, value_set_double, value_set_enum,
    value_set_flags, value_set_int, value_set_object, value_set_string, value_unset,
    NativeResult, NativeType, NativeValue, ObjectPtr,
};
use smol_str::SmolStr;

use crate::error::{take_native_error, BridgeError, BridgeResult};
use crate::image::Image;
use crate::object::ObjectRef;

// ============================================================================
// Value - Dynamic Host Value
// ============================================================================

/// A dynamically typed host value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// No value
    #[default]
    Null,

    /// Boolean
    Bool(bool),

    /// Integer
    Int(i64),

    /// Double-precision float
    Double(f64),

    /// UTF-8 string
    String(SmolStr),

    /// Byte buffer
    Bytes(Vec<u8>),

    /// Ordered sequence
    Array(Vec<Value>),

    /// String-keyed map, in insertion order
    Dict(IndexMap<SmolStr, Value>),

    /// Native image
    Image(Image),
}

impl Value {
    /// Create a byte buffer value
    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Value::Bytes(bytes.into())
    }

    /// Name of the value's kind
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Array(_) => "array",
            Value::Dict(_) => "dict",
            Value::Image(_) => "image",
        }
    }

    /// Check if this value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to extract as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to extract as i64; integral doubles and bools convert
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Bool(b) => Some(*b as i64),
            Value::Double(d) if d.fract() == 0.0 && d.abs() <= i64::MAX as f64 => Some(*d as i64),
            _ => None,
        }
    }

    /// Try to extract as f64; ints and bools widen
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            Value::Int(n) => Some(*n as f64),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Try to extract as string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Try to extract as bytes
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Try to extract as array
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Try to extract as dict
    pub fn as_dict(&self) -> Option<&IndexMap<SmolStr, Value>> {
        match self {
            Value::Dict(map) => Some(map),
            _ => None,
        }
    }

    /// Try to extract as image
    pub fn as_image(&self) -> Option<&Image> {
        match self {
            Value::Image(image) => Some(image),
            _ => None,
        }
    }

    /// Check if this is a number (bools count)
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Double(_) | Value::Bool(_))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Double(d) => write!(f, "{}", d),
            Value::String(s) => write!(f, "{:?}", s.as_str()),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Dict(map) => {
                write!(f, "{{")?;
                for (i, (key, item)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, item)?;
                }
                write!(f, "}}")
            }
            Value::Image(image) => write!(f, "<Image {}>", image),
        }
    }
}

// ============================================================================
// Type Kinds
// ============================================================================

/// How a native type is converted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Boolean,
    Int,
    Double,
    String,
    Enum,
    Flags,
    Image,
    Object,
    Blob,
    ArrayInt,
    ArrayDouble,
    ArrayImage,
}

/// Resolve the conversion kind: exact type first, then the fundamental.
fn kind_of(type_id: NativeType) -> Option<Kind> {
    let exact = match type_id {
        types::IMAGE => Some(Kind::Image),
        types::BLOB => Some(Kind::Blob),
        types::ARRAY_INT => Some(Kind::ArrayInt),
        types::ARRAY_DOUBLE => Some(Kind::ArrayDouble),
        types::ARRAY_IMAGE => Some(Kind::ArrayImage),
        _ => None,
    };
    exact.or(match type_fundamental(type_id) {
        types::BOOLEAN => Some(Kind::Boolean),
        types::INT => Some(Kind::Int),
        types::DOUBLE => Some(Kind::Double),
        types::STRING => Some(Kind::String),
        types::ENUM => Some(Kind::Enum),
        types::FLAGS => Some(Kind::Flags),
        types::OBJECT => Some(Kind::Object),
        _ => None,
    })
}

// ============================================================================
// VariantValue - Typed Native Value Slot
// ============================================================================

/// A native value slot owned by the host.
///
/// The slot's native resources (object references, blob and array
/// memory) are released exactly once, when the `VariantValue` is dropped.
pub struct VariantValue {
    raw: NativeValue,
    kind: Option<Kind>,
}

impl VariantValue {
    /// Create an empty, untyped value
    pub fn new() -> Self {
        Self {
            raw: NativeValue::new(),
            kind: None,
        }
    }

    /// Create a value of `type_id` holding `value`
    pub fn from_value(type_id: NativeType, value: &Value) -> BridgeResult<Self> {
        let mut variant = Self::new();
        variant.set_type(type_id)?;
        variant.set(value)?;
        Ok(variant)
    }

    /// Native type, [`types::INVALID`] until typed
    pub fn type_id(&self) -> NativeType {
        self.raw.type_id()
    }

    /// Give the value its native type. Allowed once.
    pub fn set_type(&mut self, type_id: NativeType) -> BridgeResult<()> {
        if self.kind.is_some() {
            return Err(BridgeError::type_error(format!(
                "value already has type {}",
                self.type_id()
            )));
        }
        let kind = kind_of(type_id).ok_or_else(|| {
            BridgeError::type_error(format!("unsupported type {} ({})", type_id, type_id.raw()))
        })?;
        value_init(&mut self.raw, type_id).map_err(|_| {
            BridgeError::type_error(take_native_error())
        })?;
        self.kind = Some(kind);
        Ok(())
    }

    fn kind(&self) -> BridgeResult<Kind> {
        self.kind
            .ok_or_else(|| BridgeError::type_error("value used before its type was set"))
    }

    /// Convert `value` to the native type and store it.
    pub fn set(&mut self, value: &Value) -> BridgeResult<()> {
        let kind = self.kind()?;
        let type_id = self.type_id();
        let raw = &mut self.raw;
        let mismatch = || {
            BridgeError::unsupported(format!(
                "cannot convert {} to {}",
                value.type_name(),
                type_id
            ))
        };

        match kind {
            Kind::Boolean => {
                let b = match value {
                    Value::Bool(b) => *b,
                    Value::Int(n) => *n != 0,
                    Value::Double(d) => *d != 0.0,
                    _ => return Err(mismatch()),
                };
                native(value_set_boolean(raw, b))
            }
            Kind::Int => {
                let n = value.as_int().ok_or_else(mismatch)?;
                native(value_set_int(raw, to_i32(n)?))
            }
            Kind::Double => {
                let d = value.as_double().ok_or_else(mismatch)?;
                native(value_set_double(raw, d))
            }
            Kind::String => {
                let s = value.as_str().ok_or_else(mismatch)?;
                native(value_set_string(raw, s))
            }
            Kind::Enum => match value {
                Value::String(nick) => {
                    let n = native(enum_from_nick(type_id, nick))?;
                    native(value_set_enum(raw, n))
                }
                other => {
                    let n = other.as_int().ok_or_else(mismatch)?;
                    native(value_set_enum(raw, to_i32(n)?))
                }
            },
            Kind::Flags => match value {
                Value::String(nicks) => {
                    let mask = native(flags_from_nick(type_id, nicks))?;
                    native(value_set_flags(raw, mask))
                }
                other => {
                    let n = other.as_int().ok_or_else(mismatch)?;
                    let mask = u32::try_from(n).map_err(|_| {
                        BridgeError::unsupported(format!("flags mask {} out of range", n))
                    })?;
                    native(value_set_flags(raw, mask))
                }
            },
            Kind::Image | Kind::Object => match value {
                Value::Image(image) => native(value_set_object(raw, Some(image.object().as_ptr()))),
                Value::Null => native(value_set_object(raw, None)),
                _ => Err(mismatch()),
            },
            Kind::Blob => {
                let bytes = blob_bytes(value).ok_or_else(mismatch)?;
                native(value_set_blob(raw, &bytes))
            }
            Kind::ArrayInt => {
                let items = numeric_items(value, |v| v.as_int().map(to_i32)).ok_or_else(mismatch)?;
                let items = items.into_iter().collect::<BridgeResult<Vec<i32>>>()?;
                native(value_set_array_int(raw, &items))
            }
            Kind::ArrayDouble => {
                let items = numeric_items(value, Value::as_double).ok_or_else(mismatch)?;
                native(value_set_array_double(raw, &items))
            }
            Kind::ArrayImage => {
                let images: Vec<&Image> = match value {
                    Value::Image(image) => vec![image],
                    Value::Array(items) => items
                        .iter()
                        .map(|item| item.as_image().ok_or_else(mismatch))
                        .collect::<BridgeResult<_>>()?,
                    _ => return Err(mismatch()),
                };
                // The native array steals these references.
                let refs: Vec<ObjectPtr> = images
                    .iter()
                    .map(|image| image.object().clone().into_raw())
                    .collect();
                native(value_set_array_image(raw, refs))
            }
        }
    }

    /// Read the value back as a host value.
    ///
    /// Objects come back with a new reference owned by the returned value.
    pub fn get(&self) -> BridgeResult<Value> {
        let raw = &self.raw;
        Ok(match self.kind()? {
            Kind::Boolean => Value::Bool(native(value_get_boolean(raw))?),
            Kind::Int => Value::Int(native(value_get_int(raw))? as i64),
            Kind::Double => Value::Double(native(value_get_double(raw))?),
            Kind::String => match native(value_get_string(raw))? {
                Some(s) => Value::String(s.into()),
                None => Value::Null,
            },
            Kind::Enum => {
                let n = native(value_get_enum(raw))?;
                match enum_nick(self.type_id(), n) {
                    Some(nick) => Value::String(nick.into()),
                    None => Value::Int(n as i64),
                }
            }
            Kind::Flags => Value::Int(native(value_get_flags(raw))? as i64),
            Kind::Image | Kind::Object => match native(value_get_object(raw))? {
                Some(ptr) => Value::Image(Image::from_ref(ObjectRef::acquire(ptr))?),
                None => Value::Null,
            },
            Kind::Blob => Value::Bytes(native(value_get_blob(raw))?),
            Kind::ArrayInt => Value::Array(
                native(value_get_array_int(raw))?
                    .into_iter()
                    .map(|n| Value::Int(n as i64))
                    .collect(),
            ),
            Kind::ArrayDouble => Value::Array(
                native(value_get_array_double(raw))?
                    .into_iter()
                    .map(Value::Double)
                    .collect(),
            ),
            Kind::ArrayImage => Value::Array(
                native(value_get_array_image(raw))?
                    .into_iter()
                    .map(|ptr| Image::from_ref(ObjectRef::acquire(ptr)).map(Value::Image))
                    .collect::<BridgeResult<_>>()?,
            ),
        })
    }

    pub(crate) fn raw(&self) -> &NativeValue {
        &self.raw
    }

    pub(crate) fn raw_mut(&mut self) -> &mut NativeValue {
        &mut self.raw
    }
}

impl Default for VariantValue {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for VariantValue {
    fn drop(&mut self) {
        value_unset(&mut self.raw);
    }
}

impl fmt::Debug for VariantValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VariantValue({}: {:?})", self.type_id(), self.raw.data())
    }
}

/// Map a native value failure to an unsupported value error.
fn native<T>(result: NativeResult<T>) -> BridgeResult<T> {
    result.map_err(|_| BridgeError::unsupported(take_native_error()))
}

fn to_i32(n: i64) -> BridgeResult<i32> {
    i32::try_from(n)
        .map_err(|_| BridgeError::unsupported(format!("int {} does not fit in 32 bits", n)))
}

/// Elements of a numeric array, promoting a bare scalar to one element.
fn numeric_items<T>(value: &Value, convert: impl Fn(&Value) -> Option<T>) -> Option<Vec<T>> {
    match value {
        Value::Array(items) => items.iter().map(&convert).collect(),
        scalar if scalar.is_numeric() => convert(scalar).map(|item| vec![item]),
        _ => None,
    }
}

/// Bytes of a blob: a byte buffer, a UTF-8 string, or a sequence of
/// single characters or byte-valued integers.
fn blob_bytes(value: &Value) -> Option<Vec<u8>> {
    match value {
        Value::Bytes(bytes) => Some(bytes.clone()),
        Value::String(s) => Some(s.as_bytes().to_vec()),
        Value::Array(items) => {
            let mut bytes = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(s) if s.chars().count() == 1 => {
                        bytes.extend_from_slice(s.as_bytes())
                    }
                    Value::Int(n) => bytes.push(u8::try_from(*n).ok()?),
                    _ => return None,
                }
            }
            Some(bytes)
        }
        _ => None,
    }
}
