//! Type Conversion Traits
//!
//! This module provides traits for converting between Rust types and
//! [`Value`].
//!
//! ## Traits
//!
//! - `ToValue`: Convert Rust types to host values
//! - `FromValue`: Convert host values to Rust types
//!
//! Operation results come back as [`Value`]; `FromValue` is the typed way
//! to take them apart:
//!
//! ```ignore
//! let avg = f64::from_value(&image.call("avg", &[], &CallOptions::new())?)?;
//! ```

use indexmap::IndexMap;
use smol_str::SmolStr;

use crate::error::{BridgeError, BridgeResult};
use crate::image::Image;
use crate::value::Value;

// ============================================================================
// ToValue Trait
// ============================================================================

/// Trait for converting Rust types to host values.
pub trait ToValue {
    /// Convert this value to a host value.
    fn to_value(&self) -> Value;
}

impl ToValue for Value {
    fn to_value(&self) -> Value {
        self.clone()
    }
}

impl ToValue for () {
    fn to_value(&self) -> Value {
        Value::Null
    }
}

impl ToValue for bool {
    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }
}

impl ToValue for i32 {
    fn to_value(&self) -> Value {
        Value::Int(*self as i64)
    }
}

impl ToValue for i64 {
    fn to_value(&self) -> Value {
        Value::Int(*self)
    }
}

impl ToValue for u8 {
    fn to_value(&self) -> Value {
        Value::Int(*self as i64)
    }
}

impl ToValue for u32 {
    fn to_value(&self) -> Value {
        Value::Int(*self as i64)
    }
}

impl ToValue for usize {
    fn to_value(&self) -> Value {
        Value::Int(*self as i64)
    }
}

impl ToValue for f32 {
    fn to_value(&self) -> Value {
        Value::Double(*self as f64)
    }
}

impl ToValue for f64 {
    fn to_value(&self) -> Value {
        Value::Double(*self)
    }
}

impl ToValue for str {
    fn to_value(&self) -> Value {
        Value::String(SmolStr::new(self))
    }
}

impl ToValue for String {
    fn to_value(&self) -> Value {
        Value::String(SmolStr::new(self))
    }
}

impl ToValue for SmolStr {
    fn to_value(&self) -> Value {
        Value::String(self.clone())
    }
}

impl ToValue for Image {
    fn to_value(&self) -> Value {
        Value::Image(self.clone())
    }
}

impl<T: ToValue + ?Sized> ToValue for &T {
    fn to_value(&self) -> Value {
        (**self).to_value()
    }
}

impl<T: ToValue> ToValue for Option<T> {
    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Null,
        }
    }
}

impl<T: ToValue> ToValue for Vec<T> {
    fn to_value(&self) -> Value {
        self.as_slice().to_value()
    }
}

impl<T: ToValue> ToValue for [T] {
    fn to_value(&self) -> Value {
        Value::Array(self.iter().map(ToValue::to_value).collect())
    }
}

impl<K: AsRef<str>, V: ToValue> ToValue for IndexMap<K, V> {
    fn to_value(&self) -> Value {
        Value::Dict(
            self.iter()
                .map(|(k, v)| (SmolStr::new(k.as_ref()), v.to_value()))
                .collect(),
        )
    }
}

// ============================================================================
// From Implementations for Value
// ============================================================================

macro_rules! value_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    v.to_value()
                }
            }
        )*
    };
}

value_from!(bool, i32, i64, u8, u32, usize, f32, f64, &str, String, SmolStr);

impl From<Image> for Value {
    fn from(image: Image) -> Self {
        Value::Image(image)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<Vec<f64>> for Value {
    fn from(items: Vec<f64>) -> Self {
        items.to_value()
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value::Bytes(bytes)
    }
}

impl From<IndexMap<SmolStr, Value>> for Value {
    fn from(map: IndexMap<SmolStr, Value>) -> Self {
        Value::Dict(map)
    }
}

// ============================================================================
// FromValue Trait
// ============================================================================

/// Trait for converting host values to Rust types.
pub trait FromValue: Sized {
    /// Try to convert a host value to this type.
    fn from_value(value: &Value) -> BridgeResult<Self>;
}

fn mismatch(expected: &str, value: &Value) -> BridgeError {
    BridgeError::type_error(format!("expected {}, got {}", expected, value.type_name()))
}

fn overflow(n: i64, target: &str) -> BridgeError {
    BridgeError::unsupported(format!("{} does not fit in {}", n, target))
}

impl FromValue for Value {
    fn from_value(value: &Value) -> BridgeResult<Self> {
        Ok(value.clone())
    }
}

impl FromValue for () {
    fn from_value(value: &Value) -> BridgeResult<Self> {
        match value {
            Value::Null => Ok(()),
            _ => Err(mismatch("null", value)),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> BridgeResult<Self> {
        match value {
            Value::Bool(b) => Ok(*b),
            Value::Int(n) => Ok(*n != 0),
            _ => Err(mismatch("bool", value)),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> BridgeResult<Self> {
        value.as_int().ok_or_else(|| mismatch("int", value))
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> BridgeResult<Self> {
        let n = i64::from_value(value)?;
        i32::try_from(n).map_err(|_| overflow(n, "i32"))
    }
}

impl FromValue for u32 {
    fn from_value(value: &Value) -> BridgeResult<Self> {
        let n = i64::from_value(value)?;
        u32::try_from(n).map_err(|_| overflow(n, "u32"))
    }
}

impl FromValue for usize {
    fn from_value(value: &Value) -> BridgeResult<Self> {
        let n = i64::from_value(value)?;
        usize::try_from(n).map_err(|_| overflow(n, "usize"))
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> BridgeResult<Self> {
        match value {
            Value::Double(d) => Ok(*d),
            Value::Int(n) => Ok(*n as f64),
            _ => Err(mismatch("double", value)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> BridgeResult<Self> {
        match value {
            Value::String(s) => Ok(s.to_string()),
            _ => Err(mismatch("string", value)),
        }
    }
}

impl FromValue for SmolStr {
    fn from_value(value: &Value) -> BridgeResult<Self> {
        match value {
            Value::String(s) => Ok(s.clone()),
            _ => Err(mismatch("string", value)),
        }
    }
}

impl FromValue for Image {
    fn from_value(value: &Value) -> BridgeResult<Self> {
        match value {
            Value::Image(image) => Ok(image.clone()),
            _ => Err(mismatch("image", value)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> BridgeResult<Self> {
        match value {
            Value::Null => Ok(None),
            _ => T::from_value(value).map(Some),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: &Value) -> BridgeResult<Self> {
        match value {
            Value::Array(items) => items.iter().map(T::from_value).collect(),
            _ => Err(mismatch("array", value)),
        }
    }
}

impl<T: FromValue> FromValue for IndexMap<SmolStr, T> {
    fn from_value(value: &Value) -> BridgeResult<Self> {
        match value {
            Value::Dict(map) => map
                .iter()
                .map(|(k, v)| T::from_value(v).map(|v| (k.clone(), v)))
                .collect(),
            _ => Err(mismatch("dict", value)),
        }
    }
}

/// Read the bytes of a blob result.
pub fn bytes_from_value(value: &Value) -> BridgeResult<Vec<u8>> {
    value
        .as_bytes()
        .map(<[u8]>::to_vec)
        .ok_or_else(|| mismatch("bytes", value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_to_value_primitives() {
        assert_eq!(42i32.to_value(), Value::Int(42));
        assert_eq!(1.5f64.to_value(), Value::Double(1.5));
        assert_eq!("abc".to_value(), Value::String("abc".into()));
        assert_eq!(None::<i64>.to_value(), Value::Null);
        assert_eq!(
            vec![1.0, 2.0].to_value(),
            Value::Array(vec![Value::Double(1.0), Value::Double(2.0)])
        );
    }

    #[test]
    fn test_from_impls() {
        assert_eq!(Value::from(true), Value::Bool(true));
        assert_eq!(Value::from("x"), Value::String("x".into()));
        assert_eq!(Value::from(vec![1u8, 2]), Value::Bytes(vec![1, 2]));
        assert_eq!(
            Value::from(vec![Value::Int(1)]),
            Value::Array(vec![Value::Int(1)])
        );
    }

    #[test]
    fn test_from_value_numbers() {
        assert_eq!(i32::from_value(&Value::Int(7)).unwrap(), 7);
        assert_eq!(f64::from_value(&Value::Int(7)).unwrap(), 7.0);
        assert_eq!(i64::from_value(&Value::Double(3.0)).unwrap(), 3);
        assert!(i64::from_value(&Value::Double(3.5)).is_err());
        assert!(i32::from_value(&Value::Int(1 << 40)).is_err());
        assert!(u32::from_value(&Value::Int(-1)).is_err());
    }

    #[test]
    fn test_from_value_containers() {
        let array = Value::Array(vec![Value::Double(1.0), Value::Int(2)]);
        assert_eq!(Vec::<f64>::from_value(&array).unwrap(), vec![1.0, 2.0]);

        let mut map = IndexMap::new();
        map.insert(SmolStr::new("x"), Value::Int(3));
        let dict = Value::Dict(map);
        let read = IndexMap::<SmolStr, i64>::from_value(&dict).unwrap();
        assert_eq!(read.get("x"), Some(&3));

        assert_eq!(Option::<i64>::from_value(&Value::Null).unwrap(), None);
        assert!(String::from_value(&Value::Int(1)).unwrap_err().is_type_error());
    }

    #[test]
    fn test_bytes_from_value() {
        assert_eq!(bytes_from_value(&Value::bytes(vec![1, 2])).unwrap(), vec![1, 2]);
        assert!(bytes_from_value(&Value::Null).is_err());
    }
}
