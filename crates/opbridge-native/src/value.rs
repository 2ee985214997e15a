//! Native Value Slots
//!
//! `NativeValue` is the native library's dynamically typed value slot,
//! the equivalent of a C `GValue`. It follows the C rules exactly:
//!
//! 1. A slot starts out empty and untyped ([`NativeValue::new`])
//! 2. [`value_init`] gives it a type, exactly once
//! 3. Setters and getters must match the type's fundamental kind
//! 4. [`value_unset`] releases whatever the slot holds
//!
//! `NativeValue` has no destructor. A slot holding an object or a boxed
//! area owns one reference to it, and that reference is only released by
//! `value_unset`. Forgetting to unset leaks; unsetting twice is harmless
//! because the first unset empties the slot.

use crate::area::{
    area_describe, area_get_array_double, area_get_array_image, area_get_array_int,
    area_get_blob, area_new_array_double, area_new_array_image, area_new_array_int,
    area_new_blob,
};
use crate::error::{raise, NativeError, NativeResult};
use crate::object::{object_ref, object_type, object_unref, ObjectPtr};
use crate::types::{self, enum_contains, enum_values, type_fundamental, type_is_a, NativeType};

/// Payload of a value slot
#[derive(Debug, Clone, PartialEq)]
pub enum ValueData {
    /// No type yet, or unset
    Empty,
    /// `boolean`
    Boolean(bool),
    /// `int`
    Int(i32),
    /// `double`
    Double(f64),
    /// `string`, possibly null
    String(Option<String>),
    /// `enum` member value
    Enum(i32),
    /// `flags` mask
    Flags(u32),
    /// Object reference, possibly null
    Object(Option<ObjectPtr>),
    /// Boxed area reference, possibly null
    Boxed(Option<ObjectPtr>),
}

/// A typed native value slot.
#[derive(Debug)]
pub struct NativeValue {
    type_id: NativeType,
    data: ValueData,
}

impl NativeValue {
    /// Create an empty, untyped slot
    pub const fn new() -> Self {
        Self {
            type_id: types::INVALID,
            data: ValueData::Empty,
        }
    }

    /// Type of this slot, [`types::INVALID`] until initialised
    pub fn type_id(&self) -> NativeType {
        self.type_id
    }

    /// Check whether the slot has been given a type
    pub fn is_initialized(&self) -> bool {
        self.type_id != types::INVALID
    }

    /// Raw payload, for diagnostics
    pub fn data(&self) -> &ValueData {
        &self.data
    }
}

impl Default for NativeValue {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Give an empty slot its type.
pub fn value_init(value: &mut NativeValue, type_id: NativeType) -> NativeResult<()> {
    if value.is_initialized() {
        return raise(NativeError::ValueAlreadyInitialized {
            type_name: value.type_id.name().to_string(),
        });
    }

    let data = match type_fundamental(type_id) {
        types::BOOLEAN => ValueData::Boolean(false),
        types::INT => ValueData::Int(0),
        types::DOUBLE => ValueData::Double(0.0),
        types::STRING => ValueData::String(None),
        types::ENUM => ValueData::Enum(
            enum_values(type_id)
                .and_then(|values| values.first())
                .map(|v| v.value)
                .unwrap_or(0),
        ),
        types::FLAGS => ValueData::Flags(0),
        types::OBJECT => ValueData::Object(None),
        types::BOXED => ValueData::Boxed(None),
        types::INVALID => return raise(NativeError::UnknownType { type_id: type_id.raw() }),
        _ => {
            return raise(NativeError::UnsupportedValueType {
                type_name: type_id.name().to_string(),
            })
        }
    };

    value.type_id = type_id;
    value.data = data;
    Ok(())
}

/// Release whatever the slot holds and return it to the empty state.
pub fn value_unset(value: &mut NativeValue) {
    match std::mem::replace(&mut value.data, ValueData::Empty) {
        ValueData::Object(Some(ptr)) | ValueData::Boxed(Some(ptr)) => object_unref(ptr),
        _ => {}
    }
    value.type_id = types::INVALID;
}

/// Copy `src` into the initialised slot `dest`, adding references as needed.
///
/// `src` must hold a type that is, or derives from, the type of `dest`.
pub fn value_copy(src: &NativeValue, dest: &mut NativeValue) -> NativeResult<()> {
    if !dest.is_initialized() || !src.is_initialized() {
        return raise(NativeError::ValueNotInitialized);
    }
    if !type_is_a(src.type_id, dest.type_id) {
        return raise(NativeError::type_mismatch(dest.type_id.name(), src.type_id.name()));
    }

    let data = match &src.data {
        ValueData::Object(Some(ptr)) => ValueData::Object(Some(object_ref(*ptr))),
        ValueData::Boxed(Some(ptr)) => ValueData::Boxed(Some(object_ref(*ptr))),
        other => other.clone(),
    };
    replace_data(dest, data);
    Ok(())
}

fn replace_data(value: &mut NativeValue, data: ValueData) {
    match std::mem::replace(&mut value.data, data) {
        ValueData::Object(Some(ptr)) | ValueData::Boxed(Some(ptr)) => object_unref(ptr),
        _ => {}
    }
}

fn check_kind(value: &NativeValue, fundamental: NativeType) -> NativeResult<()> {
    if !value.is_initialized() {
        return raise(NativeError::ValueNotInitialized);
    }
    if type_fundamental(value.type_id) != fundamental {
        return raise(NativeError::type_mismatch(fundamental.name(), value.type_id.name()));
    }
    Ok(())
}

fn check_exact(value: &NativeValue, type_id: NativeType) -> NativeResult<()> {
    if !value.is_initialized() {
        return raise(NativeError::ValueNotInitialized);
    }
    if value.type_id != type_id {
        return raise(NativeError::type_mismatch(type_id.name(), value.type_id.name()));
    }
    Ok(())
}

// ============================================================================
// Setters
// ============================================================================

/// Store a boolean.
pub fn value_set_boolean(value: &mut NativeValue, b: bool) -> NativeResult<()> {
    check_kind(value, types::BOOLEAN)?;
    value.data = ValueData::Boolean(b);
    Ok(())
}

/// Store an int.
pub fn value_set_int(value: &mut NativeValue, n: i32) -> NativeResult<()> {
    check_kind(value, types::INT)?;
    value.data = ValueData::Int(n);
    Ok(())
}

/// Store a double.
pub fn value_set_double(value: &mut NativeValue, d: f64) -> NativeResult<()> {
    check_kind(value, types::DOUBLE)?;
    value.data = ValueData::Double(d);
    Ok(())
}

/// Store a copy of a string.
pub fn value_set_string(value: &mut NativeValue, s: &str) -> NativeResult<()> {
    check_kind(value, types::STRING)?;
    value.data = ValueData::String(Some(s.to_string()));
    Ok(())
}

/// Store an enum value, which must be a member of the slot's enum type.
pub fn value_set_enum(value: &mut NativeValue, n: i32) -> NativeResult<()> {
    check_kind(value, types::ENUM)?;
    if !enum_contains(value.type_id, n) {
        return raise(NativeError::out_of_range(value.type_id.name(), n));
    }
    value.data = ValueData::Enum(n);
    Ok(())
}

/// Store a flags mask.
pub fn value_set_flags(value: &mut NativeValue, mask: u32) -> NativeResult<()> {
    check_kind(value, types::FLAGS)?;
    value.data = ValueData::Flags(mask);
    Ok(())
}

/// Store an object reference. The slot adds its own reference.
pub fn value_set_object(value: &mut NativeValue, object: Option<ObjectPtr>) -> NativeResult<()> {
    check_kind(value, types::OBJECT)?;
    if let Some(ptr) = object {
        let actual = object_type(ptr);
        if !type_is_a(actual, value.type_id) {
            return raise(NativeError::type_mismatch(value.type_id.name(), actual.name()));
        }
        object_ref(ptr);
    }
    replace_data(value, ValueData::Object(object));
    Ok(())
}

/// Store a private copy of `bytes` as a blob.
pub fn value_set_blob(value: &mut NativeValue, bytes: &[u8]) -> NativeResult<()> {
    check_exact(value, types::BLOB)?;
    replace_data(value, ValueData::Boxed(Some(area_new_blob(bytes))));
    Ok(())
}

/// Store an int array.
pub fn value_set_array_int(value: &mut NativeValue, values: &[i32]) -> NativeResult<()> {
    check_exact(value, types::ARRAY_INT)?;
    replace_data(value, ValueData::Boxed(Some(area_new_array_int(values))));
    Ok(())
}

/// Store a double array.
pub fn value_set_array_double(value: &mut NativeValue, values: &[f64]) -> NativeResult<()> {
    check_exact(value, types::ARRAY_DOUBLE)?;
    replace_data(value, ValueData::Boxed(Some(area_new_array_double(values))));
    Ok(())
}

/// Store an image array, stealing one reference per element.
pub fn value_set_array_image(value: &mut NativeValue, images: Vec<ObjectPtr>) -> NativeResult<()> {
    if let Err(err) = check_exact(value, types::ARRAY_IMAGE) {
        for image in images {
            object_unref(image);
        }
        return Err(err);
    }
    let area = area_new_array_image(images)?;
    replace_data(value, ValueData::Boxed(Some(area)));
    Ok(())
}

// ============================================================================
// Getters
// ============================================================================

/// Read a boolean.
pub fn value_get_boolean(value: &NativeValue) -> NativeResult<bool> {
    check_kind(value, types::BOOLEAN)?;
    match value.data {
        ValueData::Boolean(b) => Ok(b),
        _ => raise(NativeError::ValueNotInitialized),
    }
}

/// Read an int.
pub fn value_get_int(value: &NativeValue) -> NativeResult<i32> {
    check_kind(value, types::INT)?;
    match value.data {
        ValueData::Int(n) => Ok(n),
        _ => raise(NativeError::ValueNotInitialized),
    }
}

/// Read a double.
pub fn value_get_double(value: &NativeValue) -> NativeResult<f64> {
    check_kind(value, types::DOUBLE)?;
    match value.data {
        ValueData::Double(d) => Ok(d),
        _ => raise(NativeError::ValueNotInitialized),
    }
}

/// Read a string; a null string reads as `None`.
pub fn value_get_string(value: &NativeValue) -> NativeResult<Option<String>> {
    check_kind(value, types::STRING)?;
    match &value.data {
        ValueData::String(s) => Ok(s.clone()),
        _ => raise(NativeError::ValueNotInitialized),
    }
}

/// Read an enum value.
pub fn value_get_enum(value: &NativeValue) -> NativeResult<i32> {
    check_kind(value, types::ENUM)?;
    match value.data {
        ValueData::Enum(n) => Ok(n),
        _ => raise(NativeError::ValueNotInitialized),
    }
}

/// Read a flags mask.
pub fn value_get_flags(value: &NativeValue) -> NativeResult<u32> {
    check_kind(value, types::FLAGS)?;
    match value.data {
        ValueData::Flags(mask) => Ok(mask),
        _ => raise(NativeError::ValueNotInitialized),
    }
}

/// Borrow the object held by the slot. No reference is added.
pub fn value_get_object(value: &NativeValue) -> NativeResult<Option<ObjectPtr>> {
    check_kind(value, types::OBJECT)?;
    match value.data {
        ValueData::Object(ptr) => Ok(ptr),
        _ => raise(NativeError::ValueNotInitialized),
    }
}

fn boxed_ptr(value: &NativeValue, type_id: NativeType) -> NativeResult<Option<ObjectPtr>> {
    check_exact(value, type_id)?;
    match value.data {
        ValueData::Boxed(ptr) => Ok(ptr),
        _ => raise(NativeError::ValueNotInitialized),
    }
}

/// Copy the bytes of a blob; a null blob reads as empty.
pub fn value_get_blob(value: &NativeValue) -> NativeResult<Vec<u8>> {
    match boxed_ptr(value, types::BLOB)? {
        Some(ptr) => area_get_blob(ptr),
        None => Ok(Vec::new()),
    }
}

/// Copy an int array.
pub fn value_get_array_int(value: &NativeValue) -> NativeResult<Vec<i32>> {
    match boxed_ptr(value, types::ARRAY_INT)? {
        Some(ptr) => area_get_array_int(ptr),
        None => Ok(Vec::new()),
    }
}

/// Copy a double array.
pub fn value_get_array_double(value: &NativeValue) -> NativeResult<Vec<f64>> {
    match boxed_ptr(value, types::ARRAY_DOUBLE)? {
        Some(ptr) => area_get_array_double(ptr),
        None => Ok(Vec::new()),
    }
}

/// Borrow the elements of an image array. No references are added.
pub fn value_get_array_image(value: &NativeValue) -> NativeResult<Vec<ObjectPtr>> {
    match boxed_ptr(value, types::ARRAY_IMAGE)? {
        Some(ptr) => area_get_array_image(ptr),
        None => Ok(Vec::new()),
    }
}

/// Text form of a value, used to build operation cache keys.
pub(crate) fn value_describe(value: &NativeValue) -> String {
    match &value.data {
        ValueData::Empty => "<unset>".to_string(),
        ValueData::Boolean(b) => b.to_string(),
        ValueData::Int(n) => n.to_string(),
        ValueData::Double(d) => format!("{:?}", d),
        ValueData::String(s) => format!("{:?}", s),
        ValueData::Enum(n) => format!("enum:{}", n),
        ValueData::Flags(mask) => format!("flags:{}", mask),
        ValueData::Object(ptr) => format!("{:?}", ptr),
        ValueData::Boxed(None) => "boxed:null".to_string(),
        ValueData::Boxed(Some(ptr)) => {
            area_describe(*ptr).unwrap_or_else(|_| format!("boxed:{:?}", ptr))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::error_clear;
    use crate::image::{image_new, BandFormat, ImageData};
    use crate::object::{object_is_alive, object_ref_count};

    fn typed(type_id: NativeType) -> NativeValue {
        let mut value = NativeValue::new();
        value_init(&mut value, type_id).unwrap();
        value
    }

    #[test]
    fn test_init_once() {
        let mut value = typed(types::INT);
        assert!(value_init(&mut value, types::DOUBLE).is_err());
        assert_eq!(value.type_id(), types::INT);
        error_clear();
    }

    #[test]
    fn test_init_rejects_unknown_and_pointer() {
        let mut value = NativeValue::new();
        assert!(matches!(
            value_init(&mut value, NativeType::from_raw(31337)),
            Err(NativeError::UnknownType { .. })
        ));
        assert!(matches!(
            value_init(&mut value, types::POINTER),
            Err(NativeError::UnsupportedValueType { .. })
        ));
        assert!(!value.is_initialized());
        error_clear();
    }

    #[test]
    fn test_scalar_setters_check_kind() {
        let mut value = typed(types::BOOLEAN);
        assert!(value_set_int(&mut value, 3).is_err());
        value_set_boolean(&mut value, true).unwrap();
        assert!(value_get_boolean(&value).unwrap());
        error_clear();
    }

    #[test]
    fn test_enum_membership() {
        let mut value = typed(types::BAND_FORMAT);
        assert_eq!(value_get_enum(&value).unwrap(), 0);
        value_set_enum(&mut value, 8).unwrap();
        assert!(value_set_enum(&mut value, 7).is_err());
        assert_eq!(value_get_enum(&value).unwrap(), 8);
        error_clear();
    }

    #[test]
    fn test_object_slot_holds_reference() {
        let image = image_new(ImageData::zeros(1, 1, 1, BandFormat::UChar));
        let mut value = typed(types::IMAGE);
        value_set_object(&mut value, Some(image)).unwrap();
        assert_eq!(object_ref_count(image), 2);

        value_unset(&mut value);
        assert_eq!(object_ref_count(image), 1);
        value_unset(&mut value);
        assert_eq!(object_ref_count(image), 1);

        object_unref(image);
        assert!(!object_is_alive(image));
    }

    #[test]
    fn test_blob_area_freed_on_unset() {
        let mut value = typed(types::BLOB);
        value_set_blob(&mut value, b"hello").unwrap();
        let area = match value.data() {
            ValueData::Boxed(Some(ptr)) => *ptr,
            other => panic!("expected boxed, got {:?}", other),
        };
        assert_eq!(value_get_blob(&value).unwrap(), b"hello".to_vec());
        value_unset(&mut value);
        assert!(!object_is_alive(area));
    }

    #[test]
    fn test_copy_adds_reference() {
        let image = image_new(ImageData::zeros(1, 1, 1, BandFormat::UChar));
        let mut src = typed(types::IMAGE);
        value_set_object(&mut src, Some(image)).unwrap();
        let mut dest = typed(types::IMAGE);
        value_copy(&src, &mut dest).unwrap();
        assert_eq!(object_ref_count(image), 3);

        value_unset(&mut src);
        value_unset(&mut dest);
        object_unref(image);
        assert!(!object_is_alive(image));
    }

    #[test]
    fn test_copy_requires_compatible_type() {
        let src = typed(types::INT);
        let mut dest = typed(types::DOUBLE);
        assert!(value_copy(&src, &mut dest).is_err());
        error_clear();
    }
}
