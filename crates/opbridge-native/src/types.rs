//! Native Type System
//!
//! This module provides the native library's type ids and the small type
//! hierarchy built from them.
//!
//! ## Type Categories
//!
//! 1. **Fundamental types**: `BOOLEAN`, `INT`, `DOUBLE`, `STRING`, `ENUM`,
//!    `FLAGS`, `OBJECT`, `BOXED`, `POINTER`
//! 2. **Object types**: `IMAGE`, `OPERATION`, `INTERPOLATE` (children of `OBJECT`)
//! 3. **Boxed types**: `BLOB`, `ARRAY_INT`, `ARRAY_DOUBLE`, `ARRAY_IMAGE`
//! 4. **Enum and flags types**: `BAND_FORMAT`, `INTERPRETATION`,
//!    `OPERATION_MATH`, `FOREIGN_KEEP`
//!
//! Every type has exactly one fundamental ancestor. Callers that do not
//! recognise a concrete type id fall back to [`type_fundamental`].

use std::fmt;

use crate::error::{raise, NativeError, NativeResult};

/// Native type identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct NativeType(u64);

impl NativeType {
    /// Create a type id from its raw value
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw value of this type id
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Name of this type, or `"<invalid>"` when unregistered
    pub fn name(self) -> &'static str {
        type_name(self).unwrap_or("<invalid>")
    }
}

impl fmt::Debug for NativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeType({}: {})", self.0, self.name())
    }
}

impl fmt::Display for NativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Well-Known Type Ids
// ============================================================================

/// Not a type
pub const INVALID: NativeType = NativeType(0);

/// `boolean` fundamental
pub const BOOLEAN: NativeType = NativeType(20);
/// `int` fundamental (32-bit signed)
pub const INT: NativeType = NativeType(24);
/// `double` fundamental
pub const DOUBLE: NativeType = NativeType(60);
/// `string` fundamental (UTF-8)
pub const STRING: NativeType = NativeType(64);
/// `enum` fundamental
pub const ENUM: NativeType = NativeType(48);
/// `flags` fundamental
pub const FLAGS: NativeType = NativeType(52);
/// `object` fundamental
pub const OBJECT: NativeType = NativeType(80);
/// `boxed` fundamental
pub const BOXED: NativeType = NativeType(72);
/// `pointer` fundamental, not storable by bindings
pub const POINTER: NativeType = NativeType(68);

/// Image object
pub const IMAGE: NativeType = NativeType(1001);
/// Operation object
pub const OPERATION: NativeType = NativeType(1002);
/// Interpolator object
pub const INTERPOLATE: NativeType = NativeType(1003);

/// Reference-counted byte buffer
pub const BLOB: NativeType = NativeType(1101);
/// Array of `int`
pub const ARRAY_INT: NativeType = NativeType(1102);
/// Array of `double`
pub const ARRAY_DOUBLE: NativeType = NativeType(1103);
/// Array of image references
pub const ARRAY_IMAGE: NativeType = NativeType(1104);

/// Pixel format enum
pub const BAND_FORMAT: NativeType = NativeType(1201);
/// Colour interpretation enum
pub const INTERPRETATION: NativeType = NativeType(1202);
/// Unary math function enum
pub const OPERATION_MATH: NativeType = NativeType(1203);
/// Metadata keep flags
pub const FOREIGN_KEEP: NativeType = NativeType(1301);

struct TypeInfo {
    id: NativeType,
    name: &'static str,
    parent: Option<NativeType>,
}

const TYPES: &[TypeInfo] = &[
    TypeInfo { id: BOOLEAN, name: "gboolean", parent: None },
    TypeInfo { id: INT, name: "gint", parent: None },
    TypeInfo { id: DOUBLE, name: "gdouble", parent: None },
    TypeInfo { id: STRING, name: "gchararray", parent: None },
    TypeInfo { id: ENUM, name: "GEnum", parent: None },
    TypeInfo { id: FLAGS, name: "GFlags", parent: None },
    TypeInfo { id: OBJECT, name: "GObject", parent: None },
    TypeInfo { id: BOXED, name: "GBoxed", parent: None },
    TypeInfo { id: POINTER, name: "gpointer", parent: None },
    TypeInfo { id: IMAGE, name: "Image", parent: Some(OBJECT) },
    TypeInfo { id: OPERATION, name: "Operation", parent: Some(OBJECT) },
    TypeInfo { id: INTERPOLATE, name: "Interpolate", parent: Some(OBJECT) },
    TypeInfo { id: BLOB, name: "Blob", parent: Some(BOXED) },
    TypeInfo { id: ARRAY_INT, name: "ArrayInt", parent: Some(BOXED) },
    TypeInfo { id: ARRAY_DOUBLE, name: "ArrayDouble", parent: Some(BOXED) },
    TypeInfo { id: ARRAY_IMAGE, name: "ArrayImage", parent: Some(BOXED) },
    TypeInfo { id: BAND_FORMAT, name: "BandFormat", parent: Some(ENUM) },
    TypeInfo { id: INTERPRETATION, name: "Interpretation", parent: Some(ENUM) },
    TypeInfo { id: OPERATION_MATH, name: "OperationMath", parent: Some(ENUM) },
    TypeInfo { id: FOREIGN_KEEP, name: "ForeignKeep", parent: Some(FLAGS) },
];

fn type_info(id: NativeType) -> Option<&'static TypeInfo> {
    TYPES.iter().find(|info| info.id == id)
}

/// Get the registered name of a type.
pub fn type_name(id: NativeType) -> Option<&'static str> {
    type_info(id).map(|info| info.name)
}

/// Look a type up by its registered name.
pub fn type_from_name(name: &str) -> Option<NativeType> {
    TYPES.iter().find(|info| info.name == name).map(|info| info.id)
}

/// Get the direct parent of a type.
pub fn type_parent(id: NativeType) -> Option<NativeType> {
    type_info(id).and_then(|info| info.parent)
}

/// Get the fundamental ancestor of a type, or [`INVALID`] if unregistered.
pub fn type_fundamental(id: NativeType) -> NativeType {
    let mut current = match type_info(id) {
        Some(info) => info,
        None => return INVALID,
    };
    while let Some(parent) = current.parent {
        match type_info(parent) {
            Some(info) => current = info,
            None => return INVALID,
        }
    }
    current.id
}

/// Check whether `id` is `ancestor` or derives from it.
pub fn type_is_a(id: NativeType, ancestor: NativeType) -> bool {
    let mut current = Some(id);
    while let Some(t) = current {
        if t == ancestor {
            return type_info(t).is_some();
        }
        current = type_parent(t);
    }
    false
}

// ============================================================================
// Enum and Flags Tables
// ============================================================================

/// One member of an enum or flags type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumValue {
    /// Numeric value (a single bit for flags members)
    pub value: i32,
    /// Short name used in option strings and by bindings
    pub nick: &'static str,
}

const fn ev(value: i32, nick: &'static str) -> EnumValue {
    EnumValue { value, nick }
}

const BAND_FORMAT_VALUES: &[EnumValue] = &[
    ev(0, "uchar"),
    ev(1, "char"),
    ev(2, "ushort"),
    ev(3, "short"),
    ev(4, "uint"),
    ev(5, "int"),
    ev(6, "float"),
    ev(8, "double"),
];

const INTERPRETATION_VALUES: &[EnumValue] = &[
    ev(0, "multiband"),
    ev(1, "b-w"),
    ev(10, "histogram"),
    ev(22, "srgb"),
    ev(25, "rgb16"),
    ev(26, "grey16"),
    ev(27, "matrix"),
];

const OPERATION_MATH_VALUES: &[EnumValue] = &[
    ev(0, "sin"),
    ev(1, "cos"),
    ev(2, "tan"),
    ev(3, "asin"),
    ev(4, "acos"),
    ev(5, "atan"),
    ev(6, "log"),
    ev(7, "log10"),
    ev(8, "exp"),
    ev(9, "exp10"),
];

const FOREIGN_KEEP_VALUES: &[EnumValue] = &[
    ev(1, "exif"),
    ev(2, "xmp"),
    ev(4, "iptc"),
    ev(8, "icc"),
    ev(16, "other"),
    ev(31, "all"),
];

/// Get the members of an enum or flags type.
pub fn enum_values(id: NativeType) -> Option<&'static [EnumValue]> {
    match id {
        BAND_FORMAT => Some(BAND_FORMAT_VALUES),
        INTERPRETATION => Some(INTERPRETATION_VALUES),
        OPERATION_MATH => Some(OPERATION_MATH_VALUES),
        FOREIGN_KEEP => Some(FOREIGN_KEEP_VALUES),
        _ => None,
    }
}

fn allowed_nicks(values: &[EnumValue]) -> String {
    values.iter().map(|v| v.nick).collect::<Vec<_>>().join(", ")
}

/// Look up the value of an enum member by nickname.
pub fn enum_from_nick(id: NativeType, nick: &str) -> NativeResult<i32> {
    let values = match enum_values(id) {
        Some(values) => values,
        None => return raise(NativeError::type_mismatch("enum type", id.name())),
    };
    match values.iter().find(|v| v.nick == nick) {
        Some(member) => Ok(member.value),
        None => raise(NativeError::EnumNoMember {
            type_name: id.name().to_string(),
            nick: nick.to_string(),
            allowed: allowed_nicks(values),
        }),
    }
}

/// Get the nickname of an enum value.
pub fn enum_nick(id: NativeType, value: i32) -> Option<&'static str> {
    enum_values(id)?
        .iter()
        .find(|v| v.value == value)
        .map(|v| v.nick)
}

/// Check whether `value` is a member of the enum type.
pub fn enum_contains(id: NativeType, value: i32) -> bool {
    enum_nick(id, value).is_some()
}

/// Combine one or more `|`-separated flag nicknames into a mask.
pub fn flags_from_nick(id: NativeType, nicks: &str) -> NativeResult<u32> {
    let mut mask = 0u32;
    for nick in nicks.split('|').map(str::trim).filter(|n| !n.is_empty()) {
        mask |= enum_from_nick(id, nick)? as u32;
    }
    Ok(mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::error_clear;

    #[test]
    fn test_fundamentals() {
        assert_eq!(type_fundamental(IMAGE), OBJECT);
        assert_eq!(type_fundamental(ARRAY_IMAGE), BOXED);
        assert_eq!(type_fundamental(BAND_FORMAT), ENUM);
        assert_eq!(type_fundamental(FOREIGN_KEEP), FLAGS);
        assert_eq!(type_fundamental(INT), INT);
        assert_eq!(type_fundamental(NativeType::from_raw(9999)), INVALID);
    }

    #[test]
    fn test_type_is_a() {
        assert!(type_is_a(IMAGE, OBJECT));
        assert!(type_is_a(IMAGE, IMAGE));
        assert!(!type_is_a(OBJECT, IMAGE));
        assert!(!type_is_a(BLOB, OBJECT));
        assert!(!type_is_a(INVALID, INVALID));
    }

    #[test]
    fn test_type_names() {
        assert_eq!(type_name(IMAGE), Some("Image"));
        assert_eq!(type_from_name("ArrayDouble"), Some(ARRAY_DOUBLE));
        assert_eq!(type_from_name("nope"), None);
        assert_eq!(NativeType::from_raw(4242).to_string(), "<invalid>");
    }

    #[test]
    fn test_enum_lookup() {
        assert_eq!(enum_from_nick(BAND_FORMAT, "double").unwrap(), 8);
        assert_eq!(enum_nick(BAND_FORMAT, 2), Some("ushort"));
        assert_eq!(enum_nick(BAND_FORMAT, 7), None);

        let err = enum_from_nick(BAND_FORMAT, "quad").unwrap_err();
        assert!(err.to_string().contains("should be one of: uchar"));
        error_clear();
    }

    #[test]
    fn test_flags_from_nick() {
        assert_eq!(flags_from_nick(FOREIGN_KEEP, "exif|icc").unwrap(), 9);
        assert_eq!(flags_from_nick(FOREIGN_KEEP, "").unwrap(), 0);
        assert!(flags_from_nick(FOREIGN_KEEP, "exif|gps").is_err());
        error_clear();
    }
}
