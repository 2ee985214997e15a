//! opbridge-native - Reference Native Operation Library
//!
//! A self-contained operation library with the interface and the hazards
//! of a C object system: opaque object handles with manual reference
//! counting, untyped-until-initialised value slots without destructors, a
//! registry of operations whose signatures are only known at runtime, an
//! operation cache, and a last-error buffer.
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------+
//! |                       opbridge-native                          |
//! +---------------------------------------------------------------+
//! |  types      | type ids, hierarchy, enum/flags tables           |
//! |  object     | handle table, ref/unref, statistics              |
//! |  area       | blobs and arrays                                 |
//! |  image      | pixels and headers                               |
//! |  value      | NativeValue slots                                |
//! |  operation  | class registry, arguments, option strings        |
//! |  cache      | build, reuse and eviction of operations          |
//! |  ops        | the registered operation catalogue               |
//! |  error      | NativeError and the error buffer                 |
//! +---------------------------------------------------------------+
//! ```
//!
//! Everything here follows C conventions on purpose: nothing is released
//! by `Drop`, and a caller that forgets an `object_unref` leaks. The
//! `opbridge` crate is the safe layer on top.

pub mod area;
pub mod cache;
pub mod error;
pub mod image;
pub mod object;
pub mod operation;
mod ops;
pub mod types;
pub mod value;

pub use area::{
    area_get_array_double, area_get_array_image, area_get_array_int, area_get_blob,
    area_new_array_double, area_new_array_image, area_new_array_int, area_new_blob,
};
pub use cache::{
    cache_drop_all, cache_get_max, cache_get_size, cache_operation_build, cache_set_max,
    DEFAULT_CACHE_MAX,
};
pub use error::{error_buffer, error_clear, error_push, NativeError, NativeResult};
pub use image::{
    image_copy_memory, image_get_pixels, image_getpoint, image_header, image_new,
    image_new_from_image, image_new_matrix_from_array, BandFormat, ImageData, ImageHeader,
};
pub use object::{
    object_is_alive, object_ref, object_ref_count, object_stats, object_type, object_unref,
    ObjectPtr, ObjectStats,
};
pub use operation::{
    object_argument_isset, object_get_args, object_get_description, object_get_property,
    object_set_from_string, object_set_property, object_unref_outputs, operation_class,
    operation_classes, operation_get_flags, operation_new, operation_nickname, ArgSpec,
    ArgumentFlags, OperationClass, OperationFlags,
};
pub use types::{
    enum_from_nick, enum_nick, enum_values, flags_from_nick, type_from_name, type_fundamental,
    type_is_a, type_name, EnumValue, NativeType,
};
pub use value::{
    value_copy, value_get_array_double, value_get_array_image, value_get_array_int,
    value_get_blob, value_get_boolean, value_get_double, value_get_enum, value_get_flags,
    value_get_int, value_get_object, value_get_string, value_init, value_set_array_double,
    value_set_array_image, value_set_array_int, value_set_blob, value_set_boolean,
    value_set_double, value_set_enum, value_set_flags, value_set_int, value_set_object,
    value_set_string, value_unset, NativeValue, ValueData,
};
