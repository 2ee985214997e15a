//! Boxed Areas
//!
//! Reference-counted memory areas: blobs, int arrays, double arrays and
//! arrays of image references. An area owns its buffer outright; the
//! buffer is freed exactly once, when the last reference to the area is
//! dropped.
//!
//! An image array owns one reference per element. Callers that build an
//! image array hand those references over: [`area_new_array_image`] steals
//! them, so a caller that wants to keep its own handles must `object_ref`
//! each element first.

use crate::error::{raise, NativeError, NativeResult};
use crate::object::{object_data, object_new, object_type, object_unref, ObjectData, ObjectPtr};
use crate::types::{self, NativeType};

/// Payload of a boxed area
#[derive(Debug)]
pub(crate) enum Area {
    Blob(Vec<u8>),
    ArrayInt(Vec<i32>),
    ArrayDouble(Vec<f64>),
    ArrayImage(Vec<ObjectPtr>),
}

impl Area {
    pub(crate) fn type_id(&self) -> NativeType {
        match self {
            Area::Blob(_) => types::BLOB,
            Area::ArrayInt(_) => types::ARRAY_INT,
            Area::ArrayDouble(_) => types::ARRAY_DOUBLE,
            Area::ArrayImage(_) => types::ARRAY_IMAGE,
        }
    }

    pub(crate) fn finalize(&self) {
        if let Area::ArrayImage(images) = self {
            for image in images {
                object_unref(*image);
            }
        }
    }

    /// Stable text form of the contents, used for operation cache keys.
    pub(crate) fn describe(&self) -> String {
        match self {
            Area::Blob(bytes) => format!("blob{:?}", bytes),
            Area::ArrayInt(values) => format!("int{:?}", values),
            Area::ArrayDouble(values) => format!("double{:?}", values),
            Area::ArrayImage(images) => format!("image{:?}", images),
        }
    }
}

fn area_new(area: Area) -> ObjectPtr {
    object_new(area.type_id(), ObjectData::Area(area))
}

/// Create a blob holding a private copy of `bytes`.
pub fn area_new_blob(bytes: &[u8]) -> ObjectPtr {
    area_new(Area::Blob(bytes.to_vec()))
}

/// Create an int array area.
pub fn area_new_array_int(values: &[i32]) -> ObjectPtr {
    area_new(Area::ArrayInt(values.to_vec()))
}

/// Create a double array area.
pub fn area_new_array_double(values: &[f64]) -> ObjectPtr {
    area_new(Area::ArrayDouble(values.to_vec()))
}

/// Create an image array area, stealing one reference per element.
pub fn area_new_array_image(images: Vec<ObjectPtr>) -> NativeResult<ObjectPtr> {
    if let Some(bad) = images.iter().find(|ptr| object_type(**ptr) != types::IMAGE) {
        let actual = object_type(*bad).name();
        // The references were handed to us, so they are ours to drop.
        for image in &images {
            object_unref(*image);
        }
        return raise(NativeError::type_mismatch("Image", actual));
    }
    Ok(area_new(Area::ArrayImage(images)))
}

fn with_area<R>(ptr: ObjectPtr, f: impl FnOnce(&Area) -> NativeResult<R>) -> NativeResult<R> {
    let data = object_data(ptr)?;
    match data.as_area() {
        Some(area) => f(area),
        None => raise(NativeError::type_mismatch("boxed area", object_type(ptr).name())),
    }
}

fn wrong_area<R>(expected: NativeType, area: &Area) -> NativeResult<R> {
    raise(NativeError::type_mismatch(expected.name(), area.type_id().name()))
}

/// Copy the contents of a blob.
pub fn area_get_blob(ptr: ObjectPtr) -> NativeResult<Vec<u8>> {
    with_area(ptr, |area| match area {
        Area::Blob(bytes) => Ok(bytes.clone()),
        other => wrong_area(types::BLOB, other),
    })
}

/// Copy the contents of an int array.
pub fn area_get_array_int(ptr: ObjectPtr) -> NativeResult<Vec<i32>> {
    with_area(ptr, |area| match area {
        Area::ArrayInt(values) => Ok(values.clone()),
        other => wrong_area(types::ARRAY_INT, other),
    })
}

/// Copy the contents of a double array.
pub fn area_get_array_double(ptr: ObjectPtr) -> NativeResult<Vec<f64>> {
    with_area(ptr, |area| match area {
        Area::ArrayDouble(values) => Ok(values.clone()),
        other => wrong_area(types::ARRAY_DOUBLE, other),
    })
}

/// Borrow the elements of an image array. No references are added.
pub fn area_get_array_image(ptr: ObjectPtr) -> NativeResult<Vec<ObjectPtr>> {
    with_area(ptr, |area| match area {
        Area::ArrayImage(images) => Ok(images.clone()),
        other => wrong_area(types::ARRAY_IMAGE, other),
    })
}

pub(crate) fn area_describe(ptr: ObjectPtr) -> NativeResult<String> {
    with_area(ptr, |area| Ok(area.describe()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{image_new, BandFormat, ImageData};
    use crate::object::{object_is_alive, object_ref, object_ref_count};

    #[test]
    fn test_blob_copy_is_private() {
        let mut source = vec![1u8, 2, 3];
        let blob = area_new_blob(&source);
        source[0] = 99;
        assert_eq!(area_get_blob(blob).unwrap(), vec![1, 2, 3]);
        object_unref(blob);
        assert!(!object_is_alive(blob));
    }

    #[test]
    fn test_array_image_owns_element_references() {
        let image = image_new(ImageData::zeros(2, 2, 1, BandFormat::UChar));
        object_ref(image);
        let array = area_new_array_image(vec![image]).unwrap();
        assert_eq!(object_ref_count(image), 2);

        object_unref(array);
        assert_eq!(object_ref_count(image), 1);
        object_unref(image);
    }

    #[test]
    fn test_array_image_rejects_non_images() {
        let blob = area_new_blob(b"x");
        assert!(area_new_array_image(vec![blob]).is_err());
        // The stolen reference was dropped on failure.
        assert!(!object_is_alive(blob));
        crate::error::error_clear();
    }

    #[test]
    fn test_wrong_area_kind() {
        let ints = area_new_array_int(&[1, 2]);
        assert_eq!(area_get_array_int(ints).unwrap(), vec![1, 2]);
        assert!(area_get_array_double(ints).is_err());
        object_unref(ints);
        crate::error::error_clear();
    }
}
