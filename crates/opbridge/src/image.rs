//! Image Handles
//!
//! [`Image`] is the host-side handle to a native image: an [`ObjectRef`]
//! plus a snapshot of the image header. Cloning an `Image` adds a native
//! reference; dropping it releases one.

use std::fmt;

use opbridge_native::{
    image_copy_memory, image_get_pixels, image_getpoint, image_header, image_new,
    image_new_from_image, image_new_matrix_from_array, types, BandFormat, ImageData, ImageHeader,
};

use crate::call::{call_method, CallOptions};
use crate::error::{take_native_error, BridgeError, BridgeResult};
use crate::object::ObjectRef;
use crate::value::Value;

/// Handle to a native image.
#[derive(Clone)]
pub struct Image {
    object: ObjectRef,
    header: ImageHeader,
}

impl Image {
    /// Wrap an object reference, checking that it refers to an image.
    pub fn from_ref(object: ObjectRef) -> BridgeResult<Self> {
        if !object.is_a(types::IMAGE) {
            return Err(BridgeError::type_error(format!(
                "expected Image, got {}",
                object.type_id()
            )));
        }
        let header = native(image_header(object.as_ptr()))?;
        Ok(Self { object, header })
    }

    /// Create an image from band-interleaved, row-major samples.
    pub fn from_memory(
        width: usize,
        height: usize,
        bands: usize,
        format: BandFormat,
        pixels: Vec<f64>,
    ) -> BridgeResult<Self> {
        let data = native(ImageData::new(width, height, bands, format, pixels))?;
        Self::from_ref(ObjectRef::steal(image_new(data)))
    }

    /// Create a one-band double matrix image from row-major values.
    pub fn new_matrix(width: usize, height: usize, values: &[f64]) -> BridgeResult<Self> {
        let ptr = native(image_new_matrix_from_array(width, height, values))?;
        Self::from_ref(ObjectRef::steal(ptr))
    }

    /// Create an image shaped like this one, with one constant band per value.
    pub fn new_from_image(&self, values: &[f64]) -> BridgeResult<Self> {
        let ptr = native(image_new_from_image(self.object.as_ptr(), values))?;
        Self::from_ref(ObjectRef::steal(ptr))
    }

    /// Copy the pixels into a new private image.
    pub fn copy_memory(&self) -> BridgeResult<Self> {
        let ptr = native(image_copy_memory(self.object.as_ptr()))?;
        Self::from_ref(ObjectRef::steal(ptr))
    }

    /// Call an operation with this image as its receiver.
    pub fn call(&self, operation: &str, args: &[Value], options: &CallOptions) -> BridgeResult<Value> {
        call_method(operation, self, args, options)
    }

    /// Underlying object reference
    pub fn object(&self) -> &ObjectRef {
        &self.object
    }

    /// Header snapshot taken when the handle was created
    pub fn header(&self) -> ImageHeader {
        self.header
    }

    /// Width in pixels
    pub fn width(&self) -> usize {
        self.header.width
    }

    /// Height in pixels
    pub fn height(&self) -> usize {
        self.header.height
    }

    /// Samples per pixel
    pub fn bands(&self) -> usize {
        self.header.bands
    }

    /// Sample format
    pub fn format(&self) -> BandFormat {
        self.header.format
    }

    /// Read every sample, band-interleaved and row-major.
    pub fn pixels(&self) -> BridgeResult<Vec<f64>> {
        native(image_get_pixels(self.object.as_ptr()))
    }

    /// Read the samples of one pixel.
    pub fn getpoint(&self, x: usize, y: usize) -> BridgeResult<Vec<f64>> {
        native(image_getpoint(self.object.as_ptr(), x, y))
    }
}

/// Map a native failure outside a call, clearing the error buffer.
pub(crate) fn native<T>(result: opbridge_native::NativeResult<T>) -> BridgeResult<T> {
    result.map_err(|err| {
        take_native_error();
        BridgeError::Native(err)
    })
}

impl PartialEq for Image {
    fn eq(&self, other: &Self) -> bool {
        self.object == other.object
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Image {} at {:p}>", self.header, self.object.as_ptr())
    }
}

impl fmt::Display for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opbridge_native::{object_is_alive, object_ref_count};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_from_memory() {
        let image = Image::from_memory(2, 1, 1, BandFormat::UChar, vec![1.0, 300.0]).unwrap();
        assert_eq!((image.width(), image.height(), image.bands()), (2, 1, 1));
        assert_eq!(image.pixels().unwrap(), vec![1.0, 255.0]);
        assert_eq!(image.to_string(), "2x1 1 band uchar");
    }

    #[test]
    fn test_from_ref_rejects_non_images() {
        let blob = ObjectRef::steal(opbridge_native::area_new_blob(b"x"));
        let err = Image::from_ref(blob).unwrap_err();
        assert!(err.is_type_error());
    }

    #[test]
    fn test_clone_and_drop() {
        let image = Image::from_memory(1, 1, 1, BandFormat::UChar, vec![0.0]).unwrap();
        let ptr = image.object().as_ptr();
        let copy = image.clone();
        assert_eq!(object_ref_count(ptr), 2);
        assert_eq!(copy, image);
        drop(image);
        drop(copy);
        assert!(!object_is_alive(ptr));
    }

    #[test]
    fn test_new_from_image() {
        let template = Image::from_memory(3, 2, 1, BandFormat::UShort, vec![0.0; 6]).unwrap();
        let constant = template.new_from_image(&[1.0, 2.0]).unwrap();
        assert_eq!((constant.width(), constant.height(), constant.bands()), (3, 2, 2));
        assert_eq!(constant.format(), BandFormat::UShort);
        assert_eq!(constant.getpoint(2, 1).unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_copy_memory_is_a_new_object() {
        let image = Image::from_memory(1, 1, 1, BandFormat::UChar, vec![5.0]).unwrap();
        let copy = image.copy_memory().unwrap();
        assert_ne!(copy, image);
        assert_eq!(copy.pixels().unwrap(), vec![5.0]);
    }

    #[test]
    fn test_bad_size_is_native_error() {
        let err = Image::new_matrix(2, 2, &[1.0]).unwrap_err();
        assert!(matches!(err, BridgeError::Native(_)));
        assert_eq!(opbridge_native::error_buffer(), "");
    }
}
