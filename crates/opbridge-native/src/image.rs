//! Native Images
//!
//! In-memory images: a `width x height` grid of pixels with `bands`
//! samples each, stored band-interleaved and row-major. Samples are kept
//! as `f64` and clipped to the range of the image's [`BandFormat`] when
//! written, so an 8-bit image never holds 300.0 or 1.5.
//!
//! Images are immutable once shared, with one exception: operations that
//! modify an argument in place write through the pixel lock. Callers that
//! must not observe the change copy first with [`image_copy_memory`].

use std::fmt;

use parking_lot::RwLock;

use crate::error::{raise, NativeError, NativeResult};
use crate::object::{object_data, object_new, object_type, ObjectData, ObjectPtr};
use crate::types::{self, enum_nick};

// ============================================================================
// Band Formats
// ============================================================================

/// Sample format of an image band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BandFormat {
    /// Unsigned 8-bit
    UChar,
    /// Signed 8-bit
    Char,
    /// Unsigned 16-bit
    UShort,
    /// Signed 16-bit
    Short,
    /// Unsigned 32-bit
    UInt,
    /// Signed 32-bit
    Int,
    /// 32-bit float
    Float,
    /// 64-bit float
    Double,
}

impl BandFormat {
    /// Enum value registered for this format
    pub fn value(self) -> i32 {
        match self {
            BandFormat::UChar => 0,
            BandFormat::Char => 1,
            BandFormat::UShort => 2,
            BandFormat::Short => 3,
            BandFormat::UInt => 4,
            BandFormat::Int => 5,
            BandFormat::Float => 6,
            BandFormat::Double => 8,
        }
    }

    /// Format for a registered enum value
    pub fn from_value(value: i32) -> Option<Self> {
        Some(match value {
            0 => BandFormat::UChar,
            1 => BandFormat::Char,
            2 => BandFormat::UShort,
            3 => BandFormat::Short,
            4 => BandFormat::UInt,
            5 => BandFormat::Int,
            6 => BandFormat::Float,
            8 => BandFormat::Double,
            _ => return None,
        })
    }

    /// Nickname of this format
    pub fn nick(self) -> &'static str {
        enum_nick(types::BAND_FORMAT, self.value()).unwrap_or("uchar")
    }

    /// Check whether samples of this format are integers
    pub fn is_integer(self) -> bool {
        !matches!(self, BandFormat::Float | BandFormat::Double)
    }

    fn range(self) -> Option<(f64, f64)> {
        match self {
            BandFormat::UChar => Some((0.0, u8::MAX as f64)),
            BandFormat::Char => Some((i8::MIN as f64, i8::MAX as f64)),
            BandFormat::UShort => Some((0.0, u16::MAX as f64)),
            BandFormat::Short => Some((i16::MIN as f64, i16::MAX as f64)),
            BandFormat::UInt => Some((0.0, u32::MAX as f64)),
            BandFormat::Int => Some((i32::MIN as f64, i32::MAX as f64)),
            BandFormat::Float => None,
            BandFormat::Double => None,
        }
    }

    /// Convert a sample to this format: integers truncate, then saturate.
    pub fn clip(self, sample: f64) -> f64 {
        match self.range() {
            Some((lo, hi)) => sample.trunc().clamp(lo, hi),
            None if self == BandFormat::Float => sample as f32 as f64,
            None => sample,
        }
    }
}

impl fmt::Display for BandFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.nick())
    }
}

// ============================================================================
// Image Data
// ============================================================================

/// `multiband` interpretation
pub const INTERPRETATION_MULTIBAND: i32 = 0;
/// `b-w` interpretation
pub const INTERPRETATION_B_W: i32 = 1;
/// `matrix` interpretation
pub const INTERPRETATION_MATRIX: i32 = 27;

/// Pixels and header of an image object
#[derive(Debug)]
pub struct ImageData {
    width: usize,
    height: usize,
    bands: usize,
    format: BandFormat,
    interpretation: i32,
    pixels: RwLock<Vec<f64>>,
}

impl ImageData {
    /// An image with every sample zero
    pub fn zeros(width: usize, height: usize, bands: usize, format: BandFormat) -> Self {
        Self {
            width,
            height,
            bands,
            format,
            interpretation: default_interpretation(bands),
            pixels: RwLock::new(vec![0.0; width * height * bands]),
        }
    }

    /// An image from band-interleaved, row-major samples.
    ///
    /// Samples are clipped to `format`.
    pub fn new(
        width: usize,
        height: usize,
        bands: usize,
        format: BandFormat,
        pixels: Vec<f64>,
    ) -> NativeResult<Self> {
        if width == 0 || height == 0 || bands == 0 {
            return raise(NativeError::out_of_range(
                "image size",
                format!("{}x{}x{}", width, height, bands),
            ));
        }
        let expected = width * height * bands;
        if pixels.len() != expected {
            return raise(NativeError::out_of_range(
                format!("pixel count (expected {})", expected),
                pixels.len(),
            ));
        }
        let pixels = pixels.into_iter().map(|p| format.clip(p)).collect();
        Ok(Self {
            width,
            height,
            bands,
            format,
            interpretation: default_interpretation(bands),
            pixels: RwLock::new(pixels),
        })
    }

    /// Override the interpretation recorded in the header
    pub fn with_interpretation(mut self, interpretation: i32) -> Self {
        self.interpretation = interpretation;
        self
    }

    /// Header fields of this image
    pub fn header(&self) -> ImageHeader {
        ImageHeader {
            width: self.width,
            height: self.height,
            bands: self.bands,
            format: self.format,
            interpretation: self.interpretation,
        }
    }

    /// Copy of every sample
    pub fn pixels(&self) -> Vec<f64> {
        self.pixels.read().clone()
    }

    /// Samples of the pixel at `(x, y)`
    pub fn point(&self, x: usize, y: usize) -> Option<Vec<f64>> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let start = (y * self.width + x) * self.bands;
        Some(self.pixels.read()[start..start + self.bands].to_vec())
    }

    /// Apply `f` to every sample in place, clipping the results.
    pub(crate) fn update(&self, mut f: impl FnMut(usize, usize, usize, f64) -> f64) {
        let mut pixels = self.pixels.write();
        for (i, sample) in pixels.iter_mut().enumerate() {
            let band = i % self.bands;
            let x = (i / self.bands) % self.width;
            let y = i / (self.bands * self.width);
            *sample = self.format.clip(f(x, y, band, *sample));
        }
    }

    fn deep_copy(&self) -> Self {
        Self {
            width: self.width,
            height: self.height,
            bands: self.bands,
            format: self.format,
            interpretation: self.interpretation,
            pixels: RwLock::new(self.pixels()),
        }
    }
}

fn default_interpretation(bands: usize) -> i32 {
    if bands == 1 {
        INTERPRETATION_B_W
    } else {
        INTERPRETATION_MULTIBAND
    }
}

/// Header of an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHeader {
    /// Width in pixels
    pub width: usize,
    /// Height in pixels
    pub height: usize,
    /// Samples per pixel
    pub bands: usize,
    /// Sample format
    pub format: BandFormat,
    /// Interpretation enum value
    pub interpretation: i32,
}

impl fmt::Display for ImageHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} {} band{} {}",
            self.width,
            self.height,
            self.bands,
            if self.bands == 1 { "" } else { "s" },
            self.format
        )
    }
}

// ============================================================================
// Image Objects
// ============================================================================

/// Register an image. The returned handle holds one reference.
pub fn image_new(data: ImageData) -> ObjectPtr {
    object_new(types::IMAGE, ObjectData::Image(data))
}

/// Run `f` against the pixels of a live image.
pub(crate) fn with_image<R>(
    ptr: ObjectPtr,
    f: impl FnOnce(&ImageData) -> NativeResult<R>,
) -> NativeResult<R> {
    let data = object_data(ptr)?;
    match data.as_image() {
        Some(image) => f(image),
        None => raise(NativeError::type_mismatch("Image", object_type(ptr).name())),
    }
}

/// Create a one-band double matrix image from row-major values.
pub fn image_new_matrix_from_array(
    width: usize,
    height: usize,
    values: &[f64],
) -> NativeResult<ObjectPtr> {
    let data = ImageData::new(width, height, 1, BandFormat::Double, values.to_vec())?
        .with_interpretation(INTERPRETATION_MATRIX);
    Ok(image_new(data))
}

/// Create an image shaped like `template` with one constant band per value.
///
/// The result has the template's width, height, format and interpretation
/// and `values.len()` bands.
pub fn image_new_from_image(template: ObjectPtr, values: &[f64]) -> NativeResult<ObjectPtr> {
    if values.is_empty() {
        return raise(NativeError::out_of_range("constant count", 0));
    }
    let header = image_header(template)?;
    let pixels = values
        .iter()
        .copied()
        .cycle()
        .take(header.width * header.height * values.len())
        .collect();
    let data = ImageData::new(header.width, header.height, values.len(), header.format, pixels)?
        .with_interpretation(header.interpretation);
    Ok(image_new(data))
}

/// Copy an image into a new, private image.
pub fn image_copy_memory(ptr: ObjectPtr) -> NativeResult<ObjectPtr> {
    let copy = with_image(ptr, |image| Ok(image.deep_copy()))?;
    Ok(image_new(copy))
}

/// Read the header of an image.
pub fn image_header(ptr: ObjectPtr) -> NativeResult<ImageHeader> {
    with_image(ptr, |image| Ok(image.header()))
}

/// Copy every sample of an image.
pub fn image_get_pixels(ptr: ObjectPtr) -> NativeResult<Vec<f64>> {
    with_image(ptr, |image| Ok(image.pixels()))
}

/// Read the samples of one pixel.
pub fn image_getpoint(ptr: ObjectPtr, x: usize, y: usize) -> NativeResult<Vec<f64>> {
    with_image(ptr, |image| match image.point(x, y) {
        Some(samples) => Ok(samples),
        None => raise(NativeError::out_of_range("point", format!("({}, {})", x, y))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::error_clear;
    use crate::object::{object_is_alive, object_unref};

    #[test]
    fn test_clip_to_format() {
        assert_eq!(BandFormat::UChar.clip(300.0), 255.0);
        assert_eq!(BandFormat::UChar.clip(-4.0), 0.0);
        assert_eq!(BandFormat::UChar.clip(1.7), 1.0);
        assert_eq!(BandFormat::Char.clip(-200.0), -128.0);
        assert_eq!(BandFormat::Double.clip(1.7), 1.7);
    }

    #[test]
    fn test_format_values_match_enum_table() {
        for format in [
            BandFormat::UChar,
            BandFormat::Char,
            BandFormat::UShort,
            BandFormat::Short,
            BandFormat::UInt,
            BandFormat::Int,
            BandFormat::Float,
            BandFormat::Double,
        ] {
            assert_eq!(BandFormat::from_value(format.value()), Some(format));
            assert!(enum_nick(types::BAND_FORMAT, format.value()).is_some());
        }
        assert_eq!(BandFormat::from_value(7), None);
        assert_eq!(BandFormat::UShort.to_string(), "ushort");
    }

    #[test]
    fn test_new_checks_pixel_count() {
        assert!(ImageData::new(2, 2, 1, BandFormat::UChar, vec![0.0; 3]).is_err());
        assert!(ImageData::new(0, 2, 1, BandFormat::UChar, vec![]).is_err());
        error_clear();
    }

    #[test]
    fn test_matrix_from_array() {
        let matrix = image_new_matrix_from_array(2, 2, &[1.0, 2.0, 3.0, 4.0]).unwrap();
        let header = image_header(matrix).unwrap();
        assert_eq!(header.bands, 1);
        assert_eq!(header.format, BandFormat::Double);
        assert_eq!(header.interpretation, INTERPRETATION_MATRIX);
        assert_eq!(image_getpoint(matrix, 1, 1).unwrap(), vec![4.0]);
        object_unref(matrix);
    }

    #[test]
    fn test_new_from_image_broadcasts_constants() {
        let template = image_new(ImageData::zeros(3, 2, 1, BandFormat::UChar));
        let constant = image_new_from_image(template, &[1.0, 2.0, 300.0]).unwrap();

        let header = image_header(constant).unwrap();
        assert_eq!((header.width, header.height, header.bands), (3, 2, 3));
        assert_eq!(header.format, BandFormat::UChar);
        assert_eq!(image_getpoint(constant, 2, 1).unwrap(), vec![1.0, 2.0, 255.0]);

        object_unref(constant);
        object_unref(template);
    }

    #[test]
    fn test_copy_memory_is_independent() {
        let original = image_new(ImageData::zeros(2, 1, 1, BandFormat::UChar));
        let copy = image_copy_memory(original).unwrap();
        assert_ne!(original, copy);

        with_image(copy, |image| {
            image.update(|_, _, _, _| 9.0);
            Ok(())
        })
        .unwrap();
        assert_eq!(image_get_pixels(original).unwrap(), vec![0.0, 0.0]);
        assert_eq!(image_get_pixels(copy).unwrap(), vec![9.0, 9.0]);

        object_unref(copy);
        object_unref(original);
        assert!(!object_is_alive(original));
    }

    #[test]
    fn test_getpoint_out_of_bounds() {
        let image = image_new(ImageData::zeros(2, 2, 1, BandFormat::UChar));
        assert!(image_getpoint(image, 2, 0).is_err());
        object_unref(image);
        error_clear();
    }
}
