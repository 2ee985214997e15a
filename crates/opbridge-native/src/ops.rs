//! Reference Operations
//!
//! The operation catalogue registered at startup. Each class is declared
//! as data (nickname, flags, arguments in order) plus a build function;
//! the registry knows nothing else about them.
//!
//! Argument order follows the usual convention: the main image input
//! first, then the main output, then the remaining required arguments,
//! then the optional ones.

use crate::error::NativeResult;
use crate::image::{
    image_get_pixels, image_header, image_new, with_image, BandFormat, ImageData, ImageHeader,
};
use crate::object::ObjectPtr;
use crate::operation::{ArgSpec, ArgumentFlags, BuildContext, OperationClass, OperationFlags, Registry};
use crate::types::{self, NativeType};

// ============================================================================
// Declaration Helpers
// ============================================================================

const REQUIRED_INPUT: ArgumentFlags = ArgumentFlags::REQUIRED
    .union(ArgumentFlags::CONSTRUCT)
    .union(ArgumentFlags::INPUT);
const OPTIONAL_INPUT: ArgumentFlags = ArgumentFlags::CONSTRUCT.union(ArgumentFlags::INPUT);
const DEPRECATED_INPUT: ArgumentFlags = OPTIONAL_INPUT.union(ArgumentFlags::DEPRECATED);
const MODIFY_INPUT: ArgumentFlags = REQUIRED_INPUT.union(ArgumentFlags::MODIFY);
const REQUIRED_OUTPUT: ArgumentFlags = ArgumentFlags::REQUIRED
    .union(ArgumentFlags::CONSTRUCT)
    .union(ArgumentFlags::OUTPUT);
const OPTIONAL_OUTPUT: ArgumentFlags = ArgumentFlags::CONSTRUCT.union(ArgumentFlags::OUTPUT);

const fn arg(name: &'static str, type_id: NativeType, flags: ArgumentFlags, blurb: &'static str) -> ArgSpec {
    ArgSpec {
        name,
        blurb,
        type_id,
        flags,
    }
}

fn class(
    nickname: &'static str,
    description: &'static str,
    flags: OperationFlags,
    args: Vec<ArgSpec>,
    build: fn(&mut BuildContext<'_>) -> NativeResult<()>,
) -> OperationClass {
    OperationClass {
        nickname,
        description,
        flags,
        args,
        build,
    }
}

pub(crate) fn register_all(registry: &mut Registry) {
    use OperationFlags as F;

    registry.register(class(
        "black",
        "make a black image",
        F::NONE,
        vec![
            arg("out", types::IMAGE, REQUIRED_OUTPUT, "Output image"),
            arg("width", types::INT, REQUIRED_INPUT, "Image width in pixels"),
            arg("height", types::INT, REQUIRED_INPUT, "Image height in pixels"),
            arg("bands", types::INT, OPTIONAL_INPUT, "Number of bands in image"),
        ],
        black,
    ));
    registry.register(class(
        "invert",
        "invert an image",
        F::NONE,
        vec![
            arg("in", types::IMAGE, REQUIRED_INPUT, "Input image"),
            arg("out", types::IMAGE, REQUIRED_OUTPUT, "Output image"),
        ],
        invert,
    ));
    registry.register(class(
        "linear",
        "calculate (a * in + b)",
        F::NONE,
        vec![
            arg("in", types::IMAGE, REQUIRED_INPUT, "Input image"),
            arg("out", types::IMAGE, REQUIRED_OUTPUT, "Output image"),
            arg("a", types::ARRAY_DOUBLE, REQUIRED_INPUT, "Multiply by this"),
            arg("b", types::ARRAY_DOUBLE, REQUIRED_INPUT, "Add this"),
            arg("uchar", types::BOOLEAN, OPTIONAL_INPUT, "Output should be uchar"),
        ],
        linear,
    ));
    registry.register(class(
        "add",
        "add two images",
        F::NONE,
        vec![
            arg("left", types::IMAGE, REQUIRED_INPUT, "Left-hand image argument"),
            arg("right", types::IMAGE, REQUIRED_INPUT, "Right-hand image argument"),
            arg("out", types::IMAGE, REQUIRED_OUTPUT, "Output image"),
        ],
        add,
    ));
    registry.register(class(
        "avg",
        "find image average",
        F::NONE,
        vec![
            arg("in", types::IMAGE, REQUIRED_INPUT, "Input image"),
            arg("out", types::DOUBLE, REQUIRED_OUTPUT, "Output value"),
        ],
        avg,
    ));
    registry.register(class(
        "max",
        "find image maximum",
        F::NONE,
        vec![
            arg("in", types::IMAGE, REQUIRED_INPUT, "Input image"),
            arg("out", types::DOUBLE, REQUIRED_OUTPUT, "Output value"),
            arg("x", types::INT, OPTIONAL_OUTPUT, "Horizontal position of maximum"),
            arg("y", types::INT, OPTIONAL_OUTPUT, "Vertical position of maximum"),
        ],
        max,
    ));
    registry.register(class(
        "copy",
        "copy an image",
        F::NONE,
        vec![
            arg("in", types::IMAGE, REQUIRED_INPUT, "Input image"),
            arg("out", types::IMAGE, REQUIRED_OUTPUT, "Output image"),
            arg("width", types::INT, OPTIONAL_INPUT, "Image width in pixels"),
            arg("height", types::INT, OPTIONAL_INPUT, "Image height in pixels"),
            arg("bands", types::INT, OPTIONAL_INPUT, "Number of bands in image"),
            arg("format", types::BAND_FORMAT, OPTIONAL_INPUT, "Pixel format in image"),
            arg("interpretation", types::INTERPRETATION, OPTIONAL_INPUT, "Pixel interpretation"),
            arg("swap", types::BOOLEAN, DEPRECATED_INPUT, "Swap bytes in image between little and big-endian"),
        ],
        copy,
    ));
    registry.register(class(
        "cast",
        "cast an image",
        F::NONE,
        vec![
            arg("in", types::IMAGE, REQUIRED_INPUT, "Input image"),
            arg("out", types::IMAGE, REQUIRED_OUTPUT, "Output image"),
            arg("format", types::BAND_FORMAT, REQUIRED_INPUT, "Format to cast to"),
            arg("shift", types::BOOLEAN, OPTIONAL_INPUT, "Shift integer values up and down"),
        ],
        cast,
    ));
    registry.register(class(
        "math",
        "apply a math operation to an image",
        F::NONE,
        vec![
            arg("in", types::IMAGE, REQUIRED_INPUT, "Input image"),
            arg("out", types::IMAGE, REQUIRED_OUTPUT, "Output image"),
            arg("math", types::OPERATION_MATH, REQUIRED_INPUT, "Math to perform"),
        ],
        math,
    ));
    registry.register(class(
        "getpoint",
        "read a point from an image",
        F::NONE,
        vec![
            arg("in", types::IMAGE, REQUIRED_INPUT, "Input image"),
            arg("out-array", types::ARRAY_DOUBLE, REQUIRED_OUTPUT, "Array of output values"),
            arg("x", types::INT, REQUIRED_INPUT, "Point to read"),
            arg("y", types::INT, REQUIRED_INPUT, "Point to read"),
        ],
        getpoint,
    ));
    registry.register(class(
        "bandjoin",
        "bandwise join a set of images",
        F::NONE,
        vec![
            arg("in", types::ARRAY_IMAGE, REQUIRED_INPUT, "Array of input images"),
            arg("out", types::IMAGE, REQUIRED_OUTPUT, "Output image"),
        ],
        bandjoin,
    ));
    registry.register(class(
        "draw_rect",
        "paint a rectangle on an image",
        F::NOCACHE,
        vec![
            arg("image", types::IMAGE, MODIFY_INPUT, "Image to draw on"),
            arg("ink", types::ARRAY_DOUBLE, REQUIRED_INPUT, "Color for pixels"),
            arg("left", types::INT, REQUIRED_INPUT, "Rect to fill"),
            arg("top", types::INT, REQUIRED_INPUT, "Rect to fill"),
            arg("width", types::INT, REQUIRED_INPUT, "Rect to fill"),
            arg("height", types::INT, REQUIRED_INPUT, "Rect to fill"),
            arg("fill", types::BOOLEAN, OPTIONAL_INPUT, "Draw a solid object"),
        ],
        draw_rect,
    ));
    registry.register(class(
        "profile_load",
        "load named ICC profile",
        F::NONE,
        vec![
            arg(
                "name",
                types::STRING,
                REQUIRED_INPUT.union(ArgumentFlags::SET_ONCE),
                "Profile name",
            ),
            arg("profile", types::BLOB, REQUIRED_OUTPUT, "Loaded profile"),
        ],
        profile_load,
    ));
    registry.register(class(
        "rawsave_buffer",
        "write raw image to buffer",
        F::NONE,
        vec![
            arg("in", types::IMAGE, REQUIRED_INPUT, "Image to save"),
            arg("buffer", types::BLOB, REQUIRED_OUTPUT, "Buffer to save to"),
            arg("keep", types::FOREIGN_KEEP, OPTIONAL_INPUT, "Which metadata to retain"),
            arg("strip", types::BOOLEAN, DEPRECATED_INPUT, "Strip all metadata from image"),
        ],
        rawsave_buffer,
    ));
    registry.register(class(
        "rawload_buffer",
        "load raw uchar pixels from a buffer",
        F::NONE,
        vec![
            arg("buffer", types::BLOB, REQUIRED_INPUT, "Buffer to load from"),
            arg("out", types::IMAGE, REQUIRED_OUTPUT, "Output image"),
            arg("width", types::INT, REQUIRED_INPUT, "Image width in pixels"),
            arg("height", types::INT, REQUIRED_INPUT, "Image height in pixels"),
            arg("bands", types::INT, REQUIRED_INPUT, "Number of bands in image"),
        ],
        rawload_buffer,
    ));
}

// ============================================================================
// Pixel Helpers
// ============================================================================

/// Build a new image with `header`'s geometry from transformed samples.
///
/// `f` receives the band index and the sample value.
fn map_image(
    src: ObjectPtr,
    format: BandFormat,
    f: impl Fn(usize, f64) -> f64,
) -> NativeResult<ObjectPtr> {
    let header = image_header(src)?;
    let pixels = image_get_pixels(src)?
        .into_iter()
        .enumerate()
        .map(|(i, sample)| f(i % header.bands, sample))
        .collect();
    new_like(&header, header.bands, format, pixels)
}

fn new_like(
    header: &ImageHeader,
    bands: usize,
    format: BandFormat,
    pixels: Vec<f64>,
) -> NativeResult<ObjectPtr> {
    let mut data = ImageData::new(header.width, header.height, bands, format, pixels)?;
    if bands == header.bands {
        data = data.with_interpretation(header.interpretation);
    }
    Ok(image_new(data))
}

fn positive(ctx: &BuildContext<'_>, name: &str, value: i32) -> NativeResult<usize> {
    if value < 1 {
        return ctx.fail(format!("{} must be at least 1, got {}", name, value));
    }
    Ok(value as usize)
}

/// Larger of two formats; a mixed integer/float pair goes to float.
fn common_format(a: BandFormat, b: BandFormat) -> BandFormat {
    if a.value() >= b.value() {
        a
    } else {
        b
    }
}

/// Per-band constant for band `band` from a 1- or N-element vector.
fn per_band(values: &[f64], band: usize) -> f64 {
    if values.len() == 1 {
        values[0]
    } else {
        values[band]
    }
}

fn check_vector(ctx: &BuildContext<'_>, name: &str, values: &[f64], bands: usize) -> NativeResult<()> {
    if values.len() == 1 || values.len() == bands {
        Ok(())
    } else {
        ctx.fail(format!(
            "vector {} must have 1 or {} elements, has {}",
            name,
            bands,
            values.len()
        ))
    }
}

// ============================================================================
// Operation Bodies
// ============================================================================

fn black(ctx: &mut BuildContext<'_>) -> NativeResult<()> {
    let width = positive(ctx, "width", ctx.int("width")?)?;
    let height = positive(ctx, "height", ctx.int("height")?)?;
    let bands = if ctx.is_set("bands") {
        positive(ctx, "bands", ctx.int("bands")?)?
    } else {
        1
    };
    let out = image_new(ImageData::zeros(width, height, bands, BandFormat::UChar));
    ctx.set_image("out", out)
}

fn invert(ctx: &mut BuildContext<'_>) -> NativeResult<()> {
    let input = ctx.image("in")?;
    let format = image_header(input)?.format;
    let out = match format {
        BandFormat::UChar => map_image(input, format, |_, x| u8::MAX as f64 - x)?,
        BandFormat::UShort => map_image(input, format, |_, x| u16::MAX as f64 - x)?,
        BandFormat::UInt => map_image(input, format, |_, x| u32::MAX as f64 - x)?,
        _ => map_image(input, format, |_, x| -x)?,
    };
    ctx.set_image("out", out)
}

fn linear(ctx: &mut BuildContext<'_>) -> NativeResult<()> {
    let input = ctx.image("in")?;
    let header = image_header(input)?;
    let a = ctx.array_double("a")?;
    let b = ctx.array_double("b")?;
    check_vector(ctx, "a", &a, header.bands)?;
    check_vector(ctx, "b", &b, header.bands)?;

    let format = if ctx.is_set("uchar") && ctx.boolean("uchar")? {
        BandFormat::UChar
    } else if header.format == BandFormat::Double {
        BandFormat::Double
    } else {
        BandFormat::Float
    };
    let out = map_image(input, format, |band, x| per_band(&a, band) * x + per_band(&b, band))?;
    ctx.set_image("out", out)
}

fn add(ctx: &mut BuildContext<'_>) -> NativeResult<()> {
    let left = ctx.image("left")?;
    let right = ctx.image("right")?;
    let lh = image_header(left)?;
    let rh = image_header(right)?;
    if (lh.width, lh.height) != (rh.width, rh.height) {
        return ctx.fail("images must match in size");
    }
    let bands = match (lh.bands, rh.bands) {
        (l, r) if l == r => l,
        (1, r) => r,
        (l, 1) => l,
        (l, r) => return ctx.fail(format!("images must have 1 or the same number of bands, have {} and {}", l, r)),
    };

    let format = match common_format(lh.format, rh.format) {
        BandFormat::UChar => BandFormat::UShort,
        BandFormat::Char => BandFormat::Short,
        BandFormat::UShort => BandFormat::UInt,
        BandFormat::Short => BandFormat::Int,
        other => other,
    };

    let lp = image_get_pixels(left)?;
    let rp = image_get_pixels(right)?;
    let sample = |pixels: &[f64], own_bands: usize, pixel: usize, band: usize| {
        pixels[pixel * own_bands + if own_bands == 1 { 0 } else { band }]
    };
    let pixels = (0..lh.width * lh.height * bands)
        .map(|i| {
            let (pixel, band) = (i / bands, i % bands);
            sample(&lp, lh.bands, pixel, band) + sample(&rp, rh.bands, pixel, band)
        })
        .collect();

    let out = new_like(&lh, bands, format, pixels)?;
    ctx.set_image("out", out)
}

fn avg(ctx: &mut BuildContext<'_>) -> NativeResult<()> {
    let pixels = image_get_pixels(ctx.image("in")?)?;
    let mean = pixels.iter().sum::<f64>() / pixels.len() as f64;
    ctx.set_double("out", mean)
}

fn max(ctx: &mut BuildContext<'_>) -> NativeResult<()> {
    let input = ctx.image("in")?;
    let header = image_header(input)?;
    let pixels = image_get_pixels(input)?;

    let mut best = (0, f64::NEG_INFINITY);
    for (i, &sample) in pixels.iter().enumerate() {
        if sample > best.1 {
            best = (i, sample);
        }
    }
    let pixel = best.0 / header.bands;
    ctx.set_double("out", best.1)?;
    ctx.set_int("x", (pixel % header.width) as i32)?;
    ctx.set_int("y", (pixel / header.width) as i32)
}

fn copy(ctx: &mut BuildContext<'_>) -> NativeResult<()> {
    let input = ctx.image("in")?;
    let header = image_header(input)?;

    let dimension = |ctx: &BuildContext<'_>, name: &str, current: usize| -> NativeResult<usize> {
        if ctx.is_set(name) {
            positive(ctx, name, ctx.int(name)?)
        } else {
            Ok(current)
        }
    };
    let width = dimension(ctx, "width", header.width)?;
    let height = dimension(ctx, "height", header.height)?;
    let bands = dimension(ctx, "bands", header.bands)?;
    if width * height * bands != header.width * header.height * header.bands {
        return ctx.fail(format!(
            "cannot reshape {} to {}x{} {} bands",
            header, width, height, bands
        ));
    }

    let format = if ctx.is_set("format") {
        let value = ctx.enum_value("format")?;
        BandFormat::from_value(value).unwrap_or(header.format)
    } else {
        header.format
    };
    let interpretation = if ctx.is_set("interpretation") {
        ctx.enum_value("interpretation")?
    } else {
        header.interpretation
    };
    if ctx.is_set("swap") && ctx.boolean("swap")? {
        tracing::warn!("copy: swap is deprecated and has no effect on in-memory images");
    }

    let pixels = image_get_pixels(input)?;
    let data = ImageData::new(width, height, bands, format, pixels)?.with_interpretation(interpretation);
    ctx.set_image("out", image_new(data))
}

fn bits(format: BandFormat) -> Option<i32> {
    match format {
        BandFormat::UChar | BandFormat::Char => Some(8),
        BandFormat::UShort | BandFormat::Short => Some(16),
        BandFormat::UInt | BandFormat::Int => Some(32),
        BandFormat::Float | BandFormat::Double => None,
    }
}

fn cast(ctx: &mut BuildContext<'_>) -> NativeResult<()> {
    let input = ctx.image("in")?;
    let from = image_header(input)?.format;
    let value = ctx.enum_value("format")?;
    let to = match BandFormat::from_value(value) {
        Some(format) => format,
        None => return ctx.fail(format!("bad format {}", value)),
    };

    let shift = ctx.is_set("shift") && ctx.boolean("shift")?;
    let scale = match (shift, bits(from), bits(to)) {
        (true, Some(f), Some(t)) => 2f64.powi(t - f),
        _ => 1.0,
    };
    let out = map_image(input, to, |_, x| x * scale)?;
    ctx.set_image("out", out)
}

fn math(ctx: &mut BuildContext<'_>) -> NativeResult<()> {
    let input = ctx.image("in")?;
    let format = match image_header(input)?.format {
        BandFormat::Double => BandFormat::Double,
        _ => BandFormat::Float,
    };
    let f: fn(f64) -> f64 = match ctx.enum_value("math")? {
        0 => |x| x.to_radians().sin(),
        1 => |x| x.to_radians().cos(),
        2 => |x| x.to_radians().tan(),
        3 => |x| x.asin().to_degrees(),
        4 => |x| x.acos().to_degrees(),
        5 => |x| x.atan().to_degrees(),
        6 => f64::ln,
        7 => f64::log10,
        8 => f64::exp,
        9 => |x| 10f64.powf(x),
        other => return ctx.fail(format!("bad math operation {}", other)),
    };
    let out = map_image(input, format, |_, x| f(x))?;
    ctx.set_image("out", out)
}

fn getpoint(ctx: &mut BuildContext<'_>) -> NativeResult<()> {
    let input = ctx.image("in")?;
    let (x, y) = (ctx.int("x")?, ctx.int("y")?);
    let header = image_header(input)?;
    if x < 0 || y < 0 || x as usize >= header.width || y as usize >= header.height {
        return ctx.fail(format!("point ({}, {}) is outside the image", x, y));
    }
    let samples = crate::image::image_getpoint(input, x as usize, y as usize)?;
    ctx.set_array_double("out-array", &samples)
}

fn bandjoin(ctx: &mut BuildContext<'_>) -> NativeResult<()> {
    let images = ctx.array_image("in")?;
    let first = match images.first() {
        Some(&first) => image_header(first)?,
        None => return ctx.fail("no input images"),
    };

    let mut headers = Vec::with_capacity(images.len());
    let mut planes = Vec::with_capacity(images.len());
    for &image in &images {
        let header = image_header(image)?;
        if (header.width, header.height) != (first.width, first.height) {
            return ctx.fail("images must match in size");
        }
        headers.push(header);
        planes.push(image_get_pixels(image)?);
    }

    let bands: usize = headers.iter().map(|h| h.bands).sum();
    let format = headers.iter().map(|h| h.format).fold(first.format, common_format);
    let mut pixels = Vec::with_capacity(first.width * first.height * bands);
    for pixel in 0..first.width * first.height {
        for (header, plane) in headers.iter().zip(&planes) {
            let start = pixel * header.bands;
            pixels.extend_from_slice(&plane[start..start + header.bands]);
        }
    }

    let out = new_like(&first, bands, format, pixels)?;
    ctx.set_image("out", out)
}

fn draw_rect(ctx: &mut BuildContext<'_>) -> NativeResult<()> {
    let image = ctx.image("image")?;
    let ink = ctx.array_double("ink")?;
    let (left, top) = (ctx.int("left")? as i64, ctx.int("top")? as i64);
    let (width, height) = (ctx.int("width")? as i64, ctx.int("height")? as i64);
    let fill = ctx.is_set("fill") && ctx.boolean("fill")?;

    let header = image_header(image)?;
    check_vector(ctx, "ink", &ink, header.bands)?;

    let (right, bottom) = (left + width - 1, top + height - 1);
    with_image(image, |data| {
        data.update(|x, y, band, sample| {
            let (x, y) = (x as i64, y as i64);
            let inside = x >= left && x <= right && y >= top && y <= bottom;
            let edge = x == left || x == right || y == top || y == bottom;
            if inside && (fill || edge) {
                per_band(&ink, band)
            } else {
                sample
            }
        });
        Ok(())
    })
}

const PROFILES: &[(&str, &[u8])] = &[
    ("srgb", b"ICC:sRGB IEC61966-2.1"),
    ("p3", b"ICC:Display P3"),
    ("cmyk", b"ICC:Coated FOGRA39"),
];

fn profile_load(ctx: &mut BuildContext<'_>) -> NativeResult<()> {
    let name = ctx.string("name")?;
    match PROFILES.iter().find(|(known, _)| known.eq_ignore_ascii_case(&name)) {
        Some((_, bytes)) => ctx.set_blob("profile", bytes),
        None => ctx.fail(format!("unable to load profile \"{}\"", name)),
    }
}

fn rawsave_buffer(ctx: &mut BuildContext<'_>) -> NativeResult<()> {
    let input = ctx.image("in")?;
    if image_header(input)?.format != BandFormat::UChar {
        return ctx.fail("image must be uchar");
    }

    // In-memory images carry no metadata, so keep and strip are only validated.
    if ctx.is_set("keep") {
        let keep = ctx.flags("keep")?;
        if keep & !31 != 0 {
            return ctx.fail(format!("bad keep flags {:#x}", keep));
        }
    }
    if ctx.is_set("strip") && ctx.boolean("strip")? {
        tracing::warn!("rawsave_buffer: strip is deprecated, use keep");
    }

    let bytes: Vec<u8> = image_get_pixels(input)?.into_iter().map(|p| p as u8).collect();
    ctx.set_blob("buffer", &bytes)
}

fn rawload_buffer(ctx: &mut BuildContext<'_>) -> NativeResult<()> {
    let bytes = ctx.blob("buffer")?;
    let width = positive(ctx, "width", ctx.int("width")?)?;
    let height = positive(ctx, "height", ctx.int("height")?)?;
    let bands = positive(ctx, "bands", ctx.int("bands")?)?;
    if bytes.len() != width * height * bands {
        return ctx.fail(format!(
            "buffer has {} bytes, expected {}",
            bytes.len(),
            width * height * bands
        ));
    }
    let pixels = bytes.into_iter().map(f64::from).collect();
    let out = image_new(ImageData::new(width, height, bands, BandFormat::UChar, pixels)?);
    ctx.set_image("out", out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::cache_operation_build;
    use crate::error::{error_buffer, error_clear};
    use crate::image::{image_getpoint, image_new_from_image};
    use crate::object::{object_is_alive, object_unref};
    use crate::operation::{object_get_property, object_set_property, operation_class, operation_new};
    use crate::value::*;

    /// Run `nickname` with the given inputs and return its `out` image.
    fn run_image(nickname: &str, inputs: &mut [(&str, NativeValue)]) -> NativeResult<ObjectPtr> {
        let op = operation_new(nickname)?;
        for (name, value) in inputs.iter() {
            object_set_property(op, name, value)?;
        }
        let result = cache_operation_build(op).and_then(|built| {
            let mut out = NativeValue::new();
            value_init(&mut out, types::IMAGE)?;
            let read = object_get_property(built, "out", &mut out);
            let image = value_get_object(&out).ok().flatten();
            if let Some(image) = image {
                crate::object::object_ref(image);
            }
            value_unset(&mut out);
            object_unref(built);
            read.map(|_| image)
        });
        object_unref(op);
        for (_, value) in inputs.iter_mut() {
            value_unset(value);
        }
        result.map(|image| image.expect("operation produced an image"))
    }

    fn image_value(image: ObjectPtr) -> NativeValue {
        let mut value = NativeValue::new();
        value_init(&mut value, types::IMAGE).unwrap();
        value_set_object(&mut value, Some(image)).unwrap();
        value
    }

    fn int_value(n: i32) -> NativeValue {
        let mut value = NativeValue::new();
        value_init(&mut value, types::INT).unwrap();
        value_set_int(&mut value, n).unwrap();
        value
    }

    fn doubles(values: &[f64]) -> NativeValue {
        let mut value = NativeValue::new();
        value_init(&mut value, types::ARRAY_DOUBLE).unwrap();
        value_set_array_double(&mut value, values).unwrap();
        value
    }

    fn constant(width: usize, height: usize, values: &[f64]) -> ObjectPtr {
        let template = image_new(ImageData::zeros(width, height, 1, BandFormat::UChar));
        let image = image_new_from_image(template, values).unwrap();
        object_unref(template);
        image
    }

    #[test]
    fn test_every_class_has_an_output() {
        for name in ["black", "invert", "linear", "add", "avg", "max", "copy", "cast", "math",
                     "getpoint", "bandjoin", "profile_load", "rawsave_buffer", "rawload_buffer"] {
            let class = operation_class(name).unwrap();
            assert!(
                class.args.iter().any(|a| a.flags.contains(ArgumentFlags::OUTPUT)),
                "{} has no output",
                name
            );
        }
        let draw = operation_class("draw_rect").unwrap();
        assert!(draw.flags.contains(OperationFlags::NOCACHE));
    }

    #[test]
    fn test_black() {
        let out = run_image(
            "black",
            &mut [("width", int_value(4)), ("height", int_value(3)), ("bands", int_value(2))],
        )
        .unwrap();
        let header = image_header(out).unwrap();
        assert_eq!((header.width, header.height, header.bands), (4, 3, 2));
        assert!(image_get_pixels(out).unwrap().iter().all(|&p| p == 0.0));
        object_unref(out);
    }

    #[test]
    fn test_black_rejects_bad_size() {
        error_clear();
        let result = run_image("black", &mut [("width", int_value(0)), ("height", int_value(3))]);
        assert!(result.is_err());
        assert!(error_buffer().starts_with("black: width must be at least 1"));
        error_clear();
    }

    #[test]
    fn test_invert_uchar() {
        let input = constant(2, 2, &[10.0]);
        let out = run_image("invert", &mut [("in", image_value(input))]).unwrap();
        assert_eq!(image_getpoint(out, 1, 1).unwrap(), vec![245.0]);
        object_unref(out);
        object_unref(input);
    }

    #[test]
    fn test_linear_per_band() {
        let input = constant(1, 1, &[1.0, 2.0]);
        let out = run_image(
            "linear",
            &mut [("in", image_value(input)), ("a", doubles(&[2.0, 3.0])), ("b", doubles(&[0.5]))],
        )
        .unwrap();
        assert_eq!(image_getpoint(out, 0, 0).unwrap(), vec![2.5, 6.5]);
        assert_eq!(image_header(out).unwrap().format, BandFormat::Float);
        object_unref(out);

        let err = run_image(
            "linear",
            &mut [("in", image_value(input)), ("a", doubles(&[1.0, 2.0, 3.0])), ("b", doubles(&[0.0]))],
        );
        assert!(err.is_err());
        object_unref(input);
        error_clear();
    }

    #[test]
    fn test_add_promotes_and_checks_size() {
        let left = constant(2, 2, &[200.0]);
        let right = constant(2, 2, &[100.0]);
        let out = run_image("add", &mut [("left", image_value(left)), ("right", image_value(right))]).unwrap();
        assert_eq!(image_header(out).unwrap().format, BandFormat::UShort);
        assert_eq!(image_getpoint(out, 0, 0).unwrap(), vec![300.0]);
        object_unref(out);

        let small = constant(1, 1, &[1.0]);
        let err = run_image("add", &mut [("left", image_value(left)), ("right", image_value(small))]);
        assert!(err.is_err());
        error_clear();

        for image in [left, right, small] {
            object_unref(image);
        }
    }

    #[test]
    fn test_bandjoin() {
        let a = constant(2, 1, &[1.0]);
        let b = constant(2, 1, &[2.0, 3.0]);
        let mut array = NativeValue::new();
        value_init(&mut array, types::ARRAY_IMAGE).unwrap();
        value_set_array_image(&mut array, vec![crate::object::object_ref(a), crate::object::object_ref(b)]).unwrap();

        let out = run_image("bandjoin", &mut [("in", array)]).unwrap();
        assert_eq!(image_getpoint(out, 1, 0).unwrap(), vec![1.0, 2.0, 3.0]);
        object_unref(out);
        object_unref(a);
        object_unref(b);
    }

    #[test]
    fn test_draw_rect_modifies_in_place() {
        let image = image_new(ImageData::zeros(3, 3, 1, BandFormat::UChar));
        run_draw(image, false);
        assert_eq!(
            image_get_pixels(image).unwrap(),
            vec![9.0, 9.0, 9.0, 9.0, 0.0, 9.0, 9.0, 9.0, 9.0]
        );
        run_draw(image, true);
        assert!(image_get_pixels(image).unwrap().iter().all(|&p| p == 9.0));
        object_unref(image);
        assert!(!object_is_alive(image));
    }

    fn run_draw(image: ObjectPtr, fill: bool) {
        let op = operation_new("draw_rect").unwrap();
        let mut inputs = vec![
            ("image", image_value(image)),
            ("ink", doubles(&[9.0])),
            ("left", int_value(0)),
            ("top", int_value(0)),
            ("width", int_value(3)),
            ("height", int_value(3)),
        ];
        if fill {
            let mut value = NativeValue::new();
            value_init(&mut value, types::BOOLEAN).unwrap();
            value_set_boolean(&mut value, true).unwrap();
            inputs.push(("fill", value));
        }
        for (name, value) in &inputs {
            object_set_property(op, name, value).unwrap();
        }
        let built = cache_operation_build(op).unwrap();
        assert_eq!(built, op);
        object_unref(built);
        object_unref(op);
        for (_, value) in &mut inputs {
            value_unset(value);
        }
    }

    #[test]
    fn test_raw_buffer_round_trip() {
        let input = constant(2, 1, &[7.0, 8.0]);
        let op = operation_new("rawsave_buffer").unwrap();
        let mut value = image_value(input);
        object_set_property(op, "in", &value).unwrap();
        value_unset(&mut value);
        let built = cache_operation_build(op).unwrap();

        let mut buffer = NativeValue::new();
        value_init(&mut buffer, types::BLOB).unwrap();
        object_get_property(built, "buffer", &mut buffer).unwrap();
        assert_eq!(value_get_blob(&buffer).unwrap(), vec![7, 8, 7, 8]);
        object_unref(built);
        object_unref(op);

        let out = run_image(
            "rawload_buffer",
            &mut [("buffer", buffer), ("width", int_value(2)), ("height", int_value(1)), ("bands", int_value(2))],
        )
        .unwrap();
        assert_eq!(image_get_pixels(out).unwrap(), image_get_pixels(input).unwrap());
        object_unref(out);
        object_unref(input);
    }

    #[test]
    fn test_math_degrees() {
        let input = constant(1, 1, &[90.0]);
        let mut which = NativeValue::new();
        value_init(&mut which, types::OPERATION_MATH).unwrap();
        value_set_enum(&mut which, 0).unwrap();
        let out = run_image("math", &mut [("in", image_value(input)), ("math", which)]).unwrap();
        let samples = image_getpoint(out, 0, 0).unwrap();
        assert!((samples[0] - 1.0).abs() < 1e-6);
        object_unref(out);
        object_unref(input);
    }
}
