//! Constant Coercion
//!
//! Image arguments also accept constants. A constant is turned into an
//! image shaped like a *match image*, the first image among the call's
//! arguments:
//!
//! - an image is used as-is
//! - a rectangular 2D numeric array becomes a one-band double matrix,
//!   with or without a match image
//! - a number, or a 1D array of numbers, becomes a constant image the
//!   size and format of the match image with one band per number

use crate::error::{BridgeError, BridgeResult};
use crate::image::Image;
use crate::value::Value;

/// Find the match image: the receiver, then the first image found
/// depth-first through the arguments.
pub fn find_match_image<'a>(receiver: Option<&'a Image>, args: &'a [Value]) -> Option<&'a Image> {
    receiver.or_else(|| args.iter().find_map(first_image))
}

fn first_image(value: &Value) -> Option<&Image> {
    match value {
        Value::Image(image) => Some(image),
        Value::Array(items) => items.iter().find_map(first_image),
        _ => None,
    }
}

/// Turn `value` into an image, using `match_image` as the template.
pub fn imageize(match_image: Option<&Image>, value: &Value) -> BridgeResult<Image> {
    match value {
        Value::Image(image) => return Ok(image.clone()),
        Value::Array(rows) if rows.iter().any(|row| matches!(row, Value::Array(_))) => {
            let (width, height, cells) = matrix_cells(rows)?;
            return Image::new_matrix(width, height, &cells);
        }
        _ => {}
    }
    let Some(match_image) = match_image else {
        return Err(BridgeError::not_imageizable(value.type_name()));
    };

    match value {
        Value::Array(items) => {
            let values = numbers(items).ok_or_else(|| {
                BridgeError::unsupported("cannot make an image from a non-numeric array")
            })?;
            if values.is_empty() {
                return Err(BridgeError::unsupported("cannot make an image from an empty array"));
            }
            match_image.new_from_image(&values)
        }
        scalar => {
            let value = scalar.as_double().ok_or_else(|| {
                BridgeError::unsupported(format!("cannot make an image from {}", scalar.type_name()))
            })?;
            match_image.new_from_image(&[value])
        }
    }
}

/// Imageize every element of an array argument.
pub fn imageize_each(match_image: Option<&Image>, value: &Value) -> BridgeResult<Vec<Image>> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| imageize(match_image, item))
            .collect(),
        single => Ok(vec![imageize(match_image, single)?]),
    }
}

/// Flatten a rectangular 2D numeric array, row-major.
fn matrix_cells(rows: &[Value]) -> BridgeResult<(usize, usize, Vec<f64>)> {
    let ragged = || BridgeError::unsupported("cannot make an image from a ragged array");

    let mut width = None;
    let mut cells = Vec::new();
    for row in rows {
        let items = row.as_array().ok_or_else(ragged)?;
        match width {
            None => width = Some(items.len()),
            Some(w) if w != items.len() => return Err(ragged()),
            Some(_) => {}
        }
        let values = numbers(items).ok_or_else(|| {
            BridgeError::unsupported("cannot make an image from a non-numeric array")
        })?;
        cells.extend(values);
    }

    match width {
        Some(width) if width > 0 => Ok((width, rows.len(), cells)),
        _ => Err(BridgeError::unsupported("cannot make an image from an empty array")),
    }
}

fn numbers(items: &[Value]) -> Option<Vec<f64>> {
    items
        .iter()
        .map(|item| if item.is_numeric() { item.as_double() } else { None })
        .collect()
}
