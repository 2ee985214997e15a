//! Command-line value syntax
//!
//! Arguments are parsed into host values:
//!
//! - `true` / `false`: bool
//! - `42`, `-3`: int
//! - `0.5`, `1e3`: double
//! - `1,2,3`: array of the above
//! - `image:WxH[xB][=V]`: uchar image filled with `V` (default 0)
//! - anything else: string

use opbridge::{BandFormat, BridgeResult, Image, Value};

/// Parse one command-line value.
pub fn parse_value(text: &str) -> BridgeResult<Value> {
    if let Some(spec) = text.strip_prefix("image:") {
        return parse_image(spec).map(Value::Image);
    }
    if text.contains(',') {
        return Ok(Value::Array(text.split(',').map(|item| parse_scalar(item.trim())).collect()));
    }
    Ok(parse_scalar(text))
}

fn parse_scalar(text: &str) -> Value {
    match text {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => {
            if let Ok(n) = text.parse::<i64>() {
                Value::Int(n)
            } else if let Ok(d) = text.parse::<f64>() {
                Value::Double(d)
            } else {
                Value::String(text.into())
            }
        }
    }
}

fn parse_image(spec: &str) -> BridgeResult<Image> {
    let bad = || opbridge::BridgeError::unsupported(format!("bad image spec \"{}\", expected WxH[xB][=V]", spec));

    let (shape, fill) = match spec.split_once('=') {
        Some((shape, fill)) => (shape, fill.parse::<f64>().map_err(|_| bad())?),
        None => (spec, 0.0),
    };
    let dims = shape
        .split('x')
        .map(|d| d.parse::<usize>().map_err(|_| bad()))
        .collect::<BridgeResult<Vec<_>>>()?;
    let (width, height, bands) = match dims.as_slice() {
        [w, h] => (*w, *h, 1),
        [w, h, b] => (*w, *h, *b),
        _ => return Err(bad()),
    };

    let pixels = vec![fill; width * height * bands];
    Image::from_memory(width, height, bands, BandFormat::UChar, pixels)
}

/// Split `name=value` into its name and parsed value.
pub fn parse_option(text: &str) -> Result<(String, Value), String> {
    let (name, value) = text
        .split_once('=')
        .ok_or_else(|| format!("option \"{}\" is not name=value", text))?;
    let value = parse_value(value).map_err(|e| e.to_string())?;
    Ok((name.to_string(), value))
}

/// Render a result for the terminal. Images print as their header.
pub fn render(value: &Value) -> String {
    match value {
        Value::Image(image) => image.header().to_string(),
        Value::Bytes(bytes) => format!("<{} bytes>", bytes.len()),
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(render).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Dict(map) => {
            let items: Vec<String> = map
                .iter()
                .map(|(key, item)| format!("{}: {}", key, render(item)))
                .collect();
            format!("{{{}}}", items.join(", "))
        }
        other => other.to_string(),
    }
}
