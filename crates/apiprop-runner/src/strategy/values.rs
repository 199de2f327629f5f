//! JSON Schema → `serde_json::Value` drawn from a [`ChoiceStream`]
//!
//! Handles the OpenAPI 3.x / Swagger 2 / JSON Schema subset the catalog emits:
//! string, integer, number, boolean, array, object, enum, const, anyOf, oneOf,
//! allOf and nullability. `$ref` is already inlined by the catalog.
//!
//! [`draw`] stays inside the schema. [`draw_boundary`] steps just outside it:
//! one past a numeric bound, one character or item too few or too many, or a
//! value missing from an enum.

use apiprop_core::catalog::is_nullable;
use serde_json::{Map, Value, json};

use super::choice::{ChoiceStream, FLOAT_LIMIT};

/// Maximum recursion depth for schema traversal.
const MAX_DEPTH: u32 = 20;

/// Probability of drawing `null` for a nullable schema.
const NULL_PROBABILITY: f64 = 0.1;

/// Probability of including an optional object property.
const OPTIONAL_PROBABILITY: f64 = 0.5;

const DEFAULT_MAX_LENGTH: usize = 20;
const DEFAULT_MAX_ITEMS: usize = 3;

/// Widest span above the lower bound for generated strings and arrays.
const MAX_EXTRA_LENGTH: usize = 100;

/// Longest string or array the generator builds.
pub const MAX_LENGTH: usize = 10_000;

/// First character is the simplest.
const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Stand-in for a value outside an enum.
const OUTSIDE_ENUM: &str = "__not_in_enum__";

/// A schema no value can be drawn for.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct Unsatisfiable(pub String);

/// Draw a value conforming to `schema`.
///
/// # Errors
///
/// Returns [`Unsatisfiable`] when the schema's constraints cannot be met, for
/// example a `minLength` beyond [`MAX_LENGTH`] or a `multipleOf` with no
/// multiple between the bounds.
pub fn draw(schema: &Value, stream: &mut ChoiceStream) -> Result<Value, Unsatisfiable> {
    draw_inner(schema, stream, 0)
}

fn draw_inner(
    schema: &Value,
    stream: &mut ChoiceStream,
    depth: u32,
) -> Result<Value, Unsatisfiable> {
    if depth > MAX_DEPTH {
        return Ok(Value::Null);
    }

    if is_nullable(schema) && stream.coin(NULL_PROBABILITY) {
        return Ok(Value::Null);
    }

    if let Some(constant) = schema.get("const") {
        return Ok(constant.clone());
    }

    // enum
    if let Some(values) = schema
        .get("enum")
        .and_then(Value::as_array)
        .filter(|v| !v.is_empty())
    {
        return Ok(values[stream.index(values.len())].clone());
    }

    // anyOf / oneOf: pick one non-null variant
    for key in ["anyOf", "oneOf"] {
        if let Some(variants) = schema.get(key).and_then(Value::as_array) {
            let non_null: Vec<&Value> = variants
                .iter()
                .filter(|s| s.get("type").and_then(Value::as_str) != Some("null"))
                .collect();
            if non_null.is_empty() {
                return Ok(Value::Null);
            }
            let picked = non_null[stream.index(non_null.len())];
            return draw_inner(picked, stream, depth + 1);
        }
    }

    // allOf: merge the parts into one schema
    if let Some(parts) = schema.get("allOf").and_then(Value::as_array) {
        return draw_inner(&merge_all_of(schema, parts), stream, depth + 1);
    }

    match primary_type(schema) {
        Some("string") => draw_string(schema, stream),
        Some("integer") => draw_integer(schema, stream),
        Some("number") => draw_number(schema, stream),
        Some("boolean") => Ok(Value::Bool(stream.coin(0.5))),
        Some("array") => draw_array(schema, stream, depth + 1),
        Some("object") => draw_object(schema, stream, depth + 1),
        Some("null") => Ok(Value::Null),
        _ => {
            // Infer from structure
            if schema.get("properties").is_some() {
                draw_object(schema, stream, depth + 1)
            } else if schema.get("items").is_some() {
                draw_array(schema, stream, depth + 1)
            } else {
                draw_string(schema, stream)
            }
        }
    }
}

/// `type` as a string, or the first non-null member of a `type` array.
fn primary_type(schema: &Value) -> Option<&str> {
    match schema.get("type")? {
        Value::String(t) => Some(t),
        Value::Array(types) => types
            .iter()
            .filter_map(Value::as_str)
            .find(|t| *t != "null"),
        _ => None,
    }
}

fn merge_all_of(schema: &Value, parts: &[Value]) -> Value {
    let mut merged = Map::new();
    let mut properties = Map::new();
    let mut required: Vec<Value> = Vec::new();

    let own = schema.as_object().into_iter().flatten();
    let nested = parts.iter().filter_map(Value::as_object).flatten();
    for (key, value) in own.chain(nested) {
        match key.as_str() {
            "allOf" => {}
            "properties" => {
                if let Some(props) = value.as_object() {
                    properties.extend(props.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
            }
            "required" => {
                for name in value.as_array().into_iter().flatten() {
                    if !required.contains(name) {
                        required.push(name.clone());
                    }
                }
            }
            _ => {
                merged.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
    }
    if !properties.is_empty() {
        merged.insert("properties".into(), Value::Object(properties));
        merged.entry("type").or_insert_with(|| json!("object"));
    }
    if !required.is_empty() {
        merged.insert("required".into(), Value::Array(required));
    }
    Value::Object(merged)
}

fn draw_string(schema: &Value, stream: &mut ChoiceStream) -> Result<Value, Unsatisfiable> {
    let format = schema.get("format").and_then(Value::as_str);
    let value = match format {
        Some("email") => format!("user{}@example.com", stream.integer(0, 9999)),
        Some("uri" | "url") => format!("https://example.com/{}", alnum(stream, 0, 8)),
        Some("date") => draw_date(stream),
        Some("date-time") => format!(
            "{}T{:02}:{:02}:{:02}Z",
            draw_date(stream),
            stream.integer(0, 23),
            stream.integer(0, 59),
            stream.integer(0, 59),
        ),
        Some("uuid") => format!(
            "{:08x}-{:04x}-4{:03x}-{:04x}-{:012x}",
            stream.integer(0, 0xFFFF_FFFF),
            stream.integer(0, 0xFFFF),
            stream.integer(0, 0x0FFF),
            stream.integer(0, 0x3FFF) | 0x8000,
            stream.integer(0, 0xFFFF_FFFF_FFFF),
        ),
        _ => {
            let (min, max) = length_bounds(schema, "minLength", "maxLength", DEFAULT_MAX_LENGTH)?;
            alnum(stream, min, max)
        }
    };
    Ok(Value::String(value))
}

/// Inclusive length bounds, capped at [`MAX_LENGTH`] and at
/// `min + MAX_EXTRA_LENGTH`.
fn length_bounds(
    schema: &Value,
    min_key: &str,
    max_key: &str,
    default_max: usize,
) -> Result<(usize, usize), Unsatisfiable> {
    let min = uint(schema, min_key).unwrap_or(0);
    if min > MAX_LENGTH {
        return Err(Unsatisfiable(format!(
            "{min_key} {min} exceeds the generator limit of {MAX_LENGTH}"
        )));
    }
    let declared_max = uint(schema, max_key);
    if let Some(max) = declared_max.filter(|max| *max < min) {
        return Err(Unsatisfiable(format!("{max_key} {max} is below {min_key} {min}")));
    }
    let max = declared_max
        .unwrap_or(default_max.max(min))
        .min(min.saturating_add(MAX_EXTRA_LENGTH))
        .min(MAX_LENGTH);
    Ok((min, max))
}

fn draw_date(stream: &mut ChoiceStream) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        stream.integer(1970, 2100),
        stream.integer(1, 12),
        stream.integer(1, 28)
    )
}

fn alnum(stream: &mut ChoiceStream, min: usize, max: usize) -> String {
    let len = stream.length(min, max);
    (0..len)
        .map(|_| char::from(ALPHABET[stream.index(ALPHABET.len())]))
        .collect()
}

fn draw_integer(schema: &Value, stream: &mut ChoiceStream) -> Result<Value, Unsatisfiable> {
    let (min, max) = integer_bounds(schema);
    match schema.get("multipleOf").and_then(Value::as_i64) {
        Some(step) if step > 0 => {
            let lo = min.div_euclid(step) + i64::from(min.rem_euclid(step) != 0);
            let hi = max.div_euclid(step);
            if lo > hi {
                return Err(Unsatisfiable(format!(
                    "no multiple of {step} between {min} and {max}"
                )));
            }
            Ok(Value::Number(stream.integer(lo, hi).saturating_mul(step).into()))
        }
        _ => Ok(Value::Number(stream.integer(min, max).into())),
    }
}

/// Declared inclusive bounds, exclusive forms folded in.
fn declared_integer_bounds(schema: &Value) -> (Option<i64>, Option<i64>) {
    let bound = |key: &str, round: fn(f64) -> f64| {
        schema
            .get(key)
            .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| round(f) as i64)))
    };
    let mut min = bound("minimum", f64::ceil);
    let mut max = bound("maximum", f64::floor);

    // OpenAPI 3.0 boolean form, then JSON Schema numeric form
    if schema.get("exclusiveMinimum").and_then(Value::as_bool) == Some(true) {
        min = min.map(|m| m.saturating_add(1));
    } else if let Some(m) = bound("exclusiveMinimum", f64::floor) {
        min = Some(min.map_or(m.saturating_add(1), |cur| cur.max(m.saturating_add(1))));
    }
    if schema.get("exclusiveMaximum").and_then(Value::as_bool) == Some(true) {
        max = max.map(|m| m.saturating_sub(1));
    } else if let Some(m) = bound("exclusiveMaximum", f64::ceil) {
        max = Some(max.map_or(m.saturating_sub(1), |cur| cur.min(m.saturating_sub(1))));
    }
    (min, max)
}

/// Inclusive bounds, defaulting to the signed 32-bit range around any one-sided
/// constraint.
pub(crate) fn integer_bounds(schema: &Value) -> (i64, i64) {
    let span = i64::from(i32::MAX);
    match declared_integer_bounds(schema) {
        (Some(lo), Some(hi)) => (lo, hi.max(lo)),
        (Some(lo), None) => (lo, lo.saturating_add(span).max(span)),
        (None, Some(hi)) => (hi.saturating_sub(span).min(i64::from(i32::MIN)), hi),
        (None, None) => (i64::from(i32::MIN), span),
    }
}

/// One declared float bound and whether it is exclusive.
#[derive(Debug, Clone, Copy)]
struct Limit {
    value: f64,
    exclusive: bool,
}

/// Declared float bounds. The numeric exclusive form wins over the inclusive
/// one; the OpenAPI 3.0 boolean form marks the inclusive one exclusive.
fn number_limits(schema: &Value) -> (Option<Limit>, Option<Limit>) {
    let get = |key: &str| schema.get(key).and_then(Value::as_f64).filter(|f| f.is_finite());
    let flagged = |key: &str| schema.get(key).and_then(Value::as_bool) == Some(true);
    let limit = |inclusive: &str, exclusive: &str| match get(exclusive) {
        Some(value) => Some(Limit {
            value,
            exclusive: true,
        }),
        None => get(inclusive).map(|value| Limit {
            value,
            exclusive: flagged(exclusive),
        }),
    };
    (
        limit("minimum", "exclusiveMinimum"),
        limit("maximum", "exclusiveMaximum"),
    )
}

fn draw_number(schema: &Value, stream: &mut ChoiceStream) -> Result<Value, Unsatisfiable> {
    let span = f64::from(i32::MAX);
    let (min, max) = number_limits(schema);
    let min = min.map(|l| if l.exclusive { next_up(l.value) } else { l.value });
    let max = max.map(|l| if l.exclusive { next_down(l.value) } else { l.value });
    if min.is_some_and(|m| m > FLOAT_LIMIT) || max.is_some_and(|m| m < -FLOAT_LIMIT) {
        return Err(Unsatisfiable(format!(
            "number bounds lie beyond the generator limit of {FLOAT_LIMIT:e}"
        )));
    }
    let (lo, hi) = match (min, max) {
        (Some(lo), Some(hi)) => (lo, hi),
        (Some(lo), None) => (lo, lo + span),
        (None, Some(hi)) => (hi - span, hi),
        (None, None) => (-span, span),
    };
    Ok(json!(stream.float(lo, hi)))
}

fn next_up(x: f64) -> f64 {
    x + f64::EPSILON * x.abs().max(1.0)
}

fn next_down(x: f64) -> f64 {
    x - f64::EPSILON * x.abs().max(1.0)
}

fn items_schema(schema: &Value) -> Value {
    schema
        .get("items")
        .cloned()
        .unwrap_or_else(|| json!({"type": "string"}))
}

fn draw_array(
    schema: &Value,
    stream: &mut ChoiceStream,
    depth: u32,
) -> Result<Value, Unsatisfiable> {
    let (min, max) = length_bounds(schema, "minItems", "maxItems", DEFAULT_MAX_ITEMS)?;
    let count = stream.length(min, max);
    draw_items(&items_schema(schema), count, stream, depth)
}

fn draw_items(
    items: &Value,
    count: usize,
    stream: &mut ChoiceStream,
    depth: u32,
) -> Result<Value, Unsatisfiable> {
    (0..count)
        .map(|_| draw_inner(items, stream, depth))
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
}

fn required_names(schema: &Value) -> Vec<&str> {
    schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

fn draw_object(
    schema: &Value,
    stream: &mut ChoiceStream,
    depth: u32,
) -> Result<Value, Unsatisfiable> {
    let required = required_names(schema);
    let mut obj = Map::new();
    if let Some(props) = schema.get("properties").and_then(Value::as_object) {
        for (key, prop_schema) in props {
            if required.contains(&key.as_str()) || stream.coin(OPTIONAL_PROBABILITY) {
                obj.insert(key.clone(), draw_inner(prop_schema, stream, depth)?);
            }
        }
    }
    Ok(Value::Object(obj))
}

fn uint(schema: &Value, key: &str) -> Option<usize> {
    schema
        .get(key)
        .and_then(Value::as_u64)
        .map(|v| usize::try_from(v).unwrap_or(usize::MAX))
}

/// One way of stepping just outside a schema.
#[derive(Debug, Clone, PartialEq)]
enum Crossing {
    /// A fixed value: one past a numeric bound, or outside an enum
    Value(Value),
    StringLength(usize),
    ArrayLength(usize),
    /// Object whose named property is crossed, the rest drawn normally
    Property(String, Box<Crossing>),
}

/// How many distinct crossings [`draw_boundary`] can pick from for `schema`.
/// Zero when the schema declares nothing to cross.
#[must_use]
pub fn boundary_count(schema: &Value) -> usize {
    crossings(schema, 0).len()
}

/// Draw a value just outside `schema`, using crossing number `pick` (clamped
/// into range).
///
/// # Errors
///
/// Returns [`Unsatisfiable`] when the schema has no crossing or the rest of
/// the value cannot be drawn.
pub fn draw_boundary(
    schema: &Value,
    pick: usize,
    stream: &mut ChoiceStream,
) -> Result<Value, Unsatisfiable> {
    let mut all = crossings(schema, 0);
    if all.is_empty() {
        return Err(Unsatisfiable("schema declares no bound to cross".into()));
    }
    let crossing = all.swap_remove(pick.min(all.len() - 1));
    cross(schema, crossing, stream, 0)
}

fn crossings(schema: &Value, depth: u32) -> Vec<Crossing> {
    if depth > MAX_DEPTH {
        return Vec::new();
    }
    if let Some(parts) = schema.get("allOf").and_then(Value::as_array) {
        return crossings(&merge_all_of(schema, parts), depth + 1);
    }
    if ["const", "anyOf", "oneOf"].iter().any(|k| schema.get(*k).is_some()) {
        return Vec::new();
    }
    if let Some(values) = schema
        .get("enum")
        .and_then(Value::as_array)
        .filter(|v| !v.is_empty())
    {
        let outsider = json!(OUTSIDE_ENUM);
        if values.contains(&outsider) {
            return Vec::new();
        }
        return vec![Crossing::Value(outsider)];
    }

    match primary_type(schema) {
        Some("integer") => {
            let (min, max) = declared_integer_bounds(schema);
            [
                min.and_then(|m| m.checked_sub(1)),
                max.and_then(|m| m.checked_add(1)),
            ]
            .into_iter()
            .flatten()
            .map(|v| Crossing::Value(json!(v)))
            .collect()
        }
        Some("number") => {
            let (min, max) = number_limits(schema);
            let below = min.map(|l| if l.exclusive { l.value } else { next_down(l.value) });
            let above = max.map(|l| if l.exclusive { l.value } else { next_up(l.value) });
            [below, above]
                .into_iter()
                .flatten()
                .filter(|v| v.is_finite())
                .map(|v| Crossing::Value(json!(v)))
                .collect()
        }
        Some("string") => length_crossings(schema, "minLength", "maxLength")
            .into_iter()
            .map(Crossing::StringLength)
            .collect(),
        Some("array") => length_crossings(schema, "minItems", "maxItems")
            .into_iter()
            .map(Crossing::ArrayLength)
            .collect(),
        Some("object") => property_crossings(schema, depth),
        None if schema.get("properties").is_some() => property_crossings(schema, depth),
        _ => Vec::new(),
    }
}

/// One below the declared minimum and one above the declared maximum, when
/// those lengths are buildable.
fn length_crossings(schema: &Value, min_key: &str, max_key: &str) -> Vec<usize> {
    let below = uint(schema, min_key)
        .filter(|m| (1..=MAX_LENGTH + 1).contains(m))
        .map(|m| m - 1);
    let above = uint(schema, max_key)
        .filter(|m| *m < MAX_LENGTH)
        .map(|m| m + 1);
    below.into_iter().chain(above).collect()
}

fn property_crossings(schema: &Value, depth: u32) -> Vec<Crossing> {
    let Some(props) = schema.get("properties").and_then(Value::as_object) else {
        return Vec::new();
    };
    props
        .iter()
        .flat_map(|(name, prop)| {
            crossings(prop, depth + 1)
                .into_iter()
                .map(move |c| Crossing::Property(name.clone(), Box::new(c)))
        })
        .collect()
}

fn cross(
    schema: &Value,
    crossing: Crossing,
    stream: &mut ChoiceStream,
    depth: u32,
) -> Result<Value, Unsatisfiable> {
    if let Some(parts) = schema.get("allOf").and_then(Value::as_array) {
        return cross(&merge_all_of(schema, parts), crossing, stream, depth + 1);
    }
    match crossing {
        Crossing::Value(value) => Ok(value),
        Crossing::StringLength(len) => Ok(Value::String(alnum(stream, len, len))),
        Crossing::ArrayLength(len) => {
            let count = stream.length(len, len);
            draw_items(&items_schema(schema), count, stream, depth + 1)
        }
        Crossing::Property(name, inner) => {
            let required = required_names(schema);
            let mut inner = Some(*inner);
            let mut obj = Map::new();
            let props = schema.get("properties").and_then(Value::as_object);
            for (key, prop_schema) in props.into_iter().flatten() {
                if *key == name {
                    if let Some(crossing) = inner.take() {
                        obj.insert(key.clone(), cross(prop_schema, crossing, stream, depth + 1)?);
                    }
                } else if required.contains(&key.as_str()) || stream.coin(OPTIONAL_PROBABILITY) {
                    obj.insert(key.clone(), draw_inner(prop_schema, stream, depth + 1)?);
                }
            }
            Ok(Value::Object(obj))
        }
    }
}
