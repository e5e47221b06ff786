//! Rendering decoded messages as JSON text.
//!
//! Declared fields are keyed by name, anything the schema doesn't explain is keyed by its field
//! number. Repeated fields render as arrays and map fields as objects. Enum values use their
//! names when defined and bytes are base64 encoded.

use crate::decode::*;
use crate::schema::*;
use base64::prelude::*;
use serde_json::{Map, Value as Json};

/// Renders a decoded message as JSON text.
pub fn render(msg: &MessageValue, set: &SchemaSet, pretty: bool) -> String
{
    let json = to_json(msg, set);
    let rendered = match pretty {
        true => serde_json::to_string_pretty(&json),
        false => serde_json::to_string(&json),
    };

    // Serializing a `serde_json::Value` can't fail, all map keys are strings.
    rendered.unwrap_or_default()
}

/// Converts a decoded message into a JSON object.
pub fn to_json(msg: &MessageValue, set: &SchemaSet) -> Json
{
    let info = set.resolve_message(msg.msg_ref);
    let mut object = Map::new();

    for field in &msg.fields {
        let declared = info.and_then(|i| i.get_field(field.number));
        match (declared, &field.value) {
            (Some(f), Value::Packed(array)) => {
                for item in packed_to_json(array, set) {
                    append(&mut object, &f.name, item);
                }
            }
            (Some(f), value) if !is_unexplained(value) => {
                let json = value_to_json(value, set);
                match f.multiplicity {
                    Multiplicity::Repeated | Multiplicity::RepeatedPacked => {
                        append(&mut object, &f.name, json)
                    }
                    Multiplicity::Single | Multiplicity::Optional => {
                        object.insert(f.name.clone(), json);
                    }
                }
            }
            (_, value) => collect(&mut object, field.number.to_string(), value_to_json(value, set)),
        }
    }

    if let Some(info) = info {
        for field in info.iter_fields() {
            if let ValueType::Message(mref) = field.field_type {
                if set.resolve_message(mref).map(|m| m.map_entry).unwrap_or(false) {
                    if let Some(entries) = object.remove(&field.name) {
                        object.insert(field.name.clone(), entries_to_object(entries));
                    }
                }
            }
        }
    }

    Json::Object(object)
}

fn is_unexplained(value: &Value) -> bool
{
    matches!(value, Value::Unknown(..) | Value::Incomplete(..))
}

/// Appends to a repeated field's array.
fn append(object: &mut Map<String, Json>, key: &str, value: Json)
{
    match object
        .entry(key.to_string())
        .or_insert_with(|| Json::Array(vec![]))
    {
        Json::Array(items) => items.push(value),
        other => *other = Json::Array(vec![other.take(), value]),
    }
}

/// Inserts an unknown value, turning the key into an array once it occurs more than once.
fn collect(object: &mut Map<String, Json>, key: String, value: Json)
{
    match object.get_mut(&key) {
        None => {
            object.insert(key, value);
        }
        Some(Json::Array(items)) => items.push(value),
        Some(existing) => *existing = Json::Array(vec![existing.take(), value]),
    }
}

fn entries_to_object(entries: Json) -> Json
{
    let entries = match entries {
        Json::Array(entries) => entries,
        other => return other,
    };

    let mut object = Map::new();
    for mut entry in entries {
        let key = match entry.get_mut("key").map(Json::take) {
            Some(Json::String(s)) => s,
            Some(Json::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        let value = entry.get_mut("value").map(Json::take).unwrap_or(Json::Null);
        object.insert(key, value);
    }

    Json::Object(object)
}

fn value_to_json(value: &Value, set: &SchemaSet) -> Json
{
    match value {
        Value::Double(v) => float_to_json(*v),
        Value::Float(v) => float_to_json(f64::from(*v)),
        Value::Int32(v) | Value::SInt32(v) | Value::SFixed32(v) => Json::from(*v),
        Value::Int64(v) | Value::SInt64(v) | Value::SFixed64(v) => Json::from(*v),
        Value::UInt32(v) | Value::Fixed32(v) => Json::from(*v),
        Value::UInt64(v) | Value::Fixed64(v) => Json::from(*v),
        Value::Bool(v) => Json::Bool(*v != 0),
        Value::String(s) => Json::String(s.clone()),
        Value::Bytes(b) => Json::String(BASE64_STANDARD.encode(b)),
        Value::Packed(array) => Json::Array(packed_to_json(array, set)),
        Value::Message(msg) => to_json(msg, set),
        Value::Enum(e) => enum_to_json(e.enum_ref, e.value, set),
        Value::Incomplete(b) => Json::String(BASE64_STANDARD.encode(b)),
        Value::Unknown(unknown) => match unknown {
            UnknownValue::Varint(v) | UnknownValue::Fixed64(v) => Json::from(*v),
            UnknownValue::Fixed32(v) => Json::from(*v),
            UnknownValue::VariableLength(b)
            | UnknownValue::Group(b)
            | UnknownValue::Invalid(b) => Json::String(BASE64_STANDARD.encode(b)),
        },
    }
}

fn packed_to_json(array: &PackedArray, set: &SchemaSet) -> Vec<Json>
{
    fn all<T: Copy>(values: &[T], f: impl Fn(T) -> Json) -> Vec<Json>
    {
        values.iter().copied().map(f).collect()
    }

    match array {
        PackedArray::Double(v) => all(v, float_to_json),
        PackedArray::Float(v) => all(v, |f| float_to_json(f64::from(f))),
        PackedArray::Int32(v) | PackedArray::SInt32(v) | PackedArray::SFixed32(v) => {
            all(v, Json::from)
        }
        PackedArray::Int64(v) | PackedArray::SInt64(v) | PackedArray::SFixed64(v) => {
            all(v, Json::from)
        }
        PackedArray::UInt32(v) | PackedArray::Fixed32(v) => all(v, Json::from),
        PackedArray::UInt64(v) | PackedArray::Fixed64(v) => all(v, Json::from),
        PackedArray::Bool(v) => all(v, |b| Json::Bool(b != 0)),
        PackedArray::Enum(eref, v) => all(v, |e| enum_to_json(*eref, e, set)),
    }
}

fn enum_to_json(eref: EnumRef, value: i64, set: &SchemaSet) -> Json
{
    match set
        .resolve_enum(eref)
        .and_then(|e| e.get_field_by_value(value))
    {
        Some(field) => Json::String(field.name.clone()),
        None => Json::from(value),
    }
}

/// JSON has no representation for non-finite numbers so those are rendered as strings.
fn float_to_json(v: f64) -> Json
{
    if v.is_nan() {
        Json::String("NaN".to_string())
    } else if v.is_infinite() {
        let s = if v > 0.0 { "Infinity" } else { "-Infinity" };
        Json::String(s.to_string())
    } else {
        Json::from(v)
    }
}
