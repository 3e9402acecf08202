//! Conversions between JSON values and the protobuf `Struct`/`Value`
//! well-known types.
//!
//! All free-form data crossing the plugin boundary (matching rule attributes,
//! generator attributes, plugin configuration, test context) travels as a
//! protobuf `Struct`. These functions are pure and total: decoding never
//! fails, and encoding arbitrary host values degrades to a JSON/protobuf null
//! when the value cannot be serialised. Downstream code relies on
//! absence-of-field rather than errors, so the null fallback must be kept.
//!
//! Numbers travel as the wire's double form; the integer/decimal distinction
//! is not preserved (integers come back as numerically-equal doubles).

use std::collections::HashMap;

use prost_types::value::Kind;
use prost_types::{ListValue, Struct};
use serde::Serialize;
use serde_json::{Value, json};

/// Converts a JSON value to a protobuf `Value`.
#[must_use]
pub fn json_to_proto_value(value: &Value) -> prost_types::Value {
    let kind = match value {
        Value::Null => Kind::NullValue(0),
        Value::Bool(b) => Kind::BoolValue(*b),
        Value::Number(n) => Kind::NumberValue(n.as_f64().unwrap_or_default()),
        Value::String(s) => Kind::StringValue(s.clone()),
        Value::Array(values) => Kind::ListValue(ListValue {
            values: values.iter().map(json_to_proto_value).collect(),
        }),
        Value::Object(fields) => Kind::StructValue(Struct {
            fields: fields
                .iter()
                .map(|(k, v)| (k.clone(), json_to_proto_value(v)))
                .collect(),
        }),
    };
    prost_types::Value { kind: Some(kind) }
}

/// Converts a protobuf `Value` to a JSON value. Values without a kind decode
/// as null.
#[must_use]
pub fn proto_value_to_json(value: &prost_types::Value) -> Value {
    match &value.kind {
        Some(Kind::NullValue(_)) | None => Value::Null,
        Some(Kind::NumberValue(n)) => json!(n),
        Some(Kind::StringValue(s)) => Value::String(s.clone()),
        Some(Kind::BoolValue(b)) => Value::Bool(*b),
        Some(Kind::StructValue(s)) => proto_struct_to_json(s),
        Some(Kind::ListValue(list)) => {
            Value::Array(list.values.iter().map(proto_value_to_json).collect())
        }
    }
}

/// Converts a protobuf `Struct` to a JSON object value.
#[must_use]
pub fn proto_struct_to_json(value: &Struct) -> Value {
    Value::Object(
        value
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), proto_value_to_json(v)))
            .collect(),
    )
}

/// Converts a protobuf `Struct` to a map of JSON values.
#[must_use]
pub fn proto_struct_to_map(value: &Struct) -> HashMap<String, Value> {
    value
        .fields
        .iter()
        .map(|(k, v)| (k.clone(), proto_value_to_json(v)))
        .collect()
}

/// Converts a map of JSON values to a protobuf `Struct`.
#[must_use]
pub fn to_proto_struct(values: &HashMap<String, Value>) -> Struct {
    Struct {
        fields: values
            .iter()
            .map(|(k, v)| (k.clone(), json_to_proto_value(v)))
            .collect(),
    }
}

/// Converts any serialisable host value to a protobuf `Value`.
///
/// Values that cannot be serialised (for instance maps with non-string keys)
/// degrade to null instead of erroring.
#[must_use]
pub fn to_wire_value<T: Serialize>(value: &T) -> prost_types::Value {
    match serde_json::to_value(value) {
        Ok(json) => json_to_proto_value(&json),
        Err(_) => prost_types::Value { kind: Some(Kind::NullValue(0)) },
    }
}

/// Converts a map of serialisable host values to a protobuf `Struct`.
#[must_use]
pub fn map_to_proto_struct<T: Serialize>(values: &HashMap<String, T>) -> Struct {
    Struct {
        fields: values
            .iter()
            .map(|(k, v)| (k.clone(), to_wire_value(v)))
            .collect(),
    }
}
