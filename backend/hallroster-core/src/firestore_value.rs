// src/firestore_value.rs
//
// Firestore REST documents carry typed values ({"stringValue": ..},
// {"mapValue": {"fields": ..}}, ...). These helpers convert between that
// wire form and plain JSON fields.

use serde_json::{json, Map, Value};

use crate::store::{Fields, StoreError};

pub fn encode_fields(fields: &Fields) -> Map<String, Value> {
    fields
        .iter()
        .map(|(name, value)| (name.clone(), encode_value(value)))
        .collect()
}

pub fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(flag) => json!({ "booleanValue": flag }),
        Value::Number(number) => match number.as_i64() {
            // integers travel as decimal strings
            Some(integer) => json!({ "integerValue": integer.to_string() }),
            None => json!({ "doubleValue": number.as_f64().unwrap_or(0.0) }),
        },
        Value::String(text) => json!({ "stringValue": text }),
        Value::Array(items) => {
            let values: Vec<Value> = items.iter().map(encode_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
    }
}

pub fn decode_fields(fields: &Map<String, Value>) -> Result<Fields, StoreError> {
    fields
        .iter()
        .map(|(name, value)| Ok((name.clone(), decode_value(value)?)))
        .collect()
}

pub fn decode_value(value: &Value) -> Result<Value, StoreError> {
    let (kind, inner) = value
        .as_object()
        .and_then(|object| object.iter().next())
        .ok_or_else(|| StoreError::UnsupportedValue(value.to_string()))?;

    match (kind.as_str(), inner) {
        ("nullValue", _) => Ok(Value::Null),
        ("booleanValue", flag) => Ok(Value::Bool(flag.as_bool().unwrap_or(false))),
        ("integerValue", raw) => {
            let parsed = match raw {
                Value::String(text) => text.parse::<i64>().ok(),
                Value::Number(number) => number.as_i64(),
                _ => None,
            };
            parsed
                .map(Value::from)
                .ok_or_else(|| StoreError::UnsupportedValue(format!("integerValue {}", raw)))
        }
        ("doubleValue", raw) => Ok(raw
            .as_f64()
            .or_else(|| raw.as_str().and_then(|text| text.parse::<f64>().ok()))
            .map(Value::from)
            .unwrap_or(Value::Null)),
        ("stringValue", text)
        | ("timestampValue", text)
        | ("referenceValue", text)
        | ("bytesValue", text) => Ok(text.clone()),
        ("geoPointValue", point) => Ok(point.clone()),
        ("arrayValue", array) => {
            let values = array
                .get("values")
                .and_then(Value::as_array)
                .map(|items| items.iter().map(decode_value).collect::<Result<Vec<_>, _>>())
                .transpose()?
                .unwrap_or_default();
            Ok(Value::Array(values))
        }
        ("mapValue", map) => {
            let decoded = match map.get("fields").and_then(Value::as_object) {
                Some(inner) => decode_fields(inner)?,
                None => Fields::new(),
            };
            Ok(Value::Object(decoded))
        }
        (kind, _) => Err(StoreError::UnsupportedValue(format!(
            "unknown Firestore value type '{}'",
            kind
        ))),
    }
}

/// Quotes a top-level field name for `updateMask.fieldPaths` when it is not
/// a simple identifier.
pub fn field_path(name: &str) -> String {
    let simple = name
        .chars()
        .next()
        .map(|first| first.is_ascii_alphabetic() || first == '_')
        .unwrap_or(false)
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if simple {
        name.to_string()
    } else {
        format!("`{}`", name.replace('\\', "\\\\").replace('`', "\\`"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hall_document_decodes_to_plain_json() {
        let wire = json!({
            "name": { "stringValue": "North" },
            "workingDays": { "stringValue": "2" },
            "employees": { "arrayValue": { "values": [
                { "mapValue": { "fields": {
                    "id": { "stringValue": "e1" },
                    "name": { "stringValue": "Dana" },
                    "daysWorked": { "integerValue": "2" }
                } } }
            ] } },
            "employeeDates": { "mapValue": { "fields": {
                "e1": { "arrayValue": { "values": [
                    { "stringValue": "2024-05-01" },
                    { "stringValue": "2024-05-02" }
                ] } }
            } } }
        });

        let decoded = decode_fields(wire.as_object().unwrap()).unwrap();
        assert_eq!(decoded["employees"][0]["daysWorked"], json!(2));
        assert_eq!(decoded["employeeDates"]["e1"][1], json!("2024-05-02"));
    }

    #[test]
    fn empty_containers_decode_without_inner_keys() {
        // Firestore omits "values"/"fields" for empty arrays and maps
        assert_eq!(decode_value(&json!({ "arrayValue": {} })).unwrap(), json!([]));
        assert_eq!(decode_value(&json!({ "mapValue": {} })).unwrap(), json!({}));
    }

    #[test]
    fn timestamps_decode_as_text() {
        let decoded = decode_value(&json!({ "timestampValue": "2024-05-01T10:00:00Z" })).unwrap();
        assert_eq!(decoded, json!("2024-05-01T10:00:00Z"));
    }

    #[test]
    fn integers_encode_as_strings() {
        assert_eq!(encode_value(&json!(3)), json!({ "integerValue": "3" }));
        assert_eq!(encode_value(&json!(2.5)), json!({ "doubleValue": 2.5 }));
        assert_eq!(
            encode_value(&json!({ "2024-05-01": true })),
            json!({ "mapValue": { "fields": { "2024-05-01": { "booleanValue": true } } } })
        );
    }

    #[test]
    fn unknown_types_are_rejected() {
        assert!(matches!(
            decode_value(&json!({ "weirdValue": 1 })),
            Err(StoreError::UnsupportedValue(_))
        ));
        assert!(decode_value(&json!("bare")).is_err());
    }

    #[test]
    fn field_paths_are_quoted_when_needed() {
        assert_eq!(field_path("dailyHalls"), "dailyHalls");
        assert_eq!(field_path("2024-05-01"), "`2024-05-01`");
    }
}
