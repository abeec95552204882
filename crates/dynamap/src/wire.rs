//! DynamoDB JSON attribute value codec
//!
//! Handles conversion between the store's attribute value format
//! (`{"S": "..."}`, `{"N": "..."}`, ...) and native [`Value`]s.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::SecondsFormat;
use serde_json::{json, Map, Value as JsonValue};
use std::collections::{BTreeMap, BTreeSet};

use dynamap_common::Value;

/// One item as it travels on the wire: storage name → attribute value
pub type WireItem = Map<String, JsonValue>;

/// Attribute value that cannot be decoded or a native value that cannot be encoded
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct MarshalError(pub String);

impl MarshalError {
    pub fn new(message: impl Into<String>) -> Self {
        MarshalError(message.into())
    }
}

pub fn string(s: &str) -> JsonValue {
    json!({ "S": s })
}

pub fn number(n: impl ToString) -> JsonValue {
    json!({ "N": n.to_string() })
}

/// Whole floats keep a decimal point so they decode as floats again
pub fn float(f: f64) -> JsonValue {
    if f.is_finite() && f.fract() == 0.0 {
        json!({ "N": format!("{:.1}", f) })
    } else {
        number(f)
    }
}

pub fn null() -> JsonValue {
    json!({ "NULL": true })
}

pub fn binary(bytes: &[u8]) -> JsonValue {
    json!({ "B": STANDARD.encode(bytes) })
}

/// Convert a native value to its natural attribute value
#[must_use]
pub fn encode(value: &Value) -> JsonValue {
    match value {
        Value::Null => null(),
        Value::Bool(b) => json!({ "BOOL": b }),
        Value::Integer(i) => number(i),
        Value::Float(f) => float(*f),
        Value::String(s) => string(s),
        Value::Bytes(b) => binary(b),
        Value::DateTime(dt) => string(&dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        Value::List(items) => {
            let items: Vec<JsonValue> = items.iter().map(encode).collect();
            json!({ "L": items })
        }
        Value::Map(map) => {
            let items: Map<String, JsonValue> = map
                .iter()
                .map(|(k, v)| (k.clone(), encode(v)))
                .collect();
            json!({ "M": items })
        }
        Value::StringSet(ss) => json!({ "SS": ss }),
        Value::NumberSet(ns) => {
            let strs: Vec<String> = ns.iter().map(ToString::to_string).collect();
            json!({ "NS": strs })
        }
    }
}

/// Parse an attribute value into its natural native value
pub fn decode(attr: &JsonValue) -> Result<Value, MarshalError> {
    let (type_key, type_val) = single_entry(attr)?;

    match type_key {
        "S" => Ok(Value::String(expect_str(type_val, "S")?.to_string())),
        "N" => parse_number(expect_str(type_val, "N")?),
        "BOOL" => type_val
            .as_bool()
            .map(Value::Bool)
            .ok_or_else(|| MarshalError::new("BOOL value must be a boolean")),
        "NULL" => Ok(Value::Null),
        "B" => decode_binary(type_val).map(Value::Bytes),
        "L" => {
            let arr = type_val
                .as_array()
                .ok_or_else(|| MarshalError::new("L value must be an array"))?;
            let values: Result<Vec<Value>, _> = arr.iter().map(decode).collect();
            Ok(Value::List(values?))
        }
        "M" => {
            let map = type_val
                .as_object()
                .ok_or_else(|| MarshalError::new("M value must be an object"))?;
            let mut result = BTreeMap::new();
            for (k, v) in map {
                result.insert(k.clone(), decode(v)?);
            }
            Ok(Value::Map(result))
        }
        "SS" => {
            let arr = type_val
                .as_array()
                .ok_or_else(|| MarshalError::new("SS value must be an array"))?;
            let strings: Result<BTreeSet<String>, _> = arr
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(String::from)
                        .ok_or_else(|| MarshalError::new("SS items must be strings"))
                })
                .collect();
            Ok(Value::StringSet(strings?))
        }
        "NS" => {
            let arr = type_val
                .as_array()
                .ok_or_else(|| MarshalError::new("NS value must be an array"))?;
            let numbers: Result<Vec<f64>, _> = arr
                .iter()
                .map(|v| {
                    v.as_str()
                        .and_then(|s| s.parse().ok())
                        .ok_or_else(|| MarshalError::new("NS items must be number strings"))
                })
                .collect();
            Ok(Value::NumberSet(normalize_numbers(numbers?)))
        }
        "BS" => {
            let arr = type_val
                .as_array()
                .ok_or_else(|| MarshalError::new("BS value must be an array"))?;
            let binaries: Result<Vec<Value>, _> = arr
                .iter()
                .map(|v| decode_binary(v).map(Value::Bytes))
                .collect();
            Ok(Value::List(binaries?))
        }
        other => Err(MarshalError::new(format!("Unknown type: {}", other))),
    }
}

/// The `(type, payload)` pair of an attribute value
pub fn single_entry(attr: &JsonValue) -> Result<(&str, &JsonValue), MarshalError> {
    let obj = attr
        .as_object()
        .ok_or_else(|| MarshalError::new("Attribute value must be an object"))?;
    if obj.len() != 1 {
        return Err(MarshalError::new(format!(
            "Attribute value must have exactly one type key, found {}",
            obj.len()
        )));
    }
    obj.iter()
        .next()
        .map(|(k, v)| (k.as_str(), v))
        .ok_or_else(|| MarshalError::new("Empty attribute value"))
}

pub fn is_null(attr: &JsonValue) -> bool {
    matches!(single_entry(attr), Ok(("NULL", _)))
}

/// Sort and deduplicate a number set
#[must_use]
pub fn normalize_numbers(mut numbers: Vec<f64>) -> Vec<f64> {
    numbers.sort_by(f64::total_cmp);
    numbers.dedup();
    numbers
}

fn expect_str<'a>(value: &'a JsonValue, type_key: &str) -> Result<&'a str, MarshalError> {
    value
        .as_str()
        .ok_or_else(|| MarshalError::new(format!("{} value must be a string", type_key)))
}

fn parse_number(n: &str) -> Result<Value, MarshalError> {
    // Try integer first, then float
    if let Ok(i) = n.parse::<i64>() {
        Ok(Value::Integer(i))
    } else if let Ok(f) = n.parse::<f64>() {
        Ok(Value::Float(f))
    } else {
        Err(MarshalError::new(format!("Invalid number: {}", n)))
    }
}

fn decode_binary(value: &JsonValue) -> Result<Vec<u8>, MarshalError> {
    let b64 = expect_str(value, "B")?;
    STANDARD
        .decode(b64)
        .map_err(|e| MarshalError::new(format!("Invalid base64: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_scalars() {
        assert_eq!(decode(&json!({"S": "hello"})).unwrap(), Value::String("hello".into()));
        assert_eq!(decode(&json!({"N": "42"})).unwrap(), Value::Integer(42));
        assert_eq!(decode(&json!({"N": "2.5"})).unwrap(), Value::Float(2.5));
        assert_eq!(decode(&json!({"BOOL": true})).unwrap(), Value::Bool(true));
        assert_eq!(decode(&json!({"NULL": true})).unwrap(), Value::Null);
    }

    #[test]
    fn test_whole_float_stays_float() {
        assert_eq!(encode(&Value::Float(2.0)), json!({"N": "2.0"}));
        assert_eq!(encode(&Value::Float(-0.5)), json!({"N": "-0.5"}));
        assert_eq!(encode(&Value::Integer(2)), json!({"N": "2"}));

        let nested = Value::Map(
            [("ratio".to_string(), Value::Float(2.0))].into_iter().collect(),
        );
        assert_eq!(decode(&encode(&nested)).unwrap(), nested);
    }

    #[test]
    fn test_decode_list() {
        let value = decode(&json!({"L": [{"S": "a"}, {"N": "1"}]})).unwrap();
        match value {
            Value::List(arr) => {
                assert_eq!(arr.len(), 2);
                assert_eq!(arr[0], Value::String("a".into()));
                assert_eq!(arr[1], Value::Integer(1));
            }
            _ => panic!("Expected list"),
        }
    }

    #[test]
    fn test_map_roundtrip() {
        let original = Value::Map(BTreeMap::from([
            ("name".into(), Value::String("test".into())),
            ("count".into(), Value::Integer(42)),
            ("tags".into(), Value::StringSet(BTreeSet::from(["a".to_string()]))),
        ]));

        let wire = encode(&original);
        assert_eq!(decode(&wire).unwrap(), original);
    }

    #[test]
    fn test_binary_is_base64() {
        let wire = encode(&Value::Bytes(b"hi".to_vec()));
        assert_eq!(wire, json!({"B": "aGk="}));
        assert_eq!(decode(&wire).unwrap(), Value::Bytes(b"hi".to_vec()));
    }

    #[test]
    fn test_malformed_values_are_rejected() {
        assert!(decode(&json!("plain")).is_err());
        assert!(decode(&json!({})).is_err());
        assert!(decode(&json!({"S": "a", "N": "1"})).is_err());
        assert!(decode(&json!({"N": "abc"})).is_err());
        assert!(decode(&json!({"X": 1})).is_err());
    }

    #[test]
    fn test_number_set_is_normalized() {
        let value = decode(&json!({"NS": ["3", "1", "3"]})).unwrap();
        assert_eq!(value, Value::NumberSet(vec![1.0, 3.0]));
    }
}
