//! Attribute marshalers
//!
//! A marshaler owns one attribute type: it coerces assigned values into the
//! attribute's native form and converts them to and from attribute values.
//! Null handling (omit vs. persist) is decided by the attribute, so
//! `serialize` is never called with [`Value::Null`].

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde_json::{json, Value as JsonValue};
use std::collections::BTreeSet;
use std::fmt;

use dynamap_common::Value;

use crate::wire::{self, MarshalError};

/// Conversion between native values and attribute values for one attribute type.
pub trait Marshaler: Send + Sync + fmt::Debug {
    /// Coerce an assigned value into this attribute's native form.
    fn type_cast(&self, value: Value) -> Result<Value, MarshalError>;

    /// `Ok(None)` leaves the attribute out of the written item.
    fn serialize(&self, value: &Value) -> Result<Option<JsonValue>, MarshalError>;

    fn extract(&self, attr: &JsonValue) -> Result<Value, MarshalError>;
}

fn mismatch(expected: &str, value: &Value) -> MarshalError {
    MarshalError::new(format!("expected {}, got {}", expected, value.type_name()))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StringMarshaler;

impl Marshaler for StringMarshaler {
    fn type_cast(&self, value: Value) -> Result<Value, MarshalError> {
        match value {
            Value::Null | Value::String(_) => Ok(value),
            Value::Integer(i) => Ok(Value::String(i.to_string())),
            Value::Float(f) => Ok(Value::String(f.to_string())),
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            other => Err(mismatch("string", &other)),
        }
    }

    fn serialize(&self, value: &Value) -> Result<Option<JsonValue>, MarshalError> {
        match value {
            Value::String(s) => Ok(Some(wire::string(s))),
            other => Err(mismatch("string", other)),
        }
    }

    fn extract(&self, attr: &JsonValue) -> Result<Value, MarshalError> {
        match wire::decode(attr)? {
            Value::Integer(i) => Ok(Value::String(i.to_string())),
            value => self.type_cast(value),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IntegerMarshaler;

impl Marshaler for IntegerMarshaler {
    fn type_cast(&self, value: Value) -> Result<Value, MarshalError> {
        match value {
            Value::Null | Value::Integer(_) => Ok(value),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|e| MarshalError::new(format!("invalid integer {:?}: {}", s, e))),
            other => Err(mismatch("integer", &other)),
        }
    }

    fn serialize(&self, value: &Value) -> Result<Option<JsonValue>, MarshalError> {
        match value {
            Value::Integer(i) => Ok(Some(wire::number(i))),
            other => Err(mismatch("integer", other)),
        }
    }

    fn extract(&self, attr: &JsonValue) -> Result<Value, MarshalError> {
        self.type_cast(wire::decode(attr)?)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FloatMarshaler;

impl Marshaler for FloatMarshaler {
    fn type_cast(&self, value: Value) -> Result<Value, MarshalError> {
        match value {
            Value::Null | Value::Float(_) => Ok(value),
            #[allow(clippy::cast_precision_loss)]
            Value::Integer(i) => Ok(Value::Float(i as f64)),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|e| MarshalError::new(format!("invalid float {:?}: {}", s, e))),
            other => Err(mismatch("float", &other)),
        }
    }

    fn serialize(&self, value: &Value) -> Result<Option<JsonValue>, MarshalError> {
        match value {
            Value::Float(f) if f.is_finite() => Ok(Some(wire::float(*f))),
            Value::Float(f) => Err(MarshalError::new(format!("{} cannot be stored", f))),
            other => Err(mismatch("float", other)),
        }
    }

    fn extract(&self, attr: &JsonValue) -> Result<Value, MarshalError> {
        self.type_cast(wire::decode(attr)?)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BooleanMarshaler;

impl Marshaler for BooleanMarshaler {
    fn type_cast(&self, value: Value) -> Result<Value, MarshalError> {
        match value {
            Value::Null | Value::Bool(_) => Ok(value),
            Value::String(s) => match s.as_str() {
                "true" | "1" => Ok(Value::Bool(true)),
                "false" | "0" => Ok(Value::Bool(false)),
                _ => Err(MarshalError::new(format!("invalid boolean {:?}", s))),
            },
            Value::Integer(i) => Ok(Value::Bool(i != 0)),
            other => Err(mismatch("boolean", &other)),
        }
    }

    fn serialize(&self, value: &Value) -> Result<Option<JsonValue>, MarshalError> {
        match value {
            Value::Bool(b) => Ok(Some(json!({ "BOOL": b }))),
            other => Err(mismatch("boolean", other)),
        }
    }

    fn extract(&self, attr: &JsonValue) -> Result<Value, MarshalError> {
        self.type_cast(wire::decode(attr)?)
    }
}

/// Date-times stored as RFC 3339 strings in UTC
#[derive(Debug, Clone, Copy, Default)]
pub struct DateTimeMarshaler;

impl Marshaler for DateTimeMarshaler {
    fn type_cast(&self, value: Value) -> Result<Value, MarshalError> {
        match value {
            Value::Null | Value::DateTime(_) => Ok(value),
            Value::String(s) => DateTime::parse_from_rfc3339(&s)
                .map(|dt| Value::DateTime(dt.with_timezone(&Utc)))
                .map_err(|e| MarshalError::new(format!("invalid date-time {:?}: {}", s, e))),
            Value::Integer(secs) => from_epoch(secs),
            other => Err(mismatch("datetime", &other)),
        }
    }

    fn serialize(&self, value: &Value) -> Result<Option<JsonValue>, MarshalError> {
        match value {
            Value::DateTime(dt) => Ok(Some(wire::string(
                &dt.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            ))),
            other => Err(mismatch("datetime", other)),
        }
    }

    fn extract(&self, attr: &JsonValue) -> Result<Value, MarshalError> {
        self.type_cast(wire::decode(attr)?)
    }
}

/// Date-times stored as whole seconds since the Unix epoch
#[derive(Debug, Clone, Copy, Default)]
pub struct EpochTimeMarshaler;

impl Marshaler for EpochTimeMarshaler {
    fn type_cast(&self, value: Value) -> Result<Value, MarshalError> {
        DateTimeMarshaler.type_cast(value)
    }

    fn serialize(&self, value: &Value) -> Result<Option<JsonValue>, MarshalError> {
        match value {
            Value::DateTime(dt) => Ok(Some(wire::number(dt.timestamp()))),
            other => Err(mismatch("datetime", other)),
        }
    }

    fn extract(&self, attr: &JsonValue) -> Result<Value, MarshalError> {
        self.type_cast(wire::decode(attr)?)
    }
}

fn from_epoch(secs: i64) -> Result<Value, MarshalError> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .map(Value::DateTime)
        .ok_or_else(|| MarshalError::new(format!("epoch seconds out of range: {}", secs)))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MapMarshaler;

impl Marshaler for MapMarshaler {
    fn type_cast(&self, value: Value) -> Result<Value, MarshalError> {
        match value {
            Value::Null | Value::Map(_) => Ok(value),
            other => Err(mismatch("map", &other)),
        }
    }

    fn serialize(&self, value: &Value) -> Result<Option<JsonValue>, MarshalError> {
        match value {
            Value::Map(_) => Ok(Some(wire::encode(value))),
            other => Err(mismatch("map", other)),
        }
    }

    fn extract(&self, attr: &JsonValue) -> Result<Value, MarshalError> {
        self.type_cast(wire::decode(attr)?)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ListMarshaler;

impl Marshaler for ListMarshaler {
    fn type_cast(&self, value: Value) -> Result<Value, MarshalError> {
        match value {
            Value::Null | Value::List(_) => Ok(value),
            Value::StringSet(set) => Ok(Value::List(set.into_iter().map(Value::String).collect())),
            other => Err(mismatch("list", &other)),
        }
    }

    fn serialize(&self, value: &Value) -> Result<Option<JsonValue>, MarshalError> {
        match value {
            Value::List(_) => Ok(Some(wire::encode(value))),
            other => Err(mismatch("list", other)),
        }
    }

    fn extract(&self, attr: &JsonValue) -> Result<Value, MarshalError> {
        self.type_cast(wire::decode(attr)?)
    }
}

/// String sets; an empty set is never written because the store rejects it
#[derive(Debug, Clone, Copy, Default)]
pub struct StringSetMarshaler;

impl Marshaler for StringSetMarshaler {
    fn type_cast(&self, value: Value) -> Result<Value, MarshalError> {
        match value {
            Value::Null | Value::StringSet(_) => Ok(value),
            Value::List(items) => {
                let set: Result<BTreeSet<String>, _> = items
                    .into_iter()
                    .map(|v| match v {
                        Value::String(s) => Ok(s),
                        other => Err(mismatch("string", &other)),
                    })
                    .collect();
                Ok(Value::StringSet(set?))
            }
            other => Err(mismatch("string_set", &other)),
        }
    }

    fn serialize(&self, value: &Value) -> Result<Option<JsonValue>, MarshalError> {
        match value {
            Value::StringSet(set) if set.is_empty() => Ok(None),
            Value::StringSet(_) => Ok(Some(wire::encode(value))),
            other => Err(mismatch("string_set", other)),
        }
    }

    fn extract(&self, attr: &JsonValue) -> Result<Value, MarshalError> {
        self.type_cast(wire::decode(attr)?)
    }
}

/// Number sets; an empty set is never written because the store rejects it
#[derive(Debug, Clone, Copy, Default)]
pub struct NumberSetMarshaler;

impl Marshaler for NumberSetMarshaler {
    fn type_cast(&self, value: Value) -> Result<Value, MarshalError> {
        match value {
            Value::Null => Ok(value),
            Value::NumberSet(numbers) => Ok(Value::NumberSet(wire::normalize_numbers(numbers))),
            Value::List(items) => {
                let numbers: Result<Vec<f64>, _> = items
                    .iter()
                    .map(|v| v.as_f64().ok_or_else(|| mismatch("number", v)))
                    .collect();
                Ok(Value::NumberSet(wire::normalize_numbers(numbers?)))
            }
            other => Err(mismatch("number_set", &other)),
        }
    }

    fn serialize(&self, value: &Value) -> Result<Option<JsonValue>, MarshalError> {
        match value {
            Value::NumberSet(set) if set.is_empty() => Ok(None),
            Value::NumberSet(_) => Ok(Some(wire::encode(value))),
            other => Err(mismatch("number_set", other)),
        }
    }

    fn extract(&self, attr: &JsonValue) -> Result<Value, MarshalError> {
        self.type_cast(wire::decode(attr)?)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryMarshaler;

impl Marshaler for BinaryMarshaler {
    fn type_cast(&self, value: Value) -> Result<Value, MarshalError> {
        match value {
            Value::Null | Value::Bytes(_) => Ok(value),
            Value::String(s) => Ok(Value::Bytes(s.into_bytes())),
            other => Err(mismatch("bytes", &other)),
        }
    }

    fn serialize(&self, value: &Value) -> Result<Option<JsonValue>, MarshalError> {
        match value {
            Value::Bytes(b) => Ok(Some(wire::binary(b))),
            other => Err(mismatch("bytes", other)),
        }
    }

    fn extract(&self, attr: &JsonValue) -> Result<Value, MarshalError> {
        self.type_cast(wire::decode(attr)?)
    }
}
