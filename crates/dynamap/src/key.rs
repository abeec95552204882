//! Key resolution
//!
//! Every operation that addresses a single stored item needs its full key.
//! Resolution is all-or-error: a missing hash or range key fails with
//! `KeyMissing` naming every absent key field, hash key first.

use serde_json::Value as JsonValue;

use dynamap_common::{Error, Result, Value};

use crate::item::Item;
use crate::model::ModelDescriptor;
use crate::wire::WireItem;

/// Serialized key of one item, hash key first.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyTuple {
    parts: Vec<(String, JsonValue)>,
}

impl KeyTuple {
    /// `(storage name, attribute value)` pairs in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &JsonValue)> {
        self.parts.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn get(&self, storage_name: &str) -> Option<&JsonValue> {
        self.parts
            .iter()
            .find(|(k, _)| k == storage_name)
            .map(|(_, v)| v)
    }

    #[must_use]
    pub fn to_wire(&self) -> WireItem {
        self.parts.iter().cloned().collect()
    }
}

impl From<KeyTuple> for JsonValue {
    fn from(key: KeyTuple) -> Self {
        JsonValue::Object(key.to_wire())
    }
}

/// Resolve the key of an item from its current attribute values
pub fn key_values(item: &Item) -> Result<KeyTuple> {
    resolve(item.model(), |name| item.get(name).cloned())
}

/// Resolve a key from caller-supplied `(field, value)` pairs.
///
/// Values are type cast like assignments; unknown field names are rejected
/// and non-key fields are ignored.
pub fn key_from_pairs<K: AsRef<str>>(
    model: &ModelDescriptor,
    pairs: &[(K, Value)],
) -> Result<KeyTuple> {
    for (name, _) in pairs {
        model.attribute_for(name.as_ref())?;
    }
    resolve(model, |name| {
        pairs
            .iter()
            .find(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.clone())
    })
}

fn resolve(model: &ModelDescriptor, lookup: impl Fn(&str) -> Option<Value>) -> Result<KeyTuple> {
    let mut parts = Vec::with_capacity(2);
    let mut missing = Vec::new();

    for def in model.key_attributes() {
        let value = match lookup(def.name()) {
            Some(value) if !value.is_null() => def.type_cast(value)?,
            _ => {
                missing.push(def.name().to_string());
                continue;
            }
        };
        match def.serialize(&value)? {
            Some(attr) => parts.push((def.storage_name().to_string(), attr)),
            None => missing.push(def.name().to_string()),
        }
    }

    if missing.is_empty() {
        Ok(KeyTuple { parts })
    } else {
        Err(Error::KeyMissing { fields: missing })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Attribute;
    use serde_json::json;
    use std::sync::Arc;

    fn events() -> Arc<ModelDescriptor> {
        ModelDescriptor::builder("events")
            .attribute(Attribute::string("stream").hash_key().storage_name("pk"))
            .attribute(Attribute::integer("seq").range_key().storage_name("sk"))
            .attribute(Attribute::string("body"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_full_key() {
        let model = events();
        let item = Item::from_pairs(
            &model,
            [("stream", Value::from("s1")), ("seq", Value::from(7i64))],
        )
        .unwrap();

        let key = key_values(&item).unwrap();
        let parts: Vec<&str> = key.iter().map(|(k, _)| k).collect();
        assert_eq!(parts, vec!["pk", "sk"]);
        assert_eq!(key.get("sk"), Some(&json!({"N": "7"})));
        assert_eq!(
            JsonValue::from(key),
            json!({"pk": {"S": "s1"}, "sk": {"N": "7"}})
        );
    }

    #[test]
    fn test_missing_keys_reported_together_hash_first() {
        let model = events();
        let item = Item::from_pairs(&model, [("body", Value::from("x"))]).unwrap();

        match key_values(&item).unwrap_err() {
            Error::KeyMissing { fields } => assert_eq!(fields, vec!["stream", "seq"]),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_nil_key_counts_as_missing() {
        let model = events();
        let item = Item::from_pairs(
            &model,
            [("stream", Value::Null), ("seq", Value::from(1i64))],
        )
        .unwrap();

        match key_values(&item).unwrap_err() {
            Error::KeyMissing { fields } => assert_eq!(fields, vec!["stream"]),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_key_from_pairs() {
        let model = events();
        let key = key_from_pairs(&model, &[("seq", Value::from("3")), ("stream", Value::from("s"))])
            .unwrap();
        assert_eq!(key.get("sk"), Some(&json!({"N": "3"})));

        let err = key_from_pairs(&model, &[("stream", Value::from("s"))]).unwrap_err();
        assert!(matches!(err, Error::KeyMissing { fields } if fields == vec!["seq"]));

        let err = key_from_pairs(&model, &[("nope", Value::from(1i64))]).unwrap_err();
        assert!(matches!(err, Error::UnknownAttribute(_)));
    }
}
