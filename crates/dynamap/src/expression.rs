//! Update and condition expression building
//!
//! Generated expressions reference attributes only through placeholders.
//! Name placeholders (`#UE_A`, `#UE_B`, ...) and value placeholders
//! (`:ue_a`, `:ue_b`, ...) come from two independent sequences that restart
//! for every expression, so one expression never reuses a token.

use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;

use dynamap_common::{Error, Result, Value};

use crate::model::ModelDescriptor;

const NAME_PREFIX: &str = "#UE_";
const VALUE_PREFIX: &str = ":ue_";

/// Deterministic placeholder sequence: `A`..`Z`, `AA`, `AB`, ...
#[derive(Debug, Clone)]
pub struct TokenSequence {
    prefix: &'static str,
    alphabet_start: u8,
    next: u64,
}

impl TokenSequence {
    /// Sequence of attribute name placeholders
    #[must_use]
    pub fn names() -> Self {
        Self {
            prefix: NAME_PREFIX,
            alphabet_start: b'A',
            next: 0,
        }
    }

    /// Sequence of attribute value placeholders
    #[must_use]
    pub fn values() -> Self {
        Self {
            prefix: VALUE_PREFIX,
            alphabet_start: b'a',
            next: 0,
        }
    }

    pub fn next_token(&mut self) -> String {
        let token = format!("{}{}", self.prefix, self.letters(self.next));
        self.next += 1;
        token
    }

    // Bijective base-26: 0 -> A, 25 -> Z, 26 -> AA
    fn letters(&self, index: u64) -> String {
        let mut n = index + 1;
        let mut out = Vec::new();
        while n > 0 {
            n -= 1;
            // n % 26 < 26, so the cast cannot truncate
            #[allow(clippy::cast_possible_truncation)]
            out.push(self.alphabet_start + (n % 26) as u8);
            n /= 26;
        }
        out.reverse();
        String::from_utf8_lossy(&out).into_owned()
    }
}

/// An expression with the placeholder maps it references.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpressionFragment {
    pub expression: String,
    pub names: BTreeMap<String, String>,
    pub values: BTreeMap<String, JsonValue>,
}

/// Build a `SET`/`REMOVE` update expression from `(field, value)` pairs.
///
/// Values that serialize to nothing (nil without `persist_nil`, empty sets)
/// are removed; everything else is set. Returns `None` for no pairs.
pub fn build_update_expression<K: AsRef<str>>(
    model: &ModelDescriptor,
    pairs: &[(K, Value)],
) -> Result<Option<ExpressionFragment>> {
    let mut set_clauses = Vec::new();
    let mut remove_clauses = Vec::new();
    let mut names = BTreeMap::new();
    let mut values = BTreeMap::new();
    let mut name_tokens = TokenSequence::names();
    let mut value_tokens = TokenSequence::values();

    for (field, value) in pairs {
        let def = model.attribute_for(field.as_ref())?;
        let name_token = name_tokens.next_token();
        names.insert(name_token.clone(), def.storage_name().to_string());

        match def.serialize(value)? {
            Some(attr) => {
                let value_token = value_tokens.next_token();
                set_clauses.push(format!("{} = {}", name_token, value_token));
                values.insert(value_token, attr);
            }
            None => remove_clauses.push(name_token),
        }
    }

    let mut clauses = Vec::with_capacity(2);
    if !set_clauses.is_empty() {
        clauses.push(format!("SET {}", set_clauses.join(", ")));
    }
    if !remove_clauses.is_empty() {
        clauses.push(format!("REMOVE {}", remove_clauses.join(", ")));
    }

    if clauses.is_empty() {
        Ok(None)
    } else {
        Ok(Some(ExpressionFragment {
            expression: clauses.join(" "),
            names,
            values,
        }))
    }
}

/// Put guard that fails when an item with the same key already exists
#[must_use]
pub fn prevent_overwrite_expression(model: &ModelDescriptor) -> ExpressionFragment {
    let mut names = BTreeMap::new();
    names.insert("#H".to_string(), model.hash_key().storage_name().to_string());
    let mut expression = "attribute_not_exists(#H)".to_string();

    if let Some(range) = model.range_key() {
        names.insert("#R".to_string(), range.storage_name().to_string());
        expression.push_str(" and attribute_not_exists(#R)");
    }

    ExpressionFragment {
        expression,
        names,
        values: BTreeMap::new(),
    }
}

/// Union caller placeholders into generated ones; a placeholder defined on
/// both sides is a caller error.
pub fn merge_placeholders(
    names: &mut BTreeMap<String, String>,
    values: &mut BTreeMap<String, JsonValue>,
    caller_names: &BTreeMap<String, String>,
    caller_values: &BTreeMap<String, JsonValue>,
) -> Result<()> {
    if let Some(token) = caller_names
        .keys()
        .chain(caller_values.keys())
        .find(|token| names.contains_key(*token) || values.contains_key(*token))
    {
        return Err(Error::PlaceholderCollision(token.clone()));
    }
    names.extend(caller_names.iter().map(|(k, v)| (k.clone(), v.clone())));
    values.extend(caller_values.iter().map(|(k, v)| (k.clone(), v.clone())));
    Ok(())
}

/// Write placeholder maps into request parameters. An empty value map is
/// left out because the store rejects it.
pub fn write_placeholders(
    params: &mut Map<String, JsonValue>,
    names: BTreeMap<String, String>,
    values: BTreeMap<String, JsonValue>,
) {
    if !names.is_empty() {
        let names: Map<String, JsonValue> = names
            .into_iter()
            .map(|(k, v)| (k, JsonValue::String(v)))
            .collect();
        params.insert("ExpressionAttributeNames".into(), JsonValue::Object(names));
    }
    if !values.is_empty() {
        let values: Map<String, JsonValue> = values.into_iter().collect();
        params.insert("ExpressionAttributeValues".into(), JsonValue::Object(values));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Attribute;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn model() -> Arc<ModelDescriptor> {
        ModelDescriptor::builder("accounts")
            .attribute(Attribute::string("id").hash_key())
            .attribute(Attribute::string("region").range_key().storage_name("rg"))
            .attribute(Attribute::string("name"))
            .attribute(Attribute::integer("balance").storage_name("bal"))
            .attribute(Attribute::string("note").persist_nil())
            .attribute(Attribute::string("nickname"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_token_sequence() {
        let mut names = TokenSequence::names();
        let tokens: Vec<String> = (0..28).map(|_| names.next_token()).collect();
        assert_eq!(tokens[0], "#UE_A");
        assert_eq!(tokens[25], "#UE_Z");
        assert_eq!(tokens[26], "#UE_AA");
        assert_eq!(tokens[27], "#UE_AB");

        let mut values = TokenSequence::values();
        assert_eq!(values.next_token(), ":ue_a");
        assert_eq!(values.next_token(), ":ue_b");
    }

    #[test]
    fn test_token_sequence_past_two_letters() {
        let mut seq = TokenSequence::values();
        let tokens: Vec<String> = (0..703).map(|_| seq.next_token()).collect();
        assert_eq!(tokens[701], ":ue_zz");
        assert_eq!(tokens[702], ":ue_aaa");
        let unique: HashSet<&String> = tokens.iter().collect();
        assert_eq!(unique.len(), tokens.len());
    }

    #[test]
    fn test_set_and_remove() {
        let update = build_update_expression(
            &model(),
            &[
                ("name", Value::from("Ann")),
                ("nickname", Value::Null),
                ("balance", Value::from(10i64)),
            ],
        )
        .unwrap()
        .unwrap();

        assert_eq!(
            update.expression,
            "SET #UE_A = :ue_a, #UE_C = :ue_b REMOVE #UE_B"
        );
        assert_eq!(update.names["#UE_A"], "name");
        assert_eq!(update.names["#UE_B"], "nickname");
        assert_eq!(update.names["#UE_C"], "bal");
        assert_eq!(update.values[":ue_a"], json!({"S": "Ann"}));
        assert_eq!(update.values[":ue_b"], json!({"N": "10"}));
        assert_eq!(update.values.len(), 2);
    }

    #[test]
    fn test_remove_only_has_no_values() {
        let update = build_update_expression(&model(), &[("nickname", Value::Null)])
            .unwrap()
            .unwrap();
        assert_eq!(update.expression, "REMOVE #UE_A");
        assert!(update.values.is_empty());

        let mut params = Map::new();
        write_placeholders(&mut params, update.names, update.values);
        assert!(params.contains_key("ExpressionAttributeNames"));
        assert!(!params.contains_key("ExpressionAttributeValues"));
    }

    #[test]
    fn test_persisted_nil_is_set() {
        let update = build_update_expression(&model(), &[("note", Value::Null)])
            .unwrap()
            .unwrap();
        assert_eq!(update.expression, "SET #UE_A = :ue_a");
        assert_eq!(update.values[":ue_a"], json!({"NULL": true}));
    }

    #[test]
    fn test_each_call_restarts_tokens() {
        let model = model();
        let first = build_update_expression(&model, &[("name", Value::from("a"))]).unwrap();
        let second = build_update_expression(&model, &[("balance", Value::from(1i64))]).unwrap();
        assert_eq!(first.unwrap().expression, "SET #UE_A = :ue_a");
        assert_eq!(second.unwrap().expression, "SET #UE_A = :ue_a");
    }

    #[test]
    fn test_empty_pairs() {
        let pairs: [(&str, Value); 0] = [];
        assert_eq!(build_update_expression(&model(), &pairs).unwrap(), None);
    }

    #[test]
    fn test_unknown_field() {
        let err = build_update_expression(&model(), &[("ghost", Value::from(1i64))]).unwrap_err();
        assert!(matches!(err, Error::UnknownAttribute(_)));
    }

    #[test]
    fn test_prevent_overwrite() {
        let guard = prevent_overwrite_expression(&model());
        assert_eq!(
            guard.expression,
            "attribute_not_exists(#H) and attribute_not_exists(#R)"
        );
        assert_eq!(guard.names["#H"], "id");
        assert_eq!(guard.names["#R"], "rg");
        assert!(guard.values.is_empty());

        let hash_only = ModelDescriptor::builder("t")
            .attribute(Attribute::string("pk").hash_key())
            .build()
            .unwrap();
        let guard = prevent_overwrite_expression(&hash_only);
        assert_eq!(guard.expression, "attribute_not_exists(#H)");
        assert_eq!(guard.names.len(), 1);
    }

    #[test]
    fn test_merge_placeholders() {
        let mut names = BTreeMap::from([("#UE_A".to_string(), "name".to_string())]);
        let mut values = BTreeMap::from([(":ue_a".to_string(), json!({"S": "x"}))]);

        merge_placeholders(
            &mut names,
            &mut values,
            &BTreeMap::from([("#v".to_string(), "version".to_string())]),
            &BTreeMap::from([(":v".to_string(), json!({"N": "1"}))]),
        )
        .unwrap();
        assert_eq!(names.len(), 2);
        assert_eq!(values.len(), 2);

        let err = merge_placeholders(
            &mut names,
            &mut values,
            &BTreeMap::from([("#UE_A".to_string(), "other".to_string())]),
            &BTreeMap::new(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::PlaceholderCollision(token) if token == "#UE_A"));
    }
}
