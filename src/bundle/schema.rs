//! Canonical JSON representation used for reproducible hashing (spec §9
//! "Dynamic schema objects"). Form schemas and UI schemas arrive as
//! free-form JSON; before hashing we collapse them into a tagged variant
//! tree that sorts object keys and normalizes scalars, so two
//! semantically-identical documents with different key order or whitespace
//! hash identically.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub enum Canonical {
    Object(BTreeMap<String, Canonical>),
    Array(Vec<Canonical>),
    String(String),
    Number(String),
    Bool(bool),
    Null,
}

impl Canonical {
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(map) => Canonical::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Canonical::from_value(v)))
                    .collect(),
            ),
            Value::Array(items) => {
                Canonical::Array(items.iter().map(Canonical::from_value).collect())
            }
            Value::String(s) => Canonical::String(s.clone()),
            Value::Number(n) => Canonical::Number(n.to_string()),
            Value::Bool(b) => Canonical::Bool(*b),
            Value::Null => Canonical::Null,
        }
    }

    /// Renders the canonical form as a deterministic byte string: sorted
    /// object keys (guaranteed by `BTreeMap`'s iteration order), no
    /// insignificant whitespace.
    pub fn to_canonical_string(&self) -> String {
        let mut out = String::new();
        self.write(&mut out);
        out
    }

    fn write(&self, out: &mut String) {
        match self {
            Canonical::Object(map) => {
                out.push('{');
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push_str(&serde_json::to_string(k).unwrap_or_default());
                    out.push(':');
                    v.write(out);
                }
                out.push('}');
            }
            Canonical::Array(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    item.write(out);
                }
                out.push(']');
            }
            Canonical::String(s) => out.push_str(&serde_json::to_string(s).unwrap_or_default()),
            Canonical::Number(n) => out.push_str(n),
            Canonical::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Canonical::Null => out.push_str("null"),
        }
    }
}

/// SHA-256 of a value's canonical JSON form, hex-encoded.
pub fn canonical_hash(value: &Value) -> String {
    let canonical = Canonical::from_value(value).to_canonical_string();
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

/// A field is core iff its descriptor has `x-core: true` or its name begins
/// with `core_` (spec §3 "Form Schema (semantic view)").
pub fn is_core_field(name: &str, descriptor: &Value) -> bool {
    name.starts_with("core_")
        || descriptor
            .get("x-core")
            .and_then(Value::as_bool)
            .unwrap_or(false)
}

/// Extracts `schema.properties` as `(name, descriptor)` pairs, tolerating a
/// schema with no `properties` key (an empty form).
pub fn properties(schema: &Value) -> Vec<(String, Value)> {
    schema
        .get("properties")
        .and_then(Value::as_object)
        .map(|props| {
            props
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
        .unwrap_or_default()
}

/// The core fingerprint: canonical JSON of the set of core-field
/// descriptors, keyed by field name so ordering never matters.
pub fn core_fingerprint(schema: &Value) -> Value {
    let mut core = serde_json::Map::new();
    for (name, descriptor) in properties(schema) {
        if is_core_field(&name, &descriptor) {
            core.insert(name, descriptor);
        }
    }
    Value::Object(core)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_hash_ignores_key_order_and_whitespace() {
        let a = json!({"b": 1, "a": 2});
        let b = json!({"a": 2, "b": 1});
        assert_eq!(canonical_hash(&a), canonical_hash(&b));
    }

    #[test]
    fn canonical_hash_differs_on_value_change() {
        let a = json!({"a": 1});
        let b = json!({"a": 2});
        assert_ne!(canonical_hash(&a), canonical_hash(&b));
    }

    #[test]
    fn core_field_detection_by_prefix_and_flag() {
        assert!(is_core_field("core_id", &json!({})));
        assert!(is_core_field("name", &json!({"x-core": true})));
        assert!(!is_core_field("name", &json!({"x-core": false})));
        assert!(!is_core_field("name", &json!({})));
    }

    #[test]
    fn core_fingerprint_ignores_non_core_fields() {
        let schema = json!({
            "properties": {
                "core_id": {"type": "string"},
                "name": {"type": "string"}
            }
        });
        let fp = core_fingerprint(&schema);
        assert_eq!(fp, json!({"core_id": {"type": "string"}}));
    }
}
