//! Variable resolution and flattening.
//!
//! Layers are merged lowest precedence first: built-ins, target-level,
//! configuration version, member override. Mappings merge key by key at
//! every depth; any other value replaces what the lower layer had.

use std::collections::BTreeMap;

use serde_json::{Map, Value, json};

/// Built-in variables available to every member.
#[must_use]
pub fn builtins(build_id: &str, target_id: &str, target_name: &str, member: &str, namespace: &str) -> Value {
    json!({
        "BuildID": build_id,
        "TargetID": target_id,
        "TargetName": target_name,
        "MemberName": member,
        "Namespace": namespace,
    })
}

/// Merges `layers` in order; later layers win.
///
/// Non-mapping layers (including `null`) contribute nothing.
#[must_use]
pub fn resolve(layers: &[&Value]) -> Value {
    let mut resolved = Value::Object(Map::new());
    for layer in layers {
        if layer.is_object() {
            overlay(&mut resolved, layer);
        }
    }
    resolved
}

fn overlay(base: &mut Value, top: &Value) {
    match (base, top) {
        (Value::Object(base), Value::Object(top)) => {
            for (key, value) in top {
                let nested = value.is_object() && base.get(key).is_some_and(Value::is_object);
                if let Some(existing) = base.get_mut(key).filter(|_| nested) {
                    overlay(existing, value);
                } else {
                    let _ = base.insert(key.clone(), value.clone());
                }
            }
        }
        (base, top) => *base = top.clone(),
    }
}

/// Flattens a variable tree into string variables.
///
/// Nested keys join with `_` (`SSL.Enabled` becomes `SSL_Enabled`).
/// Strings are kept, booleans and numbers are printed; sequences and
/// nulls are skipped.
#[must_use]
pub fn flatten(vars: &Value) -> BTreeMap<String, String> {
    let mut flat = BTreeMap::new();
    if let Value::Object(map) = vars {
        flatten_into(&mut flat, None, map);
    }
    flat
}

fn flatten_into(flat: &mut BTreeMap<String, String>, prefix: Option<&str>, map: &Map<String, Value>) {
    for (key, value) in map {
        let name = prefix.map_or_else(|| key.clone(), |p| format!("{p}_{key}"));
        let text = match value {
            Value::Object(inner) => {
                flatten_into(flat, Some(&name), inner);
                continue;
            }
            Value::String(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::Array(_) | Value::Null => continue,
        };
        let _ = flat.insert(name, text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_beats_configuration_beats_target() {
        let target = json!({"PORT": 80, "HOST": "a"});
        let configuration = json!({"PORT": 3000});
        let overrides = json!({"PORT": 5433});
        let resolved = resolve(&[&builtins("b", "t", "n", "m", "ns"), &target, &configuration, &overrides]);
        assert_eq!(resolved["PORT"], 5433);
        assert_eq!(resolved["HOST"], "a");
        assert_eq!(resolved["MemberName"], "m");
    }

    #[test]
    fn builtins_have_lowest_precedence() {
        let resolved = resolve(&[&builtins("b", "t", "n", "m", "ns"), &json!({"TargetName": "custom"})]);
        assert_eq!(resolved["TargetName"], "custom");
    }

    #[test]
    fn nested_maps_merge_per_key() {
        let target = json!({"SSL": {"Enabled": true, "Port": 443}});
        let overrides = json!({"SSL": {"Certificate": "cert.pem", "Port": 8443}});
        let resolved = resolve(&[&target, &Value::Null, &overrides]);
        assert_eq!(resolved, json!({"SSL": {"Enabled": true, "Port": 8443, "Certificate": "cert.pem"}}));
    }

    #[test]
    fn scalar_replaces_map() {
        let resolved = resolve(&[&json!({"DB": {"Host": "x"}}), &json!({"DB": "sqlite"})]);
        assert_eq!(resolved["DB"], "sqlite");
    }

    #[test]
    fn flatten_joins_and_stringifies() {
        let flat = flatten(&json!({
            "SSL": {"Enabled": true, "Cert": {"Path": "/c"}},
            "PORT": 5433,
            "NAME": "api",
            "LIST": [1, 2],
            "NONE": null
        }));
        let expected: BTreeMap<String, String> = [
            ("NAME", "api"),
            ("PORT", "5433"),
            ("SSL_Cert_Path", "/c"),
            ("SSL_Enabled", "true"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        assert_eq!(flat, expected);
    }
}
