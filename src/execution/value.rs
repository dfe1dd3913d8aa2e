//! Conversion of Rhai values into the JSON interchange format.

use rhai::{Array, Dynamic, ImmutableString, Map as RhaiMap};
use serde_json::{Map, Number, Value};

use super::{EnvMap, FILTERED, MASKED};

/// Walk a declared result: keys present in `env` are masked without looking
/// at their values, maps and arrays are walked, anything else that has no
/// JSON form becomes [`FILTERED`].
pub fn sanitize(value: &Dynamic, env: &EnvMap) -> Value {
    convert(value, Some(env))
}

/// Same walk without masking; used for session snapshots and diffs.
pub fn to_json(value: &Dynamic) -> Value {
    convert(value, None)
}

pub fn map_to_json(map: &RhaiMap) -> Map<String, Value> {
    map.iter()
        .map(|(k, v)| (k.to_string(), to_json(v)))
        .collect()
}

fn convert(value: &Dynamic, env: Option<&EnvMap>) -> Value {
    if value.is_unit() {
        return Value::Null;
    }
    if let Ok(b) = value.as_bool() {
        return Value::Bool(b);
    }
    if let Ok(i) = value.as_int() {
        return Value::Number(i.into());
    }
    if let Ok(f) = value.as_float() {
        return Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(FILTERED.into()));
    }
    if let Ok(c) = value.as_char() {
        return Value::String(c.to_string());
    }
    if let Some(s) = value.read_lock::<ImmutableString>() {
        return Value::String(s.to_string());
    }
    if let Some(map) = value.read_lock::<RhaiMap>() {
        let mut out = Map::new();
        for (k, v) in map.iter() {
            let masked = env.map(|e| e.contains_key(k.as_str())).unwrap_or(false);
            let v = if masked {
                Value::String(MASKED.into())
            } else {
                convert(v, env)
            };
            out.insert(k.to_string(), v);
        }
        return Value::Object(out);
    }
    if let Some(items) = value.read_lock::<Array>() {
        return Value::Array(items.iter().map(|v| convert(v, env)).collect());
    }
    // Blobs, function pointers, timestamps and custom types.
    Value::String(FILTERED.into())
}

/// Truthiness of a declared result: null, false, zero and empty containers
/// count as "not populated".
pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64().map(|f| f == 0.0).unwrap_or(false),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// Keys of `after` that are absent from `before` or carry a different value.
/// Removed keys are not reported.
pub fn diff(after: &Map<String, Value>, before: &Map<String, Value>) -> Map<String, Value> {
    after
        .iter()
        .filter(|(k, v)| before.get(k.as_str()) != Some(v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

pub fn env_to_json(env: &EnvMap) -> Map<String, Value> {
    env.iter()
        .map(|(k, v)| (k.clone(), serde_json::to_value(v).unwrap_or(Value::Null)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::EnvEntry;
    use rhai::Blob;
    use serde_json::json;

    fn env_with(name: &str) -> EnvMap {
        let mut env = EnvMap::new();
        env.insert(name.into(), EnvEntry { value: "secret".into(), desc: None });
        env
    }

    fn rhai_map(pairs: Vec<(&str, Dynamic)>) -> Dynamic {
        let mut m = RhaiMap::new();
        for (k, v) in pairs {
            m.insert(k.into(), v);
        }
        Dynamic::from_map(m)
    }

    #[test]
    fn env_keys_are_masked_at_any_depth() {
        let inner = rhai_map(vec![("K", Dynamic::from(5_i64)), ("ok", Dynamic::from(ImmutableString::from("v")))]);
        let value = rhai_map(vec![
            ("K", rhai_map(vec![("deep", Dynamic::from(1_i64))])),
            ("other", Dynamic::from(1_i64)),
            ("list", Dynamic::from_array(vec![inner])),
        ]);
        let out = sanitize(&value, &env_with("K"));
        assert_eq!(
            out,
            json!({"K": "<masked>", "other": 1, "list": [{"K": "<masked>", "ok": "v"}]})
        );
    }

    #[test]
    fn opaque_values_are_filtered() {
        let blob: Blob = vec![1, 2, 3];
        let value = Dynamic::from_array(vec![
            Dynamic::from_blob(blob),
            Dynamic::from(f64::NAN),
            Dynamic::from('x'),
            Dynamic::UNIT,
        ]);
        assert_eq!(to_json(&value), json!(["<filtered>", "<filtered>", "x", null]));
    }

    #[test]
    fn emptiness_follows_truthiness() {
        for v in [json!(null), json!(false), json!(0), json!(0.0), json!(""), json!([]), json!({})] {
            assert!(is_empty(&v), "{v}");
        }
        for v in [json!(true), json!(1), json!("a"), json!([0]), json!({"a": null})] {
            assert!(!is_empty(&v), "{v}");
        }
    }

    #[test]
    fn diff_reports_new_and_changed_only() {
        let before = json!({"a": 1, "b": 2, "gone": 3});
        let after = json!({"a": 1, "b": 5, "c": 9});
        let d = diff(after.as_object().unwrap(), before.as_object().unwrap());
        assert_eq!(Value::Object(d), json!({"b": 5, "c": 9}));
    }
}
