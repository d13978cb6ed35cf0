use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, thiserror::Error)]
pub enum CanonicalJsonError {
    #[error("invalid json: {source}")]
    Parse {
        #[source]
        source: serde_json::Error,
    },
}

/// Serialize a JSON value with sorted object keys, ASCII-only escapes and
/// compact separators. Same value always yields the same bytes.
pub fn dumps_json(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

pub fn loads_json(text: &str) -> Result<Value, CanonicalJsonError> {
    serde_json::from_str(text).map_err(|source| CanonicalJsonError::Parse { source })
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(number) => out.push_str(&number.to_string()),
        Value::String(text) => write_string(out, text),
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let ordered = map.iter().collect::<BTreeMap<_, _>>();
            out.push('{');
            for (index, (key, item)) in ordered.into_iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_string(out, key);
                out.push(':');
                write_value(out, item);
            }
            out.push('}');
        }
    }
}

fn write_string(out: &mut String, text: &str) {
    out.push('"');
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            ch if (ch as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", ch as u32));
            }
            ch if ch.is_ascii() => out.push(ch),
            ch => {
                let mut units = [0_u16; 2];
                for unit in ch.encode_utf16(&mut units) {
                    out.push_str(&format!("\\u{:04x}", unit));
                }
            }
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_keys_are_sorted_regardless_of_insertion_order() {
        let first = json!({"b": 1, "a": 2, "c": {"z": true, "y": false}});
        let second = json!({"c": {"y": false, "z": true}, "a": 2, "b": 1});
        assert_eq!(dumps_json(&first), dumps_json(&second));
        assert_eq!(
            dumps_json(&first),
            r#"{"a":2,"b":1,"c":{"y":false,"z":true}}"#
        );
    }

    #[test]
    fn non_ascii_characters_are_escaped() {
        let value = json!({"name": "héllo", "emoji": "🙂"});
        let encoded = dumps_json(&value);
        assert!(encoded.is_ascii());
        assert!(encoded.contains("\\u00e9"));
        assert!(encoded.contains("\\ud83d\\ude42"));
    }

    #[test]
    fn round_trip_preserves_admissible_values() {
        let value = json!({
            "list": [1, 2.5, "three", null, true],
            "nested": {"k": "v"},
        });
        let decoded = loads_json(&dumps_json(&value)).expect("parse");
        assert_eq!(decoded, value);
    }
}
