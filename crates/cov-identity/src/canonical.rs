// canonical.rs: Deterministic, key-sorted JSON serialization.
//
// Every byte sequence that Covenant signs or chains is produced here, so
// two implementations agree on signatures only if they agree on this
// encoding:
//
// - objects: keys sorted by ascending code point, `{"k":v,...}`, no whitespace
// - arrays: original order, `[a,b,...]`
// - scalars: serde_json's compact encoding (strings JSON-escaped, raw UTF-8)
//
// Key order in the input never matters; `serde_json`'s map type may or may
// not preserve insertion order depending on enabled features, so sorting is
// done explicitly rather than relying on the map.

use serde::Serialize;
use serde_json::Value;

/// Canonicalize a JSON value into its signing form.
pub fn canonicalize(value: &Value) -> String {
    let mut out = String::new();
    write_value(value, &mut out);
    out
}

/// Serialize any `Serialize` value and canonicalize it, returning UTF-8 bytes.
pub fn canonical_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let value = serde_json::to_value(value)?;
    Ok(canonicalize(&value).into_bytes())
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            // `String`'s `Ord` compares UTF-8 bytes, which orders by code point.
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            out.push('{');
            for (i, (key, val)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                write_value(val, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        // Null, Bool, Number, String all have a single compact form.
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn write_string(s: &str, out: &mut String) {
    out.push_str(&Value::from(s).to_string());
}
