use serde_json::Value;

/// Collect every string in `output` that starts with `prefix`, depth first,
/// in document order. Duplicates are kept once.
pub fn extract_asset_refs(output: &Value, prefix: &str) -> Vec<String> {
    let mut found = Vec::new();
    collect(output, prefix, &mut found);
    found
}

fn collect(value: &Value, prefix: &str, found: &mut Vec<String>) {
    match value {
        Value::String(s) if s.starts_with(prefix) => {
            if !found.iter().any(|f| f == s) {
                found.push(s.clone());
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect(v, prefix, found)),
        Value::Object(map) => map.values().for_each(|v| collect(v, prefix, found)),
        _ => {}
    }
}
