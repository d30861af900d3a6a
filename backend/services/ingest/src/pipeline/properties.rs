use serde_json::{Map, Value};

/// Placeholder strings HubSpot portals use for "no value". Compared lowercase.
const SENTINEL_VALUES: [&str; 8] = [
    "[not provided]",
    "placeholder",
    "[[unknown]]",
    "not set",
    "not provided",
    "unknown",
    "undefined",
    "n/a",
];

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty() || SENTINEL_VALUES.contains(&s.to_lowercase().as_str()),
        _ => false,
    }
}

/// Drop blank and placeholder values. Keys pass through unchanged.
pub fn clean_properties(properties: Map<String, Value>) -> Map<String, Value> {
    properties.into_iter().filter(|(_, v)| !is_blank(v)).collect()
}
