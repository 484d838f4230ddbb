// ============================================================================
// Schema Transformer
// ============================================================================
//
// Bidirectional transcoder between the gateway's public camelCase contract
// and the automation backend's PascalCase wire format. Renames object keys
// only; array elements and primitive values are recursed into but never
// renamed themselves.
//
// Acronym handling is lossy in one direction: "JID" lowers to "jid", but
// "jid" raises to "Jid". Only camel -> Pascal -> camel round-trips.
//
// ============================================================================

use serde_json::{Map, Value};

// Well-formed payloads are shallow; the cap only guards against adversarial
// nesting. Subtrees below the cap are passed through unmodified.
const MAX_DEPTH: usize = 64;

/// Convert a single key from PascalCase to camelCase.
///
/// An all-caps token is an acronym and collapses entirely ("JID" -> "jid",
/// "ID" -> "id"); anything else only has its first character lowered, so a
/// trailing acronym survives ("OwnerJID" -> "ownerJID").
pub fn pascal_to_camel(key: &str) -> String {
    if key.is_empty() {
        return String::new();
    }
    if key.chars().all(|c| c.is_ascii_uppercase()) {
        return key.to_ascii_lowercase();
    }
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => first.to_ascii_lowercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

/// Convert a single key from camelCase to PascalCase by raising the first
/// character. Original acronym casing is not reconstructed.
pub fn camel_to_pascal(key: &str) -> String {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

/// Deep-copy `value` with every object key renamed to camelCase.
pub fn to_camel(value: &Value) -> Value {
    transform(value, &pascal_to_camel, 0)
}

/// Deep-copy `value` with every object key renamed to PascalCase.
pub fn to_pascal(value: &Value) -> Value {
    transform(value, &camel_to_pascal, 0)
}

fn transform(value: &Value, rename: &dyn Fn(&str) -> String, depth: usize) -> Value {
    if depth >= MAX_DEPTH {
        return value.clone();
    }
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, inner) in map {
                // Keys containing '@' are WhatsApp JIDs used as map keys.
                // They are data, not schema field names, and pass through.
                let new_key = if key.contains('@') {
                    key.clone()
                } else {
                    rename(key)
                };
                out.insert(new_key, transform(inner, rename, depth + 1));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| transform(item, rename, depth + 1))
                .collect(),
        ),
        other => other.clone(),
    }
}
