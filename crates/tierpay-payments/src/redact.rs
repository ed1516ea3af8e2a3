//! Masks card and identity data before anything reaches the audit log.

use serde_json::Value;

const MASK: &str = "****";

const CARD_FIELDS: [&str; 6] = [
    "number",
    "cardnumber",
    "creditcardnumber",
    "ccv",
    "cvv",
    "cvc",
];

const DOCUMENT_FIELDS: [&str; 6] = [
    "cpfcnpj",
    "cpf",
    "cnpj",
    "document",
    "documentnumber",
    "creditcardtoken",
];

/// Returns a copy of `value` with sensitive fields masked at any depth.
pub fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, field)| (key.clone(), redact_field(key, field)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}

fn redact_field(key: &str, value: &Value) -> Value {
    let key = key.to_ascii_lowercase();

    if CARD_FIELDS.contains(&key.as_str()) && !value.is_null() {
        return Value::String(MASK.to_string());
    }

    if DOCUMENT_FIELDS.contains(&key.as_str()) {
        return match value {
            Value::String(text) => Value::String(mask_keep_last4(text)),
            Value::Number(number) => Value::String(mask_keep_last4(&number.to_string())),
            other => redact(other),
        };
    }

    redact(value)
}

pub fn mask_keep_last4(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 4 {
        return MASK.to_string();
    }

    let visible: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 4), visible)
}
