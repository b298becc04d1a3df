use serde_json::Value;

/// Borrow the string at a JSON pointer path, if present.
pub fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer).and_then(Value::as_str)
}

/// The unsigned integer at a JSON pointer path, defaulting to 0.
pub fn u64_at(value: &Value, pointer: &str) -> u64 {
    value
        .pointer(pointer)
        .and_then(Value::as_u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pointer_lookups() {
        let value = json!({"choices": [{"message": {"content": "hi"}}]});
        assert_eq!(str_at(&value, "/choices/0/message/content"), Some("hi"));
        assert_eq!(str_at(&value, "/choices/1/message/content"), None);
        assert_eq!(str_at(&value, "/missing"), None);
    }

    #[test]
    fn numeric_default() {
        let value = json!({"usage": {"input_tokens": 7}});
        assert_eq!(u64_at(&value, "/usage/input_tokens"), 7);
        assert_eq!(u64_at(&value, "/usage/output_tokens"), 0);
    }
}
