//! Selectable options and the equality rule that decides option uniqueness.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field name that, when present on both sides of a comparison, decides
/// equality on its own.
pub const ID_FIELD: &str = "_id";

/// One renderable, selectable entry in the dropdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectOption {
    /// Value committed when the option is selected. May be a scalar or an object.
    pub value: Value,
    /// Rendered label shown to the user.
    pub label: String,
}

impl SelectOption {
    pub fn new(value: Value, label: impl Into<String>) -> Self {
        Self {
            value,
            label: label.into(),
        }
    }

    /// Returns true when this option carries `value` under [`values_match`].
    pub fn matches(&self, value: &Value) -> bool {
        values_match(&self.value, value)
    }
}

/// Option uniqueness rule.
///
/// When both values are objects carrying an `_id` field the comparison is
/// decided by `_id` alone, even if the remaining fields differ. Otherwise the
/// values are compared structurally with [`deep_equal`].
///
/// ```rust
/// use selectsync_types::values_match;
/// use serde_json::json;
///
/// assert!(values_match(&json!({"_id": "1", "name": "a"}), &json!({"_id": "1", "name": "b"})));
/// assert!(!values_match(&json!({"_id": "1"}), &json!({"_id": "2"})));
/// assert!(values_match(&json!(1), &json!(1.0)));
/// ```
pub fn values_match(left: &Value, right: &Value) -> bool {
    if let (Some(left_id), Some(right_id)) = (object_id(left), object_id(right)) {
        return deep_equal(left_id, right_id);
    }
    deep_equal(left, right)
}

fn object_id(value: &Value) -> Option<&Value> {
    value.as_object().and_then(|map| map.get(ID_FIELD))
}

/// Structural equality over JSON values.
///
/// Numbers compare by numeric value so `1` and `1.0` are equal, objects compare
/// key-by-key regardless of key order, and arrays compare element-wise in order.
pub fn deep_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(left_number), Value::Number(right_number)) => {
            if left_number == right_number {
                return true;
            }
            match (left_number.as_f64(), right_number.as_f64()) {
                (Some(left_float), Some(right_float)) => left_float == right_float,
                _ => false,
            }
        }
        (Value::Array(left_items), Value::Array(right_items)) => {
            left_items.len() == right_items.len()
                && left_items
                    .iter()
                    .zip(right_items)
                    .all(|(left_item, right_item)| deep_equal(left_item, right_item))
        }
        (Value::Object(left_map), Value::Object(right_map)) => {
            left_map.len() == right_map.len()
                && left_map
                    .iter()
                    .all(|(key, left_value)| right_map.get(key).is_some_and(|right_value| deep_equal(left_value, right_value)))
        }
        _ => left == right,
    }
}

/// Returns true for values that count as "nothing": `null`, the empty string
/// and the empty array.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn id_field_takes_precedence_over_content() {
        let stored = json!({"_id": "abc", "data": {"name": "Old"}});
        let incoming = json!({"_id": "abc", "data": {"name": "New"}});
        assert!(values_match(&stored, &incoming));
    }

    #[test]
    fn id_only_on_one_side_falls_back_to_structure() {
        let stored = json!({"_id": "abc", "name": "x"});
        let incoming = json!({"name": "x"});
        assert!(!values_match(&stored, &incoming));
        assert!(values_match(&json!({"name": "x"}), &json!({"name": "x"})));
    }

    #[test]
    fn objects_compare_independent_of_key_order() {
        let left: Value = serde_json::from_str(r#"{"a":1,"b":[1,2]}"#).expect("json");
        let right: Value = serde_json::from_str(r#"{"b":[1,2],"a":1.0}"#).expect("json");
        assert!(deep_equal(&left, &right));
        assert!(!deep_equal(&json!([1, 2]), &json!([2, 1])));
    }

    #[test]
    fn empty_values() {
        assert!(is_empty_value(&Value::Null));
        assert!(is_empty_value(&json!("")));
        assert!(is_empty_value(&json!([])));
        assert!(!is_empty_value(&json!(0)));
        assert!(!is_empty_value(&json!({})));
    }
}
