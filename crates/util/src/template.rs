//! # Template Interpolation
//!
//! Substitutes `{{ path }}` expressions with values looked up in a JSON
//! context object. Paths use dot notation with optional bracket indices
//! (`item.label`, `data.items[0].name`, `data.items.0.name`).
//!
//! Interpolation is total: missing paths render as the empty string and an
//! unclosed `{{` leaves the rest of the text untouched.
//!
//! ```rust
//! use selectsync_util::template::interpolate;
//! use serde_json::json;
//!
//! let context = json!({ "item": { "label": "Alpha" }, "limit": 10 });
//! assert_eq!(interpolate("<span>{{ item.label }}</span>", &context), "<span>Alpha</span>");
//! assert_eq!(interpolate("limit={{limit}}&x={{ missing }}", &context), "limit=10&x=");
//! ```

use serde_json::Value;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Interpolates every `{{ ... }}` expression in `template`.
pub fn interpolate(template: &str, context: &Value) -> String {
    if !template.contains(OPEN) {
        return template.to_string();
    }

    let mut output = String::with_capacity(template.len());
    let mut remaining = template;

    while let Some(start) = remaining.find(OPEN) {
        let (before, after) = remaining.split_at(start);
        output.push_str(before);

        let Some(end) = after.find(CLOSE) else {
            output.push_str(after);
            return output;
        };
        let expression = after[OPEN.len()..end].trim();
        if !expression.is_empty()
            && let Some(value) = lookup_path(context, expression)
        {
            output.push_str(&value_to_text(value));
        }
        remaining = &after[end + CLOSE.len()..];
    }

    output.push_str(remaining);
    output
}

/// Recursively interpolates every string inside a JSON value.
pub fn interpolate_value(value: &Value, context: &Value) -> Value {
    match value {
        Value::String(text) => Value::String(interpolate(text, context)),
        Value::Array(items) => Value::Array(items.iter().map(|item| interpolate_value(item, context)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, nested)| (key.clone(), interpolate_value(nested, context)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Looks up a dotted path (with optional bracket indices) inside `value`.
///
/// An empty path returns `value` itself.
pub fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path_segments(path) {
        current = match current {
            Value::Object(map) => map.get(segment.as_str())?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn path_segments(path: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut characters = path.trim().chars().peekable();

    while let Some(character) = characters.next() {
        match character {
            '.' => {
                if !current.is_empty() {
                    segments.push(std::mem::take(&mut current));
                }
            }
            '[' => {
                if !current.is_empty() {
                    segments.push(std::mem::take(&mut current));
                }
                let mut inner = String::new();
                for next in characters.by_ref() {
                    if next == ']' {
                        break;
                    }
                    inner.push(next);
                }
                let inner = inner.trim().trim_matches(|c| c == '"' || c == '\'');
                if !inner.is_empty() {
                    segments.push(inner.to_string());
                }
            }
            _ => current.push(character),
        }
    }

    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

/// Renders a JSON value as plain text: strings without quotes, `null` as the
/// empty string, arrays as comma-joined entries, everything else as JSON.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Array(items) => items.iter().map(value_to_text).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}
