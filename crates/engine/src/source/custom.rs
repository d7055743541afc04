//! Evaluation seam for `custom` data sources.
//!
//! Scripts run against an explicit context object; nothing outside that
//! object is reachable. The built-in [`ScriptEvaluator`] understands a small
//! statement language:
//!
//! ```text
//! values = data.countries
//! values.push({ "value": "other", "label": "Other" })
//! return values
//! ```
//!
//! Statements are separated by `;` or newlines. An expression is a JSON
//! literal, a single-quoted string or a dotted path into the context
//! (`values`, `data.items.0`, `data.items[0].name`). A script made of one
//! bare expression evaluates to that expression.

use serde_json::{Map, Value};
use tracing::debug;

use crate::SelectError;
use selectsync_util::lookup_path;

const VALUES: &str = "values";

/// Capability-scoped evaluator for custom option scripts.
///
/// `dataSrc: custom` fields run their script through the evaluator given to
/// `SyncController::with_evaluator`, or through [`ScriptEvaluator`] by
/// default. The context holds `data` (the form data) and `values`
/// (initially an empty list).
pub trait CustomEvaluator: Send + Sync {
    /// Evaluates `script` against `context` and returns the computed items.
    fn evaluate(&self, script: &str, context: &Value) -> Result<Vec<Value>, SelectError>;
}

/// Evaluator for the built-in statement language.
///
/// Supported statements, separated by `;` or newlines:
///
/// - `values = <expr>` replaces `values`
/// - `values.push(<expr>)` appends to `values`, which must be a list
/// - `return <expr>` ends the script with `<expr>` as its result
///
/// `<expr>` is a JSON literal, a single-quoted string or a dotted path into
/// the context such as `data.items[0].name`. Without a `return`, the script
/// yields `values`; a script of one bare expression yields that expression.
/// Anything else, or a result that is not a list, fails with
/// [`SelectError::Evaluation`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptEvaluator;

impl CustomEvaluator for ScriptEvaluator {
    fn evaluate(&self, script: &str, context: &Value) -> Result<Vec<Value>, SelectError> {
        let mut scope = match context {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        scope.entry(VALUES).or_insert_with(|| Value::Array(Vec::new()));

        let statements = split_statements(script)?;
        debug!(statement_count = statements.len(), "custom script evaluation started");

        let result = if let [only] = statements.as_slice()
            && !is_statement(only)
        {
            evaluate_expression(only, &scope)?
        } else {
            let mut returned = None;
            for statement in &statements {
                if let Some(value) = execute_statement(statement, &mut scope)? {
                    returned = Some(value);
                    break;
                }
            }
            returned.unwrap_or_else(|| scope.get(VALUES).cloned().unwrap_or(Value::Null))
        };

        match result {
            Value::Array(items) => Ok(items),
            other => Err(SelectError::Evaluation(format!(
                "script must produce a list, got {}",
                kind_name(&other)
            ))),
        }
    }
}

fn is_statement(statement: &str) -> bool {
    statement.starts_with("return ") || push_argument(statement).is_some() || assignment_expression(statement).is_some()
}

fn execute_statement(statement: &str, scope: &mut Map<String, Value>) -> Result<Option<Value>, SelectError> {
    if let Some(expression) = statement.strip_prefix("return ") {
        return evaluate_expression(expression, scope).map(Some);
    }

    if let Some(argument) = push_argument(statement) {
        let value = evaluate_expression(argument, scope)?;
        return match scope.get_mut(VALUES) {
            Some(Value::Array(items)) => {
                items.push(value);
                Ok(None)
            }
            _ => Err(SelectError::Evaluation("values.push requires values to be a list".into())),
        };
    }

    if let Some(expression) = assignment_expression(statement) {
        let value = evaluate_expression(expression, scope)?;
        scope.insert(VALUES.to_string(), value);
        return Ok(None);
    }

    Err(SelectError::Evaluation(format!("unsupported statement `{statement}`")))
}

fn push_argument(statement: &str) -> Option<&str> {
    statement
        .strip_prefix("values.push(")
        .and_then(|rest| rest.strip_suffix(')'))
        .map(str::trim)
}

fn assignment_expression(statement: &str) -> Option<&str> {
    let rest = statement.strip_prefix(VALUES)?.trim_start();
    let expression = rest.strip_prefix('=')?;
    if expression.starts_with('=') {
        return None;
    }
    Some(expression.trim())
}

fn evaluate_expression(expression: &str, scope: &Map<String, Value>) -> Result<Value, SelectError> {
    let expression = expression.trim();
    if expression.is_empty() {
        return Err(SelectError::Evaluation("empty expression".into()));
    }

    if let Ok(literal) = serde_json::from_str::<Value>(expression) {
        return Ok(literal);
    }

    if let Some(inner) = expression.strip_prefix('\'').and_then(|rest| rest.strip_suffix('\''))
        && !inner.contains('\'')
    {
        return Ok(Value::String(inner.to_string()));
    }

    if !is_path(expression) {
        return Err(SelectError::Evaluation(format!("cannot evaluate `{expression}`")));
    }

    let (root, rest) = match expression.find(['.', '[']) {
        Some(index) => expression.split_at(index),
        None => (expression, ""),
    };
    let root_value = scope
        .get(root)
        .ok_or_else(|| SelectError::Evaluation(format!("`{root}` is not defined")))?;
    lookup_path(root_value, rest)
        .cloned()
        .ok_or_else(|| SelectError::Evaluation(format!("`{expression}` did not resolve")))
}

fn is_path(expression: &str) -> bool {
    expression
        .chars()
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_' || first == '$')
        && expression
            .chars()
            .all(|character| character.is_ascii_alphanumeric() || matches!(character, '_' | '$' | '.' | '[' | ']' | '"' | '\''))
}

/// Splits on `;` and newlines that are outside strings and brackets.
fn split_statements(script: &str) -> Result<Vec<String>, SelectError> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut depth: usize = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for character in script.chars() {
        if let Some(open) = quote {
            current.push(character);
            if escaped {
                escaped = false;
            } else if character == '\\' {
                escaped = true;
            } else if character == open {
                quote = None;
            }
            continue;
        }

        match character {
            '"' | '\'' => {
                quote = Some(character);
                current.push(character);
            }
            '[' | '{' | '(' => {
                depth += 1;
                current.push(character);
            }
            ']' | '}' | ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| SelectError::Evaluation(format!("unbalanced `{character}`")))?;
                current.push(character);
            }
            ';' | '\n' if depth == 0 => push_statement(&mut statements, &mut current),
            _ => current.push(character),
        }
    }

    if quote.is_some() || depth != 0 {
        return Err(SelectError::Evaluation("unterminated string or bracket".into()));
    }
    push_statement(&mut statements, &mut current);
    Ok(statements)
}

fn push_statement(statements: &mut Vec<String>, current: &mut String) {
    let statement = current.trim();
    if !statement.is_empty() {
        statements.push(statement.to_string());
    }
    current.clear();
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn evaluate(script: &str, data: Value) -> Result<Vec<Value>, SelectError> {
        ScriptEvaluator.evaluate(script, &json!({ "values": [], "data": data }))
    }

    #[test]
    fn assigns_and_pushes_values() {
        let items = evaluate(
            "values = data.countries;\nvalues.push({\"value\": \"xx\", \"label\": \"Other; unknown\"})",
            json!({ "countries": [ { "value": "nl", "label": "Netherlands" } ] }),
        )
        .expect("items");
        assert_eq!(items.len(), 2);
        assert_eq!(items[1]["label"], "Other; unknown");
    }

    #[test]
    fn return_short_circuits() {
        let items = evaluate("return ['a', 'b']", Value::Null);
        assert!(items.is_err(), "single-quoted arrays are not JSON");

        let items = evaluate("return [\"a\", \"b\"]; values.push(1)", Value::Null).expect("items");
        assert_eq!(items, vec![json!("a"), json!("b")]);
    }

    #[test]
    fn bare_expression_is_the_result() {
        let items = evaluate("data.items", json!({ "items": [1, 2, 3] })).expect("items");
        assert_eq!(items, vec![json!(1), json!(2), json!(3)]);
    }

    #[test]
    fn empty_script_yields_initial_values() {
        assert_eq!(evaluate("  ", Value::Null).expect("items"), Vec::<Value>::new());
    }

    #[test]
    fn failures_are_evaluation_errors() {
        assert!(matches!(evaluate("values = data.missing", json!({})), Err(SelectError::Evaluation(_))));
        assert!(matches!(evaluate("values = 42", Value::Null), Err(SelectError::Evaluation(_))));
        assert!(matches!(evaluate("launch()", Value::Null), Err(SelectError::Evaluation(_))));
        assert!(matches!(evaluate("values = [1, 2", Value::Null), Err(SelectError::Evaluation(_))));
    }
}
