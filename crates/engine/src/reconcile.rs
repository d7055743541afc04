//! Label rendering and reconciliation of the committed value against the
//! current option set.

use std::{fmt, sync::Arc};

use selectsync_types::{FieldConfig, SelectOption, is_empty_value};
use selectsync_util::{lookup_path, strip_markup, value_to_text};
use serde_json::{Value, json};

use crate::{FieldHost, ItemCache};

/// Renders option labels and extracts option values from raw items.
#[derive(Clone)]
pub struct LabelRenderer {
    host: Arc<dyn FieldHost>,
    template: Option<String>,
    value_property: Option<String>,
    read_only_value: bool,
}

impl fmt::Debug for LabelRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LabelRenderer")
            .field("template", &self.template)
            .field("value_property", &self.value_property)
            .field("read_only_value", &self.read_only_value)
            .finish()
    }
}

impl LabelRenderer {
    /// `read_only` is the display mode of the hosting form; only together with
    /// `readOnlyValue` does it bypass templating.
    pub fn new(config: &FieldConfig, host: Arc<dyn FieldHost>, read_only: bool) -> Self {
        Self {
            host,
            template: config.template.clone().filter(|template| !template.is_empty()),
            value_property: config.effective_value_property().map(str::to_string),
            read_only_value: read_only && config.read_only_value,
        }
    }

    pub fn set_template(&mut self, template: Option<String>) {
        self.template = template.filter(|template| !template.is_empty());
    }

    /// Value committed when `item` is selected: the value at the value
    /// property for object items, the item itself otherwise.
    pub fn item_value(&self, item: &Value) -> Value {
        match (item, self.value_property.as_deref()) {
            (Value::Object(_), Some(path)) => lookup_path(item, path).cloned().unwrap_or(Value::Null),
            _ => item.clone(),
        }
    }

    /// Renders the display label of a raw item.
    ///
    /// Without a template the item's `label` (or the item itself) is shown.
    /// With a template the interpolated markup is kept and only its text is
    /// localized.
    pub fn render(&self, item: &Value) -> String {
        if is_falsy(item) {
            return String::new();
        }

        if self.read_only_value {
            return value_to_text(&self.item_value(item));
        }

        let Some(template) = self.template.as_deref() else {
            let label = match item.get("label") {
                Some(label) if !is_falsy(label) => label,
                _ => item,
            };
            return match label {
                Value::String(text) => self.host.translate(text),
                other => value_to_text(other),
            };
        };

        if let Value::String(text) = item {
            return self.host.translate(text);
        }

        let rendered = self.host.interpolate(template, &json!({ "item": item }));
        if rendered.is_empty() {
            return item.to_string();
        }
        let text = strip_markup(&rendered);
        if text.is_empty() {
            return rendered;
        }
        rendered.replacen(&text, &self.host.translate(&text), 1)
    }

    /// Option for a raw item.
    pub fn option_for(&self, item: &Value) -> SelectOption {
        SelectOption::new(self.item_value(item), self.render(item))
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::String(text) => text.is_empty(),
        Value::Number(number) => number.as_f64() == Some(0.0),
        _ => false,
    }
}

/// Result of reconciling a value against the option set.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    /// Current options followed by placeholders for unmatched value elements.
    pub options: Vec<SelectOption>,
    pub external_value: Value,
}

/// Keeps the committed value representable among the options.
#[derive(Debug, Clone, Default)]
pub struct ValueReconciler {
    multiple: bool,
    placeholder: Option<String>,
}

impl ValueReconciler {
    /// `placeholder` is the already localized empty-placeholder text.
    pub fn new(multiple: bool, placeholder: Option<String>) -> Self {
        Self {
            multiple,
            placeholder: placeholder.filter(|text| !text.is_empty()),
        }
    }

    /// Empty value of the field: `[]` with multiple selection, `""` otherwise.
    pub fn empty_value(&self) -> Value {
        if self.multiple { Value::Array(Vec::new()) } else { Value::String(String::new()) }
    }

    /// Coerces a value to the field's shape. With multiple selection a scalar
    /// becomes a one-element sequence and an empty scalar becomes `[]`.
    pub fn normalize(&self, value: Value) -> Value {
        match value {
            Value::Array(_) => value,
            _ if !self.multiple => value,
            other if is_empty_value(&other) => Value::Array(Vec::new()),
            other => Value::Array(vec![other]),
        }
    }

    /// Guarantees every non-empty element of `pending` is present among the
    /// options, synthesizing `{ value: element, label: render(element) }`
    /// entries for elements no option matches.
    ///
    /// Reconciliation is pure: the cache is not modified and repeating the
    /// call with the same inputs yields the same result.
    pub fn reconcile(&self, pending: &Value, cache: &ItemCache, renderer: &LabelRenderer) -> Reconciliation {
        let external_value = self.normalize(pending.clone());
        let mut options = cache.options().to_vec();

        let elements: Vec<&Value> = match &external_value {
            Value::Array(items) if self.multiple => items.iter().collect(),
            other => vec![other],
        };
        for element in elements {
            if is_empty_value(element) || options.iter().any(|option| option.matches(element)) {
                continue;
            }
            options.push(SelectOption::new(element.clone(), renderer.render(element)));
        }

        Reconciliation { options, external_value }
    }

    /// Converts the widget's raw selection into the reportable value.
    ///
    /// While loading, or while no options exist, the committed value passes
    /// through untouched. The empty-placeholder text is never reported, and an
    /// empty selection keeps the committed value.
    pub fn reported_value(&self, selection: Value, committed: &Value, passthrough: bool) -> Value {
        if passthrough {
            return committed.clone();
        }

        let selection = match selection {
            Value::String(text) if self.is_placeholder(&text) => Value::String(String::new()),
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .filter(|item| !matches!(item, Value::String(text) if self.is_placeholder(text)))
                    .collect(),
            ),
            other => other,
        };

        match selection {
            Value::Null => committed.clone(),
            Value::String(text) if text.is_empty() => committed.clone(),
            other => self.normalize(other),
        }
    }

    fn is_placeholder(&self, text: &str) -> bool {
        self.placeholder.as_deref() == Some(text)
    }
}
