//! Collaborators the field relies on but does not own.
//!
//! The hosting form supplies condition evaluation, localization, template
//! interpolation, URL bases and an event sink through [`FieldHost`].
//! [`RecordingHost`] is a self-contained implementation that keeps every
//! emitted event in memory.

use std::sync::{
    Mutex, PoisonError,
    atomic::{AtomicBool, Ordering},
};

use selectsync_api::DEFAULT_BASE_URL;
use serde::Serialize;
use serde_json::Value;

/// Events produced for the hosting form.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FieldEvent {
    /// Component-level error carrying the field identity and message.
    ComponentError { key: String, message: String },
    /// The externally reportable value changed. Silent changes should not
    /// trigger user-visible change handling.
    ValueChanged { key: String, value: Value, silent: bool },
}

/// Services the field consumes from its host.
pub trait FieldHost: Send + Sync {
    /// Visibility/applicability of the field under the form's conditions.
    fn check_conditions(&self) -> bool {
        true
    }

    fn translate(&self, text: &str) -> String {
        text.to_string()
    }

    fn interpolate(&self, template: &str, context: &Value) -> String {
        selectsync_util::interpolate(template, context)
    }

    /// Base service URL, exposed to templates as `formioBase`.
    fn base_url(&self) -> String {
        DEFAULT_BASE_URL.to_string()
    }

    /// Base project URL. Resource requests and base-relative URLs prefer it.
    fn project_url(&self) -> Option<String> {
        None
    }

    /// Current form data, exposed to templates and scripts as `data`.
    fn form_data(&self) -> Value {
        Value::Null
    }

    fn emit(&self, event: FieldEvent);
}

/// In-memory host that records events.
#[derive(Debug)]
pub struct RecordingHost {
    base_url: String,
    project_url: Option<String>,
    conditions: AtomicBool,
    form_data: Mutex<Value>,
    events: Mutex<Vec<FieldEvent>>,
}

impl Default for RecordingHost {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL, None)
    }
}

impl RecordingHost {
    pub fn new(base_url: impl Into<String>, project_url: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            project_url: project_url.map(|url| url.trim_end_matches('/').to_string()),
            conditions: AtomicBool::new(true),
            form_data: Mutex::new(Value::Null),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn set_conditions(&self, satisfied: bool) {
        self.conditions.store(satisfied, Ordering::SeqCst);
    }

    pub fn set_form_data(&self, data: Value) {
        *self.form_data.lock().unwrap_or_else(PoisonError::into_inner) = data;
    }

    pub fn events(&self) -> Vec<FieldEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn take_events(&self) -> Vec<FieldEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Messages of the component errors emitted so far.
    pub fn errors(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                FieldEvent::ComponentError { message, .. } => Some(message),
                FieldEvent::ValueChanged { .. } => None,
            })
            .collect()
    }
}

impl FieldHost for RecordingHost {
    fn check_conditions(&self) -> bool {
        self.conditions.load(Ordering::SeqCst)
    }

    fn base_url(&self) -> String {
        self.base_url.clone()
    }

    fn project_url(&self) -> Option<String> {
        self.project_url.clone()
    }

    fn form_data(&self) -> Value {
        self.form_data.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn emit(&self, event: FieldEvent) {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).push(event);
    }
}
