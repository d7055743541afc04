//! Option synchronization state machine.
//!
//! [`SyncController`] is a plain state machine: it never awaits. Operations
//! return a [`SyncStep`] describing what the caller has to do next (nothing,
//! wait for a debounce deadline, or execute a fetch and hand the result back
//! through [`SyncController::complete_fetch`]). The async driver lives in
//! `runtime`.

use std::{sync::Arc, time::Duration};

use selectsync_types::{
    DataSourceConfig, FetchRequest, FetchResponse, FetchWindow, FieldConfig, SearchTerm, SelectOption, SourceKind, deep_equal,
    is_empty_value,
};
use selectsync_util::http::extract_collection;
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::debounce::SearchCoalescer;
use super::readiness::{ItemsLoaded, ReadinessSignal};
use crate::{
    FieldEvent, FieldHost, ItemCache, LabelRenderer, SelectError, ValueReconciler,
    source::{CustomEvaluator, Resolution, SourceResolver},
};

/// What asked for a synchronization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncTrigger {
    /// The field was attached to the form.
    Mount,
    /// The field became visible or the dropdown was opened.
    Reveal,
    /// The field received focus.
    Focus,
    /// Explicit refresh.
    Refresh,
    /// Search input changed; `None` clears the search.
    Search(Option<SearchTerm>),
    /// The option list was scrolled to its end.
    Scroll,
    /// One-time lookup of a committed value on a never-activated lazy field.
    ValueInit,
}

impl SyncTrigger {
    /// Triggers that activate a lazily loaded field.
    pub fn activates(&self) -> bool {
        matches!(self, Self::Reveal | Self::Focus | Self::Refresh)
    }

    /// Triggers originating from user interaction, ignored while disabled.
    pub fn is_interaction(&self) -> bool {
        matches!(self, Self::Focus | Self::Search(_) | Self::Scroll)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    Gated,
    Resolving,
    Merging,
    Ready,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ActivationState {
    pub activated: bool,
    pub loading: bool,
    pub scroll_loading: bool,
}

/// Why a request did not start a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Hidden,
    AwaitingActivation,
    Disabled,
    ScrollInFlight,
    Misconfigured,
}

/// A fetch the caller must execute.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingFetch {
    /// Cycle the result belongs to; pass it back to `complete_fetch`.
    pub cycle: u64,
    /// The result is appended instead of replacing the cache.
    pub accumulate: bool,
    pub request: FetchRequest,
}

/// Next action after a controller operation.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncStep {
    Skipped(SkipReason),
    /// A search was scheduled; call `poll_debounce` at `due`.
    Debounced { due: Instant },
    Fetch(PendingFetch),
    /// The cycle finished synchronously.
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Applied,
    /// The result belonged to a superseded cycle and was discarded.
    Stale,
}

/// Serializable view of the field state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSnapshot {
    pub key: String,
    pub source: SourceKind,
    pub phase: SyncPhase,
    pub generation: u64,
    pub ready: bool,
    pub value: Value,
    pub options: Vec<SelectOption>,
    pub search: Option<SearchTerm>,
    pub skip: usize,
    pub downloaded: usize,
    pub known_server_total: Option<usize>,
    pub activation: ActivationState,
    pub visible: bool,
    pub disabled: bool,
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    cycle: u64,
    accumulate: bool,
}

/// Orchestrates option synchronization for one field instance.
pub struct SyncController {
    config: FieldConfig,
    host: Arc<dyn FieldHost>,
    resolver: SourceResolver,
    renderer: LabelRenderer,
    reconciler: ValueReconciler,
    cache: ItemCache,
    options: Vec<SelectOption>,
    window: FetchWindow,
    activation: ActivationState,
    phase: SyncPhase,
    value: Value,
    visible: bool,
    disabled: bool,
    read_only: bool,
    lazy_load_init: bool,
    coalescer: SearchCoalescer,
    readiness: ReadinessSignal,
    cycle: u64,
    in_flight: Option<InFlight>,
}

impl std::fmt::Debug for SyncController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncController")
            .field("key", &self.config.key)
            .field("phase", &self.phase)
            .field("cycle", &self.cycle)
            .field("generation", &self.readiness.generation())
            .finish_non_exhaustive()
    }
}

impl SyncController {
    pub fn new(config: FieldConfig, host: Arc<dyn FieldHost>) -> Self {
        Self::with_resolver(config, host, SourceResolver::default())
    }

    pub fn with_evaluator(config: FieldConfig, host: Arc<dyn FieldHost>, evaluator: Arc<dyn CustomEvaluator>) -> Self {
        Self::with_resolver(config, host, SourceResolver::new(evaluator))
    }

    fn with_resolver(config: FieldConfig, host: Arc<dyn FieldHost>, resolver: SourceResolver) -> Self {
        let renderer = LabelRenderer::new(&config, Arc::clone(&host), false);
        let reconciler = ValueReconciler::new(
            config.multiple,
            config.placeholder.as_deref().map(|placeholder| host.translate(placeholder)),
        );
        let value = reconciler.empty_value();
        Self {
            window: FetchWindow::new(config.limit),
            coalescer: SearchCoalescer::new(Duration::from_millis(config.search_debounce_ms)),
            config,
            host,
            resolver,
            renderer,
            reconciler,
            cache: ItemCache::default(),
            options: Vec::new(),
            activation: ActivationState::default(),
            phase: SyncPhase::Idle,
            value,
            visible: true,
            disabled: false,
            read_only: false,
            lazy_load_init: false,
            readiness: ReadinessSignal::new(),
            cycle: 0,
            in_flight: None,
        }
    }

    /// Read-only form mode. Lazy fields count as active and `readOnlyValue`
    /// labels show the raw extracted value.
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
        self.renderer = LabelRenderer::new(&self.config, Arc::clone(&self.host), read_only);
        self.cache.rebuild(&self.renderer);
        self.apply_reconcile();
    }

    pub fn config(&self) -> &FieldConfig {
        &self.config
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn activation(&self) -> ActivationState {
        self.activation
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Cache options augmented with placeholders for the committed value.
    pub fn options(&self) -> &[SelectOption] {
        &self.options
    }

    pub fn cache(&self) -> &ItemCache {
        &self.cache
    }

    pub fn window(&self) -> &FetchWindow {
        &self.window
    }

    pub fn generation(&self) -> u64 {
        self.readiness.generation()
    }

    pub fn is_ready(&self) -> bool {
        self.readiness.is_resolved()
    }

    /// Waiter for the current readiness generation.
    pub fn items_loaded(&self) -> ItemsLoaded {
        self.readiness.waiter()
    }

    pub fn next_debounce_deadline(&self) -> Option<Instant> {
        self.coalescer.deadline()
    }

    fn is_active(&self) -> bool {
        !self.config.lazy_load || self.activation.activated || self.read_only
    }

    fn is_hidden(&self) -> bool {
        !self.visible || !self.host.check_conditions()
    }

    /// Requests a synchronization.
    ///
    /// Search triggers are coalesced: the returned step is
    /// [`SyncStep::Debounced`] and the cycle runs from
    /// [`poll_debounce`](Self::poll_debounce) once the window elapses without
    /// another search.
    pub fn request_sync(&mut self, trigger: SyncTrigger, now: Instant) -> SyncStep {
        if self.disabled && trigger.is_interaction() {
            debug!(field = %self.config.key, ?trigger, "field disabled, ignoring trigger");
            return SyncStep::Skipped(SkipReason::Disabled);
        }

        if let SyncTrigger::Search(term) = &trigger
            && !self.coalescer.window().is_zero()
        {
            if !self.coalescer.is_pending() && self.readiness.is_resolved() {
                self.readiness.rearm();
            }
            let due = self.coalescer.schedule(term.clone(), now);
            debug!(field = %self.config.key, "search scheduled");
            return SyncStep::Debounced { due };
        }

        if trigger == SyncTrigger::Refresh {
            return self.refresh();
        }
        self.run_cycle(trigger)
    }

    /// Runs the pending search once its deadline has passed.
    pub fn poll_debounce(&mut self, now: Instant) -> Option<SyncStep> {
        let term = self.coalescer.take_due(now)?;
        if self.disabled {
            self.settle_without_fetch();
            return Some(SyncStep::Skipped(SkipReason::Disabled));
        }
        Some(self.run_cycle(SyncTrigger::Search(term)))
    }

    fn run_cycle(&mut self, trigger: SyncTrigger) -> SyncStep {
        if self.is_hidden() {
            debug!(field = %self.config.key, ?trigger, "field hidden, resolving readiness");
            self.phase = SyncPhase::Idle;
            self.activation.loading = false;
            self.activation.scroll_loading = false;
            self.readiness.resolve();
            return SyncStep::Skipped(SkipReason::Hidden);
        }

        let kind = self.config.source.kind();
        if kind.is_remote() {
            if trigger.activates() && !self.activation.activated {
                info!(field = %self.config.key, ?trigger, "field activated");
                self.activation.activated = true;
            }
            if !self.is_active() && trigger != SyncTrigger::ValueInit {
                debug!(field = %self.config.key, ?trigger, "awaiting activation");
                self.phase = SyncPhase::Gated;
                return SyncStep::Skipped(SkipReason::AwaitingActivation);
            }
        }

        let accumulate = kind == SourceKind::Resource && trigger == SyncTrigger::Scroll;
        if trigger == SyncTrigger::Scroll {
            if self.activation.loading {
                return SyncStep::Skipped(SkipReason::ScrollInFlight);
            }
            if !accumulate || !self.cache.additional_pages_available() {
                debug!(
                    field = %self.config.key,
                    downloaded = self.cache.downloaded_count(),
                    known_server_total = ?self.cache.known_server_total(),
                    "no additional pages, re-applying cache"
                );
                self.apply_reconcile();
                self.phase = SyncPhase::Ready;
                self.readiness.resolve();
                return SyncStep::Completed;
            }
        }

        if accumulate {
            self.window.advance_to(self.cache.downloaded_count());
        } else {
            let term = match trigger {
                SyncTrigger::Search(term) => term,
                SyncTrigger::ValueInit => SearchTerm::from_value(&self.value),
                _ => None,
            };
            self.window.restart(term);
            if self.readiness.is_resolved() {
                self.readiness.rearm();
            }
        }

        self.cycle += 1;
        let cycle = self.cycle;
        self.in_flight = None;
        self.phase = SyncPhase::Resolving;

        match self.resolver.resolve(&self.config, &self.window, self.host.as_ref()) {
            Ok(Resolution::Items(items)) => {
                self.activation.loading = false;
                self.activation.scroll_loading = false;
                self.merge(items, None, false);
                SyncStep::Completed
            }
            Ok(Resolution::Fetch(request)) => {
                debug!(
                    field = %self.config.key,
                    cycle,
                    accumulate,
                    skip = self.window.skip,
                    "option fetch planned"
                );
                self.activation.loading = true;
                self.activation.scroll_loading = accumulate;
                self.in_flight = Some(InFlight { cycle, accumulate });
                SyncStep::Fetch(PendingFetch {
                    cycle,
                    accumulate,
                    request,
                })
            }
            Err(SelectError::Configuration(message)) => {
                warn!(field = %self.config.key, error = %message, "data source misconfigured");
                self.activation.loading = false;
                self.activation.scroll_loading = false;
                self.phase = SyncPhase::Idle;
                self.readiness.resolve();
                SyncStep::Skipped(SkipReason::Misconfigured)
            }
            Err(error) => {
                warn!(field = %self.config.key, error = %error, "option resolution failed");
                self.emit_error(&error);
                self.activation.loading = false;
                self.activation.scroll_loading = false;
                self.merge(Vec::new(), None, false);
                SyncStep::Completed
            }
        }
    }

    /// Applies the result of a fetch started by this controller.
    ///
    /// Results of any cycle other than the most recently started one are
    /// discarded. Failures keep the previous options, emit a component error
    /// and still resolve readiness.
    pub fn complete_fetch(&mut self, cycle: u64, result: Result<FetchResponse, SelectError>) -> MergeOutcome {
        let in_flight = match self.in_flight {
            Some(in_flight) if in_flight.cycle == cycle => in_flight,
            _ => {
                debug!(field = %self.config.key, cycle, current = self.cycle, "stale fetch result discarded");
                return MergeOutcome::Stale;
            }
        };
        self.in_flight = None;
        self.activation.loading = false;
        self.activation.scroll_loading = false;

        match result {
            Ok(response) => {
                let (items, payload_total) = extract_collection(&response.body, self.config.select_values.as_deref());
                let total = payload_total.or(response.server_count);
                info!(
                    field = %self.config.key,
                    cycle,
                    item_count = items.len(),
                    known_server_total = ?total,
                    accumulate = in_flight.accumulate,
                    "option fetch completed"
                );
                self.merge(items, total, in_flight.accumulate);
            }
            Err(error) => {
                warn!(field = %self.config.key, cycle, error = %error, "unable to load options");
                self.emit_error(&error);
                self.apply_reconcile();
                self.phase = SyncPhase::Ready;
                self.readiness.resolve();
            }
        }
        MergeOutcome::Applied
    }

    fn merge(&mut self, items: Vec<Value>, total: Option<usize>, accumulate: bool) {
        self.phase = SyncPhase::Merging;
        if accumulate {
            self.cache.append(items, total, &self.renderer);
        } else {
            self.cache.replace(items, total, &self.renderer);
        }
        self.apply_reconcile();

        if is_empty_value(&self.value)
            && let Some(default_value) = self.config.default_value.clone().filter(|value| !is_empty_value(value))
        {
            self.commit_value(default_value, false);
        }

        self.phase = SyncPhase::Ready;
        self.readiness.resolve();
    }

    fn apply_reconcile(&mut self) {
        let reconciliation = self.reconciler.reconcile(&self.value, &self.cache, &self.renderer);
        self.options = reconciliation.options;
        self.value = reconciliation.external_value;
    }

    fn commit_value(&mut self, value: Value, silent: bool) -> bool {
        let value = self.reconciler.normalize(value);
        let changed = !deep_equal(&value, &self.value);
        self.value = value;
        self.apply_reconcile();
        if changed {
            self.host.emit(FieldEvent::ValueChanged {
                key: self.config.key.clone(),
                value: self.value.clone(),
                silent,
            });
        }
        changed
    }

    fn emit_error(&self, error: &SelectError) {
        self.host.emit(FieldEvent::ComponentError {
            key: self.config.key.clone(),
            message: error.to_string(),
        });
    }

    /// Commits a value.
    ///
    /// On a lazy, searchable remote field that was never activated and has no
    /// options, the first non-empty value starts one lookup cycle searching for
    /// it; the returned step must be dispatched like any other.
    pub fn set_value(&mut self, value: Value, silent: bool) -> Option<SyncStep> {
        self.commit_value(value, silent);

        let needs_lookup = self.config.search_field().is_some()
            && self.config.lazy_load
            && self.config.source.kind().is_remote()
            && !self.lazy_load_init
            && !self.is_active()
            && !self.activation.loading
            && self.cache.is_empty()
            && !is_empty_value(&self.value);
        if !needs_lookup {
            return None;
        }

        self.lazy_load_init = true;
        debug!(field = %self.config.key, "looking up committed value on lazy field");
        Some(self.run_cycle(SyncTrigger::ValueInit))
    }

    /// Converts the widget's raw selection into the reportable value and
    /// commits it as a user-visible change.
    pub fn report_selection(&mut self, selection: Value) -> Value {
        let passthrough = self.activation.loading || self.options.is_empty();
        let reported = self.reconciler.reported_value(selection, &self.value, passthrough);
        self.commit_value(reported, false);
        self.value.clone()
    }

    /// Invalidates everything and synchronizes again.
    pub fn refresh(&mut self) -> SyncStep {
        info!(field = %self.config.key, "refresh requested");
        self.coalescer.cancel();
        if self.config.lazy_load {
            self.activation.activated = false;
        }
        self.activation.loading = false;
        self.activation.scroll_loading = false;
        self.in_flight = None;
        self.cache.clear();
        self.window = FetchWindow::new(self.config.limit);
        self.readiness.rearm();

        if self.config.clear_on_refresh {
            let empty = self.reconciler.empty_value();
            self.commit_value(empty, false);
        } else {
            self.apply_reconcile();
        }

        self.run_cycle(SyncTrigger::Refresh)
    }

    /// Going from hidden to visible reveals the field.
    pub fn set_visible(&mut self, visible: bool) -> Option<SyncStep> {
        let was_hidden = !self.visible;
        self.visible = visible;
        if visible && was_hidden {
            return Some(self.run_cycle(SyncTrigger::Reveal));
        }
        None
    }

    /// Disabling drops a pending search; the generation it armed resolves
    /// against the current cache.
    pub fn set_disabled(&mut self, disabled: bool) {
        self.disabled = disabled;
        if disabled && self.coalescer.cancel() {
            debug!(field = %self.config.key, "field disabled, pending search dropped");
            self.settle_without_fetch();
        }
    }

    fn settle_without_fetch(&mut self) {
        self.apply_reconcile();
        if self.in_flight.is_none() {
            self.phase = SyncPhase::Ready;
            self.readiness.resolve();
        }
    }

    /// Replaces the data source, resetting cache, window, activation and any
    /// pending search, then synchronizes as on mount.
    pub fn set_data_source(&mut self, source: DataSourceConfig) -> SyncStep {
        info!(field = %self.config.key, source = %source.kind(), "data source replaced");
        self.config.source = source;
        self.coalescer.cancel();
        self.cache.clear();
        self.window = FetchWindow::new(self.config.limit);
        self.activation = ActivationState::default();
        self.lazy_load_init = false;
        self.in_flight = None;

        self.renderer = LabelRenderer::new(&self.config, Arc::clone(&self.host), self.read_only);
        self.readiness.rearm();
        self.apply_reconcile();

        self.run_cycle(SyncTrigger::Mount)
    }

    /// Re-renders every option from the downloaded items without fetching.
    pub fn set_template(&mut self, template: Option<String>) {
        self.config.template = template.clone();
        self.renderer.set_template(template);
        self.cache.rebuild(&self.renderer);
        self.apply_reconcile();
    }

    /// Renders a value for read-only views. Sequences join with `<br />`,
    /// missing values render as `-`. `None` renders the committed value.
    pub fn display_string(&self, value: Option<&Value>) -> String {
        let value = match value {
            Some(value) if !is_empty_value(value) => value.clone(),
            _ => self.value.clone(),
        };

        let looked_up = match &self.config.source {
            DataSourceConfig::Values { values } => self.lookup_items(values, Some("value"), &value),
            DataSourceConfig::Custom { custom } => {
                let items = self.resolver.custom_items(custom, self.host.as_ref()).unwrap_or_else(|error| {
                    warn!(field = %self.config.key, error = %error, "custom items unavailable for display");
                    Vec::new()
                });
                self.lookup_items(&items, self.config.value_property.as_deref().filter(|path| !path.is_empty()), &value)
            }
            _ => value,
        };

        match &looked_up {
            Value::String(text) => text.clone(),
            Value::Array(items) if items.is_empty() => "-".to_string(),
            Value::Array(items) => items.iter().map(|item| self.renderer.render(item)).collect::<Vec<_>>().join("<br />"),
            Value::Null => "-".to_string(),
            other => self.renderer.render(other),
        }
    }

    /// Table/view rendering: multiple values join their display strings with
    /// `, `.
    pub fn view_string(&self, value: Option<&Value>) -> String {
        let value = value.unwrap_or(&self.value);
        match value {
            Value::Array(items) if self.config.multiple => items
                .iter()
                .map(|item| self.display_string(Some(item)))
                .collect::<Vec<_>>()
                .join(", "),
            other => self.display_string(Some(other)),
        }
    }

    fn lookup_items(&self, items: &[Value], value_property: Option<&str>, value: &Value) -> Value {
        if self.config.multiple
            && let Value::Array(selected) = value
        {
            return Value::Array(
                items
                    .iter()
                    .filter(|item| item.get("value").is_some_and(|item_value| selected.iter().any(|entry| deep_equal(entry, item_value))))
                    .cloned()
                    .collect(),
            );
        }
        let Some(path) = value_property else {
            return value.clone();
        };
        items
            .iter()
            .find(|item| selectsync_util::lookup_path(item, path).is_some_and(|item_value| deep_equal(item_value, value)))
            .cloned()
            .unwrap_or(Value::Null)
    }

    pub fn snapshot(&self) -> FieldSnapshot {
        FieldSnapshot {
            key: self.config.key.clone(),
            source: self.config.source.kind(),
            phase: self.phase,
            generation: self.readiness.generation(),
            ready: self.readiness.is_resolved(),
            value: self.value.clone(),
            options: self.options.clone(),
            search: self.window.search.clone(),
            skip: self.window.skip,
            downloaded: self.cache.downloaded_count(),
            known_server_total: self.cache.known_server_total(),
            activation: self.activation,
            visible: self.visible,
            disabled: self.disabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Readiness, RecordingHost};
    use selectsync_types::{FetchResponse, HttpMethod, UrlSource};
    use serde_json::json;

    fn controller(config: FieldConfig) -> (SyncController, Arc<RecordingHost>) {
        let host = Arc::new(RecordingHost::default());
        (SyncController::new(config, host.clone()), host)
    }

    fn resource_config(limit: usize) -> FieldConfig {
        let mut config = FieldConfig::new(
            "customer",
            DataSourceConfig::Resource {
                resource: "customers".into(),
                headers: Vec::new(),
            },
        );
        config.limit = limit;
        config.lazy_load = false;
        config.search_debounce_ms = 0;
        config
    }

    fn expect_fetch(step: SyncStep) -> PendingFetch {
        match step {
            SyncStep::Fetch(pending) => pending,
            other => panic!("expected a fetch, got {other:?}"),
        }
    }

    fn page(range: std::ops::Range<usize>) -> Value {
        Value::Array(range.map(|id| json!({ "_id": id.to_string(), "label": format!("Customer {id}") })).collect())
    }

    #[test]
    fn values_source_yields_the_configured_list_in_order() {
        let values = vec![json!({"value": "a", "label": "A"}), json!({"value": "b", "label": "B"})];
        let (mut controller, _) = controller(FieldConfig::new("letters", DataSourceConfig::Values { values: values.clone() }));

        assert_eq!(controller.request_sync(SyncTrigger::Mount, Instant::now()), SyncStep::Completed);
        assert_eq!(controller.cache().raw_items(), values.as_slice());
        assert_eq!(
            controller.options(),
            &[SelectOption::new(json!("a"), "A"), SelectOption::new(json!("b"), "B")]
        );
        assert_eq!(controller.phase(), SyncPhase::Ready);
        assert!(controller.is_ready());
    }

    #[test]
    fn scrolling_accumulates_pages_until_the_total_is_reached() {
        let (mut controller, _) = controller(resource_config(10));
        let now = Instant::now();

        for (index, range) in [0..10, 10..20, 20..25].into_iter().enumerate() {
            let pending = expect_fetch(controller.request_sync(SyncTrigger::Scroll, now));
            assert!(pending.accumulate);
            assert!(
                pending.request.url.contains(&format!("skip={}", index * 10)),
                "unexpected url {}",
                pending.request.url
            );
            let response = FetchResponse::new(page(range)).with_server_count(25);
            assert_eq!(controller.complete_fetch(pending.cycle, Ok(response)), MergeOutcome::Applied);
        }

        assert_eq!(controller.options().len(), 25);
        assert_eq!(controller.cache().known_server_total(), Some(25));
        assert_eq!(controller.request_sync(SyncTrigger::Scroll, now), SyncStep::Completed);
        assert_eq!(controller.options().len(), 25);
    }

    #[test]
    fn server_count_in_the_payload_wins() {
        let (mut controller, _) = controller(resource_config(10));
        let pending = expect_fetch(controller.request_sync(SyncTrigger::Mount, Instant::now()));
        let body = json!({ "items": page(0..10), "serverCount": 12 });
        controller.complete_fetch(pending.cycle, Ok(FetchResponse::new(body).with_server_count(99)));
        assert_eq!(controller.cache().known_server_total(), Some(12));
    }

    #[test]
    fn short_searches_resolve_empty_without_a_request() {
        let mut config = resource_config(10);
        config.search_field = Some("name".into());
        config.min_search = 2;
        let (mut controller, _) = controller(config);
        let now = Instant::now();

        assert_eq!(controller.request_sync(SyncTrigger::Search(Some("j".into())), now), SyncStep::Completed);
        assert!(controller.options().is_empty());

        let pending = expect_fetch(controller.request_sync(SyncTrigger::Search(Some("jo".into())), now));
        assert!(pending.request.url.contains("name__regex=jo"));
    }

    #[test]
    fn lazy_remote_fields_wait_for_activation() {
        let mut config = resource_config(10);
        config.lazy_load = true;
        let (mut controller, _) = controller(config);
        let now = Instant::now();

        assert_eq!(
            controller.request_sync(SyncTrigger::Mount, now),
            SyncStep::Skipped(SkipReason::AwaitingActivation)
        );
        assert_eq!(controller.phase(), SyncPhase::Gated);
        assert!(!controller.is_ready());

        expect_fetch(controller.request_sync(SyncTrigger::Focus, now));
        assert!(controller.activation().activated);
        assert!(controller.activation().loading);
    }

    #[test]
    fn hidden_fields_resolve_readiness_immediately() {
        let (mut controller, host) = controller(resource_config(10));
        host.set_conditions(false);
        assert_eq!(
            controller.request_sync(SyncTrigger::Reveal, Instant::now()),
            SyncStep::Skipped(SkipReason::Hidden)
        );
        assert_eq!(controller.phase(), SyncPhase::Idle);
        assert!(controller.is_ready());

        host.set_conditions(true);
        assert!(controller.set_visible(false).is_none());
        assert!(matches!(controller.set_visible(true), Some(SyncStep::Fetch(_))));
    }

    #[test]
    fn superseded_results_are_discarded() {
        let mut config = resource_config(10);
        config.search_field = Some("name".into());
        let (mut controller, _) = controller(config);
        let now = Instant::now();

        let first = expect_fetch(controller.request_sync(SyncTrigger::Search(Some("a".into())), now));
        let second = expect_fetch(controller.request_sync(SyncTrigger::Search(Some("b".into())), now));

        let second_page = json!([{ "_id": "b1", "label": "Bob" }]);
        assert_eq!(controller.complete_fetch(second.cycle, Ok(FetchResponse::new(second_page))), MergeOutcome::Applied);
        let first_page = json!([{ "_id": "a1", "label": "Alice" }]);
        assert_eq!(controller.complete_fetch(first.cycle, Ok(FetchResponse::new(first_page))), MergeOutcome::Stale);

        let labels: Vec<&str> = controller.options().iter().map(|option| option.label.as_str()).collect();
        assert_eq!(labels, vec!["Bob"]);
    }

    #[test]
    fn searches_are_coalesced_within_the_window() {
        let mut config = resource_config(10);
        config.search_field = Some("name".into());
        config.search_debounce_ms = 100;
        let (mut controller, _) = controller(config);
        let start = Instant::now();

        assert!(matches!(
            controller.request_sync(SyncTrigger::Search(Some("j".into())), start),
            SyncStep::Debounced { .. }
        ));
        let step = controller.request_sync(SyncTrigger::Search(Some("jo".into())), start + Duration::from_millis(50));
        assert_eq!(
            step,
            SyncStep::Debounced {
                due: start + Duration::from_millis(150)
            }
        );

        assert_eq!(controller.poll_debounce(start + Duration::from_millis(120)), None);
        let pending = expect_fetch(
            controller
                .poll_debounce(start + Duration::from_millis(150))
                .expect("due search"),
        );
        assert!(pending.request.url.contains("name__regex=jo"));
        assert_eq!(controller.next_debounce_deadline(), None);
    }

    #[test]
    fn transport_failures_emit_errors_and_resolve_readiness() {
        let (mut controller, host) = controller(resource_config(10));
        let pending = expect_fetch(controller.request_sync(SyncTrigger::Mount, Instant::now()));
        controller.complete_fetch(pending.cycle, Err(SelectError::Transport("connection refused".into())));

        assert!(controller.is_ready());
        assert!(!controller.activation().loading);
        assert_eq!(host.errors(), vec!["transport error: connection refused".to_string()]);
    }

    #[test]
    fn custom_script_failures_degrade_to_no_options() {
        let config = FieldConfig::new(
            "scripted",
            DataSourceConfig::Custom {
                custom: "values = data.missing".into(),
            },
        );
        let (mut controller, host) = controller(config);
        assert_eq!(controller.request_sync(SyncTrigger::Mount, Instant::now()), SyncStep::Completed);
        assert!(controller.options().is_empty());
        assert!(controller.is_ready());
        assert_eq!(host.errors().len(), 1);
    }

    #[test]
    fn misconfigured_sources_go_idle() {
        let mut config = resource_config(10);
        config.source = DataSourceConfig::Url(UrlSource {
            url: String::new(),
            method: HttpMethod::Get,
            body: None,
            headers: Vec::new(),
        });
        let (mut controller, _) = controller(config);
        assert_eq!(
            controller.request_sync(SyncTrigger::Mount, Instant::now()),
            SyncStep::Skipped(SkipReason::Misconfigured)
        );
        assert_eq!(controller.phase(), SyncPhase::Idle);
        assert!(controller.is_ready());
    }

    #[test]
    fn committed_values_survive_until_options_describe_them() {
        let (mut controller, host) = controller(resource_config(10));
        assert!(controller.set_value(json!({ "_id": "7", "label": "Seven" }), true).is_none());
        assert_eq!(controller.options().len(), 1);
        assert_eq!(controller.options()[0].label, "Seven");

        let pending = expect_fetch(controller.request_sync(SyncTrigger::Mount, Instant::now()));
        controller.complete_fetch(pending.cycle, Ok(FetchResponse::new(page(0..3))));
        assert_eq!(controller.options().len(), 4);
        assert_eq!(controller.value(), &json!({ "_id": "7", "label": "Seven" }));
        assert!(matches!(host.events().as_slice(), [FieldEvent::ValueChanged { silent: true, .. }]));
    }

    #[test]
    fn lazy_searchable_fields_look_up_the_first_value_once() {
        let mut config = resource_config(10);
        config.lazy_load = true;
        config.search_field = Some("data.name".into());
        let (mut controller, _) = controller(config);

        let pending = expect_fetch(controller.set_value(json!("ann"), false).expect("lookup step"));
        assert!(pending.request.url.contains("data.name__regex=ann"));
        assert!(!controller.activation().activated);

        controller.complete_fetch(pending.cycle, Ok(FetchResponse::new(json!([]))));
        assert!(controller.set_value(json!("bob"), false).is_none());
    }

    #[test]
    fn default_value_is_committed_after_the_first_load() {
        let mut config = FieldConfig::new(
            "color",
            DataSourceConfig::Values {
                values: vec![json!({"value": "red", "label": "Red"})],
            },
        );
        config.default_value = Some(json!("red"));
        let (mut controller, host) = controller(config);
        controller.request_sync(SyncTrigger::Mount, Instant::now());

        assert_eq!(controller.value(), &json!("red"));
        assert_eq!(
            host.events(),
            vec![FieldEvent::ValueChanged {
                key: "color".into(),
                value: json!("red"),
                silent: false,
            }]
        );
    }

    #[test]
    fn refresh_invalidates_and_arms_a_new_generation() {
        let mut config = resource_config(10);
        config.clear_on_refresh = true;
        let (mut controller, _) = controller(config);
        let pending = expect_fetch(controller.request_sync(SyncTrigger::Mount, Instant::now()));
        controller.complete_fetch(pending.cycle, Ok(FetchResponse::new(page(0..3))));
        controller.set_value(json!({ "_id": "1" }), false);
        let generation = controller.generation();

        let pending = expect_fetch(controller.refresh());
        assert_eq!(controller.generation(), generation + 1);
        assert_eq!(controller.value(), &json!(""));
        assert!(controller.cache().is_empty());
        assert!(!controller.is_ready());
        assert!(!pending.accumulate);
    }

    #[test]
    fn disabled_fields_ignore_interaction() {
        let (mut controller, _) = controller(resource_config(10));
        controller.set_disabled(true);
        let now = Instant::now();
        assert_eq!(controller.request_sync(SyncTrigger::Focus, now), SyncStep::Skipped(SkipReason::Disabled));
        assert_eq!(controller.request_sync(SyncTrigger::Scroll, now), SyncStep::Skipped(SkipReason::Disabled));
        expect_fetch(controller.request_sync(SyncTrigger::Mount, now));
    }

    #[tokio::test]
    async fn disabling_drops_a_pending_search_and_resolves_readiness() {
        let mut config = resource_config(10);
        config.search_field = Some("name".into());
        config.search_debounce_ms = 100;
        let (mut controller, _) = controller(config);
        let now = Instant::now();
        let pending = expect_fetch(controller.request_sync(SyncTrigger::Mount, now));
        controller.complete_fetch(pending.cycle, Ok(FetchResponse::new(page(0..3))));

        assert!(matches!(
            controller.request_sync(SyncTrigger::Search(Some("jo".into())), now),
            SyncStep::Debounced { .. }
        ));
        let waiter = controller.items_loaded();
        assert!(!controller.is_ready());

        controller.set_disabled(true);
        assert!(controller.is_ready());
        assert_eq!(controller.poll_debounce(now + Duration::from_secs(1)), None);
        assert_eq!(waiter.wait().await, Readiness::Loaded);
        assert_eq!(controller.options().len(), 3);
    }

    #[test]
    fn due_search_on_a_disabled_field_still_resolves_readiness() {
        let mut config = resource_config(10);
        config.search_field = Some("name".into());
        config.search_debounce_ms = 100;
        let (mut controller, _) = controller(config);
        let now = Instant::now();

        controller.request_sync(SyncTrigger::Search(Some("jo".into())), now);
        assert!(!controller.is_ready());
        controller.disabled = true;
        assert_eq!(
            controller.poll_debounce(now + Duration::from_millis(100)),
            Some(SyncStep::Skipped(SkipReason::Disabled))
        );
        assert!(controller.is_ready());
        assert_eq!(controller.phase(), SyncPhase::Ready);
    }

    #[test]
    fn url_sources_do_not_page_on_scroll() {
        let mut config = resource_config(10);
        config.source = DataSourceConfig::Url(UrlSource {
            url: "https://api.example.com/cities".into(),
            method: HttpMethod::Get,
            body: None,
            headers: Vec::new(),
        });
        let (mut controller, _) = controller(config);
        let now = Instant::now();
        let pending = expect_fetch(controller.request_sync(SyncTrigger::Mount, now));
        controller.complete_fetch(pending.cycle, Ok(FetchResponse::new(json!([{ "value": "oslo", "label": "Oslo" }]))));

        for _ in 0..3 {
            assert_eq!(controller.request_sync(SyncTrigger::Scroll, now), SyncStep::Completed);
        }
        assert_eq!(controller.cache().downloaded_count(), 1);
        assert_eq!(controller.options().len(), 1);
        assert!(controller.is_ready());
    }

    #[test]
    fn scroll_is_ignored_while_a_fetch_is_in_flight() {
        let (mut controller, _) = controller(resource_config(10));
        expect_fetch(controller.request_sync(SyncTrigger::Mount, Instant::now()));
        assert_eq!(
            controller.request_sync(SyncTrigger::Scroll, Instant::now()),
            SyncStep::Skipped(SkipReason::ScrollInFlight)
        );
    }

    #[test]
    fn data_source_replacement_resets_state() {
        let (mut controller, _) = controller(resource_config(10));
        let pending = expect_fetch(controller.request_sync(SyncTrigger::Mount, Instant::now()));
        let generation = controller.generation();

        let step = controller.set_data_source(DataSourceConfig::Values {
            values: vec![json!({"value": 1, "label": "One"})],
        });
        assert_eq!(step, SyncStep::Completed);
        assert_eq!(controller.generation(), generation + 1);
        assert_eq!(controller.options(), &[SelectOption::new(json!(1), "One")]);
        assert_eq!(
            controller.complete_fetch(pending.cycle, Ok(FetchResponse::new(page(0..2)))),
            MergeOutcome::Stale
        );
    }

    #[test]
    fn report_selection_filters_placeholder_text() {
        let mut config = FieldConfig::new(
            "color",
            DataSourceConfig::Values {
                values: vec![json!({"value": "red", "label": "Red"}), json!({"value": "blue", "label": "Blue"})],
            },
        );
        config.placeholder = Some("Pick a color".into());
        let (mut controller, _) = controller(config);
        controller.request_sync(SyncTrigger::Mount, Instant::now());
        controller.set_value(json!("red"), true);

        assert_eq!(controller.report_selection(json!("Pick a color")), json!("red"));
        assert_eq!(controller.report_selection(json!("blue")), json!("blue"));
        assert_eq!(controller.value(), &json!("blue"));
    }

    #[test]
    fn template_changes_rerender_without_fetching() {
        let (mut controller, _) = controller(resource_config(10));
        let pending = expect_fetch(controller.request_sync(SyncTrigger::Mount, Instant::now()));
        controller.complete_fetch(
            pending.cycle,
            Ok(FetchResponse::new(json!([{ "_id": "1", "label": "One", "code": "X1" }]))),
        );

        controller.set_template(Some("<i>{{ item.code }}</i>".into()));
        assert_eq!(controller.options()[0].label, "<i>X1</i>");
    }

    #[test]
    fn display_strings_look_up_static_labels() {
        let mut config = FieldConfig::new(
            "colors",
            DataSourceConfig::Values {
                values: vec![json!({"value": "red", "label": "Red"}), json!({"value": "blue", "label": "Blue"})],
            },
        );
        config.multiple = true;
        let (mut controller, _) = controller(config);
        controller.request_sync(SyncTrigger::Mount, Instant::now());

        assert_eq!(controller.display_string(Some(&json!(["red", "blue"]))), "Red<br />Blue");
        assert_eq!(controller.display_string(Some(&json!(["green"]))), "-");
        assert_eq!(controller.view_string(Some(&json!(["red", "blue"]))), "Red, Blue");
        assert_eq!(controller.display_string(None), "-");
    }
}
