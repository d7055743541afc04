//! Downloaded items and the options rendered from them.

use selectsync_types::{SelectOption, is_empty_value};
use serde_json::Value;

use crate::LabelRenderer;

/// Option set of one field plus cross-page bookkeeping.
///
/// The option list never grows beyond `known_server_total` once a total is
/// known. Raw items are kept as delivered so options can be re-rendered when
/// the template changes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemCache {
    raw_items: Vec<Value>,
    options: Vec<SelectOption>,
    known_server_total: Option<usize>,
}

impl ItemCache {
    pub fn options(&self) -> &[SelectOption] {
        &self.options
    }

    pub fn raw_items(&self) -> &[Value] {
        &self.raw_items
    }

    pub fn known_server_total(&self) -> Option<usize> {
        self.known_server_total
    }

    /// Number of raw items downloaded so far; the skip of the next page.
    pub fn downloaded_count(&self) -> usize {
        self.raw_items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    /// True while the server total is unknown or larger than what has been
    /// downloaded.
    pub fn additional_pages_available(&self) -> bool {
        self.known_server_total.is_none_or(|total| total > self.raw_items.len())
    }

    /// Replaces the items outright.
    pub fn replace(&mut self, items: Vec<Value>, server_total: Option<usize>, renderer: &LabelRenderer) {
        self.raw_items = items;
        self.known_server_total = server_total;
        self.rebuild(renderer);
    }

    /// Appends a page. The total is only updated when the page reports one.
    /// Returns the number of options added.
    pub fn append(&mut self, items: Vec<Value>, server_total: Option<usize>, renderer: &LabelRenderer) -> usize {
        if server_total.is_some() {
            self.known_server_total = server_total;
        }
        let before = self.options.len();
        for item in &items {
            self.push_option(renderer.option_for(item));
        }
        self.raw_items.extend(items);
        self.enforce_total();
        self.options.len().saturating_sub(before)
    }

    pub fn clear(&mut self) {
        self.raw_items.clear();
        self.options.clear();
        self.known_server_total = None;
    }

    /// Re-renders every option from the raw items.
    pub fn rebuild(&mut self, renderer: &LabelRenderer) {
        self.options.clear();
        for item in &self.raw_items {
            let option = renderer.option_for(item);
            if is_empty_value(&option.value) || self.options.iter().any(|existing| existing.matches(&option.value)) {
                continue;
            }
            self.options.push(option);
        }
        self.enforce_total();
    }

    fn push_option(&mut self, option: SelectOption) {
        if is_empty_value(&option.value) || self.options.iter().any(|existing| existing.matches(&option.value)) {
            return;
        }
        self.options.push(option);
    }

    fn enforce_total(&mut self) {
        if let Some(total) = self.known_server_total {
            self.options.truncate(total);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::RecordingHost;
    use selectsync_types::{DataSourceConfig, FieldConfig};
    use serde_json::json;

    fn renderer() -> LabelRenderer {
        let mut config = FieldConfig::new("field", DataSourceConfig::Json { json: Value::Null });
        config.value_property = Some("id".into());
        LabelRenderer::new(&config, Arc::new(RecordingHost::default()), false)
    }

    fn page(range: std::ops::Range<usize>) -> Vec<Value> {
        range.map(|id| json!({ "id": id, "label": format!("Item {id}") })).collect()
    }

    #[test]
    fn append_accumulates_and_tracks_total() {
        let renderer = renderer();
        let mut cache = ItemCache::default();
        assert!(cache.additional_pages_available());

        assert_eq!(cache.append(page(0..10), Some(25), &renderer), 10);
        assert_eq!(cache.append(page(10..20), None, &renderer), 10);
        assert_eq!(cache.known_server_total(), Some(25));
        assert!(cache.additional_pages_available());

        cache.append(page(20..25), Some(25), &renderer);
        assert_eq!(cache.options().len(), 25);
        assert!(!cache.additional_pages_available());
    }

    #[test]
    fn duplicate_values_are_kept_once() {
        let renderer = renderer();
        let mut cache = ItemCache::default();
        cache.replace(page(0..3), None, &renderer);
        assert_eq!(cache.append(page(2..4), None, &renderer), 1);
        assert_eq!(cache.options().len(), 4);
        assert_eq!(cache.downloaded_count(), 5);
    }

    #[test]
    fn options_never_exceed_the_known_total() {
        let renderer = renderer();
        let mut cache = ItemCache::default();
        cache.replace(page(0..10), Some(4), &renderer);
        assert_eq!(cache.options().len(), 4);
    }

    #[test]
    fn replace_and_clear_reset_bookkeeping() {
        let renderer = renderer();
        let mut cache = ItemCache::default();
        cache.append(page(0..10), Some(25), &renderer);
        cache.replace(page(0..2), None, &renderer);
        assert_eq!(cache.known_server_total(), None);
        assert_eq!(cache.raw_items().len(), 2);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.downloaded_count(), 0);
    }
}
