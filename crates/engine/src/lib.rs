//! # SelectSync Engine
//!
//! Keeps the option set of a select-style form field synchronized with its
//! data source while preserving the field's committed value.
//!
//! ## Key Features
//!
//! - **Source resolution**: static values, inline JSON, custom scripts, named
//!   resources and arbitrary URLs, all producing the same option shape
//! - **Lazy activation**: remote sources wait for reveal, focus or refresh
//! - **Pagination**: scroll-driven page accumulation bounded by the server total
//! - **Search coalescing**: bursts of search input produce a single request
//! - **Value preservation**: the committed value always stays representable
//! - **Readiness**: a per-generation "items loaded" signal for the host
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use selectsync_engine::{RecordingHost, SyncController, SyncStep, SyncTrigger, load_field_config};
//!
//! let temp_dir = tempfile::tempdir()?;
//! let config_path = temp_dir.path().join("color.yaml");
//! std::fs::write(&config_path, r#"
//! key: color
//! source:
//!   dataSrc: values
//!   data:
//!     values:
//!       - { value: red, label: Red }
//! "#)?;
//!
//! let config = load_field_config(&config_path)?;
//! let mut controller = SyncController::new(config, Arc::new(RecordingHost::default()));
//! let step = controller.request_sync(SyncTrigger::Mount, tokio::time::Instant::now());
//! assert_eq!(step, SyncStep::Completed);
//! assert_eq!(controller.options()[0].label, "Red");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! - **`source`**: data-source resolution and the fetch/evaluation seams
//! - **`cache`**: downloaded items and rendered options
//! - **`reconcile`**: label rendering and value reconciliation
//! - **`sync`**: the synchronization state machine, debounce and readiness
//! - **`runtime`**: the async task driving a controller

use std::{fs, path::Path};

use anyhow::{Context, Result};

pub mod cache;
pub mod error;
pub mod host;
pub mod reconcile;
pub mod runtime;
pub mod source;
pub mod sync;

pub use cache::ItemCache;
pub use error::SelectError;
pub use host::{FieldEvent, FieldHost, RecordingHost};
pub use reconcile::{LabelRenderer, Reconciliation, ValueReconciler};
pub use runtime::{FieldCommand, FieldHandle, spawn_field};
pub use source::{CustomEvaluator, HttpFetcher, OptionFetcher, Resolution, ScriptEvaluator, SourceResolver};
pub use sync::{
    ActivationState, FieldSnapshot, ItemsLoaded, MergeOutcome, PendingFetch, Readiness, ReadinessSignal, SearchCoalescer, SkipReason,
    SyncController, SyncPhase, SyncStep, SyncTrigger,
};

/// Loads a field configuration from a YAML or JSON file.
///
/// # Errors
///
/// Fails when the file cannot be read or does not describe a field.
pub fn load_field_config(file_path: impl AsRef<Path>) -> Result<selectsync_types::FieldConfig> {
    let file_path = file_path.as_ref();
    let content = fs::read_to_string(file_path).with_context(|| format!("Failed to read field config: {}", file_path.display()))?;
    serde_yaml::from_str(&content).with_context(|| format!("Invalid field config: {}", file_path.display()))
}
