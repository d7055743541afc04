//! Synchronization of one field's option set with its data source.

mod controller;
mod debounce;
mod readiness;

pub use controller::{
    ActivationState, FieldSnapshot, MergeOutcome, PendingFetch, SkipReason, SyncController, SyncPhase, SyncStep, SyncTrigger,
};
pub use debounce::SearchCoalescer;
pub use readiness::{ItemsLoaded, Readiness, ReadinessSignal};
