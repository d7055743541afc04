//! Option sources.
//!
//! Modules:
//! - `resolver`: maps a data-source kind and fetch window to items or a request
//! - `custom`: evaluator seam and built-in script language for `custom` sources
//! - `fetch`: transport trait and the HTTP-backed fetcher

mod custom;
mod fetch;
mod resolver;

pub use custom::{CustomEvaluator, ScriptEvaluator};
pub use fetch::{HttpFetcher, OptionFetcher};
pub use resolver::{Resolution, SourceResolver};
