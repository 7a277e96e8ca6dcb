//! Tracer trait for observing selector evaluation.
//!
//! Tracers are a side channel: every hook has an empty default, the default
//! [`NoopTracer`] ignores everything, and the presence or absence of a tracer
//! never changes what a selector returns.
//!
//! # Example
//!
//! ```ignore
//! use dynamic_selectors::{RunOutcome, SelectorOptions, Tracer, TracerSelectorKey};
//!
//! struct PrintTracer;
//!
//! impl Tracer for PrintTracer {
//!     fn on_run_end(&self, key: &TracerSelectorKey, outcome: &RunOutcome, elapsed: Duration) {
//!         println!("{:?} -> {:?} in {:?}", key, outcome, elapsed);
//!     }
//! }
//!
//! let options = SelectorOptions::<(), u32, u32>::new().tracer(Arc::new(PrintTracer));
//! ```

use std::time::Duration;

/// Identifies one result record of one selector in a type-erased way.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TracerSelectorKey {
    /// Display name of the selector.
    pub selector: String,
    /// Record key derived from the call parameters.
    pub key: String,
}

impl TracerSelectorKey {
    /// Create a new tracer key.
    #[inline]
    pub fn new(selector: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            key: key.into(),
        }
    }
}

/// How an evaluation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RunOutcome {
    /// The cached value was reused without running the transform.
    Skipped,
    /// The transform ran and produced a value equivalent to the cached one.
    PhantomRun,
    /// The transform ran and produced a new value.
    FullRun,
    /// Recomputation was needed but not permitted (cache lookup).
    Aborted,
    /// The transform failed, or a cycle was detected.
    Error { message: String },
}

/// Non-fatal misuse reports.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SelectorWarning {
    /// The key function produced an empty key.
    EmptyKey { selector: String },
    /// The key function produced a suspiciously long key.
    KeyTooLong { selector: String, length: usize },
    /// A root selector called other selectors while running.
    RootSelectorDependencies { selector: String, count: usize },
    /// A transform failed.
    TransformFailed { selector: String, message: String },
}

/// Tracer trait for observing selector evaluation.
///
/// All methods have empty default implementations, so implementors only
/// override the events they care about.
pub trait Tracer: Send + Sync + 'static {
    /// Called when a selector is invoked, before any reuse check.
    #[inline]
    fn on_invoke(&self, _key: &TracerSelectorKey) {}

    /// Called when an evaluation ends, with the time it took.
    #[inline]
    fn on_run_end(&self, _key: &TracerSelectorKey, _outcome: &RunOutcome, _elapsed: Duration) {}

    /// Called when a dependency edge is recorded on the caller's frame.
    #[inline]
    fn on_dependency_recorded(&self, _parent: Option<&TracerSelectorKey>, _dependency: &TracerSelectorKey) {
    }

    /// Called for every misuse warning.
    #[inline]
    fn on_warning(&self, _warning: &SelectorWarning) {}
}

/// Tracer that discards all events.
///
/// This is the default tracer for every selector.
pub struct NoopTracer;

impl Tracer for NoopTracer {}
