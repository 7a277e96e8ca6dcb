//! Dynamic-Selectors: memoized selectors with dependencies discovered at run time.
//!
//! A selector computes a value from an external `state` and call parameters,
//! caches it per parameter key, and re-runs only when needed. Dependencies are
//! not declared: every call a selector makes to another selector while running
//! is recorded, and on the next call those recorded calls decide whether the
//! cached value is still valid.
//!
//! # Key Features
//!
//! - **Dynamic dependencies**: conditional, looped and recursive selector calls are tracked per run
//! - **Root selectors**: cheap projections of state, compared with a configurable state comparator;
//!   only their transforms can read the state
//! - **Phantom runs**: a recomputed value equivalent to the cached one keeps the cached `Arc`
//! - **Cache lookups**: [`Selector::has_cached_result`] never runs a transform
//! - **Explicit context**: the call stack is a [`SelectorContext`] passed down the call tree, not a global
//!
//! # Example
//!
//! ```ignore
//! use dynamic_selectors::{compare, key, RootContext, Selector, SelectorOptions};
//!
//! struct State {
//!     letter_by_id: HashMap<u32, char>,
//! }
//!
//! let select_letter = Selector::root(
//!     SelectorOptions::new()
//!         .key_fn(key::debug_key)
//!         .result_comparator(compare::same_reference),
//!     |ctx: &mut RootContext<State>, id: &u32| Ok(ctx.state().letter_by_id.get(id).copied()),
//! )?;
//!
//! let state = Arc::new(State { letter_by_id: HashMap::from([(1, 'a')]) });
//! assert_eq!(*select_letter.select(&state, &1)?, Some('a'));
//! ```
//!
//! # Concurrency
//!
//! Evaluation is synchronous. Each external call gets its own
//! [`SelectorContext`], which is exclusively borrowed through the call tree.
//! Selectors themselves are `Send + Sync` and may be shared between threads.
//!
//! # Memory
//!
//! Records are never evicted automatically. Use [`Selector::remove`],
//! [`Selector::clear`] and [`Selector::keys`] to build an eviction policy.

pub mod compare;
mod context;
mod dependency;
mod error;
pub mod key;
mod options;
mod runtime;
mod selector;
mod storage;
pub mod tracer;

pub use context::{RootContext, SelectorContext, StackFrame};
pub use dependency::{Dependencies, DependencyEdge, DependencyInfo, SelectorId};
pub use error::{ConfigError, SelectorError};
pub use options::{FactoryOptions, SelectorFactory, SelectorOptions};
pub use runtime::{RootTransformFn, TransformFn};
pub use selector::Selector;
pub use storage::{RecordSnapshot, RunCounters};
pub use tracer::{NoopTracer, RunOutcome, SelectorWarning, Tracer, TracerSelectorKey};
