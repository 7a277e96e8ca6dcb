//! The public selector handle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::context::{FrameOverrides, RootContext, SelectorContext};
use crate::dependency::SelectorId;
use crate::error::{ConfigError, SelectorError};
use crate::options::SelectorOptions;
use crate::runtime::{SelectorCore, Transform};
use crate::storage::{RecordSnapshot, RunCounters};

static NEXT_SELECTOR_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_ANONYMOUS: AtomicU64 = AtomicU64::new(1);

/// A memoized function of state and parameters.
///
/// Each selector caches one result per parameter key. Calls made from inside
/// its transform through [`SelectorContext::select`] become the dependencies
/// that decide, on later calls, whether the cached result is still valid.
///
/// This is cheap to clone; clones share the same cache.
///
/// # Example
///
/// ```ignore
/// let select_letter = Selector::root(
///     SelectorOptions::new().key_fn(debug_key).result_comparator(same_reference),
///     |ctx: &mut RootContext<State>, id: &u32| Ok(ctx.state().letter_by_id[id]),
/// )?;
/// let select_word = Selector::derived(
///     SelectorOptions::new().key_fn(debug_key),
///     move |ctx: &mut SelectorContext<State>, ids: &Vec<u32>| {
///         ids.iter()
///             .map(|id| ctx.select(&select_letter, id).map(|c| *c))
///             .collect::<Result<String, _>>()
///     },
/// )?;
///
/// let word = select_word.select(&state, &vec![1, 2])?;
/// ```
pub struct Selector<S, P, O> {
    core: Arc<SelectorCore<S, P, O>>,
}

impl<S, P, O> Clone for Selector<S, P, O> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<S, P, O> Selector<S, P, O>
where
    S: Send + Sync + 'static,
    P: Clone + Send + Sync + 'static,
    O: Send + Sync + 'static,
{
    /// Create a root selector: a projection of the state.
    ///
    /// The transform reads the state through [`RootContext::state`]. Fails
    /// when the options lack a key function.
    pub fn root<F>(options: SelectorOptions<S, P, O>, transform: F) -> Result<Self, ConfigError>
    where
        F: Fn(&mut RootContext<'_, S>, &P) -> Result<O, SelectorError> + Send + Sync + 'static,
    {
        let name = selector_name::<F, _, _, _>(&options);
        Self::build(name, options, Transform::Root(Box::new(transform)))
    }

    /// Create a derived selector, which reaches the state only by calling
    /// other selectors. Fails when the options lack a key function.
    pub fn derived<F>(options: SelectorOptions<S, P, O>, transform: F) -> Result<Self, ConfigError>
    where
        F: Fn(&mut SelectorContext<S>, &P) -> Result<O, SelectorError> + Send + Sync + 'static,
    {
        let name = selector_name::<F, _, _, _>(&options);
        Self::build(name, options, Transform::Derived(Box::new(transform)))
    }

    fn build(
        name: String,
        options: SelectorOptions<S, P, O>,
        transform: Transform<S, P, O>,
    ) -> Result<Self, ConfigError> {
        let config = options.resolve(&name, transform.is_root())?;
        let id = SelectorId(NEXT_SELECTOR_ID.fetch_add(1, Ordering::Relaxed));
        Ok(Self {
            core: SelectorCore::new(id, name, config, transform),
        })
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Process-unique identifier.
    pub fn id(&self) -> SelectorId {
        self.core.id
    }

    /// Whether this selector reads state directly.
    pub fn is_root(&self) -> bool {
        self.core.config.is_root
    }

    /// Evaluate against `state` as an outermost call.
    ///
    /// Returns the cached value when it is still valid; otherwise runs the
    /// transform. A failed run is returned as `Err`.
    pub fn select(&self, state: &Arc<S>, params: &P) -> Result<Arc<O>, SelectorError> {
        let mut ctx = SelectorContext::new(state.clone());
        self.select_in(&mut ctx, params)
    }

    /// Evaluate as a nested call, taking state from `ctx` and recording the
    /// call as a dependency of the selector running in `ctx`.
    pub fn select_in(&self, ctx: &mut SelectorContext<S>, params: &P) -> Result<Arc<O>, SelectorError> {
        self.core.evaluate(ctx, params).into_result(&self.core.name)
    }

    /// Whether a call for `params` against `state` would be answered from
    /// the cache.
    ///
    /// Never runs this selector's transform and never replaces its cached
    /// value. Recorded dependencies are re-checked, but none of them may run
    /// either; a dependency that would have to run counts as changed.
    pub fn has_cached_result(&self, state: &Arc<S>, params: &P) -> bool {
        let mut ctx = SelectorContext::new(state.clone());
        self.has_cached_result_in(&mut ctx, params)
    }

    /// [`Selector::has_cached_result`] against the state of `ctx`.
    pub fn has_cached_result_in(&self, ctx: &mut SelectorContext<S>, params: &P) -> bool {
        let state = ctx.state().clone();
        ctx.push_frame(state, FrameOverrides::lookup());
        let evaluation = self.core.evaluate(ctx, params);
        ctx.pop_frame();
        evaluation.has_return_value()
    }

    /// Copy of the record for `params`, if one exists.
    pub fn record(&self, params: &P) -> Option<RecordSnapshot<S, O>> {
        let key = (self.core.config.key_fn)(params);
        self.core
            .store
            .lock()
            .get(&key)
            .map(|record| record.snapshot(&key))
    }

    /// Counters aggregated over every key this selector has seen.
    pub fn counters(&self) -> RunCounters {
        self.core.store.lock().counters()
    }

    /// Keys that currently have a record, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.core.store.lock().keys()
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        self.core.store.lock().len()
    }

    /// Returns true if no records are held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop the record for `params`. Returns whether one existed.
    ///
    /// The next call for these params runs the transform from scratch.
    pub fn remove(&self, params: &P) -> bool {
        let key = (self.core.config.key_fn)(params);
        self.core.store.lock().remove(&key)
    }

    /// Drop every record. Aggregated counters are kept.
    pub fn clear(&self) {
        self.core.store.lock().clear();
    }
}

impl<S, P, O> std::fmt::Debug for Selector<S, P, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Selector")
            .field("id", &self.core.id)
            .field("name", &self.core.name)
            .field("is_root", &self.core.config.is_root)
            .finish()
    }
}

fn selector_name<F, S, P, O>(options: &SelectorOptions<S, P, O>) -> String {
    match options.explicit_name() {
        Some(name) => name.to_string(),
        None => derive_name::<F>(),
    }
}

/// Name of a named transform function, or a fresh anonymous name.
fn derive_name<F>() -> String {
    let type_name = std::any::type_name::<F>();
    if type_name.contains("{{closure}}") {
        return format!(
            "anonymous_selector_{}",
            NEXT_ANONYMOUS.fetch_add(1, Ordering::Relaxed)
        );
    }
    let base = type_name.split('<').next().unwrap_or(type_name);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn double(_ctx: &mut RootContext<'_, ()>, n: &i32) -> Result<i32, SelectorError> {
        Ok(n * 2)
    }

    #[test]
    fn test_named_function() {
        let name = {
            fn name_of<F>(_: &F) -> String {
                derive_name::<F>()
            }
            name_of(&double)
        };
        assert_eq!(name, "double");
    }

    #[test]
    fn test_anonymous_names_are_unique() {
        let a = {
            let f = |x: i32| x;
            fn name_of<F>(_: &F) -> String {
                derive_name::<F>()
            }
            name_of(&f)
        };
        let b = {
            let g = |x: i32| x + 1;
            fn name_of<F>(_: &F) -> String {
                derive_name::<F>()
            }
            name_of(&g)
        };
        assert!(a.starts_with("anonymous_selector_"));
        assert!(b.starts_with("anonymous_selector_"));
        assert_ne!(a, b);
    }
}
