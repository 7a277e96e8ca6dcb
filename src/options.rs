//! Selector configuration and factories.

use std::sync::Arc;

use crate::compare::{same_allocation, Comparator};
use crate::context::{RootContext, SelectorContext};
use crate::error::{ConfigError, SelectorError};
use crate::key::KeyFn;
use crate::runtime::SelectorConfig;
use crate::selector::Selector;
use crate::tracer::{NoopTracer, Tracer};

/// Settings that do not depend on a selector's parameter or output types.
///
/// These can be pre-bound on a [`SelectorFactory`] and shared by every
/// selector it creates.
pub struct FactoryOptions<S> {
    state_comparator: Option<Comparator<S>>,
    static_dependencies: Option<bool>,
    tracer: Option<Arc<dyn Tracer>>,
}

impl<S> Default for FactoryOptions<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Clone for FactoryOptions<S> {
    fn clone(&self) -> Self {
        Self {
            state_comparator: self.state_comparator,
            static_dependencies: self.static_dependencies,
            tracer: self.tracer.clone(),
        }
    }
}

impl<S> FactoryOptions<S> {
    /// Empty options; every setting falls through to the next layer.
    pub fn new() -> Self {
        Self {
            state_comparator: None,
            static_dependencies: None,
            tracer: None,
        }
    }

    /// Set the comparator deciding whether two states are the same.
    ///
    /// Only root selectors consult it; derived selectors compare state by
    /// identity.
    pub fn state_comparator(mut self, comparator: Comparator<S>) -> Self {
        self.state_comparator = Some(comparator);
        self
    }

    /// Keep the dependencies captured by the first successful run instead of
    /// replacing them after every run.
    pub fn static_dependencies(mut self, static_dependencies: bool) -> Self {
        self.static_dependencies = Some(static_dependencies);
        self
    }

    /// Set the instrumentation hooks.
    pub fn tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = Some(tracer);
        self
    }

    /// Fill settings not given here from `base`.
    #[must_use]
    pub fn or(self, base: &FactoryOptions<S>) -> Self {
        Self {
            state_comparator: self.state_comparator.or(base.state_comparator),
            static_dependencies: self.static_dependencies.or(base.static_dependencies),
            tracer: self.tracer.or_else(|| base.tracer.clone()),
        }
    }
}

/// Full configuration of one selector.
///
/// # Example
///
/// ```ignore
/// let select_letter = Selector::root(
///     SelectorOptions::new()
///         .key_fn(key::debug_key)
///         .result_comparator(compare::same_value),
///     |ctx: &mut RootContext<State>, id: &u32| Ok(ctx.state().letter_by_id[id]),
/// )?;
/// ```
pub struct SelectorOptions<S, P, O> {
    name: Option<String>,
    key_fn: Option<KeyFn<P>>,
    result_comparator: Option<Comparator<O>>,
    base: FactoryOptions<S>,
}

impl<S, P, O> Default for SelectorOptions<S, P, O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, P, O> Clone for SelectorOptions<S, P, O> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            key_fn: self.key_fn,
            result_comparator: self.result_comparator,
            base: self.base.clone(),
        }
    }
}

impl<S, P, O> SelectorOptions<S, P, O> {
    /// Empty options.
    pub fn new() -> Self {
        Self {
            name: None,
            key_fn: None,
            result_comparator: None,
            base: FactoryOptions::new(),
        }
    }

    /// Set the display name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the key-derivation function. Required.
    pub fn key_fn(mut self, key_fn: KeyFn<P>) -> Self {
        self.key_fn = Some(key_fn);
        self
    }

    /// Set the comparator deciding whether a recomputed value is equivalent
    /// to the cached one.
    pub fn result_comparator(mut self, comparator: Comparator<O>) -> Self {
        self.result_comparator = Some(comparator);
        self
    }

    /// See [`FactoryOptions::state_comparator`].
    pub fn state_comparator(mut self, comparator: Comparator<S>) -> Self {
        self.base = self.base.state_comparator(comparator);
        self
    }

    /// See [`FactoryOptions::static_dependencies`].
    pub fn static_dependencies(mut self, static_dependencies: bool) -> Self {
        self.base = self.base.static_dependencies(static_dependencies);
        self
    }

    /// See [`FactoryOptions::tracer`].
    pub fn tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.base = self.base.tracer(tracer);
        self
    }

    pub(crate) fn explicit_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Fill selector-independent settings not given here from `defaults`.
    pub(crate) fn with_defaults(mut self, defaults: &FactoryOptions<S>) -> Self {
        self.base = self.base.or(defaults);
        self
    }

    /// Validate and apply the built-in defaults.
    pub(crate) fn resolve(self, name: &str, is_root: bool) -> Result<SelectorConfig<S, P, O>, ConfigError> {
        let key_fn = self.key_fn.ok_or_else(|| ConfigError::MissingKeyFn {
            name: name.to_string(),
        })?;
        Ok(SelectorConfig {
            is_root,
            key_fn,
            state_comparator: self.base.state_comparator.unwrap_or(same_allocation),
            result_comparator: self.result_comparator.unwrap_or(same_allocation),
            static_dependencies: self.base.static_dependencies.unwrap_or(false),
            tracer: self.base.tracer.unwrap_or_else(|| Arc::new(NoopTracer)),
        })
    }
}

/// Creates selectors with pre-bound defaults.
///
/// # Example
///
/// ```ignore
/// let versioned = SelectorFactory::new().extend(FactoryOptions::new().state_comparator(same_version));
/// let select_letter = versioned.root(SelectorOptions::new().key_fn(debug_key), select_letter_fn)?;
/// ```
pub struct SelectorFactory<S> {
    defaults: FactoryOptions<S>,
}

impl<S> Clone for SelectorFactory<S> {
    fn clone(&self) -> Self {
        Self {
            defaults: self.defaults.clone(),
        }
    }
}

impl<S> SelectorFactory<S>
where
    S: Send + Sync + 'static,
{
    /// Factory whose selectors start from `defaults`.
    pub fn with_options(defaults: FactoryOptions<S>) -> Self {
        Self { defaults }
    }

    /// Factory with no defaults of its own.
    pub fn new() -> Self {
        Self::with_options(FactoryOptions::new())
    }

    /// A new factory whose defaults are `options` layered over this one's.
    #[must_use]
    pub fn extend(&self, options: FactoryOptions<S>) -> Self {
        Self::with_options(options.or(&self.defaults))
    }

    /// The defaults this factory applies.
    pub fn defaults(&self) -> &FactoryOptions<S> {
        &self.defaults
    }

    /// Create a root selector. Settings in `options` win over the factory's.
    pub fn root<P, O, F>(&self, options: SelectorOptions<S, P, O>, transform: F) -> Result<Selector<S, P, O>, ConfigError>
    where
        P: Clone + Send + Sync + 'static,
        O: Send + Sync + 'static,
        F: Fn(&mut RootContext<'_, S>, &P) -> Result<O, SelectorError> + Send + Sync + 'static,
    {
        Selector::root(options.with_defaults(&self.defaults), transform)
    }

    /// Create a derived selector. Settings in `options` win over the factory's.
    pub fn derived<P, O, F>(&self, options: SelectorOptions<S, P, O>, transform: F) -> Result<Selector<S, P, O>, ConfigError>
    where
        P: Clone + Send + Sync + 'static,
        O: Send + Sync + 'static,
        F: Fn(&mut SelectorContext<S>, &P) -> Result<O, SelectorError> + Send + Sync + 'static,
    {
        Selector::derived(options.with_defaults(&self.defaults), transform)
    }
}

impl<S> Default for SelectorFactory<S>
where
    S: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
