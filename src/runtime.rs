//! The evaluation engine behind every selector.
//!
//! `SelectorCore::evaluate` decides, per call, between three paths:
//!
//! - reuse the cached value, because the state is the same one the value was
//!   computed from, or because every recorded dependency still yields the
//!   value it yielded last time (root dependencies first, then direct ones,
//!   stopping at the first change);
//! - abort, because a run is needed but the current frame is only a cache lookup;
//! - run the transform in a fresh frame, which collects the calls it makes as
//!   the record's new dependencies. A result equivalent to the previous one is
//!   a phantom run and the previous allocation is kept.
//!
//! Whatever the path, the call is then recorded as a dependency of the caller.

use std::any::Any;
use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::Mutex;

use crate::compare::Comparator;
use crate::context::{FrameOverrides, FrameOwner, RootContext, SelectorContext};
use crate::dependency::{Dependencies, DependencyEdge, ErasedSelector, SelectorId};
use crate::error::SelectorError;
use crate::key::{check_key, KeyFn, KeyProblem};
use crate::storage::{RecordStore, RecordView, Tally};
use crate::tracer::{RunOutcome, SelectorWarning, Tracer, TracerSelectorKey};

/// Signature of a derived selector's transform function.
pub type TransformFn<S, P, O> =
    dyn Fn(&mut SelectorContext<S>, &P) -> Result<O, SelectorError> + Send + Sync;

/// Signature of a root selector's transform function.
pub type RootTransformFn<S, P, O> =
    dyn Fn(&mut RootContext<'_, S>, &P) -> Result<O, SelectorError> + Send + Sync;

/// A transform and the kind of selector it belongs to.
pub(crate) enum Transform<S, P, O> {
    Root(Box<RootTransformFn<S, P, O>>),
    Derived(Box<TransformFn<S, P, O>>),
}

impl<S, P, O> Transform<S, P, O> {
    pub(crate) fn is_root(&self) -> bool {
        matches!(self, Transform::Root(_))
    }

    fn call(&self, ctx: &mut SelectorContext<S>, params: &P) -> Result<O, SelectorError> {
        match self {
            Transform::Root(transform) => transform(&mut RootContext::new(ctx), params),
            Transform::Derived(transform) => transform(ctx, params),
        }
    }
}

/// Resolved, immutable configuration of one selector.
pub(crate) struct SelectorConfig<S, P, O> {
    pub(crate) is_root: bool,
    pub(crate) key_fn: KeyFn<P>,
    pub(crate) state_comparator: Comparator<S>,
    pub(crate) result_comparator: Comparator<O>,
    pub(crate) static_dependencies: bool,
    pub(crate) tracer: Arc<dyn Tracer>,
}

/// Outcome of one evaluation.
pub(crate) struct Evaluation<O> {
    pub(crate) return_value: Option<Arc<O>>,
    pub(crate) error: Option<SelectorError>,
}

impl<O> Evaluation<O> {
    fn value(value: Option<Arc<O>>) -> Self {
        Self {
            return_value: value,
            error: None,
        }
    }

    fn failed(error: SelectorError) -> Self {
        Self {
            return_value: None,
            error: Some(error),
        }
    }

    fn aborted() -> Self {
        Self {
            return_value: None,
            error: None,
        }
    }

    pub(crate) fn has_return_value(&self) -> bool {
        self.return_value.is_some()
    }

    /// Convert to what a caller sees: the value, or the failure.
    pub(crate) fn into_result(self, selector: &str) -> Result<Arc<O>, SelectorError> {
        match (self.error, self.return_value) {
            (Some(error), _) => Err(error),
            (None, Some(value)) => Ok(value),
            (None, None) => Err(SelectorError::Aborted {
                selector: selector.to_string(),
            }),
        }
    }
}

/// Evaluation engine, record store and configuration of one selector.
pub(crate) struct SelectorCore<S, P, O> {
    pub(crate) id: SelectorId,
    pub(crate) name: String,
    pub(crate) config: SelectorConfig<S, P, O>,
    transform: Transform<S, P, O>,
    pub(crate) store: Mutex<RecordStore<S, O>>,
    this: Weak<Self>,
}

impl<S, P, O> SelectorCore<S, P, O>
where
    S: Send + Sync + 'static,
    P: Clone + Send + Sync + 'static,
    O: Send + Sync + 'static,
{
    pub(crate) fn new(
        id: SelectorId,
        name: String,
        config: SelectorConfig<S, P, O>,
        transform: Transform<S, P, O>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            id,
            name,
            config,
            transform,
            store: Mutex::new(RecordStore::new()),
            this: this.clone(),
        })
    }

    /// Evaluate for `params` against the state of the current frame.
    pub(crate) fn evaluate(&self, ctx: &mut SelectorContext<S>, params: &P) -> Evaluation<O> {
        let started = Instant::now();
        let key = (self.config.key_fn)(params);
        self.check_key(&key);
        let tracer_key = TracerSelectorKey::new(self.name.as_str(), key.as_str());
        self.config.tracer.on_invoke(&tracer_key);

        if let Some(path) = ctx.cycle_path(self.id, &key) {
            let error = SelectorError::Cycle { path };
            tracing::warn!(selector = %self.name, key = %key, "{}", error);
            self.finish(&tracer_key, &RunOutcome::Error { message: error.to_string() }, started);
            return Evaluation::failed(error);
        }

        let state = ctx.state().clone();
        let view = {
            let mut store = self.store.lock();
            store.tally(&key, Tally::Invoke);
            store.get_or_insert(&key).view()
        };

        let (evaluation, outcome) = if self.state_unchanged(&view, &state) {
            self.store.lock().tally(&key, Tally::Skipped);
            (Evaluation::value(view.return_value), RunOutcome::Skipped)
        } else if self.dependencies_unchanged(ctx, &view, &state) {
            let mut store = self.store.lock();
            store.tally(&key, Tally::Skipped);
            if ctx.can_rerun() {
                store.get_or_insert(&key).state = Some(state.clone());
            }
            (Evaluation::value(view.return_value), RunOutcome::Skipped)
        } else if !ctx.can_rerun() {
            self.store.lock().tally(&key, Tally::Aborted);
            (Evaluation::aborted(), RunOutcome::Aborted)
        } else {
            self.run(ctx, params, &key, state)
        };

        self.record_in_parent(ctx, params, &tracer_key, &evaluation);
        self.finish(&tracer_key, &outcome, started);
        evaluation
    }

    /// Reuse check A: the record was produced from (an equivalent of) this state.
    fn state_unchanged(&self, view: &RecordView<S, O>, state: &Arc<S>) -> bool {
        if view.return_value.is_none() {
            return false;
        }
        let Some(previous) = &view.state else {
            return false;
        };
        if self.config.is_root {
            (self.config.state_comparator)(previous, state)
        } else {
            Arc::ptr_eq(previous, state)
        }
    }

    /// Reuse check B: every recorded dependency still yields the same value.
    fn dependencies_unchanged(
        &self,
        ctx: &mut SelectorContext<S>,
        view: &RecordView<S, O>,
        state: &Arc<S>,
    ) -> bool {
        if self.config.is_root || view.return_value.is_none() || !view.has_dependencies() {
            return false;
        }
        ctx.push_frame(state.clone(), FrameOverrides::dependency_check());
        let unchanged = view
            .root_edges
            .iter()
            .chain(view.own_edges.iter())
            .all(|edge| edge.is_unchanged(ctx));
        ctx.pop_frame();
        unchanged
    }

    fn run(
        &self,
        ctx: &mut SelectorContext<S>,
        params: &P,
        key: &str,
        state: Arc<S>,
    ) -> (Evaluation<O>, RunOutcome) {
        let owner = FrameOwner {
            selector: self.id,
            name: self.name.clone(),
            key: key.to_string(),
        };
        ctx.push_frame(state.clone(), FrameOverrides::run(owner));
        let result = self.transform.call(ctx, params);
        let (root_edges, own_edges) = ctx.pop_frame().map(|frame| frame.into_edges()).unwrap_or_default();

        if self.config.is_root && !(root_edges.is_empty() && own_edges.is_empty()) {
            self.warn(SelectorWarning::RootSelectorDependencies {
                selector: self.name.clone(),
                count: own_edges.len(),
            });
        }

        let mut store = self.store.lock();
        match result {
            Ok(value) => {
                let value = Arc::new(value);
                let record = store.get_or_insert(key);
                let (value, tally, outcome) = match &record.return_value {
                    Some(previous) if (self.config.result_comparator)(previous, &value) => {
                        (previous.clone(), Tally::PhantomRun, RunOutcome::PhantomRun)
                    }
                    _ => (value, Tally::FullRun, RunOutcome::FullRun),
                };
                record.state = Some(state);
                record.return_value = Some(value.clone());
                record.error = None;
                if !(self.config.static_dependencies && record.dependencies_captured) {
                    record.root_edges = Dependencies::new(root_edges);
                    record.own_edges = Dependencies::new(own_edges);
                    record.dependencies_captured = true;
                }
                store.tally(key, tally);
                tracing::trace!(selector = %self.name, key = %key, ?outcome, "selector ran");
                (Evaluation::value(Some(value)), outcome)
            }
            Err(error) => {
                let record = store.get_or_insert(key);
                record.return_value = None;
                record.error = Some(error.clone());
                store.tally(key, Tally::Error);
                drop(store);
                self.warn(SelectorWarning::TransformFailed {
                    selector: self.name.clone(),
                    message: error.to_string(),
                });
                let message = error.to_string();
                (Evaluation::failed(error), RunOutcome::Error { message })
            }
        }
    }

    /// Report this call to the caller's frame.
    fn record_in_parent(
        &self,
        ctx: &mut SelectorContext<S>,
        params: &P,
        tracer_key: &TracerSelectorKey,
        evaluation: &Evaluation<O>,
    ) {
        let Some(this) = self.this.upgrade() else {
            return;
        };
        let edge = DependencyEdge {
            selector: this as Arc<dyn ErasedSelector<S>>,
            params: Arc::new(params.clone()),
            value: evaluation
                .return_value
                .clone()
                .map(|value| value as Arc<dyn Any + Send + Sync>),
        };
        let parent = ctx.running_owner().map(FrameOwner::tracer_key);
        if ctx.record_dependency(edge, self.config.is_root) {
            self.config
                .tracer
                .on_dependency_recorded(parent.as_ref(), tracer_key);
        }
    }

    fn check_key(&self, key: &str) {
        match check_key(key) {
            Some(KeyProblem::Empty) => self.warn(SelectorWarning::EmptyKey {
                selector: self.name.clone(),
            }),
            Some(KeyProblem::TooLong(length)) => self.warn(SelectorWarning::KeyTooLong {
                selector: self.name.clone(),
                length,
            }),
            None => {}
        }
    }

    fn warn(&self, warning: SelectorWarning) {
        tracing::warn!(selector = %self.name, ?warning, "selector warning");
        self.config.tracer.on_warning(&warning);
    }

    fn finish(&self, key: &TracerSelectorKey, outcome: &RunOutcome, started: Instant) {
        self.config.tracer.on_run_end(key, outcome, started.elapsed());
    }
}

impl<S, P, O> ErasedSelector<S> for SelectorCore<S, P, O>
where
    S: Send + Sync + 'static,
    P: Clone + Send + Sync + 'static,
    O: Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn is_root(&self) -> bool {
        self.config.is_root
    }

    fn key_of(&self, params: &(dyn Any + Send + Sync)) -> String {
        params
            .downcast_ref::<P>()
            .map(|params| (self.config.key_fn)(params))
            .unwrap_or_default()
    }

    fn is_unchanged(
        self: Arc<Self>,
        ctx: &mut SelectorContext<S>,
        params: &(dyn Any + Send + Sync),
        captured: Option<&Arc<dyn Any + Send + Sync>>,
    ) -> bool {
        let (Some(params), Some(captured)) = (params.downcast_ref::<P>(), captured) else {
            return false;
        };
        let evaluation = self.evaluate(ctx, params);
        if evaluation.error.is_some() {
            return false;
        }
        match (evaluation.return_value, captured.clone().downcast::<O>()) {
            (Some(fresh), Ok(captured)) => Arc::ptr_eq(&fresh, &captured),
            _ => false,
        }
    }
}
