//! Call stack of in-flight selector evaluations.
//!
//! A [`SelectorContext`] is created for every external call and handed down
//! the call tree as `&mut`, so each chain of nested selector calls has its own
//! stack and two chains can never interleave on one stack. Nested calls find
//! their ambient state and report their dependencies through it.
//!
//! Only root transforms see the state, through [`RootContext`]. A derived
//! transform can reach it solely by calling a selector, which records the
//! call as a dependency.

use std::sync::Arc;

use crate::dependency::{DependencyEdge, SelectorId};
use crate::error::SelectorError;
use crate::selector::Selector;
use crate::tracer::TracerSelectorKey;

/// The selector and key a frame is running, if any.
#[derive(Debug, Clone)]
pub(crate) struct FrameOwner {
    pub(crate) selector: SelectorId,
    pub(crate) name: String,
    pub(crate) key: String,
}

impl FrameOwner {
    pub(crate) fn tracer_key(&self) -> TracerSelectorKey {
        TracerSelectorKey::new(self.name.as_str(), self.key.as_str())
    }
}

/// Settings applied on top of what a new frame inherits from its parent.
#[derive(Debug, Clone, Default)]
pub(crate) struct FrameOverrides {
    pub(crate) can_rerun: Option<bool>,
    pub(crate) should_record_dependencies: Option<bool>,
    pub(crate) owner: Option<FrameOwner>,
}

impl FrameOverrides {
    /// Frame for a transform run; collects the run's dependencies.
    pub(crate) fn run(owner: FrameOwner) -> Self {
        Self {
            can_rerun: None,
            should_record_dependencies: Some(true),
            owner: Some(owner),
        }
    }

    /// Frame for re-checking recorded dependencies without recording anew.
    pub(crate) fn dependency_check() -> Self {
        Self {
            can_rerun: None,
            should_record_dependencies: Some(false),
            owner: None,
        }
    }

    /// Frame for a cache lookup: nothing below it may recompute.
    pub(crate) fn lookup() -> Self {
        Self {
            can_rerun: Some(false),
            should_record_dependencies: Some(false),
            owner: None,
        }
    }
}

/// One in-flight evaluation.
pub struct StackFrame<S> {
    pub(crate) state: Arc<S>,
    pub(crate) can_rerun: bool,
    pub(crate) should_record_dependencies: bool,
    pub(crate) root_edges: Vec<DependencyEdge<S>>,
    pub(crate) own_edges: Vec<DependencyEdge<S>>,
    pub(crate) owner: Option<FrameOwner>,
}

impl<S> StackFrame<S> {
    /// Whether selectors called in this frame may run their transforms.
    pub fn can_rerun(&self) -> bool {
        self.can_rerun
    }

    /// Whether calls made in this frame are recorded as dependencies.
    pub fn should_record_dependencies(&self) -> bool {
        self.should_record_dependencies
    }

    /// Root-selector edges observed anywhere below this frame so far.
    pub fn root_edges(&self) -> &[DependencyEdge<S>] {
        &self.root_edges
    }

    /// Edges for calls made directly from this frame so far.
    pub fn own_edges(&self) -> &[DependencyEdge<S>] {
        &self.own_edges
    }

    pub(crate) fn into_edges(self) -> (Vec<DependencyEdge<S>>, Vec<DependencyEdge<S>>) {
        (self.root_edges, self.own_edges)
    }
}

/// Execution context passed through selector evaluation.
///
/// Derived transforms receive `&mut SelectorContext<S>` and call other
/// selectors through [`SelectorContext::select`], which records the call as a
/// dependency of the running selector. The state itself is not reachable from
/// here:
///
/// ```compile_fail
/// use dynamic_selectors::SelectorContext;
///
/// fn peek(ctx: &mut SelectorContext<u32>) -> u32 {
///     **ctx.state()
/// }
/// ```
pub struct SelectorContext<S> {
    frames: Vec<StackFrame<S>>,
}

impl<S> SelectorContext<S> {
    /// Create a context for an external call chain reading `state`.
    ///
    /// The context starts with a synthetic top frame that permits
    /// recomputation and does not record dependencies.
    pub fn new(state: Arc<S>) -> Self {
        let base = StackFrame {
            state,
            can_rerun: true,
            should_record_dependencies: false,
            root_edges: Vec::new(),
            own_edges: Vec::new(),
            owner: None,
        };
        Self { frames: vec![base] }
    }

    /// The state visible to the current frame.
    pub(crate) fn state(&self) -> &Arc<S> {
        // The base frame is never popped.
        &self.frames[self.frames.len() - 1].state
    }

    /// The innermost frame.
    pub fn top_frame(&self) -> Option<&StackFrame<S>> {
        self.frames.last()
    }

    /// Number of frames, including the synthetic base frame.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Whether the current frame permits recomputation.
    pub fn can_rerun(&self) -> bool {
        self.frames.last().is_some_and(|frame| frame.can_rerun)
    }

    /// Push a frame inheriting `can_rerun` from the current top frame.
    ///
    /// An override can only narrow `can_rerun`, never widen it.
    pub(crate) fn push_frame(&mut self, state: Arc<S>, overrides: FrameOverrides) -> &StackFrame<S> {
        let inherited = self.frames.last().map_or(true, |frame| frame.can_rerun);
        let can_rerun = inherited && overrides.can_rerun.unwrap_or(true);
        self.frames.push(StackFrame {
            state,
            can_rerun,
            should_record_dependencies: overrides.should_record_dependencies.unwrap_or(true),
            root_edges: Vec::new(),
            own_edges: Vec::new(),
            owner: overrides.owner,
        });
        &self.frames[self.frames.len() - 1]
    }

    /// Remove and return the top frame. The base frame is never removed.
    pub(crate) fn pop_frame(&mut self) -> Option<StackFrame<S>> {
        if self.frames.len() > 1 {
            self.frames.pop()
        } else {
            None
        }
    }

    /// Owner of the nearest frame that is running a transform.
    pub(crate) fn running_owner(&self) -> Option<&FrameOwner> {
        self.frames.iter().rev().find_map(|frame| frame.owner.as_ref())
    }

    /// If `selector` is already running for `key`, the path of running frames
    /// ending in the repeated call.
    pub(crate) fn cycle_path(&self, selector: SelectorId, key: &str) -> Option<Vec<String>> {
        let running = self
            .frames
            .iter()
            .filter_map(|frame| frame.owner.as_ref());
        let start = running
            .clone()
            .position(|owner| owner.selector == selector && owner.key == key)?;
        let mut path: Vec<String> = running
            .skip(start)
            .map(|owner| format!("{}({})", owner.name, owner.key))
            .collect();
        if let Some(first) = path.first().cloned() {
            path.push(first);
        }
        Some(path)
    }

    /// Record a finished call in the caller's frame.
    ///
    /// The edge goes to the top frame's own list; edges of root selectors also
    /// go to the root list of every recording frame on the stack.
    pub(crate) fn record_dependency(&mut self, edge: DependencyEdge<S>, root: bool) -> bool {
        let Some(parent) = self.frames.last_mut() else {
            return false;
        };
        if !parent.should_record_dependencies {
            return false;
        }
        parent.own_edges.push(edge.clone());
        if root {
            for frame in self
                .frames
                .iter_mut()
                .filter(|frame| frame.should_record_dependencies)
            {
                frame.root_edges.push(edge.clone());
            }
        }
        true
    }

    /// Call another selector from inside a transform.
    ///
    /// The state comes from the current frame, and the call is recorded as a
    /// dependency of the running selector.
    pub fn select<P, O>(&mut self, selector: &Selector<S, P, O>, params: &P) -> Result<Arc<O>, SelectorError>
    where
        S: Send + Sync + 'static,
        P: Clone + Send + Sync + 'static,
        O: Send + Sync + 'static,
    {
        selector.select_in(self, params)
    }

    /// Ask whether `selector` could answer for `params` from its cache
    /// without running its transform.
    pub fn has_cached_result<P, O>(&mut self, selector: &Selector<S, P, O>, params: &P) -> bool
    where
        S: Send + Sync + 'static,
        P: Clone + Send + Sync + 'static,
        O: Send + Sync + 'static,
    {
        selector.has_cached_result_in(self, params)
    }
}

/// Context handed to root transforms.
///
/// Root selectors are projections of the state. Nested selector calls are
/// still possible but are reported as a misuse once the transform returns.
pub struct RootContext<'a, S> {
    ctx: &'a mut SelectorContext<S>,
}

impl<'a, S> RootContext<'a, S> {
    pub(crate) fn new(ctx: &'a mut SelectorContext<S>) -> Self {
        Self { ctx }
    }

    /// The state this evaluation reads.
    pub fn state(&self) -> &S {
        self.ctx.state()
    }

    /// See [`SelectorContext::select`].
    pub fn select<P, O>(&mut self, selector: &Selector<S, P, O>, params: &P) -> Result<Arc<O>, SelectorError>
    where
        S: Send + Sync + 'static,
        P: Clone + Send + Sync + 'static,
        O: Send + Sync + 'static,
    {
        self.ctx.select(selector, params)
    }

    /// See [`SelectorContext::has_cached_result`].
    pub fn has_cached_result<P, O>(&mut self, selector: &Selector<S, P, O>, params: &P) -> bool
    where
        S: Send + Sync + 'static,
        P: Clone + Send + Sync + 'static,
        O: Send + Sync + 'static,
    {
        self.ctx.has_cached_result(selector, params)
    }
}
