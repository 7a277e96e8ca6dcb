//! Dependency edges recorded while selectors run.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::context::SelectorContext;

/// Process-unique identifier of a selector instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SelectorId(pub u64);

/// Type-erased handle through which a recorded dependency is re-checked.
pub(crate) trait ErasedSelector<S>: Send + Sync {
    fn name(&self) -> &str;

    fn is_root(&self) -> bool;

    fn key_of(&self, params: &(dyn Any + Send + Sync)) -> String;

    /// Re-evaluates the selector with `params` in the current frame and
    /// reports whether it still yields the captured allocation.
    fn is_unchanged(
        self: Arc<Self>,
        ctx: &mut SelectorContext<S>,
        params: &(dyn Any + Send + Sync),
        captured: Option<&Arc<dyn Any + Send + Sync>>,
    ) -> bool;
}

/// One observed call: which selector, with which params, and what it returned.
pub struct DependencyEdge<S> {
    pub(crate) selector: Arc<dyn ErasedSelector<S>>,
    pub(crate) params: Arc<dyn Any + Send + Sync>,
    pub(crate) value: Option<Arc<dyn Any + Send + Sync>>,
}

impl<S> Clone for DependencyEdge<S> {
    fn clone(&self) -> Self {
        Self {
            selector: self.selector.clone(),
            params: self.params.clone(),
            value: self.value.clone(),
        }
    }
}

impl<S> DependencyEdge<S> {
    /// Re-evaluates the dependency and reports whether its value is unchanged.
    ///
    /// A dependency that fails or produces no value counts as changed.
    pub(crate) fn is_unchanged(&self, ctx: &mut SelectorContext<S>) -> bool {
        self.selector
            .clone()
            .is_unchanged(ctx, self.params.as_ref(), self.value.as_ref())
    }

    /// Display name of the selector this edge points at.
    pub fn selector_name(&self) -> &str {
        self.selector.name()
    }

    /// Record key of the call this edge captured.
    pub fn key(&self) -> String {
        self.selector.key_of(self.params.as_ref())
    }

    /// Returns true if the captured call produced a value.
    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    /// Introspection view of this edge.
    pub fn info(&self) -> DependencyInfo {
        DependencyInfo {
            selector: self.selector_name().to_string(),
            key: self.key(),
            root: self.selector.is_root(),
        }
    }
}

impl<S> fmt::Debug for DependencyEdge<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.selector_name(), self.key())
    }
}

/// Serializable description of a dependency edge, for debugging.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DependencyInfo {
    /// Display name of the dependency.
    pub selector: String,
    /// Record key the dependency was called with.
    pub key: String,
    /// Whether the dependency is a root selector.
    pub root: bool,
}

/// Ordered list of dependency edges.
///
/// Clone is cheap as the list is wrapped by `Arc`.
pub struct Dependencies<S>(Arc<Vec<DependencyEdge<S>>>);

impl<S> Dependencies<S> {
    /// New dependencies from a list of edges.
    pub fn new(edges: Vec<DependencyEdge<S>>) -> Self {
        Dependencies(Arc::new(edges))
    }

    /// Returns true if there are no edges.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of edges.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate over the edges in recording order.
    pub fn iter(&self) -> impl Iterator<Item = &DependencyEdge<S>> + '_ {
        self.0.iter()
    }
}

impl<S> Clone for Dependencies<S> {
    fn clone(&self) -> Self {
        Dependencies(self.0.clone())
    }
}

impl<S> Default for Dependencies<S> {
    fn default() -> Self {
        Dependencies(Arc::new(Vec::new()))
    }
}

impl<S> fmt::Debug for Dependencies<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

impl<S> FromIterator<DependencyEdge<S>> for Dependencies<S> {
    fn from_iter<T: IntoIterator<Item = DependencyEdge<S>>>(iter: T) -> Self {
        Dependencies(Arc::new(iter.into_iter().collect()))
    }
}
