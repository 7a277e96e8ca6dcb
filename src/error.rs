//! Error types for selector construction and evaluation.

use std::fmt;
use std::sync::Arc;

/// Errors raised while evaluating a selector.
///
/// Transform failures can be propagated with the `?` operator, which converts
/// any `Into<anyhow::Error>` type into [`SelectorError::Transform`].
#[derive(Debug, Clone)]
pub enum SelectorError {
    /// The transform function of a selector failed.
    ///
    /// The failure is recorded on the selector's result record and re-raised
    /// to every caller up to the outermost [`Selector::select`](crate::Selector::select).
    Transform(Arc<anyhow::Error>),

    /// A selector called itself with the same parameter key while already
    /// running for that key.
    Cycle {
        /// Display names and keys of the running frames, outermost first.
        path: Vec<String>,
    },

    /// A call produced no value because recomputation was not permitted in
    /// the current frame.
    ///
    /// Transforms only run in frames that permit recomputation, and
    /// [`Selector::has_cached_result`](crate::Selector::has_cached_result)
    /// reports an aborted evaluation as `false`, so selecting through the
    /// public API never yields this variant. It is what an aborted evaluation
    /// converts to if it is ever turned into a `Result`.
    Aborted {
        /// Display name of the selector that could not run.
        selector: String,
    },
}

impl fmt::Display for SelectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectorError::Transform(e) => write!(f, "selector failed: {}", e),
            SelectorError::Cycle { path } => {
                write!(f, "selector cycle detected: {}", path.join(" -> "))
            }
            SelectorError::Aborted { selector } => {
                write!(f, "selector {} was not allowed to recompute", selector)
            }
        }
    }
}

impl<T: Into<anyhow::Error>> From<T> for SelectorError {
    fn from(err: T) -> Self {
        SelectorError::Transform(Arc::new(err.into()))
    }
}

impl SelectorError {
    /// Returns the inner transform failure if this is a `Transform` variant.
    pub fn transform_error(&self) -> Option<&Arc<anyhow::Error>> {
        match self {
            SelectorError::Transform(e) => Some(e),
            _ => None,
        }
    }

    /// Attempts to downcast the transform failure to a specific type.
    pub fn downcast_ref<E: std::error::Error + Send + Sync + 'static>(&self) -> Option<&E> {
        self.transform_error().and_then(|e| e.downcast_ref::<E>())
    }

    /// Returns `true` if this is a transform failure of type `E`.
    pub fn is<E: std::error::Error + Send + Sync + 'static>(&self) -> bool {
        self.downcast_ref::<E>().is_some()
    }
}

/// Configuration errors reported when a selector is constructed.
///
/// These are programmer errors and are never defaulted silently.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// No key-derivation function was supplied.
    #[error("selector `{name}` has no key function")]
    MissingKeyFn {
        /// Display name of the selector being built.
        name: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Missing;

    impl fmt::Display for Missing {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "missing entry")
        }
    }

    impl std::error::Error for Missing {}

    #[test]
    fn test_question_mark_conversion() {
        fn parse(input: &str) -> Result<i32, SelectorError> {
            Ok(input.parse::<i32>()?)
        }

        assert_eq!(parse("7").unwrap(), 7);
        let err = parse("x").unwrap_err();
        assert!(err.is::<std::num::ParseIntError>());
        assert!(err.to_string().starts_with("selector failed"));
    }

    #[test]
    fn test_downcast_custom_error() {
        let err: SelectorError = anyhow::Error::new(Missing).into();
        assert!(err.downcast_ref::<Missing>().is_some());
        assert!(!err.is::<std::num::ParseIntError>());

        let cycle = SelectorError::Cycle {
            path: vec!["a(1)".into(), "a(1)".into()],
        };
        assert!(cycle.transform_error().is_none());
        assert_eq!(cycle.to_string(), "selector cycle detected: a(1) -> a(1)");
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::MissingKeyFn {
            name: "select_letter".into(),
        };
        assert_eq!(err.to_string(), "selector `select_letter` has no key function");
    }
}
