//! Key derivation for per-parameter result records.
//!
//! A selector caches one result record per key. The key function turns the
//! call parameters into that key; parameters the key ignores act as extra
//! arguments that do not select a cache slot.

use std::fmt::Debug;

/// Deterministic, total function from parameters to a record key.
pub type KeyFn<P> = fn(&P) -> String;

/// Keys longer than this are reported as a misuse warning.
pub const MAX_KEY_LENGTH: usize = 300;

/// Key from the `Debug` representation of the parameters.
pub fn debug_key<P: Debug>(params: &P) -> String {
    format!("{:?}", params)
}

/// Key for selectors that take no meaningful parameters.
pub fn unit_key<P>(_params: &P) -> String {
    "()".to_string()
}

/// Key from the JSON representation of the parameters.
///
/// Parameters are converted through [`serde_json::Value`], whose objects keep
/// their entries sorted, so maps that differ only in insertion order produce
/// the same key. Falls back to the `Debug` representation if the parameters
/// cannot be serialized.
#[cfg(feature = "serde")]
pub fn json_key<P: serde::Serialize + Debug>(params: &P) -> String {
    serde_json::to_value(params)
        .and_then(|value| serde_json::to_string(&value))
        .unwrap_or_else(|_| debug_key(params))
}

/// Problems with a derived key that are worth a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KeyProblem {
    Empty,
    TooLong(usize),
}

pub(crate) fn check_key(key: &str) -> Option<KeyProblem> {
    if key.is_empty() {
        Some(KeyProblem::Empty)
    } else if key.len() > MAX_KEY_LENGTH {
        Some(KeyProblem::TooLong(key.len()))
    } else {
        None
    }
}
