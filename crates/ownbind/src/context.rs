//! Classifier configuration

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Ownership implied by a generic pointer holder such as `PointerHolder<T>`.
///
/// The holder's static type is the ownership signal: a flag set to `false`
/// means the wrapped pointer does not change hands in that position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolderPolicy {
    /// A holder passed as a parameter transfers the pointee to the callee
    pub param_transfers: bool,

    /// A holder returned transfers the pointee to the caller
    pub return_transfers: bool,
}

/// Configuration for classification.
///
/// This is passed to the classifier, the synthesizer and the front-ends,
/// and controls naming conventions and how strict inference is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifyContext {
    /// Known pointer holders, by template name
    pub holders: IndexMap<String, HolderPolicy>,

    /// Name fragment that marks a `set_*` method as sharing, not transferring
    pub shared_marker: String,

    /// `(increment, decrement)` method names recognised as manual refcounting
    pub refcount_method_pairs: Vec<(String, String)>,

    /// Static accessor names that mark their type as a singleton
    pub singleton_accessors: Vec<String>,

    /// Infer custodian/ward links from `*_with_<x>_as_custodian` names
    pub infer_custody_from_names: bool,

    /// Refuse to default a non-const pointer without an ownership annotation
    pub require_explicit_pointer_ownership: bool,
}

impl Default for ClassifyContext {
    fn default() -> Self {
        let mut holders = IndexMap::new();
        holders.insert("PointerHolder".to_string(), HolderPolicy::default());

        Self {
            holders,
            shared_marker: "_shared".to_string(),
            refcount_method_pairs: vec![
                ("Ref".to_string(), "Unref".to_string()),
                ("IncRef".to_string(), "DecRef".to_string()),
                ("AddRef".to_string(), "Release".to_string()),
            ],
            singleton_accessors: vec!["GetInstance".to_string(), "get_instance".to_string()],
            infer_custody_from_names: true,
            require_explicit_pointer_ownership: false,
        }
    }
}

impl ClassifyContext {
    /// Create a context with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context that requires explicit annotations on non-const pointers.
    pub fn strict() -> Self {
        Self {
            require_explicit_pointer_ownership: true,
            ..Default::default()
        }
    }

    /// Register (or replace) a pointer holder.
    pub fn with_holder(mut self, name: impl Into<String>, policy: HolderPolicy) -> Self {
        self.holders.insert(name.into(), policy);
        self
    }

    /// Look up a holder policy by template name.
    pub fn holder(&self, name: &str) -> Option<&HolderPolicy> {
        self.holders.get(name)
    }

    /// Check whether `name` is a known holder.
    pub fn is_holder(&self, name: &str) -> bool {
        self.holders.contains_key(name)
    }

    /// Check whether a declaration name has the shared-setter shape.
    pub fn is_shared_setter(&self, name: &str) -> bool {
        !self.shared_marker.is_empty()
            && name.starts_with("set_")
            && name.contains(self.shared_marker.as_str())
    }

    /// Load a context from JSON. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
