//! Error types for ownbind

use thiserror::Error;

use crate::classify::Rule;
use crate::custody::{Endpoint, ObjectId};
use crate::frontend::ParseError;

/// Errors raised while building the declaration model.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// A declaration whose shape or annotation cannot be resolved
    #[error("Malformed declaration `{declaration}`: {reason}")]
    MalformedDeclaration {
        /// Qualified declaration name
        declaration: String,
        /// What could not be resolved
        reason: String,
    },

    /// A type spelling that does not resolve to a shape
    #[error("Unresolved type `{spelling}`: {reason}")]
    UnresolvedType {
        /// The spelling as written
        spelling: String,
        /// Why it failed
        reason: String,
    },

    /// An annotation directive that cannot be parsed
    #[error("Bad annotation `{directive}`: {reason}")]
    BadAnnotation {
        /// The offending directive text
        directive: String,
        /// Why it failed
        reason: String,
    },
}

impl ModelError {
    /// Shorthand for a `MalformedDeclaration`.
    pub fn malformed(declaration: impl Into<String>, reason: impl Into<String>) -> Self {
        ModelError::MalformedDeclaration {
            declaration: declaration.into(),
            reason: reason.into(),
        }
    }

    /// Attribute a type or annotation failure to the declaration it occurred in.
    pub fn in_declaration(self, declaration: &str) -> Self {
        match self {
            ModelError::MalformedDeclaration { .. } => self,
            other => ModelError::malformed(declaration, other.to_string()),
        }
    }
}

/// Errors raised by the ownership classifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassifyError {
    /// Two ownership signals disagree and neither may win
    #[error("Ambiguous ownership in `{declaration}` ({role}): {first} conflicts with {second}")]
    AmbiguousOwnership {
        /// Qualified declaration name
        declaration: String,
        /// The parameter or return slot being classified
        role: String,
        /// The first rule that applied
        first: Rule,
        /// The rule it conflicts with
        second: Rule,
    },

    /// The declaration itself is unusable
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Errors raised by the custodian/ward tracker.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CustodyError {
    /// Linking would make the custodian depend on its own ward
    #[error("Cyclic custodianship: {custodian} already depends on {ward}")]
    CyclicCustodianship {
        /// The would-be ward
        ward: ObjectId,
        /// The would-be custodian
        custodian: ObjectId,
    },

    /// Releasing the custodian would leave live wards behind
    #[error("Dangling ward: {custodian} still keeps {} ward(s) alive", wards.len())]
    DanglingWard {
        /// The custodian being released
        custodian: ObjectId,
        /// Live wards that still name it
        wards: Vec<ObjectId>,
    },

    /// The object is not tracked (never linked or already released)
    #[error("Unknown object {0}")]
    UnknownObject(ObjectId),

    /// A link endpoint has no object bound at the call site
    #[error("No object bound to custodian endpoint {0}")]
    UnboundEndpoint(Endpoint),
}

/// Errors raised by the refcount adapter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefcountError {
    /// More releases than acquisitions
    #[error("Refcount underflow on `{type_name}`: released more times than acquired")]
    RefcountUnderflow {
        /// Rust type of the managed object
        type_name: &'static str,
    },

    /// The object has already been destroyed or handed off
    #[error("`{type_name}` was already released")]
    Released {
        /// Rust type of the managed object
        type_name: &'static str,
    },
}

/// Main error type for ownbind operations
#[derive(Error, Debug)]
pub enum OwnbindError {
    /// Declaration model error
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Classification error
    #[error(transparent)]
    Classify(#[from] ClassifyError),

    /// Custodian/ward tracker error
    #[error(transparent)]
    Custody(#[from] CustodyError),

    /// Refcount adapter error
    #[error(transparent)]
    Refcount(#[from] RefcountError),

    /// Front-end parse error
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Result type alias for ownbind operations
pub type Result<T> = std::result::Result<T, OwnbindError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_declaration_wraps_type_errors() {
        let err = ModelError::UnresolvedType {
            spelling: "Vector<Foo>".to_string(),
            reason: "unknown holder `Vector`".to_string(),
        }
        .in_declaration("make_vector");

        match err {
            ModelError::MalformedDeclaration {
                declaration,
                reason,
            } => {
                assert_eq!(declaration, "make_vector");
                assert!(reason.contains("Vector"));
            }
            other => panic!("expected MalformedDeclaration, got {:?}", other),
        }
    }

    #[test]
    fn test_in_declaration_keeps_malformed() {
        let err = ModelError::malformed("a", "b");
        assert_eq!(err.clone().in_declaration("other"), err);
    }

    #[test]
    fn test_dangling_ward_message_counts_wards() {
        let err = CustodyError::DanglingWard {
            custodian: ObjectId(1),
            wards: vec![ObjectId(2), ObjectId(3)],
        };
        assert_eq!(
            err.to_string(),
            "Dangling ward: #1 still keeps 2 ward(s) alive"
        );
    }
}
