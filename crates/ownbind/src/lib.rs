//! # Ownbind
//!
//! Ownership classification and wrapper synthesis for native-interop
//! binding generators.
//!
//! Given a catalog of native declarations (functions, methods, types and
//! the ownership annotations written next to them), ownbind decides for
//! every parameter and return value who owns the object afterwards, and
//! turns those decisions into wrapper plans a code generator can emit.
//!
//! ## Architecture
//!
//! - **Front-end**: Read declarations into a [`Catalog`]
//! - **Classifier**: Assign an [`OwnershipCategory`] to each slot, or report
//!   an ambiguity
//! - **Synthesis**: Map categories onto [`BoundaryAction`]s and build
//!   [`WrapperPlan`]s
//! - **Runtime**: [`SharedRef`], [`OwnedHandle`], [`CustodyTracker`],
//!   [`SingletonSlot`] and [`WrapperRegistry`] enforce the plans at run time
//!
//! ## Example
//!
//! ```
//! use ownbind::{BoundaryAction, Catalog, ClassifyContext, DeclarationBuilder, Synthesizer, TypeShape};
//!
//! let ctx = ClassifyContext::default();
//! let catalog = Catalog::new()
//!     .with_function(
//!         DeclarationBuilder::function("make_foo")
//!             .returns(TypeShape::pointer(TypeShape::value("Foo")))
//!             .annotation("@return(caller_owns_return=true)")
//!             .build(&ctx)
//!             .unwrap(),
//!     )
//!     .unwrap();
//!
//! let report = Synthesizer::new(&catalog, &ctx).report();
//! assert!(report.is_clean());
//! assert_eq!(
//!     report.plan("make_foo").unwrap().return_action(),
//!     Some(BoundaryAction::TakeOwnership)
//! );
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::path::Path;

pub mod annotation;
pub mod catalog;
pub mod classify;
pub mod context;
pub mod custody;
pub mod error;
pub mod frontend;
pub mod frontends;
pub mod model;
pub mod refcount;
pub mod registry;
pub mod singleton;
pub mod synthesis;

// Re-export main types
pub use catalog::Catalog;
pub use classify::{
    Classification, Classifier, OwnershipCategory, RefcountMode, Role, Rule, SingletonAccessor,
    Verdict,
};
pub use context::{ClassifyContext, HolderPolicy};
pub use custody::{CallBinding, CustodyLinkSpec, CustodyTracker, Endpoint, ObjectId};
pub use error::{
    ClassifyError, CustodyError, ModelError, OwnbindError, RefcountError, Result,
};
pub use frontend::{DeclarationFrontend, ParseError, SourceLocation};
pub use frontends::RustFrontend;
pub use model::{Declaration, DeclarationBuilder, TypeDecl, TypeDeclBuilder, TypeShape};
pub use refcount::{Decrement, OwnedHandle, RefcountCell, SharedRef};
pub use registry::{Lookup, WrapperRegistry};
pub use singleton::{SingletonSlot, SlotState};
pub use synthesis::{BoundaryAction, CatalogReport, Synthesizer, WrapperPlan};

/// Ownbind version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Parse `source` with `frontend` and plan every declaration.
///
/// Declarations that cannot be planned are listed in the report's
/// failures; only front-end errors are returned.
pub fn report_source<F>(frontend: &F, source: &str, ctx: &ClassifyContext) -> Result<CatalogReport>
where
    F: DeclarationFrontend + ?Sized,
{
    let catalog = frontend.parse(source, ctx)?;
    Ok(Synthesizer::new(&catalog, ctx).report())
}

/// Like [`report_source`], but the first declaration that cannot be
/// planned is an error.
pub fn try_report_source<F>(
    frontend: &F,
    source: &str,
    ctx: &ClassifyContext,
) -> Result<CatalogReport>
where
    F: DeclarationFrontend + ?Sized,
{
    let catalog = frontend.parse(source, ctx)?;
    Ok(Synthesizer::new(&catalog, ctx).try_report()?)
}

/// Read a catalog file with `frontend` and plan every declaration.
pub fn report_path<F>(frontend: &F, path: &Path, ctx: &ClassifyContext) -> Result<CatalogReport>
where
    F: DeclarationFrontend + ?Sized,
{
    let catalog = frontend.parse_path(path, ctx)?;
    tracing::info!(
        frontend = frontend.name(),
        declarations = catalog.len(),
        "catalog loaded"
    );
    Ok(Synthesizer::new(&catalog, ctx).report())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_exists() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_report_source() {
        let ctx = ClassifyContext::default();
        let report =
            report_source(&RustFrontend::new(), "fn make_foo() -> *mut Foo {}", &ctx).unwrap();
        assert_eq!(
            report.plan("make_foo").and_then(|p| p.return_action()),
            Some(BoundaryAction::TakeOwnership)
        );
    }

    #[test]
    fn test_report_source_parse_error() {
        let ctx = ClassifyContext::default();
        let err = report_source(&RustFrontend::new(), "fn broken(", &ctx).unwrap_err();
        assert!(matches!(err, OwnbindError::Parse(_)));
    }

    #[test]
    fn test_try_report_source_classify_error() {
        let ctx = ClassifyContext::strict();
        let frontend = RustFrontend::new();
        let source = "fn make_foo() -> *mut Foo {}";

        assert!(!report_source(&frontend, source, &ctx).unwrap().is_clean());
        let err = try_report_source(&frontend, source, &ctx).unwrap_err();
        assert!(matches!(
            err,
            OwnbindError::Classify(ClassifyError::AmbiguousOwnership { .. })
        ));
    }

    #[test]
    fn test_report_path_missing_file() {
        let ctx = ClassifyContext::default();
        let err = report_path(&RustFrontend::new(), Path::new("no/such/catalog.rs"), &ctx)
            .unwrap_err();
        assert!(err.to_string().contains("no/such/catalog.rs"));
    }
}
