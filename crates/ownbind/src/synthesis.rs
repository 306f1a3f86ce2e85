//! Wrapper synthesis contract
//!
//! Turns classifications into per-declaration [`WrapperPlan`]s: for every
//! slot, what the generated wrapper must do at the boundary. An external
//! emitter consumes the plans; the runtime adapters in this crate
//! ([`SharedRef`](crate::SharedRef), [`OwnedHandle`](crate::OwnedHandle),
//! [`CustodyTracker`](crate::CustodyTracker),
//! [`SingletonSlot`](crate::SingletonSlot)) carry them out.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, warn};

use crate::catalog::Catalog;
use crate::classify::{
    Classification, Classifier, OwnershipCategory, Role, SingletonAccessor, Verdict,
};
use crate::context::ClassifyContext;
use crate::custody::CustodyLinkSpec;
use crate::error::{ClassifyError, ModelError};
use crate::model::{Declaration, Direction, Receiver, RefcountMethods, TypeShape};

/// What a wrapper does with one slot at the call boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BoundaryAction {
    /// Copy the value across
    CopyValue,
    /// Lend read access for the call only
    Borrow,
    /// Lend mutable access for the call only
    BorrowMut,
    /// Pass the pointer; the wrapper keeps ownership
    KeepCallerOwnership,
    /// Hand the object to native code and invalidate the caller's handle
    InvalidateCallerHandle,
    /// Wrap the returned object as owned; release it when the wrapper dies
    TakeOwnership,
    /// Wrap the returned object without owning it
    BorrowFromOwner,
    /// Increment before passing; the callee consumes that reference
    IncrementBeforeCall,
    /// Adopt the reference the callee returned, without incrementing
    AdoptReference,
    /// Increment the returned object so the wrapper owns a reference
    IncrementReturned,
    /// Record a custodian/ward link after the call
    RegisterWard,
    /// Serve the instance from the singleton slot
    SingletonGuard,
}

impl BoundaryAction {
    /// The action for a classification in `role`.
    pub fn for_classification(classification: &Classification, role: Role) -> Self {
        match (classification.category, role) {
            (OwnershipCategory::ValueCopy, _) => BoundaryAction::CopyValue,
            (OwnershipCategory::BorrowedRef, _) if classification.mutable => {
                BoundaryAction::BorrowMut
            }
            (OwnershipCategory::BorrowedRef, _) => BoundaryAction::Borrow,
            (OwnershipCategory::OwnedTransferIn, _) => BoundaryAction::InvalidateCallerHandle,
            (OwnershipCategory::OwnedTransferOut, _) => BoundaryAction::TakeOwnership,
            (OwnershipCategory::SharedNonOwning, Role::Param(_)) => {
                BoundaryAction::KeepCallerOwnership
            }
            (OwnershipCategory::SharedNonOwning, Role::Return) => BoundaryAction::BorrowFromOwner,
            (OwnershipCategory::SharedOwningRefcounted, _) => classification
                .refcount_mode
                .map_or(BoundaryAction::Borrow, |mode| mode.boundary_action(role)),
            (OwnershipCategory::CustodianWard, _) => BoundaryAction::RegisterWard,
        }
    }

    /// The action for any verdict in `role`.
    pub fn for_verdict(verdict: &Verdict, role: Role) -> Self {
        match verdict {
            Verdict::Ownership(c) => Self::for_classification(c, role),
            Verdict::Singleton(_) => BoundaryAction::SingletonGuard,
        }
    }
}

/// Plan for one parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamPlan {
    /// Parameter name
    pub name: String,
    /// Structural shape
    pub shape: TypeShape,
    /// Data-flow direction
    pub direction: Direction,
    /// Ownership decision
    pub ownership: Classification,
    /// Wrapper action
    pub action: BoundaryAction,
    /// Refcount methods of the pointee, for refcounted slots
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refcount: Option<RefcountMethods>,
}

/// Plan for the return value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReturnPlan {
    /// Structural shape
    pub shape: TypeShape,
    /// Ownership decision; `None` for singleton accessors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ownership: Option<Classification>,
    /// Wrapper action
    pub action: BoundaryAction,
    /// Refcount methods of the pointee, for refcounted slots
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refcount: Option<RefcountMethods>,
}

/// A free function exposed as a method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoundMethod {
    /// Type the method attaches to
    pub of_class: String,
    /// Method name
    pub method: String,
}

/// Everything an emitter needs to wrap one declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WrapperPlan {
    /// Qualified native name
    pub declaration: String,
    /// Position among overloads sharing `declaration`, in catalog order
    pub overload: usize,
    /// Name the wrapper exposes
    pub wrapper_name: String,
    /// Enclosing type for methods
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enclosing: Option<String>,
    /// Receiver kind
    pub receiver: Receiver,
    /// Set when a free function is exposed as a method
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bound_method: Option<BoundMethod>,
    /// Parameter plans, in order
    pub params: Vec<ParamPlan>,
    /// Return plan; `None` for `void`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ret: Option<ReturnPlan>,
    /// Links to record after the call
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub custody: Vec<CustodyLinkSpec>,
    /// Set for singleton accessors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub singleton: Option<SingletonAccessor>,
}

impl WrapperPlan {
    /// The plan for parameter `name`.
    pub fn param(&self, name: &str) -> Option<&ParamPlan> {
        self.params.iter().find(|p| p.name == name)
    }

    /// The return value's action, if any.
    pub fn return_action(&self) -> Option<BoundaryAction> {
        self.ret.as_ref().map(|r| r.action)
    }
}

/// A declaration left out of the report on purpose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Skipped {
    /// Qualified native name
    pub declaration: String,
    /// Position among overloads sharing `declaration`
    pub overload: usize,
    /// Why
    pub reason: String,
}

/// A declaration that could not be planned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    /// Qualified native name
    pub declaration: String,
    /// Position among overloads sharing `declaration`
    pub overload: usize,
    /// `ambiguous_ownership` or `malformed_declaration`
    pub kind: &'static str,
    /// The error message
    pub error: String,
}

impl Failure {
    fn new(decl: &Declaration, overload: usize, error: &ClassifyError) -> Self {
        let kind = match error {
            ClassifyError::AmbiguousOwnership { .. } => "ambiguous_ownership",
            ClassifyError::Model(ModelError::MalformedDeclaration { .. }) => {
                "malformed_declaration"
            }
            ClassifyError::Model(_) => "model",
        };
        Self {
            declaration: decl.qualified_name(),
            overload,
            kind,
            error: error.to_string(),
        }
    }
}

/// Plans for a whole catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CatalogReport {
    /// Refcount-shaped types and the methods the shared handle uses
    pub refcounted: IndexMap<String, RefcountMethods>,
    /// Successful plans, in catalog order
    pub plans: Vec<WrapperPlan>,
    /// Declarations skipped on purpose
    pub skipped: Vec<Skipped>,
    /// Declarations needing manual attention
    pub failures: Vec<Failure>,
}

impl CatalogReport {
    /// The plan for `qualified` (`Type::method` or `function`). With
    /// overloads, the first one; see [`CatalogReport::plan_overload`].
    pub fn plan(&self, qualified: &str) -> Option<&WrapperPlan> {
        self.plan_overload(qualified, 0)
    }

    /// The plan for overload `overload` of `qualified`.
    pub fn plan_overload(&self, qualified: &str, overload: usize) -> Option<&WrapperPlan> {
        self.plans
            .iter()
            .find(|p| p.declaration == qualified && p.overload == overload)
    }

    /// Every successful plan for `qualified`, overloads in catalog order.
    pub fn plans_named<'r>(&'r self, qualified: &'r str) -> impl Iterator<Item = &'r WrapperPlan> {
        self.plans.iter().filter(move |p| p.declaration == qualified)
    }

    /// The first failure for `qualified`, if any overload failed.
    pub fn failure(&self, qualified: &str) -> Option<&Failure> {
        self.failures.iter().find(|f| f.declaration == qualified)
    }

    /// True when no declaration failed.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Serialize to JSON.
    pub fn to_json(&self, pretty: bool) -> serde_json::Result<String> {
        if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        }
    }
}

/// Builds wrapper plans for a catalog.
#[derive(Debug, Clone, Copy)]
pub struct Synthesizer<'a> {
    classifier: Classifier<'a>,
}

impl<'a> Synthesizer<'a> {
    /// Create a synthesizer over `catalog`.
    pub fn new(catalog: &'a Catalog, ctx: &'a ClassifyContext) -> Self {
        Self {
            classifier: Classifier::new(catalog, ctx),
        }
    }

    /// The underlying classifier.
    pub fn classifier(&self) -> &Classifier<'a> {
        &self.classifier
    }

    /// Why `decl` gets no wrapper, if it gets none.
    ///
    /// `ignore`d declarations and a refcounted type's own increment and
    /// decrement methods are skipped; the shared handle calls those.
    pub fn skip_reason(&self, decl: &Declaration) -> Option<String> {
        if decl.is_ignored() {
            return Some("ignored by annotation".to_string());
        }
        let owner = decl.enclosing()?;
        let methods = self.classifier.refcount_methods(owner)?;
        (decl.has_receiver()
            && decl.params().is_empty()
            && (decl.name() == methods.increment || decl.name() == methods.decrement))
            .then(|| "refcount method of the shared handle".to_string())
    }

    /// Plan one declaration.
    ///
    /// # Errors
    ///
    /// The first classification error of any slot.
    pub fn plan(&self, decl: &Declaration) -> Result<WrapperPlan, ClassifyError> {
        let mut params = Vec::with_capacity(decl.params().len());
        for (i, param) in decl.params().iter().enumerate() {
            let role = Role::Param(i);
            let verdict = self.classifier.classify(decl, role)?;
            let action = BoundaryAction::for_verdict(&verdict, role);
            let Verdict::Ownership(ownership) = verdict else {
                return Err(ModelError::malformed(
                    decl.qualified_name(),
                    "singleton accessors take no parameters",
                )
                .into());
            };
            params.push(ParamPlan {
                name: param.name.clone(),
                shape: param.shape.clone(),
                direction: param.direction,
                refcount: self.refcount_for(&param.shape, Some(&ownership)),
                ownership,
                action,
            });
        }

        let ret = match decl.ret() {
            Some(shape) => {
                let verdict = self.classifier.classify(decl, Role::Return)?;
                let action = BoundaryAction::for_verdict(&verdict, Role::Return);
                let ownership = match verdict {
                    Verdict::Ownership(c) => Some(c),
                    Verdict::Singleton(_) => None,
                };
                Some(ReturnPlan {
                    shape: shape.clone(),
                    refcount: self.refcount_for(shape, ownership.as_ref()),
                    ownership,
                    action,
                })
            }
            None => None,
        };

        let plan = WrapperPlan {
            declaration: decl.qualified_name(),
            overload: 0,
            wrapper_name: decl.wrapper_name().to_string(),
            enclosing: decl.enclosing().map(str::to_string),
            receiver: decl.receiver(),
            bound_method: decl.bound_method().map(|(of_class, method)| BoundMethod {
                of_class: of_class.to_string(),
                method: method.to_string(),
            }),
            params,
            ret,
            custody: self.classifier.custody_links(decl)?,
            singleton: self.classifier.singleton_accessor(decl),
        };
        debug!(
            declaration = %plan.declaration,
            params = plan.params.len(),
            links = plan.custody.len(),
            "planned"
        );
        Ok(plan)
    }

    fn refcount_for(
        &self,
        shape: &TypeShape,
        ownership: Option<&Classification>,
    ) -> Option<RefcountMethods> {
        ownership.filter(|c| c.category == OwnershipCategory::SharedOwningRefcounted)?;
        shape
            .target_name()
            .and_then(|t| self.classifier.refcount_methods(t))
    }

    fn refcounted_types(&self) -> IndexMap<String, RefcountMethods> {
        self.classifier
            .catalog()
            .types()
            .filter_map(|ty| {
                self.classifier
                    .refcount_methods(ty.name())
                    .map(|m| (ty.name().to_string(), m))
            })
            .collect()
    }

    /// Walk the catalog, skipping or planning each declaration.
    /// `on_failure` turns a classification error into a recorded failure,
    /// or stops the walk.
    fn collect<E>(
        &self,
        mut on_failure: impl FnMut(&Declaration, usize, ClassifyError) -> Result<Failure, E>,
    ) -> Result<CatalogReport, E> {
        let mut report = CatalogReport {
            refcounted: self.refcounted_types(),
            ..Default::default()
        };
        let mut overloads: HashMap<String, usize> = HashMap::new();

        for decl in self.classifier.catalog().declarations() {
            let declaration = decl.qualified_name();
            let seen = overloads.entry(declaration.clone()).or_default();
            let overload = *seen;
            *seen += 1;

            if let Some(reason) = self.skip_reason(decl) {
                report.skipped.push(Skipped {
                    declaration,
                    overload,
                    reason,
                });
                continue;
            }
            match self.plan(decl) {
                Ok(plan) => report.plans.push(WrapperPlan { overload, ..plan }),
                Err(e) => report.failures.push(on_failure(decl, overload, e)?),
            }
        }

        Ok(report)
    }

    /// Plan every declaration, collecting failures instead of stopping.
    pub fn report(&self) -> CatalogReport {
        self.collect(|decl, overload, e| {
            warn!(declaration = %decl.qualified_name(), overload, error = %e, "cannot plan");
            Ok::<_, std::convert::Infallible>(Failure::new(decl, overload, &e))
        })
        .unwrap_or_else(|never| match never {})
    }

    /// Plan every declaration, stopping at the first failure.
    pub fn try_report(&self) -> Result<CatalogReport, ClassifyError> {
        self.collect(|_, _, e| Err(e))
    }
}
