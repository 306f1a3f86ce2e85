//! Ownership classification
//!
//! Decides, for every parameter and return slot of a declaration, who owns
//! the value crossing the boundary. The order of the checks below is the
//! contract:
//!
//! 1. singleton accessors are routed away before anything else
//! 2. custodian/ward links, explicit (`custodian=`) or from the
//!    `*_with_<x>_as_custodian` name shape
//! 3. value and reference shapes
//! 4. pointers: explicit annotation, then const, shared-setter and plain
//!    pointer defaults
//! 5. pointer holders, decided by their [`HolderPolicy`](crate::HolderPolicy)
//!
//! A pointee with manual refcounting turns any pointer-like slot into
//! [`OwnershipCategory::SharedOwningRefcounted`]; the transfer decision only
//! picks the [`RefcountMode`].
//!
//! Conflicting signals are never resolved by guessing: they surface as
//! [`ClassifyError::AmbiguousOwnership`] naming both rules.

mod links;

use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::catalog::Catalog;
use crate::context::ClassifyContext;
use crate::custody::{CustodyLinkSpec, Endpoint};
use crate::error::{ClassifyError, ModelError};
use crate::model::{Declaration, Receiver, RefcountMethods, TypeDecl, TypeShape};

/// The slot of a declaration being classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Parameter by zero-based position
    Param(usize),
    /// The return value
    Return,
}

impl Role {
    /// Human-readable slot name within `decl`.
    pub fn describe(&self, decl: &Declaration) -> String {
        match self {
            Role::Param(i) => match decl.param(*i) {
                Some(p) => format!("parameter `{}`", p.name),
                None => format!("parameter #{}", i),
            },
            Role::Return => "return value".to_string(),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Param(i) => write!(f, "param[{}]", i),
            Role::Return => write!(f, "return"),
        }
    }
}

impl From<Role> for Endpoint {
    fn from(role: Role) -> Self {
        match role {
            Role::Param(i) => Endpoint::Param(i),
            Role::Return => Endpoint::Return,
        }
    }
}

/// Ownership of a value crossing the wrapper boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OwnershipCategory {
    /// Independent copy; no lifetime contract
    ValueCopy,
    /// Call-scoped access, never retained
    BorrowedRef,
    /// The callee becomes the owner; the caller's handle is invalidated
    OwnedTransferIn,
    /// The caller becomes the owner and must release
    OwnedTransferOut,
    /// The library keeps ownership; valid while the owner lives
    SharedNonOwning,
    /// Shared through the pointee's reference count
    SharedOwningRefcounted,
    /// Lifetime bounded by a custodian object
    CustodianWard,
}

/// How a refcounted value crosses the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RefcountMode {
    /// The callee consumes one reference
    TransferIn,
    /// The caller receives one reference it must release
    TransferOut,
    /// A peek: no reference changes hands
    NonOwning,
}

impl RefcountMode {
    fn for_role(role: Role, transfers: bool) -> Self {
        match (role, transfers) {
            (Role::Param(_), true) => RefcountMode::TransferIn,
            (Role::Return, true) => RefcountMode::TransferOut,
            (_, false) => RefcountMode::NonOwning,
        }
    }
}

/// The rule that produced a classification, reported in conflicts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Rule {
    // ═══════════════════════════════════════════════════════════════════
    // Annotations
    // ═══════════════════════════════════════════════════════════════════
    /// `transfer_ownership=` on a parameter
    ExplicitTransfer,
    /// `caller_owns_return=` on the return value
    ExplicitCallerOwns,
    /// `custodian=` on a parameter or the return value
    ExplicitCustodian,

    // ═══════════════════════════════════════════════════════════════════
    // Structure
    // ═══════════════════════════════════════════════════════════════════
    /// By-value type
    ValueShape,
    /// Reference type
    ReferenceShape,
    /// Plain pointer default
    PointerDefault,
    /// Pointer-to-const default
    ConstPointerDefault,
    /// `set_*_shared*` setter
    SharedSetterName,
    /// Pointee with increment/decrement methods
    RefcountShape,
    /// Static ownership of a pointer holder
    HolderPolicy(String),
    /// `*_with_<x>_as_custodian` name
    CustodyNameShape,
    /// Strict mode refused a pointer default
    StrictPointerOwnership,
    /// Static accessor of a singleton type
    SingletonAccessor,
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::ExplicitTransfer => write!(f, "explicit transfer_ownership"),
            Rule::ExplicitCallerOwns => write!(f, "explicit caller_owns_return"),
            Rule::ExplicitCustodian => write!(f, "explicit custodian"),
            Rule::ValueShape => write!(f, "value shape"),
            Rule::ReferenceShape => write!(f, "reference shape"),
            Rule::PointerDefault => write!(f, "pointer default"),
            Rule::ConstPointerDefault => write!(f, "const pointer default"),
            Rule::SharedSetterName => write!(f, "shared setter name"),
            Rule::RefcountShape => write!(f, "refcount shape"),
            Rule::HolderPolicy(holder) => write!(f, "`{}` holder policy", holder),
            Rule::CustodyNameShape => write!(f, "custodian name shape"),
            Rule::StrictPointerOwnership => write!(f, "strict pointer ownership"),
            Rule::SingletonAccessor => write!(f, "singleton accessor"),
        }
    }
}

/// The ownership decision for one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    /// Ownership category
    pub category: OwnershipCategory,

    /// Sub-mode, set only for `SharedOwningRefcounted`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refcount_mode: Option<RefcountMode>,

    /// The callee may mutate through this slot
    pub mutable: bool,

    /// Holder template the pointer travels in, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wrapped: Option<String>,

    /// The link to record, set only for `CustodianWard`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custody: Option<CustodyLinkSpec>,

    /// The deciding rule
    pub rule: Rule,
}

impl Classification {
    fn new(category: OwnershipCategory, rule: Rule) -> Self {
        Self {
            category,
            refcount_mode: None,
            mutable: false,
            wrapped: None,
            custody: None,
            rule,
        }
    }

    fn refcounted(mode: RefcountMode) -> Self {
        Self {
            refcount_mode: Some(mode),
            ..Self::new(OwnershipCategory::SharedOwningRefcounted, Rule::RefcountShape)
        }
    }

    fn mutable(mut self, mutable: bool) -> Self {
        self.mutable = mutable;
        self
    }

    fn wrapped_in(mut self, holder: Option<&str>) -> Self {
        self.wrapped = holder.map(str::to_string);
        self
    }

    /// True when the pointer travels inside a holder.
    pub fn is_wrapped(&self) -> bool {
        self.wrapped.is_some()
    }
}

/// A declaration routed to the singleton guard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SingletonAccessor {
    /// The singleton type
    pub type_name: String,
    /// The accessor method
    pub accessor: String,
}

/// Outcome of [`Classifier::classify`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    /// An ownership decision
    Ownership(Classification),
    /// Handled by the singleton guard instead
    Singleton(SingletonAccessor),
}

impl Verdict {
    /// The ownership decision, if this is not a singleton accessor.
    pub fn classification(&self) -> Option<&Classification> {
        match self {
            Verdict::Ownership(c) => Some(c),
            Verdict::Singleton(_) => None,
        }
    }

    /// The category, if this is not a singleton accessor.
    pub fn category(&self) -> Option<OwnershipCategory> {
        self.classification().map(|c| c.category)
    }

    /// The refcount sub-mode, if any.
    pub fn refcount_mode(&self) -> Option<RefcountMode> {
        self.classification().and_then(|c| c.refcount_mode)
    }

    /// True when routed to the singleton guard.
    pub fn is_singleton(&self) -> bool {
        matches!(self, Verdict::Singleton(_))
    }
}

/// Classifies declaration slots against a catalog.
///
/// Pure: classification reads the catalog and the context and never
/// mutates either, so a classifier can be shared across threads.
///
/// # Example
///
/// ```
/// use ownbind::{Catalog, Classifier, ClassifyContext, DeclarationBuilder, OwnershipCategory, Role};
///
/// let ctx = ClassifyContext::default();
/// let catalog = Catalog::new();
/// let decl = DeclarationBuilder::function("make_foo")
///     .returns_spelled("Foo *")
///     .build(&ctx)
///     .unwrap();
///
/// let verdict = Classifier::new(&catalog, &ctx).classify(&decl, Role::Return).unwrap();
/// assert_eq!(verdict.category(), Some(OwnershipCategory::OwnedTransferOut));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Classifier<'a> {
    catalog: &'a Catalog,
    ctx: &'a ClassifyContext,
}

impl<'a> Classifier<'a> {
    /// Create a classifier over `catalog`.
    pub fn new(catalog: &'a Catalog, ctx: &'a ClassifyContext) -> Self {
        Self { catalog, ctx }
    }

    /// The configuration in use.
    pub fn context(&self) -> &'a ClassifyContext {
        self.ctx
    }

    /// The catalog in use.
    pub fn catalog(&self) -> &'a Catalog {
        self.catalog
    }

    /// Classify one slot of `decl`.
    ///
    /// # Errors
    ///
    /// - `MalformedDeclaration` when `role` does not exist on `decl`
    /// - `AmbiguousOwnership` when two ownership signals disagree
    pub fn classify(&self, decl: &Declaration, role: Role) -> Result<Verdict, ClassifyError> {
        let shape = slot_shape(decl, role)?;

        if let Some(accessor) = self.singleton_accessor(decl) {
            debug!(
                declaration = %decl.qualified_name(),
                "routed to singleton guard"
            );
            return Ok(Verdict::Singleton(accessor));
        }

        let classification = self.classify_slot(decl, role, shape)?;
        debug!(
            declaration = %decl.qualified_name(),
            %role,
            category = ?classification.category,
            mode = ?classification.refcount_mode,
            rule = %classification.rule,
            "classified"
        );
        Ok(Verdict::Ownership(classification))
    }

    /// Every slot of `decl`: parameters in order, then the return value.
    pub fn roles(decl: &Declaration) -> impl Iterator<Item = Role> {
        let ret = decl.ret().map(|_| Role::Return);
        (0..decl.params().len()).map(Role::Param).chain(ret)
    }

    /// Custodian/ward links implied by `decl`, explicit or by name.
    pub fn custody_links(&self, decl: &Declaration) -> Result<Vec<CustodyLinkSpec>, ClassifyError> {
        Ok(links::infer(decl, self.ctx)?
            .into_iter()
            .map(|(link, _)| link)
            .collect())
    }

    /// The singleton routing for `decl`, if it is a singleton accessor.
    ///
    /// A static method of `T` with no parameters that returns `T*` or `T&`,
    /// where `T` is annotated `is_singleton` or the method name is one of
    /// the configured accessor names.
    pub fn singleton_accessor(&self, decl: &Declaration) -> Option<SingletonAccessor> {
        let owner = decl.enclosing()?;
        if decl.receiver() != Receiver::Static || !decl.params().is_empty() {
            return None;
        }
        let ret = decl.ret()?;
        if !matches!(ret, TypeShape::Pointer { .. } | TypeShape::Reference { .. })
            || ret.target_name() != Some(owner)
        {
            return None;
        }

        let annotated = self.catalog.type_decl(owner).is_some_and(TypeDecl::is_singleton);
        let by_name = self
            .ctx
            .singleton_accessors
            .iter()
            .any(|accessor| accessor == decl.name());
        (annotated || by_name).then(|| SingletonAccessor {
            type_name: owner.to_string(),
            accessor: decl.name().to_string(),
        })
    }

    /// Refcount methods of `type_name`, declared or discovered.
    ///
    /// Declared `incref_method`/`decref_method` win; otherwise the first
    /// configured method pair the type exposes as zero-argument instance
    /// methods is used.
    pub fn refcount_methods(&self, type_name: &str) -> Option<RefcountMethods> {
        let ty = self.catalog.type_decl(type_name)?;
        if let Some(declared) = ty.declared_refcount() {
            return Some(declared.clone());
        }

        let zero_arg = |name: &str| {
            ty.methods_named(name)
                .any(|m| m.params().is_empty() && m.has_receiver())
        };
        self.ctx
            .refcount_method_pairs
            .iter()
            .find(|(inc, dec)| zero_arg(inc.as_str()) && zero_arg(dec.as_str()))
            .map(|(inc, dec)| RefcountMethods {
                increment: inc.clone(),
                decrement: dec.clone(),
                peek: None,
            })
    }

    /// True when `type_name` is refcount-shaped.
    pub fn is_refcounted(&self, type_name: &str) -> bool {
        self.refcount_methods(type_name).is_some()
    }

    fn refcounted_target(&self, shape: &TypeShape) -> bool {
        shape.target_name().is_some_and(|t| self.is_refcounted(t))
    }

    fn classify_slot(
        &self,
        decl: &Declaration,
        role: Role,
        shape: &TypeShape,
    ) -> Result<Classification, ClassifyError> {
        let explicit = explicit_transfer(decl, role);

        let ward = Endpoint::from(role);
        if let Some((link, link_rule)) = links::infer(decl, self.ctx)?
            .into_iter()
            .find(|(link, _)| link.ward == ward)
        {
            if let Some((_, rule)) = explicit {
                return Err(ambiguous(decl, role, link_rule, rule));
            }
            return match shape {
                TypeShape::Value { .. } => Err(ambiguous(decl, role, link_rule, Rule::ValueShape)),
                TypeShape::Reference { .. } => {
                    Err(ambiguous(decl, role, link_rule, Rule::ReferenceShape))
                }
                _ => Ok(Classification {
                    custody: Some(link),
                    ..Classification::new(OwnershipCategory::CustodianWard, link_rule)
                        .mutable(!is_const_pointee(shape))
                        .wrapped_in(holder_of(shape))
                }),
            };
        }

        match shape {
            TypeShape::Value { .. } => match explicit {
                Some((_, rule)) => Err(ambiguous(decl, role, rule, Rule::ValueShape)),
                None => Ok(Classification::new(
                    OwnershipCategory::ValueCopy,
                    Rule::ValueShape,
                )),
            },
            TypeShape::Reference { is_const, .. } => {
                if let Some((_, rule)) = explicit {
                    return Err(ambiguous(decl, role, rule, Rule::ReferenceShape));
                }
                let classification = if self.refcounted_target(shape) {
                    Classification::refcounted(RefcountMode::NonOwning)
                } else {
                    Classification::new(OwnershipCategory::BorrowedRef, Rule::ReferenceShape)
                };
                Ok(classification.mutable(!is_const))
            }
            TypeShape::Pointer { is_const, .. } => {
                self.classify_pointer(decl, role, shape, *is_const, explicit)
            }
            TypeShape::Wrapper { holder, .. } => {
                self.classify_holder(decl, role, shape, holder, explicit)
            }
        }
    }

    fn classify_pointer(
        &self,
        decl: &Declaration,
        role: Role,
        shape: &TypeShape,
        is_const: bool,
        explicit: Option<(bool, Rule)>,
    ) -> Result<Classification, ClassifyError> {
        let (transfers, rule) = match (explicit, role) {
            (Some(found), _) => found,
            (None, _) if is_const => (false, Rule::ConstPointerDefault),
            (None, Role::Param(_)) if self.ctx.is_shared_setter(decl.name()) => {
                (false, Rule::SharedSetterName)
            }
            (None, _) if self.ctx.require_explicit_pointer_ownership => {
                return Err(ambiguous(
                    decl,
                    role,
                    Rule::StrictPointerOwnership,
                    Rule::PointerDefault,
                ))
            }
            (None, _) => (true, Rule::PointerDefault),
        };

        if self.refcounted_target(shape) {
            return Ok(Classification::refcounted(RefcountMode::for_role(role, transfers))
                .mutable(!is_const));
        }

        let category = match (role, transfers) {
            (Role::Param(_), true) => OwnershipCategory::OwnedTransferIn,
            (Role::Return, true) => OwnershipCategory::OwnedTransferOut,
            (Role::Param(_), false) if rule == Rule::ConstPointerDefault => {
                OwnershipCategory::BorrowedRef
            }
            (_, false) => OwnershipCategory::SharedNonOwning,
        };
        Ok(Classification::new(category, rule).mutable(!is_const))
    }

    fn classify_holder(
        &self,
        decl: &Declaration,
        role: Role,
        shape: &TypeShape,
        holder: &str,
        explicit: Option<(bool, Rule)>,
    ) -> Result<Classification, ClassifyError> {
        let policy = self.ctx.holder(holder).ok_or_else(|| {
            ModelError::malformed(
                decl.qualified_name(),
                format!("unknown holder `{}`", holder),
            )
        })?;
        let holder_rule = Rule::HolderPolicy(holder.to_string());
        let transfers = match role {
            Role::Param(_) => policy.param_transfers,
            Role::Return => policy.return_transfers,
        };

        if let Some((annotated, rule)) = explicit {
            if annotated != transfers {
                return Err(ambiguous(decl, role, holder_rule, rule));
            }
        }

        let classification = if self.refcounted_target(shape) {
            Classification::refcounted(RefcountMode::for_role(role, transfers))
        } else {
            let category = match (role, transfers) {
                (Role::Param(_), true) => OwnershipCategory::OwnedTransferIn,
                (Role::Return, true) => OwnershipCategory::OwnedTransferOut,
                (_, false) => OwnershipCategory::SharedNonOwning,
            };
            Classification::new(category, holder_rule)
        };
        Ok(classification
            .mutable(!is_const_pointee(shape))
            .wrapped_in(Some(holder)))
    }
}

fn slot_shape(decl: &Declaration, role: Role) -> Result<&TypeShape, ClassifyError> {
    let shape = match role {
        Role::Param(i) => decl.param(i).map(|p| &p.shape),
        Role::Return => decl.ret(),
    };
    shape.ok_or_else(|| {
        ClassifyError::from(ModelError::malformed(
            decl.qualified_name(),
            format!("no {} slot", role),
        ))
    })
}

fn explicit_transfer(decl: &Declaration, role: Role) -> Option<(bool, Rule)> {
    match role {
        Role::Param(i) => decl
            .param(i)?
            .annotation
            .transfer_ownership
            .map(|t| (t, Rule::ExplicitTransfer)),
        Role::Return => decl
            .return_annotation()
            .caller_owns_return
            .map(|t| (t, Rule::ExplicitCallerOwns)),
    }
}

fn ambiguous(decl: &Declaration, role: Role, first: Rule, second: Rule) -> ClassifyError {
    ClassifyError::AmbiguousOwnership {
        declaration: decl.qualified_name(),
        role: role.describe(decl),
        first,
        second,
    }
}

fn holder_of(shape: &TypeShape) -> Option<&str> {
    match shape {
        TypeShape::Wrapper { holder, .. } => Some(holder),
        _ => None,
    }
}

fn is_const_pointee(shape: &TypeShape) -> bool {
    match shape {
        TypeShape::Wrapper { inner, .. } => inner.is_const_indirection(),
        other => other.is_const_indirection(),
    }
}
