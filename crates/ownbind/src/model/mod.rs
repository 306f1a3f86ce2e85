//! Declaration model
//!
//! A language-neutral description of native callables and types. Nothing in
//! here infers ownership; declarations only record structural facts and the
//! explicit annotations written next to them.

mod builder;
mod shape;
mod spelling;

pub use builder::{DeclarationBuilder, TypeDeclBuilder};
pub use shape::TypeShape;

use std::fmt;

use serde::Serialize;

use crate::annotation::{DeclOptions, ParamAnnotation, ReturnAnnotation};

/// Data-flow direction of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Read by the callee
    In,
    /// Written by the callee
    Out,
    /// Read and written by the callee
    InOut,
}

impl Direction {
    /// Direction implied by the shape alone.
    pub fn for_shape(shape: &TypeShape) -> Self {
        match shape {
            TypeShape::Reference {
                is_const: false, ..
            } => Direction::InOut,
            _ => Direction::In,
        }
    }
}

/// How a method is bound to its enclosing type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Receiver {
    /// Free function or static method
    Static,
    /// `const` method
    Const,
    /// Mutating method
    Mut,
}

/// A single parameter of a callable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    /// Parameter name
    pub name: String,

    /// Structural shape
    pub shape: TypeShape,

    /// Effective direction (annotation or shape default)
    pub direction: Direction,

    /// Ownership directives targeting this parameter
    pub annotation: ParamAnnotation,
}

/// A native callable: free function, method or static method.
///
/// Immutable once built; use [`DeclarationBuilder`] to construct one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub(crate) name: String,
    pub(crate) params: Vec<Parameter>,
    pub(crate) ret: Option<TypeShape>,
    pub(crate) return_annotation: ReturnAnnotation,
    pub(crate) enclosing: Option<String>,
    pub(crate) receiver: Receiver,
    pub(crate) annotation: Option<String>,
    pub(crate) options: DeclOptions,
}

impl Declaration {
    /// Native name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `Type::name` for methods, `name` for free functions.
    pub fn qualified_name(&self) -> String {
        match &self.enclosing {
            Some(owner) => format!("{}::{}", owner, self.name),
            None => self.name.clone(),
        }
    }

    /// Name the wrapper should expose (`name=` directive or native name).
    pub fn wrapper_name(&self) -> &str {
        self.options.name.as_deref().unwrap_or(&self.name)
    }

    /// `(type, method)` when a free function is exposed as a method via
    /// `as_method=`/`of_class=`.
    pub fn bound_method(&self) -> Option<(&str, &str)> {
        self.options
            .of_class
            .as_deref()
            .zip(self.options.as_method.as_deref())
    }

    /// Parameters in declaration order.
    pub fn params(&self) -> &[Parameter] {
        &self.params
    }

    /// Parameter by position.
    pub fn param(&self, index: usize) -> Option<&Parameter> {
        self.params.get(index)
    }

    /// Return shape; `None` for `void`.
    pub fn ret(&self) -> Option<&TypeShape> {
        self.ret.as_ref()
    }

    /// Ownership directives targeting the return value.
    pub fn return_annotation(&self) -> &ReturnAnnotation {
        &self.return_annotation
    }

    /// Enclosing type for methods.
    pub fn enclosing(&self) -> Option<&str> {
        self.enclosing.as_deref()
    }

    /// Receiver kind.
    pub fn receiver(&self) -> Receiver {
        self.receiver
    }

    /// True for methods invoked on an instance.
    pub fn has_receiver(&self) -> bool {
        self.enclosing.is_some() && self.receiver != Receiver::Static
    }

    /// The raw annotation text, if any.
    pub fn annotation(&self) -> Option<&str> {
        self.annotation.as_deref()
    }

    /// True when annotated with `ignore`.
    pub fn is_ignored(&self) -> bool {
        self.options.ignore
    }

    /// True when any parameter or the return carries an ownership directive.
    pub fn has_ownership_annotation(&self) -> bool {
        !self.return_annotation.is_silent() || self.params.iter().any(|p| !p.annotation.is_silent())
    }
}

impl fmt::Display for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ret {
            Some(ret) => write!(f, "{} ", ret)?,
            None => write!(f, "void ")?,
        }
        write!(f, "{}(", self.qualified_name())?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} {}", p.shape, p.name)?;
        }
        write!(f, ")")?;
        if self.receiver == Receiver::Const {
            write!(f, " const")?;
        }
        Ok(())
    }
}

/// Names of a type's manual reference-counting methods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefcountMethods {
    /// Zero-argument increment
    pub increment: String,

    /// Zero-argument decrement that destroys the object at zero
    pub decrement: String,

    /// Optional count accessor
    pub peek: Option<String>,
}

/// A native type and the methods declared on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDecl {
    pub(crate) name: String,
    pub(crate) methods: Vec<Declaration>,
    pub(crate) refcount: Option<RefcountMethods>,
    pub(crate) is_singleton: bool,
    pub(crate) annotation: Option<String>,
}

impl TypeDecl {
    /// Type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Methods in declaration order.
    pub fn methods(&self) -> &[Declaration] {
        &self.methods
    }

    /// Methods named `name` (overloads included).
    pub fn methods_named<'a, 'n>(
        &'a self,
        name: &'n str,
    ) -> impl Iterator<Item = &'a Declaration> + 'n
    where
        'a: 'n,
    {
        self.methods.iter().filter(move |m| m.name == name)
    }

    /// Refcount methods declared by annotation.
    pub fn declared_refcount(&self) -> Option<&RefcountMethods> {
        self.refcount.as_ref()
    }

    /// True when annotated `is_singleton`.
    pub fn is_singleton(&self) -> bool {
        self.is_singleton
    }

    /// The raw annotation text, if any.
    pub fn annotation(&self) -> Option<&str> {
        self.annotation.as_deref()
    }
}
