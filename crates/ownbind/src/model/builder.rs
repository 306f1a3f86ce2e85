//! Builders for declarations and types

use std::collections::HashSet;

use crate::annotation::{CustodianRef, Directives, RETURN_TARGET};
use crate::context::ClassifyContext;
use crate::error::ModelError;

use super::{Declaration, Direction, Parameter, Receiver, RefcountMethods, TypeDecl, TypeShape};

#[derive(Debug, Clone)]
enum PendingShape {
    Shape(TypeShape),
    Spelled(String),
}

impl PendingShape {
    fn resolve(self, ctx: &ClassifyContext) -> Result<TypeShape, ModelError> {
        let shape = match self {
            PendingShape::Shape(shape) => shape,
            PendingShape::Spelled(spelling) => return TypeShape::parse(&spelling, ctx),
        };

        if shape.base_name().trim().is_empty() {
            return Err(ModelError::UnresolvedType {
                spelling: shape.to_string(),
                reason: "empty type name".to_string(),
            });
        }
        if let Some(unknown) = shape.holders().into_iter().find(|h| !ctx.is_holder(h)) {
            return Err(ModelError::UnresolvedType {
                spelling: shape.to_string(),
                reason: format!("unknown holder `{}`", unknown),
            });
        }
        Ok(shape)
    }
}

/// Builds a [`Declaration`] from structural facts.
///
/// # Example
///
/// ```
/// use ownbind::{ClassifyContext, DeclarationBuilder, TypeShape};
///
/// let ctx = ClassifyContext::default();
/// let decl = DeclarationBuilder::method("SomeObject", "set_foo_ptr")
///     .param("foo", TypeShape::pointer(TypeShape::value("Foo")))
///     .annotation("@foo(transfer_ownership=true)")
///     .build(&ctx)
///     .unwrap();
///
/// assert_eq!(decl.qualified_name(), "SomeObject::set_foo_ptr");
/// assert_eq!(decl.params()[0].annotation.transfer_ownership, Some(true));
/// ```
#[derive(Debug, Clone)]
pub struct DeclarationBuilder {
    name: String,
    enclosing: Option<String>,
    receiver: Receiver,
    params: Vec<(String, PendingShape)>,
    ret: Option<PendingShape>,
    annotation: Option<String>,
}

impl DeclarationBuilder {
    /// A free function.
    pub fn function(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enclosing: None,
            receiver: Receiver::Static,
            params: Vec::new(),
            ret: None,
            annotation: None,
        }
    }

    /// A (mutating) instance method.
    pub fn method(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            enclosing: Some(owner.into()),
            receiver: Receiver::Mut,
            ..Self::function(name)
        }
    }

    /// A static method.
    pub fn static_method(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            enclosing: Some(owner.into()),
            ..Self::function(name)
        }
    }

    /// Set the receiver kind.
    pub fn receiver(mut self, receiver: Receiver) -> Self {
        self.receiver = receiver;
        self
    }

    /// Append a parameter with a structural shape.
    pub fn param(mut self, name: impl Into<String>, shape: TypeShape) -> Self {
        self.params.push((name.into(), PendingShape::Shape(shape)));
        self
    }

    /// Append a parameter given as a native spelling, resolved at build time.
    pub fn param_spelled(mut self, name: impl Into<String>, spelling: impl Into<String>) -> Self {
        self.params
            .push((name.into(), PendingShape::Spelled(spelling.into())));
        self
    }

    /// Set the return shape.
    pub fn returns(mut self, shape: TypeShape) -> Self {
        self.ret = Some(PendingShape::Shape(shape));
        self
    }

    /// Set the return type as a native spelling.
    pub fn returns_spelled(mut self, spelling: impl Into<String>) -> Self {
        self.ret = Some(PendingShape::Spelled(spelling.into()));
        self
    }

    /// Attach annotation text. Repeated calls are joined.
    pub fn annotation(mut self, text: impl AsRef<str>) -> Self {
        let text = text.as_ref().trim();
        if text.is_empty() {
            return self;
        }
        self.annotation = Some(match self.annotation.take() {
            Some(existing) => format!("{}; {}", existing, text),
            None => text.to_string(),
        });
        self
    }

    fn enclosed_by(mut self, owner: &str) -> Self {
        self.enclosing = Some(owner.to_string());
        self
    }

    fn qualified_name(&self) -> String {
        match &self.enclosing {
            Some(owner) => format!("{}::{}", owner, self.name),
            None => self.name.clone(),
        }
    }

    /// Resolve shapes and annotations into an immutable [`Declaration`].
    ///
    /// # Errors
    ///
    /// `MalformedDeclaration` when a shape cannot be resolved, the annotation
    /// does not parse, or a directive names something that does not exist.
    pub fn build(self, ctx: &ClassifyContext) -> Result<Declaration, ModelError> {
        let qualified = self.qualified_name();
        let malformed = |reason: String| ModelError::malformed(&qualified, reason);

        if self.name.trim().is_empty() {
            return Err(malformed("declaration has no name".to_string()));
        }
        let receiver = if self.enclosing.is_none() {
            Receiver::Static
        } else {
            self.receiver
        };

        let directives = match &self.annotation {
            Some(text) => Directives::parse(text).map_err(|e| e.in_declaration(&qualified))?,
            None => Directives::default(),
        };

        let ret = self
            .ret
            .map(|s| s.resolve(ctx))
            .transpose()
            .map_err(|e| e.in_declaration(&qualified))?;

        let mut seen = HashSet::new();
        let mut params = Vec::with_capacity(self.params.len());
        for (name, pending) in self.params {
            if !seen.insert(name.clone()) {
                return Err(malformed(format!("duplicate parameter `{}`", name)));
            }
            let shape = pending
                .resolve(ctx)
                .map_err(|e| e.in_declaration(&qualified))?;
            let annotation = directives
                .param(&name)
                .map_err(|e| e.in_declaration(&qualified))?;
            let direction = annotation
                .direction
                .unwrap_or_else(|| Direction::for_shape(&shape));
            params.push(Parameter {
                name,
                shape,
                direction,
                annotation,
            });
        }

        for target in directives.targets() {
            if target == RETURN_TARGET {
                if ret.is_none() {
                    return Err(malformed("return directive on a void declaration".to_string()));
                }
            } else if !seen.contains(target) {
                return Err(malformed(format!("directive names unknown parameter `{}`", target)));
            }
        }

        let return_annotation = directives
            .return_annotation()
            .map_err(|e| e.in_declaration(&qualified))?;
        let options = directives
            .decl_options()
            .map_err(|e| e.in_declaration(&qualified))?;

        let has_receiver = self.enclosing.is_some() && receiver != Receiver::Static;
        let returns_pointer = ret.as_ref().is_some_and(TypeShape::is_pointer_like);
        let check_custodian = |custodian: CustodianRef, ward: Option<usize>| match custodian {
            CustodianRef::Receiver if !has_receiver => {
                Err(malformed("custodian=0 needs an instance receiver".to_string()))
            }
            CustodianRef::Return if ward.is_none() => Err(malformed(
                "the return value cannot be its own custodian".to_string(),
            )),
            CustodianRef::Return if !returns_pointer => Err(malformed(
                "custodian=-1 needs a pointer return value".to_string(),
            )),
            CustodianRef::Param(i) if i >= params.len() => Err(malformed(format!(
                "custodian={} but there are only {} parameter(s)",
                i + 1,
                params.len()
            ))),
            CustodianRef::Param(i) if Some(i) == ward => Err(malformed(format!(
                "parameter `{}` cannot be its own custodian",
                params[i].name
            ))),
            _ => Ok(()),
        };
        if let Some(custodian) = return_annotation.custodian {
            check_custodian(custodian, None)?;
        }
        for (i, param) in params.iter().enumerate() {
            if let Some(custodian) = param.annotation.custodian {
                check_custodian(custodian, Some(i))?;
            }
        }

        Ok(Declaration {
            name: self.name,
            params,
            ret,
            return_annotation,
            enclosing: self.enclosing,
            receiver,
            annotation: self.annotation,
            options,
        })
    }
}

/// Builds a [`TypeDecl`] and the methods declared on it.
#[derive(Debug, Clone)]
pub struct TypeDeclBuilder {
    name: String,
    methods: Vec<DeclarationBuilder>,
    annotation: Option<String>,
}

impl TypeDeclBuilder {
    /// Start a type.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
            annotation: None,
        }
    }

    /// Type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attach class-level annotation text. Repeated calls are joined.
    pub fn annotation(mut self, text: impl AsRef<str>) -> Self {
        let text = text.as_ref().trim();
        if text.is_empty() {
            return self;
        }
        self.annotation = Some(match self.annotation.take() {
            Some(existing) => format!("{}; {}", existing, text),
            None => text.to_string(),
        });
        self
    }

    /// Add a method. Its enclosing type is forced to this type.
    pub fn method(mut self, method: DeclarationBuilder) -> Self {
        self.methods.push(method);
        self
    }

    /// Add a method in place.
    pub fn push_method(&mut self, method: DeclarationBuilder) {
        self.methods.push(method);
    }

    /// Resolve methods and class annotations into a [`TypeDecl`].
    ///
    /// # Errors
    ///
    /// `MalformedDeclaration` for any failing method, for a lone
    /// `incref_method`/`decref_method`, or when those name something other
    /// than a zero-argument instance method.
    pub fn build(self, ctx: &ClassifyContext) -> Result<TypeDecl, ModelError> {
        let name = self.name;
        if name.trim().is_empty() {
            return Err(ModelError::malformed("<anonymous>", "type has no name"));
        }

        let options = match &self.annotation {
            Some(text) => Directives::parse(text)
                .and_then(|d| d.class_options())
                .map_err(|e| e.in_declaration(&name))?,
            None => Default::default(),
        };

        let methods = self
            .methods
            .into_iter()
            .map(|m| m.enclosed_by(&name).build(ctx))
            .collect::<Result<Vec<_>, _>>()?;

        let is_zero_arg_method = |method: &str| {
            methods
                .iter()
                .any(|m| m.name == method && m.params.is_empty() && m.has_receiver())
        };

        let refcount = match (options.incref_method, options.decref_method) {
            (None, None) => None,
            (Some(increment), Some(decrement)) => {
                for method in [&increment, &decrement] {
                    if !is_zero_arg_method(method.as_str()) {
                        return Err(ModelError::malformed(
                            &name,
                            format!("`{}` is not a zero-argument instance method", method),
                        ));
                    }
                }
                Some(RefcountMethods {
                    increment,
                    decrement,
                    peek: options.peekref_method,
                })
            }
            _ => {
                return Err(ModelError::malformed(
                    &name,
                    "incref_method and decref_method must be given together",
                ))
            }
        };

        Ok(TypeDecl {
            name,
            methods,
            refcount,
            is_singleton: options.is_singleton.unwrap_or(false),
            annotation: self.annotation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::CustodianRef;

    fn ctx() -> ClassifyContext {
        ClassifyContext::default()
    }

    #[test]
    fn test_build_spelled_method() {
        let decl = DeclarationBuilder::method("SomeObject", "get_foobar_with_other_as_custodian")
            .param_spelled("other", "const SomeObject *")
            .returns_spelled("Foobar*")
            .annotation("@return(custodian=1)")
            .build(&ctx())
            .unwrap();

        assert_eq!(
            decl.params()[0].shape,
            TypeShape::const_pointer(TypeShape::value("SomeObject"))
        );
        assert_eq!(
            decl.return_annotation().custodian,
            Some(CustodianRef::Param(0))
        );
        assert!(decl.has_receiver());
    }

    #[test]
    fn test_free_function_has_static_receiver() {
        let decl = DeclarationBuilder::function("f")
            .receiver(Receiver::Const)
            .build(&ctx())
            .unwrap();
        assert_eq!(decl.receiver(), Receiver::Static);
        assert!(!decl.has_receiver());
    }

    #[test]
    fn test_direction_annotation_overrides_shape() {
        let decl = DeclarationBuilder::method("SomeObject", "get_foo_by_ref")
            .param_spelled("foo", "Foo&")
            .annotation("@foo(direction=out)")
            .build(&ctx())
            .unwrap();
        assert_eq!(decl.params()[0].direction, Direction::Out);
    }

    #[test]
    fn test_unknown_holder_is_malformed() {
        let err = DeclarationBuilder::function("make")
            .returns(TypeShape::wrapper("Vector", TypeShape::value("Foo")))
            .build(&ctx())
            .unwrap_err();
        assert!(matches!(err, ModelError::MalformedDeclaration { ref declaration, .. } if declaration == "make"));
    }

    #[test]
    fn test_directive_for_unknown_parameter_is_malformed() {
        let err = DeclarationBuilder::function("store_zbr")
            .param_spelled("zbr", "Zbr*")
            .annotation("@zbrr(transfer_ownership=true)")
            .build(&ctx())
            .unwrap_err();
        assert!(err.to_string().contains("zbrr"));
    }

    #[test]
    fn test_return_directive_on_void_is_malformed() {
        assert!(DeclarationBuilder::function("f")
            .annotation("@return(caller_owns_return=true)")
            .build(&ctx())
            .is_err());
    }

    #[test]
    fn test_custodian_index_checks() {
        // custodian=0 on a free function
        assert!(DeclarationBuilder::function("f")
            .returns_spelled("Foobar*")
            .annotation("@return(custodian=0)")
            .build(&ctx())
            .is_err());

        // custodian out of range
        assert!(DeclarationBuilder::function("f")
            .param_spelled("other", "const SomeObject*")
            .returns_spelled("Foobar*")
            .annotation("@return(custodian=2)")
            .build(&ctx())
            .is_err());

        // return as its own custodian
        assert!(DeclarationBuilder::function("f")
            .returns_spelled("Foobar*")
            .annotation("@return(custodian=-1)")
            .build(&ctx())
            .is_err());

        // parameter as its own custodian
        assert!(DeclarationBuilder::function("f")
            .param_spelled("foobar", "Foobar*")
            .annotation("@foobar(custodian=1)")
            .build(&ctx())
            .is_err());

        // custodian=-1 without a pointer return
        assert!(DeclarationBuilder::function("f")
            .param_spelled("foobar", "Foobar*")
            .returns_spelled("int")
            .annotation("@foobar(custodian=-1)")
            .build(&ctx())
            .is_err());
    }

    #[test]
    fn test_duplicate_parameter() {
        assert!(DeclarationBuilder::function("f")
            .param_spelled("a", "int")
            .param_spelled("a", "int")
            .build(&ctx())
            .is_err());
    }

    #[test]
    fn test_annotation_joins() {
        let decl = DeclarationBuilder::function("f")
            .param_spelled("foobar", "Foobar*")
            .returns_spelled("SomeObject*")
            .annotation("@foobar(custodian=-1)")
            .annotation("@return(caller_owns_return=true)")
            .annotation("  ")
            .build(&ctx())
            .unwrap();
        assert_eq!(
            decl.annotation(),
            Some("@foobar(custodian=-1); @return(caller_owns_return=true)")
        );
        assert_eq!(decl.return_annotation().caller_owns_return, Some(true));
    }

    #[test]
    fn test_type_refcount_methods() {
        let ty = TypeDeclBuilder::new("Zbr")
            .annotation("incref_method=Ref; decref_method=Unref; peekref_method=GetReferenceCount")
            .method(DeclarationBuilder::method("Zbr", "Ref"))
            .method(DeclarationBuilder::method("Zbr", "Unref"))
            .method(
                DeclarationBuilder::method("Zbr", "GetReferenceCount")
                    .receiver(Receiver::Const)
                    .returns_spelled("int"),
            )
            .build(&ctx())
            .unwrap();

        let rc = ty.declared_refcount().unwrap();
        assert_eq!(rc.increment, "Ref");
        assert_eq!(rc.decrement, "Unref");
        assert_eq!(rc.peek.as_deref(), Some("GetReferenceCount"));
        assert_eq!(ty.methods_named("Ref").count(), 1);
    }

    #[test]
    fn test_type_refcount_needs_both_methods() {
        let err = TypeDeclBuilder::new("Zbr")
            .annotation("incref_method=Ref")
            .method(DeclarationBuilder::method("Zbr", "Ref"))
            .build(&ctx())
            .unwrap_err();
        assert!(err.to_string().contains("together"));

        let err = TypeDeclBuilder::new("Zbr")
            .annotation("incref_method=Ref; decref_method=Unref")
            .method(DeclarationBuilder::method("Zbr", "Ref"))
            .build(&ctx())
            .unwrap_err();
        assert!(err.to_string().contains("Unref"));
    }

    #[test]
    fn test_methods_are_enclosed() {
        let ty = TypeDeclBuilder::new("Foo")
            .method(DeclarationBuilder::function("get_datum").receiver(Receiver::Const))
            .build(&ctx())
            .unwrap();
        assert_eq!(ty.methods()[0].enclosing(), Some("Foo"));
        assert_eq!(ty.methods()[0].receiver(), Receiver::Const);
    }

    #[test]
    fn test_singleton_flag() {
        let ty = TypeDeclBuilder::new("SingletonClass")
            .annotation("is_singleton=true")
            .build(&ctx())
            .unwrap();
        assert!(ty.is_singleton());
    }
}
