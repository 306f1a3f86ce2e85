//! Declaration catalog
//!
//! The ordered set of types and free functions handed to the classifier.
//! Types are looked up by name when a rule needs facts about a pointee
//! (refcount methods, singleton flag).

use indexmap::IndexMap;

use crate::error::ModelError;
use crate::model::{Declaration, TypeDecl};

/// Types and free functions, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    types: IndexMap<String, TypeDecl>,
    functions: Vec<Declaration>,
}

impl Catalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a type. Type names must be unique.
    pub fn add_type(&mut self, ty: TypeDecl) -> Result<(), ModelError> {
        if self.types.contains_key(ty.name()) {
            return Err(ModelError::malformed(ty.name(), "type declared twice"));
        }
        self.types.insert(ty.name().to_string(), ty);
        Ok(())
    }

    /// Add a free function. Overloads are allowed.
    pub fn add_function(&mut self, decl: Declaration) -> Result<(), ModelError> {
        if decl.enclosing().is_some() {
            return Err(ModelError::malformed(
                decl.qualified_name(),
                "methods belong to their type, not the function list",
            ));
        }
        self.functions.push(decl);
        Ok(())
    }

    /// Builder-style [`Catalog::add_type`].
    pub fn with_type(mut self, ty: TypeDecl) -> Result<Self, ModelError> {
        self.add_type(ty)?;
        Ok(self)
    }

    /// Builder-style [`Catalog::add_function`].
    pub fn with_function(mut self, decl: Declaration) -> Result<Self, ModelError> {
        self.add_function(decl)?;
        Ok(self)
    }

    /// Look up a type by name.
    pub fn type_decl(&self, name: &str) -> Option<&TypeDecl> {
        self.types.get(name)
    }

    /// All types.
    pub fn types(&self) -> impl Iterator<Item = &TypeDecl> {
        self.types.values()
    }

    /// Free functions.
    pub fn functions(&self) -> &[Declaration] {
        &self.functions
    }

    /// Every declaration: methods type by type, then free functions.
    pub fn declarations(&self) -> impl Iterator<Item = &Declaration> {
        self.types
            .values()
            .flat_map(|t| t.methods().iter())
            .chain(self.functions.iter())
    }

    /// Find the first declaration with this qualified name
    /// (`Type::method` or `function`).
    pub fn find(&self, qualified: &str) -> Option<&Declaration> {
        match qualified.rsplit_once("::") {
            Some((owner, method)) => self
                .types
                .get(owner)
                .and_then(|t| t.methods().iter().find(|m| m.name() == method)),
            None => self.functions.iter().find(|f| f.name() == qualified),
        }
    }

    /// Number of declarations.
    pub fn len(&self) -> usize {
        self.types.values().map(|t| t.methods().len()).sum::<usize>() + self.functions.len()
    }

    /// True when there are no types and no functions.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty() && self.functions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ClassifyContext;
    use crate::model::{DeclarationBuilder, TypeDeclBuilder};

    fn sample() -> Catalog {
        let ctx = ClassifyContext::default();
        let mut catalog = Catalog::new();
        catalog
            .add_type(
                TypeDeclBuilder::new("Foo")
                    .method(DeclarationBuilder::method("Foo", "get_datum").returns_spelled("std::string"))
                    .build(&ctx)
                    .unwrap(),
            )
            .unwrap();
        catalog
            .add_function(
                DeclarationBuilder::function("print_something")
                    .param_spelled("message", "const char *")
                    .returns_spelled("int")
                    .build(&ctx)
                    .unwrap(),
            )
            .unwrap();
        catalog
    }

    #[test]
    fn test_find() {
        let catalog = sample();
        assert_eq!(catalog.find("Foo::get_datum").unwrap().name(), "get_datum");
        assert_eq!(catalog.find("print_something").unwrap().params().len(), 1);
        assert!(catalog.find("Foo::missing").is_none());
        assert!(catalog.find("Bar::get_datum").is_none());
    }

    #[test]
    fn test_find_outlives_query() {
        let catalog = sample();
        let found = {
            let query = format!("{}::{}", "Foo", "get_datum");
            catalog.find(&query)
        };
        assert_eq!(found.map(|d| d.qualified_name()), Some("Foo::get_datum".to_string()));
    }

    #[test]
    fn test_declarations_order() {
        let catalog = sample();
        let names: Vec<_> = catalog.declarations().map(|d| d.qualified_name()).collect();
        assert_eq!(names, vec!["Foo::get_datum", "print_something"]);
        assert_eq!(catalog.len(), 2);
        assert!(!catalog.is_empty());
    }

    #[test]
    fn test_duplicate_type_rejected() {
        let ctx = ClassifyContext::default();
        let mut catalog = sample();
        let err = catalog
            .add_type(TypeDeclBuilder::new("Foo").build(&ctx).unwrap())
            .unwrap_err();
        assert!(err.to_string().contains("twice"));
    }

    #[test]
    fn test_method_is_not_a_function() {
        let ctx = ClassifyContext::default();
        let method = DeclarationBuilder::method("Foo", "get_datum").build(&ctx).unwrap();
        assert!(Catalog::new().add_function(method).is_err());
    }
}
