//! Structural type shapes

use std::fmt;

use serde::Serialize;

/// The structural shape of a parameter or return type.
///
/// Distinguishes `T`, `T*`, `const T*`, `T&`, `const T&` and generic pointer
/// holders such as `PointerHolder<T>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeShape {
    /// A by-value type
    Value {
        /// Type name as written (qualified names kept verbatim)
        name: String,
    },

    /// A raw pointer
    Pointer {
        /// Pointee shape
        inner: Box<TypeShape>,
        /// Pointer to const
        is_const: bool,
    },

    /// A reference
    Reference {
        /// Referent shape
        inner: Box<TypeShape>,
        /// `const T&`
        is_const: bool,
    },

    /// A generic pointer holder, `holder<inner>`
    Wrapper {
        /// Holder template name
        holder: String,
        /// The held type
        inner: Box<TypeShape>,
    },
}

impl TypeShape {
    /// `T`
    pub fn value(name: impl Into<String>) -> Self {
        TypeShape::Value { name: name.into() }
    }

    /// `T*`
    pub fn pointer(inner: TypeShape) -> Self {
        TypeShape::Pointer {
            inner: Box::new(inner),
            is_const: false,
        }
    }

    /// `const T*`
    pub fn const_pointer(inner: TypeShape) -> Self {
        TypeShape::Pointer {
            inner: Box::new(inner),
            is_const: true,
        }
    }

    /// `T&`
    pub fn reference(inner: TypeShape) -> Self {
        TypeShape::Reference {
            inner: Box::new(inner),
            is_const: false,
        }
    }

    /// `const T&`
    pub fn const_reference(inner: TypeShape) -> Self {
        TypeShape::Reference {
            inner: Box::new(inner),
            is_const: true,
        }
    }

    /// `holder<T>`
    pub fn wrapper(holder: impl Into<String>, inner: TypeShape) -> Self {
        TypeShape::Wrapper {
            holder: holder.into(),
            inner: Box::new(inner),
        }
    }

    /// The innermost value type name.
    pub fn base_name(&self) -> &str {
        match self {
            TypeShape::Value { name } => name,
            TypeShape::Pointer { inner, .. }
            | TypeShape::Reference { inner, .. }
            | TypeShape::Wrapper { inner, .. } => inner.base_name(),
        }
    }

    /// Name of the object this shape points, refers or holds to, if it is
    /// exactly one indirection away from a value type.
    pub fn target_name(&self) -> Option<&str> {
        match self {
            TypeShape::Value { .. } => None,
            TypeShape::Pointer { inner, .. }
            | TypeShape::Reference { inner, .. }
            | TypeShape::Wrapper { inner, .. } => match inner.as_ref() {
                TypeShape::Value { name } => Some(name),
                TypeShape::Pointer { inner, .. } if matches!(self, TypeShape::Wrapper { .. }) => {
                    match inner.as_ref() {
                        TypeShape::Value { name } => Some(name),
                        _ => None,
                    }
                }
                _ => None,
            },
        }
    }

    /// True for `T`.
    pub fn is_value(&self) -> bool {
        matches!(self, TypeShape::Value { .. })
    }

    /// True for `T*` and `const T*`.
    pub fn is_pointer(&self) -> bool {
        matches!(self, TypeShape::Pointer { .. })
    }

    /// True for pointers and holders, the shapes that can carry ownership.
    pub fn is_pointer_like(&self) -> bool {
        matches!(self, TypeShape::Pointer { .. } | TypeShape::Wrapper { .. })
    }

    /// True for `const T*` and `const T&`.
    pub fn is_const_indirection(&self) -> bool {
        matches!(
            self,
            TypeShape::Pointer { is_const: true, .. } | TypeShape::Reference { is_const: true, .. }
        )
    }

    /// Visit every holder name in this shape, outermost first.
    pub fn holders(&self) -> Vec<&str> {
        let mut out = Vec::new();
        let mut current = self;
        loop {
            match current {
                TypeShape::Value { .. } => return out,
                TypeShape::Wrapper { holder, inner } => {
                    out.push(holder.as_str());
                    current = inner;
                }
                TypeShape::Pointer { inner, .. } | TypeShape::Reference { inner, .. } => {
                    current = inner
                }
            }
        }
    }
}

impl fmt::Display for TypeShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeShape::Value { name } => write!(f, "{}", name),
            TypeShape::Pointer { inner, is_const } => {
                if *is_const {
                    write!(f, "const {}*", inner)
                } else {
                    write!(f, "{}*", inner)
                }
            }
            TypeShape::Reference { inner, is_const } => {
                if *is_const {
                    write!(f, "const {}&", inner)
                } else {
                    write!(f, "{}&", inner)
                }
            }
            TypeShape::Wrapper { holder, inner } => write!(f, "{}<{}>", holder, inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let foo = TypeShape::value("Foo");
        assert_eq!(TypeShape::pointer(foo.clone()).to_string(), "Foo*");
        assert_eq!(TypeShape::const_pointer(foo.clone()).to_string(), "const Foo*");
        assert_eq!(TypeShape::const_reference(foo.clone()).to_string(), "const Foo&");
        assert_eq!(
            TypeShape::wrapper("PointerHolder", foo).to_string(),
            "PointerHolder<Foo>"
        );
    }

    #[test]
    fn test_target_name() {
        let zbr = TypeShape::value("Zbr");
        assert_eq!(TypeShape::pointer(zbr.clone()).target_name(), Some("Zbr"));
        assert_eq!(TypeShape::reference(zbr.clone()).target_name(), Some("Zbr"));
        assert_eq!(
            TypeShape::wrapper("PointerHolder", zbr.clone()).target_name(),
            Some("Zbr")
        );
        assert_eq!(
            TypeShape::wrapper("PointerHolder", TypeShape::pointer(zbr.clone())).target_name(),
            Some("Zbr")
        );
        assert_eq!(zbr.target_name(), None);
        assert_eq!(
            TypeShape::pointer(TypeShape::pointer(zbr)).target_name(),
            None
        );
    }

    #[test]
    fn test_holders_outermost_first() {
        let shape = TypeShape::wrapper(
            "Outer",
            TypeShape::pointer(TypeShape::wrapper("Inner", TypeShape::value("T"))),
        );
        assert_eq!(shape.holders(), vec!["Outer", "Inner"]);
        assert_eq!(shape.base_name(), "T");
    }
}
