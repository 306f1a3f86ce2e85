//! Rust-syntax declaration front-end
//!
//! Reads native declarations written as Rust items with `syn`:
//!
//! - `extern "C" { fn f(...); }` blocks and plain `fn` items are free
//!   functions
//! - `struct T;` declares a type; `trait T { ... }` and inherent
//!   `impl T { ... }` blocks add methods to it
//! - `*mut T` / `*const T` are pointers, `&T` / `&mut T` references, a
//!   configured holder such as `PointerHolder<T>` a wrapper, any other type
//!   a value
//!
//! Annotations use `#[ownbind("...")]` attributes, or doc comments wrapped
//! in `-#-` markers:
//!
//! ```text
//! #[ownbind("@return(caller_owns_return=true)")]
//! fn get_hidden_subclass_pointer() -> *mut Foo;
//!
//! /// -#- incref_method=Ref; decref_method=Unref -#-
//! trait Zbr { fn Ref(&mut self); fn Unref(&mut self); }
//! ```

use indexmap::IndexMap;
use proc_macro2::Span;
use quote::ToTokens;
use syn::ext::IdentExt;
use syn::{FnArg, GenericArgument, Pat, PathArguments, ReturnType, Type};
use tracing::debug;

use crate::catalog::Catalog;
use crate::context::ClassifyContext;
use crate::frontend::{DeclarationFrontend, ParseError, SourceLocation};
use crate::model::{DeclarationBuilder, Receiver, TypeDeclBuilder, TypeShape};

const ATTRIBUTE: &str = "ownbind";
const MARKER: &str = "-#-";

/// Rust-syntax front-end.
///
/// # Example
///
/// ```
/// use ownbind::frontends::RustFrontend;
/// use ownbind::{ClassifyContext, DeclarationFrontend};
///
/// let source = r#"
///     extern "C" {
///         #[ownbind("@zbr(transfer_ownership=true)")]
///         fn store_zbr(zbr: *mut Zbr);
///     }
/// "#;
/// let frontend = RustFrontend::new();
/// let catalog = frontend.parse(source, &ClassifyContext::default()).unwrap();
/// assert_eq!(catalog.functions()[0].name(), "store_zbr");
/// assert_eq!(frontend.name(), "Rust");
/// assert_eq!(frontend.file_extension(), "rs");
/// ```
#[derive(Debug, Clone, Default)]
pub struct RustFrontend;

impl RustFrontend {
    /// Create a new Rust front-end.
    pub fn new() -> Self {
        Self
    }
}

impl DeclarationFrontend for RustFrontend {
    fn parse(&self, source: &str, ctx: &ClassifyContext) -> Result<Catalog, ParseError> {
        let file = syn::parse_file(source).map_err(|e| {
            located(
                ParseError::new(format!("Rust syntax error: {}", e)),
                e.span(),
            )
        })?;

        let mut reader = Reader::default();
        for item in &file.items {
            reader.item(item)?;
        }
        reader.finish(ctx)
    }

    fn name(&self) -> &str {
        "Rust"
    }

    fn file_extension(&self) -> &str {
        "rs"
    }
}

#[derive(Default)]
struct Reader {
    types: IndexMap<String, (TypeDeclBuilder, Span)>,
    functions: Vec<(DeclarationBuilder, Span)>,
}

impl Reader {
    fn item(&mut self, item: &syn::Item) -> Result<(), ParseError> {
        match item {
            syn::Item::ForeignMod(block) => {
                for foreign in &block.items {
                    match foreign {
                        syn::ForeignItem::Fn(f) => {
                            let builder = DeclarationBuilder::function(ident(&f.sig.ident));
                            let builder = signature(builder, &f.sig, &f.attrs)?;
                            self.functions.push((builder, f.sig.ident.span()));
                        }
                        other => skip("foreign item", other),
                    }
                }
            }
            syn::Item::Fn(f) => {
                let builder = DeclarationBuilder::function(ident(&f.sig.ident));
                let builder = signature(builder, &f.sig, &f.attrs)?;
                self.functions.push((builder, f.sig.ident.span()));
            }
            syn::Item::Struct(s) => {
                let ty = self.type_entry(&s.ident);
                if let Some(text) = annotation(&s.attrs)? {
                    ty.0 = ty.0.clone().annotation(text);
                }
            }
            syn::Item::Trait(t) => {
                let owner = ident(&t.ident);
                let class_annotation = annotation(&t.attrs)?;
                let mut methods = Vec::new();
                for member in &t.items {
                    match member {
                        syn::TraitItem::Fn(m) => {
                            let builder = DeclarationBuilder::method(&owner, ident(&m.sig.ident));
                            methods.push(signature(builder, &m.sig, &m.attrs)?);
                        }
                        other => skip("trait item", other),
                    }
                }
                self.add_methods(&t.ident, class_annotation, methods);
            }
            syn::Item::Impl(block) if block.trait_.is_none() => {
                let Type::Path(path) = block.self_ty.as_ref() else {
                    skip("impl block", item);
                    return Ok(());
                };
                let Some(last) = path.path.segments.last() else {
                    return Ok(());
                };
                let owner = ident(&last.ident);
                let mut methods = Vec::new();
                for member in &block.items {
                    match member {
                        syn::ImplItem::Fn(m) => {
                            let builder = DeclarationBuilder::method(&owner, ident(&m.sig.ident));
                            methods.push(signature(builder, &m.sig, &m.attrs)?);
                        }
                        other => skip("impl item", other),
                    }
                }
                self.add_methods(&last.ident, annotation(&block.attrs)?, methods);
            }
            other => skip("item", other),
        }
        Ok(())
    }

    fn type_entry(&mut self, name: &syn::Ident) -> &mut (TypeDeclBuilder, Span) {
        self.types
            .entry(ident(name))
            .or_insert_with(|| (TypeDeclBuilder::new(ident(name)), name.span()))
    }

    fn add_methods(
        &mut self,
        name: &syn::Ident,
        class_annotation: Option<String>,
        methods: Vec<DeclarationBuilder>,
    ) {
        let (ty, _) = self.type_entry(name);
        if let Some(text) = class_annotation {
            *ty = ty.clone().annotation(text);
        }
        for method in methods {
            ty.push_method(method);
        }
    }

    fn finish(self, ctx: &ClassifyContext) -> Result<Catalog, ParseError> {
        let mut catalog = Catalog::new();
        for (_, (builder, span)) in self.types {
            let ty = builder.build(ctx).map_err(|e| located(e.into(), span))?;
            catalog.add_type(ty).map_err(|e| located(e.into(), span))?;
        }
        for (builder, span) in self.functions {
            let decl = builder.build(ctx).map_err(|e| located(e.into(), span))?;
            catalog.add_function(decl).map_err(|e| located(e.into(), span))?;
        }
        debug!(
            types = catalog.types().count(),
            declarations = catalog.len(),
            "read Rust declarations"
        );
        Ok(catalog)
    }
}

fn skip(kind: &str, node: &impl ToTokens) {
    debug!(kind, tokens = %node.to_token_stream(), "skipping");
}

fn ident(ident: &syn::Ident) -> String {
    ident.unraw().to_string()
}

fn located(err: ParseError, span: Span) -> ParseError {
    let start = span.start();
    err.with_location(SourceLocation::new("", start.line, start.column + 1))
}

fn signature(
    builder: DeclarationBuilder,
    sig: &syn::Signature,
    attrs: &[syn::Attribute],
) -> Result<DeclarationBuilder, ParseError> {
    if let Some(variadic) = &sig.variadic {
        return Err(located(
            ParseError::new(format!("variadic function `{}` is not supported", sig.ident)),
            variadic.dots.spans[0],
        ));
    }

    let mut builder = builder;
    if let Some(receiver) = sig.receiver() {
        builder = builder.receiver(match (&receiver.reference, &receiver.mutability) {
            (Some(_), None) => Receiver::Const,
            _ => Receiver::Mut,
        });
    } else {
        builder = builder.receiver(Receiver::Static);
    }

    for (i, input) in sig.inputs.iter().enumerate() {
        let FnArg::Typed(arg) = input else {
            continue;
        };
        let name = match arg.pat.as_ref() {
            Pat::Ident(pat) => ident(&pat.ident),
            _ => format!("arg{}", i),
        };
        builder = builder.param(name, shape(&arg.ty)?);
    }

    if let ReturnType::Type(_, ty) = &sig.output {
        if !is_unit(ty) {
            builder = builder.returns(shape(ty)?);
        }
    }

    match annotation(attrs)? {
        Some(text) => Ok(builder.annotation(text)),
        None => Ok(builder),
    }
}

fn is_unit(ty: &Type) -> bool {
    matches!(ty, Type::Tuple(t) if t.elems.is_empty())
}

/// Map a Rust type onto a shape. Holder names are checked later, when the
/// declaration is built against the context.
fn shape(ty: &Type) -> Result<TypeShape, ParseError> {
    match ty {
        Type::Ptr(ptr) => Ok(TypeShape::Pointer {
            inner: Box::new(shape(&ptr.elem)?),
            is_const: ptr.const_token.is_some(),
        }),
        Type::Reference(r) => Ok(TypeShape::Reference {
            inner: Box::new(shape(&r.elem)?),
            is_const: r.mutability.is_none(),
        }),
        Type::Paren(p) => shape(&p.elem),
        Type::Group(g) => shape(&g.elem),
        Type::Path(path) if path.qself.is_none() => {
            let Some(last) = path.path.segments.last() else {
                return Ok(TypeShape::value(rendered(ty)));
            };
            match &last.arguments {
                PathArguments::None => Ok(TypeShape::value(
                    path.path
                        .segments
                        .iter()
                        .map(|s| ident(&s.ident))
                        .collect::<Vec<_>>()
                        .join("::"),
                )),
                PathArguments::AngleBracketed(args) => {
                    let mut types = args.args.iter().filter_map(|a| match a {
                        GenericArgument::Type(t) => Some(t),
                        _ => None,
                    });
                    match (types.next(), types.next(), args.args.len()) {
                        (Some(inner), None, 1) => {
                            Ok(TypeShape::wrapper(ident(&last.ident), shape(inner)?))
                        }
                        _ => Err(located(
                            ParseError::new(format!(
                                "`{}` must take exactly one type argument to be a holder",
                                rendered(ty)
                            )),
                            last.ident.span(),
                        )),
                    }
                }
                PathArguments::Parenthesized(_) => Ok(TypeShape::value(rendered(ty))),
            }
        }
        other => Ok(TypeShape::value(rendered(other))),
    }
}

fn rendered(ty: &Type) -> String {
    ty.to_token_stream()
        .to_string()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

/// Annotation text from `#[ownbind("...")]` attributes and `-#-` doc
/// comments, joined in order.
fn annotation(attrs: &[syn::Attribute]) -> Result<Option<String>, ParseError> {
    let mut parts = Vec::new();
    for attr in attrs {
        if attr.path().is_ident(ATTRIBUTE) {
            let text: syn::LitStr = attr.parse_args().map_err(|e| {
                located(
                    ParseError::new(format!("expected #[{}(\"...\")]: {}", ATTRIBUTE, e)),
                    e.span(),
                )
            })?;
            parts.push(text.value());
        } else if attr.path().is_ident("doc") {
            let syn::Meta::NameValue(doc) = &attr.meta else {
                continue;
            };
            let syn::Expr::Lit(syn::ExprLit {
                lit: syn::Lit::Str(text),
                ..
            }) = &doc.value
            else {
                continue;
            };
            let text = text.value();
            let body = text
                .trim()
                .strip_prefix(MARKER)
                .and_then(|rest| rest.strip_suffix(MARKER));
            if let Some(body) = body {
                parts.push(body.trim().to_string());
            }
        }
    }
    Ok((!parts.is_empty()).then(|| parts.join("; ")))
}
