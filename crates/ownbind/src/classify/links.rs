//! Custodian/ward link inference

use crate::context::ClassifyContext;
use crate::custody::{CustodyLinkSpec, Endpoint};
use crate::error::ClassifyError;
use crate::model::{Declaration, TypeShape};

use super::Rule;

const NAME_INFIX: &str = "_with_";
const NAME_SUFFIX: &str = "_as_custodian";

/// Links declared by `custodian=` annotations, or, when there are none,
/// implied by a `get_*_with_<x>_as_custodian` / `set_*_with_<x>_as_custodian`
/// name.
pub(super) fn infer(
    decl: &Declaration,
    ctx: &ClassifyContext,
) -> Result<Vec<(CustodyLinkSpec, Rule)>, ClassifyError> {
    let mut links = Vec::new();
    for (i, param) in decl.params().iter().enumerate() {
        if let Some(custodian) = param.annotation.custodian {
            links.push((
                CustodyLinkSpec::new(Endpoint::Param(i), custodian.into()),
                Rule::ExplicitCustodian,
            ));
        }
    }
    if let Some(custodian) = decl.return_annotation().custodian {
        links.push((
            CustodyLinkSpec::new(Endpoint::Return, custodian.into()),
            Rule::ExplicitCustodian,
        ));
    }

    if !links.is_empty() || !ctx.infer_custody_from_names {
        return Ok(links);
    }
    let Some(who) = custodian_word(decl.name()) else {
        return Ok(links);
    };

    let unresolved = || ClassifyError::AmbiguousOwnership {
        declaration: decl.qualified_name(),
        role: "custodian name".to_string(),
        first: Rule::CustodyNameShape,
        second: Rule::PointerDefault,
    };
    let returns_pointer = decl.ret().is_some_and(TypeShape::is_pointer_like);

    let custodian = match who {
        "self" if decl.has_receiver() => Endpoint::Receiver,
        "return" if returns_pointer => Endpoint::Return,
        "other" => {
            let mut candidates = decl
                .params()
                .iter()
                .enumerate()
                .filter(|(_, p)| p.shape.is_const_indirection());
            match (candidates.next(), candidates.next()) {
                (Some((i, _)), None) => Endpoint::Param(i),
                _ => return Err(unresolved()),
            }
        }
        _ => return Err(unresolved()),
    };

    let ward = if decl.name().starts_with("get_") && returns_pointer && custodian != Endpoint::Return
    {
        Endpoint::Return
    } else if decl.name().starts_with("set_") {
        let mut candidates = decl.params().iter().enumerate().filter(|(i, p)| {
            p.shape.is_pointer_like()
                && !p.shape.is_const_indirection()
                && Endpoint::Param(*i) != custodian
        });
        match (candidates.next(), candidates.next()) {
            (Some((i, _)), None) => Endpoint::Param(i),
            _ => return Err(unresolved()),
        }
    } else {
        return Err(unresolved());
    };

    links.push((CustodyLinkSpec::new(ward, custodian), Rule::CustodyNameShape));
    Ok(links)
}

fn custodian_word(name: &str) -> Option<&str> {
    let rest = name.strip_suffix(NAME_SUFFIX)?;
    let (_, who) = rest.rsplit_once(NAME_INFIX)?;
    Some(who)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DeclarationBuilder;

    fn ctx() -> ClassifyContext {
        ClassifyContext::default()
    }

    #[test]
    fn test_custodian_word() {
        assert_eq!(custodian_word("get_foobar_with_self_as_custodian"), Some("self"));
        assert_eq!(custodian_word("set_foobar_with_other_as_custodian"), Some("other"));
        assert_eq!(custodian_word("get_foobar"), None);
        assert_eq!(custodian_word("as_custodian"), None);
    }

    #[test]
    fn test_explicit_links_disable_name_inference() {
        let decl = DeclarationBuilder::method("SomeObject", "set_foobar_with_other_as_custodian")
            .param_spelled("foobar", "Foobar*")
            .param_spelled("other", "SomeObject*")
            .annotation("@foobar(custodian=2)")
            .build(&ctx())
            .unwrap();
        let links = infer(&decl, &ctx()).unwrap();
        assert_eq!(
            links,
            vec![(
                CustodyLinkSpec::new(Endpoint::Param(0), Endpoint::Param(1)),
                Rule::ExplicitCustodian
            )]
        );
    }

    #[test]
    fn test_setter_with_self() {
        let decl = DeclarationBuilder::method("SomeObject", "set_foobar_with_self_as_custodian")
            .param_spelled("foobar", "Foobar*")
            .build(&ctx())
            .unwrap();
        let links = infer(&decl, &ctx()).unwrap();
        assert_eq!(
            links[0].0,
            CustodyLinkSpec::new(Endpoint::Param(0), Endpoint::Receiver)
        );
    }

    #[test]
    fn test_function_with_return_custodian() {
        let decl = DeclarationBuilder::function("set_foobar_with_return_as_custodian")
            .param_spelled("foobar", "Foobar*")
            .returns_spelled("SomeObject*")
            .build(&ctx())
            .unwrap();
        let links = infer(&decl, &ctx()).unwrap();
        assert_eq!(
            links[0].0,
            CustodyLinkSpec::new(Endpoint::Param(0), Endpoint::Return)
        );
    }

    #[test]
    fn test_self_without_receiver_is_ambiguous() {
        let decl = DeclarationBuilder::function("get_foobar_with_self_as_custodian")
            .returns_spelled("Foobar*")
            .build(&ctx())
            .unwrap();
        assert!(matches!(
            infer(&decl, &ctx()),
            Err(ClassifyError::AmbiguousOwnership {
                first: Rule::CustodyNameShape,
                ..
            })
        ));
    }

    #[test]
    fn test_two_other_candidates_is_ambiguous() {
        let decl = DeclarationBuilder::method("SomeObject", "get_foobar_with_other_as_custodian")
            .param_spelled("a", "const SomeObject*")
            .param_spelled("b", "const SomeObject*")
            .returns_spelled("Foobar*")
            .build(&ctx())
            .unwrap();
        assert!(infer(&decl, &ctx()).is_err());
    }

    #[test]
    fn test_inference_can_be_disabled() {
        let decl = DeclarationBuilder::function("get_foobar_with_self_as_custodian")
            .returns_spelled("Foobar*")
            .build(&ctx())
            .unwrap();
        let ctx = ClassifyContext {
            infer_custody_from_names: false,
            ..ClassifyContext::default()
        };
        assert!(infer(&decl, &ctx).unwrap().is_empty());
    }
}
