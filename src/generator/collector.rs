//! Target collection
//!
//! Turns syntax marked with `GeneratesMethod` into validated targets: the
//! generator symbol, the stub it names and the type both live in. Invalid
//! candidates are reported and skipped one by one.

use log::debug;

use crate::frontend::references::MetadataKind;
use crate::frontend::semantic::{Compilation, ConstValue, MethodId, MethodSyntaxRef, TypeId};
use crate::generator::diagnostics::{self, DiagnosticBag, Location};
use crate::support;

/// A generator bound to the stub it implements
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationTarget {
    pub syntax: MethodSyntaxRef,
    pub generator: MethodId,
    pub target_name: String,
    pub stub: MethodId,
    pub containing_type: TypeId,
}

/// Position of `sameClassMethodName` among the attribute's constructor
/// parameters, as declared by whichever reference exports it
fn target_name_index(compilation: &Compilation) -> Option<usize> {
    compilation.references().iter().find_map(|reference| {
        match &reference.metadata.find_type(support::GENERATES_METHOD_ATTRIBUTE)?.kind {
            MetadataKind::Attribute { params } => params
                .iter()
                .position(|p| p.name.eq_ignore_ascii_case(support::SAME_CLASS_METHOD_NAME)),
            _ => None,
        }
    })
}

pub fn collect(
    candidates: &[MethodSyntaxRef],
    compilation: &Compilation,
    diagnostics: &mut DiagnosticBag,
) -> Vec<GenerationTarget> {
    let mut targets = Vec::new();
    let name_index = target_name_index(compilation);

    for &syntax in candidates {
        let Some(generator) = compilation.declared_symbol(syntax) else {
            continue;
        };
        let symbol = compilation.method(generator);
        // Declaration span, attributes included
        let location = Location::of(compilation.method_syntax(generator).span, compilation.sources());

        if !symbol.is_static {
            diagnostics.report(&diagnostics::METHOD_MUST_BE_STATIC, location, &[&symbol.name]);
            continue;
        }

        let Some(attribute) = symbol
            .attributes
            .iter()
            .find(|a| a.class_name.as_deref() == Some(support::GENERATES_METHOD_ATTRIBUTE))
        else {
            continue;
        };
        let target_name = match name_index.and_then(|i| attribute.constructor_args.get(i)) {
            Some(Some(ConstValue::Null)) | Some(None) | None => continue,
            Some(Some(value)) => value.to_string(),
        };
        if target_name.trim().is_empty() {
            debug!("{}: empty target name, skipping", symbol.name);
            continue;
        }

        let containing_type = symbol.containing_type;
        let stub = compilation
            .members_named(containing_type, &target_name)
            .find(|m| m.is_partial_definition() && m.implementation.is_none());
        let Some(stub) = stub else {
            let type_name = &compilation.type_symbol(containing_type).name;
            diagnostics.report(&diagnostics::MISSING_PARTIAL_METHOD, location, &[&target_name, type_name]);
            continue;
        };

        targets.push(GenerationTarget {
            syntax,
            generator,
            target_name,
            stub: stub.id,
            containing_type,
        });
    }

    targets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::references::MetadataReference;
    use pretty_assertions::assert_eq;

    fn run(source: &str) -> (Compilation, Vec<GenerationTarget>, Vec<String>) {
        let compilation = Compilation::create(
            &[("colors.pg".to_string(), source.to_string())],
            vec![MetadataReference::in_memory(support::metadata())],
        )
        .unwrap();
        let mut bag = DiagnosticBag::default();
        let targets = collect(&compilation.generator_candidates(), &compilation, &mut bag);
        let messages = bag.into_vec().iter().map(|d| d.to_string()).collect();
        (compilation, targets, messages)
    }

    #[test]
    fn test_collects_valid_target() {
        let (compilation, targets, messages) = run(
            "using Pregen.Support;
namespace Demo;
public static partial class Colors
{
    public static partial string GetAllColorsString();

    [GeneratesMethod(nameof(GetAllColorsString))]
    static string GetAllColorsStringGenerator() => \"Red\";
}",
        );
        assert!(messages.is_empty());
        assert_eq!(targets.len(), 1);
        let target = &targets[0];
        assert_eq!(target.target_name, "GetAllColorsString");
        assert_eq!(compilation.method(target.generator).name, "GetAllColorsStringGenerator");
        assert_eq!(compilation.method(target.stub).name, "GetAllColorsString");
        assert_eq!(compilation.type_symbol(target.containing_type).full_name(), "Demo.Colors");
    }

    #[test]
    fn test_missing_stub_and_instance_generator() {
        let (_, targets, messages) = run(
            "using Pregen.Support;
partial class Colors
{
    public partial string Get();

    [GeneratesMethod(\"Nope\")]
    static string Missing() => \"x\";

    [GeneratesMethod(\"Get\")]
    string Instance() => \"x\";

    [GeneratesMethod(\"Get\")]
    static string Valid() => \"x\";
}",
        );
        assert_eq!(
            messages,
            vec![
                "colors.pg:6:5: error MSGH001: Could not find partial method 'Nope' in class 'Colors'".to_string(),
                "colors.pg:9:5: error MSGH002: Method 'Instance' marked with [GeneratesMethod] must be static"
                    .to_string(),
            ]
        );
        assert_eq!(targets.len(), 1);
    }

    #[test]
    fn test_blank_name_and_unbound_attribute_are_skipped_silently() {
        let (_, targets, messages) = run(
            "using Pregen.Support;
partial class A
{
    public partial int Get();
    [GeneratesMethod(\"  \")] static int Blank() => 1;
    [GeneratesMethod(null)] static int Null() => 1;
}",
        );
        assert!(messages.is_empty());
        assert!(targets.is_empty());

        let (_, targets, messages) = run("partial class A { public partial int Get(); [GeneratesMethod(\"Get\")] static int G() => 1; }");
        assert!(messages.is_empty());
        assert!(targets.is_empty());
    }

    #[test]
    fn test_implemented_partial_is_not_a_target() {
        let (_, targets, messages) = run(
            "using Pregen.Support;
partial class A
{
    public partial int Get();
    public partial int Get() => 2;
    [GeneratesMethod(\"Get\")] static int G() => 1;
}",
        );
        assert!(targets.is_empty());
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("MSGH001"));
    }
}
