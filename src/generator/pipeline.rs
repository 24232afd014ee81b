//! Pipeline orchestration
//!
//! Collect targets, group them per stub, classify each group's authoring
//! pattern, execute, synthesize and emit. A failing group is reported and
//! skipped; the others are unaffected.

use std::collections::BTreeSet;
use std::rc::Rc;

use log::{debug, info, warn};
use serde::Serialize;

use crate::frontend::semantic::{Compilation, ConstValue};
use crate::generator::collector::{collect, GenerationTarget};
use crate::generator::diagnostics::{self, Diagnostic, DiagnosticBag, Location};
use crate::generator::execution::ExecutionRuntime;
use crate::generator::synthesizer::{
    fluent_default_expression, switch_default_expression, synthesize, GenerationResult,
};
use crate::runtime::library::{BuiltinLoader, LibraryLoader};
use crate::runtime::value::{EnumInfo, Value};
use crate::support;

#[derive(Clone)]
pub struct GeneratorOptions {
    /// Ids of diagnostics that are off unless asked for
    pub enabled_diagnostics: BTreeSet<String>,
    pub loader: Rc<dyn LibraryLoader>,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self { enabled_diagnostics: BTreeSet::new(), loader: Rc::new(BuiltinLoader) }
    }
}

impl GeneratorOptions {
    pub fn enable(mut self, id: &str) -> Self {
        self.enabled_diagnostics.insert(id.to_uppercase());
        self
    }
}

/// One emitted unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedSource {
    pub hint_name: String,
    pub text: String,
}

#[derive(Debug, Clone, Default)]
pub struct GenerationOutput {
    pub sources: Vec<GeneratedSource>,
    pub diagnostics: Vec<Diagnostic>,
}

impl GenerationOutput {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn source(&self, hint_name: &str) -> Option<&str> {
        self.sources.iter().find(|s| s.hint_name == hint_name).map(|s| s.text.as_str())
    }
}

/// Run generation over a whole compilation
pub fn run(compilation: &Compilation, options: &GeneratorOptions) -> GenerationOutput {
    let mut bag = DiagnosticBag::new(&options.enabled_diagnostics);
    let targets = collect(&compilation.generator_candidates(), compilation, &mut bag);
    let runtime = ExecutionRuntime::new(compilation, options.loader.clone());
    let mut sources = Vec::new();

    for group in group_targets(compilation, targets) {
        let first = &group[0];
        let type_name = &compilation.type_symbol(first.containing_type).name;
        let generator_names: Vec<&str> =
            group.iter().map(|t| compilation.method(t.generator).name.as_str()).collect();
        bag.report(
            &diagnostics::GENERATING_METHOD_INFO,
            location(compilation, first),
            &[&first.target_name, type_name, &generator_names.join(", ")],
        );

        let mut generation = Generation { compilation, runtime: &runtime, diagnostics: &mut bag };
        let Some(result) = generation.generate(&group) else {
            warn!("{}.{}: generation failed, nothing emitted", type_name, first.target_name);
            continue;
        };

        let text = synthesize(compilation, first.stub, &result);
        if text.is_empty() {
            continue;
        }
        let hint_name = format!("{}_{}.g.pg", type_name, first.target_name);
        info!("emitted {}", hint_name);
        sources.push(GeneratedSource { hint_name, text });
    }

    GenerationOutput { sources, diagnostics: bag.into_vec() }
}

/// Group by (containing type, stub name) in order of first appearance
fn group_targets(compilation: &Compilation, targets: Vec<GenerationTarget>) -> Vec<Vec<GenerationTarget>> {
    let mut groups: Vec<((String, String), Vec<GenerationTarget>)> = Vec::new();
    for target in targets {
        let key = (compilation.type_symbol(target.containing_type).full_name(), target.target_name.clone());
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(target),
            None => groups.push((key, vec![target])),
        }
    }
    groups.into_iter().map(|(_, members)| members).collect()
}

fn location(compilation: &Compilation, target: &GenerationTarget) -> Option<Location> {
    Location::of(compilation.method_syntax(target.generator).span, compilation.sources())
}

struct Generation<'a, 'c> {
    compilation: &'c Compilation,
    runtime: &'a ExecutionRuntime<'c>,
    diagnostics: &'a mut DiagnosticBag,
}

impl Generation<'_, '_> {
    fn generate(&mut self, group: &[GenerationTarget]) -> Option<GenerationResult> {
        let case_table = group.iter().any(|t| {
            let generator = self.compilation.method(t.generator);
            generator.has_attribute(support::SWITCH_CASE_ATTRIBUTE)
                || generator.has_attribute(support::SWITCH_DEFAULT_ATTRIBUTE)
        });
        if case_table {
            debug!("{}: case table over {} generator(s)", group[0].target_name, group.len());
            return Some(self.case_table(group));
        }

        let first = &group[0];
        let generator = self.compilation.method(first.generator);
        let returns_builder = self.compilation.display_type(&generator.ret_type, first.generator)
            == support::IMPLEMENTATION_GENERATOR_TYPE;
        if group.len() == 1 && returns_builder {
            debug!("{}: fluent generator {}", first.target_name, generator.name);
            return self.fluent(first);
        }

        if group.len() > 1 {
            let ignored: Vec<&str> =
                group[1..].iter().map(|t| self.compilation.method(t.generator).name.as_str()).collect();
            warn!(
                "{}: using {} for the body, ignoring generator(s) {}",
                first.target_name,
                generator.name,
                ignored.join(", ")
            );
        }
        debug!("{}: direct return from {}", first.target_name, generator.name);
        match self.runtime.execute_simple(first.generator) {
            Ok(value) => Some(GenerationResult::DirectReturn(value)),
            Err(e) => {
                self.execution_failed(first, &e.to_string());
                None
            }
        }
    }

    fn case_table(&mut self, group: &[GenerationTarget]) -> GenerationResult {
        let stub = self.compilation.method(group[0].stub);
        let param_type = stub.params.first().map(|p| self.compilation.display_type(&p.ty, stub.id));
        let mut cases = Vec::new();

        for target in group {
            let generator = self.compilation.method(target.generator);
            if !generator.has_attribute(support::SWITCH_CASE_ATTRIBUTE) {
                continue;
            }
            if generator.params.len() > 1 {
                self.diagnostics.report(
                    &diagnostics::TOO_MANY_PARAMETERS,
                    location(self.compilation, target),
                    &[&generator.name, &generator.params.len().to_string()],
                );
                continue;
            }

            let mut keys = Vec::new();
            for attribute in &generator.attributes {
                if attribute.class_name.as_deref() != Some(support::SWITCH_CASE_ATTRIBUTE) {
                    continue;
                }
                let Some(Some(key)) = attribute.constructor_args.first() else {
                    continue;
                };
                if *key == ConstValue::Null {
                    continue;
                }
                if let Some(expected) = &param_type {
                    if !key_matches(key, expected) {
                        self.diagnostics.report(
                            &diagnostics::SWITCH_CASE_TYPE_MISMATCH,
                            Location::of(attribute.span, self.compilation.sources()),
                            &[key.type_name(), expected],
                        );
                        continue;
                    }
                }
                keys.push(key_value(self.compilation, key));
            }
            if keys.is_empty() {
                continue;
            }

            match self.runtime.execute_with_args(target.generator, &keys) {
                Ok(results) => {
                    for (key, result) in keys.into_iter().zip(results) {
                        match result {
                            Ok(value) => cases.push((key, value)),
                            Err(e) => self.execution_failed(target, &e.to_string()),
                        }
                    }
                }
                Err(e) => self.execution_failed(target, &e.to_string()),
            }
        }

        let default_expression = group
            .iter()
            .find(|t| self.compilation.method(t.generator).has_attribute(support::SWITCH_DEFAULT_ATTRIBUTE))
            .and_then(|t| switch_default_expression(self.compilation, t.generator));
        GenerationResult::CaseTable { cases, default_expression }
    }

    fn fluent(&mut self, target: &GenerationTarget) -> Option<GenerationResult> {
        match self.runtime.execute_fluent(target.generator) {
            Ok(record) => {
                let default_expression = if record.has_default_case {
                    fluent_default_expression(self.compilation, target.generator)
                } else {
                    None
                };
                Some(GenerationResult::Fluent { record, default_expression })
            }
            Err(e) => {
                self.execution_failed(target, &e.to_string());
                None
            }
        }
    }

    fn execution_failed(&mut self, target: &GenerationTarget, error: &str) {
        let name = &self.compilation.method(target.generator).name;
        self.diagnostics.report(
            &diagnostics::GENERATOR_EXECUTION_ERROR,
            location(self.compilation, target),
            &[name, error],
        );
    }
}

/// Integer literals widen to `long` and `double`; everything else must match
fn key_matches(key: &ConstValue, expected: &str) -> bool {
    key.type_name() == expected || matches!((key, expected), (ConstValue::Int(_), "long" | "double"))
}

fn key_value(compilation: &Compilation, key: &ConstValue) -> Value {
    match key {
        ConstValue::Int(v) | ConstValue::Long(v) => Value::Int(*v),
        ConstValue::Double(v) => Value::Double(*v),
        ConstValue::Str(s) => Value::str(s),
        ConstValue::Char(c) => Value::Char(*c),
        ConstValue::Bool(b) => Value::Bool(*b),
        ConstValue::Null => Value::Null,
        ConstValue::Enum { ty, member } => {
            let enum_type = compilation.types().iter().find(|t| t.full_name() == *ty);
            let ordinal = enum_type.and_then(|t| t.enum_members.iter().position(|m| m == member));
            match (enum_type, ordinal) {
                (Some(t), Some(ordinal)) => Value::Enum(
                    Rc::new(EnumInfo { full_name: ty.clone(), members: t.enum_members.clone() }),
                    ordinal,
                ),
                _ => Value::str(member),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::references::MetadataReference;
    use crate::generator::diagnostics::Severity;
    use pretty_assertions::assert_eq;

    fn generate_with(source: &str, options: &GeneratorOptions) -> GenerationOutput {
        let reference = MetadataReference::from_file("sdk/ref/Pregen.Support.pglib", &BuiltinLoader).unwrap();
        let compilation =
            Compilation::create(&[("test.pg".to_string(), source.to_string())], vec![reference]).unwrap();
        run(&compilation, options)
    }

    fn generate(source: &str) -> GenerationOutput {
        generate_with(source, &GeneratorOptions::default())
    }

    fn ids(output: &GenerationOutput) -> Vec<&str> {
        output.diagnostics.iter().map(|d| d.id).collect()
    }

    #[test]
    fn test_simple_pattern() {
        let output = generate(
            "using Pregen.Support;
namespace TestNamespace;
public partial class MyClass
{
    public partial string GetValue();

    [GeneratesMethod(nameof(GetValue))]
    private static string GetValue_Generator() => \"hel\" + \"lo\";
}",
        );
        assert!(output.diagnostics.is_empty());
        assert_eq!(
            output.source("MyClass_GetValue.g.pg"),
            Some(
                "namespace TestNamespace;

partial class MyClass
{
    public partial string GetValue()
    {
        return \"hello\";
    }
}
"
            )
        );
    }

    #[test]
    fn test_generating_info_when_enabled() {
        let source = "using Pregen.Support;
static partial class Pi
{
    public static partial int Get(int k);
    [GeneratesMethod(nameof(Get))] [SwitchCase(1)] static int A(int k) => k;
    [GeneratesMethod(nameof(Get))] [SwitchCase(2)] static int B(int k) => k;
}";
        assert!(generate(source).diagnostics.is_empty());

        let output = generate_with(source, &GeneratorOptions::default().enable("msgh003"));
        assert_eq!(output.diagnostics.len(), 1);
        assert_eq!(output.diagnostics[0].severity, Severity::Info);
        assert_eq!(
            output.diagnostics[0].message,
            "Generating implementation for partial method 'Get' in class 'Pi' using generator 'A, B'"
        );
    }

    #[test]
    fn test_too_many_parameters() {
        let output = generate(
            "using Pregen.Support;
public static partial class MyClass
{
    public static partial int GetValue(int key);

    [GeneratesMethod(nameof(GetValue))]
    [SwitchCase(arg1: 1)]
    private static int GetValue_Generator(int key, string extraParam) => 42;

    [GeneratesMethod(nameof(GetValue))]
    [SwitchCase(arg1: 2)]
    private static int Constant() => 7;
}",
        );
        assert_eq!(ids(&output), vec!["MSGH005"]);
        assert!(output.diagnostics[0].message.contains("'GetValue_Generator'"));
        assert!(output.diagnostics[0].message.contains("has 2 parameter(s)"));
        let text = output.source("MyClass_GetValue.g.pg").unwrap();
        assert!(text.contains("            case 2: return 7;\n"));
        assert!(!text.contains("case 1:"));
    }

    #[test]
    fn test_case_key_type_mismatch_drops_only_that_key() {
        let output = generate(
            "using Pregen.Support;
public static partial class MyClass
{
    public static partial double Scale(double key);

    [GeneratesMethod(nameof(Scale))]
    [SwitchCase(arg1: \"aaa\")]
    [SwitchCase(arg1: 2)]
    [SwitchCase(arg1: 0.5)]
    [SwitchCase(true)]
    private static double Generator(double key) => key * 2;
}",
        );
        let messages: Vec<&str> = output.diagnostics.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "SwitchCase argument type 'string' does not match the method parameter type 'double'",
                "SwitchCase argument type 'bool' does not match the method parameter type 'double'",
            ]
        );
        let text = output.source("MyClass_Scale.g.pg").unwrap();
        assert!(text.contains("            case 2: return 4;\n            case 0.5: return 1;\n"));
    }

    #[test]
    fn test_stub_called_inside_generator() {
        let output = generate(
            "using Pregen.Support;
namespace TestNamespace;
public static partial class MyClass
{
    public static partial int GetValue(int key);

    public static partial string GetLabel(int key);

    [GeneratesMethod(nameof(GetValue))]
    [SwitchCase(arg1: 1)]
    private static int GetValue_Generator(int key)
    {
        string label = GetLabel(key);
        return label.Length;
    }
}",
        );
        assert_eq!(ids(&output), vec!["MSGH004"]);
        let message = &output.diagnostics[0].message;
        assert!(message.starts_with(
            "Failed to execute generator method 'GetValue_Generator': Stub 'MyClass.GetLabel' was called during generation."
        ));
        assert_eq!(output.diagnostics[0].location.as_ref().map(|l| l.line), Some(9));
    }

    #[test]
    fn test_return_type_mismatch_fails_the_build() {
        let source = "using Pregen.Support;
public partial class MyClass
{
    public partial int GetValue();

    [GeneratesMethod(nameof(GetValue))]
    private static string GetValue_Generator() => \"hello\";
}";
        let reference = MetadataReference::from_file("sdk/ref/Pregen.Support.pglib", &BuiltinLoader).unwrap();
        let compilation =
            Compilation::create(&[("test.pg".to_string(), source.to_string())], vec![reference]).unwrap();
        let output = run(&compilation, &GeneratorOptions::default());
        assert!(output.diagnostics.is_empty());

        let generated: Vec<(String, String)> =
            output.sources.iter().map(|s| (s.hint_name.clone(), s.text.clone())).collect();
        let complete = compilation.with_sources(&generated).unwrap();
        let errors = crate::middle::ir_gen::compile(&complete, "test").err().unwrap_or_default();
        assert!(errors.iter().any(|e| matches!(
            e,
            crate::utils::Error::UndefinedVariable { name, .. } if name == "hello"
        )));
        assert!(errors.iter().any(|e| e.to_string() == "The name 'hello' does not exist in the current context"));
    }

    #[test]
    fn test_failed_group_does_not_stop_others() {
        let output = generate(
            "using Pregen.Support;
partial class A
{
    public partial int Broken();
    public partial int Fine();

    [GeneratesMethod(nameof(Broken))] static int BrokenGen() => 1 / 0;
    [GeneratesMethod(nameof(Fine))] static int FineGen() => 2;
}",
        );
        assert_eq!(ids(&output), vec!["MSGH004"]);
        assert_eq!(output.diagnostics[0].message, "Failed to execute generator method 'BrokenGen': Attempted to divide by zero.");
        assert!(output.source("A_Broken.g.pg").is_none());
        assert!(output.source("A_Fine.g.pg").unwrap().contains("return 2;"));
    }

    #[test]
    fn test_unfinished_fluent_chain() {
        let output = generate(
            "using Pregen.Support;
public static partial class MyClass
{
    public static partial int GetValue(int key);

    [GeneratesMethod(nameof(GetValue))]
    private static IMethodImplementationGenerator GetValue_Generator() =>
        Generate.Method().WithParameter<int>().WithReturnType<int>();
}",
        );
        assert_eq!(ids(&output), vec!["MSGH004"]);
        assert!(output.diagnostics[0].message.ends_with("RecordingGeneratorsFactory did not produce a record"));
        assert!(output.sources.is_empty());
    }

    #[test]
    fn test_second_direct_generator_is_ignored() {
        let output = generate(
            "using Pregen.Support;
partial class A
{
    public partial int Get();

    [GeneratesMethod(nameof(Get))] static int First() => 1;
    [GeneratesMethod(nameof(Get))] static int Second() => 2;
}",
        );
        assert!(output.diagnostics.is_empty());
        assert_eq!(output.sources.len(), 1);
        let text = output.source("A_Get.g.pg").unwrap_or_default();
        assert!(text.contains("return 1;"));
        assert!(!text.contains("return 2;"));
    }

    #[test]
    fn test_duplicate_keys_are_kept_in_order() {
        let output = generate(
            "using Pregen.Support;
static partial class A
{
    public static partial int Get(int k);
    [GeneratesMethod(nameof(Get))] [SwitchCase(1)] static int First(int k) => 10;
    [GeneratesMethod(nameof(Get))] [SwitchCase(1)] static int Second(int k) => 20;
}",
        );
        let text = output.source("A_Get.g.pg").unwrap();
        assert!(text.contains("            case 1: return 10;\n            case 1: return 20;\n"));
    }

    #[test]
    fn test_enum_keys_and_values() {
        let output = generate(
            "using Pregen.Support;
namespace Zoo;
enum Animal { Dog, Cat, Lizard }
enum Mammal { Dog, Cat }
static partial class Mapper
{
    public static partial Mammal ToMammal(Animal animal);

    [GeneratesMethod(nameof(ToMammal))]
    [SwitchCase(Animal.Dog)]
    [SwitchCase(Animal.Cat)]
    static Mammal Map(Animal animal) => Enum.Parse<Mammal>(animal.ToString());
}",
        );
        assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
        let text = output.source("Mapper_ToMammal.g.pg").unwrap();
        assert!(text.contains("    public static partial Zoo.Mammal ToMammal(Zoo.Animal animal)\n"));
        assert!(text.contains("            case Zoo.Animal.Dog: return Zoo.Mammal.Dog;\n"));
        assert!(text.contains("            case Zoo.Animal.Cat: return Zoo.Mammal.Cat;\n"));
    }
}
