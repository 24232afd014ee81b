//! Partial-method generation
//!
//! Generator methods marked with `[GeneratesMethod]` are executed at build
//! time and their observed results are emitted as the bodies of the partial
//! stubs they name.

pub mod collector;
pub mod diagnostics;
pub mod execution;
pub mod pipeline;
pub mod protocol;
pub mod synthesizer;

pub use pipeline::{run, GenerationOutput, GeneratorOptions};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::references::MetadataReference;
    use crate::frontend::semantic::Compilation;
    use crate::middle::ir_gen::compile;
    use crate::runtime::arena::ExecutionArena;
    use crate::runtime::library::BuiltinLoader;
    use crate::runtime::value::{Fault, Value};
    use pretty_assertions::assert_eq;
    use std::rc::Rc;

    const SLOW_MATH: (&str, &str) = ("SlowMath.pg", include_str!("../../demos/SlowMath.pg"));
    const COLORS: (&str, &str) = ("Colors.pg", include_str!("../../demos/Colors.pg"));
    const COLORS_FLUENT: (&str, &str) = ("ColorsFluent.pg", include_str!("../../demos/ColorsFluent.pg"));
    const PI: (&str, &str) = ("PiExample.pg", include_str!("../../demos/PiExample.pg"));
    const PI_FLUENT: (&str, &str) = ("PiExampleFluent.pg", include_str!("../../demos/PiExampleFluent.pg"));
    const MAPPER: (&str, &str) = ("Mapper.pg", include_str!("../../demos/Mapper.pg"));

    fn demo(files: &[(&str, &str)]) -> (Compilation, GenerationOutput) {
        let sources: Vec<(String, String)> = files.iter().map(|(p, t)| (p.to_string(), t.to_string())).collect();
        let reference = MetadataReference::from_file("sdk/ref/Pregen.Support.pglib", &BuiltinLoader).unwrap();
        let compilation = Compilation::create(&sources, vec![reference]).unwrap();
        let output = run(&compilation, &GeneratorOptions::default());
        assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
        (compilation, output)
    }

    /// Compile the originals together with the generated units
    fn build(compilation: &Compilation, output: &GenerationOutput) -> ExecutionArena {
        let generated: Vec<(String, String)> =
            output.sources.iter().map(|s| (s.hint_name.clone(), s.text.clone())).collect();
        let complete = compilation.with_sources(&generated).unwrap();
        let artifact = compile(&complete, "demo").unwrap();
        let mut arena = ExecutionArena::new("demo", Rc::new(BuiltinLoader));
        arena.load_artifact(artifact);
        arena
    }

    fn call(arena: &ExecutionArena, ty: &str, method: &str, args: Vec<Value>) -> Result<Value, Fault> {
        let func = arena.find_method(ty, method).unwrap();
        arena.invoke(func, args)
    }

    fn animal(arena: &ExecutionArena, member: &str) -> Value {
        call(arena, "Demo.Animals", member, vec![]).unwrap()
    }

    #[test]
    fn test_direct_return_demo() {
        let (compilation, output) = demo(&[COLORS]);
        assert_eq!(
            output.source("ColorsClass_GetAllColorsString.g.pg"),
            Some(
                "namespace Demo;

static partial class ColorsClass
{
    public static partial string GetAllColorsString()
    {
        return \"Red, Green, Blue\";
    }
}
"
            )
        );
        let arena = build(&compilation, &output);
        let value = call(&arena, "Demo.ColorsClass", "GetAllColorsString", vec![]).unwrap();
        assert_eq!(value.to_string(), "Red, Green, Blue");
    }

    #[test]
    fn test_fluent_body_demo() {
        let (compilation, output) = demo(&[COLORS, COLORS_FLUENT]);
        assert_eq!(output.sources.len(), 2);
        assert_eq!(
            output.source("ColorsClassFluent_GetAllColorsString.g.pg"),
            Some(
                "namespace Demo;

static partial class ColorsClassFluent
{
    public static partial string GetAllColorsString()
    {
        return string.Join(\", \", Enum.GetNames<ColorsEnum>());
    }
}
"
            )
        );
        let arena = build(&compilation, &output);
        let value = call(&arena, "Demo.ColorsClassFluent", "GetAllColorsString", vec![]).unwrap();
        assert_eq!(value.to_string(), "Red, Green, Blue");
    }

    #[test]
    fn test_case_table_demo() {
        let (compilation, output) = demo(&[SLOW_MATH, PI]);
        assert_eq!(
            output.source("PiExample_GetPiDecimal.g.pg"),
            Some(
                "namespace Demo;

static partial class PiExample
{
    public static partial int GetPiDecimal(int decimalNumber)
    {
        switch (decimalNumber)
        {
            case 0: return 3;
            case 1: return 1;
            case 2: return 4;
            case 300: return 3;
            case 301: return 7;
            case 302: return 2;
            case 303: return 4;
            default: return SlowMath.CalculatePiDecimal(decimalNumber);
        }
    }
}
"
            )
        );
        let arena = build(&compilation, &output);
        let digits: Vec<String> = [0, 1, 2, 300, 301, 302, 303, 5]
            .into_iter()
            .map(|d| call(&arena, "Demo.PiExample", "GetPiDecimal", vec![Value::Int(d)]).unwrap().to_string())
            .collect();
        assert_eq!(digits, vec!["3", "1", "4", "3", "7", "2", "4", "9"]);
    }

    #[test]
    fn test_fluent_case_table_demo() {
        let (compilation, output) = demo(&[SLOW_MATH, PI_FLUENT]);
        assert_eq!(
            output.source("PiExampleFluent_GetPiDecimal.g.pg"),
            Some(
                "namespace Demo;

static partial class PiExampleFluent
{
    public static partial int GetPiDecimal(int decimalNumber)
    {
        switch (decimalNumber)
        {
            case 0: return 3;
            case 1: return 1;
            case 2: return 4;
            case 300: return 3;
            case 301: return 7;
            case 302: return 2;
            case 303: return 4;
            default: return SlowMath.CalculatePiDecimal(decimalNumber);
        }
    }
}
"
            )
        );
        let arena = build(&compilation, &output);
        let value = call(&arena, "Demo.PiExampleFluent", "GetPiDecimal", vec![Value::Int(4)]).unwrap();
        assert_eq!(value.to_string(), "5");
    }

    #[test]
    fn test_enum_mapping_demo() {
        let animals = ("Animals.pg", "namespace Demo;
static class Animals
{
    static FourLeggedAnimal Cat() => FourLeggedAnimal.Cat;
    static FourLeggedAnimal Lizard() => FourLeggedAnimal.Lizard;
}");
        let (compilation, output) = demo(&[MAPPER, animals]);
        let text = output.source("Mapper_MapToMammal.g.pg").unwrap();
        assert!(text.contains("    public static partial Demo.MammalAnimal MapToMammal(Demo.FourLeggedAnimal animal)\n"));
        assert!(text.contains("            case Demo.FourLeggedAnimal.Dog: return Demo.MammalAnimal.Dog;\n"));
        assert!(text.contains("            case Demo.FourLeggedAnimal.Cat: return Demo.MammalAnimal.Cat;\n"));
        assert!(text.contains("            default: throw new ArgumentException(\"Not a mammal: \" + animal);\n"));

        let arena = build(&compilation, &output);
        let cat = animal(&arena, "Cat");
        assert_eq!(call(&arena, "Demo.Mapper", "MapToMammal", vec![cat]).unwrap().to_string(), "Cat");
        let lizard = animal(&arena, "Lizard");
        assert_eq!(
            call(&arena, "Demo.Mapper", "MapToMammal", vec![lizard]).unwrap_err(),
            Fault::Thrown { type_name: "ArgumentException".to_string(), message: "Not a mammal: Lizard".to_string() }
        );
    }

    #[test]
    fn test_generation_is_deterministic() {
        let (compilation, first) = demo(&[SLOW_MATH, PI, COLORS]);
        let second = run(&compilation, &GeneratorOptions::default());
        assert_eq!(first.sources, second.sources);
        let names: Vec<&str> = first.sources.iter().map(|s| s.hint_name.as_str()).collect();
        assert_eq!(names, vec!["PiExample_GetPiDecimal.g.pg", "ColorsClass_GetAllColorsString.g.pg"]);
    }
}
