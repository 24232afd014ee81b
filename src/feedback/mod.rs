//! Structured Feedback Module
//!
//! Machine-readable output of a generation run:
//! - the units that were emitted
//! - every diagnostic with its location
//! - host compile errors found when checking the completed build

use serde::Serialize;

use crate::frontend::semantic::Compilation;
use crate::generator::diagnostics::{Diagnostic, Severity};
use crate::generator::GenerationOutput;
use crate::utils::{Error, SourceMap};

// ==================== Generation Report ====================

/// Complete report of one run
#[derive(Debug, Clone, Serialize)]
pub struct GenerationReport {
    /// True when no error diagnostic or compile error was produced
    pub success: bool,

    pub units: Vec<UnitReport>,

    pub diagnostics: Vec<Diagnostic>,

    /// Errors from compiling the sources together with the emitted units
    pub compile_errors: Vec<CompileErrorReport>,

    pub stats: GenerationStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnitReport {
    pub hint_name: String,
    pub lines: usize,
    /// Full text, only included when asked for
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompileErrorReport {
    pub message: String,
    /// `path:line:column` of the offending code
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerationStats {
    pub source_files: usize,
    pub generator_methods: usize,
    pub emitted_units: usize,
    pub errors: usize,
    pub total_time_ms: u64,
}

// ==================== Conversion ====================

impl CompileErrorReport {
    pub fn from_error(error: &Error, sources: &SourceMap) -> Self {
        Self { message: error.to_string(), location: error.span().map(|span| sources.describe(span)) }
    }
}

impl GenerationReport {
    /// Build a report; `include_text` embeds each unit's source
    pub fn new(
        compilation: &Compilation,
        output: &GenerationOutput,
        compile_errors: Vec<CompileErrorReport>,
        include_text: bool,
        total_time_ms: u64,
    ) -> Self {
        let units: Vec<UnitReport> = output
            .sources
            .iter()
            .map(|s| UnitReport {
                hint_name: s.hint_name.clone(),
                lines: s.text.lines().count(),
                text: include_text.then(|| s.text.clone()),
            })
            .collect();
        let errors = output.diagnostics.iter().filter(|d| d.severity == Severity::Error).count() + compile_errors.len();

        Self {
            success: errors == 0,
            stats: GenerationStats {
                source_files: compilation.sources().files().len(),
                generator_methods: compilation.generator_candidates().len(),
                emitted_units: units.len(),
                errors,
                total_time_ms,
            },
            units,
            diagnostics: output.diagnostics.clone(),
            compile_errors,
        }
    }

    /// Output as JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Output as compact JSON (for programmatic use)
    pub fn to_json_compact(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::references::MetadataReference;
    use crate::generator::{run, GeneratorOptions};
    use crate::support;
    use pretty_assertions::assert_eq;

    const SOURCE: &str = "using Pregen.Support;
partial class A
{
    public partial int Get();
    public partial int Missing();

    [GeneratesMethod(nameof(Get))] static int G() => 7;
    [GeneratesMethod(\"Nope\")] static int H() => 1;
}";

    #[test]
    fn test_report_json() {
        let compilation = Compilation::create(
            &[("a.pg".to_string(), SOURCE.to_string())],
            vec![MetadataReference::in_memory(support::metadata())],
        )
        .unwrap();
        let output = run(&compilation, &GeneratorOptions::default());
        let report = GenerationReport::new(&compilation, &output, Vec::new(), false, 3);

        assert!(!report.success);
        assert_eq!(report.stats.generator_methods, 2);
        // direct generators run from the compiled sources, so in-memory support is enough
        assert_eq!(report.stats.errors, 1);
        assert_eq!(report.units.len(), 1);
        assert_eq!(report.units[0].hint_name, "A_Get.g.pg");

        let json: serde_json::Value = serde_json::from_str(&report.to_json_compact()).unwrap();
        assert_eq!(json["diagnostics"].as_array().map(Vec::len), Some(1));
        assert_eq!(json["diagnostics"][0]["id"], "MSGH001");
        assert_eq!(json["diagnostics"][0]["severity"], "error");
        assert_eq!(json["diagnostics"][0]["location"]["line"], 8);
        assert_eq!(json["compile_errors"], serde_json::json!([]));
    }

    #[test]
    fn test_fluent_generator_reports_in_memory_support() {
        let source = "using Pregen.Support;
partial class A
{
    public partial int Get(int k);

    [GeneratesMethod(nameof(Get))]
    static IMethodImplementationGenerator G() =>
        Generate.Method()
            .WithParameter<int>()
            .WithReturnType<int>()
            .WithSwitchBody()
            .ForCases(1).ReturnConstantValue(k => k)
            .ForDefaultCase().WithBody(k => () => -1);
}";
        let compilation = Compilation::create(
            &[("a.pg".to_string(), source.to_string())],
            vec![MetadataReference::in_memory(support::metadata())],
        )
        .unwrap();
        let output = run(&compilation, &GeneratorOptions::default());
        let report = GenerationReport::new(&compilation, &output, Vec::new(), false, 0);

        assert!(!report.success);
        assert_eq!(report.stats.errors, 1);
        assert!(report.units.is_empty());
        assert_eq!(report.diagnostics[0].id, "MSGH004");
        assert!(report.diagnostics[0]
            .message
            .contains("Found reference matching 'Pregen.Support' as an in-memory reference"));
    }

    #[test]
    fn test_unit_text_is_optional() {
        let compilation = Compilation::create(
            &[("a.pg".to_string(), SOURCE.to_string())],
            vec![MetadataReference::from_file("sdk/ref/Pregen.Support.pglib", &crate::runtime::library::BuiltinLoader)
                .unwrap()],
        )
        .unwrap();
        let output = run(&compilation, &GeneratorOptions::default());

        let brief = GenerationReport::new(&compilation, &output, Vec::new(), false, 0);
        assert_eq!(brief.units.len(), 1);
        assert_eq!(brief.units[0].hint_name, "A_Get.g.pg");
        assert!(!brief.to_json().contains("\"text\""));

        let full = GenerationReport::new(&compilation, &output, Vec::new(), true, 0);
        assert!(full.units[0].text.as_deref().unwrap_or_default().contains("return 7;"));
    }
}
