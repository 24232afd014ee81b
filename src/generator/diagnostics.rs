//! Diagnostics reported by the generator

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::utils::{SourceMap, Span};

pub const CATEGORY: &str = "GeneratesMethodGenerator";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Info => write!(f, "info"),
        }
    }
}

/// Fixed description of one diagnostic id. `message` holds positional
/// `{0}`, `{1}`... placeholders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagnosticDescriptor {
    pub id: &'static str,
    pub title: &'static str,
    pub message: &'static str,
    pub severity: Severity,
    pub enabled_by_default: bool,
}

pub const MISSING_PARTIAL_METHOD: DiagnosticDescriptor = DiagnosticDescriptor {
    id: "MSGH001",
    title: "Missing partial method",
    message: "Could not find partial method '{0}' in class '{1}'",
    severity: Severity::Error,
    enabled_by_default: true,
};

pub const METHOD_MUST_BE_STATIC: DiagnosticDescriptor = DiagnosticDescriptor {
    id: "MSGH002",
    title: "Generator method must be static",
    message: "Method '{0}' marked with [GeneratesMethod] must be static",
    severity: Severity::Error,
    enabled_by_default: true,
};

pub const GENERATING_METHOD_INFO: DiagnosticDescriptor = DiagnosticDescriptor {
    id: "MSGH003",
    title: "Generating partial method implementation",
    message: "Generating implementation for partial method '{0}' in class '{1}' using generator '{2}'",
    severity: Severity::Info,
    enabled_by_default: false,
};

pub const GENERATOR_EXECUTION_ERROR: DiagnosticDescriptor = DiagnosticDescriptor {
    id: "MSGH004",
    title: "Generator method execution failed",
    message: "Failed to execute generator method '{0}': {1}",
    severity: Severity::Error,
    enabled_by_default: true,
};

pub const TOO_MANY_PARAMETERS: DiagnosticDescriptor = DiagnosticDescriptor {
    id: "MSGH005",
    title: "Generator method has too many parameters",
    message: "Method '{0}' marked with [GeneratesMethod] and [SwitchCase] has {1} parameter(s), but only methods \
              with zero or one parameter are supported. Remove extra parameters or use the fluent API for more \
              complex scenarios.",
    severity: Severity::Error,
    enabled_by_default: true,
};

pub const SWITCH_CASE_TYPE_MISMATCH: DiagnosticDescriptor = DiagnosticDescriptor {
    id: "MSGH006",
    title: "SwitchCase argument type mismatch",
    message: "SwitchCase argument type '{0}' does not match the method parameter type '{1}'",
    severity: Severity::Error,
    enabled_by_default: true,
};

pub const ALL: &[DiagnosticDescriptor] = &[
    MISSING_PARTIAL_METHOD,
    METHOD_MUST_BE_STATIC,
    GENERATING_METHOD_INFO,
    GENERATOR_EXECUTION_ERROR,
    TOO_MANY_PARAMETERS,
    SWITCH_CASE_TYPE_MISMATCH,
];

pub fn descriptor(id: &str) -> Option<&'static DiagnosticDescriptor> {
    ALL.iter().find(|d| d.id.eq_ignore_ascii_case(id))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    pub path: String,
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub fn of(span: Span, sources: &SourceMap) -> Option<Self> {
        let file = sources.file(span.file_id)?;
        let (line, column) = file.line_col(span.start);
        Some(Self { path: file.path.clone(), line, column })
    }
}

/// A reported diagnostic with its message already formatted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub id: &'static str,
    pub severity: Severity,
    pub message: String,
    pub location: Option<Location>,
}

impl Diagnostic {
    pub fn new(descriptor: &DiagnosticDescriptor, location: Option<Location>, args: &[&str]) -> Self {
        Self {
            id: descriptor.id,
            severity: descriptor.severity,
            message: format_message(descriptor.message, args),
            location,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(at) = &self.location {
            write!(f, "{}:{}:{}: ", at.path, at.line, at.column)?;
        }
        write!(f, "{} {}: {}", self.severity, self.id, self.message)
    }
}

fn format_message(template: &str, args: &[&str]) -> String {
    args.iter()
        .enumerate()
        .fold(template.to_string(), |text, (i, arg)| text.replace(&format!("{{{}}}", i), arg))
}

/// Collects diagnostics, dropping those that are off
#[derive(Debug, Clone, Default)]
pub struct DiagnosticBag {
    enabled: BTreeSet<String>,
    reported: Vec<Diagnostic>,
}

impl DiagnosticBag {
    /// `enabled` lists ids of diagnostics that are off by default
    pub fn new(enabled: &BTreeSet<String>) -> Self {
        Self { enabled: enabled.clone(), reported: Vec::new() }
    }

    pub fn is_enabled(&self, descriptor: &DiagnosticDescriptor) -> bool {
        descriptor.enabled_by_default || self.enabled.iter().any(|id| id.eq_ignore_ascii_case(descriptor.id))
    }

    pub fn report(&mut self, descriptor: &DiagnosticDescriptor, location: Option<Location>, args: &[&str]) {
        if self.is_enabled(descriptor) {
            self.reported.push(Diagnostic::new(descriptor, location, args));
        }
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.reported
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_message_arguments() {
        let d = Diagnostic::new(&MISSING_PARTIAL_METHOD, None, &["GetPi", "PiExample"]);
        assert_eq!(d.message, "Could not find partial method 'GetPi' in class 'PiExample'");
        assert_eq!(d.to_string(), "error MSGH001: Could not find partial method 'GetPi' in class 'PiExample'");
    }

    #[test]
    fn test_too_many_parameters_names_count() {
        let d = Diagnostic::new(&TOO_MANY_PARAMETERS, None, &["Compute", "2"]);
        assert!(d.message.starts_with("Method 'Compute' marked with [GeneratesMethod] and [SwitchCase] has 2 parameter(s)"));
        assert!(d.message.ends_with("use the fluent API for more complex scenarios."));
    }

    #[test]
    fn test_info_is_off_unless_enabled() {
        let mut bag = DiagnosticBag::default();
        bag.report(&GENERATING_METHOD_INFO, None, &["A", "B", "C"]);
        assert!(bag.into_vec().is_empty());

        let enabled: BTreeSet<String> = ["msgh003".to_string()].into_iter().collect();
        let mut bag = DiagnosticBag::new(&enabled);
        bag.report(&GENERATING_METHOD_INFO, None, &["GetPi", "Pi", "PiGen"]);
        let reported = bag.into_vec();
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].severity, Severity::Info);
        assert_eq!(
            reported[0].message,
            "Generating implementation for partial method 'GetPi' in class 'Pi' using generator 'PiGen'"
        );
    }

    #[test]
    fn test_location_is_one_based() {
        let mut sources = SourceMap::new();
        let file = sources.add("demo.pg", "class A\n{\n  int x;\n}");
        let location = Location::of(Span::new(12, 15, file), &sources).unwrap();
        assert_eq!(location, Location { path: "demo.pg".to_string(), line: 3, column: 3 });
    }

    #[test]
    fn test_lookup_by_id() {
        assert_eq!(descriptor("MSGH006").map(|d| d.title), Some("SwitchCase argument type mismatch"));
        assert!(descriptor("MSGH999").is_none());
    }
}
