//! Execution runtime
//!
//! Runs generator methods for real. Every execution builds the same
//! standalone artifact (the user's sources plus a placeholder for every
//! outstanding stub), compiles it, loads it into a fresh arena and invokes
//! the generator there. The arena is dropped when the execution returns,
//! whatever the outcome.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use log::debug;
use thiserror::Error;

use crate::frontend::ast::TypeKind;
use crate::frontend::references::MetadataReference;
use crate::frontend::semantic::{Compilation, MethodId};
use crate::generator::protocol::{GeneratorsFactory, SwitchBodyRecord};
use crate::generator::synthesizer::accessibility_keyword;
use crate::middle::ir::FnId;
use crate::middle::ir_gen;
use crate::runtime::arena::ExecutionArena;
use crate::runtime::library::{implementation_path, LibraryInstance, LibraryLoader};
use crate::runtime::value::{Fault, Value};
use crate::stdlib::builtins::STUB_HOST_TYPE;
use crate::support;

/// Name of the arena and artifact every execution uses
pub const EXECUTION_ARENA_NAME: &str = "__GeneratorExec";

/// Path the placeholder source is compiled under
pub const PLACEHOLDER_PATH: &str = "__GenerationStubs.g.pg";

/// Prefix that marks references belonging to this toolchain
const TOOLCHAIN_PREFIX: &str = "Pregen";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("Compilation failed: {0}")]
    CompilationFailed(String),

    #[error("Could not find type '{0}' in compiled artifact")]
    TypeNotFound(String),

    #[error("Could not find method '{method}' in type '{type_name}'")]
    MethodNotFound { method: String, type_name: String },

    #[error(
        "Could not find any reference matching '{name}' in compilation references.\n Found total references: \
         {total}. \nMatching references: {}: \n{}", .matching.len(), .matching.join(", ")
    )]
    SupportNotReferenced { name: String, total: usize, matching: Vec<String> },

    #[error(
        "Found reference matching '{0}' as an in-memory reference, but executing generator methods currently \
         requires a file-backed reference with a valid path to load the library."
    )]
    SupportInMemoryOnly(String),

    #[error("RecordingGeneratorsFactory did not produce a record")]
    NoRecord,

    /// Displays the fault alone; the diagnostic already names the method
    #[error("{fault}")]
    Invocation { method: String, fault: Fault },
}

impl ExecutionError {
    /// The stub-invoked fault, if that is what stopped the generator
    pub fn is_stub_invoked(&self) -> bool {
        matches!(self, ExecutionError::Invocation { fault: Fault::StubInvoked { .. }, .. })
    }
}

/// Source that gives every outstanding stub a body which faults when called.
/// Stubs are grouped by declaring type, in block namespaces.
pub fn placeholder_source(compilation: &Compilation, stubs: &[MethodId]) -> String {
    type GroupKey<'a> = (Option<&'a str>, &'a str, bool, TypeKind);
    let mut groups: Vec<(GroupKey<'_>, Vec<MethodId>)> = Vec::new();
    for &stub in stubs {
        let ty = compilation.type_symbol(compilation.method(stub).containing_type);
        let key = (ty.namespace.as_deref(), ty.name.as_str(), ty.is_static, ty.kind);
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(stub),
            None => groups.push((key, vec![stub])),
        }
    }

    let mut out = String::new();
    for ((namespace, type_name, is_static, kind), members) in groups {
        if let Some(ns) = namespace {
            out.push_str(&format!("namespace {} {{\n", ns));
        }
        let keyword = match kind {
            TypeKind::Struct => "struct",
            TypeKind::Interface => "interface",
            _ => "class",
        };
        let modifiers = if is_static { "static partial" } else { "partial" };
        out.push_str(&format!("{} {} {} {{\n", modifiers, keyword, type_name));

        for stub in members {
            let method = compilation.method(stub);
            let mut signature: Vec<String> = Vec::new();
            if let Some(access) = method.accessibility.map(accessibility_keyword) {
                signature.push(access.to_string());
            }
            if method.is_static {
                signature.push("static".to_string());
            }
            signature.push("partial".to_string());
            signature.push(compilation.display_type(&method.ret_type, stub));
            let params: Vec<String> = method
                .params
                .iter()
                .map(|p| format!("{} {}", compilation.display_type(&p.ty, stub), p.name.name))
                .collect();
            out.push_str(&format!("{} {}({}) {{\n", signature.join(" "), method.name, params.join(", ")));
            out.push_str(&format!("{}.Invoked(\"{}\", \"{}\");\n", STUB_HOST_TYPE, type_name, method.name));
            if !method.ret_type.is_void() {
                out.push_str("return default;\n");
            }
            out.push_str("}\n");
        }

        out.push_str("}\n");
        if namespace.is_some() {
            out.push_str("}\n");
        }
    }
    out
}

/// Runs generator methods of one compilation
pub struct ExecutionRuntime<'c> {
    compilation: &'c Compilation,
    loader: Rc<dyn LibraryLoader>,
    outstanding: Vec<MethodId>,
}

impl<'c> ExecutionRuntime<'c> {
    pub fn new(compilation: &'c Compilation, loader: Rc<dyn LibraryLoader>) -> Self {
        Self { compilation, loader, outstanding: compilation.unimplemented_partials() }
    }

    /// Invoke a generator without arguments and return what it returned
    pub fn execute_simple(&self, generator: MethodId) -> Result<Value, ExecutionError> {
        let arena = self.prepare()?;
        let func = self.locate(&arena, generator)?;
        arena.invoke(func, Vec::new()).map_err(|fault| self.invocation(generator, fault))
    }

    /// Invoke a generator once per key in a single arena. A parameterless
    /// generator is invoked without arguments each time.
    pub fn execute_with_args(
        &self,
        generator: MethodId,
        keys: &[Value],
    ) -> Result<Vec<Result<Value, ExecutionError>>, ExecutionError> {
        let arena = self.prepare()?;
        let func = self.locate(&arena, generator)?;
        let takes_key = !self.compilation.method(generator).params.is_empty();
        Ok(keys
            .iter()
            .map(|key| {
                let args = if takes_key { vec![key.clone()] } else { Vec::new() };
                arena.invoke(func, args).map_err(|fault| self.invocation(generator, fault))
            })
            .collect())
    }

    /// Invoke a fluent generator with a recording factory installed and
    /// return what it recorded
    pub fn execute_fluent(&self, generator: MethodId) -> Result<SwitchBodyRecord, ExecutionError> {
        let arena = self.prepare()?;
        let support = self.load_support(&arena).map_err(|e| match e {
            LocateError::Execution(e) => e,
            LocateError::Fault(fault) => self.invocation(generator, fault),
        })?;

        let factory = Rc::new(GeneratorsFactory::recording());
        support
            .set_global(support::GENERATE_TYPE, support::CURRENT_GENERATOR, Value::Native(factory.clone()))
            .map_err(|fault| self.invocation(generator, fault))?;

        let func = self.locate(&arena, generator)?;
        arena.invoke(func, Vec::new()).map_err(|fault| self.invocation(generator, fault))?;
        factory.last_record().ok_or(ExecutionError::NoRecord)
    }

    /// Build, compile and load the execution artifact into a fresh arena
    fn prepare(&self) -> Result<ExecutionArena, ExecutionError> {
        let placeholders = placeholder_source(self.compilation, &self.outstanding);
        let executable = self
            .compilation
            .with_sources(&[(PLACEHOLDER_PATH.to_string(), placeholders)])
            .map_err(|failure| ExecutionError::CompilationFailed(failure.render().join("; ")))?;
        let artifact = ir_gen::compile(&executable, EXECUTION_ARENA_NAME).map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ExecutionError::CompilationFailed(messages.join("; "))
        })?;

        let mut arena = ExecutionArena::new(EXECUTION_ARENA_NAME, self.loader.clone());
        let files: Vec<PathBuf> = self
            .compilation
            .references()
            .iter()
            .filter_map(|r| r.file_path().map(Path::to_path_buf))
            .collect();
        arena.on_resolving(move |name| {
            files
                .iter()
                .find(|path| path.file_stem().is_some_and(|stem| stem.to_string_lossy().eq_ignore_ascii_case(name)))
                .map(|path| implementation_path(path))
        });
        arena.load_artifact(artifact);
        Ok(arena)
    }

    fn locate(&self, arena: &ExecutionArena, generator: MethodId) -> Result<FnId, ExecutionError> {
        let method = self.compilation.method(generator);
        let type_name = self.compilation.type_symbol(method.containing_type).full_name();
        arena.find_method(&type_name, &method.name).ok_or(ExecutionError::MethodNotFound {
            method: method.name.clone(),
            type_name,
        })
    }

    /// Load the support library from its implementation path
    fn load_support(&self, arena: &ExecutionArena) -> Result<Rc<dyn LibraryInstance>, LocateError> {
        let references = self.compilation.references();
        let matching: Vec<&MetadataReference> = references.iter().filter(|r| is_support_reference(r)).collect();
        if matching.is_empty() {
            let related = references
                .iter()
                .map(MetadataReference::display)
                .filter(|d| d.to_lowercase().contains(&TOOLCHAIN_PREFIX.to_lowercase()))
                .collect();
            return Err(LocateError::Execution(ExecutionError::SupportNotReferenced {
                name: support::LIBRARY_NAME.to_string(),
                total: references.len(),
                matching: related,
            }));
        }

        let Some(path) = matching.iter().find_map(|r| r.file_path()) else {
            return Err(LocateError::Execution(ExecutionError::SupportInMemoryOnly(
                support::LIBRARY_NAME.to_string(),
            )));
        };
        let path = implementation_path(path);
        debug!("loading support library from {}", path.display());
        let name = arena.load_library(&path).map_err(LocateError::Fault)?;
        arena.library(&name).map_err(LocateError::Fault)
    }

    fn invocation(&self, generator: MethodId, fault: Fault) -> ExecutionError {
        ExecutionError::Invocation { method: self.compilation.method(generator).name.clone(), fault }
    }
}

enum LocateError {
    Execution(ExecutionError),
    Fault(Fault),
}

fn is_support_reference(reference: &MetadataReference) -> bool {
    reference.display().eq_ignore_ascii_case(support::LIBRARY_NAME)
        || reference
            .file_path()
            .and_then(Path::file_stem)
            .is_some_and(|stem| stem.to_string_lossy().eq_ignore_ascii_case(support::LIBRARY_NAME))
}
