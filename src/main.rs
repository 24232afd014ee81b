//! Pregen
//!
//! Compile-time method synthesis: generator methods are run during the
//! build and their results become the bodies of partial method stubs.

mod feedback;
mod frontend;
mod generator;
mod middle;
mod runtime;
mod stdlib;
mod support;
mod utils;

use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::rc::Rc;
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::debug;

use feedback::{CompileErrorReport, GenerationReport};
use frontend::references::MetadataReference;
use frontend::semantic::Compilation;
use generator::{GenerationOutput, GeneratorOptions};
use runtime::arena::{ExecutionArena, EXECUTION_STACK_SIZE};
use runtime::library::BuiltinLoader;
use runtime::value::Value;

/// Pregen - build-time partial method generator
#[derive(Parser, Debug)]
#[command(name = "pregen")]
#[command(version)]
#[command(about = "Runs generator methods at build time and emits partial method bodies")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate partial method implementations
    Generate {
        #[command(flatten)]
        build: BuildArgs,

        /// Directory to write the generated units to (printed when omitted)
        #[arg(short, long, value_name = "DIR")]
        out_dir: Option<PathBuf>,
    },
    /// Generate, then compile the sources together with the generated units
    Check {
        #[command(flatten)]
        build: BuildArgs,
    },
    /// Generate, compile and invoke a static method
    Run {
        #[command(flatten)]
        build: BuildArgs,

        /// Method to invoke, as `Namespace.Type.Method`
        #[arg(long)]
        entry: String,

        /// Argument passed to the entry method (repeatable)
        #[arg(long = "arg", value_name = "VALUE")]
        args: Vec<String>,
    },
    /// Print version information
    Version,
}

#[derive(Args, Debug)]
struct BuildArgs {
    /// Source files (.pg)
    #[arg(value_name = "FILES", required = true)]
    files: Vec<PathBuf>,

    /// File-backed library reference
    #[arg(short, long = "reference", value_name = "PATH", default_value = "sdk/ref/Pregen.Support.pglib")]
    references: Vec<PathBuf>,

    /// Library referenced from memory only, by name
    #[arg(long = "in-memory-reference", value_name = "NAME")]
    in_memory_references: Vec<String>,

    /// Enable an optional diagnostic, e.g. MSGH003 (repeatable)
    #[arg(long = "enable", value_name = "ID")]
    enabled: Vec<String>,

    /// Print a JSON report instead of plain text
    #[arg(long)]
    json: bool,
}

impl BuildArgs {
    fn options(&self) -> GeneratorOptions {
        self.enabled.iter().fold(GeneratorOptions::default(), |options, id| options.enable(id))
    }
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    // Generators run inside the interpreter, which recurses on the host stack
    let worker = std::thread::Builder::new()
        .name("pregen".to_string())
        .stack_size(EXECUTION_STACK_SIZE)
        .spawn(move || execute(cli.command));
    let result = match worker {
        Ok(handle) => handle.join().unwrap_or_else(|_| Err(anyhow!("generation thread panicked"))),
        Err(e) => Err(anyhow::Error::new(e).context("failed to start generation thread")),
    };

    match result {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("error: {:#}", e);
            process::exit(1);
        }
    }
}

fn execute(command: Commands) -> Result<bool> {
    match command {
        Commands::Generate { build, out_dir } => generate(&build, out_dir.as_deref()),
        Commands::Check { build } => check(&build),
        Commands::Run { build, entry, args } => run(&build, &entry, &args),
        Commands::Version => {
            println!("pregen {}", env!("CARGO_PKG_VERSION"));
            println!("License: Apache-2.0");
            Ok(true)
        }
    }
}

/// Read sources and references into a compilation
fn load(build: &BuildArgs) -> Result<Compilation> {
    let mut sources = Vec::new();
    for path in &build.files {
        let text = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
        sources.push((path.display().to_string(), text));
    }

    let mut references = Vec::new();
    for path in &build.references {
        let reference = MetadataReference::from_file(path, &BuiltinLoader)
            .with_context(|| format!("failed to reference {}", path.display()))?;
        references.push(reference);
    }
    for name in &build.in_memory_references {
        if !name.eq_ignore_ascii_case(support::LIBRARY_NAME) {
            bail!("'{}' is not a known library", name);
        }
        references.push(MetadataReference::in_memory(support::metadata()));
    }
    debug!("{} source file(s), {} reference(s)", sources.len(), references.len());

    Compilation::create(&sources, references).map_err(|failure| anyhow!(failure.render().join("\n")))
}

/// Compile the original sources plus the generated units
fn compile_all(compilation: &Compilation, output: &GenerationOutput) -> Result<middle::ir::Artifact, Vec<CompileErrorReport>> {
    let generated: Vec<(String, String)> =
        output.sources.iter().map(|s| (s.hint_name.clone(), s.text.clone())).collect();
    let complete = compilation.with_sources(&generated).map_err(|failure| {
        failure.errors.iter().map(|e| CompileErrorReport::from_error(e, &failure.sources)).collect::<Vec<_>>()
    })?;
    middle::ir_gen::compile(&complete, "pregen")
        .map_err(|errors| errors.iter().map(|e| CompileErrorReport::from_error(e, complete.sources())).collect())
}

fn print_diagnostics(output: &GenerationOutput) {
    for diagnostic in &output.diagnostics {
        eprintln!("{}", diagnostic);
    }
}

fn print_compile_errors(errors: &[CompileErrorReport]) {
    for error in errors {
        match &error.location {
            Some(location) => eprintln!("{}: {}", location, error.message),
            None => eprintln!("{}", error.message),
        }
    }
}

fn generate(build: &BuildArgs, out_dir: Option<&Path>) -> Result<bool> {
    let start = Instant::now();
    let compilation = load(build)?;
    let output = generator::run(&compilation, &build.options());

    if let Some(dir) = out_dir {
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
        for unit in &output.sources {
            let path = dir.join(&unit.hint_name);
            fs::write(&path, &unit.text).with_context(|| format!("failed to write {}", path.display()))?;
            if !build.json {
                println!("  [✓] {}", path.display());
            }
        }
    }

    if build.json {
        let elapsed = start.elapsed().as_millis() as u64;
        let report = GenerationReport::new(&compilation, &output, Vec::new(), out_dir.is_none(), elapsed);
        println!("{}", report.to_json());
        return Ok(report.success);
    }

    if out_dir.is_none() {
        for unit in &output.sources {
            println!("// {}", unit.hint_name);
            print!("{}", unit.text);
        }
    }
    print_diagnostics(&output);
    Ok(!output.has_errors())
}

fn check(build: &BuildArgs) -> Result<bool> {
    let start = Instant::now();
    let compilation = load(build)?;
    let output = generator::run(&compilation, &build.options());
    let compile_errors = compile_all(&compilation, &output).err().unwrap_or_default();

    if build.json {
        let elapsed = start.elapsed().as_millis() as u64;
        let report = GenerationReport::new(&compilation, &output, compile_errors, false, elapsed);
        println!("{}", report.to_json());
        return Ok(report.success);
    }

    print_diagnostics(&output);
    print_compile_errors(&compile_errors);
    let success = !output.has_errors() && compile_errors.is_empty();
    if success {
        println!("  [✓] {} unit(s) generated, build is clean", output.sources.len());
    }
    Ok(success)
}

fn run(build: &BuildArgs, entry: &str, args: &[String]) -> Result<bool> {
    let compilation = load(build)?;
    let output = generator::run(&compilation, &build.options());
    print_diagnostics(&output);

    let artifact = match compile_all(&compilation, &output) {
        Ok(artifact) => artifact,
        Err(errors) => {
            print_compile_errors(&errors);
            return Ok(false);
        }
    };

    let (ty, method) = entry.rsplit_once('.').ok_or_else(|| anyhow!("entry '{}' must be Type.Method", entry))?;
    let mut arena = ExecutionArena::new("pregen", Rc::new(BuiltinLoader));
    arena.load_artifact(artifact);
    let func = arena
        .find_method(ty, method)
        .ok_or_else(|| anyhow!("method '{}' was not found in type '{}'", method, ty))?;

    let value = arena.invoke(func, args.iter().map(|a| parse_arg(a)).collect())?;
    println!("{}", value);
    Ok(true)
}

/// Command-line argument as the narrowest matching value
fn parse_arg(text: &str) -> Value {
    if let Ok(v) = text.parse::<i64>() {
        Value::Int(v)
    } else if let Ok(v) = text.parse::<f64>() {
        Value::Double(v)
    } else {
        match text {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::str(text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_arg() {
        assert!(matches!(parse_arg("42"), Value::Int(42)));
        assert!(matches!(parse_arg("2.5"), Value::Double(v) if v == 2.5));
        assert!(matches!(parse_arg("true"), Value::Bool(true)));
        assert!(matches!(parse_arg("Cat"), Value::Str(s) if &*s == "Cat"));
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["pregen", "check", "a.pg", "--enable", "msgh003"]).unwrap();
        let Commands::Check { build } = cli.command else {
            panic!("expected check");
        };
        assert_eq!(build.references, vec![PathBuf::from("sdk/ref/Pregen.Support.pglib")]);
        assert!(build.options().enabled_diagnostics.contains("MSGH003"));
        assert!(!build.json);
    }
}
