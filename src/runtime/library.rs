//! Library loading
//!
//! A referenced library has two faces: metadata, read at compile time, and
//! a native implementation loaded into an arena at run time. Metadata may
//! come from a reference-only `ref/` path while the implementation must be
//! loaded from the sibling path one directory up.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use log::debug;
use thiserror::Error;

use crate::frontend::references::LibraryMetadata;
use crate::runtime::value::{CallContext, Fault, RuntimeType, Value};
use crate::support;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadError {
    #[error("'{0}' is not a known library")]
    NotFound(PathBuf),

    #[error("'{0}' is a reference-only library and cannot be loaded for execution")]
    ReferenceOnly(PathBuf),
}

/// Resolves library files to metadata and implementations
pub trait LibraryLoader {
    fn read_metadata(&self, path: &Path) -> Result<LibraryMetadata, LoadError>;

    fn load(&self, path: &Path) -> Result<Rc<dyn NativeLibrary>, LoadError>;
}

/// A loadable library implementation
pub trait NativeLibrary {
    fn name(&self) -> &str;

    /// Fresh per-arena state: every arena sees its own statics
    fn instantiate(&self) -> Box<dyn LibraryInstance>;
}

/// A library loaded into one arena
pub trait LibraryInstance {
    fn call_static(
        &self,
        ty: &str,
        method: &str,
        type_args: &[RuntimeType],
        args: Vec<Value>,
        ctx: &dyn CallContext,
    ) -> Result<Value, Fault>;

    /// Read a static property
    fn global(&self, ty: &str, name: &str) -> Option<Value>;

    /// Write a static property
    fn set_global(&self, ty: &str, name: &str, value: Value) -> Result<(), Fault>;
}

/// Loader for the libraries that ship with the toolchain. Files are matched
/// by stem, ignoring case, so `sdk/ref/Pregen.Support.pglib` and
/// `sdk/Pregen.Support.pglib` name the same library.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinLoader;

impl BuiltinLoader {
    fn is_support(path: &Path) -> bool {
        path.file_stem()
            .map(|stem| stem.to_string_lossy().eq_ignore_ascii_case(support::LIBRARY_NAME))
            .unwrap_or(false)
    }
}

impl LibraryLoader for BuiltinLoader {
    fn read_metadata(&self, path: &Path) -> Result<LibraryMetadata, LoadError> {
        if Self::is_support(path) {
            Ok(support::metadata())
        } else {
            Err(LoadError::NotFound(path.to_path_buf()))
        }
    }

    fn load(&self, path: &Path) -> Result<Rc<dyn NativeLibrary>, LoadError> {
        if is_reference_only(path) {
            return Err(LoadError::ReferenceOnly(path.to_path_buf()));
        }
        if Self::is_support(path) {
            debug!("loading {} from {}", support::LIBRARY_NAME, path.display());
            Ok(Rc::new(support::SupportLibrary))
        } else {
            Err(LoadError::NotFound(path.to_path_buf()))
        }
    }
}

fn is_reference_only(path: &Path) -> bool {
    path.parent()
        .and_then(Path::file_name)
        .map(|dir| dir.to_string_lossy().eq_ignore_ascii_case("ref"))
        .unwrap_or(false)
}

/// Path of the loadable implementation for a referenced file: a file in a
/// `ref` directory maps to the same file name one directory up
pub fn implementation_path(path: &Path) -> PathBuf {
    if is_reference_only(path) {
        if let (Some(dir), Some(file)) = (path.parent().and_then(Path::parent), path.file_name()) {
            return dir.join(file);
        }
    }
    path.to_path_buf()
}
