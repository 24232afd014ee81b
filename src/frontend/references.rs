//! Metadata references
//!
//! A compilation references libraries by metadata only. The metadata says
//! which types a library exports so attributes and static calls can bind at
//! compile time; the implementation is loaded separately at run time.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::frontend::semantic::ConstValue;
use crate::runtime::library::{LibraryLoader, LoadError};

/// Exported surface of a library
#[derive(Debug, Clone, PartialEq)]
pub struct LibraryMetadata {
    /// Assembly-style name, e.g. `Pregen.Support`
    pub name: String,
    pub types: Vec<TypeMetadata>,
}

impl LibraryMetadata {
    pub fn find_type(&self, full_name: &str) -> Option<&TypeMetadata> {
        self.types.iter().find(|t| t.full_name() == full_name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeMetadata {
    pub namespace: String,
    pub name: String,
    pub kind: MetadataKind,
    /// Static methods callable from user code
    pub methods: Vec<MethodMetadata>,
}

impl TypeMetadata {
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }

    pub fn is_attribute(&self) -> bool {
        matches!(self.kind, MetadataKind::Attribute { .. })
    }

    pub fn method(&self, name: &str) -> Option<&MethodMetadata> {
        self.methods.iter().find(|m| m.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetadataKind {
    Attribute { params: Vec<ParamMetadata> },
    Class,
    Interface,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamMetadata {
    pub name: String,
    pub ty: String,
    /// Default value of an optional parameter
    pub default: Option<ConstValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodMetadata {
    pub name: String,
    pub params: usize,
    pub type_params: usize,
}

/// Where a reference's bytes come from
#[derive(Debug, Clone, PartialEq)]
pub enum ReferenceKind {
    /// Backed by a file on disk (possibly a metadata-only `ref/` path)
    File(PathBuf),
    /// Produced by another in-memory compilation; there is no file to load
    InMemory,
}

#[derive(Debug, Clone)]
pub struct MetadataReference {
    pub kind: ReferenceKind,
    pub metadata: Rc<LibraryMetadata>,
}

impl MetadataReference {
    /// Reference a library file, reading its metadata through `loader`
    pub fn from_file(path: impl Into<PathBuf>, loader: &dyn LibraryLoader) -> Result<Self, LoadError> {
        let path = path.into();
        let metadata = loader.read_metadata(&path)?;
        Ok(Self { kind: ReferenceKind::File(path), metadata: Rc::new(metadata) })
    }

    pub fn in_memory(metadata: LibraryMetadata) -> Self {
        Self { kind: ReferenceKind::InMemory, metadata: Rc::new(metadata) }
    }

    /// Path for file references, library name otherwise
    pub fn display(&self) -> String {
        match &self.kind {
            ReferenceKind::File(path) => path.display().to_string(),
            ReferenceKind::InMemory => self.metadata.name.clone(),
        }
    }

    pub fn file_path(&self) -> Option<&Path> {
        match &self.kind {
            ReferenceKind::File(path) => Some(path),
            ReferenceKind::InMemory => None,
        }
    }

    /// Library name used for runtime resolution: the file stem, or the
    /// metadata name of an in-memory reference
    pub fn simple_name(&self) -> String {
        self.file_path()
            .and_then(|p| p.file_stem())
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.metadata.name.clone())
    }
}
