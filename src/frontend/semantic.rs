//! Semantic model
//!
//! Binds parsed syntax trees into type and method symbols: partial
//! declarations are merged, partial method definitions are paired with their
//! implementation parts, and attributes are resolved against referenced
//! library metadata with their arguments folded to constants.

use std::collections::HashMap;
use std::fmt;

use crate::frontend::ast::*;
use crate::frontend::parser::parse_source;
use crate::frontend::references::{MetadataKind, MetadataReference};
use crate::utils::{Error, SourceMap, Span};

pub type TypeId = usize;
pub type MethodId = usize;

/// Names the host treats as keyword types
pub const PRIMITIVE_TYPES: &[&str] = &["int", "long", "double", "bool", "char", "string", "object", "void"];

/// A parsed file together with its id in the source map
#[derive(Debug, Clone)]
pub struct SyntaxTree {
    pub file_id: usize,
    pub unit: CompilationUnit,
}

/// Location of a method declaration: (tree, type declaration, method)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodSyntaxRef {
    pub tree: usize,
    pub type_decl: usize,
    pub method: usize,
}

/// A compile-time constant
#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    Int(i64),
    Long(i64),
    Double(f64),
    Str(String),
    Char(char),
    Bool(bool),
    Null,
    /// Enum member; `ty` is the enum's full name
    Enum { ty: String, member: String },
}

impl ConstValue {
    /// Display name of the constant's type
    pub fn type_name(&self) -> &str {
        match self {
            ConstValue::Int(_) => "int",
            ConstValue::Long(_) => "long",
            ConstValue::Double(_) => "double",
            ConstValue::Str(_) => "string",
            ConstValue::Char(_) => "char",
            ConstValue::Bool(_) => "bool",
            ConstValue::Null => "null",
            ConstValue::Enum { ty, .. } => ty,
        }
    }

    fn from_literal(lit: &Literal) -> Self {
        match lit {
            Literal::Int(v, _) => ConstValue::Int(*v),
            Literal::Long(v, _) => ConstValue::Long(*v),
            Literal::Float(v, _) => ConstValue::Double(*v),
            Literal::String(s, _) => ConstValue::Str(s.clone()),
            Literal::Char(c, _) => ConstValue::Char(*c),
            Literal::Bool(b, _) => ConstValue::Bool(*b),
            Literal::Null(_) => ConstValue::Null,
        }
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Int(v) | ConstValue::Long(v) => write!(f, "{}", v),
            ConstValue::Double(v) => write!(f, "{}", v),
            ConstValue::Str(s) => write!(f, "{}", s),
            ConstValue::Char(c) => write!(f, "{}", c),
            ConstValue::Bool(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            ConstValue::Null => Ok(()),
            ConstValue::Enum { member, .. } => write!(f, "{}", member),
        }
    }
}

/// A bound attribute application
#[derive(Debug, Clone)]
pub struct AttributeData {
    /// Full name of the resolved attribute class
    pub class_name: Option<String>,
    /// Constructor arguments in parameter order, optional ones filled with
    /// their defaults. `None` marks an argument that is not a constant.
    pub constructor_args: Vec<Option<ConstValue>>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct TypeSymbol {
    pub id: TypeId,
    pub name: String,
    pub namespace: Option<String>,
    pub kind: TypeKind,
    pub is_static: bool,
    pub accessibility: Option<Accessibility>,
    pub methods: Vec<MethodId>,
    pub enum_members: Vec<String>,
    /// (tree, type declaration) of every partial declaration
    pub declarations: Vec<(usize, usize)>,
    pub span: Span,
}

impl TypeSymbol {
    pub fn full_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}.{}", ns, self.name),
            None => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MethodSymbol {
    pub id: MethodId,
    pub name: String,
    pub containing_type: TypeId,
    pub accessibility: Option<Accessibility>,
    pub is_static: bool,
    pub is_partial: bool,
    pub has_body: bool,
    pub ret_type: TypeRef,
    pub params: Vec<Param>,
    pub attributes: Vec<AttributeData>,
    pub syntax: MethodSyntaxRef,
    /// Implementation part of a partial definition
    pub implementation: Option<MethodId>,
    /// Definition part of a partial implementation
    pub definition: Option<MethodId>,
    pub span: Span,
}

impl MethodSymbol {
    /// A partial method declared without a body
    pub fn is_partial_definition(&self) -> bool {
        self.is_partial && !self.has_body
    }

    /// Whether `attribute` (a full class name) is applied to this method
    pub fn has_attribute(&self, class_name: &str) -> bool {
        self.attributes.iter().any(|a| a.class_name.as_deref() == Some(class_name))
    }
}

/// Source files that failed to parse
#[derive(Debug, Clone)]
pub struct ParseFailure {
    pub sources: SourceMap,
    pub errors: Vec<Error>,
}

impl ParseFailure {
    pub fn render(&self) -> Vec<String> {
        self.errors.iter().map(|e| e.render(&self.sources)).collect()
    }
}

/// Immutable snapshot of a whole build: sources, references and symbols
#[derive(Debug, Clone)]
pub struct Compilation {
    sources: SourceMap,
    trees: Vec<SyntaxTree>,
    references: Vec<MetadataReference>,
    types: Vec<TypeSymbol>,
    methods: Vec<MethodSymbol>,
    syntax_index: HashMap<MethodSyntaxRef, MethodId>,
}

impl Compilation {
    /// Parse and bind `(path, text)` sources against `references`
    pub fn create(
        sources: &[(String, String)],
        references: Vec<MetadataReference>,
    ) -> std::result::Result<Self, ParseFailure> {
        let mut map = SourceMap::new();
        let mut trees = Vec::new();
        let mut errors = Vec::new();
        for (path, text) in sources {
            let file_id = map.add(path, text);
            match parse_source(text, file_id) {
                Ok(unit) => trees.push(SyntaxTree { file_id, unit }),
                Err(e) => errors.push(e),
            }
        }
        if !errors.is_empty() {
            return Err(ParseFailure { sources: map, errors });
        }

        let mut compilation = Self {
            sources: map,
            trees,
            references,
            types: Vec::new(),
            methods: Vec::new(),
            syntax_index: HashMap::new(),
        };
        compilation.bind_types();
        compilation.bind_methods();
        Ok(compilation)
    }

    /// A new compilation with `extra` sources added to this one's
    pub fn with_sources(&self, extra: &[(String, String)]) -> std::result::Result<Self, ParseFailure> {
        let mut sources: Vec<(String, String)> = self
            .sources
            .files()
            .iter()
            .map(|f| (f.path.clone(), f.text.clone()))
            .collect();
        sources.extend_from_slice(extra);
        Self::create(&sources, self.references.clone())
    }

    pub fn sources(&self) -> &SourceMap {
        &self.sources
    }

    pub fn trees(&self) -> &[SyntaxTree] {
        &self.trees
    }

    pub fn references(&self) -> &[MetadataReference] {
        &self.references
    }

    pub fn types(&self) -> &[TypeSymbol] {
        &self.types
    }

    pub fn methods(&self) -> &[MethodSymbol] {
        &self.methods
    }

    pub fn type_symbol(&self, id: TypeId) -> &TypeSymbol {
        &self.types[id]
    }

    pub fn method(&self, id: MethodId) -> &MethodSymbol {
        &self.methods[id]
    }

    /// Syntax of a method symbol
    pub fn method_syntax(&self, id: MethodId) -> &MethodDecl {
        let at = self.methods[id].syntax;
        &self.trees[at.tree].unit.types[at.type_decl].methods[at.method]
    }

    /// Resolve a declaration to its symbol
    pub fn declared_symbol(&self, syntax: MethodSyntaxRef) -> Option<MethodId> {
        self.syntax_index.get(&syntax).copied()
    }

    /// `using` directives of the tree that declares a method
    pub fn usings_of(&self, method: MethodId) -> Vec<String> {
        self.tree_usings(self.methods[method].syntax.tree)
    }

    fn tree_usings(&self, tree: usize) -> Vec<String> {
        self.trees[tree].unit.usings.iter().map(|u| u.to_string()).collect()
    }

    /// Members of a type with the given name
    pub fn members_named(&self, ty: TypeId, name: &str) -> impl Iterator<Item = &MethodSymbol> {
        let name = name.to_string();
        self.types[ty]
            .methods
            .iter()
            .map(move |id| &self.methods[*id])
            .filter(move |m| m.name == name)
    }

    /// Declarations carrying an attribute written as `GeneratesMethod`
    pub fn generator_candidates(&self) -> Vec<MethodSyntaxRef> {
        let mut found = Vec::new();
        for (tree_index, tree) in self.trees.iter().enumerate() {
            for (type_index, decl) in tree.unit.types.iter().enumerate() {
                for (method_index, method) in decl.methods.iter().enumerate() {
                    let marked = method.attributes.iter().any(|a| {
                        let simple = a.name.simple();
                        simple == "GeneratesMethod" || simple == "GeneratesMethodAttribute"
                    });
                    if marked {
                        found.push(MethodSyntaxRef { tree: tree_index, type_decl: type_index, method: method_index });
                    }
                }
            }
        }
        found
    }

    /// Partial definitions with no implementation part, in declaration order
    pub fn unimplemented_partials(&self) -> Vec<MethodId> {
        self.methods
            .iter()
            .filter(|m| m.is_partial_definition() && m.implementation.is_none())
            .map(|m| m.id)
            .collect()
    }

    /// Resolve a written type name from a namespace/usings context
    pub fn resolve_type(&self, name: &str, namespace: Option<&str>, usings: &[String]) -> Option<TypeId> {
        if let Some(t) = self.types.iter().find(|t| t.full_name() == name) {
            return Some(t.id);
        }
        self.types
            .iter()
            .filter(|t| t.name == name)
            .find(|t| match &t.namespace {
                None => true,
                Some(ns) => {
                    namespace.is_some_and(|current| current == ns || current.starts_with(&format!("{}.", ns)))
                        || usings.iter().any(|u| u == ns)
                }
            })
            .map(|t| t.id)
    }

    /// Display name of a type as seen from a method: keyword types stay as
    /// written, declared types become their full name
    pub fn display_type(&self, ty: &TypeRef, context: MethodId) -> String {
        if ty.rank > 0 || !ty.args.is_empty() || PRIMITIVE_TYPES.contains(&ty.name.as_str()) {
            return ty.to_string();
        }
        let owner = &self.types[self.methods[context].containing_type];
        let usings = self.usings_of(context);
        match self.resolve_type(&ty.name, owner.namespace.as_deref(), &usings) {
            Some(id) => self.types[id].full_name(),
            None => self
                .resolve_library_type(&ty.name, owner.namespace.as_deref(), &usings)
                .unwrap_or_else(|| ty.name.clone()),
        }
    }

    /// Full name of a type exported by a referenced library
    pub fn resolve_library_type(&self, name: &str, namespace: Option<&str>, usings: &[String]) -> Option<String> {
        let stripped = name.strip_suffix("Attribute");
        for reference in &self.references {
            for ty in &reference.metadata.types {
                let full = ty.full_name();
                let simple_match = ty.name == name || stripped == Some(ty.name.as_str()) && ty.is_attribute();
                let visible = usings.iter().any(|u| *u == ty.namespace)
                    || namespace.is_some_and(|ns| ns == ty.namespace || ns.starts_with(&format!("{}.", ty.namespace)));
                if full == name || (simple_match && visible) {
                    return Some(full);
                }
            }
        }
        None
    }

    // ==================== Binding ====================

    fn bind_types(&mut self) {
        let mut by_name: HashMap<String, TypeId> = HashMap::new();
        for (tree_index, tree) in self.trees.iter().enumerate() {
            for (decl_index, decl) in tree.unit.types.iter().enumerate() {
                let full_name = match &decl.namespace {
                    Some(ns) => format!("{}.{}", ns, decl.name.name),
                    None => decl.name.name.clone(),
                };
                match by_name.get(&full_name) {
                    Some(id) if decl.modifiers.is_partial => {
                        let symbol = &mut self.types[*id];
                        symbol.declarations.push((tree_index, decl_index));
                        symbol.is_static |= decl.modifiers.is_static;
                        if symbol.accessibility.is_none() {
                            symbol.accessibility = decl.modifiers.accessibility;
                        }
                    }
                    _ => {
                        let id = self.types.len();
                        by_name.insert(full_name, id);
                        self.types.push(TypeSymbol {
                            id,
                            name: decl.name.name.clone(),
                            namespace: decl.namespace.clone(),
                            kind: decl.kind,
                            is_static: decl.modifiers.is_static,
                            accessibility: decl.modifiers.accessibility,
                            methods: Vec::new(),
                            enum_members: decl.members.iter().map(|m| m.name.clone()).collect(),
                            declarations: vec![(tree_index, decl_index)],
                            span: decl.name.span,
                        });
                    }
                }
            }
        }
    }

    fn bind_methods(&mut self) {
        for type_id in 0..self.types.len() {
            let declarations = self.types[type_id].declarations.clone();
            for (tree_index, decl_index) in declarations {
                let usings = self.tree_usings(tree_index);
                let decl = &self.trees[tree_index].unit.types[decl_index];
                let namespace = decl.namespace.clone();
                let mut bound = Vec::new();
                for (method_index, method) in decl.methods.iter().enumerate() {
                    let attributes = method
                        .attributes
                        .iter()
                        .map(|a| self.bind_attribute(a, namespace.as_deref(), &usings))
                        .collect();
                    bound.push(MethodSymbol {
                        id: 0,
                        name: method.name.name.clone(),
                        containing_type: type_id,
                        accessibility: method.modifiers.accessibility,
                        is_static: method.modifiers.is_static,
                        is_partial: method.modifiers.is_partial,
                        has_body: method.body.is_some(),
                        ret_type: method.ret_type.clone(),
                        params: method.params.clone(),
                        attributes,
                        syntax: MethodSyntaxRef { tree: tree_index, type_decl: decl_index, method: method_index },
                        implementation: None,
                        definition: None,
                        span: method.name.span,
                    });
                }
                for mut symbol in bound {
                    symbol.id = self.methods.len();
                    self.syntax_index.insert(symbol.syntax, symbol.id);
                    self.types[type_id].methods.push(symbol.id);
                    self.methods.push(symbol);
                }
            }
            self.pair_partials(type_id);
        }
    }

    /// Link each partial definition with the implementation of the same name and arity
    fn pair_partials(&mut self, type_id: TypeId) {
        let ids = self.types[type_id].methods.clone();
        for &def in &ids {
            if !self.methods[def].is_partial_definition() {
                continue;
            }
            let implementation = ids.iter().copied().find(|&other| {
                let (a, b) = (&self.methods[def], &self.methods[other]);
                b.is_partial && b.has_body && b.definition.is_none() && a.name == b.name && a.params.len() == b.params.len()
            });
            if let Some(imp) = implementation {
                self.methods[def].implementation = Some(imp);
                self.methods[imp].definition = Some(def);
            }
        }
    }

    fn bind_attribute(&self, attribute: &Attribute, namespace: Option<&str>, usings: &[String]) -> AttributeData {
        let written = attribute.name.to_string();
        let class_name = self.resolve_library_type(&written, namespace, usings);

        let params = class_name.as_deref().and_then(|name| {
            self.references
                .iter()
                .flat_map(|r| r.metadata.types.iter())
                .find(|t| t.full_name() == name)
                .and_then(|t| match &t.kind {
                    MetadataKind::Attribute { params } => Some(params.clone()),
                    _ => None,
                })
        });

        let folded: Vec<(Option<&str>, Option<ConstValue>)> = attribute
            .args
            .iter()
            .map(|arg| (arg.name.as_ref().map(|n| n.name.as_str()), self.fold_constant(&arg.value, namespace, usings)))
            .collect();

        let constructor_args = match params {
            Some(params) => {
                let mut positional = folded.iter().filter(|(name, _)| name.is_none()).map(|(_, v)| v.clone());
                params
                    .iter()
                    .map(|param| {
                        folded
                            .iter()
                            .find(|(name, _)| *name == Some(param.name.as_str()))
                            .map(|(_, v)| v.clone())
                            .or_else(|| positional.next())
                            .unwrap_or_else(|| param.default.clone())
                    })
                    .collect()
            }
            None => folded.into_iter().map(|(_, v)| v).collect(),
        };

        AttributeData { class_name, constructor_args, span: attribute.span }
    }

    /// Fold an attribute argument to a constant
    pub fn fold_constant(&self, expr: &Expr, namespace: Option<&str>, usings: &[String]) -> Option<ConstValue> {
        match expr {
            Expr::Literal(lit) => Some(ConstValue::from_literal(lit)),
            Expr::NameOf(ident, _) => Some(ConstValue::Str(ident.name.clone())),
            Expr::Unary { op: UnOp::Neg, expr, .. } => match self.fold_constant(expr, namespace, usings)? {
                ConstValue::Int(v) => Some(ConstValue::Int(-v)),
                ConstValue::Long(v) => Some(ConstValue::Long(-v)),
                ConstValue::Double(v) => Some(ConstValue::Double(-v)),
                _ => None,
            },
            Expr::Member { target, name, .. } => {
                let type_name = dotted_name(target)?;
                let id = self.resolve_type(&type_name, namespace, usings)?;
                let ty = &self.types[id];
                if ty.kind == TypeKind::Enum && ty.enum_members.contains(&name.name) {
                    Some(ConstValue::Enum { ty: ty.full_name(), member: name.name.clone() })
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}

/// `A.B.C` written as nested member accesses
pub fn dotted_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Name(ident) => Some(ident.name.clone()),
        Expr::Member { target, name, .. } => Some(format!("{}.{}", dotted_name(target)?, name.name)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::references::MetadataReference;
    use crate::support;
    use pretty_assertions::assert_eq;

    fn compile(sources: &[&str]) -> Compilation {
        let sources: Vec<(String, String)> = sources
            .iter()
            .enumerate()
            .map(|(i, s)| (format!("file{}.pg", i), s.to_string()))
            .collect();
        Compilation::create(&sources, vec![MetadataReference::in_memory(support::metadata())]).unwrap()
    }

    #[test]
    fn test_partial_types_merge_and_methods_pair() {
        let c = compile(&[
            "namespace N; public partial class A { public partial int Get(int k); }",
            "namespace N; static partial class A { public static partial int Get(int k) { return k; } }",
        ]);
        assert_eq!(c.types().len(), 1);
        let ty = &c.types()[0];
        assert!(ty.is_static);
        assert_eq!(ty.full_name(), "N.A");
        let def = c.members_named(ty.id, "Get").find(|m| m.is_partial_definition()).unwrap();
        assert!(def.implementation.is_some());
        assert!(c.unimplemented_partials().is_empty());
    }

    #[test]
    fn test_unimplemented_partials() {
        let c = compile(&["class A { public partial string S(); partial void V(); static int X() => 1; }"]);
        let names: Vec<&str> = c.unimplemented_partials().iter().map(|id| c.method(*id).name.as_str()).collect();
        assert_eq!(names, vec!["S", "V"]);
    }

    #[test]
    fn test_attribute_resolution_needs_using() {
        let with_using = compile(&["using Pregen.Support; class A { [GeneratesMethod(\"S\")] static int G() => 1; }"]);
        let g = with_using.methods().iter().find(|m| m.name == "G").unwrap();
        assert_eq!(g.attributes[0].class_name.as_deref(), Some("Pregen.Support.GeneratesMethod"));
        assert_eq!(g.attributes[0].constructor_args, vec![Some(ConstValue::Str("S".to_string()))]);

        let without = compile(&["class A { [GeneratesMethod(\"S\")] static int G() => 1; }"]);
        assert_eq!(without.methods()[0].attributes[0].class_name, None);
        assert_eq!(without.generator_candidates().len(), 1);
    }

    #[test]
    fn test_attribute_arguments_fold() {
        let c = compile(&[
            "using Pregen.Support; namespace N; enum Color { Red, Green }
             class A {
                [SwitchCase(-3)] [SwitchCase(arg1: Color.Green)] [SwitchCase] [SwitchCase(\"x\")]
                static int G(int k) => k;
             }",
        ]);
        let g = c.methods().iter().find(|m| m.name == "G").unwrap();
        let args: Vec<Option<ConstValue>> = g.attributes.iter().map(|a| a.constructor_args[0].clone()).collect();
        assert_eq!(
            args,
            vec![
                Some(ConstValue::Int(-3)),
                Some(ConstValue::Enum { ty: "N.Color".to_string(), member: "Green".to_string() }),
                Some(ConstValue::Null),
                Some(ConstValue::Str("x".to_string())),
            ]
        );
    }

    #[test]
    fn test_display_type() {
        let c = compile(&["namespace N; enum E { A } class C { static int G(E e, int k, string[] s) => 1; }"]);
        let g = c.methods().iter().find(|m| m.name == "G").unwrap();
        assert_eq!(c.display_type(&g.params[0].ty, g.id), "N.E");
        assert_eq!(c.display_type(&g.params[1].ty, g.id), "int");
        assert_eq!(c.display_type(&g.params[2].ty, g.id), "string[]");
    }

    #[test]
    fn test_parse_failure_is_reported_with_location() {
        let err = Compilation::create(&[("bad.pg".to_string(), "class {".to_string())], Vec::new()).unwrap_err();
        assert_eq!(err.render(), vec!["bad.pg:1:7: Expected identifier".to_string()]);
    }
}
