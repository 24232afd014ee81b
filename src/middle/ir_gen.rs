//! Artifact generator - bound syntax to executable artifact
//!
//! Lowers every method body of a compilation into the tree IR the arena
//! runs, reporting the compile errors the host compiler would: unresolved
//! names and types, bad calls, literal returns of the wrong type, duplicate
//! case labels, partial definitions without an implementation.

use std::collections::HashMap;
use std::rc::Rc;

use crate::frontend::ast::{
    self, Block, CaseLabel, Expr, LambdaBody, Literal, MethodBody, Stmt, TypeKind, TypeRef,
};
use crate::frontend::references::MetadataKind;
use crate::frontend::semantic::{dotted_name, Compilation, ConstValue, MethodId, TypeId};
use crate::middle::ir::{
    Artifact, ArtifactType, FnId, Function, Instr, Lambda, LambdaCode, Node, Place, SwitchArm,
};
use crate::runtime::value::{EnumInfo, RuntimeType, Value};
use crate::stdlib::builtins::BuiltinRegistry;
use crate::utils::{Error, Result, Span};

/// Compile a whole compilation into an artifact
pub fn compile(compilation: &Compilation, name: &str) -> std::result::Result<Artifact, Vec<Error>> {
    ArtifactGenerator::new(compilation, name).generate()
}

/// Per-function compile state; lambdas get their own
struct FnContext {
    scopes: Vec<Vec<(String, usize)>>,
    next_slot: usize,
    /// Declared return type; `None` inside lambdas
    ret: Option<RuntimeType>,
    loops: usize,
    /// Loops plus enclosing switches
    breakables: usize,
}

impl FnContext {
    fn new(ret: Option<RuntimeType>) -> Self {
        Self { scopes: vec![Vec::new()], next_slot: 0, ret, loops: 0, breakables: 0 }
    }

    fn lookup(&self, name: &str) -> Option<usize> {
        self.scopes.iter().rev().find_map(|scope| scope.iter().find(|(n, _)| n == name).map(|(_, s)| *s))
    }
}

/// Artifact Generator
pub struct ArtifactGenerator<'a> {
    compilation: &'a Compilation,
    builtins: BuiltinRegistry,
    artifact: Artifact,
    errors: Vec<Error>,
    fn_ids: HashMap<MethodId, FnId>,
    enums: HashMap<TypeId, Rc<EnumInfo>>,
    /// Method being compiled
    method: MethodId,
    namespace: Option<String>,
    usings: Vec<String>,
    contexts: Vec<FnContext>,
}

impl<'a> ArtifactGenerator<'a> {
    pub fn new(compilation: &'a Compilation, name: &str) -> Self {
        Self {
            compilation,
            builtins: BuiltinRegistry::new(),
            artifact: Artifact::new(name),
            errors: Vec::new(),
            fn_ids: HashMap::new(),
            enums: HashMap::new(),
            method: 0,
            namespace: None,
            usings: Vec::new(),
            contexts: Vec::new(),
        }
    }

    pub fn generate(mut self) -> std::result::Result<Artifact, Vec<Error>> {
        self.declare_types();
        self.validate_declarations();
        self.declare_functions();

        let bodies: Vec<(MethodId, FnId)> = self
            .compilation
            .methods()
            .iter()
            .filter(|m| m.has_body)
            .filter_map(|m| self.fn_ids.get(&m.id).map(|f| (m.id, *f)))
            .collect();
        for (method, func) in bodies {
            self.generate_function(method, func);
        }

        if self.errors.is_empty() {
            Ok(self.artifact)
        } else {
            Err(self.errors)
        }
    }

    // ==================== Declarations ====================

    fn declare_types(&mut self) {
        for ty in self.compilation.types() {
            if ty.kind == TypeKind::Enum {
                let info = EnumInfo { full_name: ty.full_name(), members: ty.enum_members.clone() };
                self.enums.insert(ty.id, Rc::new(info));
            }
            self.artifact.types.push(ArtifactType {
                full_name: ty.full_name(),
                kind: ty.kind,
                enum_members: ty.enum_members.clone(),
                methods: Vec::new(),
            });
        }
    }

    fn validate_declarations(&mut self) {
        let compilation = self.compilation;
        let mut seen_types: HashMap<String, TypeId> = HashMap::new();
        for ty in compilation.types() {
            if seen_types.insert(ty.full_name(), ty.id).is_some() {
                self.errors.push(Error::DuplicateDefinition { name: ty.full_name(), span: ty.span });
            }

            let methods: Vec<_> = ty.methods.iter().map(|id| compilation.method(*id)).collect();
            for (i, method) in methods.iter().enumerate() {
                if method.is_partial_definition() && method.implementation.is_none() {
                    self.errors.push(Error::MissingPartialImplementation {
                        method: method.name.clone(),
                        span: method.span,
                    });
                }
                let clash = methods[..i].iter().any(|earlier| {
                    earlier.name == method.name
                        && earlier.params.len() == method.params.len()
                        && earlier.implementation != Some(method.id)
                        && earlier.definition != Some(method.id)
                });
                if clash {
                    self.errors.push(Error::DuplicateDefinition {
                        name: format!("{}.{}", ty.name, method.name),
                        span: method.span,
                    });
                }

                let syntax = compilation.method_syntax(method.id);
                for (data, written) in method.attributes.iter().zip(&syntax.attributes) {
                    if data.class_name.is_none() {
                        self.errors.push(Error::AttributeNotFound { name: written.name.to_string(), span: data.span });
                    } else if data.constructor_args.iter().any(Option::is_none) {
                        self.errors.push(Error::NonConstantAttributeArgument { span: data.span });
                    }
                }
            }
        }
    }

    fn declare_functions(&mut self) {
        let compilation = self.compilation;
        for method in compilation.methods().iter().filter(|m| m.has_body) {
            self.enter(method.id);
            let params = method
                .params
                .iter()
                .map(|p| self.runtime_type(&p.ty))
                .collect::<Result<Vec<_>>>();
            let ret = self.runtime_type(&method.ret_type);
            let (params, ret) = match (params, ret) {
                (Ok(params), Ok(ret)) => (params, ret),
                (Err(e), _) | (_, Err(e)) => {
                    self.errors.push(e);
                    continue;
                }
            };
            let id = self.artifact.functions.len();
            self.artifact.functions.push(Function {
                name: method.name.clone(),
                owner: compilation.type_symbol(method.containing_type).full_name(),
                params,
                ret,
                is_static: method.is_static,
                frame_size: 0,
                body: Vec::new(),
            });
            self.artifact.types[method.containing_type].methods.push(id);
            self.fn_ids.insert(method.id, id);
        }
        for method in compilation.methods() {
            if let Some(id) = method.implementation.and_then(|imp| self.fn_ids.get(&imp).copied()) {
                self.fn_ids.insert(method.id, id);
            }
        }
    }

    /// Switch name resolution to the context of a method
    fn enter(&mut self, method: MethodId) {
        let owner = self.compilation.type_symbol(self.compilation.method(method).containing_type);
        self.method = method;
        self.namespace = owner.namespace.clone();
        self.usings = self.compilation.usings_of(method);
    }

    /// Runtime view of a written type
    fn runtime_type(&self, ty: &TypeRef) -> Result<RuntimeType> {
        if ty.rank > 0 {
            let elem = TypeRef { rank: ty.rank - 1, ..ty.clone() };
            return Ok(RuntimeType::Array(Box::new(self.runtime_type(&elem)?)));
        }
        let resolved = match ty.name.as_str() {
            "int" | "Int32" | "short" | "byte" => RuntimeType::Int,
            "long" | "Int64" => RuntimeType::Long,
            "double" | "float" | "decimal" => RuntimeType::Double,
            "bool" | "Boolean" => RuntimeType::Bool,
            "char" => RuntimeType::Char,
            "string" | "String" => RuntimeType::String,
            "object" => RuntimeType::Object,
            "void" => RuntimeType::Void,
            "Func" | "Action" => RuntimeType::Delegate,
            "IEnumerable" | "IReadOnlyList" | "List" if ty.args.len() == 1 => {
                RuntimeType::Array(Box::new(self.runtime_type(&ty.args[0])?))
            }
            name => {
                if let Some(id) = self.compilation.resolve_type(name, self.namespace.as_deref(), &self.usings) {
                    match self.enums.get(&id) {
                        Some(info) => RuntimeType::Enum(info.clone()),
                        None => RuntimeType::Class(self.compilation.type_symbol(id).full_name()),
                    }
                } else if let Some(full) =
                    self.compilation.resolve_library_type(name, self.namespace.as_deref(), &self.usings)
                {
                    RuntimeType::Class(full)
                } else {
                    return Err(Error::UndefinedType { name: ty.to_string(), span: ty.span });
                }
            }
        };
        Ok(resolved)
    }

    // ==================== Bodies ====================

    /// Generate the body of a method
    fn generate_function(&mut self, method: MethodId, func: FnId) {
        self.enter(method);
        let decl = self.compilation.method_syntax(method);
        let ret = self.artifact.functions[func].ret.clone();

        self.contexts.push(FnContext::new(Some(ret.clone())));
        for param in &decl.params {
            if let Err(e) = self.declare(&param.name) {
                self.errors.push(e);
            }
        }

        let body = match &decl.body {
            Some(MethodBody::Expr(expr)) => {
                let lowered = self.check_return_literal(expr, &ret).and_then(|_| self.generate_expr(expr));
                match lowered {
                    Ok(node) if ret == RuntimeType::Void => vec![Instr::Expr(node)],
                    Ok(node) => vec![Instr::Return(Some(node))],
                    Err(e) => {
                        self.errors.push(e);
                        Vec::new()
                    }
                }
            }
            Some(MethodBody::Block(block)) => self.generate_stmts(&block.stmts),
            None => Vec::new(),
        };

        let context = self.contexts.pop();
        let function = &mut self.artifact.functions[func];
        function.frame_size = context.map(|c| c.next_slot).unwrap_or(0);
        function.body = body;
    }

    fn context(&mut self) -> &mut FnContext {
        if self.contexts.is_empty() {
            self.contexts.push(FnContext::new(None));
        }
        let last = self.contexts.len() - 1;
        &mut self.contexts[last]
    }

    /// Declare a local in the innermost scope and return its slot
    fn declare(&mut self, name: &ast::Ident) -> Result<usize> {
        let context = self.context();
        let scope = context.scopes.len() - 1;
        if context.scopes[scope].iter().any(|(n, _)| *n == name.name) {
            return Err(Error::DuplicateDefinition { name: name.name.clone(), span: name.span });
        }
        let slot = context.next_slot;
        context.next_slot += 1;
        context.scopes[scope].push((name.name.clone(), slot));
        Ok(slot)
    }

    /// Resolve a local through enclosing lambdas: (frames out, slot)
    fn lookup_local(&self, name: &str) -> Option<(usize, usize)> {
        self.contexts
            .iter()
            .rev()
            .enumerate()
            .find_map(|(depth, context)| context.lookup(name).map(|slot| (depth, slot)))
    }

    fn in_scope<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        self.context().scopes.push(Vec::new());
        let result = f(self);
        self.context().scopes.pop();
        result
    }

    fn generate_stmts(&mut self, stmts: &[Stmt]) -> Vec<Instr> {
        let mut out = Vec::new();
        for stmt in stmts {
            match self.generate_stmt(stmt) {
                Ok(instr) => out.push(instr),
                Err(e) => self.errors.push(e),
            }
        }
        out
    }

    fn generate_block(&mut self, block: &Block) -> Vec<Instr> {
        self.in_scope(|this| this.generate_stmts(&block.stmts))
    }

    /// Statement bodies of `if`/loops get their own scope
    fn generate_nested(&mut self, stmt: &Stmt) -> Vec<Instr> {
        match stmt {
            Stmt::Block(block) => self.generate_block(block),
            other => self.in_scope(|this| this.generate_stmts(std::slice::from_ref(other))),
        }
    }

    fn generate_stmt(&mut self, stmt: &Stmt) -> Result<Instr> {
        match stmt {
            Stmt::Block(block) => Ok(Instr::Block(self.generate_block(block))),

            Stmt::Local { ty, name, value, span } => {
                let declared = ty.as_ref().map(|t| self.runtime_type(t)).transpose()?;
                let node = match (value, &declared) {
                    (Some(value), _) => self.generate_expr(value)?,
                    (None, Some(declared)) => Node::Const(declared.default_value()),
                    (None, None) => return Err(Error::Expected("an initializer for 'var'".to_string(), *span)),
                };
                let node = match declared {
                    Some(RuntimeType::Double) => Node::Convert { value: Box::new(node), ty: RuntimeType::Double },
                    _ => node,
                };
                let slot = self.declare(name)?;
                Ok(Instr::Store { slot, value: node })
            }

            Stmt::Expr(expr) => Ok(Instr::Expr(self.generate_expr(expr)?)),

            Stmt::Return { value, .. } => {
                let ret = self.context().ret.clone();
                match (value, ret) {
                    (Some(Expr::Default(_)), Some(ret)) => Ok(Instr::Return(Some(Node::Const(ret.default_value())))),
                    (Some(value), Some(ret)) => {
                        self.check_return_literal(value, &ret)?;
                        Ok(Instr::Return(Some(self.generate_expr(value)?)))
                    }
                    (Some(value), None) => Ok(Instr::Return(Some(self.generate_expr(value)?))),
                    (None, _) => Ok(Instr::Return(None)),
                }
            }

            Stmt::If { cond, then_branch, else_branch, .. } => {
                let cond = self.generate_expr(cond)?;
                let then_branch = self.generate_nested(then_branch);
                let else_branch = match else_branch {
                    Some(stmt) => self.generate_nested(stmt),
                    None => Vec::new(),
                };
                Ok(Instr::If { cond, then_branch, else_branch })
            }

            Stmt::While { cond, body, .. } => {
                let cond = self.generate_expr(cond)?;
                let body = self.generate_loop_body(body);
                Ok(Instr::While { cond, body })
            }

            Stmt::For { init, cond, step, body, .. } => self.in_scope(|this| {
                let init = match init {
                    Some(init) => Some(this.generate_stmt(init)?),
                    None => None,
                };
                let cond = cond.as_ref().map(|c| this.generate_expr(c)).transpose()?;
                let step = step.iter().map(|s| this.generate_expr(s)).collect::<Result<Vec<_>>>()?;
                let body = this.generate_loop_body(body);
                let mut lowered: Vec<Instr> = init.into_iter().collect();
                lowered.push(Instr::For { cond, step, body });
                Ok(Instr::Block(lowered))
            }),

            Stmt::Foreach { var, iter, body, .. } => {
                let iter = self.generate_expr(iter)?;
                self.in_scope(|this| {
                    let slot = this.declare(var)?;
                    let body = this.generate_loop_body(body);
                    Ok(Instr::Foreach { slot, iter, body })
                })
            }

            Stmt::Switch { subject, sections, .. } => self.generate_switch(subject, sections),

            Stmt::Throw { value, .. } => Ok(Instr::Throw(self.generate_expr(value)?)),

            Stmt::Break { span } => {
                if self.context().breakables == 0 {
                    return Err(Error::NoEnclosingLoop { span: *span });
                }
                Ok(Instr::Break)
            }

            Stmt::Continue { span } => {
                if self.context().loops == 0 {
                    return Err(Error::NoEnclosingLoop { span: *span });
                }
                Ok(Instr::Continue)
            }

            Stmt::Empty { .. } => Ok(Instr::Block(Vec::new())),
        }
    }

    fn generate_loop_body(&mut self, body: &Stmt) -> Vec<Instr> {
        self.context().loops += 1;
        self.context().breakables += 1;
        let body = self.generate_nested(body);
        self.context().loops -= 1;
        self.context().breakables -= 1;
        body
    }

    fn generate_switch(&mut self, subject: &Expr, sections: &[ast::SwitchSection]) -> Result<Instr> {
        let subject = self.generate_expr(subject)?;
        let mut seen: Vec<Value> = Vec::new();
        let mut has_default = false;
        let mut arms = Vec::new();
        for section in sections {
            let mut labels = Vec::new();
            let mut is_default = false;
            for label in &section.labels {
                match label {
                    CaseLabel::Default(span) => {
                        if has_default {
                            return Err(Error::DuplicateCaseLabel { label: "default".to_string(), span: *span });
                        }
                        has_default = true;
                        is_default = true;
                    }
                    CaseLabel::Case(expr) => {
                        let value = self
                            .compilation
                            .fold_constant(expr, self.namespace.as_deref(), &self.usings)
                            .map(|c| self.const_value(&c))
                            .ok_or_else(|| Error::Expected("a constant value".to_string(), expr.span()))?;
                        if seen.iter().any(|s| s.equals(&value)) {
                            let label = self
                                .compilation
                                .sources()
                                .slice(expr.span())
                                .map(str::to_string)
                                .unwrap_or_else(|| value.to_string());
                            return Err(Error::DuplicateCaseLabel { label, span: expr.span() });
                        }
                        seen.push(value.clone());
                        labels.push(value);
                    }
                }
            }
            self.context().breakables += 1;
            let body = self.in_scope(|this| this.generate_stmts(&section.body));
            self.context().breakables -= 1;
            arms.push(SwitchArm { labels, is_default, body });
        }
        Ok(Instr::Switch { subject, arms })
    }

    /// A literal returned from a method must fit its declared return type
    fn check_return_literal(&self, value: &Expr, ret: &RuntimeType) -> Result<()> {
        let Expr::Literal(lit) = value else {
            return Ok(());
        };
        let fits = match (ret, lit) {
            (RuntimeType::Int, Literal::Int(..) | Literal::Char(..)) => true,
            (RuntimeType::Long, Literal::Int(..) | Literal::Long(..) | Literal::Char(..)) => true,
            (RuntimeType::Double, Literal::Int(..) | Literal::Long(..) | Literal::Float(..) | Literal::Char(..)) => true,
            (RuntimeType::Bool, Literal::Bool(..)) => true,
            (RuntimeType::Char, Literal::Char(..)) => true,
            (RuntimeType::String, Literal::String(..) | Literal::Null(_)) => true,
            (RuntimeType::Enum(_), Literal::Int(0, _)) => true,
            (
                RuntimeType::Int
                | RuntimeType::Long
                | RuntimeType::Double
                | RuntimeType::Bool
                | RuntimeType::Char
                | RuntimeType::String
                | RuntimeType::Enum(_)
                | RuntimeType::Void,
                _,
            ) => false,
            _ => true,
        };
        if fits {
            Ok(())
        } else {
            Err(Error::TypeMismatch { expected: ret.to_string(), got: lit.type_name().to_string(), span: lit.span() })
        }
    }

    fn const_value(&self, value: &ConstValue) -> Value {
        match value {
            ConstValue::Int(v) | ConstValue::Long(v) => Value::Int(*v),
            ConstValue::Double(v) => Value::Double(*v),
            ConstValue::Str(s) => Value::str(s),
            ConstValue::Char(c) => Value::Char(*c),
            ConstValue::Bool(b) => Value::Bool(*b),
            ConstValue::Null => Value::Null,
            ConstValue::Enum { ty, member } => self
                .enums
                .values()
                .find(|info| info.full_name == *ty)
                .and_then(|info| info.ordinal_of(member, false).map(|o| Value::Enum(info.clone(), o)))
                .unwrap_or(Value::Null),
        }
    }

    // ==================== Expressions ====================

    fn generate_expr(&mut self, expr: &Expr) -> Result<Node> {
        match expr {
            Expr::Literal(lit) => Ok(Node::Const(match lit {
                Literal::Int(v, _) | Literal::Long(v, _) => Value::Int(*v),
                Literal::Float(v, _) => Value::Double(*v),
                Literal::String(s, _) => Value::str(s),
                Literal::Char(c, _) => Value::Char(*c),
                Literal::Bool(b, _) => Value::Bool(*b),
                Literal::Null(_) => Value::Null,
            })),

            Expr::Name(ident) => match self.lookup_local(&ident.name) {
                Some((depth, slot)) => Ok(Node::Local { depth, slot }),
                None => Err(Error::UndefinedVariable { name: ident.name.clone(), span: ident.span }),
            },

            Expr::Default(_) => Ok(Node::Const(Value::Null)),

            Expr::Member { target, name, span } => {
                if let Some(path) = self.static_path(target) {
                    if let Some(id) = self.compilation.resolve_type(&path, self.namespace.as_deref(), &self.usings) {
                        let ty = self.compilation.type_symbol(id);
                        let unknown = Error::UnknownMember { ty: ty.full_name(), member: name.name.clone(), span: *span };
                        let info = self.enums.get(&id).ok_or(unknown.clone())?;
                        let ordinal = info.ordinal_of(&name.name, false).ok_or(unknown)?;
                        return Ok(Node::Const(Value::Enum(info.clone(), ordinal)));
                    }
                    if self.builtins.is_builtin_type(&path) {
                        return self.builtins.constant(&path, &name.name).map(Node::Const).ok_or_else(|| {
                            Error::UnknownMember { ty: path.clone(), member: name.name.clone(), span: *span }
                        });
                    }
                }
                let target = self.generate_expr(target)?;
                Ok(Node::Property { target: Box::new(target), name: name.name.clone() })
            }

            Expr::Call { callee, type_args, args, span } => self.generate_call(callee, type_args, args, *span),

            Expr::Index { target, index, .. } => Ok(Node::Index {
                target: Box::new(self.generate_expr(target)?),
                index: Box::new(self.generate_expr(index)?),
            }),

            Expr::Unary { op, expr, .. } => Ok(Node::Unary { op: *op, expr: Box::new(self.generate_expr(expr)?) }),

            Expr::Binary { left, op, right, .. } => Ok(Node::Binary {
                op: *op,
                left: Box::new(self.generate_expr(left)?),
                right: Box::new(self.generate_expr(right)?),
            }),

            Expr::Assign { target, op, value, .. } => {
                let target = self.place(target)?;
                let value = self.generate_expr(value)?;
                Ok(Node::Assign { target, op: *op, value: Box::new(value) })
            }

            Expr::Increment { target, delta, prefix, .. } => {
                Ok(Node::Increment { target: self.place(target)?, delta: *delta, prefix: *prefix })
            }

            Expr::Conditional { cond, then_expr, else_expr, .. } => Ok(Node::Conditional {
                cond: Box::new(self.generate_expr(cond)?),
                then_node: Box::new(self.generate_expr(then_expr)?),
                else_node: Box::new(self.generate_expr(else_expr)?),
            }),

            Expr::Lambda { params, body, .. } => self.generate_lambda(expr, params, body),

            Expr::NewArray { elem, size, items, span } => {
                let elem = match elem {
                    Some(ty) => self.runtime_type(ty)?,
                    None => RuntimeType::Object,
                };
                match (items, size) {
                    (Some(items), _) => {
                        let items = items
                            .iter()
                            .map(|item| {
                                let node = self.generate_expr(item)?;
                                Ok(match elem {
                                    RuntimeType::Double => Node::Convert { value: Box::new(node), ty: RuntimeType::Double },
                                    _ => node,
                                })
                            })
                            .collect::<Result<Vec<_>>>()?;
                        Ok(Node::ArrayLit { items })
                    }
                    (None, Some(size)) => Ok(Node::NewArray { elem, size: Box::new(self.generate_expr(size)?) }),
                    (None, None) => Err(Error::Expected("an array size or initializer".to_string(), *span)),
                }
            }

            Expr::NewObject { ty, args, span } => {
                if ty.simple_name().ends_with("Exception") {
                    let args = self.generate_args(args)?;
                    return Ok(Node::NewException { type_name: ty.simple_name().to_string(), args });
                }
                match self.runtime_type(ty)? {
                    RuntimeType::Class(name) => {
                        Err(Error::UnknownMember { ty: name, member: "constructor".to_string(), span: *span })
                    }
                    other => Err(Error::TypeMismatch { expected: "a class type".to_string(), got: other.to_string(), span: *span }),
                }
            }

            Expr::NameOf(ident, _) => Ok(Node::Const(Value::str(&ident.name))),

            Expr::Throw(value, _) => Ok(Node::Throw(Box::new(self.generate_expr(value)?))),
        }
    }

    /// `A.B` naming a type rather than a value
    fn static_path(&self, target: &Expr) -> Option<String> {
        let path = dotted_name(target)?;
        let root = path.split('.').next().unwrap_or(&path);
        if self.lookup_local(root).is_some() {
            None
        } else {
            Some(path)
        }
    }

    fn place(&mut self, target: &Expr) -> Result<Place> {
        match target {
            Expr::Name(ident) => match self.lookup_local(&ident.name) {
                Some((depth, slot)) => Ok(Place::Local { depth, slot }),
                None => Err(Error::UndefinedVariable { name: ident.name.clone(), span: ident.span }),
            },
            Expr::Index { target, index, .. } => Ok(Place::Index {
                target: Box::new(self.generate_expr(target)?),
                index: Box::new(self.generate_expr(index)?),
            }),
            other => Err(Error::InvalidAssignmentTarget { span: other.span() }),
        }
    }

    fn generate_args(&mut self, args: &[Expr]) -> Result<Vec<Node>> {
        args.iter().map(|a| self.generate_expr(a)).collect()
    }

    fn generate_call(&mut self, callee: &Expr, type_args: &[TypeRef], args: &[Expr], span: Span) -> Result<Node> {
        let type_args = type_args.iter().map(|t| self.runtime_type(t)).collect::<Result<Vec<_>>>()?;
        match callee {
            Expr::Name(ident) => {
                if let Some((depth, slot)) = self.lookup_local(&ident.name) {
                    let args = self.generate_args(args)?;
                    return Ok(Node::Invoke { callee: Box::new(Node::Local { depth, slot }), args });
                }
                let owner = self.compilation.method(self.method).containing_type;
                match self.static_call(owner, &ident.name, args, span)? {
                    Some(node) => Ok(node),
                    None => Err(Error::UndefinedVariable { name: ident.name.clone(), span: ident.span }),
                }
            }

            Expr::Member { target, name, .. } => {
                if let Some(path) = self.static_path(target) {
                    let namespace = self.namespace.clone();
                    if let Some(id) = self.compilation.resolve_type(&path, namespace.as_deref(), &self.usings) {
                        return self.static_call(id, &name.name, args, span)?.ok_or_else(|| Error::UnknownMember {
                            ty: self.compilation.type_symbol(id).full_name(),
                            member: name.name.clone(),
                            span: name.span,
                        });
                    }
                    if self.builtins.is_builtin_type(&path) {
                        return self.builtin_call(&path, &name.name, type_args, args, span, name.span);
                    }
                    if let Some(full) = self.compilation.resolve_library_type(&path, namespace.as_deref(), &self.usings) {
                        return self.native_call(&full, &name.name, type_args, args, span, name.span);
                    }
                    if !path.contains('.') {
                        return Err(Error::UndefinedVariable { name: path, span: target.span() });
                    }
                }
                let target = self.generate_expr(target)?;
                let args = self.generate_args(args)?;
                Ok(Node::Method { target: Box::new(target), name: name.name.clone(), type_args, args })
            }

            Expr::Literal(_) | Expr::NameOf(..) => Err(Error::NotCallable { span: callee.span() }),

            other => {
                let callee = self.generate_expr(other)?;
                let args = self.generate_args(args)?;
                Ok(Node::Invoke { callee: Box::new(callee), args })
            }
        }
    }

    /// Call a method declared in source; `None` when the type has no member by that name
    fn static_call(&mut self, ty: TypeId, name: &str, args: &[Expr], span: Span) -> Result<Option<Node>> {
        let compilation = self.compilation;
        let candidates: Vec<_> = compilation
            .members_named(ty, name)
            .filter(|m| self.fn_ids.contains_key(&m.id))
            .collect();
        let Some(first) = candidates.first() else {
            return Ok(None);
        };
        let Some(target) = candidates.iter().find(|m| m.params.len() == args.len()) else {
            return Err(Error::ArgCountMismatch {
                name: name.to_string(),
                expected: first.params.len(),
                got: args.len(),
                span,
            });
        };
        if !target.is_static {
            return Err(Error::InstanceMemberFromStatic { name: name.to_string(), span });
        }
        let func = self.fn_ids[&target.id];
        let args = self.generate_args(args)?;
        Ok(Some(Node::Call { func, args }))
    }

    fn builtin_call(
        &mut self,
        ty: &str,
        method: &str,
        type_args: Vec<RuntimeType>,
        args: &[Expr],
        span: Span,
        name_span: Span,
    ) -> Result<Node> {
        let builtin = self
            .builtins
            .get(ty, method)
            .cloned()
            .ok_or_else(|| Error::UnknownMember { ty: ty.to_string(), member: method.to_string(), span: name_span })?;
        if !builtin.arity.contains(&args.len()) {
            return Err(Error::ArgCountMismatch {
                name: builtin.name,
                expected: *builtin.arity.start(),
                got: args.len(),
                span,
            });
        }
        if builtin.type_params != type_args.len() {
            return Err(Error::Expected(format!("{} type argument(s) for '{}'", builtin.type_params, builtin.name), span));
        }
        let args = self.generate_args(args)?;
        Ok(Node::Builtin { name: builtin.name, func: builtin.func, type_args, args })
    }

    fn native_call(
        &mut self,
        ty: &str,
        method: &str,
        type_args: Vec<RuntimeType>,
        args: &[Expr],
        span: Span,
        name_span: Span,
    ) -> Result<Node> {
        let compilation = self.compilation;
        let (library, metadata) = compilation
            .references()
            .iter()
            .find_map(|r| r.metadata.find_type(ty).map(|t| (r.metadata.name.clone(), t)))
            .ok_or_else(|| Error::UndefinedType { name: ty.to_string(), span })?;
        let unknown = || Error::UnknownMember { ty: ty.to_string(), member: method.to_string(), span: name_span };
        if matches!(metadata.kind, MetadataKind::Attribute { .. }) {
            return Err(unknown());
        }
        let signature = metadata.method(method).ok_or_else(unknown)?;
        if signature.params != args.len() {
            return Err(Error::ArgCountMismatch {
                name: method.to_string(),
                expected: signature.params,
                got: args.len(),
                span,
            });
        }
        let args = self.generate_args(args)?;
        self.artifact.add_library(&library);
        Ok(Node::Native { library, ty: ty.to_string(), method: method.to_string(), type_args, args })
    }

    fn generate_lambda(&mut self, expr: &Expr, params: &[ast::Ident], body: &LambdaBody) -> Result<Node> {
        self.contexts.push(FnContext::new(None));
        let code = params
            .iter()
            .try_for_each(|p| self.declare(p).map(|_| ()))
            .and_then(|_| match body {
                LambdaBody::Expr(inner) => self.generate_expr(inner).map(LambdaCode::Expr),
                LambdaBody::Block(block) => Ok(LambdaCode::Block(self.generate_block(block))),
            });
        let context = self.contexts.pop();
        let code = code?;

        let body_text = expr
            .innermost_lambda_body()
            .and_then(|inner| self.compilation.sources().slice(inner.span()))
            .map(str::to_string);
        let id = self.artifact.lambdas.len();
        self.artifact.lambdas.push(Lambda {
            params: params.len(),
            frame_size: context.map(|c| c.next_slot).unwrap_or(0),
            body: code,
            body_text,
        });
        Ok(Node::Lambda(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::references::MetadataReference;
    use crate::support;
    use pretty_assertions::assert_eq;

    fn build(source: &str) -> std::result::Result<Artifact, Vec<String>> {
        let compilation = Compilation::create(
            &[("test.pg".to_string(), source.to_string())],
            vec![MetadataReference::in_memory(support::metadata())],
        )
        .unwrap();
        compile(&compilation, "test").map_err(|errors| errors.iter().map(|e| e.render(compilation.sources())).collect())
    }

    fn messages(source: &str) -> Vec<String> {
        build(source).err().unwrap_or_default()
    }

    #[test]
    fn test_generate_functions_and_lambdas() {
        let artifact = build(
            "namespace N; static class A {
                static int Twice(int x) { var f = (int y) => y * 2; return f(x); }
                static string Label() => \"x\";
            }",
        )
        .unwrap();
        assert_eq!(artifact.functions.len(), 2);
        let twice = artifact.find_method("N.A", "Twice").unwrap();
        assert_eq!(artifact.functions[twice].frame_size, 2);
        assert_eq!(artifact.lambdas.len(), 1);
        assert_eq!(artifact.lambdas[0].body_text.as_deref(), Some("y * 2"));
    }

    #[test]
    fn test_nested_lambda_records_innermost_body() {
        let artifact = build("class A { static object F() => (int k) => () => k + 1; }").unwrap();
        let outer = artifact.lambdas.iter().find(|l| l.params == 1).unwrap();
        assert_eq!(outer.body_text.as_deref(), Some("k + 1"));
    }

    #[test]
    fn test_literal_return_mismatch() {
        let errors = messages("class A { static int F() { return \"text\"; } }");
        assert_eq!(errors, vec!["test.pg:1:35: Type mismatch: expected int, got string".to_string()]);
        assert!(build("class A { static double F() => 1; static string G() => null; }").is_ok());
    }

    #[test]
    fn test_missing_partial_implementation() {
        let errors = messages("partial class A { public partial int Get(int k); }");
        assert_eq!(errors, vec!["test.pg:1:38: Partial method 'Get' must have an implementation part".to_string()]);
    }

    #[test]
    fn test_duplicate_case_label() {
        let errors = messages(
            "class A { static int F(int k) { switch (k) { case 1: return 1; case 1: return 2; default: return 0; } } }",
        );
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("multiple cases with the label value '1'"));
    }

    #[test]
    fn test_unresolved_names() {
        let errors = messages("class A { static int F() { return Missing(1) + y; } }");
        assert_eq!(
            errors,
            vec!["test.pg:1:35: The name 'Missing' does not exist in the current context".to_string()]
        );
        let errors = messages("class A { static int F() { return y; } }");
        assert!(errors[0].contains("The name 'y' does not exist"));
    }

    #[test]
    fn test_call_checks() {
        let errors = messages("class A { static int G(int a) => a; static int F() => G(1, 2); }");
        assert!(errors[0].contains("expected 1, got 2"));
        let errors = messages("class A { int G() => 1; static int F() => G(); }");
        assert!(errors[0].contains("non-static member 'G'"));
        let errors = messages("class A { static int F() => Math.Nope(1); }");
        assert!(errors[0].contains("'Math' does not contain a definition for 'Nope'"));
    }

    #[test]
    fn test_library_calls_bind_against_metadata() {
        let artifact = build(
            "using Pregen.Support; class A { static object F() => Generate.Method(); static object G() => Integer.Range(1, 3); }",
        )
        .unwrap();
        assert_eq!(artifact.libraries, vec!["Pregen.Support".to_string()]);
        let errors = messages("using Pregen.Support; class A { static object F() => Generate.Method(1); }");
        assert!(errors[0].contains("expected 0, got 1"));
    }

    #[test]
    fn test_attribute_errors() {
        let errors = messages("class A { [Unknown] static int F() => 1; }");
        assert!(errors[0].contains("Attribute type 'Unknown' could not be found"));
        let errors = messages("using Pregen.Support; class A { [SwitchCase(F())] static int F() => 1; }");
        assert!(errors[0].contains("must be a constant expression"));
    }

    #[test]
    fn test_break_outside_loop() {
        let errors = messages("class A { static void F() { break; } }");
        assert!(errors[0].contains("No enclosing loop"));
    }
}
