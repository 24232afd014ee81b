//! Executable artifact
//!
//! Tree-shaped code the arena interprets: every method body is lowered to
//! `Instr` statements over `Node` expressions with locals resolved to frame
//! slots, calls resolved to functions, builtins or library entry points.

use std::fmt;

use crate::frontend::ast::{BinOp, TypeKind, UnOp};
use crate::runtime::value::{RuntimeType, Value};
use crate::stdlib::builtins::BuiltinFn;

pub type FnId = usize;
pub type LambdaId = usize;

/// A compiled build, ready to be loaded into an arena
#[derive(Debug, Clone)]
pub struct Artifact {
    pub name: String,
    pub types: Vec<ArtifactType>,
    pub functions: Vec<Function>,
    pub lambdas: Vec<Lambda>,
    /// Simple names of the libraries the code calls into
    pub libraries: Vec<String>,
}

impl Artifact {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            types: Vec::new(),
            functions: Vec::new(),
            lambdas: Vec::new(),
            libraries: Vec::new(),
        }
    }

    pub fn find_type(&self, full_name: &str) -> Option<&ArtifactType> {
        self.types.iter().find(|t| t.full_name == full_name)
    }

    /// First method of a type with the given name
    pub fn find_method(&self, type_full_name: &str, method: &str) -> Option<FnId> {
        let ty = self.find_type(type_full_name)?;
        ty.methods.iter().copied().find(|id| self.functions[*id].name == method)
    }

    pub fn add_library(&mut self, name: &str) {
        if !self.libraries.iter().any(|l| l == name) {
            self.libraries.push(name.to_string());
        }
    }
}

/// Type as it exists at run time
#[derive(Debug, Clone)]
pub struct ArtifactType {
    pub full_name: String,
    pub kind: TypeKind,
    pub enum_members: Vec<String>,
    pub methods: Vec<FnId>,
}

/// Compiled method
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    /// Full name of the declaring type
    pub owner: String,
    pub params: Vec<RuntimeType>,
    pub ret: RuntimeType,
    pub is_static: bool,
    /// Slots needed for parameters and locals
    pub frame_size: usize,
    pub body: Vec<Instr>,
}

impl Function {
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.owner, self.name)
    }
}

/// Compiled lambda
#[derive(Debug, Clone)]
pub struct Lambda {
    pub params: usize,
    pub frame_size: usize,
    pub body: LambdaCode,
    /// Source text of the innermost expression body
    pub body_text: Option<String>,
}

#[derive(Debug, Clone)]
pub enum LambdaCode {
    Expr(Node),
    Block(Vec<Instr>),
}

/// Statement
#[derive(Debug, Clone)]
pub enum Instr {
    Expr(Node),
    /// Initialize a local slot in the current frame
    Store { slot: usize, value: Node },
    Return(Option<Node>),
    If { cond: Node, then_branch: Vec<Instr>, else_branch: Vec<Instr> },
    While { cond: Node, body: Vec<Instr> },
    /// `for`; the initializer is lowered in front of it
    For { cond: Option<Node>, step: Vec<Node>, body: Vec<Instr> },
    Foreach { slot: usize, iter: Node, body: Vec<Instr> },
    Switch { subject: Node, arms: Vec<SwitchArm> },
    Throw(Node),
    Break,
    Continue,
    Block(Vec<Instr>),
}

#[derive(Debug, Clone)]
pub struct SwitchArm {
    pub labels: Vec<Value>,
    pub is_default: bool,
    pub body: Vec<Instr>,
}

/// Assignable location
#[derive(Debug, Clone)]
pub enum Place {
    Local { depth: usize, slot: usize },
    Index { target: Box<Node>, index: Box<Node> },
}

/// Expression
#[derive(Debug, Clone)]
pub enum Node {
    Const(Value),
    /// Slot `slot` of the frame `depth` levels out
    Local { depth: usize, slot: usize },
    Assign { target: Place, op: Option<BinOp>, value: Box<Node> },
    Increment { target: Place, delta: i64, prefix: bool },
    /// Call a compiled method
    Call { func: FnId, args: Vec<Node> },
    /// Call a static method exported by a loaded library
    Native { library: String, ty: String, method: String, type_args: Vec<RuntimeType>, args: Vec<Node> },
    /// Call a static method of the built-in library
    Builtin { name: String, func: BuiltinFn, type_args: Vec<RuntimeType>, args: Vec<Node> },
    /// Instance method, dispatched on the receiver's value
    Method { target: Box<Node>, name: String, type_args: Vec<RuntimeType>, args: Vec<Node> },
    /// Call a delegate
    Invoke { callee: Box<Node>, args: Vec<Node> },
    Property { target: Box<Node>, name: String },
    Index { target: Box<Node>, index: Box<Node> },
    Unary { op: UnOp, expr: Box<Node> },
    /// `&&`, `||` and `??` evaluate their right side lazily
    Binary { op: BinOp, left: Box<Node>, right: Box<Node> },
    Conditional { cond: Box<Node>, then_node: Box<Node>, else_node: Box<Node> },
    Lambda(LambdaId),
    NewArray { elem: RuntimeType, size: Box<Node> },
    ArrayLit { items: Vec<Node> },
    NewException { type_name: String, args: Vec<Node> },
    Throw(Box<Node>),
    Convert { value: Box<Node>, ty: RuntimeType },
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; artifact {}", self.name)?;
        for ty in &self.types {
            writeln!(f, "type {} ({:?})", ty.full_name, ty.kind)?;
            for id in &ty.methods {
                let func = &self.functions[*id];
                let params: Vec<String> = func.params.iter().map(|p| p.to_string()).collect();
                writeln!(
                    f,
                    "  fn #{} {}({}) -> {} [{} slots, {} stmts]",
                    id,
                    func.name,
                    params.join(", "),
                    func.ret,
                    func.frame_size,
                    func.body.len()
                )?;
            }
        }
        for (id, lambda) in self.lambdas.iter().enumerate() {
            writeln!(f, "lambda #{} ({} params): {}", id, lambda.params, lambda.body_text.as_deref().unwrap_or("{ .. }"))?;
        }
        Ok(())
    }
}
