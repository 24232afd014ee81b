//! Abstract Syntax Tree definitions for the host language

use crate::utils::Span;
use std::fmt;

/// A parsed source file
#[derive(Debug, Clone)]
pub struct CompilationUnit {
    pub usings: Vec<QualifiedName>,
    pub types: Vec<TypeDecl>,
}

/// Dotted name such as `Pregen.Support`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedName {
    pub parts: Vec<String>,
    pub span: Span,
}

impl QualifiedName {
    /// The last segment
    pub fn simple(&self) -> &str {
        self.parts.last().map(String::as_str).unwrap_or("")
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.parts.join("."))
    }
}

/// Declared accessibility
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accessibility {
    Public,
    Private,
    Protected,
    Internal,
    ProtectedInternal,
    PrivateProtected,
}

/// Modifier list of a type or member
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub accessibility: Option<Accessibility>,
    pub is_static: bool,
    pub is_partial: bool,
    pub is_readonly: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Class,
    Struct,
    Interface,
    Enum,
}

/// Type declaration
#[derive(Debug, Clone)]
pub struct TypeDecl {
    /// Enclosing namespace, if any
    pub namespace: Option<String>,
    pub attributes: Vec<Attribute>,
    pub modifiers: Modifiers,
    pub kind: TypeKind,
    pub name: Ident,
    pub methods: Vec<MethodDecl>,
    /// Enum members (enums only)
    pub members: Vec<Ident>,
    pub span: Span,
}

/// Method declaration
#[derive(Debug, Clone)]
pub struct MethodDecl {
    pub attributes: Vec<Attribute>,
    pub modifiers: Modifiers,
    pub ret_type: TypeRef,
    pub name: Ident,
    pub params: Vec<Param>,
    /// None for a partial definition without a body
    pub body: Option<MethodBody>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum MethodBody {
    /// `=> expr;`
    Expr(Expr),
    /// `{ ... }`
    Block(Block),
}

/// Method parameter
#[derive(Debug, Clone)]
pub struct Param {
    pub ty: TypeRef,
    pub name: Ident,
    pub span: Span,
}

/// `[Name(args)]`
#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: QualifiedName,
    pub args: Vec<AttributeArg>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct AttributeArg {
    /// `name:` prefix of a named argument
    pub name: Option<Ident>,
    pub value: Expr,
    pub span: Span,
}

/// Type as written in source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRef {
    pub name: String,
    pub args: Vec<TypeRef>,
    /// Number of `[]` suffixes
    pub rank: usize,
    pub span: Span,
}

impl TypeRef {
    pub fn named(name: &str, span: Span) -> Self {
        Self { name: name.to_string(), args: Vec::new(), rank: 0, span }
    }

    pub fn is_void(&self) -> bool {
        self.name == "void" && self.rank == 0
    }

    /// Last segment of the written name
    pub fn simple_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.args.is_empty() {
            let args: Vec<String> = self.args.iter().map(|a| a.to_string()).collect();
            write!(f, "<{}>", args.join(", "))?;
        }
        for _ in 0..self.rank {
            write!(f, "[]")?;
        }
        Ok(())
    }
}

/// Code block
#[derive(Debug, Clone)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

/// Statement
#[derive(Debug, Clone)]
pub enum Stmt {
    Block(Block),
    /// `var x = e;` or `T x = e;`
    Local {
        ty: Option<TypeRef>,
        name: Ident,
        value: Option<Expr>,
        span: Span,
    },
    /// Expression statement
    Expr(Expr),
    Return {
        value: Option<Expr>,
        span: Span,
    },
    If {
        cond: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
        span: Span,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
        span: Span,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        step: Vec<Expr>,
        body: Box<Stmt>,
        span: Span,
    },
    Foreach {
        var: Ident,
        iter: Expr,
        body: Box<Stmt>,
        span: Span,
    },
    Switch {
        subject: Expr,
        sections: Vec<SwitchSection>,
        span: Span,
    },
    Throw {
        value: Expr,
        span: Span,
    },
    Break { span: Span },
    Continue { span: Span },
    /// Empty statement (;)
    Empty { span: Span },
}

/// One `case a: case b: stmts` group
#[derive(Debug, Clone)]
pub struct SwitchSection {
    pub labels: Vec<CaseLabel>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum CaseLabel {
    Case(Expr),
    Default(Span),
}

/// Expression
#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Literal),
    /// Simple name
    Name(Ident),
    /// `default`
    Default(Span),
    /// `target.name`
    Member {
        target: Box<Expr>,
        name: Ident,
        span: Span,
    },
    /// `callee<T>(args)`
    Call {
        callee: Box<Expr>,
        type_args: Vec<TypeRef>,
        args: Vec<Expr>,
        span: Span,
    },
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
        span: Span,
    },
    Unary {
        op: UnOp,
        expr: Box<Expr>,
        span: Span,
    },
    Binary {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
        span: Span,
    },
    /// `target = value` or `target op= value`
    Assign {
        target: Box<Expr>,
        op: Option<BinOp>,
        value: Box<Expr>,
        span: Span,
    },
    /// `++x`, `x--`
    Increment {
        target: Box<Expr>,
        delta: i64,
        prefix: bool,
        span: Span,
    },
    Conditional {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
        span: Span,
    },
    Lambda {
        params: Vec<Ident>,
        body: Box<LambdaBody>,
        span: Span,
    },
    /// `new T[n]`, `new T[] { .. }`, `new[] { .. }`
    NewArray {
        elem: Option<TypeRef>,
        size: Option<Box<Expr>>,
        items: Option<Vec<Expr>>,
        span: Span,
    },
    /// `new T(args)`
    NewObject {
        ty: TypeRef,
        args: Vec<Expr>,
        span: Span,
    },
    NameOf(Ident, Span),
    /// `throw e` used as an expression (lambda bodies, `??`)
    Throw(Box<Expr>, Span),
}

#[derive(Debug, Clone)]
pub enum LambdaBody {
    Expr(Expr),
    Block(Block),
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Literal(lit) => lit.span(),
            Expr::Name(ident) => ident.span,
            Expr::Default(span) | Expr::NameOf(_, span) | Expr::Throw(_, span) => *span,
            Expr::Member { span, .. }
            | Expr::Call { span, .. }
            | Expr::Index { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Binary { span, .. }
            | Expr::Assign { span, .. }
            | Expr::Increment { span, .. }
            | Expr::Conditional { span, .. }
            | Expr::Lambda { span, .. }
            | Expr::NewArray { span, .. }
            | Expr::NewObject { span, .. } => *span,
        }
    }

    /// Unwrap nested lambdas down to the first body that is not itself a lambda.
    /// A block-bodied lambda stops the walk.
    pub fn innermost_lambda_body(&self) -> Option<&Expr> {
        let mut expr = self;
        loop {
            match expr {
                Expr::Lambda { body, .. } => match body.as_ref() {
                    LambdaBody::Expr(inner) => expr = inner,
                    LambdaBody::Block(_) => return None,
                },
                other => return Some(other),
            }
        }
    }
}

/// Literal value
#[derive(Debug, Clone)]
pub enum Literal {
    Int(i64, Span),
    Long(i64, Span),
    Float(f64, Span),
    String(String, Span),
    Char(char, Span),
    Bool(bool, Span),
    Null(Span),
}

impl Literal {
    pub fn span(&self) -> Span {
        match self {
            Literal::Int(_, s) => *s,
            Literal::Long(_, s) => *s,
            Literal::Float(_, s) => *s,
            Literal::String(_, s) => *s,
            Literal::Char(_, s) => *s,
            Literal::Bool(_, s) => *s,
            Literal::Null(s) => *s,
        }
    }

    /// Keyword name of the literal's type
    pub fn type_name(&self) -> &'static str {
        match self {
            Literal::Int(..) => "int",
            Literal::Long(..) => "long",
            Literal::Float(..) => "double",
            Literal::String(..) => "string",
            Literal::Char(..) => "char",
            Literal::Bool(..) => "bool",
            Literal::Null(_) => "null",
        }
    }
}

/// Identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

/// Binary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    // Logical
    And,
    Or,
    Coalesce,
}

/// Unary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    /// Negation (-)
    Neg,
    /// Logical not (!)
    Not,
}
