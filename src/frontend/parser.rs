//! Parser for the host language
//!
//! Recursive descent parser with precedence climbing for binary expressions.

use crate::frontend::ast::*;
use crate::frontend::lexer::Lexer;
use crate::frontend::token::{Token, TokenKind};
use crate::utils::{Error, Result, Span};

/// The parser
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    /// Create a new parser from a lexer
    pub fn new(mut lexer: Lexer) -> Result<Self> {
        Ok(Self {
            tokens: lexer.tokenize()?,
            pos: 0,
        })
    }

    // ==================== Helper Methods ====================

    fn current(&self) -> &Token {
        // tokenize() always ends with Eof and advance() never moves past it
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn current_kind(&self) -> &TokenKind {
        &self.current().kind
    }

    fn peek_kind(&self, n: usize) -> &TokenKind {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.pos + n).min(last)].kind
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn prev_span(&self) -> Span {
        self.tokens[self.pos.saturating_sub(1)].span
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(self.current_kind()) == std::mem::discriminant(kind)
    }

    fn is_at_end(&self) -> bool {
        matches!(self.current_kind(), TokenKind::Eof)
    }

    fn expect(&mut self, expected: TokenKind) -> Result<Token> {
        if self.check(&expected) {
            Ok(self.advance())
        } else {
            Err(Error::UnexpectedToken {
                expected: expected.to_string(),
                got: self.current_kind().to_string(),
                span: self.current().span,
            })
        }
    }

    fn consume(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Run `f`, rewinding to the starting token if it fails
    fn try_parse<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Option<T> {
        let save = self.pos;
        match f(self) {
            Ok(value) => Some(value),
            Err(_) => {
                self.pos = save;
                None
            }
        }
    }

    // ==================== Declarations ====================

    /// Parse a complete source file
    pub fn parse_unit(&mut self) -> Result<CompilationUnit> {
        let mut usings = Vec::new();
        let mut types = Vec::new();
        let mut file_namespace: Option<String> = None;

        while !self.is_at_end() {
            match self.current_kind() {
                TokenKind::Using => usings.push(self.parse_using()?),
                TokenKind::Namespace => {
                    self.advance();
                    let name = self.parse_qualified_name()?.to_string();
                    if self.consume(&TokenKind::Semicolon) {
                        file_namespace = Some(name);
                    } else {
                        self.parse_namespace_block(&name, &mut types)?;
                    }
                }
                _ => types.push(self.parse_type_decl(file_namespace.clone())?),
            }
        }

        Ok(CompilationUnit { usings, types })
    }

    fn parse_using(&mut self) -> Result<QualifiedName> {
        self.expect(TokenKind::Using)?;
        let name = self.parse_qualified_name()?;
        self.expect(TokenKind::Semicolon)?;
        Ok(name)
    }

    /// `{ type_decl* }` after `namespace X`
    fn parse_namespace_block(&mut self, namespace: &str, types: &mut Vec<TypeDecl>) -> Result<()> {
        self.expect(TokenKind::LBrace)?;
        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            if self.consume(&TokenKind::Namespace) {
                let inner = self.parse_qualified_name()?;
                self.parse_namespace_block(&format!("{}.{}", namespace, inner), types)?;
            } else {
                types.push(self.parse_type_decl(Some(namespace.to_string()))?);
            }
        }
        self.expect(TokenKind::RBrace)?;
        Ok(())
    }

    fn parse_qualified_name(&mut self) -> Result<QualifiedName> {
        let first = self.parse_ident()?;
        let mut span = first.span;
        let mut parts = vec![first.name];
        while self.check(&TokenKind::Dot) && matches!(self.peek_kind(1), TokenKind::Ident(_)) {
            self.advance();
            let part = self.parse_ident()?;
            span = span.merge(&part.span);
            parts.push(part.name);
        }
        Ok(QualifiedName { parts, span })
    }

    fn parse_ident(&mut self) -> Result<Ident> {
        let token = self.current().clone();
        if let TokenKind::Ident(name) = token.kind {
            self.advance();
            Ok(Ident { name, span: token.span })
        } else {
            Err(Error::ExpectedIdent { span: token.span })
        }
    }

    fn parse_modifiers(&mut self) -> Modifiers {
        let mut modifiers = Modifiers::default();
        let (mut public, mut private, mut protected, mut internal) = (false, false, false, false);
        while self.current_kind().is_modifier() {
            match self.advance().kind {
                TokenKind::Public => public = true,
                TokenKind::Private => private = true,
                TokenKind::Protected => protected = true,
                TokenKind::Internal => internal = true,
                TokenKind::Static => modifiers.is_static = true,
                TokenKind::Partial => modifiers.is_partial = true,
                TokenKind::Readonly => modifiers.is_readonly = true,
                _ => {}
            }
        }
        modifiers.accessibility = match (public, private, protected, internal) {
            (true, _, _, _) => Some(Accessibility::Public),
            (_, _, true, true) => Some(Accessibility::ProtectedInternal),
            (_, true, true, _) => Some(Accessibility::PrivateProtected),
            (_, true, _, _) => Some(Accessibility::Private),
            (_, _, true, _) => Some(Accessibility::Protected),
            (_, _, _, true) => Some(Accessibility::Internal),
            _ => None,
        };
        modifiers
    }

    fn parse_attributes(&mut self) -> Result<Vec<Attribute>> {
        let mut attributes = Vec::new();
        while self.consume(&TokenKind::LBracket) {
            loop {
                let name = self.parse_qualified_name()?;
                let mut args = Vec::new();
                if self.consume(&TokenKind::LParen) {
                    while !self.check(&TokenKind::RParen) {
                        args.push(self.parse_attribute_arg()?);
                        if !self.consume(&TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(TokenKind::RParen)?;
                }
                let span = name.span.merge(&self.prev_span());
                attributes.push(Attribute { name, args, span });
                if !self.consume(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RBracket)?;
        }
        Ok(attributes)
    }

    fn parse_attribute_arg(&mut self) -> Result<AttributeArg> {
        let start = self.current().span;
        let name = if matches!(self.current_kind(), TokenKind::Ident(_))
            && matches!(self.peek_kind(1), TokenKind::Colon)
        {
            let name = self.parse_ident()?;
            self.advance();
            Some(name)
        } else {
            None
        };
        let value = self.parse_expr()?;
        Ok(AttributeArg { name, span: start.merge(&value.span()), value })
    }

    fn parse_type_decl(&mut self, namespace: Option<String>) -> Result<TypeDecl> {
        let start = self.current().span;
        let attributes = self.parse_attributes()?;
        let modifiers = self.parse_modifiers();

        let kind = match self.current_kind() {
            TokenKind::Class => TypeKind::Class,
            TokenKind::Struct => TypeKind::Struct,
            TokenKind::Interface => TypeKind::Interface,
            TokenKind::Enum => TypeKind::Enum,
            other => {
                return Err(Error::UnexpectedToken {
                    expected: "type declaration (class, struct, interface, enum)".to_string(),
                    got: other.to_string(),
                    span: self.current().span,
                })
            }
        };
        self.advance();
        let name = self.parse_ident()?;
        self.expect(TokenKind::LBrace)?;

        let mut methods = Vec::new();
        let mut members = Vec::new();
        if kind == TypeKind::Enum {
            while !self.check(&TokenKind::RBrace) {
                members.push(self.parse_ident()?);
                if !self.consume(&TokenKind::Comma) {
                    break;
                }
            }
        } else {
            while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
                methods.push(self.parse_method()?);
            }
        }
        self.expect(TokenKind::RBrace)?;
        self.consume(&TokenKind::Semicolon);

        Ok(TypeDecl {
            namespace,
            attributes,
            modifiers,
            kind,
            name,
            methods,
            members,
            span: start.merge(&self.prev_span()),
        })
    }

    fn parse_method(&mut self) -> Result<MethodDecl> {
        let start = self.current().span;
        let attributes = self.parse_attributes()?;
        let modifiers = self.parse_modifiers();
        let ret_type = self.parse_type()?;
        let name = self.parse_ident()?;

        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        while !self.check(&TokenKind::RParen) {
            let ty = self.parse_type()?;
            let name = self.parse_ident()?;
            params.push(Param { span: ty.span.merge(&name.span), ty, name });
            if !self.consume(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;

        let body = if self.consume(&TokenKind::Semicolon) {
            None
        } else if self.consume(&TokenKind::FatArrow) {
            let expr = self.parse_expr()?;
            self.expect(TokenKind::Semicolon)?;
            Some(MethodBody::Expr(expr))
        } else {
            Some(MethodBody::Block(self.parse_block()?))
        };

        Ok(MethodDecl {
            attributes,
            modifiers,
            ret_type,
            name,
            params,
            body,
            span: start.merge(&self.prev_span()),
        })
    }

    /// Parse a type such as `int`, `Func<int, string>` or `int[]`
    fn parse_type(&mut self) -> Result<TypeRef> {
        let start = self.current().span;
        let first = match self.current_kind() {
            TokenKind::Ident(name) => name.clone(),
            _ => return Err(Error::ExpectedType { span: start }),
        };
        self.advance();

        let mut name = first;
        while self.check(&TokenKind::Dot) && matches!(self.peek_kind(1), TokenKind::Ident(_)) {
            self.advance();
            name.push('.');
            name.push_str(&self.parse_ident()?.name);
        }

        let mut args = Vec::new();
        if self.consume(&TokenKind::Lt) {
            loop {
                args.push(self.parse_type()?);
                if !self.consume(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::Gt)?;
        }

        let mut rank = 0;
        while self.check(&TokenKind::LBracket) && matches!(self.peek_kind(1), TokenKind::RBracket) {
            self.advance();
            self.advance();
            rank += 1;
        }

        Ok(TypeRef { name, args, rank, span: start.merge(&self.prev_span()) })
    }

    // ==================== Statements ====================

    fn parse_block(&mut self) -> Result<Block> {
        let start = self.expect(TokenKind::LBrace)?.span;
        let mut stmts = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            stmts.push(self.parse_stmt()?);
        }
        self.expect(TokenKind::RBrace)?;
        Ok(Block { stmts, span: start.merge(&self.prev_span()) })
    }

    fn parse_stmt(&mut self) -> Result<Stmt> {
        let start = self.current().span;
        match self.current_kind() {
            TokenKind::LBrace => Ok(Stmt::Block(self.parse_block()?)),
            TokenKind::Semicolon => {
                self.advance();
                Ok(Stmt::Empty { span: start })
            }
            TokenKind::Return => {
                self.advance();
                let value = if self.check(&TokenKind::Semicolon) { None } else { Some(self.parse_expr()?) };
                self.expect(TokenKind::Semicolon)?;
                Ok(Stmt::Return { value, span: start.merge(&self.prev_span()) })
            }
            TokenKind::If => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let cond = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                let then_branch = Box::new(self.parse_stmt()?);
                let else_branch = if self.consume(&TokenKind::Else) {
                    Some(Box::new(self.parse_stmt()?))
                } else {
                    None
                };
                Ok(Stmt::If { cond, then_branch, else_branch, span: start.merge(&self.prev_span()) })
            }
            TokenKind::While => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let cond = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                let body = Box::new(self.parse_stmt()?);
                Ok(Stmt::While { cond, body, span: start.merge(&self.prev_span()) })
            }
            TokenKind::For => self.parse_for(),
            TokenKind::Foreach => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                if !self.consume(&TokenKind::Var) {
                    self.parse_type()?;
                }
                let var = self.parse_ident()?;
                self.expect(TokenKind::In)?;
                let iter = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                let body = Box::new(self.parse_stmt()?);
                Ok(Stmt::Foreach { var, iter, body, span: start.merge(&self.prev_span()) })
            }
            TokenKind::Switch => self.parse_switch(),
            TokenKind::Throw => {
                self.advance();
                let value = self.parse_expr()?;
                self.expect(TokenKind::Semicolon)?;
                Ok(Stmt::Throw { value, span: start.merge(&self.prev_span()) })
            }
            TokenKind::Break => {
                self.advance();
                self.expect(TokenKind::Semicolon)?;
                Ok(Stmt::Break { span: start })
            }
            TokenKind::Continue => {
                self.advance();
                self.expect(TokenKind::Semicolon)?;
                Ok(Stmt::Continue { span: start })
            }
            _ => {
                let stmt = self.parse_simple_stmt()?;
                self.expect(TokenKind::Semicolon)?;
                Ok(stmt)
            }
        }
    }

    /// Local declaration or expression, without the trailing `;`
    fn parse_simple_stmt(&mut self) -> Result<Stmt> {
        let start = self.current().span;
        let ty = if self.consume(&TokenKind::Var) {
            Some(None)
        } else if self.looks_like_local_decl() {
            Some(Some(self.parse_type()?))
        } else {
            None
        };

        match ty {
            Some(ty) => {
                let name = self.parse_ident()?;
                let value = if self.consume(&TokenKind::Eq) { Some(self.parse_expr()?) } else { None };
                Ok(Stmt::Local { ty, name, value, span: start.merge(&self.prev_span()) })
            }
            None => Ok(Stmt::Expr(self.parse_expr()?)),
        }
    }

    /// `Type name =` or `Type name;`
    fn looks_like_local_decl(&mut self) -> bool {
        let save = self.pos;
        let result = self.parse_type().is_ok()
            && matches!(self.current_kind(), TokenKind::Ident(_))
            && matches!(self.peek_kind(1), TokenKind::Eq | TokenKind::Semicolon);
        self.pos = save;
        result
    }

    fn parse_for(&mut self) -> Result<Stmt> {
        let start = self.expect(TokenKind::For)?.span;
        self.expect(TokenKind::LParen)?;
        let init = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(Box::new(self.parse_simple_stmt()?))
        };
        self.expect(TokenKind::Semicolon)?;
        let cond = if self.check(&TokenKind::Semicolon) { None } else { Some(self.parse_expr()?) };
        self.expect(TokenKind::Semicolon)?;
        let mut step = Vec::new();
        while !self.check(&TokenKind::RParen) {
            step.push(self.parse_expr()?);
            if !self.consume(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        let body = Box::new(self.parse_stmt()?);
        Ok(Stmt::For { init, cond, step, body, span: start.merge(&self.prev_span()) })
    }

    fn is_default_label(&self) -> bool {
        self.check(&TokenKind::Default) && matches!(self.peek_kind(1), TokenKind::Colon)
    }

    fn parse_switch(&mut self) -> Result<Stmt> {
        let start = self.expect(TokenKind::Switch)?.span;
        self.expect(TokenKind::LParen)?;
        let subject = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::LBrace)?;

        let mut sections = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            let section_start = self.current().span;
            let mut labels = Vec::new();
            loop {
                if self.consume(&TokenKind::Case) {
                    let value = self.parse_expr()?;
                    self.expect(TokenKind::Colon)?;
                    labels.push(CaseLabel::Case(value));
                } else if self.is_default_label() {
                    let span = self.advance().span;
                    self.advance();
                    labels.push(CaseLabel::Default(span));
                } else {
                    break;
                }
            }
            if labels.is_empty() {
                return Err(Error::Expected("'case' or 'default' label".to_string(), self.current().span));
            }

            let mut body = Vec::new();
            while !self.check(&TokenKind::Case)
                && !self.is_default_label()
                && !self.check(&TokenKind::RBrace)
                && !self.is_at_end()
            {
                body.push(self.parse_stmt()?);
            }
            sections.push(SwitchSection { labels, body, span: section_start.merge(&self.prev_span()) });
        }
        self.expect(TokenKind::RBrace)?;
        Ok(Stmt::Switch { subject, sections, span: start.merge(&self.prev_span()) })
    }

    // ==================== Expressions ====================

    pub fn parse_expr(&mut self) -> Result<Expr> {
        if self.is_lambda_start() {
            return self.parse_lambda();
        }
        if self.check(&TokenKind::Throw) {
            let start = self.advance().span;
            let value = self.parse_expr()?;
            let span = start.merge(&value.span());
            return Ok(Expr::Throw(Box::new(value), span));
        }

        let target = self.parse_conditional()?;
        let op = match self.current_kind() {
            TokenKind::Eq => None,
            TokenKind::PlusEq => Some(BinOp::Add),
            TokenKind::MinusEq => Some(BinOp::Sub),
            TokenKind::StarEq => Some(BinOp::Mul),
            TokenKind::SlashEq => Some(BinOp::Div),
            TokenKind::PercentEq => Some(BinOp::Mod),
            _ => return Ok(target),
        };
        self.advance();
        let value = self.parse_expr()?;
        let span = target.span().merge(&value.span());
        Ok(Expr::Assign { target: Box::new(target), op, value: Box::new(value), span })
    }

    /// `x =>`, `() =>` or `(a, b) =>`
    fn is_lambda_start(&self) -> bool {
        match self.current_kind() {
            TokenKind::Ident(_) => matches!(self.peek_kind(1), TokenKind::FatArrow),
            TokenKind::LParen => {
                let mut n = 1;
                loop {
                    match self.peek_kind(n) {
                        TokenKind::RParen => return matches!(self.peek_kind(n + 1), TokenKind::FatArrow),
                        TokenKind::Ident(_) => {}
                        TokenKind::Comma if n > 1 => {}
                        _ => return false,
                    }
                    n += 1;
                }
            }
            _ => false,
        }
    }

    fn parse_lambda(&mut self) -> Result<Expr> {
        let start = self.current().span;
        let mut params = Vec::new();
        if self.consume(&TokenKind::LParen) {
            while !self.check(&TokenKind::RParen) {
                let mut param = self.parse_ident()?;
                // `(int x) =>`: keep the name, drop the written type
                if matches!(self.current_kind(), TokenKind::Ident(_)) {
                    param = self.parse_ident()?;
                }
                params.push(param);
                if !self.consume(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RParen)?;
        } else {
            params.push(self.parse_ident()?);
        }
        self.expect(TokenKind::FatArrow)?;

        let body = if self.check(&TokenKind::LBrace) {
            LambdaBody::Block(self.parse_block()?)
        } else {
            LambdaBody::Expr(self.parse_expr()?)
        };
        Ok(Expr::Lambda { params, body: Box::new(body), span: start.merge(&self.prev_span()) })
    }

    fn parse_conditional(&mut self) -> Result<Expr> {
        let cond = self.parse_expr_bp(1)?;
        if !self.consume(&TokenKind::Question) {
            return Ok(cond);
        }
        let then_expr = self.parse_expr()?;
        self.expect(TokenKind::Colon)?;
        let else_expr = self.parse_expr()?;
        let span = cond.span().merge(&else_expr.span());
        Ok(Expr::Conditional {
            cond: Box::new(cond),
            then_expr: Box::new(then_expr),
            else_expr: Box::new(else_expr),
            span,
        })
    }

    /// Parse binary expression with binding power
    fn parse_expr_bp(&mut self, min_bp: u8) -> Result<Expr> {
        let mut left = self.parse_unary()?;

        loop {
            let op_token = self.current().clone();
            let Some(bp) = op_token.kind.binary_precedence() else {
                break;
            };
            if bp < min_bp {
                break;
            }

            self.advance();
            let op = Self::token_to_binop(&op_token)?;
            let right = self.parse_expr_bp(bp + 1)?;
            let span = left.span().merge(&right.span());

            left = Expr::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
                span,
            };
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let start = self.current().span;
        match self.current_kind() {
            TokenKind::Minus | TokenKind::Not => {
                let op = if self.advance().kind == TokenKind::Minus { UnOp::Neg } else { UnOp::Not };
                let expr = self.parse_unary()?;
                let span = start.merge(&expr.span());
                Ok(Expr::Unary { op, expr: Box::new(expr), span })
            }
            TokenKind::PlusPlus | TokenKind::MinusMinus => {
                let delta = if self.advance().kind == TokenKind::PlusPlus { 1 } else { -1 };
                let target = self.parse_unary()?;
                let span = start.merge(&target.span());
                Ok(Expr::Increment { target: Box::new(target), delta, prefix: true, span })
            }
            _ => {
                let primary = self.parse_primary()?;
                self.parse_postfix(primary)
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let token = self.current().clone();
        let span = token.span;
        let expr = match token.kind {
            TokenKind::IntLit(v) => Expr::Literal(Literal::Int(v, span)),
            TokenKind::LongLit(v) => Expr::Literal(Literal::Long(v, span)),
            TokenKind::FloatLit(v) => Expr::Literal(Literal::Float(v, span)),
            TokenKind::StringLit(s) => Expr::Literal(Literal::String(s, span)),
            TokenKind::CharLit(c) => Expr::Literal(Literal::Char(c, span)),
            TokenKind::True => Expr::Literal(Literal::Bool(true, span)),
            TokenKind::False => Expr::Literal(Literal::Bool(false, span)),
            TokenKind::Null => Expr::Literal(Literal::Null(span)),
            TokenKind::Default => Expr::Default(span),
            TokenKind::Ident(name) => Expr::Name(Ident { name, span }),
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                return Ok(inner);
            }
            TokenKind::New => return self.parse_new(),
            TokenKind::Nameof => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let name = self.parse_qualified_name()?;
                self.expect(TokenKind::RParen)?;
                let ident = Ident { name: name.simple().to_string(), span: name.span };
                return Ok(Expr::NameOf(ident, span.merge(&self.prev_span())));
            }
            _ => return Err(Error::ExpectedExpr { span }),
        };
        self.advance();
        Ok(expr)
    }

    fn parse_postfix(&mut self, mut expr: Expr) -> Result<Expr> {
        let mut type_args = Vec::new();
        loop {
            match self.current_kind() {
                TokenKind::Dot => {
                    self.advance();
                    let name = self.parse_ident()?;
                    let span = expr.span().merge(&name.span);
                    expr = Expr::Member { target: Box::new(expr), name, span };
                }
                TokenKind::Lt if matches!(expr, Expr::Name(_) | Expr::Member { .. }) && type_args.is_empty() => {
                    match self.try_parse(Self::parse_call_type_args) {
                        Some(args) => type_args = args,
                        None => break,
                    }
                }
                TokenKind::LParen => {
                    self.advance();
                    let mut args = Vec::new();
                    while !self.check(&TokenKind::RParen) {
                        args.push(self.parse_expr()?);
                        if !self.consume(&TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(TokenKind::RParen)?;
                    let span = expr.span().merge(&self.prev_span());
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        type_args: std::mem::take(&mut type_args),
                        args,
                        span,
                    };
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_expr()?;
                    self.expect(TokenKind::RBracket)?;
                    let span = expr.span().merge(&self.prev_span());
                    expr = Expr::Index { target: Box::new(expr), index: Box::new(index), span };
                }
                TokenKind::PlusPlus | TokenKind::MinusMinus => {
                    let delta = if self.advance().kind == TokenKind::PlusPlus { 1 } else { -1 };
                    let span = expr.span().merge(&self.prev_span());
                    expr = Expr::Increment { target: Box::new(expr), delta, prefix: false, span };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    /// `<T, U>` directly followed by `(`
    fn parse_call_type_args(&mut self) -> Result<Vec<TypeRef>> {
        self.expect(TokenKind::Lt)?;
        let mut args = Vec::new();
        loop {
            args.push(self.parse_type()?);
            if !self.consume(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::Gt)?;
        if !self.check(&TokenKind::LParen) {
            return Err(Error::Expected("'('".to_string(), self.current().span));
        }
        Ok(args)
    }

    fn parse_new(&mut self) -> Result<Expr> {
        let start = self.expect(TokenKind::New)?.span;

        if self.consume(&TokenKind::LBracket) {
            self.expect(TokenKind::RBracket)?;
            let items = self.parse_array_items()?;
            return Ok(Expr::NewArray { elem: None, size: None, items: Some(items), span: start.merge(&self.prev_span()) });
        }

        let ty = self.parse_type()?;
        if self.consume(&TokenKind::LParen) {
            let mut args = Vec::new();
            while !self.check(&TokenKind::RParen) {
                args.push(self.parse_expr()?);
                if !self.consume(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RParen)?;
            return Ok(Expr::NewObject { ty, args, span: start.merge(&self.prev_span()) });
        }

        if ty.rank > 0 {
            let elem = TypeRef { rank: ty.rank - 1, ..ty };
            let items = self.parse_array_items()?;
            return Ok(Expr::NewArray { elem: Some(elem), size: None, items: Some(items), span: start.merge(&self.prev_span()) });
        }

        self.expect(TokenKind::LBracket)?;
        let size = self.parse_expr()?;
        self.expect(TokenKind::RBracket)?;
        let items = if self.check(&TokenKind::LBrace) { Some(self.parse_array_items()?) } else { None };
        Ok(Expr::NewArray {
            elem: Some(ty),
            size: Some(Box::new(size)),
            items,
            span: start.merge(&self.prev_span()),
        })
    }

    fn parse_array_items(&mut self) -> Result<Vec<Expr>> {
        self.expect(TokenKind::LBrace)?;
        let mut items = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            items.push(self.parse_expr()?);
            if !self.consume(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBrace)?;
        Ok(items)
    }

    fn token_to_binop(token: &Token) -> Result<BinOp> {
        Ok(match token.kind {
            TokenKind::Plus => BinOp::Add,
            TokenKind::Minus => BinOp::Sub,
            TokenKind::Star => BinOp::Mul,
            TokenKind::Slash => BinOp::Div,
            TokenKind::Percent => BinOp::Mod,
            TokenKind::EqEq => BinOp::Eq,
            TokenKind::Ne => BinOp::Ne,
            TokenKind::Lt => BinOp::Lt,
            TokenKind::Le => BinOp::Le,
            TokenKind::Gt => BinOp::Gt,
            TokenKind::Ge => BinOp::Ge,
            TokenKind::AndAnd => BinOp::And,
            TokenKind::OrOr => BinOp::Or,
            TokenKind::QuestionQuestion => BinOp::Coalesce,
            _ => return Err(Error::Expected("binary operator".to_string(), token.span)),
        })
    }
}

/// Parse one source file
pub fn parse_source(source: &str, file_id: usize) -> Result<CompilationUnit> {
    Parser::new(Lexer::new(source, file_id))?.parse_unit()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(source: &str) -> CompilationUnit {
        parse_source(source, 0).unwrap()
    }

    fn method_body_expr(unit: &CompilationUnit, method: usize) -> &Expr {
        match unit.types[0].methods[method].body.as_ref() {
            Some(MethodBody::Expr(expr)) => expr,
            other => panic!("expected expression body, got {:?}", other),
        }
    }

    #[test]
    fn test_file_scoped_namespace_and_stub() {
        let unit = parse(
            "using Pregen.Support;\n\
             namespace Demo.Colors;\n\
             public partial class ColorsClass\n\
             {\n\
                 public partial string GetAllColorsString();\n\
                 [GeneratesMethod(nameof(GetAllColorsString))]\n\
                 static string Gen() => \"x\";\n\
             }",
        );
        assert_eq!(unit.usings[0].to_string(), "Pregen.Support");
        let ty = &unit.types[0];
        assert_eq!(ty.namespace.as_deref(), Some("Demo.Colors"));
        assert!(ty.modifiers.is_partial);
        assert_eq!(ty.methods.len(), 2);
        assert!(ty.methods[0].body.is_none());
        assert_eq!(ty.methods[0].modifiers.accessibility, Some(Accessibility::Public));
        assert_eq!(ty.methods[1].attributes[0].name.to_string(), "GeneratesMethod");
        assert!(matches!(ty.methods[1].attributes[0].args[0].value, Expr::NameOf(ref i, _) if i.name == "GetAllColorsString"));
    }

    #[test]
    fn test_block_namespace_and_enum() {
        let unit = parse("namespace A { public enum E { X, Y, Z, } namespace B { static partial class T { } } }");
        assert_eq!(unit.types.len(), 2);
        assert_eq!(unit.types[0].members.len(), 3);
        assert_eq!(unit.types[1].namespace.as_deref(), Some("A.B"));
        assert!(unit.types[1].modifiers.is_static);
    }

    #[test]
    fn test_named_attribute_argument() {
        let unit = parse("class C { [SwitchCase(arg1: 3), SwitchCase(4)] static int G(int k) => k; }");
        let attrs = &unit.types[0].methods[0].attributes;
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs[0].args[0].name.as_ref().map(|n| n.name.as_str()), Some("arg1"));
        assert!(attrs[1].args[0].name.is_none());
    }

    #[test]
    fn test_generic_call_and_lambda() {
        let unit = parse("class C { static string G() => string.Join(\", \", Enum.GetNames<ColorsEnum>()); static object F() => x => () => Calc(x); }");
        match method_body_expr(&unit, 0) {
            Expr::Call { args, .. } => match &args[1] {
                Expr::Call { type_args, .. } => assert_eq!(type_args[0].name, "ColorsEnum"),
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
        let inner = method_body_expr(&unit, 1).innermost_lambda_body().unwrap();
        assert!(matches!(inner, Expr::Call { .. }));
    }

    #[test]
    fn test_less_than_is_not_generic() {
        let unit = parse("class C { static bool G(int i, int n) => i < n && n > Foo(i); }");
        assert!(matches!(method_body_expr(&unit, 0), Expr::Binary { op: BinOp::And, .. }));
    }

    #[test]
    fn test_statements() {
        let unit = parse(
            "class C { static int G(int n) {
                int[] a = new int[n + 1];
                var total = 0;
                for (int i = 0; i < n; i++) { total += a[i]; }
                foreach (var x in a) { if (x == 9) continue; else break; }
                while (total > 0) total--;
                switch (n) { case 1: case 2: return 3; default: throw new Exception(\"bad\"); }
            } }",
        );
        match unit.types[0].methods[0].body.as_ref() {
            Some(MethodBody::Block(block)) => {
                assert_eq!(block.stmts.len(), 6);
                assert!(matches!(block.stmts[0], Stmt::Local { ty: Some(ref t), .. } if t.to_string() == "int[]"));
                assert!(matches!(block.stmts[1], Stmt::Local { ty: None, .. }));
                match &block.stmts[5] {
                    Stmt::Switch { sections, .. } => {
                        assert_eq!(sections.len(), 2);
                        assert_eq!(sections[0].labels.len(), 2);
                    }
                    other => panic!("unexpected {:?}", other),
                }
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_expression_spans_cover_source() {
        let source = "class C { static int G(int x) => Other.Calc(x + 1); }";
        let unit = parse(source);
        let span = method_body_expr(&unit, 0).span();
        assert_eq!(&source[span.start..span.end], "Other.Calc(x + 1)");
    }

    #[test]
    fn test_generic_type_parameter() {
        let unit = parse("class C { static Func<int, string> G() => k => \"a\"; }");
        assert_eq!(unit.types[0].methods[0].ret_type.to_string(), "Func<int, string>");
    }

    #[test]
    fn test_missing_semicolon_is_error() {
        let err = parse_source("class C { static int G() => 1 }", 0).unwrap_err();
        assert!(matches!(err, Error::UnexpectedToken { .. }));
    }
}
