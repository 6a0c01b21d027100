/*
 * parser.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Recursive-descent parser.
//!
//! Grammar notes:
//! - Semicolons after simple statements are optional. Directive
//!   fragments routinely omit them (`if (YEP) include("x.js")`), so the
//!   parser terminates an expression statement wherever the expression
//!   can no longer extend.
//! - A `{` at statement position is a block; at expression position it
//!   is a map literal.

use std::rc::Rc;

use crate::ast::{AssignOp, BinOp, Expr, LogicalOp, Program, Stmt, UnaryOp};
use crate::error::{ScriptError, ScriptResult};
use crate::lexer::{Token, TokenKind, tokenize};

/// Parse `source` into a runnable program.
pub fn parse(source: &str) -> ScriptResult<Program> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    let stmts = parser.parse_stmts_until(&TokenKind::Eof)?;
    Ok(Program { stmts })
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].kind
    }

    fn line(&self) -> usize {
        self.tokens[self.pos.min(self.tokens.len() - 1)].line
    }

    fn advance(&mut self) -> TokenKind {
        let token = self.tokens[self.pos.min(self.tokens.len() - 1)].kind.clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, context: &str) -> ScriptResult<()> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.error(format!("expected {kind:?} {context}, found {:?}", self.peek())))
        }
    }

    fn error(&self, message: impl Into<String>) -> ScriptError {
        ScriptError::Syntax {
            message: message.into(),
            line: self.line(),
        }
    }

    fn expect_ident(&mut self, context: &str) -> ScriptResult<String> {
        match self.peek().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(self.error(format!("expected identifier {context}, found {other:?}"))),
        }
    }

    // ---------------------------------------------------------------- statements

    fn parse_stmts_until(&mut self, end: &TokenKind) -> ScriptResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        loop {
            while self.eat(&TokenKind::Semi) {}
            if self.peek() == end || *self.peek() == TokenKind::Eof {
                break;
            }
            stmts.push(self.parse_stmt()?);
        }
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> ScriptResult<Stmt> {
        let line = self.line();
        match self.peek() {
            TokenKind::LBrace => self.parse_block(),
            TokenKind::Var => self.parse_var(),
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::Function => self.parse_function_decl(),
            TokenKind::Return => {
                self.advance();
                let value = if self.starts_expression() {
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                self.eat(&TokenKind::Semi);
                Ok(Stmt::Return { value, line })
            }
            TokenKind::Break => {
                self.advance();
                self.eat(&TokenKind::Semi);
                Ok(Stmt::Break { line })
            }
            TokenKind::Continue => {
                self.advance();
                self.eat(&TokenKind::Semi);
                Ok(Stmt::Continue { line })
            }
            _ => {
                let expr = self.parse_expr()?;
                self.eat(&TokenKind::Semi);
                Ok(Stmt::Expr { expr, line })
            }
        }
    }

    /// Whether the current token can begin an expression. Used to
    /// decide between `return;` and `return expr;`.
    fn starts_expression(&self) -> bool {
        !matches!(
            self.peek(),
            TokenKind::Semi | TokenKind::RBrace | TokenKind::Else | TokenKind::Eof
        )
    }

    fn parse_block(&mut self) -> ScriptResult<Stmt> {
        let line = self.line();
        self.expect(&TokenKind::LBrace, "to open block")?;
        let stmts = self.parse_stmts_until(&TokenKind::RBrace)?;
        self.expect(&TokenKind::RBrace, "to close block")?;
        Ok(Stmt::Block { stmts, line })
    }

    fn parse_var(&mut self) -> ScriptResult<Stmt> {
        let line = self.line();
        self.advance();
        let mut decls = Vec::new();
        loop {
            let name = self.expect_ident("after 'var'")?;
            let init = if self.eat(&TokenKind::Assign) {
                Some(self.parse_assignment()?)
            } else {
                None
            };
            decls.push((name, init));
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.eat(&TokenKind::Semi);
        Ok(Stmt::Var { decls, line })
    }

    fn parse_if(&mut self) -> ScriptResult<Stmt> {
        let line = self.line();
        self.advance();
        self.expect(&TokenKind::LParen, "after 'if'")?;
        let cond = self.parse_expr()?;
        self.expect(&TokenKind::RParen, "after condition")?;
        let then_branch = Box::new(self.parse_stmt()?);
        let else_branch = if self.eat(&TokenKind::Else) {
            Some(Box::new(self.parse_stmt()?))
        } else {
            None
        };
        Ok(Stmt::If {
            cond,
            then_branch,
            else_branch,
            line,
        })
    }

    fn parse_while(&mut self) -> ScriptResult<Stmt> {
        let line = self.line();
        self.advance();
        self.expect(&TokenKind::LParen, "after 'while'")?;
        let cond = self.parse_expr()?;
        self.expect(&TokenKind::RParen, "after condition")?;
        let body = Box::new(self.parse_stmt()?);
        Ok(Stmt::While { cond, body, line })
    }

    fn parse_for(&mut self) -> ScriptResult<Stmt> {
        let line = self.line();
        self.advance();
        self.expect(&TokenKind::LParen, "after 'for'")?;
        let init = if self.eat(&TokenKind::Semi) {
            None
        } else {
            let stmt = if *self.peek() == TokenKind::Var {
                self.parse_var()?
            } else {
                let expr_line = self.line();
                let expr = self.parse_expr()?;
                self.eat(&TokenKind::Semi);
                Stmt::Expr {
                    expr,
                    line: expr_line,
                }
            };
            Some(Box::new(stmt))
        };
        let cond = if *self.peek() == TokenKind::Semi {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(&TokenKind::Semi, "after loop condition")?;
        let step = if *self.peek() == TokenKind::RParen {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(&TokenKind::RParen, "after loop header")?;
        let body = Box::new(self.parse_stmt()?);
        Ok(Stmt::For {
            init,
            cond,
            step,
            body,
            line,
        })
    }

    fn parse_function_decl(&mut self) -> ScriptResult<Stmt> {
        let line = self.line();
        self.advance();
        let name = self.expect_ident("after 'function'")?;
        let params = self.parse_params()?;
        let body = self.parse_function_body()?;
        Ok(Stmt::FunctionDecl {
            name,
            params,
            body,
            line,
        })
    }

    fn parse_params(&mut self) -> ScriptResult<Vec<String>> {
        self.expect(&TokenKind::LParen, "to open parameter list")?;
        let mut params = Vec::new();
        if *self.peek() != TokenKind::RParen {
            loop {
                params.push(self.expect_ident("in parameter list")?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen, "to close parameter list")?;
        Ok(params)
    }

    fn parse_function_body(&mut self) -> ScriptResult<Rc<Vec<Stmt>>> {
        self.expect(&TokenKind::LBrace, "to open function body")?;
        let stmts = self.parse_stmts_until(&TokenKind::RBrace)?;
        self.expect(&TokenKind::RBrace, "to close function body")?;
        Ok(Rc::new(stmts))
    }

    // ---------------------------------------------------------------- expressions

    fn parse_expr(&mut self) -> ScriptResult<Expr> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> ScriptResult<Expr> {
        let lhs = self.parse_ternary()?;
        let op = match self.peek() {
            TokenKind::Assign => AssignOp::Set,
            TokenKind::PlusAssign => AssignOp::Add,
            TokenKind::MinusAssign => AssignOp::Sub,
            _ => return Ok(lhs),
        };
        if !matches!(lhs, Expr::Ident(_) | Expr::Member { .. } | Expr::Index { .. }) {
            return Err(self.error("invalid assignment target"));
        }
        self.advance();
        let value = self.parse_assignment()?;
        Ok(Expr::Assign {
            target: Box::new(lhs),
            op,
            value: Box::new(value),
        })
    }

    fn parse_ternary(&mut self) -> ScriptResult<Expr> {
        let cond = self.parse_or()?;
        if !self.eat(&TokenKind::Question) {
            return Ok(cond);
        }
        let then_branch = self.parse_assignment()?;
        self.expect(&TokenKind::Colon, "in conditional expression")?;
        let else_branch = self.parse_assignment()?;
        Ok(Expr::Ternary {
            cond: Box::new(cond),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
        })
    }

    fn parse_or(&mut self) -> ScriptResult<Expr> {
        let mut lhs = self.parse_and()?;
        while self.eat(&TokenKind::OrOr) {
            let rhs = self.parse_and()?;
            lhs = Expr::Logical {
                op: LogicalOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> ScriptResult<Expr> {
        let mut lhs = self.parse_equality()?;
        while self.eat(&TokenKind::AndAnd) {
            let rhs = self.parse_equality()?;
            lhs = Expr::Logical {
                op: LogicalOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> ScriptResult<Expr> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = match self.peek() {
                TokenKind::EqEq => BinOp::Eq,
                TokenKind::NotEq => BinOp::Ne,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_relational()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn parse_relational(&mut self) -> ScriptResult<Expr> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                TokenKind::Lt => BinOp::Lt,
                TokenKind::Le => BinOp::Le,
                TokenKind::Gt => BinOp::Gt,
                TokenKind::Ge => BinOp::Ge,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_additive()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn parse_additive(&mut self) -> ScriptResult<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn parse_multiplicative(&mut self) -> ScriptResult<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Percent => BinOp::Mod,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn parse_unary(&mut self) -> ScriptResult<Expr> {
        let op = match self.peek() {
            TokenKind::Bang => UnaryOp::Not,
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Plus => UnaryOp::Plus,
            TokenKind::TypeOf => UnaryOp::TypeOf,
            _ => return self.parse_postfix(),
        };
        self.advance();
        let operand = self.parse_unary()?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn parse_postfix(&mut self) -> ScriptResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                TokenKind::LParen => {
                    self.advance();
                    let mut args = Vec::new();
                    if *self.peek() != TokenKind::RParen {
                        loop {
                            args.push(self.parse_assignment()?);
                            if !self.eat(&TokenKind::Comma) {
                                break;
                            }
                        }
                    }
                    self.expect(&TokenKind::RParen, "to close argument list")?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                    };
                }
                TokenKind::Dot => {
                    self.advance();
                    let field = self.expect_ident("after '.'")?;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        field,
                    };
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_expr()?;
                    self.expect(&TokenKind::RBracket, "to close index")?;
                    expr = Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_primary(&mut self) -> ScriptResult<Expr> {
        match self.peek().clone() {
            TokenKind::Number(n) => {
                self.advance();
                Ok(Expr::Number(n))
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Expr::Str(s))
            }
            TokenKind::Ident(name) => {
                self.advance();
                Ok(Expr::Ident(name))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::Bool(true))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::Bool(false))
            }
            TokenKind::Null => {
                self.advance();
                Ok(Expr::Null)
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(&TokenKind::RParen, "to close group")?;
                Ok(expr)
            }
            TokenKind::LBracket => {
                self.advance();
                let mut items = Vec::new();
                if *self.peek() != TokenKind::RBracket {
                    loop {
                        items.push(self.parse_assignment()?);
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&TokenKind::RBracket, "to close list literal")?;
                Ok(Expr::List(items))
            }
            TokenKind::LBrace => {
                self.advance();
                let mut entries = Vec::new();
                if *self.peek() != TokenKind::RBrace {
                    loop {
                        let key = match self.peek().clone() {
                            TokenKind::Ident(name) => {
                                self.advance();
                                name
                            }
                            TokenKind::Str(s) => {
                                self.advance();
                                s
                            }
                            other => {
                                return Err(self.error(format!(
                                    "expected map key, found {other:?}"
                                )));
                            }
                        };
                        self.expect(&TokenKind::Colon, "after map key")?;
                        entries.push((key, self.parse_assignment()?));
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&TokenKind::RBrace, "to close map literal")?;
                Ok(Expr::MapLit(entries))
            }
            TokenKind::Function => {
                self.advance();
                let name = match self.peek().clone() {
                    TokenKind::Ident(n) => {
                        self.advance();
                        Some(n)
                    }
                    _ => None,
                };
                let params = self.parse_params()?;
                let body = self.parse_function_body()?;
                Ok(Expr::Function { name, params, body })
            }
            other => Err(self.error(format!("unexpected token {other:?}"))),
        }
    }
}
