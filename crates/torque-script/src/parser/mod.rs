//! Recursive-descent parser lowering TorqueScript source directly to the AST
//! in [`crate::ast`].
//!
//! The original engine's grammar is ANTLR-generated and explicitly out of
//! scope (spec.md §1); this module plays the combined role of "grammar +
//! AST builder" described in spec.md §4.3, collecting every mismatch into a
//! [`ParseError`] instead of aborting on the first one, matching the
//! original's error-listener behaviour.

mod lexer;

use crate::ast::*;
use crate::error::{ParseError, ParseMessage};
use lexer::{Lexer, Spanned, Tok};

pub fn parse(source: &str) -> Result<Program, ParseError> {
    let mut parser = Parser::new(source)?;
    let program = parser.parse_program();
    if parser.messages.is_empty() {
        Ok(program)
    } else {
        Err(ParseError {
            messages: parser.messages,
        })
    }
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    cur: Spanned,
    messages: Vec<ParseMessage>,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Result<Self, ParseError> {
        let mut lexer = Lexer::new(source);
        let cur = lexer.next_token().map_err(|e| ParseError {
            messages: vec![ParseMessage {
                line: e.line,
                column: e.column,
                message: e.message,
            }],
        })?;
        Ok(Self {
            lexer,
            cur,
            messages: Vec::new(),
        })
    }

    fn bump(&mut self) -> Tok {
        let next = match self.lexer.next_token() {
            Ok(spanned) => spanned,
            Err(e) => {
                self.messages.push(ParseMessage {
                    line: e.line,
                    column: e.column,
                    message: e.message,
                });
                Spanned {
                    tok: Tok::Eof,
                    line: e.line,
                    column: e.column,
                }
            }
        };
        std::mem::replace(&mut self.cur, next).tok
    }

    fn error(&mut self, message: impl Into<String>) {
        self.messages.push(ParseMessage {
            line: self.cur.line,
            column: self.cur.column,
            message: message.into(),
        });
    }

    fn expect(&mut self, tok: &Tok) {
        if std::mem::discriminant(&self.cur.tok) == std::mem::discriminant(tok) {
            self.bump();
        } else {
            self.error(format!("expected {tok:?}, found {:?}", self.cur.tok));
            // Resynchronize by consuming the unexpected token so callers
            // don't spin forever on a single bad token.
            if self.cur.tok != Tok::Eof {
                self.bump();
            }
        }
    }

    fn at(&self, tok: &Tok) -> bool {
        std::mem::discriminant(&self.cur.tok) == std::mem::discriminant(tok)
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.at(tok) {
            self.bump();
            true
        } else {
            false
        }
    }

    // ---- program / statements ----------------------------------------

    fn parse_program(&mut self) -> Program {
        let mut stmts = Vec::new();
        while self.cur.tok != Tok::Eof {
            if let Some(stmt) = self.parse_stmt() {
                stmts.push(stmt);
            } else if self.cur.tok != Tok::Eof {
                // Recover: skip the offending token to make progress.
                self.bump();
            }
        }
        stmts
    }

    fn parse_block(&mut self) -> Vec<Stmt> {
        self.expect(&Tok::LBrace);
        let mut stmts = Vec::new();
        while !self.at(&Tok::RBrace) && self.cur.tok != Tok::Eof {
            if let Some(stmt) = self.parse_stmt() {
                stmts.push(stmt);
            } else {
                self.bump();
            }
        }
        self.expect(&Tok::RBrace);
        stmts
    }

    fn parse_stmt(&mut self) -> Option<Stmt> {
        match &self.cur.tok {
            Tok::Function => self.parse_function_decl().map(Stmt::FunctionDecl),
            Tok::Package => self.parse_package_decl(),
            Tok::If => self.parse_if(),
            Tok::While => self.parse_while(),
            Tok::For => self.parse_for(),
            Tok::Switch => self.parse_switch(),
            Tok::Break => {
                self.bump();
                self.eat(&Tok::Semi);
                Some(Stmt::Break)
            }
            Tok::Continue => {
                self.bump();
                self.eat(&Tok::Semi);
                Some(Stmt::Continue)
            }
            Tok::Return => {
                self.bump();
                let value = if self.at(&Tok::Semi) {
                    None
                } else {
                    Some(self.parse_expr())
                };
                self.eat(&Tok::Semi);
                Some(Stmt::Return(value))
            }
            Tok::Semi => {
                self.bump();
                None
            }
            _ => {
                let expr = self.parse_expr();
                self.eat(&Tok::Semi);
                Some(Stmt::Expr(expr))
            }
        }
    }

    fn parse_ident_path(&mut self) -> String {
        match self.bump() {
            Tok::Ident(name) => name,
            other => {
                self.error(format!("expected identifier, found {other:?}"));
                String::new()
            }
        }
    }

    fn parse_function_decl(&mut self) -> Option<FunctionDecl> {
        self.bump(); // function
        let first = self.parse_ident_path();
        let (namespace, name) = if self.eat(&Tok::ColonColon) {
            (Some(first), self.parse_ident_path())
        } else {
            (None, first)
        };
        self.expect(&Tok::LParen);
        let mut params = Vec::new();
        while !self.at(&Tok::RParen) && self.cur.tok != Tok::Eof {
            match self.bump() {
                Tok::LocalVar(p) => params.push(p),
                other => self.error(format!("expected parameter, found {other:?}")),
            }
            if !self.eat(&Tok::Comma) {
                break;
            }
        }
        self.expect(&Tok::RParen);
        let body = self.parse_block();
        Some(FunctionDecl {
            namespace,
            name,
            params,
            body,
        })
    }

    fn parse_package_decl(&mut self) -> Option<Stmt> {
        self.bump(); // package
        let name = self.parse_ident_path();
        self.expect(&Tok::LBrace);
        let mut decls = Vec::new();
        while !self.at(&Tok::RBrace) && self.cur.tok != Tok::Eof {
            if self.at(&Tok::Function) {
                if let Some(f) = self.parse_function_decl() {
                    decls.push(f);
                }
            } else {
                self.error("only function declarations are allowed inside a package");
                self.bump();
            }
        }
        self.expect(&Tok::RBrace);
        Some(Stmt::PackageDecl(name, decls))
    }

    fn parse_if(&mut self) -> Option<Stmt> {
        self.bump(); // if
        let mut branches = Vec::new();
        self.expect(&Tok::LParen);
        let cond = self.parse_expr();
        self.expect(&Tok::RParen);
        let body = self.parse_stmt_or_block();
        branches.push((cond, body));
        let mut else_body = None;
        while self.eat(&Tok::Else) {
            if self.eat(&Tok::If) {
                self.expect(&Tok::LParen);
                let cond = self.parse_expr();
                self.expect(&Tok::RParen);
                let body = self.parse_stmt_or_block();
                branches.push((cond, body));
            } else {
                else_body = Some(self.parse_stmt_or_block());
                break;
            }
        }
        Some(Stmt::If { branches, else_body })
    }

    /// Accepts either a `{ ... }` block or a single bare statement, matching
    /// the grammar's allowance for braceless single-statement bodies.
    fn parse_stmt_or_block(&mut self) -> Vec<Stmt> {
        if self.at(&Tok::LBrace) {
            self.parse_block()
        } else {
            self.parse_stmt().into_iter().collect()
        }
    }

    fn parse_while(&mut self) -> Option<Stmt> {
        self.bump(); // while
        self.expect(&Tok::LParen);
        let cond = self.parse_expr();
        self.expect(&Tok::RParen);
        let body = self.parse_stmt_or_block();
        Some(Stmt::While { cond, body })
    }

    fn parse_for(&mut self) -> Option<Stmt> {
        self.bump(); // for
        self.expect(&Tok::LParen);
        let init = self.parse_expr();
        self.expect(&Tok::Semi);
        let cond = self.parse_expr();
        self.expect(&Tok::Semi);
        let advance = self.parse_expr();
        self.expect(&Tok::RParen);
        let body = self.parse_stmt_or_block();
        Some(Stmt::For {
            init,
            cond,
            advance,
            body,
        })
    }

    fn parse_switch(&mut self) -> Option<Stmt> {
        self.bump(); // switch
        self.eat(&Tok::Star); // `switch$` (string switch) isn't distinguished here
        self.expect(&Tok::LParen);
        let expr = self.parse_expr();
        self.expect(&Tok::RParen);
        self.expect(&Tok::LBrace);
        let mut cases = Vec::new();
        let mut default = None;
        while !self.at(&Tok::RBrace) && self.cur.tok != Tok::Eof {
            if self.eat(&Tok::Case) {
                let mut exprs = vec![self.parse_expr()];
                while self.eat(&Tok::Or) {
                    exprs.push(self.parse_expr());
                }
                self.expect(&Tok::Colon);
                let mut body = Vec::new();
                while !self.at(&Tok::Case) && !self.at(&Tok::Default) && !self.at(&Tok::RBrace) {
                    if let Some(s) = self.parse_stmt() {
                        body.push(s);
                    } else {
                        self.bump();
                    }
                }
                cases.push((exprs, body));
            } else if self.eat(&Tok::Default) {
                self.expect(&Tok::Colon);
                let mut body = Vec::new();
                while !self.at(&Tok::Case) && !self.at(&Tok::Default) && !self.at(&Tok::RBrace) {
                    if let Some(s) = self.parse_stmt() {
                        body.push(s);
                    } else {
                        self.bump();
                    }
                }
                default = Some(body);
            } else {
                self.error("expected 'case' or 'default'");
                self.bump();
            }
        }
        self.expect(&Tok::RBrace);
        Some(Stmt::Switch { expr, cases, default })
    }

    // ---- expressions ----------------------------------------------------

    fn parse_expr(&mut self) -> Expr {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Expr {
        let lhs = self.parse_ternary();
        if self.eat(&Tok::Eq) {
            let rhs = self.parse_assignment();
            Expr::Assign(Box::new(lhs), Box::new(rhs))
        } else if self.eat(&Tok::PlusEq) {
            let rhs = self.parse_assignment();
            Expr::AddAssign(Box::new(lhs), Box::new(rhs))
        } else {
            lhs
        }
    }

    fn parse_ternary(&mut self) -> Expr {
        let cond = self.parse_logical_or();
        if self.eat(&Tok::Question) {
            let t = self.parse_expr();
            self.expect(&Tok::Colon);
            let f = self.parse_ternary();
            Expr::Ternary(Box::new(cond), Box::new(t), Box::new(f))
        } else {
            cond
        }
    }

    fn parse_logical_or(&mut self) -> Expr {
        let mut lhs = self.parse_logical_and();
        while self.eat(&Tok::PipePipe) {
            let rhs = self.parse_logical_and();
            lhs = Expr::Binary(BinOp::LogicalOr, Box::new(lhs), Box::new(rhs));
        }
        lhs
    }

    fn parse_logical_and(&mut self) -> Expr {
        let mut lhs = self.parse_equality();
        while self.eat(&Tok::AmpAmp) {
            let rhs = self.parse_equality();
            lhs = Expr::Binary(BinOp::LogicalAnd, Box::new(lhs), Box::new(rhs));
        }
        lhs
    }

    fn parse_equality(&mut self) -> Expr {
        let mut lhs = self.parse_relational();
        loop {
            let op = match &self.cur.tok {
                Tok::EqEq => BinOp::Equals,
                Tok::BangEq => BinOp::NotEquals,
                Tok::DollarEq => BinOp::StringEquals,
                Tok::BangDollarEq => BinOp::StringNotEquals,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_relational();
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        lhs
    }

    fn parse_relational(&mut self) -> Expr {
        let mut lhs = self.parse_bitor();
        loop {
            let op = match &self.cur.tok {
                Tok::Lt => BinOp::LessThan,
                Tok::Gt => BinOp::GreaterThan,
                Tok::GtEq => BinOp::GreaterThanOrEqual,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_bitor();
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        lhs
    }

    fn parse_bitor(&mut self) -> Expr {
        let mut lhs = self.parse_bitand();
        while self.eat(&Tok::Pipe) {
            let rhs = self.parse_bitand();
            lhs = Expr::Binary(BinOp::BitwiseOr, Box::new(lhs), Box::new(rhs));
        }
        lhs
    }

    fn parse_bitand(&mut self) -> Expr {
        let mut lhs = self.parse_concat();
        while self.eat(&Tok::Amp) {
            let rhs = self.parse_concat();
            lhs = Expr::Binary(BinOp::BitwiseAnd, Box::new(lhs), Box::new(rhs));
        }
        lhs
    }

    fn parse_concat(&mut self) -> Expr {
        let mut lhs = self.parse_additive();
        loop {
            let sep = match &self.cur.tok {
                Tok::At => ConcatSep::None,
                Tok::Spc => ConcatSep::Space,
                Tok::TabSep => ConcatSep::Tab,
                Tok::Nl => ConcatSep::Newline,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_additive();
            lhs = Expr::Concat(Box::new(lhs), Box::new(rhs), sep);
        }
        lhs
    }

    fn parse_additive(&mut self) -> Expr {
        let mut lhs = self.parse_multiplicative();
        loop {
            let op = match &self.cur.tok {
                Tok::Plus => BinOp::Add,
                Tok::Minus => BinOp::Minus,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_multiplicative();
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        lhs
    }

    fn parse_multiplicative(&mut self) -> Expr {
        let mut lhs = self.parse_unary();
        loop {
            let op = match &self.cur.tok {
                Tok::Star => BinOp::Multiply,
                Tok::Slash => BinOp::Divide,
                Tok::Percent => BinOp::Modulus,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_unary();
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        lhs
    }

    fn parse_unary(&mut self) -> Expr {
        match &self.cur.tok {
            Tok::Minus => {
                self.bump();
                Expr::Unary(UnOp::Negate, Box::new(self.parse_unary()))
            }
            Tok::Bang => {
                self.bump();
                Expr::Unary(UnOp::Not, Box::new(self.parse_unary()))
            }
            Tok::PlusPlus => {
                self.bump();
                Expr::Increment(Box::new(self.parse_unary()))
            }
            Tok::MinusMinus => {
                self.bump();
                Expr::Decrement(Box::new(self.parse_unary()))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Expr {
        let mut expr = self.parse_primary();
        loop {
            match &self.cur.tok {
                Tok::PlusPlus => {
                    self.bump();
                    expr = Expr::Increment(Box::new(expr));
                }
                Tok::MinusMinus => {
                    self.bump();
                    expr = Expr::Decrement(Box::new(expr));
                }
                Tok::Dot => {
                    self.bump();
                    let field = self.parse_ident_path();
                    let indices = if self.eat(&Tok::LBracket) {
                        let idx = self.parse_index_list();
                        self.expect(&Tok::RBracket);
                        idx
                    } else {
                        Vec::new()
                    };
                    if self.at(&Tok::LParen) {
                        let args = self.parse_call_args();
                        expr = Expr::BoundCall {
                            target: Box::new(expr),
                            name: field,
                            args,
                        };
                    } else {
                        expr = Expr::Subreference {
                            target: Box::new(expr),
                            field,
                            indices,
                        };
                    }
                }
                _ => break,
            }
        }
        expr
    }

    fn parse_index_list(&mut self) -> Vec<Expr> {
        let mut indices = vec![self.parse_expr()];
        while self.eat(&Tok::Comma) {
            indices.push(self.parse_expr());
        }
        indices
    }

    fn parse_call_args(&mut self) -> Vec<Expr> {
        self.expect(&Tok::LParen);
        let mut args = Vec::new();
        while !self.at(&Tok::RParen) && self.cur.tok != Tok::Eof {
            args.push(self.parse_expr());
            if !self.eat(&Tok::Comma) {
                break;
            }
        }
        self.expect(&Tok::RParen);
        args
    }

    fn parse_primary(&mut self) -> Expr {
        match self.cur.tok.clone() {
            Tok::Integer(n) => {
                self.bump();
                Expr::Integer(n)
            }
            Tok::Float(n) => {
                self.bump();
                Expr::Float(n)
            }
            Tok::StringLit(s) => {
                self.bump();
                Expr::StringLit(s)
            }
            Tok::TaggedStringLit(s) => {
                self.bump();
                Expr::TaggedStringLit(s)
            }
            Tok::LocalVar(name) => {
                self.bump();
                self.finish_var(VarKind::Local, name)
            }
            Tok::GlobalVar(name) => {
                self.bump();
                self.finish_var(VarKind::Global, name)
            }
            Tok::LParen => {
                self.bump();
                let expr = self.parse_expr();
                self.expect(&Tok::RParen);
                expr
            }
            Tok::New => self.parse_object_instantiation(),
            Tok::Datablock => self.parse_datablock_instantiation(),
            Tok::Ident(first) => {
                self.bump();
                if self.eat(&Tok::ColonColon) {
                    let name = self.parse_ident_path();
                    let args = self.parse_call_args();
                    Expr::Call {
                        namespace: Some(first),
                        name,
                        args,
                    }
                } else if self.at(&Tok::LParen) {
                    let args = self.parse_call_args();
                    Expr::Call {
                        namespace: None,
                        name: first,
                        args,
                    }
                } else {
                    self.error(format!("unexpected identifier '{first}'"));
                    Expr::Integer(0)
                }
            }
            other => {
                self.error(format!("unexpected token {other:?}"));
                if other != Tok::Eof {
                    self.bump();
                }
                Expr::Integer(0)
            }
        }
    }

    fn finish_var(&mut self, kind: VarKind, name: String) -> Expr {
        if self.eat(&Tok::LBracket) {
            let indices = self.parse_index_list();
            self.expect(&Tok::RBracket);
            Expr::ArrayAccess {
                target: VarRef { kind, name },
                indices,
            }
        } else {
            Expr::Var(VarRef { kind, name })
        }
    }

    fn parse_object_instantiation(&mut self) -> Expr {
        Expr::ObjectInstantiation(Box::new(self.parse_object_node()))
    }

    fn parse_object_node(&mut self) -> ObjectNode {
        self.bump(); // new
        let type_expr = self.parse_type_ref_expr();
        self.expect(&Tok::LParen);
        let name_expr = if self.at(&Tok::RParen) {
            None
        } else {
            Some(self.parse_expr())
        };
        if self.eat(&Tok::Colon) {
            // parent-object reference; evaluated for side effects but not
            // retained as a distinct AST slot (spec.md §3 doesn't model a
            // parent link on ObjectDeclaration beyond the datablock form).
            let _ = self.parse_expr();
        }
        self.expect(&Tok::RParen);
        let mut fields = Vec::new();
        let mut children = Vec::new();
        self.expect(&Tok::LBrace);
        while !self.at(&Tok::RBrace) && self.cur.tok != Tok::Eof {
            if self.at(&Tok::New) {
                children.push(self.parse_object_node());
                self.eat(&Tok::Semi);
            } else if matches!(self.cur.tok, Tok::Ident(_)) {
                let name = self.parse_ident_path();
                let indices = if self.eat(&Tok::LBracket) {
                    let idx = self.parse_index_list();
                    self.expect(&Tok::RBracket);
                    idx
                } else {
                    Vec::new()
                };
                self.expect(&Tok::Eq);
                let value = self.parse_expr();
                self.eat(&Tok::Semi);
                fields.push(FieldAssign {
                    base_name: name,
                    indices,
                    value,
                });
            } else {
                self.error("expected field assignment or nested object");
                self.bump();
            }
        }
        self.expect(&Tok::RBrace);
        ObjectNode {
            type_expr,
            name_expr,
            fields,
            children,
        }
    }

    fn parse_datablock_instantiation(&mut self) -> Expr {
        self.bump(); // datablock
        let type_name = self.parse_ident_path();
        self.expect(&Tok::LParen);
        let name = if matches!(self.cur.tok, Tok::Ident(_)) {
            self.parse_ident_path()
        } else {
            String::new()
        };
        let parent = if self.eat(&Tok::Colon) {
            Some(self.parse_ident_path())
        } else {
            None
        };
        self.expect(&Tok::RParen);
        let mut fields = Vec::new();
        self.expect(&Tok::LBrace);
        while !self.at(&Tok::RBrace) && self.cur.tok != Tok::Eof {
            if matches!(self.cur.tok, Tok::Ident(_)) {
                let fname = self.parse_ident_path();
                self.expect(&Tok::Eq);
                let value = self.parse_expr();
                self.eat(&Tok::Semi);
                fields.push(FieldAssign {
                    base_name: fname,
                    indices: Vec::new(),
                    value,
                });
            } else {
                self.error("expected field assignment");
                self.bump();
            }
        }
        self.expect(&Tok::RBrace);
        Expr::DatablockInstantiation(Box::new(DatablockNode {
            name,
            type_name,
            parent,
            fields,
        }))
    }

    /// Parses the type name in `new Type(...)`, which is either a bare
    /// identifier or a parenthesized/variable expression (dynamic class
    /// name).
    fn parse_type_ref_expr(&mut self) -> Expr {
        match self.cur.tok.clone() {
            Tok::Ident(name) => {
                self.bump();
                Expr::StringLit(name)
            }
            _ => self.parse_unary(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_assignment() {
        let prog = parse("$g = 5;").unwrap();
        assert_eq!(prog.len(), 1);
        assert!(matches!(&prog[0], Stmt::Expr(Expr::Assign(..))));
    }

    #[test]
    fn parses_for_loop() {
        let prog = parse("for (%i = 0; %i < 10; %i++) { $g = $g + 5; }").unwrap();
        assert_eq!(prog.len(), 1);
        assert!(matches!(&prog[0], Stmt::For { .. }));
    }

    #[test]
    fn parses_function_with_namespace() {
        let prog = parse("function A::f(%a, %b) { return %a; }").unwrap();
        match &prog[0] {
            Stmt::FunctionDecl(f) => {
                assert_eq!(f.namespace.as_deref(), Some("A"));
                assert_eq!(f.name, "f");
                assert_eq!(f.params, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_array_access() {
        let prog = parse("$result[1,2,3] = 5;").unwrap();
        match &prog[0] {
            Stmt::Expr(Expr::Assign(lhs, _)) => {
                assert!(matches!(**lhs, Expr::ArrayAccess { .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn reports_parse_errors_instead_of_panicking() {
        let err = parse("function ( { }").unwrap_err();
        assert!(!err.messages.is_empty());
    }
}
