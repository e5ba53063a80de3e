//! C2: recursive-descent parser with operator-precedence expression parsing
//! (spec.md §4.2). Reports the first syntax error with a span and stops;
//! no error recovery beyond resynchronizing to the next NEWLINE when a
//! statement inside a block fails, matching the teacher's "report first,
//! keep walking the block list" behavior in `build_ast.rs`.
//!
//! Desugaring performed here: chained comparisons (`a < b < c` becomes
//! `a < b and b < c`) and augmented assignment (`x += y` becomes
//! `x = x + y`, except when the target is a subscript, which is left as
//! `AugAssign` so the emitter evaluates the subscript base exactly once).

use crate::ast::{
    AstNode, BinOp, ClassDef, CompClause, Comprehension, Expr, ExprKind, ExceptHandler,
    FStringSegment, FunctionDef, Literal, Module, NodeKind, Param, UnaryOp,
};
use crate::errors::{CharPosition as ErrPos, EmberError, ErrorKind, ErrorLocation};
use crate::lexer::Lexer;
use crate::string_interning::StringTable;
use crate::token::{CharPosition, Keyword, StringLiteralKind, TextLocation, Token, TokenKind};
use std::path::{Path, PathBuf};

pub struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    file: PathBuf,
    string_table: &'a mut StringTable,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: Vec<Token>, file: &Path, string_table: &'a mut StringTable) -> Self {
        Parser {
            tokens,
            pos: 0,
            file: file.to_path_buf(),
            string_table,
        }
    }

    pub fn parse_source(
        source: &str,
        file: &Path,
        string_table: &'a mut StringTable,
    ) -> Result<Module, EmberError> {
        let tokens = Lexer::tokenize(source, file, string_table)?;
        let mut parser = Parser::new(tokens, file, string_table);
        parser.parse_module()
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn here(&self) -> CharPosition {
        let loc = &self.peek().location;
        CharPosition {
            line: loc.start.line,
            column: loc.start.column,
        }
    }

    fn err_loc(&self, start: CharPosition) -> ErrorLocation {
        let end = self.here();
        ErrorLocation::new(
            self.file.clone(),
            ErrPos {
                line: start.line,
                column: start.column,
            },
            ErrPos {
                line: end.line,
                column: end.column,
            },
        )
    }

    fn syntax_error(&self, msg: impl Into<String>, start: CharPosition) -> EmberError {
        EmberError::new(ErrorKind::Syntax, msg).at(self.err_loc(start))
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn check_keyword(&self, kw: Keyword) -> bool {
        matches!(self.peek_kind(), TokenKind::Keyword(k) if *k == kw)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token, EmberError> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            let start = self.here();
            Err(self.syntax_error(format!("expected {what}"), start))
        }
    }

    fn expect_keyword(&mut self, kw: Keyword, what: &str) -> Result<(), EmberError> {
        if self.check_keyword(kw) {
            self.advance();
            Ok(())
        } else {
            let start = self.here();
            Err(self.syntax_error(format!("expected {what}"), start))
        }
    }

    fn skip_newlines(&mut self) {
        while self.check(&TokenKind::Newline) {
            self.advance();
        }
    }

    fn expect_identifier(&mut self, what: &str) -> Result<crate::string_interning::StringId, EmberError> {
        let start = self.here();
        match self.peek_kind().clone() {
            TokenKind::Identifier(id) => {
                self.advance();
                Ok(id)
            }
            _ => Err(self.syntax_error(format!("expected {what}"), start)),
        }
    }

    // ---- module & blocks ----

    pub fn parse_module(&mut self) -> Result<Module, EmberError> {
        let mut body = Vec::new();
        self.skip_newlines();
        while !self.check(&TokenKind::Eof) {
            body.push(self.parse_statement()?);
            self.skip_newlines();
        }
        Ok(Module { body })
    }

    /// Parses an indented block: NEWLINE INDENT stmt+ DEDENT.
    fn parse_block(&mut self) -> Result<Vec<AstNode>, EmberError> {
        self.eat(&TokenKind::Newline);
        self.expect(TokenKind::Indent, "an indented block")?;
        let mut body = Vec::new();
        self.skip_newlines();
        while !self.check(&TokenKind::Dedent) && !self.check(&TokenKind::Eof) {
            body.push(self.parse_statement()?);
            self.skip_newlines();
        }
        self.expect(TokenKind::Dedent, "dedent to close block")?;
        Ok(body)
    }

    // ---- statements ----

    fn parse_statement(&mut self) -> Result<AstNode, EmberError> {
        let start = self.here();
        if let TokenKind::Keyword(kw) = self.peek_kind().clone() {
            return match kw {
                Keyword::Def => self.parse_function_def(start, false),
                Keyword::Async if self.peek_is_async_def() => self.parse_async_def(start),
                Keyword::Class => self.parse_class_def(start),
                Keyword::If => self.parse_if(start),
                Keyword::For => self.parse_for(start, false),
                Keyword::While => self.parse_while(start),
                Keyword::Try => self.parse_try(start),
                Keyword::Return => self.parse_return(start),
                Keyword::Raise => self.parse_raise(start),
                Keyword::Import | Keyword::From => self.parse_import(start),
                Keyword::Pass => {
                    self.advance();
                    self.finish_simple(NodeKind::Pass, start)
                }
                Keyword::Break => {
                    self.advance();
                    self.finish_simple(NodeKind::Break, start)
                }
                Keyword::Continue => {
                    self.advance();
                    self.finish_simple(NodeKind::Continue, start)
                }
                Keyword::Global => self.parse_global_nonlocal(start, true),
                Keyword::Nonlocal => self.parse_global_nonlocal(start, false),
                _ => self.parse_expr_or_assignment(start),
            };
        }
        self.parse_expr_or_assignment(start)
    }

    fn peek_is_async_def(&self) -> bool {
        matches!(
            self.tokens.get(self.pos + 1).map(|t| &t.kind),
            Some(TokenKind::Keyword(Keyword::Def))
        )
    }

    fn finish_simple(&mut self, kind: NodeKind, start: CharPosition) -> Result<AstNode, EmberError> {
        let loc = TextLocation::new(start, self.here());
        Ok(AstNode::new(kind, loc))
    }

    fn parse_global_nonlocal(
        &mut self,
        start: CharPosition,
        is_global: bool,
    ) -> Result<AstNode, EmberError> {
        self.advance();
        let mut names = vec![self.expect_identifier("a name")?];
        while self.eat(&TokenKind::Comma) {
            names.push(self.expect_identifier("a name")?);
        }
        let kind = if is_global {
            NodeKind::Global(names)
        } else {
            NodeKind::Nonlocal(names)
        };
        self.finish_simple(kind, start)
    }

    fn parse_function_def(
        &mut self,
        start: CharPosition,
        is_async: bool,
    ) -> Result<AstNode, EmberError> {
        self.advance(); // `def`
        let name = self.expect_identifier("a function name")?;
        self.expect(TokenKind::LParen, "'('")?;
        let params = self.parse_param_list()?;
        self.expect(TokenKind::RParen, "')'")?;
        let return_annotation = if self.eat(&TokenKind::Arrow) {
            Some(self.expect_identifier("a return type")?)
        } else {
            None
        };
        self.expect(TokenKind::Colon, "':'")?;
        let body = self.parse_block()?;
        let def = FunctionDef {
            name,
            params,
            body,
            is_async,
            decorators: Vec::new(),
            return_annotation,
        };
        self.finish_simple(NodeKind::Function(def), start)
    }

    fn parse_async_def(&mut self, start: CharPosition) -> Result<AstNode, EmberError> {
        self.advance(); // `async`
        if self.check_keyword(Keyword::Def) {
            self.parse_function_def(start, true)
        } else if self.check_keyword(Keyword::For) {
            self.parse_for(start, true)
        } else {
            Err(self.syntax_error("expected 'def' or 'for' after 'async'", start))
        }
    }

    fn parse_param_list(&mut self) -> Result<Vec<Param>, EmberError> {
        let mut params = Vec::new();
        if self.check(&TokenKind::RParen) {
            return Ok(params);
        }
        loop {
            let name = self.expect_identifier("a parameter name")?;
            let annotation = if self.eat(&TokenKind::Colon) {
                Some(self.expect_identifier("a type annotation")?)
            } else {
                None
            };
            let default = if self.eat(&TokenKind::Assign) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            params.push(Param {
                name,
                default,
                annotation,
            });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
            if self.check(&TokenKind::RParen) {
                break;
            }
        }
        Ok(params)
    }

    fn parse_class_def(&mut self, start: CharPosition) -> Result<AstNode, EmberError> {
        self.advance(); // `class`
        let name = self.expect_identifier("a class name")?;
        let mut bases = Vec::new();
        if self.eat(&TokenKind::LParen) {
            if !self.check(&TokenKind::RParen) {
                bases.push(self.parse_expr()?);
                while self.eat(&TokenKind::Comma) {
                    bases.push(self.parse_expr()?);
                }
            }
            self.expect(TokenKind::RParen, "')'")?;
        }
        self.expect(TokenKind::Colon, "':'")?;
        let body = self.parse_block()?;
        self.finish_simple(NodeKind::Class(ClassDef { name, bases, body }), start)
    }

    fn parse_if(&mut self, start: CharPosition) -> Result<AstNode, EmberError> {
        self.advance(); // `if`
        let cond = self.parse_expr()?;
        self.expect(TokenKind::Colon, "':'")?;
        let body = self.parse_block()?;
        let orelse = self.parse_elif_or_else()?;
        self.finish_simple(NodeKind::If { cond, body, orelse }, start)
    }

    fn parse_elif_or_else(&mut self) -> Result<Vec<AstNode>, EmberError> {
        if self.check_keyword(Keyword::Elif) {
            let start = self.here();
            self.advance();
            let cond = self.parse_expr()?;
            self.expect(TokenKind::Colon, "':'")?;
            let body = self.parse_block()?;
            let orelse = self.parse_elif_or_else()?;
            Ok(vec![AstNode::new(
                NodeKind::If { cond, body, orelse },
                TextLocation::new(start, self.here()),
            )])
        } else if self.check_keyword(Keyword::Else) {
            self.advance();
            self.expect(TokenKind::Colon, "':'")?;
            self.parse_block()
        } else {
            Ok(Vec::new())
        }
    }

    fn parse_for(&mut self, start: CharPosition, is_async: bool) -> Result<AstNode, EmberError> {
        self.advance(); // `for`
        let target = self.parse_expr()?;
        self.expect_keyword(Keyword::In, "'in'")?;
        let iter = self.parse_expr()?;
        self.expect(TokenKind::Colon, "':'")?;
        let body = self.parse_block()?;
        let orelse = if self.check_keyword(Keyword::Else) {
            self.advance();
            self.expect(TokenKind::Colon, "':'")?;
            self.parse_block()?
        } else {
            Vec::new()
        };
        self.finish_simple(
            NodeKind::For {
                target,
                iter,
                body,
                orelse,
                is_async,
            },
            start,
        )
    }

    fn parse_while(&mut self, start: CharPosition) -> Result<AstNode, EmberError> {
        self.advance(); // `while`
        let cond = self.parse_expr()?;
        self.expect(TokenKind::Colon, "':'")?;
        let body = self.parse_block()?;
        let orelse = if self.check_keyword(Keyword::Else) {
            self.advance();
            self.expect(TokenKind::Colon, "':'")?;
            self.parse_block()?
        } else {
            Vec::new()
        };
        self.finish_simple(NodeKind::While { cond, body, orelse }, start)
    }

    fn parse_try(&mut self, start: CharPosition) -> Result<AstNode, EmberError> {
        self.advance(); // `try`
        self.expect(TokenKind::Colon, "':'")?;
        let body = self.parse_block()?;
        let mut handlers = Vec::new();
        while self.check_keyword(Keyword::Except) {
            let handler_start = self.here();
            self.advance();
            let exc_type = if !self.check(&TokenKind::Colon) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            let bound_name = if self.eat(&TokenKind::Keyword(Keyword::As)) {
                Some(self.expect_identifier("a name")?)
            } else {
                None
            };
            self.expect(TokenKind::Colon, "':'")?;
            let handler_body = self.parse_block()?;
            handlers.push(ExceptHandler {
                exc_type,
                bound_name,
                body: handler_body,
                location: TextLocation::new(handler_start, self.here()),
            });
        }
        let orelse = if self.check_keyword(Keyword::Else) {
            self.advance();
            self.expect(TokenKind::Colon, "':'")?;
            self.parse_block()?
        } else {
            Vec::new()
        };
        let finally = if self.check_keyword(Keyword::Finally) {
            self.advance();
            self.expect(TokenKind::Colon, "':'")?;
            self.parse_block()?
        } else {
            Vec::new()
        };
        self.finish_simple(
            NodeKind::TryExcept {
                body,
                handlers,
                orelse,
                finally,
            },
            start,
        )
    }

    fn parse_return(&mut self, start: CharPosition) -> Result<AstNode, EmberError> {
        self.advance(); // `return`
        let value = if self.check(&TokenKind::Newline) || self.check(&TokenKind::Eof) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.finish_simple(NodeKind::Return(value), start)
    }

    fn parse_raise(&mut self, start: CharPosition) -> Result<AstNode, EmberError> {
        self.advance(); // `raise`
        let exc = if self.check(&TokenKind::Newline) || self.check(&TokenKind::Eof) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        let cause = if exc.is_some() && self.eat(&TokenKind::Keyword(Keyword::From)) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.finish_simple(NodeKind::Raise { exc, cause }, start)
    }

    fn parse_import(&mut self, start: CharPosition) -> Result<AstNode, EmberError> {
        if self.check_keyword(Keyword::From) {
            self.advance();
            let mut relative_level = 0;
            while self.eat(&TokenKind::Dot) {
                relative_level += 1;
            }
            let module = self.expect_identifier("a module name")?;
            self.expect_keyword(Keyword::Import, "'import'")?;
            let mut names = Vec::new();
            loop {
                let name = self.expect_identifier("an import name")?;
                let alias = if self.eat(&TokenKind::Keyword(Keyword::As)) {
                    Some(self.expect_identifier("an alias")?)
                } else {
                    None
                };
                names.push((name, alias));
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.finish_simple(
                NodeKind::Import {
                    module,
                    names,
                    relative_level,
                },
                start,
            )
        } else {
            self.advance(); // `import`
            let module = self.expect_identifier("a module name")?;
            let alias = if self.eat(&TokenKind::Keyword(Keyword::As)) {
                Some(self.expect_identifier("an alias")?)
            } else {
                None
            };
            self.finish_simple(
                NodeKind::Import {
                    module,
                    names: vec![(module, alias)],
                    relative_level: 0,
                },
                start,
            )
        }
    }

    /// A bare expression statement, a plain assignment, or an augmented
    /// assignment. Desugars `x += y` to `x = x + y`, unless the target is a
    /// subscript (kept as `AugAssign` so the emitter evaluates the base once).
    fn parse_expr_or_assignment(&mut self, start: CharPosition) -> Result<AstNode, EmberError> {
        let first = self.parse_expr()?;

        if let Some(op) = self.peek_aug_assign_op() {
            self.advance();
            let value = self.parse_expr()?;
            return self.finish_simple(
                match &first.kind {
                    ExprKind::Subscript { .. } => NodeKind::AugAssign {
                        target: Box::new(first),
                        op,
                        value,
                    },
                    _ => {
                        let loc = first.location.clone();
                        let desugared = Expr::new(
                            ExprKind::BinOp {
                                left: Box::new(first.clone()),
                                op,
                                right: Box::new(value),
                            },
                            loc,
                        );
                        NodeKind::Assignment {
                            targets: vec![first],
                            value: desugared,
                        }
                    }
                },
                start,
            );
        }

        if self.check(&TokenKind::Assign) {
            let mut targets = vec![first];
            let mut value;
            loop {
                self.advance();
                value = self.parse_expr()?;
                if self.check(&TokenKind::Assign) {
                    targets.push(value.clone());
                } else {
                    break;
                }
            }
            return self.finish_simple(NodeKind::Assignment { targets, value }, start);
        }

        self.finish_simple(NodeKind::ExprStmt(first), start)
    }

    fn peek_aug_assign_op(&self) -> Option<BinOp> {
        match self.peek_kind() {
            TokenKind::PlusAssign => Some(BinOp::Add),
            TokenKind::MinusAssign => Some(BinOp::Sub),
            TokenKind::StarAssign => Some(BinOp::Mul),
            TokenKind::SlashAssign => Some(BinOp::Div),
            _ => None,
        }
    }

    // ---- expressions ----

    pub fn parse_expr(&mut self) -> Result<Expr, EmberError> {
        self.parse_ternary_or_lambda()
    }

    fn parse_ternary_or_lambda(&mut self) -> Result<Expr, EmberError> {
        if self.check_keyword(Keyword::Lambda) {
            return self.parse_lambda();
        }
        let start = self.here();
        let body = self.parse_or()?;
        if self.check_keyword(Keyword::If) {
            self.advance();
            let cond = self.parse_or()?;
            self.expect_keyword(Keyword::Else, "'else'")?;
            let orelse = self.parse_ternary_or_lambda()?;
            return Ok(Expr::new(
                ExprKind::IfExpr {
                    cond: Box::new(cond),
                    body: Box::new(body),
                    orelse: Box::new(orelse),
                },
                TextLocation::new(start, self.here()),
            ));
        }
        Ok(body)
    }

    fn parse_lambda(&mut self) -> Result<Expr, EmberError> {
        let start = self.here();
        self.advance(); // `lambda`
        let mut params = Vec::new();
        if !self.check(&TokenKind::Colon) {
            loop {
                let name = self.expect_identifier("a parameter name")?;
                let default = if self.eat(&TokenKind::Assign) {
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                params.push(Param {
                    name,
                    default,
                    annotation: None,
                });
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::Colon, "':'")?;
        let body = self.parse_ternary_or_lambda()?;
        Ok(Expr::new(
            ExprKind::Lambda {
                params,
                body: Box::new(body),
            },
            TextLocation::new(start, self.here()),
        ))
    }

    fn parse_or(&mut self) -> Result<Expr, EmberError> {
        let start = self.here();
        let mut left = self.parse_and()?;
        let mut values = vec![left];
        while self.check(&TokenKind::Or) {
            self.advance();
            values.push(self.parse_and()?);
        }
        if values.len() == 1 {
            return Ok(values.pop().unwrap());
        }
        left = Expr::new(
            ExprKind::BoolOp {
                op: BinOp::Or,
                values,
            },
            TextLocation::new(start, self.here()),
        );
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, EmberError> {
        let start = self.here();
        let mut values = vec![self.parse_not()?];
        while self.check(&TokenKind::And) {
            self.advance();
            values.push(self.parse_not()?);
        }
        if values.len() == 1 {
            return Ok(values.pop().unwrap());
        }
        Ok(Expr::new(
            ExprKind::BoolOp {
                op: BinOp::And,
                values,
            },
            TextLocation::new(start, self.here()),
        ))
    }

    fn parse_not(&mut self) -> Result<Expr, EmberError> {
        if self.check(&TokenKind::Not) {
            let start = self.here();
            self.advance();
            let operand = self.parse_not()?;
            return Ok(Expr::new(
                ExprKind::UnaryOp {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                },
                TextLocation::new(start, self.here()),
            ));
        }
        self.parse_comparison()
    }

    /// Chained comparisons desugar to an `and` of pairwise comparisons:
    /// `a < b < c` becomes `a < b and b < c`.
    fn parse_comparison(&mut self) -> Result<Expr, EmberError> {
        let start = self.here();
        let first = self.parse_additive()?;
        let mut chain = vec![first];
        let mut ops = Vec::new();
        while let Some(op) = self.peek_comparison_op() {
            self.advance_comparison_op();
            ops.push(op);
            chain.push(self.parse_additive()?);
        }
        if ops.is_empty() {
            return Ok(chain.pop().unwrap());
        }
        let mut comparisons = Vec::with_capacity(ops.len());
        for (i, op) in ops.into_iter().enumerate() {
            comparisons.push(Expr::new(
                ExprKind::BinOp {
                    left: Box::new(chain[i].clone()),
                    op,
                    right: Box::new(chain[i + 1].clone()),
                },
                TextLocation::new(start, self.here()),
            ));
        }
        if comparisons.len() == 1 {
            return Ok(comparisons.pop().unwrap());
        }
        Ok(Expr::new(
            ExprKind::BoolOp {
                op: BinOp::And,
                values: comparisons,
            },
            TextLocation::new(start, self.here()),
        ))
    }

    fn peek_comparison_op(&self) -> Option<BinOp> {
        match self.peek_kind() {
            TokenKind::Eq => Some(BinOp::Eq),
            TokenKind::NotEq => Some(BinOp::NotEq),
            TokenKind::Lt => Some(BinOp::Lt),
            TokenKind::LtEq => Some(BinOp::LtEq),
            TokenKind::Gt => Some(BinOp::Gt),
            TokenKind::GtEq => Some(BinOp::GtEq),
            TokenKind::Keyword(Keyword::Is) => Some(BinOp::Is),
            TokenKind::Keyword(Keyword::In) => Some(BinOp::In),
            _ => None,
        }
    }

    fn advance_comparison_op(&mut self) {
        self.advance();
    }

    fn parse_additive(&mut self) -> Result<Expr, EmberError> {
        let start = self.here();
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::new(
                ExprKind::BinOp {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                },
                TextLocation::new(start, self.here()),
            );
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, EmberError> {
        let start = self.here();
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::DoubleSlash => BinOp::FloorDiv,
                TokenKind::Percent => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::new(
                ExprKind::BinOp {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                },
                TextLocation::new(start, self.here()),
            );
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, EmberError> {
        let start = self.here();
        let op = match self.peek_kind() {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Plus => Some(UnaryOp::Pos),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::new(
                ExprKind::UnaryOp {
                    op,
                    operand: Box::new(operand),
                },
                TextLocation::new(start, self.here()),
            ));
        }
        self.parse_power()
    }

    /// Right-associative: `2 ** 3 ** 2 == 2 ** (3 ** 2)`.
    fn parse_power(&mut self) -> Result<Expr, EmberError> {
        let start = self.here();
        let base = self.parse_postfix()?;
        if self.check(&TokenKind::DoubleStar) {
            self.advance();
            let exponent = self.parse_unary()?;
            return Ok(Expr::new(
                ExprKind::BinOp {
                    left: Box::new(base),
                    op: BinOp::Pow,
                    right: Box::new(exponent),
                },
                TextLocation::new(start, self.here()),
            ));
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> Result<Expr, EmberError> {
        let start = self.here();
        let mut expr = self.parse_atom()?;
        loop {
            match self.peek_kind() {
                TokenKind::Dot => {
                    self.advance();
                    let attr = self.expect_identifier("an attribute name")?;
                    expr = Expr::new(
                        ExprKind::Attribute {
                            base: Box::new(expr),
                            attr,
                        },
                        TextLocation::new(start, self.here()),
                    );
                }
                TokenKind::LParen => {
                    self.advance();
                    let (args, kwargs) = self.parse_call_args()?;
                    self.expect(TokenKind::RParen, "')'")?;
                    expr = Expr::new(
                        ExprKind::Call {
                            func: Box::new(expr),
                            args,
                            kwargs,
                        },
                        TextLocation::new(start, self.here()),
                    );
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_expr()?;
                    self.expect(TokenKind::RBracket, "']'")?;
                    expr = Expr::new(
                        ExprKind::Subscript {
                            base: Box::new(expr),
                            index: Box::new(index),
                        },
                        TextLocation::new(start, self.here()),
                    );
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_call_args(&mut self) -> Result<(Vec<Expr>, Vec<(crate::string_interning::StringId, Expr)>), EmberError> {
        let mut args = Vec::new();
        let mut kwargs = Vec::new();
        if self.check(&TokenKind::RParen) {
            return Ok((args, kwargs));
        }
        loop {
            if let TokenKind::Identifier(id) = self.peek_kind().clone() {
                if matches!(
                    self.tokens.get(self.pos + 1).map(|t| &t.kind),
                    Some(TokenKind::Assign)
                ) {
                    self.advance();
                    self.advance();
                    let value = self.parse_expr()?;
                    kwargs.push((id, value));
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                    continue;
                }
            }
            args.push(self.parse_expr()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
            if self.check(&TokenKind::RParen) {
                break;
            }
        }
        Ok((args, kwargs))
    }

    fn parse_atom(&mut self) -> Result<Expr, EmberError> {
        let start = self.here();
        let tok = self.peek().clone();
        let expr = match tok.kind {
            TokenKind::Int(v) => {
                self.advance();
                Expr::new(ExprKind::Literal(Literal::Int(v)), TextLocation::new(start, self.here()))
            }
            TokenKind::BigIntLiteral(id) => {
                self.advance();
                Expr::new(
                    ExprKind::Literal(Literal::BigInt(id)),
                    TextLocation::new(start, self.here()),
                )
            }
            TokenKind::Float(v) => {
                self.advance();
                Expr::new(ExprKind::Literal(Literal::Float(v)), TextLocation::new(start, self.here()))
            }
            TokenKind::Complex(v) => {
                self.advance();
                Expr::new(ExprKind::Literal(Literal::Complex(v)), TextLocation::new(start, self.here()))
            }
            TokenKind::Bool(v) => {
                self.advance();
                Expr::new(ExprKind::Literal(Literal::Bool(v)), TextLocation::new(start, self.here()))
            }
            TokenKind::None => {
                self.advance();
                Expr::new(ExprKind::Literal(Literal::None), TextLocation::new(start, self.here()))
            }
            TokenKind::StringLiteral { text, kind } => {
                self.advance();
                match kind {
                    StringLiteralKind::Bytes => Expr::new(
                        ExprKind::Literal(Literal::Bytes(text)),
                        TextLocation::new(start, self.here()),
                    ),
                    StringLiteralKind::FStringStart => self.parse_fstring_body(text, start)?,
                    _ => Expr::new(
                        ExprKind::Literal(Literal::Str(text)),
                        TextLocation::new(start, self.here()),
                    ),
                }
            }
            TokenKind::Identifier(id) => {
                self.advance();
                Expr::new(ExprKind::Identifier(id), TextLocation::new(start, self.here()))
            }
            TokenKind::Keyword(Keyword::Await) => {
                self.advance();
                let inner = self.parse_unary()?;
                Expr::new(ExprKind::Await(Box::new(inner)), TextLocation::new(start, self.here()))
            }
            TokenKind::Keyword(Keyword::Yield) => {
                self.advance();
                if self.check_keyword(Keyword::From) {
                    self.advance();
                    let inner = self.parse_expr()?;
                    Expr::new(ExprKind::YieldFrom(Box::new(inner)), TextLocation::new(start, self.here()))
                } else if matches!(
                    self.peek_kind(),
                    TokenKind::Newline | TokenKind::Eof | TokenKind::RParen
                ) {
                    Expr::new(ExprKind::Yield(None), TextLocation::new(start, self.here()))
                } else {
                    let inner = self.parse_expr()?;
                    Expr::new(ExprKind::Yield(Some(Box::new(inner))), TextLocation::new(start, self.here()))
                }
            }
            TokenKind::LParen => self.parse_paren_or_tuple(start)?,
            TokenKind::LBracket => self.parse_list_or_comprehension(start)?,
            TokenKind::LBrace => self.parse_set_or_dict(start)?,
            _ => return Err(self.syntax_error("expected an expression", start)),
        };
        Ok(expr)
    }

    /// The literal template text carried by an `f"..."` token is re-lexed
    /// and re-parsed wherever a `{expr}` placeholder appears, matching
    /// spec.md §4.1's "parsed as nested lexical contexts" requirement:
    /// the raw text between braces becomes its own source slice, tokenized
    /// and parsed with a fresh `Lexer`/`Parser`.
    fn parse_fstring_body(
        &mut self,
        text: crate::string_interning::StringId,
        start: CharPosition,
    ) -> Result<Expr, EmberError> {
        let template = self.string_table.resolve(text).to_string();
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '{' {
                if !literal.is_empty() {
                    let id = self.string_table.intern(&literal);
                    segments.push(FStringSegment::Literal(id));
                    literal.clear();
                }
                let mut depth = 1;
                let mut expr_src = String::new();
                for c in chars.by_ref() {
                    if c == '{' {
                        depth += 1;
                    } else if c == '}' {
                        depth -= 1;
                        if depth == 0 {
                            break;
                        }
                    }
                    expr_src.push(c);
                }
                let tokens = Lexer::tokenize(&expr_src, &self.file, self.string_table)?;
                let mut sub_parser = Parser::new(tokens, &self.file, self.string_table);
                let expr = sub_parser.parse_expr()?;
                segments.push(FStringSegment::Expr(Box::new(expr)));
            } else {
                literal.push(c);
            }
        }
        if !literal.is_empty() {
            let id = self.string_table.intern(&literal);
            segments.push(FStringSegment::Literal(id));
        }
        Ok(Expr::new(
            ExprKind::FString { segments },
            TextLocation::new(start, self.here()),
        ))
    }

    fn parse_paren_or_tuple(&mut self, start: CharPosition) -> Result<Expr, EmberError> {
        self.advance(); // `(`
        if self.eat(&TokenKind::RParen) {
            return Ok(Expr::new(
                ExprKind::Tuple(Vec::new()),
                TextLocation::new(start, self.here()),
            ));
        }
        let first = self.parse_expr()?;
        if self.check(&TokenKind::Comma) {
            let mut items = vec![first];
            while self.eat(&TokenKind::Comma) {
                if self.check(&TokenKind::RParen) {
                    break;
                }
                items.push(self.parse_expr()?);
            }
            self.expect(TokenKind::RParen, "')'")?;
            return Ok(Expr::new(
                ExprKind::Tuple(items),
                TextLocation::new(start, self.here()),
            ));
        }
        self.expect(TokenKind::RParen, "')'")?;
        Ok(first)
    }

    fn parse_list_or_comprehension(&mut self, start: CharPosition) -> Result<Expr, EmberError> {
        self.advance(); // `[`
        if self.eat(&TokenKind::RBracket) {
            return Ok(Expr::new(
                ExprKind::ListLiteral(Vec::new()),
                TextLocation::new(start, self.here()),
            ));
        }
        let first = self.parse_expr()?;
        if self.check_keyword(Keyword::For) || self.check_keyword(Keyword::Async) {
            let clauses = self.parse_comp_clauses()?;
            self.expect(TokenKind::RBracket, "']'")?;
            return Ok(Expr::new(
                ExprKind::Comprehension {
                    kind: Comprehension::List,
                    element: Box::new(first),
                    value: None,
                    clauses,
                },
                TextLocation::new(start, self.here()),
            ));
        }
        let mut items = vec![first];
        while self.eat(&TokenKind::Comma) {
            if self.check(&TokenKind::RBracket) {
                break;
            }
            items.push(self.parse_expr()?);
        }
        self.expect(TokenKind::RBracket, "']'")?;
        Ok(Expr::new(
            ExprKind::ListLiteral(items),
            TextLocation::new(start, self.here()),
        ))
    }

    fn parse_set_or_dict(&mut self, start: CharPosition) -> Result<Expr, EmberError> {
        self.advance(); // `{`
        if self.eat(&TokenKind::RBrace) {
            return Ok(Expr::new(
                ExprKind::DictLiteral(Vec::new()),
                TextLocation::new(start, self.here()),
            ));
        }
        let first_key = self.parse_expr()?;
        if self.eat(&TokenKind::Colon) {
            let first_value = self.parse_expr()?;
            if self.check_keyword(Keyword::For) || self.check_keyword(Keyword::Async) {
                let clauses = self.parse_comp_clauses()?;
                self.expect(TokenKind::RBrace, "'}'")?;
                return Ok(Expr::new(
                    ExprKind::Comprehension {
                        kind: Comprehension::Dict,
                        element: Box::new(first_key),
                        value: Some(Box::new(first_value)),
                        clauses,
                    },
                    TextLocation::new(start, self.here()),
                ));
            }
            let mut pairs = vec![(first_key, first_value)];
            while self.eat(&TokenKind::Comma) {
                if self.check(&TokenKind::RBrace) {
                    break;
                }
                let key = self.parse_expr()?;
                self.expect(TokenKind::Colon, "':'")?;
                let value = self.parse_expr()?;
                pairs.push((key, value));
            }
            self.expect(TokenKind::RBrace, "'}'")?;
            return Ok(Expr::new(
                ExprKind::DictLiteral(pairs),
                TextLocation::new(start, self.here()),
            ));
        }
        if self.check_keyword(Keyword::For) || self.check_keyword(Keyword::Async) {
            let clauses = self.parse_comp_clauses()?;
            self.expect(TokenKind::RBrace, "'}'")?;
            return Ok(Expr::new(
                ExprKind::Comprehension {
                    kind: Comprehension::Set,
                    element: Box::new(first_key),
                    value: None,
                    clauses,
                },
                TextLocation::new(start, self.here()),
            ));
        }
        let mut items = vec![first_key];
        while self.eat(&TokenKind::Comma) {
            if self.check(&TokenKind::RBrace) {
                break;
            }
            items.push(self.parse_expr()?);
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(Expr::new(
            ExprKind::SetLiteral(items),
            TextLocation::new(start, self.here()),
        ))
    }

    fn parse_comp_clauses(&mut self) -> Result<Vec<CompClause>, EmberError> {
        let mut clauses = Vec::new();
        loop {
            let is_async = self.eat(&TokenKind::Keyword(Keyword::Async));
            if !self.check_keyword(Keyword::For) {
                break;
            }
            self.advance();
            let target = self.parse_or()?;
            self.expect_keyword(Keyword::In, "'in'")?;
            let iter = self.parse_or()?;
            let mut conditions = Vec::new();
            while self.check_keyword(Keyword::If) {
                self.advance();
                conditions.push(self.parse_or()?);
            }
            clauses.push(CompClause {
                target,
                iter,
                conditions,
                is_async,
            });
        }
        Ok(clauses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::NodeKind;

    fn parse(src: &str) -> Module {
        let mut table = StringTable::new();
        Parser::parse_source(src, Path::new("test.ember"), &mut table).unwrap()
    }

    #[test]
    fn fibonacci_function_parses() {
        let module = parse("def fib(n):\n    if n <= 1:\n        return n\n    return fib(n - 1) + fib(n - 2)\n");
        assert_eq!(module.body.len(), 1);
        assert!(matches!(module.body[0].kind, NodeKind::Function(_)));
    }

    #[test]
    fn chained_comparison_desugars_to_and() {
        let module = parse("x = a < b < c\n");
        let NodeKind::Assignment { value, .. } = &module.body[0].kind else {
            panic!("expected assignment");
        };
        assert!(matches!(value.kind, ExprKind::BoolOp { op: BinOp::And, .. }));
    }

    #[test]
    fn augmented_assignment_on_identifier_desugars() {
        let module = parse("x += 1\n");
        let NodeKind::Assignment { value, .. } = &module.body[0].kind else {
            panic!("expected desugared assignment");
        };
        assert!(matches!(value.kind, ExprKind::BinOp { op: BinOp::Add, .. }));
    }

    #[test]
    fn augmented_assignment_on_subscript_is_preserved() {
        let module = parse("a[0] += 1\n");
        assert!(matches!(module.body[0].kind, NodeKind::AugAssign { .. }));
    }

    #[test]
    fn power_is_right_associative() {
        let module = parse("x = 2 ** 3 ** 2\n");
        let NodeKind::Assignment { value, .. } = &module.body[0].kind else {
            panic!("expected assignment");
        };
        let ExprKind::BinOp { right, .. } = &value.kind else {
            panic!("expected binop");
        };
        assert!(matches!(right.kind, ExprKind::BinOp { .. }));
    }

    #[test]
    fn list_comprehension_parses() {
        let module = parse("x = [i * 2 for i in range(10) if i > 1]\n");
        let NodeKind::Assignment { value, .. } = &module.body[0].kind else {
            panic!("expected assignment");
        };
        assert!(matches!(value.kind, ExprKind::Comprehension { .. }));
    }

    #[test]
    fn unterminated_block_reports_syntax_error() {
        let mut table = StringTable::new();
        let err = Parser::parse_source("def f(:\n    pass\n", Path::new("t.ember"), &mut table)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Syntax);
    }
}
