//! Recursive-descent parser with precedence climbing for binary operators
//! (spec §4.2). On an unexpected token the parser records a structured
//! diagnostic and recovers in panic mode to the next statement boundary, so
//! a single run can report more than one error.

use crate::ast::*;
use crate::error::{Diagnostic, ErrorCode, Span};
use crate::lexer::{Lexer, Token, TokenKind};

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    diagnostics: Vec<Diagnostic>,
    /// Type of each `var` seen so far, keyed by name, so a later bare
    /// `var name[idx] = expr` index-assignment line can reuse the type its
    /// `var name: Type` header declared (spec §4.6 time-indexed recurrence).
    var_types: std::collections::HashMap<String, TypeAnnotation>,
}

type PResult<T> = Result<T, ()>;

impl Parser {
    pub fn new(source: &str) -> Self {
        Parser {
            tokens: Lexer::tokenize(source),
            pos: 0,
            diagnostics: Vec::new(),
            var_types: std::collections::HashMap::new(),
        }
    }

    pub fn parse_model(mut self) -> Result<Model, Vec<Diagnostic>> {
        let model = self.model();
        match model {
            Ok(m) if self.diagnostics.is_empty() => Ok(m),
            Ok(_) | Err(()) => Err(self.diagnostics),
        }
    }

    // -- token stream helpers -------------------------------------------------

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn span(&self) -> Span {
        self.peek().span
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(self.peek_kind()) == std::mem::discriminant(kind)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, code: ErrorCode) -> PResult<Token> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            let got = self.peek().lexeme.clone();
            let span = self.span();
            self.diagnostics.push(
                Diagnostic::new(
                    code,
                    format!("expected {kind:?}, got {got:?}"),
                )
                .at(span),
            );
            Err(())
        }
    }

    fn error(&mut self, code: ErrorCode, message: impl Into<String>) {
        let span = self.span();
        self.diagnostics.push(Diagnostic::new(code, message).at(span));
    }

    /// Panic-mode recovery: skip tokens until a likely statement boundary so
    /// the rest of the model can still be checked for additional errors.
    fn recover_to_statement_boundary(&mut self) {
        loop {
            match self.peek_kind() {
                TokenKind::Eof
                | TokenKind::Param
                | TokenKind::Var
                | TokenKind::Constraint
                | TokenKind::Policy
                | TokenKind::RBrace => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    // -- top level --------------------------------------------------------

    fn model(&mut self) -> PResult<Model> {
        let span = self.span();
        self.expect(TokenKind::Model, ErrorCode::E0001)?;
        let name_tok = self.expect_ident()?;
        self.expect(TokenKind::LBrace, ErrorCode::E0001)?;

        let mut decls = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.check(&TokenKind::Eof) {
            match self.decl() {
                Ok(d) => decls.push(d),
                Err(()) => self.recover_to_statement_boundary(),
            }
        }
        self.expect(TokenKind::RBrace, ErrorCode::E0001)?;

        Ok(Model {
            name: name_tok,
            decls,
            span,
        })
    }

    fn expect_ident(&mut self) -> PResult<String> {
        if let TokenKind::Ident(name) = self.peek_kind().clone() {
            self.advance();
            Ok(name)
        } else {
            let span = self.span();
            let got = self.peek().lexeme.clone();
            self.diagnostics.push(
                Diagnostic::new(ErrorCode::E0001, format!("expected identifier, got {got:?}"))
                    .at(span),
            );
            Err(())
        }
    }

    fn decl(&mut self) -> PResult<Decl> {
        match self.peek_kind() {
            TokenKind::Param => self.param_decl().map(Decl::Param),
            TokenKind::Var => self.var_decl().map(Decl::Var),
            TokenKind::Constraint => self.constraint_decl().map(Decl::Constraint),
            TokenKind::Policy => self.policy_decl().map(Decl::Policy),
            _ => {
                let span = self.span();
                let got = self.peek().lexeme.clone();
                self.diagnostics.push(
                    Diagnostic::new(
                        ErrorCode::E0001,
                        format!("expected a declaration, got {got:?}"),
                    )
                    .at(span),
                );
                Err(())
            }
        }
    }

    fn param_decl(&mut self) -> PResult<ParamDecl> {
        let span = self.span();
        self.advance(); // `param`
        let name = self.expect_ident()?;
        self.expect(TokenKind::Colon, ErrorCode::E0001)?;
        let ty = self.type_annotation()?;

        let value_expr = if self.eat(&TokenKind::Assign) {
            self.expr()?
        } else if self.eat(&TokenKind::Tilde) {
            self.distribution_expr()?
        } else {
            self.error(ErrorCode::E0001, "param requires `= value` or `~ Distribution(...)`");
            return Err(());
        };

        let provenance = self.provenance_block()?;

        Ok(ParamDecl {
            name,
            ty,
            value_expr,
            provenance,
            span,
        })
    }

    fn var_decl(&mut self) -> PResult<VarDecl> {
        let span = self.span();
        self.advance(); // `var`
        let name = self.expect_ident()?;

        // `var s: TimeSeries<T>` declares the type; each later `var s[0] = ...`
        // / `var s[t] = ...` is its own statement that carries no `: Type`
        // clause and reuses the type the header declared (spec §4.6). The
        // IR emitter/evaluator merge every `var` sharing a name back into one
        // series, so these statements stay distinct `VarDecl`s here.
        let ty = if self.check(&TokenKind::Colon) {
            self.advance();
            let ty = self.type_annotation()?;
            self.var_types.insert(name.clone(), ty.clone());
            ty
        } else if let Some(ty) = self.var_types.get(&name) {
            ty.clone()
        } else {
            self.error(ErrorCode::E0001, format!("var {name:?} used before its type is declared"));
            return Err(());
        };

        let mut value_expr = None;
        let mut recurrence = None;

        if self.eat(&TokenKind::Assign) {
            value_expr = Some(self.expr()?);
        }
        while self.eat(&TokenKind::Colon) {
            // reserved for chained annotations; no-op today.
        }
        // `s[0] = base` / `s[t] = recurrence`, one or more clauses, either
        // attached directly after a typed header or standalone on a bare
        // `var name[idx] = expr` follow-up statement.
        while self.check(&TokenKind::LBracket) {
            self.advance();
            let index_name = if let TokenKind::Ident(n) = self.peek_kind().clone() {
                self.advance();
                Some(n)
            } else if let TokenKind::Number(n) = self.peek_kind().clone() {
                self.advance();
                if n == 0.0 {
                    None
                } else {
                    self.error(ErrorCode::E0001, "only index 0 may be written literally in a var header");
                    None
                }
            } else {
                None
            };
            self.expect(TokenKind::RBracket, ErrorCode::E0001)?;
            self.expect(TokenKind::Assign, ErrorCode::E0001)?;
            let e = self.expr()?;
            if index_name.is_some() {
                recurrence = Some(e);
            } else {
                value_expr = Some(e);
            }
        }

        Ok(VarDecl {
            name,
            ty,
            value_expr,
            recurrence,
            span,
        })
    }

    fn constraint_decl(&mut self) -> PResult<ConstraintDecl> {
        let span = self.span();
        self.advance(); // `constraint`
        let name = self.expect_ident()?;
        self.expect(TokenKind::Colon, ErrorCode::E0001)?;
        let condition = self.expr()?;

        let mut severity = Severity::Warning;
        let mut message = String::new();
        if self.eat(&TokenKind::LBrace) {
            while !self.check(&TokenKind::RBrace) && !self.check(&TokenKind::Eof) {
                let field = self.expect_ident()?;
                self.expect(TokenKind::Colon, ErrorCode::E0001)?;
                match field.as_str() {
                    "severity" => {
                        let s = self.expect_ident()?;
                        severity = match s.as_str() {
                            "info" => Severity::Info,
                            "warning" => Severity::Warning,
                            "error" => Severity::Error,
                            "fatal" => Severity::Fatal,
                            other => {
                                self.error(
                                    ErrorCode::E0001,
                                    format!("unknown severity '{other}'"),
                                );
                                Severity::Warning
                            }
                        };
                    }
                    "message" => {
                        message = self.expect_string()?;
                    }
                    other => {
                        self.error(ErrorCode::E0001, format!("unknown constraint field '{other}'"));
                    }
                }
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RBrace, ErrorCode::E0001)?;
        }

        Ok(ConstraintDecl {
            name,
            condition,
            severity,
            message,
            span,
        })
    }

    fn policy_decl(&mut self) -> PResult<PolicyDecl> {
        let span = self.span();
        self.advance(); // `policy`
        let name = self.expect_ident()?;
        let mut parameters = Vec::new();
        if self.eat(&TokenKind::LParen) {
            while !self.check(&TokenKind::RParen) {
                parameters.push(self.expect_ident()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RParen, ErrorCode::E0001)?;
        }
        self.expect(TokenKind::LBrace, ErrorCode::E0001)?;
        let mut body = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.check(&TokenKind::Eof) {
            match self.decl() {
                Ok(d) => body.push(d),
                Err(()) => self.recover_to_statement_boundary(),
            }
        }
        self.expect(TokenKind::RBrace, ErrorCode::E0001)?;
        Ok(PolicyDecl {
            name,
            parameters,
            body,
            span,
        })
    }

    fn expect_string(&mut self) -> PResult<String> {
        if let TokenKind::Str(s) = self.peek_kind().clone() {
            self.advance();
            Ok(s)
        } else {
            self.error(ErrorCode::E0001, "expected a string literal");
            Err(())
        }
    }

    fn provenance_block(&mut self) -> PResult<Provenance> {
        self.expect(TokenKind::LBrace, ErrorCode::E0001)?;
        let mut source = String::new();
        let mut method = String::new();
        let mut confidence = 0.0;
        let mut correlated_with = Vec::new();
        let mut calibration_timestamp = None;
        let mut aic = None;
        let mut bic = None;

        while !self.check(&TokenKind::RBrace) && !self.check(&TokenKind::Eof) {
            let field = self.expect_ident()?;
            self.expect(TokenKind::Colon, ErrorCode::E0001)?;
            match field.as_str() {
                "source" => source = self.expect_string()?,
                "method" => method = self.expect_string()?,
                "confidence" => confidence = self.expect_number()?,
                "calibration_timestamp" => calibration_timestamp = Some(self.expect_string()?),
                "aic" => aic = Some(self.expect_number()?),
                "bic" => bic = Some(self.expect_number()?),
                "correlated_with" => {
                    self.expect(TokenKind::LBracket, ErrorCode::E0001)?;
                    while !self.check(&TokenKind::RBracket) {
                        correlated_with.push(self.expect_string()?);
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(TokenKind::RBracket, ErrorCode::E0001)?;
                }
                other => {
                    self.error(ErrorCode::E0001, format!("unknown provenance field '{other}'"));
                }
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBrace, ErrorCode::E0001)?;

        Ok(Provenance {
            source,
            method,
            confidence,
            correlated_with,
            calibration_timestamp,
            aic,
            bic,
        })
    }

    fn expect_number(&mut self) -> PResult<f64> {
        if let TokenKind::Number(n) = self.peek_kind().clone() {
            self.advance();
            Ok(n)
        } else if self.check(&TokenKind::Minus) {
            self.advance();
            let n = self.expect_number()?;
            Ok(-n)
        } else {
            self.error(ErrorCode::E0001, "expected a numeric literal");
            Err(())
        }
    }

    // -- types --------------------------------------------------------------

    fn type_annotation(&mut self) -> PResult<TypeAnnotation> {
        let span = self.span();
        let name = self.expect_ident()?;
        let mut type_args = Vec::new();
        if self.eat(&TokenKind::Lt) {
            loop {
                type_args.push(self.type_annotation()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::Gt, ErrorCode::E0001)?;
        }

        let mut unit_tail = Vec::new();
        let mut seen: Vec<String> = Vec::new();
        loop {
            let is_per = self.check(&TokenKind::Per);
            let is_in = self.check(&TokenKind::In);
            if !is_per && !is_in {
                break;
            }
            self.advance();
            let dim = self.expect_ident()?;
            if seen.contains(&dim) {
                self.error(
                    ErrorCode::E0700,
                    format!("duplicate unit phrase 'per {dim}' in type annotation"),
                );
                return Err(());
            }
            seen.push(dim.clone());
            unit_tail.push((dim, is_per));
        }

        Ok(TypeAnnotation {
            name,
            type_args,
            unit_tail,
            span,
        })
    }

    // -- expressions: precedence climbing ------------------------------------

    pub fn expr(&mut self) -> PResult<Expr> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> PResult<Expr> {
        let mut lhs = self.and_expr()?;
        while self.check(&TokenKind::Or) {
            let span = self.span();
            self.advance();
            let rhs = self.and_expr()?;
            lhs = Expr::Binary {
                op: BinOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> PResult<Expr> {
        let mut lhs = self.comparison()?;
        while self.check(&TokenKind::And) {
            let span = self.span();
            self.advance();
            let rhs = self.comparison()?;
            lhs = Expr::Binary {
                op: BinOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
        Ok(lhs)
    }

    fn comparison(&mut self) -> PResult<Expr> {
        let mut lhs = self.additive()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Eq => BinOp::Eq,
                TokenKind::NotEq => BinOp::NotEq,
                TokenKind::Lt => BinOp::Lt,
                TokenKind::Lte => BinOp::Lte,
                TokenKind::Gt => BinOp::Gt,
                TokenKind::Gte => BinOp::Gte,
                _ => break,
            };
            let span = self.span();
            self.advance();
            let rhs = self.additive()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
        Ok(lhs)
    }

    fn additive(&mut self) -> PResult<Expr> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            let span = self.span();
            self.advance();
            let rhs = self.multiplicative()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
        Ok(lhs)
    }

    fn multiplicative(&mut self) -> PResult<Expr> {
        let mut lhs = self.exponent()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                _ => break,
            };
            let span = self.span();
            self.advance();
            let rhs = self.exponent()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
        Ok(lhs)
    }

    fn exponent(&mut self) -> PResult<Expr> {
        let lhs = self.unary()?;
        if self.check(&TokenKind::StarStar) {
            let span = self.span();
            self.advance();
            // right-associative
            let rhs = self.exponent()?;
            return Ok(Expr::Binary {
                op: BinOp::Pow,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            });
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> PResult<Expr> {
        let span = self.span();
        if self.eat(&TokenKind::Minus) {
            let operand = self.unary()?;
            return Ok(Expr::Unary {
                op: UnOp::Neg,
                operand: Box::new(operand),
                span,
            });
        }
        if self.eat(&TokenKind::Not) {
            let operand = self.unary()?;
            return Ok(Expr::Unary {
                op: UnOp::Not,
                operand: Box::new(operand),
                span,
            });
        }
        self.call_index()
    }

    fn call_index(&mut self) -> PResult<Expr> {
        let mut e = self.primary()?;
        loop {
            if self.check(&TokenKind::LBracket) {
                let span = self.span();
                self.advance();
                let index = self.expr()?;
                self.expect(TokenKind::RBracket, ErrorCode::E0001)?;
                e = Expr::Index {
                    series: Box::new(e),
                    index: Box::new(index),
                    span,
                };
            } else {
                break;
            }
        }
        Ok(e)
    }

    fn primary(&mut self) -> PResult<Expr> {
        let span = self.span();
        match self.peek_kind().clone() {
            TokenKind::Number(value) => {
                let unit_suffix = self.peek().unit_suffix.clone();
                self.advance();
                Ok(Expr::NumberLit {
                    value,
                    unit_suffix,
                    span,
                })
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Expr::StringLit { value: s, span })
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::BoolLit { value: true, span })
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::BoolLit { value: false, span })
            }
            TokenKind::Minus => self.unary(),
            TokenKind::If => self.if_expr(),
            TokenKind::Ident(name) => {
                self.advance();
                if self.check(&TokenKind::LParen) {
                    self.advance();
                    let mut args = Vec::new();
                    while !self.check(&TokenKind::RParen) {
                        args.push(self.expr()?);
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(TokenKind::RParen, ErrorCode::E0001)?;
                    if let Some(kind) = DistKind::from_name(&name) {
                        return Ok(Expr::Distribution { kind, args, span });
                    }
                    return Ok(Expr::Call { func: name, args, span });
                }
                Ok(Expr::Variable { name, span })
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.expr()?;
                self.expect(TokenKind::RParen, ErrorCode::E0001)?;
                Ok(inner)
            }
            _ => {
                let got = self.peek().lexeme.clone();
                self.diagnostics.push(
                    Diagnostic::new(ErrorCode::E0001, format!("unexpected token {got:?}")).at(span),
                );
                Err(())
            }
        }
    }

    fn if_expr(&mut self) -> PResult<Expr> {
        let span = self.span();
        self.advance(); // `if`
        let cond = self.expr()?;
        self.expect(TokenKind::LBrace, ErrorCode::E0001)?;
        let then_branch = self.expr()?;
        self.expect(TokenKind::RBrace, ErrorCode::E0001)?;
        self.expect(TokenKind::Else, ErrorCode::E0001)?;
        self.expect(TokenKind::LBrace, ErrorCode::E0001)?;
        let else_branch = self.expr()?;
        self.expect(TokenKind::RBrace, ErrorCode::E0001)?;
        Ok(Expr::If {
            cond: Box::new(cond),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
            span,
        })
    }

    fn distribution_expr(&mut self) -> PResult<Expr> {
        let e = self.expr()?;
        if matches!(e, Expr::Distribution { .. }) {
            Ok(e)
        } else {
            self.error(ErrorCode::E0001, "expected a distribution after `~`");
            Err(())
        }
    }
}

/// Parse a full `*.pel` source into a `Model`, or the batch of diagnostics
/// collected during lexing/parsing.
pub fn parse(source: &str) -> Result<Model, Vec<Diagnostic>> {
    Parser::new(source).parse_model()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_model() {
        let src = r#"
            model Tiny {
                param price: Currency<USD> = 10 USD { source: "a", method: "b", confidence: 0.9 }
            }
        "#;
        let model = parse(src).unwrap();
        assert_eq!(model.name, "Tiny");
        assert_eq!(model.decls.len(), 1);
    }

    #[test]
    fn rejects_duplicate_per_phrase_with_e0700() {
        let src = r#"
            model M {
                param r: Rate per Month per Month = 0.05/1mo { source:"a", method:"b", confidence:0.9 }
            }
        "#;
        let errs = parse(src).unwrap_err();
        assert!(errs.iter().any(|d| d.code == ErrorCode::E0700));
    }

    #[test]
    fn parses_time_indexed_recurrence() {
        let src = r#"
            model M {
                var mrr: TimeSeries<Currency<USD>>
                var mrr[0] = 1000 USD
                var mrr[t] = mrr[t-1] * 1.10
            }
        "#;
        // Each `var mrr[...]` line is its own VarDecl here; the IR emitter
        // merges same-named var declarations into one series node.
        let model = parse(src).unwrap();
        assert_eq!(model.decls.len(), 3);
    }

    #[test]
    fn parses_precedence_additive_before_multiplicative() {
        let src = r#"
            model M {
                constraint c: 1 + 2 * 3 == 7
            }
        "#;
        let model = parse(src).unwrap();
        match &model.decls[0] {
            Decl::Constraint(c) => match &c.condition {
                Expr::Binary { op: BinOp::Eq, lhs, .. } => {
                    assert!(matches!(**lhs, Expr::Binary { op: BinOp::Add, .. }));
                }
                _ => panic!("expected equality"),
            },
            _ => panic!("expected constraint"),
        }
    }

    #[test]
    fn reports_multiple_errors_in_one_pass() {
        let src = r#"
            model M {
                param bad1: @@@
                param bad2: @@@
            }
        "#;
        let errs = parse(src).unwrap_err();
        assert!(errs.len() >= 2, "expected recovery to surface >1 diagnostic, got {errs:?}");
    }
}
