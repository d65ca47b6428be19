//! Statement parsing.

use crate::ast::Stmt;
use crate::lexer::TokenKind;
use crate::parser::core::{ParseResult, Parser};
use crate::parser::precedence::Precedence;

impl Parser {
    pub(crate) fn statement(&mut self) -> ParseResult<Stmt> {
        if self.match_token(&TokenKind::Let) {
            self.let_statement()
        } else {
            self.expression_statement()
        }
    }

    fn let_statement(&mut self) -> ParseResult<Stmt> {
        let name = self.expect_identifier()?;
        self.expect(&TokenKind::Equal)?;
        let value = self.expression(Precedence::None)?;
        self.match_token(&TokenKind::Semicolon);
        Ok(Stmt::Let { name, value })
    }

    fn expression_statement(&mut self) -> ParseResult<Stmt> {
        let expr = self.expression(Precedence::None)?;
        self.match_token(&TokenKind::Semicolon);
        Ok(Stmt::Expression(expr))
    }

    /// Statements between `{` and `}`. The opening brace has already
    /// been consumed.
    pub(crate) fn block(&mut self) -> ParseResult<Vec<Stmt>> {
        let mut statements = Vec::new();
        while !self.check(&TokenKind::RightBrace) && !self.is_at_end() {
            statements.push(self.statement()?);
        }
        self.expect(&TokenKind::RightBrace)?;
        Ok(statements)
    }
}
