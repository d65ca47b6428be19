//! Expression parsing with Pratt precedence climbing.

use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::error::ParserError;
use crate::lexer::TokenKind;
use crate::parser::core::{ParseResult, Parser};
use crate::parser::precedence::{get_precedence, Precedence};

impl Parser {
    /// Parse an expression, consuming operators that bind tighter than
    /// `min`.
    pub(crate) fn expression(&mut self, min: Precedence) -> ParseResult<Expr> {
        let mut left = self.prefix()?;
        while get_precedence(&self.peek().kind) > min {
            left = self.infix(left)?;
        }
        Ok(left)
    }

    fn prefix(&mut self) -> ParseResult<Expr> {
        let token = self.advance();
        match token.kind {
            TokenKind::IntLiteral(value) => Ok(Expr::IntLiteral(value)),
            TokenKind::StringLiteral(value) => Ok(Expr::StringLiteral(value)),
            TokenKind::True => Ok(Expr::BoolLiteral(true)),
            TokenKind::False => Ok(Expr::BoolLiteral(false)),
            TokenKind::Identifier(name) => Ok(Expr::Variable(name)),
            TokenKind::Bang => {
                let operand = self.expression(Precedence::Unary)?;
                Ok(Expr::Unary {
                    operator: UnaryOp::Not,
                    operand: Box::new(operand),
                })
            }
            TokenKind::Minus => {
                let operand = self.expression(Precedence::Unary)?;
                Ok(Expr::Unary {
                    operator: UnaryOp::Negate,
                    operand: Box::new(operand),
                })
            }
            TokenKind::LeftParen => {
                let expr = self.expression(Precedence::None)?;
                self.expect(&TokenKind::RightParen)?;
                Ok(expr)
            }
            TokenKind::If => self.if_expression(),
            TokenKind::LeftBracket => self.array_literal(),
            TokenKind::LeftBrace => self.hash_literal(),
            kind => Err(ParserError::NoParseRule {
                found: kind.to_string(),
                line: token.line,
            }),
        }
    }

    fn infix(&mut self, left: Expr) -> ParseResult<Expr> {
        let token = self.advance();
        let precedence = get_precedence(&token.kind);
        let operator = match token.kind {
            TokenKind::Plus => BinaryOp::Add,
            TokenKind::Minus => BinaryOp::Subtract,
            TokenKind::Star => BinaryOp::Multiply,
            TokenKind::Slash => BinaryOp::Divide,
            TokenKind::EqualEqual => BinaryOp::Equal,
            TokenKind::BangEqual => BinaryOp::NotEqual,
            TokenKind::Less => BinaryOp::Less,
            TokenKind::Greater => BinaryOp::Greater,
            kind => {
                return Err(ParserError::NoParseRule {
                    found: kind.to_string(),
                    line: token.line,
                })
            }
        };
        // Same-precedence operators stop the climb: left-associative.
        let right = self.expression(precedence)?;
        Ok(Expr::Binary {
            left: Box::new(left),
            operator,
            right: Box::new(right),
        })
    }

    fn if_expression(&mut self) -> ParseResult<Expr> {
        self.expect(&TokenKind::LeftParen)?;
        let condition = self.expression(Precedence::None)?;
        self.expect(&TokenKind::RightParen)?;
        self.expect(&TokenKind::LeftBrace)?;
        let consequence = self.block()?;
        let alternative = if self.match_token(&TokenKind::Else) {
            self.expect(&TokenKind::LeftBrace)?;
            Some(self.block()?)
        } else {
            None
        };
        Ok(Expr::If {
            condition: Box::new(condition),
            consequence,
            alternative,
        })
    }

    fn array_literal(&mut self) -> ParseResult<Expr> {
        let mut elements = Vec::new();
        if !self.check(&TokenKind::RightBracket) {
            loop {
                elements.push(self.expression(Precedence::None)?);
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RightBracket)?;
        Ok(Expr::Array(elements))
    }

    fn hash_literal(&mut self) -> ParseResult<Expr> {
        let mut pairs = Vec::new();
        if !self.check(&TokenKind::RightBrace) {
            loop {
                let key = self.expression(Precedence::None)?;
                self.expect(&TokenKind::Colon)?;
                let value = self.expression(Precedence::None)?;
                pairs.push((key, value));
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RightBrace)?;
        Ok(Expr::Hash(pairs))
    }
}
