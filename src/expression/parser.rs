use crate::error::{DmError, Result};

use super::lexer::{tokenize, Keyword, Op, Token, TokenKind};
use super::{BinaryOp, Expr, Function, Value, Variable};

/// 優先順位の低い順: OR, AND, NOT, 比較, 加減算・連結, 乗除算, 単項マイナス
pub(crate) fn parse(text: &str) -> Result<Expr> {
    let tokens = tokenize(text)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;
    match parser.peek() {
        TokenKind::Eof => Ok(expr),
        other => Err(parser.error(format!("unexpected token {:?}", other))),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].kind
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        let index = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[index].kind
    }

    fn position(&self) -> usize {
        self.tokens[self.pos.min(self.tokens.len() - 1)].pos
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        kind
    }

    fn error(&self, message: impl Into<String>) -> DmError {
        DmError::expression(message, self.position())
    }

    fn eat_keyword(&mut self, keyword: Keyword) -> bool {
        if *self.peek() == TokenKind::Keyword(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<()> {
        if *self.peek() == kind {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!("expected {}", what)))
        }
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.eat_keyword(Keyword::Or) {
            let right = self.parse_and()?;
            left = Expr::binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_not()?;
        while self.eat_keyword(Keyword::And) {
            let right = self.parse_not()?;
            left = Expr::binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if self.eat_keyword(Keyword::Not) {
            let inner = self.parse_not()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let left = self.parse_additive()?;

        let op = match self.peek() {
            TokenKind::Op(Op::Eq) => Some(BinaryOp::Eq),
            TokenKind::Op(Op::Ne) => Some(BinaryOp::Ne),
            TokenKind::Op(Op::Lt) => Some(BinaryOp::Lt),
            TokenKind::Op(Op::Le) => Some(BinaryOp::Le),
            TokenKind::Op(Op::Gt) => Some(BinaryOp::Gt),
            TokenKind::Op(Op::Ge) => Some(BinaryOp::Ge),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let right = self.parse_additive()?;
            return Ok(Expr::binary(op, left, right));
        }

        if self.eat_keyword(Keyword::Is) {
            let negated = self.eat_keyword(Keyword::Not);
            if !self.eat_keyword(Keyword::Null) {
                return Err(self.error("expected NULL after IS"));
            }
            return Ok(Expr::IsNull {
                expr: Box::new(left),
                negated,
            });
        }

        // NOT IN / NOT LIKE
        let negated = matches!(self.peek(), TokenKind::Keyword(Keyword::Not))
            && matches!(
                self.peek_at(1),
                TokenKind::Keyword(Keyword::In | Keyword::Like | Keyword::ILike)
            );
        if negated {
            self.advance();
        }

        match self.peek() {
            TokenKind::Keyword(Keyword::In) => {
                self.advance();
                self.expect(TokenKind::LParen, "'(' after IN")?;
                let mut list = vec![self.parse_or()?];
                while *self.peek() == TokenKind::Comma {
                    self.advance();
                    list.push(self.parse_or()?);
                }
                self.expect(TokenKind::RParen, "')'")?;
                Ok(Expr::In {
                    expr: Box::new(left),
                    list,
                    negated,
                })
            }
            TokenKind::Keyword(keyword @ (Keyword::Like | Keyword::ILike)) => {
                let case_insensitive = *keyword == Keyword::ILike;
                self.advance();
                let pattern = self.parse_additive()?;
                Ok(Expr::Like {
                    expr: Box::new(left),
                    pattern: Box::new(pattern),
                    case_insensitive,
                    negated,
                })
            }
            _ => Ok(left),
        }
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                TokenKind::Op(Op::Plus) => BinaryOp::Add,
                TokenKind::Op(Op::Minus) => BinaryOp::Sub,
                TokenKind::Op(Op::Concat) => BinaryOp::Concat,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                TokenKind::Op(Op::Star) => BinaryOp::Mul,
                TokenKind::Op(Op::Slash) => BinaryOp::Div,
                TokenKind::Op(Op::Percent) => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        match self.peek() {
            TokenKind::Op(Op::Minus) => {
                self.advance();
                Ok(Expr::Negate(Box::new(self.parse_unary()?)))
            }
            TokenKind::Op(Op::Plus) => {
                self.advance();
                self.parse_unary()
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let pos = self.position();
        match self.advance() {
            TokenKind::Int(v) => Ok(Expr::Literal(Value::Int(v))),
            TokenKind::Float(v) => Ok(Expr::Literal(Value::Double(v))),
            TokenKind::Str(v) => Ok(Expr::Literal(Value::Text(v))),
            TokenKind::Keyword(Keyword::True) => Ok(Expr::Literal(Value::Bool(true))),
            TokenKind::Keyword(Keyword::False) => Ok(Expr::Literal(Value::Bool(false))),
            TokenKind::Keyword(Keyword::Null) => Ok(Expr::Literal(Value::Null)),
            TokenKind::QuotedIdent(name) => Ok(Expr::Column(name)),
            TokenKind::Variable(name) => Variable::from_name(&name)
                .map(Expr::Variable)
                .ok_or_else(|| DmError::expression(format!("unknown variable ${}", name), pos)),
            TokenKind::Ident(name) => {
                if *self.peek() == TokenKind::LParen {
                    self.advance();
                    self.parse_call(&name, pos)
                } else {
                    Ok(Expr::Column(name))
                }
            }
            TokenKind::LParen => {
                let inner = self.parse_or()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            TokenKind::Eof => Err(DmError::expression("unexpected end of expression", pos)),
            other => Err(DmError::expression(
                format!("unexpected token {:?}", other),
                pos,
            )),
        }
    }

    fn parse_call(&mut self, name: &str, pos: usize) -> Result<Expr> {
        let function = Function::from_name(name)
            .ok_or_else(|| DmError::expression(format!("unknown function {}", name), pos))?;

        let mut args = Vec::new();
        if *self.peek() != TokenKind::RParen {
            args.push(self.parse_or()?);
            while *self.peek() == TokenKind::Comma {
                self.advance();
                args.push(self.parse_or()?);
            }
        }
        self.expect(TokenKind::RParen, "')'")?;

        if !function.accepts(args.len()) {
            return Err(DmError::expression(
                format!("wrong number of arguments for {}: {}", name, args.len()),
                pos,
            ));
        }
        Ok(Expr::Function { function, args })
    }
}
