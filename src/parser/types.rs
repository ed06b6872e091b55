use crate::{
    errors::Result,
    lexer::{Keyword, TokenKind},
    node_type::NodeType,
};

use super::Parser;

impl<'s, 'r> Parser<'s, 'r> {
    pub(crate) fn parse_type(&mut self) -> Result<()> {
        self.with_recursion(|p| p.parse_type_inner())
    }

    fn parse_type_inner(&mut self) -> Result<()> {
        let cp = self.checkpoint();
        while self.at(TokenKind::At) && self.ctx.nth_is(1, TokenKind::Identifier) {
            self.parse_annotation()?;
        }
        match self.ctx.current().kind {
            TokenKind::Keyword(keyword)
                if keyword.is_primitive_type() || keyword == Keyword::Void =>
            {
                let m = self.open(NodeType::PrimitiveType)?;
                self.bump()?;
                self.close(m)?;
            }
            TokenKind::Identifier if self.at_word("var") => {
                let m = self.open(NodeType::VarType)?;
                self.bump_as(NodeType::Keyword)?;
                self.close(m)?;
            }
            TokenKind::Identifier => {
                let m = self.open(NodeType::ClassType)?;
                self.bump()?;
                if self.at(TokenKind::Lt) {
                    self.parse_type_arguments()?;
                }
                while self.at(TokenKind::Dot) && self.ctx.nth_is(1, TokenKind::Identifier) {
                    self.bump()?;
                    self.bump()?;
                    if self.at(TokenKind::Lt) {
                        self.parse_type_arguments()?;
                    }
                }
                self.close(m)?;
            }
            _ => {
                self.error_unexpected("a type");
            }
        }
        while self.at(TokenKind::LBracket) && self.ctx.nth_is(1, TokenKind::RBracket) {
            self.bump()?;
            self.bump()?;
            self.wrap(cp, NodeType::ArrayType)?;
        }
        Ok(())
    }

    pub(crate) fn parse_type_arguments(&mut self) -> Result<()> {
        let m = self.open(NodeType::TypeArgumentList)?;
        self.bump()?; // <
        if !self.at_type_argument_close() {
            loop {
                if self.at(TokenKind::Question) {
                    let w = self.open(NodeType::Wildcard)?;
                    self.bump()?;
                    if self.at_keyword(Keyword::Extends) || self.at_keyword(Keyword::Super) {
                        self.bump()?;
                        self.parse_type()?;
                    }
                    self.close(w)?;
                } else {
                    self.parse_type()?;
                }
                if !self.eat(TokenKind::Comma)? {
                    break;
                }
            }
        }
        self.expect_type_argument_close()?;
        self.close(m)?;
        Ok(())
    }

    pub(crate) fn at_type_argument_close(&self) -> bool {
        matches!(
            self.ctx.current().kind,
            TokenKind::Gt
                | TokenKind::Shr
                | TokenKind::Ushr
                | TokenKind::Ge
                | TokenKind::ShrAssign
                | TokenKind::UshrAssign
        )
    }

    /// `catch (A | B e)` types; wrapped as a union only when there is more
    /// than one alternative.
    pub(crate) fn parse_catch_type(&mut self) -> Result<()> {
        let cp = self.checkpoint();
        self.parse_type()?;
        let mut count = 1;
        while self.at(TokenKind::Pipe) {
            self.bump()?;
            self.parse_type()?;
            count += 1;
        }
        if count > 1 {
            self.wrap(cp, NodeType::UnionType)?;
        }
        Ok(())
    }

    /// Type pattern (`String s`) or record pattern (`Point(int x, int y)`).
    pub(crate) fn parse_pattern(&mut self) -> Result<()> {
        self.with_recursion(|p| {
            let cp = p.checkpoint();
            p.parse_type()?;
            if p.at(TokenKind::LParen) {
                p.bump()?;
                if !p.at(TokenKind::RParen) {
                    loop {
                        p.parse_pattern()?;
                        if !p.eat(TokenKind::Comma)? {
                            break;
                        }
                    }
                }
                p.expect(TokenKind::RParen)?;
                p.wrap(cp, NodeType::RecordPattern)?;
            } else {
                if p.at(TokenKind::Identifier) || p.at_keyword(Keyword::Underscore) {
                    p.bump()?;
                }
                p.wrap(cp, NodeType::TypePattern)?;
            }
            Ok(())
        })
    }

    /// Significant-token lookahead over a type shape starting at `n`.
    /// Returns the index just past it, or None when no type begins there.
    pub(crate) fn scan_type(&self, mut n: usize) -> Option<usize> {
        match self.ctx.peek(n).kind {
            TokenKind::Keyword(keyword) if keyword.is_primitive_type() => n += 1,
            TokenKind::Identifier => {
                n += 1;
                if self.ctx.nth_is(n, TokenKind::Lt) {
                    n = self.scan_type_arguments(n)?;
                }
                while self.ctx.nth_is(n, TokenKind::Dot)
                    && self.ctx.peek(n + 1).kind == TokenKind::Identifier
                {
                    n += 2;
                    if self.ctx.nth_is(n, TokenKind::Lt) {
                        n = self.scan_type_arguments(n)?;
                    }
                }
            }
            _ => return None,
        }
        while self.ctx.nth_is(n, TokenKind::LBracket) && self.ctx.nth_is(n + 1, TokenKind::RBracket)
        {
            n += 2;
        }
        Some(n)
    }

    fn scan_type_arguments(&self, mut n: usize) -> Option<usize> {
        let mut depth = 0i32;
        let limit = n + 60;
        while n < limit {
            match self.ctx.peek(n).kind {
                TokenKind::Lt => depth += 1,
                TokenKind::Gt => depth -= 1,
                TokenKind::Shr => depth -= 2,
                TokenKind::Ushr => depth -= 3,
                TokenKind::Identifier
                | TokenKind::Dot
                | TokenKind::Comma
                | TokenKind::Question
                | TokenKind::LBracket
                | TokenKind::RBracket
                | TokenKind::At
                | TokenKind::Keyword(Keyword::Extends)
                | TokenKind::Keyword(Keyword::Super) => {}
                TokenKind::Keyword(keyword) if keyword.is_primitive_type() => {}
                _ => return None,
            }
            n += 1;
            if depth <= 0 {
                return Some(n);
            }
        }
        None
    }
}
