use crate::{
    arena::NodeIndex,
    errors::Result,
    lexer::{Keyword, TokenKind},
    node_type::NodeType,
    parse_context::ParsingPhase,
};

use super::Parser;

fn binary_precedence(kind: TokenKind) -> Option<u8> {
    Some(match kind {
        TokenKind::OrOr => 1,
        TokenKind::AndAnd => 2,
        TokenKind::Pipe => 3,
        TokenKind::Caret => 4,
        TokenKind::Amp => 5,
        TokenKind::Eq | TokenKind::Ne => 6,
        TokenKind::Lt | TokenKind::Gt | TokenKind::Le | TokenKind::Ge => 7,
        TokenKind::Shl | TokenKind::Shr | TokenKind::Ushr => 8,
        TokenKind::Plus | TokenKind::Minus => 9,
        TokenKind::Star | TokenKind::Slash | TokenKind::Percent => 10,
        _ => return None,
    })
}

const INSTANCEOF_PRECEDENCE: u8 = 7;

impl<'s, 'r> Parser<'s, 'r> {
    pub(crate) fn parse_expression(&mut self) -> Result<()> {
        self.with_recursion(|p| p.parse_assignment())
    }

    pub(crate) fn parse_assignment(&mut self) -> Result<()> {
        if self.is_lambda_start() {
            return self.parse_lambda();
        }
        let cp = self.checkpoint();
        self.parse_ternary()?;
        if self.ctx.current().kind.is_assignment_operator() {
            self.bump()?;
            self.with_recursion(|p| p.parse_assignment())?;
            self.wrap(cp, NodeType::AssignmentExpression)?;
        }
        Ok(())
    }

    /// Conditional level; also the grammar for annotation element values and
    /// case labels, which exclude assignment.
    pub(crate) fn parse_ternary(&mut self) -> Result<()> {
        let cp = self.checkpoint();
        self.parse_binary(1)?;
        if self.at(TokenKind::Question) {
            self.bump()?;
            self.parse_expression()?;
            self.expect(TokenKind::Colon)?;
            self.with_recursion(|p| p.parse_assignment())?;
            self.wrap(cp, NodeType::ConditionalExpression)?;
        }
        Ok(())
    }

    fn parse_binary(&mut self, min_precedence: u8) -> Result<()> {
        let cp = self.checkpoint();
        self.parse_unary()?;
        loop {
            if self.at_keyword(Keyword::Instanceof) && INSTANCEOF_PRECEDENCE >= min_precedence {
                self.bump()?;
                if self.at_keyword(Keyword::Final) {
                    let m = self.open(NodeType::Modifier)?;
                    self.bump()?;
                    self.close(m)?;
                }
                self.parse_instanceof_operand()?;
                self.wrap(cp, NodeType::InstanceofExpression)?;
                continue;
            }
            let Some(precedence) = binary_precedence(self.ctx.current().kind) else {
                break;
            };
            if precedence < min_precedence {
                break;
            }
            self.bump()?;
            self.with_recursion(|p| p.parse_binary(precedence + 1))?;
            self.wrap(cp, NodeType::BinaryExpression)?;
        }
        Ok(())
    }

    fn parse_instanceof_operand(&mut self) -> Result<()> {
        let is_pattern = self
            .scan_type(0)
            .map_or(false, |after| {
                matches!(
                    self.ctx.peek(after).kind,
                    TokenKind::Identifier | TokenKind::LParen
                )
            });
        if is_pattern {
            self.parse_pattern()
        } else {
            self.parse_type()
        }
    }

    fn parse_unary(&mut self) -> Result<()> {
        self.with_recursion(|p| match p.ctx.current().kind {
            TokenKind::PlusPlus
            | TokenKind::MinusMinus
            | TokenKind::Plus
            | TokenKind::Minus
            | TokenKind::Bang
            | TokenKind::Tilde => {
                let cp = p.checkpoint();
                p.bump()?;
                p.parse_unary()?;
                p.wrap(cp, NodeType::UnaryExpression)?;
                Ok(())
            }
            TokenKind::LParen if p.is_cast_start() => {
                let cp = p.checkpoint();
                p.bump()?;
                let types = p.checkpoint();
                p.parse_type()?;
                let mut count = 1;
                while p.at(TokenKind::Amp) {
                    p.bump()?;
                    p.parse_type()?;
                    count += 1;
                }
                if count > 1 {
                    p.wrap(types, NodeType::IntersectionType)?;
                }
                p.expect(TokenKind::RParen)?;
                if p.is_lambda_start() {
                    p.parse_lambda()?;
                } else {
                    p.parse_unary()?;
                }
                p.wrap(cp, NodeType::CastExpression)?;
                Ok(())
            }
            _ => p.parse_postfix(),
        })
    }

    fn parse_postfix(&mut self) -> Result<()> {
        let cp = self.checkpoint();
        self.parse_primary()?;
        loop {
            match self.ctx.current().kind {
                TokenKind::Dot => match self.ctx.peek(1).kind {
                    TokenKind::Identifier => {
                        self.bump()?;
                        self.bump()?;
                        if self.at(TokenKind::LParen) {
                            self.parse_argument_list()?;
                            self.wrap(cp, NodeType::MethodInvocation)?;
                        } else {
                            self.wrap(cp, NodeType::FieldAccess)?;
                        }
                    }
                    TokenKind::Keyword(Keyword::Class) => {
                        self.bump()?;
                        self.bump()?;
                        self.wrap(cp, NodeType::ClassLiteral)?;
                    }
                    TokenKind::Keyword(Keyword::This) => {
                        self.bump()?;
                        self.bump()?;
                        self.wrap(cp, NodeType::ThisExpression)?;
                    }
                    TokenKind::Keyword(Keyword::Super) => {
                        self.bump()?;
                        self.bump()?;
                    }
                    TokenKind::Keyword(Keyword::New) => {
                        self.bump()?;
                        self.parse_creation()?;
                        self.wrap(cp, NodeType::ObjectCreationExpression)?;
                    }
                    TokenKind::Lt => {
                        self.bump()?;
                        self.parse_type_arguments()?;
                        if self.at(TokenKind::Identifier) {
                            self.bump()?;
                        }
                        if self.at(TokenKind::LParen) {
                            self.parse_argument_list()?;
                        }
                        self.wrap(cp, NodeType::MethodInvocation)?;
                    }
                    _ => {
                        self.error_unexpected("a member name");
                        break;
                    }
                },
                TokenKind::LParen => {
                    self.parse_argument_list()?;
                    self.wrap(cp, NodeType::MethodInvocation)?;
                }
                TokenKind::LBracket => {
                    if self.ctx.nth_is(1, TokenKind::RBracket) {
                        // dims, as in `int[].class`
                        self.bump()?;
                        self.bump()?;
                        self.wrap(cp, NodeType::ArrayType)?;
                    } else {
                        self.bump()?;
                        self.parse_expression()?;
                        self.expect(TokenKind::RBracket)?;
                        self.wrap(cp, NodeType::ArrayAccess)?;
                    }
                }
                TokenKind::ColonColon => {
                    self.bump()?;
                    if self.at(TokenKind::Lt) {
                        self.parse_type_arguments()?;
                    }
                    if self.at(TokenKind::Identifier) || self.at_keyword(Keyword::New) {
                        self.bump()?;
                    } else {
                        self.error_unexpected("a method name");
                    }
                    self.wrap(cp, NodeType::MethodReference)?;
                }
                TokenKind::PlusPlus | TokenKind::MinusMinus => {
                    self.bump()?;
                    self.wrap(cp, NodeType::PostfixExpression)?;
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn parse_primary(&mut self) -> Result<()> {
        // expression-position strategy dispatch: switch expressions and
        // (preview) string templates
        let consult_registry = self.at_keyword(Keyword::Switch)
            || (self.at(TokenKind::Identifier)
                && self.ctx.nth_is(1, TokenKind::Dot)
                && matches!(
                    self.ctx.peek(2).kind,
                    TokenKind::StringLiteral | TokenKind::TextBlock
                ));
        if consult_registry {
            let registry = self.registry;
            if let Some(strategy) = registry.select(self.version, self.ctx.phase(), &self.ctx) {
                strategy.parse(self)?;
                return Ok(());
            }
        }
        match self.ctx.current().kind {
            kind if kind.is_literal() => {
                self.bump()?;
            }
            TokenKind::Keyword(
                Keyword::True | Keyword::False | Keyword::Null | Keyword::This | Keyword::Super,
            ) => {
                self.bump()?;
            }
            TokenKind::Identifier => {
                self.bump()?;
            }
            TokenKind::LParen => {
                let m = self.open(NodeType::ParenthesizedExpression)?;
                self.bump()?;
                self.parse_expression()?;
                self.expect(TokenKind::RParen)?;
                self.close(m)?;
            }
            TokenKind::Keyword(Keyword::New) => {
                self.parse_creation()?;
            }
            TokenKind::Keyword(Keyword::Switch) => {
                self.parse_switch_construct(true)?;
            }
            TokenKind::Keyword(keyword) if keyword.is_primitive_type() || keyword == Keyword::Void =>
            {
                // `int.class`, `void.class`; postfix picks up dims and `.class`
                self.bump()?;
            }
            _ => {
                self.error_unexpected("an expression");
                if !matches!(
                    self.ctx.current().kind,
                    TokenKind::Semicolon
                        | TokenKind::RBrace
                        | TokenKind::RParen
                        | TokenKind::RBracket
                        | TokenKind::Comma
                        | TokenKind::Colon
                        | TokenKind::Eof
                ) {
                    self.bump()?;
                }
            }
        }
        Ok(())
    }

    pub(crate) fn parse_creation(&mut self) -> Result<()> {
        let m = self.open(NodeType::ObjectCreationExpression)?;
        self.bump()?; // new
        if self.at(TokenKind::Lt) {
            self.parse_type_arguments()?;
        }
        self.parse_type()?;
        if self.at(TokenKind::LParen) {
            self.parse_argument_list()?;
            if self.at(TokenKind::LBrace) {
                // anonymous class
                self.parse_class_body(ParsingPhase::ClassBody)?;
            }
        } else {
            self.retype(&m, NodeType::ArrayCreationExpression);
            while self.at(TokenKind::LBracket) {
                self.bump()?;
                if !self.at(TokenKind::RBracket) {
                    self.parse_expression()?;
                }
                self.expect(TokenKind::RBracket)?;
            }
            if self.at(TokenKind::LBrace) {
                self.parse_array_initializer()?;
            }
        }
        self.close(m)?;
        Ok(())
    }

    pub(crate) fn parse_array_initializer(&mut self) -> Result<()> {
        self.with_recursion(|p| {
            let m = p.open(NodeType::ArrayInitializer)?;
            p.bump()?; // {
            while !p.at(TokenKind::RBrace) && !p.ctx.at_eof() {
                if p.at(TokenKind::LBrace) {
                    p.parse_array_initializer()?;
                } else {
                    p.parse_expression()?;
                }
                if !p.eat(TokenKind::Comma)? {
                    break;
                }
            }
            p.expect(TokenKind::RBrace)?;
            p.close(m)?;
            Ok(())
        })
    }

    pub(crate) fn parse_argument_list(&mut self) -> Result<()> {
        let m = self.open(NodeType::ArgumentList)?;
        self.bump()?; // (
        if !self.at(TokenKind::RParen) {
            loop {
                self.parse_expression()?;
                if !self.eat(TokenKind::Comma)? {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        self.close(m)?;
        Ok(())
    }

    fn is_lambda_start(&self) -> bool {
        match self.ctx.current().kind {
            TokenKind::Identifier => self.ctx.nth_is(1, TokenKind::Arrow),
            TokenKind::LParen => {
                let mut n = 1;
                let mut depth = 1;
                while depth > 0 && n < 80 {
                    match self.ctx.peek(n).kind {
                        TokenKind::LParen => depth += 1,
                        TokenKind::RParen => depth -= 1,
                        TokenKind::Eof => return false,
                        _ => {}
                    }
                    n += 1;
                }
                depth == 0 && self.ctx.nth_is(n, TokenKind::Arrow)
            }
            _ => false,
        }
    }

    fn parse_lambda(&mut self) -> Result<()> {
        let m = self.open(NodeType::LambdaExpression)?;
        if self.at(TokenKind::Identifier) {
            self.bump()?;
        } else {
            let params = self.open(NodeType::ParameterList)?;
            self.bump()?; // (
            while !self.at(TokenKind::RParen) && !self.ctx.at_eof() {
                let param = self.open(NodeType::Parameter)?;
                self.parse_modifiers()?;
                if let Some(after) = self.scan_type(0) {
                    if self.ctx.peek(after).kind == TokenKind::Identifier {
                        self.parse_type()?;
                    }
                }
                if self.at(TokenKind::Identifier) || self.at_keyword(Keyword::Underscore) {
                    self.bump()?;
                }
                self.close(param)?;
                if !self.eat(TokenKind::Comma)? {
                    break;
                }
            }
            self.expect(TokenKind::RParen)?;
            self.close(params)?;
        }
        self.expect(TokenKind::Arrow)?;
        if self.at(TokenKind::LBrace) {
            self.parse_block()?;
        } else {
            self.parse_expression()?;
        }
        self.close(m)?;
        Ok(())
    }

    /// Preview `STR."..."` template expressions; only reachable through the
    /// preview-gated strategy.
    pub fn parse_template_expression(&mut self) -> Result<NodeIndex> {
        let m = self.open(NodeType::TemplateExpression)?;
        self.bump()?; // processor
        self.expect(TokenKind::Dot)?;
        self.bump()?; // literal
        self.close(m)
    }

    /// Conservative cast lookahead: balanced parens around a type shape with
    /// an operand-starting token after the closer.
    fn is_cast_start(&self) -> bool {
        let Some(after_type) = self.scan_type(1) else {
            return false;
        };
        let mut end = after_type;
        // intersection casts
        while self.ctx.nth_is(end, TokenKind::Amp) {
            match self.scan_type(end + 1) {
                Some(next) => end = next,
                None => return false,
            }
        }
        if !self.ctx.nth_is(end, TokenKind::RParen) {
            return false;
        }
        let next = self.ctx.peek(end + 1).kind;
        if matches!(self.ctx.peek(1).kind, TokenKind::Keyword(keyword) if keyword.is_primitive_type())
        {
            // `(int) anything` is always a cast
            return !matches!(next, TokenKind::Dot);
        }
        matches!(
            next,
            TokenKind::Identifier
                | TokenKind::IntegerLiteral
                | TokenKind::FloatingPointLiteral
                | TokenKind::CharacterLiteral
                | TokenKind::StringLiteral
                | TokenKind::TextBlock
                | TokenKind::LParen
                | TokenKind::Bang
                | TokenKind::Tilde
                | TokenKind::Keyword(Keyword::New)
                | TokenKind::Keyword(Keyword::This)
                | TokenKind::Keyword(Keyword::Super)
                | TokenKind::Keyword(Keyword::True)
                | TokenKind::Keyword(Keyword::False)
                | TokenKind::Keyword(Keyword::Null)
        )
    }
}
