use crate::{
    arena::NodeIndex,
    errors::Result,
    lexer::{Keyword, TokenKind},
    node_type::NodeType,
};

use super::{EciPlacement, Parser};

impl<'s, 'r> Parser<'s, 'r> {
    pub(crate) fn parse_block(&mut self) -> Result<NodeIndex> {
        let m = self.open(NodeType::Block)?;
        self.expect(TokenKind::LBrace)?;
        self.parse_statements_until_rbrace(None)?;
        self.expect(TokenKind::RBrace)?;
        self.close(m)
    }

    /// Constructor body block. `placement` decides where an explicit
    /// constructor invocation is recognized; `Anywhere` is the
    /// flexible-constructor-bodies behavior.
    pub fn parse_constructor_block(&mut self, placement: EciPlacement) -> Result<NodeIndex> {
        let m = self.open(NodeType::Block)?;
        self.expect(TokenKind::LBrace)?;
        self.parse_statements_until_rbrace(Some(placement))?;
        self.expect(TokenKind::RBrace)?;
        self.close(m)
    }

    fn parse_statements_until_rbrace(&mut self, eci: Option<EciPlacement>) -> Result<()> {
        let mut index = 0;
        loop {
            self.flush_trivia()?;
            if self.at(TokenKind::RBrace) || self.ctx.at_eof() {
                break;
            }
            let position = self.ctx.position();
            let eci_site = match eci {
                Some(EciPlacement::Anywhere) => true,
                Some(EciPlacement::FirstOnly) => index == 0,
                None => false,
            };
            if eci_site
                && (self.at_keyword(Keyword::Super) || self.at_keyword(Keyword::This))
                && self.ctx.nth_is(1, TokenKind::LParen)
            {
                self.parse_explicit_constructor_invocation()?;
            } else {
                self.parse_statement()?;
            }
            if self.ctx.position() == position {
                self.bump()?;
            }
            index += 1;
        }
        Ok(())
    }

    fn parse_explicit_constructor_invocation(&mut self) -> Result<NodeIndex> {
        let m = self.open(NodeType::ExplicitConstructorInvocation)?;
        self.bump()?; // super | this
        self.parse_argument_list()?;
        self.expect(TokenKind::Semicolon)?;
        self.close(m)
    }

    pub(crate) fn parse_statement(&mut self) -> Result<NodeIndex> {
        self.with_recursion(|p| p.parse_statement_inner())
    }

    fn parse_statement_inner(&mut self) -> Result<NodeIndex> {
        match self.ctx.current().kind {
            TokenKind::LBrace => self.parse_block(),
            TokenKind::Semicolon => {
                let m = self.open(NodeType::EmptyStatement)?;
                self.bump()?;
                self.close(m)
            }
            TokenKind::Keyword(Keyword::If) => self.parse_if(),
            TokenKind::Keyword(Keyword::While) => self.parse_while(),
            TokenKind::Keyword(Keyword::Do) => self.parse_do_while(),
            TokenKind::Keyword(Keyword::For) => self.parse_for(),
            TokenKind::Keyword(Keyword::Switch) => self.parse_switch_construct(false),
            TokenKind::Keyword(Keyword::Try) => self.parse_try(),
            TokenKind::Keyword(Keyword::Return) => {
                let m = self.open(NodeType::ReturnStatement)?;
                self.bump()?;
                if !self.at(TokenKind::Semicolon) {
                    self.parse_expression()?;
                }
                self.expect(TokenKind::Semicolon)?;
                self.close(m)
            }
            TokenKind::Keyword(Keyword::Throw) => {
                let m = self.open(NodeType::ThrowStatement)?;
                self.bump()?;
                self.parse_expression()?;
                self.expect(TokenKind::Semicolon)?;
                self.close(m)
            }
            TokenKind::Keyword(Keyword::Break) => {
                let m = self.open(NodeType::BreakStatement)?;
                self.bump()?;
                if self.at(TokenKind::Identifier) {
                    self.bump()?;
                }
                self.expect(TokenKind::Semicolon)?;
                self.close(m)
            }
            TokenKind::Keyword(Keyword::Continue) => {
                let m = self.open(NodeType::ContinueStatement)?;
                self.bump()?;
                if self.at(TokenKind::Identifier) {
                    self.bump()?;
                }
                self.expect(TokenKind::Semicolon)?;
                self.close(m)
            }
            TokenKind::Keyword(Keyword::Synchronized) => {
                let m = self.open(NodeType::SynchronizedStatement)?;
                self.bump()?;
                self.expect(TokenKind::LParen)?;
                self.parse_expression()?;
                self.expect(TokenKind::RParen)?;
                self.parse_block()?;
                self.close(m)
            }
            TokenKind::Keyword(Keyword::Assert) => {
                let m = self.open(NodeType::AssertStatement)?;
                self.bump()?;
                self.parse_expression()?;
                if self.eat(TokenKind::Colon)? {
                    self.parse_expression()?;
                }
                self.expect(TokenKind::Semicolon)?;
                self.close(m)
            }
            TokenKind::Identifier if self.ctx.nth_is(1, TokenKind::Colon) => {
                let m = self.open(NodeType::LabeledStatement)?;
                self.bump()?;
                self.bump()?; // :
                self.parse_statement()?;
                self.close(m)
            }
            _ => {
                if self.looks_like_local_type_declaration() {
                    self.parse_type_declaration()
                } else if self.is_yield_statement() {
                    let m = self.open(NodeType::YieldStatement)?;
                    self.bump_as(NodeType::Keyword)?; // yield
                    self.parse_expression()?;
                    self.expect(TokenKind::Semicolon)?;
                    self.close(m)
                } else if self.looks_like_local_variable_declaration() {
                    self.parse_local_variable_declaration()
                } else {
                    let m = self.open(NodeType::ExpressionStatement)?;
                    let position = self.ctx.position();
                    self.parse_expression()?;
                    if self.ctx.position() == position {
                        // nothing consumed; skip to a boundary to make progress
                        self.recover_to(&[TokenKind::Semicolon, TokenKind::RBrace])?;
                    }
                    self.expect(TokenKind::Semicolon)?;
                    self.close(m)
                }
            }
        }
    }

    pub(crate) fn parse_local_variable_declaration(&mut self) -> Result<NodeIndex> {
        let m = self.open(NodeType::LocalVariableDeclaration)?;
        self.parse_modifiers()?;
        if self.at_word("var") && self.ctx.nth_is(1, TokenKind::Identifier) {
            let v = self.open(NodeType::VarType)?;
            self.bump_as(NodeType::Keyword)?;
            self.close(v)?;
        } else {
            self.parse_type()?;
        }
        self.parse_variable_declarators()?;
        self.expect(TokenKind::Semicolon)?;
        self.close(m)
    }

    pub(crate) fn parse_variable_declarators(&mut self) -> Result<()> {
        loop {
            let cp = self.checkpoint();
            if self.at(TokenKind::Identifier) || self.at_keyword(Keyword::Underscore) {
                self.bump()?;
            } else {
                self.error_unexpected("a variable name");
                break;
            }
            while self.at(TokenKind::LBracket) && self.ctx.nth_is(1, TokenKind::RBracket) {
                self.bump()?;
                self.bump()?;
            }
            if self.at(TokenKind::Assign) {
                self.bump()?;
                if self.at(TokenKind::LBrace) {
                    self.parse_array_initializer()?;
                } else {
                    self.parse_expression()?;
                }
            }
            self.wrap(cp, NodeType::VariableDeclarator)?;
            if !self.eat(TokenKind::Comma)? {
                break;
            }
        }
        Ok(())
    }

    fn parse_if(&mut self) -> Result<NodeIndex> {
        let m = self.open(NodeType::IfStatement)?;
        self.bump()?; // if
        self.expect(TokenKind::LParen)?;
        self.parse_expression()?;
        self.expect(TokenKind::RParen)?;
        self.parse_statement()?;
        if self.at_keyword(Keyword::Else) {
            self.bump()?;
            self.parse_statement()?;
        }
        self.close(m)
    }

    fn parse_while(&mut self) -> Result<NodeIndex> {
        let m = self.open(NodeType::WhileStatement)?;
        self.bump()?;
        self.expect(TokenKind::LParen)?;
        self.parse_expression()?;
        self.expect(TokenKind::RParen)?;
        self.parse_statement()?;
        self.close(m)
    }

    fn parse_do_while(&mut self) -> Result<NodeIndex> {
        let m = self.open(NodeType::DoWhileStatement)?;
        self.bump()?;
        self.parse_statement()?;
        self.expect(TokenKind::Keyword(Keyword::While))?;
        self.expect(TokenKind::LParen)?;
        self.parse_expression()?;
        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::Semicolon)?;
        self.close(m)
    }

    fn parse_for(&mut self) -> Result<NodeIndex> {
        let m = self.open(NodeType::ForStatement)?;
        self.bump()?; // for
        self.expect(TokenKind::LParen)?;
        if self.for_header_is_enhanced() {
            self.retype(&m, NodeType::EnhancedForStatement);
            self.parse_modifiers()?;
            if self.at_word("var") && self.ctx.nth_is(1, TokenKind::Identifier) {
                let v = self.open(NodeType::VarType)?;
                self.bump_as(NodeType::Keyword)?;
                self.close(v)?;
            } else {
                self.parse_type()?;
            }
            if self.at(TokenKind::Identifier) || self.at_keyword(Keyword::Underscore) {
                self.bump()?;
            }
            self.expect(TokenKind::Colon)?;
            self.parse_expression()?;
        } else {
            if self.at(TokenKind::Semicolon) {
                self.bump()?;
            } else if self.looks_like_local_variable_declaration() {
                // consumes its own ';'
                self.parse_local_variable_declaration()?;
            } else {
                loop {
                    self.parse_expression()?;
                    if !self.eat(TokenKind::Comma)? {
                        break;
                    }
                }
                self.expect(TokenKind::Semicolon)?;
            }
            if !self.at(TokenKind::Semicolon) {
                self.parse_expression()?;
            }
            self.expect(TokenKind::Semicolon)?;
            if !self.at(TokenKind::RParen) {
                loop {
                    self.parse_expression()?;
                    if !self.eat(TokenKind::Comma)? {
                        break;
                    }
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        self.parse_statement()?;
        self.close(m)
    }

    fn parse_try(&mut self) -> Result<NodeIndex> {
        let m = self.open(NodeType::TryStatement)?;
        self.bump()?; // try
        if self.at(TokenKind::LParen) {
            self.bump()?;
            while !self.at(TokenKind::RParen) && !self.ctx.at_eof() {
                self.parse_resource()?;
                if !self.eat(TokenKind::Semicolon)? {
                    break;
                }
            }
            self.expect(TokenKind::RParen)?;
        }
        self.parse_block()?;
        while self.at_keyword(Keyword::Catch) {
            let c = self.open(NodeType::CatchClause)?;
            self.bump()?;
            self.expect(TokenKind::LParen)?;
            self.parse_modifiers()?;
            self.parse_catch_type()?;
            if self.at(TokenKind::Identifier) || self.at_keyword(Keyword::Underscore) {
                self.bump()?;
            }
            self.expect(TokenKind::RParen)?;
            self.parse_block()?;
            self.close(c)?;
        }
        if self.at_keyword(Keyword::Finally) {
            let f = self.open(NodeType::FinallyBlock)?;
            self.bump()?;
            self.parse_block()?;
            self.close(f)?;
        }
        self.close(m)
    }

    fn parse_resource(&mut self) -> Result<NodeIndex> {
        let m = self.open(NodeType::Resource)?;
        self.parse_modifiers()?;
        let declares = self
            .scan_type(0)
            .map_or(false, |after| {
                self.ctx.peek(after).kind == TokenKind::Identifier
                    && self.ctx.peek(after + 1).kind == TokenKind::Assign
            });
        if declares {
            if self.at_word("var") && self.ctx.nth_is(1, TokenKind::Identifier) {
                let v = self.open(NodeType::VarType)?;
                self.bump_as(NodeType::Keyword)?;
                self.close(v)?;
            } else {
                self.parse_type()?;
            }
            self.bump()?; // name
            self.expect(TokenKind::Assign)?;
            self.parse_expression()?;
        } else {
            // an existing effectively-final variable
            self.parse_expression()?;
        }
        self.close(m)
    }

    /// Statement- or expression-form `switch`, shared by both call sites.
    pub fn parse_switch_construct(&mut self, as_expression: bool) -> Result<NodeIndex> {
        let m = self.open(if as_expression {
            NodeType::SwitchExpression
        } else {
            NodeType::SwitchStatement
        })?;
        self.bump()?; // switch
        self.expect(TokenKind::LParen)?;
        self.parse_expression()?;
        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::LBrace)?;
        loop {
            self.flush_trivia()?;
            if self.at(TokenKind::RBrace) || self.ctx.at_eof() {
                break;
            }
            let position = self.ctx.position();
            if self.at_keyword(Keyword::Case) || self.at_keyword(Keyword::Default) {
                self.parse_switch_group()?;
            } else {
                self.error_unexpected("'case' or 'default'");
                self.bump()?;
            }
            if self.ctx.position() == position {
                self.bump()?;
            }
        }
        self.expect(TokenKind::RBrace)?;
        self.close(m)
    }

    fn parse_switch_group(&mut self) -> Result<()> {
        let arrow = self.switch_label_is_arrow();
        let m = self.open(if arrow {
            NodeType::SwitchRule
        } else {
            NodeType::SwitchCase
        })?;
        let is_default = self.at_keyword(Keyword::Default);
        self.bump()?; // case | default
        if !is_default {
            loop {
                self.parse_case_label()?;
                if !self.eat(TokenKind::Comma)? {
                    break;
                }
            }
            if self.at_word("when") {
                let g = self.open(NodeType::Guard)?;
                self.bump_as(NodeType::Keyword)?;
                self.parse_expression()?;
                self.close(g)?;
            }
        }
        if arrow {
            self.expect(TokenKind::Arrow)?;
            if self.at(TokenKind::LBrace) {
                self.parse_block()?;
            } else if self.at_keyword(Keyword::Throw) {
                self.parse_statement()?;
            } else {
                self.parse_expression()?;
                self.expect(TokenKind::Semicolon)?;
            }
        } else {
            self.expect(TokenKind::Colon)?;
            loop {
                self.flush_trivia()?;
                if self.at_keyword(Keyword::Case)
                    || self.at_keyword(Keyword::Default)
                    || self.at(TokenKind::RBrace)
                    || self.ctx.at_eof()
                {
                    break;
                }
                let position = self.ctx.position();
                self.parse_statement()?;
                if self.ctx.position() == position {
                    self.bump()?;
                }
            }
        }
        self.close(m)?;
        Ok(())
    }

    fn parse_case_label(&mut self) -> Result<()> {
        if self.at_keyword(Keyword::Null) || self.at_keyword(Keyword::Default) {
            self.bump()?;
            return Ok(());
        }
        if self.case_label_is_pattern() {
            self.parse_pattern()
        } else {
            self.parse_ternary()
        }
    }

    fn case_label_is_pattern(&self) -> bool {
        self.scan_type(0).map_or(false, |after| {
            matches!(
                self.ctx.peek(after).kind,
                TokenKind::Identifier | TokenKind::LParen
            )
        })
    }

    fn switch_label_is_arrow(&self) -> bool {
        let mut depth = 0i32;
        for n in 1..80 {
            match self.ctx.peek(n).kind {
                TokenKind::LParen | TokenKind::LBracket => depth += 1,
                TokenKind::RParen | TokenKind::RBracket => depth -= 1,
                TokenKind::Arrow if depth == 0 => return true,
                TokenKind::Colon if depth == 0 => return false,
                TokenKind::LBrace | TokenKind::Semicolon | TokenKind::Eof => return false,
                _ => {}
            }
        }
        false
    }

    /// Scans the header after `for (` looking for a `:` before the first
    /// `;`. Wildcard `?` inside type arguments must not be mistaken for a
    /// ternary, so angle depth is tracked alongside paren depth.
    fn for_header_is_enhanced(&self) -> bool {
        let mut depth = 0i32;
        let mut angle_depth = 0i32;
        let mut open_ternaries = 0i32;
        for n in 0..80 {
            match self.ctx.peek(n).kind {
                TokenKind::LParen | TokenKind::LBracket => depth += 1,
                TokenKind::RParen | TokenKind::RBracket => {
                    if depth == 0 {
                        return false;
                    }
                    depth -= 1;
                }
                TokenKind::Semicolon if depth == 0 => return false,
                TokenKind::Lt => angle_depth += 1,
                TokenKind::Gt => angle_depth = (angle_depth - 1).max(0),
                TokenKind::Shr => angle_depth = (angle_depth - 2).max(0),
                TokenKind::Ushr => angle_depth = (angle_depth - 3).max(0),
                TokenKind::Question if angle_depth == 0 => open_ternaries += 1,
                TokenKind::Colon if depth == 0 && angle_depth == 0 => {
                    if open_ternaries == 0 {
                        return true;
                    }
                    open_ternaries -= 1;
                }
                TokenKind::Eof => return false,
                _ => {}
            }
        }
        false
    }

    fn is_yield_statement(&self) -> bool {
        if !self.at_word("yield") {
            return false;
        }
        !matches!(
            self.ctx.peek(1).kind,
            TokenKind::Semicolon
                | TokenKind::Dot
                | TokenKind::ColonColon
                | TokenKind::LParen
                | TokenKind::Arrow
                | TokenKind::Colon
        ) && !self.ctx.peek(1).kind.is_assignment_operator()
    }

    fn looks_like_local_type_declaration(&self) -> bool {
        for n in 0..6 {
            match self.ctx.peek(n).kind {
                TokenKind::Keyword(Keyword::Class | Keyword::Interface | Keyword::Enum) => {
                    return true;
                }
                TokenKind::Keyword(keyword) if keyword.is_modifier() => {}
                TokenKind::Identifier => {
                    let word = self.ctx.word_at(n).unwrap_or_default();
                    if word == "record"
                        && self.ctx.peek(n + 1).kind == TokenKind::Identifier
                        && matches!(
                            self.ctx.peek(n + 2).kind,
                            TokenKind::LParen | TokenKind::Lt
                        )
                    {
                        return true;
                    }
                    if !matches!(word, "sealed" | "non-sealed") {
                        return false;
                    }
                }
                _ => return false,
            }
        }
        false
    }

    pub(crate) fn looks_like_local_variable_declaration(&self) -> bool {
        match self.ctx.current().kind {
            TokenKind::Keyword(Keyword::Final) => true,
            TokenKind::At => true,
            TokenKind::Keyword(keyword) if keyword.is_primitive_type() => {
                // `int.class` starts an expression, `int x` a declaration
                !self.ctx.nth_is(1, TokenKind::Dot)
            }
            TokenKind::Identifier => {
                if self.at_word("var") && self.ctx.nth_is(1, TokenKind::Identifier) {
                    return true;
                }
                self.scan_type(0).map_or(false, |after| {
                    matches!(
                        self.ctx.peek(after).kind,
                        TokenKind::Identifier | TokenKind::Keyword(Keyword::Underscore)
                    )
                })
            }
            _ => false,
        }
    }
}
