use crate::{
    arena::NodeIndex,
    errors::Result,
    lexer::{Keyword, TokenKind},
    node_type::NodeType,
    parse_context::ParsingPhase,
};

use super::{EciPlacement, Parser};

impl<'s, 'r> Parser<'s, 'r> {
    pub(crate) fn parse_compilation_unit(&mut self) -> Result<NodeIndex> {
        let root = self
            .arena
            .allocate_node(0, NodeType::CompilationUnit, NodeIndex::NULL)?;
        self.open_nodes.push(root);
        loop {
            self.flush_trivia()?;
            if self.ctx.at_eof() {
                break;
            }
            let position = self.ctx.position();
            if self.at_keyword(Keyword::Package) {
                self.parse_package_declaration()?;
            } else if self.at_keyword(Keyword::Import) {
                self.parse_import_declaration()?;
            } else if self.at(TokenKind::Semicolon) {
                let m = self.open(NodeType::EmptyStatement)?;
                self.bump()?;
                self.close(m)?;
            } else {
                self.parse_type_declaration()?;
            }
            if self.ctx.position() == position {
                self.bump()?;
            }
        }
        let children = std::mem::take(&mut self.stack);
        self.arena
            .finish_node(root, self.ctx.source().len() as u32, &children)?;
        self.open_nodes.pop();
        self.stack.push(root);
        Ok(root)
    }

    fn parse_package_declaration(&mut self) -> Result<NodeIndex> {
        let m = self.open(NodeType::PackageDeclaration)?;
        self.bump()?; // package
        self.parse_qualified_name()?;
        self.expect(TokenKind::Semicolon)?;
        self.close(m)
    }

    fn parse_import_declaration(&mut self) -> Result<NodeIndex> {
        let m = self.open(NodeType::ImportDeclaration)?;
        self.bump()?; // import
        if self.at_keyword(Keyword::Static) {
            self.bump()?;
        }
        let cp = self.checkpoint();
        if self.at(TokenKind::Identifier) {
            self.bump()?;
            let mut parts = 1;
            loop {
                if self.at(TokenKind::Dot) && self.ctx.nth_is(1, TokenKind::Identifier) {
                    self.bump()?;
                    self.bump()?;
                    parts += 1;
                } else if self.at(TokenKind::Dot) && self.ctx.nth_is(1, TokenKind::Star) {
                    self.bump()?;
                    self.bump()?;
                    parts += 1;
                    break;
                } else {
                    break;
                }
            }
            if parts > 1 {
                self.wrap(cp, NodeType::QualifiedName)?;
            }
        } else {
            self.error_unexpected("a package or type name");
        }
        self.expect(TokenKind::Semicolon)?;
        self.close(m)
    }

    pub(crate) fn parse_qualified_name(&mut self) -> Result<()> {
        let cp = self.checkpoint();
        if !self.at(TokenKind::Identifier) {
            self.error_unexpected("a name");
            return Ok(());
        }
        self.bump()?;
        let mut parts = 1;
        while self.at(TokenKind::Dot) && self.ctx.nth_is(1, TokenKind::Identifier) {
            self.bump()?;
            self.bump()?;
            parts += 1;
        }
        if parts > 1 {
            self.wrap(cp, NodeType::QualifiedName)?;
        }
        Ok(())
    }

    /// Type-declaration decision point: the strategy registry gets first
    /// refusal, then the built-in dispatch runs.
    pub(crate) fn parse_type_declaration(&mut self) -> Result<NodeIndex> {
        let registry = self.registry;
        if let Some(strategy) = registry.select(self.version, self.ctx.phase(), &self.ctx) {
            return strategy.parse(self);
        }
        self.parse_type_declaration_no_strategy()
    }

    /// The non-dispatching declaration parser; strategies call back into
    /// this to avoid re-entering selection.
    pub fn parse_type_declaration_no_strategy(&mut self) -> Result<NodeIndex> {
        let m = self.open(NodeType::ClassDeclaration)?;
        self.parse_modifiers()?;
        let mut body_phase = ParsingPhase::ClassBody;
        let mut is_record = false;
        match self.ctx.current().kind {
            TokenKind::Keyword(Keyword::Class) => {
                self.bump()?;
            }
            TokenKind::Keyword(Keyword::Interface) => {
                self.retype(&m, NodeType::InterfaceDeclaration);
                body_phase = ParsingPhase::InterfaceBody;
                self.bump()?;
            }
            TokenKind::Keyword(Keyword::Enum) => {
                self.retype(&m, NodeType::EnumDeclaration);
                self.bump()?;
            }
            TokenKind::At if self.ctx.nth_is(1, TokenKind::Keyword(Keyword::Interface)) => {
                self.retype(&m, NodeType::AnnotationTypeDeclaration);
                body_phase = ParsingPhase::InterfaceBody;
                self.bump()?; // @
                self.bump()?; // interface
            }
            TokenKind::Identifier if self.at_word("record") => {
                self.retype(&m, NodeType::RecordDeclaration);
                body_phase = ParsingPhase::RecordBody;
                is_record = true;
                self.bump_as(NodeType::Keyword)?;
            }
            _ => {
                self.error_unexpected("a type declaration");
                self.recover_to(&[TokenKind::LBrace, TokenKind::Semicolon, TokenKind::RBrace])?;
                self.eat(TokenKind::Semicolon)?;
                return self.close(m);
            }
        }
        let name = self.ctx.current_word().unwrap_or_default().to_owned();
        if self.at(TokenKind::Identifier) {
            self.bump()?;
        } else {
            self.error_unexpected("a type name");
        }
        self.push_type_name(&name);
        if self.at(TokenKind::Lt) {
            self.parse_type_parameters()?;
        }
        if is_record {
            self.parse_record_header()?;
        }
        loop {
            if self.at_keyword(Keyword::Extends) {
                let c = self.open(NodeType::ExtendsClause)?;
                self.bump()?;
                self.parse_type()?;
                while self.eat(TokenKind::Comma)? {
                    self.parse_type()?;
                }
                self.close(c)?;
            } else if self.at_keyword(Keyword::Implements) {
                let c = self.open(NodeType::ImplementsClause)?;
                self.bump()?;
                self.parse_type()?;
                while self.eat(TokenKind::Comma)? {
                    self.parse_type()?;
                }
                self.close(c)?;
            } else if self.at_word("permits") {
                let c = self.open(NodeType::PermitsClause)?;
                self.bump_as(NodeType::Keyword)?;
                self.parse_type()?;
                while self.eat(TokenKind::Comma)? {
                    self.parse_type()?;
                }
                self.close(c)?;
            } else {
                break;
            }
        }
        if self.arena.get(m.node)?.node_type == NodeType::EnumDeclaration {
            self.parse_enum_body()?;
        } else {
            self.parse_class_body(body_phase)?;
        }
        self.pop_type_name();
        self.close(m)
    }

    pub(crate) fn parse_modifiers(&mut self) -> Result<()> {
        loop {
            match self.ctx.current().kind {
                TokenKind::Keyword(keyword) if keyword.is_modifier() => {
                    // `static {` is an initializer, handled by the member parser
                    if keyword == Keyword::Static && self.ctx.nth_is(1, TokenKind::LBrace) {
                        break;
                    }
                    let m = self.open(NodeType::Modifier)?;
                    self.bump()?;
                    self.close(m)?;
                }
                TokenKind::Identifier
                    if matches!(self.ctx.current_word(), Some("sealed" | "non-sealed")) =>
                {
                    let m = self.open(NodeType::Modifier)?;
                    self.bump_as(NodeType::Keyword)?;
                    self.close(m)?;
                }
                TokenKind::At if !self.ctx.nth_is(1, TokenKind::Keyword(Keyword::Interface)) => {
                    self.parse_annotation()?;
                }
                _ => break,
            }
        }
        Ok(())
    }

    pub(crate) fn parse_annotation(&mut self) -> Result<()> {
        let m = self.open(NodeType::Annotation)?;
        self.bump()?; // @
        if self.at(TokenKind::Identifier) {
            self.bump()?;
            while self.at(TokenKind::Dot) && self.ctx.nth_is(1, TokenKind::Identifier) {
                self.bump()?;
                self.bump()?;
            }
        } else {
            self.error_unexpected("an annotation name");
        }
        if self.at(TokenKind::LParen) {
            let args = self.open(NodeType::AnnotationArgumentList)?;
            self.bump()?;
            while !self.at(TokenKind::RParen) && !self.ctx.at_eof() {
                if self.at(TokenKind::Identifier) && self.ctx.nth_is(1, TokenKind::Assign) {
                    self.bump()?;
                    self.bump()?;
                }
                self.parse_annotation_value()?;
                if !self.eat(TokenKind::Comma)? {
                    break;
                }
            }
            self.expect(TokenKind::RParen)?;
            self.close(args)?;
        }
        self.close(m)?;
        Ok(())
    }

    pub(crate) fn parse_annotation_value(&mut self) -> Result<()> {
        if self.at(TokenKind::At) {
            self.parse_annotation()
        } else if self.at(TokenKind::LBrace) {
            self.parse_array_initializer()
        } else {
            self.parse_ternary()
        }
    }

    pub(crate) fn parse_type_parameters(&mut self) -> Result<()> {
        let m = self.open(NodeType::TypeParameterList)?;
        self.bump()?; // <
        while !self.at_type_argument_close() && !self.ctx.at_eof() {
            let t = self.open(NodeType::TypeParameter)?;
            while self.at(TokenKind::At) {
                self.parse_annotation()?;
            }
            if self.at(TokenKind::Identifier) {
                self.bump()?;
            }
            if self.at_keyword(Keyword::Extends) {
                self.bump()?;
                self.parse_type()?;
                while self.at(TokenKind::Amp) {
                    self.bump()?;
                    self.parse_type()?;
                }
            }
            self.close(t)?;
            if !self.eat(TokenKind::Comma)? {
                break;
            }
        }
        self.expect_type_argument_close()?;
        self.close(m)?;
        Ok(())
    }

    fn parse_record_header(&mut self) -> Result<()> {
        let m = self.open(NodeType::RecordHeader)?;
        self.expect(TokenKind::LParen)?;
        while !self.at(TokenKind::RParen) && !self.ctx.at_eof() {
            let c = self.open(NodeType::RecordComponent)?;
            while self.at(TokenKind::At) {
                self.parse_annotation()?;
            }
            self.parse_type()?;
            self.eat(TokenKind::Ellipsis)?;
            if self.at(TokenKind::Identifier) {
                self.bump()?;
            }
            self.close(c)?;
            if !self.eat(TokenKind::Comma)? {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        self.close(m)?;
        Ok(())
    }

    pub(crate) fn parse_class_body(&mut self, phase: ParsingPhase) -> Result<NodeIndex> {
        let node_type = match phase {
            ParsingPhase::InterfaceBody => NodeType::InterfaceBody,
            _ => NodeType::ClassBody,
        };
        let m = self.open(node_type)?;
        self.with_phase(phase, |p| {
            p.expect(TokenKind::LBrace)?;
            loop {
                p.flush_trivia()?;
                if p.at(TokenKind::RBrace) || p.ctx.at_eof() {
                    break;
                }
                let position = p.ctx.position();
                p.parse_class_member()?;
                if p.ctx.position() == position {
                    p.bump()?;
                }
            }
            p.expect(TokenKind::RBrace)
        })?;
        self.close(m)
    }

    fn parse_enum_body(&mut self) -> Result<NodeIndex> {
        let m = self.open(NodeType::EnumBody)?;
        self.with_phase(ParsingPhase::EnumBody, |p| {
            p.expect(TokenKind::LBrace)?;
            loop {
                p.flush_trivia()?;
                if !(p.at(TokenKind::Identifier) || p.at(TokenKind::At)) {
                    break;
                }
                let c = p.open(NodeType::EnumConstant)?;
                while p.at(TokenKind::At) {
                    p.parse_annotation()?;
                }
                if p.at(TokenKind::Identifier) {
                    p.bump()?;
                }
                if p.at(TokenKind::LParen) {
                    p.parse_argument_list()?;
                }
                if p.at(TokenKind::LBrace) {
                    p.parse_class_body(ParsingPhase::ClassBody)?;
                }
                p.close(c)?;
                if !p.eat(TokenKind::Comma)? {
                    break;
                }
            }
            if p.at(TokenKind::Semicolon) {
                p.bump()?;
                loop {
                    p.flush_trivia()?;
                    if p.at(TokenKind::RBrace) || p.ctx.at_eof() {
                        break;
                    }
                    let position = p.ctx.position();
                    p.parse_class_member()?;
                    if p.ctx.position() == position {
                        p.bump()?;
                    }
                }
            }
            p.expect(TokenKind::RBrace)
        })?;
        self.close(m)
    }

    pub(crate) fn parse_class_member(&mut self) -> Result<NodeIndex> {
        if self.at(TokenKind::LBrace) {
            let m = self.open(NodeType::InitializerBlock)?;
            self.with_phase(ParsingPhase::InitializerBlock, |p| p.parse_block())?;
            return self.close(m);
        }
        if self.at_keyword(Keyword::Static) && self.ctx.nth_is(1, TokenKind::LBrace) {
            let m = self.open(NodeType::StaticInitializerBlock)?;
            self.bump()?; // static
            self.with_phase(ParsingPhase::InitializerBlock, |p| p.parse_block())?;
            return self.close(m);
        }
        if self.at(TokenKind::Semicolon) {
            let m = self.open(NodeType::EmptyStatement)?;
            self.bump()?;
            return self.close(m);
        }
        if self.member_is_type_declaration() {
            return self.parse_type_declaration();
        }
        self.parse_field_method_or_constructor()
    }

    fn parse_field_method_or_constructor(&mut self) -> Result<NodeIndex> {
        let m = self.open(NodeType::MethodDeclaration)?;
        self.parse_modifiers()?;
        if self.at(TokenKind::Lt) {
            self.parse_type_parameters()?;
        }
        let enclosing = self.enclosing_type_name().map(str::to_owned);
        if let (Some(word), Some(enclosing)) = (self.ctx.current_word(), enclosing.as_deref()) {
            if word == enclosing && self.ctx.nth_is(1, TokenKind::LParen) {
                self.retype(&m, NodeType::ConstructorDeclaration);
                self.bump()?; // name
                self.parse_parameter_list()?;
                self.parse_throws()?;
                if self.at(TokenKind::LBrace) {
                    self.parse_constructor_body()?;
                } else {
                    self.expect(TokenKind::Semicolon)?;
                }
                return self.close(m);
            }
            if word == enclosing
                && self.ctx.nth_is(1, TokenKind::LBrace)
                && self.ctx.phase() == ParsingPhase::RecordBody
            {
                self.retype(&m, NodeType::CompactConstructorDeclaration);
                self.bump()?; // name
                self.parse_constructor_body()?;
                return self.close(m);
            }
        }
        self.parse_type()?;
        if self.at(TokenKind::Identifier) || self.at_keyword(Keyword::Underscore) {
            if self.ctx.nth_is(1, TokenKind::LParen) {
                self.bump()?; // method name
                self.parse_parameter_list()?;
                while self.at(TokenKind::LBracket) && self.ctx.nth_is(1, TokenKind::RBracket) {
                    self.bump()?;
                    self.bump()?;
                }
                self.parse_throws()?;
                if self.at_keyword(Keyword::Default) {
                    // annotation member default value
                    self.bump()?;
                    self.parse_annotation_value()?;
                }
                if self.at(TokenKind::LBrace) {
                    self.with_phase(ParsingPhase::MethodBody, |p| p.parse_block())?;
                } else {
                    self.expect(TokenKind::Semicolon)?;
                }
                return self.close(m);
            }
            self.retype(&m, NodeType::FieldDeclaration);
            self.parse_variable_declarators()?;
            self.expect(TokenKind::Semicolon)?;
            return self.close(m);
        }
        self.error_unexpected("a member name");
        self.recover_to(&[TokenKind::Semicolon, TokenKind::RBrace])?;
        self.eat(TokenKind::Semicolon)?;
        self.close(m)
    }

    pub(crate) fn parse_parameter_list(&mut self) -> Result<()> {
        let m = self.open(NodeType::ParameterList)?;
        self.expect(TokenKind::LParen)?;
        while !self.at(TokenKind::RParen) && !self.ctx.at_eof() {
            let p = self.open(NodeType::Parameter)?;
            self.parse_modifiers()?;
            self.parse_type()?;
            self.eat(TokenKind::Ellipsis)?;
            if self.at(TokenKind::Identifier)
                || self.at_keyword(Keyword::This)
                || self.at_keyword(Keyword::Underscore)
            {
                self.bump()?;
            }
            while self.at(TokenKind::LBracket) && self.ctx.nth_is(1, TokenKind::RBracket) {
                self.bump()?;
                self.bump()?;
            }
            self.close(p)?;
            if !self.eat(TokenKind::Comma)? {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        self.close(m)?;
        Ok(())
    }

    fn parse_throws(&mut self) -> Result<()> {
        if self.at_keyword(Keyword::Throws) {
            let m = self.open(NodeType::ThrowsClause)?;
            self.bump()?;
            self.parse_type()?;
            while self.eat(TokenKind::Comma)? {
                self.parse_type()?;
            }
            self.close(m)?;
        }
        Ok(())
    }

    /// Constructor-body decision point. Entering the phase first is what
    /// makes the phase-aware strategy eligible; without one the legacy
    /// first-statement-only rule applies.
    pub(crate) fn parse_constructor_body(&mut self) -> Result<NodeIndex> {
        self.with_phase(ParsingPhase::ConstructorBody, |p| {
            let registry = p.registry;
            if let Some(strategy) = registry.select(p.version, p.ctx.phase(), &p.ctx) {
                strategy.parse(p)
            } else {
                p.parse_constructor_block(EciPlacement::FirstOnly)
            }
        })
    }

    fn member_is_type_declaration(&self) -> bool {
        let n = self.scan_declaration_prefix();
        match self.ctx.peek(n).kind {
            TokenKind::Keyword(Keyword::Class | Keyword::Interface | Keyword::Enum) => true,
            TokenKind::At => {
                self.ctx.peek(n + 1).kind == TokenKind::Keyword(Keyword::Interface)
            }
            TokenKind::Identifier => {
                self.ctx.word_at(n) == Some("record")
                    && self.ctx.peek(n + 1).kind == TokenKind::Identifier
                    && matches!(
                        self.ctx.peek(n + 2).kind,
                        TokenKind::LParen | TokenKind::Lt
                    )
            }
            _ => false,
        }
    }

    /// Lookahead index past any leading modifiers and annotations.
    fn scan_declaration_prefix(&self) -> usize {
        let mut n = 0;
        let mut guard = 0;
        loop {
            guard += 1;
            if guard > 40 {
                return n;
            }
            match self.ctx.peek(n).kind {
                TokenKind::Keyword(keyword) if keyword.is_modifier() => n += 1,
                TokenKind::Identifier
                    if matches!(self.ctx.word_at(n), Some("sealed" | "non-sealed")) =>
                {
                    n += 1;
                }
                TokenKind::At => {
                    if self.ctx.peek(n + 1).kind == TokenKind::Keyword(Keyword::Interface) {
                        return n;
                    }
                    n += 2; // @ Name
                    while self.ctx.nth_is(n, TokenKind::Dot)
                        && self.ctx.peek(n + 1).kind == TokenKind::Identifier
                    {
                        n += 2;
                    }
                    if self.ctx.nth_is(n, TokenKind::LParen) {
                        let mut depth = 1;
                        n += 1;
                        while depth > 0 {
                            guard += 1;
                            if guard > 200 {
                                return n;
                            }
                            match self.ctx.peek(n).kind {
                                TokenKind::LParen => depth += 1,
                                TokenKind::RParen => depth -= 1,
                                TokenKind::Eof => return n,
                                _ => {}
                            }
                            n += 1;
                        }
                    }
                }
                _ => return n,
            }
        }
    }
}
