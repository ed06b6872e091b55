use std::time::{Duration, Instant};

use crate::{
    config::SecurityConfig,
    errors::{FormatterError, ParseError, ParseErrorKind, Result},
    lexer::{Lexer, Token, TokenKind},
};

/// Semantic context the parser is currently inside. Used to disambiguate
/// constructs that have no keyword trigger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParsingPhase {
    TopLevel,
    ClassBody,
    InterfaceBody,
    EnumBody,
    RecordBody,
    ConstructorBody,
    MethodBody,
    InitializerBlock,
}

/// Token cursor plus the mutable parse state: phase stack, recursion guard
/// and the accumulated error list. Input limits are enforced at
/// construction, before any token is produced.
pub struct ParseContext<'s> {
    source: &'s str,
    tokens: Vec<Token>,
    pos: usize,
    phases: Vec<ParsingPhase>,
    recursion_depth: usize,
    max_recursion: usize,
    errors: Vec<ParseError>,
    deadline: Option<(Instant, Duration)>,
    eof: Token,
}

impl<'s> ParseContext<'s> {
    pub fn new(source: &'s str, security: &SecurityConfig) -> Result<Self> {
        if source.len() > security.max_source_bytes {
            return Err(FormatterError::InputTooLarge {
                actual: source.len(),
                limit: security.max_source_bytes,
            });
        }
        if source.chars().count() > security.max_source_chars {
            return Err(FormatterError::InputTooLarge {
                actual: source.chars().count(),
                limit: security.max_source_chars,
            });
        }
        let mut lexer = Lexer::new(source);
        let tokens: Vec<Token> = (&mut lexer).collect();
        let errors = lexer.take_errors();
        Ok(Self {
            source,
            tokens,
            pos: 0,
            phases: Vec::new(),
            recursion_depth: 0,
            max_recursion: security.max_recursion_depth,
            errors,
            deadline: None,
            eof: Token::new(TokenKind::Eof, source.len() as u32, 0),
        })
    }

    pub fn with_deadline(mut self, deadline: Instant, timeout: Duration) -> Self {
        self.deadline = Some((deadline, timeout));
        self
    }

    pub fn source(&self) -> &'s str {
        self.source
    }

    fn raw(&self, index: usize) -> &Token {
        self.tokens.get(index).unwrap_or(&self.eof)
    }

    fn significant_index(&self, mut index: usize) -> usize {
        while index < self.tokens.len() && self.tokens[index].kind.is_trivia() {
            index += 1;
        }
        index
    }

    /// The nth upcoming significant token (0 = current). Trivia never shows
    /// up here; it is consumed alongside the significant token it precedes.
    pub fn peek(&self, n: usize) -> Token {
        let mut index = self.significant_index(self.pos);
        for _ in 0..n {
            index = self.significant_index(index + 1);
        }
        *self.raw(index)
    }

    pub fn current(&self) -> Token {
        self.peek(0)
    }

    pub fn current_is(&self, kind: TokenKind) -> bool {
        self.current().kind == kind
    }

    pub fn nth_is(&self, n: usize, kind: TokenKind) -> bool {
        self.peek(n).kind == kind
    }

    /// Text of the current token when it is an identifier; how contextual
    /// keywords are recognized.
    pub fn current_word(&self) -> Option<&'s str> {
        self.word_at(0)
    }

    pub fn word_at(&self, n: usize) -> Option<&'s str> {
        let token = self.peek(n);
        (token.kind == TokenKind::Identifier).then(|| token.text(self.source))
    }

    pub fn at_eof(&self) -> bool {
        self.current_is(TokenKind::Eof)
    }

    /// Raw cursor position; used by loops to prove forward progress.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn next_raw_is_trivia(&self) -> bool {
        self.raw(self.pos).kind.is_trivia()
    }

    /// Consumes exactly one raw token, trivia included. At the end of input
    /// this returns the Eof token without advancing.
    pub fn bump_raw(&mut self) -> Token {
        let token = *self.raw(self.pos);
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    /// Splits a `>>`-family token so the leading `>` can close a type
    /// argument list, the way javac re-lexes closers inside generics.
    pub fn split_current_gt(&mut self) {
        let index = self.significant_index(self.pos);
        let token = *self.raw(index);
        let remainder = match token.kind {
            TokenKind::Shr => TokenKind::Gt,
            TokenKind::Ushr => TokenKind::Shr,
            TokenKind::Ge => TokenKind::Assign,
            TokenKind::ShrAssign => TokenKind::Ge,
            TokenKind::UshrAssign => TokenKind::ShrAssign,
            _ => return,
        };
        self.tokens[index] = Token::new(TokenKind::Gt, token.start, 1);
        self.tokens.insert(
            index + 1,
            Token::new(remainder, token.start + 1, token.length - 1),
        );
    }

    pub fn error(&mut self, kind: ParseErrorKind, offset: u32) {
        self.errors.push(ParseError::new(kind, offset));
    }

    pub fn errors(&self) -> &[ParseError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<ParseError> {
        self.errors
    }

    pub fn phase(&self) -> ParsingPhase {
        self.phases.last().copied().unwrap_or(ParsingPhase::TopLevel)
    }

    pub(crate) fn push_phase(&mut self, phase: ParsingPhase) {
        self.phases.push(phase);
    }

    pub(crate) fn pop_phase(&mut self) {
        self.phases.pop();
    }

    pub(crate) fn enter_recursion(&mut self) -> Result<()> {
        if let Some((deadline, timeout)) = self.deadline {
            if Instant::now() > deadline {
                return Err(FormatterError::ExecutionTimeout { timeout });
            }
        }
        self.recursion_depth += 1;
        if self.recursion_depth > self.max_recursion {
            return Err(FormatterError::RecursionLimitExceeded {
                limit: self.max_recursion,
                offset: self.current().start,
            });
        }
        Ok(())
    }

    pub(crate) fn exit_recursion(&mut self) {
        self.recursion_depth -= 1;
    }
}
