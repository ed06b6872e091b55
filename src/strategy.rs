use std::sync::Arc;

use tracing::debug;

use crate::{
    arena::NodeIndex,
    config::{LanguageVersion, SecurityConfig},
    errors::Result,
    lexer::{Keyword, TokenKind},
    parse_context::{ParseContext, ParsingPhase},
    parser::{EciPlacement, Parser},
};

/// Priority tier for strategies whose correctness depends on the parsing
/// phase, not just the next tokens.
pub const PHASE_AWARE: u8 = 15;
/// Priority tier for keyword-initiated constructs where phase is irrelevant.
pub const KEYWORD_TRIGGERED: u8 = 10;

/// A pluggable parsing unit for version-specific constructs, selected by
/// `(version, phase, upcoming tokens)` and priority.
pub trait ParseStrategy: Send + Sync {
    fn can_handle(
        &self,
        version: LanguageVersion,
        phase: ParsingPhase,
        ctx: &ParseContext<'_>,
    ) -> bool;

    fn parse(&self, parser: &mut Parser<'_, '_>) -> Result<NodeIndex>;

    fn priority(&self) -> u8;

    fn description(&self) -> &'static str;
}

/// Immutable after construction; shared read-only across files. Selection
/// returns the highest-priority matching strategy, ties broken by
/// registration order.
#[derive(Default)]
pub struct StrategyRegistry {
    strategies: Vec<Arc<dyn ParseStrategy>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_strategies(security: &SecurityConfig) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(FlexibleConstructorBodies));
        registry.register(Arc::new(RecordDeclarations));
        registry.register(Arc::new(SealedTypes));
        registry.register(Arc::new(SwitchExpressions));
        if security.preview_enabled {
            registry.register(Arc::new(StringTemplates));
        }
        registry
    }

    pub fn register(&mut self, strategy: Arc<dyn ParseStrategy>) {
        self.strategies.push(strategy);
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub fn select(
        &self,
        version: LanguageVersion,
        phase: ParsingPhase,
        ctx: &ParseContext<'_>,
    ) -> Option<&dyn ParseStrategy> {
        let mut best: Option<&dyn ParseStrategy> = None;
        for strategy in &self.strategies {
            if !strategy.can_handle(version, phase, ctx) {
                continue;
            }
            // strictly-greater keeps the earliest registration on ties
            if best.map_or(true, |chosen| strategy.priority() > chosen.priority()) {
                best = Some(&**strategy);
            }
        }
        if let Some(strategy) = best {
            debug!(
                strategy = strategy.description(),
                priority = strategy.priority(),
                ?phase,
                "strategy selected"
            );
        }
        best
    }
}

/// Statements before `super(...)`/`this(...)` in a constructor body. Only
/// meaningful inside `ConstructorBody`; everywhere else the same tokens are
/// an ordinary block.
pub struct FlexibleConstructorBodies;

impl ParseStrategy for FlexibleConstructorBodies {
    fn can_handle(
        &self,
        version: LanguageVersion,
        phase: ParsingPhase,
        ctx: &ParseContext<'_>,
    ) -> bool {
        version.at_least(25)
            && phase == ParsingPhase::ConstructorBody
            && ctx.current_is(TokenKind::LBrace)
    }

    fn parse(&self, parser: &mut Parser<'_, '_>) -> Result<NodeIndex> {
        parser.parse_constructor_block(EciPlacement::Anywhere)
    }

    fn priority(&self) -> u8 {
        PHASE_AWARE
    }

    fn description(&self) -> &'static str {
        "flexible constructor bodies"
    }
}

/// `record Name(...)` declarations.
pub struct RecordDeclarations;

impl ParseStrategy for RecordDeclarations {
    fn can_handle(
        &self,
        version: LanguageVersion,
        _phase: ParsingPhase,
        ctx: &ParseContext<'_>,
    ) -> bool {
        if !version.at_least(16) {
            return false;
        }
        match modifier_prefix_position(ctx, |word| word == "record") {
            // `record` must head `record Name(` (or `record Name<`) to be a
            // declaration rather than an ordinary identifier
            Some(n) => {
                ctx.peek(n + 1).kind == TokenKind::Identifier
                    && matches!(ctx.peek(n + 2).kind, TokenKind::LParen | TokenKind::Lt)
            }
            None => false,
        }
    }

    fn parse(&self, parser: &mut Parser<'_, '_>) -> Result<NodeIndex> {
        parser.parse_type_declaration_no_strategy()
    }

    fn priority(&self) -> u8 {
        KEYWORD_TRIGGERED
    }

    fn description(&self) -> &'static str {
        "record declarations"
    }
}

/// `sealed` / `non-sealed` type declarations with `permits` clauses.
pub struct SealedTypes;

impl ParseStrategy for SealedTypes {
    fn can_handle(
        &self,
        version: LanguageVersion,
        _phase: ParsingPhase,
        ctx: &ParseContext<'_>,
    ) -> bool {
        if !version.at_least(17) {
            return false;
        }
        match modifier_prefix_position(ctx, |word| word == "sealed" || word == "non-sealed") {
            Some(n) => (n + 1..n + 8).any(|m| {
                matches!(
                    ctx.peek(m).kind,
                    TokenKind::Keyword(Keyword::Class) | TokenKind::Keyword(Keyword::Interface)
                )
            }),
            None => false,
        }
    }

    fn parse(&self, parser: &mut Parser<'_, '_>) -> Result<NodeIndex> {
        parser.parse_type_declaration_no_strategy()
    }

    fn priority(&self) -> u8 {
        KEYWORD_TRIGGERED
    }

    fn description(&self) -> &'static str {
        "sealed type declarations"
    }
}

/// Arrow-form `switch` used as an expression.
pub struct SwitchExpressions;

impl ParseStrategy for SwitchExpressions {
    fn can_handle(
        &self,
        version: LanguageVersion,
        _phase: ParsingPhase,
        ctx: &ParseContext<'_>,
    ) -> bool {
        version.at_least(14) && ctx.current_is(TokenKind::Keyword(Keyword::Switch))
    }

    fn parse(&self, parser: &mut Parser<'_, '_>) -> Result<NodeIndex> {
        parser.parse_switch_construct(true)
    }

    fn priority(&self) -> u8 {
        KEYWORD_TRIGGERED
    }

    fn description(&self) -> &'static str {
        "switch expressions"
    }
}

/// Preview string templates (`STR."..."`). Registered only when preview
/// features are enabled, independent of the language version.
pub struct StringTemplates;

impl ParseStrategy for StringTemplates {
    fn can_handle(
        &self,
        _version: LanguageVersion,
        _phase: ParsingPhase,
        ctx: &ParseContext<'_>,
    ) -> bool {
        matches!(ctx.current_word(), Some("STR" | "FMT" | "RAW"))
            && ctx.nth_is(1, TokenKind::Dot)
            && matches!(
                ctx.peek(2).kind,
                TokenKind::StringLiteral | TokenKind::TextBlock
            )
    }

    fn parse(&self, parser: &mut Parser<'_, '_>) -> Result<NodeIndex> {
        parser.parse_template_expression()
    }

    fn priority(&self) -> u8 {
        KEYWORD_TRIGGERED
    }

    fn description(&self) -> &'static str {
        "string templates"
    }
}

/// Scans the modifier prefix of an upcoming declaration for a contextual
/// keyword, stopping at the first token that cannot belong to one. Returns
/// the lookahead position of the first match.
fn modifier_prefix_position(
    ctx: &ParseContext<'_>,
    matches_word: impl Fn(&str) -> bool,
) -> Option<usize> {
    for n in 0..8 {
        let token = ctx.peek(n);
        match token.kind {
            TokenKind::Identifier => {
                let word = ctx.word_at(n).unwrap_or_default();
                if matches_word(word) {
                    return Some(n);
                }
                if !matches!(word, "sealed" | "non-sealed" | "record") {
                    return None;
                }
            }
            TokenKind::Keyword(keyword) if keyword.is_modifier() => {}
            _ => return None,
        }
    }
    None
}
