use tracing::instrument;

use crate::{
    arena::{estimate_nodes, NodeArena, NodeIndex},
    config::{LanguageVersion, SecurityConfig},
    errors::{ParseError, ParseErrorKind, Result},
    lexer::{Keyword, Token, TokenKind},
    node_type::NodeType,
    parse_context::{ParseContext, ParsingPhase},
    strategy::StrategyRegistry,
};

mod declarations;
mod expressions;
mod statements;
mod types;

/// Where an explicit constructor invocation may appear in a constructor
/// body. `Anywhere` is what the flexible-constructor-bodies strategy
/// enables; the legacy rule is first-statement-only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EciPlacement {
    FirstOnly,
    Anywhere,
}

/// A completed parse: the arena, its root (always a compilation unit) and
/// every accumulated error. The caller owns the arena and its lifecycle.
pub struct ParsedSource {
    pub arena: NodeArena,
    pub root: NodeIndex,
    pub errors: Vec<ParseError>,
}

/// Recursive-descent driver that writes the tree into an arena as parallel
/// arrays. Deterministic: identical (source, version, registry) produce an
/// arena with identical record contents and child order.
pub struct IndexOverlayParser {
    registry: StrategyRegistry,
    security: SecurityConfig,
}

impl IndexOverlayParser {
    pub fn new(registry: StrategyRegistry, security: SecurityConfig) -> Self {
        Self { registry, security }
    }

    pub fn with_defaults(security: SecurityConfig) -> Self {
        Self::new(StrategyRegistry::with_default_strategies(&security), security)
    }

    pub fn parse(&self, source: &str, version: LanguageVersion) -> Result<ParsedSource> {
        self.parse_internal(source, version, None)
    }

    /// Like [`parse`](Self::parse), but polling the deadline at recursion
    /// entry so a runaway file is cancelled cooperatively.
    pub fn parse_with_deadline(
        &self,
        source: &str,
        version: LanguageVersion,
        deadline: std::time::Instant,
        timeout: std::time::Duration,
    ) -> Result<ParsedSource> {
        self.parse_internal(source, version, Some((deadline, timeout)))
    }

    #[instrument(level = "debug", skip_all, fields(bytes = source.len(), version = version.0))]
    fn parse_internal(
        &self,
        source: &str,
        version: LanguageVersion,
        deadline: Option<(std::time::Instant, std::time::Duration)>,
    ) -> Result<ParsedSource> {
        let mut ctx = ParseContext::new(source, &self.security)?;
        if let Some((deadline, timeout)) = deadline {
            ctx = ctx.with_deadline(deadline, timeout);
        }
        let arena = NodeArena::create(
            estimate_nodes(source.len()),
            self.security.max_arena_bytes,
        )?;
        let mut parser = Parser {
            ctx,
            arena,
            registry: &self.registry,
            version,
            stack: Vec::new(),
            open_nodes: Vec::new(),
            type_names: Vec::new(),
            last_end: 0,
        };
        let root = parser.parse_compilation_unit()?;
        let Parser { ctx, arena, .. } = parser;
        Ok(ParsedSource {
            arena,
            root,
            errors: ctx.into_errors(),
        })
    }
}

pub(crate) struct Marker {
    node: NodeIndex,
    stack_pos: usize,
}

#[derive(Clone, Copy)]
pub(crate) struct Checkpoint(usize);

/// Parser state: the token cursor, the arena being populated, and the
/// node-builder stack. Completed children wait on `stack` until the node
/// that owns them finishes, which is what keeps every child window
/// contiguous in the arena's pool.
pub struct Parser<'s, 'r> {
    pub(crate) ctx: ParseContext<'s>,
    pub(crate) arena: NodeArena,
    pub(crate) registry: &'r StrategyRegistry,
    pub(crate) version: LanguageVersion,
    stack: Vec<NodeIndex>,
    open_nodes: Vec<NodeIndex>,
    type_names: Vec<String>,
    last_end: u32,
}

const MAX_RECOVERY_SKIP: usize = 64;

impl<'s, 'r> Parser<'s, 'r> {
    fn current_parent(&self) -> NodeIndex {
        self.open_nodes.last().copied().unwrap_or(NodeIndex::NULL)
    }

    fn leaf(&mut self, token: Token, node_type: NodeType) -> Result<()> {
        let id = self
            .arena
            .allocate_node(token.start, node_type, self.current_parent())?;
        self.arena.finish_node(id, token.end(), &[])?;
        self.stack.push(id);
        self.last_end = token.end();
        Ok(())
    }

    /// Consumes raw trivia tokens into leaf nodes attached to whatever node
    /// is currently collecting children.
    pub(crate) fn flush_trivia(&mut self) -> Result<()> {
        while self.ctx.next_raw_is_trivia() {
            let token = self.ctx.bump_raw();
            self.leaf(token, token_node_type(token.kind))?;
        }
        Ok(())
    }

    /// Consumes the current significant token (and its leading trivia) into
    /// leaf nodes.
    pub(crate) fn bump(&mut self) -> Result<Token> {
        self.flush_trivia()?;
        let token = self.ctx.bump_raw();
        if token.kind != TokenKind::Eof {
            self.leaf(token, token_node_type(token.kind))?;
        }
        Ok(token)
    }

    /// Like [`bump`](Self::bump) with an explicit leaf type; used for
    /// contextual keywords, which lex as identifiers.
    pub(crate) fn bump_as(&mut self, node_type: NodeType) -> Result<Token> {
        self.flush_trivia()?;
        let token = self.ctx.bump_raw();
        if token.kind != TokenKind::Eof {
            self.leaf(token, node_type)?;
        }
        Ok(token)
    }

    pub(crate) fn at(&self, kind: TokenKind) -> bool {
        self.ctx.current_is(kind)
    }

    pub(crate) fn at_keyword(&self, keyword: Keyword) -> bool {
        self.ctx.current_is(TokenKind::Keyword(keyword))
    }

    pub(crate) fn at_word(&self, word: &str) -> bool {
        self.ctx.current_word() == Some(word)
    }

    pub(crate) fn eat(&mut self, kind: TokenKind) -> Result<bool> {
        if self.at(kind) {
            self.bump()?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Consume `kind` or record an error without consuming. Not consuming is
    /// the token-insertion recovery: for a missing closer the parse simply
    /// proceeds as if it had been present.
    pub(crate) fn expect(&mut self, kind: TokenKind) -> Result<bool> {
        if self.eat(kind)? {
            return Ok(true);
        }
        let current = self.ctx.current();
        self.ctx.error(
            ParseErrorKind::MissingToken {
                expected: kind.description(),
            },
            current.start,
        );
        Ok(false)
    }

    /// Closes a type-argument list, splitting `>>`-family tokens first.
    pub(crate) fn expect_type_argument_close(&mut self) -> Result<bool> {
        if matches!(
            self.ctx.current().kind,
            TokenKind::Shr | TokenKind::Ushr | TokenKind::Ge | TokenKind::ShrAssign | TokenKind::UshrAssign
        ) {
            self.ctx.split_current_gt();
        }
        self.expect(TokenKind::Gt)
    }

    pub(crate) fn error_unexpected(&mut self, expected: &'static str) {
        let current = self.ctx.current();
        let found = current.kind.description().to_owned();
        self.ctx.error(
            ParseErrorKind::UnexpectedToken { expected, found },
            current.start,
        );
    }

    /// Bounded token deletion: skip ahead to a synchronization point,
    /// keeping the skipped tokens in the tree as leaves so spans stay
    /// covered. Falls through to panic mode by stopping at any top-level
    /// declaration keyword.
    pub(crate) fn recover_to(&mut self, sync: &[TokenKind]) -> Result<()> {
        let mut skipped = 0;
        let start = self.ctx.current().start;
        while skipped < MAX_RECOVERY_SKIP && !self.ctx.at_eof() {
            let kind = self.ctx.current().kind;
            if sync.contains(&kind) || is_top_level_boundary(kind) {
                break;
            }
            self.bump()?;
            skipped += 1;
        }
        if skipped > 0 {
            self.ctx
                .error(ParseErrorKind::SkippedTokens { count: skipped }, start);
        }
        Ok(())
    }

    pub(crate) fn open(&mut self, node_type: NodeType) -> Result<Marker> {
        // pending trivia belongs to the enclosing node, not this one
        self.flush_trivia()?;
        let start = self.ctx.current().start;
        let node = self
            .arena
            .allocate_node(start, node_type, self.current_parent())?;
        self.open_nodes.push(node);
        Ok(Marker {
            node,
            stack_pos: self.stack.len(),
        })
    }

    pub(crate) fn close(&mut self, marker: Marker) -> Result<NodeIndex> {
        let children = self.stack.split_off(marker.stack_pos);
        self.arena
            .finish_node(marker.node, self.last_end, &children)?;
        self.open_nodes.pop();
        self.stack.push(marker.node);
        Ok(marker.node)
    }

    pub(crate) fn retype(&mut self, marker: &Marker, node_type: NodeType) {
        self.arena.set_type(marker.node, node_type);
    }

    pub(crate) fn checkpoint(&self) -> Checkpoint {
        Checkpoint(self.stack.len())
    }

    /// Collects everything produced since `checkpoint` as the children of a
    /// fresh node; how left-associative expression spines are built.
    pub(crate) fn wrap(&mut self, checkpoint: Checkpoint, node_type: NodeType) -> Result<NodeIndex> {
        let children = self.stack.split_off(checkpoint.0);
        let start = match children.first() {
            Some(&first) => self.arena.get(first)?.start,
            None => self.ctx.current().start,
        };
        let node = self
            .arena
            .allocate_node(start, node_type, self.current_parent())?;
        let end = match children.last() {
            Some(&last) => self.arena.get(last)?.end(),
            None => start,
        };
        self.arena.finish_node(node, end, &children)?;
        self.stack.push(node);
        Ok(node)
    }

    pub(crate) fn with_phase<T>(
        &mut self,
        phase: ParsingPhase,
        body: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        self.ctx.push_phase(phase);
        let result = body(self);
        self.ctx.pop_phase();
        result
    }

    pub(crate) fn with_recursion<T>(
        &mut self,
        body: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        self.ctx.enter_recursion()?;
        let result = body(self);
        self.ctx.exit_recursion();
        result
    }

    pub(crate) fn push_type_name(&mut self, name: &str) {
        self.type_names.push(name.to_owned());
    }

    pub(crate) fn pop_type_name(&mut self) {
        self.type_names.pop();
    }

    pub(crate) fn enclosing_type_name(&self) -> Option<&str> {
        self.type_names.last().map(String::as_str)
    }
}

fn is_top_level_boundary(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Keyword(Keyword::Class)
            | TokenKind::Keyword(Keyword::Interface)
            | TokenKind::Keyword(Keyword::Enum)
            | TokenKind::Keyword(Keyword::Package)
            | TokenKind::Keyword(Keyword::Import)
    )
}

fn token_node_type(kind: TokenKind) -> NodeType {
    match kind {
        TokenKind::Identifier => NodeType::Identifier,
        TokenKind::Keyword(Keyword::True | Keyword::False) => NodeType::BooleanLiteral,
        TokenKind::Keyword(Keyword::Null) => NodeType::NullLiteral,
        TokenKind::Keyword(Keyword::This) => NodeType::ThisExpression,
        TokenKind::Keyword(Keyword::Super) => NodeType::SuperExpression,
        TokenKind::Keyword(_) => NodeType::Keyword,
        TokenKind::IntegerLiteral => NodeType::IntegerLiteral,
        TokenKind::FloatingPointLiteral => NodeType::FloatingPointLiteral,
        TokenKind::CharacterLiteral => NodeType::CharacterLiteral,
        TokenKind::StringLiteral => NodeType::StringLiteral,
        TokenKind::TextBlock => NodeType::TextBlock,
        TokenKind::LineComment => NodeType::LineComment,
        TokenKind::BlockComment => NodeType::BlockComment,
        TokenKind::JavadocComment => NodeType::JavadocComment,
        TokenKind::Whitespace => NodeType::Whitespace,
        TokenKind::LineTerminator => NodeType::LineTerminator,
        TokenKind::LParen
        | TokenKind::RParen
        | TokenKind::LBrace
        | TokenKind::RBrace
        | TokenKind::LBracket
        | TokenKind::RBracket
        | TokenKind::Semicolon
        | TokenKind::Comma
        | TokenKind::Dot
        | TokenKind::Ellipsis
        | TokenKind::At
        | TokenKind::Error
        | TokenKind::Eof => NodeType::Separator,
        _ => NodeType::Operator,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> ParsedSource {
        parse_with(source, LanguageVersion::JAVA_21, SecurityConfig::default())
    }

    fn parse_with(
        source: &str,
        version: LanguageVersion,
        security: SecurityConfig,
    ) -> ParsedSource {
        IndexOverlayParser::with_defaults(security)
            .parse(source, version)
            .unwrap()
    }

    fn node_types_of_children(parsed: &ParsedSource, id: NodeIndex) -> Vec<NodeType> {
        parsed
            .arena
            .children(id)
            .unwrap()
            .iter()
            .map(|&child| parsed.arena.get(child).unwrap().node_type)
            .collect()
    }

    fn find_nodes(parsed: &ParsedSource, node_type: NodeType) -> Vec<NodeIndex> {
        (0..parsed.arena.node_count())
            .map(|index| NodeIndex::new(index as i32).unwrap())
            .filter(|&id| parsed.arena.get(id).unwrap().node_type == node_type)
            .collect()
    }

    fn leaf_reconstruction(parsed: &ParsedSource, source: &str) -> String {
        fn visit(parsed: &ParsedSource, id: NodeIndex, source: &str, out: &mut String) {
            let children = parsed.arena.children(id).unwrap();
            if children.is_empty() {
                let record = parsed.arena.get(id).unwrap();
                out.push_str(&source[record.start as usize..record.end() as usize]);
                return;
            }
            for &child in children {
                visit(parsed, child, source, out);
            }
        }
        let mut out = String::new();
        visit(parsed, parsed.root, source, &mut out);
        out
    }

    fn check_span_invariants(parsed: &ParsedSource, id: NodeIndex) {
        let record = parsed.arena.get(id).unwrap();
        let children = parsed.arena.children(id).unwrap();
        let mut previous_end: Option<u32> = None;
        for &child in children {
            let child_record = parsed.arena.get(child).unwrap();
            assert_eq!(child_record.parent, id, "parent link broken");
            assert!(
                child_record.start >= record.start && child_record.end() <= record.end(),
                "child span {:?} escapes parent {:?}",
                child_record,
                record
            );
            if let Some(end) = previous_end {
                assert!(child_record.start >= end, "sibling spans overlap");
            }
            previous_end = Some(child_record.end());
            check_span_invariants(parsed, child);
        }
    }

    #[test]
    fn empty_source_parses_to_a_childless_compilation_unit() {
        let parsed = parse("");
        let root = parsed.arena.get(parsed.root).unwrap();
        assert_eq!(root.node_type, NodeType::CompilationUnit);
        assert_eq!(root.start, 0);
        assert_eq!(root.length, 0);
        assert!(parsed.arena.children(parsed.root).unwrap().is_empty());
        assert!(parsed.errors.is_empty());
    }

    #[test]
    fn empty_class_parse() {
        let source = "public class T {}";
        let parsed = parse(source);
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);

        let root = parsed.arena.get(parsed.root).unwrap();
        assert_eq!(root.node_type, NodeType::CompilationUnit);
        assert_eq!((root.start, root.end()), (0, 17));

        let significant: Vec<NodeIndex> = parsed
            .arena
            .children(parsed.root)
            .unwrap()
            .iter()
            .copied()
            .filter(|&id| !parsed.arena.get(id).unwrap().node_type.is_trivia())
            .collect();
        assert_eq!(significant.len(), 1);
        let class = parsed.arena.get(significant[0]).unwrap();
        assert_eq!(class.node_type, NodeType::ClassDeclaration);
        assert_eq!((class.start, class.end()), (0, 17));
        assert!(parsed.arena.node_count() >= 2);
    }

    #[test]
    fn root_span_always_covers_the_whole_source() {
        for source in [
            "",
            "  \n",
            "package a.b;\nclass A {}\n// trailing\n",
            "import java.util.List;\npublic interface I { void f(); }",
        ] {
            let parsed = parse(source);
            let root = parsed.arena.get(parsed.root).unwrap();
            assert_eq!((root.start, root.end() as usize), (0, source.len()));
        }
    }

    #[test]
    fn span_invariants_hold_for_a_representative_source() {
        let source = r#"
package com.example;

import java.util.List;
import static java.util.Objects.requireNonNull;

/** Javadoc. */
public final class Sample<T extends Number> extends Base implements Runnable {
    private static final int LIMIT = 10_000;
    private List<String> names;

    static { counter = 0; }

    public Sample(List<String> names) {
        super();
        this.names = requireNonNull(names);
    }

    @Override
    public void run() {
        int total = 0;
        for (int i = 0; i < LIMIT; i++) {
            total += i;
        }
        while (total > 0) {
            total -= step(total);
        }
        if (total == 0 && names != null) {
            names.forEach(name -> System.out.println(name));
        } else {
            throw new IllegalStateException("bad " + total);
        }
    }

    private int step(int value) {
        try {
            return value / 2;
        } catch (ArithmeticException | IllegalStateException e) {
            return 0;
        } finally {
            cleanup();
        }
    }
}
"#;
        let parsed = parse(source);
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        check_span_invariants(&parsed, parsed.root);
        assert_eq!(leaf_reconstruction(&parsed, source), source);
    }

    #[test]
    fn dfs_leaf_concatenation_reconstructs_the_source() {
        for source in [
            "class A { int x = 1 + 2 * 3; }",
            "enum E { A, B, C; void f() {} }",
            "interface I { default int f() { return 1; } }",
            "class G<T> { java.util.Map<String, List<int[]>> m; }",
            "class S { String t = \"\"\"\n  body\n  \"\"\"; }",
        ] {
            let parsed = parse(source);
            assert!(parsed.errors.is_empty(), "{source}: {:?}", parsed.errors);
            assert_eq!(leaf_reconstruction(&parsed, source), source, "{source}");
        }
    }

    #[test]
    fn records_sealed_types_and_switch_expressions_parse() {
        let source = r#"
public sealed interface Shape permits Circle, Square {}

record Circle(double radius) implements Shape {
    Circle {
        if (radius < 0) throw new IllegalArgumentException();
    }
}

final class Square implements Shape {
    double side;

    double area(Shape shape) {
        return switch (shape) {
            case Circle c -> c.radius() * c.radius() * Math.PI;
            case Square s when s.side > 0 -> s.side * s.side;
            default -> 0.0;
        };
    }
}
"#;
        let parsed = parse(source);
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        assert_eq!(find_nodes(&parsed, NodeType::RecordDeclaration).len(), 1);
        assert_eq!(
            find_nodes(&parsed, NodeType::CompactConstructorDeclaration).len(),
            1
        );
        assert_eq!(find_nodes(&parsed, NodeType::PermitsClause).len(), 1);
        assert_eq!(find_nodes(&parsed, NodeType::SwitchExpression).len(), 1);
        assert_eq!(find_nodes(&parsed, NodeType::Guard).len(), 1);
        assert_eq!(leaf_reconstruction(&parsed, source), source);
    }

    #[test]
    fn phase_aware_dispatch_for_flexible_constructor_bodies() {
        let source = r#"
class A extends B {
    A(int x) {
        int doubled = x * 2;
        super(doubled);
    }

    void ordinary() {
        int doubled = 2;
        run(doubled);
    }
}
"#;
        // version 25: the statement before super() is accepted and the call
        // is an explicit constructor invocation
        let parsed = parse_with(source, LanguageVersion::JAVA_25, SecurityConfig::default());
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        let ecis = find_nodes(&parsed, NodeType::ExplicitConstructorInvocation);
        assert_eq!(ecis.len(), 1);
        // the same token shape in a method body stays an ordinary invocation
        let constructors = find_nodes(&parsed, NodeType::ConstructorDeclaration);
        assert_eq!(constructors.len(), 1);
        assert_eq!(leaf_reconstruction(&parsed, source), source);
    }

    #[test]
    fn eci_outside_a_constructor_is_not_produced() {
        let source = "class A { void f() { helper(1); } }";
        let parsed = parse_with(source, LanguageVersion::JAVA_25, SecurityConfig::default());
        assert!(find_nodes(&parsed, NodeType::ExplicitConstructorInvocation).is_empty());
    }

    #[test]
    fn recovery_keeps_parsing_after_a_missing_semicolon() {
        let source = "class A { int x = 1 int y = 2; }";
        let parsed = parse(source);
        assert!(!parsed.errors.is_empty());
        // both fields still materialize
        assert_eq!(find_nodes(&parsed, NodeType::FieldDeclaration).len(), 2);
        assert_eq!(leaf_reconstruction(&parsed, source), source);
    }

    #[test]
    fn recovery_skips_garbage_to_the_next_member() {
        let source = "class A { ??? ; void f() {} }";
        let parsed = parse(source);
        assert!(parsed
            .errors
            .iter()
            .any(|error| matches!(error.kind, ParseErrorKind::SkippedTokens { .. })));
        // the real method after the garbage still materializes, body intact
        assert_eq!(find_nodes(&parsed, NodeType::Block).len(), 1);
        assert_eq!(leaf_reconstruction(&parsed, source), source);
    }

    #[test]
    fn recursion_limit_is_respected() {
        let security = SecurityConfig {
            max_recursion_depth: 30,
            ..SecurityConfig::default()
        };
        let deep = format!(
            "class A {{ int x = {}1{}; }}",
            "(".repeat(200),
            ")".repeat(200)
        );
        let result = IndexOverlayParser::with_defaults(security)
            .parse(&deep, LanguageVersion::JAVA_21);
        assert!(matches!(
            result,
            Err(crate::errors::FormatterError::RecursionLimitExceeded { limit: 30, .. })
        ));
    }

    #[test]
    fn nesting_at_the_limit_still_parses() {
        let security = SecurityConfig {
            max_recursion_depth: 1000,
            ..SecurityConfig::default()
        };
        let deep = format!(
            "class A {{ int x = {}1{}; }}",
            "(".repeat(40),
            ")".repeat(40)
        );
        let parsed = IndexOverlayParser::with_defaults(security)
            .parse(&deep, LanguageVersion::JAVA_21)
            .unwrap();
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
    }

    #[test]
    fn identical_inputs_produce_identical_arenas() {
        let source = "class A { void f(int a) { g(a + 1); } }";
        let first = parse(source);
        let second = parse(source);
        assert_eq!(first.arena.node_count(), second.arena.node_count());
        for index in 0..first.arena.node_count() {
            let id = NodeIndex::new(index as i32).unwrap();
            assert_eq!(first.arena.get(id).unwrap(), second.arena.get(id).unwrap());
            assert_eq!(
                first.arena.children(id).unwrap(),
                second.arena.children(id).unwrap()
            );
        }
    }

    #[test]
    fn lambdas_generics_and_method_references_parse() {
        let source = r#"
class F {
    Runnable r = () -> System.out.println("hi");
    java.util.function.Function<String, Integer> len = s -> s.length();
    java.util.function.BiFunction<Integer, Integer, Integer> add = (a, b) -> a + b;
    java.util.function.Supplier<java.util.List<String>> make = java.util.ArrayList::new;
    Object o = String.class;
}
"#;
        let parsed = parse(source);
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        assert_eq!(find_nodes(&parsed, NodeType::LambdaExpression).len(), 3);
        assert_eq!(find_nodes(&parsed, NodeType::MethodReference).len(), 1);
        assert_eq!(find_nodes(&parsed, NodeType::ClassLiteral).len(), 1);
        assert_eq!(leaf_reconstruction(&parsed, source), source);
    }

    #[test]
    fn statement_zoo_parses_cleanly() {
        let source = r#"
class Z {
    void f(int[] xs) {
        do { g(); } while (false);
        synchronized (this) { g(); }
        assert xs.length > 0 : "empty";
        outer:
        for (int x : xs) {
            if (x == 0) continue outer;
            if (x < 0) break;
        }
        switch (xs.length) {
            case 0:
            case 1:
                g();
                break;
            default:
                g();
        }
        try (var in = open(); java.io.Reader r2 = open()) {
            g();
        } catch (Exception e) {
            throw new RuntimeException(e);
        }
        int[] copy = new int[xs.length];
        int[][] grid = { { 1, 2 }, { 3, 4 } };
        Object boxed = (Object) xs;
        var label = xs.length > 1 ? "many" : "few";
    }
}
"#;
        let parsed = parse(source);
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        assert_eq!(find_nodes(&parsed, NodeType::DoWhileStatement).len(), 1);
        assert_eq!(find_nodes(&parsed, NodeType::SynchronizedStatement).len(), 1);
        assert_eq!(find_nodes(&parsed, NodeType::AssertStatement).len(), 1);
        assert_eq!(find_nodes(&parsed, NodeType::LabeledStatement).len(), 1);
        assert_eq!(find_nodes(&parsed, NodeType::EnhancedForStatement).len(), 1);
        assert_eq!(find_nodes(&parsed, NodeType::SwitchStatement).len(), 1);
        assert_eq!(find_nodes(&parsed, NodeType::TryStatement).len(), 1);
        assert_eq!(find_nodes(&parsed, NodeType::CastExpression).len(), 1);
        assert_eq!(find_nodes(&parsed, NodeType::ConditionalExpression).len(), 1);
        assert_eq!(leaf_reconstruction(&parsed, source), source);
    }

    #[test]
    fn annotations_parse_in_declarations() {
        let source = r#"
@Deprecated
@SuppressWarnings({ "unchecked", "raw" })
@Target(value = ElementType.TYPE)
class A {
    @interface Marker {}
}
"#;
        let parsed = parse(source);
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        assert_eq!(find_nodes(&parsed, NodeType::Annotation).len(), 3);
        assert_eq!(
            find_nodes(&parsed, NodeType::AnnotationTypeDeclaration).len(),
            1
        );
        assert_eq!(leaf_reconstruction(&parsed, source), source);
    }
}
