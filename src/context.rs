use std::{
    path::Path,
    time::{Duration, Instant},
};

use crate::{
    arena::{NodeArena, NodeIndex, NodeRecord},
    config::SecurityConfig,
    errors::{FormatterError, Result},
    position::SourcePositionMapper,
};

/// Read-only, deadline-aware view over (arena, source, position mapper)
/// handed to rules. Also carries a precomputed index of the offsets lying
/// inside string/char literals and comments so text-scanning rules can skip
/// them without re-lexing.
pub struct TransformationContext<'a> {
    arena: &'a NodeArena,
    root: NodeIndex,
    source: &'a str,
    path: &'a Path,
    security: SecurityConfig,
    mapper: SourcePositionMapper,
    opaque_ranges: Vec<(u32, u32)>,
    deadline: Instant,
    timeout: Duration,
}

impl<'a> TransformationContext<'a> {
    pub fn new(
        arena: &'a NodeArena,
        root: NodeIndex,
        source: &'a str,
        path: &'a Path,
        security: SecurityConfig,
        deadline: Instant,
        timeout: Duration,
    ) -> Result<Self> {
        if !arena.is_alive() {
            return Err(FormatterError::ArenaClosed);
        }
        let mut opaque_ranges = Vec::new();
        for (index, node_type) in arena.types()?.iter().enumerate() {
            if node_type.is_opaque_to_text_rules() {
                let record = arena.get(NodeIndex::new(index as i32)?)?;
                opaque_ranges.push((record.start, record.end()));
            }
        }
        opaque_ranges.sort_unstable();
        Ok(Self {
            arena,
            root,
            source,
            path,
            security,
            mapper: SourcePositionMapper::new(source),
            opaque_ranges,
            deadline,
            timeout,
        })
    }

    pub fn root(&self) -> NodeIndex {
        self.root
    }

    pub fn source(&self) -> &'a str {
        self.source
    }

    pub fn path(&self) -> &'a Path {
        self.path
    }

    pub fn security(&self) -> &SecurityConfig {
        &self.security
    }

    pub fn node(&self, id: NodeIndex) -> Result<NodeRecord> {
        self.arena.get(id)
    }

    pub fn children(&self, id: NodeIndex) -> Result<&'a [NodeIndex]> {
        self.arena.children(id)
    }

    pub fn node_count(&self) -> usize {
        self.arena.node_count()
    }

    /// The arena's type array, for rules that sweep nodes in allocation
    /// order instead of walking the tree.
    pub fn node_types(&self) -> Result<&'a [crate::node_type::NodeType]> {
        self.arena.types()
    }

    pub fn node_text(&self, id: NodeIndex) -> Result<&'a str> {
        let record = self.arena.get(id)?;
        Ok(&self.source[record.start as usize..record.end() as usize])
    }

    pub fn line_column(&self, offset: u32) -> (u32, u32) {
        self.mapper.line_column(offset)
    }

    pub fn position_mapper(&self) -> &SourcePositionMapper {
        &self.mapper
    }

    /// True when `offset` falls inside a string/char literal or a comment.
    pub fn is_in_literal_or_comment(&self, offset: u32) -> bool {
        let insertion = self
            .opaque_ranges
            .partition_point(|&(start, _)| start <= offset);
        insertion > 0 && offset < self.opaque_ranges[insertion - 1].1
    }

    /// Cooperative cancellation point. Rules call this inside any loop whose
    /// bound depends on the input.
    pub fn check_deadline(&self) -> Result<()> {
        if Instant::now() > self.deadline {
            return Err(FormatterError::ExecutionTimeout {
                timeout: self.timeout,
            });
        }
        Ok(())
    }
}
