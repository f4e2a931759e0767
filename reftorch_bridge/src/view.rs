use crate::error::{BridgeError, BridgeResult};
use crate::node::Node;

/// Half-open node range `[start, end)` inside a [`ViewField`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The engine's working expression plus the pool of nodes handed back by
/// rewrites.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewField {
    nodes: Vec<Node>,
    free: Vec<Node>,
}

impl ViewField {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self {
            nodes,
            free: Vec::new(),
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Span covering the whole field.
    pub fn full_span(&self) -> Span {
        Span::new(0, self.nodes.len())
    }

    /// Nodes sitting in free storage.
    pub fn free_len(&self) -> usize {
        self.free.len()
    }

    pub fn get(&self, span: Span) -> BridgeResult<&[Node]> {
        if span.start > span.end || span.end > self.nodes.len() {
            return Err(BridgeError::InvalidSpan {
                start: span.start,
                end: span.end,
                len: self.nodes.len(),
            });
        }
        Ok(&self.nodes[span.start..span.end])
    }

    /// Hands free storage back to the engine's allocator.
    pub fn reclaim(&mut self) -> Vec<Node> {
        std::mem::take(&mut self.free)
    }

    /// Replaces `span` with `replacement`: the leftmost node of the span is
    /// overwritten in place, further replacement nodes follow it, and every
    /// span node not reused goes to free storage. The caller has already
    /// validated `span` with [`ViewField::get`].
    pub(crate) fn rewrite(&mut self, span: Span, replacement: &[Node]) {
        match replacement.split_first() {
            Some((first, rest)) if !span.is_empty() => {
                self.nodes[span.start] = *first;
                let tail = span.start + 1..span.end;
                let freed: Vec<Node> = self.nodes.splice(tail, rest.iter().copied()).collect();
                self.free.extend(freed);
            }
            _ => {
                let freed: Vec<Node> = self
                    .nodes
                    .splice(span.start..span.end, replacement.iter().copied())
                    .collect();
                self.free.extend(freed);
            }
        }
    }
}

impl From<Vec<Node>> for ViewField {
    fn from(nodes: Vec<Node>) -> Self {
        ViewField::new(nodes)
    }
}
