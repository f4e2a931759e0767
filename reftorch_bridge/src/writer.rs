use tracing::trace;

use crate::error::{BridgeError, BridgeResult};
use crate::fixed::{self, Scale};
use crate::handle::Handle;
use crate::node::Node;
use crate::view::{Span, ViewField};

/// What a native operation hands back before it is turned into nodes.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    Handle(Handle),
    Int(i64),
    Real(f64, Scale),
    IntList(Vec<i64>),
    RealList(Vec<f64>, Scale),
    Nothing,
}

impl Output {
    /// Encodes the result. Fails only when a real cannot be represented at
    /// its scale, in which case nothing has been written yet.
    pub fn to_nodes(&self) -> BridgeResult<Vec<Node>> {
        let nodes = match self {
            Output::Handle(h) => vec![Node::Number(h.raw())],
            Output::Int(n) => vec![Node::Number(*n)],
            Output::Real(v, scale) => vec![Node::Number(encode(*v, *scale)?)],
            Output::IntList(values) => values.iter().map(|&n| Node::Number(n)).collect(),
            Output::RealList(values, scale) => values
                .iter()
                .map(|&v| encode(v, *scale).map(Node::Number))
                .collect::<BridgeResult<Vec<_>>>()?,
            Output::Nothing => Vec::new(),
        };
        Ok(nodes)
    }
}

fn encode(value: f64, scale: Scale) -> BridgeResult<i64> {
    fixed::encode(value, scale).ok_or_else(|| {
        BridgeError::NativeFault(format!("{} cannot be encoded at scale {}", value, scale))
    })
}

/// The two answers an engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Proceed,
    SearchAlternative,
}

/// Splices `result` over `span` and reports proceed. `span` must already have
/// been validated against `field`.
pub fn write_result(field: &mut ViewField, span: Span, result: &[Node]) -> Signal {
    trace!(
        start = span.start,
        end = span.end,
        written = result.len(),
        "writing result"
    );
    field.rewrite(span, result);
    Signal::Proceed
}
