use super::graph::NodeId;

/// Errors raised while building or running a layer graph.
#[derive(Debug, thiserror::Error)]
pub enum LayerError {
    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),
    #[error("Model has no root layer")]
    NoRoot,
    #[error("Child index {index} out of range for node {parent} with {len} children")]
    ChildIndex {
        parent: NodeId,
        index: usize,
        len: usize,
    },
    #[error("Unsupported layer contract: layer '{name}' does not expose attention weights")]
    UnsupportedLayer { name: String },
    #[error("Unexpected input for layer '{layer}': expected {expected}, got {actual}")]
    UnexpectedInput {
        layer: String,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("Length mismatch in layer '{layer}': lengths sum to {expected} but input has {actual} rows")]
    LengthMismatch {
        layer: String,
        expected: usize,
        actual: usize,
    },
    #[error("Dimension mismatch in layer '{layer}': expected width {expected}, got {actual}")]
    WidthMismatch {
        layer: String,
        expected: usize,
        actual: usize,
    },
}
