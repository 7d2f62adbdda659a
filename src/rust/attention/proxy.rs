use std::cell::{Ref, RefCell};
use std::rc::Rc;

use log::trace;
use ndarray::Array2;

use crate::model::{Activations, Layer, LayerError, LayerGraph, Mode, Node, NodeId};

/// Attention weights captured by a proxy, one entry per intercepted call.
///
/// Clones share the same storage. The buffer is not synchronized and cannot
/// leave the thread that created it. Callers that want per-example isolation
/// clear it between examples.
#[derive(Debug, Clone, Default)]
pub struct AttentionBuffer {
    inner: Rc<RefCell<Vec<Array2<f32>>>>,
}

impl AttentionBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, weights: Array2<f32>) {
        self.inner.borrow_mut().push(weights);
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.inner.borrow_mut().clear();
    }

    /// A copy of the entry captured by the `index`-th call.
    pub fn get(&self, index: usize) -> Option<Array2<f32>> {
        self.inner.borrow().get(index).cloned()
    }

    pub fn last(&self) -> Option<Array2<f32>> {
        self.inner.borrow().last().cloned()
    }

    /// Borrows every captured entry in call order.
    ///
    /// Panics if a forward pass appends while the borrow is held.
    pub fn borrow(&self) -> Ref<'_, Vec<Array2<f32>>> {
        self.inner.borrow()
    }

    /// Removes and returns all captured entries.
    pub fn take(&self) -> Vec<Array2<f32>> {
        std::mem::take(&mut *self.inner.borrow_mut())
    }

    /// True when both handles share storage.
    pub fn same_buffer(&self, other: &AttentionBuffer) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Stand-in for an attention layer that records its weights before
/// delegating to it.
#[derive(Debug)]
pub struct AttentionProxy {
    original: NodeId,
    buffer: AttentionBuffer,
}

impl AttentionProxy {
    pub fn original(&self) -> NodeId {
        self.original
    }

    pub fn buffer(&self) -> &AttentionBuffer {
        &self.buffer
    }
}

/// Builds a proxy for the layer at `original` together with the fresh buffer
/// it appends to.
///
/// Nothing is checked here: a target that does not expose attention weights
/// fails on the proxy's first call.
pub fn wrap(original: NodeId) -> (AttentionBuffer, AttentionProxy) {
    let buffer = AttentionBuffer::new();
    let proxy = AttentionProxy {
        original,
        buffer: buffer.clone(),
    };
    (buffer, proxy)
}

impl Layer for AttentionProxy {
    fn forward(
        &self,
        graph: &LayerGraph,
        node: &Node,
        input: Activations,
        mode: Mode,
    ) -> Result<Activations, LayerError> {
        let original = graph.get(self.original)?;
        let attention = original
            .layer()
            .as_attention()
            .ok_or_else(|| LayerError::UnsupportedLayer {
                name: original.name().to_string(),
            })?;

        let (weights, _) = match &input {
            Activations::Ragged { data, lengths } => attention.get_attention(data.view(), lengths)?,
            other => {
                return Err(LayerError::UnexpectedInput {
                    layer: node.name().to_string(),
                    expected: "ragged",
                    actual: other.kind(),
                })
            }
        };
        trace!("Captured attention weights {:?} from '{}'", weights.dim(), original.name());
        self.buffer.push(weights);

        graph.forward(self.original, input, mode)
    }

    fn is_interceptor(&self) -> bool {
        true
    }
}
