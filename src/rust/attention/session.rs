use std::fmt;

use log::{debug, error, info, warn};

use super::error::InterceptError;
use super::locate::{locate, Location};
use super::proxy::{wrap, AttentionBuffer};
use crate::model::{Model, NodeId};

/// Layer name intercepted when none is given.
pub const DEFAULT_TARGET: &str = "attn";

/// Everything needed to undo an interception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterceptRecord {
    pub parent: NodeId,
    pub index: usize,
    pub original: NodeId,
    pub proxy: NodeId,
}

/// Scoped interception of one attention layer.
///
/// While the session lives, the target layer is replaced by a proxy that
/// appends its attention weights to [`weights`](Self::weights) on every
/// forward pass. The original layer is put back when the session is released
/// or dropped, including when the scope is left through `?` or a panic.
///
/// The session holds the model mutably, so two sessions on one model cannot
/// overlap.
///
/// ```rust
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use attncat::{intercept, TextCategorizer};
///
/// let mut model = TextCategorizer::builder()
///     .with_vocab(vec!["good", "bad", "movie"])?
///     .add_label("positive")?
///     .add_label("negative")?
///     .build()?;
///
/// let session = intercept(&mut model, "attn")?;
/// let weights = session.weights().expect("categorizer has an attention layer");
/// session.model().predict("good movie")?;
/// assert_eq!(weights.len(), 1);
/// # Ok(())
/// # }
/// ```
pub struct AttentionSession<'m, M: Model + ?Sized> {
    model: &'m mut M,
    record: Option<InterceptRecord>,
    weights: Option<AttentionBuffer>,
}

/// Replaces the layer named `target` with a capturing proxy.
///
/// A missing layer is not an error: the session then has no buffer and the
/// model is left untouched.
pub fn intercept<'m, M: Model + ?Sized>(
    model: &'m mut M,
    target: &str,
) -> Result<AttentionSession<'m, M>, InterceptError> {
    let graph = model.layers_mut();
    let location = graph.root().and_then(|root| locate(graph, root, target));
    let Some(Location { parent, index }) = location else {
        debug!("No layer named '{}' found, continuing without interception", target);
        return Ok(AttentionSession {
            model,
            record: None,
            weights: None,
        });
    };

    let original = graph.child(parent, index)?;
    let node = graph.get(original)?;
    if node.layer().is_interceptor() {
        return Err(InterceptError::AlreadyIntercepted {
            name: target.to_string(),
        });
    }
    let name = node.name().to_string();

    let (buffer, proxy) = wrap(original);
    let proxy_id = graph.add(name, Box::new(proxy));
    if let Err(e) = graph.replace_child(parent, index, proxy_id) {
        graph.remove(proxy_id);
        return Err(e.into());
    }
    info!("Intercepting layer '{}' ({}) at {}[{}]", target, original, parent, index);

    Ok(AttentionSession {
        model,
        record: Some(InterceptRecord {
            parent,
            index,
            original,
            proxy: proxy_id,
        }),
        weights: Some(buffer),
    })
}

/// Runs `body` with the layer named `target` intercepted and restores it
/// afterwards. An error from `body` is returned as is.
pub fn with_attention_weights<M, T, E, F>(model: &mut M, target: &str, body: F) -> Result<T, E>
where
    M: Model + ?Sized,
    E: From<InterceptError>,
    F: FnOnce(&M, Option<&AttentionBuffer>) -> Result<T, E>,
{
    let session = intercept(model, target)?;
    let result = body(session.model(), session.weights());
    session.release();
    result
}

impl<'m, M: Model + ?Sized> AttentionSession<'m, M> {
    pub fn model(&self) -> &M {
        &*self.model
    }

    /// The capture buffer, or `None` when the target layer was not found.
    pub fn weights(&self) -> Option<&AttentionBuffer> {
        self.weights.as_ref()
    }

    pub fn record(&self) -> Option<&InterceptRecord> {
        self.record.as_ref()
    }

    pub fn is_intercepting(&self) -> bool {
        self.record.is_some()
    }

    /// Restores the original layer now and hands back the buffer, which
    /// keeps whatever was captured.
    pub fn release(mut self) -> Option<AttentionBuffer> {
        self.restore();
        self.weights.take()
    }

    fn restore(&mut self) {
        let Some(record) = self.record.take() else {
            return;
        };
        let graph = self.model.layers_mut();
        match graph.replace_child(record.parent, record.index, record.original) {
            Ok(previous) if previous == record.proxy => {}
            Ok(previous) => warn!(
                "Expected proxy {} at {}[{}] but found {}",
                record.proxy, record.parent, record.index, previous
            ),
            Err(e) => error!("Failed to restore layer {}: {}", record.original, e),
        }
        graph.remove(record.proxy);
        debug!("Restored layer {} at {}[{}]", record.original, record.parent, record.index);
    }
}

impl<'m, M: Model + ?Sized> Drop for AttentionSession<'m, M> {
    fn drop(&mut self) {
        self.restore();
    }
}

impl<'m, M: Model + ?Sized> fmt::Debug for AttentionSession<'m, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttentionSession")
            .field("record", &self.record)
            .field("captured", &self.weights.as_ref().map(AttentionBuffer::len))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Activations, Chain, LayerGraph, ParametricAttention};
    use ndarray::array;

    fn model() -> (LayerGraph, NodeId, NodeId) {
        let mut graph = LayerGraph::new();
        let attn = graph.add("attn", Box::new(ParametricAttention::new(array![1.0, 0.0])));
        let encode = graph.add_with_children("encode", Box::new(Chain), vec![attn]).unwrap();
        let root = graph.add_with_children("root", Box::new(Chain), vec![encode]).unwrap();
        graph.set_root(root).unwrap();
        (graph, encode, attn)
    }

    fn input() -> Activations {
        Activations::Ragged {
            data: array![[1.0, 0.0], [0.0, 1.0]],
            lengths: vec![2],
        }
    }

    #[test]
    fn test_session_installs_and_restores() {
        let (mut graph, encode, attn) = model();
        let nodes_before = graph.len();
        {
            let session = intercept(&mut graph, DEFAULT_TARGET).unwrap();
            let record = *session.record().unwrap();
            assert_eq!(record.parent, encode);
            assert_eq!(record.original, attn);
            assert_eq!(session.model().child(encode, 0).unwrap(), record.proxy);
            assert!(session.model().get(record.proxy).unwrap().layer().is_interceptor());
        }
        assert_eq!(graph.child(encode, 0).unwrap(), attn);
        assert_eq!(graph.len(), nodes_before);
    }

    #[test]
    fn test_leaked_session_is_detected() {
        let (mut graph, _, _) = model();
        std::mem::forget(intercept(&mut graph, DEFAULT_TARGET).unwrap());

        let result = intercept(&mut graph, DEFAULT_TARGET);
        assert!(matches!(result, Err(InterceptError::AlreadyIntercepted { .. })));
    }

    #[test]
    fn test_release_keeps_captures() {
        let (mut graph, _, _) = model();
        let session = intercept(&mut graph, DEFAULT_TARGET).unwrap();
        session.model().predict(input()).unwrap();
        let weights = session.release().unwrap();

        assert_eq!(weights.len(), 1);
        graph.predict(input()).unwrap();
        assert_eq!(weights.len(), 1);
    }

    #[test]
    fn test_graph_without_root_yields_no_buffer() {
        let mut graph = LayerGraph::new();
        let session = intercept(&mut graph, DEFAULT_TARGET).unwrap();
        assert!(session.weights().is_none());
        assert!(!session.is_intercepting());
    }
}
