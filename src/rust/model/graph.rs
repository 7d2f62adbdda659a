use std::fmt;

use ndarray::Array2;

use super::error::LayerError;
use super::layers::AttentionLayer;

/// Stable handle to a node in a [`LayerGraph`].
///
/// Ids are assigned at insertion and never reused, so two handles are the
/// same node exactly when they compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Whether a forward pass is a plain prediction or part of an update.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Mode {
    #[default]
    Predict,
    /// Training pass with the given dropout rate.
    Train { drop: f32 },
}

/// Data flowing between layers.
#[derive(Debug, Clone, PartialEq)]
pub enum Activations {
    /// Token ids for a batch of documents, concatenated.
    Ids { ids: Vec<u32>, lengths: Vec<usize> },
    /// One row per token, with per-document lengths.
    Ragged { data: Array2<f32>, lengths: Vec<usize> },
    /// One row per document.
    Dense(Array2<f32>),
}

impl Activations {
    pub fn kind(&self) -> &'static str {
        match self {
            Activations::Ids { .. } => "ids",
            Activations::Ragged { .. } => "ragged",
            Activations::Dense(_) => "dense",
        }
    }
}

/// A unit of computation stored in a [`LayerGraph`].
///
/// Layers never own their children: the graph keeps the ordered child list
/// on the [`Node`], and container layers such as `Chain` read it from the node
/// they are invoked for.
pub trait Layer: fmt::Debug {
    /// Runs the layer for `node` on `input`.
    fn forward(
        &self,
        graph: &LayerGraph,
        node: &Node,
        input: Activations,
        mode: Mode,
    ) -> Result<Activations, LayerError>;

    /// Attention capability, for layers that can report per-token weights.
    fn as_attention(&self) -> Option<&dyn AttentionLayer> {
        None
    }

    /// True for layers installed by an interception session.
    fn is_interceptor(&self) -> bool {
        false
    }
}

/// A named slot in the graph holding a layer and its ordered children.
#[derive(Debug)]
pub struct Node {
    id: NodeId,
    name: String,
    children: Vec<NodeId>,
    layer: Box<dyn Layer>,
}

impl Node {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn layer(&self) -> &dyn Layer {
        self.layer.as_ref()
    }
}

/// Arena owning every node of a model.
#[derive(Debug, Default)]
pub struct LayerGraph {
    nodes: Vec<Option<Node>>,
    root: Option<NodeId>,
}

impl LayerGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a leaf node and returns its id.
    pub fn add(&mut self, name: impl Into<String>, layer: Box<dyn Layer>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(Node {
            id,
            name: name.into(),
            children: Vec::new(),
            layer,
        }));
        id
    }

    /// Adds a node whose children already exist in the graph.
    pub fn add_with_children(
        &mut self,
        name: impl Into<String>,
        layer: Box<dyn Layer>,
        children: Vec<NodeId>,
    ) -> Result<NodeId, LayerError> {
        if let Some(missing) = children.iter().find(|&&child| self.node(child).is_none()) {
            return Err(LayerError::UnknownNode(*missing));
        }
        let id = self.add(name, layer);
        self.get_mut(id)?.children = children;
        Ok(id)
    }

    /// Appends `child` to `parent`'s child list. Used for shared children
    /// and back-references that cannot be expressed bottom-up.
    pub fn push_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), LayerError> {
        self.get(child)?;
        self.get_mut(parent)?.children.push(child);
        Ok(())
    }

    pub fn set_root(&mut self, root: NodeId) -> Result<(), LayerError> {
        self.get(root)?;
        self.root = Some(root);
        Ok(())
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    pub fn get(&self, id: NodeId) -> Result<&Node, LayerError> {
        self.node(id).ok_or(LayerError::UnknownNode(id))
    }

    fn get_mut(&mut self, id: NodeId) -> Result<&mut Node, LayerError> {
        self.nodes
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(LayerError::UnknownNode(id))
    }

    /// The child id at `index` of `parent`.
    pub fn child(&self, parent: NodeId, index: usize) -> Result<NodeId, LayerError> {
        let node = self.get(parent)?;
        node.children.get(index).copied().ok_or_else(|| LayerError::ChildIndex {
            parent,
            index,
            len: node.children.len(),
        })
    }

    /// Swaps the child at `index` of `parent` for `replacement`, returning
    /// the id that was there before.
    pub(crate) fn replace_child(
        &mut self,
        parent: NodeId,
        index: usize,
        replacement: NodeId,
    ) -> Result<NodeId, LayerError> {
        self.get(replacement)?;
        let node = self.get_mut(parent)?;
        let len = node.children.len();
        let slot = node
            .children
            .get_mut(index)
            .ok_or(LayerError::ChildIndex { parent, index, len })?;
        Ok(std::mem::replace(slot, replacement))
    }

    /// Drops a node from the arena. Its id is not reused.
    pub(crate) fn remove(&mut self, id: NodeId) -> Option<Node> {
        self.nodes.get_mut(id.0).and_then(Option::take)
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs the layer stored at `id`.
    pub fn forward(&self, id: NodeId, input: Activations, mode: Mode) -> Result<Activations, LayerError> {
        let node = self.get(id)?;
        node.layer.forward(self, node, input, mode)
    }

    /// Runs the whole model from its root in prediction mode.
    pub fn predict(&self, input: Activations) -> Result<Activations, LayerError> {
        let root = self.root.ok_or(LayerError::NoRoot)?;
        self.forward(root, input, Mode::Predict)
    }
}

/// Anything that owns a [`LayerGraph`] can be intercepted.
pub trait Model {
    fn layers(&self) -> &LayerGraph;
    fn layers_mut(&mut self) -> &mut LayerGraph;
}

impl Model for LayerGraph {
    fn layers(&self) -> &LayerGraph {
        self
    }

    fn layers_mut(&mut self) -> &mut LayerGraph {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::layers::Chain;

    #[test]
    fn test_add_with_unknown_child() {
        let mut graph = LayerGraph::new();
        let result = graph.add_with_children("root", Box::new(Chain), vec![NodeId(7)]);
        assert!(matches!(result, Err(LayerError::UnknownNode(NodeId(7)))));
    }

    #[test]
    fn test_replace_child_returns_previous() {
        let mut graph = LayerGraph::new();
        let a = graph.add("a", Box::new(Chain));
        let b = graph.add("b", Box::new(Chain));
        let root = graph.add_with_children("root", Box::new(Chain), vec![a]).unwrap();

        assert_eq!(graph.replace_child(root, 0, b).unwrap(), a);
        assert_eq!(graph.child(root, 0).unwrap(), b);
        assert!(graph.replace_child(root, 3, a).is_err());
    }

    #[test]
    fn test_removed_ids_are_not_reused() {
        let mut graph = LayerGraph::new();
        let a = graph.add("a", Box::new(Chain));
        assert!(graph.remove(a).is_some());
        let b = graph.add("b", Box::new(Chain));
        assert_ne!(a, b);
        assert!(graph.node(a).is_none());
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_predict_without_root() {
        let graph = LayerGraph::new();
        let result = graph.predict(Activations::Dense(Array2::zeros((1, 1))));
        assert!(matches!(result, Err(LayerError::NoRoot)));
    }

    #[test]
    fn test_errors_raised_by_graph_operations() {
        use crate::model::layers::{ParametricAttention, Softmax};
        use ndarray::array;

        let mut graph = LayerGraph::new();
        let attn = graph.add("attn", Box::new(ParametricAttention::new(array![1.0, 0.0])));
        let output = graph.add("output", Box::new(Softmax::seeded(2, 3, 0)));
        let root = graph.add_with_children("root", Box::new(Chain), vec![attn]).unwrap();

        assert!(matches!(graph.child(root, 4), Err(LayerError::ChildIndex { index: 4, len: 1, .. })));
        assert!(matches!(graph.get(NodeId(99)), Err(LayerError::UnknownNode(_))));

        let ragged = Activations::Ragged {
            data: array![[1.0, 0.0]],
            lengths: vec![2],
        };
        assert!(matches!(
            graph.forward(attn, ragged, Mode::Predict),
            Err(LayerError::LengthMismatch { expected: 2, actual: 1, .. })
        ));

        let dense = Activations::Dense(Array2::zeros((1, 2)));
        assert!(matches!(
            graph.forward(output, dense.clone(), Mode::Predict),
            Err(LayerError::WidthMismatch { expected: 3, actual: 2, .. })
        ));
        assert!(matches!(
            graph.forward(attn, dense, Mode::Train { drop: 0.5 }),
            Err(LayerError::UnexpectedInput { expected: "ragged", actual: "dense", .. })
        ));
    }
}
