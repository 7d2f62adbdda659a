//! Layer graphs and the layers a text categorizer is built from.

mod error;
mod graph;
mod layers;

pub use error::LayerError;
pub use graph::{Activations, Layer, LayerGraph, Mode, Model, Node, NodeId};
pub use layers::{AttentionLayer, Chain, Embed, ParametricAttention, Softmax, SumPool};
