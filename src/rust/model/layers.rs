use std::cell::RefCell;

use ndarray::{s, Array1, Array2, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::error::LayerError;
use super::graph::{Activations, Layer, LayerGraph, Mode, Node};

/// Layers that can report per-token attention weights for a batch.
pub trait AttentionLayer {
    /// Computes attention for `data` (one row per token) split into
    /// documents by `lengths`.
    ///
    /// Returns the normalized weights (`tokens x 1`, summing to one within
    /// each document) followed by the raw scores they were computed from.
    fn get_attention(
        &self,
        data: ArrayView2<'_, f32>,
        lengths: &[usize],
    ) -> Result<(Array2<f32>, Array1<f32>), LayerError>;
}

fn unexpected(node: &Node, expected: &'static str, actual: &Activations) -> LayerError {
    LayerError::UnexpectedInput {
        layer: node.name().to_string(),
        expected,
        actual: actual.kind(),
    }
}

fn check_lengths(layer: &str, lengths: &[usize], rows: usize) -> Result<(), LayerError> {
    let expected: usize = lengths.iter().sum();
    if expected != rows {
        return Err(LayerError::LengthMismatch {
            layer: layer.to_string(),
            expected,
            actual: rows,
        });
    }
    Ok(())
}

fn uniform(rng: &mut StdRng, shape: (usize, usize), scale: f32) -> Array2<f32> {
    Array2::from_shape_fn(shape, |_| rng.gen_range(-scale..scale))
}

/// Runs its children in order, feeding each one's output to the next.
#[derive(Debug, Clone, Copy, Default)]
pub struct Chain;

impl Layer for Chain {
    fn forward(
        &self,
        graph: &LayerGraph,
        node: &Node,
        input: Activations,
        mode: Mode,
    ) -> Result<Activations, LayerError> {
        node.children()
            .iter()
            .try_fold(input, |x, &child| graph.forward(child, x, mode))
    }
}

/// Lookup table mapping token ids to vectors. Row 0 is the out-of-vocabulary row.
#[derive(Debug)]
pub struct Embed {
    table: Array2<f32>,
    rng: RefCell<StdRng>,
}

impl Embed {
    pub fn new(table: Array2<f32>) -> Self {
        Self {
            table,
            rng: RefCell::new(StdRng::seed_from_u64(0)),
        }
    }

    /// Randomly initialised table of `vocab_size x width`.
    pub fn seeded(vocab_size: usize, width: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let table = uniform(&mut rng, (vocab_size.max(1), width), 0.5);
        Self {
            table,
            rng: RefCell::new(rng),
        }
    }

    pub fn width(&self) -> usize {
        self.table.ncols()
    }

    pub fn vocab_size(&self) -> usize {
        self.table.nrows()
    }

    fn dropout(&self, data: &mut Array2<f32>, drop: f32) {
        if drop <= 0.0 {
            return;
        }
        if drop >= 1.0 {
            data.fill(0.0);
            return;
        }
        let keep = 1.0 - drop;
        let mut rng = self.rng.borrow_mut();
        data.mapv_inplace(|x| if rng.gen::<f32>() < drop { 0.0 } else { x / keep });
    }
}

impl Layer for Embed {
    fn forward(
        &self,
        _graph: &LayerGraph,
        node: &Node,
        input: Activations,
        mode: Mode,
    ) -> Result<Activations, LayerError> {
        let (ids, lengths) = match input {
            Activations::Ids { ids, lengths } => (ids, lengths),
            other => return Err(unexpected(node, "ids", &other)),
        };
        check_lengths(node.name(), &lengths, ids.len())?;

        let mut data = Array2::zeros((ids.len(), self.width()));
        for (mut row, &id) in data.outer_iter_mut().zip(ids.iter()) {
            let id = id as usize;
            let id = if id < self.vocab_size() { id } else { 0 };
            row.assign(&self.table.row(id));
        }
        if let Mode::Train { drop } = mode {
            self.dropout(&mut data, drop);
        }
        Ok(Activations::Ragged { data, lengths })
    }
}

/// Attention with a single learned query vector.
///
/// Each token is scored against the query, the scores are softmaxed within
/// each document, and the token vectors are scaled by their weight.
#[derive(Debug, Clone)]
pub struct ParametricAttention {
    query: Array1<f32>,
}

impl ParametricAttention {
    pub fn new(query: Array1<f32>) -> Self {
        Self { query }
    }

    pub fn seeded(width: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let query = Array1::from_shape_fn(width, |_| rng.gen_range(-1.0f32..1.0));
        Self { query }
    }

    pub fn query(&self) -> &Array1<f32> {
        &self.query
    }
}

impl AttentionLayer for ParametricAttention {
    fn get_attention(
        &self,
        data: ArrayView2<'_, f32>,
        lengths: &[usize],
    ) -> Result<(Array2<f32>, Array1<f32>), LayerError> {
        check_lengths("ParametricAttention", lengths, data.nrows())?;
        if data.ncols() != self.query.len() {
            return Err(LayerError::WidthMismatch {
                layer: "ParametricAttention".to_string(),
                expected: self.query.len(),
                actual: data.ncols(),
            });
        }

        let scores = data.dot(&self.query);
        let mut weights = Array2::zeros((data.nrows(), 1));
        let mut start = 0;
        for &len in lengths {
            let end = start + len;
            if len > 0 {
                let segment = scores.slice(s![start..end]);
                let max = segment.fold(f32::NEG_INFINITY, |m, &x| m.max(x));
                let exps = segment.mapv(|x| (x - max).exp());
                let total = exps.sum();
                weights.slice_mut(s![start..end, 0]).assign(&(exps / total));
            }
            start = end;
        }
        Ok((weights, scores))
    }
}

impl Layer for ParametricAttention {
    fn forward(
        &self,
        _graph: &LayerGraph,
        node: &Node,
        input: Activations,
        _mode: Mode,
    ) -> Result<Activations, LayerError> {
        let (data, lengths) = match input {
            Activations::Ragged { data, lengths } => (data, lengths),
            other => return Err(unexpected(node, "ragged", &other)),
        };
        let (weights, _) = self.get_attention(data.view(), &lengths)?;
        let data = &data * &weights;
        Ok(Activations::Ragged { data, lengths })
    }

    fn as_attention(&self) -> Option<&dyn AttentionLayer> {
        Some(self)
    }
}

/// Sums token rows into one row per document.
#[derive(Debug, Clone, Copy, Default)]
pub struct SumPool;

impl Layer for SumPool {
    fn forward(
        &self,
        _graph: &LayerGraph,
        node: &Node,
        input: Activations,
        _mode: Mode,
    ) -> Result<Activations, LayerError> {
        let (data, lengths) = match input {
            Activations::Ragged { data, lengths } => (data, lengths),
            other => return Err(unexpected(node, "ragged", &other)),
        };
        check_lengths(node.name(), &lengths, data.nrows())?;

        let mut pooled = Array2::zeros((lengths.len(), data.ncols()));
        let mut start = 0;
        for (mut row, &len) in pooled.outer_iter_mut().zip(lengths.iter()) {
            let end = start + len;
            if len > 0 {
                row.assign(&data.slice(s![start..end, ..]).sum_axis(Axis(0)));
            }
            start = end;
        }
        Ok(Activations::Dense(pooled))
    }
}

/// Affine projection followed by a row-wise softmax.
#[derive(Debug, Clone)]
pub struct Softmax {
    weights: Array2<f32>,
    bias: Array1<f32>,
}

impl Softmax {
    /// `weights` is `n_out x n_in`; `bias` has `n_out` entries.
    pub fn new(weights: Array2<f32>, bias: Array1<f32>) -> Result<Self, LayerError> {
        if weights.nrows() != bias.len() {
            return Err(LayerError::WidthMismatch {
                layer: "Softmax".to_string(),
                expected: weights.nrows(),
                actual: bias.len(),
            });
        }
        Ok(Self { weights, bias })
    }

    pub fn seeded(n_out: usize, n_in: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        Self {
            weights: uniform(&mut rng, (n_out, n_in), 1.0),
            bias: Array1::zeros(n_out),
        }
    }

    pub fn n_out(&self) -> usize {
        self.weights.nrows()
    }
}

impl Layer for Softmax {
    fn forward(
        &self,
        _graph: &LayerGraph,
        node: &Node,
        input: Activations,
        _mode: Mode,
    ) -> Result<Activations, LayerError> {
        let data = match input {
            Activations::Dense(data) => data,
            other => return Err(unexpected(node, "dense", &other)),
        };
        if data.ncols() != self.weights.ncols() {
            return Err(LayerError::WidthMismatch {
                layer: node.name().to_string(),
                expected: self.weights.ncols(),
                actual: data.ncols(),
            });
        }

        let mut scores = data.dot(&self.weights.t()) + &self.bias;
        for mut row in scores.outer_iter_mut() {
            let max = row.fold(f32::NEG_INFINITY, |m, &x| m.max(x));
            row.mapv_inplace(|x| (x - max).exp());
            let total = row.sum();
            row /= total;
        }
        Ok(Activations::Dense(scores))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn single(name: &str, layer: Box<dyn Layer>) -> (LayerGraph, crate::model::NodeId) {
        let mut graph = LayerGraph::new();
        let id = graph.add(name, layer);
        (graph, id)
    }

    #[test]
    fn test_attention_weights_sum_to_one_per_document() {
        let attn = ParametricAttention::new(array![1.0, -1.0]);
        let data = array![[1.0, 0.0], [0.0, 1.0], [2.0, 2.0], [0.5, 0.5], [3.0, 0.0]];
        let (weights, scores) = attn.get_attention(data.view(), &[2, 3]).unwrap();

        assert_eq!(weights.dim(), (5, 1));
        assert_eq!(scores.len(), 5);
        let first: f32 = weights.slice(s![0..2, 0]).sum();
        let second: f32 = weights.slice(s![2..5, 0]).sum();
        assert!((first - 1.0).abs() < 1e-6);
        assert!((second - 1.0).abs() < 1e-6);
        // Higher score, higher weight.
        assert!(weights[[0, 0]] > weights[[1, 0]]);
    }

    #[test]
    fn test_attention_rejects_bad_lengths() {
        let attn = ParametricAttention::new(array![1.0, 1.0]);
        let data = array![[1.0, 0.0], [0.0, 1.0]];
        let result = attn.get_attention(data.view(), &[3]);
        assert!(matches!(result, Err(LayerError::LengthMismatch { expected: 3, actual: 2, .. })));
    }

    #[test]
    fn test_embed_maps_unknown_ids_to_row_zero() {
        let (graph, id) = single("embed", Box::new(Embed::new(array![[0.0, 0.0], [1.0, 2.0]])));
        let out = graph
            .forward(id, Activations::Ids { ids: vec![1, 9], lengths: vec![2] }, Mode::Predict)
            .unwrap();
        match out {
            Activations::Ragged { data, lengths } => {
                assert_eq!(data, array![[1.0, 2.0], [0.0, 0.0]]);
                assert_eq!(lengths, vec![2]);
            }
            other => panic!("unexpected output: {:?}", other),
        }
    }

    #[test]
    fn test_embed_full_dropout_zeroes_output() {
        let (graph, id) = single("embed", Box::new(Embed::new(array![[0.0, 0.0], [1.0, 2.0]])));
        let out = graph
            .forward(id, Activations::Ids { ids: vec![1], lengths: vec![1] }, Mode::Train { drop: 1.0 })
            .unwrap();
        assert_eq!(out, Activations::Ragged { data: array![[0.0, 0.0]], lengths: vec![1] });
    }

    #[test]
    fn test_sum_pool_handles_empty_documents() {
        let (graph, id) = single("pool", Box::new(SumPool));
        let input = Activations::Ragged {
            data: array![[1.0, 1.0], [2.0, 3.0]],
            lengths: vec![0, 2],
        };
        let out = graph.forward(id, input, Mode::Predict).unwrap();
        assert_eq!(out, Activations::Dense(array![[0.0, 0.0], [3.0, 4.0]]));
    }

    #[test]
    fn test_softmax_rows_are_distributions() {
        let layer = Softmax::new(array![[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]], array![0.0, 0.0, 0.0]).unwrap();
        let (graph, id) = single("output", Box::new(layer));
        let out = graph
            .forward(id, Activations::Dense(array![[1.0, 2.0], [0.0, 0.0]]), Mode::Predict)
            .unwrap();
        let Activations::Dense(probs) = out else {
            panic!("expected dense output");
        };
        for row in probs.outer_iter() {
            assert!((row.sum() - 1.0).abs() < 1e-6);
        }
        assert!(probs[[0, 2]] > probs[[0, 1]]);
    }

    #[test]
    fn test_wrong_input_kind() {
        let (graph, id) = single("pool", Box::new(SumPool));
        let result = graph.forward(id, Activations::Dense(Array2::zeros((1, 1))), Mode::Predict);
        assert!(matches!(
            result,
            Err(LayerError::UnexpectedInput { expected: "ragged", actual: "dense", .. })
        ));
    }
}
