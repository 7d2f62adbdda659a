use std::collections::HashMap;

use ndarray::ArrayView1;
use tokenizers::Tokenizer;

use super::builder::TextCategorizerBuilder;
use super::error::TextcatError;
use super::tokenize::{Token, TokenEncoding};
use super::TextcatInfo;
use crate::attention::bfs;
use crate::model::{Activations, LayerGraph, Model};

/// A text categorizer whose encoder pools token vectors through a
/// parametric attention layer.
///
/// The categorizer owns its [`LayerGraph`], so it can be handed to
/// [`intercept`](crate::intercept) to capture the attention weights of
/// every prediction.
///
/// ```rust
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use attncat::TextCategorizer;
///
/// let model = TextCategorizer::builder()
///     .with_vocab(vec!["great", "awful", "movie"])?
///     .add_label("positive")?
///     .add_label("negative")?
///     .build()?;
///
/// let (label, scores) = model.predict("great movie")?;
/// assert!(scores.contains_key(&label));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct TextCategorizer {
    pub(crate) tokenizer: Tokenizer,
    pub(crate) tokenizer_path: Option<String>,
    pub(crate) labels: Vec<String>,
    pub(crate) graph: LayerGraph,
    pub(crate) vocab_size: usize,
    pub(crate) width: usize,
    pub(crate) max_sequence_length: usize,
}

/// A categorized document.
#[derive(Debug, Clone)]
pub struct Doc {
    pub text: String,
    pub tokens: Vec<Token>,
    pub label: String,
    pub scores: HashMap<String, f32>,
}

impl TokenEncoding for TextCategorizer {
    fn tokenizer(&self) -> Option<&Tokenizer> {
        Some(&self.tokenizer)
    }

    fn max_sequence_length(&self) -> Option<usize> {
        Some(self.max_sequence_length)
    }
}

impl Model for TextCategorizer {
    fn layers(&self) -> &LayerGraph {
        &self.graph
    }

    fn layers_mut(&mut self) -> &mut LayerGraph {
        &mut self.graph
    }
}

impl TextCategorizer {
    /// Creates a new TextCategorizerBuilder for fluent construction
    pub fn builder() -> TextCategorizerBuilder {
        TextCategorizerBuilder::new()
    }

    /// Returns information about the categorizer's configuration
    pub fn info(&self) -> TextcatInfo {
        let layer_names = self
            .graph
            .root()
            .map(|root| {
                bfs(&self.graph, root)
                    .filter_map(|id| self.graph.node(id).map(|node| node.name().to_string()))
                    .collect()
            })
            .unwrap_or_default();

        TextcatInfo {
            tokenizer_path: self.tokenizer_path.clone(),
            labels: self.labels.clone(),
            vocab_size: self.vocab_size,
            width: self.width,
            max_sequence_length: self.max_sequence_length,
            layer_names,
        }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Counts the tokens the model would see for `text`.
    pub fn count_tokens(&self, text: &str) -> Result<usize, TextcatError> {
        TokenEncoding::count_tokens(self, text)
    }

    /// Splits `text` into the tokens the model sees.
    pub fn tokens(&self, text: &str) -> Result<Vec<Token>, TextcatError> {
        self.tokenize(text)
    }

    /// Predicts the label of the input text and returns label scores.
    ///
    /// # Returns
    /// A tuple containing:
    /// * The predicted label (String)
    /// * A HashMap of labels to their probabilities (summing to 1.0)
    pub fn predict(&self, text: &str) -> Result<(String, HashMap<String, f32>), TextcatError> {
        let doc = self.predict_doc(text)?;
        Ok((doc.label, doc.scores))
    }

    /// Like [`predict`](Self::predict), keeping the tokens as well.
    pub fn predict_doc(&self, text: &str) -> Result<Doc, TextcatError> {
        let mut docs = self.predict_batch(&[text])?;
        docs.pop()
            .ok_or_else(|| TextcatError::PredictionError("Model returned no documents".into()))
    }

    /// Predicts several texts with a single forward pass.
    ///
    /// An intercepted attention layer records one entry for the whole batch,
    /// with rows for each document's tokens in order.
    pub fn predict_batch(&self, texts: &[&str]) -> Result<Vec<Doc>, TextcatError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if texts.iter().any(|text| text.is_empty()) {
            return Err(TextcatError::ValidationError("Input text cannot be empty".into()));
        }

        let tokenized = texts
            .iter()
            .map(|text| self.tokenize(text))
            .collect::<Result<Vec<_>, _>>()?;
        let lengths: Vec<usize> = tokenized.iter().map(Vec::len).collect();
        let ids: Vec<u32> = tokenized.iter().flatten().map(|token| token.id).collect();

        let output = self.graph.predict(Activations::Ids { ids, lengths })?;
        let probs = match output {
            Activations::Dense(probs) => probs,
            other => {
                return Err(TextcatError::PredictionError(format!(
                    "Expected dense output, got {}",
                    other.kind()
                )))
            }
        };
        if probs.dim() != (texts.len(), self.labels.len()) {
            return Err(TextcatError::PredictionError(format!(
                "Expected output of shape {:?}, got {:?}",
                (texts.len(), self.labels.len()),
                probs.dim()
            )));
        }

        Ok(texts
            .iter()
            .zip(tokenized)
            .zip(probs.outer_iter())
            .map(|((text, tokens), row)| {
                let (label, scores) = self.scores(row);
                Doc {
                    text: text.to_string(),
                    tokens,
                    label,
                    scores,
                }
            })
            .collect())
    }

    fn scores(&self, row: ArrayView1<'_, f32>) -> (String, HashMap<String, f32>) {
        let scores: HashMap<String, f32> = self
            .labels
            .iter()
            .cloned()
            .zip(row.iter().copied())
            .collect();

        let best_label = scores.iter()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(label, _)| label.clone())
            .unwrap_or_else(|| "unknown".to_string());

        (best_label, scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_test_categorizer() -> TextCategorizer {
        TextCategorizer::builder()
            .with_vocab(vec!["great", "awful", "movie", "plot"])
            .unwrap()
            .add_label("positive")
            .unwrap()
            .add_label("negative")
            .unwrap()
            .with_width(8)
            .with_seed(7)
            .build()
            .expect("Failed to create categorizer")
    }

    #[test]
    fn test_info() {
        let info = setup_test_categorizer().info();
        assert_eq!(info.labels, vec!["positive", "negative"]);
        assert_eq!(info.vocab_size, 5);
        assert_eq!(info.width, 8);
        assert_eq!(info.layer_names, vec!["textcat", "embed", "encode", "output", "attn", "pool"]);
    }

    #[test]
    fn test_scores_form_distribution() {
        let (label, scores) = setup_test_categorizer().predict("great movie").unwrap();
        assert_eq!(scores.len(), 2);
        assert!(scores.contains_key(&label));
        let total: f32 = scores.values().sum();
        assert!((total - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_empty_text() {
        let result = setup_test_categorizer().predict("");
        assert!(matches!(result, Err(TextcatError::ValidationError(_))));
    }

    #[test]
    fn test_batch_matches_single_predictions() {
        let model = setup_test_categorizer();
        let batch = model.predict_batch(&["great movie", "awful plot twist"]).unwrap();
        let single = model.predict_doc("awful plot twist").unwrap();

        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1].tokens, single.tokens);
        for (label, score) in &single.scores {
            assert!((batch[1].scores[label] - score).abs() < 1e-6);
        }
    }

    #[test]
    fn test_seed_is_deterministic() {
        let a = setup_test_categorizer().predict("great plot").unwrap();
        let b = setup_test_categorizer().predict("great plot").unwrap();
        assert_eq!(a, b);
    }
}
