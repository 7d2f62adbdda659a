use std::path::Path;

use log::{error, info};
use tokenizers::Tokenizer;

use super::categorizer::TextCategorizer;
use super::error::TextcatError;
use super::tokenize::word_level_tokenizer;
use super::{ATTN, EMBED, ENCODE, OUTPUT, POOL, ROOT};
use crate::model::{Chain, Embed, LayerGraph, ParametricAttention, Softmax, SumPool};

/// Default hidden width of the token vectors
pub const DEFAULT_WIDTH: usize = 64;
/// Default maximum number of tokens per document
pub const DEFAULT_MAX_SEQUENCE_LENGTH: usize = 256;

/// A builder for constructing a TextCategorizer with a fluent interface.
#[derive(Debug)]
pub struct TextCategorizerBuilder {
    tokenizer: Option<Tokenizer>,
    tokenizer_path: Option<String>,
    labels: Vec<String>,
    width: usize,
    seed: u64,
    max_sequence_length: usize,
}

impl Default for TextCategorizerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TextCategorizerBuilder {
    /// Creates a new empty builder with default width, seed and length limit
    ///
    /// # Example
    /// ```
    /// use attncat::TextCategorizerBuilder;
    ///
    /// let builder = TextCategorizerBuilder::new();
    /// ```
    pub fn new() -> Self {
        Self {
            tokenizer: None,
            tokenizer_path: None,
            labels: Vec::new(),
            width: DEFAULT_WIDTH,
            seed: 0,
            max_sequence_length: DEFAULT_MAX_SEQUENCE_LENGTH,
        }
    }

    /// Uses a word-level tokenizer over the given vocabulary.
    ///
    /// Words outside the vocabulary map to a shared unknown token.
    ///
    /// # Returns
    /// * `Result<Self, TextcatError>` - The builder instance if successful, or an error if:
    ///   - A tokenizer is already set
    ///   - The vocabulary contains an empty word
    ///
    /// # Example
    /// ```
    /// use attncat::TextCategorizerBuilder;
    ///
    /// let builder = TextCategorizerBuilder::new()
    ///     .with_vocab(vec!["great", "awful", "movie"]);
    /// assert!(builder.is_ok());
    /// ```
    pub fn with_vocab<I, S>(mut self, words: I) -> Result<Self, TextcatError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.tokenizer.is_some() {
            return Err(TextcatError::BuildError("Tokenizer already set".to_string()));
        }
        self.tokenizer = Some(word_level_tokenizer(words)?);
        Ok(self)
    }

    /// Loads a tokenizer from a `tokenizer.json` file.
    ///
    /// # Returns
    /// * `Result<Self, TextcatError>` - The builder instance if successful, or an error if:
    ///   - The path is empty or does not exist
    ///   - A tokenizer is already set
    ///   - The tokenizer failed to load
    pub fn with_custom_tokenizer(mut self, tokenizer_path: &str) -> Result<Self, TextcatError> {
        if tokenizer_path.is_empty() {
            return Err(TextcatError::BuildError("Tokenizer path cannot be empty".to_string()));
        }
        if self.tokenizer.is_some() {
            return Err(TextcatError::BuildError("Tokenizer already set".to_string()));
        }
        if !Path::new(tokenizer_path).exists() {
            return Err(TextcatError::BuildError(format!("Tokenizer file not found: {}", tokenizer_path)));
        }

        let tokenizer = Tokenizer::from_file(tokenizer_path).map_err(|e| {
            error!("Failed to load tokenizer: {}", e);
            TextcatError::BuildError(format!("Failed to load tokenizer: {}", e))
        })?;
        info!("Tokenizer loaded successfully from {}", tokenizer_path);

        self.tokenizer = Some(tokenizer);
        self.tokenizer_path = Some(tokenizer_path.to_string());
        Ok(self)
    }

    /// Adds an output label.
    ///
    /// # Returns
    /// * `Result<Self, TextcatError>` - The builder instance if successful, or an error if:
    ///   - The label is empty
    ///   - The label was already added
    ///   - Maximum number of labels (100) is exceeded
    ///
    /// # Example
    /// ```
    /// use attncat::TextCategorizerBuilder;
    ///
    /// let builder = TextCategorizerBuilder::new()
    ///     .add_label("positive")
    ///     .and_then(|b| b.add_label("positive"));
    /// assert!(builder.is_err());
    /// ```
    pub fn add_label(mut self, label: impl Into<String>) -> Result<Self, TextcatError> {
        const MAX_LABELS: usize = 100;

        let label = label.into();
        if label.trim().is_empty() {
            return Err(TextcatError::ValidationError("Label cannot be empty".into()));
        }
        if self.labels.contains(&label) {
            return Err(TextcatError::ValidationError(format!("Label '{}' already added", label)));
        }
        if self.labels.len() >= MAX_LABELS {
            return Err(TextcatError::ValidationError(format!(
                "Maximum number of labels ({}) exceeded",
                MAX_LABELS
            )));
        }
        self.labels.push(label);
        Ok(self)
    }

    /// Sets the width of the token vectors.
    pub fn with_width(mut self, width: usize) -> Self {
        self.width = width;
        self
    }

    /// Sets the seed used to initialise the layer weights.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_max_sequence_length(mut self, max_sequence_length: usize) -> Self {
        self.max_sequence_length = max_sequence_length;
        self
    }

    /// Builds the categorizer.
    ///
    /// The layer graph is `textcat -> [embed, encode -> [attn, pool], output]`.
    ///
    /// # Returns
    /// * `Result<TextCategorizer, TextcatError>` - The categorizer, or an error if:
    ///   - No tokenizer is set
    ///   - No labels have been added
    ///   - The width or maximum sequence length is zero
    pub fn build(self) -> Result<TextCategorizer, TextcatError> {
        let tokenizer = self.tokenizer
            .ok_or_else(|| TextcatError::BuildError("A tokenizer must be set".to_string()))?;
        if self.labels.is_empty() {
            return Err(TextcatError::BuildError("At least one label must be added".to_string()));
        }
        if self.width == 0 {
            return Err(TextcatError::ValidationError("Width must be greater than zero".into()));
        }
        if self.max_sequence_length == 0 {
            return Err(TextcatError::ValidationError("Maximum sequence length must be greater than zero".into()));
        }

        let vocab_size = tokenizer.get_vocab_size(true);
        let seed = self.seed;
        let mut graph = LayerGraph::new();

        let embed = graph.add(EMBED, Box::new(Embed::seeded(vocab_size, self.width, seed)));
        let attn = graph.add(ATTN, Box::new(ParametricAttention::seeded(self.width, seed.wrapping_add(1))));
        let pool = graph.add(POOL, Box::new(SumPool));
        let encode = graph.add_with_children(ENCODE, Box::new(Chain), vec![attn, pool])?;
        let output = graph.add(
            OUTPUT,
            Box::new(Softmax::seeded(self.labels.len(), self.width, seed.wrapping_add(2))),
        );
        let root = graph.add_with_children(ROOT, Box::new(Chain), vec![embed, encode, output])?;
        graph.set_root(root)?;

        info!(
            "Built categorizer with {} labels, vocabulary of {} and width {}",
            self.labels.len(),
            vocab_size,
            self.width
        );

        Ok(TextCategorizer {
            tokenizer,
            tokenizer_path: self.tokenizer_path,
            labels: self.labels,
            graph,
            vocab_size,
            width: self.width,
            max_sequence_length: self.max_sequence_length,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_requires_tokenizer() {
        let result = TextCategorizerBuilder::new().add_label("a").unwrap().build();
        assert!(matches!(result, Err(TextcatError::BuildError(_))));
    }

    #[test]
    fn test_build_requires_labels() {
        let result = TextCategorizerBuilder::new().with_vocab(vec!["a"]).unwrap().build();
        assert!(matches!(result, Err(TextcatError::BuildError(_))));
    }

    #[test]
    fn test_label_validation() {
        assert!(TextCategorizerBuilder::new().add_label("").is_err());
        assert!(TextCategorizerBuilder::new().add_label("  ").is_err());

        let mut builder = TextCategorizerBuilder::new();
        for i in 0..100 {
            builder = builder.add_label(format!("label_{}", i)).unwrap();
        }
        assert!(builder.add_label("one_too_many").is_err());
    }

    #[test]
    fn test_tokenizer_set_twice() {
        let result = TextCategorizerBuilder::new()
            .with_vocab(vec!["a"])
            .and_then(|b| b.with_vocab(vec!["b"]));
        assert!(matches!(result, Err(TextcatError::BuildError(_))));
    }

    #[test]
    fn test_missing_tokenizer_file() {
        let result = TextCategorizerBuilder::new().with_custom_tokenizer("/nonexistent/tokenizer.json");
        assert!(matches!(result, Err(TextcatError::BuildError(_))));
    }

    #[test]
    fn test_zero_width() {
        let result = TextCategorizerBuilder::new()
            .with_vocab(vec!["a"])
            .and_then(|b| b.add_label("x"))
            .map(|b| b.with_width(0))
            .and_then(|b| b.build());
        assert!(matches!(result, Err(TextcatError::ValidationError(_))));
    }
}
