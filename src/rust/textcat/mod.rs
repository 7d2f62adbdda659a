mod builder;
mod categorizer;
mod error;
mod tokenize;

pub use builder::{TextCategorizerBuilder, DEFAULT_MAX_SEQUENCE_LENGTH, DEFAULT_WIDTH};
pub use categorizer::{Doc, TextCategorizer};
pub use error::TextcatError;
pub use tokenize::{Token, UNK_TOKEN};

/// Layer names used by [`TextCategorizer`].
pub const ROOT: &str = "textcat";
pub const EMBED: &str = "embed";
pub const ENCODE: &str = "encode";
pub const ATTN: &str = crate::attention::DEFAULT_TARGET;
pub const POOL: &str = "pool";
pub const OUTPUT: &str = "output";

/// Information about the current configuration of a categorizer
#[derive(Debug, Clone)]
pub struct TextcatInfo {
    /// Path to the tokenizer file, when one was loaded from disk
    pub tokenizer_path: Option<String>,
    /// Output labels in score order
    pub labels: Vec<String>,
    /// Number of entries in the tokenizer vocabulary
    pub vocab_size: usize,
    /// Width of the token vectors
    pub width: usize,
    /// Maximum number of tokens per document
    pub max_sequence_length: usize,
    /// Layer names in breadth-first order
    pub layer_names: Vec<String>,
}
