use std::fmt;

use crate::attention::InterceptError;
use crate::model::LayerError;

/// Represents the different types of errors that can occur in the text categorizer.
#[derive(Debug)]
pub enum TextcatError {
    /// Error occurred while building or running the tokenizer
    TokenizerError(String),
    /// Error occurred while running the layer graph
    ModelError(String),
    /// Error occurred during the build phase
    BuildError(String),
    /// Error occurred while making predictions
    PredictionError(String),
    /// Error occurred due to invalid input parameters
    ValidationError(String),
}

impl fmt::Display for TextcatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TokenizerError(msg) => write!(f, "Tokenizer error: {}", msg),
            Self::ModelError(msg) => write!(f, "Model error: {}", msg),
            Self::BuildError(msg) => write!(f, "Build error: {}", msg),
            Self::PredictionError(msg) => write!(f, "Prediction error: {}", msg),
            Self::ValidationError(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for TextcatError {}

impl From<LayerError> for TextcatError {
    fn from(err: LayerError) -> Self {
        TextcatError::ModelError(err.to_string())
    }
}

impl From<InterceptError> for TextcatError {
    fn from(err: InterceptError) -> Self {
        TextcatError::ModelError(err.to_string())
    }
}
