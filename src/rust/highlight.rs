//! Per-token highlighting from captured attention weights.

use std::collections::HashMap;

use log::warn;
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

use crate::attention::{AttentionBuffer, AttentionSession};
use crate::textcat::{TextCategorizer, TextcatError, Token};

/// How attention weights are turned into token styling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HighlightConfig {
    /// Weights above this are highlighted
    pub threshold: f32,
    pub highlight_color: String,
    pub base_color: String,
    /// Scale grows by `weight * scale_factor` from 1.0
    pub scale_factor: f32,
    /// Upper bound on the scale
    pub max_scale: f32,
}

impl Default for HighlightConfig {
    fn default() -> Self {
        Self {
            threshold: 0.025,
            highlight_color: "rgba(255,0,0,0.54)".to_string(),
            base_color: "inherit".to_string(),
            scale_factor: 2.0,
            max_scale: 2.5,
        }
    }
}

impl HighlightConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(format!("threshold must be within [0, 1], got {}", self.threshold));
        }
        if self.scale_factor < 0.0 {
            return Err(format!("scale_factor cannot be negative, got {}", self.scale_factor));
        }
        if self.max_scale < 1.0 {
            return Err(format!("max_scale must be at least 1.0, got {}", self.max_scale));
        }
        Ok(())
    }

    pub fn style(&self, text: impl Into<String>, weight: f32) -> TokenHighlight {
        let color = if weight > self.threshold {
            &self.highlight_color
        } else {
            &self.base_color
        };
        TokenHighlight {
            text: text.into(),
            color: color.clone(),
            scale: (1.0 + weight * self.scale_factor).min(self.max_scale),
            weight,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenHighlight {
    /// Token text with its trailing whitespace
    pub text: String,
    pub color: String,
    pub scale: f32,
    pub weight: f32,
}

/// Pairs each token with the first column of its row in `weights`.
pub fn highlight_tokens(
    tokens: &[Token],
    weights: ArrayView2<'_, f32>,
    config: &HighlightConfig,
) -> Result<Vec<TokenHighlight>, TextcatError> {
    if weights.nrows() < tokens.len() || weights.ncols() == 0 {
        return Err(TextcatError::PredictionError(format!(
            "Attention weights of shape {:?} do not cover {} tokens",
            weights.dim(),
            tokens.len()
        )));
    }
    Ok(tokens
        .iter()
        .zip(weights.column(0))
        .map(|(token, &weight)| config.style(token.text_with_ws.as_str(), weight))
        .collect())
}

/// A text with its prediction and highlighted tokens.
#[derive(Debug, Clone, Serialize)]
pub struct Annotated {
    pub text: String,
    pub label: String,
    pub scores: HashMap<String, f32>,
    /// Empty when no attention layer was intercepted
    pub tokens: Vec<TokenHighlight>,
}

/// Lazily annotates a stream of texts.
///
/// Before each text the buffer is cleared, so the first captured entry
/// always belongs to the current text.
pub struct Annotate<'a, I> {
    model: &'a TextCategorizer,
    weights: Option<&'a AttentionBuffer>,
    texts: I,
    config: &'a HighlightConfig,
    warned: bool,
}

impl<'a, I> Annotate<'a, I> {
    pub fn new(
        model: &'a TextCategorizer,
        weights: Option<&'a AttentionBuffer>,
        texts: I,
        config: &'a HighlightConfig,
    ) -> Self {
        Self {
            model,
            weights,
            texts,
            config,
            warned: false,
        }
    }

    fn annotate_one(&mut self, text: &str) -> Result<Annotated, TextcatError> {
        if let Some(weights) = self.weights {
            weights.clear();
        }
        let doc = self.model.predict_doc(text)?;

        let tokens = match self.weights.map(|weights| weights.get(0)) {
            Some(Some(first)) => highlight_tokens(&doc.tokens, first.view(), self.config)?,
            Some(None) => {
                return Err(TextcatError::PredictionError(
                    "Attention layer was intercepted but not called".into(),
                ))
            }
            None => {
                if !self.warned {
                    warn!("No attention weights available, tokens will not be highlighted");
                    self.warned = true;
                }
                Vec::new()
            }
        };

        Ok(Annotated {
            text: doc.text,
            label: doc.label,
            scores: doc.scores,
            tokens,
        })
    }
}

impl<'a, I, S> Iterator for Annotate<'a, I>
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
{
    type Item = Result<Annotated, TextcatError>;

    fn next(&mut self) -> Option<Self::Item> {
        let text = self.texts.next()?;
        Some(self.annotate_one(text.as_ref()))
    }
}

/// Annotates `texts` with the weights captured by `session`.
pub fn annotate<'a, 'm, I>(
    session: &'a AttentionSession<'m, TextCategorizer>,
    texts: I,
    config: &'a HighlightConfig,
) -> Annotate<'a, I::IntoIter>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    Annotate::new(session.model(), session.weights(), texts.into_iter(), config)
}
