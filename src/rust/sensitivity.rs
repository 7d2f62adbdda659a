//! Per-token structural sensitivity: how much a label's probability drops
//! when a single token is removed from the text.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::highlight::{Annotated, TokenHighlight};
use crate::textcat::{Doc, TextCategorizer, TextcatError, Token};

/// How probability deltas are turned into token styling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensitivityConfig {
    /// Deltas beyond +/- this are coloured
    pub threshold: f32,
    /// Colour for tokens whose removal lowers the probability
    pub positive_color: String,
    /// Colour for tokens whose removal raises the probability
    pub negative_color: String,
    pub base_color: String,
    /// Scale grows by `delta * scale_factor` from 1.0
    pub scale_factor: f32,
    /// Lower bound on the scale
    pub min_scale: f32,
}

impl Default for SensitivityConfig {
    fn default() -> Self {
        Self {
            threshold: 0.1,
            positive_color: "rgba(255,0,0,0.54)".to_string(),
            negative_color: "rgba(0,128,0,0.87)".to_string(),
            base_color: "inherit".to_string(),
            scale_factor: 2.0,
            min_scale: 0.7,
        }
    }
}

impl SensitivityConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(format!("sensitivity threshold must be within [0, 1], got {}", self.threshold));
        }
        if self.scale_factor < 0.0 {
            return Err(format!("scale_factor cannot be negative, got {}", self.scale_factor));
        }
        if self.min_scale <= 0.0 {
            return Err(format!("min_scale must be positive, got {}", self.min_scale));
        }
        Ok(())
    }

    pub fn style(&self, text: impl Into<String>, delta: f32) -> TokenHighlight {
        let color = if delta > self.threshold {
            &self.positive_color
        } else if delta < -self.threshold {
            &self.negative_color
        } else {
            &self.base_color
        };
        TokenHighlight {
            text: text.into(),
            color: color.clone(),
            scale: (1.0 + delta * self.scale_factor).max(self.min_scale),
            weight: delta,
        }
    }
}

/// The text of `tokens` with the token at `index` left out.
///
/// The pieces on either side are joined with a single space so that
/// neighbouring tokens never merge into one word.
pub fn without_token(tokens: &[Token], index: usize) -> String {
    let join = |tokens: &[Token]| -> String {
        tokens.iter().map(|t| t.text_with_ws.as_str()).collect::<String>().trim_end().to_string()
    };
    let before = join(&tokens[..index.min(tokens.len())]);
    let after = join(tokens.get(index + 1..).unwrap_or_default());
    match (before.is_empty(), after.is_empty()) {
        (true, _) => after,
        (_, true) => before,
        _ => format!("{} {}", before, after),
    }
}

/// Probability of `label` minus its probability with each token removed.
///
/// A token whose removal leaves no text gets a delta of zero.
pub fn token_deltas(model: &TextCategorizer, text: &str, label: &str) -> Result<(Doc, Vec<f32>), TextcatError> {
    let doc = model.predict_doc(text)?;
    let base = *doc.scores.get(label).ok_or_else(|| {
        TextcatError::ValidationError(format!("Unknown label '{}'", label))
    })?;

    let mut deltas = Vec::with_capacity(doc.tokens.len());
    for index in 0..doc.tokens.len() {
        let remainder = without_token(&doc.tokens, index);
        let prob = if remainder.is_empty() {
            base
        } else {
            let (_, scores) = model.predict(&remainder)?;
            scores.get(label).copied().unwrap_or(base)
        };
        deltas.push(base - prob);
    }
    debug!("Computed {} token deltas for label '{}'", deltas.len(), label);
    Ok((doc, deltas))
}

/// Lazily annotates a stream of texts with structural sensitivity for one label.
pub struct Sensitivity<'a, I> {
    model: &'a TextCategorizer,
    label: String,
    texts: I,
    config: &'a SensitivityConfig,
}

impl<'a, I> Sensitivity<'a, I> {
    pub fn new(model: &'a TextCategorizer, label: impl Into<String>, texts: I, config: &'a SensitivityConfig) -> Self {
        Self {
            model,
            label: label.into(),
            texts,
            config,
        }
    }

    fn annotate_one(&self, text: &str) -> Result<Annotated, TextcatError> {
        let (doc, deltas) = token_deltas(self.model, text, &self.label)?;
        let tokens = doc
            .tokens
            .iter()
            .zip(deltas)
            .map(|(token, delta)| self.config.style(token.text_with_ws.as_str(), delta))
            .collect();
        Ok(Annotated {
            text: doc.text,
            label: doc.label,
            scores: doc.scores,
            tokens,
        })
    }
}

impl<'a, I, S> Iterator for Sensitivity<'a, I>
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

/// Annotates `texts` with the sensitivity of the model's first label, or of
/// `label` when given.
pub fn sensitivity<'a, I>(
    model: &'a TextCategorizer,
    label: Option<&str>,
    texts: I,
    config: &'a SensitivityConfig,
) -> Result<Sensitivity<'a, I::IntoIter>, TextcatError>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let label = match label {
        Some(label) if model.labels().iter().any(|l| l == label) => label.to_string(),
        Some(label) => return Err(TextcatError::ValidationError(format!("Unknown label '{}'", label))),
        None => model
            .labels()
            .first()
            .cloned()
            .ok_or_else(|| TextcatError::ValidationError("Model has no labels".into()))?,
    };
    Ok(Sensitivity::new(model, label, texts.into_iter(), config))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(text: &str) -> Token {
        Token {
            id: 1,
            text: text.trim_end().to_string(),
            text_with_ws: text.to_string(),
        }
    }

    fn setup_test_categorizer() -> TextCategorizer {
        TextCategorizer::builder()
            .with_vocab(vec!["great", "awful", "movie", "plot"])
            .unwrap()
            .add_label("positive")
            .unwrap()
            .add_label("negative")
            .unwrap()
            .with_width(8)
            .with_seed(3)
            .build()
            .expect("Failed to create categorizer")
    }

    #[test]
    fn test_colour_thresholds() {
        let config = SensitivityConfig::default();
        assert_eq!(config.style("a", 0.2).color, "rgba(255,0,0,0.54)");
        assert_eq!(config.style("a", -0.2).color, "rgba(0,128,0,0.87)");
        assert_eq!(config.style("a", 0.05).color, "inherit");
        assert_eq!(config.style("a", 0.1).color, "inherit");
        assert_eq!(config.style("a", -0.1).color, "inherit");
    }

    #[test]
    fn test_scale_floor() {
        let config = SensitivityConfig::default();
        assert!((config.style("a", -0.4).scale - 0.7).abs() < 1e-6);
        assert!((config.style("a", -0.1).scale - 0.8).abs() < 1e-6);
        assert!((config.style("a", 0.25).scale - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_without_token_joins_with_space() {
        let tokens = vec![token("great"), token(", "), token("movie")];
        assert_eq!(without_token(&tokens, 1), "great movie");
        assert_eq!(without_token(&tokens, 0), "movie");
        assert_eq!(without_token(&tokens, 2), "great,");
        assert_eq!(without_token(&tokens[..1], 0), "");
    }

    #[test]
    fn test_single_token_has_zero_delta() {
        let model = setup_test_categorizer();
        let config = SensitivityConfig::default();
        let annotated: Vec<_> = sensitivity(&model, None, ["great"], &config)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        let token = &annotated[0].tokens[0];
        assert_eq!(token.text, "great");
        assert_eq!(token.weight, 0.0);
        assert_eq!(token.color, "inherit");
        assert!((token.scale - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_deltas_match_repredictions() {
        let model = setup_test_categorizer();
        let (doc, deltas) = token_deltas(&model, "great awful movie", "negative").unwrap();
        assert_eq!(deltas.len(), 3);
        assert_eq!(doc.tokens.len(), 3);

        let base = doc.scores["negative"];
        let (_, without_awful) = model.predict("great movie").unwrap();
        assert!((deltas[1] - (base - without_awful["negative"])).abs() < 1e-6);
    }

    #[test]
    fn test_unknown_label() {
        let model = setup_test_categorizer();
        let config = SensitivityConfig::default();
        assert!(sensitivity(&model, Some("neutral"), ["great"], &config).is_err());
        assert!(token_deltas(&model, "great", "neutral").is_err());
    }

    #[test]
    fn test_config_validation() {
        assert!(SensitivityConfig::default().validate().is_ok());
        let bad = SensitivityConfig {
            min_scale: 0.0,
            ..SensitivityConfig::default()
        };
        assert!(bad.validate().is_err());
    }
}
