//! Attention-weight interception for text categorization models.
//!
//! A model is a [`LayerGraph`] of named layers. [`intercept`] finds the
//! attention layer by name, swaps in a proxy that records its weights on every
//! forward pass, and puts the original back when the session ends.
//!
//! # Basic Usage
//!
//! ```rust
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use attncat::{intercept, TextCategorizer};
//!
//! let mut model = TextCategorizer::builder()
//!     .with_vocab(vec!["great", "awesome", "bad", "terrible", "movie"])?
//!     .add_label("positive")?
//!     .add_label("negative")?
//!     .build()?;
//!
//! let session = intercept(&mut model, "attn")?;
//! if let Some(weights) = session.weights() {
//!     session.model().predict("great movie")?;
//!     let captured = weights.last().unwrap();
//!     assert_eq!(captured.nrows(), 2);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Restoration
//!
//! The session restores the original layer when it is dropped, so leaving the
//! scope early through `?` or a panic still leaves the model unchanged:
//!
//! ```rust
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use attncat::{with_attention_weights, TextCategorizer, TextcatError};
//!
//! let mut model = TextCategorizer::builder()
//!     .with_vocab(vec!["great", "movie"])?
//!     .add_label("positive")?
//!     .build()?;
//!
//! let result: Result<(), TextcatError> = with_attention_weights(&mut model, "attn", |model, _| {
//!     model.predict("")?;
//!     Ok(())
//! });
//! assert!(result.is_err());
//! # Ok(())
//! # }
//! ```

pub mod attention;
pub mod config;
pub mod highlight;
pub mod model;
pub mod sensitivity;
pub mod textcat;

pub use attention::{
    intercept, locate, with_attention_weights, AttentionBuffer, AttentionSession, InterceptError, Location,
    DEFAULT_TARGET,
};
pub use config::{AttncatConfig, ConfigError};
pub use highlight::{annotate, Annotated, HighlightConfig, TokenHighlight};
pub use sensitivity::{sensitivity, SensitivityConfig};
pub use model::{Activations, LayerError, LayerGraph, Mode, Model, NodeId};
pub use textcat::{Doc, TextCategorizer, TextCategorizerBuilder, TextcatError, TextcatInfo};

pub fn init_logger() {
    env_logger::init();
}
