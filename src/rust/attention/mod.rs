//! Capturing attention weights from a live model.
//!
//! [`locate`] finds the layer, [`wrap`] builds the capturing proxy and
//! [`intercept`] swaps the proxy in for the duration of an
//! [`AttentionSession`].

mod error;
mod locate;
mod proxy;
mod session;

pub use error::InterceptError;
pub use locate::{bfs, locate, Bfs, Location};
pub use proxy::{wrap, AttentionBuffer, AttentionProxy};
pub use session::{intercept, with_attention_weights, AttentionSession, InterceptRecord, DEFAULT_TARGET};
