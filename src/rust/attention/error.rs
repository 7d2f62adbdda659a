use crate::model::LayerError;

#[derive(Debug, thiserror::Error)]
pub enum InterceptError {
    /// A proxy is already installed for this layer.
    #[error("Layer '{name}' is already intercepted")]
    AlreadyIntercepted { name: String },
    #[error("Layer graph error: {0}")]
    Graph(#[from] LayerError),
}
