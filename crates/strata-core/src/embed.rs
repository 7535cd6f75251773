use crate::error::Result;

/// Text embedding capability supplied by an external model adapter.
///
/// The call completes before a record enters any index; the engine never
/// schedules it on a pool of its own.
pub trait Embedder: Send + Sync {
    /// Embed a single text into a fixed-dimension vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// The dimensionality of the output embeddings.
    fn dimensions(&self) -> usize;

    /// Provider name, used in log lines.
    fn name(&self) -> &str;
}
