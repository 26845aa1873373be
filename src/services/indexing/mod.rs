pub mod chunker;
pub mod pipeline;

pub use chunker::{TextChunk, TextChunker};
pub use pipeline::IndexingPipeline;
