//! Vector similarity search over idea embeddings.
//!
//! Implements the `vector_search_ideas(query_embedding,
//! similarity_threshold, match_count)` operation the voice pipeline
//! relies on:
//!
//! - `index`: in-memory cosine-similarity index keyed by idea id
//! - `storage`: binary vectors.bin persistence with a checksummed header
//! - `content`: content composition + change-detection hashing
//! - `service`: embed-and-index service tying the pieces together

pub mod content;
mod index;
mod service;
mod storage;

pub use content::{compose_content, content_hash};
pub use index::{IndexError, SearchResult, VectorIndex};
pub use service::{VectorSearchError, VectorSearchService, VectorizeReport};
pub use storage::{VectorStorage, VectorStorageError};
