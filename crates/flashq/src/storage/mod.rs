pub mod backend;
pub mod batching_heuristics;
pub mod file;
pub mod memory;
pub mod r#trait;

// Re-exports for ergonomics
pub use backend::StorageBackend;
pub use memory::{InMemoryConsumerGroup, InMemoryTopicLog};
pub use r#trait::{ConsumerGroup, TopicLog};

