pub mod backend;
pub mod batching_heuristics;
pub mod file;
pub mod memory;
pub mod r#trait;

pub use backend::StorageBackend;
pub use memory::{InMemoryConsumerGroup, InMemoryConsumerOffsetStore, InMemoryTopicLog};
pub use r#trait::{ConsumerGroup, ConsumerOffsetStore, PartitionId, TopicLog};
