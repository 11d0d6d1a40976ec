pub mod storage;
pub mod store;

pub use storage::{FsObjectStore, MemoryObjectStore, ObjectMetadata, ObjectStore, StorageError};
pub use store::{
    MemoryTaskStore, MemoryTranscriptStore, MongoTaskStore, MongoTranscriptStore,
    SegmentTextField, StoreError, StoreResult, TaskStore, TranscriptStore,
};
