pub mod conformance;
mod error;
mod file;
mod memory;
mod object;
mod record;
mod traits;

pub use error::StorageError;
pub use file::FileRecordStore;
pub use memory::InMemoryRecordStore;
pub use object::{parse_credentials, ObjectRecordStore, StaticCredentials};
pub use record::OptimizationRecord;
pub use traits::RecordStore;
