pub mod engine;
pub mod report;

pub use engine::{EngineConfig, SyncEngine, SyncError};
pub use report::{AccountSyncReport, RecordCounts, SyncSummary};
