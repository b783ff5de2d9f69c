pub mod cli;
pub mod config;
pub mod error;
pub mod history;
pub mod repo;
pub mod store;
pub mod util;

pub use config::{Manifest, ManifestError};
pub use error::{HistoryError, HistoryResult};
pub use history::{
    CheckpointRequest, CombineMode, HistoryFilter, HistoryState, Outcome, PruneReport,
    RewindRequest, Snapshot, SnapshotLedger,
};
pub use repo::{create_repo, RepoError, SaveRepo};
pub use store::{GitStore, MemoryStore, RevisionStore, SnapshotId, StoreError};
